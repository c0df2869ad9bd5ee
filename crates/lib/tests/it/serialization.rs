use std::{collections::BTreeMap, sync::Arc};

use chrono::{TimeZone, Utc};
use dashfields::{
    ColumnType, ComputedField, CursorField, DateField, DeserializeMode, Doc, Field, InMemory,
    InkField, Instance, List, ModelConfig, ObjectField, Registry, RichTextField,
    SchemaHeaderField, ScriptField, ScriptOptions, cast,
    object::{CursorPosition, InkPoint, InkTool, Stroke},
};
use serde_json::json;

use crate::helpers::{TestEngine, setup, setup_with_config, setup_with_engine};

#[test]
fn test_primitives_serialize_as_plain_json() {
    let registry = Registry::with_builtins();
    assert_eq!(registry.serialize(&Field::from(1.5)).unwrap(), json!(1.5));
    assert_eq!(registry.serialize(&Field::from("a")).unwrap(), json!("a"));
    assert_eq!(registry.serialize(&Field::from(false)).unwrap(), json!(false));
}

#[test]
fn test_document_form() {
    let (instance, _) = setup();
    let target = Doc::create(&instance, Some("target".into()));
    let doc = Doc::create(&instance, Some("doc".into()));
    doc.set("title", "Notes").unwrap();
    doc.set("link", &target).unwrap();
    doc.set("items", List::from_fields([1, 2]).unwrap()).unwrap();

    let value = instance.registry().serialize_doc(&doc).unwrap();
    assert_eq!(
        value,
        json!({
            "__type": "Doc",
            "id": "doc",
            "fields": {
                "title": "Notes",
                "link": {"__type": "proxy", "fieldId": "target"},
                "items": {"__type": "list", "fields": [1.0, 2.0]}
            }
        })
    );
}

#[test]
fn test_every_kind_survives_a_second_client() {
    let (instance, backend) = setup_with_engine();
    let doc = Doc::new(&instance);
    let date = Utc.with_ymd_and_hms(2022, 5, 6, 7, 8, 9).unwrap();
    let mut strokes = BTreeMap::new();
    strokes.insert(
        "s1".to_string(),
        Stroke {
            path_data: vec![InkPoint { x: 1.0, y: 2.0 }],
            color: "#000".to_string(),
            width: 2.0,
            tool: InkTool::Highlighter,
        },
    );
    let cursors = CursorField::default();
    cursors.set_position("u1", "Ann", CursorPosition { x: 3.0, y: 4.0 });

    doc.set("header", SchemaHeaderField::with_type("Size", "#fff", ColumnType::Number))
        .unwrap();
    doc.set("ink", InkField::new(strokes.clone())).unwrap();
    doc.set("cursors", cursors).unwrap();
    doc.set("text", RichTextField::new("{\"doc\":1}", "plain")).unwrap();
    doc.set("when", DateField::new(date)).unwrap();
    doc.set("n", 21).unwrap();
    doc.set("twice", ComputedField::make_function(&instance, "double:n").unwrap())
        .unwrap();
    doc.set(
        "script",
        ScriptField::compile(&TestEngine, "const:2", ScriptOptions::default()).unwrap(),
    )
    .unwrap();

    let remote = Instance::builder(Arc::new(backend.connect()))
        .script_engine(Arc::new(TestEngine))
        .build();
    let loaded = remote.get_ref_field(doc.id()).ready().unwrap();

    let header = cast::<SchemaHeaderField>(loaded.get("header")).ready().unwrap();
    assert_eq!(header.heading(), "Size");
    assert_eq!(header.column_type(), ColumnType::Number);
    assert_eq!(cast::<InkField>(loaded.get("ink")).ready().unwrap().strokes(), strokes);
    let cursor = cast::<CursorField>(loaded.get("cursors")).ready().unwrap().cursor("u1").unwrap();
    assert_eq!(cursor.metadata.identifier, "Ann");
    assert_eq!(cursor.position, CursorPosition { x: 3.0, y: 4.0 });
    assert_eq!(cast::<RichTextField>(loaded.get("text")).ready().unwrap().text(), "plain");
    assert_eq!(cast::<DateField>(loaded.get("when")).ready().unwrap().date(), date);
    assert_eq!(loaded.get("twice").ready(), Some(Field::from(42)));
    let script = cast::<ScriptField>(loaded.get("script")).ready().unwrap();
    assert!(script.is_compiled());
    assert_eq!(script.run(&loaded), Some(Field::from(2)));
}

#[test]
fn test_date_is_epoch_millis() {
    let registry = Registry::with_builtins();
    let date = DateField::new(Utc.timestamp_millis_opt(1_600_000_000_123).unwrap());
    assert_eq!(
        registry.serialize(&Field::from(date)).unwrap(),
        json!({"__type": "date", "date": 1_600_000_000_123i64})
    );
}

#[test]
fn test_script_without_engine_stays_uncompiled() {
    let (instance, _) = setup();
    let value = json!({
        "__type": "script",
        "script": {"originalScript": "const:1", "options": {}}
    });
    let field = instance.registry().deserialize(&value, &instance).unwrap().unwrap();
    match field {
        Field::Object(ObjectField::Script(script)) => {
            assert!(!script.is_compiled());
            assert_eq!(script.source(), "const:1");
        }
        other => panic!("expected a script, got {other:?}"),
    }
}

#[test]
fn test_script_compile_error_fails_deserialization() {
    let (instance, _) = setup_with_engine();
    let value = json!({
        "__type": "computed",
        "script": {"originalScript": "nonsense", "options": {"addReturn": true}}
    });
    let err = instance.registry().deserialize(&value, &instance).unwrap_err();
    assert!(err.is_deserialization_error());
}

#[test]
fn test_script_options_round_trip() {
    let registry = Registry::with_builtins();
    let options = ScriptOptions {
        required_type: Some("number".to_string()),
        add_return: true,
        ..Default::default()
    };
    let script = ScriptField::compile(&TestEngine, "const:3", options).unwrap();
    assert_eq!(
        registry.serialize(&Field::from(script)).unwrap(),
        json!({
            "__type": "script",
            "script": {
                "originalScript": "const:3",
                "options": {"requiredType": "number", "addReturn": true, "typecheck": false}
            }
        })
    );
}

#[test]
fn test_untagged_object_is_rejected_in_strict_mode() {
    let (instance, _) = setup();
    let err = instance
        .registry()
        .deserialize(&json!({"x": 1}), &instance)
        .unwrap_err();
    assert!(err.is_unregistered_type());
}

#[test]
fn test_untagged_object_reads_absent_in_relaxed_mode() {
    let (instance, _) = setup_with_config(ModelConfig {
        deserialize_mode: DeserializeMode::Relaxed,
        ..Default::default()
    });
    let read = instance.registry().deserialize(&json!({"x": 1}), &instance).unwrap();
    assert!(read.is_none());
    assert!(instance.registry().deserialize(&json!(null), &instance).unwrap().is_none());
}

#[test]
fn test_unknown_tag_is_rejected() {
    let (instance, _) = setup();
    let err = instance
        .registry()
        .deserialize(&json!({"__type": "hologram"}), &instance)
        .unwrap_err();
    assert!(err.is_unregistered_type());
}

#[test]
fn test_unregistered_kind_cannot_be_stored() {
    let backend = Arc::new(InMemory::new());
    let mut registry = Registry::new();
    registry
        .register("Doc", |_, _| Ok(Field::from(0)), None)
        .unwrap();
    let instance = Instance::builder(backend).registry(registry).build();
    let doc = Doc::new(&instance);

    let err = doc.set("items", List::new()).unwrap_err();
    assert!(err.is_unregistered_type());
    assert!(!doc.has_own("items"));
}

#[test]
fn test_duplicate_registration_is_rejected() {
    let mut registry = Registry::with_builtins();
    let err = registry
        .register("list", |_, _| Ok(Field::from(0)), None)
        .unwrap_err();
    assert!(matches!(
        err,
        dashfields::Error::Field(dashfields::FieldError::DuplicateType { .. })
    ));
}

#[test]
fn test_custom_tag() {
    let (instance, _) = setup();
    let mut registry = Registry::with_builtins();
    registry
        .register(
            "point",
            |map, _| {
                let x = map.get("x").and_then(serde_json::Value::as_f64).unwrap_or_default();
                Ok(Field::from(x))
            },
            None,
        )
        .unwrap();
    assert!(registry.is_registered("point"));
    let read = registry
        .deserialize(&json!({"__type": "point", "x": 4.0}), &instance)
        .unwrap();
    assert_eq!(read, Some(Field::from(4.0)));
}

#[test]
fn test_loaded_references_reuse_resident_documents() {
    let (instance, backend) = setup();
    let target = Doc::create(&instance, Some("target".into()));
    backend.insert_raw(
        "holder",
        json!({
            "__type": "Doc",
            "id": "holder",
            "fields": {
                "link": {"__type": "proxy", "fieldId": "target"},
                "list": {"__type": "list", "fields": [{"__type": "proxy", "fieldId": "target"}]}
            }
        }),
    );

    let holder = instance.get_ref_field("holder").ready().unwrap();
    assert_eq!(holder.get("link").ready(), Some(Field::Ref(target.clone())));
    let list = cast::<List>(holder.get("list")).ready().unwrap();
    assert_eq!(list.docs(), vec![target]);
    assert!(matches!(list.get_raw(0), Some(Field::Object(ObjectField::Proxy(p))) if p.cached().is_some()));
}
