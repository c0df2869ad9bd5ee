use std::sync::Arc;

use chrono::{TimeZone, Utc};
use dashfields::{
    DateField, Doc, Field, FieldResult, List, ObjectField, ProxyField, ScriptField, ScriptOptions,
    SchemaHeaderField, bool_cast, cast, cast_now, cast_or, date_cast, doc_list_cast,
    doc_list_cast_async, field_value, field_value_or, num_cast, promise_value, script_cast,
    str_cast, str_list_cast,
};
use parking_lot::Mutex;
use serde_json::json;

use crate::helpers::{TestEngine, setup};

/// A document whose prototype is stored but not loaded yet.
fn pending_delegate() -> (dashfields::Instance, Arc<dashfields::InMemory>, Doc) {
    let (instance, backend) = setup();
    backend.insert_raw(
        "proto",
        json!({"__type": "Doc", "id": "proto", "fields": {"title": "hello", "n": 3}}),
    );
    backend.set_deferred(true);
    let doc = Doc::new(&instance);
    doc.set("proto", ProxyField::from_id(&instance, "proto")).unwrap();
    (instance, backend, doc)
}

#[test]
fn test_cast_never_fails_on_mismatch() {
    let (instance, _) = setup();
    let doc = Doc::new(&instance);
    let values = [
        Field::from(1),
        Field::from("text"),
        Field::from(true),
        Field::from(List::new()),
        Field::from(SchemaHeaderField::new("h", "#fff")),
        Field::from(&doc),
    ];

    for value in values {
        let read = || FieldResult::Ready(value.clone());
        let matches = [
            cast::<f64>(read()).is_ready(),
            cast::<String>(read()).is_ready(),
            cast::<bool>(read()).is_ready(),
            cast::<List>(read()).is_ready(),
            cast::<SchemaHeaderField>(read()).is_ready(),
            cast::<Doc>(read()).is_ready(),
        ];
        assert_eq!(matches.iter().filter(|m| **m).count(), 1, "{value:?}");
        assert!(cast::<Field>(read()).is_ready());
        assert!(cast::<DateField>(read()).is_missing());
    }
    assert!(cast::<f64>(FieldResult::Missing).is_missing());
}

#[test]
fn test_defaults() {
    assert_eq!(num_cast(FieldResult::Missing), 0.0);
    assert_eq!(str_cast(FieldResult::Ready(Field::from(4))), "");
    assert!(!bool_cast(FieldResult::Missing));
    assert!(bool_cast(FieldResult::Ready(Field::from(true))));
    assert_eq!(cast_or(FieldResult::Ready(Field::from("x")), 7.0), 7.0);
    assert_eq!(field_value_or(FieldResult::Missing, 2), 2);
    assert_eq!(field_value(FieldResult::Ready(5)), Some(5));
}

#[test]
fn test_object_casts() {
    let date = DateField::new(Utc.with_ymd_and_hms(2021, 3, 4, 5, 6, 7).unwrap());
    let read = FieldResult::Ready(Field::from(date.clone()));
    assert_eq!(date_cast(read).map(|d| d.date()), Some(date.date()));

    let script = ScriptField::compile(&TestEngine, "const:1", ScriptOptions::default()).unwrap();
    let read = FieldResult::Ready(Field::from(script));
    assert_eq!(script_cast(read).map(|s| s.source().to_string()).as_deref(), Some("const:1"));
    assert!(script_cast(FieldResult::Ready(Field::from("const:1"))).is_none());
}

#[test]
fn test_list_casts() {
    let (instance, _) = setup();
    let a = Doc::new(&instance);
    let b = Doc::new(&instance);
    let list = List::from_fields([Field::from(&a), Field::from("skip"), Field::from(&b)]).unwrap();
    let read = || FieldResult::Ready(Field::from(list.clone()));

    assert_eq!(doc_list_cast(read()), vec![a, b]);
    assert_eq!(str_list_cast(read()), vec!["skip".to_string()]);
    assert!(doc_list_cast(FieldResult::Ready(Field::from(1))).is_empty());
}

#[test]
fn test_pending_read_stays_pending_through_cast() {
    let (_instance, backend, doc) = pending_delegate();

    assert!(doc.get("title").is_pending());
    assert!(cast::<String>(doc.get("title")).is_pending());
    assert_eq!(cast_or(doc.get("title"), "default".to_string()), "default");
    assert!(cast_now::<String>(doc.get("title")).is_none());

    let delivered = Arc::new(Mutex::new(None));
    let sink = delivered.clone();
    cast::<String>(doc.get("title")).then(move |value| *sink.lock() = Some(value));
    assert!(delivered.lock().is_none());

    assert_eq!(backend.flush_fetches(), 1);
    assert_eq!(*delivered.lock(), Some(Some("hello".to_string())));
    assert_eq!(str_cast(doc.get("title")), "hello");
}

#[test]
fn test_pending_cast_of_wrong_type_delivers_none() {
    let (_instance, backend, doc) = pending_delegate();

    let delivered = Arc::new(Mutex::new(None));
    let sink = delivered.clone();
    cast::<String>(doc.get("n")).then(move |value| *sink.lock() = Some(value));
    backend.flush_fetches();
    assert_eq!(*delivered.lock(), Some(None));
}

#[test]
fn test_promise_value_delivers_once() {
    let (_instance, backend, doc) = pending_delegate();

    let calls = Arc::new(Mutex::new(Vec::new()));
    let sink = calls.clone();
    promise_value(cast::<f64>(doc.get("n"))).then(move |value| sink.lock().push(value));
    backend.flush_fetches();
    backend.flush_fetches();
    assert_eq!(*calls.lock(), vec![Some(3.0)]);
}

#[tokio::test]
async fn test_resolve_waits_for_load() {
    let (_instance, backend, doc) = pending_delegate();

    let task = tokio::spawn(cast::<String>(doc.get("title")).resolve());
    tokio::task::yield_now().await;
    backend.flush_fetches();
    assert_eq!(task.await.unwrap(), Some("hello".to_string()));
}

#[tokio::test]
async fn test_doc_list_cast_async_waits_for_every_element() {
    let (instance, backend) = setup();
    for id in ["one", "two"] {
        backend.insert_raw(id, json!({"__type": "Doc", "id": id, "fields": {}}));
    }
    backend.set_deferred(true);
    let list = List::from_fields([
        ProxyField::from_id(&instance, "one"),
        ProxyField::from_id(&instance, "two"),
        ProxyField::from_id(&instance, "gone"),
    ])
    .unwrap();
    let read = FieldResult::Ready(Field::Object(ObjectField::List(list.clone())));
    assert!(doc_list_cast(read.clone()).is_empty());

    let task = tokio::spawn(doc_list_cast_async(read));
    for _ in 0..3 {
        tokio::task::yield_now().await;
        backend.flush_fetches();
    }
    let ids: Vec<String> = task.await.unwrap().iter().map(|d| d.id().to_string()).collect();
    assert_eq!(ids, vec!["one".to_string(), "two".to_string()]);
}
