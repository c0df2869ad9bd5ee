use dashfields::{
    ComputedField, Doc, Field, FieldId, FieldResult, List, ObjectField, SchemaHeaderField, cast,
    num_cast, str_cast,
};

use crate::helpers::{setup, setup_counting, setup_with_engine};

#[test]
fn test_read_falls_through_to_prototype() {
    let (instance, _) = setup();
    let proto = Doc::new(&instance);
    proto.set("color", "red").unwrap();
    let doc = Doc::new(&instance);
    doc.set("proto", &proto).unwrap();

    assert_eq!(doc.get("color"), proto.get("color"));
    assert!(!doc.has_own("color"));
    assert!(doc.get_own("color").is_missing());

    doc.set("color", "green").unwrap();
    assert_eq!(doc.get_as::<String>("color").as_deref(), Some("green"));
    assert_eq!(proto.get_as::<String>("color").as_deref(), Some("red"));
}

#[test]
fn test_delegate_shadows_without_touching_base() {
    let (instance, _) = setup();
    let base = Doc::new(&instance);
    base.set("isPrototype", true).unwrap();
    base.set("color", "red").unwrap();
    let child = base.make_delegate(None, None).unwrap();

    assert_eq!(child.get_as::<String>("color").as_deref(), Some("red"));
    child.set("color", "blue").unwrap();
    assert_eq!(child.get_as::<String>("color").as_deref(), Some("blue"));
    assert_eq!(base.get_as::<String>("color").as_deref(), Some("red"));
}

#[test]
fn test_prototype_does_not_fall_through() {
    let (instance, _) = setup();
    let root = Doc::new(&instance);
    root.set("color", "red").unwrap();
    let proto = Doc::new(&instance);
    proto.set("proto", &root).unwrap();
    proto.set("isPrototype", true).unwrap();

    assert!(proto.get("color").is_missing());
}

#[test]
fn test_removing_a_key_reveals_inherited_value() {
    let (instance, _) = setup();
    let proto = Doc::new(&instance);
    proto.set("title", "inherited").unwrap();
    let doc = proto.make_delegate(None, Some("own")).unwrap();
    assert_eq!(doc.title(), "own");

    doc.remove("title").unwrap();
    assert_eq!(doc.title(), "inherited");
}

#[test]
fn test_prototype_cycle_reads_missing() {
    let (instance, _) = setup();
    let a = Doc::new(&instance);
    let b = Doc::new(&instance);
    a.set("proto", &b).unwrap();
    b.set("proto", &a).unwrap();

    assert!(a.get("nowhere").is_missing());
    assert!(b.get("nowhere").is_missing());
}

#[test]
fn test_cast_text_field() {
    let (instance, _) = setup();
    let doc = Doc::new(&instance);
    doc.set("title", "hello").unwrap();

    assert!(cast::<f64>(doc.get("title")).is_missing());
    assert_eq!(cast::<String>(doc.get("title")).ready().as_deref(), Some("hello"));
}

#[test]
fn test_identical_write_is_not_recorded() {
    let (instance, history) = setup_counting();
    let doc = Doc::new(&instance);
    let other = Doc::new(&instance);
    let list = List::new();

    doc.set("title", "a").unwrap();
    doc.set("title", "a").unwrap();
    assert_eq!(history.count(), 1);

    doc.set("items", list.clone()).unwrap();
    doc.set("items", list).unwrap();
    assert_eq!(history.count(), 2);

    doc.set("link", &other).unwrap();
    doc.set("link", &other).unwrap();
    assert_eq!(history.count(), 3);

    doc.remove("missing").unwrap();
    assert_eq!(history.count(), 3);
}

#[test]
fn test_object_cannot_live_in_two_documents() {
    let (instance, _) = setup();
    let a = Doc::new(&instance);
    let b = Doc::new(&instance);
    let header = SchemaHeaderField::new("Name", "#ffffff");

    a.set("header", header.clone()).unwrap();
    let err = b.set("other", header.clone()).unwrap_err();
    assert!(err.is_ownership_violation());
    assert!(!b.has_own("other"));

    // Once it leaves the first document it may move.
    a.remove("header").unwrap();
    b.set("other", header).unwrap();
    assert!(b.has_own("other"));
}

#[test]
fn test_object_cannot_live_under_two_keys() {
    let (instance, backend) = setup();
    let a = Doc::new(&instance);
    let b = Doc::new(&instance);
    let list = List::from_fields([1]).unwrap();
    a.set("x", list.clone()).unwrap();

    let err = a.set("y", list.clone()).unwrap_err();
    assert!(err.is_ownership_violation());
    assert!(!a.has_own("y"));

    // The object stays bound to its key, so mutations still reach the store and
    // it cannot be handed to another document.
    list.push(2).unwrap();
    assert_eq!(
        backend.stored(a.id()).unwrap()["fields"]["x"],
        serde_json::json!({"__type": "list", "fields": [1.0, 2.0]})
    );
    assert!(b.set("z", list).unwrap_err().is_ownership_violation());
}

#[test]
fn test_object_may_move_between_keys_after_removal() {
    let (instance, _) = setup();
    let doc = Doc::new(&instance);
    let list = List::from_fields([1, 2]).unwrap();
    doc.set("a", list.clone()).unwrap();

    doc.set("a", 3).unwrap();
    doc.set("b", list).unwrap();
    assert_eq!(doc.get("a").ready(), Some(Field::from(3)));
    assert_eq!(doc.get("b").ready().and_then(|f| f.as_list().map(List::len)), Some(2));
}

#[test]
fn test_references_are_stored_as_proxies() {
    let (instance, _) = setup();
    let doc = Doc::new(&instance);
    let target = Doc::new(&instance);
    doc.set("link", &target).unwrap();

    assert!(matches!(doc.get_raw("link"), Some(Field::Object(ObjectField::Proxy(_)))));
    assert_eq!(doc.get("link").ready(), Some(Field::Ref(target)));
}

#[test]
fn test_read_only_rejects_writes() {
    let (instance, backend) = setup();
    let doc = Doc::new(&instance);
    doc.set("x", 1).unwrap();
    backend.clear_log();

    {
        let _guard = instance.read_only();
        let err = doc.set("x", 2).unwrap_err();
        assert!(err.is_read_only());
        assert!(doc.remove("x").unwrap_err().is_read_only());
    }

    assert_eq!(num_cast(doc.get("x")), 1.0);
    assert!(backend.update_log().is_empty());
    doc.set("x", 2).unwrap();
    assert_eq!(num_cast(doc.get("x")), 2.0);
}

#[test]
fn test_computed_field_evaluates_for_reader() {
    let (instance, _) = setup_with_engine();
    let proto = Doc::new(&instance);
    proto.set("n", 4).unwrap();
    proto
        .set("twice", ComputedField::make_function(&instance, "double:n").unwrap())
        .unwrap();
    let delegate = proto.make_delegate(None, None).unwrap();
    delegate.set("n", 10).unwrap();

    assert_eq!(num_cast(proto.get("twice")), 8.0);
    assert_eq!(num_cast(delegate.get("twice")), 20.0);
    assert!(matches!(
        delegate.get_uncomputed("twice"),
        FieldResult::Ready(Field::Object(ObjectField::Computed(_)))
    ));
    assert_eq!(Field::to_key_value_string(&proto, "twice"), "=:=double:n");
    assert_eq!(Field::to_key_value_string(&delegate, "twice"), ":=double:n");
}

#[test]
fn test_computed_field_needs_an_engine() {
    let (instance, _) = setup();
    let err = ComputedField::make_function(&instance, "const:1").unwrap_err();
    assert!(err.is_deserialization_error());
}

#[test]
fn test_failing_computed_field_reads_missing() {
    let (instance, _) = setup_with_engine();
    let doc = Doc::new(&instance);
    doc.set("twice", ComputedField::make_function(&instance, "double:n").unwrap())
        .unwrap();
    assert!(doc.get("twice").is_missing());
}

#[test]
fn test_create_with_resident_id_returns_existing() {
    let (instance, backend) = setup();
    let doc = Doc::create(&instance, Some(FieldId::new("fixed")));
    doc.set("x", 1).unwrap();

    let again = Doc::create(&instance, Some(FieldId::new("fixed")));
    assert!(again.ptr_eq(&doc));
    assert_eq!(backend.len(), 1);
}

#[test]
fn test_keys_and_clear_fields() {
    let (instance, _) = setup();
    let doc = Doc::new(&instance);
    doc.set("b", 1).unwrap();
    doc.set("a", "x").unwrap();
    assert_eq!(doc.keys(), vec!["a".to_string(), "b".to_string()]);

    doc.clear_fields().unwrap();
    assert!(doc.keys().is_empty());
}

#[test]
fn test_layout_defaults() {
    let (instance, _) = setup();
    let doc = Doc::new(&instance);
    assert_eq!(doc.width(), 0.0);
    assert_eq!(doc.title(), "");

    doc.set("_width", 120).unwrap();
    doc.set("_height", 40.5).unwrap();
    doc.set("title", "Notes").unwrap();
    assert_eq!(doc.width(), 120.0);
    assert_eq!(doc.height(), 40.5);
    assert_eq!(str_cast(doc.get("title")), "Notes");
    assert_eq!(doc.to_string(), "Doc(Notes)");
}

#[test]
fn test_flags_are_own_only() {
    let (instance, _) = setup();
    let proto = Doc::new(&instance);
    proto.set("isPrototype", true).unwrap();
    proto.set("system", true).unwrap();
    let doc = proto.make_delegate(None, None).unwrap();

    assert!(proto.is_prototype());
    assert!(proto.is_system());
    assert!(!doc.is_prototype());
    assert!(!doc.is_system());
}

#[test]
fn test_script_string() {
    let (instance, _) = setup();
    let doc = Doc::create(&instance, Some(FieldId::new("abc")));
    assert_eq!(doc.to_script_string(), "DOC-\"abc\"-");
    assert_eq!(Field::from(&doc).to_script_string(), "DOC-\"abc\"-");
}
