use dashfields::{
    ChangeKind, Doc, Field, FieldId, FieldResult, List, ObjectField, ObjectFieldKind, ProxyField,
};
use serde_json::json;

use crate::helpers::{Recorder, setup};

#[test]
fn test_splice_replaces_in_place() {
    let list = List::new();
    list.extend([1, 2, 3]).unwrap();
    let removed = list.splice(1, 1, [9]).unwrap();

    assert_eq!(removed, vec![FieldResult::Ready(Field::from(2))]);
    assert_eq!(list.numbers(), vec![1.0, 9.0, 3.0]);
}

#[test]
fn test_document_reads_back_as_same_document() {
    let (instance, _) = setup();
    let doc = Doc::new(&instance);
    let list = List::new();
    list.push(&doc).unwrap();

    assert!(matches!(list.get_raw(0), Some(Field::Object(ObjectField::Proxy(_)))));
    let read = list.get(0).ready().unwrap();
    assert!(read.as_doc().unwrap().ptr_eq(&doc));
    assert_eq!(list.docs(), vec![doc.clone()]);
    assert!(list.includes(&Field::Ref(doc)));
}

#[test]
fn test_unloaded_document_resolves_to_loaded_instance() {
    let (instance, backend) = setup();
    backend.insert_raw(
        "later",
        json!({"__type": "Doc", "id": "later", "fields": {"title": "Later"}}),
    );
    backend.set_deferred(true);

    let list = List::new();
    list.push(ProxyField::from_id(&instance, "later")).unwrap();
    assert!(list.get(0).is_pending());
    assert!(list.docs().is_empty());
    assert_eq!(list.join(","), "");

    assert_eq!(backend.flush_fetches(), 1);
    let loaded = instance.cached_ref_field(&FieldId::new("later")).unwrap();
    let read = list.get(0).ready().unwrap();
    assert!(read.as_doc().unwrap().ptr_eq(&loaded));
    assert_eq!(loaded.title(), "Later");
}

#[test]
fn test_mutations_notify_owning_document_once() {
    let (instance, backend) = setup();
    let doc = Doc::new(&instance);
    let list = List::new();
    doc.set("items", list.clone()).unwrap();
    backend.clear_log();

    let recorder = Recorder::default();
    doc.subscribe("items", recorder.callback());

    list.extend(["a", "b", "c"]).unwrap();
    assert_eq!(recorder.len(), 1);
    assert_eq!(recorder.changes()[0].kind, ChangeKind::Updated);

    list.reverse();
    assert_eq!(recorder.len(), 2);
    assert_eq!(list.strings(), vec!["c", "b", "a"]);

    let log = backend.update_log();
    assert_eq!(log.len(), 2);
    let (id, diff) = &log[1];
    assert_eq!(id, doc.id());
    assert_eq!(
        diff.set["fields.items"],
        json!({"__type": "list", "fields": ["c", "b", "a"]})
    );
}

#[test]
fn test_nested_list_mutation_reaches_document() {
    let (instance, _) = setup();
    let doc = Doc::new(&instance);
    let outer = List::new();
    let inner = List::new();
    outer.push(inner.clone()).unwrap();
    doc.set("grid", outer).unwrap();

    let recorder = Recorder::default();
    doc.subscribe("grid", recorder.callback());
    inner.push(1).unwrap();
    assert_eq!(recorder.keys(), vec!["grid".to_string()]);
}

#[test]
fn test_detached_list_does_not_notify() {
    let (instance, _) = setup();
    let doc = Doc::new(&instance);
    let list = List::new();
    doc.set("items", list.clone()).unwrap();
    doc.remove("items").unwrap();

    let recorder = Recorder::default();
    doc.subscribe_all(recorder.callback());
    list.push(1).unwrap();
    assert_eq!(recorder.len(), 0);
}

#[test]
fn test_positional_operations() {
    let list = List::from_fields(["b"]).unwrap();
    list.unshift(["a"]).unwrap();
    list.push("d").unwrap();
    list.insert(2, "c").unwrap();
    assert_eq!(list.strings(), vec!["a", "b", "c", "d"]);

    let err = list.insert(9, "z").unwrap_err();
    assert!(matches!(
        err,
        dashfields::Error::Field(dashfields::FieldError::IndexOutOfBounds { index: 9, len: 4 })
    ));
    assert!(list.set(4, "z").is_err());

    list.set(0, "A").unwrap();
    assert_eq!(list.shift().and_then(FieldResult::ready), Some(Field::from("A")));
    assert_eq!(list.pop().and_then(FieldResult::ready), Some(Field::from("d")));
    assert_eq!(list.remove(0).and_then(FieldResult::ready), Some(Field::from("b")));
    assert!(list.remove(5).is_none());
    assert_eq!(list.strings(), vec!["c"]);
}

#[test]
fn test_read_helpers() {
    let list = List::from_fields([1, 2, 3, 2]).unwrap();

    assert_eq!(list.index_of(&Field::from(2)), Some(1));
    assert_eq!(list.last_index_of(&Field::from(2)), Some(3));
    assert!(!list.includes(&Field::from(7)));
    assert_eq!(
        list.slice(1..3),
        vec![FieldResult::Ready(Field::from(2)), FieldResult::Ready(Field::from(3))]
    );
    assert_eq!(list.slice(3..), vec![FieldResult::Ready(Field::from(2))]);
    assert!(list.slice(10..).is_empty());
    assert_eq!(list.join("-"), "1-2-3-2");
    assert_eq!(list.concat([FieldResult::Ready(Field::from(5))]).len(), 5);
    assert_eq!(list.iter().filter(FieldResult::is_ready).count(), 4);
}

#[test]
fn test_fill_range() {
    let list = List::from_fields([1, 2, 3, 4]).unwrap();
    list.fill(0, 1..3).unwrap();
    assert_eq!(list.numbers(), vec![1.0, 0.0, 0.0, 4.0]);
}

#[test]
fn test_clear_releases_objects() {
    let (instance, _) = setup();
    let doc = Doc::new(&instance);
    let inner = List::new();
    let list = List::new();
    list.push(inner.clone()).unwrap();

    list.clear();
    assert!(list.is_empty());
    doc.set("free", inner).unwrap();
}

#[test]
fn test_list_copy_shares_document_references() {
    let (instance, _) = setup();
    let doc = Doc::new(&instance);
    let list = List::from_fields([Field::from(&doc), Field::from(1)]).unwrap();

    let copy = list.copy();
    assert_eq!(copy.docs(), vec![doc]);
    copy.push(2).unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(copy.len(), 3);
}
