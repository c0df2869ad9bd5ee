use dashfields::{
    AddDocOptions, Doc, Field, FieldId, List, ModelConfig, ObjectFieldKind, SchemaHeaderField,
    cast, doc_list_cast, num_cast, str_cast,
};

use crate::helpers::{setup, setup_with_config};

fn ids(docs: &[Doc]) -> Vec<String> {
    docs.iter().map(|d| d.id().to_string()).collect()
}

fn named(instance: &dashfields::Instance, id: &str) -> Doc {
    Doc::create(instance, Some(FieldId::new(id)))
}

#[test]
fn test_copy_is_independent() {
    let (instance, _) = setup();
    let original = Doc::new(&instance);
    let copy = original.make_copy(false, None).unwrap();

    original.set("x", 5).unwrap();
    assert!(copy.get("x").is_missing());
}

#[test]
fn test_copy_deep_copies_objects_and_shares_references() {
    let (instance, _) = setup();
    let target = Doc::new(&instance);
    let original = Doc::new(&instance);
    original.set("title", "Original").unwrap();
    original.set("link", &target).unwrap();
    original.set("items", List::from_fields([1, 2]).unwrap()).unwrap();

    let copy = original.make_copy(false, Some(FieldId::new("copy"))).unwrap();
    assert_eq!(copy.id().as_str(), "copy");
    assert_eq!(copy.title(), "Original");
    assert_eq!(copy.get("link").ready(), Some(Field::Ref(target)));

    let items = cast::<List>(copy.get("items")).ready().unwrap();
    items.push(3).unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(cast::<List>(original.get("items")).ready().unwrap().len(), 2);
}

#[test]
fn test_copy_skips_filtered_keys_and_proto() {
    let (instance, _) = setup();
    let proto = Doc::new(&instance);
    proto.set("title", "Proto").unwrap();
    let original = proto.make_delegate(None, None).unwrap();
    original.set("secret", "s").unwrap();
    original.set("cloneFieldFilter", List::from_fields(["secret"]).unwrap()).unwrap();

    let copy = original.make_copy(false, None).unwrap();
    assert!(!copy.has_own("secret"));
    assert!(!copy.has_own("proto"));
    assert!(copy.get("title").is_missing());

    let with_proto = original.make_copy(true, None).unwrap();
    let copied_proto = with_proto.proto().unwrap();
    assert!(!copied_proto.ptr_eq(&proto));
    assert_eq!(with_proto.title(), "Proto");
}

#[test]
fn test_copy_records_author() {
    let (instance, _) = setup_with_config(ModelConfig {
        current_user: Some("ann@example.com".to_string()),
        ..Default::default()
    });
    let original = Doc::new(&instance);
    let copy = original.make_copy(false, None).unwrap();
    assert_eq!(str_cast(copy.get("author")), "ann@example.com");
}

#[test]
fn test_delegate_records_author() {
    let (instance, _) = setup_with_config(ModelConfig {
        current_user: Some("ann@example.com".to_string()),
        ..Default::default()
    });
    let proto = Doc::new(&instance);
    let delegate = proto.make_delegate(None, Some("Child")).unwrap();
    assert!(delegate.has_own("author"));
    assert_eq!(str_cast(delegate.get("author")), "ann@example.com");
}

#[test]
fn test_copy_drops_expanded_layouts() {
    let (instance, _) = setup();
    let layout = Doc::new(&instance);
    layout.set("kind", "text").unwrap();
    let original = Doc::new(&instance);
    original.set("layout[text]", &layout).unwrap();
    original.set("layout", "plain").unwrap();

    let copy = original.make_copy(false, None).unwrap();
    assert!(!copy.has_own("layout[text]"));
    assert_eq!(str_cast(copy.get("layout")), "plain");
}

#[test]
fn test_alias_of_concrete_document_copies() {
    let (instance, _) = setup();
    let proto = Doc::new(&instance);
    let doc = proto.make_delegate(None, None).unwrap();
    doc.set("title", "Mine").unwrap();

    let alias = doc.make_alias(None).unwrap();
    assert!(!alias.has_own("proto"));
    assert_eq!(alias.title(), "Mine");
    assert_eq!(alias.get("aliasOf").ready(), Some(Field::Ref(doc.clone())));
    assert_eq!(doc_list_cast(proto.get("aliases")), vec![alias]);
}

#[test]
fn test_alias_of_prototype_delegates() {
    let (instance, _) = setup();
    let proto = Doc::new(&instance);
    proto.set("isPrototype", true).unwrap();
    proto.set("title", "Template").unwrap();

    let first = proto.make_alias(None).unwrap();
    let second = proto.make_alias(None).unwrap();
    assert!(first.proto().unwrap().ptr_eq(&proto));
    assert_eq!(first.title(), "Template");
    assert_eq!(doc_list_cast(proto.get("aliases")), vec![first, second]);
}

#[test]
fn test_clone_deep_copies_graph() {
    let (instance, _) = setup();
    let base = Doc::new(&instance);
    base.set("baseProto", true).unwrap();
    let proto = Doc::new(&instance);
    proto.set("proto", &base).unwrap();
    proto.set("title", "Card").unwrap();
    let child = Doc::new(&instance);
    let doc = proto.make_delegate(None, None).unwrap();
    doc.set("data", List::from_fields([&child]).unwrap()).unwrap();
    doc.set("context", "excluded").unwrap();
    doc.set("annotationOn", &child).unwrap();

    let result = doc.make_clone().unwrap();
    let clone = result.clone;

    let cloned_proto = clone.proto().unwrap();
    assert!(!cloned_proto.ptr_eq(&proto));
    assert!(cloned_proto.proto().unwrap().ptr_eq(&base));
    assert_eq!(clone.title(), "CLONE: Card");
    assert_eq!(proto.title(), "Card");

    let cloned_children = doc_list_cast(clone.get("data"));
    assert_eq!(cloned_children.len(), 1);
    assert!(!cloned_children[0].ptr_eq(&child));
    assert!(result.map.contains_key(child.id()));
    assert!(result.map.contains_key(proto.id()));
    assert!(!result.map.contains_key(base.id()));

    assert!(!clone.has_own("context"));
    assert!(!clone.has_own("annotationOn"));
    assert_eq!(clone.get("cloneOf").ready(), Some(Field::Ref(doc)));
}

#[test]
fn test_clone_shares_layout_references() {
    let (instance, _) = setup();
    let layout = Doc::new(&instance);
    let doc = Doc::new(&instance);
    doc.set("layout_main", &layout).unwrap();

    let clone = doc.make_clone().unwrap().clone;
    assert_eq!(clone.get("layout_main").ready(), Some(Field::Ref(layout)));
}

#[test]
fn test_data_doc_follows_chain_to_prototype() {
    let (instance, _) = setup();
    let root = Doc::new(&instance);
    let data = Doc::new(&instance);
    data.set("proto", &root).unwrap();
    data.set("isPrototype", true).unwrap();
    let layout = data.make_delegate(None, None).unwrap();
    let view = layout.make_delegate(None, None).unwrap();

    assert!(view.get_proto().ptr_eq(&layout));
    assert!(view.get_data_doc().ptr_eq(&data));
    assert!(data.get_data_doc().ptr_eq(&data));
    assert!(root.get_proto().ptr_eq(&root));
    assert_eq!(ids(&view.get_all_prototypes()), ids(&[view.clone(), layout, data, root]));
}

#[test]
fn test_all_keys_includes_inherited() {
    let (instance, _) = setup();
    let proto = Doc::new(&instance);
    proto.set("a", 1).unwrap();
    proto.set("b", 2).unwrap();
    let doc = proto.make_delegate(None, None).unwrap();
    doc.set("b", 3).unwrap();

    assert_eq!(doc.all_keys(), vec!["b", "proto", "a"]);
}

#[test]
fn test_assign() {
    let (instance, _) = setup();
    let doc = Doc::new(&instance);
    doc.set("keep", 1).unwrap();
    doc.set("drop", 1).unwrap();

    doc.assign([("x", Some(Field::from(2))), ("keep", None)], true).unwrap();
    assert_eq!(num_cast(doc.get("x")), 2.0);
    assert!(doc.has_own("keep"));

    doc.assign([("drop", None::<Field>)], false).unwrap();
    assert!(!doc.has_own("drop"));
}

#[test]
fn test_set_on_prototype() {
    let (instance, _) = setup();
    let proto = Doc::new(&instance);
    let doc = proto.make_delegate(None, None).unwrap();

    doc.set_on_prototype("color", "red").unwrap();
    assert_eq!(str_cast(proto.get("color")), "red");
    assert!(!doc.has_own("color"));

    proto.set("isPrototype", true).unwrap();
    proto.set_on_prototype("size", 3).unwrap();
    assert_eq!(num_cast(proto.get("size")), 3.0);

    let orphan = Doc::new(&instance);
    orphan.set_on_prototype("color", "blue").unwrap();
    assert!(!orphan.has_own("color"));
}

#[test]
fn test_set_in_place() {
    let (instance, _) = setup();
    let proto = Doc::new(&instance);
    proto.set("shared", 1).unwrap();
    let doc = proto.make_delegate(None, None).unwrap();
    doc.set("own", 1).unwrap();

    doc.set_in_place("shared", Some(Field::from(2)), false).unwrap();
    doc.set_in_place("own", Some(Field::from(2)), true).unwrap();
    doc.set_in_place("fresh", Some(Field::from(2)), false).unwrap();
    doc.set_in_place("fresh_proto", Some(Field::from(2)), true).unwrap();

    assert_eq!(num_cast(proto.get("shared")), 2.0);
    assert!(!doc.has_own("shared"));
    assert_eq!(num_cast(doc.get_own("own")), 2.0);
    assert!(doc.has_own("fresh"));
    assert!(proto.has_own("fresh_proto"));
}

#[test]
fn test_protos_equal() {
    let (instance, _) = setup();
    let proto = Doc::new(&instance);
    let a = proto.make_delegate(None, None).unwrap();
    let b = proto.make_delegate(None, None).unwrap();
    let other = Doc::new(&instance);

    assert!(a.are_protos_equal(&b));
    assert!(a.are_protos_equal(&proto));
    assert!(!a.are_protos_equal(&other));

    let docs = vec![a.clone(), other.clone(), a.clone()];
    assert_eq!(Doc::index_of(&a, &docs, false), Some(2));
    assert_eq!(Doc::index_of(&b, &docs, false), None);
    assert_eq!(Doc::index_of(&b, &docs, true), Some(2));
}

#[test]
fn test_add_doc_to_list_positions() {
    let (instance, _) = setup();
    let holder = Doc::new(&instance);
    let a = named(&instance, "a");
    let b = named(&instance, "b");
    let c = named(&instance, "c");
    let d = named(&instance, "d");

    assert!(holder.add_doc_to_list("data", &a, AddDocOptions::default()).unwrap());
    holder.add_doc_to_list("data", &c, AddDocOptions::default()).unwrap();
    holder
        .add_doc_to_list(
            "data",
            &b,
            AddDocOptions {
                relative_to: Some(c.clone()),
                before: true,
                ..Default::default()
            },
        )
        .unwrap();
    holder
        .add_doc_to_list(
            "data",
            &d,
            AddDocOptions {
                first: true,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(ids(&doc_list_cast(holder.get("data"))), vec!["d", "a", "b", "c"]);

    // Re-adding moves rather than duplicates.
    holder.add_doc_to_list("data", &d, AddDocOptions::default()).unwrap();
    assert_eq!(ids(&doc_list_cast(holder.get("data"))), vec!["a", "b", "c", "d"]);

    holder
        .add_doc_to_list(
            "data",
            &a,
            AddDocOptions {
                allow_duplicates: true,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(doc_list_cast(holder.get("data")).len(), 5);
}

#[test]
fn test_add_doc_to_reversed_list() {
    let (instance, _) = setup();
    let holder = Doc::new(&instance);
    let a = named(&instance, "a");
    let b = named(&instance, "b");
    let reversed = AddDocOptions {
        reversed: true,
        ..Default::default()
    };

    holder.add_doc_to_list("data", &a, reversed.clone()).unwrap();
    holder.add_doc_to_list("data", &b, reversed).unwrap();
    assert_eq!(ids(&doc_list_cast(holder.get("data"))), vec!["b", "a"]);
}

#[test]
fn test_add_doc_to_non_list_is_refused() {
    let (instance, _) = setup();
    let holder = Doc::new(&instance);
    holder.set("data", "not a list").unwrap();
    let doc = Doc::new(&instance);
    assert!(!holder.add_doc_to_list("data", &doc, AddDocOptions::default()).unwrap());
    assert!(!holder.remove_doc_from_list("data", &doc).unwrap());
}

#[test]
fn test_list_is_created_on_prototype() {
    let (instance, _) = setup();
    let proto = Doc::new(&instance);
    let doc = proto.make_delegate(None, None).unwrap();
    let item = Doc::new(&instance);

    doc.add_doc_to_list("data", &item, AddDocOptions::default()).unwrap();
    assert!(proto.has_own("data"));
    assert!(!doc.has_own("data"));

    assert!(doc.remove_doc_from_list("data", &item).unwrap());
    assert!(!doc.remove_doc_from_list("data", &item).unwrap());
    assert!(doc_list_cast(proto.get("data")).is_empty());
}

#[test]
fn test_overwrite() {
    let (instance, _) = setup();
    let source_proto = Doc::new(&instance);
    source_proto.set("shape", "round").unwrap();
    let source = source_proto.make_delegate(None, None).unwrap();
    source.set("title", "Source").unwrap();
    source.set("header", SchemaHeaderField::new("H", "#fff")).unwrap();

    let target_proto = Doc::new(&instance);
    let target = target_proto.make_delegate(None, None).unwrap();
    source.overwrite(&target, true).unwrap();

    assert_eq!(target.title(), "Source");
    assert!(target.proto().unwrap().ptr_eq(&target_proto));
    assert_eq!(str_cast(target_proto.get("shape")), "round");
    let header = |doc: &Doc| cast::<SchemaHeaderField>(doc.get("header")).ready().unwrap();
    let (original, copied) = (header(&source), header(&target));
    assert!(!original.ptr_eq(&copied));
    assert!(original.same_content(&copied));

    let relinked = Doc::new(&instance);
    source.overwrite(&relinked, false).unwrap();
    assert!(relinked.proto().unwrap().ptr_eq(&source_proto));
}
