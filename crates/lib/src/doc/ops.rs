//! Derivation and bookkeeping operations on documents.
//!
//! Delegates, copies, aliases and clones are the ways one document is derived
//! from another:
//!
//! - a *delegate* is an empty document whose `proto` is the original, so it
//!   inherits everything and stores only overrides;
//! - a *copy* duplicates the original's own fields (references are shared,
//!   embedded objects are deep-copied);
//! - an *alias* is a copy of a concrete document or a delegate of a prototype;
//! - a *clone* deep-copies a whole resident document graph.

use std::collections::{HashMap, HashSet};

use crate::{
    Result,
    doc::Doc,
    field::{Field, FieldResult, str_list_cast},
    id::FieldId,
    object::{List, ObjectField, ObjectFieldKind},
};

/// Where [`Doc::add_doc_to_list`] inserts a document.
#[derive(Debug, Clone, Default)]
pub struct AddDocOptions {
    /// Insert next to this document, if it is in the list.
    pub relative_to: Option<Doc>,
    /// Insert before `relative_to` instead of after it.
    pub before: bool,
    /// Insert at the front. Takes precedence over `relative_to`.
    pub first: bool,
    /// Keep existing occurrences of the same logical document.
    pub allow_duplicates: bool,
    /// The list is displayed back to front; positions are mirrored.
    pub reversed: bool,
}

/// Result of [`Doc::make_clone`].
#[derive(Debug, Clone)]
pub struct CloneResult {
    pub clone: Doc,
    /// Original document id to its clone, for every document cloned.
    pub map: HashMap<FieldId, Doc>,
}

/// Keys never carried over by [`Doc::make_clone`].
const CLONE_EXCLUSIONS: &[&str] = &["context", "annotationOn", "cloneOf"];

impl Doc {
    /// The document that holds this document's shared metadata: itself if it is a
    /// prototype or has no loaded prototype, otherwise its prototype.
    pub fn get_proto(&self) -> Doc {
        if self.is_prototype() {
            return self.clone();
        }
        self.proto().unwrap_or_else(|| self.clone())
    }

    /// Follows [`get_proto`](Self::get_proto) until it stops changing.
    pub fn get_data_doc(&self) -> Doc {
        let mut visited = HashSet::new();
        let mut current = self.clone();
        loop {
            if !visited.insert(current.id().clone()) {
                tracing::warn!(doc_id = %self.id(), "Prototype cycle while finding data document");
                return current;
            }
            let next = current.get_proto();
            if next.ptr_eq(&current) {
                return current;
            }
            current = next;
        }
    }

    /// This document followed by every loaded prototype up the chain.
    pub fn get_all_prototypes(&self) -> Vec<Doc> {
        let mut visited = HashSet::new();
        let mut protos = Vec::new();
        let mut current = Some(self.clone());
        while let Some(doc) = current {
            if !visited.insert(doc.id().clone()) {
                break;
            }
            current = doc.proto();
            protos.push(doc);
        }
        protos
    }

    /// Every key readable on this document: its own keys, then keys inherited
    /// through loaded prototypes.
    pub fn all_keys(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        for doc in self.get_all_prototypes() {
            for key in doc.keys() {
                if seen.insert(key.clone()) {
                    keys.push(key);
                }
            }
        }
        keys
    }

    /// Writes every entry of `fields`. `None` removes the key unless
    /// `skip_undefineds` is set, in which case it is ignored.
    pub fn assign<K, I>(&self, fields: I, skip_undefineds: bool) -> Result<&Self>
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, Option<Field>)>,
    {
        for (key, value) in fields {
            if skip_undefineds && value.is_none() {
                continue;
            }
            self.set_opt(key.as_ref(), value)?;
        }
        Ok(self)
    }

    /// Writes `key` on the prototype, or on this document if it is itself a
    /// prototype. Does nothing if there is no loaded prototype.
    pub fn set_on_prototype(&self, key: &str, value: impl Into<Field>) -> Result<()> {
        let target = if self.has_own("isPrototype") {
            Some(self.clone())
        } else {
            self.proto()
        };
        match target {
            Some(target) => target.set(key, value),
            None => Ok(()),
        }
    }

    /// Writes `key` wherever it currently lives: on this document if it is set
    /// here or there is no prototype, on the prototype if it is set there. A key
    /// set on neither goes to the prototype when `default_proto` is true.
    pub fn set_in_place(&self, key: &str, value: Option<Field>, default_proto: bool) -> Result<()> {
        let proto = self.proto();
        let on_delegate = self.has_own(key);
        let on_proto = proto.as_ref().is_some_and(|proto| proto.has_own(key));
        match proto {
            Some(proto) if !on_delegate && (on_proto || default_proto) => proto.set_opt(key, value),
            _ => self.set_opt(key, value),
        }
    }

    /// True if the documents are the same, one is the other's prototype, or they
    /// share a prototype.
    pub fn are_protos_equal(&self, other: &Doc) -> bool {
        self.ptr_eq(other)
            || self.get_proto().ptr_eq(other)
            || other.get_proto().ptr_eq(self)
            || self.get_proto().ptr_eq(&other.get_proto())
    }

    /// Position of the last occurrence of `to_find` in `docs`. When it is absent and
    /// `allow_protos` is set, the last document that [`are_protos_equal`]
    /// `to_find` is used instead.
    ///
    /// [`are_protos_equal`]: Self::are_protos_equal
    pub fn index_of(to_find: &Doc, docs: &[Doc], allow_protos: bool) -> Option<usize> {
        docs.iter().rposition(|doc| doc.ptr_eq(to_find)).or_else(|| {
            if allow_protos {
                docs.iter().rposition(|doc| doc.are_protos_equal(to_find))
            } else {
                None
            }
        })
    }

    /// The list stored under `key`, created on [`get_proto`](Self::get_proto) if
    /// the key reads as absent.
    fn list_field(&self, key: &str) -> Result<Option<List>> {
        if self.get(key).is_missing() {
            self.get_proto().set(key, List::new())?;
        }
        Ok(match self.get(key) {
            FieldResult::Ready(Field::Object(ObjectField::List(list))) => Some(list),
            _ => None,
        })
    }

    /// Inserts `doc` into the list under `key`. Returns false if `key` holds
    /// something other than a list.
    pub fn add_doc_to_list(&self, key: &str, doc: &Doc, options: AddDocOptions) -> Result<bool> {
        let Some(list) = self.list_field(key)? else {
            return Ok(false);
        };

        if !options.allow_duplicates {
            let existing = list.iter().rposition(|item| {
                matches!(item, FieldResult::Ready(Field::Ref(other)) if other.are_protos_equal(doc))
            });
            if let Some(index) = existing {
                list.remove(index);
            }
        }

        if options.first {
            list.insert(0, doc)?;
            return Ok(true);
        }
        let relative = options
            .relative_to
            .as_ref()
            .and_then(|relative| list.index_of(&Field::Ref(relative.clone())));
        let len = list.len();
        let index = match relative {
            None if options.reversed => 0,
            None => len,
            Some(index) if options.reversed => {
                if options.before {
                    (len - index + 1).min(len)
                } else {
                    len - index
                }
            }
            Some(index) => {
                if options.before {
                    index
                } else {
                    index + 1
                }
            }
        };
        list.insert(index, doc)?;
        Ok(true)
    }

    /// Removes the first occurrence of `doc` from the list under `key`. Returns
    /// true if it was found.
    pub fn remove_doc_from_list(&self, key: &str, doc: &Doc) -> Result<bool> {
        let Some(list) = self.list_field(key)? else {
            return Ok(false);
        };
        match list.index_of(&Field::Ref(doc.clone())) {
            Some(index) => {
                list.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Writes this document's own fields onto `target`. With `copy_proto`, the
    /// prototypes are overwritten recursively instead of relinking `target`.
    pub fn overwrite(&self, target: &Doc, copy_proto: bool) -> Result<()> {
        for (key, field) in self.fields() {
            if key == "proto" && copy_proto {
                if let (Some(proto), Some(target_proto)) = (self.proto(), target.proto()) {
                    proto.overwrite(&target_proto, false)?;
                }
                continue;
            }
            target.set(&key, copy_value(&field))?;
        }
        Ok(())
    }

    /// A new document with copies of this document's own fields.
    ///
    /// References are shared and embedded objects are deep-copied. Keys listed in
    /// the `cloneFieldFilter` string list are skipped, as are references under
    /// expanded `layout[...]` keys. The prototype link is only
    /// carried over when `copy_proto` is set, in which case the prototype itself is
    /// copied too.
    pub fn make_copy(&self, copy_proto: bool, id: Option<FieldId>) -> Result<Doc> {
        let copy = Doc::create(self.instance(), id);
        let exclude = str_list_cast(self.get("cloneFieldFilter"));
        for (key, field) in self.fields() {
            if exclude.contains(&key) {
                continue;
            }
            if key == "proto" {
                if copy_proto {
                    if let Some(proto) = self.proto() {
                        copy.set("proto", proto.make_copy(false, None)?)?;
                    }
                }
                continue;
            }
            // Expanded template layouts belong to the source document.
            if key.contains("layout[") && matches!(field, Field::Object(ObjectField::Proxy(_))) {
                continue;
            }
            copy.set(&key, copy_value(&field))?;
        }
        self.stamp_author(&copy)?;
        tracing::debug!(doc_id = %self.id(), copy_id = %copy.id(), "Copied document");
        Ok(copy)
    }

    /// A new, empty document that inherits everything from this one.
    pub fn make_delegate(&self, id: Option<FieldId>, title: Option<&str>) -> Result<Doc> {
        let delegate = Doc::create(self.instance(), id);
        delegate.set("proto", self)?;
        self.stamp_author(&delegate)?;
        if let Some(title) = title {
            delegate.set("title", title)?;
        }
        Ok(delegate)
    }

    /// A copy of a concrete document, or a delegate of a prototype (or of a
    /// document without a prototype). The alias records `aliasOf`, and the data
    /// document lists it under `aliases`.
    pub fn make_alias(&self, id: Option<FieldId>) -> Result<Doc> {
        let terminal = self.is_prototype() || self.get_raw("proto").is_none();
        let alias = if terminal {
            self.make_delegate(id, None)?
        } else {
            self.make_copy(false, id)?
        };
        alias.set("aliasOf", self)?;
        self.stamp_author(&alias)?;
        self.get_data_doc().add_doc_to_list(
            "aliases",
            &alias,
            AddDocOptions {
                allow_duplicates: true,
                ..Default::default()
            },
        )?;
        Ok(alias)
    }

    /// Deep-clones this document and every loaded document it references, sharing
    /// base prototypes.
    pub fn make_clone(&self) -> Result<CloneResult> {
        let mut map = HashMap::new();
        let clone = clone_doc(self, &mut map)?;
        Ok(CloneResult { clone, map })
    }

    fn stamp_author(&self, doc: &Doc) -> Result<()> {
        if let Some(user) = &self.instance().config().current_user {
            doc.set("author", user.as_str())?;
        }
        Ok(())
    }
}

/// Value to write when copying `field` to another document.
fn copy_value(field: &Field) -> Field {
    if let Field::Object(ObjectField::Proxy(proxy)) = field {
        if let Some(doc) = proxy.cached() {
            return Field::Ref(doc);
        }
    }
    match field {
        Field::Object(obj) => Field::Object(obj.copy()),
        other => other.clone(),
    }
}

fn clone_doc(doc: &Doc, map: &mut HashMap<FieldId, Doc>) -> Result<Doc> {
    if doc.is_base_proto() {
        return Ok(doc.clone());
    }
    if let Some(existing) = map.get(doc.id()) {
        return Ok(existing.clone());
    }
    let copy = Doc::new(doc.instance());
    map.insert(doc.id().clone(), copy.clone());

    let filter = str_list_cast(doc.get("cloneFieldFilter"));
    for (key, field) in doc.fields() {
        if CLONE_EXCLUSIONS.contains(&key.as_str()) || filter.contains(&key) {
            continue;
        }
        let value = match &field {
            Field::Object(ObjectField::Proxy(proxy)) => match proxy.cached() {
                Some(target) if key == "proto" || !key.starts_with("layout") => {
                    Field::Ref(clone_doc(&target, map)?)
                }
                Some(target) => Field::Ref(target),
                None => {
                    tracing::debug!(doc_id = %doc.id(), key = %key, "Reference not loaded; sharing it in clone");
                    copy_value(&field)
                }
            },
            Field::Object(ObjectField::List(list)) => {
                let items = list.raw_items();
                if items.iter().any(|item| matches!(item, Field::Object(ObjectField::Proxy(_)))) {
                    let cloned = List::new();
                    for item in &items {
                        let value = match item {
                            Field::Object(ObjectField::Proxy(proxy)) => match proxy.cached() {
                                Some(target) => Field::Ref(clone_doc(&target, map)?),
                                None => copy_value(item),
                            },
                            other => copy_value(other),
                        };
                        cloned.push(value)?;
                    }
                    Field::Object(ObjectField::List(cloned))
                } else {
                    Field::Object(ObjectField::List(list.copy()))
                }
            }
            other => copy_value(other),
        };
        copy.set(&key, value)?;
    }

    let title = format!("CLONE: {}", doc.title());
    copy.set_in_place("title", Some(Field::from(title)), true)?;
    copy.set("cloneOf", doc)?;
    Ok(copy)
}
