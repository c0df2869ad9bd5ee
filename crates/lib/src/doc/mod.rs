//! Documents: schema-less field maps with prototype inheritance.
//!
//! A [`Doc`] maps string keys to [`Field`]s. Reading a key that is not set on
//! the document falls through to the document's `proto` chain. Writes always land
//! on the document they are made on, and each accepted write
//!
//! - emits a [`Diff`] to the backend (unless it came from the backend),
//! - offers one undo event to the instance's history,
//! - notifies observers of the key.
//!
//! Document references are stored behind [`ProxyField`]s, so reading through an
//! unloaded reference gives [`FieldResult::Pending`].

use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::{Arc, Weak},
};

use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::{
    Result,
    backend::Diff,
    field::{CastTarget, Field, FieldError, FieldResult, cast, num_cast, str_cast},
    history::UndoEvent,
    id::FieldId,
    instance::Instance,
    object::{ObjectField, Owner},
};

mod observe;
mod ops;

pub use observe::{ChangeKind, FieldChange, SubscriptionId};
pub(crate) use observe::{ChangeCallback, Observer};
pub use ops::{AddDocOptions, CloneResult};

/// Where a write came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    /// Made through this instance; sent to the backend.
    Local,
    /// Applied from a backend diff; not sent back.
    Remote,
}

pub(crate) struct DocInner {
    id: FieldId,
    instance: Instance,
    fields: RwLock<HashMap<String, Field>>,
}

/// A document handle. Clones refer to the same document.
#[derive(Clone)]
pub struct Doc(Arc<DocInner>);

/// A non-owning document handle.
#[derive(Clone)]
pub struct WeakDoc(Weak<DocInner>);

impl WeakDoc {
    pub fn upgrade(&self) -> Option<Doc> {
        self.0.upgrade().map(Doc)
    }

    pub fn ptr_eq(&self, other: &WeakDoc) -> bool {
        Weak::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for WeakDoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(doc) => write!(f, "WeakDoc({})", doc.id()),
            None => f.write_str("WeakDoc(<dropped>)"),
        }
    }
}

impl Doc {
    /// Creates a document with a fresh id and announces it to the backend.
    pub fn new(instance: &Instance) -> Self {
        Self::create(instance, None)
    }

    /// Creates a document with the given id, or a fresh one. If a document with the
    /// id is already resident, that document is returned.
    pub fn create(instance: &Instance, id: Option<FieldId>) -> Self {
        let id = id.unwrap_or_else(FieldId::generate);
        if let Some(existing) = instance.cached_ref_field(&id) {
            tracing::debug!(doc_id = %id, "Document already resident");
            return existing;
        }
        let doc = Self::reconstitute(instance, id);
        instance.register_resident(&doc);
        instance.announce(&doc);
        doc
    }

    /// A document object for an id without registering or announcing it.
    pub(crate) fn reconstitute(instance: &Instance, id: FieldId) -> Self {
        Self(Arc::new(DocInner {
            id,
            instance: instance.clone(),
            fields: RwLock::new(HashMap::new()),
        }))
    }

    pub fn id(&self) -> &FieldId {
        &self.0.id
    }

    pub fn instance(&self) -> &Instance {
        &self.0.instance
    }

    pub fn downgrade(&self) -> WeakDoc {
        WeakDoc(Arc::downgrade(&self.0))
    }

    pub fn ptr_eq(&self, other: &Doc) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Reads `key`, falling through the prototype chain.
    pub fn get(&self, key: &str) -> FieldResult {
        self.get_field(key, false)
    }

    /// Reads `key` from this document only.
    pub fn get_own(&self, key: &str) -> FieldResult {
        self.get_field(key, true)
    }

    pub fn get_field(&self, key: &str, ignore_proto: bool) -> FieldResult {
        self.lookup(key, ignore_proto, true, self, &mut HashSet::new())
    }

    /// Reads `key` like [`get`](Self::get) but returns computed fields themselves
    /// instead of evaluating them.
    pub fn get_uncomputed(&self, key: &str) -> FieldResult {
        self.lookup(key, false, false, self, &mut HashSet::new())
    }

    /// Delivers `doc[key]` to `callback`, now or once it has loaded.
    pub fn get_with(
        &self,
        key: &str,
        ignore_proto: bool,
        callback: impl FnOnce(Option<Field>) + Send + 'static,
    ) {
        self.get_field(key, ignore_proto).then(callback)
    }

    /// Reads `key` narrowed to `T`, if available now.
    pub fn get_as<T: CastTarget>(&self, key: &str) -> Option<T> {
        cast(self.get(key)).ready()
    }

    /// The stored value of `key` on this document: no fallthrough, proxies not
    /// resolved, computed fields not evaluated.
    pub fn get_raw(&self, key: &str) -> Option<Field> {
        self.0.fields.read().get(key).cloned()
    }

    /// True if `key` is set on this document itself.
    pub fn has_own(&self, key: &str) -> bool {
        self.0.fields.read().contains_key(key)
    }

    fn lookup(
        &self,
        key: &str,
        ignore_proto: bool,
        evaluate: bool,
        receiver: &Doc,
        visited: &mut HashSet<FieldId>,
    ) -> FieldResult {
        if !visited.insert(self.id().clone()) {
            tracing::warn!(doc_id = %self.id(), key, "Prototype cycle while reading field");
            return FieldResult::Missing;
        }
        if let Some(field) = self.get_raw(key) {
            return resolve_stored(field, evaluate, receiver);
        }
        if ignore_proto || key == "proto" || self.is_prototype() {
            return FieldResult::Missing;
        }
        match self.proto_field() {
            FieldResult::Ready(proto) => proto.lookup(key, false, evaluate, receiver, visited),
            FieldResult::Pending(pending) => {
                let key = key.to_string();
                let receiver = receiver.clone();
                FieldResult::Pending(pending.and_then(move |proto| {
                    proto.lookup(&key, false, evaluate, &receiver, &mut HashSet::new())
                }))
            }
            FieldResult::Missing => FieldResult::Missing,
        }
    }

    /// The prototype, which may still be loading.
    pub fn proto_field(&self) -> FieldResult<Doc> {
        match self.get_raw("proto") {
            Some(Field::Object(ObjectField::Proxy(proxy))) => proxy.value(),
            _ => FieldResult::Missing,
        }
    }

    /// The prototype, if it is loaded.
    pub fn proto(&self) -> Option<Doc> {
        self.proto_field().ready()
    }

    /// The prototype if it is loaded, without requesting it.
    pub(crate) fn cached_proto(&self) -> Option<Doc> {
        match self.get_raw("proto") {
            Some(Field::Object(ObjectField::Proxy(proxy))) => proxy.cached(),
            _ => None,
        }
    }

    /// Starts loading the prototype.
    pub(crate) fn prefetch_proto(&self) {
        if let Some(Field::Object(ObjectField::Proxy(proxy))) = self.get_raw("proto") {
            let _ = proxy.value();
        }
    }

    /// Writes `key`.
    pub fn set(&self, key: &str, value: impl Into<Field>) -> Result<()> {
        self.write(key, Some(value.into()), Origin::Local)
    }

    /// Writes `key`, or removes it when `value` is `None`.
    pub fn set_opt(&self, key: &str, value: Option<Field>) -> Result<()> {
        self.write(key, value, Origin::Local)
    }

    /// Removes `key` from this document. Inherited values become visible again.
    pub fn remove(&self, key: &str) -> Result<()> {
        self.write(key, None, Origin::Local)
    }

    pub(crate) fn write(&self, key: &str, value: Option<Field>, origin: Origin) -> Result<()> {
        let instance = self.instance();
        if origin == Origin::Local && instance.is_read_only() {
            return Err(FieldError::ReadOnly {
                key: key.to_string(),
            }
            .into());
        }

        let current = self.get_raw(key);
        if Field::same_stored(current.as_ref(), value.as_ref()) {
            return Ok(());
        }

        let stored = value.map(Field::into_stored);
        // Serialize and claim ownership before anything is changed.
        let payload = match &stored {
            Some(field) => Some(instance.registry().serialize(field)?),
            None => None,
        };
        if let Some(Field::Object(obj)) = &stored {
            obj.attach(Owner::Doc(self.downgrade()), key)?;
        }
        if let Some(Field::Object(previous)) = &current {
            let kept = matches!(&stored, Some(Field::Object(obj)) if obj.ptr_eq(previous));
            if !kept {
                previous.base().unbind();
            }
        }

        {
            let mut fields = self.0.fields.write();
            match &stored {
                Some(field) => {
                    fields.insert(key.to_string(), field.clone());
                }
                None => {
                    fields.remove(key);
                }
            }
        }
        tracing::trace!(doc_id = %self.id(), key, ?origin, "Field written");

        if origin == Origin::Local {
            let diff = match payload {
                Some(payload) => Diff::set_field(key, payload),
                None => Diff::unset_field(key),
            };
            instance.push_update(self.id(), &diff);
        }

        instance.record_undo(self.restore_event(key, current, stored.clone()));

        let kind = if stored.is_some() {
            ChangeKind::Set
        } else {
            ChangeKind::Removed
        };
        self.emit_change(key, kind);
        Ok(())
    }

    /// Undo event that puts `before` back, with `after` as the redo value.
    fn restore_event(&self, key: &str, before: Option<Field>, after: Option<Field>) -> UndoEvent {
        let (undo_doc, redo_doc) = (self.clone(), self.clone());
        let (undo_key, redo_key) = (key.to_string(), key.to_string());
        UndoEvent::new(
            move || {
                if let Err(e) = undo_doc.set_opt(&undo_key, before.clone()) {
                    tracing::warn!(doc_id = %undo_doc.id(), key = %undo_key, "Undo failed: {e}");
                }
            },
            move || {
                if let Err(e) = redo_doc.set_opt(&redo_key, after.clone()) {
                    tracing::warn!(doc_id = %redo_doc.id(), key = %redo_key, "Redo failed: {e}");
                }
            },
        )
    }

    /// Reports an in-place mutation of the embedded object stored under `key`.
    pub(crate) fn object_updated(&self, key: &str, obj: &ObjectField) {
        let is_current =
            matches!(self.get_raw(key), Some(Field::Object(current)) if current.ptr_eq(obj));
        if !is_current {
            return;
        }
        let instance = self.instance();
        match instance.registry().serialize(&Field::Object(obj.clone())) {
            Ok(payload) => instance.push_update(self.id(), &Diff::set_field(key, payload)),
            Err(e) => {
                tracing::error!(doc_id = %self.id(), key, "Failed to serialize updated field: {e}")
            }
        }

        let after = obj.copy();
        if let Some(before) = obj.base().swap_snapshot(after.clone()) {
            instance.record_undo(self.restore_event(
                key,
                Some(Field::Object(before)),
                Some(Field::Object(after)),
            ));
        }
        self.emit_change(key, ChangeKind::Updated);
    }

    pub(crate) fn emit_change(&self, key: &str, kind: ChangeKind) {
        self.instance().emit(&FieldChange {
            doc: self.clone(),
            key: key.to_string(),
            kind,
        });
    }

    /// Keys set on this document itself, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.0.fields.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Snapshot of the fields set on this document, in storage form.
    pub fn fields(&self) -> HashMap<String, Field> {
        self.0.fields.read().clone()
    }

    /// Removes every key set on this document, one write per key.
    pub fn clear_fields(&self) -> Result<()> {
        for key in self.keys() {
            self.remove(&key)?;
        }
        Ok(())
    }

    pub fn width(&self) -> f64 {
        num_cast(self.get("_width"))
    }

    pub fn height(&self) -> f64 {
        num_cast(self.get("_height"))
    }

    pub fn title(&self) -> String {
        str_cast(self.get("title"))
    }

    /// True if `isPrototype` is set on this document itself.
    pub fn is_prototype(&self) -> bool {
        self.own_flag("isPrototype")
    }

    pub fn is_base_proto(&self) -> bool {
        self.own_flag("baseProto")
    }

    pub fn is_system(&self) -> bool {
        self.own_flag("system")
    }

    fn own_flag(&self, key: &str) -> bool {
        matches!(self.get_raw(key), Some(Field::Bool(true)))
    }

    pub fn to_script_string(&self) -> String {
        format!("DOC-\"{}\"-", self.id())
    }

    /// Applies a diff received from the backend.
    ///
    /// Every entry goes through the normal write path, so ownership checks,
    /// undo recording and observers behave as for local writes; nothing is sent
    /// back to the backend. All entries are attempted; the first error is returned.
    pub fn handle_update(&self, diff: &Diff) -> Result<()> {
        let instance = self.instance();
        let mut first_error = None;
        let mut record = |result: Result<()>, key: &str| {
            if let Err(e) = result {
                tracing::warn!(doc_id = %self.id(), key, "Failed to apply remote update: {e}");
                first_error.get_or_insert(e);
            }
        };

        for (key, value) in diff.field_sets() {
            let result = instance
                .registry()
                .deserialize(value, instance)
                .and_then(|field| self.write(key, field, Origin::Remote));
            record(result, key);
        }
        for key in diff.field_unsets() {
            record(self.write(key, None, Origin::Remote), key);
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Rebuilds a document from its serialized form. An already resident document
    /// with the same id is returned unchanged.
    pub(crate) fn from_json(map: &Map<String, Value>, instance: &Instance) -> Result<Doc> {
        let id = map
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| FieldError::DeserializationFailed {
                type_tag: "Doc".to_string(),
                reason: "missing 'id'".to_string(),
            })?;
        let id = FieldId::from(id);
        if let Some(doc) = instance.cached_ref_field(&id) {
            return Ok(doc);
        }

        let doc = Self::reconstitute(instance, id);
        // Resident before the fields are read so references back to it resolve.
        instance.register_resident(&doc);
        if let Err(e) = doc.fill_from_json(map, instance) {
            instance.forget_resident(doc.id());
            return Err(e);
        }
        tracing::debug!(doc_id = %doc.id(), "Loaded document");
        Ok(doc)
    }

    fn fill_from_json(&self, map: &Map<String, Value>, instance: &Instance) -> Result<()> {
        let Some(fields) = map.get("fields").and_then(Value::as_object) else {
            return Ok(());
        };
        for (key, value) in fields {
            let Some(field) = instance.registry().deserialize(value, instance)? else {
                continue;
            };
            let field = field.into_stored();
            if let Field::Object(obj) = &field {
                obj.attach(Owner::Doc(self.downgrade()), key)?;
            }
            self.0.fields.write().insert(key.clone(), field);
        }
        Ok(())
    }
}

/// Turns a stored value into what a read returns.
fn resolve_stored(field: Field, evaluate: bool, receiver: &Doc) -> FieldResult {
    match field {
        Field::Object(ObjectField::Proxy(proxy)) => {
            proxy.value().map(|doc| Some(Field::Ref(doc)))
        }
        Field::Object(ObjectField::Computed(computed)) if evaluate => {
            computed.value(receiver).into()
        }
        other => FieldResult::Ready(other),
    }
}

impl PartialEq for Doc {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Doc {}

impl fmt::Debug for Doc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Doc").field(&self.id().as_str()).finish()
    }
}

impl fmt::Display for Doc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Doc({})", self.title())
    }
}
