//! Lazily resolved references to documents.

use std::{fmt, sync::Arc};

use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::{
    Result,
    doc::{ChangeKind, Doc},
    field::{FieldError, FieldResult, Pending},
    id::FieldId,
    instance::Instance,
    object::{ObjectBase, ObjectFieldKind},
    serialization::Registry,
};

type Waiter = Box<dyn FnOnce(Option<Doc>) + Send>;

#[derive(Default)]
struct ProxyState {
    cache: Option<Doc>,
    failed: bool,
    requested: bool,
    waiters: Vec<Waiter>,
}

struct ProxyInner {
    base: ObjectBase,
    field_id: FieldId,
    instance: Instance,
    prefetch: bool,
    state: Mutex<ProxyState>,
}

/// A reference to a document that may not be loaded yet.
///
/// Reading a proxy never blocks. The first read of an unloaded reference asks the
/// instance for the document; concurrent reads share that request. A reference
/// whose document does not exist resolves to absent and stays absent.
#[derive(Clone)]
pub struct ProxyField(Arc<ProxyInner>);

impl ProxyField {
    /// A proxy for a document that is already loaded.
    pub fn from_doc(doc: &Doc) -> Self {
        Self::build(doc.instance().clone(), doc.id().clone(), Some(doc.clone()), false)
    }

    /// A proxy for the document with `id`, loaded on first read unless it is already
    /// resident.
    pub fn from_id(instance: &Instance, id: impl Into<FieldId>) -> Self {
        let id = id.into();
        let cache = instance.cached_ref_field(&id);
        Self::build(instance.clone(), id, cache, false)
    }

    /// A proxy that starts loading its document as soon as it is deserialized.
    /// Prefetch proxies may be shared between containers.
    pub fn prefetch(instance: &Instance, id: impl Into<FieldId>) -> Self {
        let id = id.into();
        let cache = instance.cached_ref_field(&id);
        Self::build(instance.clone(), id, cache, true)
    }

    fn build(instance: Instance, field_id: FieldId, cache: Option<Doc>, prefetch: bool) -> Self {
        Self(Arc::new(ProxyInner {
            base: ObjectBase::new(),
            field_id,
            instance,
            prefetch,
            state: Mutex::new(ProxyState {
                cache,
                ..Default::default()
            }),
        }))
    }

    /// Id of the referenced document.
    pub fn id(&self) -> &FieldId {
        &self.0.field_id
    }

    pub fn is_prefetch(&self) -> bool {
        self.0.prefetch
    }

    /// The referenced document if it is loaded, without requesting it.
    pub fn cached(&self) -> Option<Doc> {
        self.0.state.lock().cache.clone()
    }

    /// True once the document has been reported as nonexistent.
    pub fn is_failed(&self) -> bool {
        self.0.state.lock().failed
    }

    /// The id to request if this reference has not been loaded, failed or
    /// requested yet.
    pub fn promised_id(&self) -> Option<&FieldId> {
        let state = self.0.state.lock();
        if state.cache.is_none() && !state.failed && !state.requested {
            Some(&self.0.field_id)
        } else {
            None
        }
    }

    /// The referenced document, requesting it if needed.
    pub fn value(&self) -> FieldResult<Doc> {
        {
            let state = self.0.state.lock();
            if let Some(doc) = &state.cache {
                return FieldResult::Ready(doc.clone());
            }
            if state.failed {
                return FieldResult::Missing;
            }
            if state.requested {
                return FieldResult::Pending(Pending::of(self.clone()));
            }
        }

        if let Some(doc) = self.0.instance.cached_ref_field(&self.0.field_id) {
            self.0.state.lock().cache = Some(doc.clone());
            return FieldResult::Ready(doc);
        }

        self.0.state.lock().requested = true;
        tracing::trace!(field_id = %self.0.field_id, "Requesting referenced document");
        let proxy = self.clone();
        self.0
            .instance
            .request_ref_field(&self.0.field_id, Box::new(move |doc| proxy.set_value(doc)));

        // A synchronous backend may already have answered.
        let state = self.0.state.lock();
        match &state.cache {
            Some(doc) => FieldResult::Ready(doc.clone()),
            None if state.failed => FieldResult::Missing,
            None => FieldResult::Pending(Pending::of(self.clone())),
        }
    }

    /// Runs `callback` with the document, now or once it has loaded.
    pub fn value_with(&self, callback: impl FnOnce(Option<Doc>) + Send + 'static) {
        self.value().then(callback)
    }

    /// Completes the reference. `None` marks it as permanently absent.
    pub fn set_value(&self, doc: Option<Doc>) {
        let waiters = {
            let mut state = self.0.state.lock();
            state.cache = doc.clone();
            state.failed = doc.is_none();
            state.requested = false;
            std::mem::take(&mut state.waiters)
        };
        if doc.is_none() {
            tracing::debug!(field_id = %self.0.field_id, "Referenced document does not exist");
        }
        for waiter in waiters {
            waiter(doc.clone());
        }
        if doc.is_some() {
            if let Some((owner, key)) = self.0.base.owning_doc() {
                owner.emit_change(&key, ChangeKind::Resolved);
            }
        }
    }

    /// Registers `callback` for when the reference completes, starting the request
    /// if nothing has asked for it yet.
    pub(crate) fn on_resolved(&self, callback: Waiter) {
        let mut state = self.0.state.lock();
        let resolved = match &state.cache {
            Some(doc) => Some(Some(doc.clone())),
            None if state.failed => Some(None),
            None => None,
        };
        match resolved {
            Some(doc) => {
                drop(state);
                callback(doc);
            }
            None => {
                state.waiters.push(callback);
                let requested = state.requested;
                drop(state);
                if !requested {
                    let _ = self.value();
                }
            }
        }
    }

    /// Fills the cache from the resident documents after deserialization.
    pub(crate) fn adopt_resident(&self) {
        if let Some(doc) = self.0.instance.cached_ref_field(&self.0.field_id) {
            let mut state = self.0.state.lock();
            if state.cache.is_none() {
                state.cache = Some(doc);
            }
        }
    }

    pub(crate) fn from_json(
        map: &Map<String, Value>,
        instance: &Instance,
        prefetch: bool,
    ) -> Result<Self> {
        let id = map.get("fieldId").and_then(Value::as_str).ok_or_else(|| {
            FieldError::DeserializationFailed {
                type_tag: if prefetch { "prefetch_proxy" } else { "proxy" }.to_string(),
                reason: "missing 'fieldId'".to_string(),
            }
        })?;
        Ok(if prefetch {
            Self::prefetch(instance, id)
        } else {
            Self::from_id(instance, id)
        })
    }
}

impl ObjectFieldKind for ProxyField {
    fn type_tag(&self) -> &'static str {
        if self.0.prefetch {
            "prefetch_proxy"
        } else {
            "proxy"
        }
    }

    fn base(&self) -> &ObjectBase {
        &self.0.base
    }

    fn copy(&self) -> Self {
        let cache = self.cached();
        Self::build(
            self.0.instance.clone(),
            self.0.field_id.clone(),
            cache,
            self.0.prefetch,
        )
    }

    fn to_script_string(&self) -> String {
        format!("DOC-\"{}\"-", self.0.field_id)
    }

    fn to_display_string(&self) -> String {
        "ProxyField".to_string()
    }

    fn to_json(&self, _registry: &Registry) -> Result<Map<String, Value>> {
        let mut map = Map::new();
        map.insert(
            "fieldId".to_string(),
            Value::String(self.0.field_id.to_string()),
        );
        Ok(map)
    }

    fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ProxyField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyField")
            .field("id", &self.0.field_id)
            .field("loaded", &self.cached().is_some())
            .finish()
    }
}
