//!
//! Provides [`Instance`], the context every document lives in.
//!
//! An `Instance` ties the document graph to its collaborators: the storage
//! [`Backend`], the undo history, the script engine, the serialization
//! [`Registry`] and the [`ModelConfig`]. It also owns the per-process state the
//! documents share: the cache of resident documents, the in-flight fetches and
//! the change observers.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::{
    Result,
    backend::{Backend, Diff},
    config::ModelConfig,
    doc::{ChangeCallback, Doc, FieldChange, Observer, SubscriptionId, WeakDoc},
    field::{Field, FieldResult},
    history::{NoHistory, UndoEvent, UndoHistory},
    id::FieldId,
    object::{ProxyField, ScriptEngine},
    serialization::Registry,
};

type FetchWaiter = Box<dyn FnOnce(Option<Doc>) + Send>;

/// Internal state for Instance
///
/// Instance itself is just a cheap-to-clone handle wrapping Arc<InstanceInternal>.
pub(crate) struct InstanceInternal {
    backend: Arc<dyn Backend>,
    history: Arc<dyn UndoHistory>,
    scripts: Option<Arc<dyn ScriptEngine>>,
    registry: Registry,
    config: ModelConfig,
    /// Documents currently loaded, by id
    resident: RwLock<HashMap<FieldId, WeakDoc>>,
    /// Waiters for documents requested from the backend but not yet delivered
    fetches: Mutex<HashMap<FieldId, Vec<FetchWaiter>>>,
    observers: Mutex<Vec<Observer>>,
    next_subscription: AtomicU64,
    /// Number of live read-only guards
    read_only: AtomicUsize,
}

impl fmt::Debug for InstanceInternal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceInternal")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field(
                "resident",
                &format!("<{} documents>", self.resident.read().len()),
            )
            .field(
                "observers",
                &format!("<{} observers>", self.observers.lock().len()),
            )
            .field("read_only", &self.read_only.load(Ordering::Relaxed))
            .finish()
    }
}

/// The context documents are created and loaded in.
///
/// Instance is a cheap-to-clone handle around `Arc<InstanceInternal>`.
///
/// ## Example
///
/// ```
/// use std::sync::Arc;
/// use dashfields::{Doc, InMemory, Instance};
///
/// let instance = Instance::open(Arc::new(InMemory::new()));
/// let doc = Doc::new(&instance);
/// doc.set("title", "Notes").unwrap();
/// assert_eq!(doc.title(), "Notes");
/// ```
#[derive(Clone, Debug)]
pub struct Instance {
    inner: Arc<InstanceInternal>,
}

/// Weak reference to an Instance.
///
/// Backend listeners and fetch replies hold weak handles so that they do not keep
/// the instance alive.
#[derive(Clone, Debug)]
pub struct WeakInstance {
    inner: Weak<InstanceInternal>,
}

impl WeakInstance {
    pub fn upgrade(&self) -> Option<Instance> {
        self.inner.upgrade().map(|inner| Instance { inner })
    }
}

/// Builds an [`Instance`] with non-default collaborators.
pub struct InstanceBuilder {
    backend: Arc<dyn Backend>,
    history: Arc<dyn UndoHistory>,
    scripts: Option<Arc<dyn ScriptEngine>>,
    registry: Option<Registry>,
    config: ModelConfig,
}

impl InstanceBuilder {
    /// Undo history that receives one event per accepted write. Defaults to none.
    pub fn history(mut self, history: Arc<dyn UndoHistory>) -> Self {
        self.history = history;
        self
    }

    /// Compiles script and computed fields as they are created or loaded.
    pub fn script_engine(mut self, engine: Arc<dyn ScriptEngine>) -> Self {
        self.scripts = Some(engine);
        self
    }

    /// Serialization registry. Defaults to [`Registry::with_builtins`].
    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn config(mut self, config: ModelConfig) -> Self {
        self.config = config;
        self
    }

    /// Creates the instance and starts listening for remote diffs.
    pub fn build(self) -> Instance {
        let instance = Instance {
            inner: Arc::new(InstanceInternal {
                backend: self.backend,
                history: self.history,
                scripts: self.scripts,
                registry: self.registry.unwrap_or_else(Registry::with_builtins),
                config: self.config,
                resident: RwLock::new(HashMap::new()),
                fetches: Mutex::new(HashMap::new()),
                observers: Mutex::new(Vec::new()),
                next_subscription: AtomicU64::new(1),
                read_only: AtomicUsize::new(0),
            }),
        };

        let weak = instance.downgrade();
        instance
            .inner
            .backend
            .listen(Arc::new(move |id: &FieldId, diff: &Diff| {
                if let Some(instance) = weak.upgrade() {
                    if let Err(e) = instance.handle_update(id, diff) {
                        tracing::warn!(doc_id = %id, "Remote update not fully applied: {e}");
                    }
                }
            }));
        instance
    }
}

/// While alive, every document write through the instance fails.
#[must_use = "read-only mode ends when the guard is dropped"]
#[derive(Debug)]
pub struct ReadOnlyGuard {
    instance: Instance,
}

impl Drop for ReadOnlyGuard {
    fn drop(&mut self) {
        self.instance.inner.read_only.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Instance {
    /// An instance on `backend` with default collaborators.
    pub fn open(backend: Arc<dyn Backend>) -> Self {
        Self::builder(backend).build()
    }

    pub fn builder(backend: Arc<dyn Backend>) -> InstanceBuilder {
        InstanceBuilder {
            backend,
            history: Arc::new(NoHistory),
            scripts: None,
            registry: None,
            config: ModelConfig::default(),
        }
    }

    pub fn downgrade(&self) -> WeakInstance {
        WeakInstance {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.inner.backend
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn config(&self) -> &ModelConfig {
        &self.inner.config
    }

    pub fn script_engine(&self) -> Option<&Arc<dyn ScriptEngine>> {
        self.inner.scripts.as_ref()
    }

    /// Enters read-only mode until the returned guard is dropped. Guards nest.
    pub fn read_only(&self) -> ReadOnlyGuard {
        self.inner.read_only.fetch_add(1, Ordering::SeqCst);
        ReadOnlyGuard {
            instance: self.clone(),
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.inner.read_only.load(Ordering::SeqCst) > 0
    }

    /// The document with `id`, loading it from the backend if it is not resident.
    pub fn get_ref_field(&self, id: impl Into<FieldId>) -> FieldResult<Doc> {
        ProxyField::from_id(self, id).value()
    }

    /// Waits for the document with `id`. `None` if it does not exist.
    pub async fn load(&self, id: impl Into<FieldId>) -> Option<Doc> {
        self.get_ref_field(id).resolve().await
    }

    /// The document with `id` if it is resident, without contacting the backend.
    pub fn cached_ref_field(&self, id: &FieldId) -> Option<Doc> {
        self.inner.resident.read().get(id).and_then(WeakDoc::upgrade)
    }

    /// Ids of the resident documents, sorted.
    pub fn resident_ids(&self) -> Vec<FieldId> {
        let mut ids: Vec<FieldId> = self
            .inner
            .resident
            .read()
            .iter()
            .filter(|(_, doc)| doc.upgrade().is_some())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Applies a diff made elsewhere to the resident document it targets. Diffs for
    /// documents that are not loaded are ignored; the backend already has them.
    pub fn handle_update(&self, id: &FieldId, diff: &Diff) -> Result<()> {
        match self.cached_ref_field(id) {
            Some(doc) => {
                tracing::debug!(doc_id = %id, "Applying remote update");
                doc.handle_update(diff)
            }
            None => {
                tracing::trace!(doc_id = %id, "Remote update for document that is not resident");
                Ok(())
            }
        }
    }

    /// Calls `callback` for every change on every document of this instance.
    pub fn subscribe(
        &self,
        callback: impl Fn(&FieldChange) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.add_observer(None, None, Arc::new(callback))
    }

    /// Removes a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.inner.observers.lock();
        let before = observers.len();
        observers.retain(|observer| observer.id != id);
        observers.len() != before
    }

    pub(crate) fn add_observer(
        &self,
        doc: Option<WeakDoc>,
        key: Option<String>,
        callback: ChangeCallback,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.inner
            .observers
            .lock()
            .push(Observer::new(id, doc, key, callback));
        id
    }

    /// Delivers a change to every matching observer. Callbacks run without any
    /// instance lock held, so they may read and write documents.
    pub(crate) fn emit(&self, change: &FieldChange) {
        let callbacks: Vec<ChangeCallback> = {
            let mut observers = self.inner.observers.lock();
            observers.retain(|observer| !observer.is_stale());
            observers
                .iter()
                .filter(|observer| observer.matches(change))
                .map(|observer| observer.callback.clone())
                .collect()
        };
        for callback in callbacks {
            callback(change);
        }
    }

    pub(crate) fn register_resident(&self, doc: &Doc) {
        let mut resident = self.inner.resident.write();
        resident.retain(|_, doc| doc.upgrade().is_some());
        resident.insert(doc.id().clone(), doc.downgrade());
    }

    pub(crate) fn forget_resident(&self, id: &FieldId) {
        self.inner.resident.write().remove(id);
    }

    /// Sends a newly created document to the backend.
    pub(crate) fn announce(&self, doc: &Doc) {
        let result = self
            .registry()
            .serialize_doc(doc)
            .and_then(|value| self.inner.backend.create_field(doc.id(), value));
        if let Err(e) = result {
            tracing::error!(doc_id = %doc.id(), "Failed to store new document: {e}");
        }
    }

    /// Sends a local write to the backend. Failures are logged; the local write
    /// stands.
    pub(crate) fn push_update(&self, id: &FieldId, diff: &Diff) {
        tracing::debug!(doc_id = %id, sets = diff.set.len(), unsets = diff.unset.len(), "Sending diff");
        if let Err(e) = self.inner.backend.update_field(id, diff) {
            tracing::error!(doc_id = %id, "Failed to send diff: {e}");
        }
    }

    pub(crate) fn record_undo(&self, event: UndoEvent) {
        self.inner.history.add_event(event);
    }

    /// Requests the document with `id`. Concurrent requests for the same id share one
    /// backend fetch; `callback` runs with `None` if the document does not exist.
    pub(crate) fn request_ref_field(&self, id: &FieldId, callback: FetchWaiter) {
        if let Some(doc) = self.cached_ref_field(id) {
            callback(Some(doc));
            return;
        }
        {
            let mut fetches = self.inner.fetches.lock();
            if let Some(waiters) = fetches.get_mut(id) {
                waiters.push(callback);
                return;
            }
            fetches.insert(id.clone(), vec![callback]);
        }

        tracing::debug!(doc_id = %id, "Fetching document");
        let weak = self.downgrade();
        let fetch_id = id.clone();
        self.inner.backend.get_ref_field(
            id,
            Box::new(move |value| {
                if let Some(instance) = weak.upgrade() {
                    instance.complete_fetch(&fetch_id, value);
                }
            }),
        );
    }

    fn complete_fetch(&self, id: &FieldId, value: Option<Value>) {
        let doc = match value {
            Some(value) => self.deserialize_fetched(id, &value),
            None => self.cached_ref_field(id),
        };
        let waiters = self.inner.fetches.lock().remove(id).unwrap_or_default();
        for waiter in waiters {
            waiter(doc.clone());
        }
    }

    fn deserialize_fetched(&self, id: &FieldId, value: &Value) -> Option<Doc> {
        match self.registry().deserialize(value, self) {
            Ok(Some(Field::Ref(doc))) => Some(doc),
            Ok(_) => {
                tracing::warn!(doc_id = %id, "Fetched value is not a document");
                None
            }
            Err(e) => {
                tracing::warn!(doc_id = %id, "Failed to load document: {e}");
                None
            }
        }
    }
}
