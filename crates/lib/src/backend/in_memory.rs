use std::{
    any::Any,
    collections::{BTreeMap, HashMap},
    fmt,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::{
    Result,
    backend::{Backend, Diff, FetchReply, RemoteListener, errors::BackendError},
    id::FieldId,
    serialization::TYPE_KEY,
};

/// The current persistence file format version.
/// v0 indicates this is an unstable format subject to breaking changes.
const PERSISTENCE_VERSION: u8 = 0;

fn is_v0(v: &u8) -> bool {
    *v == 0
}

fn validate_persistence_version<'de, D>(deserializer: D) -> std::result::Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let version = u8::deserialize(deserializer)?;
    if version != PERSISTENCE_VERSION {
        return Err(serde::de::Error::custom(format!(
            "unsupported persistence version {version}; only version {PERSISTENCE_VERSION} is supported"
        )));
    }
    Ok(version)
}

/// On-disk form of the store
#[derive(Serialize, Deserialize)]
struct SerializableStore {
    #[serde(
        rename = "_v",
        default,
        skip_serializing_if = "is_v0",
        deserialize_with = "validate_persistence_version"
    )]
    version: u8,
    fields: BTreeMap<FieldId, Value>,
}

/// State shared by every client connected to one store.
#[derive(Default)]
struct Store {
    docs: RwLock<HashMap<FieldId, Value>>,
    /// Remote listeners keyed by client
    listeners: Mutex<Vec<(u64, RemoteListener)>>,
    next_client: AtomicU64,
}

/// An in-memory document store.
///
/// Each `InMemory` is one client of a store. [`connect`](InMemory::connect)
/// creates another client of the same store: a diff written through one client is
/// applied to the store and then delivered to every other client's listener, which
/// is how two instances observe each other's writes.
///
/// Fetches normally answer immediately. In deferred mode they queue until
/// [`flush_fetches`](InMemory::flush_fetches), which lets callers observe
/// references while they are still loading.
///
/// The store can be saved to and loaded from a JSON file.
pub struct InMemory {
    store: Arc<Store>,
    client: u64,
    deferred: AtomicBool,
    fetches: Mutex<Vec<(FieldId, FetchReply)>>,
    log: Mutex<Vec<(FieldId, Diff)>>,
}

impl InMemory {
    /// Creates an empty store with a single client.
    pub fn new() -> Self {
        Self::client_of(Arc::new(Store::default()))
    }

    fn client_of(store: Arc<Store>) -> Self {
        let client = store.next_client.fetch_add(1, Ordering::Relaxed);
        Self {
            store,
            client,
            deferred: AtomicBool::new(false),
            fetches: Mutex::new(Vec::new()),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Another client of the same store.
    pub fn connect(&self) -> Self {
        Self::client_of(self.store.clone())
    }

    /// Queue fetches until [`flush_fetches`](Self::flush_fetches) instead of
    /// answering them immediately.
    pub fn set_deferred(&self, deferred: bool) {
        self.deferred.store(deferred, Ordering::Relaxed);
    }

    /// Answers every queued fetch. Returns how many were answered.
    pub fn flush_fetches(&self) -> usize {
        let fetches = std::mem::take(&mut *self.fetches.lock());
        let count = fetches.len();
        for (id, reply) in fetches {
            let value = self.stored(&id);
            reply(value);
        }
        count
    }

    /// Diffs written through this client, oldest first.
    pub fn update_log(&self) -> Vec<(FieldId, Diff)> {
        self.log.lock().clone()
    }

    pub fn clear_log(&self) {
        self.log.lock().clear();
    }

    /// The stored serialized document with `id`.
    pub fn stored(&self, id: &FieldId) -> Option<Value> {
        self.store.docs.read().get(id).cloned()
    }

    /// Ids of every stored document, sorted.
    pub fn ids(&self) -> Vec<FieldId> {
        let mut ids: Vec<FieldId> = self.store.docs.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.store.docs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stores a serialized document directly, bypassing the update log and listeners.
    pub fn insert_raw(&self, id: impl Into<FieldId>, value: Value) {
        self.store.docs.write().insert(id.into(), value);
    }

    /// Saves every stored document to a JSON file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let serializable = SerializableStore {
            version: PERSISTENCE_VERSION,
            fields: self
                .store
                .docs
                .read()
                .iter()
                .map(|(id, value)| (id.clone(), value.clone()))
                .collect(),
        };
        let json = serde_json::to_string_pretty(&serializable)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Loads a store from a JSON file. A missing file gives an empty store.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(json) => {
                let serializable: SerializableStore = serde_json::from_str(&json)?;
                let backend = Self::new();
                *backend.store.docs.write() = serializable.fields.into_iter().collect();
                Ok(backend)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn broadcast(&self, id: &FieldId, diff: &Diff) {
        let listeners: Vec<RemoteListener> = self
            .store
            .listeners
            .lock()
            .iter()
            .filter(|(client, _)| *client != self.client)
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(id, diff);
        }
    }
}

impl Default for InMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemory")
            .field("client", &self.client)
            .field("docs", &self.len())
            .field("deferred", &self.deferred.load(Ordering::Relaxed))
            .finish()
    }
}

impl Backend for InMemory {
    fn create_field(&self, id: &FieldId, value: Value) -> Result<()> {
        self.store.docs.write().insert(id.clone(), value);
        tracing::trace!(field_id = %id, "Stored new document");
        Ok(())
    }

    fn update_field(&self, id: &FieldId, diff: &Diff) -> Result<()> {
        {
            let mut docs = self.store.docs.write();
            let doc = docs.entry(id.clone()).or_insert_with(|| skeleton(id));
            apply_diff(doc, diff)?;
        }
        self.log.lock().push((id.clone(), diff.clone()));
        tracing::debug!(field_id = %id, client = self.client, "Applied diff");
        self.broadcast(id, diff);
        Ok(())
    }

    fn get_ref_field(&self, id: &FieldId, reply: FetchReply) {
        if self.deferred.load(Ordering::Relaxed) {
            self.fetches.lock().push((id.clone(), reply));
            return;
        }
        let value = self.stored(id);
        reply(value);
    }

    fn listen(&self, listener: RemoteListener) {
        self.store.listeners.lock().push((self.client, listener));
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// An empty serialized document, for diffs that arrive before the document does.
fn skeleton(id: &FieldId) -> Value {
    let mut map = Map::new();
    map.insert(TYPE_KEY.to_string(), Value::String("Doc".to_string()));
    map.insert("id".to_string(), Value::String(id.to_string()));
    map.insert("fields".to_string(), Value::Object(Map::new()));
    Value::Object(map)
}

/// Applies `diff` to a stored document. Paths are split on their first `.`; a
/// `null` set removes the path.
fn apply_diff(doc: &mut Value, diff: &Diff) -> Result<()> {
    let Value::Object(root) = doc else {
        return Err(BackendError::CorruptState {
            reason: "stored document is not an object".to_string(),
        }
        .into());
    };
    for (path, value) in &diff.set {
        if value.is_null() {
            remove_path(root, path);
        } else {
            set_path(root, path, value.clone())?;
        }
    }
    for path in diff.unset.keys() {
        remove_path(root, path);
    }
    Ok(())
}

fn set_path(root: &mut Map<String, Value>, path: &str, value: Value) -> Result<()> {
    let Some((head, rest)) = path.split_once('.') else {
        root.insert(path.to_string(), value);
        return Ok(());
    };
    match root
        .entry(head.to_string())
        .or_insert_with(|| Value::Object(Map::new()))
    {
        Value::Object(child) => {
            child.insert(rest.to_string(), value);
            Ok(())
        }
        _ => Err(BackendError::CorruptState {
            reason: format!("'{head}' is not an object"),
        }
        .into()),
    }
}

fn remove_path(root: &mut Map<String, Value>, path: &str) {
    match path.split_once('.') {
        Some((head, rest)) => {
            if let Some(Value::Object(child)) = root.get_mut(head) {
                child.remove(rest);
            }
        }
        None => {
            root.remove(path);
        }
    }
}
