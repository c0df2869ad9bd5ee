//! Change notification for document fields.

use std::{collections::HashSet, fmt, sync::Arc};

use crate::doc::{Doc, WeakDoc};

/// What happened to a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A value was written.
    Set,
    /// The key was removed.
    Removed,
    /// The embedded object stored under the key was mutated in place.
    Updated,
    /// A reference stored under the key finished loading.
    ///
    /// Reading an unloaded reference starts its fetch. When the backend answers
    /// synchronously this event fires before the read that started it returns, so
    /// a plain [`Doc::get`] can run observers.
    Resolved,
}

/// A change to one key of one document.
#[derive(Debug, Clone)]
pub struct FieldChange {
    /// The document the key changed on. For inherited changes this is the
    /// prototype, not the observed document.
    pub doc: Doc,
    pub key: String,
    pub kind: ChangeKind,
}

/// Handle returned by subscriptions, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

pub(crate) type ChangeCallback = Arc<dyn Fn(&FieldChange) + Send + Sync>;

pub(crate) struct Observer {
    pub(crate) id: SubscriptionId,
    /// `None` observes every document.
    doc: Option<WeakDoc>,
    /// `None` observes every key.
    key: Option<String>,
    pub(crate) callback: ChangeCallback,
}

impl Observer {
    pub(crate) fn new(
        id: SubscriptionId,
        doc: Option<WeakDoc>,
        key: Option<String>,
        callback: ChangeCallback,
    ) -> Self {
        Self {
            id,
            doc,
            key,
            callback,
        }
    }

    /// True if the observer's document is gone.
    pub(crate) fn is_stale(&self) -> bool {
        self.doc.as_ref().is_some_and(|doc| doc.upgrade().is_none())
    }

    pub(crate) fn matches(&self, change: &FieldChange) -> bool {
        if self.key.as_deref().is_some_and(|key| key != change.key) {
            return false;
        }
        let Some(doc) = &self.doc else {
            return true;
        };
        let Some(doc) = doc.upgrade() else {
            return false;
        };
        doc.ptr_eq(&change.doc) || inherits(&doc, &change.doc, &change.key)
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("id", &self.id)
            .field("doc", &self.doc)
            .field("key", &self.key)
            .finish()
    }
}

/// True if reading `key` on `doc` would fall through to `source`. Only loaded
/// prototypes are followed.
fn inherits(doc: &Doc, source: &Doc, key: &str) -> bool {
    let mut visited = HashSet::new();
    let mut current = doc.clone();
    loop {
        if !visited.insert(current.id().clone()) {
            return false;
        }
        if current.has_own(key) || current.is_prototype() {
            return false;
        }
        match current.cached_proto() {
            Some(proto) if proto.ptr_eq(source) => return true,
            Some(proto) => current = proto,
            None => return false,
        }
    }
}

impl Doc {
    /// Calls `callback` whenever `key` changes on this document, including changes
    /// on a prototype that this document inherits without overriding.
    pub fn subscribe(
        &self,
        key: &str,
        callback: impl Fn(&FieldChange) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.instance()
            .add_observer(Some(self.downgrade()), Some(key.to_string()), Arc::new(callback))
    }

    /// Calls `callback` for every change visible on this document.
    pub fn subscribe_all(
        &self,
        callback: impl Fn(&FieldChange) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.instance()
            .add_observer(Some(self.downgrade()), None, Arc::new(callback))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.instance().unsubscribe(id)
    }
}
