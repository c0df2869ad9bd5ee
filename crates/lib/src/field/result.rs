//! Read results that may still be waiting on a document load.

use std::{fmt, sync::Arc};

use tokio::sync::oneshot;

use crate::{doc::Doc, id::FieldId, object::ProxyField};

/// Continuation from the eventually loaded document to the caller's value.
type Continuation<T> = Arc<dyn Fn(Option<Doc>) -> FieldResult<T> + Send + Sync>;

/// Outcome of reading a field.
///
/// `Pending` is a first-class outcome, not an error: the reference exists but the
/// document it points at has not been loaded yet. Reads never block.
pub enum FieldResult<T = crate::Field> {
    /// The value is available now.
    Ready(T),
    /// The value depends on a document that is still loading.
    Pending(Pending<T>),
    /// There is no value, or it has the wrong type.
    Missing,
}

impl<T> FieldResult<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, FieldResult::Ready(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, FieldResult::Pending(_))
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, FieldResult::Missing)
    }

    /// The value if it is available right now.
    pub fn ready(self) -> Option<T> {
        match self {
            FieldResult::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_ready(&self) -> Option<&T> {
        match self {
            FieldResult::Ready(value) => Some(value),
            _ => None,
        }
    }

    /// The value if available, otherwise `default` (also while pending).
    pub fn unwrap_or(self, default: T) -> T {
        self.ready().unwrap_or(default)
    }
}

impl<T: Send + 'static> FieldResult<T> {
    /// Maps the eventual value, discarding values `f` rejects.
    pub fn map<U: Send + 'static>(
        self,
        f: impl Fn(T) -> Option<U> + Send + Sync + 'static,
    ) -> FieldResult<U> {
        self.and_then(move |value| f(value).into())
    }

    /// Chains a read that may itself be pending.
    pub fn and_then<U: Send + 'static>(
        self,
        f: impl Fn(T) -> FieldResult<U> + Send + Sync + 'static,
    ) -> FieldResult<U> {
        self.and_then_shared(Arc::new(f))
    }

    fn and_then_shared<U: Send + 'static>(
        self,
        f: Arc<dyn Fn(T) -> FieldResult<U> + Send + Sync>,
    ) -> FieldResult<U> {
        match self {
            FieldResult::Ready(value) => f(value),
            FieldResult::Pending(pending) => FieldResult::Pending(pending.and_then_shared(f)),
            FieldResult::Missing => FieldResult::Missing,
        }
    }

    /// Runs `callback` with the value: immediately if it is known, otherwise once the
    /// document it depends on has loaded (or failed to).
    pub fn then(self, callback: impl FnOnce(Option<T>) + Send + 'static) {
        match self {
            FieldResult::Ready(value) => callback(Some(value)),
            FieldResult::Pending(pending) => pending.then(callback),
            FieldResult::Missing => callback(None),
        }
    }

    /// Waits for the value.
    pub async fn resolve(self) -> Option<T> {
        match self {
            FieldResult::Ready(value) => Some(value),
            FieldResult::Pending(pending) => pending.resolve().await,
            FieldResult::Missing => None,
        }
    }
}

impl<T> From<Option<T>> for FieldResult<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => FieldResult::Ready(value),
            None => FieldResult::Missing,
        }
    }
}

impl<T: Clone> Clone for FieldResult<T> {
    fn clone(&self) -> Self {
        match self {
            FieldResult::Ready(value) => FieldResult::Ready(value.clone()),
            FieldResult::Pending(pending) => FieldResult::Pending(pending.clone()),
            FieldResult::Missing => FieldResult::Missing,
        }
    }
}

/// Two results are equal only if both are ready with equal values or both missing.
impl<T: PartialEq> PartialEq for FieldResult<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldResult::Ready(a), FieldResult::Ready(b)) => a == b,
            (FieldResult::Missing, FieldResult::Missing) => true,
            _ => false,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for FieldResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldResult::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            FieldResult::Pending(pending) => f.debug_tuple("Pending").field(pending.id()).finish(),
            FieldResult::Missing => f.write_str("Missing"),
        }
    }
}

/// A value that becomes available once a referenced document has loaded.
pub struct Pending<T> {
    source: ProxyField,
    continuation: Continuation<T>,
}

impl<T> Clone for Pending<T> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            continuation: self.continuation.clone(),
        }
    }
}

impl Pending<Doc> {
    /// Waits on the document behind `source`.
    pub(crate) fn of(source: ProxyField) -> Self {
        Self {
            source,
            continuation: Arc::new(|doc| doc.into()),
        }
    }
}

impl<T> Pending<T> {
    /// Id of the document being waited on.
    pub fn id(&self) -> &FieldId {
        self.source.id()
    }
}

impl<T: Send + 'static> Pending<T> {
    /// Runs `callback` when the value is known. Chains of pending reads are followed
    /// until a final value or absence is reached.
    pub fn then(self, callback: impl FnOnce(Option<T>) + Send + 'static) {
        let continuation = self.continuation;
        self.source.on_resolved(Box::new(move |doc| {
            continuation(doc).then(callback);
        }));
    }

    pub fn map<U: Send + 'static>(
        self,
        f: impl Fn(T) -> Option<U> + Send + Sync + 'static,
    ) -> Pending<U> {
        self.and_then_shared(Arc::new(move |value| f(value).into()))
    }

    pub fn and_then<U: Send + 'static>(
        self,
        f: impl Fn(T) -> FieldResult<U> + Send + Sync + 'static,
    ) -> Pending<U> {
        self.and_then_shared(Arc::new(f))
    }

    fn and_then_shared<U: Send + 'static>(
        self,
        f: Arc<dyn Fn(T) -> FieldResult<U> + Send + Sync>,
    ) -> Pending<U> {
        let inner = self.continuation;
        Pending {
            source: self.source,
            continuation: Arc::new(move |doc| inner(doc).and_then_shared(f.clone())),
        }
    }

    /// Waits for the value.
    pub async fn resolve(self) -> Option<T> {
        let (tx, rx) = oneshot::channel();
        self.then(move |value| {
            let _ = tx.send(value);
        });
        rx.await.ok().flatten()
    }
}

impl<T> fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending").field("id", self.id()).finish()
    }
}
