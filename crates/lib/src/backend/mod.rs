//! Backing-store transports for documents.
//!
//! The [`Backend`] trait is the seam between the in-memory document graph and
//! wherever documents are persisted or shared. Documents reach a backend in two
//! shapes:
//!
//! - whole serialized documents, when a document is first created;
//! - [`Diff`]s, one per accepted local write.
//!
//! A backend may also push diffs made by other clients back to the instance
//! through a [`RemoteListener`].

use std::{any::Any, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Result, id::FieldId};

pub mod errors;
mod in_memory;

pub use errors::BackendError;
pub use in_memory::InMemory;

/// Prefix of every field path in a document diff.
pub const FIELD_PREFIX: &str = "fields.";

/// Completion for [`Backend::get_ref_field`]. `None` means the document does not exist.
pub type FetchReply = Box<dyn FnOnce(Option<Value>) + Send>;

/// Receives diffs made by other clients of a shared store.
pub type RemoteListener = Arc<dyn Fn(&FieldId, &Diff) + Send + Sync>;

/// A minimal set/unset description of a change to one stored document.
///
/// Paths are dotted; document fields live under `fields.<key>`.
///
/// ```
/// use dashfields::Diff;
///
/// let diff = Diff::set_field("title", serde_json::json!("Notes"));
/// assert_eq!(
///     serde_json::to_value(&diff).unwrap(),
///     serde_json::json!({ "$set": { "fields.title": "Notes" } })
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diff {
    #[serde(rename = "$set", default, skip_serializing_if = "Map::is_empty")]
    pub set: Map<String, Value>,
    #[serde(rename = "$unset", default, skip_serializing_if = "Map::is_empty")]
    pub unset: Map<String, Value>,
}

impl Diff {
    /// A diff writing `value` to document field `key`.
    pub fn set_field(key: &str, value: Value) -> Self {
        let mut diff = Self::default();
        diff.set.insert(format!("{FIELD_PREFIX}{key}"), value);
        diff
    }

    /// A diff removing document field `key`.
    pub fn unset_field(key: &str) -> Self {
        let mut diff = Self::default();
        diff.unset
            .insert(format!("{FIELD_PREFIX}{key}"), Value::Number(1.into()));
        diff
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }

    /// Document fields written by this diff, keyed without the `fields.` prefix.
    pub fn field_sets(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.set
            .iter()
            .filter_map(|(path, value)| path.strip_prefix(FIELD_PREFIX).map(|key| (key, value)))
    }

    /// Document fields removed by this diff, without the `fields.` prefix.
    pub fn field_unsets(&self) -> impl Iterator<Item = &str> {
        self.unset
            .keys()
            .filter_map(|path| path.strip_prefix(FIELD_PREFIX))
    }
}

/// Storage and transport for serialized documents.
///
/// Implementations must be `Send` and `Sync` and implement `Any` so callers can
/// downcast to the concrete backend.
pub trait Backend: Send + Sync + Any {
    /// Stores a newly created document.
    fn create_field(&self, id: &FieldId, value: Value) -> Result<()>;

    /// Applies a diff to a stored document.
    fn update_field(&self, id: &FieldId, diff: &Diff) -> Result<()>;

    /// Fetches a serialized document. `reply` may run before this returns or later.
    fn get_ref_field(&self, id: &FieldId, reply: FetchReply);

    /// Registers the receiver for diffs made elsewhere. Backends without remote
    /// clients ignore it.
    fn listen(&self, listener: RemoteListener) {
        let _ = listener;
    }

    /// Returns a reference to the backend as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;
}
