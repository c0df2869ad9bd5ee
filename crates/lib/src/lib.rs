//!
//! Dashfields: the reactive document model behind a spatial note-taking canvas.
//!
//! ## Core Concepts
//!
//! * **Fields (`Field`)**: the universal value type. A field is a primitive
//!   (number, text, boolean), an owned embedded object (`ObjectField`), or a
//!   shared reference to a document (`Doc`).
//! * **Documents (`Doc`)**: schema-less string-keyed field maps with an optional
//!   `proto` link. Reading an unset key falls through to the prototype chain.
//! * **Embedded objects (`ObjectField`)**: `List`, `ProxyField`, schema headers,
//!   scripts, ink, cursors, rich text and dates. Each has exactly one owner at a
//!   time, deep-copies on request and reports its own mutations upward.
//! * **Proxies (`ProxyField`)**: lazily resolved references. Reads never block;
//!   a reference that is still loading reads as `FieldResult::Pending`.
//! * **Instance (`Instance`)**: the explicit context that wires documents to a
//!   `Backend`, an undo history, a script engine and the serialization registry.
//! * **Sync**: every local write produces a `Diff` for the backend, and remote
//!   diffs are applied back through the same setter path.

pub mod backend;
pub mod config;
pub mod doc;
pub mod field;
pub mod history;
pub mod id;
pub mod instance;
pub mod object;
pub mod serialization;

pub use backend::{Backend, Diff, InMemory};
pub use config::{DeserializeMode, ModelConfig};
pub use doc::{AddDocOptions, ChangeKind, CloneResult, Doc, FieldChange, SubscriptionId, WeakDoc};
pub use field::{
    CastTarget, Field, FieldError, FieldResult, Pending, PromiseValue, bool_cast, cast, cast_now,
    cast_or, date_cast, doc_list_cast, doc_list_cast_async, field_value, field_value_or, num_cast,
    promise_value, script_cast, str_cast, str_list_cast,
};
pub use history::{Batch, NoHistory, UndoEvent, UndoHistory, UndoManager};
pub use id::FieldId;
pub use instance::{Instance, InstanceBuilder, ReadOnlyGuard, WeakInstance};
pub use object::{
    ColumnType, CompiledScript, ComputedField, CursorField, DateField, InkField, List,
    ObjectBase, ObjectField, ObjectFieldKind, ProxyField, RichTextField, SchemaHeaderField,
    ScriptEngine, ScriptField, ScriptOptions,
};
pub use serialization::Registry;

/// Result type used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Structured field errors from the field module
    #[error(transparent)]
    Field(field::FieldError),

    /// Structured transport errors from the backend module
    #[error(transparent)]
    Backend(backend::BackendError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Field(_) => "field",
            Error::Backend(_) => "backend",
            Error::Io(_) => "io",
            Error::Serialize(_) => "serialize",
        }
    }

    /// Check if this error indicates a resource was not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Backend(backend_err) => backend_err.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error is an embedded-object ownership violation.
    pub fn is_ownership_violation(&self) -> bool {
        match self {
            Error::Field(field_err) => field_err.is_ownership_violation(),
            _ => false,
        }
    }

    /// Check if this error is a missing or unknown serialization type.
    pub fn is_unregistered_type(&self) -> bool {
        match self {
            Error::Field(field_err) => field_err.is_unregistered_type(),
            _ => false,
        }
    }

    /// Check if this error was caused by read-only mode.
    pub fn is_read_only(&self) -> bool {
        match self {
            Error::Field(field_err) => field_err.is_read_only(),
            _ => false,
        }
    }

    /// Check if this error is related to deserialization.
    pub fn is_deserialization_error(&self) -> bool {
        match self {
            Error::Field(field_err) => field_err.is_deserialization_error(),
            Error::Serialize(_) => true,
            _ => false,
        }
    }

    /// Check if this error is backend-related.
    pub fn is_backend_error(&self) -> bool {
        matches!(self, Error::Backend(_))
    }

    /// Check if this error is I/O related.
    pub fn is_io_error(&self) -> bool {
        matches!(self, Error::Io(_))
    }
}
