//! Embedded objects that live inside a document or a list.
//!
//! Every embedded object has at most one owner at a time. It records where it
//! is stored (owner and key), produces a deep [`copy`](ObjectFieldKind::copy) on
//! request, and reports its own in-place mutations to its owner so that they
//! reach observers, the undo history and the backend like any other write.

use std::{fmt, sync::Weak};

use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::{
    Result,
    doc::{Doc, WeakDoc},
    field::FieldError,
    serialization::Registry,
};

mod cursor;
mod date;
mod ink;
mod list;
mod proxy;
mod rich_text;
mod schema_header;
mod script;

pub use cursor::{CursorData, CursorField, CursorMetadata, CursorPosition};
pub use date::DateField;
pub use ink::{InkField, InkPoint, InkTool, Stroke};
pub use list::List;
pub(crate) use list::ListInner;
pub use proxy::ProxyField;
pub use rich_text::RichTextField;
pub use schema_header::{ColumnType, SchemaHeaderField};
pub use script::{CompiledScript, ComputedField, ScriptEngine, ScriptField, ScriptOptions};

/// Behavior shared by every embedded object kind.
pub trait ObjectFieldKind: Clone + Into<ObjectField> + Send + Sync + 'static {
    /// Serialization tag of this kind.
    fn type_tag(&self) -> &'static str;

    /// Ownership record.
    fn base(&self) -> &ObjectBase;

    /// A deep, unowned copy.
    fn copy(&self) -> Self;

    fn to_script_string(&self) -> String;

    fn to_display_string(&self) -> String;

    /// The kind-specific serialized properties, without the `__type` tag.
    fn to_json(&self, registry: &Registry) -> Result<Map<String, Value>>;

    /// True if both handles refer to the same object.
    fn ptr_eq(&self, other: &Self) -> bool;

    /// Reports an in-place mutation to the owner, if any.
    fn notify(&self) {
        let field: ObjectField = self.clone().into();
        field.notify_changed();
    }
}

/// Any embedded object.
#[derive(Debug, Clone)]
pub enum ObjectField {
    List(List),
    Proxy(ProxyField),
    SchemaHeader(SchemaHeaderField),
    Script(ScriptField),
    Computed(ComputedField),
    Ink(InkField),
    Cursor(CursorField),
    RichText(RichTextField),
    Date(DateField),
}

macro_rules! dispatch {
    ($value:expr, $inner:ident => $body:expr) => {
        match $value {
            ObjectField::List($inner) => $body,
            ObjectField::Proxy($inner) => $body,
            ObjectField::SchemaHeader($inner) => $body,
            ObjectField::Script($inner) => $body,
            ObjectField::Computed($inner) => $body,
            ObjectField::Ink($inner) => $body,
            ObjectField::Cursor($inner) => $body,
            ObjectField::RichText($inner) => $body,
            ObjectField::Date($inner) => $body,
        }
    };
}

impl ObjectField {
    pub fn type_tag(&self) -> &'static str {
        dispatch!(self, inner => inner.type_tag())
    }

    pub fn base(&self) -> &ObjectBase {
        dispatch!(self, inner => inner.base())
    }

    /// A deep, unowned copy of the same kind.
    pub fn copy(&self) -> ObjectField {
        dispatch!(self, inner => inner.copy().into())
    }

    pub fn to_script_string(&self) -> String {
        dispatch!(self, inner => inner.to_script_string())
    }

    pub fn to_display_string(&self) -> String {
        dispatch!(self, inner => inner.to_display_string())
    }

    pub fn to_json(&self, registry: &Registry) -> Result<Map<String, Value>> {
        dispatch!(self, inner => inner.to_json(registry))
    }

    /// True if both handles refer to the same object.
    pub fn ptr_eq(&self, other: &ObjectField) -> bool {
        match (self, other) {
            (ObjectField::List(a), ObjectField::List(b)) => a.ptr_eq(b),
            (ObjectField::Proxy(a), ObjectField::Proxy(b)) => a.ptr_eq(b),
            (ObjectField::SchemaHeader(a), ObjectField::SchemaHeader(b)) => a.ptr_eq(b),
            (ObjectField::Script(a), ObjectField::Script(b)) => a.ptr_eq(b),
            (ObjectField::Computed(a), ObjectField::Computed(b)) => a.ptr_eq(b),
            (ObjectField::Ink(a), ObjectField::Ink(b)) => a.ptr_eq(b),
            (ObjectField::Cursor(a), ObjectField::Cursor(b)) => a.ptr_eq(b),
            (ObjectField::RichText(a), ObjectField::RichText(b)) => a.ptr_eq(b),
            (ObjectField::Date(a), ObjectField::Date(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// True if the object currently has an owner.
    pub fn is_owned(&self) -> bool {
        self.base().is_owned()
    }

    /// Claims the object for `owner` under `key`. Prefetch proxies may be shared and
    /// skip the check.
    pub(crate) fn attach(&self, owner: Owner, key: &str) -> std::result::Result<(), FieldError> {
        let exempt = matches!(self, ObjectField::Proxy(proxy) if proxy.is_prefetch());
        let snapshot = match owner {
            Owner::Doc(_) => Some(self.copy()),
            Owner::List(_) => None,
        };
        self.base().bind(owner, key, snapshot, exempt)
    }

    /// Reports an in-place mutation to the owner, if any.
    pub(crate) fn notify_changed(&self) {
        let Some((owner, key)) = self.base().binding() else {
            return;
        };
        match owner {
            Owner::Doc(doc) => {
                if let Some(doc) = doc.upgrade() {
                    doc.object_updated(&key, self);
                }
            }
            Owner::List(list) => {
                if let Some(list) = list.upgrade() {
                    List::from_inner(list).notify();
                }
            }
        }
    }
}

/// Where an embedded object is stored.
#[derive(Clone)]
pub(crate) enum Owner {
    Doc(WeakDoc),
    List(Weak<ListInner>),
}

impl Owner {
    fn same(&self, other: &Owner) -> bool {
        match (self, other) {
            (Owner::Doc(a), Owner::Doc(b)) => a.ptr_eq(b),
            (Owner::List(a), Owner::List(b)) => Weak::ptr_eq(a, b),
            _ => false,
        }
    }

    fn is_alive(&self) -> bool {
        match self {
            Owner::Doc(doc) => doc.upgrade().is_some(),
            Owner::List(list) => list.strong_count() > 0,
        }
    }
}

struct Binding {
    owner: Owner,
    key: String,
    /// Copy taken when the value was last stored in or written through a document.
    snapshot: Option<ObjectField>,
}

/// Ownership record carried by every embedded object.
#[derive(Default)]
pub struct ObjectBase {
    binding: Mutex<Option<Binding>>,
}

impl ObjectBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if the object currently has a live owner.
    pub fn is_owned(&self) -> bool {
        self.binding
            .lock()
            .as_ref()
            .is_some_and(|binding| binding.owner.is_alive())
    }

    /// The key the object is stored under.
    pub fn key(&self) -> Option<String> {
        self.binding.lock().as_ref().map(|binding| binding.key.clone())
    }

    pub(crate) fn bind(
        &self,
        owner: Owner,
        key: &str,
        snapshot: Option<ObjectField>,
        exempt: bool,
    ) -> std::result::Result<(), FieldError> {
        let mut binding = self.binding.lock();
        if let Some(current) = binding.as_ref() {
            // A document owner holds the object under one key only; lists rekey
            // their elements as they move.
            let same_slot = current.owner.same(&owner)
                && (current.key == key || matches!(owner, Owner::List(_)));
            if !exempt && current.owner.is_alive() && !same_slot {
                return Err(FieldError::OwnershipViolation {
                    key: key.to_string(),
                });
            }
        }
        *binding = Some(Binding {
            owner,
            key: key.to_string(),
            snapshot,
        });
        Ok(())
    }

    /// Fails if the object already has a live owner, including the container it
    /// is about to be inserted into.
    pub(crate) fn check_unowned(&self, key: &str, exempt: bool) -> std::result::Result<(), FieldError> {
        match self.binding.lock().as_ref() {
            Some(current) if !exempt && current.owner.is_alive() => {
                Err(FieldError::OwnershipViolation {
                    key: key.to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Moves the object to a new position inside the list that already owns it.
    pub(crate) fn rekey(&self, key: String) {
        if let Some(binding) = self.binding.lock().as_mut() {
            binding.key = key;
        }
    }

    pub(crate) fn unbind(&self) {
        self.binding.lock().take();
    }

    pub(crate) fn binding(&self) -> Option<(Owner, String)> {
        self.binding
            .lock()
            .as_ref()
            .map(|binding| (binding.owner.clone(), binding.key.clone()))
    }

    /// Replaces the stored snapshot, returning the previous one.
    pub(crate) fn swap_snapshot(&self, snapshot: ObjectField) -> Option<ObjectField> {
        self.binding
            .lock()
            .as_mut()
            .and_then(|binding| binding.snapshot.replace(snapshot))
    }

    /// The document this object is ultimately stored in, following list owners
    /// upward, and the key it sits under there.
    pub(crate) fn owning_doc(&self) -> Option<(Doc, String)> {
        let (mut owner, mut key) = self.binding()?;
        loop {
            match owner {
                Owner::Doc(doc) => return doc.upgrade().map(|doc| (doc, key)),
                Owner::List(list) => {
                    let list = list.upgrade()?;
                    (owner, key) = list.base.binding()?;
                }
            }
        }
    }
}

impl fmt::Debug for ObjectBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectBase")
            .field("key", &self.key())
            .finish()
    }
}

macro_rules! impl_into_object_field {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for ObjectField {
                fn from(value: $ty) -> Self {
                    ObjectField::$variant(value)
                }
            }
        )*
    };
}

impl_into_object_field! {
    List => List,
    ProxyField => Proxy,
    SchemaHeaderField => SchemaHeader,
    ScriptField => Script,
    ComputedField => Computed,
    InkField => Ink,
    CursorField => Cursor,
    RichTextField => RichText,
    DateField => Date,
}
