//! The field value lattice.
//!
//! A [`Field`] is exactly one of: a primitive (number, text, boolean), an owned
//! embedded [`ObjectField`], or a shared reference to a [`Doc`]. Nothing else can
//! be stored in a document or a list.
//!
//! Reads produce a [`FieldResult`], which separates "here is the value" from
//! "the referenced document is still loading" and "there is nothing here".
//! The [`cast`] family narrows dynamically typed reads to concrete Rust types
//! without ever failing on a type mismatch.

use std::fmt;

use crate::{
    doc::Doc,
    object::{List, ObjectField, ObjectFieldKind, ProxyField},
};

pub mod cast;
pub mod errors;
pub mod result;

pub use cast::{
    CastTarget, PromiseValue, bool_cast, cast, cast_now, cast_or, date_cast, doc_list_cast,
    doc_list_cast_async, field_value, field_value_or, num_cast, promise_value, script_cast,
    str_cast, str_list_cast,
};
pub use errors::FieldError;
pub use result::{FieldResult, Pending};

/// Any legal value in document or list storage.
///
/// Equality is identity for embedded objects and documents and value equality
/// for primitives:
///
/// ```
/// use dashfields::{Field, List};
///
/// assert_eq!(Field::from("hello"), Field::from("hello"));
/// assert_eq!(Field::from(5), Field::from(5.0));
///
/// let list = List::new();
/// assert_eq!(Field::from(list.clone()), Field::from(list));
/// assert_ne!(Field::from(List::new()), Field::from(List::new()));
/// ```
#[derive(Debug, Clone)]
pub enum Field {
    /// Numeric value
    Number(f64),
    /// Text value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Owned embedded value
    Object(ObjectField),
    /// Shared reference to a document
    Ref(Doc),
}

impl Field {
    /// Returns the type name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Field::Number(_) => "number",
            Field::Text(_) => "string",
            Field::Bool(_) => "boolean",
            Field::Object(obj) => obj.type_tag(),
            Field::Ref(_) => "Doc",
        }
    }

    /// Returns true for numbers, text and booleans.
    pub fn is_primitive(&self) -> bool {
        matches!(self, Field::Number(_) | Field::Text(_) | Field::Bool(_))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Field::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Field::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Field::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectField> {
        match self {
            Field::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_doc(&self) -> Option<&Doc> {
        match self {
            Field::Ref(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&List> {
        match self {
            Field::Object(ObjectField::List(list)) => Some(list),
            _ => None,
        }
    }

    /// Renders the field as text an expression evaluator can read back.
    ///
    /// ```
    /// use dashfields::Field;
    ///
    /// assert_eq!(Field::from("hi").to_script_string(), "\"hi\"");
    /// assert_eq!(Field::from(2.5).to_script_string(), "2.5");
    /// assert_eq!(Field::from(true).to_script_string(), "true");
    /// ```
    pub fn to_script_string(&self) -> String {
        match self {
            Field::Number(n) => n.to_string(),
            Field::Text(s) => serde_json::Value::String(s.clone()).to_string(),
            Field::Bool(b) => b.to_string(),
            Field::Object(obj) => obj.to_script_string(),
            Field::Ref(doc) => doc.to_script_string(),
        }
    }

    /// Key/value editor rendering of `doc[key]`.
    ///
    /// Keys set on the document itself get a `=` prefix; computed fields show
    /// their source as `:=source`. Keys with no readable value render empty.
    pub fn to_key_value_string(doc: &Doc, key: &str) -> String {
        let prefix = if doc.has_own(key) { "=" } else { "" };
        match doc.get_uncomputed(key) {
            FieldResult::Ready(Field::Object(ObjectField::Computed(computed))) => {
                format!("{prefix}:={}", computed.source())
            }
            FieldResult::Ready(field) => format!("{prefix}{}", field.to_script_string()),
            _ => String::new(),
        }
    }

    /// Converts a value into its storage form: references go behind a fresh proxy.
    pub(crate) fn into_stored(self) -> Field {
        match self {
            Field::Ref(doc) => Field::Object(ObjectField::Proxy(ProxyField::from_doc(&doc))),
            other => other,
        }
    }

    /// True if `stored` already holds `value`, including a proxy that points at the
    /// same document id.
    pub(crate) fn same_stored(stored: Option<&Field>, value: Option<&Field>) -> bool {
        match (stored, value) {
            (None, None) => true,
            (Some(Field::Object(ObjectField::Proxy(proxy))), Some(Field::Ref(doc))) => {
                proxy.id() == doc.id()
            }
            (
                Some(Field::Object(ObjectField::Proxy(a))),
                Some(Field::Object(ObjectField::Proxy(b))),
            ) => a.id() == b.id(),
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialEq for Field {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Field::Number(a), Field::Number(b)) => a == b,
            (Field::Text(a), Field::Text(b)) => a == b,
            (Field::Bool(a), Field::Bool(b)) => a == b,
            (Field::Object(a), Field::Object(b)) => a.ptr_eq(b),
            (Field::Ref(a), Field::Ref(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Number(n) => write!(f, "{n}"),
            Field::Text(s) => write!(f, "{s}"),
            Field::Bool(b) => write!(f, "{b}"),
            Field::Object(obj) => write!(f, "{}", obj.to_display_string()),
            Field::Ref(doc) => write!(f, "{doc}"),
        }
    }
}

impl From<f64> for Field {
    fn from(value: f64) -> Self {
        Field::Number(value)
    }
}

impl From<f32> for Field {
    fn from(value: f32) -> Self {
        Field::Number(value as f64)
    }
}

impl From<i32> for Field {
    fn from(value: i32) -> Self {
        Field::Number(value as f64)
    }
}

impl From<i64> for Field {
    fn from(value: i64) -> Self {
        Field::Number(value as f64)
    }
}

impl From<u32> for Field {
    fn from(value: u32) -> Self {
        Field::Number(value as f64)
    }
}

impl From<usize> for Field {
    fn from(value: usize) -> Self {
        Field::Number(value as f64)
    }
}

impl From<&str> for Field {
    fn from(value: &str) -> Self {
        Field::Text(value.to_string())
    }
}

impl From<String> for Field {
    fn from(value: String) -> Self {
        Field::Text(value)
    }
}

impl From<&String> for Field {
    fn from(value: &String) -> Self {
        Field::Text(value.clone())
    }
}

impl From<bool> for Field {
    fn from(value: bool) -> Self {
        Field::Bool(value)
    }
}

impl From<Doc> for Field {
    fn from(value: Doc) -> Self {
        Field::Ref(value)
    }
}

impl From<&Doc> for Field {
    fn from(value: &Doc) -> Self {
        Field::Ref(value.clone())
    }
}

impl From<ObjectField> for Field {
    fn from(value: ObjectField) -> Self {
        Field::Object(value)
    }
}

impl<T: ObjectFieldKind> From<T> for Field {
    fn from(value: T) -> Self {
        Field::Object(value.into())
    }
}
