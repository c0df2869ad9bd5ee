//! Narrowing dynamically typed reads to concrete types.
//!
//! Casts never fail on a type mismatch. A value of the wrong type reads as
//! `Missing` (or the supplied default); a pending value stays pending and is
//! narrowed once it arrives.

use crate::{
    doc::Doc,
    field::{Field, FieldResult},
    object::{
        ComputedField, CursorField, DateField, InkField, List, ObjectField, ProxyField,
        RichTextField, SchemaHeaderField, ScriptField,
    },
};

/// A type a [`Field`] can be narrowed to.
pub trait CastTarget: Sized + Clone + Send + Sync + 'static {
    /// Name of the target type.
    const KIND: &'static str;

    /// Returns the value if `field` holds this type.
    fn narrow(field: &Field) -> Option<Self>;
}

impl CastTarget for Field {
    const KIND: &'static str = "field";

    fn narrow(field: &Field) -> Option<Self> {
        Some(field.clone())
    }
}

impl CastTarget for f64 {
    const KIND: &'static str = "number";

    fn narrow(field: &Field) -> Option<Self> {
        field.as_number()
    }
}

impl CastTarget for String {
    const KIND: &'static str = "string";

    fn narrow(field: &Field) -> Option<Self> {
        field.as_text().map(str::to_string)
    }
}

impl CastTarget for bool {
    const KIND: &'static str = "boolean";

    fn narrow(field: &Field) -> Option<Self> {
        field.as_bool()
    }
}

impl CastTarget for Doc {
    const KIND: &'static str = "Doc";

    fn narrow(field: &Field) -> Option<Self> {
        field.as_doc().cloned()
    }
}

impl CastTarget for ObjectField {
    const KIND: &'static str = "ObjectField";

    fn narrow(field: &Field) -> Option<Self> {
        field.as_object().cloned()
    }
}

impl CastTarget for ScriptField {
    const KIND: &'static str = "script";

    /// Computed fields are script fields too.
    fn narrow(field: &Field) -> Option<Self> {
        match field {
            Field::Object(ObjectField::Script(script)) => Some(script.clone()),
            Field::Object(ObjectField::Computed(computed)) => Some(computed.script().clone()),
            _ => None,
        }
    }
}

macro_rules! object_cast_target {
    ($($ty:ty => $variant:ident, $kind:literal;)*) => {
        $(
            impl CastTarget for $ty {
                const KIND: &'static str = $kind;

                fn narrow(field: &Field) -> Option<Self> {
                    match field {
                        Field::Object(ObjectField::$variant(inner)) => Some(inner.clone()),
                        _ => None,
                    }
                }
            }
        )*
    };
}

object_cast_target! {
    List => List, "list";
    ProxyField => Proxy, "proxy";
    SchemaHeaderField => SchemaHeader, "schemaheader";
    ComputedField => Computed, "computed";
    InkField => Ink, "ink";
    CursorField => Cursor, "cursors";
    RichTextField => RichText, "RichTextField";
    DateField => Date, "date";
}

/// Narrows a read to `T`.
///
/// ```
/// use dashfields::{Field, FieldResult, cast};
///
/// let read = FieldResult::Ready(Field::from("not a number"));
/// assert!(cast::<f64>(read).is_missing());
/// ```
pub fn cast<T: CastTarget>(field: FieldResult) -> FieldResult<T> {
    match field {
        FieldResult::Ready(value) => T::narrow(&value).into(),
        FieldResult::Pending(pending) => FieldResult::Pending(pending.map(|value| T::narrow(&value))),
        FieldResult::Missing => FieldResult::Missing,
    }
}

/// Narrows a read to `T`, using `default` when the value is missing, mistyped or
/// still pending.
pub fn cast_or<T: CastTarget>(field: FieldResult, default: T) -> T {
    cast(field).unwrap_or(default)
}

/// Narrows a read to `T` if it is available now.
pub fn cast_now<T: CastTarget>(field: FieldResult) -> Option<T> {
    cast(field).ready()
}

/// The value if it is available now; pending reads give `None`.
pub fn field_value<T>(field: FieldResult<T>) -> Option<T> {
    field.ready()
}

/// The value if it is available now, otherwise `default`.
pub fn field_value_or<T>(field: FieldResult<T>, default: T) -> T {
    field.unwrap_or(default)
}

/// Number, or 0.
pub fn num_cast(field: FieldResult) -> f64 {
    cast_or(field, 0.0)
}

/// Text, or the empty string.
pub fn str_cast(field: FieldResult) -> String {
    cast_or(field, String::new())
}

/// Boolean, or false.
pub fn bool_cast(field: FieldResult) -> bool {
    cast_or(field, false)
}

pub fn date_cast(field: FieldResult) -> Option<DateField> {
    cast_now(field)
}

pub fn script_cast(field: FieldResult) -> Option<ScriptField> {
    cast_now(field)
}

/// The documents of a list read that are loaded now. Pending and non-document
/// elements are skipped.
pub fn doc_list_cast(field: FieldResult) -> Vec<Doc> {
    cast_now::<List>(field)
        .map(|list| list.docs())
        .unwrap_or_default()
}

/// Every document of a list read, waiting for the ones still loading.
pub async fn doc_list_cast_async(field: FieldResult) -> Vec<Doc> {
    let Some(list) = cast::<List>(field).resolve().await else {
        return Vec::new();
    };
    let mut docs = Vec::new();
    for element in list.iter() {
        if let Some(doc) = cast::<Doc>(element).resolve().await {
            docs.push(doc);
        }
    }
    docs
}

/// The text elements of a list read.
pub fn str_list_cast(field: FieldResult) -> Vec<String> {
    cast_now::<List>(field)
        .map(|list| list.strings())
        .unwrap_or_default()
}

/// A read wrapped as a value that is delivered exactly once.
pub struct PromiseValue<T>(FieldResult<T>);

impl<T: Send + 'static> PromiseValue<T> {
    /// Delivers the value to `callback`, now or once it loads.
    pub fn then(self, callback: impl FnOnce(Option<T>) + Send + 'static) {
        self.0.then(callback)
    }

    pub async fn resolve(self) -> Option<T> {
        self.0.resolve().await
    }
}

/// Turns any read into something that can be awaited or given a callback.
pub fn promise_value<T>(field: FieldResult<T>) -> PromiseValue<T> {
    PromiseValue(field)
}
