//! Type-tagged JSON serialization of fields.
//!
//! Primitives serialize as plain JSON values. Every embedded object and every
//! document serializes as a JSON object carrying a `__type` tag; the
//! [`Registry`] maps each tag to a factory that rebuilds the value and an
//! optional hook that runs after the value is rebuilt.
//!
//! Documents use the form `{"__type": "Doc", "id": ..., "fields": {...}}`.

use std::{collections::HashMap, fmt};

use serde_json::{Map, Value};

use crate::{
    Result,
    doc::Doc,
    field::{Field, FieldError},
    instance::Instance,
    object::{
        CursorField, DateField, InkField, List, ObjectField, ProxyField, RichTextField,
        SchemaHeaderField, ScriptField, ComputedField,
    },
};

/// Key holding the type tag in serialized objects.
pub const TYPE_KEY: &str = "__type";

/// Rebuilds a value from its serialized properties.
pub type Factory = fn(&Map<String, Value>, &Instance) -> Result<Field>;

/// Runs after a value has been rebuilt.
pub type AfterDeserialize = fn(&Field, &Instance) -> Result<()>;

#[derive(Clone, Copy)]
struct TypeEntry {
    factory: Factory,
    after: Option<AfterDeserialize>,
}

/// Type tag to factory mapping.
#[derive(Clone, Default)]
pub struct Registry {
    types: HashMap<String, TypeEntry>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in kind and documents registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let builtins: [(&str, Factory, Option<AfterDeserialize>); 11] = [
            ("Doc", |map, instance| Ok(Doc::from_json(map, instance)?.into()), Some(after_doc)),
            ("list", |map, instance| Ok(List::from_json(map, instance)?.into()), None),
            ("proxy", |map, instance| Ok(ProxyField::from_json(map, instance, false)?.into()), Some(after_proxy)),
            (
                "prefetch_proxy",
                |map, instance| Ok(ProxyField::from_json(map, instance, true)?.into()),
                Some(after_prefetch_proxy),
            ),
            ("schemaheader", |map, _| Ok(SchemaHeaderField::from_json(map)?.into()), None),
            ("script", |map, _| Ok(ScriptField::from_json(map, "script")?.into()), Some(after_script)),
            (
                "computed",
                |map, _| Ok(ComputedField::from_script(ScriptField::from_json(map, "computed")?).into()),
                Some(after_script),
            ),
            ("ink", |map, _| Ok(InkField::from_json(map)?.into()), None),
            ("cursors", |map, _| Ok(CursorField::from_json(map)?.into()), None),
            ("RichTextField", |map, _| Ok(RichTextField::from_json(map)?.into()), None),
            ("date", |map, _| Ok(DateField::from_json(map)?.into()), None),
        ];
        for (tag, factory, after) in builtins {
            registry.types.insert(tag.to_string(), TypeEntry { factory, after });
        }
        registry
    }

    /// Registers a tag. Registering the same tag twice is an error.
    pub fn register(
        &mut self,
        tag: impl Into<String>,
        factory: Factory,
        after: Option<AfterDeserialize>,
    ) -> Result<()> {
        let tag = tag.into();
        if self.types.contains_key(&tag) {
            return Err(FieldError::DuplicateType { type_name: tag }.into());
        }
        self.types.insert(tag, TypeEntry { factory, after });
        Ok(())
    }

    pub fn is_registered(&self, tag: &str) -> bool {
        self.types.contains_key(tag)
    }

    /// Serializes a field. Objects and documents must have registered tags.
    pub fn serialize(&self, field: &Field) -> Result<Value> {
        match field {
            Field::Number(n) => Ok(Value::from(*n)),
            Field::Text(s) => Ok(Value::String(s.clone())),
            Field::Bool(b) => Ok(Value::Bool(*b)),
            Field::Object(obj) => self.serialize_object(obj),
            Field::Ref(doc) => self.serialize_doc(doc),
        }
    }

    fn serialize_object(&self, obj: &ObjectField) -> Result<Value> {
        let tag = obj.type_tag();
        self.check_registered(tag)?;
        let mut map = obj.to_json(self)?;
        map.insert(TYPE_KEY.to_string(), Value::String(tag.to_string()));
        Ok(Value::Object(map))
    }

    /// Serializes a whole document with its own fields.
    pub fn serialize_doc(&self, doc: &Doc) -> Result<Value> {
        self.check_registered("Doc")?;
        let mut fields = Map::new();
        for (key, field) in doc.fields() {
            fields.insert(key, self.serialize(&field)?);
        }
        let mut map = Map::new();
        map.insert(TYPE_KEY.to_string(), Value::String("Doc".to_string()));
        map.insert("id".to_string(), Value::String(doc.id().to_string()));
        map.insert("fields".to_string(), Value::Object(fields));
        Ok(Value::Object(map))
    }

    fn check_registered(&self, tag: &str) -> Result<()> {
        if self.is_registered(tag) {
            Ok(())
        } else {
            Err(FieldError::UnregisteredType {
                type_name: tag.to_string(),
            }
            .into())
        }
    }

    /// Rebuilds a field. `null` reads as absent, as does an untagged object when the
    /// instance is configured for relaxed deserialization.
    pub fn deserialize(&self, value: &Value, instance: &Instance) -> Result<Option<Field>> {
        let map = match value {
            Value::Null => return Ok(None),
            Value::Bool(b) => return Ok(Some(Field::Bool(*b))),
            Value::Number(n) => {
                return n.as_f64().map(|n| Some(Field::Number(n))).ok_or_else(|| {
                    FieldError::InvalidValue {
                        reason: format!("number {n} is not representable"),
                    }
                    .into()
                });
            }
            Value::String(s) => return Ok(Some(Field::Text(s.clone()))),
            Value::Array(_) => None,
            Value::Object(map) => Some(map),
        };

        let Some(tag) = map.and_then(|map| map.get(TYPE_KEY)).and_then(Value::as_str) else {
            if instance.config().is_relaxed() {
                tracing::warn!("Serialized field has no '__type'; reading it as absent");
                return Ok(None);
            }
            return Err(FieldError::MissingTypeTag.into());
        };
        let entry = self.types.get(tag).copied().ok_or_else(|| FieldError::UnregisteredType {
            type_name: tag.to_string(),
        })?;
        let Some(map) = map else {
            return Err(FieldError::MissingTypeTag.into());
        };

        let field = (entry.factory)(map, instance)?;
        if let Some(after) = entry.after {
            after(&field, instance)?;
        }
        Ok(Some(field))
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<&String> = self.types.keys().collect();
        tags.sort();
        f.debug_struct("Registry").field("types", &tags).finish()
    }
}

fn after_doc(field: &Field, instance: &Instance) -> Result<()> {
    if let Field::Ref(doc) = field {
        if instance.config().prefetch_protos {
            doc.prefetch_proto();
        }
    }
    Ok(())
}

fn after_proxy(field: &Field, _instance: &Instance) -> Result<()> {
    if let Field::Object(ObjectField::Proxy(proxy)) = field {
        proxy.adopt_resident();
    }
    Ok(())
}

fn after_prefetch_proxy(field: &Field, _instance: &Instance) -> Result<()> {
    if let Field::Object(ObjectField::Proxy(proxy)) = field {
        let _ = proxy.value();
    }
    Ok(())
}

fn after_script(field: &Field, instance: &Instance) -> Result<()> {
    match field {
        Field::Object(ObjectField::Script(script)) => script.recompile(instance),
        Field::Object(ObjectField::Computed(computed)) => computed.script().recompile(instance),
        _ => Ok(()),
    }
}
