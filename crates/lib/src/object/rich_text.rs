use std::{fmt, sync::Arc};

use serde_json::{Map, Value};

use crate::{
    Result,
    object::{ObjectBase, ObjectFieldKind},
    serialization::Registry,
};

struct RichTextInner {
    base: ObjectBase,
    data: String,
    text: String,
}

/// Serialized rich-text editor state together with its plain text.
#[derive(Clone)]
pub struct RichTextField(Arc<RichTextInner>);

impl RichTextField {
    pub fn new(data: impl Into<String>, text: impl Into<String>) -> Self {
        Self(Arc::new(RichTextInner {
            base: ObjectBase::new(),
            data: data.into(),
            text: text.into(),
        }))
    }

    /// Editor state as stored.
    pub fn data(&self) -> &str {
        &self.0.data
    }

    /// Plain text content.
    pub fn text(&self) -> &str {
        &self.0.text
    }

    pub(crate) fn from_json(map: &Map<String, Value>) -> Result<Self> {
        let text = |key: &str| map.get(key).and_then(Value::as_str).unwrap_or_default();
        Ok(Self::new(text("Data"), text("Text")))
    }
}

impl ObjectFieldKind for RichTextField {
    fn type_tag(&self) -> &'static str {
        "RichTextField"
    }

    fn base(&self) -> &ObjectBase {
        &self.0.base
    }

    fn copy(&self) -> Self {
        Self::new(self.0.data.clone(), self.0.text.clone())
    }

    fn to_script_string(&self) -> String {
        format!(
            "new RichTextField({}, {})",
            Value::String(self.0.data.clone()),
            Value::String(self.0.text.clone())
        )
    }

    fn to_display_string(&self) -> String {
        self.0.text.clone()
    }

    fn to_json(&self, _registry: &Registry) -> Result<Map<String, Value>> {
        let mut map = Map::new();
        map.insert("Data".to_string(), Value::String(self.0.data.clone()));
        map.insert("Text".to_string(), Value::String(self.0.text.clone()));
        Ok(map)
    }

    fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for RichTextField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RichTextField").field(&self.0.text).finish()
    }
}
