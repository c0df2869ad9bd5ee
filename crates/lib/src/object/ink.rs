//! Freehand ink strokes.

use std::{collections::BTreeMap, fmt, sync::Arc};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    Result,
    field::FieldError,
    object::{ObjectBase, ObjectFieldKind},
    serialization::Registry,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InkPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InkTool {
    #[default]
    Pen,
    Highlighter,
    Eraser,
    Scrubber,
    None,
}

/// One stroke of ink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stroke {
    pub path_data: Vec<InkPoint>,
    pub color: String,
    pub width: f64,
    #[serde(default)]
    pub tool: InkTool,
}

struct InkInner {
    base: ObjectBase,
    strokes: RwLock<BTreeMap<String, Stroke>>,
}

/// A set of ink strokes keyed by stroke id.
#[derive(Clone)]
pub struct InkField(Arc<InkInner>);

impl Default for InkField {
    fn default() -> Self {
        Self::new(BTreeMap::new())
    }
}

impl InkField {
    pub fn new(strokes: BTreeMap<String, Stroke>) -> Self {
        Self(Arc::new(InkInner {
            base: ObjectBase::new(),
            strokes: RwLock::new(strokes),
        }))
    }

    pub fn strokes(&self) -> BTreeMap<String, Stroke> {
        self.0.strokes.read().clone()
    }

    pub fn stroke(&self, id: &str) -> Option<Stroke> {
        self.0.strokes.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.0.strokes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.strokes.read().is_empty()
    }

    /// Adds or replaces a stroke.
    pub fn set_stroke(&self, id: impl Into<String>, stroke: Stroke) {
        self.0.strokes.write().insert(id.into(), stroke);
        self.notify();
    }

    /// Removes a stroke. Returns it if it existed; nothing is reported otherwise.
    pub fn remove_stroke(&self, id: &str) -> Option<Stroke> {
        let removed = self.0.strokes.write().remove(id);
        if removed.is_some() {
            self.notify();
        }
        removed
    }

    pub(crate) fn from_json(map: &Map<String, Value>) -> Result<Self> {
        let data = map.get("inkData").cloned().unwrap_or(Value::Object(Map::new()));
        let strokes: BTreeMap<String, Stroke> =
            serde_json::from_value(data).map_err(|e| FieldError::DeserializationFailed {
                type_tag: "ink".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self::new(strokes))
    }
}

impl ObjectFieldKind for InkField {
    fn type_tag(&self) -> &'static str {
        "ink"
    }

    fn base(&self) -> &ObjectBase {
        &self.0.base
    }

    fn copy(&self) -> Self {
        Self::new(self.strokes())
    }

    fn to_script_string(&self) -> String {
        let data = serde_json::to_string(&*self.0.strokes.read()).unwrap_or_default();
        format!("new InkField({data})")
    }

    fn to_display_string(&self) -> String {
        "InkField".to_string()
    }

    fn to_json(&self, _registry: &Registry) -> Result<Map<String, Value>> {
        let mut map = Map::new();
        map.insert(
            "inkData".to_string(),
            serde_json::to_value(&*self.0.strokes.read())?,
        );
        Ok(map)
    }

    fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for InkField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InkField")
            .field("strokes", &self.len())
            .finish()
    }
}
