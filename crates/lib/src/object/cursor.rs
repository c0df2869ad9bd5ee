//! Shared cursors of collaborating users.

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
pub struct CursorPosition {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorMetadata {
    /// User id.
    pub id: String,
    /// Display name shown next to the cursor.
    pub identifier: String,
    /// Milliseconds since the epoch of the last move.
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorData {
    pub metadata: CursorMetadata,
    pub position: CursorPosition,
}

struct CursorInner {
    base: ObjectBase,
    cursors: RwLock<BTreeMap<String, CursorData>>,
}

/// Cursor positions keyed by user id.
#[derive(Clone)]
pub struct CursorField(Arc<CursorInner>);

impl Default for CursorField {
    fn default() -> Self {
        Self::new(BTreeMap::new())
    }
}

impl CursorField {
    pub fn new(cursors: BTreeMap<String, CursorData>) -> Self {
        Self(Arc::new(CursorInner {
            base: ObjectBase::new(),
            cursors: RwLock::new(cursors),
        }))
    }

    pub fn cursors(&self) -> BTreeMap<String, CursorData> {
        self.0.cursors.read().clone()
    }

    pub fn cursor(&self, user_id: &str) -> Option<CursorData> {
        self.0.cursors.read().get(user_id).cloned()
    }

    /// Moves a user's cursor, adding the user if needed.
    pub fn set_position(
        &self,
        user_id: &str,
        identifier: impl Into<String>,
        position: CursorPosition,
    ) {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let identifier = identifier.into();
        {
            let mut cursors = self.0.cursors.write();
            let entry = cursors
                .entry(user_id.to_string())
                .or_insert_with(|| CursorData {
                    metadata: CursorMetadata {
                        id: user_id.to_string(),
                        identifier: identifier.clone(),
                        timestamp,
                    },
                    position,
                });
            entry.metadata.identifier = identifier;
            entry.metadata.timestamp = timestamp;
            entry.position = position;
        }
        self.notify();
    }

    pub(crate) fn from_json(map: &Map<String, Value>) -> Result<Self> {
        let data = map.get("cursors").cloned().unwrap_or(Value::Object(Map::new()));
        let cursors: BTreeMap<String, CursorData> =
            serde_json::from_value(data).map_err(|e| FieldError::DeserializationFailed {
                type_tag: "cursors".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self::new(cursors))
    }
}

impl ObjectFieldKind for CursorField {
    fn type_tag(&self) -> &'static str {
        "cursors"
    }

    fn base(&self) -> &ObjectBase {
        &self.0.base
    }

    fn copy(&self) -> Self {
        Self::new(self.cursors())
    }

    fn to_script_string(&self) -> String {
        "invalid".to_string()
    }

    fn to_display_string(&self) -> String {
        "CursorField".to_string()
    }

    fn to_json(&self, _registry: &Registry) -> Result<Map<String, Value>> {
        let mut map = Map::new();
        map.insert(
            "cursors".to_string(),
            serde_json::to_value(&*self.0.cursors.read())?,
        );
        Ok(map)
    }

    fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for CursorField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.cursors.read().iter()).finish()
    }
}
