use std::{fmt, sync::Arc};

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use crate::{
    Result,
    field::FieldError,
    object::{ObjectBase, ObjectFieldKind},
    serialization::Registry,
};

struct DateInner {
    base: ObjectBase,
    date: DateTime<Utc>,
}

/// A point in time, stored as milliseconds since the epoch.
#[derive(Clone)]
pub struct DateField(Arc<DateInner>);

impl DateField {
    pub fn new(date: DateTime<Utc>) -> Self {
        Self(Arc::new(DateInner {
            base: ObjectBase::new(),
            date,
        }))
    }

    pub fn now() -> Self {
        Self::new(Utc::now())
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.0.date
    }

    pub(crate) fn from_json(map: &Map<String, Value>) -> Result<Self> {
        let invalid = |reason: &str| FieldError::DeserializationFailed {
            type_tag: "date".to_string(),
            reason: reason.to_string(),
        };
        let millis = map
            .get("date")
            .and_then(Value::as_i64)
            .ok_or_else(|| invalid("missing 'date' milliseconds"))?;
        let date = Utc
            .timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| invalid("timestamp out of range"))?;
        Ok(Self::new(date))
    }
}

impl ObjectFieldKind for DateField {
    fn type_tag(&self) -> &'static str {
        "date"
    }

    fn base(&self) -> &ObjectBase {
        &self.0.base
    }

    fn copy(&self) -> Self {
        Self::new(self.0.date)
    }

    fn to_script_string(&self) -> String {
        format!("new DateField(new Date({}))", self.0.date.timestamp_millis())
    }

    fn to_display_string(&self) -> String {
        self.0.date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
    }

    fn to_json(&self, _registry: &Registry) -> Result<Map<String, Value>> {
        let mut map = Map::new();
        map.insert("date".to_string(), Value::from(self.0.date.timestamp_millis()));
        Ok(map)
    }

    fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for DateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DateField").field(&self.0.date).finish()
    }
}
