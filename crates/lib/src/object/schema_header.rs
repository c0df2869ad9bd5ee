//! Column headers for tabular views of a collection.

use std::{fmt, sync::Arc};

use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::{
    Result,
    object::{ObjectBase, ObjectFieldKind},
    serialization::Registry,
};

/// Pastel colors handed out to new columns.
pub const PASTEL_PALETTE: &[&str] = &[
    "#ff9cee", "#ffccf9", "#fcc2ff", "#f6a6ff", "#b28dff", "#c5a3ff", "#d5aaff", "#ecd4ff",
    "#dcd3ff", "#a79aff", "#b5b9ff", "#97a2ff", "#afcbff", "#aff8db", "#c4faf8", "#85e3ff",
    "#ace7ff", "#bffcc6", "#dbffd6", "#f3ffe3", "#e7ffac", "#ffffd1", "#fff5ba", "#ffabab",
    "#ffbebc", "#ffcbc1", "#ffd5b3", "#f1efeb",
];

/// Value type shown in a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnType {
    #[default]
    Any,
    Number,
    String,
    Boolean,
    Doc,
    Image,
    List,
    Date,
}

impl ColumnType {
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Unknown codes read as [`ColumnType::Any`].
    pub fn from_u32(code: u32) -> Self {
        match code {
            1 => ColumnType::Number,
            2 => ColumnType::String,
            3 => ColumnType::Boolean,
            4 => ColumnType::Doc,
            5 => ColumnType::Image,
            6 => ColumnType::List,
            7 => ColumnType::Date,
            _ => ColumnType::Any,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Header {
    heading: String,
    color: String,
    column_type: ColumnType,
    width: f64,
    desc: Option<bool>,
    collapsed: Option<bool>,
}

struct HeaderInner {
    base: ObjectBase,
    header: RwLock<Header>,
}

/// A column header: heading, color, value type, width and sort state.
///
/// Every setter reports the change to the document (or list) holding the header.
#[derive(Clone)]
pub struct SchemaHeaderField(Arc<HeaderInner>);

impl SchemaHeaderField {
    pub fn new(heading: impl Into<String>, color: impl Into<String>) -> Self {
        Self::with_type(heading, color, ColumnType::Any)
    }

    pub fn with_type(
        heading: impl Into<String>,
        color: impl Into<String>,
        column_type: ColumnType,
    ) -> Self {
        Self::from_header(Header {
            heading: heading.into(),
            color: color.into(),
            column_type,
            width: -1.0,
            desc: None,
            collapsed: None,
        })
    }

    /// A header with a palette color chosen from the heading text.
    pub fn pastel(heading: impl Into<String>) -> Self {
        let heading = heading.into();
        let index = heading.bytes().fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
        let color = PASTEL_PALETTE[index % PASTEL_PALETTE.len()];
        Self::new(heading, color)
    }

    fn from_header(header: Header) -> Self {
        Self(Arc::new(HeaderInner {
            base: ObjectBase::new(),
            header: RwLock::new(header),
        }))
    }

    pub fn heading(&self) -> String {
        self.0.header.read().heading.clone()
    }

    pub fn color(&self) -> String {
        self.0.header.read().color.clone()
    }

    pub fn column_type(&self) -> ColumnType {
        self.0.header.read().column_type
    }

    /// Column width; negative means unset.
    pub fn width(&self) -> f64 {
        self.0.header.read().width
    }

    /// Sort direction, `None` when unsorted.
    pub fn desc(&self) -> Option<bool> {
        self.0.header.read().desc
    }

    pub fn collapsed(&self) -> Option<bool> {
        self.0.header.read().collapsed
    }

    pub fn set_heading(&self, heading: impl Into<String>) {
        self.update(|header| header.heading = heading.into());
    }

    pub fn set_color(&self, color: impl Into<String>) {
        self.update(|header| header.color = color.into());
    }

    pub fn set_type(&self, column_type: ColumnType) {
        self.update(|header| header.column_type = column_type);
    }

    pub fn set_width(&self, width: f64) {
        self.update(|header| header.width = width);
    }

    pub fn set_desc(&self, desc: Option<bool>) {
        self.update(|header| header.desc = desc);
    }

    pub fn set_collapsed(&self, collapsed: Option<bool>) {
        self.update(|header| header.collapsed = collapsed);
    }

    fn update(&self, f: impl FnOnce(&mut Header)) {
        f(&mut self.0.header.write());
        self.notify();
    }

    /// Same heading, color, type, width, sort and collapse state.
    pub fn same_content(&self, other: &SchemaHeaderField) -> bool {
        *self.0.header.read() == *other.0.header.read()
    }

    pub(crate) fn from_json(map: &Map<String, Value>) -> Result<Self> {
        let text = |key: &str| map.get(key).and_then(Value::as_str).unwrap_or_default().to_string();
        let width = map.get("width").and_then(Value::as_f64).unwrap_or(-1.0);
        let column_type = map.get("type").and_then(Value::as_u64).unwrap_or(0) as u32;
        Ok(Self::from_header(Header {
            heading: text("heading"),
            color: text("color"),
            column_type: ColumnType::from_u32(column_type),
            width,
            desc: map.get("desc").and_then(Value::as_bool),
            collapsed: map.get("collapsed").and_then(Value::as_bool),
        }))
    }
}

impl ObjectFieldKind for SchemaHeaderField {
    fn type_tag(&self) -> &'static str {
        "schemaheader"
    }

    fn base(&self) -> &ObjectBase {
        &self.0.base
    }

    /// Copies heading, color and type; width and sort state start unset.
    fn copy(&self) -> Self {
        let header = self.0.header.read();
        Self::with_type(header.heading.clone(), header.color.clone(), header.column_type)
    }

    fn to_script_string(&self) -> String {
        let header = self.0.header.read();
        format!(
            "header({},{})",
            Value::String(header.heading.clone()),
            header.column_type.as_u32()
        )
    }

    fn to_display_string(&self) -> String {
        "SchemaHeaderField".to_string()
    }

    fn to_json(&self, _registry: &Registry) -> Result<Map<String, Value>> {
        let header = self.0.header.read();
        let mut map = Map::new();
        map.insert("heading".to_string(), Value::from(header.heading.clone()));
        map.insert("color".to_string(), Value::from(header.color.clone()));
        map.insert("type".to_string(), Value::from(header.column_type.as_u32()));
        map.insert("width".to_string(), Value::from(header.width));
        if let Some(desc) = header.desc {
            map.insert("desc".to_string(), Value::from(desc));
        }
        if let Some(collapsed) = header.collapsed {
            map.insert("collapsed".to_string(), Value::from(collapsed));
        }
        Ok(map)
    }

    fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for SchemaHeaderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SchemaHeaderField")
            .field(&*self.0.header.read())
            .finish()
    }
}
