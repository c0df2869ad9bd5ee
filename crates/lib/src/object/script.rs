//! Script and computed fields.
//!
//! The model does not evaluate expressions itself. A [`ScriptEngine`] supplied to
//! the [`Instance`] turns source text into a [`CompiledScript`]; the field keeps
//! both, and only the source text and options are persisted.

use std::{collections::BTreeMap, fmt, sync::Arc};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    Result,
    doc::Doc,
    field::{Field, FieldError},
    instance::Instance,
    object::{ObjectBase, ObjectFieldKind},
    serialization::Registry,
};

/// Compilation options persisted with a script.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScriptOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_type: Option<String>,
    pub add_return: bool,
    pub typecheck: bool,
    /// Parameter name to type name.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

/// An executable script produced by a [`ScriptEngine`].
pub trait CompiledScript: Send + Sync {
    /// Runs the script with `this` bound to the given document.
    fn run(&self, this: &Doc) -> std::result::Result<Option<Field>, String>;
}

/// Compiles script source text.
pub trait ScriptEngine: Send + Sync {
    fn compile(
        &self,
        source: &str,
        options: &ScriptOptions,
    ) -> std::result::Result<Arc<dyn CompiledScript>, String>;
}

struct ScriptInner {
    base: ObjectBase,
    source: String,
    options: ScriptOptions,
    compiled: RwLock<Option<Arc<dyn CompiledScript>>>,
}

/// A stored script.
#[derive(Clone)]
pub struct ScriptField(Arc<ScriptInner>);

impl ScriptField {
    /// Compiles `source` with `engine`.
    pub fn compile(
        engine: &dyn ScriptEngine,
        source: impl Into<String>,
        options: ScriptOptions,
    ) -> Result<Self> {
        let script = Self::uncompiled(source, options);
        script.compile_with(engine)?;
        Ok(script)
    }

    /// Wraps an already compiled script.
    pub fn from_compiled(
        source: impl Into<String>,
        options: ScriptOptions,
        compiled: Arc<dyn CompiledScript>,
    ) -> Self {
        Self::build(source.into(), options, Some(compiled))
    }

    pub(crate) fn uncompiled(source: impl Into<String>, options: ScriptOptions) -> Self {
        Self::build(source.into(), options, None)
    }

    fn build(
        source: String,
        options: ScriptOptions,
        compiled: Option<Arc<dyn CompiledScript>>,
    ) -> Self {
        Self(Arc::new(ScriptInner {
            base: ObjectBase::new(),
            source,
            options,
            compiled: RwLock::new(compiled),
        }))
    }

    /// Original source text.
    pub fn source(&self) -> &str {
        &self.0.source
    }

    pub fn options(&self) -> &ScriptOptions {
        &self.0.options
    }

    pub fn is_compiled(&self) -> bool {
        self.0.compiled.read().is_some()
    }

    /// (Re)compiles the source text, replacing any previous compiled form.
    pub fn compile_with(&self, engine: &dyn ScriptEngine) -> Result<()> {
        let compiled = engine
            .compile(&self.0.source, &self.0.options)
            .map_err(|reason| FieldError::ScriptCompileFailed {
                source_text: self.0.source.clone(),
                reason,
            })?;
        *self.0.compiled.write() = Some(compiled);
        Ok(())
    }

    /// Runs the script against `this`. Failures and uncompiled scripts give `None`.
    pub fn run(&self, this: &Doc) -> Option<Field> {
        let compiled = self.0.compiled.read().clone();
        let Some(compiled) = compiled else {
            tracing::debug!(source = %self.0.source, "Script has not been compiled");
            return None;
        };
        match compiled.run(this) {
            Ok(value) => value,
            Err(reason) => {
                tracing::debug!(source = %self.0.source, %reason, "Script failed");
                None
            }
        }
    }

    fn shallow_copy(&self) -> Self {
        Self::build(
            self.0.source.clone(),
            self.0.options.clone(),
            self.0.compiled.read().clone(),
        )
    }

    pub(crate) fn from_json(map: &Map<String, Value>, type_tag: &str) -> Result<Self> {
        let script = map
            .get("script")
            .and_then(Value::as_object)
            .ok_or_else(|| FieldError::DeserializationFailed {
                type_tag: type_tag.to_string(),
                reason: "missing 'script' object".to_string(),
            })?;
        let source = script
            .get("originalScript")
            .and_then(Value::as_str)
            .ok_or_else(|| FieldError::DeserializationFailed {
                type_tag: type_tag.to_string(),
                reason: "missing 'originalScript'".to_string(),
            })?;
        let options = match script.get("options") {
            Some(options) => serde_json::from_value(options.clone())?,
            None => ScriptOptions::default(),
        };
        Ok(Self::uncompiled(source, options))
    }

    /// Recompiles a deserialized script with the instance's engine.
    pub(crate) fn recompile(&self, instance: &Instance) -> Result<()> {
        match instance.script_engine() {
            Some(engine) => self.compile_with(engine.as_ref()),
            None => {
                tracing::warn!(source = %self.0.source, "No script engine configured; script left uncompiled");
                Ok(())
            }
        }
    }

    fn script_json(&self) -> Result<Map<String, Value>> {
        let mut script = Map::new();
        script.insert(
            "originalScript".to_string(),
            Value::String(self.0.source.clone()),
        );
        script.insert(
            "options".to_string(),
            serde_json::to_value(&self.0.options)?,
        );
        let mut map = Map::new();
        map.insert("script".to_string(), Value::Object(script));
        Ok(map)
    }
}

impl ObjectFieldKind for ScriptField {
    fn type_tag(&self) -> &'static str {
        "script"
    }

    fn base(&self) -> &ObjectBase {
        &self.0.base
    }

    /// Shares the compiled form; compiled scripts are immutable.
    fn copy(&self) -> Self {
        self.shallow_copy()
    }

    fn to_script_string(&self) -> String {
        format!("new ScriptField({})", Value::String(self.0.source.clone()))
    }

    fn to_display_string(&self) -> String {
        format!("ScriptField({})", self.0.source)
    }

    fn to_json(&self, _registry: &Registry) -> Result<Map<String, Value>> {
        self.script_json()
    }

    fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ScriptField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptField")
            .field("source", &self.0.source)
            .field("compiled", &self.is_compiled())
            .finish()
    }
}

/// A script whose result is the value of the key it is stored under.
///
/// Reading a document key that holds a computed field runs the script with
/// `this` bound to the document being read, which may be a delegate of the
/// document the field is stored on.
#[derive(Clone)]
pub struct ComputedField(ScriptField);

impl ComputedField {
    pub fn compile(
        engine: &dyn ScriptEngine,
        source: impl Into<String>,
        options: ScriptOptions,
    ) -> Result<Self> {
        Ok(Self(ScriptField::compile(engine, source, options)?))
    }

    /// Compiles `source` with the instance's engine and default options.
    pub fn make_function(instance: &Instance, source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        let Some(engine) = instance.script_engine() else {
            return Err(FieldError::ScriptCompileFailed {
                source_text: source,
                reason: "no script engine configured".to_string(),
            }
            .into());
        };
        Self::compile(engine.as_ref(), source, ScriptOptions::default())
    }

    pub fn from_script(script: ScriptField) -> Self {
        Self(script)
    }

    /// The underlying script.
    pub fn script(&self) -> &ScriptField {
        &self.0
    }

    pub fn source(&self) -> &str {
        self.0.source()
    }

    /// Evaluates the field for `this`.
    pub fn value(&self, this: &Doc) -> Option<Field> {
        self.0.run(this)
    }
}

impl ObjectFieldKind for ComputedField {
    fn type_tag(&self) -> &'static str {
        "computed"
    }

    fn base(&self) -> &ObjectBase {
        self.0.base()
    }

    fn copy(&self) -> Self {
        Self(self.0.shallow_copy())
    }

    fn to_script_string(&self) -> String {
        format!("new ComputedField({})", Value::String(self.source().to_string()))
    }

    fn to_display_string(&self) -> String {
        format!("ComputedField({})", self.source())
    }

    fn to_json(&self, _registry: &Registry) -> Result<Map<String, Value>> {
        self.0.script_json()
    }

    fn ptr_eq(&self, other: &Self) -> bool {
        self.0.ptr_eq(&other.0)
    }
}

impl fmt::Debug for ComputedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ComputedField").field(&self.0).finish()
    }
}
