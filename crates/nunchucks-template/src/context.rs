//! Render context and variable scopes.
//!
//! [`Context`] is the caller-supplied data a template renders against.
//! [`Scope`] pairs it with the local bindings (`set`, loop variables, macro
//! parameters, imports) that a render accumulates. Scopes are plain values:
//! a nested render clones its parent's scope, so nothing it binds leaks back.

use std::sync::Arc;

use nunchucks_core::error::NunchucksError;

use crate::value::{Map, Value};

/// Caller-supplied render data.
///
/// # Examples
///
/// ```
/// use nunchucks_template::context::Context;
///
/// let mut ctx = Context::new();
/// ctx.set("name", "World");
/// ctx.set("count", 3);
/// assert_eq!(ctx.get("name").unwrap().to_string(), "World");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    values: Map,
}

impl Context {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `key` to `value`, replacing any previous binding.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Returns the value bound to `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Returns `true` if `key` is bound.
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Number of top-level bindings.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Decodes a JSON object into a context.
    ///
    /// # Errors
    ///
    /// Returns `SerializationError` if `json` is not valid JSON, or is
    /// valid JSON but not an object.
    pub fn from_json_str(json: &str) -> Result<Self, NunchucksError> {
        let parsed: serde_json::Value = serde_json::from_str(json)?;
        match Value::from(parsed) {
            Value::Map(values) => Ok(Self { values }),
            other => Err(NunchucksError::SerializationError(format!(
                "context must be a JSON object, got {}",
                other.kind()
            ))),
        }
    }

    /// Consumes the context, returning its bindings.
    pub fn into_map(self) -> Map {
        self.values
    }
}

impl From<Map> for Context {
    fn from(values: Map) -> Self {
        Self { values }
    }
}

impl From<serde_json::Value> for Context {
    /// Objects become bindings; any other JSON value yields an empty context.
    fn from(value: serde_json::Value) -> Self {
        match Value::from(value) {
            Value::Map(values) => Self { values },
            _ => Self::default(),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// The `(vars, ctx)` pair used for identifier resolution.
///
/// `vars` is owned and mutable; `ctx` is shared read-only by every scope
/// derived from the same render call.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    vars: Map,
    ctx: Arc<Map>,
}

impl Scope {
    /// Creates a scope with no local bindings over `ctx`.
    pub fn new(ctx: Arc<Map>) -> Self {
        Self {
            vars: Map::new(),
            ctx,
        }
    }

    /// A scope with neither locals nor context.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Binds a local variable.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.vars.insert(key.into(), value);
    }

    /// Returns a local binding, ignoring the context.
    pub fn local(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    /// Resolves a name or dotted path.
    ///
    /// Exact keys are tried in `vars` then `ctx`; if the name contains
    /// dots the path is then walked through `vars` and then `ctx`.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        let key = name.trim();
        if key.is_empty() {
            return None;
        }
        if let Some(v) = self.vars.get(key).or_else(|| self.ctx.get(key)) {
            return Some(v.clone());
        }
        if key.contains('.') {
            return path_in(&self.vars, key).or_else(|| path_in(&self.ctx, key));
        }
        None
    }

    /// Like [`lookup`](Self::lookup), but yields [`Value::Missing`] when
    /// nothing is bound.
    pub fn resolve(&self, name: &str) -> Value {
        self.lookup(name).unwrap_or(Value::Missing)
    }
}

fn path_in(map: &Map, path: &str) -> Option<Value> {
    let (head, rest) = path.split_once('.')?;
    map.get(head)?.by_path(rest)
}
