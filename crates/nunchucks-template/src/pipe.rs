//! Host-side value pipelines.
//!
//! A small helper for threading a [`Value`] through a series of steps,
//! outside any template. Steps are plain closures or built-in filters.
//!
//! ```
//! use nunchucks_template::pipe::{combine, Pipe, PipelineStep};
//! use nunchucks_template::value::Value;
//!
//! let add = |v: &Value, args: &[Value]| Value::Number(v.to_float(0.0) + args[0].to_float(0.0));
//! assert_eq!(Pipe::of(2).to(add, &[Value::from(3)]).into_value(), Value::from(5));
//!
//! let shout = combine(vec![
//!     PipelineStep::filter("upper", Vec::new()),
//!     PipelineStep::filter("replace", vec![Value::from("O"), Value::from("0")]),
//! ]);
//! assert_eq!(shout(Value::from("foo")), Value::from("F00"));
//! ```

use std::sync::Arc;

use crate::expr::parse_literal;
use crate::filters::default_registry;
use crate::value::Value;

/// One pipeline stage: `(value, args) -> value`.
pub type Step = Arc<dyn Fn(&Value, &[Value]) -> Value + Send + Sync>;

/// A step together with the arguments it is called with.
#[derive(Clone, Default)]
pub struct PipelineStep {
    step: Option<Step>,
    args: Vec<Value>,
}

impl PipelineStep {
    pub fn new<F>(step: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> Value + Send + Sync + 'static,
    {
        Self {
            step: Some(Arc::new(step)),
            args: Vec::new(),
        }
    }

    pub fn with_args<F>(step: F, args: Vec<Value>) -> Self
    where
        F: Fn(&Value, &[Value]) -> Value + Send + Sync + 'static,
    {
        Self {
            step: Some(Arc::new(step)),
            args,
        }
    }

    /// A step that applies the built-in filter `name`.
    pub fn filter(name: &str, args: Vec<Value>) -> Self {
        let name = name.to_string();
        Self::with_args(move |v, a| default_registry().apply(&name, v, a), args)
    }
}

/// A value moving through a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipe {
    value: Value,
}

impl Pipe {
    pub fn of(value: impl Into<Value>) -> Self {
        Self { value: value.into() }
    }

    /// Applies `step` to the current value.
    #[must_use]
    pub fn to<F>(self, step: F, args: &[Value]) -> Self
    where
        F: Fn(&Value, &[Value]) -> Value,
    {
        Self {
            value: step(&self.value, args),
        }
    }

    pub const fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }
}

/// Builds a function that runs its input through `steps` in order.
///
/// String arguments are decoded with [`parse_var`] on each call. Steps
/// without a function are skipped.
pub fn combine(steps: Vec<PipelineStep>) -> impl Fn(Value) -> Value + Send + Sync {
    move |input| {
        steps
            .iter()
            .fold(Pipe::of(input), |acc, stage| match &stage.step {
                Some(step) => {
                    let args: Vec<Value> = stage.args.iter().map(parse_var).collect();
                    acc.to(|v, a| step(v, a), &args)
                }
                None => acc,
            })
            .into_value()
    }
}

/// Decodes a loosely typed argument.
///
/// Strings are trimmed and read as a literal (`42`, `true`, `null`, quoted
/// text), then as JSON if they start with `{` or `[`. A string that is
/// neither is returned unchanged. Non-string values pass through.
pub fn parse_var(value: &Value) -> Value {
    let Value::String(raw) = value else {
        return value.clone();
    };
    let s = raw.trim();
    if s.is_empty() {
        return Value::String(String::new());
    }
    if let Some(literal) = parse_literal(s) {
        return literal;
    }
    if s.starts_with('{') || s.starts_with('[') {
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(s) {
            return Value::from(json);
        }
    }
    value.clone()
}
