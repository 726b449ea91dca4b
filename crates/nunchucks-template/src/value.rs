//! The dynamic value type flowing through the engine.
//!
//! [`Value`] is a closed tagged union. Every consumer (filters, tests,
//! comparisons, output) pattern-matches on it directly. [`Value::Missing`]
//! is kept apart from [`Value::Null`]: it marks a lookup that found no
//! binding, renders as the empty string, and is only equal to itself.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::render::Macro;

/// A string-keyed mapping of values. Keys iterate in sorted order.
pub type Map = BTreeMap<String, Value>;

/// Signature of a host function callable from templates.
pub type NativeFn = dyn Fn(&[Value], &Map) -> Value + Send + Sync;

/// Something a template can call with `(...)`.
#[derive(Clone)]
pub enum Callable {
    /// A template-defined macro together with its captured scope.
    Macro(Arc<Macro>),
    /// The `caller()` of a `{% call %}` block; returns the rendered body.
    Caller(Arc<str>),
    /// A host-provided function.
    Native(Arc<NativeFn>),
}

impl Callable {
    /// Identity comparison. Two callables are equal only if they are the
    /// same macro or function, or callers holding the same text.
    fn same(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Macro(a), Self::Macro(b)) => Arc::ptr_eq(a, b),
            (Self::Caller(a), Self::Caller(b)) => a == b,
            (Self::Native(a), Self::Native(b)) => {
                Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Macro(m) => write!(f, "Macro({})", m.name()),
            Self::Caller(_) => f.write_str("Caller"),
            Self::Native(_) => f.write_str("Native"),
        }
    }
}

/// A dynamic template value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// An explicit null (`null`, `nil`, JSON `null`).
    #[default]
    Null,
    /// A boolean.
    Bool(bool),
    /// A number. Integers and decimals share one representation.
    Number(f64),
    /// A string.
    String(String),
    /// An ordered sequence.
    Seq(Vec<Value>),
    /// A string-keyed mapping.
    Map(Map),
    /// No binding was found for a name or path.
    Missing,
    /// A macro, caller, or host function.
    Callable(Callable),
}

impl Value {
    /// Wraps a host closure as a callable value.
    ///
    /// ```
    /// use nunchucks_template::value::Value;
    ///
    /// let double = Value::function(|args, _kwargs| {
    ///     Value::Number(args.first().map_or(0.0, |v| v.to_float(0.0)) * 2.0)
    /// });
    /// assert!(matches!(double, Value::Callable(_)));
    /// ```
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&[Value], &Map) -> Value + Send + Sync + 'static,
    {
        Self::Callable(Callable::Native(Arc::new(f)))
    }

    /// Returns `true` for [`Value::Missing`].
    pub const fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Returns `true` for null or missing values.
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::Null | Self::Missing)
    }

    /// Returns `true` for numbers.
    pub const fn is_number(&self) -> bool {
        matches!(self, Self::Number(_))
    }

    /// A short name for the variant, used to keep values of different
    /// types apart when grouping.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Seq(_) => "sequence",
            Self::Map(_) => "mapping",
            Self::Missing => "missing",
            Self::Callable(_) => "callable",
        }
    }

    /// Template truthiness.
    ///
    /// Null, missing, `false`, zero, whitespace-only strings and empty
    /// collections are falsy. Everything else, including callables, is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null | Self::Missing => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0,
            Self::String(s) => !s.trim().is_empty(),
            Self::Seq(items) => !items.is_empty(),
            Self::Map(map) => !map.is_empty(),
            Self::Callable(_) => true,
        }
    }

    /// Emptiness as used by `default(x, true)`: like falsiness, except that
    /// a string of spaces is not empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null | Self::Missing => true,
            Self::Bool(b) => !b,
            Self::Number(n) => *n == 0.0,
            Self::String(s) => s.is_empty(),
            Self::Seq(items) => items.is_empty(),
            Self::Map(map) => map.is_empty(),
            Self::Callable(_) => false,
        }
    }

    /// Numeric coercion. Numbers pass through, strings are parsed after
    /// trimming, anything else yields `default`.
    pub fn to_float(&self, default: f64) -> f64 {
        match self {
            Self::Number(n) => *n,
            Self::String(s) => s.trim().parse::<f64>().unwrap_or(default),
            _ => default,
        }
    }

    /// Integer coercion. Numbers are truncated toward zero; strings must
    /// hold an integer literal.
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_int(&self, default: i64) -> i64 {
        match self {
            Self::Number(n) => n.trunc() as i64,
            Self::String(s) => s.trim().parse::<i64>().unwrap_or(default),
            _ => default,
        }
    }

    /// Boolean coercion for flag arguments. Accepts booleans and the
    /// strings `true/1/yes` and `false/0/no`.
    pub fn to_bool(&self, default: bool) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => default,
            },
            _ => default,
        }
    }

    /// Returns the string slice if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the items if this is a sequence.
    pub fn as_seq(&self) -> Option<&[Self]> {
        match self {
            Self::Seq(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the mapping if this is a map.
    pub const fn as_map(&self) -> Option<&Map> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Member access (`value.key`). Anything other than a map holding
    /// `key` yields [`Value::Missing`].
    pub fn get_attr(&self, key: &str) -> Self {
        match self {
            Self::Map(map) => map.get(key).cloned().unwrap_or(Self::Missing),
            _ => Self::Missing,
        }
    }

    /// Subscript access (`value[index]`).
    ///
    /// Sequences and strings take integer indexes, negative ones counting
    /// from the end. Maps take the index's string form as key.
    pub fn get_index(&self, index: &Self) -> Self {
        match self {
            Self::Seq(items) => resolve_offset(index, items.len())
                .and_then(|i| items.get(i).cloned())
                .unwrap_or(Self::Missing),
            Self::String(s) => {
                let chars: Vec<char> = s.chars().collect();
                resolve_offset(index, chars.len())
                    .and_then(|i| chars.get(i))
                    .map_or(Self::Missing, |c| Self::String(c.to_string()))
            }
            Self::Map(_) => self.get_attr(&index.to_string()),
            _ => Self::Missing,
        }
    }

    /// Walks a dot-separated path. An empty path yields the value itself.
    /// Map segments are looked up by key; numeric segments index sequences.
    pub fn by_path(&self, path: &str) -> Option<Self> {
        if path.trim().is_empty() {
            return Some(self.clone());
        }
        let mut cur = self;
        for part in path.split('.') {
            cur = match cur {
                Self::Map(map) => map.get(part)?,
                Self::Seq(items) => items.get(part.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(cur.clone())
    }

    /// Membership test used by `in`: substring for strings, element
    /// equality for sequences, key presence for maps.
    pub fn contains(&self, item: &Self) -> bool {
        match self {
            Self::String(s) => s.contains(&item.to_string()),
            Self::Seq(items) => items.iter().any(|v| v == item),
            Self::Map(map) => map.contains_key(&item.to_string()),
            _ => false,
        }
    }

    /// Converts to JSON. Missing values and callables become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

fn resolve_offset(index: &Value, len: usize) -> Option<usize> {
    let idx = match index {
        Value::Number(_) | Value::String(_) => index.to_int(i64::MIN),
        _ => return None,
    };
    if idx == i64::MIN {
        return None;
    }
    let len = i64::try_from(len).ok()?;
    let idx = if idx < 0 { len + idx } else { idx };
    usize::try_from(idx).ok()
}

/// Orders two values for sorting.
///
/// Missing sorts first. Two numbers compare numerically; any other pair
/// compares by string form, lowercased unless `case_sensitive`.
pub fn compare_values(a: &Value, b: &Value, case_sensitive: bool) -> Ordering {
    match (a, b) {
        (Value::Missing, Value::Missing) => Ordering::Equal,
        (Value::Missing, _) => Ordering::Less,
        (_, Value::Missing) => Ordering::Greater,
        (Value::Number(x), Value::Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        _ => {
            let (mut x, mut y) = (a.to_string(), b.to_string());
            if !case_sensitive {
                x = x.to_lowercase();
                y = y.to_lowercase();
            }
            x.cmp(&y)
        }
    }
}

/// Formats a number the way templates print it: integral values without a
/// fractional part, others in their shortest round-trip form.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let sign = if n > 0.0 { "+" } else { "-" };
        format!("{sign}Inf")
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) | (Self::Missing, Self::Missing) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Seq(a), Self::Seq(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Callable(a), Self::Callable(b)) => a.same(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null | Self::Missing | Self::Callable(_) => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => f.write_str(&format_number(*n)),
            Self::String(s) => f.write_str(s),
            Self::Seq(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Map(map) => {
                f.write_str("map[")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{k}:{v}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl Serialize for Value {
    #[allow(clippy::cast_possible_truncation)]
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null | Self::Missing | Self::Callable(_) => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 9.0e15 {
                    serializer.serialize_i64(*n as i64)
                } else {
                    serializer.serialize_f64(*n)
                }
            }
            Self::String(s) => serializer.serialize_str(s),
            Self::Seq(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
        }
    }
}

// ── Conversions ─────────────────────────────────────────────────────

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    #[allow(clippy::cast_precision_loss)]
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<usize> for Value {
    #[allow(clippy::cast_precision_loss)]
    fn from(n: usize) -> Self {
        Self::Number(n as f64)
    }
}

impl<T: Into<Self>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::Seq(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Into::into)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Self::Map(map)
    }
}

impl<T: Into<Self>> FromIterator<T> for Value {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::Seq(iter.into_iter().map(Into::into).collect())
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(arr) => Self::Seq(arr.into_iter().map(Self::from).collect()),
            serde_json::Value::Object(obj) => {
                Self::Map(obj.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display_numbers() {
        assert_eq!(Value::Number(3.0).to_string(), "3");
        assert_eq!(Value::Number(-2.0).to_string(), "-2");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
        assert_eq!(Value::Number(f64::INFINITY).to_string(), "+Inf");
    }

    #[test]
    fn test_display_scalars() {
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::Missing.to_string(), "");
        assert_eq!(Value::function(|_, _| Value::Null).to_string(), "");
    }

    #[test]
    fn test_display_collections() {
        let seq = Value::from(vec!["a", "b"]);
        assert_eq!(seq.to_string(), "[a b]");
        let map = Value::from(json!({"b": 2, "a": "x"}));
        assert_eq!(map.to_string(), "map[a:x b:2]");
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Missing.is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(!Value::from("   ").is_truthy());
        assert!(Value::from("x").is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(Value::Number(-1.0).is_truthy());
        assert!(!Value::Seq(vec![]).is_truthy());
        assert!(Value::function(|_, _| Value::Null).is_truthy());
    }

    #[test]
    fn test_is_empty_differs_from_falsy_for_spaces() {
        assert!(!Value::from("  ").is_empty());
        assert!(Value::from("").is_empty());
        assert!(Value::Missing.is_empty());
    }

    #[test]
    fn test_coercions() {
        assert!((Value::from(" 2.5 ").to_float(0.0) - 2.5).abs() < f64::EPSILON);
        assert!((Value::Bool(true).to_float(7.0) - 7.0).abs() < f64::EPSILON);
        assert_eq!(Value::Number(3.9).to_int(0), 3);
        assert_eq!(Value::Number(-3.9).to_int(0), -3);
        assert_eq!(Value::from("3.7").to_int(0), 0);
        assert_eq!(Value::from("42").to_int(0), 42);
        assert!(Value::from("yes").to_bool(false));
        assert!(!Value::from("no").to_bool(true));
        assert!(Value::from("maybe").to_bool(true));
    }

    #[test]
    fn test_equality() {
        assert_eq!(Value::Missing, Value::Missing);
        assert_ne!(Value::Missing, Value::Null);
        assert_eq!(Value::Number(1.0), Value::from(1));
        assert_ne!(Value::from("1"), Value::Number(1.0));
        assert_eq!(Value::from(vec![1, 2]), Value::from(vec![1, 2]));
    }

    #[test]
    fn test_callable_identity() {
        let f = Value::function(|_, _| Value::Null);
        let g = Value::function(|_, _| Value::Null);
        assert_eq!(f, f.clone());
        assert_ne!(f, g);
    }

    #[test]
    fn test_attr_and_index() {
        let v = Value::from(json!({"user": {"name": "ann"}, "items": [1, 2, 3]}));
        assert_eq!(v.get_attr("user").get_attr("name"), Value::from("ann"));
        assert_eq!(v.get_attr("nope"), Value::Missing);
        assert_eq!(Value::from("str").get_attr("len"), Value::Missing);

        let items = v.get_attr("items");
        assert_eq!(items.get_index(&Value::from(0)), Value::from(1));
        assert_eq!(items.get_index(&Value::from(-1)), Value::from(3));
        assert_eq!(items.get_index(&Value::from(9)), Value::Missing);
        assert_eq!(Value::from("héllo").get_index(&Value::from(1)), Value::from("é"));
        assert_eq!(v.get_index(&Value::from("user")).get_attr("name"), Value::from("ann"));
    }

    #[test]
    fn test_by_path() {
        let v = Value::from(json!({"a": {"b": {"c": 5}}, "list": ["x", "y"]}));
        assert_eq!(v.by_path("a.b.c"), Some(Value::from(5)));
        assert_eq!(v.by_path("list.1"), Some(Value::from("y")));
        assert_eq!(v.by_path("a.x"), None);
        assert_eq!(v.by_path(""), Some(v.clone()));
    }

    #[test]
    fn test_contains() {
        assert!(Value::from("hello").contains(&Value::from("ell")));
        assert!(Value::from(vec![1, 2, 3]).contains(&Value::from(2)));
        assert!(!Value::from(vec![1, 2, 3]).contains(&Value::from(5)));
        assert!(Value::from(json!({"k": 1})).contains(&Value::from("k")));
        assert!(!Value::Number(1.0).contains(&Value::Number(1.0)));
    }

    #[test]
    fn test_compare_values() {
        assert_eq!(compare_values(&Value::from(2), &Value::from(10), false), Ordering::Less);
        assert_eq!(compare_values(&Value::from("b"), &Value::from("A"), false), Ordering::Greater);
        assert_eq!(compare_values(&Value::from("b"), &Value::from("A"), true), Ordering::Greater);
        assert_eq!(compare_values(&Value::from("a"), &Value::from("B"), true), Ordering::Greater);
        assert_eq!(compare_values(&Value::Missing, &Value::from(0), true), Ordering::Less);
    }

    #[test]
    fn test_json_round_trip_shape() {
        let v = Value::from(json!({"n": 3, "f": 1.5, "s": "x", "l": [true, null]}));
        assert_eq!(v.to_json(), json!({"n": 3, "f": 1.5, "s": "x", "l": [true, null]}));
        assert_eq!(Value::Missing.to_json(), serde_json::Value::Null);
    }
}
