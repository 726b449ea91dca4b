//! Built-in tests for `value is <name>` expressions.
//!
//! Tests are boolean predicates. They never fail: unknown names and
//! unusable arguments simply evaluate to `false`.

use crate::value::Value;

const TEST_NAMES: &[&str] = &[
    "defined",
    "undefined",
    "none",
    "null",
    "string",
    "number",
    "boolean",
    "bool",
    "iterable",
    "callable",
    "odd",
    "even",
    "divisibleby",
    "lower",
    "upper",
    "equalto",
    "sameas",
    "sequence",
    "mapping",
    "true",
    "false",
];

/// Returns `true` if `name` is a built-in test (case-insensitive).
pub fn is_known_test(name: &str) -> bool {
    let name = name.trim().to_lowercase();
    TEST_NAMES.contains(&name.as_str())
}

/// Evaluates the named test against `value`.
pub fn evaluate_test(value: &Value, name: &str, args: &[Value]) -> bool {
    match name.trim().to_lowercase().as_str() {
        "defined" => !value.is_missing(),
        "undefined" => value.is_missing(),
        "none" | "null" => value.is_none(),
        "string" => matches!(value, Value::String(_)),
        "number" => value.is_number(),
        "boolean" | "bool" => matches!(value, Value::Bool(_)),
        "iterable" => matches!(value, Value::String(_) | Value::Seq(_) | Value::Map(_)),
        "sequence" => matches!(value, Value::String(_) | Value::Seq(_)),
        "mapping" => matches!(value, Value::Map(_)),
        "callable" => matches!(value, Value::Callable(_)),
        "odd" => value.to_int(0) % 2 != 0,
        "even" => value.to_int(0) % 2 == 0,
        "divisibleby" => match args.first().map(|a| a.to_int(0)) {
            Some(0) | None => false,
            Some(d) => value.to_int(0).checked_rem(d).unwrap_or(0) == 0,
        },
        "lower" => {
            let s = value.to_string();
            s == s.to_lowercase()
        }
        "upper" => {
            let s = value.to_string();
            s == s.to_uppercase()
        }
        "equalto" | "sameas" => args.first().is_some_and(|a| value == a),
        "true" => matches!(value, Value::Bool(true)),
        "false" => matches!(value, Value::Bool(false)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_known_names() {
        assert!(is_known_test("defined"));
        assert!(is_known_test(" DivisibleBy "));
        assert!(!is_known_test("prime"));
    }

    #[test]
    fn test_defined_distinguishes_missing_from_null() {
        assert!(evaluate_test(&Value::Null, "defined", &[]));
        assert!(!evaluate_test(&Value::Missing, "defined", &[]));
        assert!(evaluate_test(&Value::Missing, "undefined", &[]));
        assert!(!evaluate_test(&Value::Null, "undefined", &[]));
    }

    #[test]
    fn test_none_covers_null_and_missing() {
        assert!(evaluate_test(&Value::Null, "none", &[]));
        assert!(evaluate_test(&Value::Missing, "null", &[]));
        assert!(!evaluate_test(&Value::from(""), "none", &[]));
    }

    #[test]
    fn test_type_tests() {
        assert!(evaluate_test(&Value::from("x"), "string", &[]));
        assert!(evaluate_test(&Value::from(1), "number", &[]));
        assert!(!evaluate_test(&Value::from("1"), "number", &[]));
        assert!(evaluate_test(&Value::Bool(false), "boolean", &[]));
        assert!(evaluate_test(&Value::from("abc"), "iterable", &[]));
        assert!(evaluate_test(&Value::from(json!({})), "iterable", &[]));
        assert!(!evaluate_test(&Value::from(json!({})), "sequence", &[]));
        assert!(evaluate_test(&Value::from(json!({})), "mapping", &[]));
        assert!(!evaluate_test(&Value::Missing, "iterable", &[]));
        assert!(evaluate_test(&Value::function(|_, _| Value::Null), "callable", &[]));
    }

    #[test]
    fn test_numeric_tests() {
        assert!(evaluate_test(&Value::from(3), "odd", &[]));
        assert!(evaluate_test(&Value::from(-4), "even", &[]));
        assert!(evaluate_test(&Value::from(9), "divisibleby", &[Value::from(3)]));
        assert!(!evaluate_test(&Value::from(9), "divisibleby", &[Value::from(0)]));
        assert!(!evaluate_test(&Value::from(9), "divisibleby", &[]));
    }

    #[test]
    fn test_divisibleby_at_integer_limits() {
        assert!(evaluate_test(&Value::from(i64::MIN), "divisibleby", &[Value::from(-1)]));
        assert!(evaluate_test(&Value::Number(-1e30), "divisibleby", &[Value::from(-1)]));
        assert!(evaluate_test(&Value::from(i64::MIN), "even", &[]));
    }

    #[test]
    fn test_case_tests() {
        assert!(evaluate_test(&Value::from("abc"), "lower", &[]));
        assert!(!evaluate_test(&Value::from("aBc"), "lower", &[]));
        assert!(evaluate_test(&Value::from("ABC"), "upper", &[]));
    }

    #[test]
    fn test_equality_tests() {
        assert!(evaluate_test(&Value::from(2), "equalto", &[Value::from(2.0)]));
        assert!(!evaluate_test(&Value::from(2), "equalto", &[]));
        assert!(evaluate_test(&Value::from("a"), "sameas", &[Value::from("a")]));
    }

    #[test]
    fn test_boolean_literal_tests() {
        assert!(evaluate_test(&Value::Bool(true), "true", &[]));
        assert!(!evaluate_test(&Value::from(1), "true", &[]));
        assert!(evaluate_test(&Value::Bool(false), "false", &[]));
    }

    #[test]
    fn test_unknown_is_false() {
        assert!(!evaluate_test(&Value::from(1), "prime", &[]));
    }
}
