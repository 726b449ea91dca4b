//! The expression language used inside `{{ }}` and tag arguments.
//!
//! [`Expression`] is parsed once when a template is parsed and evaluated on
//! every render. Parsing never fails: text the grammar rejects is kept and
//! resolved at render time as a literal or a variable path, which lets
//! forms such as `{{ user.first-name }}` still find a context key.

pub mod ast;
pub mod eval;
pub mod lexer;
pub mod parser;

use nunchucks_core::error::{NunchucksError, NunchucksResult};

pub use ast::{Expr, FilterCall};
pub use eval::{EvalContext, Invoker, NativeInvoker};
pub use parser::{parse_filter_chain, parse_macro_signature, Param};

use crate::value::Value;

/// A parsed expression together with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    ast: Option<Expr>,
}

impl Expression {
    /// Parses `src`. Syntax errors are recorded, not returned.
    pub fn parse(src: &str) -> Self {
        let source = src.trim().to_string();
        let ast = match parser::parse_expression(&source) {
            Ok(ast) => Some(ast),
            Err(reason) => {
                tracing::trace!(expr = %source, %reason, "expression kept for fallback lookup");
                None
            }
        };
        Self { source, ast }
    }

    /// The trimmed source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The syntax tree, if the source parsed.
    pub const fn ast(&self) -> Option<&Expr> {
        self.ast.as_ref()
    }

    /// Evaluates the expression.
    ///
    /// If the source did not parse, or evaluation hit an expression error
    /// such as calling a non-callable, the whole source is read as a
    /// literal, then as a variable path, and yields [`Value::Missing`] if
    /// neither applies.
    ///
    /// # Errors
    ///
    /// Propagates errors raised by invoked macros.
    pub fn evaluate(&self, cx: &EvalContext<'_>) -> NunchucksResult<Value> {
        if let Some(ast) = &self.ast {
            match eval::evaluate(ast, cx) {
                Err(NunchucksError::ExpressionError(reason)) => {
                    tracing::trace!(expr = %self.source, %reason, "expression fell back");
                }
                other => return other,
            }
        }
        Ok(parse_literal(&self.source).unwrap_or_else(|| cx.scope.resolve(&self.source)))
    }
}

/// Reads a lone literal: an empty string, a quoted string (raw, without
/// escape processing), `true`/`false`, `null`/`nil`, or a number.
pub fn parse_literal(text: &str) -> Option<Value> {
    let s = text.trim();
    if s.is_empty() {
        return Some(Value::String(String::new()));
    }
    let bytes = s.as_bytes();
    if s.len() >= 2 {
        let (first, last) = (bytes[0], bytes[s.len() - 1]);
        if (first == b'"' || first == b'\'') && first == last {
            return Some(Value::String(s[1..s.len() - 1].to_string()));
        }
    }
    match s {
        "true" => return Some(Value::Bool(true)),
        "false" => return Some(Value::Bool(false)),
        "null" | "nil" => return Some(Value::Null),
        _ => {}
    }
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::from(i));
    }
    s.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(Value::Number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Scope;
    use crate::filters::FilterRegistry;
    use crate::value::Map;
    use std::sync::Arc;

    fn eval_with(src: &str, vars: &[(&str, Value)]) -> Value {
        let map: Map = vars.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect();
        let scope = Scope::new(Arc::new(map));
        let filters = FilterRegistry::with_builtins();
        let cx = EvalContext::new(&scope, &filters, &NativeInvoker);
        Expression::parse(src).evaluate(&cx).unwrap()
    }

    #[test]
    fn test_parse_literal() {
        assert_eq!(parse_literal(""), Some(Value::from("")));
        assert_eq!(parse_literal("'a\\nb'"), Some(Value::from("a\\nb")));
        assert_eq!(parse_literal("true"), Some(Value::Bool(true)));
        assert_eq!(parse_literal("nil"), Some(Value::Null));
        assert_eq!(parse_literal(" 42 "), Some(Value::from(42)));
        assert_eq!(parse_literal("-1.5"), Some(Value::Number(-1.5)));
        assert_eq!(parse_literal("user"), None);
        assert_eq!(parse_literal("inf"), None);
    }

    #[test]
    fn test_invalid_syntax_falls_back_to_path() {
        let expr = Expression::parse("first-name.x y");
        assert!(expr.ast().is_none());
        assert_eq!(eval_with("first-name.x y", &[]), Value::Missing);
        assert_eq!(
            eval_with("odd key", &[("odd key", Value::from("found"))]),
            Value::from("found")
        );
    }

    #[test]
    fn test_call_error_falls_back() {
        assert_eq!(eval_with("name()", &[("name", Value::from("x"))]), Value::Missing);
        assert_eq!(
            eval_with("name()", &[("name()", Value::from("literal key"))]),
            Value::from("literal key")
        );
    }

    #[test]
    fn test_valid_expression() {
        let expr = Expression::parse("  a + 1 ");
        assert_eq!(expr.source(), "a + 1");
        assert_eq!(eval_with("a + 1", &[("a", Value::from(2))]), Value::from(3));
    }
}
