//! Expression evaluation.
//!
//! Evaluation is pure apart from calls: invoking a macro needs the template
//! renderer, which is reached through the [`Invoker`] trait so this module
//! does not depend on it.

use nunchucks_core::error::{NunchucksError, NunchucksResult};

use super::ast::{BinaryOp, CompareOp, Comparison, Expr, FilterCall, UnaryOp};
use crate::context::Scope;
use crate::filters::FilterRegistry;
use crate::testers::evaluate_test;
use crate::value::{Callable, Map, Value};

/// Invokes callable values.
pub trait Invoker {
    /// Calls `callable` with positional and keyword arguments.
    ///
    /// # Errors
    ///
    /// Returns whatever error the callee's body produces.
    fn invoke(&self, callable: &Callable, args: Vec<Value>, kwargs: Map) -> NunchucksResult<Value>;
}

/// An invoker for contexts without a renderer. Host functions and callers
/// work; macros are refused.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeInvoker;

impl Invoker for NativeInvoker {
    fn invoke(&self, callable: &Callable, args: Vec<Value>, kwargs: Map) -> NunchucksResult<Value> {
        match callable {
            Callable::Native(f) => Ok(f(&args, &kwargs)),
            Callable::Caller(body) => Ok(Value::String(body.to_string())),
            Callable::Macro(m) => Err(NunchucksError::RuntimeError(format!(
                "macro {} cannot be called outside a render",
                m.name()
            ))),
        }
    }
}

/// Everything an expression can reach while evaluating.
pub struct EvalContext<'a> {
    pub scope: &'a Scope,
    pub filters: &'a FilterRegistry,
    pub invoker: &'a dyn Invoker,
}

impl<'a> EvalContext<'a> {
    pub fn new(scope: &'a Scope, filters: &'a FilterRegistry, invoker: &'a dyn Invoker) -> Self {
        Self {
            scope,
            filters,
            invoker,
        }
    }
}

/// Evaluates an expression tree.
///
/// # Errors
///
/// Returns `ExpressionError` when a non-callable value is called, and
/// propagates errors raised by invoked macros.
pub fn evaluate(expr: &Expr, cx: &EvalContext<'_>) -> NunchucksResult<Value> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Name(name) => Ok(cx.scope.resolve(name)),
        Expr::List(items) => items
            .iter()
            .map(|item| evaluate(item, cx))
            .collect::<NunchucksResult<Vec<_>>>()
            .map(Value::Seq),
        Expr::Dict(pairs) => {
            let mut map = Map::new();
            for (key, value) in pairs {
                map.insert(evaluate(key, cx)?.to_string(), evaluate(value, cx)?);
            }
            Ok(Value::Map(map))
        }
        Expr::Unary(op, operand) => {
            let v = evaluate(operand, cx)?;
            Ok(match op {
                UnaryOp::Not => Value::Bool(!v.is_truthy()),
                UnaryOp::Neg => Value::Number(-v.to_float(0.0)),
                UnaryOp::Pos => v,
            })
        }
        Expr::Binary(op, left, right) => {
            let l = evaluate(left, cx)?;
            let r = evaluate(right, cx)?;
            Ok(binary(*op, &l, &r))
        }
        Expr::And(left, right) => {
            if !evaluate(left, cx)?.is_truthy() {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(evaluate(right, cx)?.is_truthy()))
        }
        Expr::Or(left, right) => {
            if evaluate(left, cx)?.is_truthy() {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(evaluate(right, cx)?.is_truthy()))
        }
        Expr::Compare(first, chain) => compare_chain(first, chain, cx),
        Expr::Conditional {
            then,
            cond,
            otherwise,
        } => {
            if evaluate(cond, cx)?.is_truthy() {
                evaluate(then, cx)
            } else {
                otherwise
                    .as_ref()
                    .map_or(Ok(Value::Missing), |e| evaluate(e, cx))
            }
        }
        Expr::Attr(target, name) => Ok(evaluate(target, cx)?.get_attr(name)),
        Expr::Index(target, index) => {
            let t = evaluate(target, cx)?;
            Ok(t.get_index(&evaluate(index, cx)?))
        }
        Expr::Call {
            target,
            args,
            kwargs,
        } => {
            let callee = evaluate(target, cx)?;
            let (args, kwargs) = evaluate_args(args, kwargs, cx)?;
            call_value(&callee, args, kwargs, cx)
        }
        Expr::Filter(target, call) => {
            let v = evaluate(target, cx)?;
            apply_filter(&v, call, cx)
        }
    }
}

/// Evaluates call arguments left to right.
///
/// # Errors
///
/// Propagates errors from the argument expressions.
pub fn evaluate_args(
    args: &[Expr],
    kwargs: &[(String, Expr)],
    cx: &EvalContext<'_>,
) -> NunchucksResult<(Vec<Value>, Map)> {
    let positional = args
        .iter()
        .map(|a| evaluate(a, cx))
        .collect::<NunchucksResult<Vec<_>>>()?;
    let mut named = Map::new();
    for (name, expr) in kwargs {
        named.insert(name.clone(), evaluate(expr, cx)?);
    }
    Ok((positional, named))
}

/// Calls a value.
///
/// # Errors
///
/// Returns `ExpressionError` if `callee` is not callable.
pub fn call_value(
    callee: &Value,
    args: Vec<Value>,
    kwargs: Map,
    cx: &EvalContext<'_>,
) -> NunchucksResult<Value> {
    match callee {
        Value::Callable(c) => cx.invoker.invoke(c, args, kwargs),
        other => Err(NunchucksError::ExpressionError(format!(
            "{} value is not callable",
            other.kind()
        ))),
    }
}

/// Applies one filter call to `value`.
///
/// # Errors
///
/// Propagates errors from the filter's argument expressions.
pub fn apply_filter(value: &Value, call: &FilterCall, cx: &EvalContext<'_>) -> NunchucksResult<Value> {
    let args = call
        .args
        .iter()
        .map(|a| evaluate(a, cx))
        .collect::<NunchucksResult<Vec<_>>>()?;
    Ok(cx.filters.apply(&call.name, value, &args))
}

/// Every link is evaluated; the chain holds only if all links hold.
fn compare_chain(first: &Expr, chain: &[Comparison], cx: &EvalContext<'_>) -> NunchucksResult<Value> {
    let mut prev = evaluate(first, cx)?;
    let mut result = true;
    for link in chain {
        match link {
            Comparison::Op(op, rhs) => {
                let right = evaluate(rhs, cx)?;
                result &= compare(*op, &prev, &right);
                prev = right;
            }
            Comparison::In { negated, container } => {
                let right = evaluate(container, cx)?;
                result &= right.contains(&prev) != *negated;
                prev = right;
            }
            Comparison::Test {
                negated,
                name,
                args,
            } => {
                let args = args
                    .iter()
                    .map(|a| evaluate(a, cx))
                    .collect::<NunchucksResult<Vec<_>>>()?;
                let ok = evaluate_test(&prev, name, &args) != *negated;
                result &= ok;
                prev = Value::Bool(ok);
            }
            Comparison::IsEq { negated, other } => {
                let right = evaluate(other, cx)?;
                result &= (prev == right) != *negated;
                prev = right;
            }
        }
    }
    Ok(Value::Bool(result))
}

/// Arithmetic. `+` concatenates when either side is a string; division
/// and modulo by zero yield zero.
fn binary(op: BinaryOp, a: &Value, b: &Value) -> Value {
    if op == BinaryOp::Add && (matches!(a, Value::String(_)) || matches!(b, Value::String(_))) {
        return Value::String(format!("{a}{b}"));
    }
    let (x, y) = (a.to_float(0.0), b.to_float(0.0));
    match op {
        BinaryOp::Add => Value::Number(x + y),
        BinaryOp::Sub => Value::Number(x - y),
        BinaryOp::Mul => Value::Number(x * y),
        BinaryOp::Div => Value::Number(if y == 0.0 { 0.0 } else { x / y }),
        BinaryOp::Mod => match b.to_int(0) {
            0 => Value::Number(0.0),
            d => Value::from(a.to_int(0).checked_rem(d).unwrap_or(0)),
        },
    }
}

/// Ordering comparisons are numeric when both sides convert to numbers,
/// otherwise they compare string forms.
fn compare(op: CompareOp, a: &Value, b: &Value) -> bool {
    match op {
        CompareOp::Eq => a == b,
        CompareOp::Ne => a != b,
        _ => {
            let (x, y) = (a.to_float(f64::NAN), b.to_float(f64::NAN));
            if x.is_nan() || y.is_nan() {
                let (s, t) = (a.to_string(), b.to_string());
                ordered(op, &s, &t)
            } else {
                ordered(op, &x, &y)
            }
        }
    }
}

fn ordered<T: PartialOrd + ?Sized>(op: CompareOp, x: &T, y: &T) -> bool {
    match op {
        CompareOp::Lt => x < y,
        CompareOp::Le => x <= y,
        CompareOp::Gt => x > y,
        CompareOp::Ge => x >= y,
        CompareOp::Eq => x == y,
        CompareOp::Ne => x != y,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parser::parse_expression;
    use serde_json::json;
    use std::sync::Arc;

    fn eval_in(src: &str, ctx: serde_json::Value) -> Value {
        let map = crate::context::Context::from(ctx).into_map();
        let scope = Scope::new(Arc::new(map));
        let filters = FilterRegistry::with_builtins();
        let cx = EvalContext::new(&scope, &filters, &NativeInvoker);
        evaluate(&parse_expression(src).unwrap(), &cx).unwrap()
    }

    fn eval(src: &str) -> Value {
        eval_in(src, json!({}))
    }

    // ── Arithmetic ──────────────────────────────────────────────────

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("1 + 2 * 3"), Value::from(7));
        assert_eq!(eval("(1 + 2) * 3"), Value::from(9));
        assert_eq!(eval("7 / 2"), Value::Number(3.5));
        assert_eq!(eval("7 % 3"), Value::from(1));
        assert_eq!(eval("-2 + 5"), Value::from(3));
    }

    #[test]
    fn test_division_by_zero_is_zero() {
        assert_eq!(eval("5 / 0"), Value::from(0));
        assert_eq!(eval("5 % 0"), Value::from(0));
    }

    #[test]
    fn test_modulo_at_integer_limits() {
        assert_eq!(eval("-9223372036854775808 % -1"), Value::from(0));
        assert_eq!(eval("-9223372036854775808 % 2"), Value::from(0));
        assert_eq!(eval("9223372036854775807 % -1"), Value::from(0));
    }

    #[test]
    fn test_string_concat() {
        assert_eq!(eval("'a' + 1"), Value::from("a1"));
        assert_eq!(eval("1 + 'a'"), Value::from("1a"));
        assert_eq!(eval("'2' * 3"), Value::from(6));
    }

    // ── Logic ───────────────────────────────────────────────────────

    #[test]
    fn test_boolean_ops_yield_bools() {
        assert_eq!(eval("1 and 'x'"), Value::Bool(true));
        assert_eq!(eval("0 or ''"), Value::Bool(false));
        assert_eq!(eval("not 0"), Value::Bool(true));
        assert_eq!(eval("!1"), Value::Bool(false));
    }

    #[test]
    fn test_and_short_circuits() {
        // the call on the right would fail if evaluated
        assert_eq!(eval("false and nothing()"), Value::Bool(false));
        assert_eq!(eval("true or nothing()"), Value::Bool(true));
    }

    #[test]
    fn test_conditional() {
        assert_eq!(eval("'a' if 1 else 'b'"), Value::from("a"));
        assert_eq!(eval("'a' if 0 else 'b'"), Value::from("b"));
        assert_eq!(eval("'a' if 0"), Value::Missing);
    }

    // ── Comparisons ─────────────────────────────────────────────────

    #[test]
    fn test_comparisons() {
        assert_eq!(eval("2 < 3 < 4"), Value::Bool(true));
        assert_eq!(eval("2 < 3 > 4"), Value::Bool(false));
        assert_eq!(eval("'10' > 9"), Value::Bool(true));
        assert_eq!(eval("'b' > 'a'"), Value::Bool(true));
        assert_eq!(eval("1 == 1.0"), Value::Bool(true));
        assert_eq!(eval("'1' == 1"), Value::Bool(false));
        assert_eq!(eval("missing == other"), Value::Bool(true));
    }

    #[test]
    fn test_membership() {
        assert_eq!(eval("2 in [1, 2, 3]"), Value::Bool(true));
        assert_eq!(eval("5 not in [1, 2, 3]"), Value::Bool(true));
        assert_eq!(eval("'ell' in 'hello'"), Value::Bool(true));
        assert_eq!(eval("'k' in {k: 1}"), Value::Bool(true));
    }

    #[test]
    fn test_is_tests() {
        assert_eq!(eval("3 is odd"), Value::Bool(true));
        assert_eq!(eval("3 is not odd"), Value::Bool(false));
        assert_eq!(eval("nope is defined"), Value::Bool(false));
        assert_eq!(eval("9 is divisibleby(3)"), Value::Bool(true));
        assert_eq!(eval("x is 5", ), Value::Bool(false));
        assert_eq!(eval_in("x is 5", json!({"x": 5})), Value::Bool(true));
        assert_eq!(eval("3 is odd is true"), Value::Bool(true));
    }

    // ── Access ──────────────────────────────────────────────────────

    #[test]
    fn test_member_and_index_access() {
        let ctx = json!({"user": {"name": "ann", "tags": ["a", "b"]}});
        assert_eq!(eval_in("user.name", ctx.clone()), Value::from("ann"));
        assert_eq!(eval_in("user['name']", ctx.clone()), Value::from("ann"));
        assert_eq!(eval_in("user.tags.1", ctx.clone()), Value::from("b"));
        assert_eq!(eval_in("user.tags[-1]", ctx.clone()), Value::from("b"));
        assert_eq!(eval_in("user.missing.deeper", ctx), Value::Missing);
    }

    #[test]
    fn test_literals() {
        assert_eq!(eval("[1, 'a']"), Value::from(json!([1, "a"])));
        assert_eq!(eval("{a: 1, 'b': [2]}"), Value::from(json!({"a": 1, "b": [2]})));
        assert_eq!(eval("null"), Value::Null);
    }

    // ── Calls and filters ───────────────────────────────────────────

    #[test]
    fn test_native_call() {
        let mut map = Map::new();
        map.insert(
            "add".to_string(),
            Value::function(|args, kwargs| {
                let sum: f64 = args.iter().map(|a| a.to_float(0.0)).sum();
                Value::Number(sum + kwargs.get("extra").map_or(0.0, |v| v.to_float(0.0)))
            }),
        );
        let scope = Scope::new(Arc::new(map));
        let filters = FilterRegistry::with_builtins();
        let cx = EvalContext::new(&scope, &filters, &NativeInvoker);
        let expr = parse_expression("add(1, 2, extra=10)").unwrap();
        assert_eq!(evaluate(&expr, &cx).unwrap(), Value::from(13));
    }

    #[test]
    fn test_calling_non_callable_errors() {
        let scope = Scope::empty();
        let filters = FilterRegistry::with_builtins();
        let cx = EvalContext::new(&scope, &filters, &NativeInvoker);
        let expr = parse_expression("'x'()").unwrap();
        let err = evaluate(&expr, &cx).unwrap_err();
        assert!(matches!(err, NunchucksError::ExpressionError(_)));
    }

    #[test]
    fn test_filters_in_expressions() {
        assert_eq!(eval("'abc' | upper"), Value::from("ABC"));
        assert_eq!(eval("[3, 1, 2] | sort | join(',')"), Value::from("1,2,3"));
        assert_eq!(eval("'x' | nosuchfilter"), Value::from("x"));
        assert_eq!(eval("-3 | abs"), Value::from(-3));
    }
}
