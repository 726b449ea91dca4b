//! Recursive-descent expression parser.
//!
//! Precedence, loosest first: conditional, `or`, `and`, comparisons
//! (`== != < <= > >= in not-in is`), `+ -`, `* / %`, unary `not - +`,
//! then postfix access, calls and filters.

use super::ast::{BinaryOp, CompareOp, Comparison, Expr, FilterCall, UnaryOp};
use super::lexer::{tokenize, Token};
use crate::testers::is_known_test;
use crate::value::Value;

/// A macro parameter: its name and optional default expression.
pub type Param = (String, Option<Expr>);

/// Parses a complete expression. Leftover tokens are an error.
///
/// # Errors
///
/// Returns a description of the first syntax problem.
pub fn parse_expression(src: &str) -> Result<Expr, String> {
    let mut parser = Parser::new(src)?;
    let expr = parser.parse_conditional()?;
    parser.expect_end()?;
    Ok(expr)
}

/// Parses the argument of a `{% filter %}` tag: `name(args) | name ...`.
///
/// # Errors
///
/// Returns a description of the problem when the text is not a filter chain.
pub fn parse_filter_chain(src: &str) -> Result<Vec<FilterCall>, String> {
    let mut parser = Parser::new(src)?;
    let mut chain = vec![parser.parse_filter_call()?];
    while parser.eat(&Token::Pipe) {
        chain.push(parser.parse_filter_call()?);
    }
    parser.expect_end()?;
    Ok(chain)
}

/// Parses a macro signature: `name` or `name(a, b=default)`.
///
/// # Errors
///
/// Returns a description of the problem for a malformed signature.
pub fn parse_macro_signature(src: &str) -> Result<(String, Vec<Param>), String> {
    let mut parser = Parser::new(src)?;
    let name = parser.expect_ident()?;
    let mut params = Vec::new();
    if parser.eat(&Token::LParen) {
        while !parser.eat(&Token::RParen) {
            let param = parser.expect_ident()?;
            let default = if parser.eat(&Token::Assign) {
                Some(parser.parse_conditional()?)
            } else {
                None
            };
            params.push((param, default));
            if !parser.eat(&Token::Comma) {
                parser.expect(&Token::RParen)?;
                break;
            }
        }
    }
    parser.expect_end()?;
    Ok((name, params))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(src: &str) -> Result<Self, String> {
        Ok(Self {
            tokens: tokenize(src)?,
            pos: 0,
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Token) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Token) -> Result<(), String> {
        if self.eat(tok) {
            Ok(())
        } else {
            Err(format!("expected {tok:?}, found {:?}", self.peek()))
        }
    }

    fn expect_ident(&mut self) -> Result<String, String> {
        match self.advance() {
            Some(Token::Ident(name)) => Ok(name),
            other => Err(format!("expected identifier, found {other:?}")),
        }
    }

    fn expect_end(&self) -> Result<(), String> {
        match self.peek() {
            None => Ok(()),
            Some(tok) => Err(format!("unexpected trailing token {tok:?}")),
        }
    }

    // ── Precedence levels ───────────────────────────────────────────

    fn parse_conditional(&mut self) -> Result<Expr, String> {
        let then = self.parse_or()?;
        if !self.eat(&Token::If) {
            return Ok(then);
        }
        let cond = self.parse_or()?;
        let otherwise = if self.eat(&Token::Else) {
            Some(Box::new(self.parse_conditional()?))
        } else {
            None
        };
        Ok(Expr::Conditional {
            then: Box::new(then),
            cond: Box::new(cond),
            otherwise,
        })
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_compare()?;
        while self.eat(&Token::And) {
            let right = self.parse_compare()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_compare(&mut self) -> Result<Expr, String> {
        let first = self.parse_add()?;
        let mut chain = Vec::new();

        loop {
            let op = match self.peek() {
                Some(Token::Eq) => CompareOp::Eq,
                Some(Token::Ne) => CompareOp::Ne,
                Some(Token::Lt) => CompareOp::Lt,
                Some(Token::Le) => CompareOp::Le,
                Some(Token::Gt) => CompareOp::Gt,
                Some(Token::Ge) => CompareOp::Ge,
                Some(Token::In) => {
                    self.pos += 1;
                    let container = self.parse_add()?;
                    chain.push(Comparison::In {
                        negated: false,
                        container,
                    });
                    continue;
                }
                Some(Token::Not) if self.peek_at(1) == Some(&Token::In) => {
                    self.pos += 2;
                    let container = self.parse_add()?;
                    chain.push(Comparison::In {
                        negated: true,
                        container,
                    });
                    continue;
                }
                Some(Token::Is) => {
                    self.pos += 1;
                    chain.push(self.parse_is()?);
                    continue;
                }
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_add()?;
            chain.push(Comparison::Op(op, right));
        }

        if chain.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare(Box::new(first), chain))
        }
    }

    /// Parses what follows `is`. A known test name becomes a test;
    /// anything else is compared for equality.
    fn parse_is(&mut self) -> Result<Comparison, String> {
        let negated = self.eat(&Token::Not);
        if let Some(Token::Ident(name)) = self.peek() {
            if is_known_test(name) {
                let name = name.clone();
                self.pos += 1;
                let args = if self.eat(&Token::LParen) {
                    let (args, kwargs) = self.parse_call_args()?;
                    if !kwargs.is_empty() {
                        return Err("named arguments are not supported in tests".to_string());
                    }
                    args
                } else {
                    Vec::new()
                };
                return Ok(Comparison::Test {
                    negated,
                    name,
                    args,
                });
            }
        }
        let other = self.parse_add()?;
        Ok(Comparison::IsEq { negated, other })
    }

    fn parse_add(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_mul()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_mul()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_mul(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Mod,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        let op = match self.peek() {
            Some(Token::Not) => UnaryOp::Not,
            Some(Token::Minus) => UnaryOp::Neg,
            Some(Token::Plus) => UnaryOp::Pos,
            _ => return self.parse_postfix(),
        };
        self.pos += 1;
        let operand = self.parse_unary()?;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn parse_postfix(&mut self) -> Result<Expr, String> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    expr = match self.advance() {
                        Some(Token::Ident(name)) => Expr::Attr(Box::new(expr), name),
                        Some(Token::Number(n)) => {
                            Expr::Index(Box::new(expr), Box::new(Expr::Literal(Value::Number(n))))
                        }
                        other => return Err(format!("expected attribute after '.', found {other:?}")),
                    };
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let index = self.parse_conditional()?;
                    self.expect(&Token::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                Some(Token::LParen) => {
                    self.pos += 1;
                    let (args, kwargs) = self.parse_call_args()?;
                    expr = Expr::Call {
                        target: Box::new(expr),
                        args,
                        kwargs,
                    };
                }
                Some(Token::Pipe) => {
                    self.pos += 1;
                    let call = self.parse_filter_call()?;
                    expr = Expr::Filter(Box::new(expr), call);
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_filter_call(&mut self) -> Result<FilterCall, String> {
        let name = self.expect_ident()?;
        let args = if self.eat(&Token::LParen) {
            let (args, kwargs) = self.parse_call_args()?;
            if !kwargs.is_empty() {
                return Err(format!("named arguments are not supported in filter {name}"));
            }
            args
        } else {
            Vec::new()
        };
        Ok(FilterCall { name, args })
    }

    /// Parses call arguments after `(` up to and including `)`.
    fn parse_call_args(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), String> {
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok((args, kwargs));
        }
        loop {
            if let (Some(Token::Ident(name)), Some(Token::Assign)) = (self.peek(), self.peek_at(1)) {
                let name = name.clone();
                self.pos += 2;
                kwargs.push((name, self.parse_conditional()?));
            } else {
                args.push(self.parse_conditional()?);
            }
            if !self.eat(&Token::Comma) {
                break;
            }
            // trailing comma
            if self.peek() == Some(&Token::RParen) {
                break;
            }
        }
        self.expect(&Token::RParen)?;
        Ok((args, kwargs))
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Literal(Value::Number(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Ident(name)) => Ok(match name.as_str() {
                "true" | "True" => Expr::Literal(Value::Bool(true)),
                "false" | "False" => Expr::Literal(Value::Bool(false)),
                "null" | "nil" | "none" | "None" => Expr::Literal(Value::Null),
                _ => Expr::Name(name),
            }),
            Some(Token::LParen) => {
                let inner = self.parse_conditional()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                while !self.eat(&Token::RBracket) {
                    items.push(self.parse_conditional()?);
                    if !self.eat(&Token::Comma) {
                        self.expect(&Token::RBracket)?;
                        break;
                    }
                }
                Ok(Expr::List(items))
            }
            Some(Token::LBrace) => {
                let mut pairs = Vec::new();
                while !self.eat(&Token::RBrace) {
                    let key = match self.peek() {
                        Some(Token::Ident(name)) if self.peek_at(1) == Some(&Token::Colon) => {
                            let key = Expr::Literal(Value::String(name.clone()));
                            self.pos += 1;
                            key
                        }
                        _ => self.parse_conditional()?,
                    };
                    self.expect(&Token::Colon)?;
                    let value = self.parse_conditional()?;
                    pairs.push((key, value));
                    if !self.eat(&Token::Comma) {
                        self.expect(&Token::RBrace)?;
                        break;
                    }
                }
                Ok(Expr::Dict(pairs))
            }
            other => Err(format!("unexpected token {other:?}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(n: &str) -> Expr {
        Expr::Name(n.to_string())
    }

    fn num(n: f64) -> Expr {
        Expr::Literal(Value::Number(n))
    }

    #[test]
    fn test_precedence_mul_over_add() {
        let expr = parse_expression("1 + 2 * 3").unwrap();
        assert_eq!(
            expr,
            Expr::Binary(
                BinaryOp::Add,
                Box::new(num(1.0)),
                Box::new(Expr::Binary(BinaryOp::Mul, Box::new(num(2.0)), Box::new(num(3.0))))
            )
        );
    }

    #[test]
    fn test_literal_words() {
        assert_eq!(parse_expression("true").unwrap(), Expr::Literal(Value::Bool(true)));
        assert_eq!(parse_expression("nil").unwrap(), Expr::Literal(Value::Null));
        assert_eq!(parse_expression("none").unwrap(), Expr::Literal(Value::Null));
    }

    #[test]
    fn test_attr_index_and_call() {
        let expr = parse_expression("a.b[0](1, k=2)").unwrap();
        let Expr::Call { target, args, kwargs } = expr else {
            panic!("expected call");
        };
        assert_eq!(args, vec![num(1.0)]);
        assert_eq!(kwargs, vec![("k".to_string(), num(2.0))]);
        assert_eq!(
            *target,
            Expr::Index(
                Box::new(Expr::Attr(Box::new(name("a")), "b".to_string())),
                Box::new(num(0.0))
            )
        );
    }

    #[test]
    fn test_dot_number_is_index() {
        let expr = parse_expression("items.0").unwrap();
        assert_eq!(expr, Expr::Index(Box::new(name("items")), Box::new(num(0.0))));
    }

    #[test]
    fn test_filter_binds_to_operand() {
        let expr = parse_expression("a + b | upper").unwrap();
        let Expr::Binary(BinaryOp::Add, _, right) = expr else {
            panic!("expected addition");
        };
        assert!(matches!(*right, Expr::Filter(_, ref f) if f.name == "upper"));
    }

    #[test]
    fn test_filter_kwargs_rejected() {
        assert!(parse_expression("x | truncate(length=3)").is_err());
    }

    #[test]
    fn test_compare_chain() {
        let expr = parse_expression("1 < 2 < 3").unwrap();
        let Expr::Compare(_, chain) = expr else {
            panic!("expected comparison");
        };
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_not_in_and_is() {
        let expr = parse_expression("x not in xs").unwrap();
        assert!(matches!(expr, Expr::Compare(_, ref c) if matches!(c[0], Comparison::In { negated: true, .. })));

        let expr = parse_expression("n is not divisibleby(3)").unwrap();
        let Expr::Compare(_, chain) = expr else {
            panic!("expected comparison");
        };
        assert_eq!(
            chain[0],
            Comparison::Test {
                negated: true,
                name: "divisibleby".to_string(),
                args: vec![num(3.0)],
            }
        );

        let expr = parse_expression("a is b").unwrap();
        assert!(matches!(expr, Expr::Compare(_, ref c) if matches!(c[0], Comparison::IsEq { negated: false, .. })));
    }

    #[test]
    fn test_not_is_unary() {
        let expr = parse_expression("not a and b").unwrap();
        assert!(matches!(expr, Expr::And(ref l, _) if matches!(**l, Expr::Unary(UnaryOp::Not, _))));
    }

    #[test]
    fn test_conditional_without_else() {
        let expr = parse_expression("'y' if flag").unwrap();
        assert!(matches!(expr, Expr::Conditional { otherwise: None, .. }));
    }

    #[test]
    fn test_list_and_dict_literals() {
        assert_eq!(
            parse_expression("[1, 2,]").unwrap(),
            Expr::List(vec![num(1.0), num(2.0)])
        );
        let Expr::Dict(pairs) = parse_expression("{a: 1, 'b c': 2}").unwrap() else {
            panic!("expected dict");
        };
        assert_eq!(pairs[0].0, Expr::Literal(Value::from("a")));
        assert_eq!(pairs[1].0, Expr::Literal(Value::from("b c")));
    }

    #[test]
    fn test_trailing_tokens_rejected() {
        assert!(parse_expression("a b").is_err());
        assert!(parse_expression("(a").is_err());
        assert!(parse_expression("").is_err());
    }

    #[test]
    fn test_filter_chain() {
        let chain = parse_filter_chain("replace('a', 'b') | upper").unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].name, "replace");
        assert_eq!(chain[0].args.len(), 2);
        assert!(parse_filter_chain("upper lower").is_err());
    }

    #[test]
    fn test_macro_signature() {
        let (n, params) = parse_macro_signature("field(name, value='', type=\"text\")").unwrap();
        assert_eq!(n, "field");
        assert_eq!(params.len(), 3);
        assert!(params[0].1.is_none());
        assert_eq!(params[2].1, Some(Expr::Literal(Value::from("text"))));

        let (n, params) = parse_macro_signature("bare").unwrap();
        assert_eq!(n, "bare");
        assert!(params.is_empty());
        assert!(parse_macro_signature("bad(1)").is_err());
    }
}
