//! Template parser.
//!
//! Converts a stream of lexer [`Token`]s into a tree of [`Node`]s that the
//! renderer walks. Block tags are matched with their end tags here, so the
//! renderer never rescans text. `block`, `endblock` and `extends` tags are
//! already resolved by the compiler and are dropped, as are unknown or stray
//! tags.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use nunchucks_core::error::{NunchucksError, NunchucksResult};

use crate::expr::{parse_filter_chain, parse_macro_signature, Expression, FilterCall, Param};
use crate::lexer::{tokenize, Tag, Token};

static FOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^([A-Za-z_]\w*)\s*(?:,\s*([A-Za-z_]\w*)\s*)?\s+in\s+(.+)$").expect("valid regex")
});
static MODIFIER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^(.*?)\s+(ignore\s+missing|with\s+context|without\s+context)\s*$").expect("valid regex")
});
static IMPORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^(.+?)\s+as\s+([A-Za-z_]\w*)$").expect("valid regex"));
static FROM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^(.+?)\s+import\s+(.+)$").expect("valid regex"));
static NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z_]\w*)(?:\s+as\s+([A-Za-z_]\w*))?$").expect("valid regex")
});
static IDENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_]\w*$").expect("valid regex"));

/// A node in the parsed template tree.
#[derive(Debug, Clone)]
pub enum Node {
    /// Literal text, including the bodies of `raw`/`verbatim` blocks.
    Text(String),
    /// `{{ expr }}`
    Output(Expression),
    /// `{% set a = x, b = y %}`
    Set(Vec<(String, Expression)>),
    /// `{% if %}` with its `elif`/`else` branches.
    If(Vec<Branch>),
    For(ForLoop),
    Macro(Arc<MacroDef>),
    Call(CallBlock),
    FilterBlock(FilterBlock),
    Include(Include),
    Import(Import),
    FromImport(FromImport),
}

/// One branch of an `if`; `else` has no condition.
#[derive(Debug, Clone)]
pub struct Branch {
    pub condition: Option<Expression>,
    pub body: Vec<Node>,
}

#[derive(Debug, Clone)]
pub struct ForLoop {
    /// One or two loop variable names.
    pub targets: Vec<String>,
    pub iterable: Expression,
    pub body: Vec<Node>,
    /// Rendered when the loop runs zero times.
    pub else_body: Vec<Node>,
}

/// A macro as written: signature and body, not yet bound to a scope.
#[derive(Debug, Clone)]
pub struct MacroDef {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Node>,
}

#[derive(Debug, Clone)]
pub struct CallBlock {
    pub callee: Expression,
    pub body: Vec<Node>,
}

#[derive(Debug, Clone)]
pub struct FilterBlock {
    pub filters: Vec<FilterCall>,
    pub body: Vec<Node>,
}

#[derive(Debug, Clone)]
pub struct Include {
    pub template: Expression,
    pub ignore_missing: bool,
    pub with_context: bool,
}

#[derive(Debug, Clone)]
pub struct Import {
    pub template: Expression,
    pub alias: String,
    pub with_context: bool,
}

#[derive(Debug, Clone)]
pub struct FromImport {
    pub template: Expression,
    /// `(macro name, bound name)` pairs.
    pub names: Vec<(String, String)>,
    pub with_context: bool,
}

/// Tokenizes and parses template source.
///
/// # Errors
///
/// Returns `CompileError` for unterminated blocks and malformed statements.
pub fn parse(source: &str) -> NunchucksResult<Vec<Node>> {
    let tokens = tokenize(source)?;
    let mut parser = ParserState::new(&tokens);
    let (nodes, _) = parser.parse_nodes(&[])?;
    Ok(nodes)
}

struct ParserState<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> ParserState<'a> {
    const fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    /// Parses until one of `end_tags` or the end of input. Returns the nodes
    /// and the terminating tag, which is consumed.
    fn parse_nodes(&mut self, end_tags: &[&str]) -> NunchucksResult<(Vec<Node>, Option<&'a Tag>)> {
        let mut nodes = Vec::new();

        let tokens = self.tokens;
        while self.pos < tokens.len() {
            let token = &tokens[self.pos];
            self.pos += 1;

            match token {
                Token::Text(text) | Token::Raw(text) => nodes.push(Node::Text(text.clone())),
                Token::Output(expr) => nodes.push(Node::Output(Expression::parse(expr))),
                Token::Statement(tag) => {
                    if end_tags.contains(&tag.keyword.as_str()) {
                        return Ok((nodes, Some(tag)));
                    }
                    if let Some(node) = self.parse_statement(tag)? {
                        nodes.push(node);
                    }
                }
            }
        }

        Ok((nodes, None))
    }

    /// Parses a body that must end with `end_tag`.
    fn parse_body(&mut self, opener: &str, end_tag: &str) -> NunchucksResult<Vec<Node>> {
        match self.parse_nodes(&[end_tag])? {
            (body, Some(_)) => Ok(body),
            (_, None) => Err(unterminated(opener, end_tag)),
        }
    }

    fn parse_statement(&mut self, tag: &Tag) -> NunchucksResult<Option<Node>> {
        let args = tag.args.as_str();
        let node = match tag.keyword.as_str() {
            "set" => Node::Set(parse_set(args)?),
            "if" => self.parse_if(args)?,
            "for" => self.parse_for(args)?,
            "macro" => {
                let (name, params) = parse_macro_signature(args)
                    .map_err(|e| NunchucksError::CompileError(format!("malformed macro `{args}`: {e}")))?;
                let body = self.parse_body("macro", "endmacro")?;
                Node::Macro(Arc::new(MacroDef { name, params, body }))
            }
            "call" => {
                let body = self.parse_body("call", "endcall")?;
                Node::Call(CallBlock {
                    callee: Expression::parse(args),
                    body,
                })
            }
            "filter" => {
                let filters = parse_filter_chain(args)
                    .map_err(|e| NunchucksError::CompileError(format!("malformed filter `{args}`: {e}")))?;
                let body = self.parse_body("filter", "endfilter")?;
                Node::FilterBlock(FilterBlock { filters, body })
            }
            "include" => Node::Include(parse_include(args)?),
            "import" => Node::Import(parse_import(args)?),
            "from" => Node::FromImport(parse_from(args)?),
            other => {
                tracing::trace!(tag = other, "dropping tag");
                return Ok(None);
            }
        };
        Ok(Some(node))
    }

    fn parse_if(&mut self, args: &str) -> NunchucksResult<Node> {
        let mut branches = Vec::new();
        let mut condition = Some(Expression::parse(args));
        let mut after_else = false;

        loop {
            let (body, end) = self.parse_nodes(&["elif", "else", "endif"])?;
            let Some(end) = end else {
                return Err(unterminated("if", "endif"));
            };
            // branches after `else` can never be chosen
            if !after_else {
                after_else = condition.is_none();
                branches.push(Branch {
                    condition: condition.take(),
                    body,
                });
            }
            match end.keyword.as_str() {
                "endif" => break,
                "elif" => condition = Some(Expression::parse(&end.args)),
                _ => condition = None,
            }
        }

        Ok(Node::If(branches))
    }

    fn parse_for(&mut self, args: &str) -> NunchucksResult<Node> {
        let caps = FOR_RE
            .captures(args)
            .ok_or_else(|| NunchucksError::CompileError(format!("malformed for `{args}`")))?;
        let mut targets = vec![caps[1].to_string()];
        if let Some(second) = caps.get(2) {
            targets.push(second.as_str().to_string());
        }
        let iterable = Expression::parse(&caps[3]);

        let (body, end) = self.parse_nodes(&["else", "endfor"])?;
        let else_body = match end.map(|t| t.keyword.as_str()) {
            Some("endfor") => Vec::new(),
            Some(_) => self.parse_body("for", "endfor")?,
            None => return Err(unterminated("for", "endfor")),
        };

        Ok(Node::For(ForLoop {
            targets,
            iterable,
            body,
            else_body,
        }))
    }
}

fn unterminated(opener: &str, end_tag: &str) -> NunchucksError {
    NunchucksError::CompileError(format!("unterminated {opener}: expected {end_tag}"))
}

/// Splits `a = x, b = y` into assignments.
fn parse_set(args: &str) -> NunchucksResult<Vec<(String, Expression)>> {
    let malformed = || NunchucksError::CompileError(format!("malformed set `{args}`"));
    let mut assignments = Vec::new();
    for part in split_top_level(args, ',') {
        let eq = find_assign(part).ok_or_else(malformed)?;
        let name = part[..eq].trim();
        if !IDENT_RE.is_match(name) {
            return Err(malformed());
        }
        assignments.push((name.to_string(), Expression::parse(&part[eq + 1..])));
    }
    if assignments.is_empty() {
        return Err(malformed());
    }
    Ok(assignments)
}

/// Peels trailing modifiers off a tag argument. Returns the remaining text
/// and the modifiers found, lowercased with single spaces.
fn strip_modifiers(args: &str) -> (String, Vec<String>) {
    let mut rest = args.trim().to_string();
    let mut found = Vec::new();
    while let Some(caps) = MODIFIER_RE.captures(&rest) {
        found.push(
            caps[2]
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase(),
        );
        rest = caps[1].trim().to_string();
    }
    (rest, found)
}

/// Resolves the context modifier; the last one written wins.
fn with_context(modifiers: &[String], default: bool) -> bool {
    modifiers
        .iter()
        .find_map(|m| match m.as_str() {
            "with context" => Some(true),
            "without context" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

fn parse_include(args: &str) -> NunchucksResult<Include> {
    let (template, modifiers) = strip_modifiers(args);
    if template.is_empty() {
        return Err(NunchucksError::CompileError("include requires a template name".to_string()));
    }
    Ok(Include {
        template: Expression::parse(&template),
        ignore_missing: modifiers.iter().any(|m| m == "ignore missing"),
        with_context: with_context(&modifiers, true),
    })
}

fn parse_import(args: &str) -> NunchucksResult<Import> {
    let (rest, modifiers) = strip_modifiers(args);
    let caps = IMPORT_RE
        .captures(&rest)
        .ok_or_else(|| NunchucksError::CompileError(format!("malformed import `{args}`")))?;
    Ok(Import {
        template: Expression::parse(&caps[1]),
        alias: caps[2].to_string(),
        with_context: with_context(&modifiers, false),
    })
}

fn parse_from(args: &str) -> NunchucksResult<FromImport> {
    let malformed = || NunchucksError::CompileError(format!("malformed from-import `{args}`"));
    let (rest, modifiers) = strip_modifiers(args);
    let caps = FROM_RE.captures(&rest).ok_or_else(malformed)?;
    let mut names = Vec::new();
    for item in caps[2].split(',') {
        let item = item.trim();
        let name_caps = NAME_RE.captures(item).ok_or_else(malformed)?;
        let name = name_caps[1].to_string();
        let alias = name_caps
            .get(2)
            .map_or_else(|| name.clone(), |m| m.as_str().to_string());
        names.push((name, alias));
    }
    Ok(FromImport {
        template: Expression::parse(&caps[1]),
        names,
        with_context: with_context(&modifiers, false),
    })
}

/// Splits on `sep` outside quotes and brackets.
fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;
    for (i, ch) in s.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            c if c == sep && depth == 0 => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    let tail = &s[start..];
    if !tail.trim().is_empty() || !parts.is_empty() {
        parts.push(tail);
    }
    parts
}

/// Finds the first `=` that is an assignment, not part of `==`, `!=`,
/// `<=` or `>=`, outside quotes.
fn find_assign(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut quote: Option<u8> = None;
    for (i, &b) in bytes.iter().enumerate() {
        if let Some(q) = quote {
            if b == q && (i == 0 || bytes[i - 1] != b'\\') {
                quote = None;
            }
            continue;
        }
        match b {
            b'"' | b'\'' => quote = Some(b),
            b'=' => {
                let prev = i.checked_sub(1).map(|j| bytes[j]);
                let next = bytes.get(i + 1).copied();
                if !matches!(prev, Some(b'=' | b'!' | b'<' | b'>')) && next != Some(b'=') {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_and_output() {
        let nodes = parse("Hello {{ name }}!").unwrap();
        assert_eq!(nodes.len(), 3);
        assert!(matches!(&nodes[1], Node::Output(e) if e.source() == "name"));
    }

    #[test]
    fn test_parse_set_multiple() {
        let nodes = parse("{% set a = 1, b = [1, 2], c = a == 1 %}").unwrap();
        let Node::Set(assignments) = &nodes[0] else {
            panic!("expected set");
        };
        let names: Vec<&str> = assignments.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(assignments[2].1.source(), "a == 1");
    }

    #[test]
    fn test_parse_set_malformed() {
        assert!(parse("{% set = 1 %}").is_err());
        assert!(parse("{% set a %}").is_err());
        assert!(parse("{% set 1a = 2 %}").is_err());
    }

    #[test]
    fn test_parse_if_elif_else() {
        let nodes = parse("{% if a %}A{% elif b %}B{% else %}C{% endif %}").unwrap();
        let Node::If(branches) = &nodes[0] else {
            panic!("expected if");
        };
        assert_eq!(branches.len(), 3);
        assert!(branches[2].condition.is_none());
    }

    #[test]
    fn test_parse_unterminated() {
        let err = parse("{% if a %}never").unwrap_err();
        assert_eq!(err.to_string(), "compile error: unterminated if: expected endif");
        assert!(parse("{% for x in y %}").is_err());
        assert!(parse("{% macro m() %}").is_err());
        assert!(parse("{% filter upper %}").is_err());
        assert!(parse("{% call m() %}").is_err());
    }

    #[test]
    fn test_parse_for_targets_and_else() {
        let nodes = parse("{% for k, v in items %}x{% else %}empty{% endfor %}").unwrap();
        let Node::For(for_loop) = &nodes[0] else {
            panic!("expected for");
        };
        assert_eq!(for_loop.targets, vec!["k", "v"]);
        assert_eq!(for_loop.iterable.source(), "items");
        assert_eq!(for_loop.else_body.len(), 1);
        assert!(parse("{% for in items %}{% endfor %}").is_err());
    }

    #[test]
    fn test_parse_macro() {
        let nodes = parse("{% macro greet(name, greeting='hi') %}{{ greeting }}{% endmacro %}").unwrap();
        let Node::Macro(def) = &nodes[0] else {
            panic!("expected macro");
        };
        assert_eq!(def.name, "greet");
        assert_eq!(def.params.len(), 2);
        assert_eq!(def.body.len(), 1);
    }

    #[test]
    fn test_parse_include_modifiers() {
        let nodes = parse(r#"{% include "a.njk" ignore missing without context %}"#).unwrap();
        let Node::Include(inc) = &nodes[0] else {
            panic!("expected include");
        };
        assert_eq!(inc.template.source(), r#""a.njk""#);
        assert!(inc.ignore_missing);
        assert!(!inc.with_context);

        let nodes = parse(r#"{% include "a.njk" %}"#).unwrap();
        let Node::Include(inc) = &nodes[0] else {
            panic!("expected include");
        };
        assert!(!inc.ignore_missing);
        assert!(inc.with_context);
    }

    #[test]
    fn test_parse_imports() {
        let nodes = parse(r#"{% import "forms.njk" as forms with context %}"#).unwrap();
        let Node::Import(imp) = &nodes[0] else {
            panic!("expected import");
        };
        assert_eq!(imp.alias, "forms");
        assert!(imp.with_context);

        let nodes = parse(r#"{% from "forms.njk" import field, label as lbl %}"#).unwrap();
        let Node::FromImport(from) = &nodes[0] else {
            panic!("expected from-import");
        };
        assert_eq!(
            from.names,
            vec![
                ("field".to_string(), "field".to_string()),
                ("label".to_string(), "lbl".to_string())
            ]
        );
        assert!(!from.with_context);
        assert!(parse(r#"{% import "x" %}"#).is_err());
    }

    #[test]
    fn test_block_and_unknown_tags_dropped() {
        let nodes = parse("{% block t %}body{% endblock %}{% unknown %}{% endif %}").unwrap();
        assert_eq!(nodes.len(), 1);
        assert!(matches!(&nodes[0], Node::Text(t) if t == "body"));
    }

    #[test]
    fn test_raw_becomes_text() {
        let nodes = parse("{% raw %}{{ x }}{% endraw %}").unwrap();
        assert!(matches!(&nodes[0], Node::Text(t) if t == "{{ x }}"));
    }

    #[test]
    fn test_split_top_level() {
        assert_eq!(split_top_level("a = f(1, 2), b = 'x,y'", ','), vec!["a = f(1, 2)", " b = 'x,y'"]);
        assert!(split_top_level("  ", ',').is_empty());
    }

    #[test]
    fn test_find_assign() {
        assert_eq!(find_assign("x = a == b"), Some(2));
        assert_eq!(find_assign("a == b"), None);
        assert_eq!(find_assign("'=' "), None);
    }
}
