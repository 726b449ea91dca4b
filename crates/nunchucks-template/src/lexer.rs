//! Template lexer (tokenizer).
//!
//! Splits template source into literal text, output expressions (`{{ }}`),
//! statement tags (`{% %}`) and raw blocks. Comments (`{# #}`) are dropped.
//! A `-` just inside a delimiter (`{{-`, `-%}`) trims the whitespace on that
//! side of the tag.

use once_cell::sync::Lazy;
use regex::Regex;

use nunchucks_core::error::{NunchucksError, NunchucksResult};

/// A token produced by the template lexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A literal text segment.
    Text(String),
    /// The trimmed expression inside `{{ }}`.
    Output(String),
    /// A statement tag: `{% keyword args %}`.
    Statement(Tag),
    /// The untouched body of a `raw` or `verbatim` block.
    Raw(String),
}

/// A statement tag split into its keyword and the remaining text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub keyword: String,
    pub args: String,
}

pub(crate) static END_RAW_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{%-?\s*endraw\s*-?%\}").expect("valid regex"));
pub(crate) static END_VERBATIM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{%-?\s*endverbatim\s*-?%\}").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagType {
    Output,    // {{
    Statement, // {%
    Comment,   // {#
}

impl TagType {
    const fn closer(self) -> &'static str {
        match self {
            Self::Output => "}}",
            Self::Statement => "%}",
            Self::Comment => "#}",
        }
    }
}

/// Tokenizes template source.
///
/// An opener without a matching closer, and a statement tag that does not
/// start with a keyword, are kept as literal text.
///
/// # Errors
///
/// Returns `CompileError` for a `raw` or `verbatim` block without its end tag.
pub fn tokenize(source: &str) -> NunchucksResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut remaining = source;
    let mut trim_next = false;

    loop {
        let Some((pos, tag_type)) = find_next_open(remaining) else {
            push_text(&mut tokens, remaining, trim_next, false);
            break;
        };

        let inner_start = pos + 2;
        let trim_before = remaining[inner_start..].starts_with('-');
        let body_start = inner_start + usize::from(trim_before);
        let closer = tag_type.closer();
        let Some(close_rel) = find_closer(&remaining[body_start..], closer, tag_type != TagType::Comment)
        else {
            push_text(&mut tokens, remaining, trim_next, false);
            break;
        };

        let tag_end = body_start + close_rel + closer.len();
        let mut inner = &remaining[body_start..body_start + close_rel];
        let trim_after = inner.ends_with('-');
        if trim_after {
            inner = &inner[..inner.len() - 1];
        }

        push_text(&mut tokens, &remaining[..pos], trim_next, trim_before);
        let whole_tag = &remaining[pos..tag_end];
        remaining = &remaining[tag_end..];
        trim_next = trim_after;

        match tag_type {
            TagType::Comment => {}
            TagType::Output => tokens.push(Token::Output(inner.trim().to_string())),
            TagType::Statement => {
                let Some(tag) = split_tag(inner.trim()) else {
                    tokens.push(Token::Text(whole_tag.to_string()));
                    continue;
                };
                let end_re = match tag.keyword.as_str() {
                    "raw" => &*END_RAW_RE,
                    "verbatim" => &*END_VERBATIM_RE,
                    _ => {
                        tokens.push(Token::Statement(tag));
                        continue;
                    }
                };
                let Some(end) = end_re.find(remaining) else {
                    return Err(NunchucksError::CompileError(format!(
                        "unterminated {0}: expected end{0}",
                        tag.keyword
                    )));
                };
                tokens.push(Token::Raw(remaining[..end.start()].to_string()));
                trim_next = end.as_str().ends_with("-%}");
                remaining = &remaining[end.end()..];
            }
        }
    }

    Ok(tokens)
}

fn push_text(tokens: &mut Vec<Token>, text: &str, trim_start: bool, trim_end: bool) {
    let mut text = text;
    if trim_start {
        text = text.trim_start();
    }
    if trim_end {
        text = text.trim_end();
    }
    if !text.is_empty() {
        tokens.push(Token::Text(text.to_string()));
    }
}

/// Finds the next tag opening in the source.
fn find_next_open(s: &str) -> Option<(usize, TagType)> {
    let mut best: Option<(usize, TagType)> = None;

    for (tag_str, tag_type) in [
        ("{{", TagType::Output),
        ("{%", TagType::Statement),
        ("{#", TagType::Comment),
    ] {
        if let Some(pos) = s.find(tag_str) {
            match best {
                None => best = Some((pos, tag_type)),
                Some((best_pos, _)) if pos < best_pos => best = Some((pos, tag_type)),
                _ => {}
            }
        }
    }

    best
}

/// Finds `closer`, skipping over quoted strings when `quote_aware`. Falls
/// back to a plain search if quoting leaves no closer.
fn find_closer(s: &str, closer: &str, quote_aware: bool) -> Option<usize> {
    if quote_aware {
        let mut quote: Option<char> = None;
        let mut escaped = false;
        for (i, ch) in s.char_indices() {
            if let Some(q) = quote {
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == q {
                    quote = None;
                }
            } else if ch == '"' || ch == '\'' {
                quote = Some(ch);
            } else if s[i..].starts_with(closer) {
                return Some(i);
            }
        }
    }
    s.find(closer)
}

/// Splits `keyword rest`. Returns `None` unless the content starts with an
/// identifier.
fn split_tag(content: &str) -> Option<Tag> {
    let first = content.chars().next()?;
    if !(first.is_alphabetic() || first == '_') {
        return None;
    }
    let end = content
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(content.len());
    Some(Tag {
        keyword: content[..end].to_string(),
        args: content[end..].trim().to_string(),
    })
}
