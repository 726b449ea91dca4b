//! Template compiler: include splicing and `extends` merging.
//!
//! Compilation turns a template name into one flattened source string.
//! Plain `{% include "x" %}` tags are replaced with the (recursively
//! flattened) source of `x`, then each `{% extends "base" %}` is resolved by
//! overlaying the child's blocks onto the base, innermost child first.
//! Everything else is left for the renderer. Tags inside `raw` and
//! `verbatim` blocks are never touched.

use std::collections::{HashMap, HashSet};
use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

use nunchucks_core::error::{NunchucksError, NunchucksResult};

use crate::lexer::{END_RAW_RE, END_VERBATIM_RE};
use crate::loaders::TemplateLoader;

static INCLUDE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\{%-?\s*include\s+(?:"([^"']+)"|'([^"']+)')\s*-?%\}"#).expect("valid regex")
});
static EXTENDS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\{%-?\s*extends\s+(?:"([^"']+)"|'([^"']+)')\s*-?%\}"#).expect("valid regex")
});
static BLOCK_TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{%-?\s*(block|endblock)\b([^%]*?)-?%\}").expect("valid regex")
});
static SUPER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{-?\s*super\(\)\s*-?\}\}").expect("valid regex"));
static RAW_OPEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{%-?\s*(raw|verbatim)\s*-?%\}").expect("valid regex"));

/// Byte ranges of one `{% block name %}...{% endblock %}` construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpan {
    pub open_start: usize,
    pub body_start: usize,
    pub body_end: usize,
    pub close_end: usize,
}

/// Resolves includes and inheritance through a loader.
pub struct Compiler<'a> {
    loader: &'a dyn TemplateLoader,
}

impl<'a> Compiler<'a> {
    pub fn new(loader: &'a dyn TemplateLoader) -> Self {
        Self { loader }
    }

    /// Loads and flattens the template called `name`.
    ///
    /// # Errors
    ///
    /// Returns the loader's error for any missing template, or
    /// `CompileError` for an `extends` cycle.
    pub fn compile(&self, name: &str) -> NunchucksResult<String> {
        let source = self.loader.read(name)?;
        self.flatten(&source, Some(name))
    }

    /// Flattens already-loaded source. `origin` is the template's own name,
    /// if it has one, so that it takes part in cycle detection.
    ///
    /// # Errors
    ///
    /// Same as [`compile`](Self::compile).
    pub fn flatten(&self, source: &str, origin: Option<&str>) -> NunchucksResult<String> {
        let seen: HashSet<String> = origin.map(str::to_string).into_iter().collect();
        let mut child = self.resolve_includes(source, &seen)?;

        let mut chain: Vec<String> = origin.map(str::to_string).into_iter().collect();
        while let Some(base_name) = first_quoted_arg(&EXTENDS_RE, &child) {
            if chain.contains(&base_name) {
                chain.push(base_name);
                return Err(NunchucksError::CompileError(format!(
                    "extends cycle detected: {}",
                    chain.join(" -> ")
                )));
            }
            tracing::debug!(base = %base_name, "merging extends");
            let base_raw = self.loader.read(&base_name)?;
            let base = self.resolve_includes(&base_raw, &HashSet::from([base_name.clone()]))?;
            chain.push(base_name);
            child = strip_extends(&merge_extends(&base, &child));
        }

        Ok(strip_extends(&child))
    }

    /// Splices plain includes. `seen` holds the templates on the current
    /// branch; an include back to one of them is dropped.
    fn resolve_includes(&self, source: &str, seen: &HashSet<String>) -> NunchucksResult<String> {
        let mut out = source.to_string();
        while let Some(caps) = first_outside_raw(&INCLUDE_RE, &out) {
            let whole = caps.get(0).map_or(0..0, |m| m.range());
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map_or_else(String::new, |m| m.as_str().to_string());
            drop(caps);

            if seen.contains(&name) {
                tracing::debug!(template = %name, "dropping cyclic include");
                out.replace_range(whole, "");
                continue;
            }

            tracing::debug!(template = %name, "splicing include");
            let child = self.loader.read(&name)?;
            let mut branch = seen.clone();
            branch.insert(name);
            let resolved = self.resolve_includes(&child, &branch)?;
            out.replace_range(whole, &resolved);
        }
        Ok(out)
    }
}

/// Byte ranges of the `raw` and `verbatim` blocks in `source`, tags
/// included. An unclosed block runs to the end.
fn raw_spans(source: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut pos = 0;
    while let Some(caps) = RAW_OPEN_RE.captures_at(source, pos) {
        let Some(open) = caps.get(0) else { break };
        let close = if &caps[1] == "raw" { &*END_RAW_RE } else { &*END_VERBATIM_RE };
        let end = close.find_at(source, open.end()).map_or(source.len(), |m| m.end());
        spans.push(open.start()..end);
        pos = end;
    }
    spans
}

fn in_spans(spans: &[Range<usize>], at: usize) -> bool {
    spans.iter().any(|span| span.contains(&at))
}

/// The first match of `re` that is not inside a raw block.
fn first_outside_raw<'s>(re: &Regex, source: &'s str) -> Option<regex::Captures<'s>> {
    let spans = raw_spans(source);
    re.captures_iter(source)
        .find(|caps| caps.get(0).is_some_and(|m| !in_spans(&spans, m.start())))
}

/// The quoted argument of the first tag `re` matches outside raw blocks.
fn first_quoted_arg(re: &Regex, source: &str) -> Option<String> {
    let caps = first_outside_raw(re, source)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string())
}

/// Removes `extends` tags outside raw blocks.
fn strip_extends(source: &str) -> String {
    let spans = raw_spans(source);
    let mut out = source.to_string();
    let found: Vec<Range<usize>> = EXTENDS_RE
        .find_iter(source)
        .map(|m| m.range())
        .filter(|r| !in_spans(&spans, r.start))
        .collect();
    for range in found.into_iter().rev() {
        out.replace_range(range, "");
    }
    out
}

/// Finds every block in `source`, keyed by name. Blocks nest; a later
/// block with the same name replaces an earlier one.
pub fn extract_blocks(source: &str) -> HashMap<String, BlockSpan> {
    let mut blocks = HashMap::new();
    let mut stack: Vec<(String, usize, usize)> = Vec::new();
    let raw = raw_spans(source);

    for caps in BLOCK_TAG_RE.captures_iter(source) {
        let Some(tag) = caps.get(0) else { continue };
        if in_spans(&raw, tag.start()) {
            continue;
        }
        if &caps[1] == "block" {
            if let Some(name) = caps[2].split_whitespace().next() {
                stack.push((name.to_string(), tag.start(), tag.end()));
            }
        } else if let Some((name, open_start, body_start)) = stack.pop() {
            blocks.insert(
                name,
                BlockSpan {
                    open_start,
                    body_start,
                    body_end: tag.start(),
                    close_end: tag.end(),
                },
            );
        }
    }

    blocks
}

/// Overlays the child's blocks onto the base.
///
/// Each block present in both takes the child's body, with `{{ super() }}`
/// replaced by the base's original body. Content outside blocks comes from
/// the base. Overrides nested inside another override are already carried
/// by the outer body and are skipped.
pub fn merge_extends(base: &str, child: &str) -> String {
    let base_blocks = extract_blocks(base);
    let child_blocks = extract_blocks(child);

    let mut edits: Vec<(usize, usize, String)> = base_blocks
        .iter()
        .filter_map(|(name, bb)| {
            let cb = child_blocks.get(name)?;
            let base_body = &base[bb.body_start..bb.body_end];
            let child_body = &child[cb.body_start..cb.body_end];
            let merged = SUPER_RE.replace_all(child_body, regex::NoExpand(base_body));
            Some((bb.body_start, bb.body_end, merged.into_owned()))
        })
        .collect();

    edits.sort_by_key(|e| e.0);
    let mut kept: Vec<(usize, usize, String)> = Vec::with_capacity(edits.len());
    for edit in edits {
        if kept.last().is_some_and(|last| edit.0 < last.1) {
            continue;
        }
        kept.push(edit);
    }

    let mut out = base.to_string();
    for (start, end, body) in kept.into_iter().rev() {
        out.replace_range(start..end, &body);
    }
    out
}
