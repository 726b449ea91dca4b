//! Built-in template filters.
//!
//! Each filter is a struct implementing [`Filter`], registered by name in a
//! [`FilterRegistry`]. Lookup is case-insensitive and an unknown name acts
//! as the identity, so a typo in a template degrades instead of failing.
//! Filters never raise: unusable arguments fall back to their defaults.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;

use crate::testers::{evaluate_test, is_known_test};
use crate::value::{compare_values, Map, Value};

/// A template filter.
///
/// Takes the piped value and the positional arguments from `|name(args)`.
pub trait Filter: Send + Sync {
    /// Returns the filter name.
    fn name(&self) -> &str;

    /// Applies the filter.
    fn apply(&self, value: &Value, args: &[Value]) -> Value;
}

/// A filter backed by a closure, used for host registrations.
struct FnFilter<F> {
    name: String,
    func: F,
}

impl<F> Filter for FnFilter<F>
where
    F: Fn(&Value, &[Value]) -> Value + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, value: &Value, args: &[Value]) -> Value {
        (self.func)(value, args)
    }
}

/// A registry of available filters, keyed by lowercase name.
#[derive(Clone, Default)]
pub struct FilterRegistry {
    filters: HashMap<String, Arc<dyn Filter>>,
}

impl FilterRegistry {
    /// Creates a new empty filter registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry pre-populated with every built-in filter.
    pub fn with_builtins() -> Self {
        default_registry().clone()
    }

    /// Registers a filter, replacing any filter of the same name.
    pub fn register(&mut self, filter: Arc<dyn Filter>) {
        self.filters.insert(filter.name().to_lowercase(), filter);
    }

    /// Registers a closure as a filter.
    pub fn register_fn<F>(&mut self, name: &str, func: F)
    where
        F: Fn(&Value, &[Value]) -> Value + Send + Sync + 'static,
    {
        self.register(Arc::new(FnFilter {
            name: name.to_string(),
            func,
        }));
    }

    /// Returns the filter registered under `name`, if any.
    pub fn get(&self, name: &str) -> Option<&dyn Filter> {
        self.filters
            .get(&name.trim().to_lowercase())
            .map(AsRef::as_ref)
    }

    /// Returns `true` if a filter is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Applies a named filter. Unknown names return `value` unchanged.
    pub fn apply(&self, name: &str, value: &Value, args: &[Value]) -> Value {
        match self.get(name) {
            Some(filter) => filter.apply(value, args),
            None => {
                tracing::trace!(filter = name, "unknown filter, passing value through");
                value.clone()
            }
        }
    }

    /// Returns the number of registered filters.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Returns `true` if no filters are registered.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

/// Returns the registry holding all built-in filters.
pub fn default_registry() -> &'static FilterRegistry {
    static REGISTRY: Lazy<FilterRegistry> = Lazy::new(|| {
        let mut r = FilterRegistry::new();
        register_all(&mut r);
        r
    });
    &REGISTRY
}

/// Registers all built-in filters.
fn register_all(r: &mut FilterRegistry) {
    // String filters
    r.register(Arc::new(LowerFilter));
    r.register(Arc::new(UpperFilter));
    r.register(Arc::new(StringFilter));
    r.register(Arc::new(TrimFilter));
    r.register(Arc::new(TitleFilter));
    r.register(Arc::new(CapitalizeFilter));
    r.register(Arc::new(ReplaceFilter));
    r.register(Arc::new(TruncateFilter));
    r.register(Arc::new(CenterFilter));
    r.register(Arc::new(IndentFilter));
    r.register(Arc::new(WordcountFilter));

    // Markup filters
    r.register(Arc::new(EscapeFilter("escape")));
    r.register(Arc::new(EscapeFilter("e")));
    r.register(Arc::new(EscapeFilter("forceescape")));
    r.register(Arc::new(SafeFilter));
    r.register(Arc::new(UrlencodeFilter));
    r.register(Arc::new(UrlizeFilter));
    r.register(Arc::new(StriptagsFilter));
    r.register(Arc::new(Nl2brFilter));
    r.register(Arc::new(DumpFilter));

    // Number filters
    r.register(Arc::new(AbsFilter));
    r.register(Arc::new(IntFilter));
    r.register(Arc::new(FloatFilter));
    r.register(Arc::new(RoundFilter));
    r.register(Arc::new(SumFilter));

    // Collection filters
    r.register(Arc::new(LengthFilter));
    r.register(Arc::new(FirstFilter));
    r.register(Arc::new(LastFilter));
    r.register(Arc::new(JoinFilter));
    r.register(Arc::new(ListFilter));
    r.register(Arc::new(ReverseFilter));
    r.register(Arc::new(RandomFilter));
    r.register(Arc::new(BatchFilter));
    r.register(Arc::new(SliceFilter));

    // Ordering and grouping
    r.register(Arc::new(SortFilter));
    r.register(Arc::new(DictsortFilter));
    r.register(Arc::new(GroupbyFilter));

    // Predicates
    r.register(Arc::new(SelectFilter { keep: true }));
    r.register(Arc::new(SelectFilter { keep: false }));
    r.register(Arc::new(SelectattrFilter { keep: true }));
    r.register(Arc::new(SelectattrFilter { keep: false }));

    // Logic
    r.register(Arc::new(DefaultFilter));
}

static STRIP_TAGS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));
static URLIZE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://[^\s<]+").expect("valid regex"));

/// Characters left unescaped by `urlencode` (besides alphanumerics).
const QUERY_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// HTML-escapes `&`, `<`, `>`, `'` and `"`.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&#39;"),
            '"' => out.push_str("&#34;"),
            _ => out.push(ch),
        }
    }
    out
}

fn arg_str(args: &[Value], idx: usize, default: &str) -> String {
    args.get(idx).map_or_else(|| default.to_string(), ToString::to_string)
}

fn arg_int(args: &[Value], idx: usize, default: i64) -> i64 {
    args.get(idx).map_or(default, |a| a.to_int(default))
}

fn arg_bool(args: &[Value], idx: usize, default: bool) -> bool {
    args.get(idx).map_or(default, |a| a.to_bool(default))
}

/// The items of a sequence; any other value has none.
fn items_of(value: &Value) -> Vec<Value> {
    value.as_seq().map(<[Value]>::to_vec).unwrap_or_default()
}

#[allow(clippy::cast_precision_loss)]
fn number(n: usize) -> Value {
    Value::Number(n as f64)
}

/// Largest padding a filter will generate. Wider requests leave the value
/// unpadded.
const MAX_PAD: usize = 1 << 16;

fn clamp_usize(n: i64) -> usize {
    usize::try_from(n.max(0)).unwrap_or(usize::MAX)
}

// ============================================================
// String filters
// ============================================================

struct LowerFilter;
impl Filter for LowerFilter {
    fn name(&self) -> &str {
        "lower"
    }
    fn apply(&self, value: &Value, _args: &[Value]) -> Value {
        Value::String(value.to_string().to_lowercase())
    }
}

struct UpperFilter;
impl Filter for UpperFilter {
    fn name(&self) -> &str {
        "upper"
    }
    fn apply(&self, value: &Value, _args: &[Value]) -> Value {
        Value::String(value.to_string().to_uppercase())
    }
}

struct StringFilter;
impl Filter for StringFilter {
    fn name(&self) -> &str {
        "string"
    }
    fn apply(&self, value: &Value, _args: &[Value]) -> Value {
        Value::String(value.to_string())
    }
}

struct TrimFilter;
impl Filter for TrimFilter {
    fn name(&self) -> &str {
        "trim"
    }
    fn apply(&self, value: &Value, _args: &[Value]) -> Value {
        Value::String(value.to_string().trim().to_string())
    }
}

/// Uppercases the first letter of every word. A word starts after any
/// character that is not a letter, digit or underscore. Other letters are
/// left as they are.
struct TitleFilter;
impl Filter for TitleFilter {
    fn name(&self) -> &str {
        "title"
    }
    fn apply(&self, value: &Value, _args: &[Value]) -> Value {
        let s = value.to_string();
        let mut out = String::with_capacity(s.len());
        let mut at_boundary = true;
        for ch in s.trim().chars() {
            if at_boundary {
                out.extend(ch.to_uppercase());
            } else {
                out.push(ch);
            }
            at_boundary = !(ch.is_alphanumeric() || ch == '_');
        }
        Value::String(out)
    }
}

struct CapitalizeFilter;
impl Filter for CapitalizeFilter {
    fn name(&self) -> &str {
        "capitalize"
    }
    fn apply(&self, value: &Value, _args: &[Value]) -> Value {
        let s = value.to_string();
        let mut chars = s.trim().chars();
        let result = match chars.next() {
            Some(c) => format!("{}{}", c.to_uppercase(), chars.as_str().to_lowercase()),
            None => String::new(),
        };
        Value::String(result)
    }
}

/// `replace(old, new, count=-1)`. A negative count replaces every match.
struct ReplaceFilter;
impl Filter for ReplaceFilter {
    fn name(&self) -> &str {
        "replace"
    }
    fn apply(&self, value: &Value, args: &[Value]) -> Value {
        let s = value.to_string();
        let from = arg_str(args, 0, "");
        let to = arg_str(args, 1, "");
        let count = arg_int(args, 2, -1);
        let out = if count < 0 {
            s.replace(&from, &to)
        } else {
            s.replacen(&from, &to, clamp_usize(count))
        };
        Value::String(out)
    }
}

/// `truncate(length=255, killwords=false, end="...")`.
///
/// Counts characters. Without `killwords` the cut backs up to the last
/// space so words stay whole.
struct TruncateFilter;
impl Filter for TruncateFilter {
    fn name(&self) -> &str {
        "truncate"
    }
    fn apply(&self, value: &Value, args: &[Value]) -> Value {
        let s = value.to_string();
        let length = clamp_usize(arg_int(args, 0, 255));
        let killwords = arg_bool(args, 1, false);
        let end = arg_str(args, 2, "...");

        let chars: Vec<char> = s.chars().collect();
        if chars.len() <= length {
            return Value::String(s);
        }
        let end_len = end.chars().count();
        if length <= end_len {
            return Value::String(end);
        }
        let mut chunk: String = chars[..length - end_len].iter().collect();
        if !killwords {
            if let Some(idx) = chunk.rfind(' ').filter(|&i| i > 0) {
                chunk.truncate(idx);
            }
        }
        Value::String(chunk + &end)
    }
}

struct CenterFilter;
impl Filter for CenterFilter {
    fn name(&self) -> &str {
        "center"
    }
    fn apply(&self, value: &Value, args: &[Value]) -> Value {
        let s = value.to_string();
        let width = clamp_usize(arg_int(args, 0, 80));
        let len = s.chars().count();
        if len >= width || width - len > MAX_PAD {
            return Value::String(s);
        }
        let pad = width - len;
        let left = pad / 2;
        Value::String(format!("{}{s}{}", " ".repeat(left), " ".repeat(pad - left)))
    }
}

/// Prefixes every line, the first included, with `width` spaces.
struct IndentFilter;
impl Filter for IndentFilter {
    fn name(&self) -> &str {
        "indent"
    }
    fn apply(&self, value: &Value, args: &[Value]) -> Value {
        let width = clamp_usize(arg_int(args, 0, 4));
        if width > MAX_PAD {
            return Value::String(value.to_string());
        }
        let prefix = " ".repeat(width);
        let out = value
            .to_string()
            .split('\n')
            .map(|line| format!("{prefix}{line}"))
            .collect::<Vec<_>>()
            .join("\n");
        Value::String(out)
    }
}

struct WordcountFilter;
impl Filter for WordcountFilter {
    fn name(&self) -> &str {
        "wordcount"
    }
    fn apply(&self, value: &Value, _args: &[Value]) -> Value {
        number(value.to_string().split_whitespace().count())
    }
}

// ============================================================
// Markup filters
// ============================================================

struct EscapeFilter(&'static str);
impl Filter for EscapeFilter {
    fn name(&self) -> &str {
        self.0
    }
    fn apply(&self, value: &Value, _args: &[Value]) -> Value {
        Value::String(escape_html(&value.to_string()))
    }
}

struct SafeFilter;
impl Filter for SafeFilter {
    fn name(&self) -> &str {
        "safe"
    }
    fn apply(&self, value: &Value, _args: &[Value]) -> Value {
        value.clone()
    }
}

/// Query-string escaping: spaces become `+`.
struct UrlencodeFilter;
impl Filter for UrlencodeFilter {
    fn name(&self) -> &str {
        "urlencode"
    }
    fn apply(&self, value: &Value, _args: &[Value]) -> Value {
        let s = value.to_string();
        let encoded = utf8_percent_encode(&s, QUERY_SET).to_string();
        Value::String(encoded.replace("%20", "+"))
    }
}

struct UrlizeFilter;
impl Filter for UrlizeFilter {
    fn name(&self) -> &str {
        "urlize"
    }
    fn apply(&self, value: &Value, _args: &[Value]) -> Value {
        let s = value.to_string();
        let out = URLIZE_RE.replace_all(&s, |caps: &regex::Captures<'_>| {
            format!(r#"<a href="{0}">{0}</a>"#, &caps[0])
        });
        Value::String(out.into_owned())
    }
}

/// `striptags(preserve_whitespace=false)`.
struct StriptagsFilter;
impl Filter for StriptagsFilter {
    fn name(&self) -> &str {
        "striptags"
    }
    fn apply(&self, value: &Value, args: &[Value]) -> Value {
        let s = value.to_string();
        let stripped = STRIP_TAGS_RE.replace_all(&s, "");
        if arg_bool(args, 0, false) {
            return Value::String(stripped.into_owned());
        }
        Value::String(stripped.split_whitespace().collect::<Vec<_>>().join(" "))
    }
}

struct Nl2brFilter;
impl Filter for Nl2brFilter {
    fn name(&self) -> &str {
        "nl2br"
    }
    fn apply(&self, value: &Value, _args: &[Value]) -> Value {
        Value::String(value.to_string().replace('\n', "<br />\n"))
    }
}

struct DumpFilter;
impl Filter for DumpFilter {
    fn name(&self) -> &str {
        "dump"
    }
    fn apply(&self, value: &Value, _args: &[Value]) -> Value {
        Value::String(serde_json::to_string(value).unwrap_or_else(|_| value.to_string()))
    }
}

// ============================================================
// Number filters
// ============================================================

struct AbsFilter;
impl Filter for AbsFilter {
    fn name(&self) -> &str {
        "abs"
    }
    fn apply(&self, value: &Value, _args: &[Value]) -> Value {
        Value::Number(value.to_float(0.0).abs())
    }
}

struct IntFilter;
impl Filter for IntFilter {
    fn name(&self) -> &str {
        "int"
    }
    fn apply(&self, value: &Value, _args: &[Value]) -> Value {
        Value::from(value.to_int(0))
    }
}

struct FloatFilter;
impl Filter for FloatFilter {
    fn name(&self) -> &str {
        "float"
    }
    fn apply(&self, value: &Value, _args: &[Value]) -> Value {
        Value::Number(value.to_float(0.0))
    }
}

/// `round(precision=0)`, rounding half away from zero.
struct RoundFilter;
impl Filter for RoundFilter {
    fn name(&self) -> &str {
        "round"
    }
    #[allow(clippy::cast_possible_truncation)]
    fn apply(&self, value: &Value, args: &[Value]) -> Value {
        let prec = arg_int(args, 0, 0).clamp(-308, 308) as i32;
        let p = 10f64.powi(prec);
        Value::Number((value.to_float(0.0) * p).round() / p)
    }
}

struct SumFilter;
impl Filter for SumFilter {
    fn name(&self) -> &str {
        "sum"
    }
    fn apply(&self, value: &Value, _args: &[Value]) -> Value {
        let total = value
            .as_seq()
            .map_or(0.0, |items| items.iter().map(|v| v.to_float(0.0)).sum());
        Value::Number(total)
    }
}

// ============================================================
// Collection filters
// ============================================================

/// Element count for sequences and maps, character count for strings.
struct LengthFilter;
impl Filter for LengthFilter {
    fn name(&self) -> &str {
        "length"
    }
    fn apply(&self, value: &Value, _args: &[Value]) -> Value {
        let len = match value {
            Value::Seq(items) => items.len(),
            Value::Map(map) => map.len(),
            Value::String(s) => s.chars().count(),
            _ => 0,
        };
        number(len)
    }
}

struct FirstFilter;
impl Filter for FirstFilter {
    fn name(&self) -> &str {
        "first"
    }
    fn apply(&self, value: &Value, _args: &[Value]) -> Value {
        match value {
            Value::Seq(items) => items.first().cloned().unwrap_or(Value::Missing),
            other => Value::String(other.to_string().chars().next().map(String::from).unwrap_or_default()),
        }
    }
}

struct LastFilter;
impl Filter for LastFilter {
    fn name(&self) -> &str {
        "last"
    }
    fn apply(&self, value: &Value, _args: &[Value]) -> Value {
        match value {
            Value::Seq(items) => items.last().cloned().unwrap_or(Value::Missing),
            other => Value::String(other.to_string().chars().last().map(String::from).unwrap_or_default()),
        }
    }
}

struct JoinFilter;
impl Filter for JoinFilter {
    fn name(&self) -> &str {
        "join"
    }
    fn apply(&self, value: &Value, args: &[Value]) -> Value {
        let sep = arg_str(args, 0, "");
        let attr = arg_str(args, 1, "");
        let joined = value.as_seq().map_or_else(String::new, |items| {
            items
                .iter()
                .map(|item| {
                    if attr.is_empty() {
                        item.to_string()
                    } else {
                        item.by_path(&attr).unwrap_or(Value::Missing).to_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(&sep)
        });
        Value::String(joined)
    }
}

/// Sequences pass through, maps yield their keys, anything else is split
/// into characters.
struct ListFilter;
impl Filter for ListFilter {
    fn name(&self) -> &str {
        "list"
    }
    fn apply(&self, value: &Value, _args: &[Value]) -> Value {
        match value {
            Value::Seq(_) => value.clone(),
            Value::Map(map) => {
                let mut keys: Vec<Value> = map.keys().map(|k| Value::from(k.as_str())).collect();
                keys.sort_by(|a, b| compare_values(a, b, false));
                Value::Seq(keys)
            }
            other => other
                .to_string()
                .chars()
                .map(|c| Value::String(c.to_string()))
                .collect(),
        }
    }
}

struct ReverseFilter;
impl Filter for ReverseFilter {
    fn name(&self) -> &str {
        "reverse"
    }
    fn apply(&self, value: &Value, _args: &[Value]) -> Value {
        match value {
            Value::Seq(items) => Value::Seq(items.iter().rev().cloned().collect()),
            other => Value::String(other.to_string().chars().rev().collect()),
        }
    }
}

struct RandomFilter;
impl Filter for RandomFilter {
    fn name(&self) -> &str {
        "random"
    }
    fn apply(&self, value: &Value, _args: &[Value]) -> Value {
        use rand::Rng;
        match value {
            Value::Seq(items) if !items.is_empty() => {
                let idx = rand::thread_rng().gen_range(0..items.len());
                items[idx].clone()
            }
            _ => Value::String(String::new()),
        }
    }
}

/// `batch(size, fill?)`: chunks of `size` items. With a fill value the
/// last chunk is padded to full size.
struct BatchFilter;
impl Filter for BatchFilter {
    fn name(&self) -> &str {
        "batch"
    }
    fn apply(&self, value: &Value, args: &[Value]) -> Value {
        let size = clamp_usize(arg_int(args, 0, 1)).max(1);
        let fill = args.get(1);
        let items = items_of(value);
        items
            .chunks(size)
            .map(|chunk| {
                let mut chunk = chunk.to_vec();
                if let Some(fill) = fill.filter(|_| size - chunk.len() <= MAX_PAD) {
                    chunk.resize(size, fill.clone());
                }
                Value::Seq(chunk)
            })
            .collect()
    }
}

/// `slice(parts)`: splits into `parts` columns of `ceil(len / parts)` items.
struct SliceFilter;
impl Filter for SliceFilter {
    fn name(&self) -> &str {
        "slice"
    }
    fn apply(&self, value: &Value, args: &[Value]) -> Value {
        let parts = clamp_usize(arg_int(args, 0, 1)).max(1);
        let items = items_of(value);
        if items.is_empty() {
            return Value::Seq(Vec::new());
        }
        let chunk_size = items.len().div_ceil(parts).max(1);
        items
            .chunks(chunk_size)
            .map(|chunk| Value::Seq(chunk.to_vec()))
            .collect()
    }
}

// ============================================================
// Ordering and grouping
// ============================================================

/// `sort(reverse=false, case_sensitive=false, attribute="")`. Stable.
struct SortFilter;
impl Filter for SortFilter {
    fn name(&self) -> &str {
        "sort"
    }
    fn apply(&self, value: &Value, args: &[Value]) -> Value {
        let reverse = arg_bool(args, 0, false);
        let case_sensitive = arg_bool(args, 1, false);
        let attr = arg_str(args, 2, "");

        let key = |v: &Value| {
            if attr.is_empty() {
                v.clone()
            } else {
                v.by_path(&attr).unwrap_or(Value::Missing)
            }
        };

        let mut items = items_of(value);
        items.sort_by(|a, b| {
            let ord = compare_values(&key(a), &key(b), case_sensitive);
            if reverse {
                ord.reverse()
            } else {
                ord
            }
        });
        Value::Seq(items)
    }
}

/// `dictsort(by="key", case_sensitive=false, reverse=false)`, also accepting
/// `dictsort(case_sensitive, by, reverse)` when the first argument is a
/// boolean. Yields `[key, value]` pairs.
struct DictsortFilter;
impl Filter for DictsortFilter {
    fn name(&self) -> &str {
        "dictsort"
    }
    fn apply(&self, value: &Value, args: &[Value]) -> Value {
        let Value::Map(map) = value else {
            return Value::Seq(Vec::new());
        };

        let (by, case_sensitive, reverse) = if matches!(args.first(), Some(Value::Bool(_))) {
            (arg_str(args, 1, "key"), arg_bool(args, 0, false), arg_bool(args, 2, false))
        } else {
            (arg_str(args, 0, "key"), arg_bool(args, 1, false), arg_bool(args, 2, false))
        };
        let by_value = by.to_lowercase() == "value";

        let mut pairs: Vec<(Value, Value)> = map
            .iter()
            .map(|(k, v)| (Value::from(k.as_str()), v.clone()))
            .collect();
        pairs.sort_by(|a, b| {
            let (l, r) = if by_value { (&a.1, &b.1) } else { (&a.0, &b.0) };
            let ord = compare_values(l, r, case_sensitive);
            if reverse {
                ord.reverse()
            } else {
                ord
            }
        });
        pairs
            .into_iter()
            .map(|(k, v)| Value::Seq(vec![k, v]))
            .collect()
    }
}

/// `groupby(attribute, default?, case_sensitive=false)`.
///
/// Yields `{grouper, list}` maps sorted by group key. String keys are
/// compared lowercased unless `case_sensitive`; the grouper keeps the
/// spelling of the first item seen.
struct GroupbyFilter;
impl Filter for GroupbyFilter {
    fn name(&self) -> &str {
        "groupby"
    }
    fn apply(&self, value: &Value, args: &[Value]) -> Value {
        let attr = arg_str(args, 0, "");
        let default = args.get(1);
        let case_sensitive = arg_bool(args, 2, false);

        let mut keyed: Vec<(Value, Value, Value)> = items_of(value)
            .into_iter()
            .map(|item| {
                let key = item
                    .by_path(&attr)
                    .or_else(|| default.cloned())
                    .unwrap_or(Value::Missing);
                let norm = match &key {
                    Value::String(s) if !case_sensitive => Value::String(s.to_lowercase()),
                    other => other.clone(),
                };
                (item, key, norm)
            })
            .collect();
        keyed.sort_by(|a, b| compare_values(&a.2, &b.2, true));

        let mut groups: Vec<(String, Value, Value, Vec<Value>)> = Vec::new();
        for (item, key, norm) in keyed {
            let id = format!("{}|{norm}", norm.kind());
            match groups.iter_mut().find(|g| g.0 == id) {
                Some(group) => group.3.push(item),
                None => groups.push((id, key, norm, vec![item])),
            }
        }
        groups.sort_by(|a, b| compare_values(&a.2, &b.2, true));

        groups
            .into_iter()
            .map(|(_, grouper, _, list)| {
                let mut entry = Map::new();
                entry.insert("grouper".to_string(), grouper);
                entry.insert("list".to_string(), Value::Seq(list));
                Value::Map(entry)
            })
            .collect()
    }
}

// ============================================================
// Predicates
// ============================================================

/// How `select`-style filters decide whether an item matches.
enum Predicate<'a> {
    Test(String, &'a [Value]),
    Equals(&'a Value),
    Truthy,
}

impl<'a> Predicate<'a> {
    /// A leading string naming a known test selects that test with the
    /// remaining arguments; any other leading value is an equality needle.
    fn from_args(args: &'a [Value]) -> Self {
        match args.first() {
            Some(Value::String(name)) if is_known_test(name) => Self::Test(name.clone(), &args[1..]),
            Some(needle) => Self::Equals(needle),
            None => Self::Truthy,
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            Self::Test(name, args) => evaluate_test(value, name, args),
            Self::Equals(needle) => value == *needle,
            Self::Truthy => value.is_truthy(),
        }
    }
}

/// `select` (keep = true) and `reject` (keep = false).
struct SelectFilter {
    keep: bool,
}
impl Filter for SelectFilter {
    fn name(&self) -> &str {
        if self.keep {
            "select"
        } else {
            "reject"
        }
    }
    fn apply(&self, value: &Value, args: &[Value]) -> Value {
        let pred = Predicate::from_args(args);
        items_of(value)
            .into_iter()
            .filter(|item| pred.matches(item) == self.keep)
            .collect()
    }
}

/// `selectattr(attr, ...)` and `rejectattr(attr, ...)`.
struct SelectattrFilter {
    keep: bool,
}
impl Filter for SelectattrFilter {
    fn name(&self) -> &str {
        if self.keep {
            "selectattr"
        } else {
            "rejectattr"
        }
    }
    fn apply(&self, value: &Value, args: &[Value]) -> Value {
        let attr = arg_str(args, 0, "");
        let pred = Predicate::from_args(args.get(1..).unwrap_or_default());
        items_of(value)
            .into_iter()
            .filter(|item| {
                let field = item.by_path(&attr).unwrap_or(Value::Missing);
                pred.matches(&field) == self.keep
            })
            .collect()
    }
}

// ============================================================
// Logic
// ============================================================

/// `default(fallback="", boolean=false)`.
///
/// Replaces null and anything that prints as the empty string. In boolean
/// mode every empty value (false, zero, empty collections) is replaced too.
struct DefaultFilter;
impl Filter for DefaultFilter {
    fn name(&self) -> &str {
        "default"
    }
    fn apply(&self, value: &Value, args: &[Value]) -> Value {
        let fallback = args.first().cloned().unwrap_or_else(|| Value::from(""));
        let boolean = arg_bool(args, 1, false);
        if matches!(value, Value::Null)
            || (boolean && value.is_empty())
            || value.to_string().is_empty()
        {
            return fallback;
        }
        value.clone()
    }
}
