//! Integration tests for the full render path: compile, parse and
//! interpret, through `configure`/`Env` and an in-memory loader.

use std::sync::Arc;

use nunchucks_core::error::NunchucksError;
use nunchucks_template::loaders::MemoryLoader;
use nunchucks_template::value::Value;
use nunchucks_template::{configure, ConfigOptions, Context, Env};
use serde_json::json;

// ── Helpers ─────────────────────────────────────────────────────────

fn env_with(files: &[(&str, &str)]) -> Env {
    let loader: MemoryLoader = files.iter().copied().collect();
    configure(ConfigOptions {
        loader: Some(Arc::new(loader)),
        ..ConfigOptions::default()
    })
}

fn render(src: &str, ctx: serde_json::Value) -> String {
    env_with(&[]).render_string(src, &Context::from(ctx)).unwrap()
}

fn seq_of(out: &str) -> Vec<String> {
    out.split(',').filter(|s| !s.is_empty()).map(str::to_string).collect()
}

// ═════════════════════════════════════════════════════════════════════
// 1. Statements and expressions
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_set_arithmetic() {
    assert_eq!(render("{% set x = 1 + 2 %}{{ x }}", json!({})), "3");
}

#[test]
fn test_if_else_on_context() {
    let src = "{% if user %}yes{% else %}no{% endif %}";
    assert_eq!(render(src, json!({"user": true})), "yes");
    assert_eq!(render(src, json!({"user": false})), "no");
}

#[test]
fn test_set_if_for_together() {
    let src = "{% set title = \"Hello\" %}\n{{ title | upper }}\n{% if user %}yes{% else %}no{% endif %}\n{% for item in items %}[{{ item }}]{% endfor %}";
    let out = render(src, json!({"user": true, "items": ["a", "b"]}));
    assert_eq!(out, "\nHELLO\nyes\n[a][b]");
}

#[test]
fn test_membership_and_chains() {
    assert_eq!(render("{{ 2 in [1,2,3] }}", json!({})), "true");
    assert_eq!(render("{{ 5 not in [1,2,3] }}", json!({})), "true");
    assert_eq!(render("{{ 2 < 3 < 4 }}", json!({})), "true");
    assert_eq!(render("{{ 2 < 3 > 4 }}", json!({})), "false");
}

#[test]
fn test_is_tests_and_fallback_equality() {
    let ctx = json!({"n": 4, "nothing": null, "target": 4});
    assert_eq!(render("{{ n is even }}|{{ n is not odd }}|{{ n is divisibleby(2) }}", ctx.clone()), "true|true|true");
    assert_eq!(render("{{ nothing is defined }}|{{ ghost is undefined }}", ctx.clone()), "true|true");
    // `target` is not a test name, so `is` compares with its value
    assert_eq!(render("{{ n is target }}", ctx), "true");
}

#[test]
fn test_malformed_expression_falls_back() {
    let ctx = json!({"a": "A"});
    assert_eq!(render("[{{ 1 + }}][{{ a ) }}][{{ ) }}]", ctx), "[][][]");
    assert_eq!(render("{{ 42 ) }}|{{ a b }}", json!({"a b": "spaced"})), "|spaced");
    assert_eq!(render("{{ 'unterminated }}", json!({})), "");
}

#[test]
fn test_arithmetic_edge_cases() {
    assert_eq!(render("{{ 1 / 0 }}|{{ 7 % 0 }}|{{ 7.9 % 3 }}|{{ 'a' + 1 }}", json!({})), "0|0|1|a1");
}

#[test]
fn test_integer_limits_do_not_overflow() {
    assert_eq!(render("{{ -9223372036854775808 % -1 }}", json!({})), "0");
    assert_eq!(render("{{ -9223372036854775808 is divisibleby(-1) }}", json!({})), "true");
    assert_eq!(render("{{ n % -1 }}|{{ n is divisibleby(-1) }}", json!({"n": i64::MIN})), "0|true");
}

#[test]
fn test_host_function_call() {
    let env = env_with(&[]);
    let mut ctx = Context::new();
    ctx.set(
        "add",
        Value::function(|args, kwargs| {
            let base: f64 = args.iter().map(|a| a.to_float(0.0)).sum();
            Value::Number(base + kwargs.get("extra").map_or(0.0, |v| v.to_float(0.0)))
        }),
    );
    assert_eq!(env.render_string("{{ add(1, 2, extra=4) }}", &ctx).unwrap(), "7");
}

// ═════════════════════════════════════════════════════════════════════
// 2. Inheritance and includes
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_extends_with_super() {
    let env = env_with(&[
        ("base", "<h1>{% block t %}Base{% endblock %}</h1>"),
        ("child", r#"{% extends "base" %}{% block t %}Child {{ super() }}{% endblock %}"#),
    ]);
    assert_eq!(env.render("child", &Context::new()).unwrap(), "<h1>Child Base</h1>");
}

#[test]
fn test_extends_and_include() {
    let env = env_with(&[
        ("base.njk", "<h1>{% block title %}Base{% endblock %}</h1> {% block content %}C{% endblock %}"),
        (
            "child.njk",
            r#"{% extends "base.njk" %}{% block title %}Child{% endblock %}{% block content %}Body {% include "part.njk" %}{% endblock %}"#,
        ),
        ("part.njk", "{{ msg | lower }}"),
    ]);
    let ctx = Context::from(json!({"msg": "LOUD"}));
    assert_eq!(env.render("child.njk", &ctx).unwrap(), "<h1>Child</h1> Body loud");
}

#[test]
fn test_include_ignore_missing() {
    let env = env_with(&[]);
    let out = env.render_string(r#"{% include "missing.njk" ignore missing %}"#, &Context::new());
    assert_eq!(out.unwrap(), "");

    let err = env
        .render_string(r#"{% include "missing.njk" %}"#, &Context::new())
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().contains("missing.njk"));
}

#[test]
fn test_ignore_missing_covers_only_the_named_template() {
    let env = env_with(&[
        ("outer.njk", r#"OUTER{% include "gone.njk" %}"#),
        ("wrapper.njk", r#"W{% include "inner.njk" %}"#),
        ("inner.njk", "I"),
    ]);

    let err = env
        .render_string(r#"[{% include "outer.njk" ignore missing %}]"#, &Context::new())
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().contains("gone.njk"));

    let out = env.render_string(r#"[{% include "wrapper.njk" ignore missing %}]"#, &Context::new());
    assert_eq!(out.unwrap(), "[WI]");
}

#[test]
fn test_extends_cycle_is_compile_error() {
    let env = env_with(&[
        ("a.njk", r#"{% extends "b.njk" %}"#),
        ("b.njk", r#"{% extends "a.njk" %}"#),
    ]);
    let err = env.render("a.njk", &Context::new()).unwrap_err();
    assert!(matches!(err, NunchucksError::CompileError(ref m) if m.contains("extends cycle detected")));
}

// ═════════════════════════════════════════════════════════════════════
// 3. Macros, closures and calls
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_macro_argument_binding() {
    let src = r#"{% macro g(name="friend", sal="hi") %}{{sal}} {{name}}{% endmacro %}{{g()}}|{{g("sam")}}|{{g(name="mike",sal="yo")}}"#;
    assert_eq!(render(src, json!({})), "hi friend|hi sam|yo mike");
}

#[test]
fn test_macro_sees_earlier_macros_only_by_snapshot() {
    let src = "{% macro inner() %}in{% endmacro %}{% macro outer() %}[{{ inner() }}]{% endmacro %}{{ outer() }}";
    assert_eq!(render(src, json!({})), "[in]");
}

#[test]
fn test_closure_in_loop_captures_iteration() {
    let src = "{% for x in [1, 2] %}{% macro show() %}{{ x }}{% endmacro %}{{ show() }}{% endfor %}";
    assert_eq!(render(src, json!({})), "12");
}

#[test]
fn test_imported_macro_in_call_block() {
    let env = env_with(&[(
        "ui.njk",
        "{% macro card(title) %}<div><h2>{{ title }}</h2>{{ caller() }}</div>{% endmacro %}",
    )]);
    let src = r#"{% from "ui.njk" import card %}{% call card("Hi") %}<p>{{ body }}</p>{% endcall %}"#;
    let out = env.render_string(src, &Context::from(json!({"body": "text"})));
    assert_eq!(out.unwrap(), "<div><h2>Hi</h2><p>text</p></div>");
}

#[test]
fn test_runaway_recursion_is_runtime_error() {
    let mut env = env_with(&[]);
    env.set_max_render_depth(20);
    let err = env
        .render_string("{% macro r(n) %}{{ r(n + 1) }}{% endmacro %}{{ r(0) }}", &Context::new())
        .unwrap_err();
    assert!(matches!(err, NunchucksError::RuntimeError(_)));
}

#[test]
fn test_recursive_include_hits_depth_ceiling() {
    let env = env_with(&[("loop.njk", "x{% include name %}")]);
    let ctx = Context::from(json!({"name": "loop.njk"}));
    let err = env.render("loop.njk", &ctx).unwrap_err();
    assert!(matches!(err, NunchucksError::RuntimeError(_)));
}

// ═════════════════════════════════════════════════════════════════════
// 4. Loops
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_loop_metadata() {
    let src = "{% for x in items %}{{ loop.index0 }}:{{ loop.first }}:{{ loop.last }};{% endfor %}";
    let out = render(src, json!({"items": ["a", "b", "c"]}));
    assert_eq!(out, "0:true:false;1:false:false;2:false:true;");
}

#[test]
fn test_loop_else() {
    let src = "{% for x in items %}{{ x }}{% else %}empty{% endfor %}";
    assert_eq!(render(src, json!({"items": []})), "empty");
    assert_eq!(render(src, json!({"items": [1]})), "1");
}

// ═════════════════════════════════════════════════════════════════════
// 5. Filters
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_filter_builtins_and_args() {
    let src = r#"
{{ missing | default("fallback") }}
{{ html | escape }}
{{ text | replace("world", "go") }}
{{ nums | join("-") }}
{{ nums | sum }}
{{ letters | sort() | join(",") }}
{{ name | trim | title }}
{{ phrase | truncate(8, false, "...") }}
{{ url | urlencode }}
"#;
    let ctx = json!({
        "html": "<b>x</b>",
        "text": "hello world",
        "nums": [1, 2, 3],
        "letters": ["b", "a", "C"],
        "name": "  hello world  ",
        "phrase": "alpha beta gamma",
        "url": "a b",
    });
    let out = render(src, ctx);
    for expected in [
        "fallback",
        "&lt;b&gt;x&lt;/b&gt;",
        "hello go",
        "1-2-3",
        "6",
        "a,b,C",
        "Hello World",
        "alpha...",
        "a+b",
    ] {
        assert!(out.contains(expected), "missing {expected:?} in {out:?}");
    }
}

#[test]
fn test_unknown_filter_is_identity() {
    assert_eq!(render("{{ 'x' | nonesuch(1) | UPPER }}", json!({})), "X");
}

#[test]
fn test_sort_is_idempotent() {
    let ctx = json!({"people": [
        {"name": "b", "age": 2}, {"name": "a", "age": 2}, {"name": "c", "age": 1}
    ]});
    let once = render("{{ people | sort(false, false, 'age') | join(',', 'name') }}", ctx.clone());
    let twice = render(
        "{{ people | sort(false, false, 'age') | sort(false, false, 'age') | join(',', 'name') }}",
        ctx,
    );
    assert_eq!(once, "c,b,a");
    assert_eq!(once, twice);
}

#[test]
fn test_select_reject_partition() {
    let ctx = json!({"nums": [1, 2, 3, 4, 5, 6]});
    let odd = seq_of(&render("{{ nums | select('odd') | join(',') }}", ctx.clone()));
    let not_odd = seq_of(&render("{{ nums | reject('odd') | join(',') }}", ctx.clone()));
    assert_eq!(odd, vec!["1", "3", "5"]);
    assert_eq!(not_odd, vec!["2", "4", "6"]);

    let users = json!({"users": [
        {"name": "a", "admin": true}, {"name": "b", "admin": false}, {"name": "c"}
    ]});
    let admins = render("{{ users | selectattr('admin') | join(',', 'name') }}", users.clone());
    let others = render("{{ users | rejectattr('admin') | join(',', 'name') }}", users);
    assert_eq!(admins, "a");
    assert_eq!(others, "b,c");
}

#[test]
fn test_filter_block_and_groupby() {
    let ctx = json!({"rows": [
        {"kind": "Fruit", "n": "apple"}, {"kind": "veg", "n": "kale"}, {"kind": "fruit", "n": "fig"}
    ]});
    let src = "{% for g in rows | groupby('kind') %}{{ g.grouper }}={{ g.list | join('+', 'n') }};{% endfor %}";
    assert_eq!(render(src, ctx), "Fruit=apple+fig;veg=kale;");
    assert_eq!(render("{% filter title %}hello there{% endfilter %}", json!({})), "Hello There");
}

#[test]
fn test_huge_padding_widths_leave_value_unpadded() {
    let out = render(
        "[{{ 'a' | center(9223372036854775807) }}][{{ 'a' | indent(9223372036854775807) }}][{{ [1] | batch(9223372036854775807, 0) | length }}]",
        json!({}),
    );
    assert_eq!(out, "[a][a][1]");
    assert_eq!(render("[{{ 'a' | center(5) }}]", json!({})), "[  a  ]");
}

#[test]
fn test_random_picks_a_member() {
    let out = render("{{ [1, 2, 3] | random }}", json!({}));
    assert!(["1", "2", "3"].contains(&out.as_str()));
}

// ═════════════════════════════════════════════════════════════════════
// 6. Raw blocks, comments and whitespace control
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_raw_and_verbatim_untouched() {
    let src = "{% raw %}{{ x }}{% if %}{% endraw %}|{% verbatim %}{% set y = 1 %}{% endverbatim %}";
    assert_eq!(render(src, json!({"x": 1})), "{{ x }}{% if %}|{% set y = 1 %}");
}

#[test]
fn test_comments_and_trim_markers() {
    let src = "a {# gone #}b\n  {%- if true -%}\n  c\n{%- endif %}";
    assert_eq!(render(src, json!({})), "a bc");
}

#[test]
fn test_raw_hides_include_and_extends() {
    let env = env_with(&[("a.njk", "A")]);
    let src = r#"{% raw %}{% include "nope.njk" %}{% extends "nope.njk" %}{% endraw %}|{% include "a.njk" %}"#;
    let out = env.render_string(src, &Context::new()).unwrap();
    assert_eq!(out, r#"{% include "nope.njk" %}{% extends "nope.njk" %}|A"#);
}
