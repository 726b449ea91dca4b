//! # nunchucks-template
//!
//! A Nunjucks/Jinja2-compatible template engine.
//!
//! This crate provides:
//!
//! - **Compiler** - splices `include`s and merges `extends`/`block`/`super()`
//!   chains into one flattened source
//! - **Interpreter** - `set`, `if`, `for`, `macro`, `call`, `filter`,
//!   `include`, `import`/`from` and `raw`/`verbatim`
//! - **Expressions** - a precedence-climbing parser with comparison chains,
//!   `is` tests, filters and calls; malformed expressions degrade to a
//!   literal or variable lookup instead of failing
//! - **Filters and tests** - the built-in library, extensible per [`Env`]
//! - **Loaders** - filesystem and in-memory template sources
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use nunchucks_template::{configure, ConfigOptions, Context};
//! use nunchucks_template::loaders::MemoryLoader;
//!
//! let loader: MemoryLoader = [
//!     ("base.njk", "<h1>{% block title %}Base{% endblock %}</h1>"),
//!     ("page.njk", r#"{% extends "base.njk" %}{% block title %}{{ name | title }}{% endblock %}"#),
//! ]
//! .into_iter()
//! .collect();
//!
//! let env = configure(ConfigOptions {
//!     loader: Some(Arc::new(loader)),
//!     ..ConfigOptions::default()
//! });
//!
//! let mut ctx = Context::new();
//! ctx.set("name", "hello world");
//! assert_eq!(env.render("page.njk", &ctx).unwrap(), "<h1>Hello World</h1>");
//! ```

// These clippy lints are intentionally allowed:
// - result_large_err: NunchucksError is the crate-wide error type
// - doc_markdown: backtick requirements for documentation items are too strict
// - cast_possible_truncation / cast_precision_loss / cast_sign_loss /
//   cast_possible_wrap: template numbers are f64 and convert to indexes
// - float_cmp: template equality compares numbers exactly
#![allow(clippy::result_large_err)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::float_cmp)]

pub mod compiler;
pub mod context;
pub mod engine;
pub mod expr;
pub mod filters;
pub mod lexer;
pub mod loaders;
pub mod parser;
pub mod pipe;
pub mod precompile;
pub mod render;
pub mod testers;
pub mod value;

pub use context::Context;
pub use engine::{configure, ConfigOptions, Env};
pub use loaders::{FileSystemLoader, MemoryLoader, TemplateLoader};
pub use precompile::PrecompileReport;
pub use value::Value;
