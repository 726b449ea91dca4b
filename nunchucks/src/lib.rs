//! # nunchucks
//!
//! A Nunjucks/Jinja2-compatible template engine.
//!
//! This is the meta-crate that re-exports the sub-crates. Depend on
//! `nunchucks` for everything, or on individual crates for finer control.
//!
//! ```rust
//! use std::sync::Arc;
//! use nunchucks::{configure, ConfigOptions, Context, MemoryLoader};
//!
//! let loader: MemoryLoader = [("hi.njk", "{% for n in names %}hi {{ n }}{% if not loop.last %}, {% endif %}{% endfor %}")]
//!     .into_iter()
//!     .collect();
//! let env = configure(ConfigOptions { loader: Some(Arc::new(loader)), ..ConfigOptions::default() });
//!
//! let ctx = Context::from(nunchucks::serde_json::json!({"names": ["ann", "bo"]}));
//! assert_eq!(env.render("hi.njk", &ctx).unwrap(), "hi ann, hi bo");
//! ```

/// Error type, settings, settings loader and logging setup.
pub use nunchucks_core as core;

/// Compiler, interpreter, filters, loaders and the `Env` API.
pub use nunchucks_template as template;

/// The command framework behind the `nunchucks` binary.
#[cfg(feature = "cli")]
pub use nunchucks_cli as cli;

pub use nunchucks_core::{NunchucksError, NunchucksResult, Settings};
pub use nunchucks_template::{configure, ConfigOptions, Context, Env, FileSystemLoader, MemoryLoader, TemplateLoader, Value};

pub use serde_json;
pub use tracing;
