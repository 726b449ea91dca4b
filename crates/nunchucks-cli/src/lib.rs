//! # nunchucks-cli
//!
//! The `nunchucks` command-line tool: a small command framework and the
//! built-in `render`, `compile` and `precompile` commands.
//!
//! ## Quick Start
//!
//! ```rust
//! use nunchucks_cli::command::CommandRegistry;
//! use nunchucks_cli::commands::register_builtin_commands;
//!
//! let mut registry = CommandRegistry::new();
//! register_builtin_commands(&mut registry);
//!
//! let names = registry.list_commands();
//! assert!(names.contains(&"render"));
//! assert!(names.contains(&"precompile"));
//! ```

// These clippy lints are intentionally allowed:
// - result_large_err: NunchucksError is the crate-wide error type
// - doc_markdown: backtick requirements for documentation items are too strict
#![allow(clippy::result_large_err)]
#![allow(clippy::doc_markdown)]

pub mod command;
pub mod commands;

pub use command::{load_settings, CliCommand, CommandRegistry};
pub use commands::register_builtin_commands;
