//! # nunchucks-core
//!
//! Foundation types shared by every nunchucks crate: the error enum, the
//! settings struct and its loaders, and tracing setup. This crate knows
//! nothing about templates.
//!
//! ## Modules
//!
//! - [`error`] - Error types and result aliases
//! - [`settings`] - Engine configuration with defaults
//! - [`settings_loader`] - TOML/JSON loading and environment overrides
//! - [`logging`] - Tracing subscriber setup

pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;

pub use error::{NunchucksError, NunchucksResult};
pub use settings::Settings;
