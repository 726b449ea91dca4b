//! Command framework for the `nunchucks` binary.
//!
//! Each subcommand implements [`CliCommand`]; a [`CommandRegistry`] collects
//! them, builds the clap parser and dispatches to the chosen one.
//!
//! ## Defining a Custom Command
//!
//! ```rust
//! use std::io::Write;
//! use nunchucks_cli::command::{CliCommand, CommandRegistry};
//! use nunchucks_core::{NunchucksResult, Settings};
//!
//! struct HelloCommand;
//!
//! impl CliCommand for HelloCommand {
//!     fn name(&self) -> &str { "hello" }
//!     fn help(&self) -> &str { "Say hello" }
//!
//!     fn handle(
//!         &self,
//!         _matches: &clap::ArgMatches,
//!         _settings: &Settings,
//!         out: &mut dyn Write,
//!     ) -> NunchucksResult<()> {
//!         write!(out, "hello")?;
//!         Ok(())
//!     }
//! }
//!
//! let mut registry = CommandRegistry::new();
//! registry.register(Box::new(HelloCommand));
//! assert_eq!(registry.list_commands(), vec!["hello"]);
//! ```

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

use nunchucks_core::error::{NunchucksError, NunchucksResult};
use nunchucks_core::settings::Settings;
use nunchucks_core::settings_loader;

/// A subcommand of the `nunchucks` binary.
pub trait CliCommand: Send + Sync {
    /// The name the command is invoked by.
    fn name(&self) -> &str;

    /// One-line help text.
    fn help(&self) -> &str;

    /// Adds the command's arguments. The default adds none.
    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd
    }

    /// Runs the command, writing its primary output to `out`.
    fn handle(&self, matches: &clap::ArgMatches, settings: &Settings, out: &mut dyn Write) -> NunchucksResult<()>;
}

/// The registered subcommands, by name.
pub struct CommandRegistry {
    commands: HashMap<String, Box<dyn CliCommand>>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
        }
    }

    /// Registers a command, replacing any with the same name.
    pub fn register(&mut self, command: Box<dyn CliCommand>) {
        let name = command.name().to_string();
        self.commands.insert(name, command);
    }

    pub fn get(&self, name: &str) -> Option<&dyn CliCommand> {
        self.commands.get(name).map(AsRef::as_ref)
    }

    /// Sorted command names.
    pub fn list_commands(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Builds the top-level parser with one subcommand per registered
    /// command plus the global `--config` and `--log-level` options.
    pub fn build_cli(&self) -> clap::Command {
        let mut app = clap::Command::new("nunchucks")
            .about("Render Nunjucks/Jinja-style templates")
            .subcommand_required(true)
            .arg(
                clap::Arg::new("config")
                    .long("config")
                    .global(true)
                    .value_name("FILE")
                    .help("Settings file (TOML, or JSON by .json extension)"),
            )
            .arg(
                clap::Arg::new("log-level")
                    .long("log-level")
                    .global(true)
                    .value_name("FILTER")
                    .help("Tracing filter directive, e.g. debug"),
            );

        let mut entries: Vec<_> = self.commands.iter().collect();
        entries.sort_by_key(|(name, _)| (*name).clone());

        for (name, cmd) in entries {
            // clap wants &'static str names; commands are registered once
            let static_name: &'static str = Box::leak(name.clone().into_boxed_str());
            let subcmd = clap::Command::new(static_name).about(cmd.help().to_string());
            app = app.subcommand(cmd.add_arguments(subcmd));
        }

        app
    }

    /// Dispatches to the subcommand named in `matches`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if no known subcommand was given, or
    /// the command's own error.
    pub fn execute(&self, matches: &clap::ArgMatches, settings: &Settings, out: &mut dyn Write) -> NunchucksResult<()> {
        let (name, sub_matches) = matches
            .subcommand()
            .ok_or_else(|| NunchucksError::ConfigurationError("no subcommand specified".to_string()))?;

        let cmd = self
            .get(name)
            .ok_or_else(|| NunchucksError::ConfigurationError(format!("unknown command: {name}")))?;

        tracing::debug!(command = name, "executing");
        cmd.handle(sub_matches, settings, out)
    }
}

/// Resolves settings for a parsed command line: the `--config` file if
/// given (else defaults), then `NUNCHUCKS_*` variables, then `--log-level`.
///
/// # Errors
///
/// Returns an error if the config file cannot be read or parsed.
pub fn load_settings(matches: &clap::ArgMatches) -> NunchucksResult<Settings> {
    let mut settings = match matches.get_one::<String>("config") {
        Some(path) => settings_loader::from_file_with_env(path)?,
        None => settings_loader::from_env(),
    };
    if let Some(level) = matches.get_one::<String>("log-level") {
        settings.log_level.clone_from(level);
    }
    Ok(settings)
}

/// The `--views` argument shared by the template commands.
pub(crate) fn views_arg() -> clap::Arg {
    clap::Arg::new("views")
        .long("views")
        .value_name("DIR")
        .help("Templates directory (default: base_path from settings)")
}

/// The `--data` argument shared by the rendering commands.
pub(crate) fn data_arg() -> clap::Arg {
    clap::Arg::new("data")
        .long("data")
        .value_name("JSON")
        .default_value("{}")
        .help("JSON object used as the render context")
}

/// Settings with `--views`, when given, as the template root.
pub(crate) fn with_views(matches: &clap::ArgMatches, settings: &Settings) -> Settings {
    let mut settings = settings.clone();
    if let Some(views) = matches.get_one::<String>("views") {
        settings.base_path = PathBuf::from(views);
    }
    settings
}
