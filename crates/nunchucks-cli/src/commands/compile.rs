//! The `compile` command: prints a template's flattened source.

use std::io::Write;

use nunchucks_core::error::{NunchucksError, NunchucksResult};
use nunchucks_core::settings::Settings;
use nunchucks_template::Env;

use crate::command::{views_arg, with_views, CliCommand};

/// Prints the source left after includes are spliced and `extends` chains
/// merged, which is what the interpreter runs.
pub struct CompileCommand;

impl CliCommand for CompileCommand {
    fn name(&self) -> &'static str {
        "compile"
    }

    fn help(&self) -> &'static str {
        "Print a template's flattened source"
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd.arg(views_arg()).arg(
            clap::Arg::new("template")
                .long("template")
                .value_name("NAME")
                .required(true)
                .help("Template path relative to the views directory"),
        )
    }

    fn handle(&self, matches: &clap::ArgMatches, settings: &Settings, out: &mut dyn Write) -> NunchucksResult<()> {
        let template = matches
            .get_one::<String>("template")
            .ok_or_else(|| NunchucksError::ConfigurationError("--template is required".to_string()))?;
        let env = Env::from_settings(&with_views(matches, settings));
        out.write_all(env.compile(template)?.as_bytes())?;
        Ok(())
    }
}
