//! The `precompile` command: renders a whole views directory to disk.

use std::io::Write;
use std::path::PathBuf;

use nunchucks_core::error::NunchucksResult;
use nunchucks_core::settings::Settings;
use nunchucks_template::Env;

use crate::command::{data_arg, views_arg, with_views, CliCommand};
use crate::commands::render::context_from_matches;

pub struct PrecompileCommand;

impl CliCommand for PrecompileCommand {
    fn name(&self) -> &'static str {
        "precompile"
    }

    fn help(&self) -> &'static str {
        "Render all templates from views to an output directory"
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd.arg(views_arg())
            .arg(
                clap::Arg::new("out")
                    .long("out")
                    .value_name("DIR")
                    .help("Output directory (default: output_dir from settings)"),
            )
            .arg(data_arg())
    }

    fn handle(&self, matches: &clap::ArgMatches, settings: &Settings, out: &mut dyn Write) -> NunchucksResult<()> {
        let settings = with_views(matches, settings);
        let out_dir = matches
            .get_one::<String>("out")
            .map_or_else(|| settings.output_dir.clone(), PathBuf::from);
        let ctx = context_from_matches(matches)?;

        let env = Env::from_settings(&settings);
        let report = env.precompile_dir(&out_dir, &ctx)?;

        for name in &report.written {
            writeln!(out, "wrote {name}")?;
        }
        for name in &report.skipped {
            writeln!(out, "skipped {name} (blank output)")?;
        }
        tracing::info!(
            "Precompiled {} template(s) to {}",
            report.written.len(),
            out_dir.display()
        );
        Ok(())
    }
}
