//! The `render` command: renders one template to standard output.

use std::io::Write;

use nunchucks_core::error::{NunchucksError, NunchucksResult};
use nunchucks_core::settings::Settings;
use nunchucks_template::{Context, Env};

use crate::command::{data_arg, views_arg, with_views, CliCommand};

pub struct RenderCommand;

/// Decodes the `--data` argument into a render context.
pub(crate) fn context_from_matches(matches: &clap::ArgMatches) -> NunchucksResult<Context> {
    let raw = matches.get_one::<String>("data").map_or("{}", String::as_str);
    if raw.trim().is_empty() {
        return Ok(Context::new());
    }
    Context::from_json_str(raw)
        .map_err(|e| NunchucksError::ConfigurationError(format!("invalid --data JSON: {e}")))
}

impl CliCommand for RenderCommand {
    fn name(&self) -> &'static str {
        "render"
    }

    fn help(&self) -> &'static str {
        "Render one template to stdout"
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd.arg(views_arg())
            .arg(
                clap::Arg::new("template")
                    .long("template")
                    .value_name("NAME")
                    .required(true)
                    .help("Template path relative to the views directory"),
            )
            .arg(data_arg())
    }

    fn handle(&self, matches: &clap::ArgMatches, settings: &Settings, out: &mut dyn Write) -> NunchucksResult<()> {
        let template = matches
            .get_one::<String>("template")
            .ok_or_else(|| NunchucksError::ConfigurationError("--template is required".to_string()))?;
        let ctx = context_from_matches(matches)?;
        let env = Env::from_settings(&with_views(matches, settings));

        let output = env.render(template, &ctx)?;
        out.write_all(output.as_bytes())?;
        Ok(())
    }
}
