use std::process::ExitCode;

use nunchucks_cli::{load_settings, register_builtin_commands, CommandRegistry};
use nunchucks_core::logging::setup_logging;

fn main() -> ExitCode {
    let mut registry = CommandRegistry::new();
    register_builtin_commands(&mut registry);

    let matches = registry.build_cli().get_matches();
    let settings = match load_settings(&matches) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    setup_logging(&settings);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match registry.execute(&matches, &settings, &mut out) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
