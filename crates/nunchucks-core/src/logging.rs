//! Logging setup.
//!
//! The engine emits [`tracing`] events; this module installs a subscriber
//! configured from [`Settings`](crate::settings::Settings).

use crate::settings::Settings;

/// Installs the global tracing subscriber described by `settings`.
///
/// `settings.log_level` is parsed as an `EnvFilter` directive and falls
/// back to `info` when invalid. Debug mode gets a pretty format; otherwise
/// events are written as JSON lines. Calling this twice is harmless: the
/// second install attempt is ignored.
pub fn setup_logging(settings: &Settings) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if settings.debug {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .try_init()
            .ok();
    } else {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .json()
            .try_init()
            .ok();
    }
}

/// Creates a span that tags every event emitted while rendering `template`.
pub fn render_span(template: &str) -> tracing::Span {
    tracing::debug_span!("render", template = template)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_logging_twice_is_harmless() {
        let settings = Settings {
            log_level: "not a valid directive [".to_string(),
            ..Settings::default()
        };
        setup_logging(&settings);
        setup_logging(&Settings::default());
    }

    #[test]
    fn test_render_span_enters() {
        let span = render_span("index.njk");
        let _guard = span.enter();
        tracing::debug!("inside render span");
    }
}
