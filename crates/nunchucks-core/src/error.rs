//! Error types for nunchucks.
//!
//! [`NunchucksError`] covers every failure the engine can surface: loader
//! misses and read failures, compile-time structural errors, render-time
//! runtime errors, and the configuration and I/O errors raised by the
//! command-line adapter. Expression evaluation errors exist as a variant
//! but are always absorbed by the expression fallback chain before they
//! reach a caller.

use thiserror::Error;

/// The primary error type for nunchucks.
#[derive(Error, Debug)]
pub enum NunchucksError {
    // ── Loader errors ────────────────────────────────────────────────

    /// The loader has no template under the requested name.
    #[error("template not found: {0}")]
    TemplateNotFound(String),

    /// The loader found the template but could not read it, or rejected
    /// the name (for example a path escaping the template root).
    #[error("loader error: {0}")]
    LoaderError(String),

    // ── Template errors ──────────────────────────────────────────────

    /// Structural problem in template source: an `extends` cycle, an
    /// unterminated block construct, or a malformed statement.
    #[error("compile error: {0}")]
    CompileError(String),

    /// A failure while executing a parsed template, such as calling a
    /// value that is not callable or exceeding the render depth ceiling.
    #[error("runtime error: {0}")]
    RuntimeError(String),

    /// Lexing or parsing of an embedded expression failed. Never returned
    /// from a public render call.
    #[error("expression error: {0}")]
    ExpressionError(String),

    // ── Configuration ────────────────────────────────────────────────

    /// Invalid settings or command-line input.
    #[error("improperly configured: {0}")]
    ConfigurationError(String),

    // ── Serialization ────────────────────────────────────────────────

    /// A context payload could not be decoded.
    #[error("serialization error: {0}")]
    SerializationError(String),

    // ── IO ───────────────────────────────────────────────────────────

    /// An I/O error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl NunchucksError {
    /// Returns `true` if this error is a loader miss.
    ///
    /// `{% include ... ignore missing %}` swallows exactly these errors.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::TemplateNotFound(_))
    }
}

impl From<serde_json::Error> for NunchucksError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

/// A convenience type alias for results using [`NunchucksError`].
pub type NunchucksResult<T> = Result<T, NunchucksError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_template() {
        let err = NunchucksError::TemplateNotFound("missing.njk".into());
        assert_eq!(err.to_string(), "template not found: missing.njk");
    }

    #[test]
    fn test_is_not_found() {
        assert!(NunchucksError::TemplateNotFound("x".into()).is_not_found());
        assert!(!NunchucksError::LoaderError("x".into()).is_not_found());
        assert!(!NunchucksError::CompileError("x".into()).is_not_found());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: NunchucksError = io.into();
        assert!(matches!(err, NunchucksError::IoError(_)));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{nope");
        let err: NunchucksError = parse.unwrap_err().into();
        assert!(matches!(err, NunchucksError::SerializationError(_)));
    }

    #[test]
    fn test_result_alias() {
        fn fails() -> NunchucksResult<()> {
            Err(NunchucksError::RuntimeError("boom".into()))
        }
        assert_eq!(fails().unwrap_err().to_string(), "runtime error: boom");
    }
}
