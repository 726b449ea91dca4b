//! Engine settings.
//!
//! [`Settings`] holds everything a host or the command line can tune: the
//! template root, the precompile destination and file filter, the render
//! depth ceiling, and logging. Every field has a default, so a partial
//! TOML or JSON file is enough.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default template root used when none is configured.
pub const DEFAULT_BASE_PATH: &str = "views";

/// Default ceiling on nested macro calls and render-time includes.
pub const DEFAULT_MAX_RENDER_DEPTH: usize = 100;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory the filesystem loader resolves template names against.
    pub base_path: PathBuf,
    /// Directory precompilation writes rendered files into.
    pub output_dir: PathBuf,
    /// File extensions (without the dot) that precompilation renders.
    pub template_extensions: Vec<String>,
    /// Maximum nesting of macro invocations and includes during one render.
    pub max_render_depth: usize,
    /// Tracing filter directive (e.g. "info", "nunchucks_template=debug").
    pub log_level: String,
    /// Pretty human-readable logs when true, JSON lines otherwise.
    pub debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from(DEFAULT_BASE_PATH),
            output_dir: PathBuf::from("public"),
            template_extensions: ["njk", "html", "txt", "yaml", "yml", "json", "xml", "css", "js"]
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            max_render_depth: DEFAULT_MAX_RENDER_DEPTH,
            log_level: "info".to_string(),
            debug: false,
        }
    }
}

impl Settings {
    /// Returns `true` if precompilation should render a file with this
    /// extension. Comparison ignores ASCII case.
    pub fn is_template_extension(&self, ext: &str) -> bool {
        self.template_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(ext))
    }
}
