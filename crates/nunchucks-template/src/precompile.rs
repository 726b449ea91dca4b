//! Directory precompilation.
//!
//! Renders every template under the engine's base path into an output
//! directory, keeping relative paths. Files whose output is blank are not
//! written, and a stale copy from an earlier run is removed.

use std::path::{Path, PathBuf};

use nunchucks_core::error::{NunchucksError, NunchucksResult};

use crate::context::Context;
use crate::engine::Env;

/// What a precompile run produced, as `/`-separated relative paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrecompileReport {
    pub written: Vec<String>,
    pub skipped: Vec<String>,
}

impl Env {
    /// Renders each template file under [`base_path`](Self::base_path)
    /// into `out_dir`.
    ///
    /// Only files whose extension is in
    /// [`template_extensions`](Self::template_extensions) are rendered.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` for an empty `out_dir`, `IoError` for
    /// filesystem failures, and the first render error encountered.
    pub fn precompile_dir(&self, out_dir: impl AsRef<Path>, ctx: &Context) -> NunchucksResult<PrecompileReport> {
        let out_dir = out_dir.as_ref();
        if out_dir.as_os_str().is_empty() {
            return Err(NunchucksError::ConfigurationError(
                "precompile requires an output directory".to_string(),
            ));
        }
        std::fs::create_dir_all(out_dir)?;

        let mut files = Vec::new();
        collect_files(self.base_path(), &mut files)?;

        let mut report = PrecompileReport::default();
        for path in files {
            let is_template = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| self.template_extensions().iter().any(|t| t.eq_ignore_ascii_case(ext)));
            if !is_template {
                continue;
            }
            let Ok(relative) = path.strip_prefix(self.base_path()) else {
                continue;
            };
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            let output = self.render(&name, ctx).map_err(|e| {
                tracing::error!(template = %name, error = %e, "precompile render failed");
                e
            })?;

            let dest = out_dir.join(relative);
            if output.trim().is_empty() {
                match std::fs::remove_file(&dest) {
                    Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
                    _ => {}
                }
                tracing::debug!(template = %name, "skipping blank output");
                report.skipped.push(name);
                continue;
            }

            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&dest, output)?;
            tracing::debug!(template = %name, dest = %dest.display(), "precompiled");
            report.written.push(name);
        }

        tracing::info!(
            written = report.written.len(),
            skipped = report.skipped.len(),
            "precompiled {}",
            self.base_path().display()
        );
        Ok(report)
    }
}

/// Collects every file under `dir`, depth first, in name order.
fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> NunchucksResult<()> {
    let mut entries = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort();

    for path in entries {
        if path.is_dir() {
            collect_files(&path, files)?;
        } else if path.is_file() {
            files.push(path);
        }
    }
    Ok(())
}
