//! Template loaders.
//!
//! A loader maps a template name to its source text. The [`TemplateLoader`]
//! trait defines the interface, with a filesystem loader rooted at a base
//! directory and an in-memory loader for tests and embedded templates.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;

use nunchucks_core::error::{NunchucksError, NunchucksResult};
use nunchucks_core::settings::DEFAULT_BASE_PATH;

/// Loads template source text by name.
///
/// Implementations must be safe to share between concurrent renders.
pub trait TemplateLoader: Send + Sync {
    /// A short name for the loader kind, used in logs.
    fn type_name(&self) -> &str;

    /// Resolves `name` to a canonical identifier without reading it.
    ///
    /// # Errors
    ///
    /// Returns `TemplateNotFound` if no such template exists, or
    /// `LoaderError` if the name is not acceptable.
    fn resolve(&self, name: &str) -> NunchucksResult<String>;

    /// Reads the source of the template called `name`.
    ///
    /// # Errors
    ///
    /// Returns `TemplateNotFound` if no such template exists, or
    /// `LoaderError` if it cannot be read.
    fn read(&self, name: &str) -> NunchucksResult<String>;
}

/// Loads templates from a directory on the filesystem.
///
/// Names are joined onto the root and normalized; a name that would leave
/// the root (or name the root itself) is rejected.
#[derive(Debug, Clone)]
pub struct FileSystemLoader {
    root: PathBuf,
}

impl FileSystemLoader {
    /// Creates a loader rooted at `root`. An empty root means `views`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let root = if root.as_os_str().is_empty() {
            Path::new(DEFAULT_BASE_PATH)
        } else {
            root
        };
        let absolute = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir().map_or_else(|_| root.to_path_buf(), |cwd| cwd.join(root))
        };
        Self {
            root: normalize(&absolute),
        }
    }

    /// The normalized root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve_path(&self, name: &str) -> NunchucksResult<PathBuf> {
        let path = normalize(&self.root.join(name));
        if path == self.root || !path.starts_with(&self.root) {
            tracing::warn!(template = name, root = %self.root.display(), "rejected path outside template root");
            return Err(NunchucksError::LoaderError(format!(
                "template path escapes the template root: {name}"
            )));
        }
        if !path.is_file() {
            tracing::warn!(template = name, path = %path.display(), "template not found");
            return Err(NunchucksError::TemplateNotFound(name.to_string()));
        }
        Ok(path)
    }
}

impl TemplateLoader for FileSystemLoader {
    fn type_name(&self) -> &str {
        "file"
    }

    fn resolve(&self, name: &str) -> NunchucksResult<String> {
        self.resolve_path(name).map(|p| p.display().to_string())
    }

    fn read(&self, name: &str) -> NunchucksResult<String> {
        let path = self.resolve_path(name)?;
        std::fs::read_to_string(&path).map_err(|e| {
            tracing::warn!(template = name, error = %e, "failed to read template");
            NunchucksError::LoaderError(format!("error reading template '{}': {e}", path.display()))
        })
    }
}

/// Lexically normalizes a path: drops `.` and resolves `..` against the
/// preceding component without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Loads templates from an in-memory map of name to source strings.
#[derive(Debug, Default)]
pub struct MemoryLoader {
    templates: RwLock<HashMap<String, String>>,
}

impl MemoryLoader {
    /// Creates a new empty `MemoryLoader`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a loader holding a copy of `templates`.
    pub fn from_map(templates: HashMap<String, String>) -> Self {
        Self {
            templates: RwLock::new(templates),
        }
    }

    /// Adds or replaces a template.
    pub fn add(&self, name: impl Into<String>, source: impl Into<String>) {
        let mut templates = match self.templates.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        templates.insert(name.into(), source.into());
    }

    fn get(&self, name: &str) -> Option<String> {
        let templates = match self.templates.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        templates.get(name).cloned()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MemoryLoader {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_map(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl TemplateLoader for MemoryLoader {
    fn type_name(&self) -> &str {
        "memory"
    }

    fn resolve(&self, name: &str) -> NunchucksResult<String> {
        self.get(name)
            .map(|_| name.to_string())
            .ok_or_else(|| NunchucksError::TemplateNotFound(name.to_string()))
    }

    fn read(&self, name: &str) -> NunchucksResult<String> {
        self.get(name).ok_or_else(|| {
            tracing::warn!(template = name, "template not found in memory loader");
            NunchucksError::TemplateNotFound(name.to_string())
        })
    }
}
