//! Template engine: the public entry point.
//!
//! [`configure`] builds an [`Env`] holding a loader, the filter registry and
//! render limits. `Env` compiles templates (include and `extends`
//! resolution), then parses and interprets the flattened source.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use nunchucks_core::error::NunchucksResult;
use nunchucks_core::logging::render_span;
use nunchucks_core::settings::{Settings, DEFAULT_BASE_PATH, DEFAULT_MAX_RENDER_DEPTH};

use crate::compiler::Compiler;
use crate::context::Context;
use crate::filters::FilterRegistry;
use crate::loaders::{FileSystemLoader, TemplateLoader};
use crate::parser;
use crate::render::Renderer;
use crate::value::Value;

/// Options for [`configure`].
#[derive(Clone)]
pub struct ConfigOptions {
    /// Template root. Also the directory precompilation walks.
    pub base_path: PathBuf,
    /// Source loader; a [`FileSystemLoader`] on `base_path` when `None`.
    pub loader: Option<Arc<dyn TemplateLoader>>,
}

impl Default for ConfigOptions {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from(DEFAULT_BASE_PATH),
            loader: None,
        }
    }
}

/// Creates an engine.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use nunchucks_template::context::Context;
/// use nunchucks_template::engine::{configure, ConfigOptions};
/// use nunchucks_template::loaders::MemoryLoader;
///
/// let loader: MemoryLoader = [("hello.njk", "Hello {{ name }}!")].into_iter().collect();
/// let env = configure(ConfigOptions {
///     loader: Some(Arc::new(loader)),
///     ..ConfigOptions::default()
/// });
///
/// let mut ctx = Context::new();
/// ctx.set("name", "World");
/// assert_eq!(env.render("hello.njk", &ctx).unwrap(), "Hello World!");
/// ```
pub fn configure(options: ConfigOptions) -> Env {
    let base_path = if options.base_path.as_os_str().is_empty() {
        PathBuf::from(DEFAULT_BASE_PATH)
    } else {
        options.base_path
    };
    let loader = options
        .loader
        .unwrap_or_else(|| Arc::new(FileSystemLoader::new(&base_path)));
    tracing::debug!(loader = loader.type_name(), base_path = %base_path.display(), "configured engine");

    Env {
        loader,
        base_path,
        filters: FilterRegistry::with_builtins(),
        max_render_depth: DEFAULT_MAX_RENDER_DEPTH,
        template_extensions: Settings::default().template_extensions,
    }
}

/// A configured template environment.
#[derive(Clone)]
pub struct Env {
    loader: Arc<dyn TemplateLoader>,
    base_path: PathBuf,
    filters: FilterRegistry,
    max_render_depth: usize,
    template_extensions: Vec<String>,
}

impl Env {
    /// Builds an engine from loaded settings.
    pub fn from_settings(settings: &Settings) -> Self {
        let mut env = configure(ConfigOptions {
            base_path: settings.base_path.clone(),
            loader: None,
        });
        env.max_render_depth = settings.max_render_depth;
        env.template_extensions = settings.template_extensions.clone();
        env
    }

    pub fn loader(&self) -> &dyn TemplateLoader {
        self.loader.as_ref()
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub const fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    pub const fn max_render_depth(&self) -> usize {
        self.max_render_depth
    }

    /// Limits nested macro calls, includes and imports within one render.
    pub fn set_max_render_depth(&mut self, depth: usize) {
        self.max_render_depth = depth;
    }

    pub fn template_extensions(&self) -> &[String] {
        &self.template_extensions
    }

    pub fn set_template_extensions(&mut self, extensions: Vec<String>) {
        self.template_extensions = extensions;
    }

    /// Registers a host filter. It replaces any filter with the same name,
    /// built-ins included.
    pub fn add_filter<F>(&mut self, name: &str, func: F)
    where
        F: Fn(&Value, &[Value]) -> Value + Send + Sync + 'static,
    {
        self.filters.register_fn(name, func);
    }

    /// Returns the flattened source of `name`, with includes spliced and
    /// inheritance merged.
    ///
    /// # Errors
    ///
    /// Returns `TemplateNotFound` for any missing template and
    /// `CompileError` for an `extends` cycle.
    pub fn compile(&self, name: &str) -> NunchucksResult<String> {
        Compiler::new(self.loader.as_ref()).compile(name)
    }

    /// Renders the template called `name`.
    ///
    /// # Errors
    ///
    /// Returns loader, compile and runtime errors.
    pub fn render(&self, name: &str, ctx: &Context) -> NunchucksResult<String> {
        let span = render_span(name);
        let _entered = span.enter();
        let source = self.compile(name)?;
        self.render_flattened(&source, ctx)
    }

    /// Renders template source that has no name of its own. It may still
    /// extend and include named templates.
    ///
    /// # Errors
    ///
    /// Same as [`render`](Self::render).
    pub fn render_string(&self, source: &str, ctx: &Context) -> NunchucksResult<String> {
        let span = render_span("<string>");
        let _entered = span.enter();
        let flattened = Compiler::new(self.loader.as_ref()).flatten(source, None)?;
        self.render_flattened(&flattened, ctx)
    }

    fn render_flattened(&self, source: &str, ctx: &Context) -> NunchucksResult<String> {
        let nodes = parser::parse(source)?;
        Renderer::new(self.loader.as_ref(), &self.filters, self.max_render_depth).render(&nodes, ctx)
    }
}
