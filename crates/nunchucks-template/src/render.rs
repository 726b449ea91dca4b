//! Statement interpreter.
//!
//! Walks a parsed node tree against a [`Scope`] and produces output text.
//! Within each body, `from` imports, `import`s and macro definitions are
//! bound first (in that order); every other node then runs in document
//! order. Nested bodies render against a copy of the enclosing scope, so
//! bindings made inside a loop, branch, macro or block never leak out.

use std::cell::Cell;
use std::sync::Arc;

use nunchucks_core::error::{NunchucksError, NunchucksResult};

use crate::compiler::Compiler;
use crate::context::{Context, Scope};
use crate::expr::ast::Expr;
use crate::expr::eval::{self, EvalContext, Invoker};
use crate::expr::Expression;
use crate::filters::FilterRegistry;
use crate::loaders::TemplateLoader;
use crate::parser::{self, CallBlock, FilterBlock, ForLoop, FromImport, Import, Include, MacroDef, Node};
use crate::value::{Callable, Map, Value};

/// A macro bound to the scope it was defined in.
///
/// The captured scope is a snapshot: bindings made after the definition
/// are invisible to the macro body.
#[derive(Debug)]
pub struct Macro {
    def: Arc<MacroDef>,
    captured: Scope,
}

impl Macro {
    pub fn name(&self) -> &str {
        &self.def.name
    }
}

/// Renders node trees for one render call.
pub struct Renderer<'a> {
    loader: &'a dyn TemplateLoader,
    filters: &'a FilterRegistry,
    max_depth: usize,
    depth: Cell<usize>,
}

/// Decrements the render depth when a nested render finishes.
struct DepthGuard<'r> {
    depth: &'r Cell<usize>,
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}

impl<'a> Renderer<'a> {
    pub const fn new(loader: &'a dyn TemplateLoader, filters: &'a FilterRegistry, max_depth: usize) -> Self {
        Self {
            loader,
            filters,
            max_depth,
            depth: Cell::new(0),
        }
    }

    /// Renders `nodes` against a fresh scope over `ctx`.
    ///
    /// # Errors
    ///
    /// Returns loader, compile and runtime errors raised while rendering.
    pub fn render(&self, nodes: &[Node], ctx: &Context) -> NunchucksResult<String> {
        let mut scope = Scope::new(Arc::new(ctx.clone().into_map()));
        let mut out = String::new();
        self.render_nodes(nodes, &mut scope, &mut out)?;
        Ok(out)
    }

    fn cx<'s>(&'s self, scope: &'s Scope) -> EvalContext<'s> {
        EvalContext::new(scope, self.filters, self)
    }

    fn enter(&self) -> NunchucksResult<DepthGuard<'_>> {
        let next = self.depth.get() + 1;
        if next > self.max_depth {
            return Err(NunchucksError::RuntimeError(format!(
                "maximum render depth of {} exceeded",
                self.max_depth
            )));
        }
        self.depth.set(next);
        Ok(DepthGuard { depth: &self.depth })
    }

    fn render_nodes(&self, nodes: &[Node], scope: &mut Scope, out: &mut String) -> NunchucksResult<()> {
        self.bind_definitions(nodes, scope)?;

        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Output(expr) => {
                    let value = expr.evaluate(&self.cx(scope))?;
                    out.push_str(&value.to_string());
                }
                Node::Set(assignments) => {
                    for (name, expr) in assignments {
                        let value = expr.evaluate(&self.cx(scope))?;
                        scope.set(name.clone(), value);
                    }
                }
                Node::If(branches) => {
                    for branch in branches {
                        let chosen = match &branch.condition {
                            Some(cond) => cond.evaluate(&self.cx(scope))?.is_truthy(),
                            None => true,
                        };
                        if chosen {
                            self.render_nodes(&branch.body, &mut scope.clone(), out)?;
                            break;
                        }
                    }
                }
                Node::For(for_loop) => self.render_for(for_loop, scope, out)?,
                Node::FilterBlock(block) => self.render_filter_block(block, scope, out)?,
                Node::Call(block) => self.render_call(block, scope, out)?,
                Node::Include(include) => self.render_include(include, scope, out)?,
                Node::Macro(_) | Node::Import(_) | Node::FromImport(_) => {}
            }
        }
        Ok(())
    }

    /// Binds the imports and macros of one body into `scope`.
    fn bind_definitions(&self, nodes: &[Node], scope: &mut Scope) -> NunchucksResult<()> {
        for node in nodes {
            if let Node::FromImport(from) = node {
                self.bind_from_import(from, scope)?;
            }
        }
        for node in nodes {
            if let Node::Import(import) = node {
                self.bind_import(import, scope)?;
            }
        }
        for node in nodes {
            if let Node::Macro(def) = node {
                let closure = Macro {
                    def: Arc::clone(def),
                    captured: scope.clone(),
                };
                scope.set(def.name.clone(), Value::Callable(Callable::Macro(Arc::new(closure))));
            }
        }
        Ok(())
    }

    fn bind_import(&self, import: &Import, scope: &mut Scope) -> NunchucksResult<()> {
        let namespace = self.load_macros(&import.template, import.with_context, scope)?;
        scope.set(import.alias.clone(), Value::Map(namespace));
        Ok(())
    }

    fn bind_from_import(&self, from: &FromImport, scope: &mut Scope) -> NunchucksResult<()> {
        let mut namespace = self.load_macros(&from.template, from.with_context, scope)?;
        for (name, alias) in &from.names {
            match namespace.remove(name) {
                Some(value) => scope.set(alias.clone(), value),
                None => tracing::debug!(name = %name, template = %from.template.source(), "imported name not defined"),
            }
        }
        Ok(())
    }

    /// Loads a template and returns its top-level macros by name.
    fn load_macros(&self, template: &Expression, with_context: bool, scope: &Scope) -> NunchucksResult<Map> {
        let name = template.evaluate(&self.cx(scope))?.to_string();
        tracing::debug!(template = %name, with_context, "loading macros");
        let _guard = self.enter()?;

        let nodes = parser::parse(&Compiler::new(self.loader).compile(&name)?)?;
        let mut target = if with_context { scope.clone() } else { Scope::empty() };
        self.bind_definitions(&nodes, &mut target)?;

        let mut namespace = Map::new();
        for node in &nodes {
            if let Node::Macro(def) = node {
                if let Some(value) = target.local(&def.name) {
                    namespace.insert(def.name.clone(), value.clone());
                }
            }
        }
        Ok(namespace)
    }

    fn render_for(&self, for_loop: &ForLoop, scope: &Scope, out: &mut String) -> NunchucksResult<()> {
        let iterable = for_loop.iterable.evaluate(&self.cx(scope))?;
        let rows = loop_rows(iterable, for_loop.targets.len());

        if rows.is_empty() {
            return self.render_nodes(&for_loop.else_body, &mut scope.clone(), out);
        }

        let length = rows.len();
        for (i, row) in rows.into_iter().enumerate() {
            let mut iteration = scope.clone();
            for (target, value) in for_loop.targets.iter().zip(row) {
                iteration.set(target.clone(), value);
            }
            iteration.set("loop", loop_record(i, length));
            self.render_nodes(&for_loop.body, &mut iteration, out)?;
        }
        Ok(())
    }

    fn render_filter_block(&self, block: &FilterBlock, scope: &Scope, out: &mut String) -> NunchucksResult<()> {
        let mut body = String::new();
        self.render_nodes(&block.body, &mut scope.clone(), &mut body)?;

        let cx = self.cx(scope);
        let mut value = Value::String(body);
        for call in &block.filters {
            value = eval::apply_filter(&value, call, &cx)?;
        }
        out.push_str(&value.to_string());
        Ok(())
    }

    fn render_call(&self, block: &CallBlock, scope: &Scope, out: &mut String) -> NunchucksResult<()> {
        let Some(Expr::Call { target, args, kwargs }) = block.callee.ast() else {
            return Err(NunchucksError::RuntimeError(format!(
                "invalid call expression `{}`",
                block.callee.source()
            )));
        };

        let mut body = String::new();
        self.render_nodes(&block.body, &mut scope.clone(), &mut body)?;

        let cx = self.cx(scope);
        let callee = eval::evaluate(target, &cx).map_err(into_runtime)?;
        let (args, kwargs) = eval::evaluate_args(args, kwargs, &cx).map_err(into_runtime)?;

        let result = match &callee {
            Value::Callable(Callable::Macro(m)) => self.call_macro(m, args, kwargs, Arc::from(body))?,
            Value::Callable(other) => self.invoke(other, args, kwargs)?,
            other => {
                return Err(NunchucksError::RuntimeError(format!(
                    "cannot call {} value `{}`",
                    other.kind(),
                    block.callee.source()
                )))
            }
        };
        out.push_str(&result.to_string());
        Ok(())
    }

    fn render_include(&self, include: &Include, scope: &Scope, out: &mut String) -> NunchucksResult<()> {
        let name = include.template.evaluate(&self.cx(scope))?.to_string();
        // `ignore missing` covers the named template only, not what it includes
        if let Err(e) = self.loader.resolve(&name) {
            if include.ignore_missing && e.is_not_found() {
                tracing::debug!(template = %name, "skipping missing include");
                return Ok(());
            }
            return Err(e);
        }

        let mut target = if include.with_context { scope.clone() } else { Scope::empty() };
        let _guard = self.enter()?;
        let nodes = parser::parse(&Compiler::new(self.loader).compile(&name)?)?;
        self.render_nodes(&nodes, &mut target, out)
    }

    /// Runs a macro body. Parameters bind positionally, then by keyword,
    /// then from their default expression; anything left is null.
    fn call_macro(&self, m: &Arc<Macro>, args: Vec<Value>, mut kwargs: Map, caller: Arc<str>) -> NunchucksResult<Value> {
        let _guard = self.enter()?;

        let mut scope = m.captured.clone();
        scope.set(m.def.name.clone(), Value::Callable(Callable::Macro(Arc::clone(m))));
        scope.set("caller", Value::Callable(Callable::Caller(caller)));

        let mut args = args.into_iter();
        for (name, default) in &m.def.params {
            let value = match args.next().or_else(|| kwargs.remove(name)) {
                Some(v) => v,
                None => match default {
                    Some(expr) => match eval::evaluate(expr, &self.cx(&scope)) {
                        Err(NunchucksError::ExpressionError(_)) => Value::Missing,
                        other => other?,
                    },
                    None => Value::Null,
                },
            };
            scope.set(name.clone(), value);
        }

        let mut out = String::new();
        self.render_nodes(&m.def.body, &mut scope, &mut out)?;
        Ok(Value::String(out))
    }
}

impl Invoker for Renderer<'_> {
    fn invoke(&self, callable: &Callable, args: Vec<Value>, kwargs: Map) -> NunchucksResult<Value> {
        match callable {
            Callable::Macro(m) => self.call_macro(m, args, kwargs, Arc::from("")),
            Callable::Caller(body) => Ok(Value::String(body.to_string())),
            Callable::Native(f) => Ok(f(&args, &kwargs)),
        }
    }
}

fn into_runtime(e: NunchucksError) -> NunchucksError {
    match e {
        NunchucksError::ExpressionError(msg) => NunchucksError::RuntimeError(msg),
        other => other,
    }
}

/// Splits an iterable into one row of bindings per iteration.
///
/// Sequences yield their items and mappings their values (or key/value
/// pairs with two targets). Null and missing yield nothing; any other value
/// is a single item. With two targets, sequence items are unpacked
/// positionally.
fn loop_rows(iterable: Value, targets: usize) -> Vec<Vec<Value>> {
    let items = match iterable {
        Value::Null | Value::Missing => return Vec::new(),
        Value::Map(map) => {
            return map
                .into_iter()
                .map(|(k, v)| if targets > 1 { vec![Value::String(k), v] } else { vec![v] })
                .collect();
        }
        Value::Seq(items) => items,
        other => vec![other],
    };

    items
        .into_iter()
        .map(|item| {
            if targets < 2 {
                return vec![item];
            }
            match item {
                Value::Seq(parts) => {
                    let mut parts = parts.into_iter();
                    (0..targets).map(|_| parts.next().unwrap_or(Value::Missing)).collect()
                }
                other => {
                    let mut row = vec![other];
                    row.resize(targets, Value::Missing);
                    row
                }
            }
        })
        .collect()
}

fn loop_record(i: usize, length: usize) -> Value {
    let mut record = Map::new();
    record.insert("index".to_string(), Value::from(i + 1));
    record.insert("index0".to_string(), Value::from(i));
    record.insert("revindex".to_string(), Value::from(length - i));
    record.insert("revindex0".to_string(), Value::from(length - i - 1));
    record.insert("first".to_string(), Value::Bool(i == 0));
    record.insert("last".to_string(), Value::Bool(i + 1 == length));
    record.insert("length".to_string(), Value::from(length));
    Value::Map(record)
}
