//! Plugins
//!
//! A plugin handles every directive whose name it is registered under that
//! the binder does not handle itself. Registering `tooltip` makes the binder
//! call the plugin for `data-tooltip`, `data-tooltip:top`,
//! `data-tooltip.delay`, and so on.
//!
//! Plugins only see a [`PluginContext`]: the element, the scope, a way to
//! register cleanups, path lookup and expression evaluation.
//!
//! # Example
//!
//! ```rust
//! use weave_core::binder::{Binder, PluginContext};
//! use weave_core::error::PluginError;
//! use weave_core::dom::Node;
//! use weave_core::reactive::Effect;
//!
//! let mut binder = Binder::new();
//! binder.register_plugin("upper", |ctx: &PluginContext| -> Result<(), PluginError> {
//!     let element = ctx.element().clone();
//!     let (scope, expression) = (ctx.scope().clone(), ctx.expression().to_string());
//!     let effect = Effect::tracked(move || {
//!         let text = weave_core::expr::evaluate(&expression, &scope).to_text();
//!         element.set_text_content(&text.to_uppercase());
//!     });
//!     ctx.on_cleanup(move || effect.dispose());
//!     Ok(())
//! });
//!
//! let doc = Node::parse(r#"<div data-weave data-state='{"name":"ann"}'><p data-upper="name"></p></div>"#);
//! let mount = binder.mount(&doc.first_child().unwrap()).unwrap();
//! assert!(doc.inner_html().contains(">ANN<"));
//! # drop(mount);
//! ```

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::warn;

use crate::dom::Node;
use crate::error::PluginError;
use crate::expr::{evaluate_with, Mode};
use crate::scope::{Scope, Target};
use crate::value::Value;

use super::directive::{Directive, BUILTIN_DIRECTIVES};
use super::lifecycle::CleanupList;

/// A directive handler.
pub trait Plugin: Send + Sync {
    fn attach(&self, ctx: &PluginContext) -> Result<(), PluginError>;
}

impl<F> Plugin for F
where
    F: Fn(&PluginContext) -> Result<(), PluginError> + Send + Sync,
{
    fn attach(&self, ctx: &PluginContext) -> Result<(), PluginError> {
        self(ctx)
    }
}

/// Name -> plugin map. Cloning is cheap.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: IndexMap<String, Arc<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `plugin` under `name`, replacing any previous one. Names of
    /// built-in directives are refused.
    pub fn register<P>(&mut self, name: impl Into<String>, plugin: P) -> bool
    where
        P: Plugin + 'static,
    {
        let name = name.into();
        if BUILTIN_DIRECTIVES.contains(&name.as_str()) || name.is_empty() {
            warn!(plugin = %name, "refusing to register a plugin under a reserved name");
            return false;
        }
        self.plugins.insert(name, Arc::new(plugin));
        true
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.plugins.shift_remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}

/// What a plugin may touch.
pub struct PluginContext {
    element: Node,
    scope: Scope,
    directive: Directive,
    cleanups: Arc<CleanupList>,
}

impl PluginContext {
    pub(crate) fn new(element: Node, scope: Scope, directive: Directive, cleanups: Arc<CleanupList>) -> Self {
        Self {
            element,
            scope,
            directive,
            cleanups,
        }
    }

    /// The element carrying the directive.
    pub fn element(&self) -> &Node {
        &self.element
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn directive(&self) -> &Directive {
        &self.directive
    }

    pub fn name(&self) -> &str {
        &self.directive.name
    }

    pub fn argument(&self) -> Option<&str> {
        self.directive.argument.as_deref()
    }

    pub fn modifiers(&self) -> &[String] {
        &self.directive.modifiers
    }

    pub fn has_modifier(&self, modifier: &str) -> bool {
        self.directive.has_modifier(modifier)
    }

    /// The attribute value.
    pub fn expression(&self) -> &str {
        &self.directive.expression
    }

    /// Run `cleanup` when the element's binding is torn down.
    pub fn on_cleanup<F>(&self, cleanup: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cleanups.add(cleanup);
    }

    /// Resolve a writable location by dotted path.
    pub fn lookup(&self, path: &str) -> Option<Target> {
        self.scope.resolve_target(path)
    }

    /// Evaluate an expression in the element's scope (read mode).
    pub fn evaluate(&self, expression: &str) -> Value {
        evaluate_with(expression, &self.scope, Mode::Read)
    }

    /// Evaluate an expression in the given mode.
    pub fn evaluate_with(&self, expression: &str, mode: Mode) -> Value {
        evaluate_with(expression, &self.scope, mode)
    }
}

impl fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginContext")
            .field("element", &self.element)
            .field("directive", &self.directive)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &PluginContext) -> Result<(), PluginError> {
        Ok(())
    }

    #[test]
    fn reserved_names_are_refused() {
        let mut registry = PluginRegistry::new();
        assert!(!registry.register("text", noop));
        assert!(registry.register("tooltip", noop));
        assert!(registry.contains("tooltip"));
        assert_eq!(registry.names(), vec!["tooltip"]);
        assert!(registry.unregister("tooltip"));
        assert!(registry.is_empty());
    }

    #[test]
    fn context_exposes_directive_parts() {
        let config = crate::config::BinderConfig::default();
        let directive = Directive::parse(&config, "data-persist:local.debounce", "count").unwrap();
        let scope = Scope::new();
        scope.signal("count", 4);
        let cleanups = CleanupList::new();
        let ctx = PluginContext::new(Node::element("div"), scope, directive, cleanups.clone());

        assert_eq!(ctx.name(), "persist");
        assert_eq!(ctx.argument(), Some("local"));
        assert!(ctx.has_modifier("debounce"));
        assert_eq!(ctx.evaluate("count * 2"), Value::from(8));
        assert!(matches!(ctx.lookup("count"), Some(Target::Signal(_))));

        ctx.on_cleanup(|| {});
        assert_eq!(cleanups.len(), 1);
    }
}
