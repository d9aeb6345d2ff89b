//! DOM Binder
//!
//! The binder connects a document subtree to the reactive graph. Mounting a
//! root:
//!
//! 1. loads the root's declarative state (`data-state`) into its scope:
//!    primitives become signals, objects and arrays become reactive objects;
//! 2. creates the declared computeds (`data-computed:<name>`) in attribute
//!    order;
//! 3. walks the subtree once and sets up every directive it finds.
//!
//! Each reactive binding runs inside a tracked [`Effect`]: whatever the
//! expression reads becomes a subscription, and a change re-evaluates the
//! expression and patches only the facet the directive owns.
//!
//! # Failure isolation
//!
//! Errors and panics in one binding are caught at the binding boundary and
//! logged with `tracing` (fields `root`, `element`, `directive`, `error`).
//! The rest of the root keeps working.
//!
//! # Example
//!
//! ```rust
//! use weave_core::binder::Binder;
//! use weave_core::dom::Node;
//!
//! let doc = Node::parse(r#"<div data-weave data-state='{"count":3}'><p data-text="count"></p></div>"#);
//! let root = doc.first_child().unwrap();
//! let mount = Binder::new().mount(&root).unwrap();
//! assert_eq!(root.text_content(), "3");
//!
//! mount.scope().get("count").unwrap().as_signal().unwrap().set(7.into());
//! assert_eq!(root.text_content(), "7");
//! ```

mod control;
mod directive;
mod events;
mod lifecycle;
mod model;
mod plugin;
mod render;

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, debug_span, trace, warn};

use crate::config::BinderConfig;
use crate::dom::{Node, WeakNode};
use crate::error::BindError;
use crate::expr::{panic_message, Expression, Mode};
use crate::reactive::{Computed, Effect, ReactiveContext};
use crate::scope::Scope;
use crate::timer::{Scheduler, TokioScheduler};
use crate::value::Value;

pub use directive::{to_camel_case, to_kebab_case, Directive, ForSpec, BUILTIN_DIRECTIVES};
pub use lifecycle::{CleanupList, Mount, MountState};
pub use plugin::{Plugin, PluginContext, PluginRegistry};

/// Mounts roots.
#[derive(Clone)]
pub struct Binder {
    config: BinderConfig,
    plugins: PluginRegistry,
    scheduler: Arc<dyn Scheduler>,
    mounted: Arc<DashMap<u64, ()>>,
}

impl Binder {
    /// A binder with the default configuration, no plugins and the tokio
    /// scheduler.
    pub fn new() -> Self {
        Self {
            config: BinderConfig::default(),
            plugins: PluginRegistry::new(),
            scheduler: Arc::new(TokioScheduler::new()),
            mounted: Arc::new(DashMap::new()),
        }
    }

    pub fn with_config(mut self, config: BinderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_plugins(mut self, plugins: PluginRegistry) -> Self {
        self.plugins = plugins;
        self
    }

    /// Register a plugin. See [`PluginRegistry::register`].
    pub fn register_plugin<P>(&mut self, name: impl Into<String>, plugin: P) -> bool
    where
        P: Plugin + 'static,
    {
        self.plugins.register(name, plugin)
    }

    pub fn config(&self) -> &BinderConfig {
        &self.config
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    /// Whether `root` is currently mounted by this binder.
    pub fn is_mounted(&self, root: &Node) -> bool {
        self.mounted.contains_key(&root.id())
    }

    /// Mount `root` with a fresh scope.
    pub fn mount(&self, root: &Node) -> Result<Mount, BindError> {
        self.mount_with_scope(root, Scope::new())
    }

    /// Mount `root`, defining its declarative state in `scope`.
    pub fn mount_with_scope(&self, root: &Node, scope: Scope) -> Result<Mount, BindError> {
        if !root.is_element() {
            return Err(BindError::NotAnElement);
        }
        match self.mounted.entry(root.id()) {
            Entry::Occupied(_) => return Err(BindError::AlreadyMounted),
            Entry::Vacant(slot) => {
                slot.insert(());
            }
        }

        let span = debug_span!("mount", root = root.id());
        let _enter = span.enter();

        let state = Arc::new(Mutex::new(MountState::Scanning));
        let cleanups = CleanupList::new();
        let mount = Mount::new(
            root.clone(),
            scope.clone(),
            Arc::clone(&cleanups),
            Arc::clone(&state),
            Arc::clone(&self.mounted),
        );

        // Dropping `mount` on error releases the root again.
        if let Some(json) = root.attribute(&self.config.attribute("state")) {
            let json = if json.trim().is_empty() { "{}" } else { json.as_str() };
            let declared: serde_json::Value = serde_json::from_str(json).map_err(BindError::State)?;
            scope.load_state(&declared)?;
        }

        let ctx = BindContext {
            shared: Arc::new(Shared {
                root_id: root.id(),
                root: root.downgrade(),
                config: self.config.clone(),
                plugins: self.plugins.clone(),
                scheduler: Arc::clone(&self.scheduler),
            }),
            cleanups,
        };
        ctx.define_computeds(root, &scope);
        ctx.bind_element(root, &scope);

        *state.lock() = MountState::Bound;
        debug!(root = root.id(), bindings = mount.cleanup_count(), "mounted");
        Ok(mount)
    }

    /// Mount every root-marked element under `document`. Roots that fail to
    /// mount are logged and skipped.
    pub fn mount_all(&self, document: &Node) -> Vec<Mount> {
        let marker = self.config.root_marker();
        document
            .query_all(|node| node.has_attribute(&marker))
            .into_iter()
            .filter_map(|root| match self.mount(&root) {
                Ok(mount) => Some(mount),
                Err(error) => {
                    warn!(root = root.id(), element = %root.describe(), %error, "mount failed");
                    None
                }
            })
            .collect()
    }
}

impl Default for Binder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Binder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binder")
            .field("config", &self.config)
            .field("plugins", &self.plugins)
            .field("mounted", &self.mounted.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Binding context
// ----------------------------------------------------------------------------

struct Shared {
    root_id: u64,
    root: WeakNode,
    config: BinderConfig,
    plugins: PluginRegistry,
    scheduler: Arc<dyn Scheduler>,
}

/// Per-subtree binding state: the mount's shared settings plus the cleanup
/// list new bindings register with.
#[derive(Clone)]
pub(crate) struct BindContext {
    shared: Arc<Shared>,
    cleanups: Arc<CleanupList>,
}

impl BindContext {
    fn config(&self) -> &BinderConfig {
        &self.shared.config
    }

    fn scheduler(&self) -> Arc<dyn Scheduler> {
        Arc::clone(&self.shared.scheduler)
    }

    /// The same mount, registering cleanups with `cleanups` instead.
    fn with_cleanups(&self, cleanups: Arc<CleanupList>) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            cleanups,
        }
    }

    fn on_cleanup<F>(&self, cleanup: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cleanups.add(cleanup);
    }

    fn is_root(&self, node: &Node) -> bool {
        self.shared.root.upgrade().is_some_and(|root| root.ptr_eq(node))
    }

    fn report(&self, node: &Node, directive: &str, error: &dyn fmt::Display) {
        warn!(
            root = self.shared.root_id,
            element = %node.describe(),
            directive,
            error = %error,
            "binding failed"
        );
    }

    /// Run `f`, turning a panic into a logged binding failure.
    fn guard<R>(&self, node: &Node, directive: &str, f: impl FnOnce() -> R) -> Option<R> {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => Some(value),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                self.report(node, directive, &format!("{}: {message}", BindError::Panicked));
                None
            }
        }
    }

    /// Parse a directive's expression, logging failures.
    fn parse(&self, node: &Node, directive: &Directive) -> Option<Expression> {
        self.parse_source(node, &directive.attribute, &directive.expression)
    }

    fn parse_source(&self, node: &Node, attribute: &str, source: &str) -> Option<Expression> {
        match Expression::parse(source) {
            Ok(expression) => Some(expression),
            Err(source_error) => {
                let error = BindError::Parse {
                    expression: source.to_string(),
                    source: source_error,
                };
                self.report(node, attribute, &error);
                None
            }
        }
    }

    /// Evaluate, logging failures. Failures yield `undefined`.
    fn evaluate(&self, node: &Node, attribute: &str, expression: &Expression, scope: &Scope, mode: Mode) -> Value {
        match expression.try_eval(scope, mode) {
            Ok(value) => value,
            Err(error) => {
                self.report(node, attribute, &error);
                Value::Undefined
            }
        }
    }

    /// Keep a facet of `node` in sync with `directive`'s expression: `apply`
    /// runs with the current value now and after every change.
    fn watch<F>(&self, node: &Node, directive: &Directive, scope: &Scope, apply: F)
    where
        F: Fn(&Node, Value) + Send + Sync + 'static,
    {
        let Some(expression) = self.parse(node, directive) else {
            return;
        };
        let ctx = self.clone();
        let node = node.clone();
        let scope = scope.clone();
        let attribute = directive.attribute.clone();
        let effect = Effect::tracked(move || {
            ctx.guard(&node, &attribute, || {
                let value = ctx.evaluate(&node, &attribute, &expression, &scope, Mode::Read);
                ReactiveContext::untracked(|| apply(&node, value));
            });
        });
        self.on_cleanup(move || effect.dispose());
    }

    /// Define the root's `data-computed:<name>` entries.
    fn define_computeds(&self, root: &Node, scope: &Scope) {
        for (attribute, value) in root.attributes() {
            let Some(directive) = Directive::parse(self.config(), &attribute, &value) else {
                continue;
            };
            if directive.name != "computed" {
                continue;
            }
            let Some(name) = directive.argument.as_deref().map(to_camel_case) else {
                self.report(root, &attribute, &"computed declarations need a name");
                continue;
            };
            let Some(expression) = self.parse(root, &directive) else {
                continue;
            };

            let ctx = self.clone();
            let node = root.downgrade();
            let weak_scope = scope.downgrade();
            let computed = Computed::tracked(move || {
                let (Some(scope), Some(node)) = (weak_scope.upgrade(), node.upgrade()) else {
                    return Value::Undefined;
                };
                ctx.guard(&node, &attribute, || {
                    ctx.evaluate(&node, &attribute, &expression, &scope, Mode::Read)
                })
                .unwrap_or_default()
            });
            trace!(name = %name, "computed defined");
            scope.insert(name, Value::Computed(computed.clone()));
            self.on_cleanup(move || computed.dispose());
        }
    }

    /// Bind `node` and, unless a directive owns its content, its subtree.
    fn bind_element(&self, node: &Node, scope: &Scope) {
        let config = self.config();
        if !self.is_root(node) && config.skip_nested_roots && node.has_attribute(&config.root_marker()) {
            trace!(element = %node.describe(), "skipping nested root");
            return;
        }

        let structural = ["for", "if"]
            .into_iter()
            .find_map(|name| {
                let attribute = config.attribute(name);
                node.attribute(&attribute)
                    .and_then(|value| Directive::parse(config, &attribute, &value))
            });
        if let Some(directive) = structural {
            if self.is_root(node) {
                self.report(node, &directive.attribute, &"not allowed on a root element");
            } else {
                self.guard(node, &directive.attribute, || match directive.name.as_str() {
                    "for" => control::bind_for(self, node, &directive, scope),
                    _ => control::bind_if(self, node, &directive, scope),
                });
                return;
            }
        }

        let key_marker = config.key_marker();
        let root_marker = config.root_marker();
        let mut owns_content = false;
        for (attribute, value) in node.attributes() {
            if attribute == key_marker || attribute == root_marker {
                continue;
            }
            let Some(directive) = Directive::parse(config, &attribute, &value) else {
                continue;
            };
            owns_content |= matches!(directive.name.as_str(), "text" | "html");
            self.guard(node, &attribute, || self.bind_directive(node, &directive, scope));
        }

        if !owns_content {
            for child in node.children() {
                if child.is_element() {
                    self.bind_element(&child, scope);
                }
            }
        }
    }

    fn bind_directive(&self, node: &Node, directive: &Directive, scope: &Scope) {
        match directive.name.as_str() {
            "state" | "computed" | "for" | "if" => {}
            "text" => render::bind_text(self, node, directive, scope),
            "html" => render::bind_html(self, node, directive, scope),
            "show" => render::bind_show(self, node, directive, scope),
            "class" => render::bind_class(self, node, directive, scope),
            "style" => render::bind_style(self, node, directive, scope),
            "attr" => render::bind_attr(self, node, directive, scope),
            "model" => model::bind_model(self, node, directive, scope),
            "on" => events::bind_event(self, node, directive, scope),
            "init" => events::bind_init(self, node, directive, scope),
            name => match self.shared.plugins.get(name) {
                Some(plugin) => {
                    let context =
                        PluginContext::new(node.clone(), scope.clone(), directive.clone(), Arc::clone(&self.cleanups));
                    if let Err(source) = plugin.attach(&context) {
                        let error = BindError::Plugin {
                            name: name.to_string(),
                            source,
                        };
                        self.report(node, &directive.attribute, &error);
                    }
                }
                None => trace!(directive = %directive.attribute, "no handler registered"),
            },
        }
    }
}
