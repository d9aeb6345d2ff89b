//! Scopes
//!
//! A [`Scope`] maps names to [`Value`]s for expression evaluation and
//! binding. Scopes chain to an optional parent: list rows and lambda calls
//! get a child scope whose own names shadow the parent's.
//!
//! A root's scope is usually built from declarative state with
//! [`Scope::from_state`]: primitive values become signals, objects and
//! arrays become [`Reactive`] objects.

use std::fmt;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::error::BindError;
use crate::reactive::{Reactive, Signal, Source, SourceRef};
use crate::value::{is_forbidden_key, Value};

struct ScopeInner {
    vars: RwLock<IndexMap<String, Value>>,
    parent: Option<Scope>,
}

/// A non-owning [`Scope`] handle.
#[derive(Clone)]
pub struct WeakScope {
    inner: Weak<ScopeInner>,
}

impl WeakScope {
    pub fn upgrade(&self) -> Option<Scope> {
        self.inner.upgrade().map(|inner| Scope { inner })
    }
}

/// A name table with an optional parent. Cloning clones the handle.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Scope {
    /// Create an empty root scope.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                vars: RwLock::new(IndexMap::new()),
                parent: None,
            }),
        }
    }

    /// Create an empty scope whose lookups fall back to `self`.
    pub fn child(&self) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                vars: RwLock::new(IndexMap::new()),
                parent: Some(self.clone()),
            }),
        }
    }

    /// Build a scope from a declarative state object.
    pub fn from_state(state: &serde_json::Value) -> Result<Self, BindError> {
        let scope = Self::new();
        scope.load_state(state)?;
        Ok(scope)
    }

    /// Define every key of a declarative state object in this table.
    pub fn load_state(&self, state: &serde_json::Value) -> Result<(), BindError> {
        let serde_json::Value::Object(map) = state else {
            return Err(BindError::StateNotObject);
        };
        for (name, value) in map {
            if is_forbidden_key(name) {
                continue;
            }
            let value = Value::from_json(value);
            let entry = match Reactive::from_value(&value) {
                Some(reactive) => Value::Reactive(reactive),
                None => Value::Signal(Signal::new(value)),
            };
            self.insert(name.clone(), entry);
        }
        Ok(())
    }

    /// Parse declarative state JSON and build a scope from it.
    pub fn from_state_str(json: &str) -> Result<Self, BindError> {
        let state: serde_json::Value = serde_json::from_str(json).map_err(BindError::State)?;
        Self::from_state(&state)
    }

    /// A handle that does not keep the scope alive.
    pub fn downgrade(&self) -> WeakScope {
        WeakScope {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// The parent scope, if any.
    pub fn parent(&self) -> Option<&Scope> {
        self.inner.parent.as_ref()
    }

    /// Define or replace a name in this table.
    pub fn insert(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.inner.vars.write().insert(name.into(), value.into());
    }

    /// Define `name` as a new signal holding `value` and return the signal.
    pub fn signal(&self, name: impl Into<String>, value: impl Into<Value>) -> Signal<Value> {
        let signal = Signal::new(value.into());
        self.insert(name, Value::Signal(signal.clone()));
        signal
    }

    /// Remove a name from this table (not from parents).
    pub fn remove(&self, name: &str) -> Option<Value> {
        self.inner.vars.write().shift_remove(name)
    }

    /// Look a name up through the parent chain. Forbidden names never
    /// resolve.
    pub fn get(&self, name: &str) -> Option<Value> {
        if is_forbidden_key(name) {
            return None;
        }
        let mut scope = Some(self);
        while let Some(current) = scope {
            if let Some(value) = current.inner.vars.read().get(name) {
                return Some(value.clone());
            }
            scope = current.parent();
        }
        None
    }

    /// Whether `name` resolves in this scope or a parent.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Names defined directly in this table, in insertion order.
    pub fn names(&self) -> Vec<String> {
        self.inner.vars.read().keys().cloned().collect()
    }

    /// Resolve a dot-separated path, unwrapping signals between segments.
    ///
    /// The last segment is returned as stored, so a path naming a signal
    /// yields the signal itself.
    pub fn lookup_path(&self, path: &str) -> Option<Value> {
        let mut segments = path.split('.').map(str::trim);
        let first = segments.next()?;
        let mut current = self.get(first)?;
        for segment in segments {
            if segment.is_empty() || is_forbidden_key(segment) {
                return None;
            }
            current = member(&current.unwrap_signal(), segment)?;
        }
        Some(current)
    }

    /// Resolve a path to a writable location.
    ///
    /// Signals are writable wherever they are found. Otherwise the last
    /// segment must name a property of a reactive object.
    pub fn resolve_target(&self, path: &str) -> Option<Target> {
        let path = path.trim();
        if let Some(Value::Signal(signal)) = self.lookup_path(path) {
            return Some(Target::Signal(signal));
        }

        match path.rsplit_once('.') {
            Some((parent, key)) => {
                let key = key.trim();
                if key.is_empty() || is_forbidden_key(key) {
                    return None;
                }
                match self.lookup_path(parent)?.unwrap_signal() {
                    Value::Reactive(object) => Some(Target::Slot {
                        object,
                        key: key.to_string(),
                    }),
                    _ => None,
                }
            }
            None => match self.get(path)? {
                Value::Reactive(object) => Some(Target::Reactive(object)),
                _ => None,
            },
        }
    }
}

/// Read one property of an already-unwrapped value.
fn member(value: &Value, key: &str) -> Option<Value> {
    match value {
        Value::Reactive(r) => Some(r.get(key)),
        Value::Object(map) => map.get(key).cloned(),
        Value::Array(items) if key == "length" => Some(Value::from(items.len())),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i).cloned()),
        _ => None,
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("names", &self.names())
            .field("has_parent", &self.inner.parent.is_some())
            .finish()
    }
}

/// A writable location: a signal, a reactive property, or a whole reactive
/// object (whose content is replaced on write).
#[derive(Debug, Clone)]
pub enum Target {
    Signal(Signal<Value>),
    Slot { object: Reactive, key: String },
    Reactive(Reactive),
}

impl Target {
    /// Current value (tracked).
    pub fn get(&self) -> Value {
        match self {
            Target::Signal(signal) => signal.get(),
            Target::Slot { object, key } => object.get(key),
            Target::Reactive(object) => Value::Reactive(object.clone()),
        }
    }

    /// Write a value. Returns whether anything changed.
    pub fn set(&self, value: Value) -> bool {
        match self {
            Target::Signal(signal) => signal.set(value),
            Target::Slot { object, key } => object.set(key, value),
            Target::Reactive(object) => object.replace(&value),
        }
    }

    /// The source to subscribe to for changes of this location.
    pub fn source(&self) -> SourceRef {
        match self {
            Target::Signal(signal) => signal.source(),
            Target::Slot { object, .. } | Target::Reactive(object) => object.source(),
        }
    }

    /// Node ID of the underlying source.
    pub fn node_id(&self) -> crate::graph::NodeId {
        self.source().node_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn state_becomes_signals_and_reactives() {
        let scope = Scope::from_state(&json!({"count": 1, "user": {"name": "Ann"}, "tags": []})).unwrap();

        assert!(matches!(scope.get("count"), Some(Value::Signal(_))));
        assert!(matches!(scope.get("user"), Some(Value::Reactive(_))));
        assert!(matches!(scope.get("tags"), Some(Value::Reactive(_))));
        assert_eq!(scope.names(), vec!["count", "user", "tags"]);
    }

    #[test]
    fn state_must_be_an_object() {
        assert!(matches!(Scope::from_state(&json!([1])), Err(BindError::StateNotObject)));
        assert!(matches!(Scope::from_state_str("{nope"), Err(BindError::State(_))));
    }

    #[test]
    fn child_scopes_shadow_parents() {
        let parent = Scope::new();
        parent.insert("a", 1);
        parent.insert("b", 2);

        let child = parent.child();
        child.insert("a", 10);

        assert_eq!(child.get("a"), Some(Value::from(10)));
        assert_eq!(child.get("b"), Some(Value::from(2)));
        assert_eq!(parent.get("a"), Some(Value::from(1)));
        assert!(child.names() == vec!["a"]);
    }

    #[test]
    fn forbidden_names_never_resolve() {
        let scope = Scope::new();
        scope.insert("constructor", 1);
        assert_eq!(scope.get("constructor"), None);

        scope.insert("obj", Value::from_json(&json!({"a": {"b": 1}})));
        assert_eq!(scope.lookup_path("obj.__proto__"), None);
        assert_eq!(scope.lookup_path("obj.a.b"), Some(Value::from(1)));
    }

    #[test]
    fn lookup_path_steps_through_signals() {
        let scope = Scope::new();
        scope.signal("settings", Value::from_json(&json!({"theme": "dark"})));

        assert_eq!(scope.lookup_path("settings.theme"), Some(Value::from("dark")));
        assert!(matches!(scope.lookup_path("settings"), Some(Value::Signal(_))));
    }

    #[test]
    fn resolves_writable_targets() {
        let scope = Scope::from_state(&json!({"name": "Ann", "form": {"email": ""}, "list": [1]})).unwrap();

        let name = scope.resolve_target("name").unwrap();
        assert!(matches!(name, Target::Signal(_)));
        assert!(name.set(Value::from("Bo")));
        assert_eq!(scope.lookup_path("name").unwrap().unwrap_signal(), Value::from("Bo"));

        let email = scope.resolve_target("form.email").unwrap();
        email.set(Value::from("a@b.c"));
        assert_eq!(scope.lookup_path("form.email"), Some(Value::from("a@b.c")));

        assert!(matches!(scope.resolve_target("list"), Some(Target::Reactive(_))));
        assert!(scope.resolve_target("form.__proto__").is_none());
        assert!(scope.resolve_target("missing").is_none());
    }
}
