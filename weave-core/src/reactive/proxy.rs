//! Reactive Objects
//!
//! A [`Reactive`] wraps a plain object or array and makes every mutation of
//! it observable, at any depth, without the caller going through a signal.
//!
//! # Nesting
//!
//! Object and array values stored in a slot are wrapped lazily: the first
//! read replaces the plain value in the slot with a child `Reactive`, so
//! later reads return the same wrapper. Overwriting the slot drops the child.
//!
//! Every change notifies the object's own subscribers with a [`Change`],
//! then every ancestor it was reached through with [`Change::Nested`].
//!
//! # Tracking
//!
//! A `Reactive` is a [`Source`]: reading it inside a tracking context
//! (`get`, `len`, `keys`, `values`, `snapshot`) subscribes the running
//! computation to the whole object.

use std::fmt;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tracing::trace;

use crate::graph::{self, NodeId, NodeKind};
use crate::value::{is_forbidden_key, Value};

use super::context::ReactiveContext;
use super::source::{Notify, Source, SourceRef};
use super::subscriber::{Subscribers, Subscription};

/// Largest length an array may be grown to by an index or `length` write.
pub const MAX_ARRAY_LEN: usize = 1 << 24;

/// Description of a mutation, passed to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// A property (or array index) was assigned.
    Set { key: String },
    /// A property was removed.
    Delete { key: String },
    /// An array range was replaced: `removed` items at `start` became
    /// `inserted` items.
    Splice {
        start: usize,
        removed: usize,
        inserted: usize,
    },
    /// The whole content was replaced.
    Replace,
    /// A descendant changed.
    Nested,
}

#[derive(Clone)]
enum Container {
    Object(IndexMap<String, Value>),
    Array(Vec<Value>),
}

impl Container {
    fn len(&self) -> usize {
        match self {
            Container::Object(map) => map.len(),
            Container::Array(items) => items.len(),
        }
    }

    fn values(&self) -> Vec<Value> {
        match self {
            Container::Object(map) => map.values().cloned().collect(),
            Container::Array(items) => items.clone(),
        }
    }
}

struct ReactiveInner {
    id: NodeId,
    target: RwLock<Container>,
    subscribers: Subscribers<Change>,
    parent: Mutex<Option<Weak<ReactiveInner>>>,
}

impl Drop for ReactiveInner {
    fn drop(&mut self) {
        graph::unregister(self.id);
    }
}

/// A deep-reactive object or array.
///
/// Cloning clones the handle.
///
/// # Example
///
/// ```rust
/// use weave_core::reactive::Reactive;
/// use weave_core::Value;
///
/// let todos = Reactive::from_json(&serde_json::json!([{"done": false}])).unwrap();
/// let _sub = todos.subscribe(|change| println!("{change:?}"));
///
/// let first = todos.get_index(0);
/// first.as_reactive().unwrap().set("done", Value::Bool(true)); // prints "Nested"
/// ```
#[derive(Clone)]
pub struct Reactive {
    inner: Arc<ReactiveInner>,
}

impl Reactive {
    fn with_container(container: Container) -> Self {
        let inner = Arc::new(ReactiveInner {
            id: NodeId::new(),
            target: RwLock::new(container),
            subscribers: Subscribers::new(),
            parent: Mutex::new(None),
        });
        let liveness = Arc::downgrade(&inner);
        graph::register(inner.id, NodeKind::Reactive, liveness);
        Self { inner }
    }

    /// Wrap an object.
    pub fn object(entries: IndexMap<String, Value>) -> Self {
        Self::with_container(Container::Object(
            entries.into_iter().filter(|(k, _)| !is_forbidden_key(k)).collect(),
        ))
    }

    /// Wrap an array.
    pub fn array(items: Vec<Value>) -> Self {
        Self::with_container(Container::Array(items))
    }

    /// Wrap a plain array or object value. Other values yield `None`;
    /// an existing `Reactive` is returned as is.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) => Some(Self::array(items.as_ref().clone())),
            Value::Object(map) => Some(Self::object(map.as_ref().clone())),
            Value::Reactive(r) => Some(r.clone()),
            _ => None,
        }
    }

    /// Wrap a JSON array or object.
    pub fn from_json(json: &serde_json::Value) -> Option<Self> {
        Self::from_value(&Value::from_json(json))
    }

    /// Get the object's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Whether this wraps an array.
    pub fn is_array(&self) -> bool {
        matches!(&*self.inner.target.read(), Container::Array(_))
    }

    /// Number of properties or elements (tracked).
    pub fn len(&self) -> usize {
        self.track();
        self.inner.target.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read a property (tracked).
    ///
    /// On arrays, `"length"` and decimal indices are understood. Forbidden
    /// keys always read as `undefined`.
    pub fn get(&self, key: &str) -> Value {
        if is_forbidden_key(key) {
            return Value::Undefined;
        }
        self.track();

        let is_array = self.is_array();
        if is_array {
            if key == "length" {
                return Value::from(self.inner.target.read().len());
            }
            return match parse_index(key) {
                Some(index) => self.read_slot(Slot::Index(index)),
                None => Value::Undefined,
            };
        }
        self.read_slot(Slot::Key(key))
    }

    /// Read an array element (tracked). Objects yield `undefined`.
    pub fn get_index(&self, index: usize) -> Value {
        self.track();
        self.read_slot(Slot::Index(index))
    }

    /// Whether the object has an own property `key` (tracked).
    pub fn contains_key(&self, key: &str) -> bool {
        if is_forbidden_key(key) {
            return false;
        }
        self.track();
        match &*self.inner.target.read() {
            Container::Object(map) => map.contains_key(key),
            Container::Array(items) => parse_index(key).is_some_and(|i| i < items.len()),
        }
    }

    /// Property names, or decimal indices for arrays (tracked).
    pub fn keys(&self) -> Vec<String> {
        self.track();
        match &*self.inner.target.read() {
            Container::Object(map) => map.keys().cloned().collect(),
            Container::Array(items) => (0..items.len()).map(|i| i.to_string()).collect(),
        }
    }

    /// Property values or elements, nested containers wrapped (tracked).
    pub fn values(&self) -> Vec<Value> {
        self.entries().into_iter().map(|(_, v)| v).collect()
    }

    /// Key/value pairs, nested containers wrapped (tracked).
    pub fn entries(&self) -> Vec<(String, Value)> {
        let keys = self.keys();
        let is_array = self.is_array();
        keys.into_iter()
            .map(|key| {
                let slot = if is_array {
                    Slot::Index(parse_index(&key).unwrap_or(usize::MAX))
                } else {
                    Slot::Key(&key)
                };
                let value = self.read_slot(slot);
                (key, value)
            })
            .collect()
    }

    /// Assign a property. Returns `false` if nothing changed or the key is
    /// forbidden.
    pub fn set(&self, key: &str, value: Value) -> bool {
        if is_forbidden_key(key) {
            trace!(reactive = %self.id(), "refused forbidden key");
            return false;
        }
        if self.is_array() {
            if key == "length" {
                let length = value.to_number();
                if length >= 0.0 && length.fract() == 0.0 {
                    return self.set_len(length as usize);
                }
                return false;
            }
            return match parse_index(key) {
                Some(index) => self.set_index(index, value),
                None => false,
            };
        }

        self.adopt(&value);
        let previous = {
            let mut target = self.inner.target.write();
            let Container::Object(map) = &mut *target else {
                return false;
            };
            if map.get(key) == Some(&value) {
                return false;
            }
            map.insert(key.to_string(), value)
        };
        self.orphan(previous);
        self.notify(Change::Set { key: key.to_string() });
        true
    }

    /// Assign an array element, growing the array with `undefined` if needed.
    /// Indices at or past [`MAX_ARRAY_LEN`] are refused.
    pub fn set_index(&self, index: usize, value: Value) -> bool {
        if index >= MAX_ARRAY_LEN {
            trace!(reactive = %self.id(), index, "refused out-of-range index");
            return false;
        }
        self.adopt(&value);
        let (previous, change) = {
            let mut target = self.inner.target.write();
            let Container::Array(items) = &mut *target else {
                return false;
            };
            if index < items.len() {
                if items[index] == value {
                    return false;
                }
                let previous = std::mem::replace(&mut items[index], value);
                (Some(previous), Change::Set { key: index.to_string() })
            } else {
                let start = items.len();
                items.resize(index, Value::Undefined);
                items.push(value);
                (None, Change::Splice { start, removed: 0, inserted: index + 1 - start })
            }
        };
        self.orphan(previous);
        self.notify(change);
        true
    }

    fn set_len(&self, length: usize) -> bool {
        let current = self.inner.target.read().len();
        if length == current || length > MAX_ARRAY_LEN {
            return false;
        }
        if length < current {
            self.splice(length, current - length, Vec::new());
        } else {
            self.splice(current, 0, vec![Value::Undefined; length - current]);
        }
        true
    }

    /// Remove a property. On arrays the element becomes `undefined`.
    pub fn delete(&self, key: &str) -> bool {
        if is_forbidden_key(key) {
            return false;
        }
        let previous = {
            let mut target = self.inner.target.write();
            match &mut *target {
                Container::Object(map) => map.shift_remove(key),
                Container::Array(items) => match parse_index(key) {
                    Some(i) if i < items.len() && !items[i].is_undefined() => {
                        Some(std::mem::take(&mut items[i]))
                    }
                    _ => None,
                },
            }
        };
        match previous {
            Some(previous) => {
                self.orphan(Some(previous));
                self.notify(Change::Delete { key: key.to_string() });
                true
            }
            None => false,
        }
    }

    /// Append an element and return the new length.
    pub fn push(&self, value: Value) -> usize {
        let start = self.inner.target.read().len();
        self.splice(start, 0, vec![value]);
        self.inner.target.read().len()
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Value {
        let len = self.inner.target.read().len();
        if len == 0 || !self.is_array() {
            return Value::Undefined;
        }
        self.splice(len - 1, 1, Vec::new()).pop().unwrap_or_default()
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Value {
        if !self.is_array() {
            return Value::Undefined;
        }
        self.splice(0, 1, Vec::new()).pop().unwrap_or_default()
    }

    /// Prepend elements and return the new length.
    pub fn unshift(&self, values: Vec<Value>) -> usize {
        self.splice(0, 0, values);
        self.inner.target.read().len()
    }

    /// Insert an element at `index` (clamped to the length).
    pub fn insert(&self, index: usize, value: Value) {
        self.splice(index, 0, vec![value]);
    }

    /// Remove and return the element at `index`.
    pub fn remove(&self, index: usize) -> Value {
        self.splice(index, 1, Vec::new()).pop().unwrap_or_default()
    }

    /// Replace `delete_count` elements at `start` with `items`, returning
    /// the removed elements as plain values. Out-of-range arguments are
    /// clamped. Notifies once.
    pub fn splice(&self, start: usize, delete_count: usize, items: Vec<Value>) -> Vec<Value> {
        for item in &items {
            self.adopt(item);
        }
        let inserted = items.len();
        let (start, removed) = {
            let mut target = self.inner.target.write();
            let Container::Array(array) = &mut *target else {
                return Vec::new();
            };
            let start = start.min(array.len());
            let end = start.saturating_add(delete_count).min(array.len());
            let removed: Vec<Value> = array.splice(start..end, items).collect();
            (start, removed)
        };
        if removed.is_empty() && inserted == 0 {
            return Vec::new();
        }
        let removed: Vec<Value> = removed.into_iter().map(|v| self.orphan_value(v)).collect();
        self.notify(Change::Splice {
            start,
            removed: removed.len(),
            inserted,
        });
        removed
    }

    /// Remove every property or element.
    pub fn clear(&self) {
        let previous = {
            let mut target = self.inner.target.write();
            if target.len() == 0 {
                return;
            }
            match &mut *target {
                Container::Object(map) => std::mem::take(map).into_values().collect::<Vec<_>>(),
                Container::Array(items) => std::mem::take(items),
            }
        };
        for value in previous {
            self.orphan(Some(value));
        }
        self.notify(Change::Replace);
    }

    /// Replace the whole content with a plain (or reactive) array or object.
    ///
    /// A reactive source is copied, not adopted. Returns `false` for
    /// non-container values.
    pub fn replace(&self, content: &Value) -> bool {
        let container = match content.unwrap_untracked() {
            Value::Array(items) => Container::Array(items.as_ref().clone()),
            Value::Object(map) => Container::Object(
                map.iter()
                    .filter(|(k, _)| !is_forbidden_key(k))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
            Value::Reactive(other) if other.ptr_eq(self) => return false,
            Value::Reactive(other) => match other.snapshot() {
                Value::Array(items) => Container::Array(items.as_ref().clone()),
                Value::Object(map) => Container::Object(map.as_ref().clone()),
                _ => return false,
            },
            _ => return false,
        };
        let incoming = container.values();
        let previous = std::mem::replace(&mut *self.inner.target.write(), container);
        for value in previous.values() {
            self.release(&value);
        }
        for value in &incoming {
            self.adopt(value);
        }
        self.notify(Change::Replace);
        true
    }

    /// Deep plain copy of the current content (tracked).
    pub fn snapshot(&self) -> Value {
        self.track();
        let target = self.inner.target.read().clone();
        match target {
            Container::Object(map) => Value::object(map.iter().map(|(k, v)| (k.clone(), v.to_plain()))),
            Container::Array(items) => Value::array(items.iter().map(Value::to_plain)),
        }
    }

    /// Current content as JSON (untracked).
    pub fn to_json(&self) -> serde_json::Value {
        ReactiveContext::untracked(|| self.snapshot()).to_json()
    }

    /// Register a callback invoked with every change to this object or any
    /// of its descendants.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Change) + Send + Sync + 'static,
    {
        self.inner.subscribers.subscribe(callback)
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Type-erased handle for use as an explicit dependency.
    pub fn source(&self) -> SourceRef {
        Arc::new(self.clone())
    }

    /// Whether both handles wrap the same object.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn track(&self) {
        ReactiveContext::track_with(self.inner.id, || self.source());
    }

    /// Read a slot, wrapping a plain container in place on first access.
    fn read_slot(&self, slot: Slot<'_>) -> Value {
        let current = {
            let target = self.inner.target.read();
            match (&*target, slot) {
                (Container::Object(map), Slot::Key(key)) => map.get(key).cloned(),
                (Container::Array(items), Slot::Index(i)) => items.get(i).cloned(),
                _ => None,
            }
        };
        let Some(current) = current else {
            return Value::Undefined;
        };
        if !matches!(current, Value::Array(_) | Value::Object(_)) {
            return current;
        }

        let mut target = self.inner.target.write();
        let stored = match (&mut *target, slot) {
            (Container::Object(map), Slot::Key(key)) => map.get_mut(key),
            (Container::Array(items), Slot::Index(i)) => items.get_mut(i),
            _ => None,
        };
        let Some(stored) = stored else {
            return Value::Undefined;
        };
        // Another reader may have wrapped the slot in the meantime.
        if let Value::Reactive(child) = &*stored {
            return Value::Reactive(child.clone());
        }
        let Some(child) = Reactive::from_value(&*stored) else {
            return stored.clone();
        };
        *child.inner.parent.lock() = Some(Arc::downgrade(&self.inner));
        *stored = Value::Reactive(child.clone());
        Value::Reactive(child)
    }

    /// Make `value` a child of this object if it is a parentless reactive.
    fn adopt(&self, value: &Value) {
        let Value::Reactive(child) = value else {
            return;
        };
        if child.ptr_eq(self) || self.has_ancestor(child) {
            return;
        }
        let mut parent = child.inner.parent.lock();
        if parent.as_ref().and_then(Weak::upgrade).is_none() {
            *parent = Some(Arc::downgrade(&self.inner));
        }
    }

    fn has_ancestor(&self, candidate: &Reactive) -> bool {
        let mut current = self.parent();
        while let Some(ancestor) = current {
            if Arc::ptr_eq(&ancestor, &candidate.inner) {
                return true;
            }
            current = ancestor.parent.lock().as_ref().and_then(Weak::upgrade);
        }
        false
    }

    fn parent(&self) -> Option<Arc<ReactiveInner>> {
        self.inner.parent.lock().as_ref().and_then(Weak::upgrade)
    }

    fn orphan(&self, previous: Option<Value>) {
        if let Some(previous) = previous {
            self.release(&previous);
        }
    }

    /// Detach a value leaving this object and return its plain form.
    fn orphan_value(&self, value: Value) -> Value {
        self.release(&value);
        ReactiveContext::untracked(|| value.to_plain())
    }

    /// Clear the parent link of a child wrapper that points at this object.
    fn release(&self, value: &Value) {
        if let Value::Reactive(child) = value {
            let mut parent = child.inner.parent.lock();
            let is_ours = parent
                .as_ref()
                .is_some_and(|p| std::ptr::eq(p.as_ptr(), Arc::as_ptr(&self.inner)));
            if is_ours {
                *parent = None;
            }
        }
    }

    fn notify(&self, change: Change) {
        trace!(reactive = %self.id(), ?change, "reactive changed");
        self.inner.subscribers.notify(&change);

        let mut current = self.parent();
        while let Some(ancestor) = current {
            ancestor.subscribers.notify(&Change::Nested);
            current = ancestor.parent.lock().as_ref().and_then(Weak::upgrade);
        }
    }
}

#[derive(Clone, Copy)]
enum Slot<'a> {
    Key(&'a str),
    Index(usize),
}

fn parse_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    key.parse().ok()
}

impl Source for Reactive {
    fn node_id(&self) -> NodeId {
        self.inner.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Reactive
    }

    fn watch(&self, notify: Notify) -> Subscription {
        self.subscribe(move |_| notify())
    }
}

impl PartialEq for Reactive {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactive")
            .field("id", &self.inner.id)
            .field("value", &self.to_json())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn reactive(json: serde_json::Value) -> Reactive {
        Reactive::from_json(&json).unwrap()
    }

    fn recorder(r: &Reactive) -> (Arc<PlMutex<Vec<Change>>>, Subscription) {
        let changes = Arc::new(PlMutex::new(Vec::new()));
        let changes_clone = changes.clone();
        let sub = r.subscribe(move |change| changes_clone.lock().push(change.clone()));
        (changes, sub)
    }

    #[test]
    fn set_notifies_once_per_change() {
        let user = reactive(json!({"name": "Ann"}));
        let (changes, _sub) = recorder(&user);

        assert!(user.set("name", Value::from("Bo")));
        assert!(!user.set("name", Value::from("Bo")));

        assert_eq!(user.get("name"), Value::from("Bo"));
        assert_eq!(*changes.lock(), vec![Change::Set { key: "name".into() }]);
    }

    #[test]
    fn nested_reads_return_the_same_wrapper() {
        let state = reactive(json!({"user": {"name": "Ann"}}));

        let first = state.get("user");
        let second = state.get("user");
        assert!(matches!(first, Value::Reactive(_)));
        assert_eq!(first, second);
    }

    #[test]
    fn nested_changes_bubble_to_ancestors() {
        let state = reactive(json!({"user": {"address": {"city": "Oslo"}}}));
        let (changes, _sub) = recorder(&state);

        let user = state.get("user");
        let address = user.as_reactive().unwrap().get("address");
        address.as_reactive().unwrap().set("city", Value::from("Rome"));

        assert_eq!(*changes.lock(), vec![Change::Nested]);
        assert_eq!(state.to_json(), json!({"user": {"address": {"city": "Rome"}}}));
    }

    #[test]
    fn replacing_a_slot_detaches_the_old_wrapper() {
        let state = reactive(json!({"user": {"name": "Ann"}}));
        let old = state.get("user");
        let old = old.as_reactive().unwrap().clone();

        state.set("user", Value::from_json(&json!({"name": "Bo"})));
        let (changes, _sub) = recorder(&state);

        // Mutating the detached wrapper no longer reaches the parent.
        old.set("name", Value::from("Cy"));
        assert!(changes.lock().is_empty());

        let new = state.get("user");
        assert_ne!(new, Value::Reactive(old));
        assert_eq!(new.as_reactive().unwrap().get("name"), Value::from("Bo"));
    }

    #[test]
    fn array_mutators_notify_with_range() {
        let list = reactive(json!([1, 2, 3]));
        let (changes, _sub) = recorder(&list);

        assert_eq!(list.push(Value::from(4)), 4);
        assert_eq!(list.pop(), Value::from(4));
        assert_eq!(list.shift(), Value::from(1));
        assert_eq!(list.unshift(vec![Value::from(0)]), 3);
        let removed = list.splice(1, 1, vec![Value::from(9), Value::from(8)]);
        assert_eq!(removed, vec![Value::from(2)]);

        assert_eq!(list.to_json(), json!([0, 9, 8, 3]));
        assert_eq!(
            *changes.lock(),
            vec![
                Change::Splice { start: 3, removed: 0, inserted: 1 },
                Change::Splice { start: 3, removed: 1, inserted: 0 },
                Change::Splice { start: 0, removed: 1, inserted: 0 },
                Change::Splice { start: 0, removed: 0, inserted: 1 },
                Change::Splice { start: 1, removed: 1, inserted: 2 },
            ]
        );
    }

    #[test]
    fn array_length_and_index_access() {
        let list = reactive(json!(["a", "b"]));
        assert_eq!(list.get("length"), Value::from(2));
        assert_eq!(list.get("1"), Value::from("b"));
        assert_eq!(list.get("01"), Value::Undefined);

        list.set("length", Value::from(1));
        assert_eq!(list.to_json(), json!(["a"]));

        list.set_index(3, Value::from("d"));
        assert_eq!(list.to_json(), json!(["a", null, null, "d"]));
    }

    #[test]
    fn oversized_growth_is_refused() {
        let list = reactive(json!(["a"]));
        let (changes, _sub) = recorder(&list);

        assert!(!list.set_index(MAX_ARRAY_LEN, Value::from("x")));
        assert!(!list.set("1000000000000", Value::from("x")));
        assert!(!list.set("length", Value::from(1e12)));
        assert_eq!(list.to_json(), json!(["a"]));
        assert!(changes.lock().is_empty());
    }

    #[test]
    fn forbidden_keys_are_refused() {
        let obj = reactive(json!({}));
        assert!(!obj.set("__proto__", Value::from(1)));
        assert!(!obj.set("constructor", Value::from(1)));
        assert_eq!(obj.get("prototype"), Value::Undefined);
        assert!(obj.keys().is_empty());
    }

    #[test]
    fn delete_and_clear() {
        let obj = reactive(json!({"a": 1, "b": 2, "c": 3}));
        assert!(obj.delete("b"));
        assert!(!obj.delete("b"));
        assert_eq!(obj.keys(), vec!["a", "c"]);

        obj.clear();
        assert!(obj.is_empty());
    }

    #[test]
    fn replace_swaps_whole_content() {
        let list = reactive(json!([1, 2]));
        let (changes, _sub) = recorder(&list);

        assert!(list.replace(&Value::from_json(&json!([3]))));
        assert!(!list.replace(&Value::from(5)));

        assert_eq!(list.to_json(), json!([3]));
        assert_eq!(*changes.lock(), vec![Change::Replace]);
    }

    #[test]
    fn tracked_computation_reruns_on_nested_change() {
        use crate::reactive::Computed;

        let state = reactive(json!({"items": [1, 2]}));
        let runs = Arc::new(AtomicI32::new(0));

        let count = Computed::tracked({
            let state = state.clone();
            let runs = runs.clone();
            move || {
                runs.fetch_add(1, Ordering::SeqCst);
                state.get("items").to_items().map_or(0, |items| items.len())
            }
        });
        assert_eq!(count.get(), 2);

        let items = state.get("items");
        items.as_reactive().unwrap().push(Value::from(3));
        assert_eq!(count.get(), 3);
    }

    #[test]
    fn snapshot_is_plain_and_detached() {
        let state = reactive(json!({"list": [1]}));
        let _ = state.get("list");
        let snapshot = state.snapshot();

        assert!(matches!(snapshot, Value::Object(_)));
        assert_eq!(snapshot.to_json(), json!({"list": [1]}));
    }
}
