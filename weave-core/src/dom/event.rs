//! DOM events.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::value::Value;

use super::node::Node;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies a registered event listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Clone)]
pub(crate) struct Listener {
    id: ListenerId,
    kind: String,
    callback: Arc<dyn Fn(&Event) + Send + Sync>,
}

impl Listener {
    pub(crate) fn new<F>(kind: &str, callback: F) -> Self
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        Self {
            id: ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed)),
            kind: kind.to_string(),
            callback: Arc::new(callback),
        }
    }

    pub(crate) fn id(&self) -> ListenerId {
        self.id
    }

    pub(crate) fn kind(&self) -> &str {
        &self.kind
    }

    pub(crate) fn call(&self, event: &Event) {
        (self.callback)(event)
    }
}

/// An event being dispatched.
///
/// # Example
///
/// ```rust
/// use weave_core::dom::{Event, Node};
///
/// let input = Node::element("input");
/// input.add_event_listener("input", |event| {
///     let target = event.target().unwrap();
///     println!("typed {}", target.value());
/// });
///
/// input.set_value("Bob");
/// input.dispatch_event(&Event::new("input"));
/// ```
pub struct Event {
    kind: String,
    detail: Value,
    key: Option<String>,
    target: Mutex<Option<Node>>,
    default_prevented: AtomicBool,
    propagation_stopped: AtomicBool,
}

impl Event {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            detail: Value::Undefined,
            key: None,
            target: Mutex::new(None),
            default_prevented: AtomicBool::new(false),
            propagation_stopped: AtomicBool::new(false),
        }
    }

    /// Attach a payload, available to handlers as `$event.detail`.
    pub fn with_detail(mut self, detail: impl Into<Value>) -> Self {
        self.detail = detail.into();
        self
    }

    /// Set the key of a keyboard event.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn detail(&self) -> &Value {
        &self.detail
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// The node the event was dispatched at.
    pub fn target(&self) -> Option<Node> {
        self.target.lock().clone()
    }

    pub(crate) fn set_target(&self, node: &Node) {
        let mut target = self.target.lock();
        if target.is_none() {
            *target = Some(node.clone());
        }
    }

    pub fn prevent_default(&self) {
        self.default_prevented.store(true, Ordering::Release);
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented.load(Ordering::Acquire)
    }

    pub fn stop_propagation(&self) {
        self.propagation_stopped.store(true, Ordering::Release);
    }

    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped.load(Ordering::Acquire)
    }

    /// The event as a plain object, as handlers see it in `$event`.
    pub fn to_value(&self) -> Value {
        let mut entries = vec![("type", Value::from(self.kind.as_str())), ("detail", self.detail.clone())];
        if let Some(key) = &self.key {
            entries.push(("key", Value::from(key.as_str())));
        }
        if let Some(target) = self.target() {
            entries.push(("value", Value::from(target.value())));
            entries.push(("checked", Value::Bool(target.checked())));
        }
        Value::object(entries)
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("kind", &self.kind)
            .field("detail", &self.detail)
            .field("default_prevented", &self.default_prevented())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn events_bubble_until_stopped() {
        let outer = Node::element("div");
        let inner = Node::element("button");
        outer.append_child(&inner);

        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        outer.add_event_listener("click", move |event| {
            assert!(event.target().is_some());
            s.fetch_add(1, Ordering::SeqCst);
        });

        inner.dispatch_event(&Event::new("click"));
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        inner.add_event_listener("click", |event| event.stop_propagation());
        inner.dispatch_event(&Event::new("click"));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn prevent_default_is_reported() {
        let form = Node::element("form");
        form.add_event_listener("submit", |event| event.prevent_default());
        assert!(!form.dispatch_event(&Event::new("submit")));
        assert!(form.dispatch_event(&Event::new("reset")));
    }

    #[test]
    fn removed_listeners_stop_firing() {
        let button = Node::element("button");
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let id = button.add_event_listener("click", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        button.dispatch_event(&Event::new("click"));
        assert!(button.remove_event_listener(id));
        assert!(!button.remove_event_listener(id));
        button.dispatch_event(&Event::new("click"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn payload_object_includes_target_state() {
        let input = Node::element("input");
        input.set_value("Bob");
        let event = Event::new("input").with_key("Enter");
        input.dispatch_event(&event);

        let payload = event.to_value().to_json();
        assert_eq!(payload["type"], "input");
        assert_eq!(payload["value"], "Bob");
        assert_eq!(payload["key"], "Enter");
    }
}
