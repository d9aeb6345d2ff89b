//! Document nodes.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

use super::event::{Event, Listener, ListenerId};
use super::html;

/// Elements that never have children or a closing tag.
pub const VOID_ELEMENTS: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source", "track", "wbr",
];

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// What a node is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeType {
    Element(String),
    Text,
    Comment,
    /// A parentless container, used for documents and parsed fragments.
    Fragment,
}

#[derive(Default)]
struct NodeData {
    attributes: IndexMap<String, String>,
    /// Character data of text and comment nodes.
    text: String,
    /// Live `value` property; falls back to the `value` attribute.
    value: Option<String>,
    /// Live `checked` property; falls back to the `checked` attribute.
    checked: Option<bool>,
}

pub(crate) struct NodeInner {
    id: u64,
    node_type: NodeType,
    data: RwLock<NodeData>,
    parent: Mutex<Option<Weak<NodeInner>>>,
    children: RwLock<Vec<Node>>,
    listeners: Mutex<Vec<Listener>>,
    version: AtomicU64,
}

/// A handle to a node of an in-memory document.
///
/// Cloning clones the handle; equality is identity.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

impl Node {
    fn with_type(node_type: NodeType, text: String) -> Self {
        Self {
            inner: Arc::new(NodeInner {
                id: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
                node_type,
                data: RwLock::new(NodeData {
                    text,
                    ..NodeData::default()
                }),
                parent: Mutex::new(None),
                children: RwLock::new(Vec::new()),
                listeners: Mutex::new(Vec::new()),
                version: AtomicU64::new(0),
            }),
        }
    }

    /// Create an element. The tag name is lowercased.
    pub fn element(tag: &str) -> Self {
        Self::with_type(NodeType::Element(tag.to_ascii_lowercase()), String::new())
    }

    pub fn text(data: impl Into<String>) -> Self {
        Self::with_type(NodeType::Text, data.into())
    }

    pub fn comment(data: impl Into<String>) -> Self {
        Self::with_type(NodeType::Comment, data.into())
    }

    pub fn fragment() -> Self {
        Self::with_type(NodeType::Fragment, String::new())
    }

    /// Parse an HTML fragment into a new fragment node.
    pub fn parse(markup: &str) -> Self {
        let fragment = Self::fragment();
        for child in html::parse_fragment(markup) {
            fragment.append_child(&child);
        }
        fragment
    }

    /// Process-unique node id.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn node_type(&self) -> &NodeType {
        &self.inner.node_type
    }

    /// Lowercase tag name of an element.
    pub fn tag_name(&self) -> Option<&str> {
        match &self.inner.node_type {
            NodeType::Element(tag) => Some(tag),
            _ => None,
        }
    }

    pub fn is_element(&self) -> bool {
        matches!(self.inner.node_type, NodeType::Element(_))
    }

    pub fn is_void(&self) -> bool {
        self.tag_name().is_some_and(|tag| VOID_ELEMENTS.contains(&tag))
    }

    pub fn downgrade(&self) -> WeakNode {
        WeakNode {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Whether both handles refer to the same node.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of mutations applied to this node itself: attribute,
    /// property, character data and child list changes.
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Acquire)
    }

    fn touch(&self) {
        self.inner.version.fetch_add(1, Ordering::AcqRel);
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.inner.data.read().attributes.get(name).cloned()
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.inner.data.read().attributes.contains_key(name)
    }

    /// All attributes in document order.
    pub fn attributes(&self) -> Vec<(String, String)> {
        self.inner
            .data
            .read()
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Set an attribute. Setting the current value is not a mutation.
    pub fn set_attribute(&self, name: &str, value: impl Into<String>) {
        if !self.is_element() {
            return;
        }
        let name = name.to_ascii_lowercase();
        let value = value.into();
        let changed = {
            let mut data = self.inner.data.write();
            if data.attributes.get(&name) == Some(&value) {
                false
            } else {
                data.attributes.insert(name, value);
                true
            }
        };
        if changed {
            self.touch();
        }
    }

    pub fn remove_attribute(&self, name: &str) -> Option<String> {
        let removed = self.inner.data.write().attributes.shift_remove(name);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    // ------------------------------------------------------------------
    // Class list
    // ------------------------------------------------------------------

    /// Class names from the `class` attribute.
    pub fn classes(&self) -> Vec<String> {
        self.attribute("class")
            .map(|c| c.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn has_class(&self, name: &str) -> bool {
        self.classes().iter().any(|c| c == name)
    }

    pub fn add_class(&self, name: &str) {
        self.toggle_class(name, true);
    }

    pub fn remove_class(&self, name: &str) {
        self.toggle_class(name, false);
    }

    /// Add or remove a class.
    pub fn toggle_class(&self, name: &str, on: bool) {
        let mut classes = self.classes();
        let present = classes.iter().any(|c| c == name);
        if on == present || name.is_empty() {
            return;
        }
        if on {
            classes.push(name.to_string());
        } else {
            classes.retain(|c| c != name);
        }
        if classes.is_empty() {
            self.remove_attribute("class");
        } else {
            self.set_attribute("class", classes.join(" "));
        }
    }

    // ------------------------------------------------------------------
    // Inline style
    // ------------------------------------------------------------------

    /// Declarations of the `style` attribute, in order.
    pub fn styles(&self) -> IndexMap<String, String> {
        let mut styles = IndexMap::new();
        if let Some(style) = self.attribute("style") {
            for declaration in style.split(';') {
                if let Some((prop, value)) = declaration.split_once(':') {
                    let prop = prop.trim();
                    if !prop.is_empty() {
                        styles.insert(prop.to_string(), value.trim().to_string());
                    }
                }
            }
        }
        styles
    }

    pub fn style(&self, property: &str) -> Option<String> {
        self.styles().shift_remove(property)
    }

    pub fn set_style(&self, property: &str, value: &str) {
        let mut styles = self.styles();
        styles.insert(property.to_string(), value.to_string());
        self.write_styles(&styles);
    }

    pub fn remove_style(&self, property: &str) {
        let mut styles = self.styles();
        if styles.shift_remove(property).is_some() {
            self.write_styles(&styles);
        }
    }

    fn write_styles(&self, styles: &IndexMap<String, String>) {
        if styles.is_empty() {
            self.remove_attribute("style");
            return;
        }
        let text = styles
            .iter()
            .map(|(prop, value)| format!("{prop}: {value}"))
            .collect::<Vec<_>>()
            .join("; ");
        self.set_attribute("style", text);
    }

    // ------------------------------------------------------------------
    // Form properties
    // ------------------------------------------------------------------

    /// The `value` property of a form control.
    pub fn value(&self) -> String {
        let data = self.inner.data.read();
        data.value
            .clone()
            .or_else(|| data.attributes.get("value").cloned())
            .unwrap_or_default()
    }

    pub fn set_value(&self, value: impl Into<String>) {
        let value = value.into();
        let changed = {
            let mut data = self.inner.data.write();
            let changed = data.value.as_ref() != Some(&value);
            data.value = Some(value);
            changed
        };
        if changed {
            self.touch();
        }
    }

    /// The `checked` property of a checkbox or radio button.
    pub fn checked(&self) -> bool {
        let data = self.inner.data.read();
        data.checked.unwrap_or_else(|| data.attributes.contains_key("checked"))
    }

    pub fn set_checked(&self, checked: bool) {
        let changed = {
            let mut data = self.inner.data.write();
            let changed = data.checked != Some(checked);
            data.checked = Some(checked);
            changed
        };
        if changed {
            self.touch();
        }
    }

    // ------------------------------------------------------------------
    // Text
    // ------------------------------------------------------------------

    /// Character data of a text or comment node.
    pub fn data(&self) -> String {
        self.inner.data.read().text.clone()
    }

    /// Concatenated text of this node and its descendants. Comments are
    /// skipped.
    pub fn text_content(&self) -> String {
        match self.inner.node_type {
            NodeType::Text => self.data(),
            NodeType::Comment => String::new(),
            _ => self.children().iter().map(Node::text_content).collect(),
        }
    }

    /// Replace the content with a single text node (or update the data of
    /// a text node). No-op if the text is already current.
    pub fn set_text_content(&self, text: &str) {
        match self.inner.node_type {
            NodeType::Text | NodeType::Comment => {
                let changed = {
                    let mut data = self.inner.data.write();
                    let changed = data.text != text;
                    if changed {
                        data.text = text.to_string();
                    }
                    changed
                };
                if changed {
                    self.touch();
                }
            }
            _ => {
                let children = self.children();
                if let [only] = children.as_slice() {
                    if *only.node_type() == NodeType::Text {
                        only.set_text_content(text);
                        return;
                    }
                }
                if children.is_empty() && text.is_empty() {
                    return;
                }
                self.clear_children();
                if !text.is_empty() {
                    self.append_child(&Node::text(text));
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Tree
    // ------------------------------------------------------------------

    pub fn parent(&self) -> Option<Node> {
        self.inner
            .parent
            .lock()
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| Node { inner })
    }

    /// Snapshot of the child list.
    pub fn children(&self) -> Vec<Node> {
        self.inner.children.read().clone()
    }

    /// Element children only.
    pub fn element_children(&self) -> Vec<Node> {
        self.children().into_iter().filter(Node::is_element).collect()
    }

    pub fn first_child(&self) -> Option<Node> {
        self.inner.children.read().first().cloned()
    }

    pub fn next_sibling(&self) -> Option<Node> {
        let parent = self.parent()?;
        let siblings = parent.inner.children.read();
        let index = siblings.iter().position(|n| n.ptr_eq(self))?;
        siblings.get(index + 1).cloned()
    }

    /// Whether `self` is `other` or one of its ancestors.
    pub fn contains(&self, other: &Node) -> bool {
        let mut current = Some(other.clone());
        while let Some(node) = current {
            if node.ptr_eq(self) {
                return true;
            }
            current = node.parent();
        }
        false
    }

    /// Append `child`, moving it out of its current parent first.
    pub fn append_child(&self, child: &Node) {
        self.insert_before(child, None);
    }

    /// Insert `child` before `reference` (or at the end). Inserting an
    /// ancestor of `self` is ignored.
    pub fn insert_before(&self, child: &Node, reference: Option<&Node>) {
        if child.contains(self) || *child.node_type() == NodeType::Fragment {
            return;
        }
        if let Some(reference) = reference {
            if reference.ptr_eq(child) {
                return;
            }
        }
        child.remove();
        {
            let mut children = self.inner.children.write();
            let index = reference
                .and_then(|r| children.iter().position(|n| n.ptr_eq(r)))
                .unwrap_or(children.len());
            children.insert(index, child.clone());
        }
        *child.inner.parent.lock() = Some(Arc::downgrade(&self.inner));
        self.touch();
    }

    /// Insert `child` right after `reference`, which must be a child of
    /// `self`.
    pub fn insert_after(&self, child: &Node, reference: &Node) {
        match reference.next_sibling() {
            Some(next) if next.ptr_eq(child) => {}
            Some(next) => self.insert_before(child, Some(&next)),
            None => self.append_child(child),
        }
    }

    /// Remove `child` from this node. Returns whether it was a child.
    pub fn remove_child(&self, child: &Node) -> bool {
        let removed = {
            let mut children = self.inner.children.write();
            match children.iter().position(|n| n.ptr_eq(child)) {
                Some(index) => {
                    children.remove(index);
                    true
                }
                None => false,
            }
        };
        if removed {
            *child.inner.parent.lock() = None;
            self.touch();
        }
        removed
    }

    /// Detach this node from its parent.
    pub fn remove(&self) {
        if let Some(parent) = self.parent() {
            parent.remove_child(self);
        }
    }

    /// Put `replacement` where this node is.
    pub fn replace_with(&self, replacement: &Node) {
        if let Some(parent) = self.parent() {
            parent.insert_before(replacement, Some(self));
            parent.remove_child(self);
        }
    }

    pub fn clear_children(&self) {
        let children = std::mem::take(&mut *self.inner.children.write());
        if children.is_empty() {
            return;
        }
        for child in &children {
            *child.inner.parent.lock() = None;
        }
        self.touch();
    }

    /// Copy this node, and its subtree if `deep`. Listeners and live
    /// properties are not copied.
    pub fn clone_node(&self, deep: bool) -> Node {
        let copy = Self::with_type(self.inner.node_type.clone(), self.data());
        copy.inner.data.write().attributes = self.inner.data.read().attributes.clone();
        if deep {
            for child in self.children() {
                copy.append_child(&child.clone_node(true));
            }
        }
        copy
    }

    /// This node and every descendant, in document order.
    pub fn descendants(&self) -> Vec<Node> {
        let mut out = Vec::new();
        let mut stack = vec![self.clone()];
        while let Some(node) = stack.pop() {
            let children = node.children();
            out.push(node);
            stack.extend(children.into_iter().rev());
        }
        out
    }

    /// Descendant elements (including `self`) matching `predicate`.
    pub fn query_all(&self, predicate: impl Fn(&Node) -> bool) -> Vec<Node> {
        self.descendants()
            .into_iter()
            .filter(|n| n.is_element() && predicate(n))
            .collect()
    }

    /// First descendant element (including `self`) with the given attribute.
    pub fn find_by_attribute(&self, name: &str) -> Option<Node> {
        self.descendants()
            .into_iter()
            .find(|n| n.is_element() && n.has_attribute(name))
    }

    // ------------------------------------------------------------------
    // Markup
    // ------------------------------------------------------------------

    pub fn inner_html(&self) -> String {
        let mut out = String::new();
        for child in self.children() {
            html::serialize(&child, &mut out);
        }
        out
    }

    pub fn outer_html(&self) -> String {
        let mut out = String::new();
        html::serialize(self, &mut out);
        out
    }

    /// Replace the children with the parsed `markup`.
    pub fn set_inner_html(&self, markup: &str) {
        if self.inner_html() == markup {
            return;
        }
        self.clear_children();
        for child in html::parse_fragment(markup) {
            self.append_child(&child);
        }
    }

    /// Short description for diagnostics, e.g. `<input id="name">`.
    pub fn describe(&self) -> String {
        match &self.inner.node_type {
            NodeType::Element(tag) => {
                let data = self.inner.data.read();
                let mut out = format!("<{tag}");
                for key in ["id", "class", "name"] {
                    if let Some(value) = data.attributes.get(key) {
                        out.push_str(&format!(" {key}=\"{value}\""));
                    }
                }
                out.push('>');
                out
            }
            NodeType::Text => "#text".to_string(),
            NodeType::Comment => "#comment".to_string(),
            NodeType::Fragment => "#fragment".to_string(),
        }
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Register an event listener and return its id.
    pub fn add_event_listener<F>(&self, kind: &str, callback: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let listener = Listener::new(kind, callback);
        let id = listener.id();
        self.inner.listeners.lock().push(listener);
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.lock();
        let before = listeners.len();
        listeners.retain(|l| l.id() != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Dispatch `event` at this node. It bubbles through the ancestors
    /// unless a listener stops propagation. Returns `false` if a listener
    /// prevented the default action.
    pub fn dispatch_event(&self, event: &Event) -> bool {
        event.set_target(self);
        let mut current = Some(self.clone());
        while let Some(node) = current {
            let listeners: Vec<Listener> = node
                .inner
                .listeners
                .lock()
                .iter()
                .filter(|l| l.kind() == event.kind())
                .cloned()
                .collect();
            for listener in listeners {
                // A listener removed by an earlier one in this dispatch is skipped.
                if node.inner.listeners.lock().iter().any(|l| l.id() == listener.id()) {
                    listener.call(event);
                }
            }
            if event.propagation_stopped() {
                break;
            }
            current = node.parent();
        }
        !event.default_prevented()
    }
}

/// A non-owning node handle, for closures stored on the node itself.
#[derive(Clone)]
pub struct WeakNode {
    inner: Weak<NodeInner>,
}

impl WeakNode {
    pub fn upgrade(&self) -> Option<Node> {
        self.inner.upgrade().map(|inner| Node { inner })
    }
}

impl fmt::Debug for WeakNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(node) => write!(f, "WeakNode({node:?})"),
            None => f.write_str("WeakNode(dropped)"),
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Node {}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({} {})", self.inner.id, self.describe())
    }
}
