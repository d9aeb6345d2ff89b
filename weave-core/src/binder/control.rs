//! Structural directives: `data-if` and `data-for`.
//!
//! Both replace their element with an anchor comment and keep the element
//! as a template. Rendered copies are bound with their own cleanup list so
//! they can be torn down independently of the rest of the root.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::dom::Node;
use crate::error::EvalError;
use crate::expr::{Expression, Mode};
use crate::reactive::{Effect, ReactiveContext, Signal, MAX_ARRAY_LEN};
use crate::scope::Scope;
use crate::value::Value;

use super::directive::{Directive, ForSpec};
use super::lifecycle::CleanupList;
use super::BindContext;

/// A rendered copy of a template and the bindings that belong to it.
struct Block {
    node: Node,
    cleanups: Arc<CleanupList>,
}

impl Block {
    fn render(ctx: &BindContext, template: &Node, scope: &Scope) -> Self {
        let node = template.clone_node(true);
        let cleanups = CleanupList::new();
        ctx.with_cleanups(Arc::clone(&cleanups)).bind_element(&node, scope);
        Self { node, cleanups }
    }

    fn dispose(self) {
        self.cleanups.run();
        self.node.remove();
    }
}

/// Swap `node` for an anchor comment and return the detached template.
fn detach(node: &Node, label: &str) -> Option<(Node, Node)> {
    let parent = node.parent()?;
    let anchor = Node::comment(label);
    parent.insert_before(&anchor, Some(node));
    node.remove();
    Some((anchor, node.clone_node(true)))
}

pub(super) fn bind_if(ctx: &BindContext, node: &Node, directive: &Directive, scope: &Scope) {
    let Some((anchor, template)) = detach(node, "if") else {
        ctx.report(node, &directive.attribute, &"element has no parent");
        return;
    };
    template.remove_attribute(&directive.attribute);

    let block: Arc<Mutex<Option<Block>>> = Arc::default();
    let shown = Arc::clone(&block);
    let block_ctx = ctx.clone();
    let block_scope = scope.clone();
    ctx.watch(node, directive, scope, move |_, value| {
        let visible = shown.lock().is_some();
        match (value.truthy(), visible) {
            (true, false) => {
                let rendered = Block::render(&block_ctx, &template, &block_scope);
                if let Some(parent) = anchor.parent() {
                    parent.insert_after(&rendered.node, &anchor);
                }
                *shown.lock() = Some(rendered);
            }
            (false, true) => {
                let rendered = shown.lock().take();
                if let Some(rendered) = rendered {
                    rendered.dispose();
                }
            }
            _ => {}
        }
    });

    ctx.on_cleanup(move || {
        let rendered = block.lock().take();
        if let Some(rendered) = rendered {
            rendered.cleanups.run();
        }
    });
}

/// One rendered list item.
struct Row {
    key: Option<String>,
    block: Block,
    item: Signal<Value>,
    index: Signal<Value>,
}

impl Row {
    fn update(&self, item: Value, index: usize) {
        self.item.set(item);
        self.index.set(Value::from(index));
    }
}

/// Everything a list binding needs between runs.
struct List {
    ctx: BindContext,
    spec: ForSpec,
    scope: Scope,
    anchor: Node,
    template: Node,
    key: Option<Expression>,
    attribute: String,
}

impl List {
    fn create(&self, item: Value, index: usize, key: Option<String>) -> Row {
        let scope = self.scope.child();
        let item = scope.signal(self.spec.item.clone(), item);
        let index_signal = Signal::new(Value::from(index));
        if let Some(name) = &self.spec.index {
            scope.insert(name.clone(), Value::Signal(index_signal.clone()));
        }
        Row {
            key,
            block: Block::render(&self.ctx, &self.template, &scope),
            item,
            index: index_signal,
        }
    }

    /// Evaluate the key expression for every item. `None` if there is no key
    /// expression or the keys are not unique.
    fn keys(&self, items: &[Value]) -> Option<Vec<String>> {
        let expression = self.key.as_ref()?;
        let mut seen = HashSet::with_capacity(items.len());
        let mut keys = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let scope = self.scope.child();
            scope.insert(self.spec.item.clone(), item.clone());
            if let Some(name) = &self.spec.index {
                scope.insert(name.clone(), Value::from(index));
            }
            let key = key_string(&self.ctx.evaluate(&self.anchor, &self.attribute, expression, &scope, Mode::Read));
            if !seen.insert(key.clone()) {
                self.ctx.report(
                    &self.anchor,
                    &self.attribute,
                    &format!("duplicate key {key:?}, falling back to index order"),
                );
                return None;
            }
            keys.push(key);
        }
        Some(keys)
    }

    fn reconcile(&self, rows: Vec<Row>, items: Vec<Value>) -> Vec<Row> {
        let before = rows.len();
        let (rows, created, removed) = match self.keys(&items) {
            Some(keys) => self.reconcile_keyed(rows, items, keys),
            None => self.reconcile_indexed(rows, items),
        };

        if let Some(parent) = self.anchor.parent() {
            let mut cursor = self.anchor.clone();
            for row in &rows {
                parent.insert_after(&row.block.node, &cursor);
                cursor = row.block.node.clone();
            }
        }
        debug!(before, after = rows.len(), created, removed, "list reconciled");
        rows
    }

    fn reconcile_keyed(&self, rows: Vec<Row>, items: Vec<Value>, keys: Vec<String>) -> (Vec<Row>, usize, usize) {
        let mut old: IndexMap<String, Row> = IndexMap::with_capacity(rows.len());
        let mut unkeyed = Vec::new();
        for row in rows {
            match row.key.clone() {
                Some(key) => {
                    old.insert(key, row);
                }
                None => unkeyed.push(row),
            }
        }

        let mut created = 0;
        let mut next = Vec::with_capacity(items.len());
        for (index, (item, key)) in items.into_iter().zip(keys).enumerate() {
            match old.shift_remove(&key) {
                Some(row) => {
                    row.update(item, index);
                    next.push(row);
                }
                None => {
                    created += 1;
                    next.push(self.create(item, index, Some(key)));
                }
            }
        }

        let removed = old.len() + unkeyed.len();
        for row in old.into_values().chain(unkeyed) {
            row.block.dispose();
        }
        (next, created, removed)
    }

    fn reconcile_indexed(&self, mut rows: Vec<Row>, items: Vec<Value>) -> (Vec<Row>, usize, usize) {
        let kept = items.len().min(rows.len());
        let removed = rows.len() - kept;
        for row in rows.drain(kept..) {
            row.block.dispose();
        }

        let mut created = 0;
        for (index, item) in items.into_iter().enumerate() {
            match rows.get_mut(index) {
                Some(row) => {
                    row.key = None;
                    row.update(item, index);
                }
                None => {
                    created += 1;
                    rows.push(self.create(item, index, None));
                }
            }
        }
        (rows, created, removed)
    }
}

/// The values a list iterates: array elements, object values, or `1..=n`
/// for a number up to [`MAX_ARRAY_LEN`]. Anything else iterates nothing.
fn iterable(value: &Value) -> Result<Vec<Value>, EvalError> {
    if let Some(items) = value.to_items() {
        return Ok(items);
    }
    if let Some(entries) = value.to_entries() {
        return Ok(entries.into_iter().map(|(_, value)| value).collect());
    }
    match value.unwrap_signal() {
        Value::Number(n) if n > MAX_ARRAY_LEN as f64 => Err(EvalError::Type("invalid array length".into())),
        Value::Number(n) if n >= 1.0 => Ok((1..=n as usize).map(Value::from).collect()),
        _ => Ok(Vec::new()),
    }
}

fn key_string(key: &Value) -> String {
    match key.unwrap_signal() {
        Value::String(s) => format!("s:{s}"),
        other => format!("v:{}", other.to_display_string()),
    }
}

pub(super) fn bind_for(ctx: &BindContext, node: &Node, directive: &Directive, scope: &Scope) {
    let spec = match ForSpec::parse(&directive.expression) {
        Ok(spec) => spec,
        Err(error) => return ctx.report(node, &directive.attribute, &error),
    };
    let Some(source) = ctx.parse_source(node, &directive.attribute, &spec.source) else {
        return;
    };

    let config = ctx.config();
    let key_attribute = config.key_marker();
    let if_attribute = config.attribute("if");
    let key = match node.attribute(&key_attribute) {
        Some(key) => match ctx.parse_source(node, &key_attribute, &key) {
            Some(expression) => Some(expression),
            None => return,
        },
        None => None,
    };
    if node.has_attribute(&if_attribute) {
        ctx.report(node, &if_attribute, &"ignored on a list element");
    }

    let Some((anchor, template)) = detach(node, "for") else {
        ctx.report(node, &directive.attribute, &"element has no parent");
        return;
    };
    for attribute in [&directive.attribute, &key_attribute, &if_attribute] {
        template.remove_attribute(attribute);
    }
    trace!(item = %spec.item, source = %spec.source, keyed = key.is_some(), "list bound");

    let list = Arc::new(List {
        ctx: ctx.clone(),
        spec,
        scope: scope.clone(),
        anchor,
        template,
        key,
        attribute: directive.attribute.clone(),
    });
    let rows: Arc<Mutex<Vec<Row>>> = Arc::default();

    let effect = {
        let list = Arc::clone(&list);
        let rows = Arc::clone(&rows);
        let source_node = node.clone();
        Effect::tracked(move || {
            let ctx = &list.ctx;
            ctx.guard(&source_node, &list.attribute, || {
                let value = ctx.evaluate(&list.anchor, &list.attribute, &source, &list.scope, Mode::Read);
                let items = iterable(&value).unwrap_or_else(|error| {
                    ctx.report(&list.anchor, &list.attribute, &error);
                    Vec::new()
                });
                ReactiveContext::untracked(|| {
                    let current = std::mem::take(&mut *rows.lock());
                    let next = list.reconcile(current, items);
                    *rows.lock() = next;
                });
            });
        })
    };

    ctx.on_cleanup(move || {
        effect.dispose();
        let rows = std::mem::take(&mut *rows.lock());
        for row in rows {
            row.block.cleanups.run();
        }
    });
}
