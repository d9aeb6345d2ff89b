//! Two-way form bindings (`data-model`).

use std::sync::Arc;

use crate::dom::Node;
use crate::error::BindError;
use crate::reactive::{Effect, ReactiveContext};
use crate::scope::Scope;
use crate::timer::Debouncer;
use crate::value::{parse_number, Value};

use super::directive::Directive;
use super::BindContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Text,
    Checkbox,
    Radio,
    Select,
}

impl Control {
    fn of(node: &Node) -> Self {
        if node.tag_name() == Some("select") {
            return Control::Select;
        }
        match node.attribute("type").map(|t| t.to_ascii_lowercase()).as_deref() {
            Some("checkbox") => Control::Checkbox,
            Some("radio") => Control::Radio,
            _ => Control::Text,
        }
    }

    /// `change` for controls that commit on selection, `input` otherwise.
    fn event(self, lazy: bool) -> &'static str {
        match self {
            Control::Text if !lazy => "input",
            _ => "change",
        }
    }
}

fn contains_text(items: &[Value], text: &str) -> bool {
    items.iter().any(|item| item.to_text() == text)
}

/// Push the model value into the control.
fn render(node: &Node, control: Control, value: &Value) {
    match control {
        Control::Checkbox => {
            let checked = match value.to_items() {
                Some(items) => contains_text(&items, &node.value()),
                None => value.truthy(),
            };
            node.set_checked(checked);
        }
        Control::Radio => node.set_checked(value.to_text() == node.value()),
        Control::Select => {
            let text = value.to_text();
            node.set_value(text.clone());
            for option in node.query_all(|n| n.tag_name() == Some("option")) {
                if option.value() == text {
                    option.set_attribute("selected", "");
                } else {
                    option.remove_attribute("selected");
                }
            }
        }
        Control::Text => {
            let text = value.to_text();
            if node.value() != text {
                node.set_value(text);
            }
        }
    }
}

/// Read the control into the value to write, given the current model value.
fn read(node: &Node, control: Control, directive: &Directive, current: &Value) -> Option<Value> {
    let text = || {
        let raw = node.value();
        let raw = if directive.has_modifier("trim") { raw.trim().to_string() } else { raw };
        if directive.has_modifier("number") {
            let n = parse_number(&raw);
            if !n.is_nan() {
                return Value::Number(n);
            }
        }
        Value::from(raw)
    };

    match control {
        Control::Checkbox => match current.to_items() {
            Some(mut items) => {
                let own = node.value();
                let present = contains_text(&items, &own);
                match (node.checked(), present) {
                    (true, false) => items.push(text()),
                    (false, true) => items.retain(|item| item.to_text() != own),
                    _ => return None,
                }
                Some(Value::array(items.iter().map(Value::to_plain)))
            }
            None => Some(Value::Bool(node.checked())),
        },
        Control::Radio if !node.checked() => None,
        _ => Some(text()),
    }
}

pub(super) fn bind_model(ctx: &BindContext, node: &Node, directive: &Directive, scope: &Scope) {
    let path = directive.expression.as_str();
    let Some(target) = scope.resolve_target(path) else {
        ctx.report(node, &directive.attribute, &BindError::ModelTarget(path.to_string()));
        return;
    };
    let control = Control::of(node);

    let effect = {
        let ctx = ctx.clone();
        let target = target.clone();
        let node = node.clone();
        let attribute = directive.attribute.clone();
        Effect::tracked(move || {
            ctx.guard(&node, &attribute, || {
                let value = target.get();
                ReactiveContext::untracked(|| render(&node, control, &value));
            });
        })
    };

    let debouncer = directive
        .debounce(ctx.config().model_debounce())
        .map(|delay| Arc::new(Debouncer::new(ctx.scheduler(), delay)));

    let listener = {
        let ctx = ctx.clone();
        let weak = node.downgrade();
        let directive = directive.clone();
        let debouncer = debouncer.clone();
        node.add_event_listener(control.event(directive.has_modifier("lazy")), move |_| {
            let Some(node) = weak.upgrade() else {
                return;
            };
            let write = {
                let target = target.clone();
                let current = ReactiveContext::untracked(|| target.get());
                let Some(value) = ctx.guard(&node, &directive.attribute, || read(&node, control, &directive, &current))
                    .flatten()
                else {
                    return;
                };
                move || {
                    ReactiveContext::untracked(|| target.set(value));
                }
            };
            match &debouncer {
                Some(debouncer) => debouncer.call(write),
                None => {
                    ctx.guard(&node, &directive.attribute, write);
                }
            }
        })
    };

    let weak = node.downgrade();
    ctx.on_cleanup(move || {
        effect.dispose();
        if let Some(debouncer) = debouncer {
            debouncer.cancel();
        }
        if let Some(node) = weak.upgrade() {
            node.remove_event_listener(listener);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BinderConfig;

    fn directive(attribute: &str) -> Directive {
        Directive::parse(&BinderConfig::default(), attribute, "x").unwrap()
    }

    #[test]
    fn controls_by_type() {
        let input = Node::element("input");
        assert_eq!(Control::of(&input), Control::Text);
        input.set_attribute("type", "CheckBox");
        assert_eq!(Control::of(&input), Control::Checkbox);
        assert_eq!(Control::of(&Node::element("select")), Control::Select);
        assert_eq!(Control::Text.event(false), "input");
        assert_eq!(Control::Text.event(true), "change");
        assert_eq!(Control::Radio.event(false), "change");
    }

    #[test]
    fn number_and_trim_modifiers() {
        let input = Node::element("input");
        input.set_value("  42 ");
        let value = read(&input, Control::Text, &directive("data-model.trim.number"), &Value::Undefined);
        assert_eq!(value, Some(Value::Number(42.0)));

        input.set_value("abc");
        let value = read(&input, Control::Text, &directive("data-model.number"), &Value::Undefined);
        assert_eq!(value, Some(Value::from("abc")));
    }

    #[test]
    fn checkbox_array_membership() {
        let input = Node::element("input");
        input.set_value("b");
        input.set_checked(true);
        let current = Value::array([Value::from("a")]);

        let next = read(&input, Control::Checkbox, &directive("data-model"), &current).unwrap();
        assert_eq!(next.to_items().unwrap(), vec![Value::from("a"), Value::from("b")]);

        render(&input, Control::Checkbox, &current);
        assert!(!input.checked());
    }
}
