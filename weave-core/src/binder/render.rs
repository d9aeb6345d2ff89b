//! One-facet renderers: text, markup, visibility, classes, styles and
//! attributes.

use std::sync::Arc;

use indexmap::IndexSet;
use parking_lot::Mutex;

use crate::dom::Node;
use crate::scope::Scope;
use crate::value::{format_number, Value};

use super::directive::{to_kebab_case, Directive};
use super::BindContext;

pub(super) fn bind_text(ctx: &BindContext, node: &Node, directive: &Directive, scope: &Scope) {
    ctx.watch(node, directive, scope, |node, value| node.set_text_content(&value.to_text()));
}

pub(super) fn bind_html(ctx: &BindContext, node: &Node, directive: &Directive, scope: &Scope) {
    ctx.watch(node, directive, scope, |node, value| node.set_inner_html(&value.to_text()));
}

pub(super) fn bind_show(ctx: &BindContext, node: &Node, directive: &Directive, scope: &Scope) {
    ctx.watch(node, directive, scope, |node, value| {
        if value.truthy() {
            if node.style("display").as_deref() == Some("none") {
                node.remove_style("display");
            }
        } else {
            node.set_style("display", "none");
        }
    });
}

/// `data-class="{ active: on }"`, `data-class="'a b'"`, `data-class="['a', x]"`
/// or `data-class:active="on"`.
///
/// Only classes this binding added are ever removed; static classes stay.
pub(super) fn bind_class(ctx: &BindContext, node: &Node, directive: &Directive, scope: &Scope) {
    if let Some(name) = directive.argument.clone() {
        ctx.watch(node, directive, scope, move |node, value| node.toggle_class(&name, value.truthy()));
        return;
    }

    let applied: Arc<Mutex<IndexSet<String>>> = Arc::default();
    ctx.watch(node, directive, scope, move |node, value| {
        let wanted = class_names(&value);
        let mut applied = applied.lock();
        for stale in applied.iter().filter(|c| !wanted.contains(*c)) {
            node.remove_class(stale);
        }
        for class in &wanted {
            node.add_class(class);
        }
        *applied = wanted;
    });
}

fn class_names(value: &Value) -> IndexSet<String> {
    let value = value.unwrap_signal();
    if let Some(items) = value.to_items() {
        return items
            .iter()
            .flat_map(|item| class_names(item))
            .collect();
    }
    if let Some(entries) = value.to_entries() {
        return entries
            .into_iter()
            .filter(|(_, on)| on.unwrap_signal().truthy())
            .flat_map(|(names, _)| names.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .collect();
    }
    value.to_text().split_whitespace().map(str::to_string).collect()
}

/// `data-style="{ fontSize: size + 'px' }"` or `data-style:color="c"`.
pub(super) fn bind_style(ctx: &BindContext, node: &Node, directive: &Directive, scope: &Scope) {
    if let Some(property) = directive.argument.clone() {
        ctx.watch(node, directive, scope, move |node, value| {
            match style_value(&value) {
                Some(text) => node.set_style(&property, &text),
                None => node.remove_style(&property),
            }
        });
        return;
    }

    let applied: Arc<Mutex<IndexSet<String>>> = Arc::default();
    ctx.watch(node, directive, scope, move |node, value| {
        let declarations: Vec<(String, String)> = value
            .to_entries()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(prop, value)| Some((to_kebab_case(&prop), style_value(&value)?)))
            .collect();

        let mut applied = applied.lock();
        for stale in applied.iter().filter(|p| !declarations.iter().any(|(prop, _)| prop == *p)) {
            node.remove_style(stale);
        }
        for (prop, text) in &declarations {
            node.set_style(prop, text);
        }
        *applied = declarations.into_iter().map(|(prop, _)| prop).collect();
    });
}

fn style_value(value: &Value) -> Option<String> {
    match value.unwrap_signal() {
        Value::Undefined | Value::Null | Value::Bool(false) => None,
        Value::Number(n) => Some(format_number(n)),
        other => Some(other.to_text()).filter(|text| !text.is_empty()),
    }
}

/// `data-attr:<name>="expr"`. `false`, `null` and `undefined` remove the
/// attribute, `true` sets it empty. `value` and `checked` also update the
/// matching form property.
pub(super) fn bind_attr(ctx: &BindContext, node: &Node, directive: &Directive, scope: &Scope) {
    let Some(name) = directive.argument.clone() else {
        ctx.report(node, &directive.attribute, &"attribute bindings need a name");
        return;
    };
    ctx.watch(node, directive, scope, move |node, value| {
        let value = value.unwrap_signal();
        match name.as_str() {
            "checked" => node.set_checked(value.truthy()),
            "value" => node.set_value(value.to_text()),
            _ => {}
        }
        match value {
            Value::Undefined | Value::Null | Value::Bool(false) => {
                node.remove_attribute(&name);
            }
            Value::Bool(true) => node.set_attribute(&name, ""),
            other => node.set_attribute(&name, other.to_text()),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_names_from_every_shape() {
        let object = Value::object([("a", Value::Bool(true)), ("b c", Value::Bool(true)), ("d", Value::Null)]);
        assert_eq!(class_names(&object).into_iter().collect::<Vec<_>>(), vec!["a", "b", "c"]);

        let list = Value::array([Value::from("x y"), object]);
        assert_eq!(class_names(&list).len(), 5);

        assert!(class_names(&Value::Undefined).is_empty());
        assert_eq!(class_names(&Value::from(" p  q ")).len(), 2);
    }

    #[test]
    fn style_values() {
        assert_eq!(style_value(&Value::from(12)), Some("12".to_string()));
        assert_eq!(style_value(&Value::from("red")), Some("red".to_string()));
        assert_eq!(style_value(&Value::Bool(false)), None);
        assert_eq!(style_value(&Value::from("")), None);
    }
}
