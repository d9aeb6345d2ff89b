//! Event handlers (`data-on:<event>`) and one-shot initializers
//! (`data-init`).
//!
//! Handler statements run in write mode in a child scope holding `$event`.
//! Modifiers:
//!
//! | Modifier | Effect |
//! |---|---|
//! | `.prevent` | `event.prevent_default()` |
//! | `.stop` | `event.stop_propagation()` |
//! | `.once` | the handler runs at most once |
//! | `.self` | only events dispatched at the element itself |
//! | `.debounce[.<n>ms]` | run the last of a burst |
//! | `.enter`, `.escape`, ... | only keyboard events with that key |

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tracing::trace;

use crate::dom::{Event, ListenerId, Node};
use crate::expr::Mode;
use crate::reactive::ReactiveContext;
use crate::scope::Scope;
use crate::timer::Debouncer;
use crate::value::Value;

use super::directive::Directive;
use super::BindContext;

const KEY_MODIFIERS: [(&str, &[&str]); 10] = [
    ("enter", &["Enter"]),
    ("escape", &["Escape", "Esc"]),
    ("esc", &["Escape", "Esc"]),
    ("space", &[" ", "Spacebar"]),
    ("tab", &["Tab"]),
    ("delete", &["Delete", "Backspace"]),
    ("up", &["ArrowUp"]),
    ("down", &["ArrowDown"]),
    ("left", &["ArrowLeft"]),
    ("right", &["ArrowRight"]),
];

/// Whether `event` passes the key filters among `modifiers`. No key
/// modifier means every event passes.
fn key_matches(modifiers: &[String], event: &Event) -> bool {
    let mut filters = KEY_MODIFIERS
        .iter()
        .filter(|(name, _)| modifiers.iter().any(|m| m == name))
        .peekable();
    if filters.peek().is_none() {
        return true;
    }
    let Some(key) = event.key() else {
        return false;
    };
    filters.any(|(_, keys)| keys.iter().any(|k| k.eq_ignore_ascii_case(key)))
}

pub(super) fn bind_event(ctx: &BindContext, node: &Node, directive: &Directive, scope: &Scope) {
    let Some(kind) = directive.argument.clone() else {
        ctx.report(node, &directive.attribute, &"event handlers need an event name");
        return;
    };
    let Some(expression) = ctx.parse(node, directive) else {
        return;
    };

    let debouncer = directive
        .debounce(ctx.config().handler_debounce())
        .map(|delay| Arc::new(Debouncer::new(ctx.scheduler(), delay)));
    let fired = Arc::new(AtomicBool::new(false));
    let registered: Arc<OnceLock<ListenerId>> = Arc::default();

    let handler = {
        let ctx = ctx.clone();
        let scope = scope.clone();
        let weak = node.downgrade();
        let directive = directive.clone();
        let debouncer = debouncer.clone();
        let registered = Arc::clone(&registered);
        move |event: &Event| {
            let Some(node) = weak.upgrade() else {
                return;
            };
            if directive.has_modifier("self") && !event.target().is_some_and(|target| target.ptr_eq(&node)) {
                return;
            }
            if !key_matches(&directive.modifiers, event) {
                return;
            }
            if directive.has_modifier("once") {
                if fired.swap(true, Ordering::AcqRel) {
                    return;
                }
                if let Some(id) = registered.get() {
                    node.remove_event_listener(*id);
                }
            }
            if directive.has_modifier("prevent") {
                event.prevent_default();
            }
            if directive.has_modifier("stop") {
                event.stop_propagation();
            }

            let payload = event.to_value();
            let run = {
                let ctx = ctx.clone();
                let scope = scope.clone();
                let expression = expression.clone();
                let attribute = directive.attribute.clone();
                move || {
                    let handler_scope = scope.child();
                    handler_scope.insert("$event", payload);
                    ctx.guard(&node, &attribute, || {
                        ReactiveContext::untracked(|| {
                            ctx.evaluate(&node, &attribute, &expression, &handler_scope, Mode::Write)
                        })
                    });
                }
            };
            match &debouncer {
                Some(debouncer) => debouncer.call(run),
                None => run(),
            }
        }
    };

    let id = node.add_event_listener(&kind, handler);
    // Set once, right after registration.
    let _ = registered.set(id);

    let weak = node.downgrade();
    ctx.on_cleanup(move || {
        if let Some(debouncer) = debouncer {
            debouncer.cancel();
        }
        if let Some(node) = weak.upgrade() {
            node.remove_event_listener(id);
        }
    });
}

/// `data-init`: run once at mount, in write mode.
pub(super) fn bind_init(ctx: &BindContext, node: &Node, directive: &Directive, scope: &Scope) {
    let Some(expression) = ctx.parse(node, directive) else {
        return;
    };
    let result: Value = ReactiveContext::untracked(|| {
        ctx.evaluate(node, &directive.attribute, &expression, scope, Mode::Write)
    });
    trace!(element = %node.describe(), result = %result.to_display_string(), "init ran");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modifiers(list: &[&str]) -> Vec<String> {
        list.iter().map(|m| m.to_string()).collect()
    }

    #[test]
    fn key_filters() {
        let enter = Event::new("keydown").with_key("Enter");
        let plain = Event::new("click");

        assert!(key_matches(&modifiers(&["prevent"]), &plain));
        assert!(key_matches(&modifiers(&["enter"]), &enter));
        assert!(!key_matches(&modifiers(&["escape"]), &enter));
        assert!(!key_matches(&modifiers(&["enter"]), &plain));
        assert!(key_matches(&modifiers(&["escape", "enter"]), &enter));
    }
}
