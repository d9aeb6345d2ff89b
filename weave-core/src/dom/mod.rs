//! In-memory Document Model
//!
//! The binder works against this document model: elements, text and comment
//! nodes with attributes, form properties (`value`, `checked`), a class list,
//! inline style and bubbling event dispatch. Roots can be built by hand or
//! parsed from markup with [`Node::parse`].
//!
//! Nodes are shared handles (`Arc` + `parking_lot` locks). Every node keeps
//! a mutation counter ([`Node::version`]) so callers can assert that nothing
//! touched a subtree.

mod event;
pub mod html;
mod node;

pub use event::{Event, ListenerId};
pub use node::{Node, NodeType, WeakNode, VOID_ELEMENTS};
