//! Weave Core
//!
//! This crate provides the runtime for Weave, a small reactive DOM-binding
//! library. It implements:
//!
//! - Reactive primitives (signals, computeds, effects, reactive objects)
//! - A debug dependency graph
//! - A sandboxed expression evaluator for directive attributes
//! - An in-memory document model
//! - The binder, which wires declarative attributes to the reactive graph
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Core reactive primitives and dependency tracking
//! - `graph`: Process-wide dependency graph for inspection
//! - `expr`: Expression lexer, parser and interpreter
//! - `scope`: Name tables the evaluator resolves identifiers in
//! - `dom`: Document nodes, events and an HTML fragment parser
//! - `binder`: Directive scanning, bindings, lifecycle and plugins
//! - `timer`: Schedulers for debounced bindings
//! - `config`: Binder configuration
//!
//! # Example
//!
//! ```rust
//! use weave_core::reactive::{Computed, Effect, Signal};
//!
//! // Create a signal
//! let count = Signal::new(0);
//!
//! // Create a derived value
//! let doubled = {
//!     let count = count.clone();
//!     Computed::tracked(move || count.get() * 2)
//! };
//!
//! // Create an effect
//! let effect = {
//!     let doubled = doubled.clone();
//!     Effect::tracked(move || println!("Doubled: {}", doubled.get()))
//! };
//!
//! // Update the signal
//! count.set(5);
//! // Effect automatically runs, prints: "Doubled: 10"
//! assert_eq!(doubled.get(), 10);
//! effect.dispose();
//! ```

pub mod binder;
pub mod config;
pub mod dom;
pub mod error;
pub mod expr;
pub mod graph;
pub mod reactive;
pub mod scope;
pub mod timer;
pub mod value;

pub use binder::{Binder, Mount, Plugin, PluginContext, PluginRegistry};
pub use config::BinderConfig;
pub use error::{BindError, Error, EvalError, ParseError, PluginError, Result};
pub use expr::{evaluate, Expression, Mode};
pub use scope::{Scope, Target};
pub use value::{Function, Value};
