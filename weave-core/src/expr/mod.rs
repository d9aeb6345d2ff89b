//! Expression Evaluator
//!
//! A small, sandboxed expression language used by bindings and event
//! handlers. Source text is tokenized, parsed into an [`Expr`] tree and
//! interpreted against a [`Scope`].
//!
//! # Failure policy
//!
//! [`evaluate`] never fails: parse errors, runtime errors, sandbox
//! violations and panics inside host functions all produce
//! [`Value::Undefined`]. Callers that want to log the reason use
//! [`Expression::try_eval`].
//!
//! # Example
//!
//! ```rust
//! use weave_core::expr::evaluate;
//! use weave_core::{Scope, Value};
//!
//! let scope = Scope::from_state(&serde_json::json!({"items": [1, 2, 3, 4, 5]})).unwrap();
//! let result = evaluate("items.filter(x => x > 2).map(x => x * 2)", &scope);
//! assert_eq!(result.to_json(), serde_json::json!([6, 8, 10]));
//!
//! assert_eq!(evaluate("items.constructor", &scope), Value::Undefined);
//! ```

mod ast;
mod builtins;
mod interpreter;
mod lexer;
mod parser;

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use tracing::trace;

use crate::error::{EvalError, ParseError};
use crate::scope::Scope;
use crate::value::Value;

pub use ast::{BinaryOp, Element, Expr, LogicalOp, Property, UnaryOp};
pub use interpreter::{Closure, Mode, MAX_CALL_DEPTH};
pub use lexer::{tokenize, Spanned, Token};
pub use parser::{parse, MAX_DEPTH};
pub use crate::value::is_forbidden_key;

use interpreter::Interpreter;

/// Number of distinct sources kept in the parse cache.
const CACHE_CAPACITY: usize = 1024;

fn cache() -> &'static DashMap<String, Arc<Expr>> {
    static CACHE: OnceLock<DashMap<String, Arc<Expr>>> = OnceLock::new();
    CACHE.get_or_init(|| DashMap::with_capacity(CACHE_CAPACITY))
}

/// A parsed, reusable expression.
#[derive(Debug, Clone)]
pub struct Expression {
    source: Arc<str>,
    ast: Arc<Expr>,
}

impl Expression {
    /// Parse `source`. Successful parses are cached process-wide.
    pub fn parse(source: &str) -> Result<Self, ParseError> {
        let source = source.trim();
        if let Some(ast) = cache().get(source) {
            return Ok(Self {
                source: Arc::from(source),
                ast: Arc::clone(&ast),
            });
        }

        let ast = Arc::new(parse(source)?);
        let cache = cache();
        if cache.len() >= CACHE_CAPACITY {
            cache.clear();
        }
        cache.insert(source.to_string(), Arc::clone(&ast));
        Ok(Self {
            source: Arc::from(source),
            ast,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ast(&self) -> &Expr {
        &self.ast
    }

    /// Evaluate as a binding (read mode). Failures yield `undefined`.
    pub fn eval(&self, scope: &Scope) -> Value {
        self.eval_with(scope, Mode::Read)
    }

    /// Evaluate in `mode`. Failures yield `undefined`.
    pub fn eval_with(&self, scope: &Scope, mode: Mode) -> Value {
        self.try_eval(scope, mode).unwrap_or_else(|error| {
            trace!(expression = %self.source, %error, "evaluation failed");
            Value::Undefined
        })
    }

    /// Evaluate in `mode`, reporting why evaluation failed.
    ///
    /// In read mode the result is read through signals; in write mode it is
    /// returned as is. A panic inside a host function is reported as
    /// [`EvalError::Native`].
    pub fn try_eval(&self, scope: &Scope, mode: Mode) -> Result<Value, EvalError> {
        let interpreter = Interpreter::new(scope, mode);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match mode {
            Mode::Read => interpreter.eval_value(&self.ast),
            Mode::Write => interpreter.eval(&self.ast),
        }));
        match outcome {
            Ok(result) => result,
            Err(payload) => Err(EvalError::Native(panic_message(payload.as_ref()))),
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}

/// Parse and evaluate `source` against `scope` in read mode.
///
/// Never fails; see the module docs.
pub fn evaluate(source: &str, scope: &Scope) -> Value {
    evaluate_with(source, scope, Mode::Read)
}

/// Parse and evaluate `source` in `mode`. Failures yield `undefined`.
pub fn evaluate_with(source: &str, scope: &Scope, mode: Mode) -> Value {
    match Expression::parse(source) {
        Ok(expression) => expression.eval_with(scope, mode),
        Err(error) => {
            trace!(expression = source, %error, "parse failed");
            Value::Undefined
        }
    }
}

/// Parse and evaluate `source` in `mode`, reporting failures.
pub fn try_evaluate(source: &str, scope: &Scope, mode: Mode) -> Result<Value, EvalError> {
    Expression::parse(source)?.try_eval(scope, mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Function;
    use serde_json::json;

    #[test]
    fn failures_collapse_to_undefined() {
        let scope = Scope::new();
        assert_eq!(evaluate("1 +", &scope), Value::Undefined);
        assert_eq!(evaluate("1 == 1", &scope), Value::Undefined);
        assert_eq!(evaluate("nothing.call()", &scope), Value::Undefined);
        assert_eq!(evaluate("{ __proto__: {p:1} }", &scope), Value::Undefined);
    }

    #[test]
    fn try_eval_reports_the_reason() {
        let scope = Scope::new();
        assert!(matches!(try_evaluate("1 +", &scope, Mode::Read), Err(EvalError::Parse(_))));
        assert_eq!(try_evaluate("x.__proto__", &scope, Mode::Read), Err(EvalError::Rejected));
    }

    #[test]
    fn parsed_expressions_are_cached_and_reusable() {
        let first = Expression::parse("  a + 1 ").unwrap();
        let second = Expression::parse("a + 1").unwrap();
        assert_eq!(first.source(), "a + 1");
        assert_eq!(first.ast(), second.ast());

        let scope = Scope::new();
        let a = scope.signal("a", 1);
        assert_eq!(first.eval(&scope), Value::from(2));
        a.set(Value::from(41));
        assert_eq!(first.eval(&scope), Value::from(42));
    }

    #[test]
    fn host_panics_are_contained() {
        let scope = Scope::new();
        scope.insert("boom", Function::native("boom", |_| panic!("kaboom")));
        assert_eq!(
            try_evaluate("boom()", &scope, Mode::Read),
            Err(EvalError::Native("kaboom".into()))
        );
        assert_eq!(evaluate("boom()", &scope), Value::Undefined);
    }

    #[test]
    fn write_mode_returns_raw_handles() {
        let scope = Scope::new();
        let count = scope.signal("count", 2);
        assert_eq!(evaluate_with("count", &scope, Mode::Write), Value::Signal(count.clone()));
        assert_eq!(evaluate_with("count = count + 1", &scope, Mode::Write), Value::from(3));
        assert_eq!(evaluate("count", &scope), Value::from(3));
        assert_eq!(evaluate("[count, 'x']", &scope).to_json(), json!([3, "x"]));
    }
}
