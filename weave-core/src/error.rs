//! Error Types
//!
//! Every fallible layer of the crate has its own error enum:
//!
//! - [`ParseError`]: the expression lexer and parser.
//! - [`EvalError`]: the expression interpreter.
//! - [`BindError`]: mounting a root and setting up individual bindings.
//! - [`PluginError`]: failures reported by plugin handlers.
//!
//! Evaluation errors never escape [`crate::expr::evaluate`]; they collapse to
//! `undefined`. The binder logs them at the binding boundary and keeps going.

use thiserror::Error;

/// Errors produced while tokenizing or parsing an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("expression is empty")]
    Empty,

    #[error("unexpected character {found:?} at offset {offset}")]
    UnexpectedChar { found: char, offset: usize },

    #[error("unterminated string literal starting at offset {offset}")]
    UnterminatedString { offset: usize },

    #[error("invalid escape sequence at offset {offset}")]
    InvalidEscape { offset: usize },

    #[error("invalid number literal at offset {offset}")]
    InvalidNumber { offset: usize },

    #[error("unexpected `{found}` at offset {offset}, expected {expected}")]
    UnexpectedToken {
        found: String,
        expected: &'static str,
        offset: usize,
    },

    #[error("unexpected end of expression, expected {expected}")]
    UnexpectedEnd { expected: &'static str },

    #[error("invalid assignment target at offset {offset}")]
    InvalidAssignmentTarget { offset: usize },

    #[error("expression nesting exceeds {limit} levels")]
    TooDeep { limit: usize },
}

/// Errors produced while evaluating a parsed expression.
///
/// Sandbox violations are reported as [`EvalError::Rejected`], whose message
/// deliberately does not say which name or path was refused.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("expression rejected")]
    Rejected,

    #[error("{0} is not callable")]
    NotCallable(String),

    #[error("unknown method `{method}` on {receiver}")]
    UnknownMethod {
        receiver: &'static str,
        method: String,
    },

    #[error("{0} is only allowed in event handlers")]
    ReadOnly(&'static str),

    #[error("invalid assignment target")]
    InvalidTarget,

    #[error("type error: {0}")]
    Type(String),

    #[error("call depth exceeds {0}")]
    TooDeep(usize),

    #[error("native function failed: {0}")]
    Native(String),
}

/// Error reported by a plugin handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct PluginError {
    message: String,
}

impl PluginError {
    /// Create a plugin error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors produced while mounting a root or setting up a binding.
#[derive(Debug, Error)]
pub enum BindError {
    #[error("invalid declarative state: {0}")]
    State(#[source] serde_json::Error),

    #[error("declarative state must be a JSON object")]
    StateNotObject,

    #[error("invalid list expression `{0}`")]
    ForSyntax(String),

    #[error("`{0}` is not a writable model target")]
    ModelTarget(String),

    #[error("expression `{expression}` failed to parse: {source}")]
    Parse {
        expression: String,
        #[source]
        source: ParseError,
    },

    #[error("root must be an element node")]
    NotAnElement,

    #[error("element is already mounted")]
    AlreadyMounted,

    #[error("plugin `{name}` failed: {source}")]
    Plugin {
        name: String,
        #[source]
        source: PluginError,
    },

    #[error("binding panicked")]
    Panicked,
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Bind(#[from] BindError),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result alias used by the public API.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_message_does_not_leak_names() {
        let message = EvalError::Rejected.to_string();
        assert_eq!(message, "expression rejected");
        assert!(!message.contains("proto"));
    }

    #[test]
    fn parse_error_converts_into_crate_error() {
        let err: Error = ParseError::Empty.into();
        assert!(matches!(err, Error::Parse(ParseError::Empty)));
    }

    #[test]
    fn bind_error_reports_plugin_name() {
        let err = BindError::Plugin {
            name: "persist".into(),
            source: PluginError::new("storage unavailable"),
        };
        assert_eq!(err.to_string(), "plugin `persist` failed: storage unavailable");
    }
}
