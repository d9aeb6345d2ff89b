//! Dynamic Values
//!
//! [`Value`] is what every scope entry holds and what every expression
//! evaluates to. It mirrors the value space of the expression language:
//! JSON-like primitives and containers plus the reactive handles
//! (signals, computeds, reactive objects) and callable functions.
//!
//! # Equality
//!
//! `PartialEq` for `Value` is strict equality as the expression language
//! defines it: primitives compare by value (`NaN` is never equal to itself)
//! and every reference variant compares by identity. Two separately built
//! arrays with the same contents are *not* equal.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Serialize, Serializer};

use crate::error::EvalError;
use crate::expr::Closure;
use crate::reactive::{Computed, Reactive, Signal};

/// Property names that never resolve, at any depth.
pub const FORBIDDEN_KEYS: [&str; 3] = ["__proto__", "constructor", "prototype"];

/// Whether `key` is one of the sandbox-forbidden property names.
pub fn is_forbidden_key(key: &str) -> bool {
    FORBIDDEN_KEYS.contains(&key)
}

/// Signature of a host-provided function callable from expressions.
pub type NativeFn = dyn Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync;

enum Callable {
    Native { name: String, func: Box<NativeFn> },
    Closure(Closure),
}

/// A callable value: either a host function or an arrow lambda.
#[derive(Clone)]
pub struct Function(Arc<Callable>);

impl Function {
    /// Wrap a host function.
    pub fn native<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        Self(Arc::new(Callable::Native {
            name: name.into(),
            func: Box::new(func),
        }))
    }

    pub(crate) fn closure(closure: Closure) -> Self {
        Self(Arc::new(Callable::Closure(closure)))
    }

    /// The function's name; lambdas are `"anonymous"`.
    pub fn name(&self) -> &str {
        match &*self.0 {
            Callable::Native { name, .. } => name,
            Callable::Closure(_) => "anonymous",
        }
    }

    /// Whether this is a host function rather than a lambda.
    pub fn is_native(&self) -> bool {
        matches!(&*self.0, Callable::Native { .. })
    }

    /// Call the function with positional arguments.
    pub fn call(&self, args: &[Value]) -> Result<Value, EvalError> {
        match &*self.0 {
            Callable::Native { func, .. } => func(args),
            Callable::Closure(closure) => closure.call(args),
        }
    }

    /// Whether both handles point at the same function.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function({})", self.name())
    }
}

/// A dynamically typed value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Arc<str>),
    Array(Arc<Vec<Value>>),
    Object(Arc<IndexMap<String, Value>>),
    Signal(Signal<Value>),
    Computed(Computed<Value>),
    Reactive(Reactive),
    Function(Function),
}

impl Value {
    /// Build a plain array value.
    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Array(Arc::new(items.into_iter().collect()))
    }

    /// Build a plain object value.
    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Object(Arc::new(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    /// Name of the variant, as used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Signal(_) => "signal",
            Value::Computed(_) => "computed",
            Value::Reactive(r) if r.is_array() => "array",
            Value::Reactive(_) => "object",
            Value::Function(_) => "function",
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// `null` or `undefined`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Whether this is a signal or computed handle.
    pub fn is_signal_like(&self) -> bool {
        matches!(self, Value::Signal(_) | Value::Computed(_))
    }

    /// Read through signal and computed handles (tracked).
    pub fn unwrap_signal(&self) -> Value {
        let mut current = self.clone();
        loop {
            current = match current {
                Value::Signal(s) => s.get(),
                Value::Computed(c) => c.get(),
                other => return other,
            };
        }
    }

    /// Read through signal and computed handles without tracking.
    pub fn unwrap_untracked(&self) -> Value {
        let mut current = self.clone();
        loop {
            current = match current {
                Value::Signal(s) => s.get_untracked(),
                Value::Computed(c) => c.get_untracked(),
                other => return other,
            };
        }
    }

    /// Truthiness in the expression language.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Signal(_) | Value::Computed(_) => self.unwrap_signal().truthy(),
            _ => true,
        }
    }

    /// Numeric conversion (`+value`).
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => parse_number(s),
            Value::Array(items) => match items.as_slice() {
                [] => 0.0,
                [single] => single.to_number(),
                _ => f64::NAN,
            },
            Value::Signal(_) | Value::Computed(_) => self.unwrap_signal().to_number(),
            Value::Reactive(r) if r.is_array() => match r.len() {
                0 => 0.0,
                1 => r.get_index(0).to_number(),
                _ => f64::NAN,
            },
            Value::Object(_) | Value::Reactive(_) | Value::Function(_) => f64::NAN,
        }
    }

    /// String conversion (`String(value)`).
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.to_string(),
            Value::Array(items) => join_items(items.iter(), ","),
            Value::Object(_) => "[object Object]".to_string(),
            Value::Signal(_) | Value::Computed(_) => self.unwrap_signal().to_display_string(),
            Value::Reactive(r) if r.is_array() => join_items(r.values().iter(), ","),
            Value::Reactive(_) => "[object Object]".to_string(),
            Value::Function(f) => format!("function {}()", f.name()),
        }
    }

    /// Text rendered into the DOM: `null` and `undefined` become empty.
    pub fn to_text(&self) -> String {
        match self.unwrap_signal() {
            Value::Undefined | Value::Null => String::new(),
            other => other.to_display_string(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_signal(&self) -> Option<&Signal<Value>> {
        match self {
            Value::Signal(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reactive(&self) -> Option<&Reactive> {
        match self {
            Value::Reactive(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Elements of an array-like value (plain or reactive), tracked.
    pub fn to_items(&self) -> Option<Vec<Value>> {
        match self {
            Value::Array(items) => Some(items.as_ref().clone()),
            Value::Reactive(r) if r.is_array() => Some(r.values()),
            Value::Signal(_) | Value::Computed(_) => self.unwrap_signal().to_items(),
            _ => None,
        }
    }

    /// Own enumerable entries of an object-like value (plain or reactive).
    pub fn to_entries(&self) -> Option<Vec<(String, Value)>> {
        match self {
            Value::Object(map) => Some(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
            Value::Reactive(r) if !r.is_array() => Some(r.entries()),
            Value::Signal(_) | Value::Computed(_) => self.unwrap_signal().to_entries(),
            _ => None,
        }
    }

    /// Deep copy into plain data: reactive objects become plain containers
    /// and signals are read (untracked).
    pub fn to_plain(&self) -> Value {
        match self {
            Value::Array(items) => Value::array(items.iter().map(Value::to_plain)),
            Value::Object(map) => Value::object(map.iter().map(|(k, v)| (k.clone(), v.to_plain()))),
            Value::Signal(_) | Value::Computed(_) => self.unwrap_untracked().to_plain(),
            Value::Reactive(r) => r.snapshot(),
            other => other.clone(),
        }
    }

    /// Convert from JSON. Forbidden keys are dropped.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(Arc::from(s.as_str())),
            serde_json::Value::Array(items) => Value::array(items.iter().map(Value::from_json)),
            serde_json::Value::Object(map) => Value::object(
                map.iter()
                    .filter(|(k, _)| !is_forbidden_key(k))
                    .map(|(k, v)| (k.clone(), Value::from_json(v))),
            ),
        }
    }

    /// Convert to JSON, reading signals untracked.
    ///
    /// Follows `JSON.stringify`: non-finite numbers and functions become
    /// `null`, and `undefined` members are omitted from objects.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Undefined | Value::Null | Value::Function(_) => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Array(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .filter(|(_, v)| !v.is_undefined())
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Signal(_) | Value::Computed(_) => self.unwrap_untracked().to_json(),
            Value::Reactive(r) => r.to_json(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Signal(a), Value::Signal(b)) => a.ptr_eq(b),
            (Value::Computed(a), Value::Computed(b)) => a.ptr_eq(b),
            (Value::Reactive(a), Value::Reactive(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

/// Format a number the way the expression language prints it.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }

    let magnitude = n.abs();
    if !(1e-6..1e21).contains(&magnitude) {
        let formatted = format!("{n:e}");
        return match formatted.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
            _ => formatted,
        };
    }
    format!("{n}")
}

/// Parse a string as a number (`Number(s)`): surrounding whitespace is
/// ignored and the empty string is zero.
pub fn parse_number(s: &str) -> f64 {
    let trimmed = s.trim();
    match trimmed {
        "" => 0.0,
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if trimmed.starts_with("0x") || trimmed.starts_with("0X") => {
            u64::from_str_radix(&trimmed[2..], 16).map_or(f64::NAN, |n| n as f64)
        }
        // Rust accepts "inf" and "nan", which are not numbers here.
        _ if trimmed.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => f64::NAN,
        _ => trimmed.parse::<f64>().unwrap_or(f64::NAN),
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
    }
}

fn join_items<'a>(items: impl Iterator<Item = &'a Value>, separator: &str) -> String {
    items
        .map(|item| match item {
            Value::Undefined | Value::Null => String::new(),
            other => other.to_display_string(),
        })
        .collect::<Vec<_>>()
        .join(separator)
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(Arc::new(items))
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(map: IndexMap<String, Value>) -> Self {
        Value::Object(Arc::new(map))
    }
}

impl From<Signal<Value>> for Value {
    fn from(signal: Signal<Value>) -> Self {
        Value::Signal(signal)
    }
}

impl From<Computed<Value>> for Value {
    fn from(computed: Computed<Value>) -> Self {
        Value::Computed(computed)
    }
}

impl From<Reactive> for Value {
    fn from(reactive: Reactive) -> Self {
        Value::Reactive(reactive)
    }
}

impl From<Function> for Value {
    fn from(function: Function) -> Self {
        Value::Function(function)
    }
}

impl From<&serde_json::Value> for Value {
    fn from(json: &serde_json::Value) -> Self {
        Value::from_json(json)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::from_json(&json)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(option: Option<T>) -> Self {
        option.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strict_equality() {
        assert_eq!(Value::from(1), Value::from(1.0));
        assert_eq!(Value::from("a"), Value::from("a".to_string()));
        assert_ne!(Value::Number(f64::NAN), Value::Number(f64::NAN));
        assert_ne!(Value::Null, Value::Undefined);

        let a = Value::array([Value::from(1)]);
        let b = Value::array([Value::from(1)]);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Undefined.truthy());
        assert!(!Value::from(0).truthy());
        assert!(!Value::Number(f64::NAN).truthy());
        assert!(!Value::from("").truthy());
        assert!(Value::from("0").truthy());
        assert!(Value::array([]).truthy());
        assert!(!Value::Signal(Signal::new(Value::from(false))).truthy());
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(format_number(1e21), "1e+21");
        assert_eq!(format_number(1e-7), "1e-7");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn number_parsing() {
        assert_eq!(parse_number(" 42 "), 42.0);
        assert_eq!(parse_number(""), 0.0);
        assert_eq!(parse_number("1e3"), 1000.0);
        assert_eq!(parse_number("0x10"), 16.0);
        assert!(parse_number("abc").is_nan());
        assert!(parse_number("inf").is_nan());
    }

    #[test]
    fn display_strings() {
        assert_eq!(Value::Undefined.to_display_string(), "undefined");
        assert_eq!(Value::Undefined.to_text(), "");
        assert_eq!(
            Value::array([Value::from(1), Value::Null, Value::from("x")]).to_display_string(),
            "1,,x"
        );
        assert_eq!(Value::object([("a", Value::from(1))]).to_display_string(), "[object Object]");
    }

    #[test]
    fn json_conversion() {
        let json = json!({"a": 1, "b": [true, null, "s"], "c": {"d": 2.5}});
        let value = Value::from_json(&json);
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn json_drops_forbidden_keys() {
        let value = Value::from_json(&json!({"__proto__": {"polluted": true}, "ok": 1}));
        assert_eq!(value.to_json(), json!({"ok": 1}));
    }

    #[test]
    fn json_follows_stringify_rules() {
        let value = Value::object([
            ("gone", Value::Undefined),
            ("nan", Value::Number(f64::NAN)),
            ("list", Value::array([Value::Undefined])),
        ]);
        assert_eq!(value.to_json(), json!({"nan": null, "list": [null]}));
    }

    #[test]
    fn unwraps_nested_signals() {
        let inner = Signal::new(Value::from(5));
        let outer = Signal::new(Value::Signal(inner));
        assert_eq!(Value::Signal(outer).unwrap_signal(), Value::from(5));
    }
}
