//! Tree-walking interpreter with sandbox checks.
//!
//! # Modes
//!
//! Bindings evaluate in [`Mode::Read`]: assignment, `.set(...)` and array
//! mutators are refused. Event handlers and `init` evaluate in
//! [`Mode::Write`].
//!
//! # Signals
//!
//! Identifiers resolve to whatever the scope holds. Signals and computeds
//! are read (tracked) wherever a plain value is needed: operands, member
//! chains, builtin arguments and the final result in read mode. Method calls
//! named `get`/`set` dispatch on the signal itself.
//!
//! # Sandbox
//!
//! `__proto__`, `constructor` and `prototype` are refused by every access
//! form and as object literal keys. A refusal is an [`EvalError::Rejected`],
//! which makes the whole evaluation fail. `Function` and `eval` always
//! resolve to `undefined`.

use std::cell::Cell;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::EvalError;
use crate::reactive::MAX_ARRAY_LEN;
use crate::scope::Scope;
use crate::value::{is_forbidden_key, Function, Value};

use super::ast::{BinaryOp, Element, Expr, LogicalOp, Property, UnaryOp};
use super::builtins;

/// Maximum nesting of lambda calls.
pub const MAX_CALL_DEPTH: usize = 128;

/// Names that never resolve to anything.
const BLOCKED_GLOBALS: [&str; 2] = ["Function", "eval"];

thread_local! {
    static CALL_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// What an evaluation is allowed to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    /// Pure reads, used by bindings.
    #[default]
    Read,
    /// Reads plus writes, used by event handlers and `init`.
    Write,
}

type EvalResult = Result<Value, EvalError>;

/// An arrow lambda together with the scope it was created in.
#[derive(Clone)]
pub struct Closure {
    params: Arc<[String]>,
    body: Arc<Expr>,
    scope: Scope,
    mode: Mode,
}

impl Closure {
    pub(crate) fn call(&self, args: &[Value]) -> EvalResult {
        let _depth = CallDepth::enter()?;
        let scope = self.scope.child();
        for (index, param) in self.params.iter().enumerate() {
            scope.insert(param.clone(), args.get(index).cloned().unwrap_or_default());
        }
        Interpreter::new(&scope, self.mode).eval_value(&self.body)
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closure")
            .field("params", &self.params)
            .field("mode", &self.mode)
            .finish()
    }
}

struct CallDepth;

impl CallDepth {
    fn enter() -> Result<Self, EvalError> {
        CALL_DEPTH.with(|depth| {
            if depth.get() >= MAX_CALL_DEPTH {
                return Err(EvalError::TooDeep(MAX_CALL_DEPTH));
            }
            depth.set(depth.get() + 1);
            Ok(CallDepth)
        })
    }
}

impl Drop for CallDepth {
    fn drop(&mut self) {
        CALL_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Evaluates syntax trees against a scope.
pub(crate) struct Interpreter<'a> {
    scope: &'a Scope,
    mode: Mode,
}

impl<'a> Interpreter<'a> {
    pub(crate) fn new(scope: &'a Scope, mode: Mode) -> Self {
        Self { scope, mode }
    }

    pub(crate) fn mode(&self) -> Mode {
        self.mode
    }

    /// Evaluate and read through signals.
    pub(crate) fn eval_value(&self, expr: &Expr) -> EvalResult {
        Ok(self.eval(expr)?.unwrap_signal())
    }

    /// Evaluate, leaving signal handles as they are.
    pub(crate) fn eval(&self, expr: &Expr) -> EvalResult {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Ident(name) => self.ident(name),
            Expr::Array(elements) => Ok(Value::from(self.elements(elements, true)?)),
            Expr::Object(properties) => self.object(properties),
            Expr::Lambda { params, body } => Ok(Value::Function(Function::closure(Closure {
                params: Arc::clone(params),
                body: Arc::clone(body),
                scope: self.scope.clone(),
                mode: self.mode,
            }))),
            Expr::Member { object, name } => {
                let key = checked_key(name)?;
                let object = self.eval_value(object)?;
                Ok(get_member(&object, key))
            }
            Expr::Index { object, index } => {
                let object = self.eval_value(object)?;
                let key = self.eval_value(index)?;
                self.index(&object, &key)
            }
            Expr::Call { callee, args } => self.call(callee, args),
            Expr::Unary { op, operand } => {
                let value = self.eval_value(operand)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!value.truthy()),
                    UnaryOp::Neg => Value::Number(-value.to_number()),
                    UnaryOp::Plus => Value::Number(value.to_number()),
                })
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval_value(left)?;
                let right = self.eval_value(right)?;
                Ok(binary(*op, &left, &right))
            }
            Expr::Logical { op, left, right } => {
                let left = self.eval_value(left)?;
                let short_circuit = match op {
                    LogicalOp::And => !left.truthy(),
                    LogicalOp::Or => left.truthy(),
                    LogicalOp::Nullish => !left.is_nullish(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval_value(right)
                }
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval_value(test)?.truthy() {
                    self.eval(consequent)
                } else {
                    self.eval(alternate)
                }
            }
            Expr::Assign { target, value } => {
                if self.mode == Mode::Read {
                    return Err(EvalError::ReadOnly("assignment"));
                }
                let value = self.eval_value(value)?;
                self.assign(target, value.clone())?;
                Ok(value)
            }
            Expr::Sequence(items) => {
                let mut last = Value::Undefined;
                for item in items {
                    last = self.eval(item)?;
                }
                Ok(last)
            }
        }
    }

    fn ident(&self, name: &str) -> EvalResult {
        if is_forbidden_key(name) {
            return Err(EvalError::Rejected);
        }
        if BLOCKED_GLOBALS.contains(&name) {
            return Ok(Value::Undefined);
        }
        Ok(self.scope.get(name).unwrap_or_default())
    }

    fn index(&self, object: &Value, key: &Value) -> EvalResult {
        if let Value::Number(n) = key {
            if let Some(index) = as_index(*n) {
                return Ok(get_index(object, index));
            }
        }
        let key = key.to_display_string();
        let key = checked_key(&key)?;
        Ok(get_member(object, key))
    }

    /// Evaluate list items, expanding spreads.
    fn elements(&self, elements: &[Element], unwrap: bool) -> Result<Vec<Value>, EvalError> {
        let mut out = Vec::with_capacity(elements.len());
        for element in elements {
            match element {
                Element::Item(expr) if unwrap => out.push(self.eval_value(expr)?),
                Element::Item(expr) => out.push(self.eval(expr)?),
                Element::Spread(expr) => {
                    let value = self.eval_value(expr)?;
                    match spread_items(&value) {
                        Some(items) => out.extend(items),
                        None => {
                            return Err(EvalError::Type(format!("{} is not iterable", value.type_name())))
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    fn object(&self, properties: &[Property]) -> EvalResult {
        let mut map = IndexMap::with_capacity(properties.len());
        for property in properties {
            match property {
                Property::Static { key, value } => {
                    let key = checked_key(key)?;
                    let value = self.eval_value(value)?;
                    map.insert(key.to_string(), value);
                }
                Property::Computed { key, value } => {
                    let key = self.eval_value(key)?.to_display_string();
                    checked_key(&key)?;
                    let value = self.eval_value(value)?;
                    map.insert(key, value);
                }
                Property::Spread(source) => {
                    let source = self.eval_value(source)?;
                    for (key, value) in spread_entries(&source) {
                        map.insert(key, value);
                    }
                }
            }
        }
        Ok(Value::Object(Arc::new(map)))
    }

    fn call(&self, callee: &Expr, args: &[Element]) -> EvalResult {
        let (receiver, name) = match callee {
            Expr::Member { object, name } => (object, checked_key(name)?.to_string()),
            Expr::Index { object, index } => {
                let key = self.eval_value(index)?.to_display_string();
                checked_key(&key)?;
                (object, key)
            }
            _ => {
                let function = self.eval_value(callee)?;
                return self.call_function(&function, args);
            }
        };

        let raw = self.eval(receiver)?;
        match (&raw, name.as_str()) {
            (Value::Signal(signal), "get") => return Ok(signal.get()),
            (Value::Computed(computed), "get") => return Ok(computed.get()),
            (Value::Signal(signal), "set") => {
                if self.mode == Mode::Read {
                    return Err(EvalError::ReadOnly("set"));
                }
                let value = self.elements(args, true)?.into_iter().next().unwrap_or_default();
                signal.set(value);
                return Ok(Value::Undefined);
            }
            (Value::Computed(_), "set") => return Err(EvalError::Type("computed values are read-only".into())),
            _ => {}
        }

        let receiver = raw.unwrap_signal();
        if let Some(Value::Function(function)) = own_property(&receiver, &name) {
            return self.invoke(&function, args);
        }
        let args = self.elements(args, true)?;
        builtins::call_method(self, &receiver, &name, &args)
    }

    fn call_function(&self, callee: &Value, args: &[Element]) -> EvalResult {
        match callee {
            Value::Function(function) => self.invoke(function, args),
            other => Err(EvalError::NotCallable(other.type_name().to_string())),
        }
    }

    /// Call a function value. Host functions called from handlers receive
    /// signal arguments as handles so they can write to them.
    fn invoke(&self, function: &Function, args: &[Element]) -> EvalResult {
        let unwrap = self.mode == Mode::Read || !function.is_native();
        let args = self.elements(args, unwrap)?;
        function.call(&args)
    }

    fn assign(&self, target: &Expr, value: Value) -> Result<(), EvalError> {
        match target {
            Expr::Ident(name) => {
                if is_forbidden_key(name) || BLOCKED_GLOBALS.contains(&name.as_str()) {
                    return Err(EvalError::Rejected);
                }
                match self.scope.get(name) {
                    Some(Value::Signal(signal)) => {
                        signal.set(value);
                        Ok(())
                    }
                    Some(Value::Reactive(object)) => {
                        if object.replace(&value) || is_container(&value) {
                            Ok(())
                        } else {
                            Err(EvalError::Type(format!("cannot replace {name} with a {}", value.type_name())))
                        }
                    }
                    Some(Value::Computed(_)) => Err(EvalError::Type("computed values are read-only".into())),
                    _ => Err(EvalError::InvalidTarget),
                }
            }
            Expr::Member { object, name } => {
                let key = checked_key(name)?;
                let object = self.eval_value(object)?;
                set_member(&object, key, value)
            }
            Expr::Index { object, index } => {
                let object = self.eval_value(object)?;
                let key = self.eval_value(index)?;
                if let (Value::Reactive(array), Value::Number(n)) = (&object, &key) {
                    if let Some(index) = as_index(*n).filter(|_| array.is_array()) {
                        check_array_length(index as f64 + 1.0)?;
                        array.set_index(index, value);
                        return Ok(());
                    }
                }
                let key = key.to_display_string();
                let key = checked_key(&key)?;
                set_member(&object, key, value)
            }
            _ => Err(EvalError::InvalidTarget),
        }
    }
}

fn checked_key(key: &str) -> Result<&str, EvalError> {
    if is_forbidden_key(key) {
        Err(EvalError::Rejected)
    } else {
        Ok(key)
    }
}

fn check_array_length(length: f64) -> Result<(), EvalError> {
    if length > MAX_ARRAY_LEN as f64 {
        Err(EvalError::Type("invalid array length".into()))
    } else {
        Ok(())
    }
}

fn as_index(n: f64) -> Option<usize> {
    (n >= 0.0 && n.fract() == 0.0 && n < usize::MAX as f64).then_some(n as usize)
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Array(_) | Value::Object(_) | Value::Reactive(_))
}

/// Read `object.key` on an already-unwrapped value. Missing members and
/// members of `null`/`undefined` read as `undefined`.
pub(crate) fn get_member(object: &Value, key: &str) -> Value {
    match object {
        Value::Reactive(r) => r.get(key),
        Value::Object(map) => map.get(key).cloned().unwrap_or_default(),
        Value::Array(items) => match key {
            "length" => Value::from(items.len()),
            _ => key
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get(i).cloned())
                .unwrap_or_default(),
        },
        Value::String(s) => match key {
            "length" => Value::from(s.chars().count()),
            _ => key.parse::<usize>().map_or(Value::Undefined, |i| char_at(s, i)),
        },
        _ => Value::Undefined,
    }
}

fn get_index(object: &Value, index: usize) -> Value {
    match object {
        Value::Reactive(r) if r.is_array() => r.get_index(index),
        Value::Array(items) => items.get(index).cloned().unwrap_or_default(),
        Value::String(s) => char_at(s, index),
        other => get_member(other, &index.to_string()),
    }
}

fn char_at(s: &str, index: usize) -> Value {
    s.chars().nth(index).map_or(Value::Undefined, |c| Value::from(c.to_string()))
}

/// An own property of an object-like value, without tracking side effects
/// beyond the read itself.
fn own_property(object: &Value, key: &str) -> Option<Value> {
    match object {
        Value::Reactive(r) if !r.is_array() => Some(r.get(key)),
        Value::Object(map) => map.get(key).cloned(),
        _ => None,
    }
}

fn set_member(object: &Value, key: &str, value: Value) -> Result<(), EvalError> {
    match object {
        Value::Reactive(r) => {
            if r.is_array() {
                match key {
                    "length" => check_array_length(value.to_number())?,
                    _ => {
                        if let Ok(index) = key.parse::<f64>() {
                            check_array_length(index + 1.0)?;
                        }
                    }
                }
            }
            // A signal stored in a slot is written through.
            if let Value::Signal(signal) = r.get(key) {
                signal.set(value);
            } else {
                r.set(key, value);
            }
            Ok(())
        }
        _ => Err(EvalError::InvalidTarget),
    }
}

/// Items produced by `...value` in an array or argument list.
fn spread_items(value: &Value) -> Option<Vec<Value>> {
    match value {
        Value::String(s) => Some(s.chars().map(|c| Value::from(c.to_string())).collect()),
        other => other.to_items(),
    }
}

/// Entries produced by `...value` in an object literal.
fn spread_entries(value: &Value) -> Vec<(String, Value)> {
    if let Some(entries) = value.to_entries() {
        return entries;
    }
    match spread_items(value) {
        Some(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        None => Vec::new(),
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    let num = |f: fn(f64, f64) -> f64| Value::Number(f(left.to_number(), right.to_number()));
    match op {
        BinaryOp::Add => {
            if is_stringish(left) || is_stringish(right) {
                let mut out = left.to_display_string();
                out.push_str(&right.to_display_string());
                Value::from(out)
            } else {
                num(|a, b| a + b)
            }
        }
        BinaryOp::Sub => num(|a, b| a - b),
        BinaryOp::Mul => num(|a, b| a * b),
        BinaryOp::Div => num(|a, b| a / b),
        BinaryOp::Rem => num(|a, b| a % b),
        BinaryOp::StrictEq => Value::Bool(left == right),
        BinaryOp::StrictNe => Value::Bool(left != right),
        BinaryOp::Lt => compare(left, right, |o| o.is_lt()),
        BinaryOp::Gt => compare(left, right, |o| o.is_gt()),
        BinaryOp::Le => compare(left, right, |o| o.is_le()),
        BinaryOp::Ge => compare(left, right, |o| o.is_ge()),
    }
}

/// Operands that make `+` concatenate.
fn is_stringish(value: &Value) -> bool {
    matches!(
        value,
        Value::String(_) | Value::Array(_) | Value::Object(_) | Value::Reactive(_) | Value::Function(_)
    )
}

fn compare(left: &Value, right: &Value, test: fn(std::cmp::Ordering) -> bool) -> Value {
    let ordering = match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => left.to_number().partial_cmp(&right.to_number()),
    };
    Value::Bool(ordering.is_some_and(test))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parse;
    use serde_json::json;

    fn eval_in(source: &str, scope: &Scope, mode: Mode) -> EvalResult {
        let expr = parse(source)?;
        Ok(Interpreter::new(scope, mode).eval_value(&expr)?)
    }

    fn eval(source: &str) -> EvalResult {
        eval_in(source, &Scope::new(), Mode::Read)
    }

    #[test]
    fn arithmetic_and_concatenation() {
        assert_eq!(eval("1 + 2 * 3").unwrap(), Value::from(7));
        assert_eq!(eval("7 % 4 - 1").unwrap(), Value::from(2));
        assert_eq!(eval("'a' + 1").unwrap(), Value::from("a1"));
        assert_eq!(eval("1 + true").unwrap(), Value::from(2));
        assert_eq!(eval("[1, 2] + ''").unwrap(), Value::from("1,2"));
        assert!(matches!(eval("1 / 0").unwrap(), Value::Number(n) if n.is_infinite()));
    }

    #[test]
    fn comparisons() {
        assert_eq!(eval("'b' > 'a'").unwrap(), Value::Bool(true));
        assert_eq!(eval("2 <= 2").unwrap(), Value::Bool(true));
        assert_eq!(eval("1 < 'x'").unwrap(), Value::Bool(false));
        assert_eq!(eval("1 === 1").unwrap(), Value::Bool(true));
        assert_eq!(eval("'1' === 1").unwrap(), Value::Bool(false));
        assert_eq!(eval("null !== undefined").unwrap(), Value::Bool(true));
    }

    #[test]
    fn logical_operators_short_circuit() {
        let scope = Scope::new();
        scope.insert(
            "boom",
            Function::native("boom", |_| Err(EvalError::Native("should not run".into()))),
        );
        assert_eq!(eval_in("false && boom()", &scope, Mode::Read).unwrap(), Value::Bool(false));
        assert_eq!(eval_in("'x' || boom()", &scope, Mode::Read).unwrap(), Value::from("x"));
        assert_eq!(eval_in("0 ?? boom()", &scope, Mode::Read).unwrap(), Value::from(0));
        assert_eq!(eval_in("null ?? 'd'", &scope, Mode::Read).unwrap(), Value::from("d"));
    }

    #[test]
    fn signals_unwrap_in_reads() {
        let scope = Scope::new();
        scope.signal("count", 3);
        assert_eq!(eval_in("count + 1", &scope, Mode::Read).unwrap(), Value::from(4));
        assert_eq!(eval_in("count.get() * 2", &scope, Mode::Read).unwrap(), Value::from(6));
    }

    #[test]
    fn writes_require_write_mode() {
        let scope = Scope::new();
        let count = scope.signal("count", 1);

        assert_eq!(eval_in("count = 5", &scope, Mode::Read), Err(EvalError::ReadOnly("assignment")));
        assert_eq!(eval_in("count.set(5)", &scope, Mode::Read), Err(EvalError::ReadOnly("set")));
        assert_eq!(count.get(), Value::from(1));

        eval_in("count += 2", &scope, Mode::Write).unwrap();
        assert_eq!(count.get(), Value::from(3));
        eval_in("count.set(count.get() * 10)", &scope, Mode::Write).unwrap();
        assert_eq!(count.get(), Value::from(30));
    }

    #[test]
    fn assignment_to_reactive_properties() {
        let scope = Scope::from_state(&json!({"form": {"name": ""}, "list": [1, 2]})).unwrap();

        eval_in("form.name = 'Ann'; list[0] = 9", &scope, Mode::Write).unwrap();
        assert_eq!(eval_in("form.name", &scope, Mode::Read).unwrap(), Value::from("Ann"));
        assert_eq!(eval_in("list[0]", &scope, Mode::Read).unwrap(), Value::from(9));

        eval_in("list = [...list, 3]", &scope, Mode::Write).unwrap();
        assert_eq!(eval_in("list.length", &scope, Mode::Read).unwrap(), Value::from(3));

        assert_eq!(eval_in("missing = 1", &scope, Mode::Write), Err(EvalError::InvalidTarget));
    }

    #[test]
    fn forbidden_access_is_rejected() {
        let scope = Scope::new();
        scope.insert("x", Value::from_json(&json!({"a": {}})));
        scope.insert("k", "constructor");

        for source in [
            "x.__proto__",
            "x.a.constructor",
            "x['prototype']",
            "x[k]",
            "[1].map(v => x.__proto__)",
            "({ __proto__: 1 })",
            "({ ['__pro' + 'to__']: 1 })",
            "'s'.constructor",
        ] {
            assert_eq!(eval_in(source, &scope, Mode::Read), Err(EvalError::Rejected), "{source}");
        }
    }

    #[test]
    fn blocked_globals_resolve_to_undefined() {
        let scope = Scope::new();
        scope.insert("eval", Function::native("eval", |_| Ok(Value::from("escaped"))));
        scope.insert("Function", 1);

        assert_eq!(eval_in("eval", &scope, Mode::Read).unwrap(), Value::Undefined);
        assert_eq!(eval_in("Function", &scope, Mode::Read).unwrap(), Value::Undefined);
        assert!(matches!(eval_in("eval('1')", &scope, Mode::Read), Err(EvalError::NotCallable(_))));
    }

    #[test]
    fn lambdas_capture_scope() {
        let scope = Scope::new();
        scope.insert("factor", 3);
        assert_eq!(
            eval_in("[1, 2].map(x => x * factor)", &scope, Mode::Read).unwrap().to_json(),
            json!([3, 6])
        );
        assert_eq!(
            eval_in("[1, 2, 3].reduce((acc, x) => acc + x, 0)", &scope, Mode::Read).unwrap(),
            Value::from(6)
        );
    }

    #[test]
    fn object_and_array_literals() {
        let scope = Scope::new();
        scope.insert("base", Value::from_json(&json!({"a": 1, "b": 2})));
        scope.signal("c", 3);

        let value = eval_in("{ ...base, b: 20, c, ['d' + 1]: [0, ...[1, 2]] }", &scope, Mode::Read).unwrap();
        assert_eq!(value.to_json(), json!({"a": 1, "b": 20, "c": 3, "d1": [0, 1, 2]}));
    }

    #[test]
    fn missing_members_are_undefined() {
        let scope = Scope::new();
        scope.insert("obj", Value::from_json(&json!({})));
        assert_eq!(eval_in("obj.a", &scope, Mode::Read).unwrap(), Value::Undefined);
        assert_eq!(eval_in("obj.a.b", &scope, Mode::Read).unwrap(), Value::Undefined);
        assert_eq!(eval_in("nothing", &scope, Mode::Read).unwrap(), Value::Undefined);
        assert!(matches!(eval_in("nothing()", &scope, Mode::Read), Err(EvalError::NotCallable(_))));
    }

    #[test]
    fn runaway_recursion_is_bounded() {
        let scope = Scope::new();
        let code = "f => f(f)";
        let f = eval_in(code, &scope, Mode::Read).unwrap();
        scope.insert("f", f);
        assert_eq!(eval_in("f(f)", &scope, Mode::Read), Err(EvalError::TooDeep(MAX_CALL_DEPTH)));
        // The depth counter is released again.
        assert_eq!(eval_in("[1].map(x => x)", &scope, Mode::Read).unwrap().to_json(), json!([1]));
    }
}
