//! Built-in methods on strings, arrays and numbers.
//!
//! String indices count characters, not bytes. Array methods accept plain
//! and reactive arrays alike and always return plain arrays; `reverse` does
//! not mutate its receiver.

use std::sync::Arc;

use crate::error::EvalError;
use crate::value::{format_number, Function, Value};

use super::interpreter::{Interpreter, Mode};

type EvalResult = Result<Value, EvalError>;

/// Upper bound on the length of strings built by `repeat` and `padStart`.
const MAX_STRING_LEN: usize = 1 << 24;

/// Dispatch `receiver.name(args)`. `receiver` is already unwrapped.
pub(crate) fn call_method(interp: &Interpreter<'_>, receiver: &Value, name: &str, args: &[Value]) -> EvalResult {
    match receiver {
        Value::String(s) => string_method(s, name, args),
        Value::Number(n) => number_method(*n, name, args),
        Value::Reactive(r) if r.is_array() => {
            if let Some(result) = reactive_mutator(interp, receiver, name, args) {
                return result;
            }
            array_method(&r.values(), name, args)
        }
        Value::Array(items) => {
            if is_mutator(name) {
                return Err(EvalError::Type(format!("cannot {name} a plain array")));
            }
            array_method(items, name, args)
        }
        other => Err(unknown(other, name)),
    }
}

fn unknown(receiver: &Value, method: &str) -> EvalError {
    EvalError::UnknownMethod {
        receiver: receiver.type_name(),
        method: method.to_string(),
    }
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

fn callback(args: &[Value], method: &str) -> Result<Function, EvalError> {
    match args.first() {
        Some(Value::Function(f)) => Ok(f.clone()),
        Some(other) => Err(EvalError::NotCallable(other.type_name().to_string())),
        None => Err(EvalError::Type(format!("{method} requires a callback"))),
    }
}

/// Resolve a relative index argument (negative counts from the end) into
/// `0..=len`.
fn relative(value: &Value, len: usize, default: usize) -> usize {
    if value.is_undefined() {
        return default;
    }
    let n = value.to_number();
    if n.is_nan() {
        return 0;
    }
    let n = n.trunc();
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        n.min(len as f64) as usize
    }
}

// ----------------------------------------------------------------------------
// Strings
// ----------------------------------------------------------------------------

fn string_method(s: &Arc<str>, name: &str, args: &[Value]) -> EvalResult {
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len();
    let text = |a: usize, b: usize| -> String { chars[a..b.max(a)].iter().collect() };
    let needle = || arg(args, 0).to_display_string();

    Ok(match name {
        "toUpperCase" => Value::from(s.to_uppercase()),
        "toLowerCase" => Value::from(s.to_lowercase()),
        "trim" => Value::from(s.trim()),
        "trimStart" => Value::from(s.trim_start()),
        "trimEnd" => Value::from(s.trim_end()),
        "toString" => Value::String(Arc::clone(s)),
        "slice" => {
            let start = relative(&arg(args, 0), len, 0);
            let end = relative(&arg(args, 1), len, len);
            Value::from(text(start, end))
        }
        "substring" => {
            let clamp = |v: Value, default: usize| {
                if v.is_undefined() {
                    return default;
                }
                let n = v.to_number();
                if n.is_nan() || n < 0.0 {
                    0
                } else {
                    n.min(len as f64) as usize
                }
            };
            let a = clamp(arg(args, 0), 0);
            let b = clamp(arg(args, 1), len);
            Value::from(text(a.min(b), a.max(b)))
        }
        "charAt" => {
            let index = arg(args, 0).to_number();
            let index = if index.is_nan() { 0.0 } else { index };
            match (index >= 0.0).then(|| chars.get(index as usize)).flatten() {
                Some(c) => Value::from(c.to_string()),
                None => Value::from(""),
            }
        }
        "at" => {
            let n = arg(args, 0).to_number();
            let n = if n.is_nan() { 0.0 } else { n.trunc() };
            let index = if n < 0.0 { len as f64 + n } else { n };
            match (index >= 0.0).then(|| chars.get(index as usize)).flatten() {
                Some(c) => Value::from(c.to_string()),
                None => Value::Undefined,
            }
        }
        "includes" => Value::Bool(s.contains(needle().as_str())),
        "startsWith" => Value::Bool(s.starts_with(needle().as_str())),
        "endsWith" => Value::Bool(s.ends_with(needle().as_str())),
        "indexOf" => {
            let needle = needle();
            match s.find(needle.as_str()) {
                Some(byte) => Value::from(s[..byte].chars().count()),
                None => Value::Number(-1.0),
            }
        }
        "split" => {
            let separator = arg(args, 0);
            let parts: Vec<Value> = if separator.is_undefined() {
                vec![Value::String(Arc::clone(s))]
            } else {
                let separator = separator.to_display_string();
                if separator.is_empty() {
                    chars.iter().map(|c| Value::from(c.to_string())).collect()
                } else {
                    s.split(separator.as_str()).map(Value::from).collect()
                }
            };
            Value::from(parts)
        }
        "replace" => replace(s, args, false)?,
        "replaceAll" => replace(s, args, true)?,
        "padStart" | "padEnd" => {
            let target = arg(args, 0).to_number();
            let target = if target.is_nan() { 0 } else { target.max(0.0) as usize };
            if target > MAX_STRING_LEN {
                return Err(EvalError::Type("invalid string length".into()));
            }
            let fill = match arg(args, 1) {
                Value::Undefined => " ".to_string(),
                other => other.to_display_string(),
            };
            if target <= len || fill.is_empty() {
                return Ok(Value::String(Arc::clone(s)));
            }
            let padding: String = fill.chars().cycle().take(target - len).collect();
            if name == "padStart" {
                Value::from(format!("{padding}{s}"))
            } else {
                Value::from(format!("{s}{padding}"))
            }
        }
        "repeat" => {
            let count = arg(args, 0).to_number();
            let count = if count.is_nan() { 0.0 } else { count };
            if count < 0.0 || !count.is_finite() || (count as usize).saturating_mul(s.len()) > MAX_STRING_LEN {
                return Err(EvalError::Type("invalid repeat count".into()));
            }
            Value::from(s.repeat(count as usize))
        }
        "concat" => {
            let mut out = s.to_string();
            for value in args {
                out.push_str(&value.to_display_string());
            }
            Value::from(out)
        }
        _ => return Err(unknown(&Value::String(Arc::clone(s)), name)),
    })
}

fn replace(s: &str, args: &[Value], all: bool) -> EvalResult {
    let pattern = arg(args, 0).to_display_string();
    let replacement = arg(args, 1);
    let substitute = |matched: &str| -> Result<String, EvalError> {
        match &replacement {
            Value::Function(f) => Ok(f.call(&[Value::from(matched)])?.to_display_string()),
            other => Ok(other.to_display_string()),
        }
    };

    if pattern.is_empty() {
        return Ok(Value::from(substitute("")? + s));
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(at) = rest.find(pattern.as_str()) {
        out.push_str(&rest[..at]);
        out.push_str(&substitute(&pattern)?);
        rest = &rest[at + pattern.len()..];
        if !all {
            break;
        }
    }
    out.push_str(rest);
    Ok(Value::from(out))
}

// ----------------------------------------------------------------------------
// Numbers
// ----------------------------------------------------------------------------

fn number_method(n: f64, name: &str, args: &[Value]) -> EvalResult {
    match name {
        "toFixed" => {
            let digits = arg(args, 0).to_number();
            let digits = if digits.is_nan() { 0.0 } else { digits };
            if !(0.0..=100.0).contains(&digits) {
                return Err(EvalError::Type("toFixed() digits out of range".into()));
            }
            if !n.is_finite() {
                return Ok(Value::from(format_number(n)));
            }
            Ok(Value::from(format!("{:.*}", digits as usize, n)))
        }
        "toString" => {
            let radix = match arg(args, 0) {
                Value::Undefined => 10.0,
                other => other.to_number(),
            };
            if !(2.0..=36.0).contains(&radix) || radix.fract() != 0.0 {
                return Err(EvalError::Type("toString() radix must be between 2 and 36".into()));
            }
            if radix == 10.0 || !n.is_finite() || n.fract() != 0.0 {
                return Ok(Value::from(format_number(n)));
            }
            Ok(Value::from(integer_radix(n, radix as u32)))
        }
        _ => Err(unknown(&Value::Number(n), name)),
    }
}

fn integer_radix(n: f64, radix: u32) -> String {
    let mut magnitude = n.abs() as u128;
    if magnitude == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while magnitude > 0 {
        let digit = (magnitude % radix as u128) as u32;
        digits.push(std::char::from_digit(digit, radix).unwrap_or('?'));
        magnitude /= radix as u128;
    }
    if n < 0.0 {
        digits.push('-');
    }
    digits.iter().rev().collect()
}

// ----------------------------------------------------------------------------
// Arrays
// ----------------------------------------------------------------------------

fn array_method(items: &[Value], name: &str, args: &[Value]) -> EvalResult {
    let len = items.len();
    let each = |f: &Function, index: usize, item: &Value| f.call(&[item.clone(), Value::from(index)]);

    Ok(match name {
        "map" => {
            let f = callback(args, name)?;
            let mut out = Vec::with_capacity(len);
            for (i, item) in items.iter().enumerate() {
                out.push(each(&f, i, item)?);
            }
            Value::from(out)
        }
        "filter" => {
            let f = callback(args, name)?;
            let mut out = Vec::new();
            for (i, item) in items.iter().enumerate() {
                if each(&f, i, item)?.truthy() {
                    out.push(item.clone());
                }
            }
            Value::from(out)
        }
        "find" | "findIndex" => {
            let f = callback(args, name)?;
            for (i, item) in items.iter().enumerate() {
                if each(&f, i, item)?.truthy() {
                    return Ok(if name == "find" { item.clone() } else { Value::from(i) });
                }
            }
            if name == "find" {
                Value::Undefined
            } else {
                Value::Number(-1.0)
            }
        }
        "some" => {
            let f = callback(args, name)?;
            for (i, item) in items.iter().enumerate() {
                if each(&f, i, item)?.truthy() {
                    return Ok(Value::Bool(true));
                }
            }
            Value::Bool(false)
        }
        "every" => {
            let f = callback(args, name)?;
            for (i, item) in items.iter().enumerate() {
                if !each(&f, i, item)?.truthy() {
                    return Ok(Value::Bool(false));
                }
            }
            Value::Bool(true)
        }
        "forEach" => {
            let f = callback(args, name)?;
            for (i, item) in items.iter().enumerate() {
                each(&f, i, item)?;
            }
            Value::Undefined
        }
        "reduce" => {
            let f = callback(args, name)?;
            let (mut acc, start) = match args.get(1) {
                Some(init) => (init.clone(), 0),
                None => match items.first() {
                    Some(first) => (first.clone(), 1),
                    None => return Err(EvalError::Type("reduce of empty array with no initial value".into())),
                },
            };
            for (i, item) in items.iter().enumerate().skip(start) {
                acc = f.call(&[acc, item.clone(), Value::from(i)])?;
            }
            acc
        }
        "includes" => {
            let needle = arg(args, 0);
            // `includes` finds NaN, unlike `indexOf`.
            let same = |item: &Value| match (item, &needle) {
                (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan() => true,
                _ => *item == needle,
            };
            Value::Bool(items.iter().any(same))
        }
        "indexOf" => {
            let needle = arg(args, 0);
            match items.iter().position(|item| *item == needle) {
                Some(i) => Value::from(i),
                None => Value::Number(-1.0),
            }
        }
        "join" => {
            let separator = match arg(args, 0) {
                Value::Undefined => ",".to_string(),
                other => other.to_display_string(),
            };
            Value::from(join(items, &separator))
        }
        "toString" => Value::from(join(items, ",")),
        "slice" => {
            let start = relative(&arg(args, 0), len, 0);
            let end = relative(&arg(args, 1), len, len);
            Value::array(items[start..end.max(start)].iter().map(Value::unwrap_untracked))
        }
        "concat" => {
            let mut out: Vec<Value> = items.to_vec();
            for value in args {
                match value.to_items() {
                    Some(more) => out.extend(more),
                    None => out.push(value.clone()),
                }
            }
            Value::from(out)
        }
        "reverse" => Value::array(items.iter().rev().cloned()),
        "at" => {
            let n = arg(args, 0).to_number();
            let n = if n.is_nan() { 0.0 } else { n.trunc() };
            let index = if n < 0.0 { len as f64 + n } else { n };
            if index < 0.0 {
                Value::Undefined
            } else {
                items.get(index as usize).cloned().unwrap_or_default()
            }
        }
        _ => return Err(unknown(&Value::array(Vec::new()), name)),
    })
}

fn join(items: &[Value], separator: &str) -> String {
    items
        .iter()
        .map(|item| item.unwrap_signal().to_text())
        .collect::<Vec<_>>()
        .join(separator)
}

fn is_mutator(name: &str) -> bool {
    matches!(name, "push" | "pop" | "shift" | "unshift" | "splice")
}

/// Mutating methods on reactive arrays. `None` if `name` is not a mutator.
fn reactive_mutator(interp: &Interpreter<'_>, receiver: &Value, name: &str, args: &[Value]) -> Option<EvalResult> {
    if !is_mutator(name) {
        return None;
    }
    let Value::Reactive(array) = receiver else {
        return None;
    };
    if interp.mode() == Mode::Read {
        return Some(Err(EvalError::ReadOnly(match name {
            "push" => "push",
            "pop" => "pop",
            "shift" => "shift",
            "unshift" => "unshift",
            _ => "splice",
        })));
    }

    Some(Ok(match name {
        "push" => {
            for value in args {
                array.push(value.clone());
            }
            Value::from(array.len())
        }
        "pop" => array.pop(),
        "shift" => array.shift(),
        "unshift" => {
            array.unshift(args.to_vec());
            Value::from(array.len())
        }
        _ => {
            let len = array.len();
            let start = relative(&arg(args, 0), len, 0);
            let count = match args.get(1) {
                None => len - start,
                Some(n) => {
                    let n = n.to_number();
                    if n.is_nan() || n < 0.0 {
                        0
                    } else {
                        (n as usize).min(len - start)
                    }
                }
            };
            let inserted = args.iter().skip(2).cloned().collect();
            Value::from(array.splice(start, count, inserted))
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Reactive;
    use crate::scope::Scope;
    use serde_json::json;

    fn run(receiver: Value, name: &str, args: &[Value], mode: Mode) -> EvalResult {
        let scope = Scope::new();
        let interp = Interpreter::new(&scope, mode);
        call_method(&interp, &receiver, name, args)
    }

    fn read(receiver: impl Into<Value>, name: &str, args: &[Value]) -> Value {
        run(receiver.into(), name, args, Mode::Read).unwrap()
    }

    #[test]
    fn string_methods_count_characters() {
        assert_eq!(read("héllo", "slice", &[1.into(), 3.into()]), Value::from("él"));
        assert_eq!(read("héllo", "slice", &[Value::from(-2)]), Value::from("lo"));
        assert_eq!(read("héllo", "indexOf", &["l".into()]), Value::from(2));
        assert_eq!(read("abc", "substring", &[2.into(), 0.into()]), Value::from("ab"));
        assert_eq!(read("abc", "charAt", &[5.into()]), Value::from(""));
        assert_eq!(read("abc", "at", &[Value::from(-1)]), Value::from("c"));
    }

    #[test]
    fn string_transformations() {
        assert_eq!(read(" Hi ", "trim", &[]), Value::from("Hi"));
        assert_eq!(read("Hi", "toUpperCase", &[]), Value::from("HI"));
        assert_eq!(read("5", "padStart", &[3.into(), "0".into()]), Value::from("005"));
        assert_eq!(read("ab", "repeat", &[3.into()]), Value::from("ababab"));
        assert_eq!(read("a-b-c", "replace", &["-".into(), "+".into()]), Value::from("a+b-c"));
        assert_eq!(read("a-b-c", "replaceAll", &["-".into(), "".into()]), Value::from("abc"));
        assert_eq!(read("a,b", "split", &[",".into()]).to_json(), json!(["a", "b"]));
        assert_eq!(read("ab", "split", &["".into()]).to_json(), json!(["a", "b"]));
        assert!(run("x".into(), "repeat", &[Value::from(-1)], Mode::Read).is_err());
    }

    #[test]
    fn number_methods() {
        assert_eq!(read(3.14159, "toFixed", &[2.into()]), Value::from("3.14"));
        assert_eq!(read(255, "toString", &[16.into()]), Value::from("ff"));
        assert_eq!(read(-5, "toString", &[2.into()]), Value::from("-101"));
        assert_eq!(read(1.5, "toString", &[]), Value::from("1.5"));
    }

    #[test]
    fn array_methods_take_callbacks() {
        let items = Value::from_json(&json!([1, 2, 3, 4]));
        let double = Function::native("double", |args| Ok(Value::Number(args[0].to_number() * 2.0)));
        let odd = Function::native("odd", |args| Ok(Value::Bool(args[0].to_number() % 2.0 == 1.0)));
        let sum = Function::native("sum", |args| Ok(Value::Number(args[0].to_number() + args[1].to_number())));

        assert_eq!(read(items.clone(), "map", &[double.into()]).to_json(), json!([2, 4, 6, 8]));
        assert_eq!(read(items.clone(), "filter", &[odd.clone().into()]).to_json(), json!([1, 3]));
        assert_eq!(read(items.clone(), "findIndex", &[odd.clone().into()]), Value::from(0));
        assert_eq!(read(items.clone(), "every", &[odd.into()]), Value::Bool(false));
        assert_eq!(read(items.clone(), "reduce", &[sum.clone().into()]), Value::from(10));
        assert_eq!(read(items.clone(), "join", &["-".into()]), Value::from("1-2-3-4"));
        assert_eq!(read(items.clone(), "reverse", &[]).to_json(), json!([4, 3, 2, 1]));
        assert_eq!(items.to_json(), json!([1, 2, 3, 4]));

        let empty = Value::from_json(&json!([]));
        assert!(matches!(run(empty, "reduce", &[sum.into()], Mode::Read), Err(EvalError::Type(_))));
    }

    #[test]
    fn callback_errors_propagate() {
        let items = Value::from_json(&json!([1]));
        let fail = Function::native("fail", |_| Err(EvalError::Native("nope".into())));
        assert_eq!(
            run(items, "map", &[fail.into()], Mode::Read),
            Err(EvalError::Native("nope".into()))
        );
    }

    #[test]
    fn mutators_need_write_mode_and_a_reactive_array() {
        let list = Reactive::from_json(&json!([1, 2])).unwrap();
        let receiver = Value::from(list.clone());

        assert_eq!(
            run(receiver.clone(), "push", &[3.into()], Mode::Read),
            Err(EvalError::ReadOnly("push"))
        );
        assert_eq!(run(receiver.clone(), "push", &[3.into()], Mode::Write).unwrap(), Value::from(3));
        assert_eq!(run(receiver.clone(), "shift", &[], Mode::Write).unwrap(), Value::from(1));
        let removed = run(receiver.clone(), "splice", &[0.into(), 1.into(), 9.into()], Mode::Write).unwrap();
        assert_eq!(removed.to_json(), json!([2]));
        assert_eq!(list.to_json(), json!([9, 3]));

        let plain = Value::from_json(&json!([1]));
        assert!(matches!(run(plain, "push", &[2.into()], Mode::Write), Err(EvalError::Type(_))));
    }

    #[test]
    fn unknown_methods_name_the_receiver() {
        assert_eq!(
            run(Value::Bool(true), "foo", &[], Mode::Read),
            Err(EvalError::UnknownMethod {
                receiver: "boolean",
                method: "foo".into()
            })
        );
    }
}
