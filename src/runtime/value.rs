//! Runtime values and their Python-compatible semantics.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use serde_json::{Map, Number as JsonNumber, Value as Json};

use super::builtins::Builtin;
use super::dict::{Dict, Set};
use super::fault::{ExcKind, Fault, FaultResult};
use super::interp::{Env, ScopeInfo};
use crate::lang::ast::FunctionDef;

/// Nesting depth past which `repr` stops descending.
const MAX_RENDER_DEPTH: usize = 200;

/// Nesting depth past which JSON conversion stops descending. Results are
/// wrapped a few levels deep in the result frame, and the whole frame must
/// stay under serde_json's default decode depth of 128.
pub const MAX_JSON_DEPTH: usize = 100;

#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<Vec<Value>>),
    Dict(Rc<RefCell<Dict>>),
    Set(Rc<RefCell<Set>>),
    Range(Range),
    Iterator(Rc<RefCell<IterSource>>),
    Function(Rc<Function>),
    Builtin(Builtin),
    BoundMethod(Rc<BoundMethod>),
    ExceptionType(ExcKind),
    Exception(Rc<ExceptionObj>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl Range {
    pub fn len(&self) -> usize {
        let (start, stop, step) = (
            i128::from(self.start),
            i128::from(self.stop),
            i128::from(self.step),
        );
        let len = if step > 0 && start < stop {
            (stop - start - 1) / step + 1
        } else if step < 0 && start > stop {
            (start - stop - 1) / (-step) + 1
        } else {
            0
        };
        usize::try_from(len).unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<i64> {
        if index >= self.len() {
            return None;
        }
        let value = i128::from(self.start) + i128::from(self.step) * index as i128;
        i64::try_from(value).ok()
    }

    pub fn contains(&self, value: i64) -> bool {
        let in_bounds = if self.step > 0 {
            self.start <= value && value < self.stop
        } else {
            self.stop < value && value <= self.start
        };
        in_bounds && (i128::from(value) - i128::from(self.start)) % i128::from(self.step) == 0
    }
}

/// Source behind an iterator object. Items are produced eagerly except for
/// ranges, which count lazily.
#[derive(Debug)]
pub enum IterSource {
    Items(std::vec::IntoIter<Value>),
    Range { next: i128, stop: i128, step: i128 },
}

impl IterSource {
    pub fn from_range(range: Range) -> Self {
        IterSource::Range {
            next: i128::from(range.start),
            stop: i128::from(range.stop),
            step: i128::from(range.step),
        }
    }
}

impl Iterator for IterSource {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match self {
            IterSource::Items(items) => items.next(),
            IterSource::Range { next, stop, step } => {
                let more = if *step > 0 { *next < *stop } else { *next > *stop };
                if !more {
                    return None;
                }
                let current = *next;
                *next += *step;
                i64::try_from(current).ok().map(Value::Int)
            }
        }
    }
}

/// Iteration over any iterable: an owned snapshot or a shared iterator object.
pub enum ValueIter {
    Owned(IterSource),
    Shared(Rc<RefCell<IterSource>>),
}

impl Iterator for ValueIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match self {
            ValueIter::Owned(source) => source.next(),
            ValueIter::Shared(source) => source.borrow_mut().next(),
        }
    }
}

/// A user-defined function or lambda with its captured environment.
pub struct Function {
    pub def: Rc<FunctionDef>,
    /// Evaluated defaults aligned with `def.params.positional`.
    pub defaults: Vec<Option<Value>>,
    /// Evaluated defaults aligned with `def.params.kwonly`.
    pub kw_defaults: Vec<Option<Value>>,
    pub closure: Rc<Env>,
    pub scope: Rc<ScopeInfo>,
}

pub struct BoundMethod {
    pub receiver: Value,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionObj {
    pub kind: ExcKind,
    /// `str(exc)`.
    pub message: String,
}

impl ExceptionObj {
    pub fn to_fault(&self) -> Fault {
        Fault::raised(self.kind, self.message.clone())
    }
}

/// Either operand of a numeric operation, with `bool` folded into `int`.
#[derive(Debug, Clone, Copy)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

impl Value {
    pub fn str(s: impl Into<Rc<str>>) -> Value {
        Value::Str(s.into())
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(Rc::new(items))
    }

    pub fn dict(dict: Dict) -> Value {
        Value::Dict(Rc::new(RefCell::new(dict)))
    }

    pub fn set(set: Set) -> Value {
        Value::Set(Rc::new(RefCell::new(set)))
    }

    pub fn iterator(items: Vec<Value>) -> Value {
        Value::Iterator(Rc::new(RefCell::new(IterSource::Items(items.into_iter()))))
    }

    pub fn exception(kind: ExcKind, message: impl Into<String>) -> Value {
        Value::Exception(Rc::new(ExceptionObj {
            kind,
            message: message.into(),
        }))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Set(_) => "set",
            Value::Range(_) => "range",
            Value::Iterator(_) => "iterator",
            Value::Function(_) => "function",
            Value::Builtin(b) if b.is_type() => "type",
            Value::Builtin(_) | Value::BoundMethod(_) => "builtin_function_or_method",
            Value::ExceptionType(_) => "type",
            Value::Exception(e) => e.kind.name(),
        }
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Bool(b) => Some(Number::Int(i64::from(*b))),
            Value::Int(i) => Some(Number::Int(*i)),
            Value::Float(f) => Some(Number::Float(*f)),
            _ => None,
        }
    }

    /// Integer view used for indices and counts; `bool` counts as `int`.
    pub fn as_index(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn expect_index(&self) -> FaultResult<i64> {
        self.as_index().ok_or_else(|| {
            Fault::type_error(format!(
                "'{}' object cannot be interpreted as an integer",
                self.type_name()
            ))
        })
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::Dict(dict) => !dict.borrow().is_empty(),
            Value::Set(set) => !set.borrow().is_empty(),
            Value::Range(range) => !range.is_empty(),
            _ => true,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Value::Function(_) | Value::Builtin(_) | Value::BoundMethod(_) | Value::ExceptionType(_)
        )
    }

    /// `==`.
    pub fn py_eq(&self, other: &Value) -> bool {
        if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
            return numbers_equal(a, b);
        }
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                Rc::ptr_eq(a, b) || sequences_equal(&a.borrow(), &b.borrow())
            }
            (Value::Tuple(a), Value::Tuple(b)) => sequences_equal(a, b),
            (Value::Dict(a), Value::Dict(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter().all(|(key, value)| match b.get(key) {
                        Ok(Some(other)) => value.py_eq(&other),
                        _ => false,
                    })
            }
            (Value::Set(a), Value::Set(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.is_subset(&b).unwrap_or(false)
            }
            (Value::Range(a), Value::Range(b)) => {
                let (len_a, len_b) = (a.len(), b.len());
                len_a == len_b
                    && (len_a == 0 || (a.start == b.start && (len_a == 1 || a.step == b.step)))
            }
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a.name == b.name,
            (Value::BoundMethod(a), Value::BoundMethod(b)) => Rc::ptr_eq(a, b),
            (Value::ExceptionType(a), Value::ExceptionType(b)) => a == b,
            (Value::Exception(a), Value::Exception(b)) => Rc::ptr_eq(a, b),
            (Value::Iterator(a), Value::Iterator(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// `is`. Immutable scalars compare by value.
    pub fn is_identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Tuple(a), Value::Tuple(b)) => Rc::ptr_eq(a, b) || (a.is_empty() && b.is_empty()),
            (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b),
            (Value::Set(a), Value::Set(b)) => Rc::ptr_eq(a, b),
            (Value::Range(a), Value::Range(b)) => a == b,
            _ => self.py_eq(other),
        }
    }

    /// Ordering for `<`, `<=`, `>`, `>=`. `Ok(None)` means unordered (NaN).
    pub fn py_cmp(&self, other: &Value, op: &str) -> FaultResult<Option<Ordering>> {
        if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
            return Ok(match (a, b) {
                (Number::Int(x), Number::Int(y)) => Some(x.cmp(&y)),
                _ => a.as_f64().partial_cmp(&b.as_f64()),
            });
        }
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Ok(Some(a.cmp(b))),
            (Value::List(a), Value::List(b)) => {
                let (a, b) = (a.borrow().clone(), b.borrow().clone());
                compare_sequences(&a, &b, op)
            }
            (Value::Tuple(a), Value::Tuple(b)) => compare_sequences(a, b, op),
            _ => Err(Fault::type_error(format!(
                "'{op}' not supported between instances of '{}' and '{}'",
                self.type_name(),
                other.type_name()
            ))),
        }
    }

    pub fn repr(&self) -> String {
        let mut out = String::new();
        self.write_repr(&mut out, 0);
        out
    }

    /// `str(value)`.
    pub fn to_str(&self) -> String {
        match self {
            Value::Str(s) => s.to_string(),
            Value::Exception(e) => e.message.clone(),
            _ => self.repr(),
        }
    }

    fn write_repr(&self, out: &mut String, depth: usize) {
        if depth > MAX_RENDER_DEPTH {
            out.push_str("...");
            return;
        }
        match self {
            Value::None => out.push_str("None"),
            Value::Bool(true) => out.push_str("True"),
            Value::Bool(false) => out.push_str("False"),
            Value::Int(i) => out.push_str(&i.to_string()),
            Value::Float(f) => out.push_str(&float_repr(*f)),
            Value::Str(s) => out.push_str(&str_repr(s)),
            Value::List(items) => {
                out.push('[');
                write_items(out, &items.borrow(), depth);
                out.push(']');
            }
            Value::Tuple(items) => {
                out.push('(');
                write_items(out, items, depth);
                if items.len() == 1 {
                    out.push(',');
                }
                out.push(')');
            }
            Value::Dict(dict) => {
                out.push('{');
                for (i, (key, value)) in dict.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    key.write_repr(out, depth + 1);
                    out.push_str(": ");
                    value.write_repr(out, depth + 1);
                }
                out.push('}');
            }
            Value::Set(set) => {
                let set = set.borrow();
                if set.is_empty() {
                    out.push_str("set()");
                    return;
                }
                out.push('{');
                for (i, value) in set.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    value.write_repr(out, depth + 1);
                }
                out.push('}');
            }
            Value::Range(r) => {
                if r.step == 1 {
                    out.push_str(&format!("range({}, {})", r.start, r.stop));
                } else {
                    out.push_str(&format!("range({}, {}, {})", r.start, r.stop, r.step));
                }
            }
            Value::Iterator(_) => out.push_str("<iterator object>"),
            Value::Function(f) => out.push_str(&format!("<function {}>", f.def.name)),
            Value::Builtin(b) if b.is_type() => out.push_str(&format!("<class '{}'>", b.name)),
            Value::Builtin(b) => out.push_str(&format!("<built-in function {}>", b.name)),
            Value::BoundMethod(m) => out.push_str(&format!(
                "<built-in method {} of {} object>",
                m.name,
                m.receiver.type_name()
            )),
            Value::ExceptionType(kind) => out.push_str(&format!("<class '{}'>", kind.name())),
            Value::Exception(e) => {
                out.push_str(e.kind.name());
                out.push('(');
                if !e.message.is_empty() {
                    out.push_str(&str_repr(&e.message));
                }
                out.push(')');
            }
        }
    }

    pub fn from_json(json: &Json) -> Value {
        match json {
            Json::Null => Value::None,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Value::str(s.as_str()),
            Json::Array(items) => Value::list(items.iter().map(Value::from_json).collect()),
            Json::Object(map) => {
                let mut dict = Dict::new();
                for (key, value) in map {
                    // String keys are always hashable.
                    let _ = dict.insert(Value::str(key.as_str()), Value::from_json(value));
                }
                Value::dict(dict)
            }
        }
    }

    pub fn to_json(&self) -> Json {
        self.to_json_at(0)
    }

    fn to_json_at(&self, depth: usize) -> Json {
        if depth > MAX_JSON_DEPTH {
            return Json::String("...".to_string());
        }
        match self {
            Value::None => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::Number(JsonNumber::from(*i)),
            Value::Float(f) => JsonNumber::from_f64(*f).map_or(Json::Null, Json::Number),
            Value::Str(s) => Json::String(s.to_string()),
            Value::List(items) => {
                Json::Array(items.borrow().iter().map(|v| v.to_json_at(depth + 1)).collect())
            }
            Value::Tuple(items) => {
                Json::Array(items.iter().map(|v| v.to_json_at(depth + 1)).collect())
            }
            Value::Set(set) => {
                Json::Array(set.borrow().iter().map(|v| v.to_json_at(depth + 1)).collect())
            }
            Value::Dict(dict) => {
                let mut map = Map::new();
                for (key, value) in dict.borrow().iter() {
                    map.insert(json_key(key), value.to_json_at(depth + 1));
                }
                Json::Object(map)
            }
            other => Json::String(other.repr()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_str())
    }
}

fn json_key(key: &Value) -> String {
    match key {
        Value::None => "null".to_string(),
        Value::Bool(true) => "true".to_string(),
        Value::Bool(false) => "false".to_string(),
        other => other.to_str(),
    }
}

fn write_items(out: &mut String, items: &[Value], depth: usize) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        item.write_repr(out, depth + 1);
    }
}

pub fn numbers_equal(a: Number, b: Number) -> bool {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => x == y,
        (Number::Float(x), Number::Float(y)) => x == y,
        (Number::Int(i), Number::Float(f)) | (Number::Float(f), Number::Int(i)) => {
            f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 && f as i64 == i
        }
    }
}

fn sequences_equal(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.py_eq(y))
}

fn compare_sequences(a: &[Value], b: &[Value], op: &str) -> FaultResult<Option<Ordering>> {
    for (x, y) in a.iter().zip(b) {
        if !x.py_eq(y) {
            return x.py_cmp(y, op);
        }
    }
    Ok(Some(a.len().cmp(&b.len())))
}

/// Python's `repr(float)`: shortest round-trip digits, scientific notation
/// outside `1e-4 <= |f| < 1e16`.
pub fn float_repr(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if f == 0.0 {
        return if f.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }
    let sci = format!("{f:e}");
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    if (-4..16).contains(&exponent) {
        let plain = format!("{f}");
        if plain.contains('.') {
            plain
        } else {
            format!("{plain}.0")
        }
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exponent.abs())
    }
}

/// Python's `repr(str)`.
pub fn str_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn float_repr_matches_python() {
        assert_eq!(float_repr(1.0), "1.0");
        assert_eq!(float_repr(0.1), "0.1");
        assert_eq!(float_repr(1e20), "1e+20");
        assert_eq!(float_repr(1.5e-5), "1.5e-05");
        assert_eq!(float_repr(1e16), "1e+16");
        assert_eq!(float_repr(123456789.25), "123456789.25");
        assert_eq!(float_repr(-0.0), "-0.0");
        assert_eq!(float_repr(f64::INFINITY), "inf");
    }

    #[test]
    fn str_repr_picks_quotes() {
        assert_eq!(str_repr("abc"), "'abc'");
        assert_eq!(str_repr("it's"), "\"it's\"");
        assert_eq!(str_repr("a\nb"), "'a\\nb'");
        assert_eq!(str_repr("'\""), "'\\'\"'");
    }

    #[test]
    fn numeric_equality_crosses_kinds() {
        assert!(Value::Bool(true).py_eq(&Value::Int(1)));
        assert!(Value::Int(1).py_eq(&Value::Float(1.0)));
        assert!(!Value::Int(1).py_eq(&Value::Float(1.5)));
        assert!(!Value::Float(f64::NAN).py_eq(&Value::Float(f64::NAN)));
    }

    #[test]
    fn lists_and_tuples_never_compare_equal() {
        let list = Value::list(vec![Value::Int(1)]);
        let tuple = Value::tuple(vec![Value::Int(1)]);
        assert!(!list.py_eq(&tuple));
        assert!(list.py_eq(&Value::list(vec![Value::Float(1.0)])));
    }

    #[test]
    fn repr_of_containers() {
        let value = Value::from_json(&json!({"a": [1, 2.5, null, true], "b": "x"}));
        assert_eq!(value.repr(), "{'a': [1, 2.5, None, True], 'b': 'x'}");
        assert_eq!(Value::tuple(vec![Value::Int(1)]).repr(), "(1,)");
        assert_eq!(Value::set(Set::new()).repr(), "set()");
    }

    #[test]
    fn deep_nesting_stays_decodable() {
        let mut value = Value::list(Vec::new());
        for _ in 0..130 {
            value = Value::list(vec![value]);
        }
        let wrapped = json!({"tests": [{"got": value.to_json()}]});
        let text = serde_json::to_string(&wrapped).unwrap();
        assert!(serde_json::from_str::<Json>(&text).is_ok());
        assert!(text.contains("\"...\""));
    }

    #[test]
    fn json_round_trip_preserves_numeric_kinds() {
        let value = Value::from_json(&json!([1, 1.0, "s"]));
        assert_eq!(value.to_json(), json!([1, 1.0, "s"]));
        assert_eq!(Value::Float(f64::NAN).to_json(), Json::Null);
    }

    #[test]
    fn json_keys_render_like_python() {
        let mut dict = Dict::new();
        dict.insert(Value::Int(1), Value::Int(2)).unwrap();
        dict.insert(Value::Bool(false), Value::None).unwrap();
        assert_eq!(Value::dict(dict).to_json(), json!({"1": 2, "false": null}));
    }

    #[test]
    fn ordering_rejects_mixed_types() {
        let err = Value::Int(1).py_cmp(&Value::str("a"), "<").unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: '<' not supported between instances of 'int' and 'str'"
        );
        let a = Value::list(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::list(vec![Value::Int(1), Value::Int(3)]);
        assert_eq!(a.py_cmp(&b, "<").unwrap(), Some(Ordering::Less));
    }

    #[test]
    fn range_math() {
        let r = Range { start: 10, stop: 0, step: -3 };
        assert_eq!(r.len(), 4);
        assert_eq!(r.get(3), Some(1));
        assert!(r.contains(4));
        assert!(!r.contains(5));
    }
}
