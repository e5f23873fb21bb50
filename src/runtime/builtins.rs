//! The builtin namespace visible to submissions.
//!
//! `SAFE_BUILTINS` is the complete set of names a submission can resolve
//! beyond its own definitions. Anything absent from the table (`eval`,
//! `open`, `globals`, ...) is simply unbound and fails with `NameError`.

use std::cell::RefCell;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use once_cell::sync::Lazy;

use super::dict::{Dict, HashKey, Set};
use super::fault::{ExcKind, Fault, FaultResult};
use super::format;
use super::interp::Interpreter;
use super::methods;
use super::ops;
use super::value::{Number, Range, Value, ValueIter};
use crate::lang::ast::BinOp;

pub type BuiltinFn =
    fn(&mut Interpreter, Vec<Value>, Vec<(String, Value)>) -> FaultResult<Value>;

/// A native function bound in the builtin namespace.
#[derive(Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    func: BuiltinFn,
    is_type: bool,
}

impl Builtin {
    const fn function(name: &'static str, func: BuiltinFn) -> Self {
        Self {
            name,
            func,
            is_type: false,
        }
    }

    const fn class(name: &'static str, func: BuiltinFn) -> Self {
        Self {
            name,
            func,
            is_type: true,
        }
    }

    /// True for the constructors that double as types (`int`, `list`, ...).
    pub fn is_type(&self) -> bool {
        self.is_type
    }

    pub fn call(
        &self,
        interp: &mut Interpreter,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> FaultResult<Value> {
        (self.func)(interp, args, kwargs)
    }
}

/// What a builtin name resolves to. Stored instead of [`Value`] so the
/// table can live in a process-wide static.
#[derive(Clone, Copy)]
pub enum Binding {
    Function(Builtin),
    Exception(ExcKind),
}

impl Binding {
    fn to_value(self) -> Value {
        match self {
            Binding::Function(builtin) => Value::Builtin(builtin),
            Binding::Exception(kind) => Value::ExceptionType(kind),
        }
    }
}

pub static SAFE_BUILTINS: Lazy<HashMap<&'static str, Binding>> = Lazy::new(|| {
    let functions = [
        Builtin::function("abs", builtin_abs),
        Builtin::function("all", builtin_all),
        Builtin::function("any", builtin_any),
        Builtin::class("bool", builtin_bool),
        Builtin::function("callable", builtin_callable),
        Builtin::function("chr", builtin_chr),
        Builtin::class("dict", builtin_dict),
        Builtin::function("divmod", builtin_divmod),
        Builtin::function("enumerate", builtin_enumerate),
        Builtin::function("filter", builtin_filter),
        Builtin::class("float", builtin_float),
        Builtin::function("format", builtin_format),
        Builtin::class("frozenset", builtin_set),
        Builtin::function("getattr", builtin_getattr),
        Builtin::function("hasattr", builtin_hasattr),
        Builtin::function("hash", builtin_hash),
        Builtin::function("hex", builtin_hex),
        Builtin::class("int", builtin_int),
        Builtin::function("isinstance", builtin_isinstance),
        Builtin::function("iter", builtin_iter),
        Builtin::function("len", builtin_len),
        Builtin::class("list", builtin_list),
        Builtin::function("map", builtin_map),
        Builtin::function("max", builtin_max),
        Builtin::function("min", builtin_min),
        Builtin::function("next", builtin_next),
        Builtin::function("oct", builtin_oct),
        Builtin::function("ord", builtin_ord),
        Builtin::function("pow", builtin_pow),
        Builtin::function("print", builtin_print),
        Builtin::function("range", builtin_range),
        Builtin::function("repr", builtin_repr),
        Builtin::function("reversed", builtin_reversed),
        Builtin::function("round", builtin_round),
        Builtin::class("set", builtin_set),
        Builtin::function("sorted", builtin_sorted),
        Builtin::class("str", builtin_str),
        Builtin::function("sum", builtin_sum),
        Builtin::class("tuple", builtin_tuple),
        Builtin::function("zip", builtin_zip),
    ];
    let exceptions = [
        ExcKind::Exception,
        ExcKind::ArithmeticError,
        ExcKind::AssertionError,
        ExcKind::IndexError,
        ExcKind::KeyError,
        ExcKind::LookupError,
        ExcKind::NotImplementedError,
        ExcKind::OverflowError,
        ExcKind::RuntimeError,
        ExcKind::StopIteration,
        ExcKind::TypeError,
        ExcKind::ValueError,
        ExcKind::ZeroDivisionError,
    ];
    functions
        .into_iter()
        .map(|b| (b.name, Binding::Function(b)))
        .chain(exceptions.into_iter().map(|k| (k.name(), Binding::Exception(k))))
        .collect()
});

/// Resolves `name` in the builtin namespace.
pub fn lookup(name: &str) -> Option<Value> {
    SAFE_BUILTINS.get(name).map(|binding| binding.to_value())
}

// ----------------------------------------------------------------------
// Argument helpers
// ----------------------------------------------------------------------

pub(super) fn expect_args(name: &str, args: &[Value], min: usize, max: usize) -> FaultResult<()> {
    let n = args.len();
    if n >= min && n <= max {
        return Ok(());
    }
    let message = if min == max && min == 1 {
        format!("{name}() takes exactly one argument ({n} given)")
    } else if n < min {
        format!(
            "{name} expected at least {min} argument{}, got {n}",
            if min == 1 { "" } else { "s" }
        )
    } else {
        format!(
            "{name} expected at most {max} argument{}, got {n}",
            if max == 1 { "" } else { "s" }
        )
    };
    Err(Fault::type_error(message))
}

pub(super) fn reject_kwargs(name: &str, kwargs: &[(String, Value)]) -> FaultResult<()> {
    if kwargs.is_empty() {
        Ok(())
    } else {
        Err(Fault::type_error(format!("{name}() takes no keyword arguments")))
    }
}

pub(super) fn take_kwarg(kwargs: &mut Vec<(String, Value)>, key: &str) -> Option<Value> {
    let pos = kwargs.iter().position(|(k, _)| k == key)?;
    Some(kwargs.remove(pos).1)
}

pub(super) fn finish_kwargs(name: &str, kwargs: &[(String, Value)]) -> FaultResult<()> {
    match kwargs.first() {
        None => Ok(()),
        Some((key, _)) => Err(Fault::type_error(format!(
            "'{key}' is an invalid keyword argument for {name}()"
        ))),
    }
}

fn wrap_iter(iter: ValueIter) -> Value {
    match iter {
        ValueIter::Owned(source) => Value::Iterator(Rc::new(RefCell::new(source))),
        ValueIter::Shared(source) => Value::Iterator(source),
    }
}

// ----------------------------------------------------------------------
// Numbers
// ----------------------------------------------------------------------

fn builtin_abs(_: &mut Interpreter, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> FaultResult<Value> {
    reject_kwargs("abs", &kwargs)?;
    expect_args("abs", &args, 1, 1)?;
    match args[0].as_number() {
        Some(Number::Int(i)) => Ok(Value::Int(i.checked_abs().ok_or_else(Fault::overflow)?)),
        Some(Number::Float(f)) => Ok(Value::Float(f.abs())),
        None => Err(Fault::type_error(format!(
            "bad operand type for abs(): '{}'",
            args[0].type_name()
        ))),
    }
}

fn builtin_divmod(_: &mut Interpreter, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> FaultResult<Value> {
    reject_kwargs("divmod", &kwargs)?;
    expect_args("divmod", &args, 2, 2)?;
    match (args[0].as_number(), args[1].as_number()) {
        (Some(Number::Int(a)), Some(Number::Int(b))) => Ok(Value::tuple(vec![
            Value::Int(ops::int_floor_div(a, b)?),
            Value::Int(ops::int_mod(a, b)?),
        ])),
        (Some(a), Some(b)) => {
            let (a, b) = (a.as_f64(), b.as_f64());
            if b == 0.0 {
                return Err(Fault::zero_division("float divmod()"));
            }
            let m = ops::float_mod(a, b);
            let q = ((a - m) / b).round();
            Ok(Value::tuple(vec![Value::Float(q), Value::Float(m)]))
        }
        _ => Err(Fault::type_error(format!(
            "unsupported operand type(s) for divmod(): '{}' and '{}'",
            args[0].type_name(),
            args[1].type_name()
        ))),
    }
}

fn builtin_pow(interp: &mut Interpreter, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> FaultResult<Value> {
    reject_kwargs("pow", &kwargs)?;
    expect_args("pow", &args, 2, 3)?;
    if args.len() == 2 {
        return ops::binary_op(BinOp::Pow, &args[0], &args[1], interp.limits());
    }
    let (Some(base), Some(exp), Some(modulus)) =
        (args[0].as_index(), args[1].as_index(), args[2].as_index())
    else {
        return Err(Fault::type_error(
            "pow() 3rd argument not allowed unless all arguments are integers",
        ));
    };
    if modulus == 0 {
        return Err(Fault::value_error("pow() 3rd argument cannot be 0"));
    }
    if exp < 0 {
        return Err(Fault::value_error("base is not invertible for the given modulus"));
    }
    let m = i128::from(modulus);
    let mut result: i128 = 1 % m;
    let mut base = i128::from(base).rem_euclid(m);
    let mut exp = exp;
    while exp > 0 {
        if exp & 1 == 1 {
            result = (result * base).rem_euclid(m);
        }
        base = (base * base).rem_euclid(m);
        exp >>= 1;
    }
    if m < 0 && result > 0 {
        result += m;
    }
    Ok(Value::Int(i64::try_from(result).map_err(|_| Fault::overflow())?))
}

fn builtin_round(_: &mut Interpreter, mut args: Vec<Value>, mut kwargs: Vec<(String, Value)>) -> FaultResult<Value> {
    if let Some(ndigits) = take_kwarg(&mut kwargs, "ndigits") {
        args.push(ndigits);
    }
    finish_kwargs("round", &kwargs)?;
    expect_args("round", &args, 1, 2)?;
    let ndigits = match args.get(1) {
        None | Some(Value::None) => None,
        Some(n) => Some(n.expect_index()?),
    };
    match (args[0].as_number(), ndigits) {
        (Some(Number::Int(i)), None) => Ok(Value::Int(i)),
        (Some(Number::Int(i)), Some(n)) if n >= 0 => Ok(Value::Int(i)),
        (Some(Number::Int(i)), Some(n)) => {
            let Some(scale) = u32::try_from(-n).ok().and_then(|e| 10_i64.checked_pow(e)) else {
                return Ok(Value::Int(0));
            };
            let rounded = (i as f64 / scale as f64).round_ties_even() as i64;
            Ok(Value::Int(rounded.checked_mul(scale).ok_or_else(Fault::overflow)?))
        }
        (Some(Number::Float(f)), None) => {
            if f.is_nan() {
                return Err(Fault::value_error("cannot convert float NaN to integer"));
            }
            if f.is_infinite() {
                return Err(Fault::raised(
                    ExcKind::OverflowError,
                    "cannot convert float infinity to integer",
                ));
            }
            float_to_int(f.round_ties_even())
        }
        (Some(Number::Float(f)), Some(n)) => {
            if !f.is_finite() {
                return Ok(Value::Float(f));
            }
            if n >= 0 {
                let digits = usize::try_from(n.min(300)).unwrap_or(300);
                let text = format!("{f:.digits$}");
                Ok(Value::Float(text.parse().unwrap_or(f)))
            } else {
                let scale = 10_f64.powi(i32::try_from(-n).unwrap_or(i32::MAX));
                Ok(Value::Float((f / scale).round_ties_even() * scale))
            }
        }
        (None, _) => Err(Fault::type_error(format!(
            "type {} doesn't define __round__ method",
            args[0].type_name()
        ))),
    }
}

fn float_to_int(f: f64) -> FaultResult<Value> {
    if f.is_nan() {
        return Err(Fault::value_error("cannot convert float NaN to integer"));
    }
    if f.is_infinite() {
        return Err(Fault::raised(
            ExcKind::OverflowError,
            "cannot convert float infinity to integer",
        ));
    }
    let truncated = f.trunc();
    if truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
        return Err(Fault::overflow());
    }
    Ok(Value::Int(truncated as i64))
}

fn builtin_hex(_: &mut Interpreter, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> FaultResult<Value> {
    reject_kwargs("hex", &kwargs)?;
    expect_args("hex", &args, 1, 1)?;
    let i = args[0].expect_index()?;
    let sign = if i < 0 { "-" } else { "" };
    Ok(Value::str(format!("{sign}0x{:x}", i.unsigned_abs())))
}

fn builtin_oct(_: &mut Interpreter, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> FaultResult<Value> {
    reject_kwargs("oct", &kwargs)?;
    expect_args("oct", &args, 1, 1)?;
    let i = args[0].expect_index()?;
    let sign = if i < 0 { "-" } else { "" };
    Ok(Value::str(format!("{sign}0o{:o}", i.unsigned_abs())))
}

fn builtin_hash(_: &mut Interpreter, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> FaultResult<Value> {
    reject_kwargs("hash", &kwargs)?;
    expect_args("hash", &args, 1, 1)?;
    let key = HashKey::from_value(&args[0])?;
    if let HashKey::Int(i) = key {
        return Ok(Value::Int(i));
    }
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    Ok(Value::Int(hasher.finish() as i64))
}

// ----------------------------------------------------------------------
// Conversions and constructors
// ----------------------------------------------------------------------

fn builtin_bool(_: &mut Interpreter, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> FaultResult<Value> {
    reject_kwargs("bool", &kwargs)?;
    expect_args("bool", &args, 0, 1)?;
    Ok(Value::Bool(args.first().map_or(false, Value::is_truthy)))
}

fn builtin_int(_: &mut Interpreter, mut args: Vec<Value>, mut kwargs: Vec<(String, Value)>) -> FaultResult<Value> {
    if let Some(base) = take_kwarg(&mut kwargs, "base") {
        args.push(base);
    }
    finish_kwargs("int", &kwargs)?;
    expect_args("int", &args, 0, 2)?;
    if args.len() == 2 {
        let base = args[1].expect_index()?;
        let Value::Str(text) = &args[0] else {
            return Err(Fault::type_error("int() can't convert non-string with explicit base"));
        };
        if base != 0 && !(2..=36).contains(&base) {
            return Err(Fault::value_error("int() base must be >= 2 and <= 36, or 0"));
        }
        return parse_int(text, base as u32);
    }
    match args.first() {
        None => Ok(Value::Int(0)),
        Some(Value::Bool(b)) => Ok(Value::Int(i64::from(*b))),
        Some(Value::Int(i)) => Ok(Value::Int(*i)),
        Some(Value::Float(f)) => float_to_int(*f),
        Some(Value::Str(text)) => parse_int(text, 10),
        Some(other) => Err(Fault::type_error(format!(
            "int() argument must be a string, a bytes-like object or a real number, not '{}'",
            other.type_name()
        ))),
    }
}

/// `int(text, base)`; base 0 infers the base from a prefix.
fn parse_int(text: &str, base: u32) -> FaultResult<Value> {
    let invalid = || {
        Fault::value_error(format!(
            "invalid literal for int() with base {base}: {}",
            Value::str(text).repr()
        ))
    };
    let trimmed = text.trim();
    let (negative, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let lower = unsigned.to_ascii_lowercase();
    let prefixed = |prefix: &str| lower.strip_prefix(prefix).map(str::to_string);
    let (radix, digits) = match base {
        0 | 16 if prefixed("0x").is_some() => (16, prefixed("0x").unwrap_or_default()),
        0 | 8 if prefixed("0o").is_some() => (8, prefixed("0o").unwrap_or_default()),
        0 | 2 if prefixed("0b").is_some() => (2, prefixed("0b").unwrap_or_default()),
        0 => (10, lower.clone()),
        other => (other, lower.clone()),
    };
    if digits.is_empty()
        || digits.starts_with('_')
        || digits.ends_with('_')
        || digits.contains("__")
    {
        return Err(invalid());
    }
    let cleaned: String = digits.chars().filter(|c| *c != '_').collect();
    let magnitude = u64::from_str_radix(&cleaned, radix).map_err(|e| {
        if matches!(e.kind(), std::num::IntErrorKind::PosOverflow) {
            Fault::overflow()
        } else {
            invalid()
        }
    })?;
    let value = if negative {
        0_i64.checked_sub_unsigned(magnitude)
    } else {
        i64::try_from(magnitude).ok()
    };
    value.map(Value::Int).ok_or_else(Fault::overflow)
}

fn builtin_float(_: &mut Interpreter, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> FaultResult<Value> {
    reject_kwargs("float", &kwargs)?;
    expect_args("float", &args, 0, 1)?;
    match args.first() {
        None => Ok(Value::Float(0.0)),
        Some(Value::Str(text)) => {
            let cleaned = text.trim().replace('_', "");
            cleaned.parse::<f64>().map(Value::Float).map_err(|_| {
                Fault::value_error(format!(
                    "could not convert string to float: {}",
                    Value::Str(text.clone()).repr()
                ))
            })
        }
        Some(other) => match other.as_number() {
            Some(n) => Ok(Value::Float(n.as_f64())),
            None => Err(Fault::type_error(format!(
                "float() argument must be a string or a real number, not '{}'",
                other.type_name()
            ))),
        },
    }
}

fn builtin_str(_: &mut Interpreter, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> FaultResult<Value> {
    reject_kwargs("str", &kwargs)?;
    expect_args("str", &args, 0, 1)?;
    Ok(match args.first() {
        None => Value::str(""),
        Some(Value::Str(s)) => Value::Str(s.clone()),
        Some(other) => Value::str(other.to_str()),
    })
}

fn builtin_repr(_: &mut Interpreter, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> FaultResult<Value> {
    reject_kwargs("repr", &kwargs)?;
    expect_args("repr", &args, 1, 1)?;
    Ok(Value::str(args[0].repr()))
}

fn builtin_chr(_: &mut Interpreter, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> FaultResult<Value> {
    reject_kwargs("chr", &kwargs)?;
    expect_args("chr", &args, 1, 1)?;
    let code = args[0].expect_index()?;
    u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .map(|c| Value::str(c.to_string()))
        .ok_or_else(|| Fault::value_error("chr() arg not in range(0x110000)"))
}

fn builtin_ord(_: &mut Interpreter, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> FaultResult<Value> {
    reject_kwargs("ord", &kwargs)?;
    expect_args("ord", &args, 1, 1)?;
    let Value::Str(s) = &args[0] else {
        return Err(Fault::type_error(format!(
            "ord() expected string of length 1, but {} found",
            args[0].type_name()
        )));
    };
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(Value::Int(i64::from(u32::from(c)))),
        _ => Err(Fault::type_error(format!(
            "ord() expected a character, but string of length {} found",
            s.chars().count()
        ))),
    }
}

fn builtin_format(_: &mut Interpreter, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> FaultResult<Value> {
    reject_kwargs("format", &kwargs)?;
    expect_args("format", &args, 1, 2)?;
    let spec = match args.get(1) {
        None => String::new(),
        Some(Value::Str(s)) => s.to_string(),
        Some(other) => {
            return Err(Fault::type_error(format!(
                "format() argument 2 must be str, not {}",
                other.type_name()
            )))
        }
    };
    Ok(Value::str(format::format_value(&args[0], &spec)?))
}

fn builtin_list(interp: &mut Interpreter, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> FaultResult<Value> {
    reject_kwargs("list", &kwargs)?;
    expect_args("list", &args, 0, 1)?;
    match args.first() {
        None => Ok(Value::list(Vec::new())),
        Some(iterable) => Ok(Value::list(interp.collect(iterable)?)),
    }
}

fn builtin_tuple(interp: &mut Interpreter, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> FaultResult<Value> {
    reject_kwargs("tuple", &kwargs)?;
    expect_args("tuple", &args, 0, 1)?;
    match args.first() {
        None => Ok(Value::tuple(Vec::new())),
        Some(Value::Tuple(items)) => Ok(Value::Tuple(items.clone())),
        Some(iterable) => Ok(Value::tuple(interp.collect(iterable)?)),
    }
}

fn builtin_set(interp: &mut Interpreter, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> FaultResult<Value> {
    reject_kwargs("set", &kwargs)?;
    expect_args("set", &args, 0, 1)?;
    match args.first() {
        None => Ok(Value::set(Set::new())),
        Some(iterable) => ops::set_from(interp.collect(iterable)?),
    }
}

fn builtin_dict(interp: &mut Interpreter, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> FaultResult<Value> {
    expect_args("dict", &args, 0, 1)?;
    let mut dict = Dict::new();
    if let Some(source) = args.first() {
        update_dict(interp, &mut dict, source)?;
    }
    for (key, value) in kwargs {
        dict.insert(Value::str(key), value)?;
    }
    Ok(Value::dict(dict))
}

/// `dict.update(source)` semantics: a mapping or an iterable of pairs.
pub fn update_dict(interp: &Interpreter, dict: &mut Dict, source: &Value) -> FaultResult<()> {
    if let Value::Dict(other) = source {
        let items = other.borrow().items();
        for (key, value) in items {
            dict.insert(key, value)?;
        }
        return Ok(());
    }
    for (i, element) in interp.collect(source)?.into_iter().enumerate() {
        let pair = interp.collect(&element).map_err(|_| {
            Fault::type_error(format!(
                "cannot convert dictionary update sequence element #{i} to a sequence"
            ))
        })?;
        let [key, value]: [Value; 2] = pair.try_into().map_err(|pair: Vec<Value>| {
            Fault::value_error(format!(
                "dictionary update sequence element #{i} has length {}; 2 is required",
                pair.len()
            ))
        })?;
        interp.limits().check_len(dict.len() + 1)?;
        dict.insert(key, value)?;
    }
    Ok(())
}

fn builtin_range(_: &mut Interpreter, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> FaultResult<Value> {
    reject_kwargs("range", &kwargs)?;
    expect_args("range", &args, 1, 3)?;
    let mut bounds = Vec::with_capacity(3);
    for arg in &args {
        bounds.push(arg.expect_index()?);
    }
    let range = match bounds[..] {
        [stop] => Range {
            start: 0,
            stop,
            step: 1,
        },
        [start, stop] => Range { start, stop, step: 1 },
        [start, stop, step] => {
            if step == 0 {
                return Err(Fault::value_error("range() arg 3 must not be zero"));
            }
            Range { start, stop, step }
        }
        _ => return Err(Fault::type_error("range expected at most 3 arguments")),
    };
    Ok(Value::Range(range))
}

// ----------------------------------------------------------------------
// Introspection
// ----------------------------------------------------------------------

fn builtin_callable(_: &mut Interpreter, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> FaultResult<Value> {
    reject_kwargs("callable", &kwargs)?;
    expect_args("callable", &args, 1, 1)?;
    Ok(Value::Bool(args[0].is_callable()))
}

fn attribute_name<'a>(func: &str, value: &'a Value) -> FaultResult<&'a str> {
    match value {
        Value::Str(s) => Ok(&**s),
        other => Err(Fault::type_error(format!(
            "{func}(): attribute name must be string, not '{}'",
            other.type_name()
        ))),
    }
}

fn builtin_getattr(_: &mut Interpreter, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> FaultResult<Value> {
    reject_kwargs("getattr", &kwargs)?;
    expect_args("getattr", &args, 2, 3)?;
    let name = attribute_name("getattr", &args[1])?;
    if name.starts_with("__") {
        return Err(Fault::raised(
            ExcKind::AttributeError,
            "Access to dunder attributes is not allowed",
        ));
    }
    match methods::get_attribute(&args[0], name) {
        Err(fault) if fault.kind() == Some(ExcKind::AttributeError) && args.len() == 3 => {
            Ok(args[2].clone())
        }
        other => other,
    }
}

fn builtin_hasattr(_: &mut Interpreter, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> FaultResult<Value> {
    reject_kwargs("hasattr", &kwargs)?;
    expect_args("hasattr", &args, 2, 2)?;
    let name = attribute_name("hasattr", &args[1])?;
    if name.starts_with("__") {
        return Ok(Value::Bool(false));
    }
    Ok(Value::Bool(methods::get_attribute(&args[0], name).is_ok()))
}

fn builtin_isinstance(_: &mut Interpreter, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> FaultResult<Value> {
    reject_kwargs("isinstance", &kwargs)?;
    expect_args("isinstance", &args, 2, 2)?;
    Ok(Value::Bool(is_instance(&args[0], &args[1])?))
}

fn is_instance(value: &Value, class: &Value) -> FaultResult<bool> {
    match class {
        Value::Builtin(builtin) if builtin.is_type() => Ok(match builtin.name {
            "int" => matches!(value, Value::Int(_) | Value::Bool(_)),
            "float" => matches!(value, Value::Float(_)),
            "str" => matches!(value, Value::Str(_)),
            "bool" => matches!(value, Value::Bool(_)),
            "list" => matches!(value, Value::List(_)),
            "tuple" => matches!(value, Value::Tuple(_)),
            "dict" => matches!(value, Value::Dict(_)),
            "set" | "frozenset" => matches!(value, Value::Set(_)),
            _ => false,
        }),
        Value::ExceptionType(kind) => Ok(match value {
            Value::Exception(obj) => obj.kind.is_subclass_of(*kind),
            _ => false,
        }),
        Value::Tuple(classes) => {
            for class in classes.iter() {
                if is_instance(value, class)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        _ => Err(Fault::type_error(
            "isinstance() arg 2 must be a type, a tuple of types, or a union",
        )),
    }
}

fn builtin_len(_: &mut Interpreter, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> FaultResult<Value> {
    reject_kwargs("len", &kwargs)?;
    expect_args("len", &args, 1, 1)?;
    let len = match &args[0] {
        Value::Str(s) => s.chars().count(),
        Value::List(items) => items.borrow().len(),
        Value::Tuple(items) => items.len(),
        Value::Dict(dict) => dict.borrow().len(),
        Value::Set(set) => set.borrow().len(),
        Value::Range(range) => range.len(),
        other => {
            return Err(Fault::type_error(format!(
                "object of type '{}' has no len()",
                other.type_name()
            )))
        }
    };
    Ok(Value::Int(i64::try_from(len).map_err(|_| Fault::overflow())?))
}

// ----------------------------------------------------------------------
// Iteration
// ----------------------------------------------------------------------

fn builtin_all(interp: &mut Interpreter, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> FaultResult<Value> {
    reject_kwargs("all", &kwargs)?;
    expect_args("all", &args, 1, 1)?;
    for item in interp.iterate(&args[0])? {
        if !item.is_truthy() {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

fn builtin_any(interp: &mut Interpreter, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> FaultResult<Value> {
    reject_kwargs("any", &kwargs)?;
    expect_args("any", &args, 1, 1)?;
    for item in interp.iterate(&args[0])? {
        if item.is_truthy() {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn builtin_enumerate(interp: &mut Interpreter, mut args: Vec<Value>, mut kwargs: Vec<(String, Value)>) -> FaultResult<Value> {
    if let Some(start) = take_kwarg(&mut kwargs, "start") {
        args.push(start);
    }
    finish_kwargs("enumerate", &kwargs)?;
    expect_args("enumerate", &args, 1, 2)?;
    let start = match args.get(1) {
        Some(start) => start.expect_index()?,
        None => 0,
    };
    let items = interp.collect(&args[0])?;
    let mut out = Vec::with_capacity(items.len());
    for (offset, item) in items.into_iter().enumerate() {
        let index = i64::try_from(offset)
            .ok()
            .and_then(|o| start.checked_add(o))
            .ok_or_else(Fault::overflow)?;
        out.push(Value::tuple(vec![Value::Int(index), item]));
    }
    Ok(Value::iterator(out))
}

fn builtin_filter(interp: &mut Interpreter, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> FaultResult<Value> {
    reject_kwargs("filter", &kwargs)?;
    expect_args("filter", &args, 2, 2)?;
    let mut out = Vec::new();
    for item in interp.collect(&args[1])? {
        let keep = match &args[0] {
            Value::None => item.is_truthy(),
            func => interp.call(func, vec![item.clone()], Vec::new())?.is_truthy(),
        };
        if keep {
            out.push(item);
        }
    }
    Ok(Value::iterator(out))
}

fn builtin_map(interp: &mut Interpreter, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> FaultResult<Value> {
    reject_kwargs("map", &kwargs)?;
    expect_args("map", &args, 2, usize::MAX)?;
    let mut columns = Vec::with_capacity(args.len() - 1);
    for iterable in &args[1..] {
        columns.push(interp.collect(iterable)?.into_iter());
    }
    let shortest = columns.iter().map(|c| c.len()).min().unwrap_or(0);
    let mut out = Vec::with_capacity(shortest);
    for _ in 0..shortest {
        let call_args: Vec<Value> = columns.iter_mut().filter_map(Iterator::next).collect();
        out.push(interp.call(&args[0], call_args, Vec::new())?);
    }
    Ok(Value::iterator(out))
}

fn builtin_zip(interp: &mut Interpreter, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> FaultResult<Value> {
    reject_kwargs("zip", &kwargs)?;
    let mut columns = Vec::with_capacity(args.len());
    for iterable in &args {
        columns.push(interp.collect(iterable)?.into_iter());
    }
    let shortest = columns.iter().map(|c| c.len()).min().unwrap_or(0);
    let mut out = Vec::with_capacity(shortest);
    for _ in 0..shortest {
        out.push(Value::tuple(columns.iter_mut().filter_map(Iterator::next).collect()));
    }
    Ok(Value::iterator(out))
}

fn builtin_iter(interp: &mut Interpreter, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> FaultResult<Value> {
    reject_kwargs("iter", &kwargs)?;
    expect_args("iter", &args, 1, 1)?;
    Ok(wrap_iter(interp.iterate(&args[0])?))
}

fn builtin_next(_: &mut Interpreter, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> FaultResult<Value> {
    reject_kwargs("next", &kwargs)?;
    expect_args("next", &args, 1, 2)?;
    let Value::Iterator(source) = &args[0] else {
        return Err(Fault::type_error(format!(
            "'{}' object is not an iterator",
            args[0].type_name()
        )));
    };
    let next = source.borrow_mut().next();
    match (next, args.get(1)) {
        (Some(value), _) => Ok(value),
        (None, Some(default)) => Ok(default.clone()),
        (None, None) => Err(Fault::raised(ExcKind::StopIteration, "")),
    }
}

fn builtin_reversed(interp: &mut Interpreter, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> FaultResult<Value> {
    reject_kwargs("reversed", &kwargs)?;
    expect_args("reversed", &args, 1, 1)?;
    match &args[0] {
        Value::List(_) | Value::Tuple(_) | Value::Str(_) | Value::Range(_) | Value::Dict(_) => {
            let mut items = interp.collect(&args[0])?;
            items.reverse();
            Ok(Value::iterator(items))
        }
        other => Err(Fault::type_error(format!(
            "'{}' object is not reversible",
            other.type_name()
        ))),
    }
}

fn builtin_sorted(interp: &mut Interpreter, args: Vec<Value>, mut kwargs: Vec<(String, Value)>) -> FaultResult<Value> {
    let key = take_kwarg(&mut kwargs, "key");
    let reverse = take_kwarg(&mut kwargs, "reverse").map_or(false, |r| r.is_truthy());
    finish_kwargs("sorted", &kwargs)?;
    expect_args("sorted", &args, 1, 1)?;
    let items = interp.collect(&args[0])?;
    Ok(Value::list(interp.sort_values(items, key.as_ref(), reverse)?))
}

fn builtin_sum(interp: &mut Interpreter, mut args: Vec<Value>, mut kwargs: Vec<(String, Value)>) -> FaultResult<Value> {
    if let Some(start) = take_kwarg(&mut kwargs, "start") {
        args.push(start);
    }
    finish_kwargs("sum", &kwargs)?;
    expect_args("sum", &args, 1, 2)?;
    let mut total = args.get(1).cloned().unwrap_or(Value::Int(0));
    if matches!(total, Value::Str(_)) {
        return Err(Fault::type_error(
            "sum() can't sum strings [use ''.join(seq) instead]",
        ));
    }
    for item in interp.iterate(&args[0])? {
        total = ops::binary_op(BinOp::Add, &total, &item, interp.limits())?;
    }
    Ok(total)
}

fn builtin_max(interp: &mut Interpreter, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> FaultResult<Value> {
    extremum(interp, "max", args, kwargs, std::cmp::Ordering::Greater)
}

fn builtin_min(interp: &mut Interpreter, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> FaultResult<Value> {
    extremum(interp, "min", args, kwargs, std::cmp::Ordering::Less)
}

fn extremum(
    interp: &mut Interpreter,
    name: &str,
    args: Vec<Value>,
    mut kwargs: Vec<(String, Value)>,
    wanted: std::cmp::Ordering,
) -> FaultResult<Value> {
    let key = take_kwarg(&mut kwargs, "key").filter(|k| !matches!(k, Value::None));
    let default = take_kwarg(&mut kwargs, "default");
    finish_kwargs(name, &kwargs)?;
    expect_args(name, &args, 1, usize::MAX)?;

    let candidates = if args.len() == 1 {
        interp.collect(&args[0])?
    } else {
        if default.is_some() {
            return Err(Fault::type_error(format!(
                "Cannot specify a default for {name}() with multiple positional arguments"
            )));
        }
        args
    };

    let symbol = if wanted == std::cmp::Ordering::Greater { ">" } else { "<" };
    let mut best: Option<(Value, Value)> = None;
    for item in candidates {
        let item_key = match &key {
            Some(func) => interp.call(func, vec![item.clone()], Vec::new())?,
            None => item.clone(),
        };
        let replace = match &best {
            None => true,
            Some((best_key, _)) => item_key.py_cmp(best_key, symbol)? == Some(wanted),
        };
        if replace {
            best = Some((item_key, item));
        }
    }
    match (best, default) {
        (Some((_, item)), _) => Ok(item),
        (None, Some(default)) => Ok(default),
        (None, None) => Err(Fault::value_error(format!(
            "{name}() arg is an empty sequence"
        ))),
    }
}

// ----------------------------------------------------------------------
// Output
// ----------------------------------------------------------------------

fn builtin_print(interp: &mut Interpreter, args: Vec<Value>, mut kwargs: Vec<(String, Value)>) -> FaultResult<Value> {
    let text_kwarg = |value: Option<Value>, default: &str, name: &str| -> FaultResult<String> {
        match value {
            None | Some(Value::None) => Ok(default.to_string()),
            Some(Value::Str(s)) => Ok(s.to_string()),
            Some(other) => Err(Fault::type_error(format!(
                "{name} must be None or a string, not {}",
                other.type_name()
            ))),
        }
    };
    let sep = text_kwarg(take_kwarg(&mut kwargs, "sep"), " ", "sep")?;
    let end = text_kwarg(take_kwarg(&mut kwargs, "end"), "\n", "end")?;
    take_kwarg(&mut kwargs, "flush");
    finish_kwargs("print", &kwargs)?;

    let line = args.iter().map(Value::to_str).collect::<Vec<_>>().join(&sep);
    let sink = interp.output_mut();
    sink.write(&line);
    sink.write(&end);
    Ok(Value::None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GradeLimits;

    fn interp() -> Interpreter {
        Interpreter::new(&GradeLimits::default())
    }

    fn call(name: &str, args: Vec<Value>) -> FaultResult<Value> {
        let builtin = lookup(name).expect("bound");
        interp().call(&builtin, args, Vec::new())
    }

    fn ints(values: &[i64]) -> Value {
        Value::list(values.iter().copied().map(Value::Int).collect())
    }

    #[test]
    fn dangerous_names_are_unbound() {
        for name in ["eval", "exec", "open", "__import__", "globals", "locals", "vars", "compile", "input", "object"] {
            assert!(lookup(name).is_none(), "{name} must not be bound");
        }
        assert!(lookup("len").is_some());
        assert!(matches!(lookup("ValueError"), Some(Value::ExceptionType(ExcKind::ValueError))));
    }

    #[test]
    fn conversions() {
        assert_eq!(call("int", vec![Value::str(" -42 ")]).unwrap().repr(), "-42");
        assert_eq!(call("int", vec![Value::Float(-3.9)]).unwrap().repr(), "-3");
        assert_eq!(
            call("int", vec![Value::str("ff"), Value::Int(16)]).unwrap().repr(),
            "255"
        );
        assert_eq!(
            call("int", vec![Value::str("abc")]).unwrap_err().to_string(),
            "ValueError: invalid literal for int() with base 10: 'abc'"
        );
        assert_eq!(call("float", vec![Value::str("2.5")]).unwrap().repr(), "2.5");
        assert_eq!(call("str", vec![Value::Float(1e20)]).unwrap().repr(), "'1e+20'");
        assert_eq!(call("hex", vec![Value::Int(-255)]).unwrap().repr(), "'-0xff'");
        assert_eq!(call("chr", vec![Value::Int(97)]).unwrap().repr(), "'a'");
        assert_eq!(call("ord", vec![Value::str("a")]).unwrap().repr(), "97");
    }

    #[test]
    fn rounding_is_half_even() {
        assert_eq!(call("round", vec![Value::Float(2.5)]).unwrap().repr(), "2");
        assert_eq!(call("round", vec![Value::Float(3.5)]).unwrap().repr(), "4");
        assert_eq!(
            call("round", vec![Value::Float(2.675), Value::Int(2)]).unwrap().repr(),
            "2.67"
        );
    }

    #[test]
    fn aggregates() {
        assert_eq!(call("sum", vec![ints(&[1, 2, 3])]).unwrap().repr(), "6");
        assert_eq!(call("max", vec![ints(&[3, 9, 2])]).unwrap().repr(), "9");
        assert_eq!(call("min", vec![Value::Int(4), Value::Int(-1)]).unwrap().repr(), "-1");
        assert_eq!(
            call("max", vec![ints(&[])]).unwrap_err().to_string(),
            "ValueError: max() arg is an empty sequence"
        );
        assert_eq!(call("divmod", vec![Value::Int(-7), Value::Int(2)]).unwrap().repr(), "(-4, 1)");
        assert_eq!(
            call("pow", vec![Value::Int(3), Value::Int(200), Value::Int(13)]).unwrap().repr(),
            "9"
        );
    }

    #[test]
    fn iteration_helpers() {
        let mut interp = interp();
        let zip = lookup("zip").unwrap();
        let zipped = interp
            .call(&zip, vec![ints(&[1, 2, 3]), Value::str("ab")], Vec::new())
            .unwrap();
        let list = lookup("list").unwrap();
        let listed = interp.call(&list, vec![zipped], Vec::new()).unwrap();
        assert_eq!(listed.repr(), "[(1, 'a'), (2, 'b')]");

        let sorted = lookup("sorted").unwrap();
        let out = interp
            .call(
                &sorted,
                vec![ints(&[3, 1, 2])],
                vec![("reverse".to_string(), Value::Bool(true))],
            )
            .unwrap();
        assert_eq!(out.repr(), "[3, 2, 1]");

        let iter = lookup("iter").unwrap();
        let next = lookup("next").unwrap();
        let it = interp.call(&iter, vec![ints(&[7])], Vec::new()).unwrap();
        assert_eq!(interp.call(&next, vec![it.clone()], Vec::new()).unwrap().repr(), "7");
        let err = interp.call(&next, vec![it.clone()], Vec::new()).unwrap_err();
        assert_eq!(err.kind(), Some(ExcKind::StopIteration));
        assert_eq!(
            interp.call(&next, vec![it, Value::None], Vec::new()).unwrap().repr(),
            "None"
        );
    }

    #[test]
    fn isinstance_treats_bool_as_int() {
        let int = lookup("int").unwrap();
        assert_eq!(call("isinstance", vec![Value::Bool(true), int.clone()]).unwrap().repr(), "True");
        let classes = Value::tuple(vec![lookup("str").unwrap(), lookup("float").unwrap()]);
        assert_eq!(call("isinstance", vec![Value::Int(1), classes]).unwrap().repr(), "False");
    }

    #[test]
    fn getattr_refuses_dunder_names() {
        let err = call("getattr", vec![ints(&[]), Value::str("__class__")]).unwrap_err();
        assert_eq!(err.kind(), Some(ExcKind::AttributeError));
        assert_eq!(
            call("hasattr", vec![ints(&[]), Value::str("__class__")]).unwrap().repr(),
            "False"
        );
        assert_eq!(
            call("hasattr", vec![ints(&[]), Value::str("append")]).unwrap().repr(),
            "True"
        );
    }

    #[test]
    fn print_goes_to_the_sink() {
        let mut interp = interp();
        let print = lookup("print").unwrap();
        interp
            .call(
                &print,
                vec![Value::Int(1), Value::str("a")],
                vec![("sep".to_string(), Value::str("-"))],
            )
            .unwrap();
        assert_eq!(interp.output().contents(), "1-a\n");
    }

    #[test]
    fn dict_from_pairs_and_kwargs() {
        let mut interp = interp();
        let dict = lookup("dict").unwrap();
        let pairs = Value::list(vec![Value::tuple(vec![Value::str("a"), Value::Int(1)])]);
        let out = interp
            .call(&dict, vec![pairs], vec![("b".to_string(), Value::Int(2))])
            .unwrap();
        assert_eq!(out.repr(), "{'a': 1, 'b': 2}");
        let bad = Value::list(vec![Value::tuple(vec![Value::Int(1)])]);
        let err = interp.call(&dict, vec![bad], Vec::new()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "ValueError: dictionary update sequence element #0 has length 1; 2 is required"
        );
    }
}
