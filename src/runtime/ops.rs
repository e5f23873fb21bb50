//! Arithmetic, bitwise, membership and sequence operators.

use super::dict::Set;
use super::fault::{ExcKind, Fault, FaultResult};
use super::format::percent_format;
use super::value::{Number, Value};
use super::RuntimeLimits;
use crate::lang::ast::{BinOp, UnaryOp};

pub fn binary_op(op: BinOp, left: &Value, right: &Value, limits: &RuntimeLimits) -> FaultResult<Value> {
    if let (Some(a), Some(b)) = (left.as_number(), right.as_number()) {
        if let Some(result) = numeric_op(op, a, b, left, right)? {
            return Ok(result);
        }
    }

    match (op, left, right) {
        (BinOp::Add, Value::Str(a), Value::Str(b)) => {
            limits.check_str(a.len() + b.len())?;
            let mut out = String::with_capacity(a.len() + b.len());
            out.push_str(a);
            out.push_str(b);
            Ok(Value::str(out))
        }
        (BinOp::Add, Value::List(a), Value::List(b)) => {
            let (a, b) = (a.borrow(), b.borrow());
            limits.check_len(a.len() + b.len())?;
            let mut out = Vec::with_capacity(a.len() + b.len());
            out.extend(a.iter().cloned());
            out.extend(b.iter().cloned());
            Ok(Value::list(out))
        }
        (BinOp::Add, Value::Tuple(a), Value::Tuple(b)) => {
            limits.check_len(a.len() + b.len())?;
            Ok(Value::tuple(a.iter().chain(b.iter()).cloned().collect()))
        }
        (BinOp::Add, Value::Str(_), other)
        | (BinOp::Add, Value::List(_), other)
        | (BinOp::Add, Value::Tuple(_), other) => Err(Fault::type_error(format!(
            "can only concatenate {} (not \"{}\") to {}",
            left.type_name(),
            other.type_name(),
            left.type_name()
        ))),
        (BinOp::Mul, seq, count) | (BinOp::Mul, count, seq)
            if count.as_index().is_some() && is_sequence(seq) =>
        {
            repeat(seq, count.as_index().unwrap_or(0), limits)
        }
        (BinOp::Mod, Value::Str(template), args) => percent_format(template, args),
        (BinOp::Sub, Value::Set(a), Value::Set(b)) => {
            Ok(Value::set(a.borrow().difference(&b.borrow())?))
        }
        (BinOp::BitOr, Value::Set(a), Value::Set(b)) => {
            Ok(Value::set(a.borrow().union(&b.borrow())?))
        }
        (BinOp::BitAnd, Value::Set(a), Value::Set(b)) => {
            Ok(Value::set(a.borrow().intersection(&b.borrow())?))
        }
        (BinOp::BitXor, Value::Set(a), Value::Set(b)) => {
            Ok(Value::set(a.borrow().symmetric_difference(&b.borrow())?))
        }
        (BinOp::BitOr, Value::Dict(a), Value::Dict(b)) => {
            let mut merged = a.borrow().clone();
            for (key, value) in b.borrow().iter() {
                merged.insert(key.clone(), value.clone())?;
            }
            Ok(Value::dict(merged))
        }
        _ => Err(unsupported(op.symbol(), left, right)),
    }
}

fn unsupported(symbol: &str, left: &Value, right: &Value) -> Fault {
    Fault::type_error(format!(
        "unsupported operand type(s) for {symbol}: '{}' and '{}'",
        left.type_name(),
        right.type_name()
    ))
}

fn is_sequence(value: &Value) -> bool {
    matches!(value, Value::Str(_) | Value::List(_) | Value::Tuple(_))
}

fn repeat(seq: &Value, count: i64, limits: &RuntimeLimits) -> FaultResult<Value> {
    let count = usize::try_from(count.max(0)).unwrap_or(0);
    match seq {
        Value::Str(s) => {
            limits.check_str(s.len().saturating_mul(count))?;
            Ok(Value::str(s.repeat(count)))
        }
        Value::List(items) => {
            let items = items.borrow();
            limits.check_len(items.len().saturating_mul(count))?;
            Ok(Value::list(repeat_items(&items, count)))
        }
        Value::Tuple(items) => {
            limits.check_len(items.len().saturating_mul(count))?;
            Ok(Value::tuple(repeat_items(items, count)))
        }
        _ => Err(Fault::type_error("can't multiply sequence by non-int")),
    }
}

fn repeat_items(items: &[Value], count: usize) -> Vec<Value> {
    let mut out = Vec::with_capacity(items.len() * count);
    for _ in 0..count {
        out.extend(items.iter().cloned());
    }
    out
}

/// `Ok(None)` when the operator has no numeric meaning for these operands.
fn numeric_op(op: BinOp, a: Number, b: Number, left: &Value, right: &Value) -> FaultResult<Option<Value>> {
    let both_bool = matches!((left, right), (Value::Bool(_), Value::Bool(_)));
    let value = match (a, b) {
        (Number::Int(x), Number::Int(y)) => match op {
            BinOp::Add => Value::Int(x.checked_add(y).ok_or_else(Fault::overflow)?),
            BinOp::Sub => Value::Int(x.checked_sub(y).ok_or_else(Fault::overflow)?),
            BinOp::Mul => Value::Int(x.checked_mul(y).ok_or_else(Fault::overflow)?),
            BinOp::Div => {
                if y == 0 {
                    return Err(Fault::zero_division("division by zero"));
                }
                Value::Float(x as f64 / y as f64)
            }
            BinOp::FloorDiv => Value::Int(int_floor_div(x, y)?),
            BinOp::Mod => Value::Int(int_mod(x, y)?),
            BinOp::Pow => int_pow(x, y)?,
            BinOp::LShift => {
                if y < 0 {
                    return Err(Fault::value_error("negative shift count"));
                }
                if x == 0 {
                    Value::Int(0)
                } else {
                    let shift = u32::try_from(y).map_err(|_| Fault::overflow())?;
                    let shifted = x.checked_shl(shift).ok_or_else(Fault::overflow)?;
                    if shifted >> shift != x {
                        return Err(Fault::overflow());
                    }
                    Value::Int(shifted)
                }
            }
            BinOp::RShift => {
                if y < 0 {
                    return Err(Fault::value_error("negative shift count"));
                }
                Value::Int(x >> y.min(63))
            }
            BinOp::BitAnd if both_bool => Value::Bool(x & y != 0),
            BinOp::BitOr if both_bool => Value::Bool(x | y != 0),
            BinOp::BitXor if both_bool => Value::Bool(x ^ y != 0),
            BinOp::BitAnd => Value::Int(x & y),
            BinOp::BitOr => Value::Int(x | y),
            BinOp::BitXor => Value::Int(x ^ y),
        },
        _ => {
            let (x, y) = (a.as_f64(), b.as_f64());
            match op {
                BinOp::Add => Value::Float(x + y),
                BinOp::Sub => Value::Float(x - y),
                BinOp::Mul => Value::Float(x * y),
                BinOp::Div => {
                    if y == 0.0 {
                        return Err(Fault::zero_division("float division by zero"));
                    }
                    Value::Float(x / y)
                }
                BinOp::FloorDiv => {
                    if y == 0.0 {
                        return Err(Fault::zero_division("float floor division by zero"));
                    }
                    Value::Float((x / y).floor())
                }
                BinOp::Mod => {
                    if y == 0.0 {
                        return Err(Fault::zero_division("float modulo"));
                    }
                    Value::Float(float_mod(x, y))
                }
                BinOp::Pow => float_pow(x, y)?,
                _ => return Ok(None),
            }
        }
    };
    Ok(Some(value))
}

pub fn int_floor_div(x: i64, y: i64) -> FaultResult<i64> {
    if y == 0 {
        return Err(Fault::zero_division("integer division or modulo by zero"));
    }
    let q = x.checked_div(y).ok_or_else(Fault::overflow)?;
    if x % y != 0 && ((x < 0) != (y < 0)) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

pub fn int_mod(x: i64, y: i64) -> FaultResult<i64> {
    if y == 0 {
        return Err(Fault::zero_division("integer modulo by zero"));
    }
    let r = x.checked_rem(y).unwrap_or(0);
    if r != 0 && ((r < 0) != (y < 0)) {
        Ok(r + y)
    } else {
        Ok(r)
    }
}

pub fn float_mod(x: f64, y: f64) -> f64 {
    let r = x % y;
    if r != 0.0 && ((r < 0.0) != (y < 0.0)) {
        r + y
    } else {
        r
    }
}

pub fn int_pow(base: i64, exp: i64) -> FaultResult<Value> {
    if exp < 0 {
        if base == 0 {
            return Err(Fault::zero_division(
                "0.0 cannot be raised to a negative power",
            ));
        }
        return Ok(Value::Float((base as f64).powf(exp as f64)));
    }
    match base {
        0 | 1 => return Ok(Value::Int(if exp == 0 { 1 } else { base })),
        -1 => return Ok(Value::Int(if exp % 2 == 0 { 1 } else { -1 })),
        _ => {}
    }
    let exp = u32::try_from(exp).map_err(|_| Fault::overflow())?;
    base.checked_pow(exp).map(Value::Int).ok_or_else(Fault::overflow)
}

fn float_pow(x: f64, y: f64) -> FaultResult<Value> {
    if x == 0.0 && y < 0.0 {
        return Err(Fault::zero_division(
            "0.0 cannot be raised to a negative power",
        ));
    }
    if x < 0.0 && y.fract() != 0.0 && y.is_finite() {
        return Err(Fault::value_error("complex results are not supported"));
    }
    let result = x.powf(y);
    if result.is_infinite() && x.is_finite() && y.is_finite() {
        return Err(Fault::raised(
            ExcKind::OverflowError,
            "(34, 'Numerical result out of range')",
        ));
    }
    Ok(Value::Float(result))
}

pub fn unary_op(op: UnaryOp, operand: &Value) -> FaultResult<Value> {
    match (op, operand.as_number()) {
        (UnaryOp::Not, _) => Ok(Value::Bool(!operand.is_truthy())),
        (UnaryOp::Neg, Some(Number::Int(i))) => {
            Ok(Value::Int(i.checked_neg().ok_or_else(Fault::overflow)?))
        }
        (UnaryOp::Neg, Some(Number::Float(f))) => Ok(Value::Float(-f)),
        (UnaryOp::Pos, Some(Number::Int(i))) => Ok(Value::Int(i)),
        (UnaryOp::Pos, Some(Number::Float(f))) => Ok(Value::Float(f)),
        (UnaryOp::Invert, Some(Number::Int(i))) => Ok(Value::Int(!i)),
        _ => {
            let symbol = match op {
                UnaryOp::Neg => "-",
                UnaryOp::Pos => "+",
                _ => "~",
            };
            Err(Fault::type_error(format!(
                "bad operand type for unary {symbol}: '{}'",
                operand.type_name()
            )))
        }
    }
}

/// `item in container`.
pub fn contains(container: &Value, item: &Value) -> FaultResult<bool> {
    match container {
        Value::Str(haystack) => match item {
            Value::Str(needle) => Ok(haystack.contains(needle.as_ref())),
            other => Err(Fault::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(items) => Ok(items.borrow().iter().any(|v| v.py_eq(item))),
        Value::Tuple(items) => Ok(items.iter().any(|v| v.py_eq(item))),
        Value::Dict(dict) => dict.borrow().contains(item),
        Value::Set(set) => set.borrow().contains(item),
        Value::Range(range) => Ok(match item {
            Value::Float(f) if f.fract() == 0.0 => range.contains(*f as i64),
            other => other.as_index().map_or(false, |i| range.contains(i)),
        }),
        Value::Iterator(source) => {
            let mut source = source.borrow_mut();
            Ok(source.any(|v| v.py_eq(item)))
        }
        other => Err(Fault::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

/// In-place forms that mutate the left operand instead of rebinding it.
/// Returns `None` when the regular binary operator applies.
pub fn inplace_op(
    op: BinOp,
    target: &Value,
    items: impl FnOnce() -> FaultResult<Vec<Value>>,
    right: &Value,
    limits: &RuntimeLimits,
) -> FaultResult<Option<Value>> {
    match (op, target) {
        (BinOp::Add, Value::List(list)) => {
            let extra = items()?;
            limits.check_len(list.borrow().len() + extra.len())?;
            list.borrow_mut().extend(extra);
            Ok(Some(target.clone()))
        }
        (BinOp::Mul, Value::List(list)) => {
            let count = right.expect_index()?;
            let repeated = match repeat(target, count, limits)? {
                Value::List(repeated) => repeated.borrow().clone(),
                _ => Vec::new(),
            };
            *list.borrow_mut() = repeated;
            Ok(Some(target.clone()))
        }
        (BinOp::BitOr, Value::Set(set)) if matches!(right, Value::Set(_)) => {
            let extra = items()?;
            let mut set = set.borrow_mut();
            for value in extra {
                set.add(value)?;
            }
            limits.check_len(set.len())?;
            Ok(Some(target.clone()))
        }
        _ => Ok(None),
    }
}

pub fn set_from(values: Vec<Value>) -> FaultResult<Value> {
    Ok(Value::set(Set::from_values(values)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::value::Range;

    fn limits() -> RuntimeLimits {
        RuntimeLimits {
            max_recursion_depth: 50,
            max_container_len: 1_000,
            max_str_bytes: 1_000,
            max_output_bytes: 100,
        }
    }

    fn int(i: i64) -> Value {
        Value::Int(i)
    }

    #[test]
    fn floor_division_and_modulo_follow_divisor_sign() {
        assert_eq!(int_floor_div(-7, 2).unwrap(), -4);
        assert_eq!(int_mod(-7, 2).unwrap(), 1);
        assert_eq!(int_mod(7, -2).unwrap(), -1);
        assert_eq!(float_mod(-7.5, 2.0), 0.5);
    }

    #[test]
    fn integer_overflow_raises() {
        let err = binary_op(BinOp::Mul, &int(i64::MAX), &int(2), &limits()).unwrap_err();
        assert_eq!(err.kind(), Some(ExcKind::OverflowError));
        assert!(int_pow(2, 64).is_err());
        assert!(matches!(int_pow(2, 10).unwrap(), Value::Int(1024)));
    }

    #[test]
    fn division_by_zero_messages() {
        let err = binary_op(BinOp::Div, &int(1), &int(0), &limits()).unwrap_err();
        assert_eq!(err.to_string(), "ZeroDivisionError: division by zero");
    }

    #[test]
    fn mixed_numeric_promotes_to_float() {
        let value = binary_op(BinOp::Add, &int(1), &Value::Float(0.5), &limits()).unwrap();
        assert!(matches!(value, Value::Float(f) if f == 1.5));
        let value = binary_op(BinOp::Add, &Value::Bool(true), &int(1), &limits()).unwrap();
        assert!(matches!(value, Value::Int(2)));
    }

    #[test]
    fn repetition_is_capped_before_allocating() {
        let err = binary_op(BinOp::Mul, &Value::str("ab"), &int(1_000_000_000_000), &limits())
            .unwrap_err();
        assert!(matches!(err, Fault::Exhausted(ref m) if m.starts_with("MemoryError")));
        let ok = binary_op(BinOp::Mul, &int(3), &Value::str("ab"), &limits()).unwrap();
        assert_eq!(ok.to_str(), "ababab");
    }

    #[test]
    fn concatenation_type_errors() {
        let err = binary_op(BinOp::Add, &Value::str("a"), &int(1), &limits()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: can only concatenate str (not \"int\") to str"
        );
        let err = binary_op(BinOp::Sub, &Value::str("a"), &int(1), &limits()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: unsupported operand type(s) for -: 'str' and 'int'"
        );
    }

    #[test]
    fn membership() {
        assert!(contains(&Value::str("hello"), &Value::str("ell")).unwrap());
        assert!(contains(&Value::list(vec![int(1), int(2)]), &Value::Float(2.0)).unwrap());
        assert!(contains(&Value::Range(Range { start: 0, stop: 10, step: 2 }), &int(4)).unwrap());
        assert!(contains(&int(3), &int(3)).is_err());
    }
}
