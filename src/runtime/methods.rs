//! Attribute access and methods of the builtin container and string types.

use std::rc::Rc;

use super::builtins::{expect_args, finish_kwargs, reject_kwargs, take_kwarg, update_dict};
use super::dict::{Dict, Set};
use super::fault::{ExcKind, Fault, FaultResult};
use super::format;
use super::interp::{slice_positions, Interpreter};
use super::value::{BoundMethod, Value};

const STR_METHODS: &[&str] = &[
    "capitalize", "center", "count", "endswith", "find", "format", "index", "isalnum",
    "isalpha", "isdigit", "islower", "isspace", "isupper", "join", "ljust", "lower",
    "lstrip", "replace", "rfind", "rjust", "rsplit", "rstrip", "split", "splitlines",
    "startswith", "strip", "title", "upper", "zfill",
];

const LIST_METHODS: &[&str] = &[
    "append", "clear", "copy", "count", "extend", "index", "insert", "pop", "remove",
    "reverse", "sort",
];

const DICT_METHODS: &[&str] = &[
    "clear", "copy", "get", "items", "keys", "pop", "popitem", "setdefault", "update",
    "values",
];

const SET_METHODS: &[&str] = &[
    "add", "clear", "copy", "difference", "discard", "intersection", "isdisjoint",
    "issubset", "issuperset", "pop", "remove", "symmetric_difference", "union", "update",
];

const TUPLE_METHODS: &[&str] = &["count", "index"];

fn method_table(value: &Value) -> &'static [&'static str] {
    match value {
        Value::Str(_) => STR_METHODS,
        Value::List(_) => LIST_METHODS,
        Value::Dict(_) => DICT_METHODS,
        Value::Set(_) => SET_METHODS,
        Value::Tuple(_) => TUPLE_METHODS,
        _ => &[],
    }
}

pub fn has_method(value: &Value, name: &str) -> bool {
    method_table(value).contains(&name)
}

/// `value.attr`. Methods come back bound to their receiver.
pub fn get_attribute(value: &Value, attr: &str) -> FaultResult<Value> {
    if let Value::Exception(exc) = value {
        if attr == "args" {
            let args = if exc.message.is_empty() {
                Vec::new()
            } else {
                vec![Value::str(exc.message.as_str())]
            };
            return Ok(Value::tuple(args));
        }
    }
    if has_method(value, attr) {
        return Ok(Value::BoundMethod(Rc::new(BoundMethod {
            receiver: value.clone(),
            name: attr.to_string(),
        })));
    }
    Err(Fault::raised(
        ExcKind::AttributeError,
        format!("'{}' object has no attribute '{attr}'", value.type_name()),
    ))
}

pub fn call_method(
    interp: &mut Interpreter,
    receiver: &Value,
    name: &str,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> FaultResult<Value> {
    match receiver {
        Value::Str(s) => str_method(interp, s, name, args, kwargs),
        Value::List(_) => list_method(interp, receiver, name, args, kwargs),
        Value::Dict(_) => dict_method(interp, receiver, name, args, kwargs),
        Value::Set(_) => set_method(interp, receiver, name, args, kwargs),
        Value::Tuple(items) => {
            reject_kwargs(name, &kwargs)?;
            sequence_method(name, items, &args)
        }
        other => Err(Fault::raised(
            ExcKind::AttributeError,
            format!("'{}' object has no attribute '{name}'", other.type_name()),
        )),
    }
}

// ----------------------------------------------------------------------
// str
// ----------------------------------------------------------------------

fn str_arg<'a>(method: &str, value: &'a Value) -> FaultResult<&'a str> {
    match value {
        Value::Str(s) => Ok(&**s),
        other => Err(Fault::type_error(format!(
            "{method}() argument must be str, not {}",
            other.type_name()
        ))),
    }
}

fn optional_str_arg<'a>(method: &str, value: Option<&'a Value>) -> FaultResult<Option<&'a str>> {
    match value {
        None | Some(Value::None) => Ok(None),
        Some(value) => str_arg(method, value).map(Some),
    }
}

fn maxsplit_arg(value: Option<&Value>) -> FaultResult<i64> {
    match value {
        None => Ok(-1),
        Some(value) => value.expect_index(),
    }
}

/// Char range `[start:end]` of a string for `find`/`count`, clamped like a slice.
fn search_window(s: &str, args: &[Value]) -> FaultResult<(usize, String)> {
    let bound = |value: Option<&Value>| -> FaultResult<Option<i64>> {
        match value {
            None | Some(Value::None) => Ok(None),
            Some(value) => value.expect_index().map(Some),
        }
    };
    let (start, end) = (bound(args.get(1))?, bound(args.get(2))?);
    if start.is_none() && end.is_none() {
        return Ok((0, s.to_string()));
    }
    let chars: Vec<char> = s.chars().collect();
    let positions = slice_positions(chars.len(), start, end, None)?;
    let offset = positions.first().copied().unwrap_or(chars.len());
    Ok((offset, positions.into_iter().map(|p| chars[p]).collect()))
}

fn char_index(hay: &str, byte_pos: usize) -> usize {
    hay[..byte_pos].chars().count()
}

fn split_whitespace(s: &str, maxsplit: i64) -> Vec<Value> {
    let mut parts = Vec::new();
    let mut rest = s.trim_start();
    while !rest.is_empty() {
        if maxsplit >= 0 && parts.len() as i64 == maxsplit {
            parts.push(Value::str(rest));
            break;
        }
        match rest.find(char::is_whitespace) {
            Some(pos) => {
                parts.push(Value::str(&rest[..pos]));
                rest = rest[pos..].trim_start();
            }
            None => {
                parts.push(Value::str(rest));
                break;
            }
        }
    }
    parts
}

fn rsplit_whitespace(s: &str, maxsplit: i64) -> Vec<Value> {
    let mut parts = Vec::new();
    let mut rest = s.trim_end();
    while !rest.is_empty() {
        if maxsplit >= 0 && parts.len() as i64 == maxsplit {
            parts.push(Value::str(rest));
            break;
        }
        match rest.rfind(char::is_whitespace) {
            Some(pos) => {
                let width = rest[pos..].chars().next().map_or(1, char::len_utf8);
                parts.push(Value::str(&rest[pos + width..]));
                rest = rest[..pos].trim_end();
            }
            None => {
                parts.push(Value::str(rest));
                break;
            }
        }
    }
    parts.reverse();
    parts
}

fn is_cased(c: char) -> bool {
    c.is_uppercase() || c.is_lowercase()
}

fn pad_arg(method: &str, args: &[Value]) -> FaultResult<(usize, char)> {
    expect_args(method, args, 1, 2)?;
    let width = usize::try_from(args[0].expect_index()?.max(0)).unwrap_or(0);
    let fill = match args.get(1) {
        None => ' ',
        Some(value) => {
            let text = str_arg(method, value)?;
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => c,
                _ => {
                    return Err(Fault::type_error(
                        "The fill character must be exactly one character long",
                    ))
                }
            }
        }
    };
    Ok((width, fill))
}

fn str_method(
    interp: &mut Interpreter,
    s: &Rc<str>,
    name: &str,
    args: Vec<Value>,
    mut kwargs: Vec<(String, Value)>,
) -> FaultResult<Value> {
    if name == "format" {
        return Ok(Value::str(format::str_format(s, &args, &kwargs)?));
    }
    if matches!(name, "split" | "rsplit") {
        let mut args = args;
        if let Some(sep) = take_kwarg(&mut kwargs, "sep") {
            args.insert(0, sep);
        }
        if let Some(maxsplit) = take_kwarg(&mut kwargs, "maxsplit") {
            if args.is_empty() {
                args.push(Value::None);
            }
            args.push(maxsplit);
        }
        finish_kwargs(name, &kwargs)?;
        expect_args(name, &args, 0, 2)?;
        let sep = optional_str_arg(name, args.first())?;
        let maxsplit = maxsplit_arg(args.get(1))?;
        let parts = match sep {
            None if name == "split" => split_whitespace(s, maxsplit),
            None => rsplit_whitespace(s, maxsplit),
            Some("") => return Err(Fault::value_error("empty separator")),
            Some(sep) => {
                let mut parts: Vec<Value> = if maxsplit < 0 {
                    if name == "split" {
                        s.split(sep).map(Value::str).collect()
                    } else {
                        s.rsplit(sep).map(Value::str).collect()
                    }
                } else {
                    let n = usize::try_from(maxsplit).unwrap_or(usize::MAX).saturating_add(1);
                    if name == "split" {
                        s.splitn(n, sep).map(Value::str).collect()
                    } else {
                        s.rsplitn(n, sep).map(Value::str).collect()
                    }
                };
                if name == "rsplit" {
                    parts.reverse();
                }
                parts
            }
        };
        interp.limits().check_len(parts.len())?;
        return Ok(Value::list(parts));
    }
    reject_kwargs(name, &kwargs)?;

    match name {
        "lower" | "upper" | "capitalize" | "title" => {
            expect_args(name, &args, 0, 0)?;
            let out = match name {
                "lower" => s.to_lowercase(),
                "upper" => s.to_uppercase(),
                "capitalize" => {
                    let mut chars = s.chars();
                    match chars.next() {
                        Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
                        None => String::new(),
                    }
                }
                _ => {
                    let mut out = String::with_capacity(s.len());
                    let mut previous_cased = false;
                    for c in s.chars() {
                        if previous_cased {
                            out.extend(c.to_lowercase());
                        } else {
                            out.extend(c.to_uppercase());
                        }
                        previous_cased = is_cased(c);
                    }
                    out
                }
            };
            Ok(Value::str(out))
        }
        "strip" | "lstrip" | "rstrip" => {
            expect_args(name, &args, 0, 1)?;
            let chars = optional_str_arg(name, args.first())?;
            let strip = |c: char| match chars {
                Some(set) => set.contains(c),
                None => c.is_whitespace(),
            };
            let out = match name {
                "strip" => s.trim_matches(strip),
                "lstrip" => s.trim_start_matches(strip),
                _ => s.trim_end_matches(strip),
            };
            Ok(Value::str(out))
        }
        "join" => {
            expect_args(name, &args, 1, 1)?;
            let items = interp.collect(&args[0])?;
            let mut parts = Vec::with_capacity(items.len());
            let mut total = 0usize;
            for (i, item) in items.iter().enumerate() {
                match item {
                    Value::Str(part) => {
                        total = total.saturating_add(part.len()).saturating_add(s.len());
                        parts.push(&**part);
                    }
                    other => {
                        return Err(Fault::type_error(format!(
                            "sequence item {i}: expected str instance, {} found",
                            other.type_name()
                        )))
                    }
                }
            }
            interp.limits().check_str(total)?;
            Ok(Value::str(parts.join(&**s)))
        }
        "replace" => {
            expect_args(name, &args, 2, 3)?;
            let old = str_arg(name, &args[0])?;
            let new = str_arg(name, &args[1])?;
            let count = match args.get(2) {
                Some(count) => count.expect_index()?,
                None => -1,
            };
            let occurrences = if old.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(old).count()
            };
            let occurrences = if count >= 0 {
                occurrences.min(usize::try_from(count).unwrap_or(usize::MAX))
            } else {
                occurrences
            };
            interp
                .limits()
                .check_str(s.len().saturating_add(occurrences.saturating_mul(new.len())))?;
            let out = if count < 0 {
                s.replace(old, new)
            } else {
                s.replacen(old, new, occurrences)
            };
            Ok(Value::str(out))
        }
        "startswith" | "endswith" => {
            expect_args(name, &args, 1, 1)?;
            let candidates: Vec<Value> = match &args[0] {
                Value::Tuple(items) => items.to_vec(),
                other => vec![other.clone()],
            };
            for candidate in &candidates {
                let affix = str_arg(name, candidate)?;
                let hit = if name == "startswith" {
                    s.starts_with(affix)
                } else {
                    s.ends_with(affix)
                };
                if hit {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        "find" | "rfind" | "index" | "count" => {
            expect_args(name, &args, 1, 3)?;
            let sub = str_arg(name, &args[0])?;
            let (offset, hay) = search_window(s, &args)?;
            if name == "count" {
                let n = if sub.is_empty() {
                    hay.chars().count() + 1
                } else {
                    hay.matches(sub).count()
                };
                return Ok(Value::Int(n as i64));
            }
            let found = if name == "rfind" { hay.rfind(sub) } else { hay.find(sub) };
            match found {
                Some(pos) => Ok(Value::Int((offset + char_index(&hay, pos)) as i64)),
                None if name == "index" => Err(Fault::value_error("substring not found")),
                None => Ok(Value::Int(-1)),
            }
        }
        "isalnum" | "isalpha" | "isdigit" | "isspace" => {
            expect_args(name, &args, 0, 0)?;
            let test: fn(char) -> bool = match name {
                "isalnum" => char::is_alphanumeric,
                "isalpha" => char::is_alphabetic,
                "isdigit" => char::is_numeric,
                _ => char::is_whitespace,
            };
            Ok(Value::Bool(!s.is_empty() && s.chars().all(test)))
        }
        "isupper" | "islower" => {
            expect_args(name, &args, 0, 0)?;
            let mut cased = s.chars().filter(|c| is_cased(*c)).peekable();
            let any = cased.peek().is_some();
            let all = if name == "isupper" {
                cased.all(char::is_uppercase)
            } else {
                cased.all(char::is_lowercase)
            };
            Ok(Value::Bool(any && all))
        }
        "zfill" => {
            expect_args(name, &args, 1, 1)?;
            let width = usize::try_from(args[0].expect_index()?.max(0)).unwrap_or(0);
            let len = s.chars().count();
            if width <= len {
                return Ok(Value::Str(s.clone()));
            }
            interp.limits().check_str(width)?;
            let (sign, digits) = match s.chars().next() {
                Some(c @ ('+' | '-')) => (Some(c), &s[1..]),
                _ => (None, &s[..]),
            };
            let mut out = String::with_capacity(width);
            out.extend(sign);
            out.extend(std::iter::repeat('0').take(width - len));
            out.push_str(digits);
            Ok(Value::str(out))
        }
        "ljust" | "rjust" | "center" => {
            let (width, fill) = pad_arg(name, &args)?;
            let len = s.chars().count();
            if width <= len {
                return Ok(Value::Str(s.clone()));
            }
            interp.limits().check_str(width.saturating_mul(fill.len_utf8()))?;
            let total = width - len;
            let (left, right) = match name {
                "ljust" => (0, total),
                "rjust" => (total, 0),
                _ => {
                    let left = total / 2 + (total & width & 1);
                    (left, total - left)
                }
            };
            let mut out = String::with_capacity(width);
            out.extend(std::iter::repeat(fill).take(left));
            out.push_str(s);
            out.extend(std::iter::repeat(fill).take(right));
            Ok(Value::str(out))
        }
        "splitlines" => {
            expect_args(name, &args, 0, 1)?;
            Ok(Value::list(s.lines().map(Value::str).collect()))
        }
        other => Err(Fault::raised(
            ExcKind::AttributeError,
            format!("'str' object has no attribute '{other}'"),
        )),
    }
}

// ----------------------------------------------------------------------
// tuple and shared sequence methods
// ----------------------------------------------------------------------

fn sequence_method(name: &str, items: &[Value], args: &[Value]) -> FaultResult<Value> {
    match name {
        "count" => {
            expect_args(name, args, 1, 1)?;
            Ok(Value::Int(items.iter().filter(|v| v.py_eq(&args[0])).count() as i64))
        }
        "index" => {
            expect_args(name, args, 1, 3)?;
            let bound = |value: Option<&Value>| -> FaultResult<Option<i64>> {
                match value {
                    None => Ok(None),
                    Some(value) => value.expect_index().map(Some),
                }
            };
            let positions = slice_positions(items.len(), bound(args.get(1))?, bound(args.get(2))?, None)?;
            positions
                .into_iter()
                .find(|&p| items[p].py_eq(&args[0]))
                .map(|p| Value::Int(p as i64))
                .ok_or_else(|| Fault::value_error(format!("{} is not in list", args[0].repr())))
        }
        other => Err(Fault::raised(
            ExcKind::AttributeError,
            format!("'tuple' object has no attribute '{other}'"),
        )),
    }
}

// ----------------------------------------------------------------------
// list
// ----------------------------------------------------------------------

fn list_method(
    interp: &mut Interpreter,
    receiver: &Value,
    name: &str,
    args: Vec<Value>,
    mut kwargs: Vec<(String, Value)>,
) -> FaultResult<Value> {
    let Value::List(list) = receiver else {
        return Err(Fault::type_error("descriptor requires a 'list' object"));
    };
    if name == "sort" {
        let key = take_kwarg(&mut kwargs, "key");
        let reverse = take_kwarg(&mut kwargs, "reverse").map_or(false, |r| r.is_truthy());
        finish_kwargs(name, &kwargs)?;
        expect_args(name, &args, 0, 0)?;
        let items = list.borrow().clone();
        let sorted = interp.sort_values(items, key.as_ref(), reverse)?;
        *list.borrow_mut() = sorted;
        return Ok(Value::None);
    }
    reject_kwargs(name, &kwargs)?;

    match name {
        "append" => {
            expect_args(name, &args, 1, 1)?;
            let len = list.borrow().len();
            interp.limits().check_len(len + 1)?;
            list.borrow_mut().extend(args);
            Ok(Value::None)
        }
        "extend" => {
            expect_args(name, &args, 1, 1)?;
            let extra = interp.collect(&args[0])?;
            let len = list.borrow().len();
            interp.limits().check_len(len + extra.len())?;
            list.borrow_mut().extend(extra);
            Ok(Value::None)
        }
        "insert" => {
            expect_args(name, &args, 2, 2)?;
            let index = args[0].expect_index()?;
            let len = list.borrow().len();
            interp.limits().check_len(len + 1)?;
            let len_i = len as i64;
            let pos = if index < 0 {
                (index + len_i).max(0)
            } else {
                index.min(len_i)
            };
            list.borrow_mut().insert(pos as usize, args[1].clone());
            Ok(Value::None)
        }
        "pop" => {
            expect_args(name, &args, 0, 1)?;
            let len = list.borrow().len();
            if len == 0 {
                return Err(Fault::index_error("pop from empty list"));
            }
            let index = match args.first() {
                Some(index) => index.expect_index()?,
                None => -1,
            };
            let resolved = if index < 0 { index + len as i64 } else { index };
            if resolved < 0 || resolved >= len as i64 {
                return Err(Fault::index_error("pop index out of range"));
            }
            Ok(list.borrow_mut().remove(resolved as usize))
        }
        "remove" => {
            expect_args(name, &args, 1, 1)?;
            let position = list.borrow().iter().position(|v| v.py_eq(&args[0]));
            match position {
                Some(pos) => {
                    list.borrow_mut().remove(pos);
                    Ok(Value::None)
                }
                None => Err(Fault::value_error("list.remove(x): x not in list")),
            }
        }
        "reverse" => {
            expect_args(name, &args, 0, 0)?;
            list.borrow_mut().reverse();
            Ok(Value::None)
        }
        "copy" => {
            expect_args(name, &args, 0, 0)?;
            Ok(Value::list(list.borrow().clone()))
        }
        "clear" => {
            expect_args(name, &args, 0, 0)?;
            list.borrow_mut().clear();
            Ok(Value::None)
        }
        "count" | "index" => {
            let items = list.borrow().clone();
            sequence_method(name, &items, &args)
        }
        other => Err(Fault::raised(
            ExcKind::AttributeError,
            format!("'list' object has no attribute '{other}'"),
        )),
    }
}

// ----------------------------------------------------------------------
// dict
// ----------------------------------------------------------------------

fn dict_method(
    interp: &mut Interpreter,
    receiver: &Value,
    name: &str,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> FaultResult<Value> {
    let Value::Dict(dict) = receiver else {
        return Err(Fault::type_error("descriptor requires a 'dict' object"));
    };
    if name == "update" {
        expect_args(name, &args, 0, 1)?;
        let mut incoming = Dict::new();
        if let Some(source) = args.first() {
            update_dict(interp, &mut incoming, source)?;
        }
        for (key, value) in kwargs {
            incoming.insert(Value::str(key), value)?;
        }
        let len = dict.borrow().len();
        interp.limits().check_len(len + incoming.len())?;
        let mut dict = dict.borrow_mut();
        for (key, value) in incoming.items() {
            dict.insert(key, value)?;
        }
        return Ok(Value::None);
    }
    reject_kwargs(name, &kwargs)?;

    match name {
        "get" => {
            expect_args(name, &args, 1, 2)?;
            let found = dict.borrow().get(&args[0])?;
            Ok(found.unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::None)))
        }
        "keys" => {
            expect_args(name, &args, 0, 0)?;
            Ok(Value::list(dict.borrow().keys()))
        }
        "values" => {
            expect_args(name, &args, 0, 0)?;
            Ok(Value::list(dict.borrow().values()))
        }
        "items" => {
            expect_args(name, &args, 0, 0)?;
            let items = dict.borrow().items();
            Ok(Value::list(
                items
                    .into_iter()
                    .map(|(k, v)| Value::tuple(vec![k, v]))
                    .collect(),
            ))
        }
        "pop" => {
            expect_args(name, &args, 1, 2)?;
            let removed = dict.borrow_mut().remove(&args[0])?;
            match (removed, args.get(1)) {
                (Some(value), _) => Ok(value),
                (None, Some(default)) => Ok(default.clone()),
                (None, None) => Err(Fault::raised(ExcKind::KeyError, args[0].repr())),
            }
        }
        "popitem" => {
            expect_args(name, &args, 0, 0)?;
            let last = dict.borrow_mut().pop_last();
            last.map(|(k, v)| Value::tuple(vec![k, v])).ok_or_else(|| {
                Fault::raised(ExcKind::KeyError, "'popitem(): dictionary is empty'")
            })
        }
        "setdefault" => {
            expect_args(name, &args, 1, 2)?;
            let existing = dict.borrow().get(&args[0])?;
            if let Some(value) = existing {
                return Ok(value);
            }
            let default = args.get(1).cloned().unwrap_or(Value::None);
            let len = dict.borrow().len();
            interp.limits().check_len(len + 1)?;
            dict.borrow_mut().insert(args[0].clone(), default.clone())?;
            Ok(default)
        }
        "copy" => {
            expect_args(name, &args, 0, 0)?;
            Ok(Value::dict(dict.borrow().clone()))
        }
        "clear" => {
            expect_args(name, &args, 0, 0)?;
            dict.borrow_mut().clear();
            Ok(Value::None)
        }
        other => Err(Fault::raised(
            ExcKind::AttributeError,
            format!("'dict' object has no attribute '{other}'"),
        )),
    }
}

// ----------------------------------------------------------------------
// set
// ----------------------------------------------------------------------

fn set_method(
    interp: &mut Interpreter,
    receiver: &Value,
    name: &str,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> FaultResult<Value> {
    let Value::Set(set) = receiver else {
        return Err(Fault::type_error("descriptor requires a 'set' object"));
    };
    reject_kwargs(name, &kwargs)?;

    let others = |interp: &Interpreter, args: &[Value]| -> FaultResult<Vec<Set>> {
        args.iter()
            .map(|arg| Set::from_values(interp.collect(arg)?))
            .collect()
    };

    match name {
        "add" => {
            expect_args(name, &args, 1, 1)?;
            let len = set.borrow().len();
            interp.limits().check_len(len + 1)?;
            set.borrow_mut().add(args[0].clone())?;
            Ok(Value::None)
        }
        "remove" => {
            expect_args(name, &args, 1, 1)?;
            if set.borrow_mut().remove(&args[0])? {
                Ok(Value::None)
            } else {
                Err(Fault::raised(ExcKind::KeyError, args[0].repr()))
            }
        }
        "discard" => {
            expect_args(name, &args, 1, 1)?;
            set.borrow_mut().remove(&args[0])?;
            Ok(Value::None)
        }
        "pop" => {
            expect_args(name, &args, 0, 0)?;
            let popped = set.borrow_mut().pop();
            popped.ok_or_else(|| Fault::raised(ExcKind::KeyError, "'pop from an empty set'"))
        }
        "union" | "intersection" | "difference" | "symmetric_difference" => {
            if name == "symmetric_difference" {
                expect_args(name, &args, 1, 1)?;
            }
            let mut result = set.borrow().clone();
            for other in others(&*interp, &args)? {
                result = match name {
                    "union" => result.union(&other)?,
                    "intersection" => result.intersection(&other)?,
                    "difference" => result.difference(&other)?,
                    _ => result.symmetric_difference(&other)?,
                };
                interp.limits().check_len(result.len())?;
            }
            Ok(Value::set(result))
        }
        "update" => {
            let incoming = others(&*interp, &args)?;
            let mut set = set.borrow_mut();
            for other in incoming {
                for value in other.values() {
                    set.add(value)?;
                }
                interp.limits().check_len(set.len())?;
            }
            Ok(Value::None)
        }
        "issubset" | "issuperset" | "isdisjoint" => {
            expect_args(name, &args, 1, 1)?;
            let other = others(&*interp, &args)?.pop().unwrap_or_default();
            let this = set.borrow();
            let answer = match name {
                "issubset" => this.is_subset(&other)?,
                "issuperset" => other.is_subset(&this)?,
                _ => this.intersection(&other)?.is_empty(),
            };
            Ok(Value::Bool(answer))
        }
        "copy" => {
            expect_args(name, &args, 0, 0)?;
            Ok(Value::set(set.borrow().clone()))
        }
        "clear" => {
            expect_args(name, &args, 0, 0)?;
            set.borrow_mut().clear();
            Ok(Value::None)
        }
        other => Err(Fault::raised(
            ExcKind::AttributeError,
            format!("'set' object has no attribute '{other}'"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GradeLimits;

    fn call(receiver: &Value, name: &str, args: Vec<Value>) -> FaultResult<Value> {
        let mut interp = Interpreter::new(&GradeLimits::default());
        let method = get_attribute(receiver, name)?;
        interp.call(&method, args, Vec::new())
    }

    fn s(text: &str) -> Value {
        Value::str(text)
    }

    #[test]
    fn unknown_attributes_are_attribute_errors() {
        let err = get_attribute(&Value::list(vec![]), "foo").unwrap_err();
        assert_eq!(err.to_string(), "AttributeError: 'list' object has no attribute 'foo'");
        assert!(get_attribute(&Value::Int(1), "real").is_err());
    }

    #[test]
    fn string_methods() {
        assert_eq!(call(&s("  Hi  "), "strip", vec![]).unwrap().repr(), "'Hi'");
        assert_eq!(call(&s("a,b,,c"), "split", vec![s(",")]).unwrap().repr(), "['a', 'b', '', 'c']");
        assert_eq!(call(&s(" a  b c "), "split", vec![]).unwrap().repr(), "['a', 'b', 'c']");
        assert_eq!(
            call(&s("a b c"), "rsplit", vec![Value::None, Value::Int(1)]).unwrap().repr(),
            "['a b', 'c']"
        );
        assert_eq!(
            call(&s("-"), "join", vec![Value::list(vec![s("x"), s("y")])]).unwrap().repr(),
            "'x-y'"
        );
        assert_eq!(call(&s("hello"), "find", vec![s("l")]).unwrap().repr(), "2");
        assert_eq!(call(&s("hello"), "rfind", vec![s("l")]).unwrap().repr(), "3");
        assert_eq!(call(&s("hello"), "count", vec![s("l")]).unwrap().repr(), "2");
        assert_eq!(call(&s("hello world"), "title", vec![]).unwrap().repr(), "'Hello World'");
        assert_eq!(call(&s("42"), "zfill", vec![Value::Int(5)]).unwrap().repr(), "'00042'");
        assert_eq!(call(&s("ab"), "center", vec![Value::Int(5), s("*")]).unwrap().repr(), "'**ab*'");
        assert_eq!(call(&s("ABC1"), "isupper", vec![]).unwrap().repr(), "True");
        assert_eq!(call(&s(""), "isdigit", vec![]).unwrap().repr(), "False");
        let err = call(&s("abc"), "index", vec![s("z")]).unwrap_err();
        assert_eq!(err.to_string(), "ValueError: substring not found");
    }

    #[test]
    fn list_methods_mutate_the_receiver() {
        let list = Value::list(vec![Value::Int(3), Value::Int(1)]);
        call(&list, "append", vec![Value::Int(2)]).unwrap();
        call(&list, "sort", vec![]).unwrap();
        assert_eq!(list.repr(), "[1, 2, 3]");
        assert_eq!(call(&list, "pop", vec![]).unwrap().repr(), "3");
        call(&list, "insert", vec![Value::Int(0), Value::Int(9)]).unwrap();
        assert_eq!(list.repr(), "[9, 1, 2]");
        assert_eq!(call(&list, "index", vec![Value::Int(2)]).unwrap().repr(), "2");
        let err = call(&list, "remove", vec![Value::Int(7)]).unwrap_err();
        assert_eq!(err.kind(), Some(ExcKind::ValueError));
        let empty = Value::list(vec![]);
        assert_eq!(
            call(&empty, "pop", vec![]).unwrap_err().to_string(),
            "IndexError: pop from empty list"
        );
    }

    #[test]
    fn list_extend_with_itself() {
        let list = Value::list(vec![Value::Int(1)]);
        call(&list, "extend", vec![list.clone()]).unwrap();
        assert_eq!(list.repr(), "[1, 1]");
    }

    #[test]
    fn dict_methods() {
        let mut dict = Dict::new();
        dict.insert(s("a"), Value::Int(1)).unwrap();
        let dict = Value::dict(dict);
        assert_eq!(call(&dict, "get", vec![s("z"), Value::Int(0)]).unwrap().repr(), "0");
        assert_eq!(call(&dict, "setdefault", vec![s("b"), Value::Int(2)]).unwrap().repr(), "2");
        assert_eq!(call(&dict, "items", vec![]).unwrap().repr(), "[('a', 1), ('b', 2)]");
        assert_eq!(call(&dict, "pop", vec![s("a")]).unwrap().repr(), "1");
        let err = call(&dict, "pop", vec![s("a")]).unwrap_err();
        assert_eq!(err.to_string(), "KeyError: 'a'");
        call(&dict, "update", vec![dict.clone()]).unwrap();
        assert_eq!(dict.repr(), "{'b': 2}");
    }

    #[test]
    fn set_methods() {
        let set = Value::set(Set::from_values(vec![Value::Int(1), Value::Int(2)]).unwrap());
        let other = Value::list(vec![Value::Int(2), Value::Int(3)]);
        assert_eq!(call(&set, "union", vec![other.clone()]).unwrap().repr(), "{1, 2, 3}");
        assert_eq!(call(&set, "intersection", vec![other.clone()]).unwrap().repr(), "{2}");
        assert_eq!(call(&set, "issubset", vec![other.clone()]).unwrap().repr(), "False");
        assert_eq!(call(&set, "isdisjoint", vec![Value::list(vec![Value::Int(5)])]).unwrap().repr(), "True");
        call(&set, "discard", vec![Value::Int(9)]).unwrap();
        let err = call(&set, "remove", vec![Value::Int(9)]).unwrap_err();
        assert_eq!(err.to_string(), "KeyError: 9");
    }

    #[test]
    fn exception_args() {
        let exc = Value::exception(ExcKind::ValueError, "bad");
        assert_eq!(get_attribute(&exc, "args").unwrap().repr(), "('bad',)");
    }
}
