//! `format()`, `str.format` and printf-style `%` formatting.

use super::fault::{ExcKind, Fault, FaultResult};
use super::value::{float_repr, Value};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormatSpec {
    pub fill: Option<char>,
    pub align: Option<char>,
    pub sign: Option<char>,
    pub alternate: bool,
    pub zero: bool,
    pub width: usize,
    pub grouping: Option<char>,
    pub precision: Option<usize>,
    pub kind: Option<char>,
}

impl FormatSpec {
    pub fn parse(spec: &str) -> FaultResult<FormatSpec> {
        let chars: Vec<char> = spec.chars().collect();
        let mut out = FormatSpec::default();
        let mut i = 0;

        let is_align = |c: char| matches!(c, '<' | '>' | '^' | '=');
        if chars.len() >= 2 && is_align(chars[1]) {
            out.fill = Some(chars[0]);
            out.align = Some(chars[1]);
            i = 2;
        } else if !chars.is_empty() && is_align(chars[0]) {
            out.align = Some(chars[0]);
            i = 1;
        }
        if i < chars.len() && matches!(chars[i], '+' | '-' | ' ') {
            out.sign = Some(chars[i]);
            i += 1;
        }
        if i < chars.len() && chars[i] == '#' {
            out.alternate = true;
            i += 1;
        }
        if i < chars.len() && chars[i] == '0' {
            out.zero = true;
            i += 1;
        }
        let start = i;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
        if i > start {
            out.width = parse_count(&chars[start..i])?;
        }
        if i < chars.len() && matches!(chars[i], ',' | '_') {
            out.grouping = Some(chars[i]);
            i += 1;
        }
        if i < chars.len() && chars[i] == '.' {
            i += 1;
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            if i == start {
                return Err(Fault::value_error("Format specifier missing precision"));
            }
            out.precision = Some(parse_count(&chars[start..i])?);
        }
        if i < chars.len() {
            out.kind = Some(chars[i]);
            i += 1;
        }
        if i != chars.len() {
            return Err(Fault::value_error("Invalid format specifier"));
        }
        Ok(out)
    }
}

const MAX_COUNT: usize = 10_000;

fn parse_count(digits: &[char]) -> FaultResult<usize> {
    let text: String = digits.iter().collect();
    bounded_count(&text, "Too many decimal digits in format string")
}

fn bounded_count(text: &str, message: &str) -> FaultResult<usize> {
    text.parse::<usize>()
        .ok()
        .filter(|n| *n <= MAX_COUNT)
        .ok_or_else(|| Fault::value_error(message))
}

/// `format(value, spec)`.
pub fn format_value(value: &Value, spec: &str) -> FaultResult<String> {
    if spec.is_empty() {
        return Ok(value.to_str());
    }
    let spec = FormatSpec::parse(spec)?;
    render(value, &spec)
}

pub fn render(value: &Value, spec: &FormatSpec) -> FaultResult<String> {
    match value {
        Value::Str(s) => {
            if !matches!(spec.kind, None | Some('s')) {
                return Err(unknown_code(spec.kind, "str"));
            }
            if spec.sign.is_some() {
                return Err(Fault::value_error("Sign not allowed in string format specifier"));
            }
            let text: String = match spec.precision {
                Some(p) => s.chars().take(p).collect(),
                None => s.to_string(),
            };
            Ok(pad(text, spec, '<', false))
        }
        Value::Bool(b) if spec.kind.is_none() => Ok(pad(
            if *b { "True" } else { "False" }.to_string(),
            spec,
            '<',
            false,
        )),
        Value::Bool(_) | Value::Int(_) => {
            let i = value.as_index().unwrap_or(0);
            match spec.kind {
                None | Some('d') | Some('n') => Ok(signed(i < 0, group(&i.unsigned_abs().to_string(), spec.grouping), spec)),
                Some('x') => Ok(signed(i < 0, radix(i, 16, "0x", spec.alternate), spec)),
                Some('X') => Ok(signed(i < 0, radix(i, 16, "0X", spec.alternate).to_uppercase(), spec)),
                Some('o') => Ok(signed(i < 0, radix(i, 8, "0o", spec.alternate), spec)),
                Some('b') => Ok(signed(i < 0, radix(i, 2, "0b", spec.alternate), spec)),
                Some('c') => {
                    let c = u32::try_from(i)
                        .ok()
                        .and_then(char::from_u32)
                        .ok_or_else(|| Fault::raised(ExcKind::OverflowError, "%c arg not in range(0x110000)"))?;
                    Ok(pad(c.to_string(), spec, '<', false))
                }
                Some('e' | 'E' | 'f' | 'F' | 'g' | 'G' | '%') => render_float(i as f64, spec),
                other => Err(unknown_code(other, "int")),
            }
        }
        Value::Float(f) => render_float(*f, spec),
        other => Err(Fault::type_error(format!(
            "unsupported format string passed to {}.__format__",
            other.type_name()
        ))),
    }
}

fn unknown_code(kind: Option<char>, type_name: &str) -> Fault {
    Fault::value_error(format!(
        "Unknown format code '{}' for object of type '{type_name}'",
        kind.unwrap_or(' ')
    ))
}

fn radix(i: i64, base: u32, prefix: &str, alternate: bool) -> String {
    let magnitude = i.unsigned_abs();
    let digits = match base {
        16 => format!("{magnitude:x}"),
        8 => format!("{magnitude:o}"),
        _ => format!("{magnitude:b}"),
    };
    if alternate {
        format!("{prefix}{digits}")
    } else {
        digits
    }
}

fn render_float(f: f64, spec: &FormatSpec) -> FaultResult<String> {
    let negative = f.is_sign_negative() && !f.is_nan();
    let magnitude = f.abs();
    let body = if !magnitude.is_finite() {
        let text = if magnitude.is_nan() { "nan" } else { "inf" };
        if matches!(spec.kind, Some('E' | 'F' | 'G')) {
            text.to_uppercase()
        } else {
            text.to_string()
        }
    } else {
        match spec.kind {
            Some('f' | 'F') => group_fixed(&format!("{:.*}", spec.precision.unwrap_or(6), magnitude), spec.grouping),
            Some('e') => scientific(magnitude, spec.precision.unwrap_or(6)),
            Some('E') => scientific(magnitude, spec.precision.unwrap_or(6)).to_uppercase(),
            Some('g') => general(magnitude, spec.precision.unwrap_or(6), spec.alternate),
            Some('G') => general(magnitude, spec.precision.unwrap_or(6), spec.alternate).to_uppercase(),
            Some('%') => format!("{:.*}%", spec.precision.unwrap_or(6), magnitude * 100.0),
            None => match spec.precision {
                Some(p) => {
                    let text = general(magnitude, p, spec.alternate);
                    if text.contains(|c: char| matches!(c, '.' | 'e' | 'n' | 'i')) {
                        text
                    } else {
                        format!("{text}.0")
                    }
                }
                None => group_fixed(&float_repr(magnitude), spec.grouping),
            },
            other => return Err(unknown_code(other, "float")),
        }
    };
    Ok(signed(negative, body, spec))
}

/// `{:.Ne}` with Python's two-digit signed exponent.
fn scientific(f: f64, precision: usize) -> String {
    let text = format!("{:.*e}", precision, f);
    let (mantissa, exponent) = text.split_once('e').unwrap_or((text.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let sign = if exponent < 0 { '-' } else { '+' };
    format!("{mantissa}e{sign}{:02}", exponent.abs())
}

/// The `g` presentation type.
fn general(f: f64, precision: usize, alternate: bool) -> String {
    let precision = precision.max(1);
    if f == 0.0 {
        return if alternate {
            format!("{:.*}", precision - 1, 0.0)
        } else {
            "0".to_string()
        };
    }
    let probe = format!("{:.*e}", precision - 1, f);
    let exponent: i32 = probe
        .split_once('e')
        .and_then(|(_, e)| e.parse().ok())
        .unwrap_or(0);
    let text = if exponent >= -4 && exponent < precision as i32 {
        let decimals = usize::try_from(precision as i32 - 1 - exponent).unwrap_or(0);
        format!("{:.*}", decimals, f)
    } else {
        scientific(f, precision - 1)
    };
    if alternate {
        return text;
    }
    strip_zeros(&text)
}

fn strip_zeros(text: &str) -> String {
    let (number, exponent) = match text.find('e') {
        Some(pos) => text.split_at(pos),
        None => (text, ""),
    };
    let number = if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    };
    format!("{number}{exponent}")
}

fn group(digits: &str, separator: Option<char>) -> String {
    let Some(separator) = separator else {
        return digits.to_string();
    };
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(separator);
        }
        out.push(c);
    }
    out
}

fn group_fixed(text: &str, separator: Option<char>) -> String {
    match text.split_once('.') {
        Some((int_part, frac)) => format!("{}.{frac}", group(int_part, separator)),
        None => group(text, separator),
    }
}

fn signed(negative: bool, body: String, spec: &FormatSpec) -> String {
    let sign = if negative {
        "-"
    } else {
        match spec.sign {
            Some('+') => "+",
            Some(' ') => " ",
            _ => "",
        }
    };
    if spec.zero && spec.align.is_none() && spec.fill.is_none() {
        let width = spec.width.saturating_sub(sign.chars().count());
        let padding = width.saturating_sub(body.chars().count());
        return format!("{sign}{}{body}", "0".repeat(padding));
    }
    pad(format!("{sign}{body}"), spec, '>', true)
}

fn pad(text: String, spec: &FormatSpec, default_align: char, numeric: bool) -> String {
    let len = text.chars().count();
    if len >= spec.width {
        return text;
    }
    let fill = spec.fill.unwrap_or(' ');
    let padding = spec.width - len;
    let filler = |n: usize| fill.to_string().repeat(n);
    match spec.align.unwrap_or(default_align) {
        '<' => format!("{text}{}", filler(padding)),
        '^' => format!("{}{text}{}", filler(padding / 2), filler(padding - padding / 2)),
        '=' if numeric => {
            let (sign, rest) = match text.chars().next() {
                Some(c @ ('+' | '-' | ' ')) => (c.to_string(), text[1..].to_string()),
                _ => (String::new(), text),
            };
            format!("{sign}{}{rest}", filler(padding))
        }
        _ => format!("{}{text}", filler(padding)),
    }
}

/// `template.format(*args, **kwargs)`.
pub fn str_format(template: &str, args: &[Value], kwargs: &[(String, Value)]) -> FaultResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut auto_index = 0usize;

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => return Err(Fault::value_error("Single '}' encountered in format string")),
            '{' => {
                let mut field = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    field.push(c);
                }
                if !closed {
                    return Err(Fault::value_error("Single '{' encountered in format string"));
                }
                let (head, spec) = field.split_once(':').unwrap_or((field.as_str(), ""));
                let (name, conversion) = match head.split_once('!') {
                    Some((name, conv)) => (name, Some(conv)),
                    None => (head, None),
                };
                let value = if name.is_empty() {
                    let value = args.get(auto_index).cloned().ok_or_else(|| {
                        Fault::index_error(format!(
                            "Replacement index {auto_index} out of range for positional args tuple"
                        ))
                    })?;
                    auto_index += 1;
                    value
                } else if let Ok(index) = name.parse::<usize>() {
                    args.get(index).cloned().ok_or_else(|| {
                        Fault::index_error(format!(
                            "Replacement index {index} out of range for positional args tuple"
                        ))
                    })?
                } else {
                    kwargs
                        .iter()
                        .find(|(key, _)| key == name)
                        .map(|(_, value)| value.clone())
                        .ok_or_else(|| Fault::raised(ExcKind::KeyError, format!("'{name}'")))?
                };
                let value = match conversion {
                    None => value,
                    Some("r") => Value::str(value.repr()),
                    Some("s") => Value::str(value.to_str()),
                    Some(other) => {
                        return Err(Fault::value_error(format!(
                            "Unknown conversion specifier {other}"
                        )))
                    }
                };
                out.push_str(&format_value(&value, spec)?);
            }
            c => out.push(c),
        }
    }
    Ok(out)
}

/// `template % args`.
pub fn percent_format(template: &str, args: &Value) -> FaultResult<Value> {
    let values: Vec<Value> = match args {
        Value::Tuple(items) => items.to_vec(),
        other => vec![other.clone()],
    };
    let mut next = values.into_iter();
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut spec = FormatSpec::default();
        let mut left = false;
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => left = true,
                '0' => spec.zero = true,
                '+' | ' ' => spec.sign = Some(flag),
                '#' => spec.alternate = true,
                _ => break,
            }
            chars.next();
        }
        let mut width = String::new();
        while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
            width.push(d);
            chars.next();
        }
        if !width.is_empty() {
            spec.width = bounded_count(&width, "width too big")?;
        }
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut precision = String::new();
            while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                precision.push(d);
                chars.next();
            }
            spec.precision = Some(if precision.is_empty() {
                0
            } else {
                bounded_count(&precision, "precision too big")?
            });
        }
        if left {
            spec.align = Some('<');
            spec.zero = false;
        }
        let Some(conversion) = chars.next() else {
            return Err(Fault::value_error("incomplete format"));
        };
        if conversion == '%' {
            out.push('%');
            continue;
        }
        let value = next
            .next()
            .ok_or_else(|| Fault::type_error("not enough arguments for format string"))?;
        let text = match conversion {
            's' | 'r' => {
                let text = if conversion == 's' { value.to_str() } else { value.repr() };
                spec.align.get_or_insert('>');
                spec.zero = false;
                render(&Value::str(text), &spec)?
            }
            'd' | 'i' | 'u' => {
                let as_int = match value {
                    Value::Float(f) if f.is_finite() => Value::Int(f.trunc() as i64),
                    other if other.as_index().is_some() => Value::Int(other.as_index().unwrap_or(0)),
                    other => {
                        return Err(Fault::type_error(format!(
                            "%{conversion} format: a real number is required, not {}",
                            other.type_name()
                        )))
                    }
                };
                spec.precision = None;
                render(&as_int, &spec)?
            }
            'x' | 'X' | 'o' | 'c' | 'e' | 'E' | 'f' | 'F' | 'g' | 'G' => {
                spec.kind = Some(conversion);
                if matches!(conversion, 'f' | 'F' | 'e' | 'E') && spec.precision.is_none() {
                    spec.precision = Some(6);
                }
                if value.as_number().is_none() {
                    return Err(Fault::type_error(format!(
                        "must be real number, not {}",
                        value.type_name()
                    )));
                }
                render(&value, &spec)?
            }
            other => {
                return Err(Fault::value_error(format!(
                    "unsupported format character '{other}'"
                )))
            }
        };
        out.push_str(&text);
    }
    if next.next().is_some() {
        return Err(Fault::type_error(
            "not all arguments converted during string formatting",
        ));
    }
    Ok(Value::str(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(value: Value, spec: &str) -> String {
        format_value(&value, spec).unwrap()
    }

    #[test]
    fn integer_specs() {
        assert_eq!(fmt(Value::Int(42), "5d"), "   42");
        assert_eq!(fmt(Value::Int(-42), "05d"), "-0042");
        assert_eq!(fmt(Value::Int(1234567), ","), "1,234,567");
        assert_eq!(fmt(Value::Int(255), "#x"), "0xff");
        assert_eq!(fmt(Value::Int(5), "b"), "101");
        assert_eq!(fmt(Value::Int(7), "<4"), "7   ");
        assert_eq!(fmt(Value::Int(7), "*^5"), "**7**");
    }

    #[test]
    fn float_specs() {
        assert_eq!(fmt(Value::Float(3.14159), ".2f"), "3.14");
        assert_eq!(fmt(Value::Float(0.5), ".0%"), "50%");
        assert_eq!(fmt(Value::Float(12345.678), ".3e"), "1.235e+04");
        assert_eq!(fmt(Value::Float(0.0001), "g"), "0.0001");
        assert_eq!(fmt(Value::Float(1234567.0), "g"), "1.23457e+06");
        assert_eq!(fmt(Value::Float(2.5), ""), "2.5");
        assert_eq!(fmt(Value::Int(3), ".1f"), "3.0");
    }

    #[test]
    fn string_specs() {
        assert_eq!(fmt(Value::str("ab"), ">4"), "  ab");
        assert_eq!(fmt(Value::str("abcdef"), ".3"), "abc");
        assert!(format_value(&Value::str("a"), "d").is_err());
    }

    #[test]
    fn str_format_fields() {
        let out = str_format(
            "{} + {} = {total:.1f} {{ok}} {0!r}",
            &[Value::Int(1), Value::str("x")],
            &[("total".to_string(), Value::Float(3.0))],
        )
        .unwrap();
        assert_eq!(out, "1 + x = 3.0 {ok} 1");
        assert!(str_format("{5}", &[], &[]).is_err());
    }

    #[test]
    fn percent_formatting() {
        let args = Value::tuple(vec![Value::str("n"), Value::Int(5), Value::Float(2.5)]);
        let out = percent_format("%s=%03d (%.1f%%)", &args).unwrap();
        assert_eq!(out.to_str(), "n=005 (2.5%)");
        let err = percent_format("%d %d", &Value::Int(1)).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: not enough arguments for format string");
        assert!(percent_format("x", &Value::Int(1)).is_err());
    }

    #[test]
    fn percent_width_and_precision_are_bounded() {
        let cases = [
            ("%.70000f", Value::Float(1.0), "ValueError: precision too big"),
            ("%.70000e", Value::Float(1.0), "ValueError: precision too big"),
            ("%.99999999999999999999999f", Value::Float(1.5), "ValueError: precision too big"),
            ("%999999999s", Value::str("a"), "ValueError: width too big"),
        ];
        for (template, arg, expected) in cases {
            let err = percent_format(template, &arg).unwrap_err();
            assert_eq!(err.to_string(), expected, "{}", template);
        }
        assert_eq!(percent_format("%.f", &Value::Float(2.6)).unwrap().to_str(), "3");
        assert_eq!(percent_format("%5.1f", &Value::Float(2.26)).unwrap().to_str(), "  2.3");
    }

    #[test]
    fn format_spec_counts_are_bounded() {
        assert!(format_value(&Value::Float(1.0), ".70000f").is_err());
        assert_eq!(fmt(Value::Float(1.0), ".10000f").len(), 10_002);
    }
}
