use std::cmp::Ordering;

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};

use crate::types::ops;
use crate::{EvaluationError, MapKey, Value};

type Result<T> = std::result::Result<T, EvaluationError>;

/// Apply a strict function to fully known arguments.
///
/// For method calls the receiver is the first element of `args`.
pub(crate) fn apply(function: &str, method: bool, args: &[Value], now: DateTime<Utc>) -> Result<Value> {
    match (function, args) {
        (ops::EQUALS, [a, b]) => Ok(Value::Bool(a.equals(b))),
        (ops::NOT_EQUALS, [a, b]) => Ok(Value::Bool(!a.equals(b))),
        (ops::LESS, [a, b]) => compare(function, a, b).map(|o| Value::Bool(o == Ordering::Less)),
        (ops::LESS_EQUALS, [a, b]) => compare(function, a, b).map(|o| Value::Bool(o != Ordering::Greater)),
        (ops::GREATER, [a, b]) => compare(function, a, b).map(|o| Value::Bool(o == Ordering::Greater)),
        (ops::GREATER_EQUALS, [a, b]) => compare(function, a, b).map(|o| Value::Bool(o != Ordering::Less)),
        (ops::ADD, [a, b]) => add(a, b),
        (ops::SUBTRACT, [a, b]) => subtract(a, b),
        (ops::MULTIPLY, [a, b]) => multiply(a, b),
        (ops::DIVIDE, [a, b]) => divide(a, b),
        (ops::MODULO, [a, b]) => modulo(a, b),
        (ops::NEGATE, [a]) => negate(a),
        (ops::LOGICAL_NOT, [Value::Bool(b)]) => Ok(Value::Bool(!b)),
        (ops::INDEX, [container, key]) => index(container, key),
        (ops::IN, [needle, haystack]) => contains_element(haystack, needle),
        ("size", [v]) => size(v),
        ("contains", [Value::String(s), Value::String(sub)]) if method => Ok(Value::Bool(s.contains(sub.as_str()))),
        ("startsWith", [Value::String(s), Value::String(prefix)]) if method => {
            Ok(Value::Bool(s.starts_with(prefix.as_str())))
        }
        ("endsWith", [Value::String(s), Value::String(suffix)]) if method => {
            Ok(Value::Bool(s.ends_with(suffix.as_str())))
        }
        ("upperAscii", [Value::String(s)]) if method => Ok(Value::String(s.to_ascii_uppercase())),
        ("lowerAscii", [Value::String(s)]) if method => Ok(Value::String(s.to_ascii_lowercase())),
        ("int", [v]) if !method => to_int(v),
        ("double", [v]) if !method => to_double(v),
        ("string", [v]) if !method => to_string(v),
        ("timestamp", [Value::String(s)]) if !method => parse_timestamp(s),
        ("timestamp", [Value::Timestamp(t)]) if !method => Ok(Value::Timestamp(*t)),
        ("duration", [Value::String(s)]) if !method => parse_duration(s).map(Value::Duration),
        ("duration", [Value::Duration(d)]) if !method => Ok(Value::Duration(*d)),
        ("now", []) if !method => Ok(Value::Timestamp(now)),
        ("intersect", [Value::List(a), Value::List(b)]) if !method => Ok(Value::List(
            a.iter().filter(|x| b.iter().any(|y| x.equals(y))).cloned().collect(),
        )),
        ("hasIntersection", [Value::List(a), Value::List(b)]) if !method => {
            Ok(Value::Bool(a.iter().any(|x| b.iter().any(|y| x.equals(y)))))
        }
        _ => Err(no_overload(function, args)),
    }
}

pub(crate) fn no_overload(function: &str, args: &[Value]) -> EvaluationError {
    EvaluationError::NoSuchOverload {
        function: function.to_owned(),
        args: args
            .iter()
            .map(Value::type_name)
            .collect::<Vec<_>>()
            .join(", "),
    }
}

fn overflow(operation: &str) -> EvaluationError {
    EvaluationError::Overflow {
        operation: operation.to_owned(),
    }
}

fn compare(function: &str, a: &Value, b: &Value) -> Result<Ordering> {
    a.compare(b)
        .ok_or_else(|| no_overload(function, &[a.clone(), b.clone()]))
}

fn add(a: &Value, b: &Value) -> Result<Value> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.checked_add(*y).map(Value::Int).ok_or_else(|| overflow(ops::ADD)),
        (Value::Float(x), Value::Float(y)) => Ok(Value::Float(x + y)),
        (Value::String(x), Value::String(y)) => Ok(Value::String(format!("{x}{y}"))),
        (Value::Bytes(x), Value::Bytes(y)) => Ok(Value::Bytes([x.as_slice(), y.as_slice()].concat())),
        (Value::List(x), Value::List(y)) => Ok(Value::List(x.iter().chain(y).cloned().collect())),
        (Value::Timestamp(t), Value::Duration(d)) | (Value::Duration(d), Value::Timestamp(t)) => t
            .checked_add_signed(*d)
            .map(Value::Timestamp)
            .ok_or_else(|| overflow(ops::ADD)),
        (Value::Duration(x), Value::Duration(y)) => {
            x.checked_add(y).map(Value::Duration).ok_or_else(|| overflow(ops::ADD))
        }
        _ => Err(no_overload(ops::ADD, &[a.clone(), b.clone()])),
    }
}

fn subtract(a: &Value, b: &Value) -> Result<Value> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x
            .checked_sub(*y)
            .map(Value::Int)
            .ok_or_else(|| overflow(ops::SUBTRACT)),
        (Value::Float(x), Value::Float(y)) => Ok(Value::Float(x - y)),
        (Value::Timestamp(x), Value::Timestamp(y)) => Ok(Value::Duration(x.signed_duration_since(*y))),
        (Value::Timestamp(t), Value::Duration(d)) => t
            .checked_sub_signed(*d)
            .map(Value::Timestamp)
            .ok_or_else(|| overflow(ops::SUBTRACT)),
        (Value::Duration(x), Value::Duration(y)) => x
            .checked_sub(y)
            .map(Value::Duration)
            .ok_or_else(|| overflow(ops::SUBTRACT)),
        _ => Err(no_overload(ops::SUBTRACT, &[a.clone(), b.clone()])),
    }
}

fn multiply(a: &Value, b: &Value) -> Result<Value> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x
            .checked_mul(*y)
            .map(Value::Int)
            .ok_or_else(|| overflow(ops::MULTIPLY)),
        (Value::Float(x), Value::Float(y)) => Ok(Value::Float(x * y)),
        _ => Err(no_overload(ops::MULTIPLY, &[a.clone(), b.clone()])),
    }
}

fn divide(a: &Value, b: &Value) -> Result<Value> {
    match (a, b) {
        (Value::Int(_), Value::Int(0)) => Err(EvaluationError::DivisionByZero),
        (Value::Int(x), Value::Int(y)) => x
            .checked_div(*y)
            .map(Value::Int)
            .ok_or_else(|| overflow(ops::DIVIDE)),
        (Value::Float(x), Value::Float(y)) => Ok(Value::Float(x / y)),
        _ => Err(no_overload(ops::DIVIDE, &[a.clone(), b.clone()])),
    }
}

fn modulo(a: &Value, b: &Value) -> Result<Value> {
    match (a, b) {
        (Value::Int(_), Value::Int(0)) => Err(EvaluationError::DivisionByZero),
        (Value::Int(x), Value::Int(y)) => x
            .checked_rem(*y)
            .map(Value::Int)
            .ok_or_else(|| overflow(ops::MODULO)),
        _ => Err(no_overload(ops::MODULO, &[a.clone(), b.clone()])),
    }
}

fn negate(a: &Value) -> Result<Value> {
    match a {
        Value::Int(x) => x.checked_neg().map(Value::Int).ok_or_else(|| overflow(ops::NEGATE)),
        Value::Float(x) => Ok(Value::Float(-x)),
        Value::Duration(d) => TimeDelta::zero()
            .checked_sub(d)
            .map(Value::Duration)
            .ok_or_else(|| overflow(ops::NEGATE)),
        _ => Err(no_overload(ops::NEGATE, std::slice::from_ref(a))),
    }
}

fn index(container: &Value, key: &Value) -> Result<Value> {
    match (container, key) {
        (Value::List(items), Value::Int(i)) => usize::try_from(*i)
            .ok()
            .and_then(|at| items.get(at))
            .cloned()
            .ok_or(EvaluationError::IndexOutOfRange {
                index: *i,
                len: items.len(),
            }),
        (Value::Map(entries), _) => {
            let map_key = MapKey::try_from(key).map_err(|found| EvaluationError::TypeMismatch {
                expected: "map key",
                found,
            })?;
            entries
                .get(&map_key)
                .cloned()
                .ok_or_else(|| EvaluationError::NoSuchKey {
                    key: key.to_string(),
                })
        }
        _ => Err(no_overload(ops::INDEX, &[container.clone(), key.clone()])),
    }
}

fn contains_element(haystack: &Value, needle: &Value) -> Result<Value> {
    match haystack {
        Value::List(items) => Ok(Value::Bool(items.iter().any(|item| item.equals(needle)))),
        Value::Map(entries) => Ok(Value::Bool(
            MapKey::try_from(needle).is_ok_and(|key| entries.contains_key(&key)),
        )),
        _ => Err(no_overload(ops::IN, &[needle.clone(), haystack.clone()])),
    }
}

fn size(v: &Value) -> Result<Value> {
    let len = match v {
        Value::String(s) => s.chars().count(),
        Value::Bytes(b) => b.len(),
        Value::List(items) => items.len(),
        Value::Map(entries) => entries.len(),
        _ => return Err(no_overload("size", std::slice::from_ref(v))),
    };
    i64::try_from(len).map(Value::Int).map_err(|_| overflow("size"))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn to_int(v: &Value) -> Result<Value> {
    match v {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Float(f) => {
            // i64::MAX as f64 rounds up to 2^63, which is out of range.
            if f.is_finite() && *f >= i64::MIN as f64 && *f < i64::MAX as f64 {
                Ok(Value::Int(f.trunc() as i64))
            } else {
                Err(overflow("int"))
            }
        }
        Value::String(s) => s.parse().map(Value::Int).map_err(|_| invalid("int", s)),
        Value::Timestamp(t) => Ok(Value::Int(t.timestamp())),
        _ => Err(no_overload("int", std::slice::from_ref(v))),
    }
}

#[allow(clippy::cast_precision_loss)]
fn to_double(v: &Value) -> Result<Value> {
    match v {
        Value::Int(i) => Ok(Value::Float(*i as f64)),
        Value::Float(f) => Ok(Value::Float(*f)),
        Value::String(s) => s.parse().map(Value::Float).map_err(|_| invalid("double", s)),
        _ => Err(no_overload("double", std::slice::from_ref(v))),
    }
}

fn to_string(v: &Value) -> Result<Value> {
    match v {
        Value::String(s) => Ok(Value::String(s.clone())),
        Value::Bool(b) => Ok(Value::String(b.to_string())),
        Value::Int(i) => Ok(Value::String(i.to_string())),
        Value::Float(f) => Ok(Value::String(f.to_string())),
        Value::Bytes(b) => String::from_utf8(b.clone())
            .map(Value::String)
            .map_err(|e| EvaluationError::InvalidArgument {
                function: "string".into(),
                message: e.to_string(),
            }),
        Value::Timestamp(t) => Ok(Value::String(t.to_rfc3339_opts(SecondsFormat::AutoSi, true))),
        Value::Duration(d) => Ok(Value::String(format_duration(*d))),
        _ => Err(no_overload("string", std::slice::from_ref(v))),
    }
}

fn invalid(function: &str, input: &str) -> EvaluationError {
    EvaluationError::InvalidArgument {
        function: function.to_owned(),
        message: format!("cannot parse \"{input}\""),
    }
}

fn parse_timestamp(s: &str) -> Result<Value> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| Value::Timestamp(t.with_timezone(&Utc)))
        .map_err(|e| EvaluationError::InvalidArgument {
            function: "timestamp".into(),
            message: e.to_string(),
        })
}

/// Parse durations such as `"1h30m"`, `"1.5s"`, `"-250ms"`.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub(crate) fn parse_duration(s: &str) -> Result<TimeDelta> {
    let (negative, mut rest) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    if rest.is_empty() {
        return Err(invalid("duration", s));
    }
    let mut total_nanos: f64 = 0.0;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| invalid("duration", s))?;
        let amount: f64 = rest[..number_len].parse().map_err(|_| invalid("duration", s))?;
        rest = &rest[number_len..];
        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "h" => 3_600e9,
            "m" => 60e9,
            "s" => 1e9,
            "ms" => 1e6,
            "us" => 1e3,
            "ns" => 1.0,
            _ => return Err(invalid("duration", s)),
        };
        total_nanos += amount * scale;
        rest = &rest[unit_len..];
    }
    if !total_nanos.is_finite() || total_nanos >= i64::MAX as f64 {
        return Err(overflow("duration"));
    }
    let nanos = total_nanos.round() as i64;
    Ok(TimeDelta::nanoseconds(if negative { -nanos } else { nanos }))
}

fn format_duration(d: TimeDelta) -> String {
    match d.subsec_nanos() {
        0 => format!("{}s", d.num_seconds()),
        _ => {
            let nanos = d.num_nanoseconds().unwrap_or(i64::MAX);
            format!("{}s", nanos as f64 / 1e9)
        }
    }
}
