use std::collections::BTreeMap;
use std::fmt;

use super::Value;

/// A constant that can appear directly in an expression tree.
///
/// Literals are the subset of [`Value`] with a source-level spelling. The
/// residual builder folds resolved sub-expressions into literals; values with
/// no literal form (timestamps, durations) keep their original structure.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Literal>),
    Map(BTreeMap<MapKey, Literal>),
}

/// Keys admitted by map literals and map values.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MapKey {
    Bool(bool),
    Int(i64),
    String(String),
}

/// A resolved value that has no literal encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unrepresentable {
    pub kind: &'static str,
}

impl fmt::Display for Unrepresentable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} values have no literal form", self.kind)
    }
}

impl std::error::Error for Unrepresentable {}

impl Literal {
    /// The runtime value this literal denotes.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Literal::Null => Value::Null,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(i) => Value::Int(*i),
            Literal::Float(f) => Value::Float(*f),
            Literal::String(s) => Value::String(s.clone()),
            Literal::Bytes(b) => Value::Bytes(b.clone()),
            Literal::List(items) => Value::List(items.iter().map(Literal::to_value).collect()),
            Literal::Map(entries) => Value::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_value()))
                    .collect(),
            ),
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Literal::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl TryFrom<&Value> for Literal {
    type Error = Unrepresentable;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        Ok(match value {
            Value::Null => Literal::Null,
            Value::Bool(b) => Literal::Bool(*b),
            Value::Int(i) => Literal::Int(*i),
            Value::Float(f) => Literal::Float(*f),
            Value::String(s) => Literal::String(s.clone()),
            Value::Bytes(b) => Literal::Bytes(b.clone()),
            Value::List(items) => Literal::List(
                items
                    .iter()
                    .map(Literal::try_from)
                    .collect::<Result<_, _>>()?,
            ),
            Value::Map(entries) => Literal::Map(
                entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), Literal::try_from(v)?)))
                    .collect::<Result<_, Unrepresentable>>()?,
            ),
            Value::Timestamp(_) | Value::Duration(_) => {
                return Err(Unrepresentable {
                    kind: value.type_name(),
                })
            }
        })
    }
}

impl TryFrom<&Value> for MapKey {
    type Error = &'static str;

    /// Fails with the offending value's type name.
    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Bool(b) => Ok(MapKey::Bool(*b)),
            Value::Int(i) => Ok(MapKey::Int(*i)),
            Value::String(s) => Ok(MapKey::String(s.clone())),
            other => Err(other.type_name()),
        }
    }
}

impl TryFrom<&Literal> for MapKey {
    type Error = ();

    fn try_from(literal: &Literal) -> Result<Self, Self::Error> {
        match literal {
            Literal::Bool(b) => Ok(MapKey::Bool(*b)),
            Literal::Int(i) => Ok(MapKey::Int(*i)),
            Literal::String(s) => Ok(MapKey::String(s.clone())),
            _ => Err(()),
        }
    }
}

impl From<MapKey> for Value {
    fn from(key: MapKey) -> Self {
        match key {
            MapKey::Bool(b) => Value::Bool(b),
            MapKey::Int(i) => Value::Int(i),
            MapKey::String(s) => Value::String(s),
        }
    }
}

impl From<&str> for MapKey {
    fn from(v: &str) -> Self {
        MapKey::String(v.to_owned())
    }
}

impl From<String> for MapKey {
    fn from(v: String) -> Self {
        MapKey::String(v)
    }
}

impl From<i64> for MapKey {
    fn from(v: i64) -> Self {
        MapKey::Int(v)
    }
}

impl From<bool> for MapKey {
    fn from(v: bool) -> Self {
        MapKey::Bool(v)
    }
}

impl From<bool> for Literal {
    fn from(v: bool) -> Self {
        Literal::Bool(v)
    }
}

impl From<i64> for Literal {
    fn from(v: i64) -> Self {
        Literal::Int(v)
    }
}

impl From<f64> for Literal {
    fn from(v: f64) -> Self {
        Literal::Float(v)
    }
}

impl From<&str> for Literal {
    fn from(v: &str) -> Self {
        Literal::String(v.to_owned())
    }
}

impl From<String> for Literal {
    fn from(v: String) -> Self {
        Literal::String(v)
    }
}

pub(crate) fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("\"")?;
    for ch in s.chars() {
        match ch {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            c if u32::from(c) < 0x20 => write!(f, "\\x{:02x}", u32::from(c))?,
            c => write!(f, "{c}")?,
        }
    }
    f.write_str("\"")
}

pub(crate) fn write_bytes(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    f.write_str("b\"")?;
    for &byte in bytes {
        match byte {
            b'"' => f.write_str("\\\"")?,
            b'\\' => f.write_str("\\\\")?,
            0x20..=0x7e => write!(f, "{}", char::from(byte))?,
            _ => write!(f, "\\x{byte:02x}")?,
        }
    }
    f.write_str("\"")
}

pub(crate) fn write_float(f: &mut fmt::Formatter<'_>, v: f64) -> fmt::Result {
    // Debug keeps the fractional point ("100.0") and switches to exponent
    // notation for large magnitudes, both of which read back as floats.
    write!(f, "{v:?}")
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKey::Bool(b) => write!(f, "{b}"),
            MapKey::Int(i) => write!(f, "{i}"),
            MapKey::String(s) => write_quoted(f, s),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => f.write_str("null"),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Int(i) => write!(f, "{i}"),
            Literal::Float(v) => write_float(f, *v),
            Literal::String(s) => write_quoted(f, s),
            Literal::Bytes(b) => write_bytes(f, b),
            Literal::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Literal::Map(entries) => {
                f.write_str("{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone, Utc};

    use super::*;

    #[test]
    fn scalars_convert_both_ways() {
        for value in [
            Value::Null,
            Value::Bool(true),
            Value::Int(-4),
            Value::Float(2.5),
            Value::String("GB".into()),
            Value::Bytes(vec![0, 159]),
        ] {
            let literal = Literal::try_from(&value).unwrap();
            assert_eq!(literal.to_value(), value);
        }
    }

    #[test]
    fn nested_collections_convert() {
        let value = Value::map([
            ("geo", Value::list(["GB", "US"])),
            ("level", Value::Int(3)),
        ]);
        let literal = Literal::try_from(&value).unwrap();
        assert_eq!(literal.to_string(), r#"{"geo": ["GB", "US"], "level": 3}"#);
    }

    #[test]
    fn timestamps_have_no_literal() {
        let at = Utc.with_ymd_and_hms(2021, 4, 20, 0, 0, 0).unwrap();
        assert_eq!(
            Literal::try_from(&Value::Timestamp(at)),
            Err(Unrepresentable { kind: "timestamp" })
        );
    }

    #[test]
    fn unrepresentable_element_poisons_list() {
        let value = Value::List(vec![Value::Int(1), Value::Duration(TimeDelta::seconds(5))]);
        assert_eq!(
            Literal::try_from(&value),
            Err(Unrepresentable { kind: "duration" })
        );
    }

    #[test]
    fn display_escapes_strings() {
        assert_eq!(Literal::from("a\"b\\c\n").to_string(), r#""a\"b\\c\n""#);
        assert_eq!(Literal::Bytes(b"ok\x00".to_vec()).to_string(), r#"b"ok\x00""#);
    }

    #[test]
    fn display_floats_keep_fraction() {
        assert_eq!(Literal::Float(100.0).to_string(), "100.0");
        assert_eq!(Literal::Float(0.25).to_string(), "0.25");
        assert_eq!(Literal::Float(1e20).to_string(), "1e20");
    }

    #[test]
    fn map_key_rejects_lists() {
        assert_eq!(MapKey::try_from(&Value::list([1_i64])), Err("list"));
        assert_eq!(MapKey::try_from(&Value::Int(7)), Ok(MapKey::Int(7)));
    }
}
