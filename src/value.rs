//! Physical and raw signal values.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;

/// A physical signal value: a number, or a symbolic name from the
/// signal's value table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Numeric(Decimal),
    Symbol(String),
}

impl Value {
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Numeric(d) => Some(*d),
            Value::Symbol(_) => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Value::Symbol(s) => Some(s),
            Value::Numeric(_) => None,
        }
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Value::Numeric(d)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Numeric(Decimal::from(v))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Symbol(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Symbol(s)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Numeric(d) => write!(f, "{d}"),
            Value::Symbol(s) => write!(f, "{s}"),
        }
    }
}

/// Signal name -> physical value, as produced by decode and consumed by encode.
pub type SignalValues = BTreeMap<String, Value>;

/// An unscaled value exactly as it sits in the payload bits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawValue {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
}
