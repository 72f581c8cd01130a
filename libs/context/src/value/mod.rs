//! # Dynamic Values
//!
//! ## Purpose
//!
//! The values two peers share: primitives that travel by copy and objects
//! that travel by reference. Objects keep an explicit prototype link, own
//! property descriptors and a computed-field cache used for getter results.
//!
//! ## Equality
//!
//! [`Value`] equality is SameValue: `NaN` equals `NaN`, `+0` and `-0` differ,
//! objects compare by identity. This lets values key registries and diff
//! snapshots without special cases.

mod descriptor;
mod object;
mod promise;
mod symbol;

pub use descriptor::PropertyDescriptor;
pub use object::{Callable, NativeFn, ObjectKind, ObjectRef};
pub use promise::{PromiseCell, PromiseResolver, Settlement};
pub use symbol::{symbol_for, symbol_key_for};

use crate::error::{RemoteError, Result};
use std::fmt;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Object(ObjectRef),
}

impl Value {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Objects, functions and symbols travel by reference
    pub fn is_referable(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    pub fn is_callable(&self) -> bool {
        self.as_object().is_some_and(ObjectRef::is_callable)
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(object) => match object.kind() {
                ObjectKind::Function(_) => "function",
                ObjectKind::Symbol { .. } => "symbol",
                _ => "object",
            },
        }
    }

    /// Property read on any value; reading from `undefined` or `null` is a
    /// TypeError
    pub fn get_property(&self, key: &PropertyKey) -> Result<Value> {
        match self {
            Value::Object(object) => object.get(key),
            Value::Undefined | Value::Null => Err(RemoteError::type_error(format!(
                "Cannot read properties of {} (reading '{}')",
                self, key
            ))),
            Value::String(s) if key.as_str() == Some("length") => {
                Ok(Value::Number(s.chars().count() as f64))
            }
            _ => Ok(Value::Undefined),
        }
    }

    pub fn call(&self, this: &Value, arguments: &[Value]) -> Result<Value> {
        match self {
            Value::Object(object) => object.call(this, arguments),
            other => Err(RemoteError::type_error(format!("{} is not a function", other))),
        }
    }

    pub fn construct(&self, arguments: &[Value]) -> Result<Value> {
        match self {
            Value::Object(object) => object.construct(arguments),
            other => Err(RemoteError::type_error(format!(
                "{} is not a constructor",
                other
            ))),
        }
    }
}

/// JavaScript-style number formatting: integral values print without a
/// fraction, non-finite values by name
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i128)
    } else {
        format!("{}", n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{}", s),
            Value::Object(object) => write!(f, "{}", object),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => {
                (a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits()
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Undefined | Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Number(n) if n.is_nan() => f64::NAN.to_bits().hash(state),
            Value::Number(n) => n.to_bits().hash(state),
            Value::String(s) => s.hash(state),
            Value::Object(object) => object.hash(state),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<ObjectRef> for Value {
    fn from(object: ObjectRef) -> Self {
        Value::Object(object)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Own property name: a string or a symbol object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PropertyKey {
    String(String),
    Symbol(ObjectRef),
}

impl PropertyKey {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyKey::String(s) => Some(s),
            PropertyKey::Symbol(_) => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            PropertyKey::String(s) => Value::String(s.clone()),
            PropertyKey::Symbol(symbol) => Value::Object(symbol.clone()),
        }
    }

    /// Property key named by a value. Symbols stay symbols; every other
    /// value is converted to its string form.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(object) if object.is_symbol() => PropertyKey::Symbol(object.clone()),
            Value::String(s) => PropertyKey::String(s.clone()),
            other => PropertyKey::String(other.to_string()),
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::String(s) => write!(f, "{}", s),
            PropertyKey::Symbol(symbol) => write!(f, "{}", symbol),
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        PropertyKey::String(s.to_string())
    }
}

impl From<String> for PropertyKey {
    fn from(s: String) -> Self {
        PropertyKey::String(s)
    }
}
