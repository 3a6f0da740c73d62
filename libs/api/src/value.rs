use std::fmt;

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::OperatorError;

// ════════════════════════════════════════════════════════════════
//  Value
// ════════════════════════════════════════════════════════════════

/// Payload carried by every message.
///
/// A closed set of variants so that the element type of a stream can be
/// written to a recording and resolved back to the same shape on replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Opaque binary data.
    Bytes(Vec<u8>),
    /// Homogeneous sequence.
    List(Vec<Value>),
    /// Fixed-arity product. Unzip expects exactly two elements.
    Tuple(Vec<Value>),
}

impl Value {
    /// Most specific [`DataType`] describing this value.
    ///
    /// A list whose elements disagree on type (or an empty list) is `list<any>`.
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Null => DataType::Null,
            Value::Bool(_) => DataType::Bool,
            Value::Int(_) => DataType::Int,
            Value::Float(_) => DataType::Float,
            Value::Str(_) => DataType::Str,
            Value::Bytes(_) => DataType::Bytes,
            Value::List(items) => {
                DataType::List(Box::new(DataType::unify(items.iter().map(Value::data_type))))
            }
            Value::Tuple(items) => DataType::Tuple(items.iter().map(Value::data_type).collect()),
        }
    }

    /// Split into the elements an expanding operator emits.
    ///
    /// `List` and `Tuple` are sequences; strings and bytes are single values.
    pub fn into_elements(self) -> Elements {
        match self {
            Value::List(items) | Value::Tuple(items) => Elements::Many(items),
            other => Elements::Single(other),
        }
    }

    /// Destructure a 2-tuple. Anything else is a shape violation.
    pub fn into_pair(self) -> Result<(Value, Value), OperatorError> {
        match self {
            Value::Tuple(items) => match <[Value; 2]>::try_from(items) {
                Ok([left, right]) => Ok((left, right)),
                Err(items) => Err(OperatorError::shape(format!(
                    "expected a 2-tuple, got a {}-tuple",
                    items.len()
                ))),
            },
            other => Err(OperatorError::shape(format!(
                "expected a 2-tuple, got {}",
                other.data_type()
            ))),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => {
                write!(f, "b64:{}", base64::engine::general_purpose::STANDARD.encode(b))
            }
            Value::List(items) => {
                f.write_str("[")?;
                write_joined(f, items)?;
                f.write_str("]")
            }
            Value::Tuple(items) => {
                f.write_str("(")?;
                write_joined(f, items)?;
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl From<bool> for Value {
    fn from(v: bool) -> Self { Value::Bool(v) }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self { Value::Int(v) }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self { Value::Int(i64::from(v)) }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self { Value::Float(v) }
}

impl From<String> for Value {
    fn from(v: String) -> Self { Value::Str(v) }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self { Value::Str(v.to_string()) }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self { Value::Bytes(v) }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self { Value::List(v) }
}

impl<A: Into<Value>, B: Into<Value>> From<(A, B)> for Value {
    fn from((a, b): (A, B)) -> Self { Value::Tuple(vec![a.into(), b.into()]) }
}

// ════════════════════════════════════════════════════════════════
//  Elements
// ════════════════════════════════════════════════════════════════

/// Result of [`Value::into_elements`]: a single value or a sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum Elements {
    Single(Value),
    Many(Vec<Value>),
}

impl Elements {
    pub fn len(&self) -> usize {
        match self {
            Elements::Single(_) => 1,
            Elements::Many(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IntoIterator for Elements {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        match self {
            Elements::Single(value) => vec![value].into_iter(),
            Elements::Many(items) => items.into_iter(),
        }
    }
}

// ════════════════════════════════════════════════════════════════
//  DataType
// ════════════════════════════════════════════════════════════════

/// Element type of a stream. Persisted in recording manifests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Accepts every value.
    Any,
    Null,
    Bool,
    Int,
    Float,
    Str,
    Bytes,
    List(Box<DataType>),
    Tuple(Vec<DataType>),
}

impl DataType {
    /// Whether `value` conforms to this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (DataType::Any, _) => true,
            (DataType::Null, Value::Null)
            | (DataType::Bool, Value::Bool(_))
            | (DataType::Int, Value::Int(_))
            | (DataType::Float, Value::Float(_))
            | (DataType::Str, Value::Str(_))
            | (DataType::Bytes, Value::Bytes(_)) => true,
            (DataType::List(elem), Value::List(items)) => items.iter().all(|v| elem.accepts(v)),
            (DataType::Tuple(types), Value::Tuple(items)) => {
                types.len() == items.len()
                    && types.iter().zip(items).all(|(t, v)| t.accepts(v))
            }
            _ => false,
        }
    }

    /// Type of the values [`Value::into_elements`] yields for a value of this type.
    pub fn element_type(&self) -> DataType {
        match self {
            DataType::List(elem) => (**elem).clone(),
            DataType::Tuple(types) => DataType::unify(types.iter().cloned()),
            other => other.clone(),
        }
    }

    /// The shared type when all `types` agree, otherwise (or when empty) `Any`.
    pub fn unify<I: IntoIterator<Item = DataType>>(types: I) -> DataType {
        let mut types = types.into_iter();
        let Some(first) = types.next() else {
            return DataType::Any;
        };
        if types.all(|t| t == first) { first } else { DataType::Any }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Any => f.write_str("any"),
            DataType::Null => f.write_str("null"),
            DataType::Bool => f.write_str("bool"),
            DataType::Int => f.write_str("int"),
            DataType::Float => f.write_str("float"),
            DataType::Str => f.write_str("str"),
            DataType::Bytes => f.write_str("bytes"),
            DataType::List(elem) => write!(f, "list<{elem}>"),
            DataType::Tuple(types) => {
                f.write_str("(")?;
                for (i, t) in types.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{t}")?;
                }
                f.write_str(")")
            }
        }
    }
}

// ════════════════════════════════════════════════════════════════
//  Payload
// ════════════════════════════════════════════════════════════════

/// Explicit mapping between a Rust type and [`Value`] / [`DataType`].
///
/// Used to declare typed streams and to read typed payloads back out of
/// messages, including replayed ones.
pub trait Payload: Sized {
    fn data_type() -> DataType;

    fn into_value(self) -> Value;

    fn from_value(value: Value) -> Result<Self, OperatorError>;
}

fn mismatch(expected: DataType, got: &Value) -> OperatorError {
    OperatorError::shape(format!("expected {expected}, got {}", got.data_type()))
}

macro_rules! scalar_payload {
    ($ty:ty, $variant:ident, $data_type:ident) => {
        impl Payload for $ty {
            fn data_type() -> DataType {
                DataType::$data_type
            }

            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn from_value(value: Value) -> Result<Self, OperatorError> {
                match value {
                    Value::$variant(v) => Ok(v),
                    other => Err(mismatch(Self::data_type(), &other)),
                }
            }
        }
    };
}

scalar_payload!(bool, Bool, Bool);
scalar_payload!(i64, Int, Int);
scalar_payload!(f64, Float, Float);
scalar_payload!(String, Str, Str);

impl Payload for () {
    fn data_type() -> DataType {
        DataType::Null
    }

    fn into_value(self) -> Value {
        Value::Null
    }

    fn from_value(value: Value) -> Result<Self, OperatorError> {
        match value {
            Value::Null => Ok(()),
            other => Err(mismatch(DataType::Null, &other)),
        }
    }
}

impl Payload for Value {
    fn data_type() -> DataType {
        DataType::Any
    }

    fn into_value(self) -> Value {
        self
    }

    fn from_value(value: Value) -> Result<Self, OperatorError> {
        Ok(value)
    }
}

impl<T: Payload> Payload for Vec<T> {
    fn data_type() -> DataType {
        DataType::List(Box::new(T::data_type()))
    }

    fn into_value(self) -> Value {
        Value::List(self.into_iter().map(T::into_value).collect())
    }

    fn from_value(value: Value) -> Result<Self, OperatorError> {
        match value {
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(mismatch(Self::data_type(), &other)),
        }
    }
}

impl<A: Payload, B: Payload> Payload for (A, B) {
    fn data_type() -> DataType {
        DataType::Tuple(vec![A::data_type(), B::data_type()])
    }

    fn into_value(self) -> Value {
        Value::Tuple(vec![self.0.into_value(), self.1.into_value()])
    }

    fn from_value(value: Value) -> Result<Self, OperatorError> {
        let (a, b) = value.into_pair()?;
        Ok((A::from_value(a)?, B::from_value(b)?))
    }
}
