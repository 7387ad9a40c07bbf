// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed values exchanged through publications and inputs.
//!
//! Values are a tagged sum type. Conversions happen at the API boundary via
//! [`ValueType`]; there is no implicit reinterpretation between tags, so a
//! read with the wrong type fails with [`Error::TypeMismatch`].

use crate::error::{Error, Result};
use crate::time::Time;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Version of the value representation carried on the wire.
pub const VALUE_FORMAT_VERSION: u16 = 1;

/// Declared type of a publication or a stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Double,
    Int,
    String,
    Bool,
    Complex,
    Vector,
    NamedPoint,
    Time,
    Raw,
    /// Publication accepts any value type.
    Any,
}

impl DataType {
    /// Canonical lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            DataType::Double => "double",
            DataType::Int => "int",
            DataType::String => "string",
            DataType::Bool => "bool",
            DataType::Complex => "complex",
            DataType::Vector => "vector",
            DataType::NamedPoint => "named_point",
            DataType::Time => "time",
            DataType::Raw => "raw",
            DataType::Any => "any",
        }
    }

    /// Whether a value of type `actual` may be published under this declared type.
    pub fn accepts(self, actual: DataType) -> bool {
        self == DataType::Any || self == actual
    }

    /// Value read from an input of this type that has nothing to show yet.
    /// `Any` reads as a zero double.
    pub fn zero_value(self) -> Value {
        match self {
            DataType::Double | DataType::Any => Value::Double(0.0),
            DataType::Int => Value::Int(0),
            DataType::String => Value::String(String::new()),
            DataType::Bool => Value::Bool(false),
            DataType::Complex => Value::Complex(Complex::default()),
            DataType::Vector => Value::Vector(Vec::new()),
            DataType::NamedPoint => Value::NamedPoint(NamedPoint::default()),
            DataType::Time => Value::Time(Time::ZERO),
            DataType::Raw => Value::Raw(Vec::new()),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "double" | "float" | "f64" => Ok(DataType::Double),
            "int" | "integer" | "int64" | "i64" => Ok(DataType::Int),
            "string" | "str" | "char" => Ok(DataType::String),
            "bool" | "boolean" => Ok(DataType::Bool),
            "complex" => Ok(DataType::Complex),
            "vector" | "double_vector" => Ok(DataType::Vector),
            "named_point" | "namedpoint" => Ok(DataType::NamedPoint),
            "time" => Ok(DataType::Time),
            "raw" | "bytes" => Ok(DataType::Raw),
            "any" | "" => Ok(DataType::Any),
            other => Err(Error::NotFound(format!("unknown data type '{}'", other))),
        }
    }
}

/// Complex number value.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

impl Complex {
    pub fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }
}

/// A named scalar, e.g. a labelled measurement.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NamedPoint {
    pub name: String,
    pub value: f64,
}

impl NamedPoint {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// A typed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Double(f64),
    Int(i64),
    String(String),
    Bool(bool),
    Complex(Complex),
    Vector(Vec<f64>),
    NamedPoint(NamedPoint),
    Time(Time),
    Raw(Vec<u8>),
}

impl Value {
    /// Type tag of this value.
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Double(_) => DataType::Double,
            Value::Int(_) => DataType::Int,
            Value::String(_) => DataType::String,
            Value::Bool(_) => DataType::Bool,
            Value::Complex(_) => DataType::Complex,
            Value::Vector(_) => DataType::Vector,
            Value::NamedPoint(_) => DataType::NamedPoint,
            Value::Time(_) => DataType::Time,
            Value::Raw(_) => DataType::Raw,
        }
    }

    /// Extract a concrete Rust type, failing on a tag mismatch.
    pub fn get<T: ValueType>(&self) -> Result<T> {
        T::from_value(self).ok_or(Error::TypeMismatch {
            expected: T::DATA_TYPE,
            actual: self.data_type(),
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Double(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Complex(c) => write!(f, "{}{:+}j", c.re, c.im),
            Value::Vector(v) => write!(f, "{:?}", v),
            Value::NamedPoint(p) => write!(f, "{}={}", p.name, p.value),
            Value::Time(t) => write!(f, "{}s", t),
            Value::Raw(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

/// Rust types that map onto exactly one [`DataType`].
pub trait ValueType: Sized {
    /// Tag this type converts from and to.
    const DATA_TYPE: DataType;

    /// Wrap into a [`Value`].
    fn into_value(self) -> Value;

    /// Unwrap from a [`Value`] carrying the same tag.
    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! impl_value_type {
    ($ty:ty, $variant:ident, $tag:ident) => {
        impl ValueType for $ty {
            const DATA_TYPE: DataType = DataType::$tag;

            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }
        }

        impl From<$ty> for Value {
            fn from(v: $ty) -> Value {
                Value::$variant(v)
            }
        }
    };
}

impl_value_type!(f64, Double, Double);
impl_value_type!(i64, Int, Int);
impl_value_type!(String, String, String);
impl_value_type!(bool, Bool, Bool);
impl_value_type!(Complex, Complex, Complex);
impl_value_type!(Vec<f64>, Vector, Vector);
impl_value_type!(NamedPoint, NamedPoint, NamedPoint);
impl_value_type!(Time, Time, Time);
impl_value_type!(Vec<u8>, Raw, Raw);

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::String(s.to_string())
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Value {
        Value::Int(i64::from(v))
    }
}
