//! Conversion traits for argument reads and result pushes.
//!
//! - [`FromValue`]: extract a Rust primitive from a [`Value`]
//! - [`IntoValue`]: convert a Rust primitive into a [`Value`]
//!
//! These cover what a method needs to read numbers, strings, and booleans
//! off the stack. Bound objects are not converted here; the binding layer
//! wraps and unwraps them explicitly.

use std::rc::Rc;

use crate::error::ConversionError;
use crate::runtime::{FunctionRef, TableRef, UserDataRef, Value};

/// Extract a value from a runtime [`Value`].
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, ConversionError>;
}

/// Convert a value into a runtime [`Value`].
pub trait IntoValue {
    fn into_value(self) -> Value;
}

fn mismatch(expected: &'static str, value: &Value) -> ConversionError {
    ConversionError::TypeMismatch {
        expected,
        actual: value.type_name(),
    }
}

fn integer_of(value: &Value) -> Result<i64, ConversionError> {
    match value {
        Value::Int(v) => Ok(*v),
        Value::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(*f as i64),
        Value::Float(f) => Err(ConversionError::NotAnInteger { value: *f }),
        other => Err(mismatch("number", other)),
    }
}

macro_rules! impl_int {
    ($($ty:ty),*) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &Value) -> Result<Self, ConversionError> {
                    let v = integer_of(value)?;
                    <$ty>::try_from(v).map_err(|_| ConversionError::IntegerOverflow {
                        value: v,
                        target_type: stringify!($ty),
                    })
                }
            }

            impl IntoValue for $ty {
                fn into_value(self) -> Value {
                    Value::Int(self as i64)
                }
            }
        )*
    };
}

impl_int!(i8, i16, i32, i64, u8, u16, u32, isize);

impl FromValue for usize {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        let v = integer_of(value)?;
        usize::try_from(v).map_err(|_| ConversionError::IntegerOverflow {
            value: v,
            target_type: "usize",
        })
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        value.as_number().ok_or_else(|| mismatch("number", value))
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        f64::from_value(value).map(|v| v as f32)
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Bool(b) => Ok(*b),
            other => Err(mismatch("boolean", other)),
        }
    }
}

impl FromValue for Rc<str> {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Str(s) => Ok(s.clone()),
            other => Err(mismatch("string", other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        Rc::<str>::from_value(value).map(|s| s.to_string())
    }
}

impl FromValue for TableRef {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        value.as_table().ok_or_else(|| mismatch("table", value))
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        Ok(value.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Nil => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl IntoValue for f64 {
    fn into_value(self) -> Value {
        Value::Float(self)
    }
}

impl IntoValue for f32 {
    fn into_value(self) -> Value {
        Value::Float(self as f64)
    }
}

impl IntoValue for bool {
    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl IntoValue for &str {
    fn into_value(self) -> Value {
        Value::str(self)
    }
}

impl IntoValue for String {
    fn into_value(self) -> Value {
        Value::Str(Rc::from(self))
    }
}

impl IntoValue for Rc<str> {
    fn into_value(self) -> Value {
        Value::Str(self)
    }
}

impl IntoValue for () {
    fn into_value(self) -> Value {
        Value::Nil
    }
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl IntoValue for TableRef {
    fn into_value(self) -> Value {
        Value::Table(self)
    }
}

impl IntoValue for FunctionRef {
    fn into_value(self) -> Value {
        Value::Function(self)
    }
}

impl IntoValue for UserDataRef {
    fn into_value(self) -> Value {
        Value::UserData(self)
    }
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn into_value(self) -> Value {
        self.map_or(Value::Nil, IntoValue::into_value)
    }
}
