//! Runtime value type for stack slots and table entries.

use std::fmt;
use std::rc::Rc;

use super::ObjectHandle;

macro_rules! object_ref {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) ObjectHandle);

        impl $name {
            /// The underlying heap handle.
            pub fn handle(self) -> ObjectHandle {
                self.0
            }
        }
    };
}

object_ref!(
    /// Reference to a table on the runtime heap.
    TableRef
);
object_ref!(
    /// Reference to a native function on the runtime heap.
    FunctionRef
);
object_ref!(
    /// Reference to a userdata block on the runtime heap.
    UserDataRef
);

/// A value that can live on the stack or in a table.
///
/// Reference variants compare by identity: two `Value::UserData` are equal
/// exactly when they name the same heap object. This is the runtime's `==`
/// for everything without an `__eq` override, and the runtime defines none.
#[derive(Clone, Default, PartialEq)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Table(TableRef),
    Function(FunctionRef),
    UserData(UserDataRef),
    /// An opaque address with no metatable and no lifetime.
    LightUserData(usize),
}

impl Value {
    /// Create a string value.
    pub fn str(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }

    /// Get a human-readable name for this value's type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::Float(_) => "number",
            Value::Str(_) => "string",
            Value::Table(_) => "table",
            Value::Function(_) => "function",
            Value::UserData(_) | Value::LightUserData(_) => "userdata",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Everything except `nil` and `false` is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn as_table(&self) -> Option<TableRef> {
        match self {
            Value::Table(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<FunctionRef> {
        match self {
            Value::Function(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_userdata(&self) -> Option<UserDataRef> {
        match self {
            Value::UserData(u) => Some(*u),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view; integers widen to floats.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// The heap handle for reference values.
    pub(crate) fn heap_handle(&self) -> Option<ObjectHandle> {
        match self {
            Value::Table(t) => Some(t.0),
            Value::Function(f) => Some(f.0),
            Value::UserData(u) => Some(u.0),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Bool(v) => write!(f, "Bool({})", v),
            Value::Int(v) => write!(f, "Int({})", v),
            Value::Float(v) => write!(f, "Float({})", v),
            Value::Str(s) => write!(f, "Str({:?})", s),
            Value::Table(t) => write!(f, "Table({}:{})", t.0.index, t.0.generation),
            Value::Function(h) => write!(f, "Function({}:{})", h.0.index, h.0.generation),
            Value::UserData(u) => write!(f, "UserData({}:{})", u.0.index, u.0.generation),
            Value::LightUserData(addr) => write!(f, "LightUserData({:#x})", addr),
        }
    }
}

impl From<TableRef> for Value {
    fn from(t: TableRef) -> Self {
        Value::Table(t)
    }
}

impl From<FunctionRef> for Value {
    fn from(f: FunctionRef) -> Self {
        Value::Function(f)
    }
}

impl From<UserDataRef> for Value {
    fn from(u: UserDataRef) -> Self {
        Value::UserData(u)
    }
}

/// Hashable form of a value used as a table key.
///
/// `nil` and NaN cannot be keys. Floats with an exact integer value are
/// normalised to `Int` so `t[1]` and `t[1.0]` name the same slot.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Key {
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(Rc<str>),
    Table(TableRef),
    Function(FunctionRef),
    UserData(UserDataRef),
    LightUserData(usize),
}

impl Key {
    pub(crate) fn from_value(value: &Value) -> Option<Key> {
        Some(match value {
            Value::Nil => return None,
            Value::Bool(b) => Key::Bool(*b),
            Value::Int(i) => Key::Int(*i),
            Value::Float(f) if f.is_nan() => return None,
            Value::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Key::Int(*f as i64),
            Value::Float(f) => Key::Float(f.to_bits()),
            Value::Str(s) => Key::Str(s.clone()),
            Value::Table(t) => Key::Table(*t),
            Value::Function(h) => Key::Function(*h),
            Value::UserData(u) => Key::UserData(*u),
            Value::LightUserData(addr) => Key::LightUserData(*addr),
        })
    }

    pub(crate) fn str(s: &str) -> Key {
        Key::Str(Rc::from(s))
    }

    pub(crate) fn heap_handle(&self) -> Option<ObjectHandle> {
        match self {
            Key::Table(t) => Some(t.0),
            Key::Function(f) => Some(f.0),
            Key::UserData(u) => Some(u.0),
            _ => None,
        }
    }

    pub(crate) fn to_value(&self) -> Value {
        match self {
            Key::Bool(b) => Value::Bool(*b),
            Key::Int(i) => Value::Int(*i),
            Key::Float(bits) => Value::Float(f64::from_bits(*bits)),
            Key::Str(s) => Value::Str(s.clone()),
            Key::Table(t) => Value::Table(*t),
            Key::Function(h) => Value::Function(*h),
            Key::UserData(u) => Value::UserData(*u),
            Key::LightUserData(addr) => Value::LightUserData(*addr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names() {
        assert_eq!(Value::Nil.type_name(), "nil");
        assert_eq!(Value::Int(1).type_name(), "number");
        assert_eq!(Value::Float(1.5).type_name(), "number");
        assert_eq!(Value::str("x").type_name(), "string");
        assert_eq!(Value::LightUserData(8).type_name(), "userdata");
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Int(0).is_truthy());
        assert!(Value::str("").is_truthy());
    }

    #[test]
    fn reference_equality_is_identity() {
        let a = UserDataRef(ObjectHandle::new(1, 0));
        let b = UserDataRef(ObjectHandle::new(1, 1));
        assert_eq!(Value::UserData(a), Value::UserData(a));
        assert_ne!(Value::UserData(a), Value::UserData(b));
    }

    #[test]
    fn integral_float_keys_normalise() {
        assert_eq!(Key::from_value(&Value::Float(3.0)), Some(Key::Int(3)));
        assert_eq!(
            Key::from_value(&Value::Float(0.5)),
            Some(Key::Float(0.5f64.to_bits()))
        );
    }

    #[test]
    fn nil_and_nan_are_not_keys() {
        assert_eq!(Key::from_value(&Value::Nil), None);
        assert_eq!(Key::from_value(&Value::Float(f64::NAN)), None);
    }

    #[test]
    fn key_round_trips_reference() {
        let t = TableRef(ObjectHandle::new(4, 2));
        let key = Key::from_value(&Value::Table(t)).unwrap();
        assert_eq!(key.to_value(), Value::Table(t));
    }

    #[test]
    fn number_view() {
        assert_eq!(Value::Int(2).as_number(), Some(2.0));
        assert_eq!(Value::str("2").as_number(), None);
    }
}
