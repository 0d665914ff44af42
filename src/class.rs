//! Native class descriptions.
//!
//! A bound class is a Rust type implementing [`NativeClass`]: a display
//! name, a constructor reading its arguments from the call frame, and a
//! static table of [`Method`]s. [`commit`](crate::commit) turns that
//! description into runtime tables.
//!
//! # Example
//!
//! ```
//! use tether::prelude::*;
//!
//! struct Counter {
//!     count: i64,
//! }
//!
//! impl Counter {
//!     fn increment(&mut self, ctx: &mut CallContext<'_>) -> Result<usize, RuntimeError> {
//!         self.count += 1;
//!         ctx.push(self.count)?;
//!         Ok(1)
//!     }
//! }
//!
//! impl NativeClass for Counter {
//!     const NAME: &'static str = "Counter";
//!     const METHODS: &'static [Method<Self>] = &[tether::method!(Counter, increment)];
//!
//!     fn construct(ctx: &mut CallContext<'_>) -> Result<Self, RuntimeError> {
//!         Ok(Counter { count: ctx.check_int(1)? })
//!     }
//! }
//!
//! let mut state = State::new();
//! tether::commit::<Counter>(&mut state).unwrap();
//!
//! let class = state.global("Counter");
//! let counter = state.call(&class, &[Value::Int(5)]).unwrap().remove(0);
//! let result = state.call_method(&counter, "increment", &[]).unwrap();
//! assert_eq!(result, vec![Value::Int(6)]);
//! ```

use std::fmt;
use std::sync::Arc;

use tether_core::{CallContext, RuntimeError, TypeHash, TypeIdentity};
use tether_registry::TypeRecord;

/// Signature of a bound method.
///
/// The receiver is already removed from the frame, so argument 1 is the
/// first call-site argument. The return value is the number of results the
/// method pushed.
pub type MethodFn<T> = fn(&mut T, &mut CallContext<'_>) -> Result<usize, RuntimeError>;

/// One entry of a class's method table.
pub struct Method<T> {
    pub name: &'static str,
    pub func: MethodFn<T>,
}

impl<T> Method<T> {
    pub const fn new(name: &'static str, func: MethodFn<T>) -> Self {
        Self { name, func }
    }
}

// Derives would require `T: Clone`.
impl<T> Clone for Method<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Method<T> {}

impl<T> fmt::Debug for Method<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method").field("name", &self.name).finish()
    }
}

/// Build a [`Method`] entry named after the method itself.
///
/// ```ignore
/// const METHODS: &'static [Method<Self>] = &[method!(Counter, increment)];
/// ```
#[macro_export]
macro_rules! method {
    ($ty:ty, $name:ident) => {
        $crate::Method::new(stringify!($name), <$ty>::$name)
    };
}

/// A Rust type that can be exposed to the runtime as a class.
pub trait NativeClass: Sized + 'static {
    /// Runtime-visible class name, also the name of the global class table.
    const NAME: &'static str;

    /// Methods installed in the class table.
    const METHODS: &'static [Method<Self>];

    /// Construct an instance from the constructor's call-site arguments.
    ///
    /// Any error is reported to the caller as
    /// [`RuntimeError::Construction`].
    fn construct(ctx: &mut CallContext<'_>) -> Result<Self, RuntimeError>;

    /// The native type this class maps, used to merge bindings of one type.
    ///
    /// Defaults to the binding type itself. A binding wrapping another type
    /// should return that type's identity so every binding of it resolves
    /// to the same record.
    fn identity() -> TypeIdentity {
        TypeIdentity::of::<Self>()
    }
}

/// A method as recorded at commit time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRecord {
    pub name: &'static str,
    pub hash: TypeHash,
}

/// Immutable description of a committed class.
#[derive(Debug, Clone)]
pub struct ClassRecord {
    pub name: &'static str,
    pub identity: TypeIdentity,
    pub methods: Vec<MethodRecord>,
    /// Canonical record shared by every binding of the same native type.
    pub type_record: Arc<TypeRecord>,
}

impl ClassRecord {
    pub(crate) fn new<T: NativeClass>(type_record: Arc<TypeRecord>) -> Self {
        let identity = T::identity();
        let owner = TypeHash::from_name(T::NAME);
        Self {
            name: T::NAME,
            identity,
            methods: T::METHODS
                .iter()
                .map(|m| MethodRecord {
                    name: m.name,
                    hash: TypeHash::from_method(owner, m.name),
                })
                .collect(),
            type_record,
        }
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.iter().any(|m| m.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe;

    impl Probe {
        fn ping(&mut self, _ctx: &mut CallContext<'_>) -> Result<usize, RuntimeError> {
            Ok(0)
        }
    }

    impl NativeClass for Probe {
        const NAME: &'static str = "Probe";
        const METHODS: &'static [Method<Self>] = &[crate::method!(Probe, ping)];

        fn construct(_ctx: &mut CallContext<'_>) -> Result<Self, RuntimeError> {
            Ok(Probe)
        }
    }

    #[test]
    fn method_macro_uses_the_method_name() {
        assert_eq!(Probe::METHODS.len(), 1);
        assert_eq!(Probe::METHODS[0].name, "ping");
    }

    #[test]
    fn default_identity_is_the_binding_type() {
        assert_eq!(Probe::identity(), TypeIdentity::of::<Probe>());
    }

    #[test]
    fn record_hashes_methods_per_class() {
        let record = ClassRecord::new::<Probe>(tether_registry::canonical(Probe::identity()));
        assert_eq!(record.name, "Probe");
        assert!(record.has_method("ping"));
        assert!(!record.has_method("pong"));
        assert_eq!(
            record.methods[0].hash,
            TypeHash::from_method(TypeHash::from_name("Probe"), "ping")
        );
    }
}
