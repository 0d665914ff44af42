//! Bind native Rust classes into an embedded, garbage-collected runtime.
//!
//! The binding layer has four parts:
//!
//! - [`class`]: the [`NativeClass`] trait describing a bound class
//! - [`registrar`]: [`commit`], which installs a class in a [`State`]
//! - [`bridge`]: [`wrap`] and [`unwrap`], moving objects across the boundary
//!   with one handle per object and explicit [`Ownership`]
//! - [`thunk`]: the trampoline every bound method dispatches through
//!
//! Type identity across independently registered bindings is handled by
//! [`tether_registry`]; the runtime itself lives in [`tether_core`].

pub mod bridge;
pub mod class;
pub mod registrar;
pub mod thunk;

pub use bridge::{BridgeContext, NativePtr, Ownership, class_record, ownership_of, unwrap, wrap};
pub use class::{ClassRecord, Method, MethodFn, MethodRecord, NativeClass};
pub use registrar::commit;
pub use thunk::thunk;

pub use tether_core::{
    CallContext, ConversionError, FromValue, FunctionRef, GcStats, IntoValue, NativeFn,
    RuntimeError, State, StateConfig, TableRef, TypeHash, TypeIdentity, UserDataRef, Value,
};
pub use tether_registry::{ResolvedType, TYPE_KEY, TypeRecord, TypeRegistry};

/// Everything a binding needs in scope.
pub mod prelude {
    pub use crate::bridge::{BridgeContext, NativePtr, Ownership};
    pub use crate::class::{Method, NativeClass};
    pub use tether_core::{CallContext, RuntimeError, State, Value};
}
