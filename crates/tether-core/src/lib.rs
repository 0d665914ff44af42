//! Core runtime for the tether binding layer.
//!
//! This crate provides the embedded runtime that native classes are bound
//! into: a value model, hash tables with metatables, a generational object
//! heap with a mark-and-sweep collector, and the calling convention native
//! functions use to read arguments and push results.

pub mod convert;
pub mod error;
pub mod runtime;
pub mod type_hash;

pub use convert::{FromValue, IntoValue};
pub use error::{ConversionError, RuntimeError};
pub use runtime::{
    CallContext, FunctionRef, GcStats, NativeCallable, NativeFn, ObjectHandle, State, StateConfig,
    TableRef, UserDataRef, Value,
};
pub use type_hash::{TypeHash, TypeIdentity, hash_constants};
