//! The host runtime the binding layer drives.
//!
//! ## Key Types
//!
//! - [`State`]: Heap, globals, registry, stack, and collector
//! - [`Value`]: Runtime value type for stack slots and table entries
//! - [`NativeFn`]: Type-erased callable wrapper for native functions
//! - [`CallContext`]: Bridge between the stack and a native function
//! - [`ObjectHandle`]: Generational index into the object heap

mod call_context;
mod config;
mod gc;
mod heap;
mod native_fn;
mod state;
mod table;
mod value;

pub use call_context::CallContext;
pub use config::StateConfig;
pub use gc::GcStats;
pub use heap::ObjectHandle;
pub use native_fn::{NativeCallable, NativeFn};
pub use state::State;
pub use value::{FunctionRef, TableRef, UserDataRef, Value};
