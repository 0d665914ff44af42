//! Native function storage and callable trait.

use std::fmt;
use std::rc::Rc;

use crate::RuntimeError;

use super::CallContext;

/// Type-erased native function.
///
/// Wraps any callable implementing [`NativeCallable`] so functions of
/// different shapes are stored uniformly on the heap. The callable is shared
/// through an `Rc`, so cloning is cheap and the state can take a copy out
/// of the heap before invoking it.
///
/// Native functions are opaque to the collector: anything they capture is
/// invisible to marking, so they must not capture runtime references.
#[derive(Clone)]
pub struct NativeFn {
    inner: Rc<dyn NativeCallable>,
}

impl NativeFn {
    /// Create a native function from a closure or function item.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut CallContext<'_>) -> Result<usize, RuntimeError> + 'static,
    {
        Self { inner: Rc::new(f) }
    }

    /// Create a native function from any [`NativeCallable`].
    pub fn from_callable<C>(callable: C) -> Self
    where
        C: NativeCallable + 'static,
    {
        Self {
            inner: Rc::new(callable),
        }
    }

    /// Call this native function with the given context.
    ///
    /// Returns the number of results the function left on top of the stack.
    pub fn call(&self, ctx: &mut CallContext<'_>) -> Result<usize, RuntimeError> {
        self.inner.call(ctx)
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFn").finish_non_exhaustive()
    }
}

/// Trait for callable native functions.
///
/// The function reads its arguments from the [`CallContext`], pushes zero or
/// more results, and reports how many it pushed.
pub trait NativeCallable {
    fn call(&self, ctx: &mut CallContext<'_>) -> Result<usize, RuntimeError>;
}

impl<F> NativeCallable for F
where
    F: Fn(&mut CallContext<'_>) -> Result<usize, RuntimeError>,
{
    fn call(&self, ctx: &mut CallContext<'_>) -> Result<usize, RuntimeError> {
        (self)(ctx)
    }
}
