//! The dispatch trampoline shared by every bound method.

use tether_core::{CallContext, NativeFn, RuntimeError};

use crate::bridge::BridgeContext;
use crate::class::{Method, NativeClass};

/// Wrap a method as a runtime function.
///
/// The returned function expects its receiver at argument 1. It fails with
/// a type mismatch when the receiver is not a `T` handle, removes the
/// receiver from the frame, and calls the method with exclusive access to
/// the object. A method reporting more results than its frame holds fails
/// with [`RuntimeError::InvalidResultCount`].
pub fn thunk<T: NativeClass>(method: Method<T>) -> NativeFn {
    NativeFn::new(move |ctx: &mut CallContext<'_>| dispatch(method, ctx))
}

#[cfg_attr(feature = "profiling", profiling::function)]
fn dispatch<T: NativeClass>(
    method: Method<T>,
    ctx: &mut CallContext<'_>,
) -> Result<usize, RuntimeError> {
    let object = ctx.check::<T>(1)?;
    ctx.shift()?;
    let mut guard = object.borrow_mut()?;
    let reported = (method.func)(&mut guard, ctx)?;
    // The receiver sits below the shifted frame and must never be a result.
    let available = ctx.arg_count();
    if reported > available {
        return Err(RuntimeError::InvalidResultCount { reported, available });
    }
    Ok(reported)
}
