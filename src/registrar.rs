//! Class registration.

use tether_core::{CallContext, NativeFn, RuntimeError, State, Value};

use crate::bridge::{self, BridgeContext, NativePtr, Ownership};
use crate::class::{ClassRecord, NativeClass};
use crate::thunk::thunk;

/// Install class `T` in the runtime.
///
/// After this call:
///
/// - `globals[T::NAME]` is the class table, holding one entry per method,
///   `new`, and the type record under `__type`
/// - calling the class table constructs a managed instance
/// - `registry[T::NAME]` is the instance metatable, with `__index`,
///   `__metatable`, `__name`, `__tostring` and `__gc`
///
/// Committing the same class again rebuilds and republishes the class table
/// and reuses the instance metatable and bookkeeping, so instances created
/// before the second commit keep working.
pub fn commit<T: NativeClass>(state: &mut State) -> Result<(), RuntimeError> {
    let methods = state.new_table();
    state.set_global(T::NAME, methods)?;

    let (metatable, created) = state.new_metatable(T::NAME)?;
    state.set_field(metatable, "__name", T::NAME)?;
    state.set_field(metatable, "__metatable", methods)?;
    state.set_field(metatable, "__index", methods)?;
    let tostring = state.create_function(NativeFn::new(tostring_hook::<T>));
    state.set_field(metatable, "__tostring", tostring)?;
    let finalize = state.create_function(NativeFn::new(finalize_hook::<T>));
    state.set_field(metatable, "__gc", finalize)?;

    let constructor = state.create_function(NativeFn::new(construct_hook::<T>));
    state.set_field(methods, "new", constructor)?;
    let class_meta = state.new_table();
    state.set_field(class_meta, "__call", constructor)?;
    state.set_metatable(&Value::Table(methods), Some(class_meta))?;

    for method in T::METHODS {
        let function = state.create_function(thunk(*method));
        state.set_field(methods, method.name, function)?;
    }

    let resolved = tether_registry::resolve(state, methods, T::identity())?;
    bridge::register_class(state, ClassRecord::new::<T>(resolved.record));

    log::debug!(
        "committed class {} ({} methods, {})",
        T::NAME,
        T::METHODS.len(),
        if created { "new metatable" } else { "reused metatable" }
    );
    Ok(())
}

/// `__call` on the class table, and `new`.
fn construct_hook<T: NativeClass>(ctx: &mut CallContext<'_>) -> Result<usize, RuntimeError> {
    // The class table itself.
    ctx.shift()?;
    let object = T::construct(ctx).map_err(|err| match err {
        RuntimeError::Construction { .. } => err,
        other => RuntimeError::Construction {
            class: T::NAME.to_string(),
            message: other.to_string(),
        },
    })?;
    ctx.push_object(Some(NativePtr::new(object)), Ownership::Managed)?;
    Ok(1)
}

/// `__gc` on instances.
fn finalize_hook<T: NativeClass>(ctx: &mut CallContext<'_>) -> Result<usize, RuntimeError> {
    let Value::UserData(handle) = ctx.arg_or_nil(1) else {
        return Ok(0);
    };
    let Some(object) = ctx.state().userdata::<NativePtr<T>>(handle).cloned() else {
        return Ok(0);
    };

    let ownership = bridge::forget(ctx.state_mut(), T::NAME, object.addr(), handle);
    if ownership == Ownership::Managed && object.destroy()? {
        log::debug!("destroyed managed {} ({:#x})", T::NAME, object.addr());
    }
    Ok(0)
}

/// `__tostring` on instances: `"<ClassName> (<address>)"`.
fn tostring_hook<T: NativeClass>(ctx: &mut CallContext<'_>) -> Result<usize, RuntimeError> {
    let object = ctx.check::<T>(1)?;
    ctx.push(format!("{} ({:#x})", T::NAME, object.addr()))?;
    Ok(1)
}
