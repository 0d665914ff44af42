//! Instance bridge: moving native objects in and out of the runtime.
//!
//! A native object crosses into the runtime as a userdata handle whose
//! payload is a [`NativePtr`] and whose metatable is its class metatable.
//! The bridge keeps, per class, two side tables stored as state app data:
//!
//! - `instances`: object address to handle, so one object always maps to
//!   one handle
//! - `unmanaged`: handles whose object is owned by native code
//!
//! A reverse index from handle to address answers ownership queries by
//! handle without walking `instances`.
//!
//! Neither table is a collector root, so they never keep a handle alive.
//! The class finalizer removes a handle from both when it is collected.

use std::cell::{RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};
use tether_core::{CallContext, RuntimeError, State, UserDataRef, Value};

use crate::class::{ClassRecord, NativeClass};

/// Who is responsible for destroying a wrapped object.
///
/// Decided when the object is first wrapped and never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ownership {
    /// The runtime destroys the object when its handle is collected.
    Managed,
    /// Native code destroys the object; the collector only drops the handle.
    Unmanaged,
}

/// Shared pointer to a native object that may cross into the runtime.
///
/// Clones share the object. [`addr`](Self::addr) is stable for as long as
/// any clone exists and serves as the object's identity. Destroying the
/// object drops it in place; every clone then observes it as destroyed.
pub struct NativePtr<T> {
    cell: Rc<RefCell<Option<T>>>,
}

impl<T: NativeClass> NativePtr<T> {
    pub fn new(object: T) -> Self {
        Self {
            cell: Rc::new(RefCell::new(Some(object))),
        }
    }

    /// Identity of the pointed-to object.
    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.cell) as *const () as usize
    }

    /// Drop the native object.
    ///
    /// Returns `Ok(true)` if this call destroyed it and `Ok(false)` if it was
    /// already destroyed. Fails with [`RuntimeError::ObjectBorrowed`] while a
    /// method call is using the object.
    pub fn destroy(&self) -> Result<bool, RuntimeError> {
        let taken = self.cell.try_borrow_mut().map_err(|_| borrowed::<T>())?.take();
        Ok(taken.is_some())
    }

    pub fn is_destroyed(&self) -> bool {
        self.cell.try_borrow().is_ok_and(|slot| slot.is_none())
    }

    /// Run `f` with shared access to the object.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, RuntimeError> {
        let slot = self.cell.try_borrow().map_err(|_| borrowed::<T>())?;
        slot.as_ref().map(f).ok_or_else(destroyed::<T>)
    }

    /// Run `f` with exclusive access to the object.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, RuntimeError> {
        let mut guard = self.borrow_mut()?;
        Ok(f(&mut guard))
    }

    pub(crate) fn borrow_mut(&self) -> Result<RefMut<'_, T>, RuntimeError> {
        let slot = self.cell.try_borrow_mut().map_err(|_| borrowed::<T>())?;
        RefMut::filter_map(slot, Option::as_mut).map_err(|_| destroyed::<T>())
    }
}

fn borrowed<T: NativeClass>() -> RuntimeError {
    RuntimeError::ObjectBorrowed {
        class: T::NAME.to_string(),
    }
}

fn destroyed<T: NativeClass>() -> RuntimeError {
    RuntimeError::ObjectDestroyed {
        class: T::NAME.to_string(),
    }
}

impl<T> Clone for NativePtr<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
        }
    }
}

impl<T> PartialEq for NativePtr<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }
}

impl<T> Eq for NativePtr<T> {}

impl<T> fmt::Debug for NativePtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativePtr")
            .field("addr", &format_args!("{:#x}", Rc::as_ptr(&self.cell) as *const () as usize))
            .finish_non_exhaustive()
    }
}

// ==========================================================================
// Side tables
// ==========================================================================

pub(crate) struct ClassSlot {
    pub(crate) record: ClassRecord,
    instances: FxHashMap<usize, UserDataRef>,
    addrs: FxHashMap<UserDataRef, usize>,
    unmanaged: FxHashSet<UserDataRef>,
}

impl ClassSlot {
    fn ownership(&self, handle: UserDataRef) -> Option<Ownership> {
        let addr = self.addrs.get(&handle)?;
        if self.instances.get(addr) != Some(&handle) {
            return None;
        }
        Some(if self.unmanaged.contains(&handle) {
            Ownership::Unmanaged
        } else {
            Ownership::Managed
        })
    }
}

/// Per-state bridge data, keyed by class name.
#[derive(Default)]
pub(crate) struct Bridge {
    classes: FxHashMap<&'static str, ClassSlot>,
}

impl Bridge {
    /// Record a committed class, keeping the side tables of an earlier commit.
    fn insert(&mut self, record: ClassRecord) {
        match self.classes.get_mut(record.name) {
            Some(slot) => slot.record = record,
            None => {
                self.classes.insert(
                    record.name,
                    ClassSlot {
                        record,
                        instances: FxHashMap::default(),
                        addrs: FxHashMap::default(),
                        unmanaged: FxHashSet::default(),
                    },
                );
            }
        }
    }

    fn slot<'s>(state: &'s State, class: &str) -> Option<&'s ClassSlot> {
        state.app_data::<Bridge>()?.classes.get(class)
    }

    fn slot_mut<'s>(state: &'s mut State, class: &str) -> Option<&'s mut ClassSlot> {
        state.app_data_mut::<Bridge>()?.classes.get_mut(class)
    }
}

pub(crate) fn register_class(state: &mut State, record: ClassRecord) {
    match state.app_data_mut::<Bridge>() {
        Some(bridge) => bridge.insert(record),
        None => {
            let mut bridge = Bridge::default();
            bridge.insert(record);
            state.set_app_data(bridge);
        }
    }
}

/// The record of a committed class.
pub fn class_record<'s>(state: &'s State, name: &str) -> Option<&'s ClassRecord> {
    Bridge::slot(state, name).map(|slot| &slot.record)
}

/// Ownership of a live handle, if the bridge knows it.
pub fn ownership_of(state: &State, class: &str, handle: UserDataRef) -> Option<Ownership> {
    Bridge::slot(state, class)?.ownership(handle)
}

/// Drop a handle from its class's side tables, returning its ownership.
pub(crate) fn forget(state: &mut State, class: &str, addr: usize, handle: UserDataRef) -> Ownership {
    let Some(slot) = Bridge::slot_mut(state, class) else {
        return Ownership::Managed;
    };
    if slot.instances.get(&addr) == Some(&handle) {
        slot.instances.remove(&addr);
    }
    slot.addrs.remove(&handle);
    if slot.unmanaged.remove(&handle) {
        Ownership::Unmanaged
    } else {
        Ownership::Managed
    }
}

// ==========================================================================
// Wrap / unwrap
// ==========================================================================

/// Convert a native object into a runtime value.
///
/// `None` becomes `nil`. An object that already has a live handle gets that
/// same handle back, with the ownership it was first wrapped with.
pub fn wrap<T: NativeClass>(
    state: &mut State,
    object: Option<NativePtr<T>>,
    ownership: Ownership,
) -> Result<Value, RuntimeError> {
    let Some(object) = object else {
        return Ok(Value::Nil);
    };
    let not_registered = || RuntimeError::ClassNotRegistered {
        class: T::NAME.to_string(),
    };
    let metatable = state.named_metatable(T::NAME).ok_or_else(not_registered)?;
    let addr = object.addr();

    let slot = Bridge::slot(state, T::NAME).ok_or_else(not_registered)?;
    let existing = slot
        .instances
        .get(&addr)
        .map(|&handle| (handle, slot.unmanaged.contains(&handle)));
    if let Some((handle, unmanaged)) =
        existing.filter(|(h, _)| state.is_live(&Value::UserData(*h)))
    {
        if unmanaged != (ownership == Ownership::Unmanaged) {
            log::warn!(
                "{} ({:#x}) is already wrapped with different ownership; keeping the original",
                T::NAME,
                addr
            );
        }
        return Ok(Value::UserData(handle));
    }

    let handle = state.new_userdata(object);
    let value = Value::UserData(handle);
    state.set_metatable(&value, Some(metatable))?;

    if let Some(slot) = Bridge::slot_mut(state, T::NAME) {
        if let Some(stale) = slot.instances.insert(addr, handle) {
            slot.addrs.remove(&stale);
            slot.unmanaged.remove(&stale);
        }
        slot.addrs.insert(handle, addr);
        if ownership == Ownership::Unmanaged {
            slot.unmanaged.insert(handle);
        }
    }
    Ok(value)
}

/// Get the native object behind a runtime value.
///
/// `position` is the argument position reported in the error when the
/// value is not a handle of class `T`.
pub fn unwrap<T: NativeClass>(
    state: &State,
    value: &Value,
    position: usize,
) -> Result<NativePtr<T>, RuntimeError> {
    if let Value::UserData(handle) = value {
        let expected = state.named_metatable(T::NAME);
        if expected.is_some() && state.raw_metatable(value) == expected {
            if let Some(object) = state.userdata::<NativePtr<T>>(*handle) {
                return Ok(object.clone());
            }
        }
    }
    Err(RuntimeError::type_mismatch(position, T::NAME, describe(state, value)))
}

/// Class name of a foreign handle, or the value's runtime type name.
fn describe(state: &State, value: &Value) -> String {
    state
        .raw_metatable(value)
        .and_then(|mt| state.get_field(mt, "__name").ok())
        .and_then(|name| name.as_str().map(str::to_string))
        .unwrap_or_else(|| value.type_name().to_string())
}

/// Bridge operations on a native call frame.
pub trait BridgeContext {
    /// The object of class `T` at an argument position.
    fn check<T: NativeClass>(&self, position: usize) -> Result<NativePtr<T>, RuntimeError>;

    /// Wrap an object and push it as a result.
    fn push_object<T: NativeClass>(
        &mut self,
        object: Option<NativePtr<T>>,
        ownership: Ownership,
    ) -> Result<(), RuntimeError>;
}

impl BridgeContext for CallContext<'_> {
    fn check<T: NativeClass>(&self, position: usize) -> Result<NativePtr<T>, RuntimeError> {
        unwrap::<T>(self.state(), &self.arg_or_nil(position), position)
    }

    fn push_object<T: NativeClass>(
        &mut self,
        object: Option<NativePtr<T>>,
        ownership: Ownership,
    ) -> Result<(), RuntimeError> {
        let value = wrap(self.state_mut(), object, ownership)?;
        self.push(value)
    }
}
