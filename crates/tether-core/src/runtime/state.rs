//! The runtime state: heap, globals, registry, and value stack.

use std::any::{Any, TypeId};
use std::fmt;

use rustc_hash::FxHashMap;

use crate::RuntimeError;
use crate::convert::IntoValue;

use super::heap::{HeapObject, ObjectHeap, UserData};
use super::table::Table;
use super::value::Key;
use super::{CallContext, FunctionRef, NativeFn, StateConfig, TableRef, UserDataRef, Value};

/// Longest `__index` chain followed before giving up.
const MAX_INDEX_CHAIN: usize = 100;

/// An embedded runtime instance.
///
/// `State` owns every collectable object. It is single-threaded: native
/// functions are stored behind `Rc`, so the type is neither `Send` nor
/// `Sync`, and an embedder that wants to share one runtime across threads
/// has to put the whole state behind one mutex.
///
/// Values held only in Rust locals are not collector roots. Anything that
/// must survive a collection has to be reachable from the globals, the
/// registry, or the stack.
pub struct State {
    pub(crate) heap: ObjectHeap,
    pub(crate) stack: Vec<Value>,
    pub(crate) globals: TableRef,
    pub(crate) registry: TableRef,
    pub(crate) config: StateConfig,
    call_depth: usize,
    pub(crate) allocations_since_collect: usize,
    /// Set while a collection runs so finalizers cannot start another.
    pub(crate) collecting: bool,
    app_data: FxHashMap<TypeId, Box<dyn Any>>,
    pub(crate) closed: bool,
}

impl State {
    /// Create a state with the default configuration.
    pub fn new() -> Self {
        Self::with_config(StateConfig::default())
    }

    pub fn with_config(config: StateConfig) -> Self {
        let mut heap = ObjectHeap::new();
        let globals = TableRef(heap.allocate(HeapObject::Table(Table::default())));
        let registry = TableRef(heap.allocate(HeapObject::Table(Table::default())));
        Self {
            heap,
            stack: Vec::new(),
            globals,
            registry,
            config,
            call_depth: 0,
            allocations_since_collect: 0,
            collecting: false,
            app_data: FxHashMap::default(),
            closed: false,
        }
    }

    pub fn config(&self) -> &StateConfig {
        &self.config
    }

    /// The global namespace table.
    pub fn globals(&self) -> TableRef {
        self.globals
    }

    /// A table private to native code, keyed by name.
    pub fn registry(&self) -> TableRef {
        self.registry
    }

    // ==========================================================================
    // Allocation
    // ==========================================================================

    fn allocate(&mut self, object: HeapObject) -> super::ObjectHandle {
        self.allocations_since_collect += 1;
        self.heap.allocate(object)
    }

    pub fn new_table(&mut self) -> TableRef {
        TableRef(self.allocate(HeapObject::Table(Table::default())))
    }

    pub fn create_function(&mut self, function: NativeFn) -> FunctionRef {
        FunctionRef(self.allocate(HeapObject::Function(function)))
    }

    /// Allocate a userdata block holding `payload`, with no metatable.
    pub fn new_userdata<P: Any>(&mut self, payload: P) -> UserDataRef {
        UserDataRef(self.allocate(HeapObject::UserData(UserData {
            payload: Box::new(payload),
            metatable: None,
            finalized: false,
        })))
    }

    /// Borrow a userdata payload if it has type `P`.
    pub fn userdata<P: Any>(&self, userdata: UserDataRef) -> Option<&P> {
        match self.heap.get(userdata.0) {
            Some(HeapObject::UserData(ud)) => ud.payload.downcast_ref::<P>(),
            _ => None,
        }
    }

    /// Whether the collector already ran this userdata's finalizer.
    pub fn is_finalized(&self, userdata: UserDataRef) -> bool {
        matches!(self.heap.get(userdata.0), Some(HeapObject::UserData(ud)) if ud.finalized)
    }

    /// Whether a value still refers to a live object. Non-reference values
    /// are always live.
    pub fn is_live(&self, value: &Value) -> bool {
        value
            .heap_handle()
            .is_none_or(|handle| self.heap.contains(handle))
    }

    /// Number of live heap objects, including the globals and registry.
    pub fn live_objects(&self) -> usize {
        self.heap.live_count()
    }

    // ==========================================================================
    // Tables
    // ==========================================================================

    fn table(&self, table: TableRef) -> Result<&Table, RuntimeError> {
        match self.heap.get(table.0) {
            Some(HeapObject::Table(t)) => Ok(t),
            _ => Err(RuntimeError::StaleHandle {
                index: table.0.index,
            }),
        }
    }

    fn table_mut(&mut self, table: TableRef) -> Result<&mut Table, RuntimeError> {
        match self.heap.get_mut(table.0) {
            Some(HeapObject::Table(t)) => Ok(t),
            _ => Err(RuntimeError::StaleHandle {
                index: table.0.index,
            }),
        }
    }

    /// Read a table entry without consulting metatables.
    pub fn raw_get(&self, table: TableRef, key: &Value) -> Result<Value, RuntimeError> {
        let t = self.table(table)?;
        Ok(Key::from_value(key).map(|k| t.get(&k)).unwrap_or_default())
    }

    /// Write a table entry without consulting metatables. Writing `nil`
    /// removes the entry.
    pub fn raw_set(&mut self, table: TableRef, key: Value, value: Value) -> Result<(), RuntimeError> {
        let key = Key::from_value(&key)
            .ok_or_else(|| RuntimeError::message(format!("table index is {}", key.type_name())))?;
        self.table_mut(table)?.set(key, value);
        Ok(())
    }

    pub fn get_field(&self, table: TableRef, name: &str) -> Result<Value, RuntimeError> {
        Ok(self.table(table)?.get(&Key::str(name)))
    }

    pub fn set_field<V: IntoValue>(
        &mut self,
        table: TableRef,
        name: &str,
        value: V,
    ) -> Result<(), RuntimeError> {
        self.table_mut(table)?.set(Key::str(name), value.into_value());
        Ok(())
    }

    /// Snapshot of a table's entries, in no particular order.
    pub fn table_pairs(&self, table: TableRef) -> Result<Vec<(Value, Value)>, RuntimeError> {
        Ok(self
            .table(table)?
            .entries()
            .map(|(key, value)| (key.to_value(), value.clone()))
            .collect())
    }

    /// Number of entries in a table.
    pub fn table_len(&self, table: TableRef) -> Result<usize, RuntimeError> {
        Ok(self.table(table)?.len())
    }

    pub fn global(&self, name: &str) -> Value {
        self.get_field(self.globals, name).unwrap_or_default()
    }

    pub fn set_global<V: IntoValue>(&mut self, name: &str, value: V) -> Result<(), RuntimeError> {
        self.set_field(self.globals, name, value)
    }

    // ==========================================================================
    // Metatables
    // ==========================================================================

    /// The metatable of a table or userdata, ignoring `__metatable`.
    pub fn raw_metatable(&self, value: &Value) -> Option<TableRef> {
        match value {
            Value::Table(t) => self.table(*t).ok()?.metatable,
            Value::UserData(u) => match self.heap.get(u.0) {
                Some(HeapObject::UserData(ud)) => ud.metatable,
                _ => None,
            },
            _ => None,
        }
    }

    pub fn set_metatable(
        &mut self,
        value: &Value,
        metatable: Option<TableRef>,
    ) -> Result<(), RuntimeError> {
        match value {
            Value::Table(t) => {
                self.table_mut(*t)?.metatable = metatable;
                Ok(())
            }
            Value::UserData(u) => match self.heap.get_mut(u.0) {
                Some(HeapObject::UserData(ud)) => {
                    ud.metatable = metatable;
                    Ok(())
                }
                _ => Err(RuntimeError::StaleHandle { index: u.0.index }),
            },
            other => Err(RuntimeError::message(format!(
                "cannot set the metatable of a {} value",
                other.type_name()
            ))),
        }
    }

    /// The script-visible metatable: a `__metatable` field, when present,
    /// is returned in place of the real metatable.
    pub fn metatable_of(&self, value: &Value) -> Value {
        let Some(metatable) = self.raw_metatable(value) else {
            return Value::Nil;
        };
        match self.get_field(metatable, "__metatable") {
            Ok(Value::Nil) | Err(_) => Value::Table(metatable),
            Ok(guard) => guard,
        }
    }

    /// Look up an event handler (`__index`, `__call`, ...) in a value's
    /// metatable.
    pub fn metamethod(&self, value: &Value, event: &str) -> Value {
        self.raw_metatable(value)
            .and_then(|mt| self.get_field(mt, event).ok())
            .unwrap_or_default()
    }

    /// Create the registry metatable for `name`, or fetch the existing one.
    ///
    /// Returns the table and whether it was created by this call.
    pub fn new_metatable(&mut self, name: &str) -> Result<(TableRef, bool), RuntimeError> {
        if let Some(existing) = self.named_metatable(name) {
            return Ok((existing, false));
        }
        let metatable = self.new_table();
        self.set_field(self.registry, name, metatable)?;
        Ok((metatable, true))
    }

    pub fn named_metatable(&self, name: &str) -> Option<TableRef> {
        self.get_field(self.registry, name).ok()?.as_table()
    }

    // ==========================================================================
    // Stack and calls
    // ==========================================================================

    fn check_stack(&self, extra: usize) -> Result<(), RuntimeError> {
        if self.stack.len() + extra > self.config.max_stack_depth {
            return Err(RuntimeError::StackOverflow {
                limit: self.config.max_stack_depth,
            });
        }
        Ok(())
    }

    pub(crate) fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        self.check_stack(1)?;
        self.stack.push(value);
        Ok(())
    }

    /// Number of values currently on the stack.
    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Call a value with arguments and collect its results.
    ///
    /// Functions are invoked directly; tables and userdata are invoked
    /// through their `__call` handler, which receives the callee as its
    /// first argument. Any error aborts the whole call and the stack is
    /// restored to its depth before the call.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn call(&mut self, callee: &Value, args: &[Value]) -> Result<Vec<Value>, RuntimeError> {
        let base = self.stack.len();
        let result = self.push_frame(callee, args).and_then(|()| {
            if self.call_depth == 0 {
                self.maybe_collect();
            }
            self.call_at(base)
        });
        let results = result.map(|count| {
            let start = self.stack.len() - count;
            self.stack.split_off(start)
        });
        self.stack.truncate(base);
        results
    }

    fn push_frame(&mut self, callee: &Value, args: &[Value]) -> Result<(), RuntimeError> {
        self.check_stack(args.len() + 1)?;
        self.stack.push(callee.clone());
        self.stack.extend(args.iter().cloned());
        Ok(())
    }

    fn native_fn(&self, function: FunctionRef) -> Result<NativeFn, RuntimeError> {
        match self.heap.get(function.0) {
            Some(HeapObject::Function(native)) => Ok(native.clone()),
            _ => Err(RuntimeError::StaleHandle {
                index: function.0.index,
            }),
        }
    }

    /// Invoke the callee at `slot`; its arguments are everything above it.
    fn call_at(&mut self, slot: usize) -> Result<usize, RuntimeError> {
        let callee = self.stack[slot].clone();
        let function = match &callee {
            Value::Function(f) => self.native_fn(*f)?,
            other => {
                let Value::Function(handler) = self.metamethod(other, "__call") else {
                    return Err(RuntimeError::NotCallable {
                        type_name: other.type_name(),
                    });
                };
                self.check_stack(1)?;
                self.stack.insert(slot, Value::Function(handler));
                self.native_fn(handler)?
            }
        };

        if self.call_depth >= self.config.max_call_depth {
            return Err(RuntimeError::StackOverflow {
                limit: self.config.max_call_depth,
            });
        }

        let base = slot + 1;
        self.call_depth += 1;
        let result = function.call(&mut CallContext::new(self, base));
        self.call_depth -= 1;

        let reported = result?;
        let available = self.stack.len().saturating_sub(base);
        if reported > available {
            return Err(RuntimeError::InvalidResultCount {
                reported,
                available,
            });
        }
        Ok(reported)
    }

    /// Index a value, following `__index` handlers.
    ///
    /// A table handler is indexed in turn; a function handler is called with
    /// the object and the key.
    pub fn index(&mut self, object: &Value, key: &Value) -> Result<Value, RuntimeError> {
        let mut current = object.clone();
        for _ in 0..MAX_INDEX_CHAIN {
            let handler = match &current {
                Value::Table(t) => {
                    let raw = self.raw_get(*t, key)?;
                    if !raw.is_nil() {
                        return Ok(raw);
                    }
                    let handler = self.metamethod(&current, "__index");
                    if handler.is_nil() {
                        return Ok(Value::Nil);
                    }
                    handler
                }
                other => {
                    let handler = self.metamethod(other, "__index");
                    if handler.is_nil() {
                        return Err(RuntimeError::NotIndexable {
                            type_name: other.type_name(),
                        });
                    }
                    handler
                }
            };

            if let Value::Function(_) = handler {
                let results = self.call(&handler, &[current, key.clone()])?;
                return Ok(results.into_iter().next().unwrap_or_default());
            }
            current = handler;
        }
        Err(RuntimeError::message("'__index' chain too long; possible loop"))
    }

    /// Look up `name` on the receiver and call it with the receiver
    /// prepended to `args`.
    pub fn call_method(
        &mut self,
        receiver: &Value,
        name: &str,
        args: &[Value],
    ) -> Result<Vec<Value>, RuntimeError> {
        let method = self.index(receiver, &Value::str(name))?;
        if method.is_nil() {
            return Err(RuntimeError::MissingMethod {
                method: name.to_string(),
                type_name: receiver.type_name(),
            });
        }
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(receiver.clone());
        full.extend_from_slice(args);
        self.call(&method, &full)
    }

    /// Render a value for display, honouring `__tostring`.
    pub fn to_display(&mut self, value: &Value) -> Result<String, RuntimeError> {
        let handler = self.metamethod(value, "__tostring");
        if !handler.is_nil() {
            let results = self.call(&handler, std::slice::from_ref(value))?;
            return match results.into_iter().next() {
                Some(Value::Str(s)) => Ok(s.to_string()),
                _ => Err(RuntimeError::message("'__tostring' must return a string")),
            };
        }

        Ok(match value {
            Value::Nil => "nil".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Str(s) => s.to_string(),
            Value::LightUserData(addr) => format!("userdata: {:#x}", addr),
            other => match other.heap_handle() {
                Some(handle) => format!("{}: {:#010x}", other.type_name(), handle.index),
                None => other.type_name().to_string(),
            },
        })
    }

    // ==========================================================================
    // Embedder data
    // ==========================================================================

    /// Store a per-state extension value, replacing any previous value of
    /// the same type.
    pub fn set_app_data<T: Any>(&mut self, data: T) {
        self.app_data.insert(TypeId::of::<T>(), Box::new(data));
    }

    pub fn app_data<T: Any>(&self) -> Option<&T> {
        self.app_data.get(&TypeId::of::<T>())?.downcast_ref::<T>()
    }

    pub fn app_data_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.app_data.get_mut(&TypeId::of::<T>())?.downcast_mut::<T>()
    }

    // ==========================================================================
    // Teardown
    // ==========================================================================

    /// Tear the runtime down, running every pending finalizer first.
    ///
    /// Dropping a state does the same; `close` only makes the point explicit.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.stack.clear();

        // Finalizers may allocate more finalizable userdata; drain until none remain.
        loop {
            let pending: Vec<_> = self
                .heap
                .handles()
                .into_iter()
                .rev()
                .filter(|handle| self.needs_finalizer(*handle))
                .collect();
            if pending.is_empty() {
                break;
            }
            for handle in pending {
                self.run_finalizer(handle);
            }
        }
        log::debug!("runtime closed with {} live objects", self.heap.live_count());
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for State {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("heap", &self.heap)
            .field("stack_depth", &self.stack.len())
            .field("call_depth", &self.call_depth)
            .finish_non_exhaustive()
    }
}
