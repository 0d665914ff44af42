//! Mark-and-sweep collection with `__gc` finalizers.
//!
//! Roots are the globals table, the registry table, and every value on the
//! stack. Tables trace their keys, values, and metatable; userdata traces
//! its metatable. Native functions are opaque: any handle a closure captures
//! is not traced and must be kept reachable some other way.
//!
//! An unreachable userdata whose metatable has a `__gc` function is not
//! freed by the cycle that finds it. It is resurrected, its finalizer runs
//! exactly once, and a later cycle frees it if it is still unreachable.

use super::heap::HeapObject;
use super::{ObjectHandle, State, Value};

/// Outcome of one collection cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Finalizers run by this cycle.
    pub finalized: usize,
    /// Objects freed by this cycle.
    pub freed: usize,
    /// Objects still live afterwards.
    pub live: usize,
}

impl State {
    /// Run a full collection cycle.
    ///
    /// Does nothing while another collection is in progress (a finalizer
    /// calling back in) or after the state was closed.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn collect_garbage(&mut self) -> GcStats {
        if self.collecting || self.closed {
            return GcStats {
                live: self.heap.live_count(),
                ..GcStats::default()
            };
        }
        self.collecting = true;
        self.allocations_since_collect = 0;

        self.heap.clear_marks();
        let mut roots = vec![self.globals.0, self.registry.0];
        roots.extend(self.stack.iter().filter_map(Value::heap_handle));
        self.mark_from(roots);

        // Resurrect finalizable garbage so everything its finalizer can see
        // survives this cycle.
        let pending: Vec<ObjectHandle> = self
            .heap
            .handles()
            .into_iter()
            .filter(|handle| !self.heap.is_marked(*handle) && self.needs_finalizer(*handle))
            .collect();
        self.mark_from(pending.clone());

        let mut freed = 0;
        for handle in self.heap.handles() {
            if !self.heap.is_marked(handle) && self.heap.free(handle).is_some() {
                freed += 1;
            }
        }
        self.heap.clear_marks();

        // Reverse allocation order, so later objects finalize first.
        for handle in pending.iter().rev() {
            self.run_finalizer(*handle);
        }

        self.collecting = false;
        let stats = GcStats {
            finalized: pending.len(),
            freed,
            live: self.heap.live_count(),
        };
        log::trace!(
            "gc cycle: {} finalized, {} freed, {} live",
            stats.finalized,
            stats.freed,
            stats.live
        );
        stats
    }

    /// Collect if the configured allocation threshold was crossed.
    pub(crate) fn maybe_collect(&mut self) {
        let Some(threshold) = self.config.auto_collect_threshold else {
            return;
        };
        if self.allocations_since_collect >= threshold {
            self.collect_garbage();
        }
    }

    fn mark_from(&mut self, mut worklist: Vec<ObjectHandle>) {
        while let Some(handle) = worklist.pop() {
            if !self.heap.mark(handle) {
                continue;
            }
            match self.heap.get(handle) {
                Some(HeapObject::Table(table)) => {
                    for (key, value) in table.entries() {
                        worklist.extend(key.heap_handle());
                        worklist.extend(value.heap_handle());
                    }
                    worklist.extend(table.metatable.map(|mt| mt.0));
                }
                Some(HeapObject::UserData(ud)) => {
                    worklist.extend(ud.metatable.map(|mt| mt.0));
                }
                Some(HeapObject::Function(_)) | None => {}
            }
        }
    }

    fn gc_handler(&self, handle: ObjectHandle) -> Option<Value> {
        let Some(HeapObject::UserData(ud)) = self.heap.get(handle) else {
            return None;
        };
        if ud.finalized {
            return None;
        }
        let handler = self.get_field(ud.metatable?, "__gc").ok()?;
        matches!(handler, Value::Function(_)).then_some(handler)
    }

    /// Whether a userdata has a `__gc` finalizer that has not run yet.
    pub(crate) fn needs_finalizer(&self, handle: ObjectHandle) -> bool {
        self.gc_handler(handle).is_some()
    }

    /// Run a userdata's finalizer, marking it finalized first so it can
    /// never run twice. Finalizer errors are logged and swallowed.
    pub(crate) fn run_finalizer(&mut self, handle: ObjectHandle) {
        let Some(handler) = self.gc_handler(handle) else {
            return;
        };
        if let Some(HeapObject::UserData(ud)) = self.heap.get_mut(handle) {
            ud.finalized = true;
        }
        let object = Value::UserData(super::UserDataRef(handle));
        if let Err(err) = self.call(&handler, &[object]) {
            log::warn!("error in __gc finalizer: {}", err);
        }
    }
}
