//! Generational arena backing every collectable runtime object.

use std::any::Any;
use std::fmt;

use super::table::Table;
use super::NativeFn;

/// Handle to a heap-allocated object.
///
/// The generation prevents a stale handle from reaching an object that was
/// later allocated in the same slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectHandle {
    /// Index into ObjectHeap.slots
    pub index: u32,
    /// Generation for use-after-free detection
    pub generation: u32,
}

impl ObjectHandle {
    /// Create a new object handle.
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

/// A userdata block: an opaque payload plus its metatable.
pub(crate) struct UserData {
    pub(crate) payload: Box<dyn Any>,
    pub(crate) metatable: Option<super::TableRef>,
    /// Set once the collector has invoked the `__gc` finalizer.
    pub(crate) finalized: bool,
}

pub(crate) enum HeapObject {
    Table(Table),
    Function(NativeFn),
    UserData(UserData),
}

struct HeapSlot {
    generation: u32,
    object: Option<HeapObject>,
    marked: bool,
}

/// Heap storage with generational indices.
///
/// When an object is freed its slot is reused, but the generation is
/// incremented so old handles stop resolving.
pub(crate) struct ObjectHeap {
    slots: Vec<HeapSlot>,
    free_list: Vec<u32>,
    live: usize,
}

impl ObjectHeap {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            live: 0,
        }
    }

    pub(crate) fn allocate(&mut self, object: HeapObject) -> ObjectHandle {
        self.live += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.object = Some(object);
            slot.marked = false;
            ObjectHandle::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(HeapSlot {
                generation: 0,
                object: Some(object),
                marked: false,
            });
            ObjectHandle::new(index, 0)
        }
    }

    /// Returns None if the handle is stale.
    pub(crate) fn get(&self, handle: ObjectHandle) -> Option<&HeapObject> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.object.as_ref()
    }

    pub(crate) fn get_mut(&mut self, handle: ObjectHandle) -> Option<&mut HeapObject> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.object.as_mut()
    }

    pub(crate) fn contains(&self, handle: ObjectHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Free an object, returning it so the caller controls when it drops.
    pub(crate) fn free(&mut self, handle: ObjectHandle) -> Option<HeapObject> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let object = slot.object.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        slot.marked = false;
        self.free_list.push(handle.index);
        self.live -= 1;
        Some(object)
    }

    /// Mark an object reachable. Returns true the first time it is marked.
    pub(crate) fn mark(&mut self, handle: ObjectHandle) -> bool {
        match self.slots.get_mut(handle.index as usize) {
            Some(slot)
                if slot.generation == handle.generation && slot.object.is_some() && !slot.marked =>
            {
                slot.marked = true;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn is_marked(&self, handle: ObjectHandle) -> bool {
        self.slots
            .get(handle.index as usize)
            .is_some_and(|slot| slot.generation == handle.generation && slot.marked)
    }

    pub(crate) fn clear_marks(&mut self) {
        for slot in &mut self.slots {
            slot.marked = false;
        }
    }

    /// Handles of every live object, in slot order.
    pub(crate) fn handles(&self) -> Vec<ObjectHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.object.is_some())
            .map(|(index, slot)| ObjectHandle::new(index as u32, slot.generation))
            .collect()
    }

    pub(crate) fn live_count(&self) -> usize {
        self.live
    }
}

impl fmt::Debug for ObjectHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHeap")
            .field("slot_count", &self.slots.len())
            .field("free_count", &self.free_list.len())
            .field("live", &self.live)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> HeapObject {
        HeapObject::Table(Table::default())
    }

    #[test]
    fn allocate_and_get() {
        let mut heap = ObjectHeap::new();
        let handle = heap.allocate(table());
        assert!(matches!(heap.get(handle), Some(HeapObject::Table(_))));
        assert_eq!(heap.live_count(), 1);
    }

    #[test]
    fn generational_handles() {
        let mut heap = ObjectHeap::new();
        let first = heap.allocate(table());
        assert!(heap.free(first).is_some());
        assert!(heap.get(first).is_none());

        let second = heap.allocate(table());
        assert_eq!(second.index, first.index);
        assert_ne!(second.generation, first.generation);
        assert!(heap.get(first).is_none());
        assert!(heap.contains(second));
    }

    #[test]
    fn double_free_is_ignored() {
        let mut heap = ObjectHeap::new();
        let handle = heap.allocate(table());
        assert!(heap.free(handle).is_some());
        assert!(heap.free(handle).is_none());
        assert_eq!(heap.live_count(), 0);
    }

    #[test]
    fn mark_once() {
        let mut heap = ObjectHeap::new();
        let handle = heap.allocate(table());
        assert!(heap.mark(handle));
        assert!(!heap.mark(handle));
        assert!(heap.is_marked(handle));
        heap.clear_marks();
        assert!(!heap.is_marked(handle));
    }

    #[test]
    fn stale_handle_is_never_marked() {
        let mut heap = ObjectHeap::new();
        let handle = heap.allocate(table());
        heap.free(handle);
        assert!(!heap.mark(handle));
    }

    #[test]
    fn handles_lists_live_objects() {
        let mut heap = ObjectHeap::new();
        let a = heap.allocate(table());
        let b = heap.allocate(table());
        heap.free(a);
        assert_eq!(heap.handles(), vec![b]);
    }

    #[test]
    fn debug_output() {
        let heap = ObjectHeap::new();
        assert_eq!(
            format!("{:?}", heap),
            "ObjectHeap { slot_count: 0, free_count: 0, live: 0 }"
        );
    }
}
