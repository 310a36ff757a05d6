//! # Handle Heap
//!
//! Per-execution-context registry of live share vectors. The heap is the sole
//! authority on whether a handle presented by the interpreter refers to a
//! live vector of the expected type.
//!
//! Handles are generational indices rather than addresses:
//!
//! ```text
//!  63        48 47        32 31                         0
//! +------------+------------+----------------------------+
//! |  heap id   | generation |       slot index + 1       |
//! +------------+------------+----------------------------+
//! ```
//!
//! - The heap id is reserved in a process-wide table of live ids and released
//!   when the heap is dropped, so two heaps alive at the same time never issue
//!   the same handle value. Creating a heap fails while every id is in use.
//! - The generation is bumped whenever a slot is freed, so a stale handle never
//!   matches the slot's next occupant. A slot whose generation would wrap is
//!   retired for good.
//! - The low word is never zero, so `0` is never a valid handle.

use std::collections::TryReserveError;

use parking_lot::Mutex;
use thiserror::Error;

use crate::share_vector::{AnyShareVec, ShareVec};
use crate::value_traits::{ShareValue, TypeTag};

const HEAP_ID_WORDS: usize = (u16::MAX as usize + 1) / 64;

static HEAP_IDS: Mutex<HeapIdSpace> = parking_lot::const_mutex(HeapIdSpace::new());

/// Bitmap of heap ids held by live heaps
///
/// Id 0 is never handed out. Allocation continues after the last id issued,
/// so a released id is only reused once the rest of the space has been tried.
struct HeapIdSpace {
    in_use: [u64; HEAP_ID_WORDS],
    next: u16,
}

impl HeapIdSpace {
    const fn new() -> Self {
        HeapIdSpace {
            in_use: [0; HEAP_ID_WORDS],
            next: 1,
        }
    }

    fn is_used(&self, id: u16) -> bool {
        self.in_use[id as usize / 64] & (1 << (id % 64)) != 0
    }

    fn acquire(&mut self) -> Option<u16> {
        for _ in 0..u16::MAX {
            let id = self.next;
            self.next = self.next.checked_add(1).unwrap_or(1);
            if !self.is_used(id) {
                self.in_use[id as usize / 64] |= 1 << (id % 64);
                return Some(id);
            }
        }
        None
    }

    fn release(&mut self, id: u16) {
        self.in_use[id as usize / 64] &= !(1 << (id % 64));
    }
}

/// Opaque handle to a registered share vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Handle(u64);

impl Handle {
    pub const NULL: Handle = Handle(0);

    pub const fn from_raw(raw: u64) -> Self {
        Handle(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    fn pack(heap_id: u16, generation: u16, slot: usize) -> Self {
        Handle(((heap_id as u64) << 48) | ((generation as u64) << 32) | (slot as u64 + 1))
    }

    fn heap_id(self) -> u16 {
        (self.0 >> 48) as u16
    }

    fn generation(self) -> u16 {
        (self.0 >> 32) as u16
    }

    fn slot(self) -> Option<usize> {
        match self.0 as u32 {
            0 => None,
            low => Some(low as usize - 1),
        }
    }
}

/// Failure to register a vector
#[derive(Debug, Error)]
pub enum HeapError {
    #[error("heap bookkeeping allocation failed: {0}")]
    OutOfMemory(#[from] TryReserveError),
    #[error("handle space exhausted")]
    Exhausted,
    #[error("every heap id is held by a live heap")]
    IdsExhausted,
}

enum Slot {
    Occupied { generation: u16, vector: AnyShareVec },
    Vacant { generation: u16 },
    Retired,
}

/// Registry of live share vectors for one execution context
pub struct HandleHeap {
    id: u16,
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl HandleHeap {
    /// Create an empty heap with an id no other live heap holds
    pub fn new() -> Result<Self, HeapError> {
        let id = HEAP_IDS.lock().acquire().ok_or(HeapError::IdsExhausted)?;
        Ok(HandleHeap {
            id,
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        })
    }

    /// Number of live vectors
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Register a vector and return its handle
    ///
    /// On failure the vector is not registered and is released here.
    pub fn insert<T: ShareValue>(&mut self, vector: ShareVec<T>) -> Result<Handle, HeapError> {
        let vector = T::wrap(vector);

        if let Some(index) = self.free.pop() {
            let index = index as usize;
            let generation = match self.slots[index] {
                Slot::Vacant { generation } => generation,
                // Free list only ever holds vacant slots.
                _ => return Err(HeapError::Exhausted),
            };
            self.slots[index] = Slot::Occupied { generation, vector };
            self.live += 1;
            return Ok(Handle::pack(self.id, generation, index));
        }

        let index = self.slots.len();
        if index >= u32::MAX as usize {
            return Err(HeapError::Exhausted);
        }
        self.slots.try_reserve(1)?;
        // Keep room for every slot on the free list so erase never allocates.
        self.free.try_reserve(self.slots.len() + 1 - self.free.len())?;

        self.slots.push(Slot::Occupied {
            generation: 0,
            vector,
        });
        self.live += 1;
        Ok(Handle::pack(self.id, 0, index))
    }

    fn entry(&self, handle: Handle) -> Option<&AnyShareVec> {
        if handle.heap_id() != self.id {
            return None;
        }
        match self.slots.get(handle.slot()?)? {
            Slot::Occupied { generation, vector } if *generation == handle.generation() => {
                Some(vector)
            }
            _ => None,
        }
    }

    fn entry_mut(&mut self, handle: Handle) -> Option<&mut AnyShareVec> {
        if handle.heap_id() != self.id {
            return None;
        }
        match self.slots.get_mut(handle.slot()?)? {
            Slot::Occupied { generation, vector } if *generation == handle.generation() => {
                Some(vector)
            }
            _ => None,
        }
    }

    /// Type tag of a live handle
    pub fn tag_of(&self, handle: Handle) -> Option<TypeTag> {
        self.entry(handle).map(AnyShareVec::tag)
    }

    /// True iff `handle` is live in this heap and was registered as a `T` vector
    pub fn is_valid_handle<T: ShareValue>(&self, handle: Handle) -> bool {
        self.tag_of(handle) == Some(T::TAG)
    }

    pub fn get<T: ShareValue>(&self, handle: Handle) -> Option<&ShareVec<T>> {
        self.entry(handle).and_then(T::downcast_ref)
    }

    pub fn get_mut<T: ShareValue>(&mut self, handle: Handle) -> Option<&mut ShareVec<T>> {
        self.entry_mut(handle).and_then(T::downcast_mut)
    }

    /// Borrow two distinct live vectors, the first shared and the second unique
    pub fn get_pair_mut<T: ShareValue>(
        &mut self,
        src: Handle,
        dest: Handle,
    ) -> Option<(&ShareVec<T>, &mut ShareVec<T>)> {
        if src == dest || !self.is_valid_handle::<T>(src) || !self.is_valid_handle::<T>(dest) {
            return None;
        }
        let src_index = src.slot()?;
        let dest_index = dest.slot()?;

        let (src_slot, dest_slot) = if src_index < dest_index {
            let (low, high) = self.slots.split_at_mut(dest_index);
            (&low[src_index], &mut high[0])
        } else {
            let (low, high) = self.slots.split_at_mut(src_index);
            (&high[0], &mut low[dest_index])
        };

        match (src_slot, dest_slot) {
            (Slot::Occupied { vector: s, .. }, Slot::Occupied { vector: d, .. }) => {
                Some((T::downcast_ref(s)?, T::downcast_mut(d)?))
            }
            _ => None,
        }
    }

    /// Move a vector out of its slot, leaving an empty vector behind
    ///
    /// The handle stays live; the caller must hand the vector back with
    /// `restore`. This lets inputs be borrowed from the heap while the output
    /// is being written.
    pub fn lease<T: ShareValue>(&mut self, handle: Handle) -> Option<ShareVec<T>> {
        self.get_mut::<T>(handle).map(std::mem::take)
    }

    /// Put a leased vector back; returns false if the handle is no longer live
    pub fn restore<T: ShareValue>(&mut self, handle: Handle, vector: ShareVec<T>) -> bool {
        match self.get_mut::<T>(handle) {
            Some(slot) => {
                *slot = vector;
                true
            }
            None => false,
        }
    }

    /// Release the vector behind `handle`
    ///
    /// Returns false if the handle was never issued by this heap or has already
    /// been erased.
    pub fn erase(&mut self, handle: Handle) -> bool {
        if self.entry(handle).is_none() {
            return false;
        }
        let Some(index) = handle.slot() else {
            return false;
        };
        self.vacate(index);
        true
    }

    fn vacate(&mut self, index: usize) {
        let next = match self.slots[index] {
            Slot::Occupied { generation, .. } => generation.checked_add(1),
            _ => return,
        };
        self.live -= 1;
        match next {
            Some(generation) => {
                self.slots[index] = Slot::Vacant { generation };
                self.free.push(index as u32);
            }
            None => self.slots[index] = Slot::Retired,
        }
    }

    /// Release every live vector, returning how many were released
    pub fn sweep(&mut self) -> usize {
        let released = self.live;
        for index in 0..self.slots.len() {
            self.vacate(index);
        }
        released
    }

    /// Handles of all live vectors, in slot order
    pub fn handles(&self) -> Vec<Handle> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                Slot::Occupied { generation, .. } => Some(Handle::pack(self.id, *generation, index)),
                _ => None,
            })
            .collect()
    }
}

impl Drop for HandleHeap {
    fn drop(&mut self) {
        HEAP_IDS.lock().release(self.id);
    }
}
