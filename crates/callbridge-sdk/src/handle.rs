//! Generation-checked handle table
//!
//! Handles are the only thing a host ever sees of native state. Each handle
//! packs a slot index and the generation of that slot, so a handle that was
//! released keeps failing lookup even after its slot is reused.

use parking_lot::RwLock;
use std::fmt;

// ============================================================================
// Handle
// ============================================================================

/// Opaque 64-bit handle naming native-side state.
///
/// Layout: the low 32 bits hold `slot index + 1`, the high 32 bits hold the
/// slot generation. The raw value `0` is never issued by a [`HandleTable`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Handle(u64);

impl Handle {
    /// The handle that never names anything
    pub const NULL: Handle = Handle(0);

    fn new(index: u32, generation: u32) -> Self {
        Handle(((generation as u64) << 32) | (index as u64 + 1))
    }

    /// Rebuild a handle from the raw value that crossed the boundary
    pub fn from_raw(raw: u64) -> Self {
        Handle(raw)
    }

    /// Raw value handed to the host
    pub fn to_raw(self) -> u64 {
        self.0
    }

    /// Check for the null handle
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Slot index, or `None` for a handle with an empty index field
    pub fn index(self) -> Option<u32> {
        (self.0 as u32).checked_sub(1)
    }

    /// Slot generation this handle was issued for
    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index() {
            Some(index) => write!(f, "Handle({}v{})", index, self.generation()),
            None => write!(f, "Handle::NULL"),
        }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

// ============================================================================
// HandleTable
// ============================================================================

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

struct TableInner<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

/// Thread-safe arena mapping handles to values.
///
/// Lookups take a read lock; insert and remove take the write lock. The lock
/// is never held while caller code runs except inside [`HandleTable::with`].
pub struct HandleTable<T> {
    inner: RwLock<TableInner<T>>,
}

impl<T> HandleTable<T> {
    /// Create a new empty table.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(TableInner {
                slots: Vec::new(),
                free: Vec::new(),
                len: 0,
            }),
        }
    }

    /// Insert a value and return its handle.
    pub fn insert(&self, value: T) -> Handle {
        let mut inner = self.inner.write();
        inner.len += 1;
        if let Some(index) = inner.free.pop() {
            let slot = &mut inner.slots[index as usize];
            slot.value = Some(value);
            return Handle::new(index, slot.generation);
        }
        let index = inner.slots.len();
        debug_assert!(index < u32::MAX as usize, "handle table exhausted");
        inner.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        Handle::new(index as u32, 0)
    }

    /// Run `f` against the value named by `handle`.
    ///
    /// Returns `None` for the null handle, an unknown index, a vacant slot,
    /// or a generation mismatch.
    pub fn with<F, R>(&self, handle: Handle, f: F) -> Option<R>
    where
        F: FnOnce(&T) -> R,
    {
        let index = handle.index()? as usize;
        let inner = self.inner.read();
        let slot = inner.slots.get(index)?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.value.as_ref().map(f)
    }

    /// Remove the value named by `handle`, returning it.
    ///
    /// The slot's generation is bumped so every copy of `handle` goes stale.
    pub fn remove(&self, handle: Handle) -> Option<T> {
        let index = handle.index()?;
        let mut inner = self.inner.write();
        let slot = inner.slots.get_mut(index as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        inner.free.push(index);
        inner.len -= 1;
        Some(value)
    }

    /// Check whether `handle` currently names a value
    pub fn contains(&self, handle: Handle) -> bool {
        self.with(handle, |_| ()).is_some()
    }

    /// Number of live values
    pub fn len(&self) -> usize {
        self.inner.read().len
    }

    /// Check if the table holds no live values
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> HandleTable<T> {
    /// Get a clone of the value named by `handle`.
    pub fn get(&self, handle: Handle) -> Option<T> {
        self.with(handle, T::clone)
    }
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
