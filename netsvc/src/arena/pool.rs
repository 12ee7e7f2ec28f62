//! Buffer arena management.

use spin::Mutex;

use super::buffer::{BufferHandle, EthBuffer};
use super::ownership::BufferOwner;
use crate::types::ETH_BUFFER_SIZE;

/// Default number of buffers shared with the driver.
pub const ETH_BUFFER_COUNT: usize = 256;

/// Tag written into every slot; a mismatch means something scribbled over
/// arena bookkeeping.
const SLOT_MAGIC: u32 = 0x4554_4842; // "ETHB"

struct Slot {
    magic: u32,
    owner: BufferOwner,
    generation: u32,
    /// Present while the slot is on the free list.
    storage: Option<Box<[u8; ETH_BUFFER_SIZE]>>,
}

struct ArenaInner {
    slots: Vec<Slot>,
    /// Indices of free slots (LIFO).
    free_list: Vec<u16>,
}

impl ArenaInner {
    /// Validate and apply one ownership transition.
    ///
    /// # Panics
    /// Panics on a stale handle, a corrupted slot, or an illegal transition.
    /// These are deliberate fail-fast corruption checks.
    fn transition(&mut self, handle: BufferHandle, to: BufferOwner) -> &mut Slot {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .unwrap_or_else(|| panic!("BUG: buffer index {} out of range", handle.index));
        debug_assert_eq!(slot.magic, SLOT_MAGIC, "BUG: arena slot {} corrupted", handle.index);
        assert_eq!(
            slot.generation, handle.generation,
            "BUG: stale buffer handle {:?} (slot generation {})",
            handle, slot.generation
        );
        assert!(
            slot.owner.can_transition(to),
            "BUG: illegal buffer transition {:?} -> {:?} on slot {}",
            slot.owner,
            to,
            handle.index
        );
        slot.owner = to;
        slot
    }
}

/// Fixed pool of packet buffers shared with the ethernet driver.
///
/// The free list and ownership table sit behind a single lock that is only
/// held for O(1) bookkeeping, never across I/O.
pub struct BufferArena {
    inner: Mutex<ArenaInner>,
    total: usize,
}

impl BufferArena {
    /// Allocate `count` buffers up front.
    ///
    /// # Panics
    /// Panics if `count` is zero or does not fit a `u16` index.
    pub fn new(count: usize) -> Self {
        assert!(count > 0, "Arena must hold at least one buffer");
        assert!(count <= u16::MAX as usize, "Arena size exceeds maximum");

        let slots = (0..count)
            .map(|_| Slot {
                magic: SLOT_MAGIC,
                owner: BufferOwner::Free,
                generation: 0,
                storage: Some(Box::new([0u8; ETH_BUFFER_SIZE])),
            })
            .collect();
        // Reverse so index 0 is handed out first.
        let free_list = (0..count as u16).rev().collect();

        Self {
            inner: Mutex::new(ArenaInner { slots, free_list }),
            total: count,
        }
    }

    /// Take a buffer from the free list (Free -> HeldByClient).
    ///
    /// Returns `None` when the free list is empty; that is the normal
    /// "retry later" condition, not an error.
    pub fn acquire(&self) -> Option<EthBuffer> {
        let mut inner = self.inner.lock();
        let index = inner.free_list.pop()?;
        let generation = inner.slots[index as usize].generation;
        let handle = BufferHandle { index, generation };
        let slot = inner.transition(handle, BufferOwner::HeldByClient);
        let storage = slot
            .storage
            .take()
            .unwrap_or_else(|| panic!("BUG: free slot {} has no storage", index));
        Some(EthBuffer::new(handle, storage))
    }

    /// Record that a buffer changed hands without returning to the free list
    /// (client -> driver queue, or driver RX completion -> client).
    pub fn hand_off(&self, buf: &EthBuffer, to: BufferOwner) {
        assert!(!to.is_free(), "BUG: use release() to free a buffer");
        self.inner.lock().transition(buf.handle(), to);
    }

    /// Return a buffer to the free list.
    ///
    /// Valid from `HeldByClient` (client done with it) and `QueuedTx`
    /// (driver confirmed transmission).
    pub fn release(&self, buf: EthBuffer) {
        let (handle, storage) = buf.into_storage();
        let mut inner = self.inner.lock();
        let slot = inner.transition(handle, BufferOwner::Free);
        slot.generation = slot.generation.wrapping_add(1);
        slot.storage = Some(storage);
        inner.free_list.push(handle.index);
    }

    /// Current owner of the slot behind `handle`.
    pub fn owner(&self, handle: BufferHandle) -> Option<BufferOwner> {
        let inner = self.inner.lock();
        inner
            .slots
            .get(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
            .map(|s| s.owner)
    }

    /// Get number of available (free) buffers.
    pub fn available(&self) -> usize {
        self.inner.lock().free_list.len()
    }

    /// Get total number of buffers in the arena.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Get number of buffers currently out of the free list.
    pub fn in_use(&self) -> usize {
        self.total - self.available()
    }

    /// Count slots in a given state (for diagnostics).
    pub fn count_owned_by(&self, owner: BufferOwner) -> usize {
        self.inner.lock().slots.iter().filter(|s| s.owner == owner).count()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════
