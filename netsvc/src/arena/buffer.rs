//! Arena buffer with ownership tracking.

use crate::types::ETH_BUFFER_SIZE;

/// Generation-checked reference to an arena slot.
///
/// The generation changes every time the slot goes back to the free list,
/// so a handle kept past its release is detected on the next transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle {
    pub(crate) index: u16,
    pub(crate) generation: u32,
}

impl BufferHandle {
    /// Slot index within the arena.
    pub fn index(&self) -> u16 {
        self.index
    }

    /// Generation the handle was issued under.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// A packet buffer checked out of the arena.
///
/// The storage physically moves out of its slot while checked out, so the
/// holder of an `EthBuffer` is the only party that can touch the bytes.
/// It goes back to the arena through [`BufferArena::release`] or completes
/// a driver round trip via [`BufferArena::hand_off`].
///
/// [`BufferArena::release`]: super::BufferArena::release
/// [`BufferArena::hand_off`]: super::BufferArena::hand_off
pub struct EthBuffer {
    handle: BufferHandle,
    data: Box<[u8; ETH_BUFFER_SIZE]>,
    /// Valid bytes (frame length).
    len: usize,
}

impl EthBuffer {
    pub(crate) fn new(handle: BufferHandle, data: Box<[u8; ETH_BUFFER_SIZE]>) -> Self {
        Self { handle, data, len: 0 }
    }

    pub(crate) fn into_storage(self) -> (BufferHandle, Box<[u8; ETH_BUFFER_SIZE]>) {
        (self.handle, self.data)
    }

    /// Get the arena handle.
    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    /// Whole buffer, regardless of frame length.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data[..]
    }

    /// Valid frame bytes.
    pub fn frame(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Frame length.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Set the frame length.
    ///
    /// # Panics
    /// Panics if `len` exceeds the buffer capacity.
    pub fn set_len(&mut self, len: usize) {
        assert!(len <= ETH_BUFFER_SIZE, "Requested length exceeds buffer capacity");
        self.len = len;
    }

    /// Buffer capacity.
    pub const fn capacity(&self) -> usize {
        ETH_BUFFER_SIZE
    }
}

impl core::fmt::Debug for EthBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EthBuffer")
            .field("handle", &self.handle)
            .field("len", &self.len)
            .finish()
    }
}
