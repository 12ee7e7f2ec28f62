//! Buffer ownership state machine.
//!
//! # State Machine
//! ```text
//!                ┌──────hand_off()──────▶ QUEUED_TX ──tx complete──┐
//!                │                                                 ▼
//!   FREE ──acquire()──▶ HELD_BY_CLIENT ──────release()─────────▶ FREE
//!                ▲                │
//!                └──rx complete── QUEUED_RX ◀──hand_off()
//! ```
//!
//! INVARIANT: a buffer is in exactly one of these states, and only the
//! transitions drawn above are legal. Anything else is memory corruption.

/// Who currently owns an arena buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferOwner {
    /// On the free list.
    Free,
    /// Queued to the driver for transmission.
    QueuedTx,
    /// Queued to the driver to receive a frame into.
    QueuedRx,
    /// Held by a single send/receive caller.
    HeldByClient,
}

impl BufferOwner {
    /// Check whether `self -> to` is a legal transition.
    pub const fn can_transition(self, to: BufferOwner) -> bool {
        use BufferOwner::*;
        match (self, to) {
            (Free, HeldByClient) => true,
            (HeldByClient, QueuedTx) => true,
            (HeldByClient, QueuedRx) => true,
            (HeldByClient, Free) => true,
            (QueuedTx, Free) => true,
            (QueuedRx, HeldByClient) => true,
            (Free, _) | (HeldByClient, _) | (QueuedTx, _) | (QueuedRx, _) => false,
        }
    }

    /// Check if the driver currently owns the buffer.
    pub const fn is_driver_owned(self) -> bool {
        matches!(self, BufferOwner::QueuedTx | BufferOwner::QueuedRx)
    }

    /// Check if buffer can be allocated.
    pub const fn is_free(self) -> bool {
        matches!(self, BufferOwner::Free)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        use BufferOwner::*;
        assert!(Free.can_transition(HeldByClient));
        assert!(HeldByClient.can_transition(QueuedTx));
        assert!(QueuedTx.can_transition(Free));
        assert!(QueuedRx.can_transition(HeldByClient));
    }

    #[test]
    fn test_illegal_transitions() {
        use BufferOwner::*;
        assert!(!Free.can_transition(Free));
        assert!(!Free.can_transition(QueuedTx));
        assert!(!QueuedTx.can_transition(HeldByClient));
        assert!(!QueuedRx.can_transition(Free));
        assert!(!QueuedTx.can_transition(QueuedRx));
    }
}
