//! Arena-aware wrapper around an [`EthernetDriver`].
//!
//! Every buffer crossing into or out of the driver goes through the arena's
//! ownership transitions here, so the driver never sees a buffer the arena
//! does not know about.

use std::sync::Arc;

use log::{trace, warn};

use super::traits::{EthernetDriver, FrameTx, TxError};
use crate::arena::{BufferArena, BufferOwner, EthBuffer};
use crate::types::MacAddress;

/// Default number of buffers kept posted to the RX queue.
pub const DEFAULT_RX_DEPTH: usize = 64;

pub struct EthInterface<D: EthernetDriver> {
    arena: Arc<BufferArena>,
    driver: D,
    /// Buffers we try to keep queued for reception.
    rx_depth: usize,
    rx_queued: usize,
    tx_queued: usize,
}

impl<D: EthernetDriver> EthInterface<D> {
    pub fn new(arena: Arc<BufferArena>, driver: D) -> Self {
        // Leave at least half of the arena for transmit.
        let rx_depth = DEFAULT_RX_DEPTH.min(arena.total() / 2).max(1);
        Self {
            arena,
            driver,
            rx_depth,
            rx_queued: 0,
            tx_queued: 0,
        }
    }

    pub fn with_rx_depth(mut self, depth: usize) -> Self {
        self.rx_depth = depth;
        self
    }

    pub fn mac_address(&self) -> MacAddress {
        self.driver.mac_address()
    }

    pub fn arena(&self) -> &Arc<BufferArena> {
        &self.arena
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Top up the RX queue.
    pub fn refill_rx(&mut self) {
        while self.rx_queued < self.rx_depth {
            let Some(buf) = self.arena.acquire() else {
                return;
            };
            if !self.post_rx(buf) {
                return;
            }
        }
    }

    fn post_rx(&mut self, buf: EthBuffer) -> bool {
        self.arena.hand_off(&buf, BufferOwner::QueuedRx);
        match self.driver.queue_rx(buf) {
            Ok(()) => {
                self.rx_queued += 1;
                true
            }
            Err((_, buf)) => {
                self.arena.hand_off(&buf, BufferOwner::HeldByClient);
                self.arena.release(buf);
                false
            }
        }
    }

    /// Take one received frame off the driver.
    pub fn poll_rx(&mut self) -> Option<EthBuffer> {
        let buf = self.driver.poll_rx_complete()?;
        self.rx_queued = self.rx_queued.saturating_sub(1);
        self.arena.hand_off(&buf, BufferOwner::HeldByClient);
        Some(buf)
    }

    /// Give a consumed RX buffer back, re-posting it when the queue is short.
    pub fn recycle_rx(&mut self, mut buf: EthBuffer) {
        if self.rx_queued < self.rx_depth {
            buf.set_len(0);
            self.post_rx(buf);
        } else {
            self.arena.release(buf);
        }
    }

    /// Move every completed TX buffer back to the free list.
    pub fn reclaim_tx(&mut self) -> usize {
        let mut reclaimed = 0;
        while let Some(buf) = self.driver.poll_tx_complete() {
            self.arena.release(buf);
            self.tx_queued = self.tx_queued.saturating_sub(1);
            reclaimed += 1;
        }
        reclaimed
    }

    /// Buffers currently queued for transmission.
    pub fn tx_in_flight(&self) -> usize {
        self.tx_queued
    }
}

impl<D: EthernetDriver> FrameTx for EthInterface<D> {
    fn get_buffer(&mut self, block: bool) -> Option<EthBuffer> {
        if let Some(buf) = self.arena.acquire() {
            return Some(buf);
        }
        self.reclaim_tx();
        if let Some(buf) = self.arena.acquire() {
            return Some(buf);
        }
        if !block {
            trace!("eth: no free buffers, dropping best-effort send");
            return None;
        }
        loop {
            if self.tx_queued == 0 {
                // Nothing in flight will ever come back; waiting would hang.
                warn!("eth: arena exhausted with no transmit in flight");
                return None;
            }
            std::thread::yield_now();
            self.reclaim_tx();
            if let Some(buf) = self.arena.acquire() {
                return Some(buf);
            }
        }
    }

    fn send(&mut self, buf: EthBuffer) -> Result<(), TxError> {
        self.arena.hand_off(&buf, BufferOwner::QueuedTx);
        match self.driver.queue_tx(buf) {
            Ok(()) => {
                self.tx_queued += 1;
                Ok(())
            }
            Err((err, buf)) => {
                // QueuedTx -> Free is the completion edge; the driver never
                // took it, so retire it the same way.
                self.arena.release(buf);
                Err(err)
            }
        }
    }
}
