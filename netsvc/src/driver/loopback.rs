//! In-memory ethernet driver.
//!
//! Frames written by the service land on a shared [`LoopbackWire`], and
//! frames injected on the wire are delivered into posted RX buffers. Used
//! for host-side bring-up and tests where no NIC exists.

use std::collections::VecDeque;
use std::sync::Arc;

use spin::Mutex;

use super::traits::{EthernetDriver, RxError, TxError};
use crate::arena::EthBuffer;
use crate::types::MacAddress;

/// Maximum buffers the fake device accepts per queue.
const QUEUE_DEPTH: usize = 128;

#[derive(Default)]
struct WireState {
    inbound: VecDeque<Vec<u8>>,
    outbound: Vec<Vec<u8>>,
    /// Keep transmitted buffers instead of completing them.
    hold_tx: bool,
}

/// The "cable" side of a [`LoopbackDriver`].
#[derive(Clone, Default)]
pub struct LoopbackWire(Arc<Mutex<WireState>>);

impl LoopbackWire {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a frame for the device to receive.
    pub fn inject(&self, frame: &[u8]) {
        self.0.lock().inbound.push_back(frame.to_vec());
    }

    /// Drain every frame the device has transmitted.
    pub fn take_sent(&self) -> Vec<Vec<u8>> {
        core::mem::take(&mut self.0.lock().outbound)
    }

    /// Stop (or resume) completing transmit buffers.
    pub fn set_hold_tx(&self, hold: bool) {
        self.0.lock().hold_tx = hold;
    }

    /// Frames waiting to be received.
    pub fn pending_inbound(&self) -> usize {
        self.0.lock().inbound.len()
    }
}

pub struct LoopbackDriver {
    mac: MacAddress,
    wire: LoopbackWire,
    rx_posted: VecDeque<EthBuffer>,
    tx_pending: VecDeque<EthBuffer>,
}

impl LoopbackDriver {
    pub fn new(mac: MacAddress, wire: LoopbackWire) -> Self {
        Self {
            mac,
            wire,
            rx_posted: VecDeque::new(),
            tx_pending: VecDeque::new(),
        }
    }
}

impl EthernetDriver for LoopbackDriver {
    fn mac_address(&self) -> MacAddress {
        self.mac
    }

    fn queue_tx(&mut self, buf: EthBuffer) -> Result<(), (TxError, EthBuffer)> {
        if self.tx_pending.len() >= QUEUE_DEPTH {
            return Err((TxError::QueueFull, buf));
        }
        self.wire.0.lock().outbound.push(buf.frame().to_vec());
        self.tx_pending.push_back(buf);
        Ok(())
    }

    fn queue_rx(&mut self, buf: EthBuffer) -> Result<(), (RxError, EthBuffer)> {
        if self.rx_posted.len() >= QUEUE_DEPTH {
            return Err((RxError::QueueFull, buf));
        }
        self.rx_posted.push_back(buf);
        Ok(())
    }

    fn poll_tx_complete(&mut self) -> Option<EthBuffer> {
        if self.wire.0.lock().hold_tx {
            return None;
        }
        self.tx_pending.pop_front()
    }

    fn poll_rx_complete(&mut self) -> Option<EthBuffer> {
        loop {
            if self.rx_posted.is_empty() {
                return None;
            }
            let frame = self.wire.0.lock().inbound.pop_front()?;
            let mut buf = self.rx_posted.pop_front()?;
            if frame.len() > buf.capacity() {
                // Oversized frames are dropped by the device.
                self.rx_posted.push_front(buf);
                continue;
            }
            buf.as_mut_slice()[..frame.len()].copy_from_slice(&frame);
            buf.set_len(frame.len());
            return Some(buf);
        }
    }
}
