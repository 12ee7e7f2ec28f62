//! Driver trait definitions.

use crate::arena::EthBuffer;
use crate::types::MacAddress;

/// TX error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxError {
    /// TX queue is full, try again after completions collected.
    QueueFull,
    /// Device not ready.
    DeviceNotReady,
    /// Frame too large.
    FrameTooLarge,
}

/// RX error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxError {
    /// RX queue cannot take more buffers.
    QueueFull,
    /// Device error.
    DeviceError,
}

/// FIFO buffer exchange with the ethernet device.
///
/// Buffers move into the driver on `queue_*` and come back through the
/// matching `poll_*_complete`. A rejected `queue_*` hands the buffer back
/// with the error so it is never lost.
///
/// # Contract
/// - Every method MUST return immediately (no completion wait)
/// - A buffer returned from `poll_rx_complete` has its length set to the
///   received frame size
pub trait EthernetDriver {
    /// Get MAC address.
    fn mac_address(&self) -> MacAddress;

    /// Queue a filled buffer for transmission.
    fn queue_tx(&mut self, buf: EthBuffer) -> Result<(), (TxError, EthBuffer)>;

    /// Queue an empty buffer for reception.
    fn queue_rx(&mut self, buf: EthBuffer) -> Result<(), (RxError, EthBuffer)>;

    /// Collect one transmitted buffer, if any.
    fn poll_tx_complete(&mut self) -> Option<EthBuffer>;

    /// Collect one filled receive buffer, if any.
    fn poll_rx_complete(&mut self) -> Option<EthBuffer>;

    /// Get link status.
    fn link_up(&self) -> bool {
        true
    }
}

/// Outbound frame path used by the IPv6 engine.
pub trait FrameTx {
    /// Get a buffer to build a frame into.
    ///
    /// With `block == false` an exhausted arena yields `None` ("retry
    /// later"); with `block == true` the call waits for TX completions.
    fn get_buffer(&mut self, block: bool) -> Option<EthBuffer>;

    /// Transmit the first `buf.len()` bytes of `buf`.
    fn send(&mut self, buf: EthBuffer) -> Result<(), TxError>;
}
