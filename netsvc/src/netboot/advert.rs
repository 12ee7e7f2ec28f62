//! Periodic ADVERTISE multicast.
//!
//! Hosts on the link discover the device from these. The same payload is
//! sent unicast in reply to GET_ADVERT.

use log::trace;
use smoltcp::time::{Duration, Instant};

use super::proto::{encode, nul_terminated, NB_ADVERTISE, NB_ADVERT_PORT, NB_SERVER_PORT, NB_VERSION, NB_VERSION_STRING};
use crate::inet6::{UdpSink, ALL_NODES};

pub const ADVERT_INTERVAL: Duration = Duration::from_millis(1000);

/// `version=<v>;nodename=<n>`
pub fn advert_payload(nodename: &str) -> String {
    format!("version={};nodename={}", NB_VERSION_STRING, nodename)
}

/// Full ADVERTISE message.
pub fn advert_message(cookie: u32, nodename: &str) -> Vec<u8> {
    encode(cookie, NB_ADVERTISE, NB_VERSION, &nul_terminated(&advert_payload(nodename)))
}

pub struct Advertiser {
    enabled: bool,
    next: Instant,
}

impl Advertiser {
    pub fn new(enabled: bool) -> Self {
        Self { enabled, next: Instant::ZERO }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.enabled.then_some(self.next)
    }

    /// Send one advertisement if the interval elapsed.
    ///
    /// Skipped (but rescheduled) while `busy`, so a transfer in flight does
    /// not compete with broadcast traffic.
    pub fn poll(&mut self, now: Instant, nodename: &str, busy: bool, sink: &mut dyn UdpSink) {
        if !self.enabled || now < self.next {
            return;
        }
        self.next = now + ADVERT_INTERVAL;
        if busy {
            return;
        }
        let msg = advert_message(0, nodename);
        if let Err(e) = sink.send_udp(&msg, &ALL_NODES, NB_ADVERT_PORT, NB_SERVER_PORT, false) {
            trace!("netboot: advertisement not sent: {}", e);
        }
    }
}
