//! UDP port demultiplexer.
//!
//! | port  | service           | multicast |
//! |-------|-------------------|-----------|
//! | 33330 | netboot control   | yes       |
//! | 33340 | TFTP transfer     | no        |
//! | 33341 | TFTP new session  | no        |
//! | 33338 | debug-log ack     | no        |

use log::trace;

use crate::debuglog::DEBUGLOG_ACK_PORT;
use crate::inet6::UdpDatagram;
use crate::netboot::{Role, NB_SERVER_PORT};
use crate::tftp::{TFTP_INCOMING_PORT, TFTP_OUTGOING_PORT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Netboot,
    Tftp,
    DebugLogAck,
}

impl Service {
    pub fn for_port(port: u16) -> Option<Self> {
        match port {
            NB_SERVER_PORT => Some(Self::Netboot),
            TFTP_INCOMING_PORT | TFTP_OUTGOING_PORT => Some(Self::Tftp),
            DEBUGLOG_ACK_PORT => Some(Self::DebugLogAck),
            _ => None,
        }
    }

    /// Only netboot queries are sent to a group address.
    pub fn accepts_multicast(self) -> bool {
        self == Self::Netboot
    }

    /// Services still reachable in the minimal role.
    pub fn allowed_in(self, role: Role) -> bool {
        match role {
            Role::Full => true,
            // The netboot server filters further down to QUERY.
            Role::Minimal => self != Self::Tftp,
        }
    }
}

/// Pick the service for an inbound datagram, or `None` to drop it.
pub fn demux(dgram: &UdpDatagram<'_>, role: Role) -> Option<Service> {
    let Some(service) = Service::for_port(dgram.dst_port) else {
        trace!("dispatch: no listener on port {}", dgram.dst_port);
        return None;
    };
    if dgram.is_multicast() && !service.accepts_multicast() {
        trace!("dispatch: multicast to {:?} dropped", service);
        return None;
    }
    if !service.allowed_in(role) {
        trace!("dispatch: {:?} disabled in {:?} role", service, role);
        return None;
    }
    Some(service)
}
