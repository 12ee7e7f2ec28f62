//! Event-loop state.
//!
//! Everything the loop touches lives in one [`NetworkContext`], built once at
//! startup and passed explicitly. Only the paver job escapes to another
//! thread.
//!
//! # Poll phases
//!
//! ```text
//! 1. RX refill      keep the driver's receive queue topped up
//! 2. RX drain       eth_recv → dispatch → netboot | tftp | debuglog
//! 3. Timers         tftp retransmit, advertisement, debug log, RA
//! 4. TX reclaim     return completed transmit buffers to the arena
//! ```

use std::sync::Arc;

use log::{error, info, warn};
use smoltcp::time::Instant;

use crate::arena::{BufferArena, ETH_BUFFER_COUNT};
use crate::config::NetsvcConfig;
use crate::debuglog::DebugLog;
use crate::dispatch::{demux, Service};
use crate::driver::{EthInterface, EthernetDriver};
use crate::file::{FileRouter, PassthroughFs, SysInfo};
use crate::inet6::{Inet6, Outbound, UdpDatagram};
use crate::netboot::{Advertiser, BootAction, BootHost, NetbootServer};
use crate::paver::{Paver, PaverConnector};
use crate::tftp::TftpAdapter;

#[cfg(feature = "router-advertisement")]
use crate::netboot::ADVERT_INTERVAL as RA_INTERVAL;

/// External collaborators the service is wired to.
pub struct Services {
    pub connector: Arc<dyn PaverConnector>,
    pub sysinfo: Box<dyn SysInfo>,
    pub fs: Box<dyn PassthroughFs>,
    pub host: Box<dyn BootHost>,
}

/// Outcome of running a boot action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandOff {
    /// The host accepted the reboot; stop polling.
    Rebooting,
    /// mexec or reboot failed; keep serving.
    Failed,
}

pub struct NetworkContext<D: EthernetDriver> {
    eth: EthInterface<D>,
    inet: Inet6,
    netboot: NetbootServer,
    advertiser: Advertiser,
    tftp: TftpAdapter,
    router: FileRouter,
    debuglog: Option<DebugLog>,
    host: Box<dyn BootHost>,
    #[cfg(feature = "router-advertisement")]
    ra_next: Option<Instant>,
}

impl<D: EthernetDriver> NetworkContext<D> {
    /// Wire up the service on `driver`.
    pub fn new(config: &NetsvcConfig, driver: D, services: Services) -> Self {
        Self::with_arena(config, driver, services, Arc::new(BufferArena::new(ETH_BUFFER_COUNT)))
    }

    pub fn with_arena(config: &NetsvcConfig, driver: D, services: Services, arena: Arc<BufferArena>) -> Self {
        let eth = EthInterface::new(arena, driver);
        let mac = eth.mac_address();
        let nodename = config.nodename_for(mac);
        info!("netsvc: nodename {} role {:?}", nodename, config.role);

        let paver = Paver::new(services.connector).with_timeout_multiplier(config.paver_timeout_multiplier);
        let router = FileRouter::new(paver, services.sysinfo, services.fs, &nodename);

        Self {
            eth,
            inet: Inet6::new(mac, config.log_packets),
            netboot: NetbootServer::new(config.role, &nodename, config.tftp_timeout),
            advertiser: Advertiser::new(config.advertise_enabled()),
            tftp: TftpAdapter::new(),
            router,
            debuglog: None,
            host: services.host,
            #[cfg(feature = "router-advertisement")]
            ra_next: config.router_advertisement.then_some(Instant::ZERO),
        }
    }

    /// Ship log lines over the network too.
    pub fn with_debuglog(mut self, log: DebugLog) -> Self {
        self.debuglog = Some(log);
        self
    }

    pub fn nodename(&self) -> &str {
        self.netboot.nodename()
    }

    pub fn inet(&self) -> &Inet6 {
        &self.inet
    }

    pub fn router(&self) -> &FileRouter {
        &self.router
    }

    pub fn eth_mut(&mut self) -> &mut EthInterface<D> {
        &mut self.eth
    }

    /// Nothing in flight and nothing scheduled soon.
    pub fn is_idle(&self) -> bool {
        !self.tftp.is_active() && !self.router.is_open() && !self.router.paver().in_progress()
    }

    /// Earliest timer the loop must wake up for.
    pub fn next_deadline(&self) -> Option<Instant> {
        let timers = [
            self.tftp.next_deadline(),
            self.advertiser.next_deadline(),
            self.debuglog.as_ref().and_then(|d| d.next_deadline()),
        ];
        let next = timers.into_iter().flatten().min();
        #[cfg(feature = "router-advertisement")]
        let next = next.into_iter().chain(self.ra_next).min();
        next
    }

    /// Run one pass of the loop.
    ///
    /// # Returns
    /// A boot action requested during this pass; the caller runs it with
    /// [`hand_off`](Self::hand_off).
    pub fn poll(&mut self, now: Instant) -> Option<BootAction> {
        self.inet.set_now(now);

        // Phase 1
        self.eth.refill_rx();

        // Phase 2
        let mut action = None;
        while let Some(buf) = self.eth.poll_rx() {
            if let Some(dgram) = self.inet.eth_recv(&mut self.eth, buf.frame()) {
                if let Some(requested) = self.dispatch(&dgram, now) {
                    action.get_or_insert(requested);
                }
            }
            self.eth.recycle_rx(buf);
        }

        // Phase 3
        self.run_timers(now);

        // Phase 4
        self.eth.reclaim_tx();

        action
    }

    fn dispatch(&mut self, dgram: &UdpDatagram<'_>, now: Instant) -> Option<BootAction> {
        let service = demux(dgram, self.netboot.role())?;
        let mut out = Outbound::new(&mut self.inet, &mut self.eth);
        match service {
            Service::Netboot => self.netboot.recv(dgram, &mut out, &mut self.router, self.host.as_mut()),
            Service::Tftp => {
                self.tftp.recv(dgram, now, &mut out, &mut self.router);
                None
            }
            Service::DebugLogAck => {
                if let Some(log) = self.debuglog.as_mut() {
                    log.recv_ack(dgram.payload, now);
                }
                None
            }
        }
    }

    fn run_timers(&mut self, now: Instant) {
        let busy = self.tftp.is_active() || self.router.is_open() || self.netboot.is_busy();
        let mut out = Outbound::new(&mut self.inet, &mut self.eth);

        self.tftp.timeout_expired(now, &mut out, &mut self.router);
        self.advertiser.poll(now, self.netboot.nodename(), busy, &mut out);
        if let Some(log) = self.debuglog.as_mut() {
            log.poll(now, &mut out);
        }

        #[cfg(feature = "router-advertisement")]
        if self.ra_next.is_some_and(|due| now >= due) {
            if let Err(e) = out.inet.send_router_advertisement(out.tx) {
                warn!("inet6: router advertisement not sent: {}", e);
            }
            self.ra_next = Some(now + RA_INTERVAL);
        }
    }

    /// Drain outstanding transmits, then run `action` on the host.
    pub fn hand_off(&mut self, action: BootAction) -> HandOff {
        self.flush_tx();
        match action {
            BootAction::Boot(images) => {
                info!(
                    "netsvc: booting kernel ({} bytes), ramdisk ({} bytes)",
                    images.kernel.len(),
                    images.ramdisk.len()
                );
                // mexec only returns on failure.
                if let Err(e) = self.host.mexec(images) {
                    error!("netsvc: mexec failed: {}", e);
                }
                HandOff::Failed
            }
            BootAction::Reboot => match self.host.reboot() {
                Ok(()) => HandOff::Rebooting,
                Err(e) => {
                    error!("netsvc: reboot failed: {}", e);
                    HandOff::Failed
                }
            },
        }
    }

    /// Wait (briefly) for the driver to finish sending.
    fn flush_tx(&mut self) {
        let deadline = std::time::Instant::now() + std::time::Duration::from_millis(250);
        while self.eth.tx_in_flight() > 0 {
            if std::time::Instant::now() >= deadline {
                warn!("netsvc: {} frames still in flight at hand-off", self.eth.tx_in_flight());
                return;
            }
            self.eth.reclaim_tx();
            std::thread::yield_now();
        }
    }
}
