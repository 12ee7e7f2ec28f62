//! Service configuration.
//!
//! Built from kernel-style boot options (`netsvc.<key>[=<value>]`). Unknown
//! keys outside the `netsvc.` namespace are ignored so the whole command line
//! can be passed through.

use std::time::Duration;

use thiserror::Error;

use crate::netboot::Role;
use crate::paver::DEFAULT_TIMEOUT_MULTIPLIER;
use crate::types::MacAddress;

const OPTION_PREFIX: &str = "netsvc.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for netsvc.{key}")]
    InvalidValue { key: String, value: String },
    #[error("unknown option netsvc.{0}")]
    UnknownOption(String),
    #[error("no ethernet interface available")]
    NoInterface,
    #[error("interface '{0}' not found")]
    InterfaceNotFound(String),
}

/// Full service configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetsvcConfig {
    /// Topological path of the interface to use; first one found if unset.
    pub interface: Option<String>,
    /// Whole subsystem off.
    pub disabled: bool,
    pub role: Role,
    /// Periodic ADVERTISE multicast.
    pub advertise: bool,
    /// One log line per frame in each direction.
    pub log_packets: bool,
    /// Overrides the MAC-derived node name.
    pub nodename: Option<String>,
    /// Default TFTP/netboot transfer timeout.
    pub tftp_timeout: Duration,
    /// Paver worker deadline as a multiple of the transfer timeout.
    pub paver_timeout_multiplier: u32,
    /// Advertise the ULA prefix (needs the `router-advertisement` feature).
    pub router_advertisement: bool,
}

impl Default for NetsvcConfig {
    fn default() -> Self {
        Self {
            interface: None,
            disabled: false,
            role: Role::Full,
            advertise: true,
            log_packets: false,
            nodename: None,
            tftp_timeout: Duration::from_secs(1),
            paver_timeout_multiplier: DEFAULT_TIMEOUT_MULTIPLIER,
            router_advertisement: cfg!(feature = "router-advertisement"),
        }
    }
}

fn parse_bool(key: &str, value: Option<&str>) -> Result<bool, ConfigError> {
    match value {
        None | Some("1") | Some("true") | Some("on") => Ok(true),
        Some("0") | Some("false") | Some("off") => Ok(false),
        Some(other) => Err(ConfigError::InvalidValue { key: key.into(), value: other.into() }),
    }
}

impl NetsvcConfig {
    /// Name queries only, no advertisement.
    pub fn minimal() -> Self {
        Self {
            role: Role::Minimal,
            advertise: false,
            ..Self::default()
        }
    }

    /// Apply `netsvc.*` boot options on top of the defaults.
    ///
    /// # Arguments
    /// * `options` - whitespace-separated `key[=value]` tokens
    pub fn from_boot_options<'a, I>(options: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut config = Self::default();
        for token in options {
            let Some(option) = token.strip_prefix(OPTION_PREFIX) else {
                continue;
            };
            let (key, value) = match option.split_once('=') {
                Some((k, v)) => (k, Some(v)),
                None => (option, None),
            };
            match key {
                "disable" => config.disabled = parse_bool(key, value)?,
                "netboot" => {
                    config.role = if parse_bool(key, value)? { Role::Full } else { Role::Minimal };
                }
                "advertise" => config.advertise = parse_bool(key, value)?,
                "log-packets" => config.log_packets = parse_bool(key, value)?,
                "interface" | "nodename" => {
                    let value = value
                        .filter(|v| !v.is_empty())
                        .ok_or_else(|| ConfigError::InvalidValue { key: key.into(), value: String::new() })?
                        .to_string();
                    if key == "interface" {
                        config.interface = Some(value);
                    } else {
                        config.nodename = Some(value);
                    }
                }
                "router-advertisement" => config.router_advertisement = parse_bool(key, value)?,
                other => return Err(ConfigError::UnknownOption(other.into())),
            }
        }
        Ok(config)
    }

    /// Advertisement only makes sense for the loader role.
    pub fn advertise_enabled(&self) -> bool {
        self.advertise && self.role == Role::Full
    }

    pub fn nodename_for(&self, mac: MacAddress) -> String {
        self.nodename.clone().unwrap_or_else(|| default_nodename(mac))
    }
}

/// `node-5254-0012-3456` for MAC 52:54:00:12:34:56.
pub fn default_nodename(mac: MacAddress) -> String {
    let m = mac.as_bytes();
    format!(
        "node-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}",
        m[0], m[1], m[2], m[3], m[4], m[5]
    )
}

/// Index of the interface to drive among `candidates` (topological paths).
pub fn select_interface(candidates: &[&str], wanted: Option<&str>) -> Result<usize, ConfigError> {
    if candidates.is_empty() {
        return Err(ConfigError::NoInterface);
    }
    match wanted {
        None => Ok(0),
        Some(path) => candidates
            .iter()
            .position(|c| *c == path)
            .ok_or_else(|| ConfigError::InterfaceNotFound(path.into())),
    }
}
