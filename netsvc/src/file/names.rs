//! File-name conventions.
//!
//! Names carry a routing prefix: `<<netboot>>` for volatile boot images,
//! `<<image>>` for provisioning targets and `<<netsvc>>` for service
//! virtual files. Anything without a known prefix is a plain path on the
//! persistent filesystem.

use crate::error::{NetsvcError, Result};
use crate::paver::{Asset, PaverCommand, Slot};

pub const NETBOOT_PREFIX: &str = "<<netboot>>";
pub const IMAGE_PREFIX: &str = "<<image>>";
pub const NETSVC_PREFIX: &str = "<<netsvc>>";

pub const NB_KERNEL_FILENAME: &str = "<<netboot>>kernel.bin";
pub const NB_RAMDISK_FILENAME: &str = "<<netboot>>ramdisk.bin";
pub const NB_CMDLINE_FILENAME: &str = "<<netboot>>cmdline";

pub const NB_BOARD_INFO_FILENAME: &str = "<<image>>board_info";
pub const NB_BOARD_NAME_FILENAME: &str = "<<image>>board_name";
pub const NB_NODENAME_FILENAME: &str = "<<netsvc>>nodename";

const FVM_SUFFIX: &str = "sparse.fvm";
const FIRMWARE_PREFIX: &str = "firmware_";
const AUTHORIZED_KEYS_SUFFIX: &str = "authorized_keys";
const INIT_PARTITION_TABLES_SUFFIX: &str = "init_partition_tables";
const WIPE_PARTITION_TABLES_SUFFIX: &str = "wipe_partition_tables";

/// Longest firmware type accepted in `firmware_<type>`.
pub const FIRMWARE_TYPE_MAX_LEN: usize = 32;

/// Where authorized SSH keys land in the data partition.
pub const AUTHORIZED_KEYS_PATH: &str = "ssh/authorized_keys";

/// In-memory boot image slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetbootFile {
    Kernel,
    Ramdisk,
    Cmdline,
}

impl NetbootFile {
    /// Match a `<<netboot>>` name, with or without the prefix.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.strip_prefix(NETBOOT_PREFIX).unwrap_or(name) {
            "kernel.bin" => Some(Self::Kernel),
            "ramdisk.bin" => Some(Self::Ramdisk),
            "cmdline" => Some(Self::Cmdline),
            _ => None,
        }
    }
}

/// Destination chosen for one open/close cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileRoute {
    Volatile(NetbootFile),
    /// Read-only board name + revision record.
    BoardInfo,
    /// Write-only board name check.
    BoardName,
    /// Read-only node name.
    NodeName,
    Paver(PaverCommand),
    Passthrough(String),
}

/// Pick the route for `name`.
///
/// # Returns
/// `NotFound` for an unknown `<<netboot>>`/`<<netsvc>>` name and
/// `InvalidArgs` for an unrecognized `<<image>>` suffix.
pub fn classify(name: &str) -> Result<FileRoute> {
    match name {
        NB_BOARD_INFO_FILENAME => return Ok(FileRoute::BoardInfo),
        NB_BOARD_NAME_FILENAME => return Ok(FileRoute::BoardName),
        NB_NODENAME_FILENAME => return Ok(FileRoute::NodeName),
        _ => {}
    }
    if let Some(suffix) = name.strip_prefix(IMAGE_PREFIX) {
        return image_command(suffix).map(FileRoute::Paver);
    }
    if name.starts_with(NETBOOT_PREFIX) {
        return NetbootFile::from_name(name)
            .map(FileRoute::Volatile)
            .ok_or(NetsvcError::NotFound);
    }
    if name.starts_with(NETSVC_PREFIX) {
        return Err(NetsvcError::NotFound);
    }
    if name.is_empty() {
        return Err(NetsvcError::InvalidArgs);
    }
    Ok(FileRoute::Passthrough(name.to_string()))
}

fn slot_asset(slot: Slot, asset: Asset) -> Result<PaverCommand> {
    Ok(PaverCommand::Asset { slot, asset })
}

fn image_command(suffix: &str) -> Result<PaverCommand> {
    match suffix {
        FVM_SUFFIX => Ok(PaverCommand::Fvm),
        "zircona.img" => slot_asset(Slot::A, Asset::Kernel),
        "zirconb.img" => slot_asset(Slot::B, Asset::Kernel),
        "zirconr.img" => slot_asset(Slot::R, Asset::Kernel),
        "vbmetaa.img" => slot_asset(Slot::A, Asset::VerifiedBootMetadata),
        "vbmetab.img" => slot_asset(Slot::B, Asset::VerifiedBootMetadata),
        "vbmetar.img" => slot_asset(Slot::R, Asset::VerifiedBootMetadata),
        AUTHORIZED_KEYS_SUFFIX => Ok(PaverCommand::DataFile { path: AUTHORIZED_KEYS_PATH.to_string() }),
        INIT_PARTITION_TABLES_SUFFIX => Ok(PaverCommand::InitPartitionTables),
        WIPE_PARTITION_TABLES_SUFFIX => Ok(PaverCommand::WipePartitionTables),
        _ => match suffix.strip_prefix(FIRMWARE_PREFIX) {
            Some(rest) => firmware_command(rest),
            None => Err(NetsvcError::InvalidArgs),
        },
    }
}

/// `<type>[-A|-B|-R]`
fn firmware_command(rest: &str) -> Result<PaverCommand> {
    let (kind, slot) = match rest.rsplit_once('-') {
        Some((kind, "A")) => (kind, Some(Slot::A)),
        Some((kind, "B")) => (kind, Some(Slot::B)),
        Some((kind, "R")) => (kind, Some(Slot::R)),
        _ => (rest, None),
    };
    if kind.len() > FIRMWARE_TYPE_MAX_LEN {
        return Err(NetsvcError::InvalidArgs);
    }
    Ok(PaverCommand::Firmware { slot, kind: kind.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paver(name: &str) -> PaverCommand {
        match classify(name) {
            Ok(FileRoute::Paver(cmd)) => cmd,
            other => panic!("{} routed to {:?}", name, other),
        }
    }

    #[test]
    fn test_image_assets() {
        assert_eq!(paver("<<image>>sparse.fvm"), PaverCommand::Fvm);
        assert_eq!(
            paver("<<image>>zirconb.img"),
            PaverCommand::Asset { slot: Slot::B, asset: Asset::Kernel }
        );
        assert_eq!(
            paver("<<image>>vbmetar.img"),
            PaverCommand::Asset { slot: Slot::R, asset: Asset::VerifiedBootMetadata }
        );
        assert_eq!(
            paver("<<image>>authorized_keys"),
            PaverCommand::DataFile { path: "ssh/authorized_keys".into() }
        );
        assert_eq!(paver("<<image>>wipe_partition_tables"), PaverCommand::WipePartitionTables);
    }

    #[test]
    fn test_unknown_image_suffix_rejected() {
        assert_eq!(classify("<<image>>zircond.img"), Err(NetsvcError::InvalidArgs));
        assert_eq!(classify("<<image>>"), Err(NetsvcError::InvalidArgs));
        assert_eq!(classify("<<image>>sparse.fvm.bak"), Err(NetsvcError::InvalidArgs));
    }

    #[test]
    fn test_firmware_names() {
        assert_eq!(paver("<<image>>firmware_"), PaverCommand::Firmware { slot: None, kind: String::new() });
        assert_eq!(
            paver("<<image>>firmware_bl2-B"),
            PaverCommand::Firmware { slot: Some(Slot::B), kind: "bl2".into() }
        );
        assert_eq!(
            paver("<<image>>firmware_u-boot"),
            PaverCommand::Firmware { slot: None, kind: "u-boot".into() }
        );
        let long = format!("<<image>>firmware_{}", "x".repeat(33));
        assert_eq!(classify(&long), Err(NetsvcError::InvalidArgs));
        let max = format!("<<image>>firmware_{}-A", "x".repeat(32));
        assert!(classify(&max).is_ok());
    }

    #[test]
    fn test_board_and_service_files() {
        assert_eq!(classify("<<image>>board_info"), Ok(FileRoute::BoardInfo));
        assert_eq!(classify("<<image>>board_name"), Ok(FileRoute::BoardName));
        assert_eq!(classify("<<netsvc>>nodename"), Ok(FileRoute::NodeName));
        assert_eq!(classify("<<netsvc>>other"), Err(NetsvcError::NotFound));
    }

    #[test]
    fn test_netboot_and_passthrough() {
        assert_eq!(
            classify("<<netboot>>kernel.bin"),
            Ok(FileRoute::Volatile(NetbootFile::Kernel))
        );
        assert_eq!(classify("<<netboot>>bogus"), Err(NetsvcError::NotFound));
        assert_eq!(
            classify("/data/config.json"),
            Ok(FileRoute::Passthrough("/data/config.json".into()))
        );
        assert_eq!(classify(""), Err(NetsvcError::InvalidArgs));
    }
}
