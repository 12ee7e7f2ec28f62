//! Provisioning commands selected by the file router.

use core::fmt;

/// A/B/R boot slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    A,
    B,
    /// Recovery.
    R,
}

impl Slot {
    /// Parse the single-letter slot suffix used in image names.
    pub fn from_letter(c: char) -> Option<Self> {
        match c {
            'a' | 'A' => Some(Self::A),
            'b' | 'B' => Some(Self::B),
            'r' | 'R' => Some(Self::R),
            _ => None,
        }
    }

    pub fn letter(self) -> char {
        match self {
            Self::A => 'A',
            Self::B => 'B',
            Self::R => 'R',
        }
    }
}

/// Per-slot boot asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Asset {
    Kernel,
    VerifiedBootMetadata,
}

/// How the worker consumes staged data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Hand data to the service as it arrives and free consumed pages.
    Streaming,
    /// Wait for the whole payload, then make one provisioning call.
    Monitoring,
}

/// One provisioning operation, carrying only the fields it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaverCommand {
    Asset { slot: Slot, asset: Asset },
    Firmware { slot: Option<Slot>, kind: String },
    DataFile { path: String },
    Fvm,
    InitPartitionTables,
    WipePartitionTables,
}

impl PaverCommand {
    pub fn strategy(&self) -> Strategy {
        match self {
            Self::Fvm => Strategy::Streaming,
            _ => Strategy::Monitoring,
        }
    }
}

impl fmt::Display for PaverCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asset { slot, asset: Asset::Kernel } => write!(f, "kernel-{}", slot.letter()),
            Self::Asset { slot, asset: Asset::VerifiedBootMetadata } => {
                write!(f, "vbmeta-{}", slot.letter())
            }
            Self::Firmware { slot: Some(slot), kind } => write!(f, "firmware[{}]-{}", kind, slot.letter()),
            Self::Firmware { slot: None, kind } => write!(f, "firmware[{}]", kind),
            Self::DataFile { path } => write!(f, "data-file {}", path),
            Self::Fvm => f.write_str("fvm"),
            Self::InitPartitionTables => f.write_str("init-partition-tables"),
            Self::WipePartitionTables => f.write_str("wipe-partition-tables"),
        }
    }
}
