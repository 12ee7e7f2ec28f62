//! Volatile boot images received over the wire.
//!
//! Kernel, ramdisk and command line stay in memory until BOOT hands them
//! to the host's mexec path.

use log::debug;

use super::names::NetbootFile;
use crate::error::{NetsvcError, Result};

/// Largest kernel or ramdisk accepted.
pub const NETBOOT_IMAGE_MAX: u64 = 1 << 30;
/// Largest kernel command line accepted.
pub const NETBOOT_CMDLINE_MAX: u64 = 4096;

/// Everything mexec needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootImages {
    pub kernel: Vec<u8>,
    pub ramdisk: Vec<u8>,
    pub cmdline: String,
}

#[derive(Debug, Default)]
struct Slot {
    data: Vec<u8>,
    /// Size announced at open.
    declared: u64,
}

#[derive(Debug, Default)]
pub struct NetbootFiles {
    kernel: Slot,
    ramdisk: Slot,
    cmdline: Slot,
}

impl NetbootFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_size(file: NetbootFile) -> u64 {
        match file {
            NetbootFile::Cmdline => NETBOOT_CMDLINE_MAX,
            NetbootFile::Kernel | NetbootFile::Ramdisk => NETBOOT_IMAGE_MAX,
        }
    }

    fn slot(&self, file: NetbootFile) -> &Slot {
        match file {
            NetbootFile::Kernel => &self.kernel,
            NetbootFile::Ramdisk => &self.ramdisk,
            NetbootFile::Cmdline => &self.cmdline,
        }
    }

    fn slot_mut(&mut self, file: NetbootFile) -> &mut Slot {
        match file {
            NetbootFile::Kernel => &mut self.kernel,
            NetbootFile::Ramdisk => &mut self.ramdisk,
            NetbootFile::Cmdline => &mut self.cmdline,
        }
    }

    /// Discard `file` and prepare to receive `size` bytes into it.
    pub fn open_write(&mut self, file: NetbootFile, size: u64) -> Result<()> {
        if size > Self::max_size(file) {
            return Err(NetsvcError::NoMemory);
        }
        let slot = self.slot_mut(file);
        slot.data = Vec::new();
        slot.data
            .try_reserve_exact(size as usize)
            .map_err(|_| NetsvcError::NoMemory)?;
        slot.declared = size;
        debug!("netboot: receiving {:?} ({} bytes)", file, size);
        Ok(())
    }

    pub fn write(&mut self, file: NetbootFile, data: &[u8], offset: u64) -> Result<()> {
        let slot = self.slot_mut(file);
        let end = offset
            .checked_add(data.len() as u64)
            .ok_or(NetsvcError::OutOfRange)?;
        if end > slot.declared {
            return Err(NetsvcError::OutOfRange);
        }
        let (offset, end) = (offset as usize, end as usize);
        if slot.data.len() < end {
            slot.data.resize(end, 0);
        }
        slot.data[offset..end].copy_from_slice(data);
        Ok(())
    }

    /// Bytes received so far for `file`.
    pub fn size(&self, file: NetbootFile) -> u64 {
        self.slot(file).data.len() as u64
    }

    pub fn read(&self, file: NetbootFile, buf: &mut [u8], offset: u64) -> usize {
        let data = &self.slot(file).data;
        let Ok(offset) = usize::try_from(offset) else {
            return 0;
        };
        if offset >= data.len() {
            return 0;
        }
        let n = buf.len().min(data.len() - offset);
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        n
    }

    pub fn get(&self, file: NetbootFile) -> &[u8] {
        &self.slot(file).data
    }

    /// Move the received images out for mexec.
    pub fn take_boot_images(&mut self) -> BootImages {
        let cmdline = core::mem::take(&mut self.cmdline.data);
        let cmdline = String::from_utf8_lossy(&cmdline)
            .trim_end_matches('\0')
            .to_string();
        BootImages {
            kernel: core::mem::take(&mut self.kernel.data),
            ramdisk: core::mem::take(&mut self.ramdisk.data),
            cmdline,
        }
    }
}
