//! File router: one open file at a time, dispatched by name.
//!
//! # Priority
//!
//! 1. board identity files (`board_info`, `board_name`)
//! 2. `<<image>>` provisioning targets
//! 3. `<<netboot>>` volatile images, `<<netsvc>>` virtual files
//! 4. persistent filesystem passthrough
//!
//! A second open while a route is active is refused with `Busy`, whatever
//! the backend. Any open while a paver worker is still running is refused
//! with `ShouldWait`.

use std::time::Duration;

use log::{debug, error, info, warn};

use super::board::{read_board_info, BoardNameCheck, SysInfo, BOARD_INFO_LEN};
use super::names::{classify, FileRoute, NetbootFile};
use super::netboot_buf::{BootImages, NetbootFiles};
use super::passthrough::PassthroughFs;
use super::FileBackend;
use crate::error::{NetsvcError, Result};
use crate::paver::Paver;

enum Active {
    Volatile { file: NetbootFile, writing: bool },
    BoardInfo([u8; BOARD_INFO_LEN]),
    BoardName(BoardNameCheck),
    NodeName(Vec<u8>),
    Paver,
    Passthrough,
}

fn read_slice(src: &[u8], buf: &mut [u8], offset: u64) -> usize {
    let Ok(offset) = usize::try_from(offset) else {
        return 0;
    };
    if offset >= src.len() {
        return 0;
    }
    let n = buf.len().min(src.len() - offset);
    buf[..n].copy_from_slice(&src[offset..offset + n]);
    n
}

pub struct FileRouter {
    active: Option<Active>,
    paver: Paver,
    netboot: NetbootFiles,
    sysinfo: Box<dyn SysInfo>,
    fs: Box<dyn PassthroughFs>,
    nodename: String,
}

impl FileRouter {
    pub fn new(paver: Paver, sysinfo: Box<dyn SysInfo>, fs: Box<dyn PassthroughFs>, nodename: &str) -> Self {
        Self {
            active: None,
            paver,
            netboot: NetbootFiles::new(),
            sysinfo,
            fs,
            nodename: nodename.to_string(),
        }
    }

    pub fn paver(&self) -> &Paver {
        &self.paver
    }

    pub fn paver_mut(&mut self) -> &mut Paver {
        &mut self.paver
    }

    pub fn netboot_files(&self) -> &NetbootFiles {
        &self.netboot
    }

    pub fn netboot_files_mut(&mut self) -> &mut NetbootFiles {
        &mut self.netboot
    }

    pub fn nodename(&self) -> &str {
        &self.nodename
    }

    /// Whether a route is currently open.
    pub fn is_open(&self) -> bool {
        self.active.is_some()
    }

    /// Move the received boot images out for mexec.
    pub fn take_boot_images(&mut self) -> BootImages {
        self.netboot.take_boot_images()
    }

    /// Common open preconditions.
    fn check_open(&mut self, name: &str) -> Result<FileRoute> {
        if self.active.is_some() {
            warn!("file: refusing '{}', a transfer is already active", name);
            return Err(NetsvcError::Busy);
        }
        let route = classify(name).map_err(|e| {
            debug!("file: no route for '{}': {}", name, e);
            e
        })?;
        if self.paver.in_progress() {
            debug!("file: paver busy, '{}' must wait", name);
            return Err(NetsvcError::ShouldWait);
        }
        let code = self.paver.exit_code();
        if !code.is_ok() {
            error!("file: previous paver job failed ({:?}), refusing '{}'", code, name);
            self.paver.reset_exit_code();
            return Err(NetsvcError::Io);
        }
        Ok(route)
    }
}

impl FileBackend for FileRouter {
    fn open_read(&mut self, name: &str) -> Result<u64> {
        let route = self.check_open(name)?;
        let (active, size) = match route {
            FileRoute::Volatile(file) => (Active::Volatile { file, writing: false }, self.netboot.size(file)),
            FileRoute::BoardInfo => {
                let record = read_board_info(self.sysinfo.as_ref())?;
                (Active::BoardInfo(record), BOARD_INFO_LEN as u64)
            }
            FileRoute::NodeName => {
                let bytes = self.nodename.as_bytes().to_vec();
                let size = bytes.len() as u64;
                (Active::NodeName(bytes), size)
            }
            FileRoute::Passthrough(path) => (Active::Passthrough, self.fs.open_read(&path)?),
            FileRoute::BoardName | FileRoute::Paver(_) => return Err(NetsvcError::NotSupported),
        };
        info!("file: reading '{}' ({} bytes)", name, size);
        self.active = Some(active);
        Ok(size)
    }

    fn open_write(&mut self, name: &str, size: u64, timeout: Duration) -> Result<()> {
        let route = self.check_open(name)?;
        let active = match route {
            FileRoute::Volatile(file) => {
                self.netboot.open_write(file, size)?;
                Active::Volatile { file, writing: true }
            }
            FileRoute::BoardName => Active::BoardName(BoardNameCheck::new(size)?),
            FileRoute::Paver(command) => {
                self.paver.open_write(command, size, timeout)?;
                Active::Paver
            }
            FileRoute::Passthrough(path) => {
                self.fs.open_write(&path, size)?;
                Active::Passthrough
            }
            FileRoute::BoardInfo | FileRoute::NodeName => return Err(NetsvcError::NotSupported),
        };
        info!("file: writing '{}' ({} bytes)", name, size);
        self.active = Some(active);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        match self.active.as_ref() {
            Some(Active::Volatile { file, .. }) => Ok(self.netboot.read(*file, buf, offset)),
            Some(Active::BoardInfo(record)) => Ok(read_slice(record, buf, offset)),
            Some(Active::NodeName(bytes)) => Ok(read_slice(bytes, buf, offset)),
            Some(Active::Passthrough) => self.fs.read(buf, offset),
            _ => Err(NetsvcError::BadState),
        }
    }

    fn write(&mut self, data: &[u8], offset: u64) -> Result<()> {
        match self.active.as_mut() {
            Some(Active::Volatile { file, writing: true }) => self.netboot.write(*file, data, offset),
            Some(Active::BoardName(check)) => check.write(data, offset, self.sysinfo.as_ref()),
            Some(Active::Paver) => self.paver.write(data, offset),
            Some(Active::Passthrough) => self.fs.write(data, offset),
            _ => Err(NetsvcError::BadState),
        }
    }

    fn close(&mut self) {
        match self.active.take() {
            Some(Active::Paver) => self.paver.close(),
            Some(Active::Passthrough) => {
                if let Err(e) = self.fs.close() {
                    error!("file: close failed: {}", e);
                }
            }
            Some(_) => {}
            None => return,
        }
        debug!("file: closed");
    }

    fn abort(&mut self) {
        match self.active.take() {
            Some(Active::Paver) => {
                warn!("file: aborting paver transfer");
                self.paver.abort();
            }
            Some(Active::Passthrough) => self.fs.abort(),
            Some(_) | None => {}
        }
    }
}
