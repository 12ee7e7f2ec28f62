//! Plain file transfers to and from the persistent filesystem.
//!
//! Writes are staged and only become visible at close; an aborted write
//! leaves the previous file contents untouched.

use std::collections::HashMap;
use std::sync::Arc;

use spin::Mutex;

use crate::error::{NetsvcError, Result};

/// Persistent filesystem access for one open file at a time.
pub trait PassthroughFs: Send {
    /// Open `path` for reading; returns its size.
    fn open_read(&mut self, path: &str) -> Result<u64>;
    fn open_write(&mut self, path: &str, size: u64) -> Result<()>;
    fn read(&mut self, buf: &mut [u8], offset: u64) -> Result<usize>;
    fn write(&mut self, data: &[u8], offset: u64) -> Result<()>;
    /// Finish the open file, publishing a pending write.
    fn close(&mut self) -> Result<()>;
    /// Drop the open file, discarding a pending write.
    fn abort(&mut self);
}

/// Filesystem that refuses every path.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPassthrough;

impl PassthroughFs for NoPassthrough {
    fn open_read(&mut self, _path: &str) -> Result<u64> {
        Err(NetsvcError::NotSupported)
    }

    fn open_write(&mut self, _path: &str, _size: u64) -> Result<()> {
        Err(NetsvcError::NotSupported)
    }

    fn read(&mut self, _buf: &mut [u8], _offset: u64) -> Result<usize> {
        Err(NetsvcError::BadState)
    }

    fn write(&mut self, _data: &[u8], _offset: u64) -> Result<()> {
        Err(NetsvcError::BadState)
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn abort(&mut self) {}
}

enum Open {
    Read(Vec<u8>),
    Write { path: String, size: u64, data: Vec<u8> },
}

/// In-memory filesystem. Clones share the same files.
#[derive(Clone, Default)]
pub struct MemoryFs {
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    open: Arc<Mutex<Option<Open>>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &str, data: &[u8]) {
        self.files.lock().insert(path.to_string(), data.to_vec());
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().get(path).cloned()
    }
}

impl PassthroughFs for MemoryFs {
    fn open_read(&mut self, path: &str) -> Result<u64> {
        let data = self.get(path).ok_or(NetsvcError::NotFound)?;
        let size = data.len() as u64;
        *self.open.lock() = Some(Open::Read(data));
        Ok(size)
    }

    fn open_write(&mut self, path: &str, size: u64) -> Result<()> {
        let mut data = Vec::new();
        data.try_reserve_exact(size as usize)
            .map_err(|_| NetsvcError::NoMemory)?;
        *self.open.lock() = Some(Open::Write { path: path.to_string(), size, data });
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let open = self.open.lock();
        let Some(Open::Read(data)) = open.as_ref() else {
            return Err(NetsvcError::BadState);
        };
        let offset = (offset as usize).min(data.len());
        let n = buf.len().min(data.len() - offset);
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        Ok(n)
    }

    fn write(&mut self, chunk: &[u8], offset: u64) -> Result<()> {
        let mut open = self.open.lock();
        let Some(Open::Write { size, data, .. }) = open.as_mut() else {
            return Err(NetsvcError::BadState);
        };
        let end = offset
            .checked_add(chunk.len() as u64)
            .ok_or(NetsvcError::OutOfRange)?;
        if end > *size {
            return Err(NetsvcError::OutOfRange);
        }
        let (offset, end) = (offset as usize, end as usize);
        if data.len() < end {
            data.resize(end, 0);
        }
        data[offset..end].copy_from_slice(chunk);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(Open::Write { path, data, .. }) = self.open.lock().take() {
            self.files.lock().insert(path, data);
        }
        Ok(())
    }

    fn abort(&mut self) {
        self.open.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_visible_after_close() {
        let mut fs = MemoryFs::new();
        fs.open_write("/tmp/a", 3).unwrap();
        fs.write(b"abc", 0).unwrap();
        assert!(fs.get("/tmp/a").is_none());
        fs.close().unwrap();
        assert_eq!(fs.get("/tmp/a").unwrap(), b"abc");
    }

    #[test]
    fn test_abort_discards() {
        let mut fs = MemoryFs::new();
        fs.insert("/tmp/a", b"old");
        fs.open_write("/tmp/a", 3).unwrap();
        fs.write(b"new", 0).unwrap();
        fs.abort();
        fs.close().unwrap();
        assert_eq!(fs.get("/tmp/a").unwrap(), b"old");
    }

    #[test]
    fn test_read() {
        let mut fs = MemoryFs::new();
        fs.insert("f", b"hello");
        assert_eq!(fs.open_read("f"), Ok(5));
        let mut buf = [0u8; 3];
        assert_eq!(fs.read(&mut buf, 3), Ok(2));
        assert_eq!(&buf[..2], b"lo");
        assert_eq!(fs.open_read("missing"), Err(NetsvcError::NotFound));
    }
}
