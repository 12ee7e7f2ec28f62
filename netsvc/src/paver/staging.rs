//! Staging memory between the network side and the paver worker.
//!
//! Monitoring jobs stage into one contiguous allocation, since the whole
//! payload goes to the provisioning service in a single call. Streaming jobs
//! stage into lazily committed pages so the worker can give consumed pages
//! back while the transfer is still running.

use crate::error::{NetsvcError, Result};

/// Granularity of page release.
pub const PAGE_SIZE: usize = 4096;

fn try_alloc_zeroed(len: usize) -> Result<Vec<u8>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).map_err(|_| NetsvcError::NoMemory)?;
    v.resize(len, 0);
    Ok(v)
}

pub enum StagingBuffer {
    Contiguous(Vec<u8>),
    Paged {
        pages: Vec<Option<Box<[u8]>>>,
        len: u64,
        /// Pages below this index have been released.
        released: usize,
    },
}

impl StagingBuffer {
    /// Single allocation of `size` bytes.
    pub fn contiguous(size: u64) -> Result<Self> {
        let size = usize::try_from(size).map_err(|_| NetsvcError::NoMemory)?;
        Ok(Self::Contiguous(try_alloc_zeroed(size)?))
    }

    /// Page table for `size` bytes; pages are allocated on first write.
    pub fn paged(size: u64) -> Result<Self> {
        let count = usize::try_from(size.div_ceil(PAGE_SIZE as u64)).map_err(|_| NetsvcError::NoMemory)?;
        let mut pages = Vec::new();
        pages.try_reserve_exact(count).map_err(|_| NetsvcError::NoMemory)?;
        pages.resize_with(count, || None);
        Ok(Self::Paged { pages, len: size, released: 0 })
    }

    pub fn len(&self) -> u64 {
        match self {
            Self::Contiguous(v) => v.len() as u64,
            Self::Paged { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy `data` in at `offset`.
    pub fn write(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let end = offset
            .checked_add(data.len() as u64)
            .ok_or(NetsvcError::OutOfRange)?;
        if end > self.len() {
            return Err(NetsvcError::OutOfRange);
        }
        match self {
            Self::Contiguous(v) => {
                v[offset as usize..end as usize].copy_from_slice(data);
            }
            Self::Paged { pages, .. } => {
                let mut pos = offset as usize;
                let mut rest = data;
                while !rest.is_empty() {
                    let (index, within) = (pos / PAGE_SIZE, pos % PAGE_SIZE);
                    let n = rest.len().min(PAGE_SIZE - within);
                    let page = match &mut pages[index] {
                        Some(page) => page,
                        slot => slot.insert(try_alloc_zeroed(PAGE_SIZE)?.into_boxed_slice()),
                    };
                    page[within..within + n].copy_from_slice(&rest[..n]);
                    rest = &rest[n..];
                    pos += n;
                }
            }
        }
        Ok(())
    }

    /// Copy out up to `buf.len()` bytes starting at `offset`.
    ///
    /// Released or never-written pages read as zeros.
    pub fn read(&self, offset: u64, buf: &mut [u8]) -> usize {
        if offset >= self.len() {
            return 0;
        }
        let n = buf.len().min((self.len() - offset) as usize);
        match self {
            Self::Contiguous(v) => {
                buf[..n].copy_from_slice(&v[offset as usize..offset as usize + n]);
            }
            Self::Paged { pages, .. } => {
                let mut pos = offset as usize;
                let mut done = 0;
                while done < n {
                    let (index, within) = (pos / PAGE_SIZE, pos % PAGE_SIZE);
                    let chunk = (n - done).min(PAGE_SIZE - within);
                    match &pages[index] {
                        Some(page) => buf[done..done + chunk].copy_from_slice(&page[within..within + chunk]),
                        None => buf[done..done + chunk].fill(0),
                    }
                    done += chunk;
                    pos += chunk;
                }
            }
        }
        n
    }

    /// Free every page lying entirely below `offset`. Returns pages freed.
    ///
    /// No-op for contiguous buffers.
    pub fn release_before(&mut self, offset: u64) -> usize {
        let Self::Paged { pages, released, .. } = self else {
            return 0;
        };
        let limit = ((offset / PAGE_SIZE as u64) as usize).min(pages.len());
        let mut freed = 0;
        for page in &mut pages[*released..limit.max(*released)] {
            if page.take().is_some() {
                freed += 1;
            }
        }
        *released = (*released).max(limit);
        freed
    }

    /// Pages currently holding memory.
    pub fn resident_pages(&self) -> usize {
        match self {
            Self::Contiguous(v) => v.len().div_ceil(PAGE_SIZE),
            Self::Paged { pages, .. } => pages.iter().filter(|p| p.is_some()).count(),
        }
    }

    /// Move the contents out, leaving an empty buffer behind.
    pub fn take_contiguous(&mut self) -> Option<Vec<u8>> {
        match self {
            Self::Contiguous(v) => Some(core::mem::take(v)),
            Self::Paged { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contiguous_bounds() {
        let mut buf = StagingBuffer::contiguous(10).unwrap();
        buf.write(0, &[1, 2, 3]).unwrap();
        buf.write(7, &[8, 9, 10]).unwrap();
        assert_eq!(buf.write(8, &[0, 0, 0]), Err(NetsvcError::OutOfRange));
        assert_eq!(buf.write(u64::MAX, &[1]), Err(NetsvcError::OutOfRange));
        assert_eq!(buf.take_contiguous().unwrap(), vec![1, 2, 3, 0, 0, 0, 0, 8, 9, 10]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_huge_contiguous_fails_cleanly() {
        assert!(matches!(
            StagingBuffer::contiguous(u64::MAX / 2),
            Err(NetsvcError::NoMemory)
        ));
    }

    #[test]
    fn test_paged_write_across_boundary() {
        let mut buf = StagingBuffer::paged(3 * PAGE_SIZE as u64).unwrap();
        assert_eq!(buf.resident_pages(), 0);
        let data: Vec<u8> = (0..100u8).collect();
        buf.write(PAGE_SIZE as u64 - 50, &data).unwrap();
        assert_eq!(buf.resident_pages(), 2);

        let mut out = vec![0u8; 100];
        assert_eq!(buf.read(PAGE_SIZE as u64 - 50, &mut out), 100);
        assert_eq!(out, data);
    }

    #[test]
    fn test_release_frees_only_whole_pages() {
        let mut buf = StagingBuffer::paged(3 * PAGE_SIZE as u64).unwrap();
        buf.write(0, &vec![7u8; 3 * PAGE_SIZE]).unwrap();
        assert_eq!(buf.release_before(PAGE_SIZE as u64 + 10), 1);
        assert_eq!(buf.resident_pages(), 2);
        assert_eq!(buf.release_before(PAGE_SIZE as u64), 0);
        assert_eq!(buf.release_before(3 * PAGE_SIZE as u64), 2);
        assert_eq!(buf.resident_pages(), 0);
    }

    #[test]
    fn test_read_past_end() {
        let buf = StagingBuffer::paged(10).unwrap();
        let mut out = [0xFFu8; 16];
        assert_eq!(buf.read(4, &mut out), 6);
        assert_eq!(&out[..6], &[0; 6]);
        assert_eq!(buf.read(10, &mut out), 0);
    }
}
