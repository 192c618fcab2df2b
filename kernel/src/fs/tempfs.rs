use crate::{
    fs::{Error, File, FileRef, Result},
    sync::Mutex,
};
use alloc::{sync::Arc, vec::Vec};
use core::{
    cmp::min,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

#[derive(Default)]
struct TempINode {
    data: Mutex<Vec<u8>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

/// A RAM-backed file. Handles returned by [`File::reopen`] share contents with
/// the handle they were opened from.
#[derive(Clone, Default)]
pub struct TempFile {
    inode: Arc<TempINode>,
}

impl TempFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(data: &[u8]) -> Arc<Self> {
        let file = Self::new();
        file.inode.data.lock().extend_from_slice(data);
        Arc::new(file)
    }

    /// A copy of the current contents.
    pub fn contents(&self) -> Vec<u8> {
        self.inode.data.lock().clone()
    }

    /// Makes every subsequent write fail with [`Error::Io`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.inode.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Number of successful `write_at` calls through any handle.
    pub fn write_count(&self) -> usize {
        self.inode.writes.load(Ordering::Relaxed)
    }
}

impl File for TempFile {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let data = self.inode.data.lock();
        if offset >= data.len() as u64 {
            // can't read any data
            return Ok(0);
        }
        let offset = offset as usize; // fits into usize by check above
        let read_len = min(buf.len(), data.len() - offset);
        buf[..read_len].copy_from_slice(&data[offset..offset + read_len]);
        Ok(read_len)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize> {
        if self.inode.fail_writes.load(Ordering::Relaxed) {
            return Err(Error::Io);
        }
        if offset > (isize::MAX as u64).saturating_sub(buf.len() as u64) {
            return Err(Error::NoSpace);
        }
        let offset = offset as usize;
        let mut data = self.inode.data.lock();
        let end = offset + buf.len();
        if end > data.len() {
            let extra = end - data.len();
            data.try_reserve(extra).map_err(|_| Error::NoSpace)?;
            data.resize(end, 0);
        }
        data[offset..end].copy_from_slice(buf);
        self.inode.writes.fetch_add(1, Ordering::Relaxed);
        Ok(buf.len())
    }

    fn length(&self) -> u64 {
        self.inode.data.lock().len() as u64
    }

    fn reopen(&self) -> Result<FileRef> {
        Ok(Arc::new(self.clone()))
    }
}
