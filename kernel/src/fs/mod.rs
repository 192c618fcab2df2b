pub mod tempfs;

use alloc::{collections::BTreeMap, sync::Arc};
use pageros_syscalls::defs::STDOUT_FILENO;

pub type Fd = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// no space left on device
    NoSpace,
    /// the underlying storage failed
    Io,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NoSpace => write!(f, "no space left on device"),
            Self::Io => write!(f, "input/output error"),
        }
    }
}

impl core::error::Error for Error {}

pub type Result<T> = core::result::Result<T, Error>;

/// An open file. Mapped pages and executable segments are backed by one of
/// these.
pub trait File: Send + Sync {
    /// Reads up to `buf.len()` bytes starting at `offset`. Returns the number
    /// of bytes read, which is short only at end of file.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize>;

    fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize>;

    /// Length in bytes.
    fn length(&self) -> u64;

    /// Opens an independent handle to the same underlying file, which stays
    /// usable after this one is closed.
    fn reopen(&self) -> Result<FileRef>;
}

pub type FileRef = Arc<dyn File>;

/// Per-process table of open files. Descriptors 0 and 1 belong to the console
/// and are never handed out.
pub struct FileDescriptorTable {
    files: BTreeMap<Fd, FileRef>,
    next_fd: Fd,
}

impl Default for FileDescriptorTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FileDescriptorTable {
    pub fn new() -> Self {
        Self {
            files: BTreeMap::new(),
            next_fd: STDOUT_FILENO + 1,
        }
    }

    pub fn open(&mut self, file: FileRef) -> Fd {
        let fd = self.next_fd;
        self.next_fd += 1;
        self.files.insert(fd, file);
        fd
    }

    pub fn get(&self, fd: Fd) -> Option<FileRef> {
        self.files.get(&fd).cloned()
    }

    pub fn close(&mut self, fd: Fd) -> Option<FileRef> {
        self.files.remove(&fd)
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{tempfs::TempFile, FileDescriptorTable};

    #[test]
    fn descriptors_skip_console() {
        let mut fds = FileDescriptorTable::new();
        let a = fds.open(TempFile::with_contents(b"a"));
        let b = fds.open(TempFile::with_contents(b"b"));
        assert_eq!((a, b), (2, 3));
        assert!(fds.get(0).is_none());
        assert!(fds.close(a).is_some());
        assert!(fds.get(a).is_none());
        assert_eq!(fds.len(), 1);
    }
}
