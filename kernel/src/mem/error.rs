use crate::{block::BlockError, fs};
use core::fmt::{Display, Formatter};
use pageros_syscalls::defs::{EBADF, EEXIST, EFAULT, EINVAL, EIO, ENOMEM, ENOSPC, ESRCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    /// The page already has a descriptor
    AlreadyMapped,
    /// No descriptor covers the address
    NotMapped,
    /// The access broke the page's protection
    ProtectionViolation,
    /// No frame is free and none can be evicted
    OutOfMemory,
    /// Every swap slot is taken
    SwapExhausted,
    NoSuchProcess,
    NoSuchMapping,
    BadFileDescriptor,
    /// Null, unaligned, or outside the user mappable range
    InvalidAddress,
    /// Zero-length files cannot be mapped
    EmptyFile,
    File(fs::Error),
    Block(BlockError),
}

impl VmError {
    /// Positive error number reported to user programs.
    pub fn errno(&self) -> isize {
        match self {
            Self::AlreadyMapped => EEXIST,
            Self::NotMapped | Self::ProtectionViolation => EFAULT,
            Self::OutOfMemory => ENOMEM,
            Self::SwapExhausted => ENOSPC,
            Self::NoSuchProcess => ESRCH,
            Self::NoSuchMapping | Self::InvalidAddress | Self::EmptyFile => EINVAL,
            Self::BadFileDescriptor => EBADF,
            Self::File(fs::Error::NoSpace) => ENOSPC,
            Self::File(fs::Error::Io) | Self::Block(_) => EIO,
        }
    }
}

impl Display for VmError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::AlreadyMapped => write!(f, "page already mapped"),
            Self::NotMapped => write!(f, "address not mapped"),
            Self::ProtectionViolation => write!(f, "protection violation"),
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::SwapExhausted => write!(f, "swap space exhausted"),
            Self::NoSuchProcess => write!(f, "no such process"),
            Self::NoSuchMapping => write!(f, "no such mapping"),
            Self::BadFileDescriptor => write!(f, "bad file descriptor"),
            Self::InvalidAddress => write!(f, "invalid address"),
            Self::EmptyFile => write!(f, "cannot map an empty file"),
            Self::File(err) => write!(f, "file error: {err}"),
            Self::Block(err) => write!(f, "block device error: {err}"),
        }
    }
}

impl core::error::Error for VmError {}

impl From<fs::Error> for VmError {
    fn from(err: fs::Error) -> Self {
        Self::File(err)
    }
}

impl From<BlockError> for VmError {
    fn from(err: BlockError) -> Self {
        Self::Block(err)
    }
}
