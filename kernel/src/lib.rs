//! Demand-paged virtual memory for user processes: lazy loading, swapping,
//! memory-mapped files, and the page fault path that ties them together.

#![cfg_attr(target_os = "none", no_std)]

extern crate alloc;

pub mod block;
pub mod config;
pub mod fs;
pub mod interrupts;
pub mod log_impl;
pub mod mem;
pub mod paging;
pub mod swapping;
pub mod sync;
pub mod system;
pub mod threading;
pub mod user_program;

pub use config::VmConfig;
pub use mem::error::VmError;
pub use system::VmSystem;
