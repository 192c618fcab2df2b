pub mod error;
pub mod fault;
pub mod frame_allocator;
pub mod frame_table;
pub mod mmap;
pub mod page;
pub mod user;
