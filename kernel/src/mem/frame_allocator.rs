pub mod placement_algorithms;

use crate::{
    config::PlacementKind,
    sync::{Mutex, MutexGuard},
};
use alloc::{boxed::Box, vec, vec::Vec};
use bitbybit::bitfield;
use core::fmt;
use pageros_shared::mem::PAGE_FRAME_SIZE;
use placement_algorithms::{FirstFit, NextFit, PlacementAlgorithm};

/// Index of a physical frame in the user pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameNumber(u32);

impl FrameNumber {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FrameNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame {}", self.0)
    }
}

#[bitfield(u8, default = 0)]
pub struct CoreMapEntry {
    #[bit(0, rw)]
    allocated: bool,
}

struct CoreMap {
    entries: Box<[CoreMapEntry]>,
    placement: Box<dyn PlacementAlgorithm>,
    allocated: usize,
}

/// The frames available to user pages. Contents of each frame sit behind
/// their own lock so that a page can be filled or written back without
/// holding up allocation.
pub struct UserPool {
    core_map: Mutex<CoreMap>,
    frames: Box<[Mutex<Box<[u8]>>]>,
}

impl UserPool {
    pub fn new(frame_count: usize, placement: PlacementKind) -> Self {
        assert!(
            u32::try_from(frame_count).is_ok(),
            "user pool of {frame_count} frames is too large"
        );
        let placement: Box<dyn PlacementAlgorithm> = match placement {
            PlacementKind::NextFit => Box::<NextFit>::default(),
            PlacementKind::FirstFit => Box::new(FirstFit),
        };
        let frames: Vec<_> = (0..frame_count)
            .map(|_| Mutex::new(vec![0u8; PAGE_FRAME_SIZE].into_boxed_slice()))
            .collect();
        Self {
            core_map: Mutex::new(CoreMap {
                entries: vec![CoreMapEntry::DEFAULT; frame_count].into_boxed_slice(),
                placement,
                allocated: 0,
            }),
            frames: frames.into_boxed_slice(),
        }
    }

    /// Takes a free frame, or returns `None` if every frame is in use. The
    /// frame's previous contents are left in place.
    // The pool size was checked against u32 on construction.
    #[allow(clippy::cast_possible_truncation)]
    pub fn alloc(&self) -> Option<FrameNumber> {
        let mut core_map = self.core_map.lock();
        let CoreMap {
            entries,
            placement,
            allocated,
        } = &mut *core_map;
        let index = placement.place(&entries[..])?;
        assert!(!entries[index].allocated(), "placement chose a used frame");
        entries[index] = entries[index].with_allocated(true);
        *allocated += 1;
        Some(FrameNumber::new(index as u32))
    }

    pub fn dealloc(&self, frame: FrameNumber) {
        let mut core_map = self.core_map.lock();
        let entry = &mut core_map.entries[frame.index()];
        assert!(entry.allocated(), "double free of {frame}");
        *entry = entry.with_allocated(false);
        core_map.allocated -= 1;
    }

    /// Locks and returns the contents of `frame`.
    pub fn frame(&self, frame: FrameNumber) -> MutexGuard<'_, Box<[u8]>> {
        self.frames[frame.index()].lock()
    }

    pub fn is_allocated(&self, frame: FrameNumber) -> bool {
        self.core_map.lock().entries[frame.index()].allocated()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn allocated(&self) -> usize {
        self.core_map.lock().allocated
    }

    pub fn free_frames(&self) -> usize {
        self.frame_count() - self.allocated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_until_empty() {
        let pool = UserPool::new(3, PlacementKind::FirstFit);
        let frames: Vec<_> = (0..3).map(|_| pool.alloc().expect("frame available")).collect();
        assert_eq!(frames, [0, 1, 2].map(FrameNumber::new));
        assert_eq!(pool.alloc(), None);
        assert_eq!(pool.free_frames(), 0);

        pool.dealloc(FrameNumber::new(1));
        assert!(!pool.is_allocated(FrameNumber::new(1)));
        assert_eq!(pool.alloc(), Some(FrameNumber::new(1)));
    }

    #[test]
    fn next_fit_moves_on() {
        let pool = UserPool::new(4, PlacementKind::NextFit);
        let first = pool.alloc().expect("frame available");
        pool.dealloc(first);
        assert_eq!(pool.alloc(), Some(FrameNumber::new(1)));
    }

    #[test]
    fn frame_contents_persist() {
        let pool = UserPool::new(2, PlacementKind::FirstFit);
        let frame = pool.alloc().expect("frame available");
        pool.frame(frame)[10] = 0x5a;
        assert_eq!(pool.frame(frame)[10], 0x5a);
        assert_eq!(pool.frame(frame).len(), PAGE_FRAME_SIZE);
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn double_free() {
        let pool = UserPool::new(2, PlacementKind::FirstFit);
        let frame = pool.alloc().expect("frame available");
        pool.dealloc(frame);
        pool.dealloc(frame);
    }
}
