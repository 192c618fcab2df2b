//! Policies for choosing which free frame to hand out next.

use super::CoreMapEntry;

pub trait PlacementAlgorithm: Send {
    /// Returns the index of a free frame, or `None` if there is none.
    fn place(&mut self, core_map: &[CoreMapEntry]) -> Option<usize>;
}

/// Resumes the search just past the last frame it handed out.
#[derive(Default)]
pub struct NextFit {
    position: usize,
}

/// Always hands out the lowest free frame.
pub struct FirstFit;

impl PlacementAlgorithm for NextFit {
    fn place(&mut self, core_map: &[CoreMapEntry]) -> Option<usize> {
        let total_frames = core_map.len();
        let index = (0..total_frames)
            .map(|i| (self.position + i) % total_frames)
            .find(|&i| !core_map[i].allocated())?;
        self.position = (index + 1) % total_frames;
        Some(index)
    }
}

impl PlacementAlgorithm for FirstFit {
    fn place(&mut self, core_map: &[CoreMapEntry]) -> Option<usize> {
        core_map.iter().position(|entry| !entry.allocated())
    }
}
