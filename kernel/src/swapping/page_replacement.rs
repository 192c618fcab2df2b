use crate::{
    config::PolicyKind,
    mem::frame_table::{FrameHandle, FrameTableInner},
};
use alloc::{boxed::Box, vec::Vec};

/// Orders resident frames by how much they deserve to be evicted. The
/// eviction engine walks the list and takes the first victim it can lock.
pub trait PageReplacementPolicy: Send {
    fn name(&self) -> &'static str;

    /// Called with the frame table locked.
    fn candidates(&mut self, table: &FrameTableInner) -> Vec<FrameHandle>;
}

pub fn policy_for(kind: PolicyKind) -> Box<dyn PageReplacementPolicy> {
    match kind {
        PolicyKind::Fifo => Box::new(Fifo),
        PolicyKind::Clock => Box::new(Clock::default()),
    }
}

/// Oldest binding first.
pub struct Fifo;

impl PageReplacementPolicy for Fifo {
    fn name(&self) -> &'static str {
        "fifo"
    }

    fn candidates(&mut self, table: &FrameTableInner) -> Vec<FrameHandle> {
        table.resident_in_order().collect()
    }
}

/// Second chance. The hand sweeps the bind order from where it last stopped,
/// clearing accessed bits, and stops at the first frame not accessed since the
/// previous sweep. Frames past the hand keep their bits and follow the victim;
/// the frames it passed over come last.
#[derive(Default)]
pub struct Clock {
    hand: usize,
}

impl PageReplacementPolicy for Clock {
    fn name(&self) -> &'static str {
        "clock"
    }

    fn candidates(&mut self, table: &FrameTableInner) -> Vec<FrameHandle> {
        let order: Vec<_> = table.resident_in_order().collect();
        let len = order.len();
        if len == 0 {
            return order;
        }
        let start = self.hand % len;
        let mut second_chance = Vec::new();
        for i in 0..len {
            let handle = order[(start + i) % len];
            let Some(entry) = table.get(handle) else {
                continue;
            };
            if entry.owner.space.lock().take_accessed(entry.vaddr) {
                second_chance.push(handle);
                continue;
            }
            self.hand = (start + i + 1) % len;
            let mut candidates: Vec<_> = (i..len).map(|j| order[(start + j) % len]).collect();
            candidates.extend(second_chance);
            return candidates;
        }
        // Every frame was in use; the next lap finds them all cleared.
        self.hand = (start + 1) % len;
        second_chance
    }
}
