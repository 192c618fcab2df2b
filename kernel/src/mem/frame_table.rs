//! Registry of the physical frames that currently hold user pages.
//!
//! Each entry names the one `(process, page)` pair its frame satisfies; the
//! page's descriptor points back at the entry through a [`FrameHandle`].
//! Handles are slab keys and are recycled once an entry is unbound, so a
//! handle is only meaningful while the descriptor holding it is Resident.

use crate::{
    mem::frame_allocator::FrameNumber,
    sync::{Mutex, MutexGuard},
    threading::process::{Pid, Process},
};
use alloc::{
    collections::{BTreeMap, VecDeque},
    sync::Arc,
};
use slab::Slab;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameHandle(usize);

pub struct FrameEntry {
    pub frame: FrameNumber,
    pub owner: Arc<Process>,
    pub vaddr: usize,
}

impl FrameEntry {
    pub fn owner_pid(&self) -> Pid {
        self.owner.pid
    }
}

#[derive(Default)]
pub struct FrameTableInner {
    entries: Slab<FrameEntry>,
    by_frame: BTreeMap<FrameNumber, FrameHandle>,
    /// Handles in the order their frames were bound.
    order: VecDeque<FrameHandle>,
}

impl FrameTableInner {
    pub fn bind(&mut self, frame: FrameNumber, owner: Arc<Process>, vaddr: usize) -> FrameHandle {
        assert!(
            !self.by_frame.contains_key(&frame),
            "{frame} is already bound"
        );
        let handle = FrameHandle(self.entries.insert(FrameEntry {
            frame,
            owner,
            vaddr,
        }));
        self.by_frame.insert(frame, handle);
        self.order.push_back(handle);
        handle
    }

    /// Removes the entry. The caller decides what happens to the frame.
    pub fn unbind(&mut self, handle: FrameHandle) -> FrameEntry {
        let entry = self
            .entries
            .try_remove(handle.0)
            .unwrap_or_else(|| panic!("unbinding stale {handle:?}"));
        self.by_frame.remove(&entry.frame);
        if let Some(position) = self.order.iter().position(|&h| h == handle) {
            self.order.remove(position);
        }
        entry
    }

    pub fn get(&self, handle: FrameHandle) -> Option<&FrameEntry> {
        self.entries.get(handle.0)
    }

    pub fn find_by_frame(&self, frame: FrameNumber) -> Option<FrameHandle> {
        self.by_frame.get(&frame).copied()
    }

    /// Bound frames, oldest first.
    pub fn resident_in_order(&self) -> impl Iterator<Item = FrameHandle> + '_ {
        self.order.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The table and its single lock. The lock covers metadata only and is never
/// held across I/O.
#[derive(Default)]
pub struct FrameTable {
    inner: Mutex<FrameTableInner>,
}

impl FrameTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, FrameTableInner> {
        self.inner.lock()
    }

    pub fn bind(&self, frame: FrameNumber, owner: Arc<Process>, vaddr: usize) -> FrameHandle {
        self.inner.lock().bind(frame, owner, vaddr)
    }

    pub fn unbind(&self, handle: FrameHandle) -> FrameEntry {
        self.inner.lock().unbind(handle)
    }

    /// The `(owner, page)` bound to `frame`, if any.
    pub fn owner_of(&self, frame: FrameNumber) -> Option<(Pid, usize)> {
        let table = self.inner.lock();
        let handle = table.find_by_frame(frame)?;
        table.get(handle).map(|entry| (entry.owner_pid(), entry.vaddr))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn process(pid: Pid) -> Arc<Process> {
        Arc::new(Process::new(pid, "test"))
    }

    #[test]
    fn bind_and_unbind() {
        let table = FrameTable::new();
        let owner = process(1);
        let a = table.bind(FrameNumber::new(4), Arc::clone(&owner), 0x1000);
        let b = table.bind(FrameNumber::new(2), Arc::clone(&owner), 0x2000);
        assert_eq!(table.owner_of(FrameNumber::new(2)), Some((1, 0x2000)));
        assert_eq!(
            table.lock().resident_in_order().collect::<Vec<_>>(),
            vec![a, b]
        );

        let entry = table.unbind(a);
        assert_eq!((entry.frame, entry.vaddr), (FrameNumber::new(4), 0x1000));
        assert_eq!(table.owner_of(FrameNumber::new(4)), None);
        assert_eq!(table.lock().find_by_frame(FrameNumber::new(2)), Some(b));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn rebinding_goes_to_the_back() {
        let table = FrameTable::new();
        let owner = process(1);
        let a = table.bind(FrameNumber::new(0), Arc::clone(&owner), 0x1000);
        let b = table.bind(FrameNumber::new(1), Arc::clone(&owner), 0x2000);
        table.unbind(a);
        let c = table.bind(FrameNumber::new(0), Arc::clone(&owner), 0x3000);
        assert_eq!(
            table.lock().resident_in_order().collect::<Vec<_>>(),
            vec![b, c]
        );
    }

    #[test]
    #[should_panic(expected = "already bound")]
    fn double_bind() {
        let table = FrameTable::new();
        let owner = process(1);
        table.bind(FrameNumber::new(0), Arc::clone(&owner), 0x1000);
        table.bind(FrameNumber::new(0), owner, 0x2000);
    }
}
