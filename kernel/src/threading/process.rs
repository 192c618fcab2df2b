use crate::{
    fs::{Fd, FileDescriptorTable, FileRef},
    mem::{
        error::VmError,
        mmap::MappingTable,
        page::{PageDescriptor, PageLocation, SupplementalPageTable},
    },
    paging::AddressSpace,
    sync::Mutex,
    system::VmSystem,
};
use alloc::{collections::BTreeMap, string::String, sync::Arc, vec::Vec};
use core::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use pageros_shared::{
    mem::{OFFSET, PAGE_FRAME_SIZE},
    println,
};

pub type Pid = u16;
pub type AtomicPid = AtomicU16;

/// A user process, as far as memory is concerned.
pub struct Process {
    pub pid: Pid,
    pub name: String,
    /// Serializes faults, unmaps and teardown of this process.
    pub(crate) fault_lock: Mutex<()>,
    pub(crate) pages: Mutex<SupplementalPageTable>,
    pub(crate) space: Mutex<AddressSpace>,
    pub(crate) mappings: Mutex<MappingTable>,
    pub(crate) files: Mutex<FileDescriptorTable>,
    /// User stack pointer as of the last trap.
    stack_pointer: AtomicUsize,
}

impl Process {
    pub fn new(pid: Pid, name: &str) -> Self {
        Self {
            pid,
            name: String::from(name),
            fault_lock: Mutex::new(()),
            pages: Mutex::new(SupplementalPageTable::new()),
            space: Mutex::new(AddressSpace::new()),
            mappings: Mutex::new(MappingTable::new()),
            files: Mutex::new(FileDescriptorTable::new()),
            stack_pointer: AtomicUsize::new(OFFSET),
        }
    }

    pub fn stack_pointer(&self) -> usize {
        self.stack_pointer.load(Ordering::Acquire)
    }

    pub fn set_stack_pointer(&self, sp: usize) {
        self.stack_pointer.store(sp, Ordering::Release);
    }
}

pub struct ProcessTable {
    content: Mutex<BTreeMap<Pid, Arc<Process>>>,
    next_pid: AtomicPid,
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable {
    pub fn new() -> Self {
        Self {
            content: Mutex::new(BTreeMap::new()),
            next_pid: AtomicPid::new(1),
        }
    }

    pub fn allocate_pid(&self) -> Pid {
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        if pid == 0 {
            panic!("PID overflow");
        }
        pid
    }

    pub fn add(&self, process: Arc<Process>) {
        let mut content = self.content.lock();
        assert!(
            !content.contains_key(&process.pid),
            "process with pid {} already added to process table",
            process.pid
        );
        content.insert(process.pid, process);
    }

    pub fn remove(&self, pid: Pid) -> Option<Arc<Process>> {
        self.content.lock().remove(&pid)
    }

    pub fn get(&self, pid: Pid) -> Option<Arc<Process>> {
        self.content.lock().get(&pid).cloned()
    }

    pub fn pids(&self) -> Vec<Pid> {
        self.content.lock().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.content.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl VmSystem {
    /// Creates a process with an empty address space apart from one lazily
    /// allocated stack page just below `OFFSET`.
    pub fn create_process(&self, name: &str) -> Pid {
        let pid = self.processes.allocate_pid();
        let process = Arc::new(Process::new(pid, name));
        process
            .pages
            .lock()
            .insert(PageDescriptor::zeroed(OFFSET - PAGE_FRAME_SIZE, true))
            .unwrap_or_else(|err| panic!("fresh process has a stack page already: {err}"));
        self.processes.add(process);
        log::debug!("created process {pid} ({name})");
        pid
    }

    pub fn set_stack_pointer(&self, pid: Pid, sp: usize) -> Result<(), VmError> {
        let process = self.process(pid).ok_or(VmError::NoSuchProcess)?;
        process.set_stack_pointer(sp);
        Ok(())
    }

    pub fn open_file(&self, pid: Pid, file: FileRef) -> Result<Fd, VmError> {
        let process = self.process(pid).ok_or(VmError::NoSuchProcess)?;
        let fd = process.files.lock().open(file);
        Ok(fd)
    }

    pub fn close_file(&self, pid: Pid, fd: Fd) -> Result<(), VmError> {
        let process = self.process(pid).ok_or(VmError::NoSuchProcess)?;
        let closed = process.files.lock().close(fd);
        closed.map(|_| ()).ok_or(VmError::BadFileDescriptor)
    }

    /// Terminates a process: writes back its mappings, frees its frames and
    /// swap slots, and removes it from the process table.
    pub fn exit_process(&self, pid: Pid, status: i32) -> Result<(), VmError> {
        let process = self.process(pid).ok_or(VmError::NoSuchProcess)?;
        println!("{}: exit({})", process.name, status);
        self.teardown(&process);
        self.processes.remove(pid);
        Ok(())
    }

    pub(crate) fn teardown(&self, process: &Process) {
        let _serial = process.fault_lock.lock();
        let mappings = process.mappings.lock().drain();
        for mapping in &mappings {
            self.unmap_region(process, mapping);
        }

        let mut pages = process.pages.lock();
        for descriptor in pages.drain() {
            match descriptor.location {
                PageLocation::Resident(_) => self.release_frame(process, &descriptor, false),
                PageLocation::Swap(slot) => self.swap.free_slot(slot),
                PageLocation::Zero | PageLocation::File => {}
            }
        }
        drop(pages);
        process.files.lock().clear();
    }
}
