use crate::{
    block::{BlockDevice, MemBlock},
    config::VmConfig,
    log_impl,
    mem::{
        frame_allocator::{FrameNumber, UserPool},
        frame_table::FrameTable,
        page::PageLocation,
    },
    swapping::{
        page_replacement::{policy_for, PageReplacementPolicy},
        SwapSpace,
    },
    sync::Mutex,
    threading::process::{Pid, Process, ProcessTable},
};
use alloc::{boxed::Box, sync::Arc};
use once_cell::race::OnceBox;
use pageros_shared::mem::OFFSET;

/// Everything the VM subsystem shares between processes.
pub struct VmSystem {
    pub(crate) config: VmConfig,
    pub(crate) frames: UserPool,
    pub(crate) frame_table: FrameTable,
    pub(crate) swap: SwapSpace,
    pub(crate) policy: Mutex<Box<dyn PageReplacementPolicy>>,
    pub(crate) processes: ProcessTable,
}

impl VmSystem {
    pub fn new(config: VmConfig, swap_device: Box<dyn BlockDevice>) -> Self {
        log_impl::init(config.log_level);
        let policy = policy_for(config.policy);
        let swap = SwapSpace::new(swap_device);
        log::info!(
            "vm: {} user frames, {} swap slots, {} replacement",
            config.user_frames,
            swap.capacity(),
            policy.name()
        );
        Self {
            frames: UserPool::new(config.user_frames, config.placement),
            frame_table: FrameTable::new(),
            swap,
            policy: Mutex::new(policy),
            processes: ProcessTable::new(),
            config,
        }
    }

    /// Swaps to a RAM disk of `config.swap_sectors` sectors.
    pub fn with_memory_swap(config: VmConfig) -> Self {
        let device = MemBlock::new("swap", config.swap_sectors);
        Self::new(config, Box::new(device))
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn process(&self, pid: Pid) -> Option<Arc<Process>> {
        self.processes.get(pid)
    }

    pub fn process_count(&self) -> usize {
        self.processes.len()
    }

    /// Lowest address of the region reserved for stacks.
    pub(crate) fn stack_floor(&self) -> usize {
        OFFSET.saturating_sub(self.config.max_stack_size)
    }

    pub fn free_frames(&self) -> usize {
        self.frames.free_frames()
    }

    pub fn resident_pages(&self) -> usize {
        self.frame_table.len()
    }

    pub fn swap_slots_in_use(&self) -> usize {
        self.swap.slots_in_use()
    }

    /// Where the page containing `vaddr` currently lives.
    pub fn page_location(&self, pid: Pid, vaddr: usize) -> Option<PageLocation> {
        let process = self.process(pid)?;
        let pages = process.pages.lock();
        pages.lookup(vaddr).map(|descriptor| descriptor.location)
    }

    /// The frame the page containing `vaddr` is mapped to, if any.
    pub fn translate(&self, pid: Pid, vaddr: usize) -> Option<FrameNumber> {
        self.process(pid)?.space.lock().translate(vaddr)
    }

    /// Tears down every remaining process. Nothing is written back except
    /// dirty mapped pages.
    pub fn shutdown(self) {
        for pid in self.processes.pids() {
            if let Some(process) = self.processes.remove(pid) {
                self.teardown(&process);
            }
        }
        assert!(self.frame_table.is_empty(), "frames still bound at shutdown");
        assert_eq!(self.frames.allocated(), 0, "frames leaked");
        assert_eq!(self.swap.slots_in_use(), 0, "swap slots leaked");
        log::info!("vm: shut down");
    }
}

/// The system installed at boot, for the trap and syscall entry points.
pub static SYSTEM: OnceBox<VmSystem> = OnceBox::new();

pub fn init_system(system: VmSystem) -> &'static VmSystem {
    if SYSTEM.set(Box::new(system)).is_err() {
        panic!("VM system initialized twice");
    }
    unwrap_system()
}

pub fn unwrap_system() -> &'static VmSystem {
    SYSTEM.get().expect("VM system not initialized")
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::config::VmConfig;
    use pageros_shared::mem::PAGE_FRAME_SIZE;

    /// A system with `frames` user frames and room for `swap_slots` pages of
    /// swap.
    pub fn small_system(frames: usize, swap_slots: u32) -> VmSystem {
        small_system_with(VmConfig::default().with_user_frames(frames), swap_slots)
    }

    pub fn small_system_with(config: VmConfig, swap_slots: u32) -> VmSystem {
        let sectors = swap_slots * (PAGE_FRAME_SIZE / crate::block::BLOCK_SECTOR_SIZE) as u32;
        VmSystem::with_memory_swap(config.with_swap_sectors(sectors))
    }

    /// A page-sized pattern that differs per `seed`.
    pub fn pattern(seed: u8) -> Vec<u8> {
        (0..PAGE_FRAME_SIZE)
            .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
            .collect()
    }

    /// Stack page `n`, counting down from the one just below `OFFSET`.
    pub fn stack_page(n: usize) -> usize {
        OFFSET - (n + 1) * PAGE_FRAME_SIZE
    }

    /// A process whose stack pointer sits at the bottom of `pages` stack pages,
    /// so they can all be touched without further growth checks.
    pub fn process_with_stack(system: &VmSystem, name: &str, pages: usize) -> Pid {
        let pid = system.create_process(name);
        system
            .set_stack_pointer(pid, stack_page(pages - 1))
            .expect("process exists");
        pid
    }
}

#[cfg(test)]
mod tests {
    use super::{
        test::{small_system, stack_page},
        *,
    };
    use crate::{
        interrupts::page_fault::page_fault_handler, mem::fault::FaultOutcome,
        user_program::syscall::syscall_handler,
    };
    use pageros_syscalls::defs::SYS_EXIT;

    #[test]
    fn boot_entry_points_use_installed_system() {
        let system = init_system(small_system(2, 2));
        let pid = system.create_process("init");
        assert_eq!(system.process_count(), 1);

        let esp = stack_page(0);
        assert_eq!(
            page_fault_handler(pid, 0b110, esp, esp),
            FaultOutcome::Resolved
        );
        assert!(system.translate(pid, esp).is_some());

        assert_eq!(syscall_handler(pid, SYS_EXIT, 0, 0, 0), 0);
        assert_eq!(system.process_count(), 0);
        assert_eq!(system.free_frames(), 2);
    }
}
