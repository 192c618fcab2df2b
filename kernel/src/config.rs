//! Runtime knobs for the VM subsystem. Compile-time layout constants live in
//! `pageros_shared::{mem, sizes}`.

use log::LevelFilter;
use pageros_shared::{mem::DEFAULT_MAX_STACK_SIZE, sizes::SWAP_SECTORS};

/// Page replacement policy used when the user pool runs dry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolicyKind {
    /// Evict the page that has been resident longest.
    #[default]
    Fifo,
    /// FIFO, but pages accessed since the last sweep get a second chance.
    Clock,
}

/// How the user pool picks among free frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlacementKind {
    #[default]
    NextFit,
    FirstFit,
}

/// What happens when a fault cannot get a frame or a swap slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExhaustionPolicy {
    /// Kill the process that faulted, with exit status -1.
    #[default]
    TerminateProcess,
    /// Panic the kernel.
    Halt,
}

#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Number of physical frames in the user pool.
    pub user_frames: usize,
    /// Size of the swap device in 512-byte sectors.
    pub swap_sectors: u32,
    /// How far below the stack pointer an access may land and still grow the
    /// stack. 32 covers `pusha`.
    pub stack_growth_window: usize,
    /// Size of the region below `OFFSET` reserved for the stack.
    pub max_stack_size: usize,
    pub policy: PolicyKind,
    pub placement: PlacementKind,
    pub exhaustion: ExhaustionPolicy,
    pub log_level: LevelFilter,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            user_frames: 256,
            swap_sectors: SWAP_SECTORS,
            stack_growth_window: 32,
            max_stack_size: DEFAULT_MAX_STACK_SIZE,
            policy: PolicyKind::default(),
            placement: PlacementKind::default(),
            exhaustion: ExhaustionPolicy::default(),
            log_level: LevelFilter::Warn,
        }
    }
}

impl VmConfig {
    pub fn with_user_frames(mut self, user_frames: usize) -> Self {
        self.user_frames = user_frames;
        self
    }

    pub fn with_swap_sectors(mut self, swap_sectors: u32) -> Self {
        self.swap_sectors = swap_sectors;
        self
    }

    pub fn with_stack_growth_window(mut self, window: usize) -> Self {
        self.stack_growth_window = window;
        self
    }

    pub fn with_max_stack_size(mut self, max_stack_size: usize) -> Self {
        self.max_stack_size = max_stack_size;
        self
    }

    pub fn with_policy(mut self, policy: PolicyKind) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_placement(mut self, placement: PlacementKind) -> Self {
        self.placement = placement;
        self
    }

    pub fn with_exhaustion(mut self, exhaustion: ExhaustionPolicy) -> Self {
        self.exhaustion = exhaustion;
        self
    }

    pub fn with_log_level(mut self, log_level: LevelFilter) -> Self {
        self.log_level = log_level;
        self
    }
}
