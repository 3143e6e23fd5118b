use std::fmt::Display;

use crate::address::VirtAddress;
use crate::breakpoint::Breakpoint;
use crate::thread_id::{TaskId, ThreadId};
use crate::trace::{TraceEntry, TraceKind, TraceSetting};

/// Size of a machine word as shown and edited by the viewers.
pub const WORD_SIZE: usize = std::mem::size_of::<u64>();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Ready,
    Running,
    Receiving,
    Sending,
    Polling,
    Dead,
}

impl Display for ThreadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ThreadState::Ready => "ready",
            ThreadState::Running => "running",
            ThreadState::Receiving => "rcv_wait",
            ThreadState::Sending => "snd_wait",
            ThreadState::Polling => "polling",
            ThreadState::Dead => "dead",
        };
        write!(f, "{}", name)
    }
}

/// What the debugger needs to know about a thread to show its TCB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub id: ThreadId,
    pub state: ThreadState,
    pub priority: u8,
    pub stack_pointer: VirtAddress,
    /// Start of the thread control block; the kernel stack grows down from
    /// its end.
    pub block_base: VirtAddress,
    pub block_size: usize,
    pub pager: Option<ThreadId>,
    pub ready_next: Option<ThreadId>,
    pub ready_prev: Option<ThreadId>,
    pub present_next: Option<ThreadId>,
    pub present_prev: Option<ThreadId>,
}

impl ThreadInfo {
    pub fn contains(&self, address: VirtAddress) -> bool {
        address >= self.block_base && address - self.block_base < self.block_size
    }
}

/// Everything the debugger core reads or changes in the debugged system.
///
/// Faults are reported through sentinels (`None`, `false`). Implementations
/// must never fault on an address they report as unmapped.
pub trait Target {
    fn is_mapped(&self, address: VirtAddress, task: TaskId) -> bool;

    fn peek_word(&self, address: VirtAddress, task: TaskId) -> Option<u64>;

    fn poke_word(&mut self, address: VirtAddress, task: TaskId, value: u64) -> bool;

    fn lookup_thread(&self, id: ThreadId) -> Option<ThreadInfo>;

    fn current_thread(&self) -> ThreadId;

    /// All threads in present-list order.
    fn threads(&self) -> Vec<ThreadInfo>;

    /// The thread whose control block contains `address`.
    fn thread_at(&self, address: VirtAddress) -> Option<ThreadInfo> {
        self.threads().into_iter().find(|t| t.contains(address))
    }

    /// Trace buffer contents, oldest first.
    fn trace_entries(&self) -> Vec<TraceEntry> {
        Vec::new()
    }

    fn clear_trace(&mut self) {}

    /// Current logging switches for `kind`, `None` if the target cannot log
    /// such events.
    fn trace_setting(&self, _kind: TraceKind) -> Option<TraceSetting> {
        None
    }

    fn set_trace_setting(&mut self, _kind: TraceKind, _setting: &TraceSetting) -> bool {
        false
    }

    /// Programs (or with `None` releases) a breakpoint slot. Returns `false`
    /// when the target cannot honour the request.
    fn arm_breakpoint(&mut self, _slot: usize, _breakpoint: Option<&Breakpoint>) -> bool {
        false
    }

    /// Called when the debugger is entered, before anything else.
    fn save_state(&mut self) {}

    /// Called once the session ends.
    fn restore_state(&mut self) {}
}
