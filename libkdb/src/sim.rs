//! An in-memory stand-in for a paused kernel: sparse per-task pages, a
//! thread table with control blocks, and a trace buffer.

use std::collections::{BTreeMap, BTreeSet};

use crate::address::{PAGE_SIZE, VirtAddress};
use crate::breakpoint::{BREAKPOINT_SLOTS, Breakpoint};
use crate::target::{Target, ThreadInfo, ThreadState, WORD_SIZE};
use crate::thread_id::{KERNEL_TASK, TaskId, ThreadId};
use crate::trace::{TraceEntry, TraceKind, TraceSetting};

const WORDS_PER_PAGE: usize = PAGE_SIZE / WORD_SIZE;

/// Size of a thread control block, kernel stack included.
pub const TCB_SIZE: usize = 0x1000;
/// Control blocks are laid out by id from here.
pub const TCB_AREA: usize = 0xe000_0000;
pub const KERNEL_TEXT: usize = 0xf000_0000;

type Page = Box<[u64; WORDS_PER_PAGE]>;

pub struct SimTarget {
    /// Task 0 pages are visible from every task.
    pages: BTreeMap<(TaskId, usize), Page>,
    read_only: BTreeSet<(TaskId, usize)>,
    threads: Vec<ThreadInfo>,
    current: ThreadId,
    trace: Vec<TraceEntry>,
    trace_settings: [TraceSetting; TraceKind::ALL.len()],
    armed: [Option<Breakpoint>; BREAKPOINT_SLOTS],
    sessions: usize,
    inside: bool,
}

impl SimTarget {
    pub fn new(current: ThreadId) -> Self {
        SimTarget {
            pages: BTreeMap::new(),
            read_only: BTreeSet::new(),
            threads: Vec::new(),
            current,
            trace: Vec::new(),
            trace_settings: Default::default(),
            armed: Default::default(),
            sessions: 0,
            inside: false,
        }
    }

    pub fn tcb_base(id: ThreadId) -> VirtAddress {
        VirtAddress::new(TCB_AREA + (((id.task as usize) << 8) | id.thread as usize) * TCB_SIZE)
    }

    pub fn map_page(&mut self, task: TaskId, address: VirtAddress) -> &mut Self {
        self.pages
            .entry((task, address.page_base().get()))
            .or_insert_with(|| Box::new([0; WORDS_PER_PAGE]));
        self
    }

    /// Makes writes to the page fail.
    pub fn protect_page(&mut self, task: TaskId, address: VirtAddress) -> &mut Self {
        self.read_only.insert((task, address.page_base().get()));
        self
    }

    /// Writes a word, mapping its page first if needed.
    pub fn write_word(&mut self, task: TaskId, address: VirtAddress, value: u64) -> &mut Self {
        self.map_page(task, address);
        if let Some(page) = self.pages.get_mut(&(task, address.page_base().get())) {
            page[word_index(address)] = value;
        }
        self
    }

    /// Adds a thread and maps its control block into the kernel.
    pub fn add_thread(&mut self, info: ThreadInfo) -> &mut Self {
        let mut page = info.block_base;
        while page < info.block_base + info.block_size {
            self.map_page(KERNEL_TASK, page);
            page = page + PAGE_SIZE;
        }
        self.threads.retain(|t| t.id != info.id);
        self.threads.push(info);
        self
    }

    pub fn log_event(&mut self, timestamp: u64, text: impl Into<String>) -> &mut Self {
        self.trace.push(TraceEntry::new(timestamp, text));
        self
    }

    pub fn set_current(&mut self, id: ThreadId) -> &mut Self {
        self.current = id;
        self
    }

    pub fn armed(&self, slot: usize) -> Option<&Breakpoint> {
        self.armed.get(slot).and_then(Option::as_ref)
    }

    /// Number of debugger sessions seen so far.
    pub fn sessions(&self) -> usize {
        self.sessions
    }

    pub fn in_session(&self) -> bool {
        self.inside
    }

    /// Links the ready and present lists as rings in thread table order.
    /// Only ready and running threads are on the ready list.
    pub fn link_lists(&mut self) -> &mut Self {
        let present: Vec<ThreadId> = self.threads.iter().map(|t| t.id).collect();
        let ready: Vec<ThreadId> = self
            .threads
            .iter()
            .filter(|t| matches!(t.state, ThreadState::Ready | ThreadState::Running))
            .map(|t| t.id)
            .collect();
        for thread in self.threads.iter_mut() {
            (thread.present_prev, thread.present_next) = ring_neighbours(&present, thread.id);
            (thread.ready_prev, thread.ready_next) = ring_neighbours(&ready, thread.id);
        }
        self
    }

    /// A small system: sigma0, a two-threaded task 4 and a task 5, each with
    /// a populated kernel stack, some user memory and a few trace entries.
    pub fn demo() -> Self {
        let mut sim = SimTarget::new(ThreadId::new(4, 0));
        let threads = [
            (ThreadId::new(2, 0), ThreadState::Receiving, 0x40, None),
            (ThreadId::new(4, 0), ThreadState::Running, 0x10, Some(ThreadId::new(2, 0))),
            (ThreadId::new(4, 1), ThreadState::Ready, 0x10, Some(ThreadId::new(2, 0))),
            (ThreadId::new(5, 0), ThreadState::Ready, 0x08, Some(ThreadId::new(2, 0))),
        ];
        for (id, state, priority, pager) in threads {
            let block_base = SimTarget::tcb_base(id);
            // user entry frame (ip, cs, flags, sp, ss) plus a few kernel frames
            let stack_words = [
                0x0000_0000_0804_8a10,
                0x1b,
                0x0000_0000_0000_3202,
                0x0000_0000_bfff_fe40,
                0x23,
                (KERNEL_TEXT + 0x1f3c) as u64,
                SimTarget::tcb_base(ThreadId::new(2, 0)).get() as u64,
                (KERNEL_TEXT + 0x0a80) as u64,
            ];
            let top = block_base + TCB_SIZE;
            for (i, word) in stack_words.iter().enumerate() {
                sim.write_word(KERNEL_TASK, VirtAddress::new(top.get() - (i + 1) * WORD_SIZE), *word);
            }
            sim.write_word(KERNEL_TASK, block_base, ((id.task as u64) << 8) | id.thread as u64);
            sim.add_thread(ThreadInfo {
                id,
                state,
                priority,
                stack_pointer: VirtAddress::new(top.get() - stack_words.len() * WORD_SIZE),
                block_base,
                block_size: TCB_SIZE,
                pager,
                ready_next: None,
                ready_prev: None,
                present_next: None,
                present_prev: None,
            });
        }
        sim.link_lists();

        for i in 0..WORDS_PER_PAGE {
            sim.write_word(
                KERNEL_TASK,
                VirtAddress::new(KERNEL_TEXT + i * WORD_SIZE),
                0x9090_9090_9090_9090 ^ i as u64,
            );
        }
        sim.protect_page(KERNEL_TASK, VirtAddress::new(KERNEL_TEXT));

        let text = b"Hello from task 4, the quick brown fox jumps over the lazy dog.";
        for (i, chunk) in text.chunks(WORD_SIZE).enumerate() {
            let mut bytes = [0u8; WORD_SIZE];
            bytes[..chunk.len()].copy_from_slice(chunk);
            sim.write_word(4, VirtAddress::new(0x0804_9000 + i * WORD_SIZE), u64::from_le_bytes(bytes));
        }
        sim.write_word(4, VirtAddress::new(0x0804_8a10), 0x0804_9000);
        sim.map_page(4, VirtAddress::new(0xbfff_f000));
        sim.write_word(5, VirtAddress::new(0x0804_8000), 0xdead_beef);

        sim.log_event(0x1_0000, "ipc send    4.00 -> 2.00 dw0=00000000 dw1=00000004")
            .log_event(0x1_0400, "pf          4.00 addr=08049010 ip=08048a10 w")
            .log_event(0x1_0a00, "ipc reply   2.00 -> 4.00 map fpage 08049000/12")
            .log_event(0x1_2000, "sched       4.00 -> 5.00 timeslice expired")
            .log_event(0x1_2100, "ipc send    5.00 -> 4.01 dw0=0000002a dw1=00000000")
            .log_event(0x1_2200, "sched       5.00 -> 4.00 ipc");
        sim
    }

    fn page(&self, address: VirtAddress, task: TaskId) -> Option<(&Page, TaskId)> {
        let base = address.page_base().get();
        self.pages
            .get(&(task, base))
            .map(|page| (page, task))
            .or_else(|| self.pages.get(&(KERNEL_TASK, base)).map(|page| (page, KERNEL_TASK)))
    }

    fn word_fits(address: VirtAddress) -> bool {
        address.is_word_aligned() || address.page_base() == (address + (WORD_SIZE - 1)).page_base()
    }
}

fn word_index(address: VirtAddress) -> usize {
    (address.get() % PAGE_SIZE) / WORD_SIZE
}

fn ring_neighbours(ring: &[ThreadId], id: ThreadId) -> (Option<ThreadId>, Option<ThreadId>) {
    let Some(position) = ring.iter().position(|t| *t == id) else {
        return (None, None);
    };
    let len = ring.len();
    (Some(ring[(position + len - 1) % len]), Some(ring[(position + 1) % len]))
}

impl Target for SimTarget {
    fn is_mapped(&self, address: VirtAddress, task: TaskId) -> bool {
        self.page(address, task).is_some()
    }

    fn peek_word(&self, address: VirtAddress, task: TaskId) -> Option<u64> {
        if !SimTarget::word_fits(address) {
            return None;
        }
        let (page, _) = self.page(address, task)?;
        if address.is_word_aligned() {
            return Some(page[word_index(address)]);
        }
        // Unaligned within one page: assemble from the two words.
        let aligned = address.align_down(WORD_SIZE);
        let shift = (address - aligned) * 8;
        let low = page[word_index(aligned)] >> shift;
        let high = page
            .get(word_index(aligned) + 1)
            .map_or(0, |word| word << (64 - shift));
        Some(low | high)
    }

    fn poke_word(&mut self, address: VirtAddress, task: TaskId, value: u64) -> bool {
        if !address.is_word_aligned() {
            return false;
        }
        let Some((_, owner)) = self.page(address, task) else {
            return false;
        };
        let key = (owner, address.page_base().get());
        if self.read_only.contains(&key) {
            return false;
        }
        match self.pages.get_mut(&key) {
            Some(page) => {
                page[word_index(address)] = value;
                true
            }
            None => false,
        }
    }

    fn lookup_thread(&self, id: ThreadId) -> Option<ThreadInfo> {
        self.threads.iter().find(|t| t.id == id).cloned()
    }

    fn current_thread(&self) -> ThreadId {
        self.current
    }

    fn threads(&self) -> Vec<ThreadInfo> {
        self.threads.clone()
    }

    fn trace_entries(&self) -> Vec<TraceEntry> {
        self.trace.clone()
    }

    fn clear_trace(&mut self) {
        self.trace.clear();
    }

    fn trace_setting(&self, kind: TraceKind) -> Option<TraceSetting> {
        self.trace_settings.get(kind.index()).copied()
    }

    fn set_trace_setting(&mut self, kind: TraceKind, setting: &TraceSetting) -> bool {
        match self.trace_settings.get_mut(kind.index()) {
            Some(current) => {
                *current = *setting;
                true
            }
            None => false,
        }
    }

    fn arm_breakpoint(&mut self, slot: usize, breakpoint: Option<&Breakpoint>) -> bool {
        match self.armed.get_mut(slot) {
            Some(armed) => {
                *armed = breakpoint.cloned();
                true
            }
            None => false,
        }
    }

    fn save_state(&mut self) {
        self.sessions += 1;
        self.inside = true;
    }

    fn restore_state(&mut self) {
        self.inside = false;
    }
}
