//! A live Linux process as debugger target, accessed through ptrace.
//!
//! The process is the only "task"; task numbers passed in by the debugger
//! core are ignored. Its main thread is presented as thread 0 of a task
//! numbered after the pid, with the page holding the stack pointer standing
//! in for the control block.

use std::os::unix::process::CommandExt;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use libc::c_long;
use log::{debug, info, warn};
use nix::sys::ptrace::{attach, traceme};
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitStatus, waitpid};

use crate::address::{PAGE_SIZE, VirtAddress};
use crate::breakpoint::{BREAKPOINT_SLOTS, Breakpoint, BreakpointMode};
use crate::target::{Target, ThreadInfo, ThreadState, WORD_SIZE};
use crate::thread_id::{TaskId, ThreadId};

pub type Pid = nix::unistd::Pid;

const INT3: u64 = 0xcc;

#[derive(PartialEq, Debug)]
/// Scheduler state from the third field of `/proc/<pid>/stat`.
pub enum ProcessState {
    Running,
    /// Interruptible wait.
    Sleeping,
    /// Uninterruptible disk sleep.
    Waiting,
    Zombie,
    Stopped,
    /// Stopped by the tracer.
    TracingStopped,
    Unknown(char),
}

impl From<char> for ProcessState {
    fn from(value: char) -> Self {
        match value {
            'R' => ProcessState::Running,
            'S' => ProcessState::Sleeping,
            'D' => ProcessState::Waiting,
            'Z' => ProcessState::Zombie,
            'T' => ProcessState::Stopped,
            't' => ProcessState::TracingStopped,
            ch => ProcessState::Unknown(ch),
        }
    }
}

pub fn process_with_pid_exists(pid: Pid) -> bool {
    !matches!(kill(pid, None), Err(nix::errno::Errno::ESRCH))
}

pub fn get_process_state(pid: Pid) -> Result<ProcessState> {
    let proc_path = format!("/proc/{}/stat", pid);
    let contents = std::fs::read_to_string(proc_path).context("Failed to read /proc file")?;
    let last_parenthesis = contents
        .rfind(')')
        .ok_or_else(|| anyhow!("Failed to find last parenthesis in /proc file"))?;
    // The state character follows the last parenthesis and a space
    let state_char = contents[last_parenthesis..]
        .chars()
        .nth(2)
        .ok_or_else(|| anyhow!("Failed to find state character in /proc file"))?;
    Ok(ProcessState::from(state_char))
}

/// One line of `/proc/<pid>/maps`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapRegion {
    pub start: VirtAddress,
    pub end: VirtAddress,
    pub readable: bool,
    pub writable: bool,
    pub executable: bool,
    pub name: String,
}

impl MapRegion {
    pub fn contains(&self, address: VirtAddress) -> bool {
        address >= self.start && address < self.end
    }
}

/// Parses the text of `/proc/<pid>/maps`.
pub fn parse_maps(text: &str) -> Result<Vec<MapRegion>> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let mut fields = line.split_whitespace();
            let range = fields.next().ok_or_else(|| anyhow!("Empty maps line"))?;
            let perms = fields
                .next()
                .ok_or_else(|| anyhow!("Missing permissions in maps line: {}", line))?;
            let (start, end) = range
                .split_once('-')
                .ok_or_else(|| anyhow!("Malformed address range: {}", range))?;
            let parse = |hex: &str| {
                usize::from_str_radix(hex, 16)
                    .map(VirtAddress::new)
                    .with_context(|| format!("Malformed address: {}", hex))
            };
            // offset, device, inode, then the optional path
            let name = fields.nth(3).unwrap_or("").to_string();
            Ok(MapRegion {
                start: parse(start)?,
                end: parse(end)?,
                readable: perms.starts_with('r'),
                writable: perms.chars().nth(1) == Some('w'),
                executable: perms.chars().nth(2) == Some('x'),
                name,
            })
        })
        .collect()
}

/// The task number a process is shown as.
pub fn task_of(pid: Pid) -> Result<TaskId> {
    TaskId::try_from(pid.as_raw())
        .map_err(|_| anyhow!("Process {} does not fit a task number (at most {:#x})", pid, TaskId::MAX))
}

fn load_maps(pid: Pid) -> Result<Vec<MapRegion>> {
    let path = format!("/proc/{}/maps", pid);
    let text = std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path))?;
    parse_maps(&text)
}

pub struct ProcessTarget {
    pub pid: Pid,
    task: TaskId,
    regions: Vec<MapRegion>,
    stack_pointer: VirtAddress,
    /// Original words under armed instruction breakpoints.
    patched: [Option<(VirtAddress, u64)>; BREAKPOINT_SLOTS],
    terminate_on_end: bool,
}

impl ProcessTarget {
    /// Attaches to a running process and waits for it to stop.
    pub fn attach(pid: Pid) -> Result<Self> {
        let task = task_of(pid)?;
        attach(pid).context("Failed to attach to process")?;
        match waitpid(pid, None).context("Failed to wait for process")? {
            WaitStatus::Stopped(_, _) => {}
            status => return Err(anyhow!("Unexpected wait status after attach: {:?}", status)),
        }
        info!("attached to process {}", pid);
        Self::stopped(pid, task, false)
    }

    /// Starts `program` traced; it stops right after exec. The process is
    /// killed when the target is dropped.
    pub fn launch(program: &Path, args: &[String]) -> Result<Self> {
        let mut command = std::process::Command::new(program);
        command.args(args);
        // SAFETY: traceme only issues a ptrace syscall, which is
        // async-signal-safe.
        unsafe {
            command.pre_exec(|| traceme().map_err(std::io::Error::from));
        }
        let child = command
            .spawn()
            .with_context(|| format!("Failed to launch {}", program.display()))?;
        let pid = Pid::from_raw(child.id() as i32);
        match waitpid(pid, None).context("Failed to wait for process")? {
            WaitStatus::Stopped(_, Signal::SIGTRAP) => {}
            status => return Err(anyhow!("Process did not stop after exec: {:?}", status)),
        }
        let task = match task_of(pid) {
            Ok(task) => task,
            Err(e) => {
                let _ = kill(pid, Signal::SIGKILL);
                let _ = waitpid(pid, None);
                return Err(e);
            }
        };
        info!("launched {} as process {}", program.display(), pid);
        Self::stopped(pid, task, true)
    }

    fn stopped(pid: Pid, task: TaskId, terminate_on_end: bool) -> Result<Self> {
        let regions = load_maps(pid)?;
        let stack_pointer = read_stack_pointer(pid, &regions)?;
        debug!("process {}: {} regions, sp {}", pid, regions.len(), stack_pointer);
        Ok(ProcessTarget {
            pid,
            task,
            regions,
            stack_pointer,
            patched: [None; BREAKPOINT_SLOTS],
            terminate_on_end,
        })
    }

    pub fn regions(&self) -> &[MapRegion] {
        &self.regions
    }

    pub fn main_thread(&self) -> ThreadId {
        ThreadId::new(self.task, 0)
    }

    fn read_raw(&self, address: VirtAddress) -> Option<u64> {
        nix::sys::ptrace::read(self.pid, address.get() as *mut _)
            .ok()
            .map(|word| word as u64)
    }

    fn write_raw(&self, address: VirtAddress, value: u64) -> bool {
        nix::sys::ptrace::write(self.pid, address.get() as *mut _, value as c_long).is_ok()
    }
}

#[cfg(target_arch = "x86_64")]
fn read_stack_pointer(pid: Pid, _regions: &[MapRegion]) -> Result<VirtAddress> {
    let regs = nix::sys::ptrace::getregs(pid).context("Failed to read registers")?;
    Ok(VirtAddress::from(regs.rsp))
}

#[cfg(not(target_arch = "x86_64"))]
fn read_stack_pointer(_pid: Pid, regions: &[MapRegion]) -> Result<VirtAddress> {
    regions
        .iter()
        .find(|r| r.name == "[stack]")
        .map(|r| VirtAddress::new(r.end.get() - WORD_SIZE))
        .ok_or_else(|| anyhow!("Process has no [stack] mapping"))
}

impl Target for ProcessTarget {
    fn is_mapped(&self, address: VirtAddress, _task: TaskId) -> bool {
        let last = address + (WORD_SIZE - 1);
        self.regions
            .iter()
            .any(|r| r.readable && r.contains(address) && r.contains(last))
    }

    fn peek_word(&self, address: VirtAddress, task: TaskId) -> Option<u64> {
        if !self.is_mapped(address, task) {
            return None;
        }
        self.read_raw(address)
    }

    fn poke_word(&mut self, address: VirtAddress, task: TaskId, value: u64) -> bool {
        if !self.is_mapped(address, task) {
            return false;
        }
        self.write_raw(address, value)
    }

    fn lookup_thread(&self, id: ThreadId) -> Option<ThreadInfo> {
        if id != self.main_thread() {
            return None;
        }
        let state = match get_process_state(self.pid) {
            Ok(ProcessState::Running) => ThreadState::Running,
            Ok(ProcessState::Zombie) => ThreadState::Dead,
            Ok(_) => ThreadState::Ready,
            Err(e) => {
                warn!("cannot read state of {}: {}", self.pid, e);
                ThreadState::Ready
            }
        };
        Some(ThreadInfo {
            id,
            state,
            priority: 0,
            stack_pointer: self.stack_pointer,
            block_base: self.stack_pointer.page_base(),
            block_size: PAGE_SIZE,
            pager: None,
            ready_next: None,
            ready_prev: None,
            present_next: Some(id),
            present_prev: Some(id),
        })
    }

    fn current_thread(&self) -> ThreadId {
        self.main_thread()
    }

    fn threads(&self) -> Vec<ThreadInfo> {
        self.lookup_thread(self.main_thread()).into_iter().collect()
    }

    /// Only instruction breakpoints, patched in as `int3`.
    fn arm_breakpoint(&mut self, slot: usize, breakpoint: Option<&Breakpoint>) -> bool {
        if slot >= BREAKPOINT_SLOTS {
            return false;
        }
        if let Some((address, original)) = self.patched[slot] {
            let restored = self
                .read_raw(address)
                .is_some_and(|current| self.write_raw(address, (current & !0xff) | (original & 0xff)));
            if !restored {
                warn!("cannot restore code at {}", address);
                return false;
            }
            self.patched[slot] = None;
        }
        let Some(breakpoint) = breakpoint else {
            return true;
        };
        if breakpoint.mode != BreakpointMode::Instruction {
            debug!("{} breakpoints need debug registers", breakpoint.mode);
            return false;
        }
        let Some(original) = self.peek_word(breakpoint.address, 0) else {
            return false;
        };
        if !self.write_raw(breakpoint.address, (original & !0xff) | INT3) {
            return false;
        }
        self.patched[slot] = Some((breakpoint.address, original));
        true
    }

    fn restore_state(&mut self) {
        // Memory may have been remapped by the time the next session starts.
        match load_maps(self.pid) {
            Ok(regions) => self.regions = regions,
            Err(e) => warn!("cannot reload maps of {}: {}", self.pid, e),
        }
    }
}

impl Drop for ProcessTarget {
    fn drop(&mut self) {
        for slot in 0..BREAKPOINT_SLOTS {
            self.arm_breakpoint(slot, None);
        }
        if self.terminate_on_end {
            let _ = kill(self.pid, Signal::SIGKILL);
            let _ = waitpid(self.pid, None);
            return;
        }
        if let Err(e) = nix::sys::ptrace::detach(self.pid, None) {
            warn!("Failed to detach from process {}: {}", self.pid, e);
        }
        let _ = kill(self.pid, Signal::SIGCONT);
    }
}
