use std::fmt::Display;

use crate::address::VirtAddress;
use crate::thread_id::{TaskId, ThreadId};

/// Number of hardware breakpoint slots (debug registers).
pub const BREAKPOINT_SLOTS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointMode {
    Instruction,
    Write,
    Access,
    PortIo,
}

impl BreakpointMode {
    pub fn from_key(c: char) -> Option<Self> {
        match c {
            'i' => Some(BreakpointMode::Instruction),
            'w' => Some(BreakpointMode::Write),
            'a' => Some(BreakpointMode::Access),
            'p' => Some(BreakpointMode::PortIo),
            _ => None,
        }
    }
}

impl Display for BreakpointMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BreakpointMode::Instruction => "instruction",
            BreakpointMode::Write => "write access",
            BreakpointMode::Access => "r/w access",
            BreakpointMode::PortIo => "i/o access",
        };
        write!(f, "{}", name)
    }
}

/// What happens when the breakpoint triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    Stop,
    Log,
}

/// Registers a breakpoint can be restricted on, as typed at the prompt.
pub const REGISTER_NAMES: [&str; 10] = ["EAX", "EBX", "ECX", "EDX", "EBP", "ESI", "EDI", "EIP", "ESP", "EFL"];

/// Looks up a register name, ignoring case.
pub fn register_by_name(name: &str) -> Option<&'static str> {
    REGISTER_NAMES
        .iter()
        .copied()
        .find(|register| register.eq_ignore_ascii_case(name))
}

/// Extra condition for a breakpoint to trigger. `low..=high` bounds are
/// inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Restriction {
    #[default]
    None,
    Task { task: TaskId, negate: bool },
    Thread { thread: ThreadId, negate: bool },
    Register { register: &'static str, low: u64, high: u64 },
    /// The `length`-byte value at `address`.
    Memory { address: VirtAddress, length: usize, low: u64, high: u64 },
}

impl Display for Restriction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Restriction::None => Ok(()),
            Restriction::Task { task, negate } => {
                write!(f, " task{}{:x}", if *negate { "!=" } else { "==" }, task)
            }
            Restriction::Thread { thread, negate } => {
                write!(f, " thread{}{}", if *negate { "!=" } else { "==" }, thread)
            }
            Restriction::Register { register, low, high } => {
                write!(f, " register {} in [{:08x}, {:08x}]", register, low, high)
            }
            Restriction::Memory {
                address,
                length,
                low,
                high,
            } => write!(f, " {}-byte var at {} in [{:08x}, {:08x}]", length, address, low, high),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub address: VirtAddress,
    pub length: usize,
    pub mode: BreakpointMode,
    pub log_mode: LogMode,
    pub restriction: Restriction,
    pub task: TaskId,
}

impl Breakpoint {
    pub fn new(address: VirtAddress, length: usize, mode: BreakpointMode, task: TaskId) -> Self {
        Breakpoint {
            address,
            length,
            mode,
            log_mode: LogMode::Stop,
            restriction: Restriction::None,
            task,
        }
    }

    pub fn is_valid_length(length: usize) -> bool {
        matches!(length, 1 | 2 | 4)
    }
}

impl Display for Breakpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} at {} len {} task {:x}{}",
            match self.log_mode {
                LogMode::Stop => "break",
                LogMode::Log => "log",
            },
            self.mode,
            self.address,
            self.length,
            self.task,
            self.restriction
        )
    }
}

/// The fixed set of breakpoint slots. Slots are numbered 0..4 internally
/// and 1..=4 at the prompt.
#[derive(Debug, Default)]
pub struct BreakpointTable {
    slots: [Option<Breakpoint>; BREAKPOINT_SLOTS],
}

impl BreakpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn first_unused(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    pub fn set(&mut self, slot: usize, breakpoint: Breakpoint) {
        self.slots[slot] = Some(breakpoint);
    }

    pub fn clear(&mut self, slot: usize) -> Option<Breakpoint> {
        self.slots.get_mut(slot).and_then(Option::take)
    }

    pub fn get(&self, slot: usize) -> Option<&Breakpoint> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut Breakpoint> {
        self.slots.get_mut(slot).and_then(Option::as_mut)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, Option<&Breakpoint>)> {
        self.slots.iter().enumerate().map(|(i, slot)| (i, slot.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_slots() {
        let mut table = BreakpointTable::new();
        assert_eq!(table.first_unused(), Some(0));
        for slot in 0..BREAKPOINT_SLOTS {
            table.set(
                slot,
                Breakpoint::new(VirtAddress::new(0x1000 * slot), 1, BreakpointMode::Instruction, 0),
            );
        }
        assert_eq!(table.first_unused(), None);
        assert!(table.clear(2).is_some());
        assert_eq!(table.first_unused(), Some(2));
        assert!(table.clear(7).is_none());
    }

    #[test]
    fn test_display_with_restriction() {
        let mut bp = Breakpoint::new(VirtAddress::new(0x4000), 4, BreakpointMode::Write, 4);
        bp.restriction = Restriction::Thread {
            thread: ThreadId::new(5, 1),
            negate: true,
        };
        let text = bp.to_string();
        assert!(text.starts_with("break write access at 0x4000 len 4"));
        assert!(text.ends_with("thread!=  5.01"));
    }

    #[test]
    fn test_value_restrictions_display() {
        let mut bp = Breakpoint::new(VirtAddress::new(0x4000), 1, BreakpointMode::Instruction, 0);
        bp.restriction = Restriction::Register {
            register: "ESI",
            low: 0x10,
            high: 0x2f,
        };
        assert!(bp.to_string().ends_with(" register ESI in [00000010, 0000002f]"));
        bp.restriction = Restriction::Memory {
            address: VirtAddress::new(0x8049000),
            length: 2,
            low: 0,
            high: 0xff,
        };
        assert!(bp.to_string().ends_with(" 2-byte var at 0x8049000 in [00000000, 000000ff]"));
    }

    #[test]
    fn test_register_names() {
        assert_eq!(register_by_name("eax"), Some("EAX"));
        assert_eq!(register_by_name("Efl"), Some("EFL"));
        assert_eq!(register_by_name("eflags"), None);
        assert_eq!(register_by_name(""), None);
    }
}
