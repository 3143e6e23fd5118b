//! Kernel event tracing: trace buffer entries and the per-event-kind logging
//! switches.

use std::fmt::Display;

use crate::address::VirtAddress;
use crate::thread_id::{TaskId, ThreadId};

/// One trace buffer record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    /// Cycle counter when the event was logged.
    pub timestamp: u64,
    pub text: String,
}

impl TraceEntry {
    pub fn new(timestamp: u64, text: impl Into<String>) -> Self {
        TraceEntry {
            timestamp,
            text: text.into(),
        }
    }
}

impl Display for TraceEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// Kernel events that can be logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TraceKind {
    Ipc,
    PageFault,
    Unmap,
    NextPeriod,
}

impl TraceKind {
    pub const ALL: [TraceKind; 4] = [TraceKind::Ipc, TraceKind::PageFault, TraceKind::Unmap, TraceKind::NextPeriod];

    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Whether logging can be restricted to a task.
    pub fn has_task_filter(&self) -> bool {
        *self == TraceKind::Ipc
    }

    /// Whether logging can be restricted to an address range.
    pub fn has_address_filter(&self) -> bool {
        matches!(self, TraceKind::PageFault | TraceKind::Unmap)
    }
}

impl Display for TraceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TraceKind::Ipc => "IPC",
            TraceKind::PageFault => "pagefault",
            TraceKind::Unmap => "unmap",
            TraceKind::NextPeriod => "next period IPC",
        };
        write!(f, "{}", name)
    }
}

/// Where logged events go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogTarget {
    #[default]
    Off,
    Console,
    Buffer,
}

/// Restricts which events of a kind are logged. All set conditions must
/// hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TraceFilter {
    /// Thread and whether it is excluded rather than selected.
    pub thread: Option<(ThreadId, bool)>,
    pub task: Option<(TaskId, bool)>,
    /// Inclusive address range.
    pub address: Option<(VirtAddress, VirtAddress)>,
    /// Only log the send phase of an IPC.
    pub send_only: bool,
}

impl TraceFilter {
    pub fn is_empty(&self) -> bool {
        *self == TraceFilter::default()
    }
}

impl Display for TraceFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = |negate: bool| if negate { "!=" } else { "==" };
        if let Some((thread, negate)) = self.thread {
            write!(f, " thread{}{}", op(negate), thread)?;
        }
        if let Some((task, negate)) = self.task {
            write!(f, " task{}{:x}", op(negate), task)?;
        }
        if let Some((low, high)) = self.address {
            write!(f, " addr in [{}-{}]", low, high)?;
        }
        if self.send_only {
            write!(f, " send only")?;
        }
        Ok(())
    }
}

/// Logging switches of one event kind. The IPC path switches only apply to
/// [`TraceKind::Ipc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TraceSetting {
    pub log: LogTarget,
    /// Also log the result of the operation.
    pub results: bool,
    /// IPC through the slow path only.
    pub slow_path: bool,
    /// IPC fast path written in C instead of assembler.
    pub c_fast_path: bool,
    /// Long tracing format instead of the short log line.
    pub tracing: bool,
    pub filter: TraceFilter,
}

impl TraceSetting {
    /// One-line status as printed after every change.
    pub fn describe(&self, kind: TraceKind) -> String {
        let mut text = format!(
            "{} logging {}",
            kind,
            match self.log {
                LogTarget::Off => "disabled",
                LogTarget::Console => "enabled",
                LogTarget::Buffer => "to trace buffer",
            }
        );
        let switches = [
            (self.results, "with results"),
            (self.slow_path, "slow path"),
            (self.c_fast_path, "C fast path"),
            (self.tracing, "tracing format"),
        ];
        for (_, name) in switches.iter().filter(|(on, _)| *on) {
            text.push_str(", ");
            text.push_str(name);
        }
        if !self.filter.is_empty() {
            text.push_str(&format!(", restricted to{}", self.filter));
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe() {
        let mut setting = TraceSetting::default();
        assert_eq!(setting.describe(TraceKind::Ipc), "IPC logging disabled");

        setting.log = LogTarget::Buffer;
        setting.results = true;
        setting.filter.thread = Some((ThreadId::new(5, 1), true));
        setting.filter.send_only = true;
        assert_eq!(
            setting.describe(TraceKind::Ipc),
            "IPC logging to trace buffer, with results, restricted to thread!=  5.01 send only"
        );

        let setting = TraceSetting {
            log: LogTarget::Console,
            filter: TraceFilter {
                address: Some((VirtAddress::new(0x1000), VirtAddress::new(0x2fff))),
                ..TraceFilter::default()
            },
            ..TraceSetting::default()
        };
        assert_eq!(
            setting.describe(TraceKind::PageFault),
            "pagefault logging enabled, restricted to addr in [0x1000-0x2fff]"
        );
    }

    #[test]
    fn test_kind_filters() {
        assert!(TraceKind::Ipc.has_task_filter());
        assert!(!TraceKind::Unmap.has_task_filter());
        assert!(TraceKind::Unmap.has_address_filter());
        assert!(!TraceKind::NextPeriod.has_address_filter());
        assert_eq!(TraceKind::ALL.map(|kind| kind.index()), [0, 1, 2, 3]);
    }
}
