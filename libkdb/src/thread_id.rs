use std::fmt::Display;

pub type TaskId = u16;

/// The kernel's own address space.
pub const KERNEL_TASK: TaskId = 0;

/// A `task.thread` pair as typed at the `%t` prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId {
    pub task: TaskId,
    pub thread: u8,
}

impl ThreadId {
    pub const fn new(task: TaskId, thread: u8) -> Self {
        ThreadId { task, thread }
    }
}

impl Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:3x}.{:02x}", self.task, self.thread)
    }
}

/// Renders an optional id the way list columns do, `---.--` when absent.
pub fn format_optional(id: Option<ThreadId>) -> String {
    match id {
        Some(id) => id.to_string(),
        None => String::from("---.--"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(ThreadId::new(0x4, 0x1).to_string(), "  4.01");
        assert_eq!(ThreadId::new(0x1ab, 0x2f).to_string(), "1ab.2f");
        assert_eq!(format_optional(None), "---.--");
    }
}
