use crate::key::Key;
use crate::registry::CommandKey;
use crate::thread_id::ThreadId;

/// A command queued by a handler to run right after the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedCommand {
    pub command: CommandKey,
    pub first_key: Option<Key>,
}

/// State of one debugger session. Reset whenever the debugger is entered.
#[derive(Debug, Default)]
pub struct Session {
    /// Thread the views start from.
    pub current_thread: Option<ThreadId>,
    pub entry_reason: String,
    pub last_command: Option<Key>,
    /// Show the current thread's TCB on every entry. Survives `begin`.
    pub auto_tcb: bool,
    pending_key: Option<Key>,
    queued: Option<QueuedCommand>,
    message: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, reason: &str, current_thread: Option<ThreadId>) {
        *self = Session {
            current_thread,
            entry_reason: reason.to_string(),
            auto_tcb: self.auto_tcb,
            ..Session::default()
        };
    }

    /// Makes `key` the next top-level keystroke.
    pub fn push_back_key(&mut self, key: Key) {
        self.pending_key = Some(key);
    }

    pub fn take_pending_key(&mut self) -> Option<Key> {
        self.pending_key.take()
    }

    pub fn queue_command(&mut self, command: CommandKey, first_key: Option<Key>) {
        self.queued = Some(QueuedCommand { command, first_key });
    }

    pub fn take_queued(&mut self) -> Option<QueuedCommand> {
        self.queued.take()
    }

    pub fn has_queued(&self) -> bool {
        self.queued.is_some()
    }

    /// One-line message shown with the next status line.
    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = Some(message.into());
    }

    pub fn take_message(&mut self) -> Option<String> {
        self.message.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_resets_but_keeps_auto_tcb() {
        let mut session = Session::new();
        session.auto_tcb = true;
        session.push_back_key(Key::Char('d'));
        session.set_message("old");
        session.begin("breakpoint", Some(ThreadId::new(4, 0)));
        assert!(session.auto_tcb);
        assert_eq!(session.take_pending_key(), None);
        assert_eq!(session.take_message(), None);
        assert_eq!(session.entry_reason, "breakpoint");
        assert_eq!(session.current_thread, Some(ThreadId::new(4, 0)));
    }
}
