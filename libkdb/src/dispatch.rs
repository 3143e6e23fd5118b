//! The top-level command loop.
//!
//! A session reads one keystroke at a time, looks it up among the registered
//! short commands and runs the command: the parser reads the fields of the
//! command's format string, the module's handler runs, and as long as the
//! handler asks for more input the parser reads the next step's fields.

use std::borrow::Cow;

use log::{debug, info, warn};

use crate::config::DebuggerConfig;
use crate::console::{Console, Style, erase_char, write_styled};
use crate::key::Key;
use crate::parser::{ArgValue, LiveEdit, ParseAbort, read_fields};
use crate::registry::{CommandIndex, CommandKey, KeyKind, Module, Registry};
use crate::session::Session;
use crate::target::Target;
use crate::thread_id::ThreadId;

/// What a handler wants to happen next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Done, back to the prompt.
    Nothing,
    /// End the session.
    Leave,
    /// Pop one drill-down level. Treated like `Nothing` at the top level.
    GoBack,
    /// Invalid input; the message is shown and the command is abandoned.
    Error(String),
    /// Read the fields of another format string, then call the handler
    /// again.
    ExtraInput(NextStep),
    /// Like `ExtraInput`, with the key fed to the first field.
    ExtraInputWithNextChar(NextStep, Key),
}

/// The next input step of a multi-step command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextStep {
    pub format: Cow<'static, str>,
    /// Handed back in `Input::stage` so the handler knows where it is.
    pub stage: u32,
}

impl NextStep {
    pub fn new(format: impl Into<Cow<'static, str>>, stage: u32) -> Self {
        NextStep {
            format: format.into(),
            stage,
        }
    }
}

/// Fields read for one handler call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Input {
    pub command_id: u32,
    /// 0 for the command's own format string.
    pub stage: u32,
    pub values: Vec<ArgValue>,
}

impl Input {
    pub fn key(&self, index: usize) -> Option<Key> {
        self.values.get(index).and_then(ArgValue::as_key)
    }

    pub fn u64(&self, index: usize) -> Option<u64> {
        self.values.get(index).and_then(ArgValue::as_u64)
    }

    pub fn i64(&self, index: usize) -> Option<i64> {
        self.values.get(index).and_then(ArgValue::as_i64)
    }

    pub fn thread(&self, index: usize) -> Option<ThreadId> {
        self.values.get(index).and_then(ArgValue::as_thread)
    }

    pub fn text(&self, index: usize) -> Option<&str> {
        self.values.get(index).and_then(ArgValue::as_text)
    }
}

/// Everything a handler may touch.
pub struct Env<'a> {
    pub console: &'a mut dyn Console,
    pub target: &'a mut dyn Target,
    pub session: &'a mut Session,
    pub index: &'a CommandIndex,
    pub config: &'a DebuggerConfig,
}

impl Env<'_> {
    /// If `key` names a top-level command, makes it the next top-level
    /// keystroke and returns true. Used by views to hand over to another
    /// command.
    pub fn is_toplevel_cmd(&mut self, key: Key) -> bool {
        if self.index.lookup_key(key).is_some() {
            self.session.push_back_key(key);
            return true;
        }
        false
    }

    /// Queues the command registered under `name` to run once the current
    /// one is done, before the next top-level key is read. The first field
    /// of the queued command starts with `first_key`.
    pub fn execute_command(&mut self, name: &str, kind: KeyKind, first_key: Option<Key>) -> bool {
        match self.index.lookup(name, kind) {
            Some(command) => {
                debug!("chaining {:?} command {}", kind, name);
                self.session.queue_command(command, first_key);
                true
            }
            None => false,
        }
    }

    pub fn print_status_line(&mut self) {
        print_status_line(self.console, self.session, self.config);
    }
}

fn print_status_line(console: &mut dyn Console, session: &mut Session, config: &DebuggerConfig) {
    if let Some(message) = session.take_message() {
        console.write_char('\n');
        write_styled(console, Style::Error, &message);
    }
    console.write_char('\n');
    console.move_cursor(config.screen_height, 1);
    console.set_style(Style::Prompt);
    if let Some(thread) = session.current_thread {
        console.write_text(&format!("({}) ", thread));
    }
    console.write_text("kdb: ");
    console.set_style(Style::Normal);
    console.clear_to_eol();
    console.flush();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    AwaitingTopKey,
    Parsing(CommandKey, Option<Key>),
    Terminated,
}

pub struct Debugger {
    registry: Registry,
    config: DebuggerConfig,
    session: Session,
}

impl Debugger {
    pub fn new(registry: Registry, config: DebuggerConfig) -> Self {
        Debugger {
            registry,
            config,
            session: Session::new(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &DebuggerConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Runs one debugger session and returns once it ends, either through a
    /// command returning `Action::Leave` or because the console has no more
    /// input.
    pub fn enter_debugger(
        &mut self,
        console: &mut dyn Console,
        target: &mut dyn Target,
        reason: &str,
    ) -> Action {
        info!("entering debugger: {}", reason);
        target.save_state();
        self.session.begin(reason, Some(target.current_thread()));

        let (index, modules) = self.registry.split_mut();
        if self.session.auto_tcb {
            if let Some(tcb) = index.lookup("t", KeyKind::Short) {
                self.session.queue_command(tcb, Some(Key::Return));
            }
        }

        let mut state = State::Idle;
        loop {
            state = match state {
                State::Idle => {
                    print_status_line(console, &mut self.session, &self.config);
                    State::AwaitingTopKey
                }
                State::AwaitingTopKey => {
                    if let Some(queued) = self.session.take_queued() {
                        State::Parsing(queued.command, queued.first_key)
                    } else {
                        let key = match self.session.take_pending_key() {
                            Some(key) => Some(key),
                            None => console.read_key(true),
                        };
                        match key {
                            None => State::Terminated,
                            Some(key) => top_level_key(
                                console,
                                &mut self.session,
                                &self.config,
                                index,
                                key,
                            ),
                        }
                    }
                }
                State::Parsing(command, first_key) => {
                    let mut env = Env {
                        console: &mut *console,
                        target: &mut *target,
                        session: &mut self.session,
                        index,
                        config: &self.config,
                    };
                    let action = exec_command(&mut env, modules, command, first_key);
                    match action {
                        Action::Leave => State::Terminated,
                        Action::Error(message) => {
                            self.session.set_message(message);
                            State::Idle
                        }
                        _ if self.session.has_queued() => State::AwaitingTopKey,
                        _ => State::Idle,
                    }
                }
                State::Terminated => break,
            };
        }

        target.restore_state();
        info!("leaving debugger");
        Action::Leave
    }
}

fn top_level_key(
    console: &mut dyn Console,
    session: &mut Session,
    config: &DebuggerConfig,
    index: &CommandIndex,
    key: Key,
) -> State {
    let key = if key == Key::F1 { Key::Char('h') } else { key };
    match key {
        Key::Return | Key::Escape => return State::Idle,
        Key::Char(' ') if config.space_is_idle => return State::Idle,
        Key::Char(c) => {
            console.write_char(c);
            if let Some(command) = index.lookup_key(key) {
                session.last_command = Some(key);
                return State::Parsing(command, None);
            }
            debug!("no command bound to {:?}", key);
            erase_char(console);
        }
        _ => {}
    }
    State::AwaitingTopKey
}

/// Runs a command: reads the fields of each step and calls the handler
/// until it stops asking for input.
pub fn exec_command(
    env: &mut Env<'_>,
    modules: &mut [Box<dyn Module>],
    key: CommandKey,
    first_key: Option<Key>,
) -> Action {
    let index = env.index;
    let Some(command) = index.descriptor(key) else {
        unreachable!("command {:?} is not registered", key);
    };
    let Some(module) = modules.get_mut(key.module) else {
        unreachable!("module {} is not registered", key.module);
    };
    debug!("running {} of {}", command.long_name, module.name());

    let mut format: Cow<'static, str> = Cow::Borrowed(command.format);
    let mut stage = 0;
    let mut next_key = first_key;
    loop {
        let fields = {
            let mut live = |field: &mut String, max_len: usize, key: Key| {
                module.edit_field(index, command.id, stage, field, max_len, key)
            };
            read_fields(
                &mut *env.console,
                &format,
                next_key.take(),
                Some(&mut live as &mut LiveEdit<'_>),
            )
        };
        let values = match fields {
            Ok(values) => values,
            Err(ParseAbort::Escape) => {
                debug!("input for {} aborted", command.long_name);
                return Action::Nothing;
            }
            Err(ParseAbort::InputClosed) => return Action::Leave,
            Err(ParseAbort::BadFormat(error)) => {
                warn!("step {} of {} has a bad format: {}", stage, command.long_name, error);
                return Action::Error(format!("internal error: {}", error));
            }
        };

        let input = Input {
            command_id: command.id,
            stage,
            values,
        };
        match module.action(env, command, &input) {
            Action::ExtraInput(step) => {
                format = step.format;
                stage = step.stage;
            }
            Action::ExtraInputWithNextChar(step, key) => {
                format = step.format;
                stage = step.stage;
                next_key = Some(key);
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::ScriptedConsole;
    use crate::key::keys;
    use crate::registry::CommandDescriptor;
    use crate::sim::SimTarget;

    struct Counter {
        calls: std::rc::Rc<std::cell::Cell<usize>>,
    }

    const COUNTED: &[CommandDescriptor] = &[CommandDescriptor {
        id: 7,
        short_name: "c",
        long_name: "count",
        format: " n=%u",
        description: "c\tcount",
    }];

    impl Module for Counter {
        fn name(&self) -> &'static str {
            "counter"
        }

        fn commands(&self) -> &'static [CommandDescriptor] {
            COUNTED
        }

        fn action(&mut self, env: &mut Env<'_>, _command: &CommandDescriptor, input: &Input) -> Action {
            self.calls.set(self.calls.get() + 1);
            match input.u64(0) {
                Some(0) => Action::Leave,
                Some(n) if n > 100 => Action::Error(String::from("too big")),
                Some(n) => {
                    env.console.write_text(&format!(" got {}", n));
                    Action::Nothing
                }
                None => unreachable!(),
            }
        }
    }

    fn debugger() -> (Debugger, std::rc::Rc<std::cell::Cell<usize>>) {
        let calls = std::rc::Rc::new(std::cell::Cell::new(0));
        let mut registry = Registry::new();
        registry
            .register(Box::new(Counter { calls: calls.clone() }))
            .expect("register counter");
        (Debugger::new(registry, DebuggerConfig::default()), calls)
    }

    #[test]
    fn test_unknown_keys_are_skipped() {
        let (mut debugger, calls) = debugger();
        let mut console = ScriptedConsole::new(keys("x\x01c12\r"));
        let mut target = SimTarget::demo();
        assert_eq!(debugger.enter_debugger(&mut console, &mut target, "test"), Action::Leave);
        assert_eq!(calls.get(), 1);
        assert!(console.output().contains("x\x08 \x08c n=12 got 12"));
    }

    #[test]
    fn test_leave_ends_session() {
        let (mut debugger, calls) = debugger();
        let mut console = ScriptedConsole::new(keys("c0\rc5\r"));
        let mut target = SimTarget::demo();
        debugger.enter_debugger(&mut console, &mut target, "test");
        assert_eq!(calls.get(), 1);
        assert_eq!(console.keys_remaining(), 3);
    }

    #[test]
    fn test_error_is_reported_on_status_line() {
        let (mut debugger, calls) = debugger();
        let mut console = ScriptedConsole::new(keys("c500\r"));
        let mut target = SimTarget::demo();
        debugger.enter_debugger(&mut console, &mut target, "test");
        assert_eq!(calls.get(), 1);
        assert!(console.output().contains("too big"));
        assert_eq!(debugger.session().last_command, Some(Key::Char('c')));
    }

    #[test]
    fn test_escape_abandons_command() {
        let (mut debugger, calls) = debugger();
        let mut console = ScriptedConsole::new(keys("c4\x1bc3\r"));
        let mut target = SimTarget::demo();
        debugger.enter_debugger(&mut console, &mut target, "test");
        assert_eq!(calls.get(), 1);
        assert!(console.output().contains("got 3"));
        assert!(!console.output().contains("got 4"));
    }
}
