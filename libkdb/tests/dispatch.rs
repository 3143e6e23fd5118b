/////////////////////////////////////////
use std::cell::RefCell;
use std::rc::Rc;
/////////////////////////////////////////
use proptest::prelude::*;
use proptest::sample::Index;
/////////////////////////////////////////
use libkdb::{
    Action, CommandDescriptor, Debugger, DebuggerConfig, Env, Input, Key, Module, NextStep, Registry,
    ScriptedConsole, ThreadId,
    key::keys,
    registry::KeyKind,
    sim::SimTarget,
};
/////////////////////////////////////////

type CallLog = Rc<RefCell<Vec<(u32, Input)>>>;

/// Records every handler call and answers from a fixed behaviour.
struct Recorder {
    name: &'static str,
    commands: &'static [CommandDescriptor],
    calls: CallLog,
    respond: fn(&Input) -> Action,
}

impl Module for Recorder {
    fn name(&self) -> &'static str {
        self.name
    }

    fn commands(&self) -> &'static [CommandDescriptor] {
        self.commands
    }

    fn action(&mut self, _env: &mut Env<'_>, command: &CommandDescriptor, input: &Input) -> Action {
        self.calls.borrow_mut().push((command.id, input.clone()));
        (self.respond)(input)
    }
}

fn recorder(
    name: &'static str,
    commands: &'static [CommandDescriptor],
    respond: fn(&Input) -> Action,
) -> (Box<dyn Module>, CallLog) {
    let calls = CallLog::default();
    let module = Recorder {
        name,
        commands,
        calls: calls.clone(),
        respond,
    };
    (Box::new(module), calls)
}

const fn command(id: u32, short_name: &'static str, long_name: &'static str, format: &'static str) -> CommandDescriptor {
    CommandDescriptor {
        id,
        short_name,
        long_name,
        format,
        description: "",
    }
}

const TCB: &[CommandDescriptor] = &[command(0, "t", "tcb", "%C")];
const DUMP: &[CommandDescriptor] = &[command(0, "d", "dump", "%C")];

fn tcb_respond(input: &Input) -> Action {
    match (input.stage, input.key(0)) {
        (0, Some(Key::Char(c))) if c.is_ascii_hexdigit() => {
            Action::ExtraInputWithNextChar(NextStep::new("%t", 1), Key::Char(c))
        }
        _ => Action::Nothing,
    }
}

fn nothing(_input: &Input) -> Action {
    Action::Nothing
}

#[test]
fn test_next_char_is_fed_to_the_extra_input() {
    let mut registry = Registry::new();
    let (tcb, tcb_calls) = recorder("tcb", TCB, tcb_respond);
    let (dump, dump_calls) = recorder("dump", DUMP, nothing);
    registry.register(tcb).expect("register tcb");
    registry.register(dump).expect("register dump");
    let mut debugger = Debugger::new(registry, DebuggerConfig::default());

    let mut console = ScriptedConsole::new([Key::Char('t'), Key::Char('5'), Key::Return]);
    let mut target = SimTarget::demo();
    assert_eq!(debugger.enter_debugger(&mut console, &mut target, "test"), Action::Leave);

    let calls = tcb_calls.borrow();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].1.stage, 0);
    assert_eq!(calls[0].1.key(0), Some(Key::Char('5')));
    assert_eq!(calls[1].1.stage, 1);
    assert_eq!(calls[1].1.thread(0), Some(ThreadId::new(5, 0)));
    assert!(dump_calls.borrow().is_empty());
    assert_eq!(target.sessions(), 1);
    assert!(!target.in_session());
}

/// Hands over to the tcb command with the first key already typed.
struct Chain;

const CHAIN: &[CommandDescriptor] = &[command(0, "c", "chain", "")];

impl Module for Chain {
    fn name(&self) -> &'static str {
        "chain"
    }

    fn commands(&self) -> &'static [CommandDescriptor] {
        CHAIN
    }

    fn action(&mut self, env: &mut Env<'_>, _command: &CommandDescriptor, _input: &Input) -> Action {
        assert!(!env.execute_command("nope", KeyKind::Long, None));
        assert!(env.execute_command("tcb", KeyKind::Long, Some(Key::Char('5'))));
        Action::Nothing
    }
}

#[test]
fn test_chained_command_runs_before_next_top_key() {
    let mut registry = Registry::new();
    let (tcb, tcb_calls) = recorder("tcb", TCB, tcb_respond);
    let (dump, dump_calls) = recorder("dump", DUMP, nothing);
    registry.register(Box::new(Chain)).expect("register chain");
    registry.register(tcb).expect("register tcb");
    registry.register(dump).expect("register dump");
    let mut debugger = Debugger::new(registry, DebuggerConfig::default());

    // the Return ends the chained tcb's thread field, it is never a top-level key
    let mut console = ScriptedConsole::new(keys("c.2\rd\r"));
    let mut target = SimTarget::demo();
    debugger.enter_debugger(&mut console, &mut target, "test");

    let calls = tcb_calls.borrow();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].1.key(0), Some(Key::Char('5')));
    assert_eq!(calls[1].1.thread(0), Some(ThreadId::new(5, 2)));
    assert_eq!(dump_calls.borrow().len(), 1);
    assert_eq!(console.keys_remaining(), 0);
}

const COUNT: &[CommandDescriptor] = &[command(3, "x", "extra", "")];

fn count_respond(input: &Input) -> Action {
    if input.stage < ROUNDS.with(|r| *r.borrow()) {
        Action::ExtraInput(NextStep::new("", input.stage + 1))
    } else {
        Action::Nothing
    }
}

thread_local! {
    static ROUNDS: RefCell<u32> = const { RefCell::new(0) };
}

#[test]
fn test_extra_input_loop_runs_n_plus_one_times() {
    for rounds in 0..6u32 {
        ROUNDS.with(|r| *r.borrow_mut() = rounds);
        let mut registry = Registry::new();
        let (module, calls) = recorder("extra", COUNT, count_respond);
        registry.register(module).expect("register extra");
        let mut debugger = Debugger::new(registry, DebuggerConfig::default());

        let mut console = ScriptedConsole::new(keys("x"));
        let mut target = SimTarget::demo();
        debugger.enter_debugger(&mut console, &mut target, "test");

        let calls = calls.borrow();
        assert_eq!(calls.len(), rounds as usize + 1);
        let stages: Vec<u32> = calls.iter().map(|(_, input)| input.stage).collect();
        assert_eq!(stages, (0..=rounds).collect::<Vec<_>>());
        assert!(calls.iter().all(|(id, _)| *id == 3));
    }
}

const FIELDS: &[CommandDescriptor] = &[command(1, "w", "write", "%x %d %t %10s")];

fn write_session(script: Vec<Key>) -> (CallLog, ScriptedConsole) {
    let mut registry = Registry::new();
    let (module, calls) = recorder("write", FIELDS, nothing);
    registry.register(module).expect("register write");
    let mut debugger = Debugger::new(registry, DebuggerConfig::default());
    let mut console = ScriptedConsole::new(script);
    debugger.enter_debugger(&mut console, &mut SimTarget::demo(), "test");
    (calls, console)
}

proptest! {
    #[test]
    fn test_escape_never_reaches_the_handler(
        address: u32,
        count: i32,
        task: u16,
        thread: u8,
        text in "[a-z0-9]{1,9}",
        cut: Index,
    ) {
        let typed = format!("w{:x} {} {:x}.{:x} {}\r", address, count, task, thread, text);

        let cut = 1 + cut.index(typed.len() - 2);
        let mut script = keys(&typed[..cut]);
        script.push(Key::Escape);
        let (calls, console) = write_session(script);
        prop_assert!(calls.borrow().is_empty(), "handler called after escape at {}", cut);
        // back at the prompt, not stuck in the command
        prop_assert_eq!(console.keys_remaining(), 0);

        let (calls, _) = write_session(keys(&typed));
        let calls = calls.borrow();
        prop_assert_eq!(calls.len(), 1);
        let input = &calls[0].1;
        prop_assert_eq!(input.u64(0), Some(u64::from(address)));
        prop_assert_eq!(input.i64(1), Some(i64::from(count)));
        prop_assert_eq!(input.thread(2), Some(ThreadId::new(task, thread)));
        prop_assert_eq!(input.text(3), Some(text.as_str()));
    }
}

const NAMES: &[&str] = &["a", "b", "c", "d", "e", "f", "g", "h"];
const LONG_NAMES: &[&str] = &["alpha", "beta", "gamma", "delta", "eps", "phi", "go", "help"];

fn tables() -> Vec<&'static [CommandDescriptor]> {
    NAMES
        .iter()
        .zip(LONG_NAMES)
        .enumerate()
        .map(|(i, (&short, &long))| {
            let table: &'static [CommandDescriptor] =
                Box::leak(Box::new([command(i as u32, short, long, "%c")]));
            table
        })
        .collect()
}

proptest! {
    #[test]
    fn test_lookup_depends_only_on_registrations(
        order in Just((0..NAMES.len()).collect::<Vec<usize>>()).prop_shuffle(),
        count in 1..=NAMES.len(),
    ) {
        const MODULE_NAMES: &[&str] = &["m0", "m1", "m2", "m3", "m4", "m5", "m6", "m7"];
        let tables = tables();
        let build = || {
            let mut registry = Registry::new();
            for &i in &order[..count] {
                let (module, _) = recorder(MODULE_NAMES[i], tables[i], nothing);
                registry.register(module).expect("register");
            }
            registry
        };
        let first = build();
        let second = build();

        for name in NAMES.iter().chain(LONG_NAMES).chain(["zz", "", "gam"].iter()) {
            for kind in [KeyKind::Short, KeyKind::Long] {
                let expected = first.index().lookup(name, kind);
                prop_assert_eq!(first.index().lookup(name, kind), expected);
                prop_assert_eq!(second.index().lookup(name, kind), expected);
            }
        }
    }
}
