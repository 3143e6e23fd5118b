/////////////////////////////////////////
use log::debug;
/////////////////////////////////////////
use libkdb::registry::MONITORING;
use libkdb::trace::LogTarget;
use libkdb::{Action, CommandDescriptor, Env, Input, Key, Module, NextStep, TaskId, TraceKind, TraceSetting, VirtAddress};
/////////////////////////////////////////

const STAGE_OPTION: u32 = 1;
const STAGE_THREAD: u32 = 2;
const STAGE_TASK: u32 = 3;
const STAGE_ADDRESS: u32 = 4;

/// Switches kernel event logging on and off, per event kind.
#[derive(Default)]
pub struct TraceSetModule {
    /// The key that selected a two-key option (`r`, `R`, `S`, `C`, `T`).
    option: char,
    negate: bool,
}

const TRACE_SET_COMMANDS: &[CommandDescriptor] = &[
    cmd!(
        0,
        "I",
        "ipclog",
        "%C",
        "I{+|-|*|R{+|-}|T{+|-}}\ton/off/buffer ipc logging, on/off result, tracing\n\
         IS{+|-}\tipc without fast path on/off\n\
         IC{+|-}\tipc with C fast path / assembler fast path\n\
         Ir{t|T|a|A|s|-}\trestrict ipc log to (!)thread/(!)task/send only/clear"
    ),
    cmd!(
        1,
        "P",
        "pflog",
        "%C",
        "P{+|-|*|R{+|-}}\ton/off/buffer pagefault logging, on/off result\n\
         Pr{t|T|x|-}\trestrict pagefault log to (!)thread/address range/clear"
    ),
    cmd!(
        2,
        "U",
        "unmaplog",
        "%C",
        "U{+|-|*}\ton/off/buffer unmap logging\n\
         Ur{t|T|x|-}\trestrict unmap log to (!)thread/address range/clear"
    ),
    cmd!(3, "N", "nextperlog", "%C", "N{+|-|*}\tbuffer/off/buffer next period IPC"),
];

impl Module for TraceSetModule {
    fn name(&self) -> &'static str {
        "trace"
    }

    fn category(&self) -> &'static str {
        MONITORING
    }

    fn commands(&self) -> &'static [CommandDescriptor] {
        TRACE_SET_COMMANDS
    }

    fn action(&mut self, env: &mut Env<'_>, command: &CommandDescriptor, input: &Input) -> Action {
        let kind = match command.id {
            0 => TraceKind::Ipc,
            1 => TraceKind::PageFault,
            2 => TraceKind::Unmap,
            3 => TraceKind::NextPeriod,
            id => unreachable!("trace has no command {}", id),
        };
        let Some(mut setting) = env.target.trace_setting(kind) else {
            return Action::Error(format!("{} logging not supported", kind));
        };
        match (input.stage, input.key(0)) {
            (0, Some(key)) => match self.switch(kind, key, &mut setting) {
                Ok(None) => {}
                Ok(Some(step)) => return Action::ExtraInput(step),
                Err(action) => return action,
            },
            (STAGE_OPTION, Some(key)) => match self.option(env, kind, key, &mut setting) {
                Ok(None) => {}
                Ok(Some(step)) => return Action::ExtraInput(step),
                Err(action) => return action,
            },
            (0 | STAGE_OPTION, None) => return Action::Nothing,
            _ => {}
        }
        match input.stage {
            0 | STAGE_OPTION => {}
            STAGE_THREAD => match input.thread(0) {
                Some(thread) => setting.filter.thread = Some((thread, self.negate)),
                None => return Action::Error(String::from("no thread given")),
            },
            STAGE_TASK => {
                let task = input.u64(0).unwrap_or_default();
                match TaskId::try_from(task) {
                    Ok(task) => setting.filter.task = Some((task, self.negate)),
                    Err(_) => return Action::Error(format!("invalid task {:x}", task)),
                }
            }
            STAGE_ADDRESS => {
                let low = VirtAddress::from(input.u64(0).unwrap_or_default());
                let high = VirtAddress::from(input.u64(1).unwrap_or_default());
                setting.filter.address = Some((low, high));
            }
            stage => unreachable!("trace has no stage {}", stage),
        }
        apply(env, kind, &setting)
    }
}

impl TraceSetModule {
    /// First key: a log target, a status request or the start of a two-key
    /// option.
    fn switch(&mut self, kind: TraceKind, key: Key, setting: &mut TraceSetting) -> Result<Option<NextStep>, Action> {
        let unknown = || Action::Error(format!("unknown {} logging option {}", kind, key));
        let Key::Char(c) = key else {
            return match key {
                Key::Return => Ok(None),
                _ => Err(unknown()),
            };
        };
        match c {
            ' ' => {}
            '-' => setting.log = LogTarget::Off,
            '+' if kind == TraceKind::NextPeriod => setting.log = LogTarget::Buffer,
            '+' => setting.log = LogTarget::Console,
            '*' => setting.log = LogTarget::Buffer,
            'r' if kind != TraceKind::NextPeriod => {}
            'R' if matches!(kind, TraceKind::Ipc | TraceKind::PageFault) => {}
            'S' | 'C' | 'T' if kind == TraceKind::Ipc => {}
            _ => return Err(unknown()),
        }
        self.option = c;
        if matches!(c, 'r' | 'R' | 'S' | 'C' | 'T') {
            return Ok(Some(NextStep::new(format!("{}%C", c), STAGE_OPTION)));
        }
        Ok(None)
    }

    /// Second key of `r`, `R`, `S`, `C` or `T`.
    fn option(
        &mut self,
        env: &mut Env<'_>,
        kind: TraceKind,
        key: Key,
        setting: &mut TraceSetting,
    ) -> Result<Option<NextStep>, Action> {
        let unknown = || Action::Error(format!("unknown {} logging option {}{}", kind, self.option, key));
        let Key::Char(c) = key else {
            return Err(unknown());
        };
        if self.option == 'r' {
            return match c {
                't' | 'T' => {
                    self.negate = c == 'T';
                    env.console.write_text(" restrict to thread");
                    Ok(Some(NextStep::new(if self.negate { "!=%t" } else { "==%t" }, STAGE_THREAD)))
                }
                'a' | 'A' if kind.has_task_filter() => {
                    self.negate = c == 'A';
                    env.console.write_text(" restrict to task");
                    Ok(Some(NextStep::new(if self.negate { "!=%3x" } else { "==%3x" }, STAGE_TASK)))
                }
                'x' if kind.has_address_filter() => {
                    env.console.write_text(" restrict to addr in ");
                    Ok(Some(NextStep::new("[%p-%p]", STAGE_ADDRESS)))
                }
                's' if kind == TraceKind::Ipc => {
                    setting.filter.send_only = true;
                    Ok(None)
                }
                '-' => {
                    setting.filter = Default::default();
                    Ok(None)
                }
                _ => Err(unknown()),
            };
        }
        let on = match c {
            '+' => true,
            '-' => false,
            _ => return Err(unknown()),
        };
        env.console.write_char(c);
        match self.option {
            'R' => setting.results = on,
            'S' => setting.slow_path = on,
            'C' => setting.c_fast_path = on,
            'T' => setting.tracing = on,
            option => unreachable!("{} is not a two-key option", option),
        }
        Ok(None)
    }
}

/// Hands the changed switches to the target and shows the resulting status.
fn apply(env: &mut Env<'_>, kind: TraceKind, setting: &TraceSetting) -> Action {
    if !env.target.set_trace_setting(kind, setting) {
        return Action::Error(format!("cannot change {} logging", kind));
    }
    debug!("{:?} logging now {:?}", kind, setting);
    env.console.write_char('\n');
    env.console.write_text(&setting.describe(kind));
    Action::Nothing
}
