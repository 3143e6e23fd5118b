/////////////////////////////////////////
use log::{debug, warn};
/////////////////////////////////////////
use libkdb::breakpoint::{Breakpoint, BreakpointMode, BreakpointTable, LogMode, Restriction, register_by_name};
use libkdb::registry::DEBUGGING;
use libkdb::{Action, CommandDescriptor, Env, Input, Key, Module, NextStep, TaskId, VirtAddress};
/////////////////////////////////////////

const STAGE_ADDRESS: u32 = 1;
const STAGE_LENGTH: u32 = 2;
const STAGE_NUMBER: u32 = 3;
const STAGE_RESTRICT: u32 = 4;
const STAGE_RESTRICT_TASK: u32 = 5;
const STAGE_RESTRICT_THREAD: u32 = 6;
const STAGE_RESTRICT_REGISTER: u32 = 7;
const STAGE_RESTRICT_REGISTER_RANGE: u32 = 8;
const STAGE_RESTRICT_MEMORY: u32 = 9;

/// Breakpoints set from the debugger, kept across sessions.
#[derive(Default)]
pub struct BreakpointModule {
    table: BreakpointTable,
    command: char,
    slot: usize,
    mode: Option<BreakpointMode>,
    address: VirtAddress,
    negate: bool,
    register: &'static str,
    /// Size of the value a memory restriction compares.
    value_length: usize,
}

const BREAKPOINT_COMMANDS: &[CommandDescriptor] = &[cmd!(
    0,
    "b",
    "bp",
    "%C",
    "b{i|a|w|p}<addr>\tset breakpoint on instruction/access/write/io access\n\
     b{-|+|*}<num>\tdelete/stop at/log breakpoint\n\
     br<num>{t|T|a|A|e|1|2|4|-}\trestrict breakpoint to (!)thread/(!)task/register/memory value\n\
     bl\tlist breakpoints"
)];

impl Module for BreakpointModule {
    fn name(&self) -> &'static str {
        "breakpoints"
    }

    fn category(&self) -> &'static str {
        DEBUGGING
    }

    fn commands(&self) -> &'static [CommandDescriptor] {
        BREAKPOINT_COMMANDS
    }

    fn action(&mut self, env: &mut Env<'_>, _command: &CommandDescriptor, input: &Input) -> Action {
        match input.stage {
            0 => {
                let Some(key) = input.key(0) else {
                    unreachable!("%C always reads a key");
                };
                self.start(env, key)
            }
            STAGE_ADDRESS => {
                self.address = VirtAddress::from(input.u64(0).unwrap_or_default());
                if self.mode == Some(BreakpointMode::Instruction) {
                    return self.install(env, 1);
                }
                Action::ExtraInput(NextStep::new(" len (1, 2 or 4)=%1x", STAGE_LENGTH))
            }
            STAGE_LENGTH => {
                let length = input.u64(0).unwrap_or_default() as usize;
                if !Breakpoint::is_valid_length(length) {
                    return Action::Error(format!("invalid breakpoint length {}", length));
                }
                self.install(env, length)
            }
            STAGE_NUMBER => {
                let number = input.u64(0).unwrap_or_default() as usize;
                if !(1..=4).contains(&number) {
                    return Action::Error(format!("invalid breakpoint number {}", number));
                }
                self.slot = number - 1;
                if self.table.get(self.slot).is_none() {
                    return Action::Error(format!("breakpoint {} not set", number));
                }
                self.change(env)
            }
            STAGE_RESTRICT => match input.key(0) {
                Some(Key::Char(c @ ('t' | 'T'))) => {
                    self.negate = c == 'T';
                    let format = if self.negate { "thread!=%t\n" } else { "thread==%t\n" };
                    Action::ExtraInput(NextStep::new(format, STAGE_RESTRICT_THREAD))
                }
                Some(Key::Char(c @ ('a' | 'A'))) => {
                    self.negate = c == 'A';
                    let format = if self.negate { "task!=%3x\n" } else { "task==%3x\n" };
                    Action::ExtraInput(NextStep::new(format, STAGE_RESTRICT_TASK))
                }
                Some(Key::Char('e')) => Action::ExtraInput(NextStep::new("e reg=%4s", STAGE_RESTRICT_REGISTER)),
                Some(Key::Char(c @ ('1' | '2' | '4'))) => {
                    env.console.write_char(c);
                    self.value_length = c as usize - '0' as usize;
                    Action::ExtraInput(NextStep::new(
                        "-byte addr=%8x between[%8x-%8x]\n",
                        STAGE_RESTRICT_MEMORY,
                    ))
                }
                Some(Key::Char('-')) => {
                    env.console.write_char('\n');
                    self.restrict(env, Restriction::None)
                }
                Some(key) => Action::Error(format!("unknown restriction {}", key)),
                None => unreachable!("%C always reads a key"),
            },
            STAGE_RESTRICT_TASK => {
                let task = input.u64(0).unwrap_or_default();
                match TaskId::try_from(task) {
                    Ok(task) => self.restrict(
                        env,
                        Restriction::Task {
                            task,
                            negate: self.negate,
                        },
                    ),
                    Err(_) => Action::Error(format!("invalid task {:x}", task)),
                }
            }
            STAGE_RESTRICT_THREAD => match input.thread(0) {
                Some(thread) => self.restrict(
                    env,
                    Restriction::Thread {
                        thread,
                        negate: self.negate,
                    },
                ),
                None => Action::Error(String::from("no thread given")),
            },
            STAGE_RESTRICT_REGISTER => {
                let name = input.text(0).unwrap_or_default();
                let Some(register) = register_by_name(name) else {
                    return Action::Error(format!("unknown register \"{}\"", name));
                };
                self.register = register;
                Action::ExtraInput(NextStep::new(" in [%8x-%8x]\n", STAGE_RESTRICT_REGISTER_RANGE))
            }
            STAGE_RESTRICT_REGISTER_RANGE => self.restrict(
                env,
                Restriction::Register {
                    register: self.register,
                    low: input.u64(0).unwrap_or_default(),
                    high: input.u64(1).unwrap_or_default(),
                },
            ),
            STAGE_RESTRICT_MEMORY => self.restrict(
                env,
                Restriction::Memory {
                    address: VirtAddress::from(input.u64(0).unwrap_or_default()),
                    length: self.value_length,
                    low: input.u64(1).unwrap_or_default(),
                    high: input.u64(2).unwrap_or_default(),
                },
            ),
            stage => unreachable!("bp has no stage {}", stage),
        }
    }
}

impl BreakpointModule {
    fn start(&mut self, env: &mut Env<'_>, key: Key) -> Action {
        let Key::Char(command) = key else {
            return Action::Error(format!("unknown breakpoint command {}", key));
        };
        self.command = command;
        if let Some(mode) = BreakpointMode::from_key(command) {
            env.console.write_char(command);
            let Some(slot) = self.table.first_unused() else {
                env.console.write_text(" No breakpoints available\n");
                return Action::Nothing;
            };
            self.slot = slot;
            self.mode = Some(mode);
            return Action::ExtraInput(NextStep::new(" addr=%lx", STAGE_ADDRESS));
        }
        match command {
            'l' => {
                env.console.write_char('l');
                self.list(env);
                Action::Nothing
            }
            '-' | '+' | '*' | 'r' => {
                env.console.write_char(command);
                Action::ExtraInput(NextStep::new(" bpn=%1x", STAGE_NUMBER))
            }
            _ => Action::Error(format!("unknown breakpoint command {}", key)),
        }
    }

    fn list(&self, env: &mut Env<'_>) {
        env.console.write_char('\n');
        for (slot, breakpoint) in self.table.iter() {
            let text = match breakpoint {
                Some(breakpoint) => breakpoint.to_string(),
                None => String::from("disabled"),
            };
            env.console.write_text(&format!("  #{}: {}\n", slot + 1, text));
        }
    }

    fn install(&mut self, env: &mut Env<'_>, length: usize) -> Action {
        let Some(mode) = self.mode else {
            unreachable!("breakpoint address read without a mode");
        };
        let current = env.session.current_thread.unwrap_or_else(|| env.target.current_thread());
        let breakpoint = Breakpoint::new(self.address, length, mode, current.task);
        if !env.target.arm_breakpoint(self.slot, Some(&breakpoint)) {
            warn!("target refused {} in slot {}", breakpoint, self.slot);
            return Action::Error(format!("cannot set {}", breakpoint));
        }
        debug!("breakpoint {} set: {}", self.slot + 1, breakpoint);
        env.console.write_char('\n');
        self.table.set(self.slot, breakpoint);
        Action::Nothing
    }

    /// Runs the `-`, `+`, `*` or `r` command on `self.slot`.
    fn change(&mut self, env: &mut Env<'_>) -> Action {
        match self.command {
            '-' => {
                if let Some(breakpoint) = self.table.clear(self.slot) {
                    debug!("breakpoint {} deleted: {}", self.slot + 1, breakpoint);
                }
                if !env.target.arm_breakpoint(self.slot, None) {
                    warn!("target could not remove breakpoint {}", self.slot + 1);
                }
                env.console.write_char('\n');
                Action::Nothing
            }
            '+' | '*' => {
                let log_mode = if self.command == '*' { LogMode::Log } else { LogMode::Stop };
                self.update(env, |breakpoint| breakpoint.log_mode = log_mode)
            }
            'r' => Action::ExtraInput(NextStep::new(" %C", STAGE_RESTRICT)),
            command => unreachable!("bp {} takes no breakpoint number", command),
        }
    }

    fn restrict(&mut self, env: &mut Env<'_>, restriction: Restriction) -> Action {
        self.update(env, |breakpoint| breakpoint.restriction = restriction)
    }

    /// Changes the breakpoint in `self.slot` and re-arms it. The old
    /// settings stay if the target refuses the new ones.
    fn update(&mut self, env: &mut Env<'_>, change: impl FnOnce(&mut Breakpoint)) -> Action {
        let Some(breakpoint) = self.table.get_mut(self.slot) else {
            return Action::Error(format!("breakpoint {} not set", self.slot + 1));
        };
        let mut changed = breakpoint.clone();
        change(&mut changed);
        if !env.target.arm_breakpoint(self.slot, Some(&changed)) {
            warn!("target refused {} in slot {}", changed, self.slot);
            return Action::Error(format!("cannot set {}", changed));
        }
        *breakpoint = changed;
        env.console.write_char('\n');
        Action::Nothing
    }
}
