/////////////////////////////////////////
use libkdb::registry::INFO;
use libkdb::thread_id::KERNEL_TASK;
use libkdb::viewer::{Geometry, MemoryView, PlainView, Region};
use libkdb::{Action, CommandDescriptor, Env, Input, Key, Module, NextStep, PAGE_SIZE, TaskId, VirtAddress};
/////////////////////////////////////////

const STAGE_ADDRESS: u32 = 1;
const STAGE_TASK: u32 = 2;

/// Pages shown by one dump view.
const DUMP_PAGES: usize = 4;

#[derive(Default)]
pub struct DumpModule {
    address: VirtAddress,
}

const DUMP_COMMANDS: &[CommandDescriptor] = &[cmd!(
    0,
    "d",
    "dump",
    "%C",
    "d<addr> <task>\tdump memory of a task\n\
     d<CR>\tdump the stack page of the current thread"
)];

impl Module for DumpModule {
    fn name(&self) -> &'static str {
        "dump"
    }

    fn category(&self) -> &'static str {
        INFO
    }

    fn commands(&self) -> &'static [CommandDescriptor] {
        DUMP_COMMANDS
    }

    fn action(&mut self, env: &mut Env<'_>, _command: &CommandDescriptor, input: &Input) -> Action {
        match input.stage {
            0 => match input.key(0) {
                Some(Key::Return) => {
                    let current = env.session.current_thread.unwrap_or_else(|| env.target.current_thread());
                    let Some(info) = env.target.lookup_thread(current) else {
                        return Action::Error(format!("no thread {}", current));
                    };
                    dump(env, info.stack_pointer, KERNEL_TASK)
                }
                Some(key) if key.is_hex_digit() => {
                    Action::ExtraInputWithNextChar(NextStep::new("%lx", STAGE_ADDRESS), key)
                }
                Some(key) => Action::Error(format!("dump: expected an address, got {}", key)),
                None => unreachable!("%C always reads a key"),
            },
            STAGE_ADDRESS => {
                self.address = VirtAddress::from(input.u64(0).unwrap_or_default());
                Action::ExtraInput(NextStep::new(" task=%x", STAGE_TASK))
            }
            STAGE_TASK => {
                let task = input.u64(0).unwrap_or_default();
                match TaskId::try_from(task) {
                    Ok(task) => dump(env, self.address, task),
                    Err(_) => Action::Error(format!("invalid task {:x}", task)),
                }
            }
            stage => unreachable!("dump has no stage {}", stage),
        }
    }
}

fn dump(env: &mut Env<'_>, address: VirtAddress, task: TaskId) -> Action {
    let region = Region {
        base: address.page_base(),
        size: DUMP_PAGES * PAGE_SIZE,
        task,
    };
    let mut view = MemoryView::new(region, Geometry::full_screen(env.config), 0);
    view.focus(address);
    view.run(env, &mut PlainView::new(format!("dump task {:x}", task)));
    Action::Nothing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::test_support::run_script;

    #[test]
    fn test_dump_user_text() {
        let outcome = run_script("d8049000 4<Ret><Esc>");
        assert!(outcome.output.contains("[dump task 4] 0x8049000"));
        // "Hello fr" as a little-endian word
        assert!(outcome.output.contains("7266206f6c6c6548"));
    }

    #[test]
    fn test_dump_char_mode() {
        let outcome = run_script("d8049000 4<Ret>mm<Esc>");
        assert!(outcome.output.contains("Hello from task "));
    }

    #[test]
    fn test_dump_unmapped_shows_placeholders() {
        let outcome = run_script("d10000000 4<Ret><Esc>");
        assert!(outcome.output.contains("................"));
    }

    #[test]
    fn test_dump_current_stack() {
        let outcome = run_script("d<Ret><Esc>");
        assert!(outcome.output.contains("[dump task 0]"));
        // user ip at the top of the block
        assert!(outcome.output.contains("0000000008048a10"));
    }

    #[test]
    fn test_edit_and_protected_page() {
        let outcome = run_script("d8049000 4<Ret>e1234<Ret><Esc>");
        assert!(outcome.output.contains("edit <0x8049000> = 0x1234"));
        assert!(outcome.output.contains("0000000000001234"));

        let outcome = run_script("df0000000 0<Ret>e1<Ret><Esc>");
        assert!(outcome.output.contains("write to 0xf0000000 rejected"));
    }

    #[test]
    fn test_bad_first_key() {
        let outcome = run_script("dz");
        assert!(outcome.output.contains("dump: expected an address, got z"));
    }

    #[test]
    fn test_drill_down_follows_user_pointer() {
        // 0x8048a10 holds a pointer to the text page; Home goes back up
        let outcome = run_script("d8048a10 4<Ret><Ret><Home><Esc>");
        assert!(outcome.output.contains("7266206f6c6c6548"));
        assert!(outcome.output.matches("[dump task 4]").count() >= 3);
    }
}
