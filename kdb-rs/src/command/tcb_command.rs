/////////////////////////////////////////
use log::debug;
/////////////////////////////////////////
use libkdb::registry::INFO;
use libkdb::target::WORD_SIZE;
use libkdb::thread_id::{KERNEL_TASK, format_optional};
use libkdb::viewer::{Geometry, KeyResult, MemoryView, Region, ViewDelegate, ViewExit};
use libkdb::{Action, CommandDescriptor, Env, Input, Key, Module, NextStep, Style, TaskId, ThreadId, ThreadInfo, VirtAddress};
/////////////////////////////////////////

const STAGE_ADDRESS: u32 = 1;
const STAGE_THREAD: u32 = 2;

/// Rows taken by the header above the stack grid.
const HEADER_ROWS: usize = 5;

pub struct TcbModule;

const TCB_COMMANDS: &[CommandDescriptor] = &[cmd!(
    0,
    "t",
    "tcb",
    "%C",
    "t[<threadid>]\tshow current/given thread control block (TCB)\n\
     t{+|-}\tshow current thread control block at every entry\n\
     t?<addr>\tshow the thread owning a TCB address"
)];

impl Module for TcbModule {
    fn name(&self) -> &'static str {
        "tcb"
    }

    fn category(&self) -> &'static str {
        INFO
    }

    fn commands(&self) -> &'static [CommandDescriptor] {
        TCB_COMMANDS
    }

    fn action(&mut self, env: &mut Env<'_>, _command: &CommandDescriptor, input: &Input) -> Action {
        match input.stage {
            0 => match input.key(0) {
                Some(Key::Return) => {
                    let current = env.session.current_thread.unwrap_or_else(|| env.target.current_thread());
                    show_tcb(env, current)
                }
                Some(Key::Char('+')) => {
                    env.session.auto_tcb = true;
                    env.console.write_text("+ auto tcb on\n");
                    Action::Nothing
                }
                Some(Key::Char('-')) => {
                    env.session.auto_tcb = false;
                    env.console.write_text("- auto tcb off\n");
                    Action::Nothing
                }
                Some(Key::Char('?')) => {
                    env.console.write_char('?');
                    Action::ExtraInput(NextStep::new(" addr=%lx => ", STAGE_ADDRESS))
                }
                Some(key) => Action::ExtraInputWithNextChar(NextStep::new("%t", STAGE_THREAD), key),
                None => unreachable!("%C always reads a key"),
            },
            STAGE_ADDRESS => {
                let address = VirtAddress::from(input.u64(0).unwrap_or_default());
                match env.target.thread_at(address) {
                    Some(info) => env.console.write_text(&format!("{}\n", info.id)),
                    None => env.console.write_text("no thread\n"),
                }
                Action::Nothing
            }
            STAGE_THREAD => {
                let id = match input.thread(0) {
                    Some(id) => id,
                    None => env.session.current_thread.unwrap_or_else(|| env.target.current_thread()),
                };
                show_tcb(env, id)
            }
            stage => unreachable!("tcb has no stage {}", stage),
        }
    }
}

/// Shows TCB views until the user leaves them; ready/present list
/// navigation switches to the neighbour thread.
fn show_tcb(env: &mut Env<'_>, mut id: ThreadId) -> Action {
    loop {
        let Some(info) = env.target.lookup_thread(id) else {
            return Action::Error(format!("no thread {}", id));
        };
        debug!("tcb view of {}", id);
        let mut delegate = TcbView {
            user_frame_start: user_frame_start(&info, env.config.frame_layout.user_frame_words),
            info,
        };
        let region = Region {
            base: delegate.info.block_base,
            size: delegate.info.block_size,
            task: KERNEL_TASK,
        };
        let mut view = MemoryView::new(region, Geometry::below(env.config, HEADER_ROWS + 2), 0);
        view.focus(delegate.info.stack_pointer);
        match view.run(env, &mut delegate) {
            ViewExit::Switch(next) => id = next,
            ViewExit::Done | ViewExit::GoBack => return Action::Nothing,
        }
    }
}

/// First address of the user entry frame at the top of the block.
fn user_frame_start(info: &ThreadInfo, words: usize) -> VirtAddress {
    let end = info.block_base + info.block_size;
    VirtAddress::new(end.get().saturating_sub(words * WORD_SIZE).max(info.block_base.get()))
}

struct TcbView {
    info: ThreadInfo,
    user_frame_start: VirtAddress,
}

impl TcbView {
    fn in_user_frame(&self, address: VirtAddress) -> bool {
        address >= self.user_frame_start && self.info.contains(address)
    }
}

impl ViewDelegate for TcbView {
    fn title(&self) -> String {
        format!("tcb {}", self.info.id)
    }

    fn draw_header(&mut self, env: &mut Env<'_>, _view: &MemoryView) {
        let info = &self.info;
        let lines = [
            format!(
                "thread: {} <{}>\tprio: {:02x}\tpager: {}",
                info.id,
                info.state,
                info.priority,
                format_optional(info.pager)
            ),
            format!("tcb: {}  kernel sp: {}", info.block_base, info.stack_pointer),
            format!(
                "ready lnk: {} {}\tpresent lnk: {} {}",
                format_optional(info.ready_next),
                format_optional(info.ready_prev),
                format_optional(info.present_next),
                format_optional(info.present_prev)
            ),
            format!("entry: {}", env.session.entry_reason),
        ];
        for (row, line) in lines.iter().enumerate() {
            env.console.move_cursor(row + 1, 1);
            env.console.write_text(line);
            env.console.clear_to_eol();
            env.console.write_char('\n');
        }
        env.console.move_cursor(HEADER_ROWS + 1, 1);
        env.console.write_text("kernel stack:\n");
    }

    fn cell_style(&self, address: VirtAddress) -> Style {
        if self.in_user_frame(address) {
            Style::UserFrame
        } else {
            Style::Normal
        }
    }

    /// Words of the user entry frame point into the thread's task.
    fn drill_task(&self, address: VirtAddress, region: &Region) -> TaskId {
        if self.in_user_frame(address) {
            self.info.id.task
        } else {
            region.task
        }
    }

    fn on_key(&mut self, env: &mut Env<'_>, _view: &mut MemoryView, key: Key) -> KeyResult {
        let list = match key {
            Key::Char('r') => 'r',
            Key::Char('p') => 'p',
            _ => return KeyResult::Ignored,
        };
        env.console.move_cursor(env.config.screen_height, 1);
        env.console.clear_to_eol();
        env.console.write_char(list);
        let Some(direction) = env.console.read_key(true) else {
            return KeyResult::Exit(ViewExit::Done);
        };
        let next = match (list, direction) {
            ('r', Key::Char('n')) => self.info.ready_next,
            ('r', Key::Char('p')) => self.info.ready_prev,
            ('p', Key::Char('n')) => self.info.present_next,
            ('p', Key::Char('p')) => self.info.present_prev,
            _ => return KeyResult::Handled,
        };
        match next {
            Some(id) => KeyResult::Exit(ViewExit::Switch(id)),
            None => {
                let name = if list == 'r' { "ready" } else { "present" };
                env.session.set_message(format!("{} not on the {} list", self.info.id, name));
                KeyResult::Handled
            }
        }
    }

    fn status_text(&self) -> &'static str {
        "e=edit m=mode r|p+p|n=ready/present prev/next"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::test_support::run_script;
    use libkdb::Target;

    #[test]
    fn test_current_tcb() {
        let outcome = run_script("t<Ret><Esc>");
        assert!(outcome.output.contains("thread:   4.00 <running>"));
        assert!(outcome.output.contains("[tcb   4.00]"));
        assert!(outcome.output.contains("pager:   2.00"));
    }

    #[test]
    fn test_given_thread() {
        let outcome = run_script("t5.0<Ret><Esc>");
        assert!(outcome.output.contains("thread:   5.00 <ready>"));
    }

    #[test]
    fn test_unknown_thread() {
        let outcome = run_script("t77.1<Ret>");
        assert!(outcome.output.contains("no thread  77.01"));
    }

    #[test]
    fn test_present_list_navigation() {
        let outcome = run_script("t<Ret>pn<Esc>");
        assert!(outcome.output.contains("thread:   4.01 <ready>"));
        let outcome = run_script("t<Ret>pp<Esc>");
        assert!(outcome.output.contains("thread:   2.00 <rcv_wait>"));
    }

    #[test]
    fn test_ready_list_skips_blocked_threads() {
        let outcome = run_script("t<Ret>rp<Esc>");
        assert!(outcome.output.contains("thread:   5.00 <ready>"));
        let outcome = run_script("t2.0<Ret>rn<Esc>");
        assert!(outcome.output.contains("not on the ready list"));
    }

    #[test]
    fn test_auto_tcb() {
        let outcome = run_script("t+");
        assert!(outcome.debugger.session().auto_tcb);
        let outcome = run_script("t+t-");
        assert!(!outcome.debugger.session().auto_tcb);
    }

    #[test]
    fn test_thread_at_address() {
        let address = libkdb::sim::SimTarget::tcb_base(ThreadId::new(5, 0)).get() + 0x40;
        let outcome = run_script(&format!("t?{:x}<Ret>", address));
        assert!(outcome.output.contains("=>   5.00"));
    }

    #[test]
    fn test_other_command_key_leaves_view() {
        let outcome = run_script("t<Ret>g");
        assert!(outcome.output.contains("[tcb   4.00]"));
        assert!(!outcome.target.in_session());
    }

    #[test]
    fn test_user_frame_is_top_of_block() {
        let info = libkdb::sim::SimTarget::demo()
            .lookup_thread(ThreadId::new(4, 0))
            .expect("demo thread");
        let start = user_frame_start(&info, 5);
        assert_eq!(start, info.block_base + (info.block_size - 5 * WORD_SIZE));
        let view = TcbView {
            info: info.clone(),
            user_frame_start: start,
        };
        assert_eq!(view.cell_style(start), Style::UserFrame);
        assert_eq!(view.cell_style(start + (WORD_SIZE * 5)), Style::Normal);
        assert_eq!(view.drill_task(start, &Region::page(start, KERNEL_TASK)), 4);
    }
}
