/////////////////////////////////////////
use log::debug;
/////////////////////////////////////////
use libkdb::console::Pager;
use libkdb::registry::INFO;
use libkdb::thread_id::format_optional;
use libkdb::{Action, CommandDescriptor, Env, Input, Key, Module, ThreadId, ThreadInfo};
/////////////////////////////////////////

pub struct ThreadListModule;

const THREAD_COMMANDS: &[CommandDescriptor] =
    &[cmd!(0, "l", "list", "%C", "l{r|p}\tshow ready/present list")];

impl Module for ThreadListModule {
    fn name(&self) -> &'static str {
        "threads"
    }

    fn category(&self) -> &'static str {
        INFO
    }

    fn commands(&self) -> &'static [CommandDescriptor] {
        THREAD_COMMANDS
    }

    fn action(&mut self, env: &mut Env<'_>, _command: &CommandDescriptor, input: &Input) -> Action {
        let list = match input.key(0) {
            Some(Key::Char(list @ ('p' | 'r'))) => list,
            Some(key) => return Action::Error(format!("list: unknown list {}", key)),
            None => unreachable!("%C always reads a key"),
        };
        env.console.write_char(list);
        let threads = if list == 'p' { env.target.threads() } else { ready_list(env) };
        debug!("listing {} thread(s)", threads.len());
        let current = env.session.current_thread;
        let mut pager = Pager::new(&*env.console);
        if !pager.new_line(env.console) {
            return Action::Nothing;
        }
        env.console.write_char('\n');
        for info in &threads {
            env.console.write_text(&describe(info, current));
            if !pager.new_line(env.console) {
                return Action::Nothing;
            }
            env.console.write_char('\n');
        }
        env.console.write_text(&format!("{} thread(s)", threads.len()));
        Action::Nothing
    }
}

/// Walks the ready ring forward, starting at the current thread. Stops at
/// the first thread seen twice so a broken ring still terminates.
fn ready_list(env: &Env<'_>) -> Vec<ThreadInfo> {
    let start = env.session.current_thread.unwrap_or_else(|| env.target.current_thread());
    let mut seen: Vec<ThreadId> = Vec::new();
    let mut list = Vec::new();
    let mut next = Some(start);
    while let Some(id) = next {
        if seen.contains(&id) {
            break;
        }
        seen.push(id);
        let Some(info) = env.target.lookup_thread(id) else {
            break;
        };
        // A blocked current thread is not on the ready list.
        if info.ready_next.is_none() {
            break;
        }
        next = info.ready_next;
        list.push(info);
    }
    list
}

fn describe(info: &ThreadInfo, current: Option<ThreadId>) -> String {
    format!(
        "{}{} {:<9} prio {:02x}  sp {:>12}  pager {}",
        if Some(info.id) == current { '*' } else { ' ' },
        info.id,
        info.state.to_string(),
        info.priority,
        info.stack_pointer.to_string(),
        format_optional(info.pager)
    )
}

#[cfg(test)]
mod tests {
    use crate::command::test_support::{run_script, run_script_with_height};

    #[test]
    fn test_present_list() {
        let outcome = run_script("lp");
        let output = &outcome.output;
        let order: Vec<usize> = ["  2.00 rcv_wait", "*  4.00 running", "  4.01 ready", "  5.00 ready"]
            .iter()
            .map(|line| output.find(line).expect("thread listed"))
            .collect();
        assert!(order.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(output.contains("4 thread(s)"));
    }

    #[test]
    fn test_ready_list_starts_at_current() {
        let outcome = run_script("lr");
        let output = &outcome.output;
        assert!(!output.contains("rcv_wait"));
        assert!(output.contains("3 thread(s)"));
        let current = output.find("*  4.00").expect("current listed");
        let last = output.find("  5.00 ready").expect("5.00 listed");
        assert!(current < last);
    }

    #[test]
    fn test_unknown_list() {
        let outcome = run_script("lx");
        assert!(outcome.output.contains("list: unknown list x"));
    }

    #[test]
    fn test_list_pages() {
        let outcome = run_script_with_height("lp<Esc>", 4);
        assert!(outcome.output.contains("--- CR: line, SPACE: page, ESC: abort ---"));
        assert!(!outcome.output.contains("thread(s)"));
    }
}
