/////////////////////////////////////////
use libkdb::console::{Pager, write_styled};
use libkdb::registry::{CommandIndex, GENERAL, KeyKind};
use libkdb::{Action, CommandDescriptor, Console, Env, Input, Key, Module, Style};
/////////////////////////////////////////

/// Column the text after a `\t` in a help description starts at.
const TAB_WIDTH: usize = 27;

pub struct GoModule;

const GO_COMMANDS: &[CommandDescriptor] = &[cmd!(0, "g", "go", "\n", "g\tleave kernel debugger")];

impl Module for GoModule {
    fn name(&self) -> &'static str {
        "go"
    }

    fn category(&self) -> &'static str {
        GENERAL
    }

    fn commands(&self) -> &'static [CommandDescriptor] {
        GO_COMMANDS
    }

    fn action(&mut self, _env: &mut Env<'_>, _command: &CommandDescriptor, _input: &Input) -> Action {
        Action::Leave
    }
}

pub struct HelpModule;

const HELP_COMMANDS: &[CommandDescriptor] = &[cmd!(0, "h", "help", "\n", "h\tShow this help screen.")];

impl Module for HelpModule {
    fn name(&self) -> &'static str {
        "help"
    }

    fn category(&self) -> &'static str {
        GENERAL
    }

    fn commands(&self) -> &'static [CommandDescriptor] {
        HELP_COMMANDS
    }

    fn action(&mut self, env: &mut Env<'_>, _command: &CommandDescriptor, _input: &Input) -> Action {
        show_help(env);
        Action::Nothing
    }
}

fn show_help(env: &mut Env<'_>) {
    let index = env.index;
    if index.modules().is_empty() {
        env.console.write_text("There seem to be no debugger commands registered\n");
        return;
    }
    let mut pager = Pager::new(&*env.console);
    for category in index.categories() {
        let mut first = true;
        for module in index.modules_in(category.name) {
            if first {
                if !pager.new_line(env.console) {
                    return;
                }
                env.console.write_char('\n');
                write_styled(env.console, Style::Emphasis, &format!("[{}]", category.name));
                env.console.write_text(&format!(" {}", category.description));
                if !pager.new_line(env.console) {
                    return;
                }
                env.console.write_char('\n');
                first = false;
            }
            for command in module.commands.iter().filter(|c| !c.description.is_empty()) {
                if !write_description(env.console, &mut pager, command.description) {
                    return;
                }
            }
        }
    }
    if pager.new_line(env.console) {
        env.console.write_char('\n');
    }
}

/// Writes one help entry. `\t` pads to `TAB_WIDTH`, `\n` starts an indented
/// continuation line. Returns `false` once the user aborted the output.
fn write_description(console: &mut dyn Console, pager: &mut Pager, description: &str) -> bool {
    console.write_text("  ");
    let mut column = 2;
    let mut rest = description;
    while let Some(pos) = rest.find(['\n', '\t']) {
        console.write_text(&rest[..pos]);
        column += pos;
        if rest.as_bytes()[pos] == b'\n' {
            if !pager.new_line(console) {
                return false;
            }
            console.write_text("\n  ");
            column = 2;
        } else if column < TAB_WIDTH {
            console.write_text(&" ".repeat(TAB_WIDTH - column));
            column = TAB_WIDTH;
        } else {
            console.write_char(' ');
            column += 1;
        }
        rest = &rest[pos + 1..];
    }
    console.write_text(rest);
    if !pager.new_line(console) {
        return false;
    }
    console.write_char('\n');
    true
}

/// Long command mode: type the long name of any command.
pub struct LongCommandModule;

const LONG_COMMANDS: &[CommandDescriptor] = &[cmd!(
    0,
    ":",
    "cmd",
    "%24S",
    ":<name>\texecute a command by its long name\n\t<Tab> completes, ^U clears"
)];

impl Module for LongCommandModule {
    fn name(&self) -> &'static str {
        "long"
    }

    fn category(&self) -> &'static str {
        GENERAL
    }

    fn commands(&self) -> &'static [CommandDescriptor] {
        LONG_COMMANDS
    }

    fn action(&mut self, env: &mut Env<'_>, _command: &CommandDescriptor, input: &Input) -> Action {
        let name = input.text(0).unwrap_or_default().trim();
        if name.is_empty() {
            return Action::Nothing;
        }
        if !env.execute_command(name, KeyKind::Long, None) {
            return Action::Error(format!("unknown command \"{}\"", name));
        }
        env.console.write_char('\n');
        Action::Nothing
    }

    fn edit_field(
        &mut self,
        index: &CommandIndex,
        _command_id: u32,
        _stage: u32,
        field: &mut String,
        max_len: usize,
        key: Key,
    ) {
        match key {
            Key::Tab => complete(index, field, max_len),
            Key::Ctrl('u') => field.clear(),
            _ => {}
        }
    }
}

/// Extends `field` to the longest prefix shared by all long names it starts.
fn complete(index: &CommandIndex, field: &mut String, max_len: usize) {
    let candidates = index.complete_long(field);
    let Some((first, others)) = candidates.split_first() else {
        return;
    };
    let mut common = first.len();
    for other in others {
        common = first
            .bytes()
            .zip(other.bytes())
            .take(common)
            .take_while(|(a, b)| a == b)
            .count();
    }
    if common > field.len() && common <= max_len {
        *field = first[..common].to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::test_support::{run_script, run_script_with_height};
    use libkdb::ScriptedConsole;

    #[test]
    fn test_description_layout() {
        let mut console = ScriptedConsole::new([]).with_height(50);
        let mut pager = Pager::new(&console);
        assert!(write_description(&mut console, &mut pager, "t[<id>]\tshow tcb\nt{+|-}\tauto"));
        let expected = format!("  t[<id>]{}show tcb\n  t{{+|-}}{}auto\n", " ".repeat(27 - 9), " ".repeat(27 - 8));
        assert_eq!(console.output(), expected);
    }

    #[test]
    fn test_long_first_column() {
        let mut console = ScriptedConsole::new([]).with_height(50);
        let mut pager = Pager::new(&console);
        write_description(&mut console, &mut pager, "b{i|a|w|p}<addr> and more\tx");
        assert!(console.output().ends_with("more x\n"));
    }

    #[test]
    fn test_help_lists_categories_in_order() {
        let outcome = run_script_with_height("h", 80);
        let output = &outcome.output;
        let general = output.find("[GENERAL] general debugger commands").expect("GENERAL shown");
        let info = output.find("[INFO] information about kernel state").expect("INFO shown");
        let debugging = output.find("[DEBUGGING]").expect("DEBUGGING shown");
        assert!(general < info && info < debugging);
        assert!(output.contains(&format!("  g{}leave kernel debugger", " ".repeat(24))));
        assert!(!output.contains("--- CR: line"));
    }

    #[test]
    fn test_help_pages() {
        let outcome = run_script_with_height("h<Esc>", 10);
        assert!(outcome.output.contains("--- CR: line, SPACE: page, ESC: abort ---"));
        assert!(!outcome.output.contains("[DEBUGGING]"));
    }

    #[test]
    fn test_go_leaves() {
        let outcome = run_script("gh");
        assert!(!outcome.output.contains("[GENERAL]"));
        assert!(!outcome.target.in_session());
    }

    #[test]
    fn test_long_command_with_completion() {
        let outcome = run_script_with_height(":he<Tab><Ret>", 80);
        assert!(outcome.output.contains(":help"));
        assert!(outcome.output.contains("[GENERAL]"));
    }

    #[test]
    fn test_long_command_unknown() {
        let outcome = run_script(":nope<Ret>");
        assert!(outcome.output.contains("unknown command \"nope\""));
    }

    #[test]
    fn test_completion_stops_at_ambiguity() {
        let outcome = run_script(":t<Tab><Ret>");
        // tcb and tbuf share only the "t"
        assert!(outcome.output.contains("unknown command \"t\""));
    }
}
