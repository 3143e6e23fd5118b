/////////////////////////////////////////
use log::debug;
/////////////////////////////////////////
use libkdb::console::write_styled;
use libkdb::parser::read_fields;
use libkdb::registry::MONITORING;
use libkdb::viewer::{DisplayMode, Geometry, Nav, ViewState};
use libkdb::{Action, ArgValue, CommandDescriptor, Env, Input, Key, Module, Style, TraceEntry};
/////////////////////////////////////////

/// What the column right of each entry shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum TimeColumn {
    /// Nothing beyond the entry number.
    #[default]
    Index,
    /// Cycles since the previous entry.
    Delta,
    /// Cycles relative to the reference entry.
    Reference,
    /// Cycles since the oldest entry.
    Start,
}

impl TimeColumn {
    const ORDER: [TimeColumn; 4] = [TimeColumn::Index, TimeColumn::Delta, TimeColumn::Reference, TimeColumn::Start];

    fn step(self, forward: bool) -> Self {
        let position = Self::ORDER.iter().position(|&c| c == self).unwrap_or(0);
        let len = Self::ORDER.len();
        let next = if forward { (position + 1) % len } else { (position + len - 1) % len };
        Self::ORDER[next]
    }

    fn name(&self) -> &'static str {
        match self {
            TimeColumn::Index => "index",
            TimeColumn::Delta => "delta",
            TimeColumn::Reference => "ref",
            TimeColumn::Start => "start",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum TimeFormat {
    Hex,
    #[default]
    Scaled,
    Decimal,
}

impl TimeFormat {
    fn next(self) -> Self {
        match self {
            TimeFormat::Hex => TimeFormat::Scaled,
            TimeFormat::Scaled => TimeFormat::Decimal,
            TimeFormat::Decimal => TimeFormat::Hex,
        }
    }

    fn render(&self, cycles: i128) -> String {
        let sign = if cycles < 0 { "-" } else { "" };
        let magnitude = cycles.unsigned_abs();
        match self {
            TimeFormat::Hex => format!("{}{:x}", sign, magnitude),
            TimeFormat::Decimal => format!("{}{}", sign, magnitude),
            TimeFormat::Scaled => {
                let units: [(u128, &str); 3] = [(1_000_000_000, "G"), (1_000_000, "M"), (1_000, "k")];
                match units.iter().find(|(scale, _)| magnitude >= scale * 10) {
                    Some((scale, unit)) => format!("{}{}{}", sign, magnitude / scale, unit),
                    None => format!("{}{}", sign, magnitude),
                }
            }
        }
    }
}

/// Browses the kernel trace buffer one entry per line.
#[derive(Default)]
pub struct TraceBufferModule {
    /// Last search text, reused by `n`.
    pattern: String,
    backward: bool,
    column: TimeColumn,
    format: TimeFormat,
    /// Entry the reference column counts from.
    reference: usize,
}

const TRACE_COMMANDS: &[CommandDescriptor] = &[cmd!(
    0,
    "T",
    "tbuf",
    "",
    "T\tshow trace buffer\n\t/<text> search, ?<text> search backward, n next match\n\
     \tr set reference entry, c clear buffer\n\t<Left>/<Right> time column, <Space> time format"
)];

impl Module for TraceBufferModule {
    fn name(&self) -> &'static str {
        "tbuf"
    }

    fn category(&self) -> &'static str {
        MONITORING
    }

    fn commands(&self) -> &'static [CommandDescriptor] {
        TRACE_COMMANDS
    }

    fn action(&mut self, env: &mut Env<'_>, _command: &CommandDescriptor, _input: &Input) -> Action {
        let mut entries = env.target.trace_entries();
        let geometry = Geometry {
            row_bytes: 1,
            ..Geometry::full_screen(env.config)
        };
        let mut state = ViewState {
            mode: DisplayMode::Char,
            ..ViewState::new(0)
        };
        self.reference = self.reference.min(entries.len().saturating_sub(1));
        loop {
            if entries.is_empty() {
                env.console.write_text("\ntrace buffer empty");
                return Action::Nothing;
            }
            self.render(env, &entries, &geometry, &state);
            let Some(key) = env.console.read_key(true) else {
                return Action::Nothing;
            };
            match key {
                Key::Left | Key::Right => {
                    self.column = self.column.step(key == Key::Right);
                    continue;
                }
                Key::Char(' ') => {
                    if self.column != TimeColumn::Index {
                        self.format = self.format.next();
                    }
                    continue;
                }
                _ => {}
            }
            if state.navigate(key, &geometry, entries.len()) != Nav::Unhandled {
                continue;
            }
            match key {
                Key::Char(c @ ('/' | '?')) => {
                    if let Some(pattern) = read_pattern(env, c) {
                        self.pattern = pattern;
                        self.backward = c == '?';
                        self.search(env, &entries, &geometry, &mut state);
                    }
                }
                Key::Char('n') => self.search(env, &entries, &geometry, &mut state),
                Key::Char('r') => {
                    self.reference = state.abs_row + state.cursor_row;
                    debug!("trace reference entry {}", self.reference + 1);
                }
                Key::Char('c') => {
                    debug!("clearing {} trace entries", entries.len());
                    env.target.clear_trace();
                    entries = env.target.trace_entries();
                    self.reference = 0;
                    state = ViewState {
                        mode: DisplayMode::Char,
                        ..ViewState::new(0)
                    };
                }
                Key::Escape => return Action::Nothing,
                _ => {
                    if env.is_toplevel_cmd(key) {
                        return Action::Nothing;
                    }
                }
            }
        }
    }
}

impl TraceBufferModule {
    /// Moves the cursor to the next entry containing the pattern, in the
    /// last search direction, wrapping around at either end.
    fn search(&self, env: &mut Env<'_>, entries: &[TraceEntry], geometry: &Geometry, state: &mut ViewState) {
        if self.pattern.is_empty() {
            return;
        }
        let len = entries.len();
        let current = state.abs_row + state.cursor_row;
        let found = (1..=len)
            .map(|step| if self.backward { (current + len - step) % len } else { (current + step) % len })
            .find(|&line| entries[line].text.contains(self.pattern.as_str()));
        match found {
            Some(line) => {
                state.abs_row = line.min(geometry.max_abs_row(len));
                state.cursor_row = line - state.abs_row;
            }
            None => env.session.set_message(format!("\"{}\" not found", self.pattern)),
        }
    }

    fn time(&self, entries: &[TraceEntry], line: usize) -> String {
        let at = |line: usize| i128::from(entries[line].timestamp);
        let cycles = match self.column {
            TimeColumn::Index => return String::new(),
            TimeColumn::Delta => line.checked_sub(1).map_or(0, |previous| at(line) - at(previous)),
            TimeColumn::Reference => at(line) - at(self.reference),
            TimeColumn::Start => at(line) - at(0),
        };
        self.format.render(cycles)
    }

    fn render(&self, env: &mut Env<'_>, entries: &[TraceEntry], geometry: &Geometry, state: &ViewState) {
        env.console.clear_screen();
        env.console.move_cursor(1, 1);
        write_styled(env.console, Style::Emphasis, "trace buffer");
        env.console.write_char('\n');
        for y in 0..geometry.visible_rows {
            env.console.move_cursor(geometry.top + y, 1);
            env.console.clear_to_eol();
            let line = state.abs_row + y;
            if let Some(entry) = entries.get(line) {
                let text = match self.column {
                    TimeColumn::Index => format!("{:5} {}", line + 1, entry.text),
                    _ => format!("{:5} {:<56} {:>12}", line + 1, entry.text, self.time(entries, line)),
                };
                let style = if y == state.cursor_row {
                    Style::Highlight
                } else if line == self.reference && self.column == TimeColumn::Reference {
                    Style::Emphasis
                } else {
                    Style::Normal
                };
                write_styled(env.console, style, &text);
            }
            env.console.write_char('\n');
        }
        env.console.move_cursor(env.config.screen_height, 1);
        env.console.clear_to_eol();
        if let Some(message) = env.session.take_message() {
            write_styled(env.console, Style::Error, &message);
            env.console.write_char(' ');
        }
        write_styled(
            env.console,
            Style::Prompt,
            &format!(
                "[tbuf {}/{}] {} /=search ?=back n=next r=ref c=clear",
                state.abs_row + state.cursor_row + 1,
                entries.len(),
                self.column.name()
            ),
        );
        env.console.flush();
    }
}

fn read_pattern(env: &mut Env<'_>, prompt: char) -> Option<String> {
    env.console.move_cursor(env.config.screen_height, 1);
    env.console.clear_to_eol();
    env.console.write_char(prompt);
    let values = read_fields(&mut *env.console, "%24s", None, None).ok()?;
    values.first().and_then(ArgValue::as_text).map(str::to_string)
}
