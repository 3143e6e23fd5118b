use std::collections::VecDeque;

use crate::key::Key;

/// Rendering hint for the text that follows. How (and whether) a style is
/// shown is up to the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Style {
    #[default]
    Normal,
    Emphasis,
    /// The cell under the viewer cursor.
    Highlight,
    /// Words belonging to a user entry frame.
    UserFrame,
    Error,
    Prompt,
}

/// The byte-stream sink/source the debugger talks to.
///
/// All positions are 1-based, matching terminal conventions.
pub trait Console {
    /// Returns the next keystroke. A non-blocking read returns `None` when
    /// nothing is pending; a blocking read returns `None` only once the
    /// input source is closed.
    fn read_key(&mut self, blocking: bool) -> Option<Key>;

    fn write_text(&mut self, text: &str);

    fn write_char(&mut self, c: char) {
        let mut buffer = [0u8; 4];
        self.write_text(c.encode_utf8(&mut buffer));
    }

    fn move_cursor(&mut self, row: usize, col: usize);

    fn clear_to_eol(&mut self) {}

    fn clear_screen(&mut self) {}

    fn set_style(&mut self, _style: Style) {}

    fn flush(&mut self) {}

    fn screen_height(&self) -> usize {
        25
    }
}

/// Erases the character left of the cursor.
pub fn erase_char(console: &mut dyn Console) {
    console.write_text("\x08 \x08");
}

pub fn write_styled(console: &mut dyn Console, style: Style, text: &str) {
    console.set_style(style);
    console.write_text(text);
    console.set_style(Style::Normal);
}

/// Replays a fixed key sequence and records everything written.
///
/// Cursor movement is not recorded as text, so `output()` reads like the
/// plain transcript of the session.
pub struct ScriptedConsole {
    keys: VecDeque<Key>,
    output: String,
    height: usize,
    keys_read: usize,
}

impl ScriptedConsole {
    pub fn new(keys: impl IntoIterator<Item = Key>) -> Self {
        ScriptedConsole {
            keys: keys.into_iter().collect(),
            output: String::new(),
            height: 25,
            keys_read: 0,
        }
    }

    pub fn with_height(mut self, height: usize) -> Self {
        self.height = height;
        self
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn keys_remaining(&self) -> usize {
        self.keys.len()
    }

    pub fn keys_read(&self) -> usize {
        self.keys_read
    }
}

impl Console for ScriptedConsole {
    fn read_key(&mut self, _blocking: bool) -> Option<Key> {
        let key = self.keys.pop_front();
        if key.is_some() {
            self.keys_read += 1;
        }
        key
    }

    fn write_text(&mut self, text: &str) {
        self.output.push_str(text);
    }

    fn move_cursor(&mut self, _row: usize, _col: usize) {}

    fn screen_height(&self) -> usize {
        self.height
    }
}

/// Stops list output once a screen is full and asks the user how to go on.
pub struct Pager {
    line: usize,
    height: usize,
}

impl Pager {
    pub fn new(console: &dyn Console) -> Self {
        Pager {
            line: 0,
            height: console.screen_height(),
        }
    }

    /// Call before every line break. Returns `false` when the user asked to
    /// abort the output (Escape or `q`).
    pub fn new_line(&mut self, console: &mut dyn Console) -> bool {
        self.line += 1;
        if self.line <= self.height.saturating_sub(2) {
            return true;
        }
        console.write_text("--- CR: line, SPACE: page, ESC: abort ---");
        let key = console.read_key(true);
        console.write_text("\r");
        console.clear_to_eol();
        match key {
            None | Some(Key::Escape) | Some(Key::Char('q')) => {
                console.write_char('\n');
                false
            }
            Some(Key::Return) => {
                self.line -= 1;
                true
            }
            Some(_) => {
                self.line = 0;
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::keys;

    #[test]
    fn test_scripted_console_records_output() {
        let mut console = ScriptedConsole::new(keys("ab"));
        console.write_text("hello ");
        console.write_char('x');
        assert_eq!(console.read_key(true), Some(Key::Char('a')));
        assert_eq!(console.read_key(false), Some(Key::Char('b')));
        assert_eq!(console.read_key(true), None);
        assert_eq!(console.output(), "hello x");
        assert_eq!(console.keys_read(), 2);
    }

    #[test]
    fn test_pager_aborts_on_escape() {
        let mut console = ScriptedConsole::new([Key::Escape]).with_height(4);
        let mut pager = Pager::new(&console);
        assert!(pager.new_line(&mut console));
        assert!(pager.new_line(&mut console));
        assert!(!pager.new_line(&mut console));
        assert!(console.output().contains("ESC: abort"));
    }

    #[test]
    fn test_pager_space_starts_new_page() {
        let mut console = ScriptedConsole::new([Key::Char(' ')]).with_height(3);
        let mut pager = Pager::new(&console);
        assert!(pager.new_line(&mut console));
        assert!(pager.new_line(&mut console));
        assert!(pager.new_line(&mut console));
        assert_eq!(console.keys_remaining(), 0);
    }
}
