use std::fmt::Display;

/// A single keystroke as delivered by a [`crate::console::Console`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Char(char),
    Return,
    Escape,
    Backspace,
    Tab,
    Up,
    Down,
    Left,
    Right,
    PageUp,
    PageDown,
    Home,
    End,
    F1,
    /// Any other control character, e.g. `Ctrl('u')` for 0x15.
    Ctrl(char),
}

impl Key {
    /// Decodes a single byte of raw terminal input. Multi-byte escape
    /// sequences for cursor keys are decoded by the console itself.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x0d | 0x0a => Key::Return,
            0x1b => Key::Escape,
            0x08 | 0x7f => Key::Backspace,
            0x09 => Key::Tab,
            0x00..=0x1f => Key::Ctrl((byte + b'a' - 1) as char),
            _ => Key::Char(byte as char),
        }
    }

    pub fn as_char(&self) -> Option<char> {
        match self {
            Key::Char(c) => Some(*c),
            _ => None,
        }
    }

    /// Printable in the sense of the input parser: graphic ASCII or space.
    pub fn is_printable(&self) -> bool {
        matches!(self, Key::Char(c) if c.is_ascii_graphic() || *c == ' ')
    }

    pub fn is_hex_digit(&self) -> bool {
        matches!(self, Key::Char(c) if c.is_ascii_hexdigit())
    }

    /// Field terminator for numeric and string input.
    pub fn terminates_field(&self) -> bool {
        matches!(self, Key::Return | Key::Char(' '))
    }
}

impl From<char> for Key {
    fn from(c: char) -> Self {
        if c.is_ascii() {
            Key::from_byte(c as u8)
        } else {
            Key::Char(c)
        }
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::Char(c) => write!(f, "{}", c),
            Key::Return => write!(f, "<Ret>"),
            Key::Escape => write!(f, "<Esc>"),
            Key::Backspace => write!(f, "<Bs>"),
            Key::Tab => write!(f, "<Tab>"),
            Key::Up => write!(f, "<Up>"),
            Key::Down => write!(f, "<Down>"),
            Key::Left => write!(f, "<Left>"),
            Key::Right => write!(f, "<Right>"),
            Key::PageUp => write!(f, "<PgUp>"),
            Key::PageDown => write!(f, "<PgDn>"),
            Key::Home => write!(f, "<Home>"),
            Key::End => write!(f, "<End>"),
            Key::F1 => write!(f, "<F1>"),
            Key::Ctrl(c) => write!(f, "^{}", c.to_ascii_uppercase()),
        }
    }
}

/// Turns a plain string into keystrokes, one per character.
pub fn keys(text: &str) -> Vec<Key> {
    text.chars().map(Key::from).collect()
}
