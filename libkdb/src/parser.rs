//! Reads the fields a format string asks for from a live keystroke stream.
//!
//! Literal text is echoed as it is reached; every directive reads exactly one
//! field. Values are collected locally and only handed out once the whole
//! format has been read, so an aborted read never leaves partial results
//! behind.

use log::trace;

use crate::console::{Console, erase_char};
use crate::error::FormatError;
use crate::format::{Directive, IntSize, Radix, tokenize};
use crate::key::Key;
use crate::thread_id::ThreadId;

/// One decoded field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Key(Key),
    Signed(i64),
    Unsigned(u64),
    Thread(Option<ThreadId>),
    Text(String),
}

impl ArgValue {
    pub fn as_key(&self) -> Option<Key> {
        match self {
            ArgValue::Key(key) => Some(*key),
            _ => None,
        }
    }

    /// Integer fields as an unsigned value (signed ones reinterpreted).
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            ArgValue::Unsigned(value) => Some(*value),
            ArgValue::Signed(value) => Some(*value as u64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ArgValue::Signed(value) => Some(*value),
            ArgValue::Unsigned(value) => Some(*value as i64),
            _ => None,
        }
    }

    pub fn as_thread(&self) -> Option<ThreadId> {
        match self {
            ArgValue::Thread(id) => *id,
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ArgValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseAbort {
    /// The user pressed Escape.
    Escape,
    /// The console has no more input.
    InputClosed,
    BadFormat(FormatError),
}

/// Called after every keystroke of a `%S` field with the current text, the
/// maximum text length and the key. It may rewrite the text freely.
pub type LiveEdit<'a> = dyn FnMut(&mut String, usize, Key) + 'a;

/// Reads all fields of `format`. `first_key`, when given, is consumed as the
/// first keystroke of the first field.
pub fn read_fields(
    console: &mut dyn Console,
    format: &str,
    first_key: Option<Key>,
    live_edit: Option<&mut LiveEdit<'_>>,
) -> Result<Vec<ArgValue>, ParseAbort> {
    let mut reader = FieldReader {
        console,
        pending: first_key,
    };
    let mut live_edit = live_edit;
    let mut values = Vec::new();
    for token in tokenize(format) {
        let directive = token.map_err(ParseAbort::BadFormat)?;
        match directive {
            Directive::Literal(text) => reader.console.write_text(text),
            Directive::Percent => reader.console.write_char('%'),
            Directive::Char { echo } => values.push(reader.read_char(echo)?),
            Directive::Number { radix, width, size } => {
                values.push(reader.read_number(radix, width, size)?)
            }
            Directive::ThreadId => values.push(reader.read_thread_id()?),
            Directive::Text { width, live } => {
                let callback = if live { live_edit.as_deref_mut() } else { None };
                values.push(reader.read_text(width, callback)?)
            }
        }
    }
    trace!("read {} field(s) for format {:?}", values.len(), format);
    Ok(values)
}

struct FieldReader<'c> {
    console: &'c mut dyn Console,
    pending: Option<Key>,
}

impl FieldReader<'_> {
    fn next_key(&mut self) -> Result<Key, ParseAbort> {
        match self.pending.take() {
            Some(key) => Ok(key),
            None => self.console.read_key(true).ok_or(ParseAbort::InputClosed),
        }
    }

    fn echo(&mut self, c: char) {
        self.console.write_char(c);
    }

    fn read_char(&mut self, echo: bool) -> Result<ArgValue, ParseAbort> {
        let key = self.next_key()?;
        if key == Key::Escape {
            return Err(ParseAbort::Escape);
        }
        if echo && key.is_printable() {
            if let Some(c) = key.as_char() {
                self.echo(c);
            }
        }
        Ok(ArgValue::Key(key))
    }

    fn read_number(
        &mut self,
        radix: Radix,
        width: usize,
        size: IntSize,
    ) -> Result<ArgValue, ParseAbort> {
        self.console.write_text(radix.echo_prefix());
        let any_base = radix == Radix::Any;
        let mut base = radix.initial_base();
        let mut negative = false;
        let mut value: u64 = 0;
        // Characters accepted so far, including sign and base prefix.
        let mut position = 0usize;

        while width == 0 || position < width {
            let key = self.next_key()?;
            if key.terminates_field() {
                break;
            }
            match key {
                Key::Escape => return Err(ParseAbort::Escape),
                Key::Backspace => {
                    if position == 0 {
                        continue;
                    }
                    erase_char(self.console);
                    let start = usize::from(negative);
                    if position == 1 && negative {
                        negative = false;
                    } else if any_base && position == start + 1 && base == 8 {
                        base = 10;
                    } else if any_base && position == start + 2 && base == 16 {
                        base = 8;
                    } else {
                        value /= base;
                    }
                    position -= 1;
                }
                Key::Char('-') if radix.is_signed() && position == 0 => {
                    negative = true;
                    position += 1;
                    self.echo('-');
                }
                Key::Char('0') if any_base && position == usize::from(negative) => {
                    base = 8;
                    position += 1;
                    self.echo('0');
                }
                Key::Char(c @ ('x' | 'X'))
                    if any_base && position == usize::from(negative) + 1 && base == 8 =>
                {
                    base = 16;
                    position += 1;
                    self.echo(c);
                }
                Key::Char(c) => {
                    let Some(digit) = c.to_digit(16).map(u64::from) else {
                        continue;
                    };
                    if digit >= base {
                        continue;
                    }
                    value = value.wrapping_mul(base).wrapping_add(digit);
                    position += 1;
                    self.echo(c);
                }
                _ => {}
            }
        }

        if negative {
            value = value.wrapping_neg();
        }
        Ok(truncate(value, size, radix.is_signed()))
    }

    /// Up to four hex digits of task, an optional `.`, up to two hex digits
    /// of thread.
    fn read_thread_id(&mut self) -> Result<ArgValue, ParseAbort> {
        let mut task: u16 = 0;
        let mut task_digits = 0;
        let mut thread: u8 = 0;
        let mut thread_digits = 0;
        let mut dot = false;

        loop {
            let key = self.next_key()?;
            if key.terminates_field() {
                break;
            }
            match key {
                Key::Escape => return Err(ParseAbort::Escape),
                Key::Backspace => {
                    if thread_digits > 0 {
                        thread_digits -= 1;
                        thread /= 16;
                    } else if dot {
                        dot = false;
                    } else if task_digits > 0 {
                        task_digits -= 1;
                        task /= 16;
                    } else {
                        continue;
                    }
                    erase_char(self.console);
                }
                Key::Char('.') if !dot && task_digits > 0 => {
                    dot = true;
                    self.echo('.');
                }
                Key::Char(c) if c.is_ascii_hexdigit() => {
                    let digit = c.to_digit(16).unwrap_or(0);
                    if !dot && task_digits < 4 {
                        task = task * 16 + digit as u16;
                        task_digits += 1;
                    } else if dot && thread_digits < 2 {
                        thread = thread * 16 + digit as u8;
                        thread_digits += 1;
                    } else {
                        continue;
                    }
                    self.echo(c);
                }
                _ => {}
            }
        }

        if task_digits == 0 {
            return Ok(ArgValue::Thread(None));
        }
        Ok(ArgValue::Thread(Some(ThreadId::new(task, thread))))
    }

    fn read_text(
        &mut self,
        width: usize,
        mut live_edit: Option<&mut LiveEdit<'_>>,
    ) -> Result<ArgValue, ParseAbort> {
        let max_len = width.saturating_sub(1);
        let mut text = String::new();
        // What the screen currently shows for this field.
        let mut echoed = String::new();

        loop {
            let key = self.next_key()?;
            if key.terminates_field() {
                break;
            }
            match key {
                Key::Escape => return Err(ParseAbort::Escape),
                Key::Backspace => {
                    text.pop();
                }
                Key::Char(c) if key.is_printable() && text.len() < max_len => text.push(c),
                _ => {}
            }
            if let Some(callback) = live_edit.as_deref_mut() {
                callback(&mut text, max_len, key);
                while text.len() > max_len {
                    text.pop();
                }
            }
            self.resync(&mut echoed, &text);
        }
        Ok(ArgValue::Text(text))
    }

    /// Brings the echoed field text in line with `text`, erasing what
    /// differs and writing the new tail.
    fn resync(&mut self, echoed: &mut String, text: &str) {
        let common = echoed
            .chars()
            .zip(text.chars())
            .take_while(|(a, b)| a == b)
            .count();
        for _ in common..echoed.chars().count() {
            erase_char(self.console);
        }
        let tail: String = text.chars().skip(common).collect();
        self.console.write_text(&tail);
        echoed.clear();
        echoed.push_str(text);
    }
}

fn truncate(value: u64, size: IntSize, signed: bool) -> ArgValue {
    let bits = size.bits();
    if signed {
        let shift = 64 - bits;
        ArgValue::Signed(((value << shift) as i64) >> shift)
    } else if bits == 64 {
        ArgValue::Unsigned(value)
    } else {
        ArgValue::Unsigned(value & ((1u64 << bits) - 1))
    }
}
