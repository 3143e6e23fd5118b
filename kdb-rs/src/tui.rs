/////////////////////////////////////////
use std::collections::VecDeque;
use std::fs::File;
use std::io::{Read, Stdout, Write};
use std::os::fd::AsFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
/////////////////////////////////////////
use anyhow::{Context, Result};
use colored::{ColoredString, Colorize};
use log::{debug, warn};
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::sys::termios::{LocalFlags, SetArg, Termios, cfmakeraw, tcgetattr, tcsetattr};
/////////////////////////////////////////
use libkdb::{Console, Key, Style};
/////////////////////////////////////////

/// How long a blocking read sleeps before looking at the interrupt flag.
const POLL_INTERVAL_MS: u16 = 100;
/// How long to wait for the rest of an escape sequence.
const ESCAPE_TIMEOUT_MS: u16 = 30;

fn paint(style: Style, text: &str) -> ColoredString {
    match style {
        Style::Normal => text.normal(),
        Style::Emphasis => text.bold(),
        Style::Highlight => text.yellow().bold().reversed(),
        Style::UserFrame => text.cyan().bold(),
        Style::Error => text.red().bold(),
        Style::Prompt => text.green(),
    }
}

/// The controlling terminal in raw mode. The previous terminal settings are
/// restored on drop.
pub struct TerminalConsole {
    input: File,
    output: Stdout,
    original: Termios,
    style: Style,
    height: usize,
    pending: VecDeque<u8>,
    interrupted: Arc<AtomicBool>,
}

impl TerminalConsole {
    pub fn new(height: usize, interrupted: Arc<AtomicBool>) -> Result<Self> {
        let stdin = std::io::stdin();
        let original = tcgetattr(&stdin).context("Standard input is not a terminal")?;
        let mut raw = original.clone();
        cfmakeraw(&mut raw);
        // Keep Ctrl-C as a signal so the interrupt handler sees it.
        raw.local_flags.insert(LocalFlags::ISIG);
        tcsetattr(&stdin, SetArg::TCSANOW, &raw).context("Failed to switch the terminal to raw mode")?;
        // Unbuffered reads so that poll and read agree on what is pending.
        let input = stdin
            .as_fd()
            .try_clone_to_owned()
            .map(File::from)
            .context("Failed to duplicate standard input")?;
        Ok(TerminalConsole {
            input,
            output: std::io::stdout(),
            original,
            style: Style::Normal,
            height,
            pending: VecDeque::new(),
            interrupted,
        })
    }

    /// Waits up to `timeout_ms` for input and appends what arrived.
    fn fill(&mut self, timeout_ms: u16) -> bool {
        let ready = {
            let mut fds = [PollFd::new(self.input.as_fd(), PollFlags::POLLIN)];
            match poll(&mut fds, PollTimeout::from(timeout_ms)) {
                Ok(n) => n > 0,
                Err(nix::errno::Errno::EINTR) => false,
                Err(e) => {
                    warn!("poll on terminal failed: {}", e);
                    false
                }
            }
        };
        if !ready {
            return false;
        }
        let mut buffer = [0u8; 64];
        match self.input.read(&mut buffer) {
            Ok(0) => {
                // end of input
                self.interrupted.store(true, Ordering::SeqCst);
                false
            }
            Ok(n) => {
                self.pending.extend(&buffer[..n]);
                true
            }
            Err(e) => {
                warn!("read from terminal failed: {}", e);
                false
            }
        }
    }

    fn next_byte(&mut self, timeout_ms: u16) -> Option<u8> {
        if self.pending.is_empty() {
            self.fill(timeout_ms);
        }
        self.pending.pop_front()
    }

    /// Decodes what follows an escape byte. A lone escape is the Escape key.
    fn decode_escape(&mut self) -> Option<Key> {
        let Some(introducer) = self.next_byte(ESCAPE_TIMEOUT_MS) else {
            return Some(Key::Escape);
        };
        match introducer {
            b'O' => match self.next_byte(ESCAPE_TIMEOUT_MS)? {
                b'P' => Some(Key::F1),
                b'H' => Some(Key::Home),
                b'F' => Some(Key::End),
                _ => None,
            },
            b'[' => {
                let mut parameter = String::new();
                loop {
                    let byte = self.next_byte(ESCAPE_TIMEOUT_MS)?;
                    match byte {
                        b'0'..=b'9' | b';' => parameter.push(byte as char),
                        b'A' => return Some(Key::Up),
                        b'B' => return Some(Key::Down),
                        b'C' => return Some(Key::Right),
                        b'D' => return Some(Key::Left),
                        b'H' => return Some(Key::Home),
                        b'F' => return Some(Key::End),
                        b'~' => {
                            return match parameter.as_str() {
                                "1" | "7" => Some(Key::Home),
                                "4" | "8" => Some(Key::End),
                                "5" => Some(Key::PageUp),
                                "6" => Some(Key::PageDown),
                                "11" => Some(Key::F1),
                                _ => None,
                            };
                        }
                        _ => return None,
                    }
                }
            }
            other => {
                // Escape followed by an ordinary key: deliver both.
                self.pending.push_front(other);
                Some(Key::Escape)
            }
        }
    }
}

impl Console for TerminalConsole {
    fn read_key(&mut self, blocking: bool) -> Option<Key> {
        loop {
            if self.interrupted.load(Ordering::SeqCst) {
                return None;
            }
            let timeout = if blocking { POLL_INTERVAL_MS } else { 0 };
            let Some(byte) = self.next_byte(timeout) else {
                if blocking {
                    continue;
                }
                return None;
            };
            let key = match byte {
                0x1b => self.decode_escape(),
                byte => Some(Key::from_byte(byte)),
            };
            match key {
                Some(key) => return Some(key),
                None => debug!("unknown escape sequence ignored"),
            }
        }
    }

    fn write_text(&mut self, text: &str) {
        let text = text.replace('\n', "\r\n");
        let _ = write!(self.output, "{}", paint(self.style, &text));
    }

    fn move_cursor(&mut self, row: usize, col: usize) {
        let _ = write!(self.output, "\x1b[{};{}H", row, col);
    }

    fn clear_to_eol(&mut self) {
        let _ = write!(self.output, "\x1b[K");
    }

    fn clear_screen(&mut self) {
        let _ = write!(self.output, "\x1b[2J\x1b[H");
    }

    fn set_style(&mut self, style: Style) {
        self.style = style;
    }

    fn flush(&mut self) {
        let _ = self.output.flush();
    }

    fn screen_height(&self) -> usize {
        self.height
    }
}

impl Drop for TerminalConsole {
    fn drop(&mut self) {
        let _ = write!(self.output, "\r\n");
        let _ = self.output.flush();
        if let Err(e) = tcsetattr(std::io::stdin(), SetArg::TCSANOW, &self.original) {
            eprintln!("Failed to restore terminal settings: {}", e);
        }
    }
}

/// Replays a key script and prints everything to standard output, without
/// cursor control.
pub struct ScriptConsole {
    keys: VecDeque<Key>,
    output: Stdout,
    style: Style,
    height: usize,
    interrupted: Arc<AtomicBool>,
}

impl ScriptConsole {
    pub fn new(keys: Vec<Key>, height: usize, interrupted: Arc<AtomicBool>) -> Self {
        ScriptConsole {
            keys: keys.into(),
            output: std::io::stdout(),
            style: Style::Normal,
            height,
            interrupted,
        }
    }
}

impl Console for ScriptConsole {
    fn read_key(&mut self, _blocking: bool) -> Option<Key> {
        if self.interrupted.load(Ordering::SeqCst) {
            return None;
        }
        self.keys.pop_front()
    }

    fn write_text(&mut self, text: &str) {
        let _ = write!(self.output, "{}", paint(self.style, text));
    }

    fn move_cursor(&mut self, _row: usize, _col: usize) {}

    fn set_style(&mut self, style: Style) {
        self.style = style;
    }

    fn flush(&mut self) {
        let _ = self.output.flush();
    }

    fn screen_height(&self) -> usize {
        self.height
    }
}
