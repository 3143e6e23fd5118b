//! Scrollable grid view over a bounded memory region.
//!
//! The grid shows one row of `row_bytes` bytes per screen line, as words,
//! bytes or characters. Every word is checked with `Target::is_mapped` before
//! it is read; unmapped cells are drawn as a placeholder.

use log::{debug, warn};

use crate::address::{CursorAddress, PAGE_SIZE, VirtAddress};
use crate::config::DebuggerConfig;
use crate::console::{Style, write_styled};
use crate::dispatch::Env;
use crate::key::Key;
use crate::parser::{ArgValue, read_fields};
use crate::target::WORD_SIZE;
use crate::thread_id::{TaskId, ThreadId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayMode {
    #[default]
    Word,
    Byte,
    Char,
}

impl DisplayMode {
    pub fn cell_size(&self) -> usize {
        match self {
            DisplayMode::Word => WORD_SIZE,
            DisplayMode::Byte | DisplayMode::Char => 1,
        }
    }

    pub fn next(&self) -> Self {
        match self {
            DisplayMode::Word => DisplayMode::Byte,
            DisplayMode::Byte => DisplayMode::Char,
            DisplayMode::Char => DisplayMode::Word,
        }
    }

    fn placeholder(&self) -> &'static str {
        match self {
            DisplayMode::Word => "................",
            DisplayMode::Byte => "..",
            DisplayMode::Char => "-",
        }
    }
}

/// The region a view covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub base: VirtAddress,
    pub size: usize,
    pub task: TaskId,
}

impl Region {
    pub fn page(address: VirtAddress, task: TaskId) -> Self {
        Region {
            base: address.page_base(),
            size: PAGE_SIZE,
            task,
        }
    }

    pub fn contains(&self, address: VirtAddress) -> bool {
        address >= self.base && address - self.base < self.size
    }
}

/// Where on screen the grid lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub row_bytes: usize,
    pub visible_rows: usize,
    /// First screen row of the grid (1-based).
    pub top: usize,
}

impl Geometry {
    /// Grid below a one-line title, above the status line.
    pub fn full_screen(config: &DebuggerConfig) -> Self {
        Geometry {
            row_bytes: config.row_bytes,
            visible_rows: config.screen_height.saturating_sub(3).max(1),
            top: 2,
        }
    }

    /// Grid from screen row `top` down to the status line.
    pub fn below(config: &DebuggerConfig, top: usize) -> Self {
        Geometry {
            row_bytes: config.row_bytes,
            visible_rows: config.screen_height.saturating_sub(top).max(1),
            top,
        }
    }

    pub fn columns(&self, mode: DisplayMode) -> usize {
        (self.row_bytes / mode.cell_size()).max(1)
    }

    pub fn max_abs_row(&self, total_rows: usize) -> usize {
        total_rows.saturating_sub(self.visible_rows)
    }

    /// Rows actually shown when the grid starts at `abs_row`.
    pub fn lines_at(&self, abs_row: usize, total_rows: usize) -> usize {
        self.visible_rows
            .min(total_rows.saturating_sub(abs_row))
            .max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nav {
    /// The cursor moved within the visible rows.
    Moved,
    /// The visible rows changed.
    Scrolled,
    /// Not a navigation key.
    Unhandled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewState {
    /// Region row shown on the first grid line.
    pub abs_row: usize,
    pub cursor_row: usize,
    pub cursor_col: usize,
    pub mode: DisplayMode,
    /// Drill-down depth, 0 for a view opened by a command.
    pub level: usize,
}

impl ViewState {
    pub fn new(level: usize) -> Self {
        ViewState {
            level,
            ..ViewState::default()
        }
    }

    /// Applies a cursor key. The result always satisfies
    /// `abs_row <= max_abs_row` and `cursor_row < visible_rows`.
    pub fn navigate(&mut self, key: Key, geometry: &Geometry, total_rows: usize) -> Nav {
        if total_rows == 0 {
            return Nav::Unhandled;
        }
        let last_col = geometry.columns(self.mode) - 1;
        let max_abs = geometry.max_abs_row(total_rows);
        let lines = geometry.lines_at(self.abs_row, total_rows);
        let before = self.abs_row;

        match key {
            Key::Left => {
                if self.cursor_col > 0 {
                    self.cursor_col -= 1;
                } else if self.cursor_row > 0 {
                    self.cursor_row -= 1;
                    self.cursor_col = last_col;
                } else if self.abs_row > 0 {
                    self.abs_row -= 1;
                    self.cursor_col = last_col;
                }
            }
            Key::Right => {
                if self.cursor_col < last_col {
                    self.cursor_col += 1;
                } else if self.cursor_row < lines - 1 {
                    self.cursor_row += 1;
                    self.cursor_col = 0;
                } else if self.abs_row < max_abs {
                    self.abs_row += 1;
                    self.cursor_col = 0;
                }
            }
            Key::Up => {
                if self.cursor_row > 0 {
                    self.cursor_row -= 1;
                } else if self.abs_row > 0 {
                    self.abs_row -= 1;
                }
            }
            Key::Down => {
                if self.cursor_row < lines - 1 {
                    self.cursor_row += 1;
                } else if self.abs_row < max_abs {
                    self.abs_row += 1;
                }
            }
            Key::Home => {
                self.abs_row = 0;
                self.cursor_row = 0;
                self.cursor_col = 0;
            }
            Key::End => {
                self.abs_row = max_abs;
                self.cursor_row = geometry.lines_at(max_abs, total_rows) - 1;
                self.cursor_col = last_col;
            }
            Key::PageUp => {
                if self.abs_row >= lines {
                    self.abs_row -= lines;
                } else if self.abs_row > 0 {
                    self.abs_row = 0;
                } else if self.cursor_row > 0 {
                    self.cursor_row = 0;
                } else {
                    self.cursor_col = 0;
                }
            }
            Key::PageDown => {
                if self.abs_row + lines - 1 < max_abs {
                    self.abs_row += lines;
                } else if self.abs_row < max_abs {
                    self.abs_row = max_abs;
                } else if self.cursor_row < lines - 1 {
                    self.cursor_row = lines - 1;
                } else {
                    self.cursor_col = last_col;
                }
            }
            _ => return Nav::Unhandled,
        }

        self.abs_row = self.abs_row.min(max_abs);
        let lines = geometry.lines_at(self.abs_row, total_rows);
        self.cursor_row = self.cursor_row.min(lines - 1);
        self.cursor_col = self.cursor_col.min(last_col);
        if self.abs_row != before {
            Nav::Scrolled
        } else {
            Nav::Moved
        }
    }

    /// Word -> Byte -> Char -> Word. The cursor stays on the same byte of
    /// the row, aligned down to the new cell size.
    pub fn toggle_display_mode(&mut self) {
        let byte_in_row = self.cursor_col * self.mode.cell_size();
        self.mode = self.mode.next();
        self.cursor_col = byte_in_row / self.mode.cell_size();
    }
}

/// How a view leaves its key loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewExit {
    /// Back to the prompt (Escape, input closed, or a key handed over to
    /// another command).
    Done,
    /// Home at a drill-down level: back to the parent view.
    GoBack,
    /// Show another thread instead.
    Switch(ThreadId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyResult {
    Ignored,
    Handled,
    Exit(ViewExit),
}

/// Per-view customisation of a [`MemoryView`].
pub trait ViewDelegate {
    fn title(&self) -> String;

    /// Draws everything above the grid. Called on every redraw.
    #[allow(unused_variables)]
    fn draw_header(&mut self, env: &mut Env<'_>, view: &MemoryView) {}

    #[allow(unused_variables)]
    fn cell_style(&self, address: VirtAddress) -> Style {
        Style::Normal
    }

    /// Address space a drill-down from the word at `address` reads from.
    #[allow(unused_variables)]
    fn drill_task(&self, address: VirtAddress, region: &Region) -> TaskId {
        region.task
    }

    /// Keys the view itself does not handle. Cursor keys never get here.
    #[allow(unused_variables)]
    fn on_key(&mut self, env: &mut Env<'_>, view: &mut MemoryView, key: Key) -> KeyResult {
        KeyResult::Ignored
    }

    fn status_text(&self) -> &'static str {
        "e=edit m=mode <CR>=goto <Home>=back"
    }
}

/// A view without header or special cells.
pub struct PlainView {
    title: String,
}

impl PlainView {
    pub fn new(title: impl Into<String>) -> Self {
        PlainView {
            title: title.into(),
        }
    }
}

impl ViewDelegate for PlainView {
    fn title(&self) -> String {
        self.title.clone()
    }
}

pub struct MemoryView {
    region: Region,
    geometry: Geometry,
    state: ViewState,
}

impl MemoryView {
    pub fn new(region: Region, geometry: Geometry, level: usize) -> Self {
        MemoryView {
            region,
            geometry,
            state: ViewState::new(level),
        }
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ViewState {
        &mut self.state
    }

    pub fn total_rows(&self) -> usize {
        self.region.size.div_ceil(self.geometry.row_bytes.max(1))
    }

    /// Byte under the cursor.
    pub fn cursor(&self) -> CursorAddress {
        let row = self.state.abs_row + self.state.cursor_row;
        let offset = row * self.geometry.row_bytes + self.state.cursor_col * self.state.mode.cell_size();
        CursorAddress::new(self.region.base, offset, self.region.size)
    }

    /// Word containing the cursor, if it lies completely in the region.
    pub fn cursor_word(&self) -> Option<VirtAddress> {
        let cursor = self.cursor().word_aligned();
        cursor.valid().then(|| cursor.address())
    }

    /// Scrolls so that `address` is visible and puts the cursor on it.
    pub fn focus(&mut self, address: VirtAddress) {
        if !self.region.contains(address) {
            return;
        }
        let offset = address - self.region.base;
        let row = offset / self.geometry.row_bytes;
        let max_abs = self.geometry.max_abs_row(self.total_rows());
        self.state.abs_row = row.min(max_abs);
        self.state.cursor_row = row - self.state.abs_row;
        self.state.cursor_col = (offset % self.geometry.row_bytes) / self.state.mode.cell_size();
    }

    pub fn run(&mut self, env: &mut Env<'_>, delegate: &mut dyn ViewDelegate) -> ViewExit {
        loop {
            self.render(env, delegate);
            let Some(key) = env.console.read_key(true) else {
                return ViewExit::Done;
            };
            if key == Key::Home && self.state.level > 0 {
                return ViewExit::GoBack;
            }
            let total_rows = self.total_rows();
            if self.state.navigate(key, &self.geometry, total_rows) != Nav::Unhandled {
                continue;
            }
            match delegate.on_key(env, self, key) {
                KeyResult::Handled => continue,
                KeyResult::Exit(exit) => return exit,
                KeyResult::Ignored => {}
            }
            match key {
                Key::Char('m') => self.state.toggle_display_mode(),
                Key::Char('e') => self.edit(env),
                Key::Return => {
                    if let Some(exit) = self.drill_down(env, delegate) {
                        return exit;
                    }
                }
                Key::Escape => return ViewExit::Done,
                _ => {
                    if env.is_toplevel_cmd(key) {
                        return ViewExit::Done;
                    }
                }
            }
        }
    }

    /// Reads the words of one grid row, probing each before reading.
    fn read_row(&self, env: &Env<'_>, row_address: VirtAddress) -> Vec<Option<u64>> {
        let words = self.geometry.row_bytes.div_ceil(WORD_SIZE);
        (0..words)
            .map(|i| {
                let address = row_address + i * WORD_SIZE;
                if !self.region.contains(address) || !env.target.is_mapped(address, self.region.task) {
                    return None;
                }
                env.target.peek_word(address, self.region.task)
            })
            .collect()
    }

    fn render(&self, env: &mut Env<'_>, delegate: &mut dyn ViewDelegate) {
        env.console.clear_screen();
        env.console.move_cursor(1, 1);
        delegate.draw_header(env, self);

        let mode = self.state.mode;
        let columns = self.geometry.columns(mode);
        let total_rows = self.total_rows();
        for y in 0..self.geometry.visible_rows {
            env.console.move_cursor(self.geometry.top + y, 1);
            env.console.clear_to_eol();
            let row = self.state.abs_row + y;
            if row >= total_rows {
                env.console.write_char('\n');
                continue;
            }
            let row_address = self.region.base + row * self.geometry.row_bytes;
            let words = self.read_row(env, row_address);
            env.console.write_text(&format!("{:016x} ", row_address.get()));
            for x in 0..columns {
                let address = row_address + x * mode.cell_size();
                let word = words[(x * mode.cell_size()) / WORD_SIZE];
                let text = match (mode, word) {
                    (_, None) => mode.placeholder().to_string(),
                    (DisplayMode::Word, Some(value)) => format!("{:016x}", value),
                    (DisplayMode::Byte, Some(value)) => format!("{:02x}", byte_of(value, address)),
                    (DisplayMode::Char, Some(value)) => {
                        let byte = byte_of(value, address);
                        if byte.is_ascii_graphic() || byte == b' ' {
                            (byte as char).to_string()
                        } else {
                            String::from(".")
                        }
                    }
                };
                if mode != DisplayMode::Char {
                    env.console.write_char(' ');
                }
                let style = if y == self.state.cursor_row && x == self.state.cursor_col {
                    Style::Highlight
                } else {
                    delegate.cell_style(address)
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
            &format!("[{}] {} {}", delegate.title(), self.cursor().address(), delegate.status_text()),
        );
        env.console.flush();
    }

    /// Prompts for a new value of the word under the cursor. Escape keeps the
    /// old value.
    fn edit(&mut self, env: &mut Env<'_>) {
        let Some(address) = self.cursor_word() else {
            return;
        };
        let task = self.region.task;
        if !env.target.is_mapped(address, task) {
            warn!("edit of unmapped {} in task {:x} rejected", address, task);
            env.session.set_message(format!("{} not mapped, write rejected", address));
            return;
        }
        env.console.move_cursor(env.config.screen_height, 1);
        env.console.clear_to_eol();
        env.console.write_text(&format!("edit <{}> = ", address));
        let value = match read_fields(&mut *env.console, "%lx", None, None) {
            Ok(values) => values.first().and_then(ArgValue::as_u64),
            Err(_) => None,
        };
        let Some(value) = value else {
            return;
        };
        if env.target.poke_word(address, task, value) {
            debug!("wrote {:#x} to {} in task {:x}", value, address, task);
        } else {
            warn!("write to {} in task {:x} refused", address, task);
            env.session.set_message(format!("write to {} rejected", address));
        }
    }

    /// Opens a nested view on the page the word under the cursor points to.
    /// Returns how the whole view should exit, or `None` to stay.
    fn drill_down(&mut self, env: &mut Env<'_>, delegate: &mut dyn ViewDelegate) -> Option<ViewExit> {
        let address = self.cursor_word()?;
        if !env.target.is_mapped(address, self.region.task) {
            env.session.set_message(format!("{} not mapped", address));
            return None;
        }
        let value = env.target.peek_word(address, self.region.task)?;
        let destination = VirtAddress::from(value);
        let task = delegate.drill_task(address, &self.region);
        if !env.target.is_mapped(destination, task) {
            env.session.set_message(format!("{} not mapped", destination));
            return None;
        }

        debug!("drill down to {} (level {})", destination, self.state.level + 1);
        let mut nested = MemoryView::new(
            Region::page(destination, task),
            Geometry::full_screen(env.config),
            self.state.level + 1,
        );
        nested.focus(destination);
        let mut plain = PlainView::new(format!("dump task {:x}", task));
        match nested.run(env, &mut plain) {
            ViewExit::GoBack => None,
            other => Some(other),
        }
    }
}

fn byte_of(word: u64, address: VirtAddress) -> u8 {
    let shift = (address.get() % WORD_SIZE) * 8;
    (word >> shift) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(visible_rows: usize) -> Geometry {
        Geometry {
            row_bytes: 16,
            visible_rows,
            top: 2,
        }
    }

    #[test]
    fn test_right_wraps_across_rows() {
        let geometry = geometry(4);
        let mut state = ViewState::new(0);
        assert_eq!(state.navigate(Key::Right, &geometry, 256), Nav::Moved);
        assert_eq!(state.cursor_col, 1);
        assert_eq!(state.navigate(Key::Right, &geometry, 256), Nav::Moved);
        assert_eq!((state.cursor_row, state.cursor_col), (1, 0));
        assert_eq!(state.navigate(Key::Left, &geometry, 256), Nav::Moved);
        assert_eq!((state.cursor_row, state.cursor_col), (0, 1));
    }

    #[test]
    fn test_down_scrolls_at_edge() {
        let geometry = geometry(2);
        let mut state = ViewState::new(0);
        assert_eq!(state.navigate(Key::Down, &geometry, 4), Nav::Moved);
        assert_eq!(state.navigate(Key::Down, &geometry, 4), Nav::Scrolled);
        assert_eq!(state.navigate(Key::Down, &geometry, 4), Nav::Scrolled);
        assert_eq!(state.navigate(Key::Down, &geometry, 4), Nav::Moved);
        assert_eq!((state.abs_row, state.cursor_row), (2, 1));
    }

    #[test]
    fn test_page_keys_at_edges() {
        let geometry = geometry(10);
        let mut state = ViewState::new(0);
        state.cursor_row = 3;
        state.navigate(Key::PageUp, &geometry, 256);
        assert_eq!((state.abs_row, state.cursor_row), (0, 0));
        state.cursor_col = 1;
        state.navigate(Key::PageUp, &geometry, 256);
        assert_eq!(state.cursor_col, 0);

        state.navigate(Key::End, &geometry, 256);
        assert_eq!((state.abs_row, state.cursor_row, state.cursor_col), (246, 9, 1));
        state.navigate(Key::Home, &geometry, 256);
        assert_eq!((state.abs_row, state.cursor_row, state.cursor_col), (0, 0, 0));
    }

    #[test]
    fn test_short_region() {
        let geometry = geometry(10);
        let mut state = ViewState::new(0);
        for _ in 0..5 {
            state.navigate(Key::Down, &geometry, 3);
        }
        assert_eq!((state.abs_row, state.cursor_row), (0, 2));
        state.navigate(Key::PageDown, &geometry, 3);
        assert_eq!(state.cursor_col, 1);
    }

    #[test]
    fn test_toggle_display_mode_keeps_byte() {
        let mut state = ViewState::new(0);
        state.cursor_col = 1;
        state.toggle_display_mode();
        assert_eq!((state.mode, state.cursor_col), (DisplayMode::Byte, 8));
        state.cursor_col = 13;
        state.toggle_display_mode();
        assert_eq!((state.mode, state.cursor_col), (DisplayMode::Char, 13));
        state.toggle_display_mode();
        assert_eq!((state.mode, state.cursor_col), (DisplayMode::Word, 1));
    }

    #[test]
    fn test_focus_and_cursor() {
        let region = Region {
            base: VirtAddress::new(0x2000),
            size: PAGE_SIZE,
            task: 0,
        };
        let mut view = MemoryView::new(region, geometry(8), 0);
        view.focus(VirtAddress::new(0x2ff8));
        assert_eq!(view.state().abs_row, 248);
        assert_eq!(view.state().cursor_row, 7);
        assert_eq!(view.state().cursor_col, 1);
        assert_eq!(view.cursor_word(), Some(VirtAddress::new(0x2ff8)));
        view.focus(VirtAddress::new(0x3000));
        assert_eq!(view.cursor_word(), Some(VirtAddress::new(0x2ff8)));
    }

    #[test]
    fn test_byte_of_is_little_endian() {
        assert_eq!(byte_of(0x1122_3344_5566_7788, VirtAddress::new(0x1000)), 0x88);
        assert_eq!(byte_of(0x1122_3344_5566_7788, VirtAddress::new(0x1007)), 0x11);
    }
}
