use bitflags::bitflags;
use filament_common::actions::Charset;
use filament_common::input::{InputModes, MouseFormat, MouseMode};
use filament_common::types::{
    char_width, Cell, Color, Position, RequestOrigin, Size, TextStyle,
};
use tracing::{debug, error, trace};

use crate::events::TerminalEvent;

use super::buffer::TerminalTextBuffer;
use super::cursor::{Cursor, SavedCursor};
use super::line::erase_fill;

bitflags! {
    /// Boolean terminal modes. Mouse tracking is kept separately since
    /// it is an enumeration, not a flag.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ModeFlags: u16 {
        const AUTOWRAP           = 1 << 0;
        const ORIGIN             = 1 << 1;
        const INSERT             = 1 << 2;
        const APPLICATION_CURSOR = 1 << 3;
        const APPLICATION_KEYPAD = 1 << 4;
        const BRACKETED_PASTE    = 1 << 5;
        const FOCUS_REPORTING    = 1 << 6;
        const REVERSE_WRAPAROUND = 1 << 7;
        const CURSOR_BLINK       = 1 << 8;
    }
}

impl Default for ModeFlags {
    fn default() -> Self {
        ModeFlags::AUTOWRAP
    }
}

/// G0..G3 designations plus the GL invocation (SI/SO).
#[derive(Debug, Clone)]
pub struct CharsetState {
    slots: [Charset; 4],
    gl: usize,
}

impl Default for CharsetState {
    fn default() -> Self {
        Self {
            slots: [Charset::Ascii; 4],
            gl: 0,
        }
    }
}

impl CharsetState {
    pub fn designate(&mut self, slot: u8, charset: Charset) {
        if let Some(entry) = self.slots.get_mut(slot as usize) {
            *entry = charset;
        }
    }

    pub fn invoke_gl(&mut self, slot: usize) {
        self.gl = slot.min(3);
    }

    pub fn translate(&self, ch: char) -> char {
        match self.slots[self.gl] {
            Charset::Ascii => ch,
            Charset::UnitedKingdom => {
                if ch == '#' {
                    '£'
                } else {
                    ch
                }
            }
            Charset::DecSpecial => dec_special(ch),
        }
    }
}

/// DEC special graphics (line drawing) for GL bytes 0x60..0x7e.
fn dec_special(ch: char) -> char {
    match ch {
        '`' => '◆',
        'a' => '▒',
        'f' => '°',
        'g' => '±',
        'j' => '┘',
        'k' => '┐',
        'l' => '┌',
        'm' => '└',
        'n' => '┼',
        'o' => '⎺',
        'p' => '⎻',
        'q' => '─',
        'r' => '⎼',
        's' => '⎽',
        't' => '├',
        'u' => '┤',
        'v' => '┴',
        'w' => '┬',
        'x' => '│',
        'y' => '≤',
        'z' => '≥',
        '{' => 'π',
        '|' => '≠',
        '}' => '£',
        '~' => '·',
        _ => ch,
    }
}

/// What the type-ahead manager needs to know before predicting.
#[derive(Debug, Clone, Copy)]
pub struct PredictionContext {
    pub cursor: Position,
    pub columns: u16,
    pub style: TextStyle,
    pub autowrap: bool,
    pub alternate_screen: bool,
    pub mouse_active: bool,
    /// Cursor strictly above the scroll region's bottom margin, so a
    /// predicted echo cannot scroll.
    pub region_interior: bool,
}

/// Default xterm-ish dynamic colors.
const DEFAULT_FOREGROUND: Color = Color::Rgb(229, 229, 229);
const DEFAULT_BACKGROUND: Color = Color::Rgb(0, 0, 0);
const DEFAULT_CURSOR: Color = Color::Rgb(255, 255, 255);

/// The terminal engine: executes decoded actions against the screen
/// model and owns cursor, modes, scroll region, character sets and tab
/// stops. Shared behind one lock; see the concurrency notes on
/// [`TerminalTextBuffer`].
pub struct TerminalState {
    size: Size,
    buffer: TerminalTextBuffer,
    cursor: Cursor,
    saved_primary: Option<SavedCursor>,
    saved_alternate: Option<SavedCursor>,
    style: TextStyle,
    modes: ModeFlags,
    mouse_mode: MouseMode,
    mouse_format: MouseFormat,
    scroll_top: u16,
    scroll_bottom: u16,
    tab_stops: Vec<u16>,
    charsets: CharsetState,
    title: String,
    hyperlink: Option<String>,
    last_printed: Option<char>,
    palette: Vec<Color>,
    foreground: Color,
    background: Color,
    cursor_color: Color,
    responses: Vec<Vec<u8>>,
    pending_events: Vec<TerminalEvent>,
    disconnected: bool,
}

impl TerminalState {
    pub fn new(size: Size, history_capacity: usize) -> Self {
        debug!(?size, history_capacity, "creating terminal state");
        Self {
            size,
            buffer: TerminalTextBuffer::new(size, history_capacity),
            cursor: Cursor::new(),
            saved_primary: None,
            saved_alternate: None,
            style: TextStyle::default(),
            modes: ModeFlags::default(),
            mouse_mode: MouseMode::Off,
            mouse_format: MouseFormat::X10,
            scroll_top: 0,
            scroll_bottom: size.rows.saturating_sub(1),
            tab_stops: default_tab_stops(size.cols),
            charsets: CharsetState::default(),
            title: String::new(),
            hyperlink: None,
            last_printed: None,
            palette: default_palette(),
            foreground: DEFAULT_FOREGROUND,
            background: DEFAULT_BACKGROUND,
            cursor_color: DEFAULT_CURSOR,
            responses: Vec::new(),
            pending_events: Vec::new(),
            disconnected: false,
        }
    }

    // --- accessors ---------------------------------------------------

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn buffer(&self) -> &TerminalTextBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut TerminalTextBuffer {
        &mut self.buffer
    }

    pub fn cursor_position(&self) -> Position {
        self.cursor.position()
    }

    pub fn cursor_visible(&self) -> bool {
        self.cursor.is_visible()
    }

    pub fn pending_wrap(&self) -> bool {
        self.cursor.pending_wrap()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn style(&self) -> TextStyle {
        self.style
    }

    pub fn modes(&self) -> ModeFlags {
        self.modes
    }

    pub fn mouse_mode(&self) -> MouseMode {
        self.mouse_mode
    }

    pub fn scroll_region(&self) -> (u16, u16) {
        (self.scroll_top, self.scroll_bottom)
    }

    pub fn is_alternate(&self) -> bool {
        self.buffer.is_alternate()
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    pub fn set_disconnected(&mut self) {
        self.disconnected = true;
    }

    pub fn hyperlink(&self) -> Option<&str> {
        self.hyperlink.as_deref()
    }

    pub fn input_modes(&self) -> InputModes {
        InputModes {
            application_cursor_keys: self.modes.contains(ModeFlags::APPLICATION_CURSOR),
            application_keypad: self.modes.contains(ModeFlags::APPLICATION_KEYPAD),
            bracketed_paste: self.modes.contains(ModeFlags::BRACKETED_PASTE),
            mouse_mode: self.mouse_mode,
            mouse_format: self.mouse_format,
        }
    }

    pub fn prediction_context(&self) -> PredictionContext {
        let pos = self.cursor.position();
        PredictionContext {
            cursor: pos,
            columns: self.size.cols,
            style: self.style,
            autowrap: self.modes.contains(ModeFlags::AUTOWRAP),
            alternate_screen: self.buffer.is_alternate(),
            mouse_active: self.mouse_mode != MouseMode::Off,
            region_interior: pos.row >= self.scroll_top && pos.row < self.scroll_bottom,
        }
    }

    /// Responses the engine owes the process (CPR, DA...). Drained by
    /// the reader loop and written via the coordinator.
    pub fn take_responses(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.responses)
    }

    pub fn take_events(&mut self) -> Vec<TerminalEvent> {
        std::mem::take(&mut self.pending_events)
    }

    fn respond(&mut self, bytes: Vec<u8>) {
        self.responses.push(bytes);
    }

    // --- printing ----------------------------------------------------

    pub fn print_text(&mut self, text: &str) {
        trace!(?text, "print");
        for ch in text.chars() {
            let ch = self.charsets.translate(ch);
            self.print_char(ch);
            self.last_printed = Some(ch);
        }
    }

    fn autowrap(&self) -> bool {
        self.modes.contains(ModeFlags::AUTOWRAP)
    }

    fn print_char(&mut self, ch: char) {
        let cols = self.size.cols;
        if cols == 0 || self.size.rows == 0 {
            return;
        }
        let width = char_width(ch);

        // Deferred wrap: the previous print filled the last column; the
        // wrap executes now, constrained to the scroll region, and the
        // old line is marked as continuing.
        if self.cursor.pending_wrap() && self.autowrap() {
            let row = self.cursor.position().row;
            self.buffer.set_line_wrapped(row, true);
            self.cursor.set_column(0);
            self.index();
        }

        let mut pos = self.cursor.position();

        // A wide character that does not fit in the remaining columns
        // wraps early (or is pushed left with autowrap off).
        if width == 2 && pos.col + 1 >= cols {
            if self.autowrap() {
                self.buffer
                    .write_cell(pos.row, pos.col, erase_fill(self.style));
                self.buffer.set_line_wrapped(pos.row, true);
                self.cursor.set_column(0);
                self.index();
            } else {
                self.cursor.set_column(cols.saturating_sub(2));
            }
            pos = self.cursor.position();
        }

        if self.modes.contains(ModeFlags::INSERT) {
            self.buffer
                .insert_cells(pos.row, pos.col, width, erase_fill(self.style));
        }

        self.buffer
            .write_cell(pos.row, pos.col, Cell::styled(ch, self.style));
        if width == 2 {
            self.buffer
                .write_cell(pos.row, pos.col + 1, Cell::wide_continuation(self.style));
        }

        let end = u32::from(pos.col) + u32::from(width);
        if end >= u32::from(cols) {
            self.cursor.set_column(cols - 1);
            if self.autowrap() {
                self.cursor.set_pending_wrap(true);
            }
        } else {
            self.cursor.set_column(end as u16);
        }
    }

    /// REP: re-print the last graphic character.
    pub fn repeat_last(&mut self, count: u16) {
        if let Some(ch) = self.last_printed {
            for _ in 0..count {
                self.print_char(ch);
            }
        }
    }

    // --- C0 ----------------------------------------------------------

    pub fn line_feed(&mut self) {
        self.index();
    }

    pub fn carriage_return(&mut self) {
        self.cursor.set_column(0);
    }

    pub fn backspace(&mut self) {
        let pos = self.cursor.position();
        if pos.col > 0 {
            self.cursor.move_left(1);
        } else if self.modes.contains(ModeFlags::REVERSE_WRAPAROUND)
            && self.autowrap()
            && pos.row > self.scroll_top
        {
            self.cursor
                .set_position(Position::new(pos.row - 1, self.size.cols - 1));
        }
    }

    pub fn horizontal_tab(&mut self) {
        let col = self.cursor.position().col;
        let next = self
            .tab_stops
            .iter()
            .copied()
            .find(|&stop| stop > col)
            .unwrap_or(self.size.cols.saturating_sub(1));
        self.cursor.set_column(next.min(self.size.cols.saturating_sub(1)));
    }

    pub fn bell(&mut self) {
        self.pending_events.push(TerminalEvent::Bell);
    }

    pub fn shift_out(&mut self) {
        self.charsets.invoke_gl(1);
    }

    pub fn shift_in(&mut self) {
        self.charsets.invoke_gl(0);
    }

    // --- cursor motion -----------------------------------------------

    /// Top margin for upward motion: the scroll region confines the
    /// cursor only while it is inside the region.
    fn top_limit(&self) -> u16 {
        if self.cursor.position().row >= self.scroll_top {
            self.scroll_top
        } else {
            0
        }
    }

    fn bottom_limit(&self) -> u16 {
        if self.cursor.position().row <= self.scroll_bottom {
            self.scroll_bottom
        } else {
            self.size.rows.saturating_sub(1)
        }
    }

    pub fn cursor_up(&mut self, n: u16) {
        let limit = self.top_limit();
        self.cursor.move_up(n, limit);
    }

    pub fn cursor_down(&mut self, n: u16) {
        let limit = self.bottom_limit();
        self.cursor.move_down(n, limit);
    }

    pub fn cursor_forward(&mut self, n: u16) {
        self.cursor.move_right(n, self.size.cols.saturating_sub(1));
    }

    pub fn cursor_backward(&mut self, n: u16) {
        self.cursor.move_left(n);
    }

    pub fn cursor_next_line(&mut self, n: u16) {
        self.cursor_down(n);
        self.cursor.set_column(0);
    }

    pub fn cursor_preceding_line(&mut self, n: u16) {
        self.cursor_up(n);
        self.cursor.set_column(0);
    }

    /// CHA/HPA, 0-based.
    pub fn cursor_column(&mut self, col: u16) {
        self.cursor
            .set_column(col.min(self.size.cols.saturating_sub(1)));
    }

    /// VPA, 0-based, origin-aware.
    pub fn cursor_row(&mut self, row: u16) {
        let row = if self.modes.contains(ModeFlags::ORIGIN) {
            self.scroll_top.saturating_add(row).min(self.scroll_bottom)
        } else {
            row.min(self.size.rows.saturating_sub(1))
        };
        self.cursor.set_row(row);
    }

    /// CUP/HVP, 0-based, origin-aware.
    pub fn set_cursor_position(&mut self, row: u16, col: u16) {
        let row = if self.modes.contains(ModeFlags::ORIGIN) {
            self.scroll_top.saturating_add(row).min(self.scroll_bottom)
        } else {
            row.min(self.size.rows.saturating_sub(1))
        };
        let col = col.min(self.size.cols.saturating_sub(1));
        self.cursor.set_position(Position::new(row, col));
    }

    /// ESC D / LF: down one row, scrolling the region at its bottom.
    pub fn index(&mut self) {
        let row = self.cursor.position().row;
        if row == self.scroll_bottom {
            self.buffer
                .scroll_area(self.scroll_top, self.scroll_bottom, 1);
            self.cursor.set_pending_wrap(false);
        } else if row < self.size.rows.saturating_sub(1) {
            self.cursor.set_row(row + 1);
        }
    }

    /// ESC M: up one row, scrolling down at the region top.
    pub fn reverse_index(&mut self) {
        let row = self.cursor.position().row;
        if row == self.scroll_top {
            self.buffer
                .scroll_area(self.scroll_top, self.scroll_bottom, -1);
            self.cursor.set_pending_wrap(false);
        } else if row > 0 {
            self.cursor.set_row(row - 1);
        }
    }

    /// ESC E
    pub fn next_line(&mut self) {
        self.index();
        self.cursor.set_column(0);
    }

    // --- tab stops ---------------------------------------------------

    pub fn tab_set(&mut self) {
        let col = self.cursor.position().col;
        if !self.tab_stops.contains(&col) {
            self.tab_stops.push(col);
            self.tab_stops.sort_unstable();
        }
    }

    /// TBC: 0 clears the stop at the cursor, 3 clears all.
    pub fn tab_clear(&mut self, selector: u16) {
        match selector {
            0 => {
                let col = self.cursor.position().col;
                self.tab_stops.retain(|&stop| stop != col);
            }
            3 => self.tab_stops.clear(),
            _ => debug!(selector, "unhandled TBC selector"),
        }
    }

    pub fn cursor_forward_tab(&mut self, n: u16) {
        for _ in 0..n {
            self.horizontal_tab();
        }
    }

    pub fn cursor_backward_tab(&mut self, n: u16) {
        for _ in 0..n {
            let col = self.cursor.position().col;
            let prev = self
                .tab_stops
                .iter()
                .rev()
                .copied()
                .find(|&stop| stop < col)
                .unwrap_or(0);
            self.cursor.set_column(prev);
        }
    }

    // --- erasing and editing -----------------------------------------

    fn fill_cell(&self) -> Cell {
        erase_fill(self.style)
    }

    pub fn erase_display(&mut self, mode: filament_common::actions::EraseMode) {
        use filament_common::actions::EraseMode;
        let pos = self.cursor.position();
        let last_col = self.size.cols.saturating_sub(1);
        let last_row = self.size.rows.saturating_sub(1);
        let fill = self.fill_cell();
        match mode {
            EraseMode::ToEnd => {
                self.buffer.clear_area(pos.col, pos.row, last_col, pos.row, fill);
                if pos.row < last_row {
                    self.buffer.clear_area(0, pos.row + 1, last_col, last_row, fill);
                }
            }
            EraseMode::ToStart => {
                if pos.row > 0 {
                    self.buffer.clear_area(0, 0, last_col, pos.row - 1, fill);
                }
                self.buffer.clear_area(0, pos.row, pos.col, pos.row, fill);
            }
            EraseMode::All => {
                self.buffer.clear_area(0, 0, last_col, last_row, fill);
            }
            EraseMode::Saved => {
                self.buffer.clear_history();
            }
        }
    }

    pub fn erase_line(&mut self, mode: filament_common::actions::EraseMode) {
        use filament_common::actions::EraseMode;
        let pos = self.cursor.position();
        let last_col = self.size.cols.saturating_sub(1);
        let fill = self.fill_cell();
        match mode {
            EraseMode::ToEnd => {
                self.buffer.clear_area(pos.col, pos.row, last_col, pos.row, fill)
            }
            EraseMode::ToStart => self.buffer.clear_area(0, pos.row, pos.col, pos.row, fill),
            EraseMode::All | EraseMode::Saved => {
                self.buffer.clear_area(0, pos.row, last_col, pos.row, fill)
            }
        }
    }

    pub fn insert_lines(&mut self, count: u16) {
        let row = self.cursor.position().row;
        if row < self.scroll_top || row > self.scroll_bottom {
            return;
        }
        self.buffer.insert_lines(row, count, self.scroll_bottom);
        self.cursor.set_column(0);
    }

    pub fn delete_lines(&mut self, count: u16) {
        let row = self.cursor.position().row;
        if row < self.scroll_top || row > self.scroll_bottom {
            return;
        }
        self.buffer.delete_lines(row, count, self.scroll_bottom);
        self.cursor.set_column(0);
    }

    pub fn insert_characters(&mut self, count: u16) {
        let pos = self.cursor.position();
        let fill = self.fill_cell();
        self.buffer.insert_cells(pos.row, pos.col, count, fill);
    }

    pub fn delete_characters(&mut self, count: u16) {
        let pos = self.cursor.position();
        let fill = self.fill_cell();
        self.buffer.delete_cells(pos.row, pos.col, count, fill);
    }

    pub fn erase_characters(&mut self, count: u16) {
        let pos = self.cursor.position();
        let fill = self.fill_cell();
        self.buffer.erase_cells(pos.row, pos.col, count, fill);
    }

    pub fn scroll_up(&mut self, count: u16) {
        self.buffer
            .scroll_area(self.scroll_top, self.scroll_bottom, count as i32);
    }

    pub fn scroll_down(&mut self, count: u16) {
        self.buffer
            .scroll_area(self.scroll_top, self.scroll_bottom, -(count as i32));
    }

    /// DECSTBM, 0-based inclusive bounds. Homes the cursor.
    pub fn set_scroll_region(&mut self, top: u16, bottom: u16) {
        let bottom = bottom.min(self.size.rows.saturating_sub(1));
        if top >= bottom {
            debug!(top, bottom, "invalid scroll region ignored");
            return;
        }
        self.scroll_top = top;
        self.scroll_bottom = bottom;
        self.set_cursor_position(0, 0);
    }

    // --- SGR ---------------------------------------------------------

    pub fn apply_sgr(&mut self, attrs: &[filament_common::actions::SgrAttribute]) {
        use filament_common::actions::SgrAttribute;
        use filament_common::types::AttributeFlags as F;
        for attr in attrs {
            match attr {
                SgrAttribute::Reset => self.style = TextStyle::default(),
                SgrAttribute::Bold => self.style.flags |= F::BOLD,
                SgrAttribute::Dim => self.style.flags |= F::DIM,
                SgrAttribute::Italic => self.style.flags |= F::ITALIC,
                SgrAttribute::Underline => self.style.flags |= F::UNDERLINE,
                SgrAttribute::Blink | SgrAttribute::RapidBlink => self.style.flags |= F::BLINK,
                SgrAttribute::Inverse => self.style.flags |= F::INVERSE,
                SgrAttribute::Hidden => self.style.flags |= F::HIDDEN,
                SgrAttribute::Strikethrough => self.style.flags |= F::STRIKETHROUGH,
                SgrAttribute::DoubleUnderline => self.style.flags |= F::DOUBLE_UNDERLINE,
                SgrAttribute::NormalIntensity => {
                    self.style.flags &= !(F::BOLD | F::DIM);
                }
                SgrAttribute::NoItalic => self.style.flags &= !F::ITALIC,
                SgrAttribute::NoUnderline => {
                    self.style.flags &= !(F::UNDERLINE | F::DOUBLE_UNDERLINE);
                }
                SgrAttribute::NoBlink => self.style.flags &= !F::BLINK,
                SgrAttribute::NoInverse => self.style.flags &= !F::INVERSE,
                SgrAttribute::NoHidden => self.style.flags &= !F::HIDDEN,
                SgrAttribute::NoStrikethrough => self.style.flags &= !F::STRIKETHROUGH,
                SgrAttribute::Foreground(color) => self.style.foreground = *color,
                SgrAttribute::Background(color) => self.style.background = *color,
            }
        }
    }

    // --- modes -------------------------------------------------------

    pub fn set_mode_flag(&mut self, flag: ModeFlags, enabled: bool) {
        self.modes.set(flag, enabled);
        if flag == ModeFlags::ORIGIN {
            // DECOM homes the cursor on either transition.
            self.set_cursor_position(0, 0);
        }
    }

    pub fn set_cursor_visible(&mut self, visible: bool) {
        self.cursor.set_visible(visible);
    }

    pub fn set_mouse_mode(&mut self, mode: MouseMode) {
        self.mouse_mode = mode;
    }

    pub fn set_mouse_format(&mut self, format: MouseFormat) {
        self.mouse_format = format;
    }

    /// DECSET 47/1047/1049 family. `clear` wipes the alternate screen
    /// on the transition; `save_restore` carries the cursor across.
    pub fn set_alternate_screen(&mut self, on: bool, clear: bool, save_restore: bool) {
        if on == self.buffer.is_alternate() {
            return;
        }
        if on {
            if save_restore {
                self.save_cursor();
            }
            self.buffer.use_alternate_buffer(true);
            if clear {
                self.buffer.clear_alternate();
            }
        } else {
            if clear {
                self.buffer.clear_alternate();
            }
            self.buffer.use_alternate_buffer(false);
            if save_restore {
                self.restore_cursor();
            }
        }
    }

    // --- save/restore ------------------------------------------------

    pub fn save_cursor(&mut self) {
        let saved = SavedCursor {
            position: self.cursor.position(),
            style: self.style,
            origin_mode: self.modes.contains(ModeFlags::ORIGIN),
            pending_wrap: self.cursor.pending_wrap(),
            charsets: self.charsets.clone(),
        };
        if self.buffer.is_alternate() {
            self.saved_alternate = Some(saved);
        } else {
            self.saved_primary = Some(saved);
        }
    }

    pub fn restore_cursor(&mut self) {
        let saved = if self.buffer.is_alternate() {
            self.saved_alternate.clone()
        } else {
            self.saved_primary.clone()
        };
        match saved {
            Some(saved) => {
                let row = saved.position.row.min(self.size.rows.saturating_sub(1));
                let col = saved.position.col.min(self.size.cols.saturating_sub(1));
                self.cursor.set_position(Position::new(row, col));
                self.cursor.set_pending_wrap(saved.pending_wrap);
                self.style = saved.style;
                self.modes.set(ModeFlags::ORIGIN, saved.origin_mode);
                self.charsets = saved.charsets;
            }
            None => {
                // DECRC with nothing saved resets to the defaults.
                self.cursor.set_position(Position::new(0, 0));
                self.style = TextStyle::default();
            }
        }
    }

    // --- charsets ----------------------------------------------------

    pub fn designate_charset(&mut self, slot: u8, charset: Charset) {
        self.charsets.designate(slot, charset);
    }

    // --- reports -----------------------------------------------------

    pub fn device_status_report(&mut self, code: u16) {
        match code {
            5 => self.respond(b"\x1b[0n".to_vec()),
            6 => {
                let pos = self.cursor.position();
                let row = if self.modes.contains(ModeFlags::ORIGIN) {
                    pos.row.saturating_sub(self.scroll_top)
                } else {
                    pos.row
                };
                self.respond(format!("\x1b[{};{}R", row + 1, pos.col + 1).into_bytes());
            }
            _ => debug!(code, "unhandled DSR"),
        }
    }

    /// Primary DA: report as a VT102.
    pub fn device_attributes(&mut self) {
        self.respond(b"\x1b[?6c".to_vec());
    }

    // --- OSC ---------------------------------------------------------

    pub fn set_title(&mut self, title: String) {
        if self.title != title {
            self.title = title.clone();
            self.pending_events.push(TerminalEvent::Title(title));
        }
    }

    pub fn set_hyperlink(&mut self, uri: Option<String>) {
        self.hyperlink = uri;
    }

    pub fn set_palette_color(&mut self, index: u8, color: Color) {
        self.palette[index as usize] = color;
    }

    pub fn reset_palette_color(&mut self, index: Option<u8>) {
        match index {
            Some(index) => {
                self.palette[index as usize] = default_palette_entry(index);
            }
            None => self.palette = default_palette(),
        }
    }

    pub fn query_palette_color(&mut self, index: u8) {
        if let Some(spec) = self.palette[index as usize].to_spec() {
            self.respond(format!("\x1b]4;{index};{spec}\x07").into_bytes());
        }
    }

    pub fn palette_color(&self, index: u8) -> Color {
        self.palette[index as usize]
    }

    pub fn set_dynamic_color(
        &mut self,
        slot: filament_common::actions::DynamicColor,
        color: Color,
    ) {
        use filament_common::actions::DynamicColor;
        match slot {
            DynamicColor::Foreground => self.foreground = color,
            DynamicColor::Background => self.background = color,
            DynamicColor::Cursor => self.cursor_color = color,
        }
    }

    pub fn reset_dynamic_color(&mut self, slot: filament_common::actions::DynamicColor) {
        use filament_common::actions::DynamicColor;
        match slot {
            DynamicColor::Foreground => self.foreground = DEFAULT_FOREGROUND,
            DynamicColor::Background => self.background = DEFAULT_BACKGROUND,
            DynamicColor::Cursor => self.cursor_color = DEFAULT_CURSOR,
        }
    }

    pub fn query_dynamic_color(&mut self, slot: filament_common::actions::DynamicColor) {
        use filament_common::actions::DynamicColor;
        let (number, color) = match slot {
            DynamicColor::Foreground => (10, self.foreground),
            DynamicColor::Background => (11, self.background),
            DynamicColor::Cursor => (12, self.cursor_color),
        };
        if let Some(spec) = color.to_spec() {
            self.respond(format!("\x1b]{number};{spec}\x07").into_bytes());
        }
    }

    // --- lifecycle ---------------------------------------------------

    /// RIS: back to the initial state, keeping size and history.
    pub fn full_reset(&mut self) {
        self.style = TextStyle::default();
        self.modes = ModeFlags::default();
        self.mouse_mode = MouseMode::Off;
        self.mouse_format = MouseFormat::X10;
        self.scroll_top = 0;
        self.scroll_bottom = self.size.rows.saturating_sub(1);
        self.tab_stops = default_tab_stops(self.size.cols);
        self.charsets = CharsetState::default();
        self.saved_primary = None;
        self.saved_alternate = None;
        self.last_printed = None;
        self.hyperlink = None;
        self.palette = default_palette();
        self.foreground = DEFAULT_FOREGROUND;
        self.background = DEFAULT_BACKGROUND;
        self.cursor_color = DEFAULT_CURSOR;
        self.buffer.use_alternate_buffer(false);
        self.buffer.clear_alternate();
        self.buffer.clear_all();
        self.cursor = Cursor::new();
    }

    /// Resize the model. Content reflows on the primary screen and the
    /// cursor keeps its logical position; the scroll region is reset
    /// only when the new bounds invalidate it.
    pub fn resize(&mut self, new_size: Size, origin: RequestOrigin) {
        if new_size.rows == 0 || new_size.cols == 0 {
            error!(?new_size, "resize to empty size ignored");
            return;
        }
        if new_size == self.size {
            return;
        }
        debug!(?new_size, ?origin, "resizing terminal");
        let was_full_region =
            self.scroll_top == 0 && self.scroll_bottom == self.size.rows.saturating_sub(1);
        let new_cursor = self.buffer.resize(new_size, self.cursor.position());
        self.size = new_size;
        self.cursor.set_position(new_cursor);

        if was_full_region || self.scroll_bottom >= new_size.rows || self.scroll_top >= self.scroll_bottom {
            self.scroll_top = 0;
            self.scroll_bottom = new_size.rows - 1;
        }
        self.tab_stops = default_tab_stops(new_size.cols);
        self.pending_events.push(TerminalEvent::Resized(new_size));
    }
}

fn default_tab_stops(cols: u16) -> Vec<u16> {
    (0..cols).step_by(8).collect()
}

/// Concrete RGB values for the base 16, so palette queries can answer.
const BASE_COLORS: [(u8, u8, u8); 16] = [
    (0, 0, 0),
    (205, 0, 0),
    (0, 205, 0),
    (205, 205, 0),
    (0, 0, 238),
    (205, 0, 205),
    (0, 205, 205),
    (229, 229, 229),
    (127, 127, 127),
    (255, 0, 0),
    (0, 255, 0),
    (255, 255, 0),
    (92, 92, 255),
    (255, 0, 255),
    (0, 255, 255),
    (255, 255, 255),
];

fn default_palette_entry(index: u8) -> Color {
    let i = index as u16;
    if i < 16 {
        let (r, g, b) = BASE_COLORS[i as usize];
        Color::Rgb(r, g, b)
    } else if i < 232 {
        // 6x6x6 color cube.
        let i = i - 16;
        let (r, g, b) = (i / 36, (i / 6) % 6, i % 6);
        let level = |v: u16| if v == 0 { 0 } else { (55 + v * 40) as u8 };
        Color::Rgb(level(r), level(g), level(b))
    } else {
        let gray = (8 + (i - 232) * 10) as u8;
        Color::Rgb(gray, gray, gray)
    }
}

fn default_palette() -> Vec<Color> {
    (0..=255u8).map(default_palette_entry).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use filament_common::actions::{EraseMode, SgrAttribute};
    use filament_common::types::AttributeFlags;

    fn state(cols: u16, rows: u16) -> TerminalState {
        TerminalState::new(Size::new(cols, rows), 100)
    }

    fn row_text(state: &TerminalState, row: u16) -> String {
        state.buffer().line(row).text()
    }

    #[test]
    fn hello_at_origin() {
        let mut term = state(80, 24);
        term.print_text("Hello");
        assert_eq!(row_text(&term, 0), "Hello");
        assert_eq!(term.cursor_position(), Position::new(0, 5));
        for (i, ch) in "Hello".chars().enumerate() {
            let cell = term.buffer().cell(Position::new(0, i as u16));
            assert_eq!(cell.ch, ch);
            assert_eq!(cell.style, TextStyle::default());
        }
    }

    #[test]
    fn styled_then_default() {
        let mut term = state(80, 24);
        term.apply_sgr(&[SgrAttribute::Foreground(Color::Indexed(1))]);
        term.print_text("A");
        term.apply_sgr(&[SgrAttribute::Reset]);
        term.print_text("B");
        let a = term.buffer().cell(Position::new(0, 0));
        let b = term.buffer().cell(Position::new(0, 1));
        assert_eq!(a.style.foreground, Color::Indexed(1));
        assert_eq!(b.style.foreground, Color::Default);
    }

    #[test]
    fn deferred_wrap_at_right_margin() {
        let mut term = state(80, 24);
        term.set_cursor_position(4, 0);
        term.print_text(&"a".repeat(80));
        // Cursor parked on the last column with the wrap pending.
        assert_eq!(term.cursor_position(), Position::new(4, 79));
        assert!(term.pending_wrap());
        assert!(!term.buffer().line(4).wrapped());

        term.print_text("X");
        assert_eq!(term.cursor_position(), Position::new(5, 1));
        assert_eq!(row_text(&term, 5), "X");
        assert!(term.buffer().line(4).wrapped());
        assert!(!term.buffer().line(5).wrapped());
    }

    #[test]
    fn cursor_motion_clears_pending_wrap() {
        let mut term = state(10, 4);
        term.print_text(&"x".repeat(10));
        assert!(term.pending_wrap());
        term.cursor_backward(1);
        assert!(!term.pending_wrap());
        term.print_text("y");
        // No wrap happened; y overwrote in place.
        assert_eq!(term.cursor_position().row, 0);
    }

    #[test]
    fn autowrap_off_overwrites_last_column() {
        let mut term = state(10, 4);
        term.set_mode_flag(ModeFlags::AUTOWRAP, false);
        term.print_text("abcdefghijKLM");
        assert_eq!(term.cursor_position(), Position::new(0, 9));
        assert_eq!(term.buffer().cell(Position::new(0, 9)).ch, 'M');
        assert_eq!(row_text(&term, 1), "");
    }

    #[test]
    fn wrap_scrolls_inside_region() {
        let mut term = state(5, 5);
        term.set_scroll_region(1, 3);
        term.set_cursor_position(0, 0); // homes to origin of screen (no origin mode)
        term.cursor_down(3);
        term.cursor_down(10);
        assert_eq!(term.cursor_position().row, 3);
        term.print_text(&"z".repeat(6));
        // The wrap scrolled rows 1..=3; cursor stays on row 3.
        assert_eq!(term.cursor_position().row, 3);
        assert_eq!(row_text(&term, 2), "zzzzz");
        assert_eq!(row_text(&term, 3), "z");
        // History untouched: the region is not the full screen.
        assert_eq!(term.buffer().history_size(), 0);
    }

    #[test]
    fn origin_mode_homes_into_region() {
        let mut term = state(80, 24);
        term.set_scroll_region(4, 9); // rows 5..10 in protocol terms
        term.set_mode_flag(ModeFlags::ORIGIN, true);
        term.set_cursor_position(0, 0);
        assert_eq!(term.cursor_position(), Position::new(4, 0));
        // Clamped to the region bottom.
        term.set_cursor_position(100, 0);
        assert_eq!(term.cursor_position(), Position::new(9, 0));
    }

    #[test]
    fn save_restore_round_trip() {
        let mut term = state(80, 24);
        term.apply_sgr(&[SgrAttribute::Bold]);
        term.set_cursor_position(3, 7);
        term.save_cursor();
        term.apply_sgr(&[SgrAttribute::Reset]);
        term.set_cursor_position(0, 0);
        term.restore_cursor();
        assert_eq!(term.cursor_position(), Position::new(3, 7));
        assert!(term.style().flags.contains(AttributeFlags::BOLD));
        // Restore is repeatable.
        term.set_cursor_position(1, 1);
        term.restore_cursor();
        assert_eq!(term.cursor_position(), Position::new(3, 7));
    }

    #[test]
    fn alternate_screen_1049_round_trip() {
        let mut term = state(80, 24);
        term.print_text("primary");
        term.set_cursor_position(2, 3);
        term.set_alternate_screen(true, true, true);
        assert!(term.is_alternate());
        term.print_text("alt");
        term.line_feed();
        // Nothing reaches history from the alternate screen.
        for _ in 0..30 {
            term.index();
        }
        assert_eq!(term.buffer().history_size(), 0);

        term.set_alternate_screen(false, false, true);
        assert!(!term.is_alternate());
        assert_eq!(row_text(&term, 0), "primary");
        assert_eq!(term.cursor_position(), Position::new(2, 3));
    }

    #[test]
    fn reverse_index_scrolls_down_at_top() {
        let mut term = state(10, 3);
        term.print_text("top");
        term.set_cursor_position(0, 0);
        term.reverse_index();
        assert_eq!(row_text(&term, 0), "");
        assert_eq!(row_text(&term, 1), "top");
    }

    #[test]
    fn tab_stops_default_and_custom() {
        let mut term = state(80, 24);
        term.horizontal_tab();
        assert_eq!(term.cursor_position().col, 8);
        term.cursor_forward(2);
        term.tab_set();
        term.set_cursor_position(0, 0);
        term.horizontal_tab();
        assert_eq!(term.cursor_position().col, 8);
        term.horizontal_tab();
        assert_eq!(term.cursor_position().col, 10);
        term.tab_clear(3);
        term.set_cursor_position(0, 0);
        term.horizontal_tab();
        assert_eq!(term.cursor_position().col, 79);
    }

    #[test]
    fn erase_display_selectors() {
        let mut term = state(10, 3);
        for row in 0..3 {
            term.set_cursor_position(row, 0);
            term.print_text("0123456789");
        }
        term.set_cursor_position(1, 4);
        term.erase_display(EraseMode::ToEnd);
        assert_eq!(row_text(&term, 0), "0123456789");
        assert_eq!(row_text(&term, 1), "0123");
        assert_eq!(row_text(&term, 2), "");

        term.erase_display(EraseMode::All);
        assert_eq!(row_text(&term, 0), "");
    }

    #[test]
    fn insert_delete_lines_in_region() {
        let mut term = state(10, 5);
        for row in 0..5 {
            term.set_cursor_position(row, 0);
            term.print_text(&format!("line{row}"));
        }
        term.set_scroll_region(1, 3);
        term.set_cursor_position(1, 2);
        term.insert_lines(1);
        assert_eq!(row_text(&term, 0), "line0");
        assert_eq!(row_text(&term, 1), "");
        assert_eq!(row_text(&term, 2), "line1");
        assert_eq!(row_text(&term, 3), "line2");
        // line3 pushed out of the region, line4 untouched below it.
        assert_eq!(row_text(&term, 4), "line4");
        // IL homed the column.
        assert_eq!(term.cursor_position().col, 0);

        term.delete_lines(1);
        assert_eq!(row_text(&term, 1), "line1");
        assert_eq!(row_text(&term, 3), "");
    }

    #[test]
    fn dsr_cursor_report_respects_origin() {
        let mut term = state(80, 24);
        term.set_cursor_position(4, 9);
        term.device_status_report(6);
        assert_eq!(term.take_responses(), vec![b"\x1b[5;10R".to_vec()]);

        term.set_scroll_region(2, 10);
        term.set_mode_flag(ModeFlags::ORIGIN, true);
        term.set_cursor_position(0, 0);
        term.device_status_report(6);
        assert_eq!(term.take_responses(), vec![b"\x1b[1;1R".to_vec()]);
    }

    #[test]
    fn dec_line_drawing() {
        let mut term = state(10, 2);
        term.designate_charset(0, Charset::DecSpecial);
        term.print_text("qx");
        assert_eq!(row_text(&term, 0), "─│");
        term.designate_charset(0, Charset::Ascii);
        term.print_text("qx");
        assert_eq!(row_text(&term, 0), "─│qx");
    }

    #[test]
    fn shift_out_selects_g1() {
        let mut term = state(10, 2);
        term.designate_charset(1, Charset::DecSpecial);
        term.print_text("q");
        term.shift_out();
        term.print_text("q");
        term.shift_in();
        term.print_text("q");
        assert_eq!(row_text(&term, 0), "q─q");
    }

    #[test]
    fn repeat_last_character() {
        let mut term = state(20, 2);
        term.print_text("ab");
        term.repeat_last(3);
        assert_eq!(row_text(&term, 0), "abbbb");
    }

    #[test]
    fn wide_char_occupies_pair() {
        let mut term = state(10, 2);
        term.print_text("\u{4e16}x");
        assert_eq!(term.buffer().cell(Position::new(0, 0)).ch, '\u{4e16}');
        assert!(term.buffer().cell(Position::new(0, 1)).is_wide_continuation());
        assert_eq!(term.buffer().cell(Position::new(0, 2)).ch, 'x');
        assert_eq!(term.cursor_position().col, 3);
    }

    #[test]
    fn wide_char_wraps_early_at_margin() {
        let mut term = state(5, 3);
        term.print_text("abcd\u{4e16}");
        // The wide char did not fit in the last column and wrapped.
        assert_eq!(row_text(&term, 0), "abcd");
        assert!(term.buffer().line(0).wrapped());
        assert_eq!(term.buffer().cell(Position::new(1, 0)).ch, '\u{4e16}');
    }

    #[test]
    fn full_reset_restores_defaults() {
        let mut term = state(20, 5);
        term.print_text("junk");
        term.apply_sgr(&[SgrAttribute::Bold]);
        term.set_scroll_region(1, 3);
        term.set_mode_flag(ModeFlags::ORIGIN, true);
        term.set_alternate_screen(true, true, true);
        term.full_reset();
        assert!(!term.is_alternate());
        assert_eq!(term.scroll_region(), (0, 4));
        assert_eq!(term.style(), TextStyle::default());
        assert_eq!(term.cursor_position(), Position::new(0, 0));
        assert_eq!(row_text(&term, 0), "");
    }

    #[test]
    fn resize_keeps_full_region_full() {
        let mut term = state(80, 24);
        term.resize(Size::new(80, 30), RequestOrigin::User);
        assert_eq!(term.scroll_region(), (0, 29));

        term.set_scroll_region(2, 10);
        term.resize(Size::new(80, 24), RequestOrigin::User);
        // Still valid under the new bounds: preserved.
        assert_eq!(term.scroll_region(), (2, 10));

        term.resize(Size::new(80, 8), RequestOrigin::User);
        // Invalid now: reset to full.
        assert_eq!(term.scroll_region(), (0, 7));
    }

    #[test]
    fn resize_emits_event() {
        let mut term = state(80, 24);
        term.resize(Size::new(100, 30), RequestOrigin::Remote);
        let events = term.take_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, TerminalEvent::Resized(s) if *s == Size::new(100, 30))));
    }

    #[test]
    fn backspace_reverse_wraparound() {
        let mut term = state(10, 3);
        term.set_cursor_position(1, 0);
        term.backspace();
        assert_eq!(term.cursor_position(), Position::new(1, 0));
        term.set_mode_flag(ModeFlags::REVERSE_WRAPAROUND, true);
        term.backspace();
        assert_eq!(term.cursor_position(), Position::new(0, 9));
    }

    #[test]
    fn palette_query_answers_with_spec() {
        let mut term = state(10, 2);
        term.set_palette_color(17, Color::Rgb(255, 0, 128));
        term.query_palette_color(17);
        let responses = term.take_responses();
        assert_eq!(responses.len(), 1);
        assert_eq!(
            String::from_utf8(responses[0].clone()).unwrap(),
            "\x1b]4;17;rgb:ffff/0000/8080\x07"
        );
        term.reset_palette_color(Some(17));
        assert_eq!(term.palette_color(17), default_palette_entry(17));
    }

    #[test]
    fn title_change_emits_event_once() {
        let mut term = state(10, 2);
        term.set_title("hello".into());
        term.set_title("hello".into());
        let events = term.take_events();
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, TerminalEvent::Title(_)))
                .count(),
            1
        );
    }
}
