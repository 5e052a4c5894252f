use std::collections::VecDeque;

use filament_common::types::{Cell, Position, Size, TextStyle};
use tracing::{debug, trace};

use super::line::TerminalLine;

/// Fixed-height grid of lines: exactly `rows` entries at all times.
#[derive(Debug, Clone)]
pub struct ScreenGrid {
    lines: Vec<TerminalLine>,
    size: Size,
}

impl ScreenGrid {
    pub fn new(size: Size) -> Self {
        Self {
            lines: (0..size.rows).map(|_| TerminalLine::new()).collect(),
            size,
        }
    }

    pub fn line(&self, row: usize) -> &TerminalLine {
        &self.lines[row]
    }

    pub fn line_mut(&mut self, row: usize) -> &mut TerminalLine {
        &mut self.lines[row]
    }

    pub fn rows(&self) -> usize {
        self.lines.len()
    }

    /// Scroll rows `top..=bottom` up by `count`, returning the lines
    /// pushed out at the top.
    fn scroll_up(&mut self, top: usize, bottom: usize, count: usize) -> Vec<TerminalLine> {
        let count = count.min(bottom - top + 1);
        let evicted: Vec<TerminalLine> = self.lines.drain(top..top + count).collect();
        for _ in 0..count {
            self.lines.insert(bottom + 1 - count, TerminalLine::new());
        }
        evicted
    }

    /// Scroll rows `top..=bottom` down by `count`; lines leaving at the
    /// bottom are dropped.
    fn scroll_down(&mut self, top: usize, bottom: usize, count: usize) {
        let count = count.min(bottom - top + 1);
        self.lines.drain(bottom + 1 - count..=bottom);
        for _ in 0..count {
            self.lines.insert(top, TerminalLine::new());
        }
    }

    /// Truncate or pad to the new dimensions without reflow.
    fn resize_clip(&mut self, new_size: Size) {
        for line in &mut self.lines {
            line.pack(new_size.cols as usize);
        }
        self.lines.resize(new_size.rows as usize, TerminalLine::new());
        self.size = new_size;
    }

    fn clear(&mut self) {
        for line in &mut self.lines {
            line.clear(Cell::blank());
        }
    }
}

/// Bounded FIFO of lines evicted from the top of the primary screen.
/// Evicted lines keep their `wrapped` flag so reflow can rejoin them.
#[derive(Debug)]
pub struct HistoryBuffer {
    lines: VecDeque<TerminalLine>,
    max_lines: usize,
}

impl HistoryBuffer {
    pub fn new(max_lines: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            max_lines,
        }
    }

    pub fn push(&mut self, line: TerminalLine) {
        if self.lines.len() >= self.max_lines {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Line at `index`; 0 is the oldest.
    pub fn line(&self, index: usize) -> Option<&TerminalLine> {
        self.lines.get(index)
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    fn drain_all(&mut self) -> Vec<TerminalLine> {
        self.lines.drain(..).collect()
    }
}

/// The screen model: primary screen plus scroll-back, alternate screen,
/// and per-row damage tracking.
///
/// Exactly one of the two grids is active. History only accumulates from
/// the primary screen; it is bypassed entirely while the alternate
/// screen is active. All access is serialized by the lock around the
/// owning [`TerminalState`].
#[derive(Debug)]
pub struct TerminalTextBuffer {
    primary: ScreenGrid,
    alternate: ScreenGrid,
    alternate_active: bool,
    history: HistoryBuffer,
    damage: Vec<bool>,
    size: Size,
}

impl TerminalTextBuffer {
    pub fn new(size: Size, history_capacity: usize) -> Self {
        Self {
            primary: ScreenGrid::new(size),
            alternate: ScreenGrid::new(size),
            alternate_active: false,
            history: HistoryBuffer::new(history_capacity),
            damage: vec![false; size.rows as usize],
            size,
        }
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn is_alternate(&self) -> bool {
        self.alternate_active
    }

    fn active(&self) -> &ScreenGrid {
        if self.alternate_active {
            &self.alternate
        } else {
            &self.primary
        }
    }

    fn active_mut(&mut self) -> &mut ScreenGrid {
        if self.alternate_active {
            &mut self.alternate
        } else {
            &mut self.primary
        }
    }

    pub fn line(&self, row: u16) -> &TerminalLine {
        self.active().line(row as usize)
    }

    pub fn cell(&self, pos: Position) -> Cell {
        self.line(pos.row).cell(pos.col as usize)
    }

    /// Place one cell, keeping wide pairs intact: overwriting either
    /// half of a pair blanks the partner.
    pub fn write_cell(&mut self, row: u16, col: u16, cell: Cell) {
        if row >= self.size.rows || col >= self.size.cols {
            debug!(row, col, "write outside bounds ignored");
            return;
        }
        let (row_idx, col_idx) = (row as usize, col as usize);
        let line = self.active_mut().line_mut(row_idx);
        let old = line.cell(col_idx);
        if old.is_wide_continuation() && col_idx > 0 {
            line.set_cell(col_idx - 1, Cell::blank());
        }
        if col_idx + 1 < line.width() && line.cell(col_idx + 1).is_wide_continuation() {
            line.set_cell(col_idx + 1, Cell::blank());
        }
        line.set_cell(col_idx, cell);
        self.mark_row(row_idx);
    }

    /// Place a run of characters starting at (x, y) with one style.
    /// Wide characters take a continuation cell; the run is clipped at
    /// the right edge.
    pub fn write(&mut self, x: u16, y: u16, text: &str, style: TextStyle) {
        let mut col = x;
        for ch in text.chars() {
            let width = filament_common::types::char_width(ch);
            if col >= self.size.cols {
                break;
            }
            self.write_cell(y, col, Cell::styled(ch, style));
            if width == 2 && col + 1 < self.size.cols {
                self.write_cell(y, col + 1, Cell::wide_continuation(style));
            }
            col += width;
        }
    }

    /// Scroll rows `top..=bottom` (0-based, inclusive). Positive `count`
    /// scrolls up; when the region spans the whole primary screen the
    /// evicted lines feed the history. Negative scrolls down.
    pub fn scroll_area(&mut self, top: u16, bottom: u16, count: i32) {
        if top > bottom || bottom >= self.size.rows || count == 0 {
            return;
        }
        let (top_idx, bottom_idx) = (top as usize, bottom as usize);
        if count > 0 {
            let feeds_history =
                !self.alternate_active && top == 0 && bottom == self.size.rows - 1;
            let cols = self.size.cols as usize;
            let evicted = self
                .active_mut()
                .scroll_up(top_idx, bottom_idx, count as usize);
            if feeds_history {
                for mut line in evicted {
                    line.pack(cols);
                    self.history.push(line);
                }
            }
        } else {
            self.active_mut()
                .scroll_down(top_idx, bottom_idx, (-count) as usize);
        }
        self.mark_rows(top_idx, bottom_idx);
    }

    /// Fill the inclusive rectangle with the given cell.
    pub fn clear_area(&mut self, x1: u16, y1: u16, x2: u16, y2: u16, fill: Cell) {
        let x2 = x2.min(self.size.cols.saturating_sub(1));
        let y2 = y2.min(self.size.rows.saturating_sub(1));
        if x1 > x2 || y1 > y2 {
            return;
        }
        for row in y1..=y2 {
            let line = self.active_mut().line_mut(row as usize);
            line.erase_cells(x1 as usize, (x2 - x1 + 1) as usize, fill);
            if fill == Cell::blank() {
                line.pack(u16::MAX as usize);
            }
            self.mark_row(row as usize);
        }
    }

    pub fn clear_all(&mut self) {
        self.active_mut().clear();
        self.mark_all();
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Insert `count` blank lines at `row`, shifting rows down within
    /// `row..=region_bottom`.
    pub fn insert_lines(&mut self, row: u16, count: u16, region_bottom: u16) {
        if row > region_bottom || region_bottom >= self.size.rows {
            return;
        }
        self.active_mut()
            .scroll_down(row as usize, region_bottom as usize, count as usize);
        self.mark_rows(row as usize, region_bottom as usize);
    }

    /// Delete `count` lines at `row`, shifting rows up within
    /// `row..=region_bottom`.
    pub fn delete_lines(&mut self, row: u16, count: u16, region_bottom: u16) {
        if row > region_bottom || region_bottom >= self.size.rows {
            return;
        }
        self.active_mut()
            .scroll_up(row as usize, region_bottom as usize, count as usize);
        self.mark_rows(row as usize, region_bottom as usize);
    }

    pub fn insert_cells(&mut self, row: u16, col: u16, count: u16, fill: Cell) {
        let cols = self.size.cols as usize;
        self.active_mut()
            .line_mut(row as usize)
            .insert_cells(col as usize, count as usize, fill, cols);
        self.mark_row(row as usize);
    }

    pub fn delete_cells(&mut self, row: u16, col: u16, count: u16, fill: Cell) {
        let cols = self.size.cols as usize;
        self.active_mut()
            .line_mut(row as usize)
            .delete_cells(col as usize, count as usize, fill, cols);
        self.mark_row(row as usize);
    }

    pub fn erase_cells(&mut self, row: u16, col: u16, count: u16, fill: Cell) {
        let count = count.min(self.size.cols.saturating_sub(col));
        self.active_mut()
            .line_mut(row as usize)
            .erase_cells(col as usize, count as usize, fill);
        self.mark_row(row as usize);
    }

    pub fn set_line_wrapped(&mut self, row: u16, wrapped: bool) {
        self.active_mut().line_mut(row as usize).set_wrapped(wrapped);
    }

    /// Switch the active screen. History is bypassed while `on`.
    pub fn use_alternate_buffer(&mut self, on: bool) {
        if self.alternate_active != on {
            trace!(on, "switching screen buffer");
            self.alternate_active = on;
            self.mark_all();
        }
    }

    pub fn clear_alternate(&mut self) {
        self.alternate.clear();
        if self.alternate_active {
            self.mark_all();
        }
    }

    pub fn history_size(&self) -> usize {
        self.history.len()
    }

    pub fn history_line(&self, index: usize) -> Option<&TerminalLine> {
        self.history.line(index)
    }

    fn mark_row(&mut self, row: usize) {
        if let Some(slot) = self.damage.get_mut(row) {
            *slot = true;
        }
    }

    fn mark_rows(&mut self, top: usize, bottom: usize) {
        for row in top..=bottom.min(self.damage.len().saturating_sub(1)) {
            self.damage[row] = true;
        }
    }

    pub fn mark_all(&mut self) {
        self.damage.iter_mut().for_each(|d| *d = true);
    }

    /// Dirty rows paired with snapshots of their current content.
    /// Clears the damage set.
    pub fn drain_damage(&mut self) -> Vec<(usize, TerminalLine)> {
        let mut out = Vec::new();
        for row in 0..self.damage.len() {
            if self.damage[row] {
                self.damage[row] = false;
                out.push((row, self.active().line(row).clone()));
            }
        }
        out
    }

    /// Snapshot of the visible screen, each line padded to the width.
    pub fn snapshot(&self) -> Vec<Vec<Cell>> {
        let cols = self.size.cols as usize;
        (0..self.active().rows())
            .map(|r| self.active().line(r).padded(cols))
            .collect()
    }

    /// Resize both screens. The primary screen reflows (wrapped lines
    /// join through history and re-break at the new width); the
    /// alternate screen is clipped. Returns the relocated cursor.
    pub fn resize(&mut self, new_size: Size, cursor: Position) -> Position {
        if new_size == self.size || new_size.rows == 0 || new_size.cols == 0 {
            return cursor;
        }
        self.alternate.resize_clip(new_size);
        let new_cursor = if self.alternate_active {
            // Cursor belongs to the alternate screen: clip it, and
            // reflow the primary with a placeholder position.
            self.reflow_primary(new_size, Position::default());
            Position::new(
                cursor.row.min(new_size.rows - 1),
                cursor.col.min(new_size.cols - 1),
            )
        } else {
            self.reflow_primary(new_size, cursor)
        };
        self.size = new_size;
        self.damage = vec![true; new_size.rows as usize];
        new_cursor
    }

    fn reflow_primary(&mut self, new_size: Size, cursor: Position) -> Position {
        let old_cols = self.size.cols as usize;
        let hist_len = self.history.len();

        let mut physical: Vec<TerminalLine> = self.history.drain_all();
        physical.append(&mut self.primary.lines);
        let cursor_phys = hist_len + cursor.row as usize;

        // Drop trailing blank rows below the cursor so padding does not
        // leak into history on shrink.
        while physical.len() > cursor_phys + 1 {
            let last = physical.last().unwrap();
            if last.is_blank() && !last.wrapped() {
                physical.pop();
            } else {
                break;
            }
        }

        // Join physical rows into logical lines along the wrapped flags,
        // carrying the cursor as (logical index, cell offset).
        let mut logicals: Vec<Vec<Cell>> = Vec::new();
        let mut cursor_logical = (0usize, 0usize);
        let mut current: Vec<Cell> = Vec::new();
        for (index, mut line) in physical.into_iter().enumerate() {
            line.pack(old_cols);
            if index == cursor_phys {
                cursor_logical = (logicals.len(), current.len() + cursor.col as usize);
            }
            let wrapped = line.wrapped();
            current.extend(line.into_cells());
            if !wrapped {
                logicals.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            logicals.push(current);
        }
        if logicals.is_empty() {
            logicals.push(Vec::new());
        }

        // Re-break each logical line at the new width.
        let cols = new_size.cols as usize;
        let mut rebroken: Vec<TerminalLine> = Vec::new();
        let mut cursor_out = (0usize, 0usize);
        for (index, cells) in logicals.into_iter().enumerate() {
            let offset = (index == cursor_logical.0).then_some(cursor_logical.1);
            let (lines, local) = rebreak(cells, cols, offset);
            if let Some((row, col)) = local {
                cursor_out = (rebroken.len() + row, col);
            }
            rebroken.extend(lines);
        }

        // The last `rows` become the screen; everything above feeds the
        // history in order.
        let rows = new_size.rows as usize;
        let first_screen = rebroken.len().saturating_sub(rows);
        for line in rebroken.drain(..first_screen) {
            self.history.push(line);
        }
        rebroken.resize(rows, TerminalLine::new());
        self.primary.lines = rebroken;
        self.primary.size = new_size;

        Position::new(
            cursor_out.0.saturating_sub(first_screen).min(rows - 1) as u16,
            cursor_out.1.min(cols - 1) as u16,
        )
    }
}

/// Split a logical line into physical lines of at most `cols` cells,
/// keeping wide pairs together. All but the last carry the wrapped flag.
/// When `cursor_offset` is given, the cursor's (row, col) within the
/// produced lines is returned.
fn rebreak(
    cells: Vec<Cell>,
    cols: usize,
    cursor_offset: Option<usize>,
) -> (Vec<TerminalLine>, Option<(usize, usize)>) {
    let mut lines = Vec::new();
    let mut cursor = None;
    let mut start = 0usize;
    loop {
        let mut end = (start + cols).min(cells.len());
        if end < cells.len() && cells[end].is_wide_continuation() && end > start + 1 {
            end -= 1;
        }
        let chunk = cells[start..end].to_vec();
        let wrapped = end < cells.len();
        if let Some(offset) = cursor_offset {
            if offset >= start && (offset < end || !wrapped) {
                cursor = Some((lines.len(), offset - start));
            }
        }
        lines.push(TerminalLine::from_cells(chunk, wrapped));
        if end >= cells.len() {
            break;
        }
        start = end;
    }
    (lines, cursor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use filament_common::types::Color;

    fn buffer(cols: u16, rows: u16) -> TerminalTextBuffer {
        TerminalTextBuffer::new(Size::new(cols, rows), 100)
    }

    fn row_text(buf: &TerminalTextBuffer, row: u16) -> String {
        buf.line(row).text()
    }

    #[test]
    fn write_and_read_back() {
        let mut buf = buffer(10, 5);
        buf.write(2, 1, "abc", TextStyle::default());
        assert_eq!(row_text(&buf, 1), "  abc");
        assert_eq!(buf.cell(Position::new(1, 3)).ch, 'b');
    }

    #[test]
    fn full_screen_scroll_feeds_history() {
        let mut buf = buffer(10, 3);
        buf.write(0, 0, "one", TextStyle::default());
        buf.write(0, 1, "two", TextStyle::default());
        buf.scroll_area(0, 2, 1);
        assert_eq!(buf.history_size(), 1);
        assert_eq!(buf.history_line(0).unwrap().text(), "one");
        assert_eq!(row_text(&buf, 0), "two");
        assert_eq!(row_text(&buf, 2), "");
    }

    #[test]
    fn region_scroll_skips_history() {
        let mut buf = buffer(10, 4);
        buf.write(0, 1, "keep", TextStyle::default());
        buf.scroll_area(1, 2, 1);
        assert_eq!(buf.history_size(), 0);
    }

    #[test]
    fn alternate_scroll_never_feeds_history() {
        let mut buf = buffer(10, 3);
        buf.use_alternate_buffer(true);
        buf.write(0, 0, "alt", TextStyle::default());
        buf.scroll_area(0, 2, 1);
        assert_eq!(buf.history_size(), 0);
    }

    #[test]
    fn scroll_down_inserts_at_top() {
        let mut buf = buffer(10, 3);
        buf.write(0, 0, "a", TextStyle::default());
        buf.write(0, 1, "b", TextStyle::default());
        buf.scroll_area(0, 2, -1);
        assert_eq!(row_text(&buf, 0), "");
        assert_eq!(row_text(&buf, 1), "a");
        assert_eq!(row_text(&buf, 2), "b");
    }

    #[test]
    fn history_bound_is_fifo() {
        let mut buf = TerminalTextBuffer::new(Size::new(10, 2), 2);
        for i in 0..4 {
            buf.write(0, 0, &format!("l{i}"), TextStyle::default());
            buf.scroll_area(0, 1, 1);
        }
        assert_eq!(buf.history_size(), 2);
        assert_eq!(buf.history_line(0).unwrap().text(), "l2");
        assert_eq!(buf.history_line(1).unwrap().text(), "l3");
    }

    #[test]
    fn alternate_switch_preserves_primary() {
        let mut buf = buffer(10, 3);
        buf.write(0, 0, "primary", TextStyle::default());
        buf.use_alternate_buffer(true);
        assert_eq!(row_text(&buf, 0), "");
        buf.write(0, 0, "alt", TextStyle::default());
        buf.use_alternate_buffer(false);
        assert_eq!(row_text(&buf, 0), "primary");
    }

    #[test]
    fn damage_tracks_writes() {
        let mut buf = buffer(10, 4);
        buf.drain_damage();
        buf.write(0, 2, "x", TextStyle::default());
        let damage = buf.drain_damage();
        assert_eq!(damage.len(), 1);
        assert_eq!(damage[0].0, 2);
        assert_eq!(damage[0].1.text(), "x");
        assert!(buf.drain_damage().is_empty());
    }

    #[test]
    fn wide_pair_integrity() {
        let mut buf = buffer(10, 2);
        buf.write(0, 0, "\u{4e16}", TextStyle::default());
        assert!(buf.cell(Position::new(0, 1)).is_wide_continuation());
        // Overwriting the continuation blanks the lead.
        buf.write_cell(0, 1, Cell::new('x'));
        assert_eq!(buf.cell(Position::new(0, 0)).ch, ' ');
        assert_eq!(buf.cell(Position::new(0, 1)).ch, 'x');
    }

    #[test]
    fn reflow_splits_long_line() {
        let mut buf = buffer(80, 24);
        let long: String = "abcdefgh".chars().cycle().take(80).collect();
        buf.write(0, 0, &long, TextStyle::default());
        buf.set_line_wrapped(0, true);
        buf.write(0, 1, "X", TextStyle::default());

        let cursor = buf.resize(Size::new(40, 24), Position::new(1, 1));
        assert_eq!(row_text(&buf, 0), long[..40].to_string());
        assert!(buf.line(0).wrapped());
        assert_eq!(row_text(&buf, 1), long[40..].to_string());
        assert!(buf.line(1).wrapped());
        assert_eq!(row_text(&buf, 2), "X");
        assert!(!buf.line(2).wrapped());
        assert_eq!(cursor, Position::new(2, 1));
    }

    #[test]
    fn reflow_joins_through_history() {
        let mut buf = TerminalTextBuffer::new(Size::new(40, 2), 100);
        let long: String = "0123456789".chars().cycle().take(40).collect();
        buf.write(0, 0, &long, TextStyle::default());
        buf.set_line_wrapped(0, true);
        buf.write(0, 1, "tail", TextStyle::default());
        // Push the wrapped head into history.
        buf.scroll_area(0, 1, 1);
        assert_eq!(buf.history_size(), 1);
        assert!(buf.history_line(0).unwrap().wrapped());

        let cursor = buf.resize(Size::new(80, 2), Position::new(0, 4));
        // The logical line fits on one row again.
        assert_eq!(row_text(&buf, 0), format!("{long}tail"));
        assert_eq!(buf.history_size(), 0);
        assert_eq!(cursor, Position::new(0, 44));
    }

    #[test]
    fn resize_round_trip_restores_content() {
        let mut buf = buffer(80, 24);
        buf.write(0, 0, "hello world", TextStyle::default());
        buf.write(0, 1, "second line", TextStyle::default());
        let before = buf.snapshot();

        let c = buf.resize(Size::new(40, 24), Position::new(1, 3));
        let c = buf.resize(Size::new(20, 12), c);
        buf.resize(Size::new(80, 24), c);
        assert_eq!(buf.snapshot(), before);
    }

    #[test]
    fn alternate_resize_clips() {
        let mut buf = buffer(20, 4);
        buf.use_alternate_buffer(true);
        let wide: String = "x".repeat(20);
        buf.write(0, 0, &wide, TextStyle::default());
        buf.resize(Size::new(10, 4), Position::new(0, 0));
        assert_eq!(row_text(&buf, 0), "x".repeat(10));
    }

    #[test]
    fn clear_area_keeps_background() {
        let mut buf = buffer(10, 2);
        buf.write(0, 0, "abcdef", TextStyle::default());
        let mut style = TextStyle::default();
        style.background = Color::Indexed(4);
        buf.clear_area(1, 0, 3, 0, Cell::blank_styled(style));
        assert_eq!(buf.cell(Position::new(0, 2)).style.background, Color::Indexed(4));
        assert_eq!(buf.cell(Position::new(0, 0)).ch, 'a');
        assert_eq!(buf.cell(Position::new(0, 4)).ch, 'e');
    }
}
