use filament_common::types::{Position, TextStyle};

use super::state::CharsetState;

/// Cursor state and operations.
///
/// `pending_wrap` implements the xterm deferred-wrap rule: a print at
/// the rightmost column leaves the cursor there and the wrap happens on
/// the next printable character. Any explicit motion clears the flag.
#[derive(Debug, Clone)]
pub struct Cursor {
    position: Position,
    pending_wrap: bool,
    visible: bool,
}

impl Cursor {
    pub fn new() -> Self {
        Self {
            position: Position::new(0, 0),
            pending_wrap: false,
            visible: true,
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// Move to an absolute position. Clears pending-wrap.
    pub fn set_position(&mut self, pos: Position) {
        self.position = pos;
        self.pending_wrap = false;
    }

    pub fn set_row(&mut self, row: u16) {
        self.position.row = row;
        self.pending_wrap = false;
    }

    pub fn set_column(&mut self, col: u16) {
        self.position.col = col;
        self.pending_wrap = false;
    }

    pub fn move_up(&mut self, n: u16, limit: u16) {
        self.position.row = self.position.row.saturating_sub(n).max(limit);
        self.pending_wrap = false;
    }

    pub fn move_down(&mut self, n: u16, limit: u16) {
        self.position.row = self.position.row.saturating_add(n).min(limit);
        self.pending_wrap = false;
    }

    pub fn move_left(&mut self, n: u16) {
        self.position.col = self.position.col.saturating_sub(n);
        self.pending_wrap = false;
    }

    pub fn move_right(&mut self, n: u16, limit: u16) {
        self.position.col = self.position.col.saturating_add(n).min(limit);
        self.pending_wrap = false;
    }

    pub fn pending_wrap(&self) -> bool {
        self.pending_wrap
    }

    pub fn set_pending_wrap(&mut self, pending: bool) {
        self.pending_wrap = pending;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::new()
    }
}

/// DECSC payload, kept per active screen.
#[derive(Debug, Clone)]
pub struct SavedCursor {
    pub position: Position,
    pub style: TextStyle,
    pub origin_mode: bool,
    pub pending_wrap: bool,
    pub charsets: CharsetState,
}
