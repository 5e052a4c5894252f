use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::types::Position;

/// A key the user pressed, before encoding into PTY bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyCode {
    Char(char),
    Enter,
    Tab,
    Backspace,
    Escape,
    Up,
    Down,
    Right,
    Left,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,
    F(u8),
    /// A numeric-keypad key, carrying the character it produces in
    /// numeric mode ('0'..'9', '.', '+', '-', '*', '/', '=', ',' or
    /// '\r' for keypad Enter).
    Keypad(char),
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct KeyModifiers: u8 {
        const SHIFT = 1 << 0;
        const ALT   = 1 << 1;
        const CTRL  = 1 << 2;
    }
}

impl KeyModifiers {
    /// The xterm modifier parameter: 1 + bitmask(shift=1, alt=2, ctrl=4).
    pub fn xterm_code(self) -> u8 {
        let mut code = 1;
        if self.contains(KeyModifiers::SHIFT) {
            code += 1;
        }
        if self.contains(KeyModifiers::ALT) {
            code += 2;
        }
        if self.contains(KeyModifiers::CTRL) {
            code += 4;
        }
        code
    }
}

/// Mouse tracking protocol requested by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MouseMode {
    #[default]
    Off,
    /// DECSET 9: press only.
    X10,
    /// DECSET 1000: press and release.
    Normal,
    /// DECSET 1002: plus motion while a button is held.
    ButtonEvent,
    /// DECSET 1003: all motion.
    AnyEvent,
}

/// Coordinate encoding for mouse reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MouseFormat {
    /// Legacy single-byte coordinates (limited to 223).
    #[default]
    X10,
    /// DECSET 1005: UTF-8 coordinates.
    Utf8,
    /// DECSET 1006: SGR parameters.
    Sgr,
}

/// Snapshot of the mode state that input encoding depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputModes {
    pub application_cursor_keys: bool,
    pub application_keypad: bool,
    pub bracketed_paste: bool,
    pub mouse_mode: MouseMode,
    pub mouse_format: MouseFormat,
}

impl Default for InputModes {
    fn default() -> Self {
        Self {
            application_cursor_keys: false,
            application_keypad: false,
            bracketed_paste: false,
            mouse_mode: MouseMode::Off,
            mouse_format: MouseFormat::X10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
    WheelUp,
    WheelDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseEventKind {
    Press,
    Release,
    /// Motion with a button held (or none, under any-event tracking).
    Motion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseEvent {
    pub kind: MouseEventKind,
    pub button: Option<MouseButton>,
    /// 0-based cell position.
    pub position: Position,
    pub modifiers: KeyModifiers,
}
