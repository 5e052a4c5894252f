use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use unicode_width::UnicodeWidthChar;

/// Terminal dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub rows: u16,
    pub cols: u16,
}

impl Size {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { rows, cols }
    }
}

/// Cursor position, 0-indexed. The wire protocol is 1-based; conversion
/// happens at the dispatch boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    pub row: u16,
    pub col: u16,
}

impl Position {
    pub fn new(row: u16, col: u16) -> Self {
        Self { row, col }
    }
}

/// Where a resize request came from. The debounce applied before the PTY
/// is notified depends on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOrigin {
    User,
    Remote,
}

bitflags! {
    /// Style attribute mask for a cell.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct AttributeFlags: u16 {
        const BOLD          = 1 << 0;
        const DIM           = 1 << 1;
        const ITALIC        = 1 << 2;
        const UNDERLINE     = 1 << 3;
        const BLINK         = 1 << 4;
        const INVERSE       = 1 << 5;
        const HIDDEN        = 1 << 6;
        const STRIKETHROUGH = 1 << 7;
        const DOUBLE_UNDERLINE = 1 << 8;
        /// Marks the trailing half of a wide-character pair.
        const WIDE_CONTINUATION = 1 << 9;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Color {
    Rgb(u8, u8, u8),
    Indexed(u8),
    Default,
}

impl Color {
    /// Map one of the 16 base ANSI colors to a palette index.
    pub fn from_ansi(index: u8) -> Self {
        Color::Indexed(index)
    }

    /// Parse an X11-style color specification as used by OSC 4/10/11/12:
    /// `rgb:RRRR/GGGG/BBBB` (1-4 hex digits per channel) or `#RRGGBB`.
    pub fn parse_spec(spec: &str) -> Option<Self> {
        if let Some(rest) = spec.strip_prefix("rgb:") {
            let mut channels = rest.split('/');
            let r = parse_scaled_channel(channels.next()?)?;
            let g = parse_scaled_channel(channels.next()?)?;
            let b = parse_scaled_channel(channels.next()?)?;
            if channels.next().is_some() {
                return None;
            }
            return Some(Color::Rgb(r, g, b));
        }
        if let Some(hex) = spec.strip_prefix('#') {
            if hex.len() == 6 {
                let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
                let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
                let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
                return Some(Color::Rgb(r, g, b));
            }
        }
        None
    }

    /// Format as the `rgb:RRRR/GGGG/BBBB` form used in OSC query replies.
    pub fn to_spec(self) -> Option<String> {
        match self {
            Color::Rgb(r, g, b) => Some(format!(
                "rgb:{:04x}/{:04x}/{:04x}",
                u16::from(r) * 0x101,
                u16::from(g) * 0x101,
                u16::from(b) * 0x101
            )),
            _ => None,
        }
    }
}

/// Scale an 1-4 hex digit channel to 8 bits, keeping the high byte.
fn parse_scaled_channel(text: &str) -> Option<u8> {
    if text.is_empty() || text.len() > 4 {
        return None;
    }
    let value = u16::from_str_radix(text, 16).ok()?;
    let max = (1u32 << (4 * text.len() as u32)) - 1;
    Some(((u32::from(value) * 255 + max / 2) / max) as u8)
}

/// Foreground, background and attribute selection for a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextStyle {
    pub foreground: Color,
    pub background: Color,
    pub flags: AttributeFlags,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            foreground: Color::Default,
            background: Color::Default,
            flags: AttributeFlags::empty(),
        }
    }
}

/// Character cell in the terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub ch: char,
    pub style: TextStyle,
}

impl Cell {
    pub fn new(ch: char) -> Self {
        Self {
            ch,
            style: TextStyle::default(),
        }
    }

    pub fn styled(ch: char, style: TextStyle) -> Self {
        Self { ch, style }
    }

    pub fn blank() -> Self {
        Self::new(' ')
    }

    /// Blank cell carrying a style (used when erasing keeps the background).
    pub fn blank_styled(style: TextStyle) -> Self {
        Self { ch: ' ', style }
    }

    /// The trailing half of a wide-character pair.
    pub fn wide_continuation(mut style: TextStyle) -> Self {
        style.flags |= AttributeFlags::WIDE_CONTINUATION;
        Self { ch: ' ', style }
    }

    pub fn is_wide_continuation(&self) -> bool {
        self.style.flags.contains(AttributeFlags::WIDE_CONTINUATION)
    }

    /// Display width of the stored character (1 or 2 columns).
    pub fn width(&self) -> u16 {
        char_width(self.ch)
    }
}

impl Default for Cell {
    fn default() -> Self {
        Self::blank()
    }
}

/// Display width of a character in cells. Zero-width characters are not
/// stored as cells of their own; callers treat them as width 1 fallback.
pub fn char_width(ch: char) -> u16 {
    match UnicodeWidthChar::width(ch) {
        Some(2) => 2,
        _ => 1,
    }
}
