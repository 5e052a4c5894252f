use crate::types::Color;

/// One unit of work decoded from the output stream. The emulator produces
/// these; the terminal engine consumes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalAction {
    /// A run of printable text.
    Print(String),
    Control(ControlAction),
    Csi(CsiAction),
    Osc(OscAction),
    Esc(EscAction),
}

/// C0 control characters with display semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Bell,
    Backspace,
    Tab,
    LineFeed,
    VerticalTab,
    FormFeed,
    CarriageReturn,
    /// SO: invoke G1 into GL.
    ShiftOut,
    /// SI: invoke G0 into GL.
    ShiftIn,
}

/// A mode number in its namespace. Resolution to semantics happens in the
/// engine; the parser only records what was on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Ansi(u16),
    DecPrivate(u16),
}

/// Erase selector for ED / EL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EraseMode {
    /// 0: from the cursor to the end.
    ToEnd,
    /// 1: from the start through the cursor.
    ToStart,
    /// 2: everything.
    All,
    /// 3: scroll-back history (xterm).
    Saved,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CsiAction {
    CursorUp(u16),
    CursorDown(u16),
    CursorForward(u16),
    CursorBackward(u16),
    CursorNextLine(u16),
    CursorPrecedingLine(u16),
    /// CHA: absolute column, 1-based.
    CursorColumn(u16),
    /// VPA: absolute row, 1-based.
    CursorRow(u16),
    /// HPR
    ColumnRelative(u16),
    /// VPR
    RowRelative(u16),
    /// CUP / HVP, 1-based; (0,0) is treated as (1,1).
    CursorPosition { row: u16, col: u16 },
    EraseDisplay(EraseMode),
    EraseLine(EraseMode),
    InsertLines(u16),
    DeleteLines(u16),
    InsertCharacters(u16),
    DeleteCharacters(u16),
    EraseCharacters(u16),
    ScrollUp(u16),
    ScrollDown(u16),
    /// DECSTBM; `bottom` of `None` means the last row.
    SetScrollRegion { top: u16, bottom: Option<u16> },
    SetGraphicsRendition(Vec<SgrAttribute>),
    SetMode(Vec<Mode>),
    ResetMode(Vec<Mode>),
    /// DSR; 5 = status, 6 = cursor position report.
    DeviceStatusReport(u16),
    /// DA (primary).
    DeviceAttributes,
    /// REP: repeat the preceding printable character.
    Repeat(u16),
    /// CHT
    CursorForwardTab(u16),
    /// CBT
    CursorBackwardTab(u16),
    /// TBC; 0 = here, 3 = all.
    TabClear(u16),
    SaveCursor,
    RestoreCursor,
}

/// Dynamic color slots addressed by OSC 10/11/12.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DynamicColor {
    Foreground,
    Background,
    Cursor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OscAction {
    SetTitle(String),
    SetIconName(String),
    SetPaletteColor { index: u8, color: Color },
    QueryPaletteColor(u8),
    /// OSC 104; `None` resets the whole palette.
    ResetPaletteColor(Option<u8>),
    SetDynamicColor { slot: DynamicColor, color: Color },
    QueryDynamicColor(DynamicColor),
    ResetDynamicColor(DynamicColor),
    /// OSC 8; an absent uri ends the active hyperlink.
    Hyperlink { id: Option<String>, uri: Option<String> },
}

/// Character set designated into a G-slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Ascii,
    /// DEC special graphics (line drawing).
    DecSpecial,
    UnitedKingdom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscAction {
    /// ESC D: move down, scrolling within the region at the bottom.
    Index,
    /// ESC E
    NextLine,
    /// ESC H
    TabSet,
    /// ESC M
    ReverseIndex,
    /// ESC 7
    SaveCursor,
    /// ESC 8
    RestoreCursor,
    /// ESC =
    KeypadApplicationMode,
    /// ESC >
    KeypadNumericMode,
    /// ESC c
    Reset,
    /// ESC ( ) * + with a final designator; slot is 0..=3 for G0..G3.
    DesignateCharset { slot: u8, charset: Charset },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SgrAttribute {
    Reset,
    Bold,
    Dim,
    Italic,
    Underline,
    Blink,
    RapidBlink,
    Inverse,
    Hidden,
    Strikethrough,
    DoubleUnderline,
    /// SGR 22 clears both bold and dim.
    NormalIntensity,
    NoItalic,
    NoUnderline,
    NoBlink,
    NoInverse,
    NoHidden,
    NoStrikethrough,
    Foreground(Color),
    Background(Color),
}
