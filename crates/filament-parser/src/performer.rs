use filament_common::actions::{
    Charset, ControlAction, CsiAction, DynamicColor, EraseMode, EscAction, Mode, OscAction,
    SgrAttribute, TerminalAction,
};
use filament_common::types::Color;
use tracing::{debug, trace};
use vte::{Params, Perform};

/// Translates vte callbacks into [`TerminalAction`]s.
///
/// `dispatched` flips whenever a callback completed a unit of work; the
/// emulator uses it to decide when one `next()` step is done.
pub struct ActionCollector {
    pub actions: Vec<TerminalAction>,
    pub dispatched: bool,
}

impl ActionCollector {
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
            dispatched: false,
        }
    }

    pub fn take_actions(&mut self) -> Vec<TerminalAction> {
        self.dispatched = false;
        std::mem::take(&mut self.actions)
    }
}

impl Default for ActionCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// First sub-parameter of the parameter group at `index`, with a default.
/// Zero parses to the default as well: CSI counts default to 1 and treat
/// an explicit 0 the same way.
fn param_or(params: &Params, index: usize, default: u16) -> u16 {
    params
        .iter()
        .nth(index)
        .map(|group| group[0])
        .filter(|&v| v > 0)
        .unwrap_or(default)
}

/// Like `param_or` but keeps an explicit 0 (erase selectors).
fn raw_param(params: &Params, index: usize, default: u16) -> u16 {
    params.iter().nth(index).map(|g| g[0]).unwrap_or(default)
}

fn erase_mode(selector: u16) -> Option<EraseMode> {
    match selector {
        0 => Some(EraseMode::ToEnd),
        1 => Some(EraseMode::ToStart),
        2 => Some(EraseMode::All),
        3 => Some(EraseMode::Saved),
        _ => None,
    }
}

/// Parse the tail of an extended-color introducer (after the 38/48).
/// Handles `5;idx`, `2;r;g;b` and the colon subforms `:5:idx`,
/// `:2:r:g:b`, `:2::r:g:b` (with a color-space id).
fn extended_color(tail: &[u16]) -> Option<Color> {
    match *tail.first()? {
        5 => tail.get(1).map(|&idx| Color::Indexed(idx.min(255) as u8)),
        2 => {
            let rgb = if tail.len() >= 5 { &tail[tail.len() - 3..] } else { tail.get(1..4)? };
            Some(Color::Rgb(
                (*rgb.first()?).min(255) as u8,
                (*rgb.get(1)?).min(255) as u8,
                (*rgb.get(2)?).min(255) as u8,
            ))
        }
        _ => None,
    }
}

fn parse_sgr(params: &Params) -> Vec<SgrAttribute> {
    let groups: Vec<Vec<u16>> = params.iter().map(|g| g.to_vec()).collect();
    if groups.is_empty() {
        return vec![SgrAttribute::Reset];
    }
    let mut attrs = Vec::new();
    let mut i = 0;
    while i < groups.len() {
        let group = &groups[i];
        let code = group[0];
        match code {
            0 => attrs.push(SgrAttribute::Reset),
            1 => attrs.push(SgrAttribute::Bold),
            2 => attrs.push(SgrAttribute::Dim),
            3 => attrs.push(SgrAttribute::Italic),
            4 => attrs.push(SgrAttribute::Underline),
            5 => attrs.push(SgrAttribute::Blink),
            6 => attrs.push(SgrAttribute::RapidBlink),
            7 => attrs.push(SgrAttribute::Inverse),
            8 => attrs.push(SgrAttribute::Hidden),
            9 => attrs.push(SgrAttribute::Strikethrough),
            21 => attrs.push(SgrAttribute::DoubleUnderline),
            22 => attrs.push(SgrAttribute::NormalIntensity),
            23 => attrs.push(SgrAttribute::NoItalic),
            24 => attrs.push(SgrAttribute::NoUnderline),
            25 => attrs.push(SgrAttribute::NoBlink),
            27 => attrs.push(SgrAttribute::NoInverse),
            28 => attrs.push(SgrAttribute::NoHidden),
            29 => attrs.push(SgrAttribute::NoStrikethrough),
            30..=37 => attrs.push(SgrAttribute::Foreground(Color::from_ansi((code - 30) as u8))),
            38 | 48 => {
                let color = if group.len() > 1 {
                    // Colon subform: everything lives in this group.
                    extended_color(&group[1..])
                } else {
                    // Semicolon form: consume the following groups.
                    let tail: Vec<u16> =
                        groups[i + 1..].iter().take(4).map(|g| g[0]).collect();
                    let color = extended_color(&tail);
                    if color.is_some() {
                        i += if tail.first() == Some(&5) { 2 } else { 4 };
                    }
                    color
                };
                match color {
                    Some(c) if code == 38 => attrs.push(SgrAttribute::Foreground(c)),
                    Some(c) => attrs.push(SgrAttribute::Background(c)),
                    None => debug!(code, "malformed extended color, ignored"),
                }
            }
            39 => attrs.push(SgrAttribute::Foreground(Color::Default)),
            40..=47 => attrs.push(SgrAttribute::Background(Color::from_ansi((code - 40) as u8))),
            49 => attrs.push(SgrAttribute::Background(Color::Default)),
            90..=97 => {
                attrs.push(SgrAttribute::Foreground(Color::from_ansi((code - 90 + 8) as u8)))
            }
            100..=107 => {
                attrs.push(SgrAttribute::Background(Color::from_ansi((code - 100 + 8) as u8)))
            }
            _ => debug!(code, "unhandled SGR parameter"),
        }
        i += 1;
    }
    attrs
}

impl ActionCollector {
    fn push(&mut self, action: TerminalAction) {
        self.actions.push(action);
    }

    fn osc_color_op(&mut self, slot: DynamicColor, payload: Option<&[u8]>) {
        let Some(payload) = payload else { return };
        match std::str::from_utf8(payload) {
            Ok("?") => self.push(TerminalAction::Osc(OscAction::QueryDynamicColor(slot))),
            Ok(spec) => match Color::parse_spec(spec) {
                Some(color) => {
                    self.push(TerminalAction::Osc(OscAction::SetDynamicColor { slot, color }))
                }
                None => debug!(?slot, spec, "unparseable dynamic color spec"),
            },
            Err(_) => debug!(?slot, "non-UTF-8 dynamic color payload"),
        }
    }
}

impl Perform for ActionCollector {
    fn print(&mut self, c: char) {
        // Printable text normally flows through the stream hot path; this
        // fires only for characters that arrived glued to a sequence.
        trace!(?c, "print via parser");
        self.dispatched = true;
        if let Some(TerminalAction::Print(s)) = self.actions.last_mut() {
            s.push(c);
        } else {
            self.push(TerminalAction::Print(c.to_string()));
        }
    }

    fn execute(&mut self, byte: u8) {
        trace!(byte, "execute");
        self.dispatched = true;
        let action = match byte {
            0x07 => ControlAction::Bell,
            0x08 => ControlAction::Backspace,
            0x09 => ControlAction::Tab,
            0x0a => ControlAction::LineFeed,
            0x0b => ControlAction::VerticalTab,
            0x0c => ControlAction::FormFeed,
            0x0d => ControlAction::CarriageReturn,
            0x0e => ControlAction::ShiftOut,
            0x0f => ControlAction::ShiftIn,
            _ => {
                debug!(byte, "unhandled C0 control");
                return;
            }
        };
        self.push(TerminalAction::Control(action));
    }

    fn hook(&mut self, _params: &Params, intermediates: &[u8], _ignore: bool, action: char) {
        // Device control strings are consumed and ignored.
        debug!(?intermediates, action = ?action, "DCS ignored");
    }

    fn put(&mut self, _byte: u8) {}

    fn unhook(&mut self) {
        self.dispatched = true;
    }

    fn osc_dispatch(&mut self, params: &[&[u8]], _bell_terminated: bool) {
        self.dispatched = true;
        let Some(number) = params
            .first()
            .and_then(|p| std::str::from_utf8(p).ok())
            .and_then(|s| s.parse::<u16>().ok())
        else {
            debug!("OSC without a numeric selector, ignored");
            return;
        };
        match number {
            0 | 2 => {
                if let Some(title) = params.get(1).and_then(|p| std::str::from_utf8(p).ok()) {
                    self.push(TerminalAction::Osc(OscAction::SetTitle(title.to_string())));
                }
            }
            1 => {
                if let Some(name) = params.get(1).and_then(|p| std::str::from_utf8(p).ok()) {
                    self.push(TerminalAction::Osc(OscAction::SetIconName(name.to_string())));
                }
            }
            4 => {
                // Pairs of index;spec; "?" queries the current value.
                let mut rest = params[1..].iter();
                while let (Some(idx), Some(spec)) = (rest.next(), rest.next()) {
                    let Some(index) = std::str::from_utf8(idx)
                        .ok()
                        .and_then(|s| s.parse::<u16>().ok())
                        .filter(|&i| i < 256)
                    else {
                        continue;
                    };
                    let index = index as u8;
                    match std::str::from_utf8(spec) {
                        Ok("?") => self.push(TerminalAction::Osc(OscAction::QueryPaletteColor(index))),
                        Ok(spec) => match Color::parse_spec(spec) {
                            Some(color) => self.push(TerminalAction::Osc(
                                OscAction::SetPaletteColor { index, color },
                            )),
                            None => debug!(index, spec, "unparseable palette spec"),
                        },
                        Err(_) => {}
                    }
                }
            }
            8 => {
                let id = params.get(1).and_then(|p| {
                    std::str::from_utf8(p).ok().and_then(|s| {
                        s.split(':')
                            .find_map(|kv| kv.strip_prefix("id="))
                            .map(str::to_string)
                    })
                });
                let uri = params
                    .get(2)
                    .and_then(|p| std::str::from_utf8(p).ok())
                    .filter(|s| !s.is_empty())
                    .map(str::to_string);
                self.push(TerminalAction::Osc(OscAction::Hyperlink { id, uri }));
            }
            10 => self.osc_color_op(DynamicColor::Foreground, params.get(1).copied()),
            11 => self.osc_color_op(DynamicColor::Background, params.get(1).copied()),
            12 => self.osc_color_op(DynamicColor::Cursor, params.get(1).copied()),
            104 => {
                if params.len() <= 1 {
                    self.push(TerminalAction::Osc(OscAction::ResetPaletteColor(None)));
                } else {
                    for p in &params[1..] {
                        if let Some(index) = std::str::from_utf8(p)
                            .ok()
                            .and_then(|s| s.parse::<u16>().ok())
                            .filter(|&i| i < 256)
                        {
                            self.push(TerminalAction::Osc(OscAction::ResetPaletteColor(Some(
                                index as u8,
                            ))));
                        }
                    }
                }
            }
            110 => self.push(TerminalAction::Osc(OscAction::ResetDynamicColor(
                DynamicColor::Foreground,
            ))),
            111 => self.push(TerminalAction::Osc(OscAction::ResetDynamicColor(
                DynamicColor::Background,
            ))),
            112 => self.push(TerminalAction::Osc(OscAction::ResetDynamicColor(
                DynamicColor::Cursor,
            ))),
            _ => debug!(number, "unhandled OSC"),
        }
    }

    fn csi_dispatch(&mut self, params: &Params, intermediates: &[u8], ignore: bool, action: char) {
        self.dispatched = true;
        if ignore {
            debug!(action = ?action, "over-long CSI ignored");
            return;
        }
        let private = intermediates.first() == Some(&b'?');
        if !intermediates.is_empty() && !private {
            // '>', '=', '!', '$', space… — xterm extensions we don't model.
            debug!(?intermediates, action = ?action, "CSI with intermediates ignored");
            return;
        }
        let csi = match (action, private) {
            ('A', false) => CsiAction::CursorUp(param_or(params, 0, 1)),
            ('B', false) => CsiAction::CursorDown(param_or(params, 0, 1)),
            ('C', false) => CsiAction::CursorForward(param_or(params, 0, 1)),
            ('D', false) => CsiAction::CursorBackward(param_or(params, 0, 1)),
            ('E', false) => CsiAction::CursorNextLine(param_or(params, 0, 1)),
            ('F', false) => CsiAction::CursorPrecedingLine(param_or(params, 0, 1)),
            ('G', false) | ('`', false) => CsiAction::CursorColumn(param_or(params, 0, 1)),
            ('d', false) => CsiAction::CursorRow(param_or(params, 0, 1)),
            ('a', false) => CsiAction::ColumnRelative(param_or(params, 0, 1)),
            ('e', false) => CsiAction::RowRelative(param_or(params, 0, 1)),
            ('H', false) | ('f', false) => CsiAction::CursorPosition {
                row: param_or(params, 0, 1),
                col: param_or(params, 1, 1),
            },
            ('J', false) => match erase_mode(raw_param(params, 0, 0)) {
                Some(mode) => CsiAction::EraseDisplay(mode),
                None => return,
            },
            ('K', false) => match erase_mode(raw_param(params, 0, 0)) {
                Some(mode) => CsiAction::EraseLine(mode),
                None => return,
            },
            ('L', false) => CsiAction::InsertLines(param_or(params, 0, 1)),
            ('M', false) => CsiAction::DeleteLines(param_or(params, 0, 1)),
            ('@', false) => CsiAction::InsertCharacters(param_or(params, 0, 1)),
            ('P', false) => CsiAction::DeleteCharacters(param_or(params, 0, 1)),
            ('X', false) => CsiAction::EraseCharacters(param_or(params, 0, 1)),
            ('S', false) => CsiAction::ScrollUp(param_or(params, 0, 1)),
            ('T', false) => {
                if params.len() > 1 {
                    // Multi-parameter T is mouse highlight tracking.
                    debug!("highlight mouse tracking ignored");
                    return;
                }
                CsiAction::ScrollDown(param_or(params, 0, 1))
            }
            ('r', false) => CsiAction::SetScrollRegion {
                top: param_or(params, 0, 1),
                bottom: params.iter().nth(1).map(|g| g[0]).filter(|&v| v > 0),
            },
            ('m', false) => CsiAction::SetGraphicsRendition(parse_sgr(params)),
            ('h', _) | ('l', _) => {
                let modes: Vec<Mode> = params
                    .iter()
                    .map(|g| {
                        if private {
                            Mode::DecPrivate(g[0])
                        } else {
                            Mode::Ansi(g[0])
                        }
                    })
                    .collect();
                if action == 'h' {
                    CsiAction::SetMode(modes)
                } else {
                    CsiAction::ResetMode(modes)
                }
            }
            ('n', false) => CsiAction::DeviceStatusReport(raw_param(params, 0, 0)),
            ('c', false) => CsiAction::DeviceAttributes,
            ('b', false) => CsiAction::Repeat(param_or(params, 0, 1)),
            ('I', false) => CsiAction::CursorForwardTab(param_or(params, 0, 1)),
            ('Z', false) => CsiAction::CursorBackwardTab(param_or(params, 0, 1)),
            ('g', false) => CsiAction::TabClear(raw_param(params, 0, 0)),
            ('s', false) => CsiAction::SaveCursor,
            ('u', false) => CsiAction::RestoreCursor,
            ('t', false) => {
                debug!("window manipulation ignored");
                return;
            }
            _ => {
                debug!(action = ?action, private, "unhandled CSI, ignored");
                return;
            }
        };
        self.push(TerminalAction::Csi(csi));
    }

    fn esc_dispatch(&mut self, intermediates: &[u8], ignore: bool, byte: u8) {
        self.dispatched = true;
        if ignore {
            return;
        }
        if let Some(&designator) = intermediates.first() {
            let slot = match designator {
                b'(' => 0,
                b')' => 1,
                b'*' => 2,
                b'+' => 3,
                _ => {
                    debug!(designator, byte, "unhandled ESC intermediate");
                    return;
                }
            };
            let charset = match byte {
                b'B' => Charset::Ascii,
                b'0' => Charset::DecSpecial,
                b'A' => Charset::UnitedKingdom,
                _ => {
                    debug!(byte, "unknown charset designator, using ASCII");
                    Charset::Ascii
                }
            };
            self.push(TerminalAction::Esc(EscAction::DesignateCharset { slot, charset }));
            return;
        }
        let esc = match byte {
            b'D' => EscAction::Index,
            b'E' => EscAction::NextLine,
            b'H' => EscAction::TabSet,
            b'M' => EscAction::ReverseIndex,
            b'7' => EscAction::SaveCursor,
            b'8' => EscAction::RestoreCursor,
            b'=' => EscAction::KeypadApplicationMode,
            b'>' => EscAction::KeypadNumericMode,
            b'c' => EscAction::Reset,
            b'\\' => return, // ST after an ignored string
            _ => {
                debug!(byte, "unhandled ESC dispatch");
                return;
            }
        };
        self.push(TerminalAction::Esc(esc));
    }
}
