//! Pull-based decoder for the terminal output stream.
//!
//! [`Emulator::next`] consumes exactly one unit of work — a run of
//! printable text via the stream hot path, or one control/escape
//! dispatch — and returns the resulting [`TerminalAction`]s. Escape
//! decoding is delegated to the `vte` state machine (VT500 parser with
//! xterm extensions), fed character by character from the stream.

pub mod performer;
pub mod stream;

use filament_common::actions::TerminalAction;
use filament_common::error::{FilamentError, Result};
use tracing::debug;

pub use performer::ActionCollector;
pub use stream::{ArrayDataStream, TerminalDataStream, TtyDataStream};

/// Upper bound on one printable run, to keep damage granular.
const MAX_TEXT_RUN: usize = 1024;

/// Coarse mirror of the parser state, maintained for two decisions only:
/// whether the printable hot path may run (ground) and whether sequence
/// bytes must be ASCII (CSI). The authoritative machine lives in `vte`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Ground,
    Escape,
    Csi,
    Str,
}

pub struct Emulator<S: TerminalDataStream> {
    stream: S,
    parser: vte::Parser,
    collector: ActionCollector,
    phase: Phase,
    eof: bool,
}

impl<S: TerminalDataStream> Emulator<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            parser: vte::Parser::new(),
            collector: ActionCollector::new(),
            phase: Phase::Ground,
            eof: false,
        }
    }

    /// True until the stream signals end.
    pub fn has_next(&self) -> bool {
        !self.eof
    }

    /// Consume one unit of work. `StreamEnded` is the terminal signal;
    /// afterwards `has_next` reports false.
    pub fn next(&mut self) -> Result<Vec<TerminalAction>> {
        let first = match self.stream.get_char() {
            Ok(ch) => ch,
            Err(e) => {
                if e.is_disconnect() {
                    self.eof = true;
                }
                return Err(e);
            }
        };

        if self.phase == Phase::Ground && !stream::is_control_char(first) {
            self.stream.push_back_char(first);
            let run = self.stream.read_non_control_characters(MAX_TEXT_RUN)?;
            return Ok(vec![TerminalAction::Print(run)]);
        }

        self.feed(first);
        while !self.collector.dispatched {
            let ch = match self.next_sequence_char() {
                Ok(ch) => ch,
                Err(FilamentError::StreamEnded) => {
                    // Mid-sequence close: surface whatever completed.
                    self.eof = true;
                    break;
                }
                Err(FilamentError::Parse(reason)) => {
                    // Non-ASCII inside CSI. Abort the sequence the way the
                    // wire would: CAN returns the machine to ground.
                    debug!(%reason, "aborting malformed control sequence");
                    self.feed('\u{18}');
                    self.collector.dispatched = true;
                    break;
                }
                Err(e) => return Err(e),
            };
            self.feed(ch);
        }
        Ok(self.collector.take_actions())
    }

    fn next_sequence_char(&mut self) -> Result<char> {
        if self.phase == Phase::Csi {
            self.stream.get_ascii()
        } else {
            self.stream.get_char()
        }
    }

    /// Advance the vte machine by one character, tracking the coarse
    /// phase alongside it.
    fn feed(&mut self, ch: char) {
        self.phase = match (self.phase, ch) {
            // CAN and SUB abort any sequence; ESC restarts one.
            (_, '\u{18}') | (_, '\u{1a}') => Phase::Ground,
            (_, '\u{1b}') => Phase::Escape,
            (Phase::Escape, '[') => Phase::Csi,
            (Phase::Escape, ']') | (Phase::Escape, 'P') => Phase::Str,
            (Phase::Escape, 'X') | (Phase::Escape, '^') | (Phase::Escape, '_') => Phase::Str,
            // Intermediates keep collecting; anything else dispatches.
            (Phase::Escape, '\u{20}'..='\u{2f}') => Phase::Escape,
            (Phase::Escape, _) => Phase::Ground,
            (Phase::Csi, '\u{40}'..='\u{7e}') => Phase::Ground,
            (Phase::Csi, _) => Phase::Csi,
            // Strings end on BEL or ST (ESC \ handled above).
            (Phase::Str, '\u{07}') => Phase::Ground,
            (Phase::Str, _) => Phase::Str,
            (Phase::Ground, _) => Phase::Ground,
        };
        let mut buf = [0u8; 4];
        for &byte in ch.encode_utf8(&mut buf).as_bytes() {
            self.parser.advance(&mut self.collector, byte);
        }
    }
}

impl Emulator<ArrayDataStream> {
    /// Decode a complete in-memory byte buffer, for tests and replay.
    pub fn drain_bytes(data: &[u8]) -> Vec<TerminalAction> {
        let mut emulator = Emulator::new(ArrayDataStream::new(data.to_vec()));
        let mut actions = Vec::new();
        while emulator.has_next() {
            match emulator.next() {
                Ok(mut batch) => actions.append(&mut batch),
                Err(_) => break,
            }
        }
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filament_common::actions::*;
    use filament_common::types::Color;

    fn parse(data: &[u8]) -> Vec<TerminalAction> {
        Emulator::drain_bytes(data)
    }

    #[test]
    fn plain_text_is_one_run() {
        let actions = parse(b"Hello, World!");
        assert_eq!(
            actions,
            vec![TerminalAction::Print("Hello, World!".into())]
        );
    }

    #[test]
    fn control_characters_split_runs() {
        let actions = parse(b"Hello\nWorld\r\n");
        assert_eq!(
            actions,
            vec![
                TerminalAction::Print("Hello".into()),
                TerminalAction::Control(ControlAction::LineFeed),
                TerminalAction::Print("World".into()),
                TerminalAction::Control(ControlAction::CarriageReturn),
                TerminalAction::Control(ControlAction::LineFeed),
            ]
        );
    }

    #[test]
    fn one_unit_per_next() {
        let mut emulator = Emulator::new(ArrayDataStream::new(b"ab\x1b[2Acd".to_vec()));
        assert_eq!(
            emulator.next().unwrap(),
            vec![TerminalAction::Print("ab".into())]
        );
        assert_eq!(
            emulator.next().unwrap(),
            vec![TerminalAction::Csi(CsiAction::CursorUp(2))]
        );
        assert_eq!(
            emulator.next().unwrap(),
            vec![TerminalAction::Print("cd".into())]
        );
        assert!(matches!(
            emulator.next(),
            Err(FilamentError::StreamEnded)
        ));
        assert!(!emulator.has_next());
    }

    #[test]
    fn cursor_motion_defaults() {
        assert_eq!(
            parse(b"\x1b[A"),
            vec![TerminalAction::Csi(CsiAction::CursorUp(1))]
        );
        // Explicit zero also means one.
        assert_eq!(
            parse(b"\x1b[0B"),
            vec![TerminalAction::Csi(CsiAction::CursorDown(1))]
        );
        assert_eq!(
            parse(b"\x1b[10;20H"),
            vec![TerminalAction::Csi(CsiAction::CursorPosition { row: 10, col: 20 })]
        );
        // CUP with missing parameters is home.
        assert_eq!(
            parse(b"\x1b[H"),
            vec![TerminalAction::Csi(CsiAction::CursorPosition { row: 1, col: 1 })]
        );
    }

    #[test]
    fn erase_selectors_keep_zero() {
        assert_eq!(
            parse(b"\x1b[J"),
            vec![TerminalAction::Csi(CsiAction::EraseDisplay(EraseMode::ToEnd))]
        );
        assert_eq!(
            parse(b"\x1b[2J"),
            vec![TerminalAction::Csi(CsiAction::EraseDisplay(EraseMode::All))]
        );
        assert_eq!(
            parse(b"\x1b[1K"),
            vec![TerminalAction::Csi(CsiAction::EraseLine(EraseMode::ToStart))]
        );
    }

    #[test]
    fn sgr_basic_and_extended() {
        assert_eq!(
            parse(b"\x1b[31;42m"),
            vec![TerminalAction::Csi(CsiAction::SetGraphicsRendition(vec![
                SgrAttribute::Foreground(Color::Indexed(1)),
                SgrAttribute::Background(Color::Indexed(2)),
            ]))]
        );
        assert_eq!(
            parse(b"\x1b[38;5;123m"),
            vec![TerminalAction::Csi(CsiAction::SetGraphicsRendition(vec![
                SgrAttribute::Foreground(Color::Indexed(123)),
            ]))]
        );
        assert_eq!(
            parse(b"\x1b[48;2;255;128;0m"),
            vec![TerminalAction::Csi(CsiAction::SetGraphicsRendition(vec![
                SgrAttribute::Background(Color::Rgb(255, 128, 0)),
            ]))]
        );
        // Colon subform, with and without a color-space id.
        assert_eq!(
            parse(b"\x1b[38:5:17m"),
            vec![TerminalAction::Csi(CsiAction::SetGraphicsRendition(vec![
                SgrAttribute::Foreground(Color::Indexed(17)),
            ]))]
        );
        assert_eq!(
            parse(b"\x1b[38:2::10:20:30m"),
            vec![TerminalAction::Csi(CsiAction::SetGraphicsRendition(vec![
                SgrAttribute::Foreground(Color::Rgb(10, 20, 30)),
            ]))]
        );
    }

    #[test]
    fn sgr_truecolor_followed_by_more_params() {
        assert_eq!(
            parse(b"\x1b[38;2;10;20;30;1m"),
            vec![TerminalAction::Csi(CsiAction::SetGraphicsRendition(vec![
                SgrAttribute::Foreground(Color::Rgb(10, 20, 30)),
                SgrAttribute::Bold,
            ]))]
        );
    }

    #[test]
    fn empty_sgr_is_reset() {
        assert_eq!(
            parse(b"\x1b[m"),
            vec![TerminalAction::Csi(CsiAction::SetGraphicsRendition(vec![
                SgrAttribute::Reset,
            ]))]
        );
    }

    #[test]
    fn dec_private_modes() {
        assert_eq!(
            parse(b"\x1b[?25l"),
            vec![TerminalAction::Csi(CsiAction::ResetMode(vec![
                Mode::DecPrivate(25)
            ]))]
        );
        assert_eq!(
            parse(b"\x1b[?1049h"),
            vec![TerminalAction::Csi(CsiAction::SetMode(vec![
                Mode::DecPrivate(1049)
            ]))]
        );
        assert_eq!(
            parse(b"\x1b[4h"),
            vec![TerminalAction::Csi(CsiAction::SetMode(vec![Mode::Ansi(4)]))]
        );
        assert_eq!(
            parse(b"\x1b[?1000;1006h"),
            vec![TerminalAction::Csi(CsiAction::SetMode(vec![
                Mode::DecPrivate(1000),
                Mode::DecPrivate(1006),
            ]))]
        );
    }

    #[test]
    fn scroll_region() {
        assert_eq!(
            parse(b"\x1b[5;10r"),
            vec![TerminalAction::Csi(CsiAction::SetScrollRegion {
                top: 5,
                bottom: Some(10)
            })]
        );
        assert_eq!(
            parse(b"\x1b[r"),
            vec![TerminalAction::Csi(CsiAction::SetScrollRegion {
                top: 1,
                bottom: None
            })]
        );
    }

    #[test]
    fn osc_title_bel_and_st() {
        let expected = vec![TerminalAction::Osc(OscAction::SetTitle("My Term".into()))];
        assert_eq!(parse(b"\x1b]0;My Term\x07"), expected);
        assert_eq!(parse(b"\x1b]2;My Term\x1b\\"), expected);
    }

    #[test]
    fn osc_hyperlink() {
        assert_eq!(
            parse(b"\x1b]8;id=t1;https://example.com\x07"),
            vec![TerminalAction::Osc(OscAction::Hyperlink {
                id: Some("t1".into()),
                uri: Some("https://example.com".into()),
            })]
        );
        assert_eq!(
            parse(b"\x1b]8;;\x07"),
            vec![TerminalAction::Osc(OscAction::Hyperlink { id: None, uri: None })]
        );
    }

    #[test]
    fn osc_palette() {
        assert_eq!(
            parse(b"\x1b]4;17;rgb:ff/00/80\x07"),
            vec![TerminalAction::Osc(OscAction::SetPaletteColor {
                index: 17,
                color: Color::Rgb(255, 0, 128),
            })]
        );
        assert_eq!(
            parse(b"\x1b]4;17;?\x07"),
            vec![TerminalAction::Osc(OscAction::QueryPaletteColor(17))]
        );
        assert_eq!(
            parse(b"\x1b]10;?\x07"),
            vec![TerminalAction::Osc(OscAction::QueryDynamicColor(
                DynamicColor::Foreground
            ))]
        );
    }

    #[test]
    fn esc_dispatches() {
        assert_eq!(parse(b"\x1b7"), vec![TerminalAction::Esc(EscAction::SaveCursor)]);
        assert_eq!(parse(b"\x1b8"), vec![TerminalAction::Esc(EscAction::RestoreCursor)]);
        assert_eq!(parse(b"\x1bM"), vec![TerminalAction::Esc(EscAction::ReverseIndex)]);
        assert_eq!(
            parse(b"\x1b(0"),
            vec![TerminalAction::Esc(EscAction::DesignateCharset {
                slot: 0,
                charset: Charset::DecSpecial,
            })]
        );
        assert_eq!(
            parse(b"\x1b)B"),
            vec![TerminalAction::Esc(EscAction::DesignateCharset {
                slot: 1,
                charset: Charset::Ascii,
            })]
        );
    }

    #[test]
    fn can_aborts_sequence() {
        // CAN in the middle of a CSI returns to ground; the following
        // text prints normally.
        let actions = parse(b"\x1b[12\x18ok");
        assert_eq!(actions, vec![TerminalAction::Print("ok".into())]);
    }

    #[test]
    fn unknown_csi_is_ignored() {
        let actions = parse(b"\x1b[99y after");
        assert_eq!(actions, vec![TerminalAction::Print(" after".into())]);
    }

    #[test]
    fn unknown_dcs_is_consumed() {
        let actions = parse(b"\x1bPq#0;1;2\x1b\\done");
        assert_eq!(actions, vec![TerminalAction::Print("done".into())]);
    }

    #[test]
    fn utf8_text_passes_through() {
        let actions = parse("héllo→\u{4e16}".as_bytes());
        assert_eq!(
            actions,
            vec![TerminalAction::Print("héllo→\u{4e16}".into())]
        );
    }

    #[test]
    fn device_reports() {
        assert_eq!(
            parse(b"\x1b[6n"),
            vec![TerminalAction::Csi(CsiAction::DeviceStatusReport(6))]
        );
        assert_eq!(
            parse(b"\x1b[c"),
            vec![TerminalAction::Csi(CsiAction::DeviceAttributes)]
        );
    }

    mod robustness {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Arbitrary byte soup must never panic and must leave the
            /// emulator usable for well-formed input afterwards.
            #[test]
            fn parser_survives_byte_soup(data in proptest::collection::vec(any::<u8>(), 0..512)) {
                let mut bytes = data;
                bytes.extend_from_slice(b"\x18\x1b[5Aok");
                let actions = Emulator::drain_bytes(&bytes);
                // The tail must have decoded: the cursor motion and the
                // trailing text appear in order.
                let tail: Vec<&TerminalAction> = actions
                    .iter()
                    .filter(|a| {
                        matches!(a, TerminalAction::Csi(CsiAction::CursorUp(5)))
                            || matches!(a, TerminalAction::Print(s) if s.ends_with("ok"))
                    })
                    .collect();
                prop_assert!(tail.len() >= 2, "tail not recovered: {actions:?}");
            }
        }
    }
}
