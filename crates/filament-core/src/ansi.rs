use filament_common::actions::{
    ControlAction, CsiAction, EscAction, Mode, OscAction, TerminalAction,
};
use filament_common::input::{MouseFormat, MouseMode};
use tracing::{debug, trace};

use crate::terminal::state::{ModeFlags, TerminalState};

/// Maps decoded [`TerminalAction`]s onto the terminal engine. This is
/// also where 1-based protocol coordinates become 0-based and where
/// mode numbers resolve to semantics.
pub struct ActionProcessor;

impl ActionProcessor {
    pub fn apply(state: &mut TerminalState, action: TerminalAction) {
        match action {
            TerminalAction::Print(text) => state.print_text(&text),
            TerminalAction::Control(control) => Self::apply_control(state, control),
            TerminalAction::Csi(csi) => Self::apply_csi(state, csi),
            TerminalAction::Osc(osc) => Self::apply_osc(state, osc),
            TerminalAction::Esc(esc) => Self::apply_esc(state, esc),
        }
    }

    fn apply_control(state: &mut TerminalState, control: ControlAction) {
        trace!(?control, "control");
        match control {
            ControlAction::Bell => state.bell(),
            ControlAction::Backspace => state.backspace(),
            ControlAction::Tab => state.horizontal_tab(),
            ControlAction::LineFeed | ControlAction::VerticalTab | ControlAction::FormFeed => {
                state.line_feed()
            }
            ControlAction::CarriageReturn => state.carriage_return(),
            ControlAction::ShiftOut => state.shift_out(),
            ControlAction::ShiftIn => state.shift_in(),
        }
    }

    fn apply_csi(state: &mut TerminalState, csi: CsiAction) {
        trace!(?csi, "csi");
        match csi {
            CsiAction::CursorUp(n) => state.cursor_up(n),
            CsiAction::CursorDown(n) => state.cursor_down(n),
            CsiAction::CursorForward(n) => state.cursor_forward(n),
            CsiAction::CursorBackward(n) => state.cursor_backward(n),
            CsiAction::CursorNextLine(n) => state.cursor_next_line(n),
            CsiAction::CursorPrecedingLine(n) => state.cursor_preceding_line(n),
            CsiAction::CursorColumn(col) => state.cursor_column(col.saturating_sub(1)),
            CsiAction::CursorRow(row) => state.cursor_row(row.saturating_sub(1)),
            CsiAction::ColumnRelative(n) => state.cursor_forward(n),
            CsiAction::RowRelative(n) => state.cursor_down(n),
            CsiAction::CursorPosition { row, col } => {
                state.set_cursor_position(row.saturating_sub(1), col.saturating_sub(1))
            }
            CsiAction::EraseDisplay(mode) => state.erase_display(mode),
            CsiAction::EraseLine(mode) => state.erase_line(mode),
            CsiAction::InsertLines(n) => state.insert_lines(n),
            CsiAction::DeleteLines(n) => state.delete_lines(n),
            CsiAction::InsertCharacters(n) => state.insert_characters(n),
            CsiAction::DeleteCharacters(n) => state.delete_characters(n),
            CsiAction::EraseCharacters(n) => state.erase_characters(n),
            CsiAction::ScrollUp(n) => state.scroll_up(n),
            CsiAction::ScrollDown(n) => state.scroll_down(n),
            CsiAction::SetScrollRegion { top, bottom } => {
                let bottom = bottom.unwrap_or(state.size().rows);
                state.set_scroll_region(top.saturating_sub(1), bottom.saturating_sub(1));
            }
            CsiAction::SetGraphicsRendition(attrs) => state.apply_sgr(&attrs),
            CsiAction::SetMode(modes) => {
                for mode in modes {
                    Self::set_mode(state, mode, true);
                }
            }
            CsiAction::ResetMode(modes) => {
                for mode in modes {
                    Self::set_mode(state, mode, false);
                }
            }
            CsiAction::DeviceStatusReport(code) => state.device_status_report(code),
            CsiAction::DeviceAttributes => state.device_attributes(),
            CsiAction::Repeat(n) => state.repeat_last(n),
            CsiAction::CursorForwardTab(n) => state.cursor_forward_tab(n),
            CsiAction::CursorBackwardTab(n) => state.cursor_backward_tab(n),
            CsiAction::TabClear(selector) => state.tab_clear(selector),
            CsiAction::SaveCursor => state.save_cursor(),
            CsiAction::RestoreCursor => state.restore_cursor(),
        }
    }

    fn apply_osc(state: &mut TerminalState, osc: OscAction) {
        trace!(?osc, "osc");
        match osc {
            OscAction::SetTitle(title) => state.set_title(title),
            OscAction::SetIconName(name) => debug!(name, "icon name ignored"),
            OscAction::SetPaletteColor { index, color } => state.set_palette_color(index, color),
            OscAction::QueryPaletteColor(index) => state.query_palette_color(index),
            OscAction::ResetPaletteColor(index) => state.reset_palette_color(index),
            OscAction::SetDynamicColor { slot, color } => state.set_dynamic_color(slot, color),
            OscAction::QueryDynamicColor(slot) => state.query_dynamic_color(slot),
            OscAction::ResetDynamicColor(slot) => state.reset_dynamic_color(slot),
            OscAction::Hyperlink { id: _, uri } => state.set_hyperlink(uri),
        }
    }

    fn apply_esc(state: &mut TerminalState, esc: EscAction) {
        trace!(?esc, "esc");
        match esc {
            EscAction::Index => state.index(),
            EscAction::NextLine => state.next_line(),
            EscAction::TabSet => state.tab_set(),
            EscAction::ReverseIndex => state.reverse_index(),
            EscAction::SaveCursor => state.save_cursor(),
            EscAction::RestoreCursor => state.restore_cursor(),
            EscAction::KeypadApplicationMode => {
                state.set_mode_flag(ModeFlags::APPLICATION_KEYPAD, true)
            }
            EscAction::KeypadNumericMode => {
                state.set_mode_flag(ModeFlags::APPLICATION_KEYPAD, false)
            }
            EscAction::Reset => state.full_reset(),
            EscAction::DesignateCharset { slot, charset } => {
                state.designate_charset(slot, charset)
            }
        }
    }

    fn set_mode(state: &mut TerminalState, mode: Mode, enabled: bool) {
        match mode {
            Mode::Ansi(4) => state.set_mode_flag(ModeFlags::INSERT, enabled),
            Mode::Ansi(number) => debug!(number, enabled, "unhandled ANSI mode"),
            Mode::DecPrivate(number) => match number {
                1 => state.set_mode_flag(ModeFlags::APPLICATION_CURSOR, enabled),
                3 => {
                    // DECCOLM: the column switch itself is a host resize
                    // concern, but the mandated side effects apply.
                    state.erase_display(filament_common::actions::EraseMode::All);
                    state.set_cursor_position(0, 0);
                    let rows = state.size().rows;
                    state.set_scroll_region(0, rows.saturating_sub(1));
                }
                6 => state.set_mode_flag(ModeFlags::ORIGIN, enabled),
                7 => state.set_mode_flag(ModeFlags::AUTOWRAP, enabled),
                9 => state.set_mouse_mode(if enabled { MouseMode::X10 } else { MouseMode::Off }),
                12 => state.set_mode_flag(ModeFlags::CURSOR_BLINK, enabled),
                25 => state.set_cursor_visible(enabled),
                45 => state.set_mode_flag(ModeFlags::REVERSE_WRAPAROUND, enabled),
                47 => state.set_alternate_screen(enabled, false, false),
                1000 => {
                    state.set_mouse_mode(if enabled { MouseMode::Normal } else { MouseMode::Off })
                }
                1002 => state.set_mouse_mode(if enabled {
                    MouseMode::ButtonEvent
                } else {
                    MouseMode::Off
                }),
                1003 => state.set_mouse_mode(if enabled {
                    MouseMode::AnyEvent
                } else {
                    MouseMode::Off
                }),
                1004 => state.set_mode_flag(ModeFlags::FOCUS_REPORTING, enabled),
                1005 => {
                    state.set_mouse_format(if enabled { MouseFormat::Utf8 } else { MouseFormat::X10 })
                }
                1006 => {
                    state.set_mouse_format(if enabled { MouseFormat::Sgr } else { MouseFormat::X10 })
                }
                1047 => state.set_alternate_screen(enabled, !enabled, false),
                1048 => {
                    if enabled {
                        state.save_cursor();
                    } else {
                        state.restore_cursor();
                    }
                }
                1049 => state.set_alternate_screen(enabled, enabled, true),
                2004 => state.set_mode_flag(ModeFlags::BRACKETED_PASTE, enabled),
                number => debug!(number, enabled, "unhandled DEC private mode"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filament_common::types::{Color, Position, Size, TextStyle};
    use filament_parser::Emulator;

    /// Feed raw bytes end-to-end: parser then processor.
    fn run(term: &mut TerminalState, bytes: &[u8]) {
        for action in Emulator::drain_bytes(bytes) {
            ActionProcessor::apply(term, action);
        }
    }

    fn term(cols: u16, rows: u16) -> TerminalState {
        TerminalState::new(Size::new(cols, rows), 100)
    }

    #[test]
    fn hello_lands_at_origin() {
        let mut t = term(80, 24);
        run(&mut t, b"Hello");
        assert_eq!(t.buffer().line(0).text(), "Hello");
        assert_eq!(t.cursor_position(), Position::new(0, 5));
    }

    #[test]
    fn sgr_red_then_default() {
        let mut t = term(80, 24);
        run(&mut t, b"\x1b[31mA\x1b[0mB");
        let a = t.buffer().cell(Position::new(0, 0));
        let b = t.buffer().cell(Position::new(0, 1));
        assert_eq!(a.ch, 'A');
        assert_eq!(a.style.foreground, Color::Indexed(1));
        assert_eq!(b.ch, 'B');
        assert_eq!(b.style, TextStyle::default());
    }

    #[test]
    fn cup_is_one_based_and_zero_maps_home() {
        let mut t = term(80, 24);
        run(&mut t, b"\x1b[10;20H");
        assert_eq!(t.cursor_position(), Position::new(9, 19));
        run(&mut t, b"\x1b[0;0H");
        assert_eq!(t.cursor_position(), Position::new(0, 0));
    }

    #[test]
    fn alt_screen_round_trip_via_sequences() {
        let mut t = term(80, 24);
        run(&mut t, b"primary\x1b[2;4H");
        run(&mut t, b"\x1b[?1049halt text\r\n");
        assert!(t.is_alternate());
        run(&mut t, b"\x1b[?1049l");
        assert!(!t.is_alternate());
        assert_eq!(t.buffer().line(0).text(), "primary");
        assert_eq!(t.cursor_position(), Position::new(1, 3));
        assert_eq!(t.buffer().history_size(), 0);
    }

    #[test]
    fn origin_mode_clamps_cup_to_region() {
        let mut t = term(80, 24);
        run(&mut t, b"\x1b[5;10r\x1b[?6h\x1b[H");
        // Region rows 5..10 (1-based); home lands on the region top.
        assert_eq!(t.cursor_position(), Position::new(4, 0));
        run(&mut t, b"\x1b[99;1H");
        assert_eq!(t.cursor_position(), Position::new(9, 0));
    }

    #[test]
    fn decsc_decrc_restores_cursor_and_sgr() {
        let mut t = term(80, 24);
        run(&mut t, b"\x1b[1;31m\x1b[3;7H\x1b7\x1b[0m\x1b[H\x1b8");
        assert_eq!(t.cursor_position(), Position::new(2, 6));
        assert_eq!(t.style().foreground, Color::Indexed(1));
        assert!(t
            .style()
            .flags
            .contains(filament_common::types::AttributeFlags::BOLD));
    }

    #[test]
    fn ich_dch_ech_edit_the_line() {
        let mut t = term(20, 4);
        run(&mut t, b"abcdef\x1b[1;2H\x1b[2@");
        assert_eq!(t.buffer().line(0).text(), "a  bcdef");
        run(&mut t, b"\x1b[2P");
        assert_eq!(t.buffer().line(0).text(), "abcdef");
        run(&mut t, b"\x1b[2X");
        assert_eq!(t.buffer().line(0).text(), "a  def");
    }

    #[test]
    fn scroll_up_and_down_within_region() {
        let mut t = term(10, 5);
        run(&mut t, b"r0\r\nr1\r\nr2\r\nr3\r\nr4");
        run(&mut t, b"\x1b[2;4r\x1b[2;1H\x1b[1S");
        assert_eq!(t.buffer().line(1).text(), "r2");
        assert_eq!(t.buffer().line(3).text(), "");
        assert_eq!(t.buffer().line(4).text(), "r4");
        run(&mut t, b"\x1b[1T");
        assert_eq!(t.buffer().line(1).text(), "");
        assert_eq!(t.buffer().line(2).text(), "r2");
    }

    #[test]
    fn insert_mode_shifts_text() {
        let mut t = term(20, 2);
        run(&mut t, b"world\x1b[1;1H\x1b[4hhello \x1b[4l");
        assert_eq!(t.buffer().line(0).text(), "hello world");
    }

    #[test]
    fn da_and_dsr_produce_responses() {
        let mut t = term(80, 24);
        run(&mut t, b"\x1b[c\x1b[5n\x1b[3;4H\x1b[6n");
        assert_eq!(
            t.take_responses(),
            vec![
                b"\x1b[?6c".to_vec(),
                b"\x1b[0n".to_vec(),
                b"\x1b[3;4R".to_vec(),
            ]
        );
    }

    #[test]
    fn bracketed_paste_and_focus_modes_toggle() {
        let mut t = term(80, 24);
        run(&mut t, b"\x1b[?2004h\x1b[?1004h");
        assert!(t.modes().contains(ModeFlags::BRACKETED_PASTE));
        assert!(t.modes().contains(ModeFlags::FOCUS_REPORTING));
        run(&mut t, b"\x1b[?2004l\x1b[?1004l");
        assert!(!t.modes().contains(ModeFlags::BRACKETED_PASTE));
        assert!(!t.modes().contains(ModeFlags::FOCUS_REPORTING));
    }

    #[test]
    fn mouse_modes_resolve() {
        let mut t = term(80, 24);
        run(&mut t, b"\x1b[?1002h\x1b[?1006h");
        assert_eq!(t.mouse_mode(), MouseMode::ButtonEvent);
        assert_eq!(t.input_modes().mouse_format, MouseFormat::Sgr);
        run(&mut t, b"\x1b[?1002l\x1b[?1006l");
        assert_eq!(t.mouse_mode(), MouseMode::Off);
    }

    #[test]
    fn ris_resets_via_sequence() {
        let mut t = term(20, 5);
        run(&mut t, b"\x1b[31mstuff\x1b[2;4r\x1bc");
        assert_eq!(t.style(), TextStyle::default());
        assert_eq!(t.scroll_region(), (0, 4));
        assert_eq!(t.buffer().line(0).text(), "");
    }

    #[test]
    fn rep_repeats_printable() {
        let mut t = term(20, 2);
        run(&mut t, b"ab\x1b[3b");
        assert_eq!(t.buffer().line(0).text(), "abbbb");
    }

    #[test]
    fn osc_title_applies() {
        let mut t = term(20, 2);
        run(&mut t, b"\x1b]2;session name\x07");
        assert_eq!(t.title(), "session name");
    }

    #[test]
    fn deccolm_clears_and_homes() {
        let mut t = term(20, 5);
        run(&mut t, b"text\x1b[2;4r\x1b[?3h");
        assert_eq!(t.buffer().line(0).text(), "");
        assert_eq!(t.cursor_position(), Position::new(0, 0));
        assert_eq!(t.scroll_region(), (0, 4));
    }
}
