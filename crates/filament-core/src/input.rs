//! Turns user input events into the byte sequences the process expects,
//! honoring application cursor keys, application keypad, bracketed
//! paste, and the active mouse protocol.

use filament_common::input::{
    InputModes, KeyCode, KeyModifiers, MouseButton, MouseEvent, MouseEventKind, MouseFormat,
    MouseMode,
};

/// Collapse a character to its C0 control code (Ctrl-A => 0x01).
const fn ctrl_code(c: u8) -> u8 {
    c & 0b0001_1111
}

/// Byte sequence for a key under the current modes. An empty vector
/// means "no mapping; caller ignores".
pub fn encode_key(code: KeyCode, modifiers: KeyModifiers, modes: &InputModes) -> Vec<u8> {
    let alt = modifiers.contains(KeyModifiers::ALT);
    let ctrl = modifiers.contains(KeyModifiers::CTRL);
    let mut out = Vec::new();

    match code {
        KeyCode::Char(c) => {
            if ctrl {
                match c.to_ascii_lowercase() {
                    c @ ('a'..='z' | '@' | '[' | '\\' | ']' | '^' | '_' | ' ') => {
                        if alt {
                            out.push(0x1b);
                        }
                        out.push(ctrl_code(c as u8));
                    }
                    _ => return Vec::new(),
                }
            } else {
                if alt {
                    out.push(0x1b);
                }
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
        KeyCode::Enter => {
            if alt {
                out.push(0x1b);
            }
            out.push(b'\r');
        }
        KeyCode::Tab => {
            if modifiers.contains(KeyModifiers::SHIFT) {
                out.extend_from_slice(b"\x1b[Z");
            } else {
                if alt {
                    out.push(0x1b);
                }
                out.push(b'\t');
            }
        }
        KeyCode::Backspace => {
            if alt {
                out.push(0x1b);
            }
            out.push(if ctrl { 0x08 } else { 0x7f });
        }
        KeyCode::Escape => {
            if alt {
                out.push(0x1b);
            }
            out.push(0x1b);
        }
        KeyCode::Up => return arrow(b'A', modifiers, modes),
        KeyCode::Down => return arrow(b'B', modifiers, modes),
        KeyCode::Right => return arrow(b'C', modifiers, modes),
        KeyCode::Left => return arrow(b'D', modifiers, modes),
        KeyCode::Home => return arrow(b'H', modifiers, modes),
        KeyCode::End => return arrow(b'F', modifiers, modes),
        KeyCode::Insert => return tilde_key(2, modifiers),
        KeyCode::Delete => return tilde_key(3, modifiers),
        KeyCode::PageUp => return tilde_key(5, modifiers),
        KeyCode::PageDown => return tilde_key(6, modifiers),
        KeyCode::F(n) => return function_key(n, modifiers),
        KeyCode::Keypad(c) => return keypad_key(c, modes),
    }
    out
}

/// DECKPAM sends SS3 application codes; numeric mode sends the plain
/// character.
fn keypad_key(c: char, modes: &InputModes) -> Vec<u8> {
    if modes.application_keypad {
        let code = match c {
            '0'..='9' => b'p' + (c as u8 - b'0'),
            '*' => b'j',
            '+' => b'k',
            ',' => b'l',
            '-' => b'm',
            '.' => b'n',
            '/' => b'o',
            '=' => b'X',
            '\r' => b'M',
            _ => return Vec::new(),
        };
        vec![0x1b, b'O', code]
    } else {
        match c {
            '\r' => vec![b'\r'],
            c if c.is_ascii() => vec![c as u8],
            _ => Vec::new(),
        }
    }
}

/// Arrows and Home/End: `SS3 X` in application cursor mode, `CSI X`
/// otherwise, `CSI 1;mod X` when modified.
fn arrow(letter: u8, modifiers: KeyModifiers, modes: &InputModes) -> Vec<u8> {
    if modifiers.is_empty() {
        if modes.application_cursor_keys {
            vec![0x1b, b'O', letter]
        } else {
            vec![0x1b, b'[', letter]
        }
    } else {
        format!("\x1b[1;{}{}", modifiers.xterm_code(), letter as char).into_bytes()
    }
}

fn tilde_key(number: u8, modifiers: KeyModifiers) -> Vec<u8> {
    if modifiers.is_empty() {
        format!("\x1b[{number}~").into_bytes()
    } else {
        format!("\x1b[{};{}~", number, modifiers.xterm_code()).into_bytes()
    }
}

fn function_key(n: u8, modifiers: KeyModifiers) -> Vec<u8> {
    match n {
        1..=4 => {
            let letter = [b'P', b'Q', b'R', b'S'][(n - 1) as usize];
            if modifiers.is_empty() {
                vec![0x1b, b'O', letter]
            } else {
                format!("\x1b[1;{}{}", modifiers.xterm_code(), letter as char).into_bytes()
            }
        }
        5..=12 => {
            let number = [15u8, 17, 18, 19, 20, 21, 23, 24][(n - 5) as usize];
            tilde_key(number, modifiers)
        }
        _ => Vec::new(),
    }
}

/// Wrap pasted text in the bracketed-paste markers when mode 2004 is
/// set; plain bytes otherwise.
pub fn bracket_paste(text: &str, modes: &InputModes) -> Vec<u8> {
    if modes.bracketed_paste {
        let mut out = Vec::with_capacity(text.len() + 12);
        out.extend_from_slice(b"\x1b[200~");
        out.extend_from_slice(text.as_bytes());
        out.extend_from_slice(b"\x1b[201~");
        out
    } else {
        text.as_bytes().to_vec()
    }
}

/// Encode a mouse event per the active tracking mode and coordinate
/// format. Empty when the event is not reported under the mode.
pub fn encode_mouse(event: MouseEvent, modes: &InputModes) -> Vec<u8> {
    let reported = match (modes.mouse_mode, event.kind) {
        (MouseMode::Off, _) => false,
        (MouseMode::X10, kind) => kind == MouseEventKind::Press,
        (MouseMode::Normal, kind) => kind != MouseEventKind::Motion,
        (MouseMode::ButtonEvent, MouseEventKind::Motion) => event.button.is_some(),
        (MouseMode::ButtonEvent, _) => true,
        (MouseMode::AnyEvent, _) => true,
    };
    if !reported {
        return Vec::new();
    }

    let mut code: u16 = match event.button {
        Some(MouseButton::Left) => 0,
        Some(MouseButton::Middle) => 1,
        Some(MouseButton::Right) => 2,
        Some(MouseButton::WheelUp) => 64,
        Some(MouseButton::WheelDown) => 65,
        None => 3,
    };
    if event.kind == MouseEventKind::Motion {
        code += 32;
    }
    if event.modifiers.contains(KeyModifiers::SHIFT) {
        code += 4;
    }
    if event.modifiers.contains(KeyModifiers::ALT) {
        code += 8;
    }
    if event.modifiers.contains(KeyModifiers::CTRL) {
        code += 16;
    }

    let col = u32::from(event.position.col) + 1;
    let row = u32::from(event.position.row) + 1;

    match modes.mouse_format {
        MouseFormat::Sgr => {
            let terminator = if event.kind == MouseEventKind::Release {
                'm'
            } else {
                'M'
            };
            format!("\x1b[<{code};{col};{row}{terminator}").into_bytes()
        }
        MouseFormat::X10 | MouseFormat::Utf8 => {
            // Legacy formats fold release into button code 3.
            let code = if event.kind == MouseEventKind::Release {
                (code & !0b11) | 3
            } else {
                code
            };
            let mut out = b"\x1b[M".to_vec();
            let encode_coord = |out: &mut Vec<u8>, value: u32| {
                let value = value + 32;
                if modes.mouse_format == MouseFormat::Utf8 {
                    let ch = char::from_u32(value.min(2047)).unwrap_or(' ');
                    let mut buf = [0u8; 4];
                    out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                } else {
                    out.push(value.min(255) as u8);
                }
            };
            out.push(32 + code.min(223) as u8);
            encode_coord(&mut out, col.min(223));
            encode_coord(&mut out, row.min(223));
            out
        }
    }
}
