use std::collections::VecDeque;
use std::sync::Arc;

use filament_common::error::{FilamentError, Result};
use filament_common::traits::TtyConnector;
use tracing::trace;

/// Outcome of decoding the front of a byte buffer.
enum Decoded {
    /// A complete scalar and the number of bytes it consumed.
    Char(char, usize),
    /// The buffer ends inside a multi-byte sequence.
    Incomplete,
    /// The lead byte (or a continuation) is malformed; consume one byte.
    Invalid,
}

fn decode_front(bytes: &VecDeque<u8>) -> Option<Decoded> {
    let first = *bytes.front()?;
    let len = match first {
        0x00..=0x7f => 1,
        0xc2..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf4 => 4,
        _ => return Some(Decoded::Invalid),
    };
    if bytes.len() < len {
        return Some(Decoded::Incomplete);
    }
    let mut buf = [0u8; 4];
    for (i, slot) in buf.iter_mut().enumerate().take(len) {
        *slot = bytes[i];
    }
    match std::str::from_utf8(&buf[..len]) {
        Ok(s) => Some(Decoded::Char(s.chars().next().unwrap(), len)),
        Err(_) => Some(Decoded::Invalid),
    }
}

/// A lazy character source over the session byte stream.
///
/// The emulator pulls characters one at a time, may push them back for
/// re-reading, and drains printable runs through the bulk hot path.
pub trait TerminalDataStream {
    /// Next character; reassembles UTF-8, blocking until one is available.
    /// Fails with `StreamEnded` once the upstream closes.
    fn get_char(&mut self) -> Result<char>;

    /// Same as `get_char` but asserts the single-byte range, for CSI
    /// parameter bytes.
    fn get_ascii(&mut self) -> Result<char> {
        let ch = self.get_char()?;
        if (ch as u32) > 0x7f {
            return Err(FilamentError::Parse(format!(
                "expected ascii, got {ch:?}"
            )));
        }
        Ok(ch)
    }

    /// Prepend characters so they are re-read, in order, before anything
    /// else.
    fn push_back(&mut self, chars: &[char]);

    fn push_back_char(&mut self, ch: char) {
        self.push_back(&[ch]);
    }

    /// Bulk hot path: a run of printable characters up to the next
    /// control byte or `max` characters. Blocks only for the first
    /// character; after that it drains what is already buffered.
    fn read_non_control_characters(&mut self, max: usize) -> Result<String>;
}

pub fn is_control_char(ch: char) -> bool {
    ch < ' ' || ch == '\x7f'
}

/// Character stream over a [`TtyConnector`].
pub struct TtyDataStream {
    connector: Arc<dyn TtyConnector>,
    pushback: VecDeque<char>,
    bytes: VecDeque<u8>,
}

const READ_CHUNK: usize = 8192;

impl TtyDataStream {
    pub fn new(connector: Arc<dyn TtyConnector>) -> Self {
        Self {
            connector,
            pushback: VecDeque::new(),
            bytes: VecDeque::new(),
        }
    }

    /// Blocking refill from the connector. `StreamEnded` on EOF.
    fn refill(&mut self) -> Result<()> {
        let mut buf = [0u8; READ_CHUNK];
        let n = self.connector.read(&mut buf)?;
        if n == 0 {
            return Err(FilamentError::StreamEnded);
        }
        trace!(bytes = n, "stream refill");
        self.bytes.extend(&buf[..n]);
        Ok(())
    }

    /// Decode one char from the byte buffer, refilling as needed.
    fn next_decoded(&mut self) -> Result<char> {
        loop {
            match decode_front(&self.bytes) {
                None | Some(Decoded::Incomplete) => self.refill()?,
                Some(Decoded::Char(ch, len)) => {
                    self.bytes.drain(..len);
                    return Ok(ch);
                }
                Some(Decoded::Invalid) => {
                    self.bytes.pop_front();
                    return Ok(char::REPLACEMENT_CHARACTER);
                }
            }
        }
    }

    /// Whether a character can be produced without touching the connector.
    fn has_buffered(&self) -> bool {
        !self.pushback.is_empty()
            || matches!(
                decode_front(&self.bytes),
                Some(Decoded::Char(..)) | Some(Decoded::Invalid)
            )
    }
}

impl TerminalDataStream for TtyDataStream {
    fn get_char(&mut self) -> Result<char> {
        if let Some(ch) = self.pushback.pop_front() {
            return Ok(ch);
        }
        self.next_decoded()
    }

    fn push_back(&mut self, chars: &[char]) {
        for &ch in chars.iter().rev() {
            self.pushback.push_front(ch);
        }
    }

    fn read_non_control_characters(&mut self, max: usize) -> Result<String> {
        let mut out = String::new();
        let first = self.get_char()?;
        if is_control_char(first) {
            self.push_back_char(first);
            return Ok(out);
        }
        out.push(first);
        while out.chars().count() < max && self.has_buffered() {
            let ch = self.get_char()?;
            if is_control_char(ch) {
                self.push_back_char(ch);
                break;
            }
            out.push(ch);
        }
        Ok(out)
    }
}

/// In-memory stream over a fixed byte buffer, for tests and replay.
pub struct ArrayDataStream {
    pushback: VecDeque<char>,
    bytes: VecDeque<u8>,
}

impl ArrayDataStream {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            pushback: VecDeque::new(),
            bytes: data.into().into(),
        }
    }
}

impl TerminalDataStream for ArrayDataStream {
    fn get_char(&mut self) -> Result<char> {
        if let Some(ch) = self.pushback.pop_front() {
            return Ok(ch);
        }
        match decode_front(&self.bytes) {
            None => Err(FilamentError::StreamEnded),
            // A trailing partial sequence can never complete.
            Some(Decoded::Incomplete) | Some(Decoded::Invalid) => {
                self.bytes.pop_front();
                Ok(char::REPLACEMENT_CHARACTER)
            }
            Some(Decoded::Char(ch, len)) => {
                self.bytes.drain(..len);
                Ok(ch)
            }
        }
    }

    fn push_back(&mut self, chars: &[char]) {
        for &ch in chars.iter().rev() {
            self.pushback.push_front(ch);
        }
    }

    fn read_non_control_characters(&mut self, max: usize) -> Result<String> {
        let mut out = String::new();
        while out.chars().count() < max {
            let ch = match self.get_char() {
                Ok(ch) => ch,
                Err(FilamentError::StreamEnded) if !out.is_empty() => break,
                Err(e) => return Err(e),
            };
            if is_control_char(ch) {
                self.push_back_char(ch);
                break;
            }
            out.push(ch);
        }
        Ok(out)
    }
}
