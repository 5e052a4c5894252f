use crate::error::Result;
use crate::types::Size;

/// Bidirectional byte channel around the PTY master.
///
/// Methods take `&self`: implementations hold their reader/writer halves
/// behind internal locks so a single connector can be shared between the
/// reader thread and the I/O coordinator. `read` blocks until bytes
/// arrive or the channel closes; `Ok(0)` signals EOF.
pub trait TtyConnector: Send + Sync {
    fn read(&self, buf: &mut [u8]) -> Result<usize>;

    /// Write raw bytes to the process input.
    fn write(&self, bytes: &[u8]) -> Result<()>;

    /// Write a string, UTF-8 encoded.
    fn write_str(&self, s: &str) -> Result<()> {
        self.write(s.as_bytes())
    }

    /// Forward new dimensions to the PTY (TIOCSWINSZ or platform analog).
    fn resize(&self, size: Size) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Close the channel. Must unblock a pending `read`.
    fn close(&self);

    fn name(&self) -> String;
}
