use thiserror::Error;

#[derive(Error, Debug)]
pub enum FilamentError {
    /// The upstream byte source closed; the reader exits cleanly.
    #[error("stream ended")]
    StreamEnded,

    #[error("PTY error: {0}")]
    Pty(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),

    /// Internal invariant violated; state is clamped, never a crash.
    #[error("terminal state error: {0}")]
    State(String),
}

impl FilamentError {
    /// True when the error means the session is gone rather than a
    /// recoverable hiccup.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, FilamentError::StreamEnded)
    }
}

pub type Result<T> = std::result::Result<T, FilamentError>;
