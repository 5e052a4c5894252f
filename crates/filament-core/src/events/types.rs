use filament_common::types::Size;

/// Events emitted toward the presentation layer. Observers react to
/// `Damage` by draining the buffer's dirty lines under its lock.
#[derive(Debug, Clone)]
pub enum TerminalEvent {
    /// Screen content changed; dirty lines await draining.
    Damage,

    /// Window title changed.
    Title(String),

    /// BEL received.
    Bell,

    /// The terminal model was resized.
    Resized(Size),

    /// The session's byte stream ended.
    Disconnected,

    /// A non-recoverable I/O failure.
    Error(String),
}
