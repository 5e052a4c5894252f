pub mod buffer;
pub mod cursor;
pub mod line;
pub mod state;

pub use buffer::{HistoryBuffer, ScreenGrid, TerminalTextBuffer};
pub use cursor::Cursor;
pub use line::TerminalLine;
pub use state::TerminalState;
