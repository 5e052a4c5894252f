//! Terminal emulator core: screen model, escape dispatch, type-ahead,
//! and the I/O coordination between the reader thread, the emulator and
//! the presentation layer.

pub mod ansi;
pub mod events;
pub mod exec;
pub mod input;
pub mod pty;
pub mod starter;
pub mod terminal;
pub mod typeahead;

pub use ansi::ActionProcessor;
pub use events::{EventBus, TerminalEvent};
pub use exec::ExecutorManager;
pub use pty::PtyConnector;
pub use starter::{StarterConfig, StarterPhase, TerminalStarter};
pub use terminal::{TerminalState, TerminalTextBuffer};
pub use typeahead::{TypeAheadConfig, TypeAheadManager};
