//! The I/O coordinator: serializes writes, resizes and shutdown onto a
//! single-threaded executor, and drives the emulator from a dedicated
//! blocking reader thread.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use filament_common::error::{FilamentError, Result};
use filament_common::traits::TtyConnector;
use filament_common::types::{RequestOrigin, Size};
use filament_parser::{Emulator, TtyDataStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::ansi::ActionProcessor;
use crate::events::{EventBus, TerminalEvent};
use crate::exec::ExecutorManager;
use crate::terminal::state::TerminalState;
use crate::typeahead::TypeAheadManager;

#[derive(Debug, Clone)]
pub struct StarterConfig {
    /// Debounce before the PTY learns about a resize on the primary
    /// screen. Generous, so a process that repaints on SIGWINCH settles
    /// against the final dimensions instead of leaking lines into
    /// history.
    pub resize_debounce_primary: Duration,
    /// Same, while the alternate screen is active.
    pub resize_debounce_alternate: Duration,
    /// Reader-loop breaker: this many consecutive emulator errors force
    /// a stop.
    pub max_consecutive_errors: u32,
}

impl Default for StarterConfig {
    fn default() -> Self {
        Self {
            resize_debounce_primary: Duration::from_millis(500),
            resize_debounce_alternate: Duration::from_millis(100),
            max_consecutive_errors: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StarterPhase {
    New = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl StarterPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => StarterPhase::New,
            1 => StarterPhase::Running,
            2 => StarterPhase::Stopping,
            _ => StarterPhase::Stopped,
        }
    }
}

/// Work submitted to the coordinator. FIFO per sender.
#[derive(Debug)]
pub enum StarterCommand {
    Write { bytes: Vec<u8>, user_input: bool },
    Resize { size: Size, origin: RequestOrigin },
    Close,
}

/// Coordinates the session's I/O: owns the connector and the terminal,
/// runs one coordinator task (executor `S`) and one reader thread (`R`).
/// Observers only ever see snapshots; there are no back-pointers.
pub struct TerminalStarter {
    terminal: Arc<Mutex<TerminalState>>,
    connector: Arc<dyn TtyConnector>,
    typeahead: Arc<TypeAheadManager>,
    events: EventBus,
    config: StarterConfig,
    command_tx: mpsc::UnboundedSender<StarterCommand>,
    command_rx: Option<mpsc::UnboundedReceiver<StarterCommand>>,
    stop_flag: Arc<AtomicBool>,
    phase: Arc<AtomicU8>,
    reader: Option<std::thread::JoinHandle<()>>,
}

impl TerminalStarter {
    pub fn new(
        terminal: Arc<Mutex<TerminalState>>,
        connector: Arc<dyn TtyConnector>,
        typeahead: Arc<TypeAheadManager>,
        events: EventBus,
        config: StarterConfig,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        Self {
            terminal,
            connector,
            typeahead,
            events,
            config,
            command_tx,
            command_rx: Some(command_rx),
            stop_flag: Arc::new(AtomicBool::new(false)),
            phase: Arc::new(AtomicU8::new(StarterPhase::New as u8)),
            reader: None,
        }
    }

    pub fn phase(&self) -> StarterPhase {
        StarterPhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn terminal(&self) -> Arc<Mutex<TerminalState>> {
        Arc::clone(&self.terminal)
    }

    pub fn typeahead(&self) -> Arc<TypeAheadManager> {
        Arc::clone(&self.typeahead)
    }

    /// Launch the coordinator task and the reader thread.
    pub fn start(&mut self, executors: &ExecutorManager) -> Result<()> {
        let rx = self
            .command_rx
            .take()
            .ok_or_else(|| FilamentError::State("starter already started".into()))?;
        self.phase
            .store(StarterPhase::Running as u8, Ordering::SeqCst);
        info!(connector = %self.connector.name(), "starting terminal session");

        executors.handle().spawn(coordinator_loop(
            rx,
            Arc::clone(&self.terminal),
            Arc::clone(&self.connector),
            Arc::clone(&self.typeahead),
            self.events.clone(),
            self.config.clone(),
            Arc::clone(&self.stop_flag),
        ));

        let reader = {
            let terminal = Arc::clone(&self.terminal);
            let connector = Arc::clone(&self.connector);
            let typeahead = Arc::clone(&self.typeahead);
            let events = self.events.clone();
            let command_tx = self.command_tx.clone();
            let stop_flag = Arc::clone(&self.stop_flag);
            let phase = Arc::clone(&self.phase);
            let max_errors = self.config.max_consecutive_errors;
            executors.spawn_reader("filament-reader", move || {
                reader_loop(
                    terminal, connector, typeahead, events, command_tx, stop_flag, max_errors,
                );
                let _ = phase.compare_exchange(
                    StarterPhase::Running as u8,
                    StarterPhase::Stopping as u8,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
            })?
        };
        self.reader = Some(reader);
        Ok(())
    }

    /// Queue bytes for the process. With `user_input`, type-ahead
    /// predictions are derived before the write happens.
    pub fn send_bytes(&self, bytes: Vec<u8>, user_input: bool) -> Result<()> {
        self.command_tx
            .send(StarterCommand::Write { bytes, user_input })
            .map_err(|_| FilamentError::State("coordinator is gone".into()))
    }

    pub fn send_string(&self, s: &str, user_input: bool) -> Result<()> {
        self.send_bytes(s.as_bytes().to_vec(), user_input)
    }

    /// Resize the model now; the PTY is told after the debounce.
    pub fn post_resize(&self, size: Size, origin: RequestOrigin) -> Result<()> {
        self.command_tx
            .send(StarterCommand::Resize { size, origin })
            .map_err(|_| FilamentError::State("coordinator is gone".into()))
    }

    /// Best-effort close of the connector via the coordinator.
    pub fn close(&self) {
        if self.command_tx.send(StarterCommand::Close).is_err() {
            self.connector.close();
        }
    }

    /// Cooperative stop: the reader checks the flag between emulator
    /// steps. A blocked read is released by closing the connector.
    pub fn request_emulator_stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        let _ = self.phase.compare_exchange(
            StarterPhase::Running as u8,
            StarterPhase::Stopping as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Wait for the reader thread to finish and mark the session
    /// stopped.
    pub fn join(&mut self) {
        if let Some(handle) = self.reader.take() {
            if handle.join().is_err() {
                error!("reader thread panicked");
            }
        }
        self.phase
            .store(StarterPhase::Stopped as u8, Ordering::SeqCst);
    }
}

async fn coordinator_loop(
    mut rx: mpsc::UnboundedReceiver<StarterCommand>,
    terminal: Arc<Mutex<TerminalState>>,
    connector: Arc<dyn TtyConnector>,
    typeahead: Arc<TypeAheadManager>,
    events: EventBus,
    config: StarterConfig,
    stop_flag: Arc<AtomicBool>,
) {
    debug!("coordinator started");
    // Single-slot debounced resize: scheduling a new one replaces (and
    // cancels) the previous.
    let mut pending_resize: Option<tokio::task::JoinHandle<()>> = None;

    while let Some(command) = rx.recv().await {
        match command {
            StarterCommand::Write { bytes, user_input } => {
                if user_input {
                    let ctx = terminal.lock().unwrap().prediction_context();
                    typeahead.on_user_send(&bytes, &ctx);
                }
                if let Err(e) = connector.write(&bytes) {
                    error!(error = %e, "write to connector failed");
                    events.send(TerminalEvent::Error(e.to_string()));
                    stop_flag.store(true, Ordering::SeqCst);
                    connector.close();
                    break;
                }
            }
            StarterCommand::Resize { size, origin } => {
                // The model resizes immediately; the process hears about
                // it only once the dimensions settle.
                {
                    let mut term = terminal.lock().unwrap();
                    term.resize(size, origin);
                }
                typeahead.invalidate_all();
                events.send(TerminalEvent::Resized(size));
                events.send(TerminalEvent::Damage);

                let debounce = if terminal.lock().unwrap().is_alternate() {
                    config.resize_debounce_alternate
                } else {
                    config.resize_debounce_primary
                };
                if let Some(previous) = pending_resize.take() {
                    previous.abort();
                }
                let connector = Arc::clone(&connector);
                pending_resize = Some(tokio::spawn(async move {
                    tokio::time::sleep(debounce).await;
                    if let Err(e) = connector.resize(size) {
                        warn!(error = %e, "PTY resize failed");
                    }
                }));
            }
            StarterCommand::Close => {
                debug!("closing connector");
                connector.close();
                break;
            }
        }
    }
    if let Some(previous) = pending_resize.take() {
        previous.abort();
    }
    debug!("coordinator exiting");
}

fn reader_loop(
    terminal: Arc<Mutex<TerminalState>>,
    connector: Arc<dyn TtyConnector>,
    typeahead: Arc<TypeAheadManager>,
    events: EventBus,
    command_tx: mpsc::UnboundedSender<StarterCommand>,
    stop_flag: Arc<AtomicBool>,
    max_consecutive_errors: u32,
) {
    debug!("reader started");
    let stream = TtyDataStream::new(Arc::clone(&connector));
    let mut emulator = Emulator::new(stream);
    let mut consecutive_errors = 0u32;

    while !stop_flag.load(Ordering::SeqCst) && emulator.has_next() {
        match emulator.next() {
            Ok(actions) => {
                consecutive_errors = 0;
                if actions.is_empty() {
                    continue;
                }
                let (responses, pending) = {
                    let mut term = terminal.lock().unwrap();
                    for action in actions {
                        ActionProcessor::apply(&mut term, action);
                    }
                    // Lock order: terminal first, then predictions.
                    typeahead.reconcile(&term);
                    (term.take_responses(), term.take_events())
                };
                typeahead.on_terminal_output();
                for bytes in responses {
                    let _ = command_tx.send(StarterCommand::Write {
                        bytes,
                        user_input: false,
                    });
                }
                events.send(TerminalEvent::Damage);
                for event in pending {
                    events.send(event);
                }
            }
            Err(e) if e.is_disconnect() => {
                info!("stream ended");
                break;
            }
            Err(e) => {
                if !connector.is_connected() {
                    info!(error = %e, "connector disconnected");
                    break;
                }
                // Still connected: log and keep going, with a breaker
                // against pathological loops.
                warn!(error = %e, "emulator error, continuing");
                consecutive_errors += 1;
                if consecutive_errors >= max_consecutive_errors {
                    error!(consecutive_errors, "too many emulator errors, stopping");
                    break;
                }
            }
        }
    }

    terminal.lock().unwrap().set_disconnected();
    events.send(TerminalEvent::Disconnected);
    stop_flag.store(true, Ordering::SeqCst);
    debug!("reader exiting");
}
