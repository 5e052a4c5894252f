//! Speculative local echo.
//!
//! Keystrokes normally become visible only after a full round trip
//! through the process. When that round trip is slow, the manager
//! predicts the effect of simple keystrokes — the echo of a printable
//! character, the cursor motion of a bare arrow key — and hands the
//! renderer an overlay; the authoritative screen model stays untouched.
//! Output that matches a prediction confirms it; any mismatch throws
//! every outstanding prediction away and disables predictions for a
//! penalty window.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use filament_common::types::{Cell, Position};
use tracing::{debug, trace};

use crate::terminal::state::{PredictionContext, TerminalState};

#[derive(Debug, Clone)]
pub struct TypeAheadConfig {
    pub enabled: bool,
    /// Predictions switch on only when the smoothed round-trip latency
    /// exceeds this.
    pub latency_threshold: Duration,
    /// Predictions older than this are dropped.
    pub expiry: Duration,
    /// How long predictions stay disabled after a mismatch.
    pub penalty: Duration,
}

impl Default for TypeAheadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            latency_threshold: Duration::from_millis(50),
            expiry: Duration::from_secs(3),
            penalty: Duration::from_secs(3),
        }
    }
}

/// One speculative keystroke effect.
#[derive(Debug, Clone)]
pub enum Prediction {
    /// A printable character echoing at a cell.
    Printable {
        bytes: Vec<u8>,
        position: Position,
        cell: Cell,
        created: Instant,
    },
    /// A bare cursor movement (left/right arrow).
    Cursor {
        bytes: Vec<u8>,
        to: Position,
        created: Instant,
    },
}

impl Prediction {
    fn created(&self) -> Instant {
        match self {
            Prediction::Printable { created, .. } | Prediction::Cursor { created, .. } => *created,
        }
    }

    /// Where the cursor sits once this prediction lands.
    fn cursor_after(&self) -> Position {
        match self {
            Prediction::Printable { position, .. } => {
                Position::new(position.row, position.col + 1)
            }
            Prediction::Cursor { to, .. } => *to,
        }
    }
}

/// Smoothing factor for the latency EWMA.
const EWMA_ALPHA: f64 = 0.3;

#[derive(Debug, Default)]
struct Inner {
    predictions: VecDeque<Prediction>,
    latency_ms: Option<f64>,
    penalty_until: Option<Instant>,
    last_send: Option<Instant>,
}

/// Owns the prediction queue behind its own lock. Lock order is always
/// terminal first, then predictions; never the reverse.
pub struct TypeAheadManager {
    config: TypeAheadConfig,
    inner: Mutex<Inner>,
}

impl TypeAheadManager {
    pub fn new(config: TypeAheadConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Derive predictions from an outgoing user payload. Called by the
    /// coordinator before the bytes hit the connector.
    pub fn on_user_send(&self, bytes: &[u8], ctx: &PredictionContext) {
        let mut inner = self.inner.lock().unwrap();
        inner.last_send = Some(Instant::now());

        if !self.predictions_allowed(&inner, ctx) {
            return;
        }
        // Continue from where the last outstanding prediction leaves the
        // cursor.
        let mut col = inner
            .predictions
            .back()
            .map(|p| p.cursor_after().col)
            .unwrap_or(ctx.cursor.col);
        let row = ctx.cursor.row;

        let mut i = 0;
        while i < bytes.len() {
            let byte = bytes[i];
            // Plain printable ASCII echoes in place.
            if (0x21..=0x7e).contains(&byte) {
                // Never predict into the wrap column.
                if col + 1 >= ctx.columns {
                    break;
                }
                let prediction = Prediction::Printable {
                    bytes: vec![byte],
                    position: Position::new(row, col),
                    cell: Cell::styled(byte as char, ctx.style),
                    created: Instant::now(),
                };
                trace!(?prediction, "prediction queued");
                inner.predictions.push_back(prediction);
                col += 1;
                i += 1;
                continue;
            }
            // Bare horizontal arrows move the cursor predictably.
            let rest = &bytes[i..];
            let arrow = if rest.starts_with(b"\x1b[D") || rest.starts_with(b"\x1bOD") {
                Some(-1i32)
            } else if rest.starts_with(b"\x1b[C") || rest.starts_with(b"\x1bOC") {
                Some(1)
            } else {
                None
            };
            match arrow {
                Some(delta) => {
                    let target = col as i32 + delta;
                    if target < 0 || target + 1 >= i32::from(ctx.columns) {
                        break;
                    }
                    col = target as u16;
                    inner.predictions.push_back(Prediction::Cursor {
                        bytes: rest[..3].to_vec(),
                        to: Position::new(row, col),
                        created: Instant::now(),
                    });
                    i += 3;
                }
                None => break,
            }
        }
    }

    fn predictions_allowed(&self, inner: &Inner, ctx: &PredictionContext) -> bool {
        if !self.config.enabled {
            return false;
        }
        if let Some(until) = inner.penalty_until {
            if Instant::now() < until {
                return false;
            }
        }
        let latency_high = inner
            .latency_ms
            .map(|ms| ms >= self.config.latency_threshold.as_secs_f64() * 1000.0)
            .unwrap_or(false);
        latency_high
            && ctx.autowrap
            && !ctx.alternate_screen
            && !ctx.mouse_active
            && ctx.region_interior
    }

    /// Called by the reader loop whenever process output arrived; feeds
    /// the round-trip latency estimate even while predictions are off.
    pub fn on_terminal_output(&self) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(sent) = inner.last_send.take() {
            let sample = sent.elapsed();
            update_ewma(&mut inner, sample);
        }
    }

    /// Record an explicit round-trip sample.
    pub fn record_latency_sample(&self, sample: Duration) {
        let mut inner = self.inner.lock().unwrap();
        update_ewma(&mut inner, sample);
    }

    pub fn latency(&self) -> Option<Duration> {
        self.inner
            .lock()
            .unwrap()
            .latency_ms
            .map(|ms| Duration::from_secs_f64(ms / 1000.0))
    }

    /// Check outstanding predictions against the authoritative screen.
    /// Called with the terminal lock held (the `state` borrow).
    pub fn reconcile(&self, state: &TerminalState) {
        let mut inner = self.inner.lock().unwrap();
        loop {
            let Some(front) = inner.predictions.front().cloned() else {
                return;
            };
            match &front {
                Prediction::Printable { position, cell, created, .. } => {
                    let actual = state.buffer().cell(*position);
                    if actual.ch == cell.ch {
                        let sample = created.elapsed();
                        inner.predictions.pop_front();
                        update_ewma(&mut inner, sample);
                        continue;
                    }
                    if actual.ch != ' ' {
                        debug!(
                            expected = %cell.ch,
                            actual = %actual.ch,
                            "prediction mismatch, invalidating"
                        );
                        inner.predictions.clear();
                        inner.penalty_until = Some(Instant::now() + self.config.penalty);
                        return;
                    }
                }
                Prediction::Cursor { to, created, .. } => {
                    if state.cursor_position() == *to {
                        let sample = created.elapsed();
                        inner.predictions.pop_front();
                        update_ewma(&mut inner, sample);
                        continue;
                    }
                }
            }
            // Echo not arrived yet; just age out stale entries.
            if front.created().elapsed() > self.config.expiry {
                inner.predictions.pop_front();
                continue;
            }
            return;
        }
    }

    /// Throw every outstanding prediction away (e.g. on resize).
    pub fn invalidate_all(&self) {
        self.inner.lock().unwrap().predictions.clear();
    }

    /// Pending overlay cells for the renderer, kept apart from the
    /// screen model.
    pub fn overlay(&self) -> Vec<(Position, Cell)> {
        self.inner
            .lock()
            .unwrap()
            .predictions
            .iter()
            .filter_map(|p| match p {
                Prediction::Printable { position, cell, .. } => Some((*position, *cell)),
                Prediction::Cursor { .. } => None,
            })
            .collect()
    }

    /// Where the cursor would sit if all predictions land; `None` when
    /// nothing is outstanding.
    pub fn predicted_cursor(&self) -> Option<Position> {
        self.inner
            .lock()
            .unwrap()
            .predictions
            .back()
            .map(|p| p.cursor_after())
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().unwrap().predictions.len()
    }
}

impl Default for TypeAheadManager {
    fn default() -> Self {
        Self::new(TypeAheadConfig::default())
    }
}

fn update_ewma(inner: &mut Inner, sample: Duration) {
    let sample_ms = sample.as_secs_f64() * 1000.0;
    inner.latency_ms = Some(match inner.latency_ms {
        Some(old) => EWMA_ALPHA * sample_ms + (1.0 - EWMA_ALPHA) * old,
        None => sample_ms,
    });
}
