use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use filament_common::error::{FilamentError, Result};
use filament_common::traits::TtyConnector;
use filament_common::types::Size;
use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use tracing::{debug, error, info, warn};

fn pty_size(size: Size) -> PtySize {
    PtySize {
        rows: size.rows,
        cols: size.cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

/// [`TtyConnector`] over a local PTY and shell child process.
///
/// The reader and writer halves live behind separate locks so the
/// reader thread and the coordinator can share one connector. `close`
/// kills the child, which releases a blocked `read` with EOF.
pub struct PtyConnector {
    master: Mutex<Box<dyn portable_pty::MasterPty + Send>>,
    reader: Mutex<Box<dyn Read + Send>>,
    writer: Mutex<Box<dyn Write + Send>>,
    child: Mutex<Box<dyn portable_pty::Child + Send + Sync>>,
    closed: AtomicBool,
    name: String,
}

impl PtyConnector {
    /// Spawn the user's shell on a fresh PTY of the given size.
    pub fn spawn_shell(size: Size) -> Result<Self> {
        let shell = std::env::var("SHELL").unwrap_or_else(|_| {
            if cfg!(windows) {
                "cmd.exe".to_string()
            } else {
                "/bin/sh".to_string()
            }
        });
        Self::spawn(&shell, size)
    }

    pub fn spawn(program: &str, size: Size) -> Result<Self> {
        info!(program, ?size, "spawning PTY");
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(pty_size(size))
            .map_err(|e| FilamentError::Pty(format!("failed to open PTY: {e}")))?;

        let mut cmd = CommandBuilder::new(program);
        cmd.env("TERM", "xterm-256color");
        cmd.env("COLORTERM", "truecolor");
        if let Ok(cwd) = std::env::current_dir() {
            cmd.cwd(cwd);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| FilamentError::Pty(format!("failed to spawn {program}: {e}")))?;
        // Relinquish the slave side to the child.
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| FilamentError::Pty(format!("failed to clone reader: {e}")))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| FilamentError::Pty(format!("failed to take writer: {e}")))?;
        debug!("PTY ready");

        Ok(Self {
            master: Mutex::new(pair.master),
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            child: Mutex::new(child),
            closed: AtomicBool::new(false),
            name: program.to_string(),
        })
    }
}

impl TtyConnector for PtyConnector {
    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut reader = self.reader.lock().unwrap();
        match reader.read(buf) {
            Ok(n) => Ok(n),
            // A closed master shows up as an error on some platforms;
            // report it as EOF once we initiated the close.
            Err(_) if self.closed.load(Ordering::SeqCst) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, bytes: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().unwrap();
        writer.write_all(bytes)?;
        writer.flush()?;
        Ok(())
    }

    fn resize(&self, size: Size) -> Result<()> {
        self.master
            .lock()
            .unwrap()
            .resize(pty_size(size))
            .map_err(|e| FilamentError::Pty(format!("failed to resize PTY: {e}")))
    }

    fn is_connected(&self) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        match self.child.lock().unwrap().try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                debug!(?status, "child exited");
                false
            }
            Err(e) => {
                error!(error = %e, "failed to check child status");
                false
            }
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(name = %self.name, "closing PTY");
        if let Err(e) = self.child.lock().unwrap().kill() {
            warn!(error = %e, "failed to kill child");
        }
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}
