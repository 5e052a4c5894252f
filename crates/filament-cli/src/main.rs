use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{self, Event, KeyEventKind},
    execute, queue,
    terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen, SetTitle},
};
use filament_common::input::{KeyCode, KeyModifiers};
use filament_common::types::{RequestOrigin, Size};
use filament_core::{
    input, EventBus, ExecutorManager, PtyConnector, StarterConfig, TerminalEvent, TerminalStarter,
    TerminalState, TypeAheadManager,
};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about = "Filament terminal demo", long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Terminal rows (defaults to current terminal size)
    #[arg(long)]
    rows: Option<u16>,

    /// Terminal columns (defaults to current terminal size)
    #[arg(long)]
    cols: Option<u16>,

    /// Override shell to run (e.g. /bin/sh)
    #[arg(long)]
    shell: Option<String>,

    /// Scroll-back depth in lines
    #[arg(long, default_value_t = 5000)]
    history: usize,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        "filament=debug"
    } else {
        "filament=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let (width, height) = terminal::size().unwrap_or((80, 24));
    let size = Size::new(
        args.cols.unwrap_or(if width > 0 { width } else { 80 }),
        args.rows.unwrap_or(if height > 0 { height } else { 24 }),
    );
    if size.rows == 0 || size.cols == 0 {
        anyhow::bail!("terminal must have a non-zero size");
    }
    info!(?size, "starting filament demo");

    let connector: Arc<PtyConnector> = Arc::new(match &args.shell {
        Some(shell) => PtyConnector::spawn(shell, size)?,
        None => PtyConnector::spawn_shell(size)?,
    });
    let terminal = Arc::new(Mutex::new(TerminalState::new(size, args.history)));
    let typeahead = Arc::new(TypeAheadManager::default());
    let bus = EventBus::new();
    let mut events = bus.subscribe();

    let executors = ExecutorManager::new()?;
    let mut starter = TerminalStarter::new(
        Arc::clone(&terminal),
        connector,
        Arc::clone(&typeahead),
        bus,
        StarterConfig::default(),
    );
    starter.start(&executors)?;
    let starter = Arc::new(starter);

    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, Clear(ClearType::All), Hide)?;

    let input_starter = Arc::clone(&starter);
    let input_terminal = Arc::clone(&terminal);
    let input_thread = std::thread::spawn(move || {
        if let Err(e) = handle_input(&input_starter, &input_terminal) {
            debug!(error = %e, "input loop ended");
        }
    });

    // Event loop: repaint on damage, stop on disconnect.
    loop {
        match events.blocking_recv() {
            Ok(TerminalEvent::Damage) => draw(&terminal, &typeahead, &mut stdout)?,
            Ok(TerminalEvent::Title(title)) => execute!(stdout, SetTitle(title))?,
            Ok(TerminalEvent::Resized(_)) => {
                execute!(stdout, Clear(ClearType::All))?;
                draw(&terminal, &typeahead, &mut stdout)?;
            }
            Ok(TerminalEvent::Bell) => {}
            Ok(TerminalEvent::Disconnected) | Ok(TerminalEvent::Error(_)) | Err(_) => break,
        }
    }

    info!("session ended");
    execute!(stdout, Show, LeaveAlternateScreen)?;
    terminal::disable_raw_mode()?;
    let _ = input_thread.join();
    executors.shutdown(Duration::from_millis(200));
    Ok(())
}

/// Repaint damaged lines and the type-ahead overlay.
fn draw(
    terminal: &Mutex<TerminalState>,
    typeahead: &TypeAheadManager,
    stdout: &mut io::Stdout,
) -> Result<()> {
    let (damage, cursor, visible) = {
        let mut term = terminal.lock().unwrap();
        let damage = term.buffer_mut().drain_damage();
        (damage, term.cursor_position(), term.cursor_visible())
    };
    for (row, line) in damage {
        queue!(
            stdout,
            MoveTo(0, row as u16),
            Clear(ClearType::CurrentLine)
        )?;
        write!(stdout, "{}", line.text())?;
    }
    for (pos, cell) in typeahead.overlay() {
        queue!(stdout, MoveTo(pos.col, pos.row))?;
        write!(stdout, "{}", cell.ch)?;
    }
    if visible {
        queue!(stdout, MoveTo(cursor.col, cursor.row), Show)?;
    } else {
        queue!(stdout, Hide)?;
    }
    stdout.flush()?;
    Ok(())
}

fn handle_input(
    starter: &TerminalStarter,
    terminal: &Mutex<TerminalState>,
) -> Result<()> {
    loop {
        if !event::poll(Duration::from_millis(100))? {
            continue;
        }
        match event::read()? {
            Event::Key(key) if key.kind != KeyEventKind::Release => {
                let modifiers = convert_modifiers(key.modifiers);
                // Ctrl+Q detaches the demo.
                if key.code == event::KeyCode::Char('q')
                    && modifiers.contains(KeyModifiers::CTRL)
                {
                    starter.close();
                    return Ok(());
                }
                if let Some(code) = convert_key(key.code) {
                    let modes = terminal.lock().unwrap().input_modes();
                    let bytes = input::encode_key(code, modifiers, &modes);
                    if !bytes.is_empty() {
                        starter.send_bytes(bytes, true)?;
                    }
                }
            }
            Event::Paste(text) => {
                let modes = terminal.lock().unwrap().input_modes();
                starter.send_bytes(input::bracket_paste(&text, &modes), true)?;
            }
            Event::Resize(cols, rows) => {
                starter.post_resize(Size::new(cols, rows), RequestOrigin::User)?;
            }
            _ => {}
        }
    }
}

fn convert_key(code: event::KeyCode) -> Option<KeyCode> {
    Some(match code {
        event::KeyCode::Char(c) => KeyCode::Char(c),
        event::KeyCode::Enter => KeyCode::Enter,
        event::KeyCode::Tab | event::KeyCode::BackTab => KeyCode::Tab,
        event::KeyCode::Backspace => KeyCode::Backspace,
        event::KeyCode::Esc => KeyCode::Escape,
        event::KeyCode::Up => KeyCode::Up,
        event::KeyCode::Down => KeyCode::Down,
        event::KeyCode::Left => KeyCode::Left,
        event::KeyCode::Right => KeyCode::Right,
        event::KeyCode::Home => KeyCode::Home,
        event::KeyCode::End => KeyCode::End,
        event::KeyCode::PageUp => KeyCode::PageUp,
        event::KeyCode::PageDown => KeyCode::PageDown,
        event::KeyCode::Insert => KeyCode::Insert,
        event::KeyCode::Delete => KeyCode::Delete,
        event::KeyCode::F(n) => KeyCode::F(n),
        _ => return None,
    })
}

fn convert_modifiers(modifiers: event::KeyModifiers) -> KeyModifiers {
    let mut out = KeyModifiers::empty();
    if modifiers.contains(event::KeyModifiers::SHIFT) {
        out |= KeyModifiers::SHIFT;
    }
    if modifiers.contains(event::KeyModifiers::ALT) {
        out |= KeyModifiers::ALT;
    }
    if modifiers.contains(event::KeyModifiers::CONTROL) {
        out |= KeyModifiers::CTRL;
    }
    out
}
