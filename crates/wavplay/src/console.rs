//! Interactive console control.
//!
//! A raw-mode input thread turns keys into [`PlayerCommand`]s on a channel;
//! the control loop applies them to the session and keeps a single status
//! line refreshed (`\r`-rewritten, never scrolling).
//!
//! Keys: space pause/resume, ↑/↓ volume, `q` (or ctrl-c) stop.

use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{self, Clear, ClearType};
use crossterm::{cursor, execute};

use wav_stream::pipeline::Session;

/// Commands produced by the input thread.
#[derive(Clone, Copy, Debug)]
enum PlayerCommand {
    PauseToggle,
    VolumeUp,
    VolumeDown,
    Stop,
}

/// Restores the terminal no matter how the control loop exits.
struct RawModeGuard;

impl RawModeGuard {
    fn new() -> Result<Self> {
        terminal::enable_raw_mode()?;
        execute!(io::stdout(), cursor::Hide)?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = execute!(io::stdout(), cursor::Show);
        let _ = terminal::disable_raw_mode();
    }
}

fn spawn_input_thread(tx: Sender<PlayerCommand>) {
    thread::spawn(move || {
        loop {
            match event::poll(Duration::from_millis(100)) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(_) => break,
            }
            let Ok(ev) = event::read() else { break };
            let Event::Key(key) = ev else { continue };
            if key.kind == KeyEventKind::Release {
                continue;
            }
            let cmd = match key.code {
                KeyCode::Char(' ') => PlayerCommand::PauseToggle,
                KeyCode::Up => PlayerCommand::VolumeUp,
                KeyCode::Down => PlayerCommand::VolumeDown,
                KeyCode::Char('q') | KeyCode::Esc => PlayerCommand::Stop,
                // Raw mode swallows SIGINT, so ctrl-c arrives as a key.
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    PlayerCommand::Stop
                }
                _ => continue,
            };
            let stopping = matches!(cmd, PlayerCommand::Stop);
            if tx.send(cmd).is_err() || stopping {
                break;
            }
        }
    });
}

/// Drive the session until it finishes, is cancelled, or the user quits.
pub fn run(session: &Session, cancel: &Arc<AtomicBool>) -> Result<()> {
    let _guard = RawModeGuard::new()?;
    let (tx, rx) = bounded(16);
    spawn_input_thread(tx);

    let total = fmt_time(session.duration_ms());

    loop {
        if cancel.load(Ordering::Relaxed) || session.finished() {
            break;
        }

        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(PlayerCommand::PauseToggle) => {
                session.toggle_pause();
            }
            Ok(PlayerCommand::VolumeUp) => {
                session.volume_up();
            }
            Ok(PlayerCommand::VolumeDown) => {
                session.volume_down();
            }
            Ok(PlayerCommand::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        draw_status(session, &total)?;
    }

    let mut out = io::stdout();
    execute!(out, Clear(ClearType::CurrentLine), cursor::MoveToColumn(0))?;
    out.flush()?;
    Ok(())
}

fn draw_status(session: &Session, total: &str) -> Result<()> {
    let paused = if session.is_paused() { "  [PAUSED]" } else { "" };
    let mut out = io::stdout();
    execute!(out, cursor::MoveToColumn(0), Clear(ClearType::CurrentLine))?;
    write!(
        out,
        "Current time: {} / {}  [vol {:3}%]{}",
        fmt_time(session.elapsed_ms()),
        total,
        session.volume(),
        paused,
    )?;
    out.flush()?;
    Ok(())
}

/// Render a duration the way the status line shows it: `3m 07s`.
pub fn fmt_time(ms: u64) -> String {
    let total_secs = ms / 1000;
    format!("{}m {:02}s", total_secs / 60, total_secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fmt_time_pads_seconds() {
        assert_eq!(fmt_time(0), "0m 00s");
        assert_eq!(fmt_time(7_000), "0m 07s");
        assert_eq!(fmt_time(192_000), "3m 12s");
        assert_eq!(fmt_time(60_000), "1m 00s");
    }

    #[test]
    fn fmt_time_truncates_sub_second_remainder() {
        assert_eq!(fmt_time(1_999), "0m 01s");
    }
}
