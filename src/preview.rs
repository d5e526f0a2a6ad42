use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::audio::analysis::FrameDescriptor;
use crate::playback::clock::{PlaybackStatus, TimeSource};
use crate::playback::output::AudioOutput;
use crate::playback::session::Session;
use crate::render::terminal::TerminalSurface;
use crate::render_loop::live::{IntervalTicker, LiveExit, LiveLoop};
use crate::render_loop::{CancelToken, Scene};

const KEY_POLL: Duration = Duration::from_millis(100);
const IDLE_REFRESH: Duration = Duration::from_millis(100);

pub struct PreviewOptions {
    pub refresh_hz: f64,
    pub seek_step: f64,
    pub audio: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Command {
    Toggle,
    SeekBy(f64),
    Rewind,
    Quit,
}

fn command_for(code: KeyCode, modifiers: KeyModifiers, step: f64) -> Option<Command> {
    match code {
        KeyCode::Char(' ') => Some(Command::Toggle),
        KeyCode::Left => Some(Command::SeekBy(-step)),
        KeyCode::Right => Some(Command::SeekBy(step)),
        KeyCode::Home => Some(Command::Rewind),
        KeyCode::Char('q') | KeyCode::Esc => Some(Command::Quit),
        KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => Some(Command::Quit),
        _ => None,
    }
}

/// `m:ss`, truncated to whole seconds.
pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() { seconds.max(0.0) as u64 } else { 0 };
    format!("{}:{:02}", total / 60, total % 60)
}

fn status_line(status: PlaybackStatus, position: f64, duration: f64) -> String {
    let icon = match status {
        PlaybackStatus::Playing => "▶",
        PlaybackStatus::Paused => "⏸",
        PlaybackStatus::Stopped => "■",
    };
    format!(
        " {} {} / {}   [space] play/pause  [←/→] seek  [home] restart  [q] quit",
        icon,
        format_time(position),
        format_time(duration)
    )
}

/// Reads keys on its own thread and drives the session. Quitting raises
/// `cancel`, which also ends this thread.
fn spawn_controls(
    session: Arc<Session>,
    cancel: CancelToken,
    seek_step: f64,
) -> thread::JoinHandle<Result<()>> {
    thread::spawn(move || {
        while !cancel.is_cancelled() {
            if !event::poll(KEY_POLL)? {
                continue;
            }
            let Event::Key(key) = event::read()? else {
                continue;
            };
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match command_for(key.code, key.modifiers, seek_step) {
                Some(Command::Toggle) => {
                    if let Err(e) = session.toggle() {
                        log::warn!("{}", e);
                    }
                }
                Some(Command::SeekBy(delta)) => {
                    session.seek(session.clock().current_time() + delta);
                }
                Some(Command::Rewind) => {
                    session.seek(0.0);
                }
                Some(Command::Quit) => cancel.cancel(),
                None => {}
            }
        }
        Ok(())
    })
}

/// Play the loaded track as a live terminal visualization until the user
/// quits.
pub fn run(
    scene: Arc<Scene>,
    session: Arc<Session>,
    time: Arc<dyn TimeSource>,
    options: &PreviewOptions,
) -> Result<()> {
    let clock = session.clock().clone();
    let duration = clock.duration().context("No media loaded for preview")?;
    let cancel = CancelToken::new();

    let mut surface = TerminalSurface::open().context("Failed to open terminal surface")?;
    let controls = spawn_controls(session.clone(), cancel.clone(), options.seek_step);

    let status_clock = clock.clone();
    let mut set_status = move |surface: &mut TerminalSurface, d: &FrameDescriptor| {
        surface.set_status(status_line(status_clock.status(), d.timestamp_seconds, duration));
    };

    // Without a device the preview still runs, just silently
    let _audio = if options.audio {
        AudioOutput::open(scene.store().clone(), clock.clone())
            .map_err(|e| log::warn!("Audio output unavailable, previewing without sound: {:#}", e))
            .ok()
    } else {
        None
    };

    let mut live = LiveLoop::new(scene, clock.clone());
    let mut ticker = IntervalTicker::new(time, options.refresh_hz);
    session.play()?;

    let outcome = (|| -> Result<()> {
        loop {
            let stats = live.run(&mut ticker, &mut surface, &cancel, &mut set_status)?;
            if stats.exit == LiveExit::Cancelled {
                break;
            }
            // Paused or stopped: keep the picture current for seeks until
            // playback resumes.
            while clock.status() != PlaybackStatus::Playing {
                live.render_once(&mut surface, &mut set_status)?;
                if cancel.wait_timeout(IDLE_REFRESH) {
                    return Ok(());
                }
            }
        }
        Ok(())
    })();

    cancel.cancel();
    session.stop();
    drop(surface);

    match controls.join() {
        Ok(result) => result.context("Keyboard input failed")?,
        Err(_) => anyhow::bail!("Keyboard thread panicked"),
    }
    outcome
}
