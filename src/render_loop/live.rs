use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

use super::{CancelToken, Scene};
use crate::audio::analysis::FrameDescriptor;
use crate::error::{Error, Result};
use crate::playback::clock::{ClockEvent, PlaybackClock, PlaybackStatus, StopReason, TimeSource};
use crate::render::frame::FrameRenderer;
use crate::render::target::RenderTarget;

pub const MIN_REFRESH_HZ: f64 = 1.0;
pub const MAX_REFRESH_HZ: f64 = 240.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Tick {
    /// Refresh slots that passed without a tick
    pub skipped: u64,
}

/// Paces the live loop. Returns `None` once cancelled or exhausted.
pub trait TickSource {
    fn next_tick(&mut self, cancel: &CancelToken) -> Option<Tick>;
}

/// Fixed-rate ticks on a monotonic clock. A late tick is delivered once and
/// the slots it overran are skipped, never queued.
pub struct IntervalTicker {
    time: Arc<dyn TimeSource>,
    interval: Duration,
    deadline: Option<Duration>,
}

impl IntervalTicker {
    pub fn new(time: Arc<dyn TimeSource>, refresh_hz: f64) -> Self {
        let hz = if refresh_hz.is_finite() {
            refresh_hz.clamp(MIN_REFRESH_HZ, MAX_REFRESH_HZ)
        } else {
            MIN_REFRESH_HZ
        };
        Self {
            time,
            interval: Duration::from_secs_f64(1.0 / hz),
            deadline: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// Given the slot that was due at `deadline` and the time it actually fired,
/// return how many later slots were missed and when the next one is due.
fn schedule(deadline: Duration, fired_at: Duration, interval: Duration) -> (u64, Duration) {
    let interval_ns = interval.as_nanos().max(1);
    let late_ns = fired_at.saturating_sub(deadline).as_nanos();
    let slots = late_ns / interval_ns;
    let missed = u64::try_from(slots).unwrap_or(u64::MAX);
    let next_ns = deadline.as_nanos() + interval_ns * (slots + 1);
    let next = u64::try_from(next_ns).map(Duration::from_nanos).unwrap_or(Duration::MAX);
    (missed, next)
}

impl TickSource for IntervalTicker {
    fn next_tick(&mut self, cancel: &CancelToken) -> Option<Tick> {
        let now = self.time.now();
        let deadline = self.deadline.unwrap_or(now);
        if now < deadline {
            if cancel.wait_timeout(deadline - now) {
                return None;
            }
        } else if cancel.is_cancelled() {
            return None;
        }

        let (skipped, next) = schedule(deadline, self.time.now(), self.interval);
        self.deadline = Some(next);
        if skipped > 0 {
            log::debug!("live tick late, skipped {} slot(s)", skipped);
        }
        Some(Tick { skipped })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LiveExit {
    Cancelled,
    EndOfMedia,
    Paused,
    Stopped,
    /// The tick source ran dry
    Exhausted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LiveStats {
    pub rendered: u64,
    pub dropped: u64,
    pub target_failures: u64,
    pub exit: LiveExit,
}

/// Best-effort renderer following the playback clock.
pub struct LiveLoop {
    scene: Arc<Scene>,
    clock: Arc<PlaybackClock>,
    renderer: FrameRenderer,
    events: Receiver<ClockEvent>,
}

impl LiveLoop {
    pub fn new(scene: Arc<Scene>, clock: Arc<PlaybackClock>) -> Self {
        let events = clock.subscribe();
        Self {
            scene,
            clock,
            renderer: FrameRenderer::live(),
            events,
        }
    }

    /// Smoothing must not blend across a jump in time.
    fn drain_events(&mut self) {
        let jumped = self
            .events
            .try_iter()
            .any(|e| matches!(e, ClockEvent::Seeked { .. } | ClockEvent::MediaChanged { .. }));
        if jumped {
            self.renderer.reset();
        }
    }

    /// Render and present a single frame at the clock's current time,
    /// whatever its status.
    pub fn render_once<T: RenderTarget>(
        &mut self,
        target: &mut T,
        mut on_frame: impl FnMut(&mut T, &FrameDescriptor),
    ) -> Result<FrameDescriptor> {
        self.drain_events();
        let time = self.clock.current_time();
        let descriptor = self.scene.tick(&mut self.renderer, time, target)?;
        on_frame(target, &descriptor);
        target.present()?;
        Ok(descriptor)
    }

    /// Tick until playback leaves the Playing state, the tick source stops,
    /// or `cancel` is raised. A target failure is retried on the next tick;
    /// two in a row end the loop with the error.
    pub fn run<T: RenderTarget>(
        &mut self,
        ticks: &mut dyn TickSource,
        target: &mut T,
        cancel: &CancelToken,
        mut on_frame: impl FnMut(&mut T, &FrameDescriptor),
    ) -> Result<LiveStats> {
        let mut stats = LiveStats {
            rendered: 0,
            dropped: 0,
            target_failures: 0,
            exit: LiveExit::Exhausted,
        };
        let mut failed_last = false;

        loop {
            let tick = match ticks.next_tick(cancel) {
                Some(tick) => tick,
                None if cancel.is_cancelled() => {
                    stats.exit = LiveExit::Cancelled;
                    break;
                }
                None => break,
            };
            if cancel.is_cancelled() {
                stats.exit = LiveExit::Cancelled;
                break;
            }
            stats.dropped += tick.skipped;

            match self.clock.poll() {
                PlaybackStatus::Playing => {}
                PlaybackStatus::Paused => {
                    stats.exit = LiveExit::Paused;
                    break;
                }
                PlaybackStatus::Stopped => {
                    stats.exit = match self.clock.last_stop_reason() {
                        Some(StopReason::EndOfMedia) => LiveExit::EndOfMedia,
                        _ => LiveExit::Stopped,
                    };
                    break;
                }
            }

            match self.render_once(target, &mut on_frame) {
                Ok(_) => {
                    stats.rendered += 1;
                    failed_last = false;
                }
                Err(Error::RenderTarget(e)) if !failed_last => {
                    log::warn!("Live frame failed, retrying next tick: {}", e);
                    stats.target_failures += 1;
                    failed_last = true;
                }
                Err(e) => {
                    log::error!("Live loop stopped: {}", e);
                    return Err(e);
                }
            }
        }

        log::debug!(
            "live loop exit {:?}: {} rendered, {} dropped",
            stats.exit, stats.rendered, stats.dropped
        );
        Ok(stats)
    }
}
