use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Monotonic time, measured from an arbitrary origin.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Duration;
}

/// Real monotonic clock backed by `Instant`.
pub struct MonotonicTime {
    origin: Instant,
}

impl MonotonicTime {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicTime {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicTime {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackStatus {
    Stopped,
    Playing,
    Paused,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    User,
    EndOfMedia,
}

/// Transport changes broadcast to subscribers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClockEvent {
    Playing { from: f64 },
    Paused { at: f64 },
    Seeked { to: f64 },
    Stopped { at: f64, reason: StopReason },
    MediaChanged { duration: Option<f64> },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaybackState {
    pub status: PlaybackStatus,
    pub position_seconds: f64,
    /// Wall-clock reading taken when playback was (re)anchored
    pub started_at: Option<Duration>,
}

struct Inner {
    state: PlaybackState,
    duration: Option<f64>,
    last_stop: Option<StopReason>,
}

impl Inner {
    fn duration(&self) -> f64 {
        self.duration.unwrap_or(0.0)
    }

    fn clamp(&self, t: f64) -> f64 {
        if t.is_finite() {
            t.clamp(0.0, self.duration())
        } else {
            0.0
        }
    }

    fn interpolated(&self, now: Duration) -> f64 {
        match (self.state.status, self.state.started_at) {
            (PlaybackStatus::Playing, Some(anchor)) => {
                let elapsed = now.saturating_sub(anchor).as_secs_f64();
                self.clamp(self.state.position_seconds + elapsed)
            }
            _ => self.state.position_seconds,
        }
    }
}

/// Authoritative "current audio time".
///
/// Transport operations take the write lock; `current_time` readers only
/// need the read lock, so a render thread never observes a half-applied seek.
pub struct PlaybackClock {
    time: Arc<dyn TimeSource>,
    inner: RwLock<Inner>,
    listeners: Mutex<Vec<Sender<ClockEvent>>>,
}

impl PlaybackClock {
    pub fn new(time: Arc<dyn TimeSource>) -> Self {
        Self {
            time,
            inner: RwLock::new(Inner {
                state: PlaybackState {
                    status: PlaybackStatus::Stopped,
                    position_seconds: 0.0,
                    started_at: None,
                },
                duration: None,
                last_stop: None,
            }),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Replace (or clear) the loaded media. Resets to a stopped clock at 0.
    pub fn set_media(&self, duration: Option<f64>) {
        let duration = duration.filter(|d| d.is_finite()).map(|d| d.max(0.0));
        {
            let mut inner = self.write();
            inner.duration = duration;
            inner.state = PlaybackState {
                status: PlaybackStatus::Stopped,
                position_seconds: 0.0,
                started_at: None,
            };
            inner.last_stop = None;
        }
        self.emit(ClockEvent::MediaChanged { duration });
    }

    pub fn duration(&self) -> Option<f64> {
        self.read().duration
    }

    pub fn status(&self) -> PlaybackStatus {
        self.read().state.status
    }

    pub fn snapshot(&self) -> PlaybackState {
        self.read().state
    }

    pub fn play(&self) -> Result<()> {
        let from = {
            let mut inner = self.write();
            if inner.duration.is_none() {
                return Err(Error::NoMedia);
            }
            match inner.state.status {
                PlaybackStatus::Playing => return Ok(()),
                PlaybackStatus::Stopped if inner.last_stop == Some(StopReason::EndOfMedia) => {
                    inner.state.position_seconds = 0.0;
                }
                _ => {}
            }
            inner.last_stop = None;
            inner.state.status = PlaybackStatus::Playing;
            inner.state.started_at = Some(self.time.now());
            inner.state.position_seconds
        };
        log::debug!("play from {:.3}s", from);
        self.emit(ClockEvent::Playing { from });
        Ok(())
    }

    pub fn pause(&self) {
        let at = {
            let mut inner = self.write();
            if inner.state.status != PlaybackStatus::Playing {
                return;
            }
            let at = inner.interpolated(self.time.now());
            inner.state = PlaybackState {
                status: PlaybackStatus::Paused,
                position_seconds: at,
                started_at: None,
            };
            at
        };
        log::debug!("pause at {:.3}s", at);
        self.emit(ClockEvent::Paused { at });
    }

    /// Clamp `t` into the media and jump there. Never fails.
    pub fn seek(&self, t: f64) -> f64 {
        let to = {
            let mut inner = self.write();
            let to = inner.clamp(t);
            inner.state.position_seconds = to;
            if inner.state.status == PlaybackStatus::Playing {
                inner.state.started_at = Some(self.time.now());
            }
            inner.last_stop = None;
            to
        };
        log::debug!("seek to {:.3}s (requested {:.3}s)", to, t);
        self.emit(ClockEvent::Seeked { to });
        to
    }

    /// User-initiated stop; rewinds to the start.
    pub fn stop(&self) {
        let at = {
            let mut inner = self.write();
            if inner.state.status == PlaybackStatus::Stopped {
                return;
            }
            let at = inner.interpolated(self.time.now());
            inner.state = PlaybackState {
                status: PlaybackStatus::Stopped,
                position_seconds: 0.0,
                started_at: None,
            };
            inner.last_stop = Some(StopReason::User);
            at
        };
        self.emit(ClockEvent::Stopped {
            at,
            reason: StopReason::User,
        });
    }

    pub fn current_time(&self) -> f64 {
        self.read().interpolated(self.time.now())
    }

    /// Fraction of the media played, 0.0-1.0.
    #[cfg(test)]
    pub fn progress(&self) -> f64 {
        let inner = self.read();
        let duration = inner.duration();
        if duration > 0.0 {
            inner.interpolated(self.time.now()) / duration
        } else {
            0.0
        }
    }

    /// Detect end-of-media. Called once per render tick.
    pub fn poll(&self) -> PlaybackStatus {
        let ended = {
            let mut inner = self.write();
            if inner.state.status != PlaybackStatus::Playing {
                return inner.state.status;
            }
            let now = inner.interpolated(self.time.now());
            if now < inner.duration() {
                return PlaybackStatus::Playing;
            }
            inner.state = PlaybackState {
                status: PlaybackStatus::Stopped,
                position_seconds: inner.duration(),
                started_at: None,
            };
            inner.last_stop = Some(StopReason::EndOfMedia);
            inner.duration()
        };
        log::info!("End of media at {:.3}s", ended);
        self.emit(ClockEvent::Stopped {
            at: ended,
            reason: StopReason::EndOfMedia,
        });
        PlaybackStatus::Stopped
    }

    pub fn last_stop_reason(&self) -> Option<StopReason> {
        self.read().last_stop
    }

    pub fn subscribe(&self) -> Receiver<ClockEvent> {
        let (tx, rx) = mpsc::channel();
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    fn emit(&self, event: ClockEvent) {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.retain(|tx| tx.send(event).is_ok());
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Hand-driven time source for deterministic tests.
#[cfg(test)]
#[derive(Default)]
pub struct ManualTime {
    nanos: std::sync::atomic::AtomicU64,
}

#[cfg(test)]
impl ManualTime {
    pub fn advance(&self, by: Duration) {
        self.nanos
            .fetch_add(by.as_nanos() as u64, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
impl TimeSource for ManualTime {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(std::sync::atomic::Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn clock_with(duration: f64) -> (Arc<ManualTime>, PlaybackClock) {
        let time = Arc::new(ManualTime::default());
        let clock = PlaybackClock::new(time.clone());
        clock.set_media(Some(duration));
        (time, clock)
    }

    #[test]
    fn play_without_media_is_no_media() {
        let clock = PlaybackClock::new(Arc::new(ManualTime::default()));
        assert!(matches!(clock.play(), Err(Error::NoMedia)));
        assert_eq!(clock.status(), PlaybackStatus::Stopped);
        // seek still clamps rather than failing
        assert_eq!(clock.seek(4.0), 0.0);
    }

    #[test]
    fn seek_play_wait_advances_by_elapsed() {
        for prior in ["stopped", "paused", "playing"] {
            let (time, clock) = clock_with(10.0);
            match prior {
                "paused" => {
                    clock.play().unwrap();
                    time.advance(Duration::from_millis(700));
                    clock.pause();
                }
                "playing" => {
                    clock.play().unwrap();
                    time.advance(Duration::from_millis(300));
                }
                _ => {}
            }
            clock.seek(2.5);
            clock.play().unwrap();
            time.advance(Duration::from_millis(1250));
            assert!((clock.current_time() - 3.75).abs() < EPS, "prior state {prior}");
        }
    }

    #[test]
    fn pause_freezes_position() {
        let (time, clock) = clock_with(10.0);
        clock.play().unwrap();
        time.advance(Duration::from_secs(2));
        clock.pause();
        time.advance(Duration::from_secs(5));
        assert_eq!(clock.status(), PlaybackStatus::Paused);
        assert!((clock.current_time() - 2.0).abs() < EPS);
        assert_eq!(clock.snapshot().started_at, None);

        clock.play().unwrap();
        time.advance(Duration::from_secs(1));
        assert!((clock.current_time() - 3.0).abs() < EPS);
    }

    #[test]
    fn seek_clamps_and_end_of_media_stops_on_next_poll() {
        let (time, clock) = clock_with(10.0);
        let events = clock.subscribe();

        assert_eq!(clock.seek(12.0), 10.0);
        assert_eq!(clock.snapshot().position_seconds, 10.0);
        assert_eq!(clock.seek(-1.0), 0.0);
        clock.seek(12.0);

        clock.play().unwrap();
        assert_eq!(clock.status(), PlaybackStatus::Playing);
        time.advance(Duration::from_millis(16));
        assert_eq!(clock.poll(), PlaybackStatus::Stopped);
        assert_eq!(clock.last_stop_reason(), Some(StopReason::EndOfMedia));
        assert_eq!(clock.current_time(), 10.0);

        let seen: Vec<ClockEvent> = events.try_iter().collect();
        assert!(seen.contains(&ClockEvent::Stopped {
            at: 10.0,
            reason: StopReason::EndOfMedia
        }));
    }

    #[test]
    fn current_time_never_exceeds_duration() {
        let (time, clock) = clock_with(1.0);
        clock.play().unwrap();
        time.advance(Duration::from_secs(3));
        assert_eq!(clock.current_time(), 1.0);
        assert!((clock.progress() - 1.0).abs() < EPS);
    }

    #[test]
    fn play_after_end_of_media_restarts() {
        let (time, clock) = clock_with(1.0);
        clock.play().unwrap();
        time.advance(Duration::from_secs(2));
        clock.poll();
        clock.play().unwrap();
        assert_eq!(clock.current_time(), 0.0);
        time.advance(Duration::from_millis(500));
        assert!((clock.current_time() - 0.5).abs() < EPS);
    }

    #[test]
    fn user_stop_is_distinct_from_end_of_media() {
        let (time, clock) = clock_with(5.0);
        let events = clock.subscribe();
        clock.play().unwrap();
        time.advance(Duration::from_secs(1));
        clock.stop();
        assert_eq!(clock.last_stop_reason(), Some(StopReason::User));
        assert_eq!(clock.current_time(), 0.0);
        let last = events.try_iter().last();
        assert_eq!(
            last,
            Some(ClockEvent::Stopped {
                at: 1.0,
                reason: StopReason::User
            })
        );
    }

    #[test]
    fn seek_while_playing_reanchors() {
        let (time, clock) = clock_with(10.0);
        clock.play().unwrap();
        time.advance(Duration::from_secs(4));
        clock.seek(1.0);
        assert!((clock.current_time() - 1.0).abs() < EPS);
        time.advance(Duration::from_millis(500));
        assert!((clock.current_time() - 1.5).abs() < EPS);
    }

    #[test]
    fn concurrent_readers_see_monotonic_time() {
        let time = Arc::new(MonotonicTime::new());
        let clock = Arc::new(PlaybackClock::new(time));
        clock.set_media(Some(60.0));
        clock.play().unwrap();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let clock = clock.clone();
                std::thread::spawn(move || {
                    let mut last = 0.0;
                    for _ in 0..1000 {
                        let now = clock.current_time();
                        assert!(now >= last);
                        last = now;
                    }
                })
            })
            .collect();
        for r in readers {
            r.join().unwrap();
        }
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let (_time, clock) = clock_with(1.0);
        drop(clock.subscribe());
        let live = clock.subscribe();
        clock.seek(0.5);
        assert_eq!(live.try_recv().unwrap(), ClockEvent::Seeked { to: 0.5 });
        assert_eq!(clock.listeners.lock().unwrap().len(), 1);
    }
}
