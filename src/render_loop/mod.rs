pub mod export;
pub mod live;
pub mod reorder;

use serde::Deserialize;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use crate::audio::analysis::{FrameDescriptor, SpectralAnalyzer};
use crate::audio::store::SampleStore;
use crate::error::RenderTargetError;
use crate::render::frame::FrameRenderer;
use crate::render::style::RenderStyle;
use crate::render::target::RenderTarget;
use crate::render::text::Caption;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Visual {
    /// Bars analyzed at the current playback time
    #[default]
    Live,
    /// Whole-track envelope with a played/unplayed split
    Overview,
}

/// Everything needed to turn a timestamp into pixels. Immutable and shared
/// between the live loop and export workers.
pub struct Scene {
    store: Arc<SampleStore>,
    analyzer: SpectralAnalyzer,
    style: RenderStyle,
    caption: Option<Caption>,
    bin_count: usize,
    overview: Option<FrameDescriptor>,
}

impl Scene {
    pub fn new(
        store: Arc<SampleStore>,
        analyzer: SpectralAnalyzer,
        style: RenderStyle,
        bin_count: usize,
        visual: Visual,
    ) -> Self {
        let bin_count = bin_count.max(1);
        let overview = match visual {
            Visual::Overview => Some(analyzer.overview(&store, bin_count)),
            Visual::Live => None,
        };
        Self {
            store,
            analyzer,
            style,
            caption: None,
            bin_count,
            overview,
        }
    }

    pub fn with_caption(mut self, caption: Option<Caption>) -> Self {
        self.caption = caption.filter(|c| !c.is_empty());
        self
    }

    pub fn store(&self) -> &Arc<SampleStore> {
        &self.store
    }

    pub fn descriptor_at(&self, time: f64) -> FrameDescriptor {
        match self.overview {
            Some(ref overview) => FrameDescriptor {
                magnitudes: overview.magnitudes.clone(),
                timestamp_seconds: time.max(0.0),
            },
            None => self.analyzer.analyze(&self.store, time, self.bin_count),
        }
    }

    /// The step both loops share: analyze, render, caption.
    pub fn tick(
        &self,
        renderer: &mut FrameRenderer,
        time: f64,
        target: &mut dyn RenderTarget,
    ) -> Result<FrameDescriptor, RenderTargetError> {
        let descriptor = self.descriptor_at(time);
        let duration = self.store.duration_seconds();
        let progress = if duration > 0.0 { time / duration } else { 0.0 };

        renderer.render(&descriptor, &self.style, Some(progress), target)?;

        if let Some(ref caption) = self.caption {
            let (w, h) = (target.width(), target.height());
            caption.draw(target.pixels_mut()?, w, h);
        }
        Ok(descriptor)
    }
}

/// Cancellation flag whose waits wake up as soon as it is raised.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent. Once this returns no new tick or frame is started.
    pub fn cancel(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep up to `timeout`; returns true if cancelled meanwhile.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = cvar
            .wait_timeout_while(guard, timeout, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::audio::analysis::AnalyzerSettings;
    use crate::render::target::FrameBuffer;
    use std::time::Instant;

    /// Mono sine at 220 Hz.
    pub(crate) fn tone_store(seconds: f64, sample_rate: u32) -> Arc<SampleStore> {
        let len = (seconds * sample_rate as f64).round() as usize;
        let samples = (0..len)
            .map(|i| 0.8 * (2.0 * std::f32::consts::PI * 220.0 * i as f32 / sample_rate as f32).sin())
            .collect();
        Arc::new(SampleStore::from_channels(vec![samples], sample_rate).unwrap())
    }

    pub(crate) fn scene(store: Arc<SampleStore>, bins: usize) -> Scene {
        Scene::new(
            store,
            SpectralAnalyzer::new(AnalyzerSettings::default()),
            RenderStyle::classic(),
            bins,
            Visual::Live,
        )
    }

    #[test]
    fn tick_returns_descriptor_for_time() {
        let scene = scene(tone_store(2.0, 8000), 16);
        let mut fb = FrameBuffer::new(32, 16);
        let d = scene.tick(&mut FrameRenderer::export(), 0.5, &mut fb).unwrap();
        assert_eq!(d.timestamp_seconds, 0.5);
        assert_eq!(d.magnitudes.len(), 16);
    }

    #[test]
    fn overview_visual_reuses_track_envelope() {
        let store = tone_store(1.0, 8000);
        let scene = Scene::new(
            store,
            SpectralAnalyzer::new(AnalyzerSettings::default()),
            RenderStyle::spotify(),
            32,
            Visual::Overview,
        );
        let a = scene.descriptor_at(0.1);
        let b = scene.descriptor_at(0.9);
        assert_eq!(a.magnitudes, b.magnitudes);
        assert_eq!(b.timestamp_seconds, 0.9);
    }

    #[test]
    fn cancel_is_idempotent_and_wakes_waiters() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let started = Instant::now();
        let handle = std::thread::spawn(move || waiter.wait_timeout(Duration::from_secs(30)));
        std::thread::sleep(Duration::from_millis(20));
        token.cancel();
        token.cancel();
        assert!(handle.join().unwrap());
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(token.is_cancelled());
    }

    #[test]
    fn wait_times_out_when_not_cancelled() {
        let token = CancelToken::new();
        assert!(!token.wait_timeout(Duration::from_millis(5)));
    }
}
