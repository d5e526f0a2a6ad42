use std::path::Path;
use std::sync::Arc;

use super::clock::PlaybackClock;
use crate::audio::decode;
use crate::audio::store::SampleStore;
use crate::error::Result;

/// Control surface: the only way to mutate the loaded asset and transport.
pub struct Session {
    store: Option<Arc<SampleStore>>,
    clock: Arc<PlaybackClock>,
}

impl Session {
    pub fn new(clock: Arc<PlaybackClock>) -> Self {
        Self { store: None, clock }
    }

    /// Decode and swap in a new asset. On failure the current asset and
    /// transport state are left untouched.
    pub fn load_asset(&mut self, bytes: Vec<u8>, extension_hint: Option<&str>) -> Result<Arc<SampleStore>> {
        let store = Arc::new(decode::load(bytes, extension_hint)?);
        self.replace(store.clone());
        Ok(store)
    }

    pub fn load_file(&mut self, path: &Path) -> Result<Arc<SampleStore>> {
        let store = Arc::new(decode::load_file(path)?);
        self.replace(store.clone());
        Ok(store)
    }

    /// Install an already-decoded asset.
    pub fn replace(&mut self, store: Arc<SampleStore>) {
        self.clock.set_media(Some(store.duration_seconds()));
        self.store = Some(store);
    }

    pub fn store(&self) -> Option<&Arc<SampleStore>> {
        self.store.as_ref()
    }

    pub fn clock(&self) -> &Arc<PlaybackClock> {
        &self.clock
    }

    pub fn play(&self) -> Result<()> {
        self.clock.play()
    }

    pub fn pause(&self) {
        self.clock.pause();
    }

    pub fn toggle(&self) -> Result<()> {
        if self.clock.status() == super::clock::PlaybackStatus::Playing {
            self.clock.pause();
            Ok(())
        } else {
            self.clock.play()
        }
    }

    pub fn seek(&self, t: f64) -> f64 {
        self.clock.seek(t)
    }

    pub fn stop(&self) {
        self.clock.stop();
    }
}
