use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::Arc;

use super::clock::{PlaybackClock, PlaybackStatus};
use crate::audio::store::SampleStore;

/// Largest gap between the audio cursor and the clock before the cursor
/// jumps to the clock, in seconds
const RESYNC_SECONDS: f64 = 0.1;

/// Produces interleaved device samples from the store at the clock's
/// position. Silent unless the clock is playing.
pub struct ClockFollower {
    store: Arc<SampleStore>,
    clock: Arc<PlaybackClock>,
    channels: usize,
    /// Source frames per device frame
    step: f64,
    /// Source frame the next device frame reads from
    cursor: Option<f64>,
}

impl ClockFollower {
    pub fn new(store: Arc<SampleStore>, clock: Arc<PlaybackClock>, device_rate: u32, channels: u16) -> Self {
        let step = store.sample_rate() as f64 / device_rate.max(1) as f64;
        Self {
            store,
            clock,
            channels: channels as usize,
            step,
            cursor: None,
        }
    }

    pub fn fill(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        if self.channels == 0 || self.clock.status() != PlaybackStatus::Playing {
            self.cursor = None;
            return;
        }

        // Follow seeks and any drift between the device and the wall clock
        let rate = self.store.sample_rate() as f64;
        let target = self.clock.current_time() * rate;
        let mut pos = match self.cursor {
            Some(cursor) if (cursor - target).abs() <= RESYNC_SECONDS * rate => cursor,
            _ => target,
        };

        let sources: Vec<&[f32]> = (0..self.store.channel_count())
            .filter_map(|c| self.store.channel(c).ok())
            .collect();
        let Some(last) = sources.len().checked_sub(1) else {
            return;
        };

        for frame in out.chunks_mut(self.channels) {
            for (c, sample) in frame.iter_mut().enumerate() {
                *sample = interpolate(sources[c.min(last)], pos);
            }
            pos += self.step;
        }
        self.cursor = Some(pos);
    }
}

/// Linear interpolation between neighbouring samples; silence past the end.
fn interpolate(samples: &[f32], pos: f64) -> f32 {
    let i = pos.max(0.0).floor() as usize;
    let frac = (pos - i as f64).clamp(0.0, 1.0) as f32;
    let a = samples.get(i).copied().unwrap_or(0.0);
    let b = samples.get(i.saturating_add(1)).copied().unwrap_or(0.0);
    a + (b - a) * frac
}

/// Default output device playing the loaded track in step with the clock.
/// Sound stops when this is dropped.
pub struct AudioOutput {
    _stream: cpal::Stream,
}

impl AudioOutput {
    pub fn open(store: Arc<SampleStore>, clock: Arc<PlaybackClock>) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .context("No audio output device found")?;
        let supported = device
            .default_output_config()
            .context("Failed to get audio output config")?;
        let config: cpal::StreamConfig = supported.clone().into();

        log::info!(
            "Audio: {} @ {}Hz, {} channel(s)",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            config.sample_rate.0,
            config.channels
        );

        let follower = ClockFollower::new(store, clock, config.sample_rate.0, config.channels);
        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, follower)?,
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, follower)?,
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, follower)?,
            f => anyhow::bail!("Unsupported sample format: {}", f),
        };
        stream.play().context("Failed to start audio stream")?;

        Ok(Self { _stream: stream })
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut follower: ClockFollower,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();
    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);
                follower.fill(&mut scratch);
                for (out, &s) in data.iter_mut().zip(&scratch) {
                    *out = T::from_sample(s);
                }
            },
            |err| log::error!("Audio stream error: {}", err),
            None,
        )
        .context("Failed to build audio stream")?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::clock::ManualTime;
    use std::time::Duration;

    /// Stereo ramp: left is the frame index, right its negation.
    fn ramp(frames: usize, sample_rate: u32) -> Arc<SampleStore> {
        let left: Vec<f32> = (0..frames).map(|i| i as f32).collect();
        let right = left.iter().map(|s| -s).collect();
        Arc::new(SampleStore::from_channels(vec![left, right], sample_rate).unwrap())
    }

    fn setup(store: &Arc<SampleStore>) -> (Arc<ManualTime>, Arc<PlaybackClock>) {
        let time = Arc::new(ManualTime::default());
        let clock = Arc::new(PlaybackClock::new(time.clone()));
        clock.set_media(Some(store.duration_seconds()));
        (time, clock)
    }

    #[test]
    fn silent_until_playing() {
        let store = ramp(1000, 100);
        let (_, clock) = setup(&store);
        clock.seek(2.0);
        let mut follower = ClockFollower::new(store, clock, 100, 2);
        let mut out = vec![1.0; 8];
        follower.fill(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn plays_from_clock_position_continuously() {
        let store = ramp(1000, 100);
        let (_, clock) = setup(&store);
        clock.seek(2.0);
        clock.play().unwrap();
        let mut follower = ClockFollower::new(store, clock, 100, 2);

        let mut out = vec![0.0; 6];
        follower.fill(&mut out);
        assert_eq!(out, vec![200.0, -200.0, 201.0, -201.0, 202.0, -202.0]);

        // Clock has not moved, but the cursor stays within tolerance
        follower.fill(&mut out);
        assert_eq!(out[0], 203.0);
    }

    #[test]
    fn seek_moves_the_cursor() {
        let store = ramp(1000, 100);
        let (_, clock) = setup(&store);
        clock.play().unwrap();
        let mut follower = ClockFollower::new(store, clock.clone(), 100, 1);
        let mut out = vec![0.0; 4];
        follower.fill(&mut out);
        assert_eq!(out[0], 0.0);

        clock.seek(5.0);
        follower.fill(&mut out);
        assert_eq!(out, vec![500.0, 501.0, 502.0, 503.0]);
    }

    #[test]
    fn pause_silences_and_resume_resyncs() {
        let store = ramp(1000, 100);
        let (time, clock) = setup(&store);
        clock.play().unwrap();
        let mut follower = ClockFollower::new(store, clock.clone(), 100, 1);
        let mut out = vec![0.0; 4];
        follower.fill(&mut out);

        time.advance(Duration::from_secs(1));
        clock.pause();
        follower.fill(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));

        clock.play().unwrap();
        follower.fill(&mut out);
        assert_eq!(out[0], 100.0);
    }

    #[test]
    fn resamples_and_upmixes_mono() {
        let samples: Vec<f32> = (0..100).map(|i| i as f32).collect();
        let store = Arc::new(SampleStore::from_channels(vec![samples], 100).unwrap());
        let (_, clock) = setup(&store);
        clock.play().unwrap();
        // Device runs at twice the source rate with two channels
        let mut follower = ClockFollower::new(store, clock, 200, 2);
        let mut out = vec![0.0; 8];
        follower.fill(&mut out);
        assert_eq!(out, vec![0.0, 0.0, 0.5, 0.5, 1.0, 1.0, 1.5, 1.5]);
    }

    #[test]
    fn reads_past_the_end_as_silence() {
        assert_eq!(interpolate(&[1.0, 2.0], 1.5), 1.0);
        assert_eq!(interpolate(&[1.0, 2.0], 7.0), 0.0);
    }
}
