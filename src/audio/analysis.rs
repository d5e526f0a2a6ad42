use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::Deserialize;
use std::sync::Arc;

use super::store::SampleStore;

pub const DEFAULT_FFT_SIZE: usize = 1024;

/// Normalized per-instant summary handed from analysis to rendering.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameDescriptor {
    /// One value per bar, each in 0.0-1.0
    pub magnitudes: Vec<f32>,
    pub timestamp_seconds: f64,
}

impl FrameDescriptor {
    pub fn silent(bin_count: usize, timestamp_seconds: f64) -> Self {
        Self {
            magnitudes: vec![0.0; bin_count],
            timestamp_seconds,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    /// Max-abs envelope of equal sub-blocks of the window
    #[default]
    Peak,
    /// FFT magnitudes grouped into output bins
    Spectrum,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinGrouping {
    #[default]
    Linear,
    Log,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// Divide by digital full scale (1.0)
    #[default]
    FullScale,
    /// Divide by the peak absolute amplitude of channel 0
    TrackPeak,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AnalyzerSettings {
    pub mode: AnalysisMode,
    pub window_seconds: f64,
    pub fft_size: usize,
    pub grouping: BinGrouping,
    pub min_hz: f32,
    pub max_hz: f32,
    pub min_db: f32,
    pub max_db: f32,
    pub normalization: Normalization,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            mode: AnalysisMode::Peak,
            window_seconds: 0.1,
            fft_size: DEFAULT_FFT_SIZE,
            grouping: BinGrouping::Linear,
            min_hz: 0.0,
            max_hz: 5500.0,
            min_db: -100.0,
            max_db: -30.0,
            normalization: Normalization::FullScale,
        }
    }
}

/// Turns a window of samples into a `FrameDescriptor`.
///
/// Holds no per-call state, so one analyzer can be shared across threads and
/// the same arguments always produce bit-identical output.
#[derive(Clone)]
pub struct SpectralAnalyzer {
    settings: AnalyzerSettings,
    fft: Arc<dyn Fft<f32>>,
    window: Arc<[f32]>,
}

impl std::fmt::Debug for SpectralAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectralAnalyzer")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl SpectralAnalyzer {
    pub fn new(mut settings: AnalyzerSettings) -> Self {
        settings.fft_size = settings.fft_size.max(32).next_power_of_two();
        if !settings.window_seconds.is_finite() || settings.window_seconds <= 0.0 {
            settings.window_seconds = AnalyzerSettings::default().window_seconds;
        }
        if settings.max_db <= settings.min_db {
            settings.max_db = settings.min_db + 1.0;
        }

        let fft = FftPlanner::<f32>::new().plan_fft_forward(settings.fft_size);
        let window = blackman_window(settings.fft_size).into();

        Self {
            settings,
            fft,
            window,
        }
    }

    pub fn analyze(&self, store: &SampleStore, timestamp_seconds: f64, bin_count: usize) -> FrameDescriptor {
        let t = clamp_time(timestamp_seconds);
        let bin_count = bin_count.max(1);
        let Ok(samples) = store.channel(0) else {
            return FrameDescriptor::silent(bin_count, t);
        };
        let sr = store.sample_rate() as f64;
        let start = (t * sr).floor() as usize;
        let gain = self.gain(store);

        let mut magnitudes = match self.settings.mode {
            AnalysisMode::Peak => {
                let len = (self.settings.window_seconds * sr).round().max(1.0) as usize;
                block_peaks(samples, start, len, bin_count)
            }
            AnalysisMode::Spectrum => self.spectrum(samples, store.sample_rate(), start, bin_count, gain),
        };

        if self.settings.mode == AnalysisMode::Peak {
            for m in magnitudes.iter_mut() {
                *m *= gain;
            }
        }
        for m in magnitudes.iter_mut() {
            *m = sanitize(*m);
        }

        FrameDescriptor {
            magnitudes,
            timestamp_seconds: t,
        }
    }

    /// Peak envelope of the whole track, independent of the analysis mode.
    pub fn overview(&self, store: &SampleStore, bin_count: usize) -> FrameDescriptor {
        let bin_count = bin_count.max(1);
        let Ok(samples) = store.channel(0) else {
            return FrameDescriptor::silent(bin_count, 0.0);
        };
        let gain = self.gain(store);
        let magnitudes = block_peaks(samples, 0, samples.len(), bin_count)
            .into_iter()
            .map(|m| sanitize(m * gain))
            .collect();
        FrameDescriptor {
            magnitudes,
            timestamp_seconds: 0.0,
        }
    }

    fn gain(&self, store: &SampleStore) -> f32 {
        match self.settings.normalization {
            Normalization::FullScale => 1.0,
            Normalization::TrackPeak if store.peak() > 1e-6 => 1.0 / store.peak(),
            Normalization::TrackPeak => 1.0,
        }
    }

    fn spectrum(&self, samples: &[f32], sample_rate: u32, start: usize, bin_count: usize, gain: f32) -> Vec<f32> {
        let n = self.settings.fft_size;
        if start >= samples.len() {
            return vec![0.0; bin_count];
        }

        // Zero-padded past the end of the track
        let mut buffer: Vec<Complex<f32>> = (0..n)
            .map(|i| {
                let s = samples.get(start + i).copied().unwrap_or(0.0);
                Complex::new(s * gain * self.window[i], 0.0)
            })
            .collect();
        self.fft.process(&mut buffer);

        let half = n / 2;
        let resolution = sample_rate as f32 / n as f32;
        let nyquist = sample_rate as f32 / 2.0;
        let max_hz = self.settings.max_hz.min(nyquist).max(resolution);
        let min_hz = self.settings.min_hz.clamp(0.0, max_hz - resolution);
        let db_range = self.settings.max_db - self.settings.min_db;

        (0..bin_count)
            .map(|i| {
                let (lo_hz, hi_hz) = band_edges(self.settings.grouping, min_hz, max_hz, i, bin_count);
                let lo = ((lo_hz / resolution).floor() as usize).min(half - 1);
                let hi = ((hi_hz / resolution).ceil() as usize).clamp(lo + 1, half);
                let peak = buffer[lo..hi].iter().map(|c| c.norm()).fold(0.0f32, f32::max) / n as f32;
                if peak <= 0.0 {
                    return 0.0;
                }
                let db = 20.0 * peak.log10();
                (db - self.settings.min_db) / db_range
            })
            .collect()
    }
}

/// Peak absolute amplitude of `bin_count` equal sub-blocks of
/// `samples[start..start + len]`. Indices past the end read as silence.
fn block_peaks(samples: &[f32], start: usize, len: usize, bin_count: usize) -> Vec<f32> {
    if start >= samples.len() {
        return vec![0.0; bin_count];
    }
    (0..bin_count)
        .map(|i| {
            let block_start = start.saturating_add(i * len / bin_count);
            let block_end = start.saturating_add((i + 1) * len / bin_count).max(block_start.saturating_add(1));
            let lo = block_start.min(samples.len());
            let hi = block_end.min(samples.len());
            samples[lo..hi].iter().map(|s| s.abs()).fold(0.0f32, f32::max)
        })
        .collect()
}

fn band_edges(grouping: BinGrouping, min_hz: f32, max_hz: f32, i: usize, bin_count: usize) -> (f32, f32) {
    let frac = |k: usize| k as f32 / bin_count as f32;
    match grouping {
        BinGrouping::Linear => {
            let span = max_hz - min_hz;
            (min_hz + span * frac(i), min_hz + span * frac(i + 1))
        }
        BinGrouping::Log => {
            let lo = min_hz.max(20.0).min(max_hz * 0.5);
            let ratio = max_hz / lo;
            (lo * ratio.powf(frac(i)), lo * ratio.powf(frac(i + 1)))
        }
    }
}

fn clamp_time(t: f64) -> f64 {
    if t.is_finite() {
        t.max(0.0)
    } else {
        0.0
    }
}

fn sanitize(v: f32) -> f32 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn blackman_window(size: usize) -> Vec<f32> {
    let n = size as f32;
    (0..size)
        .map(|i| {
            let x = 2.0 * std::f32::consts::PI * i as f32 / n;
            0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()
        })
        .collect()
}
