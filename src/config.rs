use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::audio::analysis::{AnalysisMode, AnalyzerSettings, BinGrouping, Normalization};
use crate::cli::Cli;
use crate::render::style::{BarLayout, Fill, RenderStyle};
use crate::render_loop::Visual;

pub const CONFIG_FILE: &str = "ovio.toml";
pub const BRAND: &str = "made by ovio";

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub style: StyleConfig,
    #[serde(default)]
    pub overlay: OverlayConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output")]
    pub path: PathBuf,
    #[serde(default = "default_size")]
    pub width: u32,
    #[serde(default = "default_size")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_crf")]
    pub crf: u32,
    #[serde(default = "default_codec")]
    pub codec: String,
    #[serde(default = "default_pix_fmt")]
    pub pix_fmt: String,
    #[serde(default)]
    pub bitrate: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub mode: AnalysisMode,
    #[serde(default = "default_bins")]
    pub bins: usize,
    #[serde(default = "default_window")]
    pub window_seconds: f64,
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
    #[serde(default)]
    pub grouping: BinGrouping,
    #[serde(default)]
    pub min_hz: f32,
    #[serde(default = "default_max_hz")]
    pub max_hz: f32,
    #[serde(default = "default_min_db")]
    pub min_db: f32,
    #[serde(default = "default_max_db")]
    pub max_db: f32,
    #[serde(default)]
    pub normalization: Normalization,
}

/// A preset plus per-field overrides.
#[derive(Debug, Deserialize)]
pub struct StyleConfig {
    #[serde(default = "default_preset")]
    pub preset: String,
    #[serde(default)]
    pub visual: Visual,
    pub background: Option<Fill>,
    pub bar: Option<Fill>,
    pub progress: Option<Fill>,
    pub layout: Option<BarLayout>,
    pub bar_width: Option<f32>,
    pub bar_spacing: Option<f32>,
    pub max_bar_height: Option<f32>,
    pub min_bar_height: Option<f32>,
    pub draw_silent: Option<bool>,
    pub corner_radius: Option<f32>,
    pub smoothing: Option<f32>,
}

#[derive(Debug, Deserialize)]
pub struct OverlayConfig {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default = "default_true")]
    pub brand: bool,
    #[serde(default)]
    pub font: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct PreviewConfig {
    #[serde(default = "default_refresh_hz")]
    pub refresh_hz: f64,
    /// Seconds jumped by the arrow keys
    #[serde(default = "default_seek_step")]
    pub seek_step: f64,
    /// Play the track through the default output device
    #[serde(default = "default_true")]
    pub audio: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output(),
            width: default_size(),
            height: default_size(),
            fps: default_fps(),
            crf: default_crf(),
            codec: default_codec(),
            pix_fmt: default_pix_fmt(),
            bitrate: None,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            mode: AnalysisMode::default(),
            bins: default_bins(),
            window_seconds: default_window(),
            fft_size: default_fft_size(),
            grouping: BinGrouping::default(),
            min_hz: 0.0,
            max_hz: default_max_hz(),
            min_db: default_min_db(),
            max_db: default_max_db(),
            normalization: Normalization::default(),
        }
    }
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            preset: default_preset(),
            visual: Visual::default(),
            background: None,
            bar: None,
            progress: None,
            layout: None,
            bar_width: None,
            bar_spacing: None,
            max_bar_height: None,
            min_bar_height: None,
            draw_silent: None,
            corner_radius: None,
            smoothing: None,
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            title: None,
            brand: true,
            font: None,
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            refresh_hz: default_refresh_hz(),
            seek_step: default_seek_step(),
            audio: true,
        }
    }
}

fn default_output() -> PathBuf { PathBuf::from("output.mp4") }
fn default_size() -> u32 { 1200 }
fn default_fps() -> u32 { 30 }
fn default_crf() -> u32 { 18 }
fn default_codec() -> String { "libx264".into() }
fn default_pix_fmt() -> String { "yuv420p".into() }
fn default_bins() -> usize { 128 }
fn default_window() -> f64 { AnalyzerSettings::default().window_seconds }
fn default_fft_size() -> usize { AnalyzerSettings::default().fft_size }
fn default_max_hz() -> f32 { AnalyzerSettings::default().max_hz }
fn default_min_db() -> f32 { AnalyzerSettings::default().min_db }
fn default_max_db() -> f32 { AnalyzerSettings::default().max_db }
fn default_preset() -> String { "ovio".into() }
fn default_true() -> bool { true }
fn default_refresh_hz() -> f64 { 60.0 }
fn default_seek_step() -> f64 { 5.0 }

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Invalid config: {}", path.display()))
}

/// `./ovio.toml`, then `~/.config/ovio/config.toml`, then the platform
/// config directory.
pub fn discover_config_path() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("ovio").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("ovio").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

impl Config {
    /// Command-line flags win over file values.
    pub fn merge_cli(&mut self, cli: &Cli) {
        if let Some(ref p) = cli.output { self.output.path = p.clone(); }
        if let Some(w) = cli.width { self.output.width = w; }
        if let Some(h) = cli.height { self.output.height = h; }
        if let Some(fps) = cli.fps { self.output.fps = fps; }
        if let Some(crf) = cli.crf { self.output.crf = crf; }
        if let Some(ref codec) = cli.codec { self.output.codec = codec.clone(); }
        if let Some(ref pix_fmt) = cli.pix_fmt { self.output.pix_fmt = pix_fmt.clone(); }
        if cli.bitrate.is_some() { self.output.bitrate = cli.bitrate.clone(); }

        if let Some(mode) = cli.mode { self.analysis.mode = mode; }
        if let Some(bins) = cli.bins { self.analysis.bins = bins; }

        if let Some(ref preset) = cli.style { self.style.preset = preset.clone(); }
        if let Some(visual) = cli.visual { self.style.visual = visual; }
        if cli.smoothing.is_some() { self.style.smoothing = cli.smoothing; }

        if cli.title.is_some() { self.overlay.title = cli.title.clone(); }
        if cli.no_brand { self.overlay.brand = false; }
        if cli.font.is_some() { self.overlay.font = cli.font.clone(); }

        if cli.mute { self.preview.audio = false; }
    }
}

impl AnalysisConfig {
    pub fn settings(&self) -> AnalyzerSettings {
        AnalyzerSettings {
            mode: self.mode,
            window_seconds: self.window_seconds,
            fft_size: self.fft_size,
            grouping: self.grouping,
            min_hz: self.min_hz,
            max_hz: self.max_hz,
            min_db: self.min_db,
            max_db: self.max_db,
            normalization: self.normalization,
        }
    }
}

impl StyleConfig {
    /// Resolve the preset and apply overrides. Unknown presets fall back to
    /// the default with a warning.
    pub fn resolve(&self) -> RenderStyle {
        let mut style = RenderStyle::preset(&self.preset).unwrap_or_else(|| {
            log::warn!(
                "Unknown style preset '{}', using '{}' (available: {})",
                self.preset,
                default_preset(),
                RenderStyle::PRESETS.join(", ")
            );
            RenderStyle::default()
        });

        if let Some(ref bg) = self.background { style.background = bg.clone(); }
        if let Some(ref bar) = self.bar { style.bar = bar.clone(); }
        if self.progress.is_some() { style.progress = self.progress.clone(); }
        if let Some(v) = self.layout { style.layout = v; }
        if let Some(v) = self.bar_width { style.bar_width = v.max(0.0); }
        if let Some(v) = self.bar_spacing { style.bar_spacing = v.max(0.0); }
        if let Some(v) = self.max_bar_height { style.max_bar_height = v.clamp(0.0, 1.0); }
        if let Some(v) = self.min_bar_height { style.min_bar_height = v.max(0.0); }
        if let Some(v) = self.draw_silent { style.draw_silent = v; }
        if let Some(v) = self.corner_radius { style.corner_radius = v.max(0.0); }
        if let Some(v) = self.smoothing { style.smoothing = v.clamp(0.0, 1.0); }
        style
    }
}
