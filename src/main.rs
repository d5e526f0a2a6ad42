mod audio;
mod cli;
mod config;
mod encode;
mod error;
mod playback;
mod preview;
mod render;
mod render_loop;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;

use audio::analysis::SpectralAnalyzer;
use cli::Cli;
use config::Config;
use encode::ffmpeg::{EncoderSettings, FfmpegEncoder};
use playback::clock::{MonotonicTime, PlaybackClock, TimeSource};
use playback::session::Session;
use render::style::RenderStyle;
use render::text::{Caption, TextOverlay};
use render_loop::export::{self, ExportSettings};
use render_loop::{CancelToken, Scene};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Log lines would tear the terminal picture during preview
    let default_filter = if cli.preview { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .init();

    if cli.list_styles {
        println!("Available styles:");
        for name in RenderStyle::PRESETS {
            println!("  {}", name);
        }
        return Ok(());
    }

    let mut cfg = match cli.config {
        Some(ref path) => {
            let cfg = config::load_config(path)?;
            log::info!("Loaded config from {}", path.display());
            cfg
        }
        None => match config::discover_config_path() {
            Some(path) => match config::load_config(&path) {
                Ok(cfg) => {
                    log::info!("Loaded config from {}", path.display());
                    cfg
                }
                Err(err) => {
                    log::warn!("{:#}", err);
                    Config::default()
                }
            },
            None => Config::default(),
        },
    };
    cfg.merge_cli(&cli);

    let input = cli.input.as_ref().context("Input audio file is required")?;
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }

    log::info!("ovio - audio waveform visualizer");
    log::info!("Input: {}", input.display());

    let time: Arc<dyn TimeSource> = Arc::new(MonotonicTime::new());
    let mut session = Session::new(Arc::new(PlaybackClock::new(time.clone())));

    log::info!("Decoding audio...");
    let store = session
        .load_file(input)
        .with_context(|| format!("Failed to load {}", input.display()))?;

    let analyzer = SpectralAnalyzer::new(cfg.analysis.settings());
    let style = cfg.style.resolve();
    log::info!(
        "Style: {}, visual: {:?}, mode: {:?}, {} bars",
        cfg.style.preset, cfg.style.visual, cfg.analysis.mode, cfg.analysis.bins
    );
    let scene = Scene::new(store, analyzer, style, cfg.analysis.bins, cfg.style.visual);

    if cli.preview {
        let options = preview::PreviewOptions {
            refresh_hz: cfg.preview.refresh_hz,
            seek_step: cfg.preview.seek_step,
            audio: cfg.preview.audio,
        };
        return preview::run(Arc::new(scene), Arc::new(session), time, &options);
    }

    let scene = scene.with_caption(caption(&cfg, input));
    run_export(Arc::new(scene), &cfg, input)
}

fn caption(cfg: &Config, input: &Path) -> Option<Caption> {
    let title = cfg.overlay.title.clone().or_else(|| {
        input
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
    });
    let brand = cfg.overlay.brand.then(|| config::BRAND.to_string());
    if title.is_none() && brand.is_none() {
        return None;
    }

    match TextOverlay::discover(cfg.overlay.font.as_deref()) {
        Some(overlay) => Some(Caption::new(overlay, title, brand)),
        None => {
            log::warn!("No usable font found, skipping text overlay (set --font)");
            None
        }
    }
}

fn run_export(scene: Arc<Scene>, cfg: &Config, input: &Path) -> Result<()> {
    let out = &cfg.output;
    let (width, height, fps) = (out.width.max(1), out.height.max(1), out.fps.max(1));
    log::info!("Output: {}", out.path.display());
    log::info!("Resolution: {}x{} @ {}fps", width, height, fps);

    let total = export::frame_count(scene.store(), fps);
    if total == 0 {
        anyhow::bail!("Audio is shorter than one frame at {}fps", fps);
    }

    log::info!("Starting FFmpeg encoder...");
    let mut encoder = FfmpegEncoder::new(
        &EncoderSettings {
            width,
            height,
            fps,
            codec: out.codec.clone(),
            pix_fmt: out.pix_fmt.clone(),
            crf: out.crf,
            bitrate: out.bitrate.clone(),
        },
        &out.path,
        input,
    )?;

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames ({eta} remaining)")
            .context("Invalid progress template")?
            .progress_chars("=>-"),
    );

    let settings = ExportSettings {
        fps,
        width,
        height,
        max_in_flight: 0,
    };
    let result = export::run(scene, settings, &mut encoder, &CancelToken::new(), |done, _| {
        pb.set_position(done as u64)
    });

    match result {
        Ok(report) => {
            pb.finish_with_message("Rendering complete");
            log::info!("Done! {} frames written to {}", report.frames, out.path.display());
            Ok(())
        }
        Err(err) => {
            pb.abandon();
            Err(err).context("Export failed")
        }
    }
}
