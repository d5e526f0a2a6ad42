use clap::Parser;
use std::path::PathBuf;

use crate::audio::analysis::AnalysisMode;
use crate::render_loop::Visual;

/// Flags left unset fall back to the config file, then to built-in defaults.
#[derive(Parser, Debug, Default)]
#[command(name = "ovio", about = "Audio waveform visualizer: live terminal preview and video export")]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG, AAC)
    pub input: Option<PathBuf>,

    /// Output video file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Play the track as a live terminal visualization instead of exporting
    #[arg(short, long)]
    pub preview: bool,

    /// Preview without sound
    #[arg(long)]
    pub mute: bool,

    /// Style preset (ovio, classic, spotify)
    #[arg(short, long)]
    pub style: Option<String>,

    /// What the bars show: the current instant or the whole-track overview
    #[arg(long, value_enum)]
    pub visual: Option<Visual>,

    /// Peak envelope or FFT spectrum
    #[arg(short, long, value_enum)]
    pub mode: Option<AnalysisMode>,

    /// Number of bars
    #[arg(long)]
    pub bins: Option<usize>,

    /// Video width in pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Video height in pixels
    #[arg(long)]
    pub height: Option<u32>,

    /// Frames per second
    #[arg(long)]
    pub fps: Option<u32>,

    /// H.264 CRF quality (0-51, lower = better). Ignored when --bitrate is set.
    #[arg(long)]
    pub crf: Option<u32>,

    /// Video bitrate (e.g. 2400k, 5M). When set, uses -b:v instead of -crf.
    #[arg(short, long)]
    pub bitrate: Option<String>,

    /// FFmpeg video codec
    #[arg(long)]
    pub codec: Option<String>,

    /// FFmpeg pixel format
    #[arg(long)]
    pub pix_fmt: Option<String>,

    /// Live smoothing factor (0.0-1.0)
    #[arg(long)]
    pub smoothing: Option<f32>,

    /// Title text overlay (defaults to the input file name)
    #[arg(long)]
    pub title: Option<String>,

    /// Hide the "made by ovio" line
    #[arg(long)]
    pub no_brand: bool,

    /// TTF/OTF font for the text overlay
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// Config file (default: ./ovio.toml, then ~/.config/ovio/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// List style presets and exit
    #[arg(long)]
    pub list_styles: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_preview_flags() {
        let cli = Cli::try_parse_from(["ovio", "song.mp3", "--preview", "--mode", "spectrum", "--visual", "overview"]).unwrap();
        assert!(cli.preview);
        assert!(!cli.mute);
        assert_eq!(cli.mode, Some(AnalysisMode::Spectrum));
        assert_eq!(cli.visual, Some(Visual::Overview));
        assert_eq!(cli.input, Some(PathBuf::from("song.mp3")));
        assert!(cli.width.is_none());
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!(Cli::try_parse_from(["ovio", "a.wav", "--mode", "loud"]).is_err());
    }
}
