use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::ffi::OsString;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, Command, Stdio};
use std::thread::{self, JoinHandle};

use super::sink::{ExportFrame, VideoSink};

#[derive(Clone, Debug)]
pub struct EncoderSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub codec: String,
    pub pix_fmt: String,
    pub crf: u32,
    pub bitrate: Option<String>,
}

/// Bytes of ffmpeg's stderr kept for error reports
const STDERR_TAIL: usize = 16 * 1024;

/// Pipes raw RGBA frames into an `ffmpeg` child that muxes them with the
/// source audio file.
pub struct FfmpegEncoder {
    child: Option<Child>,
    stderr: Option<JoinHandle<Vec<u8>>>,
    output_path: PathBuf,
    frame_bytes: usize,
}

/// Keep reading stderr so ffmpeg never stalls on a full pipe. Only the last
/// `STDERR_TAIL` bytes are returned.
fn drain_stderr(mut stderr: ChildStderr) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut tail = VecDeque::with_capacity(STDERR_TAIL);
        let mut chunk = [0u8; 4096];
        loop {
            match stderr.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    tail.extend(&chunk[..n]);
                    let excess = tail.len().saturating_sub(STDERR_TAIL);
                    tail.drain(..excess);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(_) => break,
            }
        }
        Vec::from(tail)
    })
}

fn build_args(settings: &EncoderSettings, output_path: &Path, input_audio: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-y".into(),
        "-hide_banner".into(),
        "-f".into(), "rawvideo".into(),
        "-pixel_format".into(), "rgba".into(),
        "-video_size".into(), format!("{}x{}", settings.width, settings.height).into(),
        "-framerate".into(), settings.fps.to_string().into(),
        "-i".into(), "pipe:0".into(),
        "-i".into(), input_audio.as_os_str().to_owned(),
        "-map".into(), "0:v:0".into(),
        "-map".into(), "1:a:0".into(),
        "-c:v".into(), settings.codec.clone().into(),
        "-pix_fmt".into(), settings.pix_fmt.clone().into(),
    ];

    if let Some(ref br) = settings.bitrate {
        args.extend(["-b:v".into(), br.into()]);
    } else {
        args.extend(["-crf".into(), settings.crf.to_string().into()]);
        args.extend(["-preset".into(), "medium".into()]);
    }

    args.extend([
        "-c:a".into(), "aac".into(),
        "-b:a".into(), "192k".into(),
        "-shortest".into(),
        output_path.as_os_str().to_owned(),
    ]);
    args
}

impl FfmpegEncoder {
    pub fn new(settings: &EncoderSettings, output_path: &Path, input_audio: &Path) -> Result<Self> {
        let mut command = Command::new("ffmpeg");
        command.args(build_args(settings, output_path, input_audio));
        let frame_bytes = settings.width as usize * settings.height as usize * 4;
        let encoder = Self::spawn(command, output_path, frame_bytes)
            .context("Failed to spawn ffmpeg. Is ffmpeg installed?")?;

        log::info!(
            "FFmpeg encoder started: {}x{} @ {}fps, codec={}",
            settings.width, settings.height, settings.fps, settings.codec
        );
        Ok(encoder)
    }

    /// Start `command` as the encoder process. It reads `frame_bytes` per
    /// frame on stdin and writes `output_path`.
    fn spawn(mut command: Command, output_path: &Path, frame_bytes: usize) -> Result<Self> {
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;
        let stderr = child.stderr.take().map(drain_stderr);

        Ok(Self {
            child: Some(child),
            stderr,
            output_path: output_path.to_path_buf(),
            frame_bytes,
        })
    }

    fn stderr_tail(&mut self) -> String {
        let bytes = self
            .stderr
            .take()
            .map(|handle| handle.join().unwrap_or_default())
            .unwrap_or_default();
        String::from_utf8_lossy(&bytes).trim_end().to_string()
    }

    fn child(&mut self) -> Result<&mut Child> {
        self.child.as_mut().context("FFmpeg encoder already closed")
    }
}

impl VideoSink for FfmpegEncoder {
    fn write_frame(&mut self, frame: &ExportFrame) -> Result<()> {
        let bytes = frame.buffer.as_bytes();
        anyhow::ensure!(
            bytes.len() == self.frame_bytes,
            "frame {} has {} bytes, encoder expects {}",
            frame.index,
            bytes.len(),
            self.frame_bytes
        );
        let stdin = self.child()?.stdin.as_mut().context("FFmpeg stdin not available")?;
        stdin.write_all(bytes).context("Failed to write frame to ffmpeg")?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let mut child = self.child.take().context("FFmpeg encoder already closed")?;
        // Close stdin to signal EOF
        drop(child.stdin.take());

        let status = child.wait().context("Failed to wait for ffmpeg")?;
        let stderr = self.stderr_tail();

        if !status.success() {
            let _ = std::fs::remove_file(&self.output_path);
            anyhow::bail!("FFmpeg exited with {}:\n{}", status, stderr);
        }

        log::info!("FFmpeg encoding complete");
        Ok(())
    }

    fn abort(&mut self) {
        if let Some(mut child) = self.child.take() {
            drop(child.stdin.take());
            let _ = child.kill();
            let _ = child.wait();
        }
        self.stderr.take();
        match std::fs::remove_file(&self.output_path) {
            Ok(()) => log::warn!("Discarded partial output {}", self.output_path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove partial output {}: {}", self.output_path.display(), e),
        }
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        // Dropped without finish(): nothing complete was produced
        if self.child.is_some() {
            self.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::analysis::FrameDescriptor;
    use crate::render::target::FrameBuffer;

    fn settings() -> EncoderSettings {
        EncoderSettings {
            width: 640,
            height: 480,
            fps: 24,
            codec: "libx264".into(),
            pix_fmt: "yuv420p".into(),
            crf: 18,
            bitrate: None,
        }
    }

    fn position(args: &[OsString], flag: &str) -> Option<usize> {
        args.iter().position(|a| a == flag)
    }

    #[test]
    fn uses_crf_without_bitrate() {
        let args = build_args(&settings(), Path::new("out.mp4"), Path::new("in.wav"));
        let crf = position(&args, "-crf").unwrap();
        assert_eq!(args[crf + 1], "18");
        assert!(position(&args, "-b:v").is_none());
        let size = position(&args, "-video_size").unwrap();
        assert_eq!(args[size + 1], "640x480");
        assert_eq!(args.last().unwrap(), "out.mp4");
    }

    fn shell(script: &str) -> Command {
        let mut command = Command::new("sh");
        command.args(["-c", script]);
        command
    }

    fn blank_frame(index: usize, side: u32) -> ExportFrame {
        ExportFrame {
            index,
            timestamp_seconds: 0.0,
            descriptor: FrameDescriptor::silent(1, 0.0),
            buffer: FrameBuffer::new(side, side),
        }
    }

    #[cfg(unix)]
    #[test]
    fn chatty_encoder_does_not_block_writes() {
        let out = std::env::temp_dir().join(format!("ovio-chatty-{}.mp4", std::process::id()));
        let command = shell("head -c 300000 /dev/zero >&2; cat >/dev/null");
        let mut encoder = FfmpegEncoder::spawn(command, &out, 64 * 64 * 4).unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        thread::spawn(move || {
            let written = (0..100).try_for_each(|i| encoder.write_frame(&blank_frame(i, 64)));
            let _ = tx.send(written.and_then(|()| encoder.finish()));
        });
        let result = rx
            .recv_timeout(std::time::Duration::from_secs(30))
            .expect("encoder writes stalled");
        assert!(result.is_ok(), "{:?}", result);
    }

    #[cfg(unix)]
    #[test]
    fn failed_encoder_reports_stderr_tail() {
        let out = std::env::temp_dir().join(format!("ovio-failing-{}.mp4", std::process::id()));
        let command = shell("cat >/dev/null; echo 'Unknown encoder' >&2; exit 3");
        let mut encoder = FfmpegEncoder::spawn(command, &out, 4).unwrap();
        let err = encoder.finish().unwrap_err().to_string();
        assert!(err.contains("Unknown encoder"), "{err}");
        assert!(encoder.finish().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn wrong_frame_size_is_rejected() {
        let out = std::env::temp_dir().join(format!("ovio-size-{}.mp4", std::process::id()));
        let mut encoder = FfmpegEncoder::spawn(shell("cat >/dev/null"), &out, 16).unwrap();
        assert!(encoder.write_frame(&blank_frame(0, 4)).is_err());
        encoder.abort();
    }

    #[test]
    fn bitrate_replaces_crf() {
        let s = EncoderSettings {
            bitrate: Some("5M".into()),
            ..settings()
        };
        let args = build_args(&s, Path::new("out.mp4"), Path::new("in.wav"));
        let br = position(&args, "-b:v").unwrap();
        assert_eq!(args[br + 1], "5M");
        assert!(position(&args, "-crf").is_none());
    }
}
