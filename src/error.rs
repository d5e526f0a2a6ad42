use thiserror::Error;

/// Failures while turning raw bytes into a `SampleStore`.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unsupported audio format: {0}")]
    Unsupported(String),
    #[error("corrupt audio stream: {0}")]
    Corrupt(String),
    #[error("audio contains no samples")]
    Empty,
    #[error("failed to read audio file: {0}")]
    Io(#[from] std::io::Error),
}

/// The pixel buffer of a render target could not be reached.
#[derive(Debug, Error)]
pub enum RenderTargetError {
    #[error("render target unavailable: {0}")]
    Unavailable(String),
    #[error("failed to present frame: {0}")]
    Present(#[from] std::io::Error),
}

/// Why an export stopped before handing every frame to the sink.
#[derive(Debug, Error)]
pub enum AbortReason {
    #[error("cancelled")]
    Cancelled,
    #[error("frame {index} failed: {message}")]
    FrameFailed { index: usize, message: String },
    #[error("video sink failed: {0}")]
    SinkFailed(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("sample index {index} out of range for channel {channel} (channels={channels}, len={len})")]
    OutOfRange {
        channel: usize,
        index: usize,
        channels: usize,
        len: usize,
    },

    #[error("no media loaded")]
    NoMedia,

    #[error(transparent)]
    RenderTarget(#[from] RenderTargetError),

    #[error("export aborted after {frames_written}/{total} frames: {reason}")]
    ExportAborted {
        reason: AbortReason,
        frames_written: usize,
        total: usize,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
