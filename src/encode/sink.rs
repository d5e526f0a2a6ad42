use anyhow::Result;

use crate::audio::analysis::FrameDescriptor;
use crate::render::target::FrameBuffer;

/// One rendered export frame.
pub struct ExportFrame {
    pub index: usize,
    pub timestamp_seconds: f64,
    pub descriptor: FrameDescriptor,
    pub buffer: FrameBuffer,
}

/// Consumer of export frames, fed strictly in index order.
///
/// `finish` is called once after the last frame. `abort` is called instead
/// when the export fails and must discard everything written so far.
pub trait VideoSink {
    fn write_frame(&mut self, frame: &ExportFrame) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
    fn abort(&mut self);
}

/// Keeps frame metadata in memory.
#[cfg(test)]
#[derive(Default)]
pub struct MemorySink {
    pub timestamps: Vec<f64>,
    pub indices: Vec<usize>,
    pub descriptors: Vec<FrameDescriptor>,
    pub finished: bool,
    pub aborted: bool,
    /// Fail the write of this frame index
    pub fail_at: Option<usize>,
}

#[cfg(test)]
impl VideoSink for MemorySink {
    fn write_frame(&mut self, frame: &ExportFrame) -> Result<()> {
        if self.fail_at == Some(frame.index) {
            anyhow::bail!("disk full");
        }
        self.indices.push(frame.index);
        self.timestamps.push(frame.timestamp_seconds);
        self.descriptors.push(frame.descriptor.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }

    fn abort(&mut self) {
        self.aborted = true;
        self.indices.clear();
        self.timestamps.clear();
        self.descriptors.clear();
    }
}
