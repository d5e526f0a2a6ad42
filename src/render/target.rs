use crate::error::RenderTargetError;

/// A fixed-size RGBA surface that frames are drawn into.
pub trait RenderTarget {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// Row-major pixels, `width * height` entries.
    fn pixels_mut(&mut self) -> Result<&mut [[u8; 4]], RenderTargetError>;

    /// Hand the finished frame to whatever displays it.
    fn present(&mut self) -> Result<(), RenderTargetError> {
        Ok(())
    }
}

/// In-memory target used for export and as the backing store of surfaces.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    pixels: Vec<[u8; 4]>,
}

impl FrameBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![[0, 0, 0, 255]; width as usize * height as usize],
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.pixels.clear();
        self.pixels.resize(width as usize * height as usize, [0, 0, 0, 255]);
    }

    pub fn pixels(&self) -> &[[u8; 4]] {
        &self.pixels
    }

    /// Raw RGBA bytes, as expected by `ffmpeg -pixel_format rgba`.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get((y * self.width + x) as usize).copied()
    }
}

impl RenderTarget for FrameBuffer {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn pixels_mut(&mut self) -> Result<&mut [[u8; 4]], RenderTargetError> {
        if self.pixels.is_empty() {
            return Err(RenderTargetError::Unavailable("zero-sized frame buffer".into()));
        }
        Ok(&mut self.pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_view_matches_pixel_layout() {
        let mut fb = FrameBuffer::new(2, 1);
        fb.pixels_mut().unwrap()[1] = [1, 2, 3, 4];
        assert_eq!(fb.as_bytes(), &[0, 0, 0, 255, 1, 2, 3, 4]);
        assert_eq!(fb.pixel(1, 0), Some([1, 2, 3, 4]));
        assert_eq!(fb.pixel(2, 0), None);
    }

    #[test]
    fn zero_sized_buffer_is_unavailable() {
        let mut fb = FrameBuffer::new(0, 10);
        assert!(fb.pixels_mut().is_err());
        fb.resize(3, 3);
        assert_eq!(fb.pixels_mut().unwrap().len(), 9);
    }
}
