use crossterm::{
    cursor, execute, queue,
    style::{Color as TermColor, Print, ResetColor, SetBackgroundColor, SetForegroundColor},
    terminal::{self, ClearType},
};
use std::io::{stdout, BufWriter, Stdout, Write};

use super::target::{FrameBuffer, RenderTarget};
use crate::error::RenderTargetError;

/// Rows reserved under the picture for the status line.
const STATUS_ROWS: u16 = 1;

/// True-color terminal surface. Each character cell shows two vertically
/// stacked pixels using the upper half block glyph.
pub struct TerminalSurface {
    buffer: FrameBuffer,
    out: BufWriter<Stdout>,
    frame: Vec<u8>,
    status: String,
    cols: u16,
    rows: u16,
}

impl TerminalSurface {
    pub fn open() -> Result<Self, RenderTargetError> {
        let mut out = BufWriter::with_capacity(1024 * 1024, stdout());
        terminal::enable_raw_mode()?;
        execute!(
            out,
            terminal::EnterAlternateScreen,
            cursor::Hide,
            terminal::Clear(ClearType::All)
        )?;

        let (cols, rows) = terminal::size()?;
        let (w, h) = pixel_size(cols, rows);
        Ok(Self {
            buffer: FrameBuffer::new(w, h),
            out,
            frame: Vec::with_capacity((cols as usize * rows as usize * 40).max(64 * 1024)),
            status: String::new(),
            cols,
            rows,
        })
    }

    pub fn set_status(&mut self, status: String) {
        self.status = status;
    }

    /// Pick up terminal resizes between frames.
    fn sync_size(&mut self) -> Result<(), RenderTargetError> {
        let (cols, rows) = terminal::size()?;
        if (cols, rows) != (self.cols, self.rows) {
            self.cols = cols;
            self.rows = rows;
            let (w, h) = pixel_size(cols, rows);
            self.buffer.resize(w, h);
            queue!(self.out, terminal::Clear(ClearType::All))?;
        }
        Ok(())
    }
}

fn pixel_size(cols: u16, rows: u16) -> (u32, u32) {
    (cols as u32, rows.saturating_sub(STATUS_ROWS) as u32 * 2)
}

impl RenderTarget for TerminalSurface {
    fn width(&self) -> u32 {
        self.buffer.width()
    }

    fn height(&self) -> u32 {
        self.buffer.height()
    }

    fn pixels_mut(&mut self) -> Result<&mut [[u8; 4]], RenderTargetError> {
        self.buffer.pixels_mut()
    }

    fn present(&mut self) -> Result<(), RenderTargetError> {
        let width = self.buffer.width();
        let height = self.buffer.height();
        if width == 0 || height == 0 {
            return Err(RenderTargetError::Unavailable("terminal too small".into()));
        }

        self.frame.clear();
        queue!(self.frame, cursor::MoveTo(0, 0))?;
        for cell_row in 0..height / 2 {
            if cell_row > 0 {
                queue!(self.frame, cursor::MoveTo(0, cell_row as u16))?;
            }
            let mut last: Option<([u8; 4], [u8; 4])> = None;
            for x in 0..width {
                let top = self.buffer.pixel(x, cell_row * 2).unwrap_or([0, 0, 0, 255]);
                let bottom = self.buffer.pixel(x, cell_row * 2 + 1).unwrap_or([0, 0, 0, 255]);
                if last != Some((top, bottom)) {
                    queue!(
                        self.frame,
                        SetForegroundColor(TermColor::Rgb { r: top[0], g: top[1], b: top[2] }),
                        SetBackgroundColor(TermColor::Rgb {
                            r: bottom[0],
                            g: bottom[1],
                            b: bottom[2]
                        })
                    )?;
                    last = Some((top, bottom));
                }
                queue!(self.frame, Print('▀'))?;
            }
        }

        let status: String = self.status.chars().take(self.cols as usize).collect();
        queue!(
            self.frame,
            ResetColor,
            cursor::MoveTo(0, (height / 2) as u16),
            terminal::Clear(ClearType::CurrentLine),
            Print(status)
        )?;

        self.out.write_all(&self.frame)?;
        self.out.flush()?;
        self.sync_size()
    }
}

impl Drop for TerminalSurface {
    fn drop(&mut self) {
        let _ = execute!(self.out, ResetColor, cursor::Show, terminal::LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_size_reserves_status_row() {
        assert_eq!(pixel_size(80, 24), (80, 46));
        assert_eq!(pixel_size(80, 1), (80, 0));
        assert_eq!(pixel_size(0, 0), (0, 0));
    }
}
