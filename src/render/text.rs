use anyhow::{anyhow, Context, Result};
use fontdue::{Font, FontSettings};
use std::path::{Path, PathBuf};

use super::style::Color;

/// Reference canvas the overlay sizes are tuned for.
const REFERENCE_SIZE: f32 = 1200.0;
const MARGIN: f32 = 40.0;
const TITLE_SIZE: f32 = 32.0;
const BRAND_SIZE: f32 = 24.0;

const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf",
    "/usr/share/fonts/TTF/DejaVuSansMono.ttf",
    "/usr/share/fonts/dejavu/DejaVuSansMono.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationMono-Regular.ttf",
    "/usr/share/fonts/liberation-mono/LiberationMono-Regular.ttf",
    "/System/Library/Fonts/Monaco.ttf",
    "/System/Library/Fonts/Menlo.ttc",
    "C:\\Windows\\Fonts\\consola.ttf",
];

pub struct TextOverlay {
    font: Font,
}

impl TextOverlay {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let font = Font::from_bytes(bytes, FontSettings::default()).map_err(|e| anyhow!("Failed to parse font: {}", e))?;
        Ok(Self { font })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("Failed to read font: {}", path.display()))?;
        Self::from_bytes(&bytes)
    }

    /// Load `explicit` if given, otherwise the first monospace font found in
    /// the usual system locations.
    pub fn discover(explicit: Option<&Path>) -> Option<Self> {
        let candidates: Vec<PathBuf> = match explicit {
            Some(p) => vec![p.to_path_buf()],
            None => SYSTEM_FONTS.iter().map(PathBuf::from).collect(),
        };
        for path in candidates.iter().filter(|p| p.exists()) {
            match Self::from_file(path) {
                Ok(overlay) => {
                    log::info!("Overlay font: {}", path.display());
                    return Some(overlay);
                }
                Err(err) => log::warn!("{:#}", err),
            }
        }
        None
    }

    /// Alpha-composite `text` with its top-left corner at (x, y).
    pub fn composite(
        &self,
        pixels: &mut [[u8; 4]],
        width: u32,
        height: u32,
        text: &str,
        font_size: f32,
        x: i32,
        y: i32,
        color: Color,
    ) {
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(pixels);
        let mut cursor_x = x as f32;
        let color_alpha = color.a as f32 / 255.0;

        for ch in text.chars() {
            let (metrics, bitmap) = self.font.rasterize(ch, font_size);
            let glyph_x = cursor_x.round() as i32 + metrics.xmin;
            let glyph_y = y + font_size as i32 - metrics.height as i32 - metrics.ymin;

            for gy in 0..metrics.height {
                for gx in 0..metrics.width {
                    let coverage = bitmap[gy * metrics.width + gx];
                    if coverage == 0 {
                        continue;
                    }

                    let px = glyph_x + gx as i32;
                    let py = glyph_y + gy as i32;
                    if px < 0 || py < 0 || px >= width as i32 || py >= height as i32 {
                        continue;
                    }

                    let idx = ((py as u32 * width + px as u32) * 4) as usize;
                    if idx + 3 >= bytes.len() {
                        continue;
                    }

                    let a = coverage as f32 / 255.0 * color_alpha;
                    let inv_a = 1.0 - a;
                    bytes[idx] = (color.r as f32 * a + bytes[idx] as f32 * inv_a) as u8;
                    bytes[idx + 1] = (color.g as f32 * a + bytes[idx + 1] as f32 * inv_a) as u8;
                    bytes[idx + 2] = (color.b as f32 * a + bytes[idx + 2] as f32 * inv_a) as u8;
                    bytes[idx + 3] = 255;
                }
            }

            cursor_x += metrics.advance_width;
        }
    }

    /// Measure the width of rendered text in pixels.
    pub fn measure_width(&self, text: &str, font_size: f32) -> u32 {
        text.chars()
            .map(|ch| self.font.metrics(ch, font_size).advance_width)
            .sum::<f32>()
            .ceil() as u32
    }
}

/// Track title (top-left) and brand line (bottom-right) drawn over each frame.
pub struct Caption {
    overlay: TextOverlay,
    pub title: Option<String>,
    pub brand: Option<String>,
}

impl Caption {
    pub fn new(overlay: TextOverlay, title: Option<String>, brand: Option<String>) -> Self {
        Self { overlay, title, brand }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.brand.is_none()
    }

    pub fn draw(&self, pixels: &mut [[u8; 4]], width: u32, height: u32) {
        let scale = width.min(height) as f32 / REFERENCE_SIZE;
        let margin = (MARGIN * scale).round() as i32;

        if let Some(ref title) = self.title {
            let size = (TITLE_SIZE * scale).max(8.0);
            self.overlay
                .composite(pixels, width, height, title, size, margin, margin, Color::WHITE);
        }

        if let Some(ref brand) = self.brand {
            let size = (BRAND_SIZE * scale).max(8.0);
            let tw = self.overlay.measure_width(brand, size) as i32;
            let x = width as i32 - margin - tw;
            let y = height as i32 - margin - size.ceil() as i32;
            self.overlay
                .composite(pixels, width, height, brand, size, x, y, Color::rgb(0x88, 0x88, 0x88));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_font_file_is_an_error() {
        assert!(TextOverlay::from_file(Path::new("/nonexistent/font.ttf")).is_err());
        assert!(TextOverlay::discover(Some(Path::new("/nonexistent/font.ttf"))).is_none());
    }

    #[test]
    fn invalid_font_bytes_are_rejected() {
        assert!(TextOverlay::from_bytes(b"not a font").is_err());
    }

    #[test]
    fn captions_draw_when_a_system_font_exists() {
        let Some(overlay) = TextOverlay::discover(None) else {
            return;
        };
        let caption = Caption::new(overlay, Some("track".into()), Some("made by ovio".into()));
        let mut pixels = vec![[0u8, 0, 0, 255]; 300 * 300];
        caption.draw(&mut pixels, 300, 300);
        assert!(pixels.iter().any(|p| p[0] > 0));
    }
}
