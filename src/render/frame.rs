use super::style::{BarLayout, Color, Fill, RenderStyle};
use super::target::RenderTarget;
use crate::audio::analysis::FrameDescriptor;
use crate::error::RenderTargetError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderMode {
    /// Smooths against the previously shown frame
    Live,
    /// Every frame depends only on its own descriptor
    Export,
}

/// Draws frame descriptors as vertically centered bars.
pub struct FrameRenderer {
    mode: RenderMode,
    shown: Vec<f32>,
}

impl FrameRenderer {
    pub fn new(mode: RenderMode) -> Self {
        Self {
            mode,
            shown: Vec::new(),
        }
    }

    pub fn live() -> Self {
        Self::new(RenderMode::Live)
    }

    pub fn export() -> Self {
        Self::new(RenderMode::Export)
    }

    /// Forget smoothing history, e.g. after a seek.
    pub fn reset(&mut self) {
        self.shown.clear();
    }

    /// Magnitudes drawn by the most recent `render` call.
    pub fn shown(&self) -> &[f32] {
        &self.shown
    }

    /// Overwrite `target` with one frame. `progress` (0.0-1.0) splits bars
    /// into played/unplayed when the style has a progress fill.
    pub fn render(
        &mut self,
        descriptor: &FrameDescriptor,
        style: &RenderStyle,
        progress: Option<f64>,
        target: &mut dyn RenderTarget,
    ) -> Result<(), RenderTargetError> {
        let smoothing = style.smoothing.clamp(0.0, 1.0);
        let current = &descriptor.magnitudes;

        if self.mode == RenderMode::Live && self.shown.len() == current.len() && smoothing > 0.0 {
            for (shown, &m) in self.shown.iter_mut().zip(current) {
                *shown = smoothing * *shown + (1.0 - smoothing) * m;
            }
        } else {
            self.shown.clear();
            self.shown.extend_from_slice(current);
        }

        draw_bars(&self.shown, style, progress, target)
    }
}

/// Stateless drawing step shared by both modes.
pub fn draw_bars(
    magnitudes: &[f32],
    style: &RenderStyle,
    progress: Option<f64>,
    target: &mut dyn RenderTarget,
) -> Result<(), RenderTargetError> {
    let width = target.width();
    let height = target.height();
    let pixels = target.pixels_mut()?;
    let w = width as usize;

    fill_background(pixels, w, height, &style.background);

    if magnitudes.is_empty() || w == 0 || height == 0 {
        return Ok(());
    }

    // More bins than columns: merge neighbours so every bin stays visible
    let spacing = style.bar_spacing.max(0.0);
    let min_w = style.bar_width.max(1.0);
    let capacity = (((width as f32 + spacing) / (min_w + spacing)).floor() as usize).max(1);
    let pooled;
    let magnitudes = if magnitudes.len() > capacity {
        pooled = max_pool(magnitudes, capacity);
        pooled.as_slice()
    } else {
        magnitudes
    };

    let n = magnitudes.len();
    let (bar_w, start_x) = match style.layout {
        BarLayout::Stretch => {
            let available = width as f32 - (n as f32 - 1.0) * spacing;
            (min_w.max(available / n as f32), 0.0)
        }
        BarLayout::Centered => {
            let total = n as f32 * min_w + (n as f32 - 1.0) * spacing;
            (min_w, ((width as f32 - total) / 2.0).max(0.0).floor())
        }
    };
    let center_y = height as f32 / 2.0;
    let max_height = height as f32 * style.max_bar_height.clamp(0.0, 1.0);
    let played_until = progress
        .filter(|_| style.progress.is_some())
        .map(|p| p.clamp(0.0, 1.0) * n as f64);

    for (i, &m) in magnitudes.iter().enumerate() {
        let m = if m.is_finite() { m.clamp(0.0, 1.0) } else { 0.0 };
        if m <= 0.0 && !style.draw_silent {
            continue;
        }

        let bar_h = (m * max_height).max(style.min_bar_height).min(height as f32);
        let x = start_x + i as f32 * (bar_w + spacing);
        let x0 = (x.floor() as i64).clamp(0, w as i64) as usize;
        let x1 = ((x + bar_w).ceil() as i64).clamp(0, w as i64) as usize;
        let y0 = ((center_y - bar_h / 2.0).round() as i64).clamp(0, height as i64) as usize;
        let y1 = (y0 + (bar_h.round() as usize).max(1)).min(height as usize);
        if x0 >= x1 || y0 >= y1 {
            continue;
        }

        let fill = match (played_until, &style.progress) {
            (Some(limit), Some(played)) if (i as f64) < limit => played,
            _ => &style.bar,
        };

        let rect = Rect {
            x0: x0 as f32,
            x1: x1 as f32,
            y0: y0 as f32,
            y1: y1 as f32,
        };
        let radius = style
            .corner_radius
            .max(0.0)
            .min((x1 - x0) as f32 / 2.0)
            .min((y1 - y0) as f32 / 2.0);

        let bar_rows = (y1 - y0) as f32;
        for y in y0..y1 {
            let color = fill.color_at((y - y0) as f32 / (bar_rows - 1.0).max(1.0));
            let row = &mut pixels[y * w..(y + 1) * w];
            for (x, px) in row.iter_mut().enumerate().take(x1).skip(x0) {
                if radius > 0.0 && !rect.contains_rounded(x as f32 + 0.5, y as f32 + 0.5, radius) {
                    continue;
                }
                *px = blend(*px, color);
            }
        }
    }

    Ok(())
}

/// Reduce `values` to `groups` buckets, keeping each bucket's loudest bin.
fn max_pool(values: &[f32], groups: usize) -> Vec<f32> {
    let n = values.len();
    (0..groups)
        .map(|g| {
            let start = g * n / groups;
            let end = ((g + 1) * n / groups).max(start + 1).min(n);
            values[start..end]
                .iter()
                .copied()
                .filter(|v| v.is_finite())
                .fold(0.0f32, f32::max)
        })
        .collect()
}

struct Rect {
    x0: f32,
    x1: f32,
    y0: f32,
    y1: f32,
}

impl Rect {
    fn contains_rounded(&self, cx: f32, cy: f32, r: f32) -> bool {
        let dx = (self.x0 + r - cx).max(cx - (self.x1 - r)).max(0.0);
        let dy = (self.y0 + r - cy).max(cy - (self.y1 - r)).max(0.0);
        dx * dx + dy * dy <= r * r
    }
}

fn fill_background(pixels: &mut [[u8; 4]], width: usize, height: u32, fill: &Fill) {
    if width == 0 {
        return;
    }
    let denom = (height.max(2) - 1) as f32;
    for (y, row) in pixels.chunks_mut(width).enumerate() {
        let mut rgba = fill.color_at(y as f32 / denom).to_rgba();
        rgba[3] = 255;
        row.fill(rgba);
    }
}

fn blend(dst: [u8; 4], src: Color) -> [u8; 4] {
    if src.a == 255 {
        return src.to_rgba();
    }
    let a = src.a as f32 / 255.0;
    let mix = |s: u8, d: u8| (s as f32 * a + d as f32 * (1.0 - a)).round() as u8;
    [mix(src.r, dst[0]), mix(src.g, dst[1]), mix(src.b, dst[2]), 255]
}
