use serde::Deserialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Parse `#rrggbb` or `#rrggbbaa`.
    pub fn parse(s: &str) -> Option<Self> {
        let hex = s.trim().strip_prefix('#')?;
        if !hex.is_ascii() {
            return None;
        }
        let byte = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        match hex.len() {
            6 => Some(Self::rgb(byte(0)?, byte(2)?, byte(4)?)),
            8 => Some(Self {
                r: byte(0)?,
                g: byte(2)?,
                b: byte(4)?,
                a: byte(6)?,
            }),
            _ => None,
        }
    }

    pub fn to_rgba(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    fn lerp(self, other: Color, t: f32) -> Color {
        let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
        Color {
            r: mix(self.r, other.r),
            g: mix(self.g, other.g),
            b: mix(self.b, other.b),
            a: mix(self.a, other.a),
        }
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Color::parse(&s).ok_or_else(|| format!("invalid color {:?}, expected #rrggbb or #rrggbbaa", s))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct GradientStop {
    pub offset: f32,
    pub color: Color,
}

/// Solid color, or a vertical gradient over the filled area.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Fill {
    Solid(Color),
    Gradient(Vec<GradientStop>),
}

impl Fill {
    /// Color at `t` (0.0 = top, 1.0 = bottom).
    pub fn color_at(&self, t: f32) -> Color {
        match self {
            Fill::Solid(c) => *c,
            Fill::Gradient(stops) => gradient_at(stops, t),
        }
    }
}

fn gradient_at(stops: &[GradientStop], t: f32) -> Color {
    let Some(first) = stops.first() else {
        return Color::BLACK;
    };
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    if t <= first.offset {
        return first.color;
    }
    for pair in stops.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if t <= b.offset {
            let span = b.offset - a.offset;
            let local = if span > 0.0 { (t - a.offset) / span } else { 1.0 };
            return a.color.lerp(b.color, local);
        }
    }
    stops[stops.len() - 1].color
}

/// Horizontal arrangement of the bars.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarLayout {
    /// Bars widen to fill the canvas, starting at the left edge
    #[default]
    Stretch,
    /// Bars keep `bar_width` and the group is centered
    Centered,
}

/// Immutable drawing parameters for the bar display.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderStyle {
    pub background: Fill,
    pub bar: Fill,
    /// Fill for bars left of the playback position; `None` disables the split
    pub progress: Option<Fill>,
    pub layout: BarLayout,
    /// Bar width in pixels; a minimum for `BarLayout::Stretch`
    pub bar_width: f32,
    pub bar_spacing: f32,
    /// Tallest bar as a fraction of canvas height
    pub max_bar_height: f32,
    /// Non-silent bars are at least this tall, in pixels
    pub min_bar_height: f32,
    /// Draw silent bins at `min_bar_height` instead of skipping them
    pub draw_silent: bool,
    pub corner_radius: f32,
    /// EMA factor against the previous frame in live mode, 0.0-1.0
    pub smoothing: f32,
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self::ovio()
    }
}

impl RenderStyle {
    pub const PRESETS: [&'static str; 3] = ["ovio", "classic", "spotify"];

    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "ovio" => Some(Self::ovio()),
            "classic" => Some(Self::classic()),
            "spotify" => Some(Self::spotify()),
            _ => None,
        }
    }

    /// Full-width green gradient bars on black.
    pub fn ovio() -> Self {
        let bright = Color::rgb(0x00, 0xff, 0x87);
        Self {
            background: Fill::Solid(Color::BLACK),
            bar: Fill::Gradient(vec![
                GradientStop { offset: 0.0, color: bright },
                GradientStop { offset: 0.3, color: Color::rgb(0x1d, 0xb9, 0x54) },
                GradientStop { offset: 0.7, color: Color::rgb(0x1e, 0xd7, 0x60) },
                GradientStop { offset: 1.0, color: bright },
            ]),
            progress: None,
            layout: BarLayout::Stretch,
            bar_width: 0.0,
            bar_spacing: 0.0,
            max_bar_height: 0.5,
            min_bar_height: 2.0,
            draw_silent: false,
            corner_radius: 0.0,
            smoothing: 0.8,
        }
    }

    /// Rounded bars with a played/unplayed split.
    pub fn classic() -> Self {
        Self {
            background: Fill::Solid(Color::rgb(0x11, 0x11, 0x11)),
            bar: Fill::Solid(Color::rgb(0x9c, 0xa3, 0xaf)),
            progress: Some(Fill::Solid(Color::rgb(0x1d, 0xb9, 0x54))),
            layout: BarLayout::Stretch,
            bar_width: 2.0,
            bar_spacing: 1.0,
            max_bar_height: 0.8,
            min_bar_height: 1.0,
            draw_silent: false,
            corner_radius: 2.0,
            smoothing: 0.6,
        }
    }

    /// Purple-to-black backdrop, thin centered bars: green played, grey
    /// unplayed, never shorter than 2 px.
    pub fn spotify() -> Self {
        Self {
            background: Fill::Gradient(vec![
                GradientStop { offset: 0.0, color: Color::rgb(0x2d, 0x1b, 0x69) },
                GradientStop { offset: 1.0, color: Color::rgb(0x12, 0x12, 0x12) },
            ]),
            bar: Fill::Solid(Color::rgb(0x53, 0x53, 0x53)),
            progress: Some(Fill::Solid(Color::rgb(0x1d, 0xb9, 0x54))),
            layout: BarLayout::Centered,
            bar_width: 3.0,
            bar_spacing: 1.0,
            max_bar_height: 0.6,
            min_bar_height: 2.0,
            draw_silent: true,
            corner_radius: 1.5,
            smoothing: 0.6,
        }
    }
}
