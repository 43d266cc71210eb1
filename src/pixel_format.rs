use crate::frame::Rgb;

/// Channel order expected by a strip's hardware. The render buffer is
/// always RGB; the order is applied when a frame is built for output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorOrder {
    Rgb,
    Grb,
    Bgr,
}

impl ColorOrder {
    /// Parse a config string; anything unknown falls back to RGB
    /// passthrough.
    pub fn from_name(name: Option<&str>) -> Self {
        match name {
            Some("GRB") => ColorOrder::Grb,
            Some("BGR") => ColorOrder::Bgr,
            _ => ColorOrder::Rgb,
        }
    }

    pub fn apply(&self, [r, g, b]: Rgb) -> Rgb {
        match self {
            ColorOrder::Rgb => [r, g, b],
            ColorOrder::Grb => [g, r, b],
            ColorOrder::Bgr => [b, g, r],
        }
    }
}
