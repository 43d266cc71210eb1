use crate::layout::{Layout, MAX_LEDS_PER_STRIP, MAX_TOTAL_LEDS};

pub type Rgb = [u8; 3];

pub const BLACK: Rgb = [0, 0, 0];

/// Fixed-capacity render buffer, sized to the maximum supported layout.
/// Only the active region (per the current Layout) is ever driven to
/// hardware; slots outside it are forced black so a shrink can never
/// leak stale pixels onto a strip.
pub struct FrameBuffer {
    pixels: Vec<Rgb>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        FrameBuffer {
            pixels: vec![BLACK; MAX_TOTAL_LEDS],
        }
    }

    pub fn set(&mut self, physical: usize, rgb: Rgb) {
        if physical < self.pixels.len() {
            self.pixels[physical] = rgb;
        }
    }

    pub fn get(&self, physical: usize) -> Rgb {
        self.pixels.get(physical).copied().unwrap_or(BLACK)
    }

    /// One full physical row (MAX_LEDS_PER_STRIP slots) for a strip.
    pub fn strip_row(&self, strip: usize) -> &[Rgb] {
        let base = strip * MAX_LEDS_PER_STRIP;
        &self.pixels[base..base + MAX_LEDS_PER_STRIP]
    }

    /// Black every physical slot, active or not. Used on CONFIG change.
    pub fn clear_all(&mut self) {
        self.pixels.fill(BLACK);
    }

    /// Black the full physical rows of the active strips (CMD_CLEAR).
    /// Clearing the whole row, not just the active prefix, also wipes
    /// any tail left over from a previously longer layout.
    pub fn clear_active(&mut self, layout: &Layout) {
        for strip in 0..layout.strips() as usize {
            let base = layout.strip_base(strip);
            self.pixels[base..base + MAX_LEDS_PER_STRIP].fill(BLACK);
        }
    }

    /// Black the unused tail of each active strip's row. Run after
    /// every SET_ALL so a strip never shows pixels past its configured
    /// length.
    pub fn black_inactive_tails(&mut self, layout: &Layout) {
        let len = layout.leds_per_strip() as usize;
        for strip in 0..layout.strips() as usize {
            let base = layout.strip_base(strip);
            self.pixels[base + len..base + MAX_LEDS_PER_STRIP].fill(BLACK);
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
