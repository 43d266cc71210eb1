/// Hardware limits - the render buffer is sized for these regardless of
/// the active configuration, so CONFIG can grow the layout without
/// reallocating.
pub const MAX_STRIPS: usize = 8;
pub const MAX_LEDS_PER_STRIP: usize = 500;
pub const MAX_TOTAL_LEDS: usize = MAX_STRIPS * MAX_LEDS_PER_STRIP;

pub const DEFAULT_STRIPS: u8 = 8;
pub const DEFAULT_LEDS_PER_STRIP: u16 = 140;

/// Active strip layout: how many strips are driven and how many LEDs
/// each one has. Only CONFIG mutates this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    strips: u8,
    leds_per_strip: u16,
}

impl Default for Layout {
    fn default() -> Self {
        Layout {
            strips: DEFAULT_STRIPS,
            leds_per_strip: DEFAULT_LEDS_PER_STRIP,
        }
    }
}

impl Layout {
    /// Build a layout, validating against the hardware limits.
    pub fn new(strips: u8, leds_per_strip: u16) -> Option<Self> {
        if strips == 0 || strips as usize > MAX_STRIPS {
            return None;
        }
        if leds_per_strip == 0 || leds_per_strip as usize > MAX_LEDS_PER_STRIP {
            return None;
        }
        Some(Layout {
            strips,
            leds_per_strip,
        })
    }

    pub fn strips(&self) -> u8 {
        self.strips
    }

    pub fn leds_per_strip(&self) -> u16 {
        self.leds_per_strip
    }

    /// Number of logically addressable LEDs under this layout.
    pub fn total_leds(&self) -> usize {
        self.strips as usize * self.leds_per_strip as usize
    }

    /// Replace this layout. Returns true if the layout actually changed
    /// (a repeated CONFIG with the same values is a no-op and must not
    /// trigger a buffer clear).
    pub fn apply(&mut self, new: Layout) -> bool {
        let changed = *self != new;
        *self = new;
        changed
    }

    /// Map a logical pixel index to its physical buffer offset.
    ///
    /// Physical addressing is strip-major with a fixed row pitch of
    /// MAX_LEDS_PER_STRIP. Indices at or past the end of the active
    /// region clamp to the last slot of the last active strip: the host
    /// is trusted, and rendering something sane beats dropping a frame.
    pub fn physical_index(&self, logical: usize) -> usize {
        let mut strip = logical / self.leds_per_strip as usize;
        let mut offset = logical % self.leds_per_strip as usize;
        if strip >= self.strips as usize {
            strip = self.strips as usize - 1;
            offset = self.leds_per_strip as usize - 1;
        }
        strip * MAX_LEDS_PER_STRIP + offset
    }

    /// Physical offset of the first LED of a strip.
    pub fn strip_base(&self, strip: usize) -> usize {
        strip * MAX_LEDS_PER_STRIP
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_within_active_region() {
        let layout = Layout::new(8, 140).unwrap();
        for logical in 0..layout.total_leds() {
            let phys = layout.physical_index(logical);
            let strip = phys / MAX_LEDS_PER_STRIP;
            let offset = phys % MAX_LEDS_PER_STRIP;
            assert!(strip < 8);
            assert!(offset < 140);
        }
    }

    #[test]
    fn test_mapping_is_injective() {
        let layout = Layout::new(3, 50).unwrap();
        let mut seen = std::collections::HashSet::new();
        for logical in 0..layout.total_leds() {
            assert!(seen.insert(layout.physical_index(logical)));
        }
    }

    #[test]
    fn test_mapping_strip_major() {
        let layout = Layout::new(8, 140).unwrap();
        assert_eq!(layout.physical_index(0), 0);
        assert_eq!(layout.physical_index(139), 139);
        // First LED of strip 1 lands at the fixed row pitch, not at 140
        assert_eq!(layout.physical_index(140), MAX_LEDS_PER_STRIP);
        assert_eq!(layout.physical_index(280), 2 * MAX_LEDS_PER_STRIP);
    }

    #[test]
    fn test_out_of_range_clamps_to_last_slot() {
        let layout = Layout::new(8, 140).unwrap();
        let last = 7 * MAX_LEDS_PER_STRIP + 139;
        assert_eq!(layout.physical_index(layout.total_leds()), last);
        assert_eq!(layout.physical_index(layout.total_leds() + 1), last);
        assert_eq!(layout.physical_index(usize::MAX / 2), last);
    }

    #[test]
    fn test_clamp_minimal_layout() {
        let layout = Layout::new(1, 1).unwrap();
        assert_eq!(layout.physical_index(0), 0);
        assert_eq!(layout.physical_index(1), 0);
        assert_eq!(layout.physical_index(9999), 0);
    }

    #[test]
    fn test_maximal_layout() {
        let layout = Layout::new(MAX_STRIPS as u8, MAX_LEDS_PER_STRIP as u16).unwrap();
        assert_eq!(layout.total_leds(), MAX_TOTAL_LEDS);
        assert_eq!(layout.physical_index(MAX_TOTAL_LEDS - 1), MAX_TOTAL_LEDS - 1);
        assert_eq!(layout.physical_index(MAX_TOTAL_LEDS), MAX_TOTAL_LEDS - 1);
    }

    #[test]
    fn test_validation() {
        assert!(Layout::new(0, 10).is_none());
        assert!(Layout::new(9, 10).is_none());
        assert!(Layout::new(1, 0).is_none());
        assert!(Layout::new(1, 501).is_none());
        assert!(Layout::new(1, 500).is_some());
        assert!(Layout::new(8, 1).is_some());
    }

    #[test]
    fn test_apply_reports_change() {
        let mut layout = Layout::default();
        assert!(!layout.apply(Layout::new(8, 140).unwrap()));
        assert!(layout.apply(Layout::new(1, 10).unwrap()));
        assert!(!layout.apply(Layout::new(1, 10).unwrap()));
        assert_eq!(layout.total_leds(), 10);
    }
}
