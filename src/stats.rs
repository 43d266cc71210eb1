use std::time::{Duration, Instant};

/// How often the windowed report is recomputed.
pub const REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// One windowed report: rates over the last reporting interval, not
/// lifetime averages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsReport {
    pub fps: f64,
    pub throughput_kbps: f64,
    pub packets_received: u64,
    pub frames_rendered: u64,
    pub packet_errors: u64,
    pub last_show: Duration,
}

/// Monotonic transport/render counters plus the sampling state for the
/// periodic windowed report. Counters only reset at boot.
pub struct Stats {
    pub packets_received: u64,
    pub frames_rendered: u64,
    pub packet_errors: u64,
    pub config_commands: u64,
    pub set_all_commands: u64,
    pub bytes_received: u64,
    last_show: Duration,
    last_report_at: Option<Instant>,
    frames_at_last_report: u64,
    bytes_at_last_report: u64,
}

impl Stats {
    pub fn new() -> Self {
        Stats {
            packets_received: 0,
            frames_rendered: 0,
            packet_errors: 0,
            config_commands: 0,
            set_all_commands: 0,
            bytes_received: 0,
            last_show: Duration::ZERO,
            last_report_at: None,
            frames_at_last_report: 0,
            bytes_at_last_report: 0,
        }
    }

    pub fn record_show(&mut self, duration: Duration) {
        self.last_show = duration;
    }

    pub fn last_show_micros(&self) -> u128 {
        self.last_show.as_micros()
    }

    /// Non-blocking periodic check. Returns a report when a full
    /// interval has elapsed since the last one, otherwise None. Safe to
    /// call every loop iteration; it never sleeps.
    pub fn tick(&mut self, now: Instant) -> Option<StatsReport> {
        let last = match self.last_report_at {
            Some(last) => last,
            None => {
                // First tick just anchors the window
                self.last_report_at = Some(now);
                self.frames_at_last_report = self.frames_rendered;
                self.bytes_at_last_report = self.bytes_received;
                return None;
            }
        };

        let elapsed = now.duration_since(last);
        if elapsed < REPORT_INTERVAL {
            return None;
        }

        let secs = elapsed.as_secs_f64();
        let frames_delta = self.frames_rendered - self.frames_at_last_report;
        let bytes_delta = self.bytes_received - self.bytes_at_last_report;

        self.last_report_at = Some(now);
        self.frames_at_last_report = self.frames_rendered;
        self.bytes_at_last_report = self.bytes_received;

        Some(StatsReport {
            fps: frames_delta as f64 / secs,
            throughput_kbps: (bytes_delta as f64 * 8.0) / (secs * 1000.0),
            packets_received: self.packets_received,
            frames_rendered: self.frames_rendered,
            packet_errors: self.packet_errors,
            last_show: self.last_show,
        })
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_tick_anchors_window() {
        let mut stats = Stats::new();
        let t0 = Instant::now();
        assert!(stats.tick(t0).is_none());
        // Still inside the window
        assert!(stats.tick(t0 + Duration::from_secs(4)).is_none());
    }

    #[test]
    fn test_windowed_rates() {
        let mut stats = Stats::new();
        let t0 = Instant::now();
        stats.tick(t0);

        stats.frames_rendered = 300;
        stats.bytes_received = 5_000_000;
        let report = stats.tick(t0 + Duration::from_secs(5)).unwrap();
        assert!((report.fps - 60.0).abs() < 0.01);
        assert!((report.throughput_kbps - 8000.0).abs() < 0.01);

        // Second window sees only the delta, not the lifetime totals
        stats.frames_rendered = 350;
        stats.bytes_received = 5_000_000;
        let report = stats.tick(t0 + Duration::from_secs(10)).unwrap();
        assert!((report.fps - 10.0).abs() < 0.01);
        assert_eq!(report.throughput_kbps, 0.0);
        assert_eq!(report.frames_rendered, 350);
    }

    #[test]
    fn test_counters_survive_reports() {
        let mut stats = Stats::new();
        let t0 = Instant::now();
        stats.tick(t0);
        stats.packets_received = 9;
        stats.packet_errors = 2;
        let report = stats.tick(t0 + Duration::from_secs(6)).unwrap();
        assert_eq!(report.packets_received, 9);
        assert_eq!(report.packet_errors, 2);
        assert_eq!(stats.packets_received, 9);
    }
}
