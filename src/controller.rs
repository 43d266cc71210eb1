use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::frame::FrameBuffer;
use crate::layout::{Layout, MAX_LEDS_PER_STRIP, MAX_STRIPS};
use crate::output::StripSink;
use crate::protocol::{
    encode_stats_snapshot, Response, CMD_CLEAR, CMD_CONFIG, CMD_ECHO, CMD_PING, CMD_SET_ALL,
    CMD_SET_BRIGHTNESS, CMD_SET_PIXEL, CMD_SET_RANGE, CMD_SHOW, CMD_STATS,
};
use crate::stats::Stats;
use crate::transport::{CommandBuffer, Transport, TransportEvent};

const DEFAULT_BRIGHTNESS: u8 = 50;

/// How many rendered frames get an explicit FRAME_OK ack. Past that the
/// host streams blind; acking every frame at 60 FPS would flood the
/// return channel.
const FRAME_ACK_LIMIT: u64 = 3;

/// The protocol/render engine. Owns the layout, the render buffer, the
/// statistics and the hardware sink; everything is touched from a
/// single loop, so there are no locks anywhere.
pub struct Controller<S: StripSink> {
    layout: Layout,
    frame: FrameBuffer,
    stats: Stats,
    brightness: u8,
    status_led: bool,
    debug: bool,
    debug_logging: bool,
    sink: S,
}

impl<S: StripSink> Controller<S> {
    pub fn new(layout: Layout, sink: S, debug: bool) -> Self {
        Controller {
            layout,
            frame: FrameBuffer::new(),
            stats: Stats::new(),
            brightness: DEFAULT_BRIGHTNESS,
            status_led: false,
            debug,
            debug_logging: false,
            sink,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn frame(&self) -> &FrameBuffer {
        &self.frame
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Superloop: poll the transport, dispatch, answer, tick the stats
    /// reporter. Exits when the running flag goes false.
    pub fn run(&mut self, transport: &mut dyn Transport, running: &AtomicBool) -> Result<()> {
        let mut events = Vec::new();

        while running.load(Ordering::Relaxed) {
            events.clear();
            let now = Instant::now();
            let layout = self.layout;
            transport.poll(now, &layout, &mut events)?;

            let idle = events.is_empty();
            for event in events.drain(..) {
                match event {
                    TransportEvent::Framing(err) => {
                        self.stats.packet_errors += 1;
                        if self.debug_logging {
                            eprintln!("⚠ framing: {}", err);
                        }
                    }
                    TransportEvent::Command(cmd) => {
                        if let Some(response) = self.dispatch(&cmd) {
                            if let Err(e) = transport.send_response(&response) {
                                eprintln!("✗ response write failed: {}", e);
                            }
                        }
                    }
                }
            }

            if let Some(report) = self.stats.tick(Instant::now()) {
                if self.debug || self.debug_logging {
                    println!(
                        "[Stats] pkts={} frames={} fps={:.1} | {:.1} kbit/s | errors={} | show={}µs | {}x{} LEDs",
                        report.packets_received,
                        report.frames_rendered,
                        report.fps,
                        report.throughput_kbps,
                        report.packet_errors,
                        report.last_show.as_micros(),
                        self.layout.strips(),
                        self.layout.leds_per_strip(),
                    );
                }
            }

            if idle {
                // Nothing arrived; don't spin the core
                thread::sleep(Duration::from_millis(1));
            }
        }
        Ok(())
    }

    /// Blank the strips on the way out.
    pub fn shutdown(&mut self) {
        if self.debug {
            println!("Turning off LEDs...");
        }
        self.frame.clear_all();
        if let Err(e) = self.sink.blank() {
            eprintln!("✗ Failed to blank outputs: {}", e);
        }
    }

    /// Dispatch one validated command. Returns the response to send, if
    /// the command produces one.
    pub fn dispatch(&mut self, cmd: &CommandBuffer) -> Option<Response> {
        self.stats.packets_received += 1;
        self.stats.bytes_received += cmd.wire_len() as u64;

        if self.debug_logging {
            println!(
                "📥 pkt #{}: cmd=0x{:02X} len={}",
                self.stats.packets_received,
                cmd.opcode,
                cmd.wire_len()
            );
        }

        let payload = &cmd.payload;
        match cmd.opcode {
            CMD_PING => {
                self.status_led = !self.status_led;
                self.sink.status_led(self.status_led);
                Some(Response::ok("PONG"))
            }

            CMD_ECHO => Some(Response::echo(payload)),

            CMD_SET_PIXEL => {
                if payload.len() < 5 {
                    return None;
                }
                let logical = u16::from_be_bytes([payload[0], payload[1]]) as usize;
                let rgb = [payload[2], payload[3], payload[4]];
                // Out-of-range indices clamp to the last active slot
                self.frame.set(self.layout.physical_index(logical), rgb);
                None
            }

            CMD_SET_BRIGHTNESS => {
                if payload.is_empty() {
                    return None;
                }
                self.brightness = payload[0];
                if self.debug_logging {
                    println!("📥 brightness → {}", self.brightness);
                }
                None
            }

            CMD_SHOW => {
                self.show();
                None
            }

            CMD_CLEAR => {
                self.frame.clear_active(&self.layout);
                self.show();
                None
            }

            CMD_SET_RANGE => self.set_range(payload),

            CMD_SET_ALL => self.set_all(payload),

            CMD_CONFIG => self.configure(payload),

            CMD_STATS => Some(Response::status(encode_stats_snapshot(&self.stats))),

            opcode => {
                if self.debug_logging {
                    println!("⚠ unknown command 0x{:02X}", opcode);
                }
                self.stats.packet_errors += 1;
                None
            }
        }
    }

    fn set_range(&mut self, payload: &[u8]) -> Option<Response> {
        if payload.len() < 3 {
            return None;
        }
        let start = u16::from_be_bytes([payload[0], payload[1]]) as usize;
        let total = self.layout.total_leds();
        if start >= total {
            return None;
        }

        let mut count = payload[2] as usize;
        if payload.len() < 3 + count * 3 {
            return None;
        }
        // Truncate rather than reject a range that runs past the end
        if start + count > total {
            count = total - start;
        }

        for i in 0..count {
            let base = 3 + i * 3;
            let rgb = [payload[base], payload[base + 1], payload[base + 2]];
            self.frame.set(self.layout.physical_index(start + i), rgb);
        }
        None
    }

    fn set_all(&mut self, payload: &[u8]) -> Option<Response> {
        self.stats.set_all_commands += 1;
        let expected = self.layout.total_leds() * 3;
        if payload.len() != expected {
            if self.debug_logging {
                println!(
                    "⚠ SET_ALL expected {} bytes, got {} ({}x{})",
                    expected,
                    payload.len(),
                    self.layout.strips(),
                    self.layout.leds_per_strip()
                );
            }
            self.stats.packet_errors += 1;
            return Some(Response::error("SIZE_MISMATCH"));
        }

        for logical in 0..self.layout.total_leds() {
            let base = logical * 3;
            let rgb = [payload[base], payload[base + 1], payload[base + 2]];
            self.frame.set(self.layout.physical_index(logical), rgb);
        }
        // Slots past the active length must never show stale data
        self.frame.black_inactive_tails(&self.layout);

        self.show();
        self.stats.frames_rendered += 1;

        if self.stats.frames_rendered <= FRAME_ACK_LIMIT {
            Some(Response::ok("FRAME_OK"))
        } else {
            None
        }
    }

    fn configure(&mut self, payload: &[u8]) -> Option<Response> {
        self.stats.config_commands += 1;
        if payload.len() < 3 {
            return Some(Response::error("CONFIG_TOO_SHORT"));
        }
        let strips = payload[0];
        let leds_per_strip = u16::from_be_bytes([payload[1], payload[2]]);

        if strips == 0 || strips as usize > MAX_STRIPS {
            return Some(Response::error("INVALID_STRIPS"));
        }
        if leds_per_strip == 0 || leds_per_strip as usize > MAX_LEDS_PER_STRIP {
            return Some(Response::error("INVALID_LENGTH"));
        }
        let new_layout = Layout::new(strips, leds_per_strip)?;

        if payload.len() >= 4 {
            self.debug_logging = payload[3] != 0;
        }

        let changed = self.layout.apply(new_layout);
        if changed {
            // Layout changed: nothing in the old buffer is trustworthy
            self.frame.clear_all();
            self.show();
            if self.debug {
                println!(
                    "📐 Config changed: strips={}, length={}, total={}",
                    strips,
                    leds_per_strip,
                    self.layout.total_leds()
                );
            }
            Some(Response::ok("CONFIG_CHANGED"))
        } else {
            Some(Response::ok("CONFIG_OK"))
        }
    }

    fn show(&mut self) {
        let start = Instant::now();
        if let Err(e) = self.sink.show(&self.frame, &self.layout, self.brightness) {
            eprintln!("✗ show failed: {}", e);
        }
        self.stats.record_show(start.elapsed());
    }
}
