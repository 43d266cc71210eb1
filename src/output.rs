use std::io::Write;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use serialport::SerialPort;

use crate::config::OutputConfig;
use crate::frame::{FrameBuffer, Rgb, BLACK};
use crate::layout::Layout;
use crate::pixel_format::ColorOrder;

/// Hardware sink for rendered frames. `show` drives the active region
/// of the buffer to the strips; it runs synchronously on the engine
/// loop so the caller can measure its duration.
pub trait StripSink {
    fn show(&mut self, frame: &FrameBuffer, layout: &Layout, brightness: u8) -> Result<()>;

    /// Blank every configured strip (shutdown path).
    fn blank(&mut self) -> Result<()>;

    /// Status indicator, if the sink has one. Default no-op.
    fn status_led(&mut self, _on: bool) {}
}

/// Scale one channel by the global brightness (0-255, 255 = full).
pub fn scale_channel(value: u8, brightness: u8) -> u8 {
    ((value as u16 * brightness as u16) / 255) as u8
}

/// Build an Adalight frame for one strip:
/// `'Ada' + count_hi + count_lo + (hi ^ lo ^ 0x55) + pixel bytes`.
pub fn build_adalight_frame(pixels: &[Rgb], brightness: u8, order: ColorOrder) -> Vec<u8> {
    let led_count = pixels.len();
    let count_hi = (led_count >> 8) as u8;
    let count_lo = led_count as u8;
    let checksum = count_hi ^ count_lo ^ 0x55;

    let mut out = Vec::with_capacity(6 + led_count * 3);
    out.extend_from_slice(&[0x41, 0x64, 0x61]); // 'Ada'
    out.push(count_hi);
    out.push(count_lo);
    out.push(checksum);
    for &rgb in pixels {
        let scaled = rgb.map(|c| scale_channel(c, brightness));
        out.extend_from_slice(&order.apply(scaled));
    }
    out
}

struct StripOutput {
    port_name: String,
    strip: usize,
    color_order: ColorOrder,
    port: Box<dyn SerialPort>,
}

/// Drives each configured strip out its own serial port.
pub struct SerialStripOutputs {
    outputs: Vec<StripOutput>,
    ddebug: bool,
}

impl SerialStripOutputs {
    pub fn open(configs: &[OutputConfig], debug: bool, ddebug: bool) -> Result<Self> {
        let mut outputs = Vec::new();
        for config in configs {
            match open_port(&config.port, config.baud_rate, Duration::from_millis(1000)) {
                Ok(port) => {
                    if debug {
                        println!(
                            "✓ Opened {} (strip {}, {} baud, order {:?})",
                            config.port,
                            config.strip,
                            config.baud_rate,
                            ColorOrder::from_name(config.color_order.as_deref())
                        );
                    }
                    outputs.push(StripOutput {
                        port_name: config.port.clone(),
                        strip: config.strip,
                        color_order: ColorOrder::from_name(config.color_order.as_deref()),
                        port,
                    });
                }
                Err(e) => eprintln!("✗ Failed to open {}: {}", config.port, e),
            }
        }

        if outputs.is_empty() {
            anyhow::bail!("No strip outputs could be opened");
        }

        Ok(SerialStripOutputs { outputs, ddebug })
    }
}

impl StripSink for SerialStripOutputs {
    fn show(&mut self, frame: &FrameBuffer, layout: &Layout, brightness: u8) -> Result<()> {
        let len = layout.leds_per_strip() as usize;
        for output in &mut self.outputs {
            if output.strip >= layout.strips() as usize {
                continue;
            }
            let row = &frame.strip_row(output.strip)[..len];
            let data = build_adalight_frame(row, brightness, output.color_order);

            if self.ddebug {
                let hex: String = data
                    .iter()
                    .take(30)
                    .map(|b| format!("{:02x}", b))
                    .collect::<Vec<_>>()
                    .join(" ");
                eprintln!(
                    "[DEBUG {}] frame {} bytes: {}",
                    output.port_name,
                    data.len(),
                    hex
                );
            }

            output
                .port
                .write_all(&data)
                .with_context(|| format!("serial write failed on {}", output.port_name))?;
            output
                .port
                .flush()
                .with_context(|| format!("serial flush failed on {}", output.port_name))?;
        }
        Ok(())
    }

    fn blank(&mut self) -> Result<()> {
        for output in &mut self.outputs {
            // Full physical row of black, so even a stale long layout
            // ends up dark.
            let black = vec![BLACK; crate::layout::MAX_LEDS_PER_STRIP];
            let data = build_adalight_frame(&black, 255, output.color_order);
            let _ = output.port.write_all(&data);
            let _ = output.port.flush();
        }
        Ok(())
    }
}

/// 8N1, no flow control, DTR asserted, short settle delay. The timeout
/// governs both reads and writes: strip outputs get a generous one so a
/// full frame can drain; the inbound command port gets a short one so
/// the engine loop never stalls on an idle line.
pub fn open_port(name: &str, baud_rate: u32, timeout: Duration) -> Result<Box<dyn SerialPort>> {
    let mut port = serialport::new(name, baud_rate)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(timeout)
        .open()
        .with_context(|| format!("Failed to open serial port {}", name))?;

    if let Err(e) = port.write_data_terminal_ready(true) {
        eprintln!("Warning: Failed to set DTR on {}: {}", name, e);
    }

    // Allow the device on the other end to settle
    thread::sleep(Duration::from_millis(100));

    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adalight_header() {
        let pixels = vec![[255, 0, 0]; 140];
        let data = build_adalight_frame(&pixels, 255, ColorOrder::Rgb);
        assert_eq!(&data[0..3], b"Ada");
        assert_eq!(data[3], 0); // count_hi
        assert_eq!(data[4], 140); // count_lo
        assert_eq!(data[5], 0 ^ 140 ^ 0x55);
        assert_eq!(data.len(), 6 + 140 * 3);
        assert_eq!(&data[6..9], &[255, 0, 0]);
    }

    #[test]
    fn test_brightness_scaling() {
        assert_eq!(scale_channel(255, 255), 255);
        assert_eq!(scale_channel(255, 128), 128);
        assert_eq!(scale_channel(255, 0), 0);
        assert_eq!(scale_channel(100, 51), 20);

        let data = build_adalight_frame(&[[200, 100, 50]], 128, ColorOrder::Rgb);
        assert_eq!(&data[6..9], &[100, 50, 25]);
    }

    #[test]
    fn test_color_order_applied_after_scaling() {
        let data = build_adalight_frame(&[[255, 0, 0]], 255, ColorOrder::Grb);
        assert_eq!(&data[6..9], &[0, 255, 0]);
    }
}
