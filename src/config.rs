use serde::{Deserialize, Serialize};

use crate::layout::{DEFAULT_LEDS_PER_STRIP, DEFAULT_STRIPS};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub transport: TransportConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
    pub outputs: Vec<OutputConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// "framed" (start/length/end serial stream) or "slave"
    /// (fixed-size full-duplex transactions over a bus bridge).
    pub mode: String,
    pub port: String,
    pub baud_rate: u32,
    /// Fixed exchange size for slave mode. Defaults to the maximum
    /// command size when absent.
    pub transaction_size: Option<usize>,
}

/// Boot-time layout; CONFIG commands override it at runtime.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LayoutConfig {
    pub strips: u8,
    pub leds_per_strip: u16,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        LayoutConfig {
            strips: DEFAULT_STRIPS,
            leds_per_strip: DEFAULT_LEDS_PER_STRIP,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    pub port: String,
    pub baud_rate: u32,
    /// Which strip of the render buffer this port drives.
    pub strip: usize,
    /// "RGB" (default), "GRB" or "BGR".
    pub color_order: Option<String>,
}
