//! Wire protocol constants and response encoding.
//!
//! Framed packets look like:
//! `[0xAA] [LEN_LO] [LEN_HI] [opcode] [payload...] [0x55]`
//! where LEN is a little-endian u16 counting opcode + payload.
//! Multi-byte fields inside command payloads (pixel index, start index,
//! leds-per-strip) are big-endian; only the framing LEN is little-endian.

use crate::layout::MAX_TOTAL_LEDS;
use crate::stats::Stats;

pub const PACKET_START: u8 = 0xAA;
pub const PACKET_END: u8 = 0x55;

/// Largest legal framed payload: opcode + full-buffer RGB data.
pub const MAX_PAYLOAD: usize = 1 + MAX_TOTAL_LEDS * 3;

// Command opcodes
pub const CMD_SET_PIXEL: u8 = 0x01;
pub const CMD_SET_BRIGHTNESS: u8 = 0x02;
pub const CMD_SHOW: u8 = 0x03;
pub const CMD_CLEAR: u8 = 0x04;
pub const CMD_SET_RANGE: u8 = 0x05;
pub const CMD_SET_ALL: u8 = 0x06;
pub const CMD_CONFIG: u8 = 0x07;
pub const CMD_STATS: u8 = 0x08;
pub const CMD_ECHO: u8 = 0xFE;
pub const CMD_PING: u8 = 0xFF;

// Response codes
pub const RESP_OK: u8 = 0x00;
pub const RESP_ERROR: u8 = 0x01;
pub const RESP_STATUS: u8 = 0x02;

/// A response headed back to the host over the transport's return
/// channel, if it has one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: u8,
    pub message: Vec<u8>,
}

impl Response {
    pub fn ok(message: &str) -> Self {
        Response {
            code: RESP_OK,
            message: message.as_bytes().to_vec(),
        }
    }

    pub fn error(message: &str) -> Self {
        Response {
            code: RESP_ERROR,
            message: message.as_bytes().to_vec(),
        }
    }

    pub fn status(payload: Vec<u8>) -> Self {
        Response {
            code: RESP_STATUS,
            message: payload,
        }
    }

    /// Echo reflection: OK code followed by the original payload.
    pub fn echo(payload: &[u8]) -> Self {
        Response {
            code: RESP_OK,
            message: payload.to_vec(),
        }
    }

    /// Encode into the framed envelope.
    pub fn encode(&self) -> Vec<u8> {
        let payload_len = (1 + self.message.len()) as u16;
        let mut out = Vec::with_capacity(5 + self.message.len());
        out.push(PACKET_START);
        out.push((payload_len & 0xFF) as u8);
        out.push((payload_len >> 8) as u8);
        out.push(self.code);
        out.extend_from_slice(&self.message);
        out.push(PACKET_END);
        out
    }
}

/// STATS snapshot: seven little-endian u32s.
/// packets, frames, errors, configs, set_alls, bytes, last_show_us.
pub fn encode_stats_snapshot(stats: &Stats) -> Vec<u8> {
    let fields: [u32; 7] = [
        stats.packets_received as u32,
        stats.frames_rendered as u32,
        stats.packet_errors as u32,
        stats.config_commands as u32,
        stats.set_all_commands as u32,
        stats.bytes_received as u32,
        stats.last_show_micros() as u32,
    ];
    let mut out = Vec::with_capacity(28);
    for field in fields {
        out.extend_from_slice(&field.to_le_bytes());
    }
    out
}
