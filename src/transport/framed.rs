//! Framed byte-stream transport.
//!
//! Packets: `[0xAA][LEN_LO][LEN_HI][opcode][payload...][0x55]`. The
//! decoder is an incremental state machine fed one byte at a time, with
//! an injected clock so the 100 ms body deadline is testable. Recovery
//! from garbage is by byte-skipping: every byte that is not a start
//! marker while scanning costs one counted error and nothing else.

use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::layout::Layout;
use crate::protocol::{Response, MAX_PAYLOAD, PACKET_END, PACKET_START};
use crate::transport::{CommandBuffer, FramingError, Transport, TransportEvent};

/// A partially received packet is abandoned if its body has not fully
/// arrived this long after the header.
pub const BODY_TIMEOUT: Duration = Duration::from_millis(100);

enum State {
    /// Waiting for a start marker.
    Scan,
    /// Start marker seen, collecting the two length bytes.
    Len { lo: Option<u8>, deadline: Instant },
    /// Header complete, collecting `expected` payload bytes plus the
    /// end marker.
    Body {
        expected: usize,
        buf: Vec<u8>,
        deadline: Instant,
    },
}

pub struct FramedDecoder {
    state: State,
}

impl FramedDecoder {
    pub fn new() -> Self {
        FramedDecoder { state: State::Scan }
    }

    /// Abandon a stalled packet. Called once per poll, before feeding
    /// newly arrived bytes, so a late-arriving body never resurrects a
    /// packet that already timed out.
    pub fn poll_timeout(&mut self, now: Instant) -> Option<FramingError> {
        let deadline = match &self.state {
            State::Scan => return None,
            State::Len { deadline, .. } | State::Body { deadline, .. } => *deadline,
        };
        if now < deadline {
            return None;
        }
        self.state = State::Scan;
        Some(FramingError::BodyTimeout)
    }

    /// Feed one byte. At most one event comes out per byte.
    pub fn feed(&mut self, byte: u8, now: Instant) -> Option<Result<CommandBuffer, FramingError>> {
        match &mut self.state {
            State::Scan => {
                if byte == PACKET_START {
                    self.state = State::Len {
                        lo: None,
                        deadline: now + BODY_TIMEOUT,
                    };
                    None
                } else {
                    Some(Err(FramingError::BadStartMarker { byte }))
                }
            }
            State::Len { lo, deadline } => match *lo {
                None => {
                    *lo = Some(byte);
                    None
                }
                Some(lo_byte) => {
                    let len = u16::from_le_bytes([lo_byte, byte]) as usize;
                    let deadline = *deadline;
                    if len == 0 || len > MAX_PAYLOAD {
                        self.state = State::Scan;
                        return Some(Err(FramingError::LengthOutOfBounds { len }));
                    }
                    self.state = State::Body {
                        expected: len,
                        buf: Vec::with_capacity(len),
                        deadline,
                    };
                    None
                }
            },
            State::Body { expected, buf, .. } => {
                if buf.len() < *expected {
                    buf.push(byte);
                    return None;
                }
                // All payload bytes in hand: this byte is the end marker.
                let result = if byte == PACKET_END {
                    let mut payload = std::mem::take(buf);
                    let opcode = payload.remove(0);
                    Ok(CommandBuffer { opcode, payload })
                } else {
                    Err(FramingError::BadEndMarker { byte })
                };
                self.state = State::Scan;
                Some(result)
            }
        }
    }
}

impl Default for FramedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Framed transport over any byte stream (in practice a serial port
/// opened with a short read timeout). Reads are drained non-blocking
/// each poll; responses go back over the same stream.
pub struct FramedTransport<T: Read + Write> {
    io: T,
    decoder: FramedDecoder,
}

impl<T: Read + Write> FramedTransport<T> {
    pub fn new(io: T) -> Self {
        FramedTransport {
            io,
            decoder: FramedDecoder::new(),
        }
    }

    /// Discard whatever is sitting in the inbound stream. Used after an
    /// out-of-bounds declared length, where the rest of the input is
    /// untrustworthy.
    fn flush_input(&mut self) {
        let mut chunk = [0u8; 4096];
        // Bounded: stop as soon as a read comes up empty.
        for _ in 0..64 {
            match self.io.read(&mut chunk) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(_) => break,
            }
        }
    }
}

impl<T: Read + Write> Transport for FramedTransport<T> {
    fn poll(
        &mut self,
        now: Instant,
        _layout: &Layout,
        events: &mut Vec<TransportEvent>,
    ) -> Result<()> {
        if let Some(err) = self.decoder.poll_timeout(now) {
            events.push(TransportEvent::Framing(err));
        }

        let mut chunk = [0u8; 4096];
        'drain: loop {
            let n = match self.io.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                    break
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e).context("transport read failed"),
            };

            for &byte in &chunk[..n] {
                match self.decoder.feed(byte, now) {
                    Some(Ok(cmd)) => events.push(TransportEvent::Command(cmd)),
                    Some(Err(err)) => {
                        events.push(TransportEvent::Framing(err));
                        if matches!(err, FramingError::LengthOutOfBounds { .. }) {
                            // Rest of the chunk and anything pending is
                            // garbage from the same oversized packet.
                            self.flush_input();
                            break 'drain;
                        }
                    }
                    None => {}
                }
            }
        }
        Ok(())
    }

    fn send_response(&mut self, response: &Response) -> Result<()> {
        self.io
            .write_all(&response.encode())
            .context("failed to write response")?;
        self.io.flush().context("failed to flush response")?;
        Ok(())
    }
}
