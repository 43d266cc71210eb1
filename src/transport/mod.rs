mod framed;
mod slave;

pub use framed::{FramedDecoder, FramedTransport};
pub use slave::{SlaveBus, SlaveTransport, StreamSlaveBus, FILLER_BYTE};

use std::time::Instant;

use anyhow::Result;
use derive_more::{Display, Error};

use crate::layout::Layout;
use crate::protocol::Response;

/// One validated command as handed to the dispatcher: leading opcode
/// plus its payload (opcode excluded). Lives for a single loop
/// iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBuffer {
    pub opcode: u8,
    pub payload: Vec<u8>,
}

impl CommandBuffer {
    /// Bytes this command occupied on the wire (opcode + payload),
    /// for the throughput counter.
    pub fn wire_len(&self) -> usize {
        1 + self.payload.len()
    }
}

/// Transport-level failures. Never fatal: the unit of work is dropped,
/// the error is counted, and the adapter resumes scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
pub enum FramingError {
    #[display("unexpected byte {byte:#04x} while scanning for start marker")]
    BadStartMarker { byte: u8 },
    #[display("bad end marker {byte:#04x}")]
    BadEndMarker { byte: u8 },
    #[display("declared length {len} out of bounds")]
    LengthOutOfBounds { len: usize },
    #[display("timed out waiting for packet body")]
    BodyTimeout,
}

/// What a transport produced during one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Command(CommandBuffer),
    Framing(FramingError),
}

/// A byte transport that yields validated commands. Both disciplines
/// (framed stream, synchronous slave transaction) produce the same
/// event stream, so the dispatcher is written once.
pub trait Transport {
    /// Drain whatever arrived since the last poll into `events`.
    /// Must not block beyond its own bounded I/O timeouts. `layout` is
    /// needed by the transaction discipline to know the declared length
    /// of layout-sized commands.
    fn poll(
        &mut self,
        now: Instant,
        layout: &Layout,
        events: &mut Vec<TransportEvent>,
    ) -> Result<()>;

    /// Send a response back to the host, if the transport has a return
    /// channel. Transaction transports queue it for the next exchange.
    fn send_response(&mut self, response: &Response) -> Result<()>;
}
