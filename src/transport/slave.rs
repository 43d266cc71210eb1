//! Synchronous full-duplex slave-transaction transport.
//!
//! The bus master clocks fixed-size exchanges; the device has no flow
//! control on its outbound line, so every tx slot must be filled before
//! the exchange starts. Slots not occupied by queued response bytes
//! carry the filler byte. One command per transaction: byte 0 is the
//! opcode, the command's declared length is consumed, the trailing
//! region is ignored.

use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::layout::Layout;
use crate::protocol::{
    Response, CMD_CLEAR, CMD_CONFIG, CMD_ECHO, CMD_PING, CMD_SET_ALL, CMD_SET_BRIGHTNESS,
    CMD_SET_PIXEL, CMD_SET_RANGE, CMD_SHOW, CMD_STATS,
};
use crate::transport::{CommandBuffer, Transport, TransportEvent};

/// Outbound placeholder byte. Also doubles as the "no command" opcode:
/// a transaction the master clocks only to drain a queued response
/// starts with this byte and is not dispatched.
pub const FILLER_BYTE: u8 = 0x00;

/// One completed exchange with the bus master.
pub trait SlaveBus {
    /// Perform one fixed-size full-duplex exchange if the master has
    /// initiated one. `tx` supplies every outbound byte for the whole
    /// transaction; `rx` receives the inbound bytes. Returns false when
    /// no transaction occurred (bus idle).
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<bool>;
}

/// Declared payload length for an opcode, given the active layout.
/// None means the opcode is unknown and the whole trailing region is
/// handed to the dispatcher to be counted as an error there.
fn declared_payload_len(opcode: u8, rest: &[u8], layout: &Layout) -> Option<usize> {
    match opcode {
        CMD_PING | CMD_SHOW | CMD_CLEAR | CMD_STATS => Some(0),
        CMD_SET_BRIGHTNESS => Some(1),
        CMD_SET_PIXEL => Some(5),
        CMD_CONFIG => Some(if rest.len() >= 4 { 4 } else { 3 }),
        // start(2) + count(1) + count RGB triples
        CMD_SET_RANGE => rest.get(2).map(|&count| 3 + count as usize * 3),
        CMD_SET_ALL => Some(layout.total_leds() * 3),
        // Echo has no declared length on this transport; reflect the
        // whole trailing region.
        CMD_ECHO => Some(rest.len()),
        _ => None,
    }
}

pub struct SlaveTransport<B: SlaveBus> {
    bus: B,
    transaction_size: usize,
    pending_tx: VecDeque<u8>,
}

impl<B: SlaveBus> SlaveTransport<B> {
    pub fn new(bus: B, transaction_size: usize) -> Self {
        SlaveTransport {
            bus,
            transaction_size,
            pending_tx: VecDeque::new(),
        }
    }

    /// Materialize the outbound buffer for one transaction: queued
    /// response bytes first, filler for every remaining slot. The
    /// queue is only consumed after the exchange actually happens.
    fn build_tx(&self) -> Vec<u8> {
        let mut tx = vec![FILLER_BYTE; self.transaction_size];
        for (slot, &byte) in tx.iter_mut().zip(self.pending_tx.iter()) {
            *slot = byte;
        }
        tx
    }

    fn consume_tx(&mut self) {
        let sent = self.transaction_size.min(self.pending_tx.len());
        self.pending_tx.drain(..sent);
    }
}

impl<B: SlaveBus> Transport for SlaveTransport<B> {
    fn poll(
        &mut self,
        _now: Instant,
        layout: &Layout,
        events: &mut Vec<TransportEvent>,
    ) -> Result<()> {
        let tx = self.build_tx();
        let mut rx = vec![0u8; self.transaction_size];
        if !self.bus.transfer(&tx, &mut rx)? {
            return Ok(());
        }
        self.consume_tx();

        let opcode = rx[0];
        if opcode == FILLER_BYTE {
            // Drain-only transaction, nothing to dispatch
            return Ok(());
        }

        let rest = &rx[1..];
        let payload = match declared_payload_len(opcode, rest, layout) {
            Some(len) => rest[..len.min(rest.len())].to_vec(),
            None => rest.to_vec(),
        };
        events.push(TransportEvent::Command(CommandBuffer { opcode, payload }));
        Ok(())
    }

    fn send_response(&mut self, response: &Response) -> Result<()> {
        self.pending_tx.extend(response.encode());
        Ok(())
    }
}

/// Slave-transaction discipline emulated over a full-duplex byte
/// stream (a serial-bridged bus). The bridge delivers each master
/// transaction as a burst of exactly `transaction_size` bytes; the
/// outbound buffer is written first so the bridge's tx register is
/// primed before the clocking starts.
pub struct StreamSlaveBus<T: Read + Write> {
    io: T,
    /// How long to wait for the remainder of a transaction once its
    /// first byte has arrived.
    completion_timeout: Duration,
}

impl<T: Read + Write> StreamSlaveBus<T> {
    pub fn new(io: T) -> Self {
        StreamSlaveBus {
            io,
            completion_timeout: Duration::from_millis(100),
        }
    }
}

impl<T: Read + Write> SlaveBus for StreamSlaveBus<T> {
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<bool> {
        // Probe for the start of a transaction.
        let mut filled = match self.io.read(rx) {
            Ok(0) => return Ok(false),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                return Ok(false)
            }
            Err(e) => return Err(e).context("slave bus read failed"),
        };

        // Master is clocking: prime the outbound side immediately.
        self.io.write_all(tx).context("slave bus write failed")?;
        self.io.flush().context("slave bus flush failed")?;

        let deadline = Instant::now() + self.completion_timeout;
        while filled < rx.len() {
            match self.io.read(&mut rx[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                    if Instant::now() >= deadline {
                        break;
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e).context("slave bus read failed"),
            }
        }
        // A short transaction leaves the trailing region as filler,
        // which the adapter ignores anyway.
        rx[filled..].fill(FILLER_BYTE);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{RESP_STATUS, PACKET_END, PACKET_START};

    /// Scripted bus: hands out canned transactions and records every
    /// tx buffer it was primed with.
    struct ScriptBus {
        transactions: VecDeque<Vec<u8>>,
        primed: Vec<Vec<u8>>,
    }

    impl ScriptBus {
        fn new(transactions: Vec<Vec<u8>>) -> Self {
            ScriptBus {
                transactions: transactions.into(),
                primed: Vec::new(),
            }
        }
    }

    impl SlaveBus for ScriptBus {
        fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<bool> {
            self.primed.push(tx.to_vec());
            match self.transactions.pop_front() {
                Some(data) => {
                    rx.fill(FILLER_BYTE);
                    rx[..data.len()].copy_from_slice(&data);
                    Ok(true)
                }
                None => Ok(false),
            }
        }
    }

    fn poll_events(transport: &mut SlaveTransport<ScriptBus>, layout: &Layout) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        transport
            .poll(Instant::now(), layout, &mut events)
            .unwrap();
        events
    }

    #[test]
    fn test_one_command_per_transaction_trailing_ignored() {
        let layout = Layout::new(1, 4).unwrap();
        // SET_PIXEL plus garbage in the trailing region
        let mut txn = vec![CMD_SET_PIXEL, 0, 2, 10, 20, 30];
        txn.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        let bus = ScriptBus::new(vec![txn]);
        let mut transport = SlaveTransport::new(bus, 32);

        let events = poll_events(&mut transport, &layout);
        assert_eq!(
            events,
            vec![TransportEvent::Command(CommandBuffer {
                opcode: CMD_SET_PIXEL,
                payload: vec![0, 2, 10, 20, 30],
            })]
        );
    }

    #[test]
    fn test_set_all_length_follows_layout() {
        let layout = Layout::new(1, 2).unwrap();
        let mut txn = vec![CMD_SET_ALL];
        txn.extend_from_slice(&[1, 2, 3, 4, 5, 6, 99, 99]);
        let bus = ScriptBus::new(vec![txn]);
        let mut transport = SlaveTransport::new(bus, 16);

        let events = poll_events(&mut transport, &layout);
        match &events[0] {
            TransportEvent::Command(cmd) => {
                assert_eq!(cmd.opcode, CMD_SET_ALL);
                assert_eq!(cmd.payload, vec![1, 2, 3, 4, 5, 6]);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_set_range_length_from_count_field() {
        let layout = Layout::new(8, 140).unwrap();
        // start=0, count=2, two triples, then trailing junk
        let txn = vec![CMD_SET_RANGE, 0, 0, 2, 1, 1, 1, 2, 2, 2, 7, 7];
        let bus = ScriptBus::new(vec![txn]);
        let mut transport = SlaveTransport::new(bus, 16);

        let events = poll_events(&mut transport, &layout);
        match &events[0] {
            TransportEvent::Command(cmd) => {
                assert_eq!(cmd.payload, vec![0, 0, 2, 1, 1, 1, 2, 2, 2]);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_tx_always_fully_primed() {
        let layout = Layout::default();
        let bus = ScriptBus::new(vec![vec![CMD_PING]]);
        let mut transport = SlaveTransport::new(bus, 8);
        poll_events(&mut transport, &layout);
        let primed = &transport.bus.primed[0];
        assert_eq!(primed.len(), 8);
        assert!(primed.iter().all(|&b| b == FILLER_BYTE));
    }

    #[test]
    fn test_queued_response_rides_next_transaction() {
        let layout = Layout::default();
        let bus = ScriptBus::new(vec![vec![CMD_PING], vec![FILLER_BYTE]]);
        let mut transport = SlaveTransport::new(bus, 64);

        poll_events(&mut transport, &layout);
        transport
            .send_response(&Response::status(vec![1, 2, 3]))
            .unwrap();

        // The drain transaction carries the response, padded with filler
        let events = poll_events(&mut transport, &layout);
        assert!(events.is_empty());
        let primed = &transport.bus.primed[1];
        assert_eq!(primed[0], PACKET_START);
        assert_eq!(primed[3], RESP_STATUS);
        assert_eq!(&primed[4..7], &[1, 2, 3]);
        assert_eq!(primed[7], PACKET_END);
        assert!(primed[8..].iter().all(|&b| b == FILLER_BYTE));
        // Queue is consumed; the next tx is pure filler again
        assert!(transport.build_tx().iter().all(|&b| b == FILLER_BYTE));
    }

    #[test]
    fn test_filler_transaction_not_dispatched() {
        let layout = Layout::default();
        let bus = ScriptBus::new(vec![vec![FILLER_BYTE; 8]]);
        let mut transport = SlaveTransport::new(bus, 8);
        assert!(poll_events(&mut transport, &layout).is_empty());
    }
}
