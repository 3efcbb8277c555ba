//! Resumable, byte-at-a-time packet decoding.
//!
//! Every packet kind owns a small state machine (its [`Deserializable::Machine`])
//! that walks the same pipeline: two opcode bytes, the kind's fixed 16-bit
//! fields, then its variable-length tail. [`ParseState`] drives one of those
//! machines over whatever slices the transport hands it, so a packet decodes
//! the same way whether it arrives whole or one byte per call.
//!
//! An opcode that does not belong to the kind being parsed is not an error:
//! the machine drops what it has and keeps scanning the rest of the input, so
//! a parser can resynchronize after garbage. The same happens when a decoded
//! packet fails validation (block 0, unknown error code, oversized payload).
use std::fmt;

use byteorder::{ByteOrder, NetworkEndian};
use tracing::{debug, trace};

use crate::tftp::shared::ack_packet::AckMachine;
use crate::tftp::shared::data_packet::DataMachine;
use crate::tftp::shared::err_packet::ErrorMachine;
use crate::tftp::shared::oack_packet::OackMachine;
use crate::tftp::shared::request_packet::RequestMachine;
use crate::tftp::shared::{
    AckPacket, DataPacket, ErrorPacket, OptionAckPacket, RequestPacket, Opcode, TFTPPacket, Word,
    OP_LEN,
};

/// Outcome of a [`ParseState::feed`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed<P> {
    /// A whole packet was decoded from the first `consumed` bytes of the slice.
    Complete { packet: P, consumed: usize },
    /// Every byte was taken, the packet isn't finished yet.
    Incomplete { consumed: usize },
}

impl<P> Parsed<P> {
    pub fn consumed(&self) -> usize {
        match self {
            Parsed::Complete { consumed, .. } | Parsed::Incomplete { consumed } => *consumed,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Parsed::Complete { .. })
    }

    pub fn into_packet(self) -> Option<P> {
        match self {
            Parsed::Complete { packet, .. } => Some(packet),
            Parsed::Incomplete { .. } => None,
        }
    }
}

/// What a machine made of a single byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress<P> {
    Pending,
    Done(P),
    /// Drop everything accumulated so far and start over at the opcode.
    Resync(&'static str),
}

impl<P> Progress<P> {
    pub fn map<Q, F: FnOnce(P) -> Q>(self, f: F) -> Progress<Q> {
        match self {
            Progress::Pending => Progress::Pending,
            Progress::Done(p) => Progress::Done(f(p)),
            Progress::Resync(why) => Progress::Resync(why),
        }
    }
}

/// A packet kind that can be decoded incrementally.
pub trait Deserializable: Sized {
    /// Pipeline position plus any partially accumulated fields.
    type Machine: Default + Clone + fmt::Debug;

    /// Advances `machine` by one byte. `end_of_datagram` is set when this
    /// byte is the last one of the datagram, which is the only way to know
    /// that an unbounded tail (options, DATA payload) is over.
    fn step(machine: &mut Self::Machine, byte: u8, end_of_datagram: bool) -> Progress<Self>;
}

/// Feeds a byte into the opcode field of a machine.
pub(crate) enum OpcodeByte {
    Partial,
    Matched(Opcode),
    Mismatch,
}

pub(crate) fn opcode_byte(word: &mut Word, byte: u8, accepts: &[Opcode]) -> OpcodeByte {
    match word.push(byte) {
        None => OpcodeByte::Partial,
        Some(value) => match Opcode::from_u16(value) {
            Some(op) if accepts.contains(&op) => OpcodeByte::Matched(op),
            _ => {
                trace!(opcode = value, "unexpected opcode");
                OpcodeByte::Mismatch
            }
        },
    }
}

/// Caller-owned decoding state for one in-flight packet of kind `P`.
///
/// A fresh state (`Default`) stands for the start of a new packet. It is
/// plain data: keep one per connection and hand it back on every call.
pub struct ParseState<P: Deserializable> {
    machine: P::Machine,
    remaining: Option<usize>,
}

impl<P: Deserializable> ParseState<P> {
    /// Treats the end of every `feed` slice as the end of the datagram.
    pub fn new() -> Self {
        ParseState {
            machine: P::Machine::default(),
            remaining: None,
        }
    }

    /// Bounds the packet to `len` bytes across any number of `feed` calls, so
    /// that chunk boundaries never end a tail early.
    pub fn with_datagram_len(len: usize) -> Self {
        ParseState {
            machine: P::Machine::default(),
            remaining: if len == 0 { None } else { Some(len) },
        }
    }

    /// Consumes bytes until a packet is complete or `buf` runs out.
    ///
    /// # Panics
    ///
    /// Panics if `buf` is empty.
    pub fn feed(&mut self, buf: &[u8]) -> Parsed<P> {
        assert!(!buf.is_empty(), "feed called with an empty buffer");

        for (idx, &byte) in buf.iter().enumerate() {
            let consumed = idx + 1;
            let end_of_datagram = match self.remaining {
                Some(left) if left <= 1 => {
                    self.remaining = None;
                    true
                }
                Some(left) => {
                    self.remaining = Some(left - 1);
                    false
                }
                None => consumed == buf.len(),
            };

            match P::step(&mut self.machine, byte, end_of_datagram) {
                Progress::Pending => {}
                Progress::Done(packet) => {
                    trace!(consumed, "packet complete");
                    *self = Self::new();
                    return Parsed::Complete { packet, consumed };
                }
                Progress::Resync(why) => {
                    debug!(reason = why, offset = idx, "resynchronizing");
                    self.machine = P::Machine::default();
                }
            }
        }

        Parsed::Incomplete {
            consumed: buf.len(),
        }
    }
}

impl<P: Deserializable> Default for ParseState<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Deserializable> Clone for ParseState<P> {
    fn clone(&self) -> Self {
        ParseState {
            machine: self.machine.clone(),
            remaining: self.remaining,
        }
    }
}

impl<P: Deserializable> fmt::Debug for ParseState<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseState")
            .field("machine", &self.machine)
            .field("remaining", &self.remaining)
            .finish()
    }
}

/// Decodes a single packet contained in `buf`, the whole slice being one
/// datagram.
pub fn parse<P: Deserializable>(buf: &[u8]) -> Parsed<P> {
    ParseState::<P>::new().feed(buf)
}

/// Machine for a packet of any kind: waits for the opcode, then hands the
/// rest of the packet to that kind's machine.
#[derive(Debug, Clone, Default)]
pub struct AnyMachine {
    opcode: Word,
    inner: Option<KindMachine>,
}

#[derive(Debug, Clone)]
enum KindMachine {
    Request(RequestMachine),
    Data(DataMachine),
    Ack(AckMachine),
    Error(ErrorMachine),
    Oack(OackMachine),
}

impl KindMachine {
    fn for_op(op: Opcode) -> Self {
        match op {
            Opcode::ReadRequest | Opcode::WriteRequest => KindMachine::Request(Default::default()),
            Opcode::Data => KindMachine::Data(Default::default()),
            Opcode::Acknowledgment => KindMachine::Ack(Default::default()),
            Opcode::Error => KindMachine::Error(Default::default()),
            Opcode::OptionAcknowledgment => KindMachine::Oack(Default::default()),
        }
    }

    fn step(&mut self, byte: u8, end_of_datagram: bool) -> Progress<TFTPPacket> {
        match self {
            KindMachine::Request(m) => {
                RequestPacket::step(m, byte, end_of_datagram).map(TFTPPacket::from)
            }
            KindMachine::Data(m) => DataPacket::step(m, byte, end_of_datagram).map(TFTPPacket::DATA),
            KindMachine::Ack(m) => AckPacket::step(m, byte, end_of_datagram).map(TFTPPacket::ACK),
            KindMachine::Error(m) => {
                ErrorPacket::step(m, byte, end_of_datagram).map(TFTPPacket::ERR)
            }
            KindMachine::Oack(m) => {
                OptionAckPacket::step(m, byte, end_of_datagram).map(TFTPPacket::OACK)
            }
        }
    }
}

impl Deserializable for TFTPPacket {
    type Machine = AnyMachine;

    fn step(machine: &mut AnyMachine, byte: u8, end_of_datagram: bool) -> Progress<Self> {
        if let Some(inner) = machine.inner.as_mut() {
            return inner.step(byte, end_of_datagram);
        }

        let value = match machine.opcode.push(byte) {
            None => return Progress::Pending,
            Some(value) => value,
        };
        let op = match Opcode::from_u16(value) {
            Some(op) => op,
            None => return Progress::Resync("unknown opcode"),
        };

        // Replay the opcode so the kind machine sees the packet from its start.
        let mut opcode = [0; OP_LEN];
        NetworkEndian::write_u16(&mut opcode, value);
        let mut inner = KindMachine::for_op(op);
        let first = inner.step(opcode[0], false);
        debug_assert_eq!(first, Progress::Pending);
        let progress = inner.step(opcode[1], end_of_datagram);
        machine.inner = Some(inner);
        progress
    }
}
