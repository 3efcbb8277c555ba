use std::fmt;
use std::fmt::{Display, Formatter};

use byteorder::{ByteOrder, NetworkEndian};
use thiserror::Error;

pub use crate::tftp::shared::ack_packet::AckPacket;
pub use crate::tftp::shared::data_packet::DataPacket;
pub use crate::tftp::shared::err_packet::{ErrorPacket, TFTPError};
pub use crate::tftp::shared::oack_packet::OptionAckPacket;
pub use crate::tftp::shared::parser::{parse, Deserializable, ParseState, Parsed};
pub use crate::tftp::shared::request_packet::RequestPacket;

pub mod ack_packet;
pub mod data_packet;
pub mod err_packet;
pub mod oack_packet;
pub mod options;
pub mod parser;
pub mod request_packet;

/// Length of the OpCode field in bytes.
pub const OP_LEN: usize = 2;
/// Length of the block number / error code fields in bytes.
pub const WORD_LEN: usize = 2;
/// Largest payload a DATA packet may carry.
pub const STRIDE_SIZE: usize = 512;
/// Terminates every text field and option name/value.
pub const TERMINATOR: u8 = 0;

/// Op code for Read Request
pub const OP_RRQ: u16 = 0x001;
/// Op code for Write Request
pub const OP_WRQ: u16 = 0x002;
/// Op code for Data packet
pub const OP_DATA: u16 = 0x003;
/// Op code for ACK packet
pub const OP_ACK: u16 = 0x004;
/// Op code for Error packet
pub const OP_ERR: u16 = 0x005;
/// Op code for Option Acknowledgment packet
pub const OP_OACK: u16 = 0x006;

/// The packet kind, carried as the first two bytes of every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    ReadRequest = OP_RRQ,
    WriteRequest = OP_WRQ,
    Data = OP_DATA,
    Acknowledgment = OP_ACK,
    Error = OP_ERR,
    OptionAcknowledgment = OP_OACK,
}

impl Opcode {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            OP_RRQ => Some(Opcode::ReadRequest),
            OP_WRQ => Some(Opcode::WriteRequest),
            OP_DATA => Some(Opcode::Data),
            OP_ACK => Some(Opcode::Acknowledgment),
            OP_ERR => Some(Opcode::Error),
            OP_OACK => Some(Opcode::OptionAcknowledgment),
            _ => None,
        }
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn is_request(self) -> bool {
        matches!(self, Opcode::ReadRequest | Opcode::WriteRequest)
    }
}

impl Display for Opcode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Opcode::ReadRequest => "RRQ",
            Opcode::WriteRequest => "WRQ",
            Opcode::Data => "DATA",
            Opcode::Acknowledgment => "ACK",
            Opcode::Error => "ERROR",
            Opcode::OptionAcknowledgment => "OACK",
        };

        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TFTPPacket {
    RRQ(RequestPacket),
    WRQ(RequestPacket),
    ACK(AckPacket),
    ERR(ErrorPacket),
    DATA(DataPacket),
    OACK(OptionAckPacket),
}

impl TFTPPacket {
    pub fn op(&self) -> Opcode {
        match self {
            TFTPPacket::RRQ(_) => Opcode::ReadRequest,
            TFTPPacket::WRQ(_) => Opcode::WriteRequest,
            TFTPPacket::ACK(_) => Opcode::Acknowledgment,
            TFTPPacket::ERR(_) => Opcode::Error,
            TFTPPacket::DATA(_) => Opcode::Data,
            TFTPPacket::OACK(_) => Opcode::OptionAcknowledgment,
        }
    }
}

impl From<RequestPacket> for TFTPPacket {
    fn from(p: RequestPacket) -> Self {
        match p.op() {
            Opcode::WriteRequest => TFTPPacket::WRQ(p),
            _ => TFTPPacket::RRQ(p),
        }
    }
}

impl From<DataPacket> for TFTPPacket {
    fn from(p: DataPacket) -> Self {
        TFTPPacket::DATA(p)
    }
}

impl From<AckPacket> for TFTPPacket {
    fn from(p: AckPacket) -> Self {
        TFTPPacket::ACK(p)
    }
}

impl From<ErrorPacket> for TFTPPacket {
    fn from(p: ErrorPacket) -> Self {
        TFTPPacket::ERR(p)
    }
}

impl From<OptionAckPacket> for TFTPPacket {
    fn from(p: OptionAckPacket) -> Self {
        TFTPPacket::OACK(p)
    }
}

impl Display for TFTPPacket {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let desc = match self {
            TFTPPacket::RRQ(p) | TFTPPacket::WRQ(p) => format!(
                "{} [{}] [{}] options={}",
                p.op(),
                text(p.filename()),
                text(p.mode()),
                p.options().len()
            ),
            TFTPPacket::ACK(p) => format!("ACK [{}]", p.blk()),
            TFTPPacket::ERR(p) => format!("ERR [{}]: {}", p.code(), text(p.err())),
            TFTPPacket::DATA(p) => format!("DATA [{}] ({} bytes)", p.blk(), p.data().len()),
            TFTPPacket::OACK(p) => {
                let opts: Vec<String> = p
                    .options()
                    .iter()
                    .map(|(name, value)| format!("{}={}", text(name), text(value)))
                    .collect();
                format!("OACK [{}]", opts.join(", "))
            }
        };

        write!(f, "{}", desc)
    }
}

/// Renders a wire text field for humans.
pub fn text(bytes: &[u8]) -> std::borrow::Cow<'_, str> {
    String::from_utf8_lossy(bytes)
}

pub trait Serializable {
    /// Appends the wire form of the packet to `buf`, returning the number of
    /// bytes written.
    fn serialize_into(&self, buf: &mut Vec<u8>) -> usize;

    fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }
}

impl Serializable for TFTPPacket {
    fn serialize_into(&self, buf: &mut Vec<u8>) -> usize {
        match self {
            TFTPPacket::RRQ(p) | TFTPPacket::WRQ(p) => p.serialize_into(buf),
            TFTPPacket::ACK(p) => p.serialize_into(buf),
            TFTPPacket::ERR(p) => p.serialize_into(buf),
            TFTPPacket::DATA(p) => p.serialize_into(buf),
            TFTPPacket::OACK(p) => p.serialize_into(buf),
        }
    }
}

/// Writes a 16-bit value in network byte order.
pub(crate) fn put_u16(buf: &mut Vec<u8>, value: u16) {
    let mut word = [0; WORD_LEN];
    NetworkEndian::write_u16(&mut word, value);
    buf.extend_from_slice(&word);
}

/// Writes a text field followed by its terminator.
pub(crate) fn put_text(buf: &mut Vec<u8>, value: &[u8]) {
    buf.extend_from_slice(value);
    buf.push(TERMINATOR);
}

/// Assembles a big-endian 16-bit field that may arrive one byte at a time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Word {
    high: Option<u8>,
}

impl Word {
    /// Feeds the next wire byte; yields the host-order value once the second
    /// byte is in, leaving the accumulator empty again.
    pub fn push(&mut self, byte: u8) -> Option<u16> {
        match self.high.take() {
            None => {
                self.high = Some(byte);
                None
            }
            Some(high) => Some(NetworkEndian::read_u16(&[high, byte])),
        }
    }
}

/// What is wrong with a rejected field.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Violation {
    #[error("contains a NUL terminator byte")]
    EmbeddedTerminator,
    #[error("holds {len} bytes, more than the {max} allowed")]
    TooLong { len: usize, max: usize },
    #[error("value {0} is out of range")]
    OutOfRange(u16),
    #[error("opcode {0} does not belong to this packet kind")]
    WrongOpcode(u16),
}

/// Raised when a packet is constructed from values the wire format can't carry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid {kind} packet: `{field}` {reason}")]
pub struct ValidationError {
    pub kind: Opcode,
    pub field: &'static str,
    pub reason: Violation,
}

impl ValidationError {
    pub(crate) fn new(kind: Opcode, field: &'static str, reason: Violation) -> Self {
        ValidationError { kind, field, reason }
    }
}

/// Rejects text fields that would end early on the wire.
pub(crate) fn check_text(
    kind: Opcode,
    field: &'static str,
    value: &[u8],
) -> Result<(), ValidationError> {
    if value.contains(&TERMINATOR) {
        return Err(ValidationError::new(kind, field, Violation::EmbeddedTerminator));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_is_assembled_most_significant_byte_first() {
        let mut word = Word::default();
        assert_eq!(word.push(0x01), None);
        assert_eq!(word.push(0x02), Some(0x0102));
        // accumulator is ready for the next field
        assert_eq!(word.push(0x00), None);
        assert_eq!(word.push(0xFF), Some(255));
    }

    #[test]
    fn opcode_round_trips_through_u16() {
        for value in OP_RRQ..=OP_OACK {
            assert_eq!(Opcode::from_u16(value).unwrap().as_u16(), value);
        }
        assert_eq!(Opcode::from_u16(0), None);
        assert_eq!(Opcode::from_u16(7), None);
    }

    #[test]
    fn validation_error_names_the_field() {
        let err = check_text(Opcode::Error, "message", b"a\0b").unwrap_err();
        assert_eq!(err.field, "message");
        assert_eq!(err.reason, Violation::EmbeddedTerminator);
        assert_eq!(
            err.to_string(),
            "invalid ERROR packet: `message` contains a NUL terminator byte"
        );
    }
}
