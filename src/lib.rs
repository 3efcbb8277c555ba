//! Wire codec for TFTP (RFC 1350) with option extension packets (RFC 2347).
//!
//! Packets are built through validating constructors and turned into bytes
//! with [`Serializable`]. Decoding goes through [`ParseState`], which accepts
//! the bytes of a packet in pieces of any size:
//!
//! ```
//! use tftp_wire::{AckPacket, ParseState, Parsed};
//!
//! let mut state = ParseState::<AckPacket>::new();
//! assert_eq!(state.feed(&[0x00, 0x04]), Parsed::Incomplete { consumed: 2 });
//! let ack = state.feed(&[0x00, 0xFF]).into_packet().unwrap();
//! assert_eq!(ack.blk(), 255);
//! ```
//!
//! Transfers, retransmission and sockets are left to the caller.

pub mod tftp;

pub use tftp::shared::options::{OptionDecoder, OptionPair};
pub use tftp::shared::parser::Progress;
pub use tftp::shared::{
    parse, AckPacket, DataPacket, Deserializable, ErrorPacket, Opcode, OptionAckPacket,
    ParseState, Parsed, RequestPacket, Serializable, TFTPError, TFTPPacket, ValidationError,
    Violation, STRIDE_SIZE,
};
