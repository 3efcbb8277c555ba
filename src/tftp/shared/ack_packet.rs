/// ACK packets are acknowledged by  DATA  or ERROR packets.
/// the opcode is 4.
///
/// The  block  number  in an  ACK echoes
/// the block number of the DATA packet being acknowledged.
///
/// The packet has a fixed length, so it is complete as soon as the second
/// byte of the block number has been read.
use crate::tftp::shared::parser::{opcode_byte, Deserializable, OpcodeByte, Progress};
use crate::tftp::shared::{
    put_u16, Opcode, Serializable, ValidationError, Violation, Word, OP_LEN, WORD_LEN,
};

const ACK_LEN: usize = OP_LEN + WORD_LEN;
const ACK_OPS: [Opcode; 1] = [Opcode::Acknowledgment];

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct AckPacket {
    blk: u16,
}

impl AckPacket {
    pub fn new(blk: u16) -> Result<Self, ValidationError> {
        if blk == 0 {
            return Err(ValidationError::new(
                Opcode::Acknowledgment,
                "block",
                Violation::OutOfRange(blk),
            ));
        }
        Ok(AckPacket { blk })
    }

    pub fn blk(&self) -> u16 {
        self.blk
    }
}

impl Serializable for AckPacket {
    fn serialize_into(&self, buf: &mut Vec<u8>) -> usize {
        put_u16(buf, Opcode::Acknowledgment.as_u16());
        put_u16(buf, self.blk);

        ACK_LEN
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AckMachine {
    opcode_seen: bool,
    word: Word,
}

impl Deserializable for AckPacket {
    type Machine = AckMachine;

    fn step(m: &mut AckMachine, byte: u8, _end_of_datagram: bool) -> Progress<Self> {
        if !m.opcode_seen {
            return match opcode_byte(&mut m.word, byte, &ACK_OPS) {
                OpcodeByte::Partial => Progress::Pending,
                OpcodeByte::Matched(_) => {
                    m.opcode_seen = true;
                    Progress::Pending
                }
                OpcodeByte::Mismatch => Progress::Resync("not an ack opcode"),
            };
        }

        match m.word.push(byte) {
            None => Progress::Pending,
            Some(blk) => match AckPacket::new(blk) {
                Ok(p) => Progress::Done(p),
                Err(_) => Progress::Resync("ack for block 0"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use byteorder::{NetworkEndian, WriteBytesExt};

    use crate::tftp::shared::ack_packet::AckPacket;
    use crate::tftp::shared::parser::{parse, ParseState, Parsed};
    use crate::tftp::shared::{Serializable, OP_ACK};

    #[test]
    fn serialize_ack_packet() {
        let blk = 42;
        let p = AckPacket::new(blk).unwrap();

        let mut buf: Vec<u8> = Vec::new();
        buf.write_u16::<NetworkEndian>(OP_ACK).unwrap();
        buf.write_u16::<NetworkEndian>(blk).unwrap();

        assert_eq!(p.serialize(), buf);
    }

    #[test]
    fn deserialize_ack_packet() {
        assert_eq!(
            parse::<AckPacket>(&[0x00, 0x04, 0x00, 0xFF]),
            Parsed::Complete {
                packet: AckPacket::new(255).unwrap(),
                consumed: 4
            }
        );
    }

    #[test]
    fn completes_mid_buffer() {
        let parsed = parse::<AckPacket>(&[0x00, 0x04, 0x01, 0x00, 0xDE, 0xAD]);
        assert_eq!(
            parsed,
            Parsed::Complete {
                packet: AckPacket::new(256).unwrap(),
                consumed: 4
            }
        );
    }

    #[test]
    fn deserialize_error_resynchronizes() {
        let blk = 42;
        let bad_op = OP_ACK + 1;
        let mut buf: Vec<u8> = Vec::new();
        buf.write_u16::<NetworkEndian>(bad_op).unwrap();
        buf.write_u16::<NetworkEndian>(OP_ACK).unwrap();
        buf.write_u16::<NetworkEndian>(blk).unwrap();

        assert_eq!(
            parse::<AckPacket>(&buf),
            Parsed::Complete {
                packet: AckPacket::new(blk).unwrap(),
                consumed: 6
            }
        );
    }

    #[test]
    fn one_byte_at_a_time() {
        let mut state = ParseState::<AckPacket>::new();
        for &b in &[0x00, 0x04, 0x00] {
            assert_eq!(state.feed(&[b]), Parsed::Incomplete { consumed: 1 });
        }
        assert_eq!(
            state.feed(&[0x07]),
            Parsed::Complete {
                packet: AckPacket::new(7).unwrap(),
                consumed: 1
            }
        );
    }

    #[test]
    fn block_zero_is_rejected() {
        assert!(AckPacket::new(0).is_err());
        assert!(!parse::<AckPacket>(&[0, 4, 0, 0]).is_complete());
    }
}
