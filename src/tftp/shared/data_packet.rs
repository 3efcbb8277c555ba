use crate::tftp::shared::parser::{opcode_byte, Deserializable, OpcodeByte, Progress};
use crate::tftp::shared::{
    put_u16, Opcode, Serializable, ValidationError, Violation, Word, OP_LEN, STRIDE_SIZE,
    WORD_LEN,
};

const DATA_OPS: [Opcode; 1] = [Opcode::Data];

/// A block of file contents. Block numbers start at one and the payload is
/// at most [`STRIDE_SIZE`] bytes; a shorter payload ends the transfer.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DataPacket {
    blk: u16,
    data: Vec<u8>,
}

impl DataPacket {
    pub fn new<D: Into<Vec<u8>>>(blk: u16, data: D) -> Result<Self, ValidationError> {
        let data = data.into();
        if blk == 0 {
            return Err(ValidationError::new(
                Opcode::Data,
                "block",
                Violation::OutOfRange(blk),
            ));
        }
        if data.len() > STRIDE_SIZE {
            return Err(ValidationError::new(
                Opcode::Data,
                "data",
                Violation::TooLong {
                    len: data.len(),
                    max: STRIDE_SIZE,
                },
            ));
        }

        Ok(DataPacket { blk, data })
    }

    pub fn blk(&self) -> u16 {
        self.blk
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// A payload shorter than a full stride marks the final block.
    pub fn is_last(&self) -> bool {
        self.data.len() < STRIDE_SIZE
    }
}

impl Serializable for DataPacket {
    fn serialize_into(&self, buf: &mut Vec<u8>) -> usize {
        buf.reserve(OP_LEN + WORD_LEN + self.data.len());
        put_u16(buf, Opcode::Data.as_u16());
        put_u16(buf, self.blk);
        buf.extend_from_slice(&self.data);

        OP_LEN + WORD_LEN + self.data.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DataStep {
    Opcode,
    Block,
    Payload,
}

impl Default for DataStep {
    fn default() -> Self {
        DataStep::Opcode
    }
}

#[derive(Debug, Clone, Default)]
pub struct DataMachine {
    step: DataStep,
    word: Word,
    blk: u16,
    data: Vec<u8>,
}

impl DataMachine {
    fn finish(&mut self) -> Progress<DataPacket> {
        match DataPacket::new(self.blk, std::mem::take(&mut self.data)) {
            Ok(p) => Progress::Done(p),
            Err(_) => Progress::Resync("invalid data packet"),
        }
    }
}

impl Deserializable for DataPacket {
    type Machine = DataMachine;

    // The payload has no length field, it is whatever is left of the datagram.
    fn step(m: &mut DataMachine, byte: u8, end_of_datagram: bool) -> Progress<Self> {
        match m.step {
            DataStep::Opcode => match opcode_byte(&mut m.word, byte, &DATA_OPS) {
                OpcodeByte::Partial => {}
                OpcodeByte::Matched(_) => m.step = DataStep::Block,
                OpcodeByte::Mismatch => return Progress::Resync("not a data opcode"),
            },
            DataStep::Block => {
                if let Some(blk) = m.word.push(byte) {
                    m.blk = blk;
                    if end_of_datagram {
                        return m.finish();
                    }
                    m.step = DataStep::Payload;
                }
            }
            DataStep::Payload => {
                if m.data.len() == STRIDE_SIZE {
                    return Progress::Resync("data payload exceeds a stride");
                }
                m.data.push(byte);
                if end_of_datagram {
                    return m.finish();
                }
            }
        }

        Progress::Pending
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use byteorder::{NetworkEndian, WriteBytesExt};

    use crate::tftp::shared::data_packet::DataPacket;
    use crate::tftp::shared::parser::{parse, ParseState, Parsed};
    use crate::tftp::shared::{Serializable, Violation, OP_DATA, STRIDE_SIZE};

    #[test]
    fn serialize_data_packet() {
        let p = DataPacket::new(1, b"Some contents...\r\n".to_vec()).unwrap();

        let mut buf: Vec<u8> = Vec::new();
        buf.write_u16::<NetworkEndian>(OP_DATA).unwrap();
        buf.write_u16::<NetworkEndian>(1).unwrap();
        buf.write_all(b"Some contents...\r\n").unwrap();

        assert_eq!(p.serialize(), buf);
    }

    #[test]
    fn deserialize_data_packet() {
        let mut buf: Vec<u8> = Vec::new();
        buf.write_u16::<NetworkEndian>(OP_DATA).unwrap();
        buf.write_u16::<NetworkEndian>(0x0102).unwrap();
        buf.write_all(&[0xAB; 100]).unwrap();

        assert_eq!(
            parse::<DataPacket>(&buf),
            Parsed::Complete {
                packet: DataPacket::new(0x0102, vec![0xABu8; 100]).unwrap(),
                consumed: 104
            }
        );
    }

    #[test]
    fn deserialize_empty_final_block() {
        let p = parse::<DataPacket>(&[0, 3, 0, 7]).into_packet().unwrap();
        assert_eq!(p.blk(), 7);
        assert!(p.data().is_empty());
        assert!(p.is_last());
    }

    #[test]
    fn payload_bounds() {
        assert!(DataPacket::new(1, vec![0u8; STRIDE_SIZE]).is_ok());

        let err = DataPacket::new(1, vec![0u8; STRIDE_SIZE + 1]).unwrap_err();
        assert_eq!(err.field, "data");
        assert_eq!(
            err.reason,
            Violation::TooLong {
                len: STRIDE_SIZE + 1,
                max: STRIDE_SIZE
            }
        );
    }

    #[test]
    fn block_zero_is_rejected() {
        let err = DataPacket::new(0, Vec::<u8>::new()).unwrap_err();
        assert_eq!(err.field, "block");
    }

    #[test]
    fn oversized_payload_is_never_emitted() {
        let mut buf: Vec<u8> = Vec::new();
        buf.write_u16::<NetworkEndian>(OP_DATA).unwrap();
        buf.write_u16::<NetworkEndian>(1).unwrap();
        buf.write_all(&[0x11; STRIDE_SIZE + 1]).unwrap();

        let mut state = ParseState::<DataPacket>::with_datagram_len(buf.len());
        assert!(!state.feed(&buf).is_complete());
    }

    #[test]
    fn bounded_state_ignores_chunk_boundaries() {
        let p = DataPacket::new(9, b"hello world".to_vec()).unwrap();
        let wire = p.serialize();

        let mut state = ParseState::<DataPacket>::with_datagram_len(wire.len());
        for chunk in wire[..wire.len() - 1].chunks(3) {
            assert!(!state.feed(chunk).is_complete());
        }
        let last = state.feed(&wire[wire.len() - 1..]);
        assert_eq!(last.into_packet(), Some(p));
    }
}
