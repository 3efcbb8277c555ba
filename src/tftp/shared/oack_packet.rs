//! OACK (RFC 2347) answers an option-extended request with the options the
//! server accepted. Option order is not significant here, so the packet
//! keeps them in a map.
use std::collections::BTreeMap;

use crate::tftp::shared::options::{check_options, encode_options, OptionDecoder};
use crate::tftp::shared::parser::{opcode_byte, Deserializable, OpcodeByte, Progress};
use crate::tftp::shared::{put_u16, Opcode, Serializable, ValidationError, Word};

const OACK_OPS: [Opcode; 1] = [Opcode::OptionAcknowledgment];

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct OptionAckPacket {
    options: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl OptionAckPacket {
    pub fn new(options: BTreeMap<Vec<u8>, Vec<u8>>) -> Result<Self, ValidationError> {
        check_options(
            Opcode::OptionAcknowledgment,
            options.iter().map(|(n, v)| (n.as_slice(), v.as_slice())),
        )?;
        Ok(OptionAckPacket { options })
    }

    /// Builds the packet from pairs; a repeated name keeps its first value.
    pub fn from_pairs<I, N, V>(pairs: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<Vec<u8>>,
        V: Into<Vec<u8>>,
    {
        let mut options = BTreeMap::new();
        for (name, value) in pairs {
            options.entry(name.into()).or_insert_with(|| value.into());
        }
        Self::new(options)
    }

    pub fn options(&self) -> &BTreeMap<Vec<u8>, Vec<u8>> {
        &self.options
    }

    pub fn option(&self, name: &[u8]) -> Option<&[u8]> {
        self.options.get(name).map(Vec::as_slice)
    }
}

impl Serializable for OptionAckPacket {
    fn serialize_into(&self, buf: &mut Vec<u8>) -> usize {
        let start = buf.len();
        put_u16(buf, Opcode::OptionAcknowledgment.as_u16());
        encode_options(
            buf,
            self.options
                .iter()
                .map(|(n, v)| (n.as_slice(), v.as_slice())),
        );
        buf.len() - start
    }
}

#[derive(Debug, Clone, Default)]
pub struct OackMachine {
    opcode_seen: bool,
    word: Word,
    options: OptionDecoder,
}

impl OackMachine {
    fn finish(&mut self) -> Progress<OptionAckPacket> {
        let pairs = std::mem::take(&mut self.options).into_pairs();
        match OptionAckPacket::from_pairs(pairs) {
            Ok(p) => Progress::Done(p),
            Err(_) => Progress::Resync("invalid option acknowledgment"),
        }
    }
}

impl Deserializable for OptionAckPacket {
    type Machine = OackMachine;

    fn step(m: &mut OackMachine, byte: u8, end_of_datagram: bool) -> Progress<Self> {
        if !m.opcode_seen {
            return match opcode_byte(&mut m.word, byte, &OACK_OPS) {
                OpcodeByte::Partial => Progress::Pending,
                OpcodeByte::Matched(_) if end_of_datagram => m.finish(),
                OpcodeByte::Matched(_) => {
                    m.opcode_seen = true;
                    Progress::Pending
                }
                OpcodeByte::Mismatch => Progress::Resync("not an oack opcode"),
            };
        }

        if m.options.push(byte) && end_of_datagram {
            return m.finish();
        }
        Progress::Pending
    }
}
