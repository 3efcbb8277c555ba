/// ERROR packet can be the acknowledgment of any other type of packet.
/// The error code is an integer indicating the nature of the error.  A
/// table of values and meanings is given in the appendix.  (Note that
/// several error codes have been added to this version of this
/// document.) The error message is intended for human consumption, and
/// should be in netascii.  Like all other strings, it is terminated with
/// a zero byte.
use crate::tftp::shared::parser::{opcode_byte, Deserializable, OpcodeByte, Progress};
use crate::tftp::shared::{
    check_text, put_text, put_u16, Opcode, Serializable, ValidationError, Violation, Word,
    TERMINATOR,
};

const ERR_OPS: [Opcode; 1] = [Opcode::Error];
/// Highest error code defined (8, option negotiation, comes from RFC 2347).
pub const MAX_ERR_CODE: u16 = 8;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TFTPError {
    UndefinedError,
    FileNotFound,
    AccessViolation,
    DiskFull,
    IllegalOperation,
    UnknownTID,
    FileExists,
    NoSuchUser,
    OptionNegotiation,
}

impl TFTPError {
    pub fn code(self) -> u16 {
        match self {
            TFTPError::UndefinedError => 0,
            TFTPError::FileNotFound => 1,
            TFTPError::AccessViolation => 2,
            TFTPError::DiskFull => 3,
            TFTPError::IllegalOperation => 4,
            TFTPError::UnknownTID => 5,
            TFTPError::FileExists => 6,
            TFTPError::NoSuchUser => 7,
            TFTPError::OptionNegotiation => 8,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(TFTPError::UndefinedError),
            1 => Some(TFTPError::FileNotFound),
            2 => Some(TFTPError::AccessViolation),
            3 => Some(TFTPError::DiskFull),
            4 => Some(TFTPError::IllegalOperation),
            5 => Some(TFTPError::UnknownTID),
            6 => Some(TFTPError::FileExists),
            7 => Some(TFTPError::NoSuchUser),
            8 => Some(TFTPError::OptionNegotiation),
            _ => None,
        }
    }

    pub fn default_message(self) -> &'static str {
        match self {
            TFTPError::UndefinedError => "Not defined, see error message (if any).",
            TFTPError::FileNotFound => "File not found.",
            TFTPError::AccessViolation => "Access violation.",
            TFTPError::DiskFull => "Disk full or allocation exceeded.",
            TFTPError::IllegalOperation => "Illegal TFTP operation.",
            TFTPError::UnknownTID => "Unknown transfer ID.",
            TFTPError::FileExists => "File already exists.",
            TFTPError::NoSuchUser => "No such user.",
            TFTPError::OptionNegotiation => "Option negotiation failed.",
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ErrorPacket {
    code: u16,
    err: Vec<u8>,
}

impl ErrorPacket {
    pub fn new<M: Into<Vec<u8>>>(code: u16, msg: M) -> Result<Self, ValidationError> {
        if code > MAX_ERR_CODE {
            return Err(ValidationError::new(
                Opcode::Error,
                "code",
                Violation::OutOfRange(code),
            ));
        }
        let err = msg.into();
        check_text(Opcode::Error, "message", &err)?;

        Ok(ErrorPacket { code, err })
    }

    /// Builds the packet with the standard message for `err`.
    pub fn from_error(err: TFTPError) -> Self {
        ErrorPacket {
            code: err.code(),
            err: err.default_message().as_bytes().to_vec(),
        }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn kind(&self) -> Option<TFTPError> {
        TFTPError::from_code(self.code)
    }

    pub fn err(&self) -> &[u8] {
        &self.err
    }
}

impl Serializable for ErrorPacket {
    fn serialize_into(&self, buf: &mut Vec<u8>) -> usize {
        let start = buf.len();
        put_u16(buf, Opcode::Error.as_u16());
        put_u16(buf, self.code);
        put_text(buf, &self.err);
        buf.len() - start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorStep {
    Opcode,
    Code,
    Message,
}

impl Default for ErrorStep {
    fn default() -> Self {
        ErrorStep::Opcode
    }
}

#[derive(Debug, Clone, Default)]
pub struct ErrorMachine {
    step: ErrorStep,
    word: Word,
    code: u16,
    err: Vec<u8>,
}

impl Deserializable for ErrorPacket {
    type Machine = ErrorMachine;

    fn step(m: &mut ErrorMachine, byte: u8, _end_of_datagram: bool) -> Progress<Self> {
        match m.step {
            ErrorStep::Opcode => match opcode_byte(&mut m.word, byte, &ERR_OPS) {
                OpcodeByte::Partial => {}
                OpcodeByte::Matched(_) => m.step = ErrorStep::Code,
                OpcodeByte::Mismatch => return Progress::Resync("not an error opcode"),
            },
            // the code has its own two bytes, never reuse the opcode here
            ErrorStep::Code => {
                if let Some(code) = m.word.push(byte) {
                    m.code = code;
                    m.step = ErrorStep::Message;
                }
            }
            ErrorStep::Message => {
                if byte != TERMINATOR {
                    m.err.push(byte);
                    return Progress::Pending;
                }
                return match ErrorPacket::new(m.code, std::mem::take(&mut m.err)) {
                    Ok(p) => Progress::Done(p),
                    Err(_) => Progress::Resync("unknown error code"),
                };
            }
        }

        Progress::Pending
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use byteorder::{NetworkEndian, WriteBytesExt};

    use crate::tftp::shared::err_packet::{ErrorPacket, TFTPError};
    use crate::tftp::shared::parser::{parse, ParseState, Parsed};
    use crate::tftp::shared::{Serializable, Violation, OP_ERR};

    #[test]
    fn serialize_err_packet() {
        let p = ErrorPacket::new(1, "File not found").unwrap();
        let mut serialized = vec![0, 5, 0, 1];
        serialized.extend_from_slice(b"File not found");
        serialized.push(0);

        let mut buf = Vec::new();
        assert_eq!(p.serialize_into(&mut buf), 19);
        assert_eq!(buf, serialized);
    }

    #[test]
    fn serialize_standard_error() {
        let p = ErrorPacket::from_error(TFTPError::IllegalOperation);
        let mut serialized = vec![0, 5, 0, 4];
        serialized.extend_from_slice(b"Illegal TFTP operation.\0");

        assert_eq!(p.serialize(), serialized);
        assert_eq!(p.kind(), Some(TFTPError::IllegalOperation));
    }

    #[test]
    fn deserialize_err_packet() {
        let mut buf = Vec::new();
        buf.write_u16::<NetworkEndian>(OP_ERR).unwrap();
        buf.write_u16::<NetworkEndian>(5).unwrap();
        buf.write_all(b"error message\0").unwrap();

        if let Parsed::Complete { packet: p, consumed } = parse::<ErrorPacket>(&buf) {
            assert_eq!(p.code(), 5);
            assert_eq!(p.err(), b"error message");
            assert_eq!(consumed, buf.len());
        } else {
            panic!("Invalid type")
        }
    }

    #[test]
    fn code_comes_from_its_own_bytes() {
        // opcode 5, code 2: a decoder that confused the two would report 5
        let p = parse::<ErrorPacket>(&[0, 5, 0, 2, b'x', 0]).into_packet().unwrap();
        assert_eq!(p.code(), 2);
    }

    #[test]
    fn message_split_across_calls() {
        let mut state = ParseState::<ErrorPacket>::new();
        assert!(!state.feed(&[0, 5, 0]).is_complete());
        assert!(!state.feed(&[3, b'D', b'i']).is_complete());
        assert_eq!(
            state.feed(b"sk full\0trailing"),
            Parsed::Complete {
                packet: ErrorPacket::new(3, "Disk full").unwrap(),
                consumed: 8
            }
        );
    }

    #[test]
    fn deserialize_error_resynchronizes() {
        let mut buf = Vec::new();
        let bad_op = OP_ERR + 1;
        buf.write_u16::<NetworkEndian>(bad_op).unwrap();
        buf.write_u16::<NetworkEndian>(5).unwrap();
        buf.write_all(b"error message\0").unwrap();

        assert!(!parse::<ErrorPacket>(&buf).is_complete());
    }

    #[test]
    fn rejects_out_of_range_code() {
        let err = ErrorPacket::new(9, "nope").unwrap_err();
        assert_eq!(err.field, "code");
        assert_eq!(err.reason, Violation::OutOfRange(9));

        assert!(!parse::<ErrorPacket>(&[0, 5, 0, 9, b'x', 0]).is_complete());
    }

    #[test]
    fn rejects_embedded_terminator() {
        let err = ErrorPacket::new(0, "bad\0message").unwrap_err();
        assert_eq!(err.field, "message");
    }
}
