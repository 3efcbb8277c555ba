//! RRQ and WRQ packets share one layout: the opcode, a filename and a
//! transfer mode, both NUL-terminated, optionally followed by a list of
//! `name\0value\0` options (RFC 2347). The order of the options is kept
//! exactly as the caller gave it.
use crate::tftp::shared::options::{check_options, encode_options, OptionDecoder, OptionPair};
use crate::tftp::shared::parser::{opcode_byte, Deserializable, OpcodeByte, Progress};
use crate::tftp::shared::{
    check_text, put_text, put_u16, Opcode, Serializable, ValidationError, Violation, Word,
    TERMINATOR,
};

const REQUEST_OPS: [Opcode; 2] = [Opcode::ReadRequest, Opcode::WriteRequest];

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RequestPacket {
    op: Opcode,
    filename: Vec<u8>,
    mode: Vec<u8>,
    options: Vec<OptionPair>,
}

impl RequestPacket {
    pub fn new<F, M>(op: Opcode, filename: F, mode: M) -> Result<Self, ValidationError>
    where
        F: Into<Vec<u8>>,
        M: Into<Vec<u8>>,
    {
        Self::with_options(op, filename, mode, Vec::new())
    }

    pub fn with_options<F, M>(
        op: Opcode,
        filename: F,
        mode: M,
        options: Vec<OptionPair>,
    ) -> Result<Self, ValidationError>
    where
        F: Into<Vec<u8>>,
        M: Into<Vec<u8>>,
    {
        if !op.is_request() {
            return Err(ValidationError::new(
                op,
                "opcode",
                Violation::WrongOpcode(op.as_u16()),
            ));
        }

        let filename = filename.into();
        let mode = mode.into();
        check_text(op, "filename", &filename)?;
        check_text(op, "mode", &mode)?;
        check_options(
            op,
            options.iter().map(|(n, v)| (n.as_slice(), v.as_slice())),
        )?;

        Ok(RequestPacket {
            op,
            filename,
            mode,
            options,
        })
    }

    pub fn read<F: Into<Vec<u8>>, M: Into<Vec<u8>>>(
        filename: F,
        mode: M,
    ) -> Result<Self, ValidationError> {
        Self::new(Opcode::ReadRequest, filename, mode)
    }

    pub fn write<F: Into<Vec<u8>>, M: Into<Vec<u8>>>(
        filename: F,
        mode: M,
    ) -> Result<Self, ValidationError> {
        Self::new(Opcode::WriteRequest, filename, mode)
    }

    /// Appends an option after the ones already present.
    pub fn with_option<N, V>(mut self, name: N, value: V) -> Result<Self, ValidationError>
    where
        N: Into<Vec<u8>>,
        V: Into<Vec<u8>>,
    {
        let name = name.into();
        let value = value.into();
        check_text(self.op, "option name", &name)?;
        check_text(self.op, "option value", &value)?;
        self.options.push((name, value));
        Ok(self)
    }

    pub fn op(&self) -> Opcode {
        self.op
    }

    pub fn filename(&self) -> &[u8] {
        &self.filename
    }

    pub fn mode(&self) -> &[u8] {
        &self.mode
    }

    pub fn options(&self) -> &[OptionPair] {
        &self.options
    }

    /// Value of the first option called `name`, if any.
    pub fn option(&self, name: &[u8]) -> Option<&[u8]> {
        self.options
            .iter()
            .find(|(n, _)| n.as_slice() == name)
            .map(|(_, v)| v.as_slice())
    }
}

impl Serializable for RequestPacket {
    fn serialize_into(&self, buf: &mut Vec<u8>) -> usize {
        let start = buf.len();
        put_u16(buf, self.op.as_u16());
        put_text(buf, &self.filename);
        put_text(buf, &self.mode);
        encode_options(
            buf,
            self.options
                .iter()
                .map(|(n, v)| (n.as_slice(), v.as_slice())),
        );
        buf.len() - start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestStep {
    Opcode,
    Filename,
    Mode,
    Options,
}

impl Default for RequestStep {
    fn default() -> Self {
        RequestStep::Opcode
    }
}

#[derive(Debug, Clone, Default)]
pub struct RequestMachine {
    step: RequestStep,
    opcode: Word,
    op: Option<Opcode>,
    filename: Vec<u8>,
    mode: Vec<u8>,
    options: OptionDecoder,
}

impl RequestMachine {
    fn finish(&mut self) -> Progress<RequestPacket> {
        let op = match self.op {
            Some(op) => op,
            None => return Progress::Resync("request finished without an opcode"),
        };
        let options = std::mem::take(&mut self.options).into_pairs();
        match RequestPacket::with_options(
            op,
            std::mem::take(&mut self.filename),
            std::mem::take(&mut self.mode),
            options,
        ) {
            Ok(p) => Progress::Done(p),
            Err(_) => Progress::Resync("invalid request"),
        }
    }
}

impl Deserializable for RequestPacket {
    type Machine = RequestMachine;

    fn step(m: &mut RequestMachine, byte: u8, end_of_datagram: bool) -> Progress<Self> {
        match m.step {
            RequestStep::Opcode => match opcode_byte(&mut m.opcode, byte, &REQUEST_OPS) {
                OpcodeByte::Partial => {}
                OpcodeByte::Matched(op) => {
                    m.op = Some(op);
                    m.step = RequestStep::Filename;
                }
                OpcodeByte::Mismatch => return Progress::Resync("not a request opcode"),
            },
            RequestStep::Filename => {
                if byte == TERMINATOR {
                    m.step = RequestStep::Mode;
                } else {
                    m.filename.push(byte);
                }
            }
            RequestStep::Mode => {
                if byte == TERMINATOR {
                    if end_of_datagram {
                        return m.finish();
                    }
                    m.step = RequestStep::Options;
                } else {
                    m.mode.push(byte);
                }
            }
            RequestStep::Options => {
                if m.options.push(byte) && end_of_datagram {
                    return m.finish();
                }
            }
        }

        Progress::Pending
    }
}
