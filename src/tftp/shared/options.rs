//! The `name\0value\0` list carried by option-extended requests and by OACK.
//!
//! Nothing on the wire says how many pairs follow, the section simply runs to
//! the end of the datagram. The decoder therefore only reports pair
//! boundaries and leaves it to the packet machine to decide when the
//! datagram is over.
use crate::tftp::shared::{check_text, put_text, Opcode, ValidationError, TERMINATOR};

/// A single negotiated option, name first.
pub type OptionPair = (Vec<u8>, Vec<u8>);

/// Appends each pair as `name\0value\0`, in iteration order, returning the
/// number of bytes written.
pub fn encode_options<'a, I>(buf: &mut Vec<u8>, pairs: I) -> usize
where
    I: IntoIterator<Item = (&'a [u8], &'a [u8])>,
{
    let start = buf.len();
    for (name, value) in pairs {
        put_text(buf, name);
        put_text(buf, value);
    }
    buf.len() - start
}

/// Checks that no name or value would be cut short by an embedded terminator.
pub(crate) fn check_options<'a, I>(kind: Opcode, pairs: I) -> Result<(), ValidationError>
where
    I: IntoIterator<Item = (&'a [u8], &'a [u8])>,
{
    for (name, value) in pairs {
        check_text(kind, "option name", name)?;
        check_text(kind, "option value", value)?;
    }
    Ok(())
}

/// Resumable decoder for the pair section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionDecoder {
    name: Vec<u8>,
    value: Vec<u8>,
    in_value: bool,
    pairs: Vec<OptionPair>,
}

impl OptionDecoder {
    /// Feeds one byte, returning `true` when it terminated a value and so
    /// closed a whole pair.
    pub fn push(&mut self, byte: u8) -> bool {
        match (self.in_value, byte) {
            (false, TERMINATOR) => {
                self.in_value = true;
                false
            }
            (false, _) => {
                self.name.push(byte);
                false
            }
            (true, TERMINATOR) => {
                let name = std::mem::take(&mut self.name);
                let value = std::mem::take(&mut self.value);
                self.pairs.push((name, value));
                self.in_value = false;
                true
            }
            (true, _) => {
                self.value.push(byte);
                false
            }
        }
    }

    /// Pairs closed so far, in wire order.
    pub fn pairs(&self) -> &[OptionPair] {
        &self.pairs
    }

    pub fn into_pairs(self) -> Vec<OptionPair> {
        self.pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_pairs_in_given_order() {
        let mut buf = vec![0xAA];
        let pairs = vec![(&b"tsize"[..], &b"0"[..]), (&b"blksize"[..], &b"1428"[..])];
        let written = encode_options(&mut buf, pairs);

        assert_eq!(written, 21);
        assert_eq!(&buf[..1], &[0xAA]);
        assert_eq!(&buf[1..], b"tsize\x000\x00blksize\x001428\x00");
    }

    #[test]
    fn decoder_reports_pair_boundaries() {
        let mut decoder = OptionDecoder::default();
        let wire = b"timeout\x005\x00mode\x00\x00";
        let mut boundaries = Vec::new();
        for (idx, &byte) in wire.iter().enumerate() {
            if decoder.push(byte) {
                boundaries.push(idx);
            }
        }

        assert_eq!(boundaries, vec![9, 15]);
        assert_eq!(
            decoder.into_pairs(),
            vec![
                (b"timeout".to_vec(), b"5".to_vec()),
                (b"mode".to_vec(), Vec::new())
            ]
        );
    }

    #[test]
    fn unterminated_pair_is_not_reported() {
        let mut decoder = OptionDecoder::default();
        for &b in b"blksize\x00512" {
            assert!(!decoder.push(b));
        }
        assert!(decoder.pairs().is_empty());
    }

    #[test]
    fn rejects_terminator_inside_option() {
        let pairs = vec![(&b"ok"[..], &b"1"[..]), (&b"bad\0name"[..], &b"2"[..])];
        let err = check_options(Opcode::OptionAcknowledgment, pairs).unwrap_err();
        assert_eq!(err.field, "option name");
    }
}
