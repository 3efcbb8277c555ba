use clap::{Parser, Subcommand, ValueEnum};
use pretty_bytes::converter::convert;
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use tftp_wire::{
    AckPacket, DataPacket, Deserializable, ErrorPacket, Opcode, OptionAckPacket, ParseState,
    Parsed, RequestPacket, Serializable, TFTPError, TFTPPacket, ValidationError,
};

/// Builds TFTP packets and decodes captured bytes, without touching the network.
#[derive(Parser, Debug)]
#[command(name = "tftp-wire", version, author = "shakram02")]
struct Opts {
    #[command(subcommand)]
    subcmd: SubCommand,
}

#[derive(Subcommand, Debug)]
enum SubCommand {
    /// print the wire bytes of a packet.
    Encode {
        #[command(subcommand)]
        packet: PacketArgs,
    },
    /// decode hex bytes into packets.
    Decode(DecodeArgs),
}

#[derive(Subcommand, Debug)]
enum PacketArgs {
    /// read request.
    Rrq(RequestArgs),
    /// write request.
    Wrq(RequestArgs),
    /// data block, the payload is taken as text.
    Data {
        block: u16,
        #[arg(default_value = "")]
        payload: String,
    },
    /// acknowledgment.
    Ack { block: u16 },
    /// error; the standard message is used when none is given.
    Error { code: u16, message: Option<String> },
    /// option acknowledgment.
    Oack {
        /// option as name=value, may be repeated.
        #[arg(short = 'o', long = "option")]
        options: Vec<String>,
    },
}

#[derive(clap::Args, Debug)]
struct RequestArgs {
    /// name of the requested file.
    filename: String,
    /// transfer mode.
    #[arg(short = 'm', long = "mode", default_value = "octet")]
    mode: String,
    /// option as name=value, may be repeated; order is kept.
    #[arg(short = 'o', long = "option")]
    options: Vec<String>,
}

#[derive(clap::Args, Debug)]
struct DecodeArgs {
    /// packet bytes as hex, whitespace is ignored.
    hex: String,
    /// packet kind to look for.
    #[arg(short = 'k', long = "kind", value_enum, default_value = "any")]
    kind: Kind,
    /// feed the parser this many bytes per call.
    #[arg(short = 'c', long = "chunk", default_value = "512")]
    chunk: usize,
    /// treat the whole input as a single datagram so chunking can't end a packet early.
    #[arg(short = 'b', long = "bounded")]
    bounded: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Kind {
    Any,
    Request,
    Data,
    Ack,
    Error,
    Oack,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("invalid hex input: {0}")]
    Hex(String),
    #[error("option `{0}` is not in name=value form")]
    Option(String),
    #[error("chunk size must be at least one byte")]
    Chunk,
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(false).init();

    let opts: Opts = Opts::parse();
    let result = match opts.subcmd {
        SubCommand::Encode { packet } => encode(packet),
        SubCommand::Decode(args) => decode(args),
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn encode(args: PacketArgs) -> Result<(), CliError> {
    let packet: TFTPPacket = match args {
        PacketArgs::Rrq(req) => request(Opcode::ReadRequest, req)?.into(),
        PacketArgs::Wrq(req) => request(Opcode::WriteRequest, req)?.into(),
        PacketArgs::Data { block, payload } => DataPacket::new(block, payload)?.into(),
        PacketArgs::Ack { block } => AckPacket::new(block)?.into(),
        PacketArgs::Error { code, message } => match (message, TFTPError::from_code(code)) {
            (Some(msg), _) => ErrorPacket::new(code, msg)?.into(),
            (None, Some(err)) => ErrorPacket::from_error(err).into(),
            (None, None) => ErrorPacket::new(code, "")?.into(),
        },
        PacketArgs::Oack { options } => {
            let pairs = options
                .iter()
                .map(|o| split_option(o))
                .collect::<Result<Vec<_>, _>>()?;
            OptionAckPacket::from_pairs(pairs)?.into()
        }
    };

    let mut buf = Vec::new();
    let len = packet.serialize_into(&mut buf);
    info!("{}", packet);
    println!("{}", to_hex(&buf));
    println!("[{}]", convert(len as f64));
    Ok(())
}

fn request(op: Opcode, args: RequestArgs) -> Result<RequestPacket, CliError> {
    let mut p = RequestPacket::new(op, args.filename, args.mode)?;
    for opt in &args.options {
        let (name, value) = split_option(opt)?;
        p = p.with_option(name, value)?;
    }
    Ok(p)
}

fn split_option(opt: &str) -> Result<(String, String), CliError> {
    let mut parts = opt.splitn(2, '=');
    match (parts.next(), parts.next()) {
        (Some(name), Some(value)) if !name.is_empty() => {
            Ok((name.to_string(), value.to_string()))
        }
        _ => Err(CliError::Option(opt.to_string())),
    }
}

fn decode(args: DecodeArgs) -> Result<(), CliError> {
    if args.chunk == 0 {
        return Err(CliError::Chunk);
    }
    let bytes = from_hex(&args.hex)?;
    info!(
        "decoding [{}] in chunks of {}",
        convert(bytes.len() as f64),
        args.chunk
    );

    let found = match args.kind {
        Kind::Any => run_parser::<TFTPPacket>(&bytes, &args),
        Kind::Request => run_parser::<RequestPacket>(&bytes, &args),
        Kind::Data => run_parser::<DataPacket>(&bytes, &args),
        Kind::Ack => run_parser::<AckPacket>(&bytes, &args),
        Kind::Error => run_parser::<ErrorPacket>(&bytes, &args),
        Kind::Oack => run_parser::<OptionAckPacket>(&bytes, &args),
    };

    if found == 0 {
        println!("no complete packet");
    }
    Ok(())
}

/// Feeds `bytes` through the parser `chunk` bytes at a time, printing every
/// packet that completes. Returns how many did.
fn run_parser<P>(bytes: &[u8], args: &DecodeArgs) -> usize
where
    P: Deserializable + Into<TFTPPacket>,
{
    let fresh = |offset: usize| {
        if args.bounded {
            ParseState::<P>::with_datagram_len(bytes.len() - offset)
        } else {
            ParseState::<P>::new()
        }
    };

    let mut state = fresh(0);
    let mut offset = 0;
    let mut found = 0;
    while offset < bytes.len() {
        let end = usize::min(offset + args.chunk, bytes.len());
        match state.feed(&bytes[offset..end]) {
            Parsed::Complete { packet, consumed } => {
                offset += consumed;
                found += 1;
                let packet: TFTPPacket = packet.into();
                println!("{} (ends at byte {})", packet, offset);
                state = fresh(offset);
            }
            Parsed::Incomplete { consumed } => offset += consumed,
        }
    }
    found
}

fn to_hex(bytes: &[u8]) -> String {
    let digits: Vec<String> = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    digits.join(" ")
}

fn from_hex(input: &str) -> Result<Vec<u8>, CliError> {
    let digits: Vec<char> = input.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.is_empty() || digits.len() % 2 != 0 {
        return Err(CliError::Hex(format!("{} hex digits", digits.len())));
    }

    digits
        .chunks(2)
        .map(|pair| {
            let s: String = pair.iter().collect();
            u8::from_str_radix(&s, 16).map_err(|_| CliError::Hex(s))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let bytes = from_hex("00 04\n00ff").unwrap();
        assert_eq!(bytes, vec![0x00, 0x04, 0x00, 0xFF]);
        assert_eq!(to_hex(&bytes), "00 04 00 ff");
    }

    #[test]
    fn rejects_odd_hex() {
        assert!(matches!(from_hex("0"), Err(CliError::Hex(_))));
        assert!(matches!(from_hex("zz"), Err(CliError::Hex(_))));
    }

    #[test]
    fn splits_options() {
        assert_eq!(
            split_option("blksize=1428").unwrap(),
            ("blksize".to_string(), "1428".to_string())
        );
        assert_eq!(
            split_option("x=a=b").unwrap(),
            ("x".to_string(), "a=b".to_string())
        );
        assert!(split_option("novalue").is_err());
    }

    #[test]
    fn counts_back_to_back_packets() {
        let args = DecodeArgs {
            hex: String::new(),
            kind: Kind::Ack,
            chunk: 3,
            bounded: false,
        };
        let bytes = from_hex("0004 0001 0004 0002").unwrap();
        assert_eq!(run_parser::<AckPacket>(&bytes, &args), 2);
    }
}
