use std::fmt;
use std::io;

/// Errors produced while decoding the byte-level wire formats this crate
/// understands (LLDP TLV chains, OpenFlow 1.0 messages).
///
/// These are always recoverable from the capture loop's point of view: the
/// correlator logs them at `debug!` and drops the offending event. Nothing
/// in this crate panics or aborts processing because of a malformed packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An LLDP TLV or OpenFlow field declared a length longer than the
    /// remaining buffer.
    Truncated,
    /// The OpenFlow header's `version` field was not `1`.
    BadVersion(u8),
    /// Fewer than 8 bytes were available for an OpenFlow header.
    TooShort,
    /// The Ethernet frame wasn't an LLDP nearest-bridge probe (wrong
    /// EtherType or destination MAC), or didn't carry the fields a SAVI-SDN
    /// probe needs.
    MalformedProbe(&'static str),
    /// A resource (capture device, log file) could not be opened.
    ResourceInit(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Truncated => write!(f, "declared length exceeds remaining buffer"),
            Error::BadVersion(v) => write!(f, "unsupported OpenFlow version {v} (expected 1)"),
            Error::TooShort => write!(f, "buffer too short for an OpenFlow header"),
            Error::MalformedProbe(why) => write!(f, "malformed SAVI-SDN probe: {why}"),
            Error::ResourceInit(what) => write!(f, "failed to initialize {what}"),
        }
    }
}

impl std::error::Error for Error {}

/// Top-level error returned by the capture loop and CLI, wrapping I/O
/// failures from the upstream capture source or the statistics log.
#[derive(Debug)]
pub enum Fatal {
    Io(io::Error),
    ResourceInit(String),
}

impl fmt::Display for Fatal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fatal::Io(e) => write!(f, "I/O error: {e}"),
            Fatal::ResourceInit(what) => write!(f, "failed to initialize {what}"),
        }
    }
}

impl std::error::Error for Fatal {}

impl From<io::Error> for Fatal {
    fn from(e: io::Error) -> Fatal {
        Fatal::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
