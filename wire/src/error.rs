//! Error types for wire format operations.

use std::fmt;

use bitstream::BitError;

use crate::packet::MessageKind;

/// Result type for wire format operations.
pub type WireResult<T> = Result<T, DecodeError>;

/// High-level decode errors for message framing.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DecodeError {
    /// Message is too small to contain the required header.
    PacketTooSmall { actual: usize, required: usize },

    /// First byte is not a known message kind.
    UnknownMessageKind { kind: u8 },

    /// Message kind does not match the decoder used.
    UnexpectedMessageKind {
        expected: MessageKind,
        found: MessageKind,
    },

    /// Limits exceeded.
    LimitsExceeded {
        kind: LimitKind,
        limit: usize,
        actual: usize,
    },

    /// Bit-level read failed.
    Bitstream(BitError),
}

/// Specific wire limits that can be exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    PacketBytes,
    Despawns,
    Updates,
    Rpcs,
}

/// Errors that can occur during encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Bit-level write failed (usually the packet budget).
    Bitstream(BitError),
    /// A count does not fit its header field.
    CountOverflow { kind: LimitKind, count: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PacketTooSmall { actual, required } => {
                write!(
                    f,
                    "packet too small: {actual} bytes, need at least {required}"
                )
            }
            Self::UnknownMessageKind { kind } => {
                write!(f, "unknown message kind: {kind}")
            }
            Self::UnexpectedMessageKind { expected, found } => {
                write!(f, "expected {expected:?} message, found {found:?}")
            }
            Self::LimitsExceeded {
                kind,
                limit,
                actual,
            } => {
                write!(f, "{kind} limit exceeded: {actual} > {limit}")
            }
            Self::Bitstream(err) => write!(f, "bitstream error: {err}"),
        }
    }
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PacketBytes => "packet bytes",
            Self::Despawns => "despawn count",
            Self::Updates => "update count",
            Self::Rpcs => "rpc count",
        };
        write!(f, "{name}")
    }
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bitstream(err) => write!(f, "bitstream error: {err}"),
            Self::CountOverflow { kind, count } => {
                write!(f, "{kind} {count} does not fit the header")
            }
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Bitstream(err) => Some(err),
            _ => None,
        }
    }
}

impl std::error::Error for EncodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Bitstream(err) => Some(err),
            Self::CountOverflow { .. } => None,
        }
    }
}

impl From<BitError> for DecodeError {
    fn from(err: BitError) -> Self {
        Self::Bitstream(err)
    }
}

impl From<BitError> for EncodeError {
    fn from(err: BitError) -> Self {
        Self::Bitstream(err)
    }
}
