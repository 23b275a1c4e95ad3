//! Error types for the send, receive and RPC pipelines.

use std::fmt;

use bitstream::BitError;
use codec::{CodecError, GhostId, Tick};
use schema::GhostTypeId;
use wire::{DecodeError, EncodeError};

/// Result type for outgoing packets.
pub type SendResult<T> = Result<T, SendError>;

/// Result type for incoming packets.
pub type ReceiveResult<T> = Result<T, ReceiveError>;

/// Result type for RPC registration, queueing and dispatch.
pub type RpcResult<T> = Result<T, RpcError>;

/// Errors raised while building an outgoing packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// Framing failed, usually a budget too small for the header.
    Encode(EncodeError),
    /// A record did not match its type.
    Codec(CodecError),
    /// The byte budget cannot hold even an empty packet.
    BudgetTooSmall { budget: usize, required: usize },
    /// The written packet exceeds its budget.
    BudgetExceeded { written: usize, budget: usize },
    /// No ghost type registered under this id.
    UnknownGhostType { ty: GhostTypeId },
    /// No live ghost with this id.
    UnknownGhost { id: GhostId },
    /// The id space is exhausted.
    GhostIdsExhausted,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encode(err) => write!(f, "encode error: {err}"),
            Self::Codec(err) => write!(f, "codec error: {err}"),
            Self::BudgetTooSmall { budget, required } => {
                write!(f, "budget of {budget} bytes is below the {required} byte minimum")
            }
            Self::BudgetExceeded { written, budget } => {
                write!(f, "wrote {written} bytes into a {budget} byte budget")
            }
            Self::UnknownGhostType { ty } => write!(f, "unknown ghost type {}", ty.get()),
            Self::UnknownGhost { id } => write!(f, "unknown ghost {}", id.raw()),
            Self::GhostIdsExhausted => write!(f, "ghost ids exhausted"),
        }
    }
}

impl std::error::Error for SendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Encode(err) => Some(err),
            Self::Codec(err) => Some(err),
            _ => None,
        }
    }
}

impl From<EncodeError> for SendError {
    fn from(err: EncodeError) -> Self {
        Self::Encode(err)
    }
}

impl From<CodecError> for SendError {
    fn from(err: CodecError) -> Self {
        Self::Codec(err)
    }
}

impl From<BitError> for SendError {
    fn from(err: BitError) -> Self {
        Self::Encode(EncodeError::Bitstream(err))
    }
}

/// Errors raised while applying an incoming packet.
///
/// Every variant except [`ReceiveError::TooManyFaults`] leaves the receiver
/// usable; the packet is dropped whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveError {
    /// Header framing or limits.
    Decode(DecodeError),
    /// Body bits did not decode.
    Codec(CodecError),
    /// Type id outside the registered collection.
    UnknownGhostType { ty: u32 },
    /// A baseline tick the sender referenced is not in the local history.
    MissingBaseline { ghost: GhostId, tick: Tick },
    /// The same ghost appears twice in one snapshot.
    DuplicateGhost { ghost: GhostId },
    /// A delta update arrived for a ghost of another type.
    TypeMismatch {
        ghost: GhostId,
        expected: GhostTypeId,
        found: GhostTypeId,
    },
    /// Whole bytes left after the last record.
    TrailingData { bits: usize },
    /// A command packet arrived but no command layout is configured.
    MissingCommandLayout,
    /// Prediction was asked to replay further than it is allowed to.
    PredictionTooFar { ticks: u32, max: u32 },
    /// The connection exceeded its fault allowance and must be torn down.
    TooManyFaults { faults: u32 },
}

impl fmt::Display for ReceiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(err) => write!(f, "decode error: {err}"),
            Self::Codec(err) => write!(f, "codec error: {err}"),
            Self::UnknownGhostType { ty } => write!(f, "unknown ghost type {ty}"),
            Self::MissingBaseline { ghost, tick } => {
                write!(f, "ghost {} has no baseline at tick {}", ghost.raw(), tick.raw())
            }
            Self::DuplicateGhost { ghost } => {
                write!(f, "ghost {} appears twice in one snapshot", ghost.raw())
            }
            Self::TypeMismatch {
                ghost,
                expected,
                found,
            } => write!(
                f,
                "ghost {} is type {} but update is for type {}",
                ghost.raw(),
                expected.get(),
                found.get()
            ),
            Self::TrailingData { bits } => write!(f, "{bits} unread bits after snapshot body"),
            Self::MissingCommandLayout => write!(f, "no command layout configured"),
            Self::PredictionTooFar { ticks, max } => {
                write!(f, "prediction replay of {ticks} ticks exceeds {max}")
            }
            Self::TooManyFaults { faults } => {
                write!(f, "connection exceeded fault limit after {faults} faults")
            }
        }
    }
}

impl std::error::Error for ReceiveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Decode(err) => Some(err),
            Self::Codec(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DecodeError> for ReceiveError {
    fn from(err: DecodeError) -> Self {
        Self::Decode(err)
    }
}

impl From<CodecError> for ReceiveError {
    fn from(err: CodecError) -> Self {
        Self::Codec(err)
    }
}

impl From<BitError> for ReceiveError {
    fn from(err: BitError) -> Self {
        Self::Codec(CodecError::Bitstream(err))
    }
}

/// Errors raised by the RPC registry, queue and dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    Encode(EncodeError),
    Decode(DecodeError),
    /// A registered type with this name already exists.
    DuplicateRpc { name: &'static str },
    /// The RPC type was queued or sent without being registered.
    Unregistered { name: &'static str },
    /// An incoming id has no registered handler.
    UnknownRpc { id: u32 },
    /// More RPC types than the id space holds.
    TooManyRpcs,
    /// A handler refused the RPC.
    Rejected { name: &'static str, reason: String },
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encode(err) => write!(f, "encode error: {err}"),
            Self::Decode(err) => write!(f, "decode error: {err}"),
            Self::DuplicateRpc { name } => write!(f, "rpc {name} registered twice"),
            Self::Unregistered { name } => write!(f, "rpc {name} is not registered"),
            Self::UnknownRpc { id } => write!(f, "unknown rpc id {id}"),
            Self::TooManyRpcs => write!(f, "too many rpc types"),
            Self::Rejected { name, reason } => write!(f, "rpc {name} rejected: {reason}"),
        }
    }
}

impl std::error::Error for RpcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Encode(err) => Some(err),
            Self::Decode(err) => Some(err),
            _ => None,
        }
    }
}

impl From<EncodeError> for RpcError {
    fn from(err: EncodeError) -> Self {
        Self::Encode(err)
    }
}

impl From<DecodeError> for RpcError {
    fn from(err: DecodeError) -> Self {
        Self::Decode(err)
    }
}

impl From<BitError> for RpcError {
    fn from(err: BitError) -> Self {
        Self::Decode(DecodeError::Bitstream(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_error_display() {
        let err = SendError::BudgetTooSmall {
            budget: 10,
            required: 25,
        };
        assert!(err.to_string().contains("25"));
        let err = SendError::UnknownGhostType { ty: GhostTypeId(7) };
        assert!(err.to_string().contains('7'));
    }

    #[test]
    fn receive_error_display() {
        let err = ReceiveError::MissingBaseline {
            ghost: GhostId::new(4),
            tick: Tick::new(99),
        };
        let msg = err.to_string();
        assert!(msg.contains('4'));
        assert!(msg.contains("99"));
        let err = ReceiveError::TooManyFaults { faults: 8 };
        assert!(err.to_string().contains('8'));
    }

    #[test]
    fn rpc_error_display() {
        let err = RpcError::Rejected {
            name: "Handshake",
            reason: "hash mismatch".into(),
        };
        assert!(err.to_string().contains("hash mismatch"));
    }

    #[test]
    fn bit_errors_convert() {
        let bit = BitError::EndOfBuffer {
            requested: 8,
            available: 0,
        };
        assert!(matches!(
            ReceiveError::from(bit.clone()),
            ReceiveError::Codec(CodecError::Bitstream(_))
        ));
        assert!(matches!(
            SendError::from(bit),
            SendError::Encode(EncodeError::Bitstream(_))
        ));
    }
}
