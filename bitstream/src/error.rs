//! Error types for bitstream operations.

use std::fmt;

/// Result type for bitstream operations.
pub type BitResult<T> = Result<T, BitError>;

/// Errors that can occur during bit-level encoding/decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BitError {
    /// Attempted to read past the end of the buffer.
    EndOfBuffer {
        /// Number of bits requested.
        requested: usize,
        /// Number of bits available.
        available: usize,
    },

    /// Attempted to write more bits than the writer's fixed capacity.
    ///
    /// The writer is left exactly as it was before the failing call.
    BufferOverflow {
        /// Number of bits the buffer would hold after the write.
        attempted: usize,
        /// Maximum capacity in bits.
        capacity: usize,
    },

    /// Invalid bit count for the operation.
    InvalidBitCount {
        /// The invalid bit count provided.
        bits: u32,
        /// Maximum allowed bits for this operation.
        max_bits: u32,
    },

    /// Value exceeds the range representable by the specified number of bits.
    ValueOutOfRange {
        /// The value that was out of range.
        value: u32,
        /// Number of bits available.
        bits: u32,
    },

    /// Byte-aligned access attempted at a non byte-aligned position.
    MisalignedAccess {
        /// Current bit position.
        bit_position: usize,
    },

    /// The peeked bits do not start any prefix code of the model.
    InvalidPrefixCode {
        /// The peeked bits (LSB first).
        peeked: u32,
    },

    /// Prefix code lengths cannot form a decodable code.
    InvalidCodeLengths {
        /// Index of the offending symbol, if a single one is at fault.
        symbol: Option<usize>,
    },

    /// A patch targeted bytes that have not been written yet.
    PatchOutOfBounds {
        /// Byte offset of the patch.
        offset: usize,
        /// Length of the patch.
        len: usize,
        /// Bytes written so far.
        written: usize,
    },
}

impl fmt::Display for BitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EndOfBuffer {
                requested,
                available,
            } => {
                write!(
                    f,
                    "attempted to read {requested} bits but only {available} bits available"
                )
            }
            Self::BufferOverflow {
                attempted,
                capacity,
            } => {
                write!(
                    f,
                    "attempted to write up to bit {attempted} but buffer capacity is {capacity} bits"
                )
            }
            Self::InvalidBitCount { bits, max_bits } => {
                write!(f, "invalid bit count {bits}, maximum allowed is {max_bits}")
            }
            Self::ValueOutOfRange { value, bits } => {
                write!(f, "value {value} cannot be represented in {bits} bits")
            }
            Self::MisalignedAccess { bit_position } => {
                write!(f, "byte-aligned access at unaligned bit position {bit_position}")
            }
            Self::InvalidPrefixCode { peeked } => {
                write!(f, "no prefix code matches bits 0b{peeked:06b}")
            }
            Self::InvalidCodeLengths { symbol: Some(symbol) } => {
                write!(f, "invalid prefix code length for symbol {symbol}")
            }
            Self::InvalidCodeLengths { symbol: None } => {
                write!(f, "prefix code lengths oversubscribe the code space")
            }
            Self::PatchOutOfBounds {
                offset,
                len,
                written,
            } => {
                write!(
                    f,
                    "patch of {len} bytes at offset {offset} exceeds {written} written bytes"
                )
            }
        }
    }
}

impl std::error::Error for BitError {}
