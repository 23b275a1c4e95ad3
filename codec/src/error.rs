//! Error types for codec operations.

use std::fmt;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while moving snapshot data in or out of a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Bitstream error (buffer overflow on write, end of buffer on read).
    Bitstream(bitstream::BitError),

    /// A record or value list does not match the type's field count.
    FieldCountMismatch { expected: usize, actual: usize },

    /// A live value does not match the codec of its field.
    ValueKindMismatch { field: usize },

    /// A decoded change mask sets bits past the type's last group.
    InvalidChangeMask { mask: u32, groups: usize },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bitstream(err) => write!(f, "bitstream error: {err}"),
            Self::FieldCountMismatch { expected, actual } => {
                write!(f, "expected {expected} field values, got {actual}")
            }
            Self::ValueKindMismatch { field } => {
                write!(f, "value for field {field} does not match its codec")
            }
            Self::InvalidChangeMask { mask, groups } => {
                write!(f, "change mask {mask:#x} exceeds {groups} groups")
            }
        }
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Bitstream(err) => Some(err),
            _ => None,
        }
    }
}

impl From<bitstream::BitError> for CodecError {
    fn from(err: bitstream::BitError) -> Self {
        Self::Bitstream(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_mask_error() {
        let err = CodecError::InvalidChangeMask {
            mask: 0x10,
            groups: 3,
        };
        assert_eq!(err.to_string(), "change mask 0x10 exceeds 3 groups");
    }

    #[test]
    fn wraps_bitstream_error() {
        let err: CodecError = bitstream::BitError::EndOfBuffer {
            requested: 4,
            available: 1,
        }
        .into();
        assert!(matches!(err, CodecError::Bitstream(_)));
        assert!(std::error::Error::source(&err).is_some());
    }
}
