//! Wire framing for ghost replication messages.
//!
//! This crate owns the byte-aligned part of every message: the kind
//! discriminant, the acknowledgement header, the snapshot counts, and the
//! limits a decoder enforces before looping over anything. Bodies are
//! bit-packed by higher layers; this crate only hands back a positioned
//! [`bitstream::BitReader`].
//!
//! # Design Principles
//!
//! - **Fixed headers** - Header fields are network byte order at fixed offsets.
//! - **Bounded decoding** - Counts are validated against [`Limits`] before iteration.
//! - **No domain knowledge** - Ghost types and field layouts live elsewhere.
//!
//! # Example
//!
//! ```
//! use bitstream::BitWriter;
//! use wire::{
//!     decode_snapshot_header, encode_snapshot_header, patch_snapshot_counts, AckHeader,
//!     Limits, SnapshotHeader,
//! };
//!
//! let mut writer = BitWriter::new(64);
//! encode_snapshot_header(&mut writer, &SnapshotHeader::new(AckHeader::default(), 9)).unwrap();
//! patch_snapshot_counts(&mut writer, 0, 0).unwrap();
//! let bytes = writer.finish();
//!
//! let (header, _body) = decode_snapshot_header(&bytes, &Limits::default()).unwrap();
//! assert_eq!(header.tick, 9);
//! ```

mod error;
mod header;
mod limits;
mod packet;

pub use error::{DecodeError, EncodeError, LimitKind, WireResult};
pub use header::{
    AckHeader, SnapshotHeader, ACK_HEADER_SIZE, COMMAND_HEADER_SIZE, SNAPSHOT_HEADER_SIZE,
};
pub use limits::Limits;
pub use packet::{
    decode_command_header, decode_rpc_header, decode_snapshot_header, encode_command_header,
    encode_rpc_header, encode_snapshot_header, patch_snapshot_counts, peek_message_kind,
    MessageKind, MAX_SNAPSHOT_COUNT,
};
