//! Low-level bit packing primitives for ghostline.
//!
//! This crate provides [`BitWriter`] and [`BitReader`] for LSB-first bit-level
//! encoding and decoding, plus the [`CompressionModel`] used to pack integers
//! into a few bits when they are small.
//!
//! # Design Principles
//!
//! - **No unsafe code** - Safety is paramount.
//! - **Bounded operations** - Writers have a fixed capacity and all reads are bounds-checked.
//! - **All-or-nothing writes** - A write that does not fit fails and leaves the stream intact.
//! - **No domain knowledge** - This crate knows nothing about ghosts, ticks, or game state.
//!
//! # Example
//!
//! ```
//! use bitstream::{BitReader, BitWriter, CompressionModel};
//!
//! let model = CompressionModel::default();
//! let mut writer = BitWriter::new(16);
//! writer.write_bool(true).unwrap();
//! writer.write_packed_int_delta(1005, 1000, &model).unwrap();
//!
//! let bytes = writer.finish();
//!
//! let mut reader = BitReader::new(&bytes);
//! assert!(reader.read_bool().unwrap());
//! assert_eq!(reader.read_packed_int_delta(1000, &model).unwrap(), 1005);
//! ```

mod error;
mod model;
mod reader;
mod writer;

pub use error::{BitError, BitResult};
pub use model::{
    zigzag_decode, zigzag_encode, CompressionModel, PrefixCode, BUCKET_COUNT, BUCKET_OFFSETS,
    BUCKET_SIZES, DEFAULT_CODE_LENGTHS, MAX_CODE_LENGTH,
};
pub use reader::BitReader;
pub use writer::{BitMark, BitWriter};
