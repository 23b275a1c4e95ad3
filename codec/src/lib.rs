//! Snapshot records, delta prediction and tick-indexed history for ghostline.
//!
//! This crate ties the bitstream and the ghost registry together:
//!
//! - [`SnapshotData`]: one ghost's quantized state for one tick, with
//!   serialize, deserialize, predict and interpolate operations driven by
//!   the type's field table
//! - [`DeltaPredictor`]: fixed-point three-baseline extrapolation
//! - [`TickHistory`]: small per-entity ring keyed by wrapping ticks
//! - [`CommandBuffer`]: the same ring for input records
//! - [`AckState`]: who received what, and round-trip estimation
//!
//! # Design Principles
//!
//! - **Bit-exact on both ends** - Prediction is integer-only so sender and receiver agree.
//! - **Fill from baseline** - Decoding always yields a fully populated record.
//! - **Wraparound-safe ticks** - Ticks compare by signed difference, never by value.
//!
//! # Example
//!
//! ```
//! use bitstream::{BitReader, BitWriter, CompressionModel};
//! use codec::{SnapshotData, Tick};
//! use schema::{FieldDef, GhostTypeDef};
//!
//! let ty = GhostTypeDef::new("Asteroid")
//!     .field(FieldDef::quantized("x", 100))
//!     .grouped(FieldDef::quantized("y", 100));
//! let model = CompressionModel::default();
//! let baseline = SnapshotData::new(Tick::new(1), vec![1234, 5678]);
//! let current = SnapshotData::new(Tick::new(2), vec![1244, 5678]);
//!
//! let mut writer = BitWriter::new(64);
//! current.serialize(&ty, &baseline, &mut writer, &model).unwrap();
//! let bytes = writer.finish();
//!
//! let mut reader = BitReader::new(&bytes);
//! let decoded = SnapshotData::deserialize(&ty, Tick::new(2), &baseline, &mut reader, &model).unwrap();
//! assert_eq!(decoded.values, current.values);
//! ```

mod ack;
mod command;
mod error;
mod history;
mod predictor;
mod snapshot;
mod types;
mod value;

pub use ack::{AckState, REMOTE_ACK_WINDOW};
pub use command::{CommandBuffer, CommandData};
pub use error::{CodecError, CodecResult};
pub use history::{TickHistory, Ticked, DEFAULT_HISTORY_CAPACITY};
pub use predictor::DeltaPredictor;
pub use snapshot::SnapshotData;
pub use types::{GhostId, Tick};
pub use value::{
    decode_rotation, dequantize, dequantize_value, encode_rotation, quantize, quantize_value,
    FieldValue, Quat,
};
