//! Ghost type registry and field descriptors for ghostline.
//!
//! This crate describes what gets replicated, never how:
//! - Field codecs (plain integer, quantized float, single-axis rotation)
//! - Ghost type definitions with change-mask groups and send policy
//! - The validated [`GhostCollection`] indexed by dense [`GhostTypeId`]
//! - Command record layouts
//! - A deterministic collection hash for the connection handshake
//!
//! # Design Principles
//!
//! - **Runtime descriptors** - One generic serializer walks a field table; no per-type code.
//! - **Validated once** - A collection that builds is safe to index without further checks.
//! - **Deterministic hashing** - The hash is stable given the same definitions.

mod collection;
mod command;
mod error;
mod field;
mod hash;

pub use collection::{
    CollectionBuilder, GhostCollection, GhostTypeDef, GhostTypeId, MAX_FIELDS, MAX_GROUPS,
};
pub use command::{CommandLayout, MAX_COMMAND_FIELDS};
pub use error::{SchemaError, SchemaResult};
pub use field::{FieldCodec, FieldDef};
pub use hash::collection_hash;
