//! Introspection and debugging tools for ghostline captures.
//!
//! - Inspect a message: header, ack fields, and per-ghost record sizes
//! - Replay a directory of captured snapshots through a client receiver
//!
//! Captures are raw message files plus a `collection.json` manifest
//! ([`CaptureSchema`]) describing the ghost types they were encoded with.

mod inspect;
mod replay;

use serde::{Deserialize, Serialize};

use schema::{collection_hash, CommandLayout, GhostCollection, GhostTypeDef, SchemaResult};

pub use inspect::{
    format_inspect_pretty, inspect_message, AckReport, CommandReport, GhostRecordReport,
    InspectReport,
};
pub use replay::{format_replay_pretty, replay_snapshots, ReplayReport, ReplayStep};

/// Manifest written next to a capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureSchema {
    pub types: Vec<GhostTypeDef>,
    pub command: Option<CommandLayout>,
    /// Hex collection hash, for a quick sanity check against the peers.
    pub hash: String,
}

impl CaptureSchema {
    pub fn new(collection: &GhostCollection, command: Option<&CommandLayout>) -> Self {
        Self {
            types: collection.types().to_vec(),
            command: command.cloned(),
            hash: format!("{:016x}", collection_hash(collection, command)),
        }
    }

    /// Rebuilds and validates the collection.
    pub fn collection(&self) -> SchemaResult<GhostCollection> {
        GhostCollection::new(self.types.clone())
    }
}

#[cfg(test)]
mod tests {
    use schema::FieldDef;

    use super::*;

    #[test]
    fn manifest_round_trips_through_json() {
        let collection = GhostCollection::builder()
            .ghost(GhostTypeDef::new("Rock").field(FieldDef::quantized("x", 10)))
            .build()
            .unwrap();
        let layout = CommandLayout::new("Input", ["fire"]).unwrap();
        let manifest = CaptureSchema::new(&collection, Some(&layout));

        let json = serde_json::to_string(&manifest).unwrap();
        let back: CaptureSchema = serde_json::from_str(&json).unwrap();
        assert_eq!(back, manifest);
        assert_eq!(back.collection().unwrap(), collection);
        assert_eq!(
            back.hash,
            format!("{:016x}", collection_hash(&collection, Some(&layout)))
        );
    }
}
