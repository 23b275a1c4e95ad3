#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use replication::{GhostReceiver, ReplicationConfig};
use schema::{FieldDef, GhostCollection, GhostTypeDef};

fn collection() -> Arc<GhostCollection> {
    let collection = GhostCollection::builder()
        .ghost(
            GhostTypeDef::new("Mover")
                .field(FieldDef::int("state"))
                .field(FieldDef::axis_rotation("rotation", 1000))
                .field(FieldDef::quantized("x", 10))
                .grouped(FieldDef::quantized("y", 10)),
        )
        .ghost(GhostTypeDef::new("Marker").field(FieldDef::int("kind")))
        .build()
        .unwrap();
    Arc::new(collection)
}

fuzz_target!(|data: &[u8]| {
    let mut client = GhostReceiver::new(collection(), ReplicationConfig::for_testing());

    // Split the input into a sequence of snapshot frames so staging,
    // baselines and despawns get exercised across packets.
    let mut idx = 0usize;
    let mut now = 0u32;
    while idx < data.len() && idx < 8192 {
        let len = usize::from(data[idx]) + 1;
        idx += 1;
        let end = (idx + len).min(data.len());
        let frame = &data[idx..end];
        idx = end;
        now = now.wrapping_add(16);

        let before = client.len();
        if client.apply_incoming_snapshot(frame, now).is_err() {
            // A rejected packet never changes the ghost set.
            assert_eq!(client.len(), before);
        }
    }
});
