#![no_main]

use bitstream::CompressionModel;
use codec::{CommandData, SnapshotData, Tick};
use libfuzzer_sys::fuzz_target;
use schema::{CommandLayout, FieldDef, GhostTypeDef};
use wire::{
    decode_command_header, decode_rpc_header, decode_snapshot_header, peek_message_kind, Limits,
    MessageKind,
};

fuzz_target!(|data: &[u8]| {
    let limits = Limits::for_testing();
    let model = CompressionModel::default();
    let Ok(kind) = peek_message_kind(data) else {
        return;
    };
    match kind {
        MessageKind::Snapshot => {
            let Ok((header, mut reader)) = decode_snapshot_header(data, &limits) else {
                return;
            };
            assert!(usize::from(header.update_count) <= limits.max_updates);
            let ty = GhostTypeDef::new("Rock")
                .field(FieldDef::int("state"))
                .field(FieldDef::quantized("x", 10))
                .grouped(FieldDef::quantized("y", 10));
            let zero = SnapshotData::zeroed(&ty, Tick::NONE);
            for _ in 0..header.update_count {
                if SnapshotData::deserialize(&ty, Tick::new(header.tick), &zero, &mut reader, &model)
                    .is_err()
                {
                    break;
                }
            }
        }
        MessageKind::Command => {
            let Ok((_, mut reader)) = decode_command_header(data, &limits) else {
                return;
            };
            let layout = CommandLayout::new("Input", ["left", "right", "thrust", "shoot"]).unwrap();
            if let Ok(command) = CommandData::deserialize(&layout, Tick::new(1), &mut reader, &model) {
                assert_eq!(command.values.len(), 4);
            }
        }
        MessageKind::Rpc => {
            if let Ok((count, _)) = decode_rpc_header(data, &model, &limits) {
                assert!(count <= limits.max_rpcs);
            }
        }
    }
});
