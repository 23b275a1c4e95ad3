use bitstream::BitWriter;
use proptest::prelude::*;
use wire::{
    decode_command_header, decode_rpc_header, decode_snapshot_header, encode_command_header,
    encode_snapshot_header, patch_snapshot_counts, AckHeader, Limits, SnapshotHeader,
};

fn ack_strategy() -> impl Strategy<Value = AckHeader> {
    (any::<u32>(), any::<u32>(), any::<u32>(), any::<u32>()).prop_map(
        |(last_received_tick, received_mask, local_time, returned_time)| AckHeader {
            last_received_tick,
            received_mask,
            local_time,
            returned_time,
        },
    )
}

proptest! {
    #[test]
    fn prop_snapshot_header_roundtrip(
        ack in ack_strategy(),
        tick in any::<u32>(),
        despawns in 0usize..32,
        updates in 0usize..64,
    ) {
        let mut writer = BitWriter::new(64);
        encode_snapshot_header(&mut writer, &SnapshotHeader::new(ack, tick)).unwrap();
        patch_snapshot_counts(&mut writer, despawns, updates).unwrap();
        let bytes = writer.finish();

        let (header, reader) = decode_snapshot_header(&bytes, &Limits::for_testing()).unwrap();
        prop_assert_eq!(header.ack, ack);
        prop_assert_eq!(header.tick, tick);
        prop_assert_eq!(usize::from(header.despawn_count), despawns);
        prop_assert_eq!(usize::from(header.update_count), updates);
        prop_assert!(reader.is_empty());
    }

    #[test]
    fn prop_command_header_roundtrip(ack in ack_strategy()) {
        let mut writer = BitWriter::new(32);
        encode_command_header(&mut writer, &ack).unwrap();
        let bytes = writer.finish();
        let (decoded, _) = decode_command_header(&bytes, &Limits::default()).unwrap();
        prop_assert_eq!(decoded, ack);
    }

    #[test]
    fn prop_random_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..128)) {
        let model = bitstream::CompressionModel::default();
        let limits = Limits::for_testing();
        let _ = decode_snapshot_header(&bytes, &limits);
        let _ = decode_command_header(&bytes, &limits);
        let _ = decode_rpc_header(&bytes, &model, &limits);
    }
}
