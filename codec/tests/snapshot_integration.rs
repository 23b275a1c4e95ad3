use std::num::NonZeroUsize;

use bitstream::{BitReader, BitWriter, CompressionModel};
use codec::{FieldValue, Quat, SnapshotData, Tick, TickHistory};
use schema::{FieldDef, GhostTypeDef};

fn asteroid() -> GhostTypeDef {
    GhostTypeDef::new("Asteroid")
        .field(FieldDef::axis_rotation("rotation", 1000))
        .field(FieldDef::quantized("translation_x", 100))
        .grouped(FieldDef::quantized("translation_y", 100))
}

fn live(x: f32, y: f32, degrees: f32) -> Vec<FieldValue> {
    vec![
        FieldValue::Rotation(Quat::from_rotation_z(degrees.to_radians())),
        FieldValue::Float(x),
        FieldValue::Float(y),
    ]
}

fn send(ty: &GhostTypeDef, record: &SnapshotData, baseline: &SnapshotData) -> Vec<u8> {
    let mut writer = BitWriter::new(64);
    record
        .serialize(ty, baseline, &mut writer, &CompressionModel::default())
        .unwrap();
    writer.finish()
}

fn receive(ty: &GhostTypeDef, tick: Tick, bytes: &[u8], baseline: &SnapshotData) -> SnapshotData {
    let mut reader = BitReader::new(bytes);
    SnapshotData::deserialize(ty, tick, baseline, &mut reader, &CompressionModel::default())
        .unwrap()
}

#[test]
fn integration_position_update_against_cached_baseline() {
    let ty = asteroid();
    let server_100 =
        SnapshotData::copy_to_snapshot(&ty, &live(12.34, 56.78, 0.0), Tick::new(100)).unwrap();
    let server_101 =
        SnapshotData::copy_to_snapshot(&ty, &live(12.44, 56.78, 0.0), Tick::new(101)).unwrap();

    // First send has no baseline.
    let zero = SnapshotData::zeroed(&ty, Tick::NONE);
    let client_100 = receive(&ty, Tick::new(100), &send(&ty, &server_100, &zero), &zero);
    assert_eq!(client_100.values, server_100.values);

    let client_101 = receive(
        &ty,
        Tick::new(101),
        &send(&ty, &server_101, &client_100),
        &client_100,
    );
    assert_eq!(client_101.change_mask, 0b10);

    let values = client_101.copy_from_snapshot(&ty).unwrap();
    assert!((values[1].as_float().unwrap() - 12.44).abs() <= 0.01);
    assert!((values[2].as_float().unwrap() - 56.78).abs() <= 0.01);
    assert!(values[0].as_rotation().unwrap().rotation_z().abs() < 0.01);
}

#[test]
fn integration_predicted_baseline_matches_on_both_sides() {
    let ty = asteroid();
    let capacity = NonZeroUsize::new(32).unwrap();
    let mut server_history = TickHistory::new(capacity);
    let mut client_history = TickHistory::new(capacity);

    // Uneven spacing, as after packet loss.
    let ticks = [10u32, 12, 13, 17];
    for (index, tick) in ticks.iter().enumerate() {
        let x = 1.0 + index as f32 * 0.75;
        let record = SnapshotData::copy_to_snapshot(
            &ty,
            &live(x, -x, 10.0 * index as f32),
            Tick::new(*tick),
        )
        .unwrap();

        let server_baselines: Vec<&SnapshotData> = server_history.iter().rev().take(3).collect();
        let server_base =
            SnapshotData::choose_baseline(&ty, Tick::new(*tick), &server_baselines).unwrap();
        let client_baselines: Vec<&SnapshotData> = client_history.iter().rev().take(3).collect();
        let client_base =
            SnapshotData::choose_baseline(&ty, Tick::new(*tick), &client_baselines).unwrap();
        assert_eq!(server_base, client_base);

        let bytes = send(&ty, &record, &server_base);
        let decoded = receive(&ty, Tick::new(*tick), &bytes, &client_base);
        assert_eq!(decoded.values, record.values);

        server_history.add_or_replace(record);
        client_history.add_or_replace(decoded);
    }
}

#[test]
fn integration_interpolates_between_received_ticks() {
    let ty = asteroid();
    let a = SnapshotData::copy_to_snapshot(&ty, &live(0.0, 0.0, 0.0), Tick::new(20)).unwrap();
    let b = SnapshotData::copy_to_snapshot(&ty, &live(2.0, 4.0, 90.0), Tick::new(22)).unwrap();

    let quarter = a.interpolate(&ty, &b, 0.25).unwrap();
    let values = quarter.copy_from_snapshot(&ty).unwrap();
    assert!((values[1].as_float().unwrap() - 0.5).abs() <= 0.01);
    assert!((values[2].as_float().unwrap() - 1.0).abs() <= 0.01);
    let angle = values[0].as_rotation().unwrap().rotation_z().to_degrees();
    assert!((angle - 22.5).abs() < 0.5, "{angle}");
}
