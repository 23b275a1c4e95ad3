//! One ghost's quantized state for one tick.
//!
//! A single generic record walks the field table of its [`GhostTypeDef`];
//! there is no per-type code. Every operation takes the type definition
//! and checks the record length against it before touching the stream.

use bitstream::{BitReader, BitWriter, CompressionModel};
use schema::{FieldCodec, GhostTypeDef};

use crate::error::{CodecError, CodecResult};
use crate::history::Ticked;
use crate::predictor::DeltaPredictor;
use crate::value::{
    decode_rotation, dequantize, dequantize_value, encode_rotation, quantize, quantize_value,
    FieldValue,
};
use crate::Tick;

/// Quantized field slots of one ghost at one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotData {
    pub tick: Tick,
    pub values: Vec<i32>,
    /// Groups that differed from the baseline this record was decoded
    /// against (or serialized against, on the sender).
    pub change_mask: u32,
}

impl Ticked for SnapshotData {
    fn tick(&self) -> Tick {
        self.tick
    }
}

fn check_len(ty: &GhostTypeDef, actual: usize) -> CodecResult<()> {
    let expected = ty.field_count();
    if actual != expected {
        return Err(CodecError::FieldCountMismatch { expected, actual });
    }
    Ok(())
}

fn group_bit(group: u8) -> u32 {
    1u32.checked_shl(u32::from(group)).unwrap_or(0)
}

impl SnapshotData {
    /// Creates a record from already quantized values.
    #[must_use]
    pub fn new(tick: Tick, values: Vec<i32>) -> Self {
        Self {
            tick,
            values,
            change_mask: 0,
        }
    }

    /// The all-zero record used as the baseline for a ghost's first send.
    #[must_use]
    pub fn zeroed(ty: &GhostTypeDef, tick: Tick) -> Self {
        Self::new(tick, vec![0; ty.field_count()])
    }

    /// Quantizes live values into a record.
    pub fn copy_to_snapshot(ty: &GhostTypeDef, values: &[FieldValue], tick: Tick) -> CodecResult<Self> {
        check_len(ty, values.len())?;
        let quantized = ty
            .fields
            .iter()
            .zip(values)
            .enumerate()
            .map(|(index, (field, value))| {
                quantize_value(field.codec, *value)
                    .ok_or(CodecError::ValueKindMismatch { field: index })
            })
            .collect::<CodecResult<Vec<_>>>()?;
        Ok(Self::new(tick, quantized))
    }

    /// Dequantizes the record back into live values.
    pub fn copy_from_snapshot(&self, ty: &GhostTypeDef) -> CodecResult<Vec<FieldValue>> {
        check_len(ty, self.values.len())?;
        Ok(ty
            .fields
            .iter()
            .zip(&self.values)
            .map(|(field, value)| dequantize_value(field.codec, *value))
            .collect())
    }

    /// Mask of groups whose values differ from `baseline`.
    pub fn change_mask_against(&self, ty: &GhostTypeDef, baseline: &[i32]) -> CodecResult<u32> {
        check_len(ty, self.values.len())?;
        check_len(ty, baseline.len())?;
        Ok(ty
            .fields
            .iter()
            .zip(self.values.iter().zip(baseline))
            .filter(|(_, (value, base))| value != base)
            .fold(0, |mask, (field, _)| mask | group_bit(field.group)))
    }

    /// Extrapolates this record (the newest baseline) towards `target`
    /// using two older baselines.
    ///
    /// The result is only a compression baseline and never game state.
    /// Sender and receiver must call this with identical inputs.
    pub fn predict_delta(
        &self,
        ty: &GhostTypeDef,
        target: Tick,
        baseline1: &Self,
        baseline2: &Self,
    ) -> CodecResult<Self> {
        check_len(ty, self.values.len())?;
        check_len(ty, baseline1.values.len())?;
        check_len(ty, baseline2.values.len())?;
        let predictor = DeltaPredictor::new(target, self.tick, baseline1.tick, baseline2.tick);
        let values = self
            .values
            .iter()
            .zip(&baseline1.values)
            .zip(&baseline2.values)
            .map(|((v0, v1), v2)| predictor.predict(*v0, *v1, *v2))
            .collect();
        Ok(Self::new(self.tick, values))
    }

    /// Writes the change mask, then one packed delta per field in a
    /// changed group. Returns the mask.
    ///
    /// On a write error the caller is expected to rewind the writer.
    pub fn serialize(
        &self,
        ty: &GhostTypeDef,
        baseline: &Self,
        writer: &mut BitWriter,
        model: &CompressionModel,
    ) -> CodecResult<u32> {
        let mask = self.change_mask_against(ty, &baseline.values)?;
        writer.write_packed_uint(mask, model)?;
        for ((field, value), base) in ty.fields.iter().zip(&self.values).zip(&baseline.values) {
            if mask & group_bit(field.group) != 0 {
                writer.write_packed_int_delta(*value, *base, model)?;
            }
        }
        Ok(mask)
    }

    /// Reads a record for `tick` against `baseline`.
    ///
    /// Fields outside the decoded mask are copied from the baseline, so the
    /// result is always fully populated.
    pub fn deserialize(
        ty: &GhostTypeDef,
        tick: Tick,
        baseline: &Self,
        reader: &mut BitReader<'_>,
        model: &CompressionModel,
    ) -> CodecResult<Self> {
        check_len(ty, baseline.values.len())?;
        let mask = reader.read_packed_uint(model)?;
        let groups = ty.group_count();
        if groups < 32 && mask >> groups != 0 {
            return Err(CodecError::InvalidChangeMask { mask, groups });
        }

        let mut values = Vec::with_capacity(baseline.values.len());
        for (field, base) in ty.fields.iter().zip(&baseline.values) {
            if mask & group_bit(field.group) != 0 {
                values.push(reader.read_packed_int_delta(*base, model)?);
            } else {
                values.push(*base);
            }
        }
        Ok(Self {
            tick,
            values,
            change_mask: mask,
        })
    }

    /// Blends towards `target` for presentation.
    ///
    /// Quantized fields lerp, rotations slerp, and integers step: they keep
    /// this record's value until `factor` reaches 1. `factor` is clamped
    /// to `[0, 1]`.
    pub fn interpolate(&self, ty: &GhostTypeDef, target: &Self, factor: f32) -> CodecResult<Self> {
        check_len(ty, self.values.len())?;
        check_len(ty, target.values.len())?;
        let factor = factor.clamp(0.0, 1.0);
        let values = ty
            .fields
            .iter()
            .zip(self.values.iter().zip(&target.values))
            .map(|(field, (from, to))| match field.codec {
                FieldCodec::Int => {
                    if factor >= 1.0 {
                        *to
                    } else {
                        *from
                    }
                }
                FieldCodec::Quantized { scale } => {
                    let a = dequantize(*from, scale);
                    let b = dequantize(*to, scale);
                    quantize(a + (b - a) * factor, scale)
                }
                FieldCodec::AxisRotation { scale } => {
                    let a = decode_rotation(*from, scale);
                    let b = decode_rotation(*to, scale);
                    encode_rotation(a.slerp(b, factor), scale)
                }
            })
            .collect();
        Ok(Self::new(self.tick, values))
    }

    /// Selects the baseline to delta against from up to three acknowledged
    /// baselines (newest first): the predicted baseline when three are
    /// available and the type allows it, otherwise the newest one, otherwise
    /// the all-zero record.
    pub fn choose_baseline(
        ty: &GhostTypeDef,
        target: Tick,
        baselines: &[&Self],
    ) -> CodecResult<Self> {
        match baselines {
            [b0, b1, b2, ..] if ty.predict_delta => b0.predict_delta(ty, target, b1, b2),
            [b0, ..] => {
                check_len(ty, b0.values.len())?;
                Ok(Self::new(b0.tick, b0.values.clone()))
            }
            [] => Ok(Self::zeroed(ty, Tick::NONE)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Quat;
    use schema::FieldDef;

    fn ship() -> GhostTypeDef {
        GhostTypeDef::new("Ship")
            .field(FieldDef::int("player_id"))
            .field(FieldDef::axis_rotation("rotation", 1000))
            .field(FieldDef::quantized("translation_x", 100))
            .grouped(FieldDef::quantized("translation_y", 100))
    }

    fn encode(ty: &GhostTypeDef, record: &SnapshotData, baseline: &SnapshotData) -> (Vec<u8>, usize, u32) {
        let model = CompressionModel::default();
        let mut writer = BitWriter::new(256);
        let mask = record.serialize(ty, baseline, &mut writer, &model).unwrap();
        let bits = writer.bits_written();
        (writer.finish(), bits, mask)
    }

    fn decode(ty: &GhostTypeDef, tick: Tick, bytes: &[u8], baseline: &SnapshotData) -> SnapshotData {
        let mut reader = BitReader::new(bytes);
        SnapshotData::deserialize(ty, tick, baseline, &mut reader, &CompressionModel::default())
            .unwrap()
    }

    #[test]
    fn roundtrip_all_fields_changed() {
        let ty = ship();
        let baseline = SnapshotData::new(Tick::new(1), vec![1, 2, 3, 4]);
        let record = SnapshotData::new(Tick::new(2), vec![-7, 999, 123_456, i32::MIN]);
        let (bytes, _, mask) = encode(&ty, &record, &baseline);
        assert_eq!(mask, 0b111);
        let decoded = decode(&ty, Tick::new(2), &bytes, &baseline);
        assert_eq!(decoded.values, record.values);
        assert_eq!(decoded.change_mask, 0b111);
    }

    #[test]
    fn identical_record_costs_only_the_mask() {
        let ty = ship();
        let record = SnapshotData::new(Tick::new(5), vec![3, 1000, 1234, 5678]);
        let (bytes, bits, mask) = encode(&ty, &record, &record);
        let model = CompressionModel::default();
        assert_eq!(mask, 0);
        assert_eq!(bits, model.packed_bits(0) as usize);

        let decoded = decode(&ty, Tick::new(6), &bytes, &record);
        assert_eq!(decoded.values, record.values);
        assert_eq!(decoded.tick, Tick::new(6));
    }

    #[test]
    fn unchanged_fields_copied_from_baseline() {
        let ty = ship();
        let baseline = SnapshotData::new(Tick::new(1), vec![9, 8, 7, 6]);
        let record = SnapshotData::new(Tick::new(2), vec![9, 8, 70, 6]);
        let (bytes, _, mask) = encode(&ty, &record, &baseline);
        assert_eq!(mask, 0b100);
        let decoded = decode(&ty, Tick::new(2), &bytes, &baseline);
        assert_eq!(decoded.values, vec![9, 8, 70, 6]);
    }

    #[test]
    fn deserialize_rejects_mask_past_last_group() {
        let ty = ship();
        let model = CompressionModel::default();
        let mut writer = BitWriter::new(16);
        writer.write_packed_uint(0b1000, &model).unwrap();
        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes);
        let err = SnapshotData::deserialize(
            &ty,
            Tick::new(1),
            &SnapshotData::zeroed(&ty, Tick::NONE),
            &mut reader,
            &model,
        )
        .unwrap_err();
        assert!(matches!(err, CodecError::InvalidChangeMask { mask: 8, groups: 3 }));
    }

    #[test]
    fn deserialize_truncated_body_errors() {
        let ty = ship();
        let baseline = SnapshotData::zeroed(&ty, Tick::NONE);
        let record = SnapshotData::new(Tick::new(2), vec![100_000, 200_000, 300_000, 400_000]);
        let (bytes, _, _) = encode(&ty, &record, &baseline);
        let mut reader = BitReader::new(&bytes[..bytes.len() / 2]);
        let result = SnapshotData::deserialize(
            &ty,
            Tick::new(2),
            &baseline,
            &mut reader,
            &CompressionModel::default(),
        );
        assert!(matches!(result, Err(CodecError::Bitstream(_))));
    }

    #[test]
    fn serialize_rejects_layout_mismatch() {
        let ty = ship();
        let record = SnapshotData::new(Tick::new(1), vec![1, 2]);
        let mut writer = BitWriter::new(16);
        let err = record
            .serialize(
                &ty,
                &SnapshotData::zeroed(&ty, Tick::NONE),
                &mut writer,
                &CompressionModel::default(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            CodecError::FieldCountMismatch {
                expected: 4,
                actual: 2
            }
        ));
    }

    #[test]
    fn copy_roundtrip_within_quantization() {
        let ty = ship();
        let values = [
            FieldValue::Int(2),
            FieldValue::Rotation(Quat::from_rotation_z(0.75)),
            FieldValue::Float(12.34),
            FieldValue::Float(-56.78),
        ];
        let record = SnapshotData::copy_to_snapshot(&ty, &values, Tick::new(3)).unwrap();
        assert_eq!(record.values[2], 1234);
        assert_eq!(record.values[3], -5678);

        let live = record.copy_from_snapshot(&ty).unwrap();
        assert_eq!(live[0], FieldValue::Int(2));
        let angle = live[1].as_rotation().unwrap().rotation_z();
        assert!((angle - 0.75).abs() < 0.01);
        assert!((live[2].as_float().unwrap() - 12.34).abs() <= 0.01);
        assert!((live[3].as_float().unwrap() + 56.78).abs() <= 0.01);
    }

    #[test]
    fn copy_rejects_wrong_kind() {
        let ty = ship();
        let values = [
            FieldValue::Float(1.0),
            FieldValue::Rotation(Quat::IDENTITY),
            FieldValue::Float(0.0),
            FieldValue::Float(0.0),
        ];
        let err = SnapshotData::copy_to_snapshot(&ty, &values, Tick::new(1)).unwrap_err();
        assert_eq!(err, CodecError::ValueKindMismatch { field: 0 });
    }

    #[test]
    fn interpolate_per_codec() {
        let ty = ship();
        let from = SnapshotData::copy_to_snapshot(
            &ty,
            &[
                FieldValue::Int(1),
                FieldValue::Rotation(Quat::from_rotation_z(0.0)),
                FieldValue::Float(0.0),
                FieldValue::Float(10.0),
            ],
            Tick::new(10),
        )
        .unwrap();
        let to = SnapshotData::copy_to_snapshot(
            &ty,
            &[
                FieldValue::Int(2),
                FieldValue::Rotation(Quat::from_rotation_z(1.0)),
                FieldValue::Float(4.0),
                FieldValue::Float(20.0),
            ],
            Tick::new(11),
        )
        .unwrap();

        let mid = from.interpolate(&ty, &to, 0.5).unwrap();
        let live = mid.copy_from_snapshot(&ty).unwrap();
        assert_eq!(live[0], FieldValue::Int(1));
        assert!((live[1].as_rotation().unwrap().rotation_z() - 0.5).abs() < 0.01);
        assert!((live[2].as_float().unwrap() - 2.0).abs() <= 0.01);
        assert!((live[3].as_float().unwrap() - 15.0).abs() <= 0.01);

        assert_eq!(from.interpolate(&ty, &to, 0.0).unwrap().values, from.values);
        assert_eq!(from.interpolate(&ty, &to, 1.0).unwrap().values, to.values);
        assert_eq!(from.interpolate(&ty, &to, 7.0).unwrap().values, to.values);
    }

    #[test]
    fn predicted_baseline_shrinks_linear_motion() {
        let ty = GhostTypeDef::new("Mover").field(FieldDef::quantized("x", 100));
        let b2 = SnapshotData::new(Tick::new(8), vec![1000]);
        let b1 = SnapshotData::new(Tick::new(9), vec![1100]);
        let b0 = SnapshotData::new(Tick::new(10), vec![1200]);
        let record = SnapshotData::new(Tick::new(11), vec![1300]);

        let predicted = SnapshotData::choose_baseline(&ty, Tick::new(11), &[&b0, &b1, &b2]).unwrap();
        assert_eq!(predicted.values, vec![1300]);
        let (_, predicted_bits, mask) = encode(&ty, &record, &predicted);
        assert_eq!(mask, 0);

        let plain = SnapshotData::choose_baseline(&ty, Tick::new(11), &[&b0]).unwrap();
        let (_, plain_bits, _) = encode(&ty, &record, &plain);
        assert!(predicted_bits < plain_bits);
    }

    #[test]
    fn choose_baseline_respects_type_flag() {
        let ty = GhostTypeDef::new("Mover")
            .field(FieldDef::quantized("x", 100))
            .predict_delta(false);
        let b2 = SnapshotData::new(Tick::new(8), vec![1000]);
        let b1 = SnapshotData::new(Tick::new(9), vec![1100]);
        let b0 = SnapshotData::new(Tick::new(10), vec![1200]);
        let chosen = SnapshotData::choose_baseline(&ty, Tick::new(11), &[&b0, &b1, &b2]).unwrap();
        assert_eq!(chosen.values, vec![1200]);

        let none = SnapshotData::choose_baseline(&ty, Tick::new(11), &[]).unwrap();
        assert_eq!(none.values, vec![0]);
    }
}
