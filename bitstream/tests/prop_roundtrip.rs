use bitstream::{BitReader, BitWriter, CompressionModel};
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Op {
    Bool(bool),
    Raw { bits: u32, value: u32 },
    Packed(u32),
    PackedInt(i32),
    Delta { value: i32, baseline: i32 },
    Align,
    U8(u8),
    U16(u16),
    U32(u32),
}

fn mask_value(bits: u32, value: u32) -> u32 {
    if bits >= 32 {
        value
    } else {
        value & ((1u32 << bits) - 1)
    }
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        any::<bool>().prop_map(Op::Bool),
        (0u32..=32, any::<u32>()).prop_map(|(bits, value)| Op::Raw {
            bits,
            value: mask_value(bits, value),
        }),
        any::<u32>().prop_map(Op::Packed),
        (0u32..2000).prop_map(Op::Packed),
        any::<i32>().prop_map(Op::PackedInt),
        (any::<i32>(), any::<i32>()).prop_map(|(value, baseline)| Op::Delta { value, baseline }),
        Just(Op::Align),
        any::<u8>().prop_map(Op::U8),
        any::<u16>().prop_map(Op::U16),
        any::<u32>().prop_map(Op::U32),
    ]
}

// Every op fits in 64 bits, so 8 bytes per op is always enough.
fn write_ops(ops: &[Op], model: &CompressionModel) -> Vec<u8> {
    let mut writer = BitWriter::new(ops.len() * 8);
    for op in ops {
        apply(&mut writer, op, model);
    }
    writer.finish()
}

proptest! {
    #[test]
    fn prop_roundtrip_ops(ops in prop::collection::vec(op_strategy(), 1..64)) {
        let model = CompressionModel::default();
        let bytes = write_ops(&ops, &model);
        let mut reader = BitReader::new(&bytes);

        for op in &ops {
            match op {
                Op::Bool(b) => prop_assert_eq!(reader.read_bool().unwrap(), *b),
                Op::Raw { bits, value } => {
                    prop_assert_eq!(reader.read_raw_bits(*bits).unwrap(), *value);
                }
                Op::Packed(v) => prop_assert_eq!(reader.read_packed_uint(&model).unwrap(), *v),
                Op::PackedInt(v) => prop_assert_eq!(reader.read_packed_int(&model).unwrap(), *v),
                Op::Delta { value, baseline } => {
                    prop_assert_eq!(
                        reader.read_packed_int_delta(*baseline, &model).unwrap(),
                        *value
                    );
                }
                Op::Align => reader.align_to_byte().unwrap(),
                Op::U8(v) => {
                    reader.align_to_byte().unwrap();
                    prop_assert_eq!(reader.read_u8().unwrap(), *v);
                }
                Op::U16(v) => {
                    reader.align_to_byte().unwrap();
                    prop_assert_eq!(reader.read_u16_be().unwrap(), *v);
                }
                Op::U32(v) => {
                    reader.align_to_byte().unwrap();
                    prop_assert_eq!(reader.read_u32_be().unwrap(), *v);
                }
            }
        }
        prop_assert!(reader.bits_remaining() < 8);
    }

    #[test]
    fn prop_rewind_restores_prefix(
        prefix in prop::collection::vec(op_strategy(), 0..16),
        tail in prop::collection::vec(any::<u32>(), 1..16),
    ) {
        let model = CompressionModel::default();
        let expected = write_ops(&prefix, &model);

        let mut writer = BitWriter::new(prefix.len() * 8 + tail.len() * 8);
        for op in &prefix {
            apply(&mut writer, op, &model);
        }
        let mark = writer.mark();
        for value in &tail {
            writer.write_packed_uint(*value, &model).unwrap();
        }
        writer.rewind(mark);
        prop_assert_eq!(writer.finish(), expected);
    }

    #[test]
    fn prop_random_bytes_never_panic(data in prop::collection::vec(any::<u8>(), 0..64)) {
        let model = CompressionModel::default();
        let mut reader = BitReader::new(&data);
        while reader.read_packed_int(&model).is_ok() {}
    }
}

fn apply(writer: &mut BitWriter, op: &Op, model: &CompressionModel) {
    match op {
        Op::Bool(b) => writer.write_bool(*b).unwrap(),
        Op::Raw { bits, value } => writer.write_raw_bits(*value, *bits).unwrap(),
        Op::Packed(v) => writer.write_packed_uint(*v, model).unwrap(),
        Op::PackedInt(v) => writer.write_packed_int(*v, model).unwrap(),
        Op::Delta { value, baseline } => {
            writer.write_packed_int_delta(*value, *baseline, model).unwrap();
        }
        Op::Align => writer.align_to_byte().unwrap(),
        Op::U8(v) => {
            writer.align_to_byte().unwrap();
            writer.write_u8(*v).unwrap();
        }
        Op::U16(v) => {
            writer.align_to_byte().unwrap();
            writer.write_u16_be(*v).unwrap();
        }
        Op::U32(v) => {
            writer.align_to_byte().unwrap();
            writer.write_u32_be(*v).unwrap();
        }
    }
}
