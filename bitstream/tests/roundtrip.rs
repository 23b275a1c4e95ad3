use bitstream::{BitError, BitReader, BitWriter, CompressionModel};

#[test]
fn header_then_packed_body_roundtrip() {
    let model = CompressionModel::default();
    let mut writer = BitWriter::new(32);
    writer.write_u8(1).unwrap();
    writer.write_u32_be(100).unwrap();
    writer.write_u16_be(0).unwrap();
    let baseline = [1234, 5678, 1000];
    let current = [1244, 5678, 1000];
    for (value, base) in current.iter().zip(baseline) {
        writer.write_packed_int_delta(*value, base, &model).unwrap();
    }
    writer.patch_u16_be(5, 3).unwrap();
    let bytes = writer.finish();

    let mut reader = BitReader::new(&bytes);
    assert_eq!(reader.read_u8().unwrap(), 1);
    assert_eq!(reader.read_u32_be().unwrap(), 100);
    assert_eq!(reader.read_u16_be().unwrap(), 3);
    for (value, base) in current.iter().zip(baseline) {
        assert_eq!(reader.read_packed_int_delta(base, &model).unwrap(), *value);
    }
}

#[test]
fn filling_to_capacity_never_exceeds_it() {
    let model = CompressionModel::default();
    let mut writer = BitWriter::new(10);
    let mut written = 0;
    let mut value = 0u32;
    loop {
        match writer.write_packed_uint(value, &model) {
            Ok(()) => written += 1,
            Err(BitError::BufferOverflow { capacity, .. }) => {
                assert_eq!(capacity, 80);
                break;
            }
            Err(other) => panic!("unexpected error {other}"),
        }
        value = value.wrapping_mul(7).wrapping_add(13);
    }
    assert!(written > 0);
    assert!(writer.bytes_written() <= 10);
    assert_eq!(writer.finish().len(), writer_len_for(written, &model));
}

fn writer_len_for(count: usize, model: &CompressionModel) -> usize {
    let mut bits = 0u32;
    let mut value = 0u32;
    for _ in 0..count {
        bits += model.packed_bits(value);
        value = value.wrapping_mul(7).wrapping_add(13);
    }
    bits.div_ceil(8) as usize
}
