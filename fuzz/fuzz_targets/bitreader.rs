#![no_main]

use bitstream::{BitReader, CompressionModel};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let model = CompressionModel::default();
    let mut reader = BitReader::new(data);
    let mut idx = 0usize;

    // Use input bytes to drive a bounded sequence of operations.
    while idx < data.len() && idx < 1024 {
        let op = data[idx] % 8;
        idx += 1;

        match op {
            0 => {
                let _ = reader.read_bool();
            }
            1 => {
                let bits = u32::from(data[idx.saturating_sub(1)] % 32) + 1;
                let _ = reader.read_raw_bits(bits);
            }
            2 => {
                let _ = reader.align_to_byte();
            }
            3 => {
                let _ = reader.read_u32_be();
            }
            4 => {
                let _ = reader.read_packed_uint(&model);
            }
            5 => {
                let _ = reader.read_packed_int(&model);
            }
            6 => {
                let _ = reader.read_packed_int_delta(i32::from(data[idx - 1]), &model);
            }
            _ => {
                let _ = reader.peek_raw_bits(6);
            }
        }
    }
});
