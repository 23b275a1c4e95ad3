//! Bit-level reader with bounded operations.

use crate::error::{BitError, BitResult};
use crate::model::{zigzag_decode, CompressionModel, BUCKET_OFFSETS, BUCKET_SIZES, MAX_CODE_LENGTH};

/// A bit-level reader for decoding packed binary data.
///
/// All read operations are bounds-checked and return errors on failure.
/// The reader never panics on malformed input.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    /// Creates a new `BitReader` from a byte slice.
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, bit_pos: 0 }
    }

    /// Returns the number of bits remaining to read.
    #[must_use]
    pub const fn bits_remaining(&self) -> usize {
        self.data
            .len()
            .saturating_mul(8)
            .saturating_sub(self.bit_pos)
    }

    /// Returns `true` if there are no more bits to read.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bits_remaining() == 0
    }

    /// Returns the current bit position.
    #[must_use]
    pub const fn bit_position(&self) -> usize {
        self.bit_pos
    }

    fn ensure_bits(&self, bits: usize) -> BitResult<()> {
        let available = self.bits_remaining();
        if bits > available {
            return Err(BitError::EndOfBuffer {
                requested: bits,
                available,
            });
        }
        Ok(())
    }

    /// Gathers `bits` bits starting at the cursor, zero filling past the end.
    fn gather(&self, bits: u32) -> u32 {
        let mut value = 0u64;
        let mut got = 0u32;
        let mut pos = self.bit_pos;
        while got < bits {
            let Some(&byte) = self.data.get(pos / 8) else {
                break;
            };
            let offset = (pos % 8) as u32;
            let take = (8 - offset).min(bits - got);
            let chunk = (u64::from(byte) >> offset) & ((1u64 << take) - 1);
            value |= chunk << got;
            got += take;
            pos += take as usize;
        }
        value as u32
    }

    /// Reads a single bit as a boolean.
    pub fn read_bool(&mut self) -> BitResult<bool> {
        Ok(self.read_raw_bits(1)? == 1)
    }

    /// Reads `bits` bits (`0..=32`) as an unsigned integer.
    pub fn read_raw_bits(&mut self, bits: u32) -> BitResult<u32> {
        if bits > 32 {
            return Err(BitError::InvalidBitCount { bits, max_bits: 32 });
        }
        self.ensure_bits(bits as usize)?;
        let value = self.gather(bits);
        self.bit_pos += bits as usize;
        Ok(value)
    }

    /// Returns the next `bits` bits without consuming them.
    ///
    /// Bits past the end of the buffer read as zero.
    pub fn peek_raw_bits(&self, bits: u32) -> BitResult<u32> {
        if bits > 32 {
            return Err(BitError::InvalidBitCount { bits, max_bits: 32 });
        }
        Ok(self.gather(bits))
    }

    /// Reads an unsigned value written by `BitWriter::write_packed_uint`.
    pub fn read_packed_uint(&mut self, model: &CompressionModel) -> BitResult<u32> {
        let peeked = self.gather(MAX_CODE_LENGTH);
        let (bucket, code) = model.decode(peeked)?;
        let payload_bits = BUCKET_SIZES[bucket];
        self.ensure_bits((code.len + payload_bits) as usize)?;
        self.bit_pos += code.len as usize;
        let payload = self.read_raw_bits(payload_bits)?;
        Ok(BUCKET_OFFSETS[bucket].wrapping_add(payload))
    }

    /// Reads a zigzag packed signed value.
    pub fn read_packed_int(&mut self, model: &CompressionModel) -> BitResult<i32> {
        Ok(zigzag_decode(self.read_packed_uint(model)?))
    }

    /// Reads a packed delta and applies it to `baseline` (wrapping).
    pub fn read_packed_int_delta(
        &mut self,
        baseline: i32,
        model: &CompressionModel,
    ) -> BitResult<i32> {
        Ok(baseline.wrapping_add(self.read_packed_int(model)?))
    }

    /// Skips to the next byte boundary.
    pub fn align_to_byte(&mut self) -> BitResult<()> {
        let skip = (8 - self.bit_pos % 8) % 8;
        self.ensure_bits(skip)?;
        self.bit_pos += skip;
        Ok(())
    }

    fn read_aligned_bytes<const N: usize>(&mut self) -> BitResult<[u8; N]> {
        if self.bit_pos % 8 != 0 {
            return Err(BitError::MisalignedAccess {
                bit_position: self.bit_pos,
            });
        }
        self.ensure_bits(N * 8)?;
        let idx = self.bit_pos / 8;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[idx..idx + N]);
        self.bit_pos += N * 8;
        Ok(out)
    }

    /// Reads a byte-aligned `u8`.
    pub fn read_u8(&mut self) -> BitResult<u8> {
        let [byte] = self.read_aligned_bytes::<1>()?;
        Ok(byte)
    }

    /// Reads a byte-aligned `u16` in network byte order.
    pub fn read_u16_be(&mut self) -> BitResult<u16> {
        Ok(u16::from_be_bytes(self.read_aligned_bytes::<2>()?))
    }

    /// Reads a byte-aligned `u32` in network byte order.
    pub fn read_u32_be(&mut self) -> BitResult<u32> {
        Ok(u32::from_be_bytes(self.read_aligned_bytes::<4>()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_reader() {
        let reader = BitReader::new(&[]);
        assert!(reader.is_empty());
        assert_eq!(reader.bits_remaining(), 0);
        assert_eq!(reader.bit_position(), 0);
    }

    #[test]
    fn read_from_empty_fails() {
        let mut reader = BitReader::new(&[]);
        assert!(matches!(
            reader.read_bool(),
            Err(BitError::EndOfBuffer {
                requested: 1,
                available: 0
            })
        ));
    }

    #[test]
    fn read_bits_lsb_first() {
        let mut reader = BitReader::new(&[0b1010_1111, 0b0000_1010]);
        assert_eq!(reader.read_raw_bits(4).unwrap(), 0b1111);
        assert_eq!(reader.read_raw_bits(8).unwrap(), 0b1010_1010);
        assert_eq!(reader.bits_remaining(), 4);
    }

    #[test]
    fn read_full_width() {
        let mut reader = BitReader::new(&[0xEF, 0xBE, 0xAD, 0xDE]);
        assert_eq!(reader.read_raw_bits(32).unwrap(), 0xDEAD_BEEF);
        assert!(reader.is_empty());
    }

    #[test]
    fn read_invalid_count() {
        let mut reader = BitReader::new(&[0; 8]);
        assert!(matches!(
            reader.read_raw_bits(33),
            Err(BitError::InvalidBitCount { bits: 33, .. })
        ));
    }

    #[test]
    fn peek_does_not_consume_and_zero_fills() {
        let reader = BitReader::new(&[0b1000_0001]);
        assert_eq!(reader.peek_raw_bits(12).unwrap(), 0b1000_0001);
        assert_eq!(reader.bit_position(), 0);
    }

    #[test]
    fn packed_read_past_end_fails() {
        let model = CompressionModel::new();
        // Code 0b00 selects bucket 0 which needs no payload; a single zero
        // byte therefore decodes as four zeros and then runs dry.
        let mut reader = BitReader::new(&[0]);
        for _ in 0..4 {
            assert_eq!(reader.read_packed_uint(&model).unwrap(), 0);
        }
        assert!(matches!(
            reader.read_packed_uint(&model),
            Err(BitError::EndOfBuffer { .. })
        ));
    }

    #[test]
    fn truncated_payload_fails() {
        let model = CompressionModel::new();
        // Bucket 15 code (6 bits) with its 32 bit payload missing.
        let code = model.code(15);
        let bytes = [code.bits as u8];
        let mut reader = BitReader::new(&bytes);
        assert!(matches!(
            reader.read_packed_uint(&model),
            Err(BitError::EndOfBuffer { .. })
        ));
        assert_eq!(reader.bit_position(), 0);
    }

    #[test]
    fn aligned_reads_network_order() {
        let mut reader = BitReader::new(&[1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(reader.read_u8().unwrap(), 1);
        assert_eq!(reader.read_u16_be().unwrap(), 0x0203);
        assert_eq!(reader.read_u32_be().unwrap(), 0x0405_0607);
    }

    #[test]
    fn read_misaligned_fails() {
        let mut reader = BitReader::new(&[0xFF, 0xFF]);
        reader.read_raw_bits(1).unwrap();
        assert!(matches!(
            reader.read_u8(),
            Err(BitError::MisalignedAccess { bit_position: 1 })
        ));
        reader.align_to_byte().unwrap();
        assert_eq!(reader.read_u8().unwrap(), 0xFF);
    }
}
