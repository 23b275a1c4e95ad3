//! Bounded bit-level writer.

use crate::error::{BitError, BitResult};
use crate::model::{zigzag_encode, CompressionModel, BUCKET_OFFSETS, BUCKET_SIZES};

/// A saved writer position, see [`BitWriter::mark`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitMark(usize);

impl BitMark {
    /// Bit position captured by the mark.
    #[must_use]
    pub const fn bits(self) -> usize {
        self.0
    }
}

/// A bit-level writer with a fixed byte capacity.
///
/// Bits are packed LSB first. The capacity is chosen up front by the caller;
/// a write that does not fit fails with [`BitError::BufferOverflow`] and
/// leaves the stream unchanged, so a truncated record is never produced.
#[derive(Debug, Clone)]
pub struct BitWriter {
    bytes: Vec<u8>,
    bit_len: usize,
    capacity_bits: usize,
}

impl BitWriter {
    /// Creates a writer that can hold at most `capacity_bytes` bytes.
    #[must_use]
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity_bytes),
            bit_len: 0,
            capacity_bits: capacity_bytes.saturating_mul(8),
        }
    }

    /// Returns the number of bits written so far.
    #[must_use]
    pub const fn bits_written(&self) -> usize {
        self.bit_len
    }

    /// Returns the number of bytes the written bits occupy.
    #[must_use]
    pub const fn bytes_written(&self) -> usize {
        self.bit_len.div_ceil(8)
    }

    /// Returns the capacity in bits.
    #[must_use]
    pub const fn capacity_bits(&self) -> usize {
        self.capacity_bits
    }

    /// Returns how many more bits fit.
    #[must_use]
    pub const fn remaining_bits(&self) -> usize {
        self.capacity_bits - self.bit_len
    }

    /// Captures the current position.
    #[must_use]
    pub const fn mark(&self) -> BitMark {
        BitMark(self.bit_len)
    }

    /// Discards everything written after `mark`.
    ///
    /// Marks ahead of the current position are ignored.
    pub fn rewind(&mut self, mark: BitMark) {
        if mark.0 >= self.bit_len {
            return;
        }
        self.bit_len = mark.0;
        self.bytes.truncate(self.bit_len.div_ceil(8));
        let used = self.bit_len % 8;
        if used != 0 {
            if let Some(last) = self.bytes.last_mut() {
                *last &= (1u8 << used) - 1;
            }
        }
    }

    fn reserve(&self, bits: usize) -> BitResult<()> {
        let attempted = self.bit_len + bits;
        if attempted > self.capacity_bits {
            return Err(BitError::BufferOverflow {
                attempted,
                capacity: self.capacity_bits,
            });
        }
        Ok(())
    }

    fn push_bits(&mut self, mut value: u64, mut bits: u32) {
        while bits > 0 {
            let offset = (self.bit_len % 8) as u32;
            if offset == 0 {
                self.bytes.push(0);
            }
            let take = (8 - offset).min(bits);
            let chunk = (value & ((1u64 << take) - 1)) as u8;
            if let Some(last) = self.bytes.last_mut() {
                *last |= chunk << offset;
            }
            value >>= take;
            bits -= take;
            self.bit_len += take as usize;
        }
    }

    /// Writes a single bit.
    pub fn write_bool(&mut self, value: bool) -> BitResult<()> {
        self.reserve(1)?;
        self.push_bits(u64::from(value), 1);
        Ok(())
    }

    /// Writes the low `bits` bits of `value`; `bits` must be in `0..=32`.
    pub fn write_raw_bits(&mut self, value: u32, bits: u32) -> BitResult<()> {
        if bits > 32 {
            return Err(BitError::InvalidBitCount { bits, max_bits: 32 });
        }
        if bits < 32 && u64::from(value) >= (1u64 << bits) {
            return Err(BitError::ValueOutOfRange { value, bits });
        }
        self.reserve(bits as usize)?;
        self.push_bits(u64::from(value), bits);
        Ok(())
    }

    /// Writes an unsigned value using the model's bucketed prefix code.
    pub fn write_packed_uint(&mut self, value: u32, model: &CompressionModel) -> BitResult<()> {
        let bucket = model.bucket_for(value);
        let code = model.code(bucket);
        let payload_bits = BUCKET_SIZES[bucket];
        self.reserve((code.len + payload_bits) as usize)?;
        self.push_bits(u64::from(code.bits), code.len);
        self.push_bits(u64::from(value - BUCKET_OFFSETS[bucket]), payload_bits);
        Ok(())
    }

    /// Writes a signed value as a zigzag packed unsigned value.
    pub fn write_packed_int(&mut self, value: i32, model: &CompressionModel) -> BitResult<()> {
        self.write_packed_uint(zigzag_encode(value), model)
    }

    /// Writes `value - baseline` (wrapping) as a packed signed value.
    ///
    /// An unchanged value costs the shortest code in the model.
    pub fn write_packed_int_delta(
        &mut self,
        value: i32,
        baseline: i32,
        model: &CompressionModel,
    ) -> BitResult<()> {
        self.write_packed_int(value.wrapping_sub(baseline), model)
    }

    /// Pads with zero bits up to the next byte boundary.
    pub fn align_to_byte(&mut self) -> BitResult<()> {
        let pad = (8 - self.bit_len % 8) % 8;
        self.reserve(pad)?;
        self.push_bits(0, pad as u32);
        Ok(())
    }

    fn write_aligned(&mut self, bytes: &[u8]) -> BitResult<()> {
        if self.bit_len % 8 != 0 {
            return Err(BitError::MisalignedAccess {
                bit_position: self.bit_len,
            });
        }
        self.reserve(bytes.len() * 8)?;
        self.bytes.extend_from_slice(bytes);
        self.bit_len += bytes.len() * 8;
        Ok(())
    }

    /// Writes a byte-aligned `u8`.
    pub fn write_u8(&mut self, value: u8) -> BitResult<()> {
        self.write_aligned(&[value])
    }

    /// Writes a byte-aligned `u16` in network byte order.
    pub fn write_u16_be(&mut self, value: u16) -> BitResult<()> {
        self.write_aligned(&value.to_be_bytes())
    }

    /// Writes a byte-aligned `u32` in network byte order.
    pub fn write_u32_be(&mut self, value: u32) -> BitResult<()> {
        self.write_aligned(&value.to_be_bytes())
    }

    /// Overwrites an already written `u16` at `offset` bytes (network order).
    pub fn patch_u16_be(&mut self, offset: usize, value: u16) -> BitResult<()> {
        let written = self.bit_len / 8;
        if offset + 2 > written {
            return Err(BitError::PatchOutOfBounds {
                offset,
                len: 2,
                written,
            });
        }
        self.bytes[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    /// Returns the bytes written so far (last byte zero padded).
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Finishes writing and returns the byte buffer.
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}
