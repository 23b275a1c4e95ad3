//! Packed integer compression model.
//!
//! Unsigned values are grouped into 16 buckets of increasing width. A packed
//! value is written as the bucket's prefix code followed by the offset inside
//! the bucket, so small magnitudes (the common case for deltas) cost only a
//! few bits.

use crate::error::{BitError, BitResult};

/// Number of buckets (and prefix code symbols).
pub const BUCKET_COUNT: usize = 16;

/// Longest prefix code in bits; also the width of the decode lookup.
pub const MAX_CODE_LENGTH: u32 = 6;

/// Payload width of each bucket in bits.
pub const BUCKET_SIZES: [u32; BUCKET_COUNT] =
    [0, 0, 1, 2, 3, 4, 6, 8, 10, 12, 15, 18, 21, 24, 27, 32];

/// First value covered by each bucket.
pub const BUCKET_OFFSETS: [u32; BUCKET_COUNT] = [
    0,
    1,
    2,
    4,
    8,
    16,
    32,
    96,
    352,
    1376,
    5472,
    38240,
    300_384,
    2_397_536,
    19_174_752,
    153_392_480,
];

/// Default prefix code length per bucket, favouring small buckets.
pub const DEFAULT_CODE_LENGTHS: [u8; BUCKET_COUNT] = [2, 3, 3, 3, 4, 4, 4, 5, 5, 5, 6, 6, 6, 6, 6, 6];

const DECODE_TABLE_SIZE: usize = 1 << MAX_CODE_LENGTH;

/// A prefix code, stored bit-reversed so it can be emitted LSB first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PrefixCode {
    /// Code bits in stream order.
    pub bits: u32,
    /// Code length in bits.
    pub len: u32,
}

/// Read-only model shared by every packed read/write in a session.
///
/// The model is immutable after construction and safe to share across
/// threads by reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionModel {
    encode: [PrefixCode; BUCKET_COUNT],
    decode: [Option<u8>; DECODE_TABLE_SIZE],
}

impl Default for CompressionModel {
    fn default() -> Self {
        Self::build(&DEFAULT_CODE_LENGTHS)
    }
}

impl CompressionModel {
    /// Creates the default model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a model from custom per-bucket code lengths.
    ///
    /// Every bucket needs a code (lengths in `1..=6`) and the lengths must
    /// satisfy the Kraft inequality.
    pub fn with_code_lengths(lengths: &[u8; BUCKET_COUNT]) -> BitResult<Self> {
        let mut space = 0u32;
        for (symbol, &len) in lengths.iter().enumerate() {
            if len == 0 || u32::from(len) > MAX_CODE_LENGTH {
                return Err(BitError::InvalidCodeLengths {
                    symbol: Some(symbol),
                });
            }
            space += 1 << (MAX_CODE_LENGTH - u32::from(len));
        }
        if space > DECODE_TABLE_SIZE as u32 {
            return Err(BitError::InvalidCodeLengths { symbol: None });
        }
        Ok(Self::build(lengths))
    }

    fn build(lengths: &[u8; BUCKET_COUNT]) -> Self {
        let mut encode = [PrefixCode::default(); BUCKET_COUNT];
        let mut next_code = 0u32;
        for len in 1..=MAX_CODE_LENGTH {
            for (symbol, &symbol_len) in lengths.iter().enumerate() {
                if u32::from(symbol_len) == len {
                    encode[symbol] = PrefixCode {
                        bits: reverse_bits(next_code, len),
                        len,
                    };
                    next_code += 1;
                }
            }
            next_code <<= 1;
        }

        let mut decode = [None; DECODE_TABLE_SIZE];
        for (symbol, code) in encode.iter().enumerate() {
            if code.len == 0 {
                continue;
            }
            let step = 1usize << code.len;
            let mut index = code.bits as usize;
            while index < DECODE_TABLE_SIZE {
                decode[index] = Some(symbol as u8);
                index += step;
            }
        }

        Self { encode, decode }
    }

    /// Returns the bucket covering `value`.
    #[must_use]
    pub fn bucket_for(&self, value: u32) -> usize {
        let mut bucket = 0;
        while bucket + 1 < BUCKET_COUNT && value >= BUCKET_OFFSETS[bucket + 1] {
            bucket += 1;
        }
        bucket
    }

    /// Returns the prefix code for a bucket.
    #[must_use]
    pub fn code(&self, bucket: usize) -> PrefixCode {
        self.encode[bucket]
    }

    /// Decodes the bucket whose code starts the peeked bits.
    pub fn decode(&self, peeked: u32) -> BitResult<(usize, PrefixCode)> {
        let index = (peeked as usize) & (DECODE_TABLE_SIZE - 1);
        match self.decode[index] {
            Some(symbol) => {
                let symbol = usize::from(symbol);
                Ok((symbol, self.encode[symbol]))
            }
            None => Err(BitError::InvalidPrefixCode { peeked }),
        }
    }

    /// Number of bits a packed unsigned value costs.
    #[must_use]
    pub fn packed_bits(&self, value: u32) -> u32 {
        let bucket = self.bucket_for(value);
        self.encode[bucket].len + BUCKET_SIZES[bucket]
    }
}

/// Maps signed values onto unsigned ones so small magnitudes stay small.
#[must_use]
pub const fn zigzag_encode(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

/// Inverse of [`zigzag_encode`].
#[must_use]
pub const fn zigzag_decode(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

const fn reverse_bits(value: u32, len: u32) -> u32 {
    value.reverse_bits() >> (32 - len)
}
