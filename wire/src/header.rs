//! Fixed, byte-aligned message headers.
//!
//! All header fields are written in network byte order. The bit-packed body
//! of a message starts right after its header.

use bitstream::{BitReader, BitResult, BitWriter};

/// Size of [`AckHeader`] in bytes.
pub const ACK_HEADER_SIZE: usize = 4 + 4 + 4 + 4;

/// Size of a snapshot header (kind + ack + tick + two counts).
pub const SNAPSHOT_HEADER_SIZE: usize = 1 + ACK_HEADER_SIZE + 4 + 2 + 2;

/// Size of a command header (kind + ack).
pub const COMMAND_HEADER_SIZE: usize = 1 + ACK_HEADER_SIZE;

/// Byte offset of the despawn count inside a snapshot header.
pub(crate) const DESPAWN_COUNT_OFFSET: usize = 1 + ACK_HEADER_SIZE + 4;

/// Byte offset of the update count inside a snapshot header.
pub(crate) const UPDATE_COUNT_OFFSET: usize = DESPAWN_COUNT_OFFSET + 2;

/// Acknowledgement and round-trip timing fields carried by every
/// snapshot and command message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AckHeader {
    /// Newest tick the sender has received from its peer (0 = none).
    pub last_received_tick: u32,
    /// Bit `n` set means tick `last_received_tick - n` was received.
    pub received_mask: u32,
    /// Sender clock in milliseconds when the message was built.
    pub local_time: u32,
    /// Peer's last `local_time`, shifted by how long the sender held it.
    pub returned_time: u32,
}

impl AckHeader {
    /// Writes the header at the current (byte-aligned) position.
    pub fn encode(&self, writer: &mut BitWriter) -> BitResult<()> {
        writer.write_u32_be(self.last_received_tick)?;
        writer.write_u32_be(self.received_mask)?;
        writer.write_u32_be(self.local_time)?;
        writer.write_u32_be(self.returned_time)
    }

    /// Reads the header from the current (byte-aligned) position.
    pub fn decode(reader: &mut BitReader<'_>) -> BitResult<Self> {
        Ok(Self {
            last_received_tick: reader.read_u32_be()?,
            received_mask: reader.read_u32_be()?,
            local_time: reader.read_u32_be()?,
            returned_time: reader.read_u32_be()?,
        })
    }
}

/// Header of a server snapshot message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotHeader {
    /// Ack of the client's command stream plus timing.
    pub ack: AckHeader,
    /// Server tick the snapshot represents.
    pub tick: u32,
    /// Number of despawned ghost ids in the body.
    pub despawn_count: u16,
    /// Number of ghost updates in the body.
    pub update_count: u16,
}

impl SnapshotHeader {
    /// Creates a header with zero counts, to be patched once the body is known.
    #[must_use]
    pub const fn new(ack: AckHeader, tick: u32) -> Self {
        Self {
            ack,
            tick,
            despawn_count: 0,
            update_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_sizes() {
        assert_eq!(ACK_HEADER_SIZE, 16);
        assert_eq!(SNAPSHOT_HEADER_SIZE, 25);
        assert_eq!(COMMAND_HEADER_SIZE, 17);
        assert_eq!(UPDATE_COUNT_OFFSET + 2, SNAPSHOT_HEADER_SIZE);
    }

    #[test]
    fn ack_header_roundtrip() {
        let ack = AckHeader {
            last_received_tick: 0xFFFF_FFF0,
            received_mask: 0b1011,
            local_time: 123_456,
            returned_time: 123_000,
        };
        let mut writer = BitWriter::new(ACK_HEADER_SIZE);
        ack.encode(&mut writer).unwrap();
        let bytes = writer.finish();
        assert_eq!(bytes.len(), ACK_HEADER_SIZE);
        assert_eq!(&bytes[..4], &[0xFF, 0xFF, 0xFF, 0xF0]);

        let mut reader = BitReader::new(&bytes);
        assert_eq!(AckHeader::decode(&mut reader).unwrap(), ack);
    }

    #[test]
    fn ack_header_truncated() {
        let mut reader = BitReader::new(&[0; 10]);
        assert!(AckHeader::decode(&mut reader).is_err());
    }

    #[test]
    fn snapshot_header_new_has_zero_counts() {
        let header = SnapshotHeader::new(AckHeader::default(), 77);
        assert_eq!(header.tick, 77);
        assert_eq!(header.despawn_count, 0);
        assert_eq!(header.update_count, 0);
    }
}
