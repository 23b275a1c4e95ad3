//! Message kinds and header encode/decode.

use bitstream::{BitReader, BitWriter, CompressionModel};

use crate::error::{DecodeError, EncodeError, LimitKind, WireResult};
use crate::header::{
    AckHeader, SnapshotHeader, COMMAND_HEADER_SIZE, DESPAWN_COUNT_OFFSET, SNAPSHOT_HEADER_SIZE,
    UPDATE_COUNT_OFFSET,
};
use crate::limits::Limits;

/// Largest despawn or update count a snapshot header can carry.
pub const MAX_SNAPSHOT_COUNT: usize = u16::MAX as usize;

/// Discriminant stored in the first byte of every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    Command = 0,
    Snapshot = 1,
    Rpc = 2,
}

impl MessageKind {
    /// Parses a message kind from a raw byte.
    pub const fn parse(kind: u8) -> Result<Self, DecodeError> {
        match kind {
            0 => Ok(Self::Command),
            1 => Ok(Self::Snapshot),
            2 => Ok(Self::Rpc),
            _ => Err(DecodeError::UnknownMessageKind { kind }),
        }
    }

    /// Returns the raw discriminant.
    #[must_use]
    pub const fn raw(self) -> u8 {
        self as u8
    }
}

/// Returns the kind of a message without decoding it.
pub fn peek_message_kind(buf: &[u8]) -> WireResult<MessageKind> {
    match buf.first() {
        Some(&kind) => MessageKind::parse(kind),
        None => Err(DecodeError::PacketTooSmall {
            actual: 0,
            required: 1,
        }),
    }
}

fn check_frame(
    buf: &[u8],
    expected: MessageKind,
    required: usize,
    limits: &Limits,
) -> WireResult<()> {
    if buf.len() > limits.max_packet_bytes {
        return Err(DecodeError::LimitsExceeded {
            kind: LimitKind::PacketBytes,
            limit: limits.max_packet_bytes,
            actual: buf.len(),
        });
    }
    let found = peek_message_kind(buf)?;
    if found != expected {
        return Err(DecodeError::UnexpectedMessageKind { expected, found });
    }
    if buf.len() < required {
        return Err(DecodeError::PacketTooSmall {
            actual: buf.len(),
            required,
        });
    }
    Ok(())
}

fn check_count(kind: LimitKind, limit: usize, actual: usize) -> WireResult<()> {
    if actual > limit {
        return Err(DecodeError::LimitsExceeded {
            kind,
            limit,
            actual,
        });
    }
    Ok(())
}

/// Writes a snapshot header with zero counts.
///
/// Call [`patch_snapshot_counts`] once the body is complete.
pub fn encode_snapshot_header(
    writer: &mut BitWriter,
    header: &SnapshotHeader,
) -> Result<(), EncodeError> {
    writer.write_u8(MessageKind::Snapshot.raw())?;
    header.ack.encode(writer)?;
    writer.write_u32_be(header.tick)?;
    writer.write_u16_be(header.despawn_count)?;
    writer.write_u16_be(header.update_count)?;
    Ok(())
}

/// Rewrites the despawn and update counts of a snapshot in `writer`.
pub fn patch_snapshot_counts(
    writer: &mut BitWriter,
    despawns: usize,
    updates: usize,
) -> Result<(), EncodeError> {
    let despawns = u16::try_from(despawns).map_err(|_| EncodeError::CountOverflow {
        kind: LimitKind::Despawns,
        count: despawns,
    })?;
    let updates = u16::try_from(updates).map_err(|_| EncodeError::CountOverflow {
        kind: LimitKind::Updates,
        count: updates,
    })?;
    writer.patch_u16_be(DESPAWN_COUNT_OFFSET, despawns)?;
    writer.patch_u16_be(UPDATE_COUNT_OFFSET, updates)?;
    Ok(())
}

/// Decodes a snapshot header and returns a reader positioned at the body.
pub fn decode_snapshot_header<'a>(
    buf: &'a [u8],
    limits: &Limits,
) -> WireResult<(SnapshotHeader, BitReader<'a>)> {
    check_frame(buf, MessageKind::Snapshot, SNAPSHOT_HEADER_SIZE, limits)?;
    let mut reader = BitReader::new(buf);
    reader.read_u8()?;
    let ack = AckHeader::decode(&mut reader)?;
    let tick = reader.read_u32_be()?;
    let despawn_count = reader.read_u16_be()?;
    let update_count = reader.read_u16_be()?;
    check_count(
        LimitKind::Despawns,
        limits.max_despawns,
        usize::from(despawn_count),
    )?;
    check_count(
        LimitKind::Updates,
        limits.max_updates,
        usize::from(update_count),
    )?;
    Ok((
        SnapshotHeader {
            ack,
            tick,
            despawn_count,
            update_count,
        },
        reader,
    ))
}

/// Writes a command header.
pub fn encode_command_header(writer: &mut BitWriter, ack: &AckHeader) -> Result<(), EncodeError> {
    writer.write_u8(MessageKind::Command.raw())?;
    ack.encode(writer)?;
    Ok(())
}

/// Decodes a command header and returns a reader positioned at the body.
pub fn decode_command_header<'a>(
    buf: &'a [u8],
    limits: &Limits,
) -> WireResult<(AckHeader, BitReader<'a>)> {
    check_frame(buf, MessageKind::Command, COMMAND_HEADER_SIZE, limits)?;
    let mut reader = BitReader::new(buf);
    reader.read_u8()?;
    let ack = AckHeader::decode(&mut reader)?;
    Ok((ack, reader))
}

/// Writes an RPC header announcing `count` RPCs.
pub fn encode_rpc_header(
    writer: &mut BitWriter,
    count: usize,
    model: &CompressionModel,
) -> Result<(), EncodeError> {
    let count = u32::try_from(count).map_err(|_| EncodeError::CountOverflow {
        kind: LimitKind::Rpcs,
        count,
    })?;
    writer.write_u8(MessageKind::Rpc.raw())?;
    writer.write_packed_uint(count, model)?;
    Ok(())
}

/// Decodes an RPC header and returns the RPC count and the body reader.
pub fn decode_rpc_header<'a>(
    buf: &'a [u8],
    model: &CompressionModel,
    limits: &Limits,
) -> WireResult<(usize, BitReader<'a>)> {
    check_frame(buf, MessageKind::Rpc, 1, limits)?;
    let mut reader = BitReader::new(buf);
    reader.read_u8()?;
    let count = reader.read_packed_uint(model)? as usize;
    check_count(LimitKind::Rpcs, limits.max_rpcs, count)?;
    Ok((count, reader))
}
