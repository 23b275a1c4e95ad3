use std::fmt::Write as _;

use anyhow::{bail, Context, Result};
use bitstream::{BitReader, CompressionModel};
use codec::{CommandData, SnapshotData, Tick};
use schema::{CommandLayout, GhostCollection, GhostTypeId};
use serde::Serialize;
use wire::{
    decode_command_header, decode_rpc_header, decode_snapshot_header, peek_message_kind,
    AckHeader, Limits, MessageKind,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AckReport {
    pub last_received_tick: u32,
    pub received_mask: u32,
    pub local_time: u32,
    pub returned_time: u32,
}

impl From<AckHeader> for AckReport {
    fn from(ack: AckHeader) -> Self {
        Self {
            last_received_tick: ack.last_received_tick,
            received_mask: ack.received_mask,
            local_time: ack.local_time,
            returned_time: ack.returned_time,
        }
    }
}

/// One ghost record in a snapshot body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GhostRecordReport {
    pub ghost: u32,
    pub ty: u16,
    pub type_name: String,
    /// Baseline ticks the record was encoded against; empty for a full record.
    pub baselines: Vec<u32>,
    pub change_mask: u32,
    pub bits: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandReport {
    pub tick: u32,
    /// Decoded only when a command layout is known.
    pub values: Option<Vec<i32>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectReport {
    pub kind: String,
    pub bytes: usize,
    pub ack: Option<AckReport>,
    pub tick: Option<u32>,
    pub despawns: Vec<u32>,
    /// Decoded only when a collection is known.
    pub ghosts: Option<Vec<GhostRecordReport>>,
    pub command: Option<CommandReport>,
    pub rpc_count: Option<usize>,
    pub body_bits: usize,
}

impl InspectReport {
    fn new(kind: MessageKind, bytes: usize) -> Self {
        Self {
            kind: format!("{kind:?}").to_lowercase(),
            bytes,
            ack: None,
            tick: None,
            despawns: Vec::new(),
            ghosts: None,
            command: None,
            rpc_count: None,
            body_bits: 0,
        }
    }
}

/// Decodes a message's framing and, where possible, its body layout.
///
/// Delta values are read against zeroed baselines, so record sizes and
/// change masks are exact while the values themselves are not reported.
pub fn inspect_message(
    bytes: &[u8],
    collection: Option<&GhostCollection>,
    command: Option<&CommandLayout>,
    limits: &Limits,
) -> Result<InspectReport> {
    let model = CompressionModel::default();
    let kind = peek_message_kind(bytes).context("read message kind")?;
    let mut report = InspectReport::new(kind, bytes.len());
    match kind {
        MessageKind::Snapshot => {
            let (header, mut reader) =
                decode_snapshot_header(bytes, limits).context("decode snapshot header")?;
            let body_start = reader.bit_position();
            report.ack = Some(header.ack.into());
            report.tick = Some(header.tick);
            for _ in 0..header.despawn_count {
                report
                    .despawns
                    .push(reader.read_packed_uint(&model).context("read despawn id")?);
            }
            if let Some(collection) = collection {
                let tick = Tick::new(header.tick);
                let mut ghosts = Vec::with_capacity(usize::from(header.update_count));
                for index in 0..header.update_count {
                    let record = read_ghost_record(&mut reader, collection, tick, &model)
                        .with_context(|| format!("ghost record {index}"))?;
                    ghosts.push(record);
                }
                report.ghosts = Some(ghosts);
            }
            report.body_bits = reader.bit_position() - body_start;
        }
        MessageKind::Command => {
            let (ack, mut reader) =
                decode_command_header(bytes, limits).context("decode command header")?;
            let body_start = reader.bit_position();
            report.ack = Some(ack.into());
            if reader.read_bool().context("read command flag")? {
                let tick = reader.read_raw_bits(32).context("read command tick")?;
                let values = command
                    .map(|layout| {
                        CommandData::deserialize(layout, Tick::new(tick), &mut reader, &model)
                            .map(|data| data.values)
                    })
                    .transpose()
                    .context("decode command values")?;
                report.command = Some(CommandReport { tick, values });
            }
            report.body_bits = reader.bit_position() - body_start;
        }
        MessageKind::Rpc => {
            let (count, reader) =
                decode_rpc_header(bytes, &model, limits).context("decode rpc header")?;
            report.rpc_count = Some(count);
            report.body_bits = reader.bits_remaining();
        }
    }
    Ok(report)
}

fn read_ghost_record(
    reader: &mut BitReader<'_>,
    collection: &GhostCollection,
    tick: Tick,
    model: &CompressionModel,
) -> Result<GhostRecordReport> {
    let start = reader.bit_position();
    let raw_ty = reader.read_packed_uint(model)?;
    let Some(ty_id) = u16::try_from(raw_ty).ok().map(GhostTypeId) else {
        bail!("ghost type {raw_ty} out of range");
    };
    let Some(ty) = collection.get(ty_id) else {
        bail!("unknown ghost type {raw_ty}");
    };
    let ghost = reader.read_packed_uint(model)?;
    let mut distances = vec![reader.read_packed_uint(model)?];
    if distances[0] != 0 {
        distances.push(reader.read_packed_uint(model)?);
        distances.push(reader.read_packed_uint(model)?);
    }
    let baselines = distances
        .iter()
        .filter(|distance| **distance != 0)
        .map(|distance| tick.wrapping_sub(*distance).raw())
        .collect();
    let zero = SnapshotData::zeroed(ty, Tick::NONE);
    let record = SnapshotData::deserialize(ty, tick, &zero, reader, model)?;
    Ok(GhostRecordReport {
        ghost,
        ty: ty_id.get(),
        type_name: ty.name.clone(),
        baselines,
        change_mask: record.change_mask,
        bits: reader.bit_position() - start,
    })
}

/// Human-readable rendering of an [`InspectReport`].
pub fn format_inspect_pretty(report: &InspectReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "kind: {} ({} bytes)", report.kind, report.bytes);
    if let Some(ack) = &report.ack {
        let _ = writeln!(
            out,
            "ack: last {} mask {:032b} local {} returned {}",
            ack.last_received_tick, ack.received_mask, ack.local_time, ack.returned_time
        );
    }
    if let Some(tick) = report.tick {
        let _ = writeln!(out, "tick: {tick}");
    }
    if !report.despawns.is_empty() {
        let _ = writeln!(out, "despawns: {:?}", report.despawns);
    }
    if let Some(ghosts) = &report.ghosts {
        let _ = writeln!(out, "ghosts: {}", ghosts.len());
        for ghost in ghosts {
            let baselines = if ghost.baselines.is_empty() {
                "full".to_string()
            } else {
                format!("{:?}", ghost.baselines)
            };
            let _ = writeln!(
                out,
                "  #{} {} mask {:b} vs {baselines}: {} bits",
                ghost.ghost, ghost.type_name, ghost.change_mask, ghost.bits
            );
        }
    }
    if let Some(command) = &report.command {
        match &command.values {
            Some(values) => {
                let _ = writeln!(out, "command: tick {} values {values:?}", command.tick);
            }
            None => {
                let _ = writeln!(out, "command: tick {}", command.tick);
            }
        }
    }
    if let Some(count) = report.rpc_count {
        let _ = writeln!(out, "rpcs: {count}");
    }
    let _ = write!(out, "body: {} bits", report.body_bits);
    out
}
