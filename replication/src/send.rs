//! Server send pipeline: per-connection snapshot packets and command intake.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use bitstream::{BitError, BitWriter, CompressionModel};
use codec::{CodecError, CommandData, GhostId, SnapshotData, Tick};
use rayon::prelude::*;
use schema::{CommandLayout, GhostTypeDef, GhostTypeId};
use wire::{
    decode_command_header, encode_snapshot_header, patch_snapshot_counts, EncodeError,
    SnapshotHeader, MAX_SNAPSHOT_COUNT, SNAPSHOT_HEADER_SIZE,
};

use crate::config::ReplicationConfig;
use crate::connection::ServerConnection;
use crate::error::{ReceiveError, ReceiveResult, SendError, SendResult};
use crate::relevancy::{AllRelevant, RelevancyFilter};
use crate::world::{GhostWorld, ServerGhost};

/// Bits and counts written for one ghost type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeStats {
    pub count: u32,
    pub bits: u64,
}

/// What went into one snapshot packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotStats {
    pub bytes: usize,
    pub despawns: usize,
    pub updates: usize,
    /// Relevant ghosts left out because the budget ran out.
    pub skipped: usize,
    pub per_type: BTreeMap<GhostTypeId, TypeStats>,
}

/// One encoded snapshot, ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingSnapshot {
    pub tick: Tick,
    pub bytes: Vec<u8>,
    pub stats: SnapshotStats,
}

struct Candidate<'w> {
    ghost: &'w ServerGhost,
    ty: &'w GhostTypeDef,
    current: &'w SnapshotData,
    never_sent: bool,
    priority: u64,
}

fn is_overflow(err: &SendError) -> bool {
    matches!(
        err,
        SendError::Encode(EncodeError::Bitstream(BitError::BufferOverflow { .. }))
            | SendError::Codec(CodecError::Bitstream(BitError::BufferOverflow { .. }))
    )
}

/// Builds snapshots for connections and ingests their command packets.
///
/// The sender holds only read-only state, so one instance serves every
/// connection in parallel.
pub struct GhostSender {
    config: ReplicationConfig,
    model: CompressionModel,
    command_layout: Option<CommandLayout>,
    relevancy: Box<dyn RelevancyFilter>,
}

impl std::fmt::Debug for GhostSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GhostSender")
            .field("config", &self.config)
            .field("command_layout", &self.command_layout)
            .finish_non_exhaustive()
    }
}

impl GhostSender {
    #[must_use]
    pub fn new(config: ReplicationConfig) -> Self {
        Self {
            config,
            model: CompressionModel::default(),
            command_layout: None,
            relevancy: Box::new(AllRelevant),
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: CompressionModel) -> Self {
        self.model = model;
        self
    }

    #[must_use]
    pub fn with_command_layout(mut self, layout: CommandLayout) -> Self {
        self.command_layout = Some(layout);
        self
    }

    #[must_use]
    pub fn with_relevancy(mut self, relevancy: impl RelevancyFilter + 'static) -> Self {
        self.relevancy = Box::new(relevancy);
        self
    }

    #[must_use]
    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    #[must_use]
    pub fn model(&self) -> &CompressionModel {
        &self.model
    }

    /// Encodes the snapshot for `tick` that `conn` should receive, within
    /// `budget` bytes.
    ///
    /// Pending despawns go first. Relevant ghosts follow in priority order
    /// (never-sent ghosts first, then importance times ticks since last
    /// sent, then ghost id); a ghost that does not fit is skipped and keeps
    /// aging. Connection state is updated only when the packet is complete.
    pub fn build_outgoing_snapshot(
        &self,
        conn: &mut ServerConnection,
        world: &GhostWorld,
        tick: Tick,
        budget: usize,
        now: u32,
    ) -> SendResult<OutgoingSnapshot> {
        let budget = budget.min(self.config.limits.max_packet_bytes);
        if budget < SNAPSHOT_HEADER_SIZE {
            return Err(SendError::BudgetTooSmall {
                budget,
                required: SNAPSHOT_HEADER_SIZE,
            });
        }

        conn.release_acked_despawns();
        conn.collect_removed(world);
        let candidates = self.collect_candidates(conn, world, tick);

        let mut writer = BitWriter::new(budget);
        let header = SnapshotHeader::new(conn.ack().ack_header(now), tick.raw());
        encode_snapshot_header(&mut writer, &header)?;

        let max_despawns = self.config.limits.max_despawns.min(MAX_SNAPSHOT_COUNT);
        let max_updates = self.config.limits.max_updates.min(MAX_SNAPSHOT_COUNT);
        let mut stats = SnapshotStats::default();
        let mut despawns = Vec::new();
        for id in conn.pending_despawns().take(max_despawns) {
            if writer.write_packed_uint(id.raw(), &self.model).is_err() {
                break;
            }
            despawns.push(id);
        }

        let mut sent: Vec<(GhostId, GhostTypeId)> = Vec::new();
        for candidate in &candidates {
            if sent.len() >= max_updates {
                stats.skipped += 1;
                continue;
            }
            let mark = writer.mark();
            match self.write_ghost(&mut writer, conn, candidate, tick) {
                Ok(()) => {
                    let bits = (writer.bits_written() - mark.bits()) as u64;
                    let entry = stats.per_type.entry(candidate.ghost.ty()).or_default();
                    entry.count += 1;
                    entry.bits += bits;
                    sent.push((candidate.ghost.id(), candidate.ghost.ty()));
                }
                Err(err) if is_overflow(&err) => {
                    writer.rewind(mark);
                    stats.skipped += 1;
                    log::trace!(
                        "ghost {} skipped at tick {}: budget full",
                        candidate.ghost.id().raw(),
                        tick.raw()
                    );
                }
                Err(err) => return Err(err),
            }
        }

        patch_snapshot_counts(&mut writer, despawns.len(), sent.len())?;
        let bytes = writer.finish();
        debug_assert!(bytes.len() <= budget);
        if bytes.len() > budget {
            return Err(SendError::BudgetExceeded {
                written: bytes.len(),
                budget,
            });
        }

        conn.mark_despawns_sent(&despawns, tick);
        for (id, ty) in &sent {
            conn.mark_sent(*id, *ty, tick);
        }

        stats.bytes = bytes.len();
        stats.despawns = despawns.len();
        stats.updates = sent.len();
        if stats.skipped > 0 {
            log::warn!(
                "connection {}: {} ghosts did not fit in {} bytes at tick {}",
                conn.id().0,
                stats.skipped,
                budget,
                tick.raw()
            );
        }
        log::debug!(
            "connection {}: snapshot {} with {} updates, {} despawns, {} bytes",
            conn.id().0,
            tick.raw(),
            stats.updates,
            stats.despawns,
            stats.bytes
        );
        Ok(OutgoingSnapshot { tick, bytes, stats })
    }

    /// Builds one snapshot per connection in parallel.
    ///
    /// Each connection gets its own result; one failing does not stop the
    /// others.
    pub fn build_all_snapshots(
        &self,
        connections: &mut [ServerConnection],
        world: &GhostWorld,
        tick: Tick,
        budget: usize,
        now: u32,
    ) -> Vec<SendResult<OutgoingSnapshot>> {
        connections
            .par_iter_mut()
            .map(|conn| self.build_outgoing_snapshot(conn, world, tick, budget, now))
            .collect()
    }

    fn collect_candidates<'w>(
        &self,
        conn: &mut ServerConnection,
        world: &'w GhostWorld,
        tick: Tick,
    ) -> Vec<Candidate<'w>> {
        let collection = world.collection();
        let mut candidates = Vec::new();
        for ghost in world.iter() {
            let Some(ty) = collection.get(ghost.ty()) else {
                continue;
            };
            if ty.skip_owner && ghost.owner() == Some(conn.id()) {
                continue;
            }
            let Some(current) = ghost.snapshot_at(tick) else {
                continue;
            };
            if !self.relevancy.is_relevant(conn, ghost, ty, current) {
                conn.schedule_despawn(ghost.id());
                continue;
            }
            conn.cancel_despawn(ghost.id());
            let importance = u64::from(ty.importance);
            let (never_sent, priority) = match conn.staleness(ghost.id(), tick) {
                Some(staleness) => (false, importance * u64::from(staleness)),
                None => (true, importance),
            };
            candidates.push(Candidate {
                ghost,
                ty,
                current,
                never_sent,
                priority,
            });
        }
        candidates.sort_by_key(|c| (Reverse(c.never_sent), Reverse(c.priority), c.ghost.id()));
        candidates
    }

    fn write_ghost(
        &self,
        writer: &mut BitWriter,
        conn: &ServerConnection,
        candidate: &Candidate<'_>,
        tick: Tick,
    ) -> SendResult<()> {
        let ghost = candidate.ghost;
        let baselines = conn.acked_baselines(
            ghost.id(),
            ghost.ty(),
            ghost.history(),
            tick,
            candidate.ty.predict_delta,
        );

        writer.write_packed_uint(u32::from(ghost.ty().get()), &self.model)?;
        writer.write_packed_uint(ghost.id().raw(), &self.model)?;
        match baselines.as_slice() {
            [] => writer.write_packed_uint(0, &self.model)?,
            [b0] => {
                writer.write_packed_uint(tick.ticks_since(b0.tick), &self.model)?;
                writer.write_packed_uint(0, &self.model)?;
                writer.write_packed_uint(0, &self.model)?;
            }
            [b0, b1, b2, ..] => {
                writer.write_packed_uint(tick.ticks_since(b0.tick), &self.model)?;
                writer.write_packed_uint(tick.ticks_since(b1.tick), &self.model)?;
                writer.write_packed_uint(tick.ticks_since(b2.tick), &self.model)?;
            }
            [b0, ..] => {
                writer.write_packed_uint(tick.ticks_since(b0.tick), &self.model)?;
                writer.write_packed_uint(0, &self.model)?;
                writer.write_packed_uint(0, &self.model)?;
            }
        }
        let baseline = SnapshotData::choose_baseline(candidate.ty, tick, &baselines)?;
        candidate
            .current
            .serialize(candidate.ty, &baseline, writer, &self.model)?;
        Ok(())
    }

    /// Applies a client's command packet: its ack of our snapshots, its
    /// clock, and the command it carries (if any).
    ///
    /// Malformed packets count as faults; past the configured allowance
    /// this returns [`ReceiveError::TooManyFaults`].
    pub fn receive_command_packet(
        &self,
        conn: &mut ServerConnection,
        bytes: &[u8],
        now: u32,
    ) -> ReceiveResult<Option<Tick>> {
        match self.decode_command_packet(bytes) {
            Ok((ack, command)) => {
                conn.clear_faults();
                conn.ack_mut().apply_header(&ack, now);
                Ok(command.map(|command| {
                    let tick = command.tick;
                    conn.store_command(command);
                    tick
                }))
            }
            Err(err) => {
                let faults = conn.record_fault();
                log::warn!(
                    "connection {}: dropped command packet ({faults}/{}): {err}",
                    conn.id().0,
                    self.config.max_faults
                );
                if faults >= self.config.max_faults {
                    Err(ReceiveError::TooManyFaults { faults })
                } else {
                    Err(err)
                }
            }
        }
    }

    fn decode_command_packet(
        &self,
        bytes: &[u8],
    ) -> ReceiveResult<(wire::AckHeader, Option<CommandData>)> {
        let layout = self
            .command_layout
            .as_ref()
            .ok_or(ReceiveError::MissingCommandLayout)?;
        let (ack, mut reader) = decode_command_header(bytes, &self.config.limits)?;
        let command = if reader.read_bool()? {
            let tick = Tick::new(reader.read_raw_bits(32)?);
            let command = CommandData::deserialize(layout, tick, &mut reader, &self.model)?;
            Some(command).filter(|command| !command.tick.is_none())
        } else {
            None
        };
        if reader.bits_remaining() >= 8 {
            return Err(ReceiveError::TrailingData {
                bits: reader.bits_remaining(),
            });
        }
        Ok((ack, command))
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;
    use std::sync::Arc;

    use schema::{FieldDef, GhostCollection};
    use wire::decode_snapshot_header;

    use super::*;
    use crate::connection::ConnectionId;

    fn world() -> GhostWorld {
        let collection = GhostCollection::builder()
            .ghost(
                GhostTypeDef::new("Asteroid")
                    .field(FieldDef::quantized("x", 100))
                    .grouped(FieldDef::quantized("y", 100)),
            )
            .ghost(
                GhostTypeDef::new("Ship")
                    .field(FieldDef::quantized("x", 100))
                    .grouped(FieldDef::quantized("y", 100))
                    .importance(10)
                    .skip_owner(true),
            )
            .build()
            .unwrap();
        GhostWorld::new(Arc::new(collection), NonZeroUsize::new(8).unwrap())
    }

    fn record(world: &mut GhostWorld, id: GhostId, tick: u32, x: i32) {
        world
            .record_snapshot(id, SnapshotData::new(Tick::new(tick), vec![x, -x]))
            .unwrap();
    }

    fn sender() -> GhostSender {
        GhostSender::new(ReplicationConfig::for_testing())
    }

    fn conn(id: u32) -> ServerConnection {
        ServerConnection::new(ConnectionId(id), &ReplicationConfig::for_testing())
    }

    #[test]
    fn empty_world_yields_header_only() {
        let out = sender()
            .build_outgoing_snapshot(&mut conn(1), &world(), Tick::new(1), 1200, 0)
            .unwrap();
        assert_eq!(out.bytes.len(), SNAPSHOT_HEADER_SIZE);
        let (header, _) = decode_snapshot_header(&out.bytes, &wire::Limits::default()).unwrap();
        assert_eq!(header.tick, 1);
        assert_eq!(header.update_count, 0);
    }

    #[test]
    fn budget_below_header_is_rejected() {
        let err = sender()
            .build_outgoing_snapshot(&mut conn(1), &world(), Tick::new(1), 10, 0)
            .unwrap_err();
        assert!(matches!(err, SendError::BudgetTooSmall { budget: 10, .. }));
    }

    #[test]
    fn packet_never_exceeds_budget() {
        let mut world = world();
        for index in 0..40 {
            let id = world.spawn(GhostTypeId(0), None).unwrap();
            record(&mut world, id, 1, 100_000 + index * 7919);
        }
        let budget = SNAPSHOT_HEADER_SIZE + 40;
        let out = sender()
            .build_outgoing_snapshot(&mut conn(1), &world, Tick::new(1), budget, 0)
            .unwrap();
        assert!(out.bytes.len() <= budget);
        assert!(out.stats.updates > 0);
        assert_eq!(out.stats.updates + out.stats.skipped, 40);
    }

    #[test]
    fn update_count_is_capped_by_the_header_field() {
        let mut world = world();
        let total = MAX_SNAPSHOT_COUNT + 10;
        for _ in 0..total {
            let id = world.spawn(GhostTypeId(0), None).unwrap();
            record(&mut world, id, 1, 0);
        }
        let config = ReplicationConfig {
            limits: wire::Limits::unlimited(),
            ..ReplicationConfig::for_testing()
        };
        let out = GhostSender::new(config.clone())
            .build_outgoing_snapshot(
                &mut ServerConnection::new(ConnectionId(1), &config),
                &world,
                Tick::new(1),
                1 << 21,
                0,
            )
            .unwrap();
        assert_eq!(out.stats.updates, MAX_SNAPSHOT_COUNT);
        assert_eq!(out.stats.skipped, 10);
        let (header, _) = decode_snapshot_header(&out.bytes, &wire::Limits::unlimited()).unwrap();
        assert_eq!(usize::from(header.update_count), MAX_SNAPSHOT_COUNT);
    }

    #[test]
    fn skipped_ghosts_go_first_next_tick() {
        let mut world = world();
        let ids: Vec<GhostId> = (0..10)
            .map(|_| world.spawn(GhostTypeId(0), None).unwrap())
            .collect();
        for (index, id) in ids.iter().enumerate() {
            record(&mut world, *id, 1, 1_000_000 + index as i32);
            record(&mut world, *id, 2, 1_000_000 + index as i32);
        }
        let sender = sender();
        let mut conn = conn(1);
        let budget = SNAPSHOT_HEADER_SIZE + 20;
        let first = sender
            .build_outgoing_snapshot(&mut conn, &world, Tick::new(1), budget, 0)
            .unwrap();
        assert!(first.stats.skipped > 0);
        let first_sent = first.stats.updates;
        // Never-sent ghosts outrank ones already delivered.
        sender
            .build_outgoing_snapshot(&mut conn, &world, Tick::new(2), budget, 0)
            .unwrap();
        assert!(conn.tracked_len() > first_sent);
    }

    #[test]
    fn owner_does_not_receive_skip_owner_ghosts() {
        let mut world = world();
        let ship = world.spawn(GhostTypeId(1), Some(ConnectionId(1))).unwrap();
        record(&mut world, ship, 1, 5);
        let sender = sender();
        let mut owner = conn(1);
        let mut other = conn(2);
        let out = sender
            .build_outgoing_snapshot(&mut owner, &world, Tick::new(1), 1200, 0)
            .unwrap();
        assert_eq!(out.stats.updates, 0);
        let out = sender
            .build_outgoing_snapshot(&mut other, &world, Tick::new(1), 1200, 0)
            .unwrap();
        assert_eq!(out.stats.updates, 1);
    }

    #[test]
    fn despawn_is_repeated_until_acked() {
        let mut world = world();
        let id = world.spawn(GhostTypeId(0), None).unwrap();
        record(&mut world, id, 1, 1);
        let sender = sender();
        let mut conn = conn(1);
        sender
            .build_outgoing_snapshot(&mut conn, &world, Tick::new(1), 1200, 0)
            .unwrap();
        world.despawn(id).unwrap();

        for tick in 2..=3 {
            let out = sender
                .build_outgoing_snapshot(&mut conn, &world, Tick::new(tick), 1200, 0)
                .unwrap();
            assert_eq!(out.stats.despawns, 1);
        }
        assert_eq!(world.release_despawned(std::slice::from_ref(&conn)), 0);

        conn.ack_mut().update_received_by_remote(Tick::new(3), 1);
        let out = sender
            .build_outgoing_snapshot(&mut conn, &world, Tick::new(4), 1200, 0)
            .unwrap();
        assert_eq!(out.stats.despawns, 0);
        assert_eq!(world.release_despawned(std::slice::from_ref(&conn)), 1);
    }

    #[test]
    fn acked_ticks_become_baselines() {
        let mut world = world();
        let id = world.spawn(GhostTypeId(0), None).unwrap();
        let sender = sender();
        let mut conn = conn(1);
        record(&mut world, id, 1, 123_456);
        let full = sender
            .build_outgoing_snapshot(&mut conn, &world, Tick::new(1), 1200, 0)
            .unwrap();
        conn.ack_mut().update_received_by_remote(Tick::new(1), 1);
        record(&mut world, id, 2, 123_456);
        let delta = sender
            .build_outgoing_snapshot(&mut conn, &world, Tick::new(2), 1200, 0)
            .unwrap();
        assert!(delta.bytes.len() < full.bytes.len());

        // Body: type, id, b0 distance 1, b1 0, b2 0, empty mask.
        let (_, mut reader) =
            decode_snapshot_header(&delta.bytes, &wire::Limits::default()).unwrap();
        let model = sender.model();
        assert_eq!(reader.read_packed_uint(model).unwrap(), 0);
        assert_eq!(reader.read_packed_uint(model).unwrap(), id.raw());
        assert_eq!(reader.read_packed_uint(model).unwrap(), 1);
        assert_eq!(reader.read_packed_uint(model).unwrap(), 0);
        assert_eq!(reader.read_packed_uint(model).unwrap(), 0);
        assert_eq!(reader.read_packed_uint(model).unwrap(), 0);
    }

    #[test]
    fn build_all_snapshots_serves_every_connection() {
        let mut world = world();
        let id = world.spawn(GhostTypeId(0), None).unwrap();
        record(&mut world, id, 1, 9);
        let mut conns: Vec<ServerConnection> = (1..=4).map(conn).collect();
        let results = sender().build_all_snapshots(&mut conns, &world, Tick::new(1), 1200, 0);
        assert_eq!(results.len(), 4);
        for result in results {
            assert_eq!(result.unwrap().stats.updates, 1);
        }
        assert!(conns.iter().all(|conn| conn.tracks_ghost(id)));
    }

    fn command_layout() -> CommandLayout {
        CommandLayout::new("Input", ["left", "thrust"]).unwrap()
    }

    fn command_packet(tick: u32, values: Vec<i32>) -> Vec<u8> {
        let model = CompressionModel::default();
        let mut writer = BitWriter::new(64);
        let ack = wire::AckHeader {
            last_received_tick: 0,
            received_mask: 0,
            local_time: 500,
            returned_time: 0,
        };
        wire::encode_command_header(&mut writer, &ack).unwrap();
        writer.write_bool(true).unwrap();
        writer.write_raw_bits(tick, 32).unwrap();
        CommandData::new(Tick::new(tick), values)
            .serialize(&command_layout(), &mut writer, &model)
            .unwrap();
        writer.finish()
    }

    #[test]
    fn command_packet_is_buffered() {
        let sender = sender().with_command_layout(command_layout());
        let mut conn = conn(1);
        let tick = sender
            .receive_command_packet(&mut conn, &command_packet(42, vec![1, 0]), 1000)
            .unwrap();
        assert_eq!(tick, Some(Tick::new(42)));
        assert_eq!(conn.command_at(Tick::new(45)).unwrap().values, vec![1, 0]);
        assert_eq!(conn.ack().last_received_by_local(), Tick::new(42));
    }

    #[test]
    fn malformed_commands_escalate() {
        let sender = sender().with_command_layout(command_layout());
        let mut conn = conn(1);
        let max = sender.config().max_faults;
        for attempt in 1..=max {
            let err = sender
                .receive_command_packet(&mut conn, &[0, 1, 2], 0)
                .unwrap_err();
            if attempt < max {
                assert!(matches!(err, ReceiveError::Decode(_)));
            } else {
                assert!(matches!(err, ReceiveError::TooManyFaults { .. }));
            }
        }
    }

    #[test]
    fn commands_need_a_layout() {
        let err = sender()
            .receive_command_packet(&mut conn(1), &command_packet(1, vec![0, 0]), 0)
            .unwrap_err();
        assert_eq!(err, ReceiveError::MissingCommandLayout);
    }
}
