//! Client receive pipeline: snapshot application, presentation reads and
//! outgoing command packets.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use bitstream::{BitReader, BitWriter, CompressionModel};
use codec::{AckState, CommandBuffer, FieldValue, GhostId, SnapshotData, Tick, TickHistory};
use schema::{CommandLayout, GhostCollection, GhostTypeId};
use wire::{decode_snapshot_header, encode_command_header, SnapshotHeader, COMMAND_HEADER_SIZE};

use crate::config::ReplicationConfig;
use crate::error::{ReceiveError, ReceiveResult, SendResult};
use crate::time::SimulationContext;

/// A ghost mirrored on the client.
#[derive(Debug, Clone)]
pub struct ClientGhost {
    id: GhostId,
    ty: GhostTypeId,
    history: TickHistory<SnapshotData>,
}

impl ClientGhost {
    #[must_use]
    pub const fn id(&self) -> GhostId {
        self.id
    }

    #[must_use]
    pub const fn ty(&self) -> GhostTypeId {
        self.ty
    }

    #[must_use]
    pub fn history(&self) -> &TickHistory<SnapshotData> {
        &self.history
    }

    /// Newest confirmed record.
    #[must_use]
    pub fn latest(&self) -> Option<&SnapshotData> {
        self.history.latest()
    }
}

/// What a snapshot did to one ghost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyKind {
    Spawned,
    Updated,
    Despawned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedGhost {
    pub id: GhostId,
    pub ty: GhostTypeId,
    pub tick: Tick,
    pub kind: ApplyKind,
}

struct StagedUpdate {
    id: GhostId,
    ty: GhostTypeId,
    record: SnapshotData,
}

struct StagedSnapshot {
    despawns: BTreeSet<GhostId>,
    updates: Vec<StagedUpdate>,
}

/// Client half of ghost replication.
///
/// Snapshots are decoded in full before anything is committed; a packet
/// that fails anywhere leaves every ghost untouched.
#[derive(Debug, Clone)]
pub struct GhostReceiver {
    collection: Arc<GhostCollection>,
    config: ReplicationConfig,
    model: CompressionModel,
    ack: AckState,
    ghosts: BTreeMap<GhostId, ClientGhost>,
    last_applied: Tick,
    faults: u32,
    needs_resync: bool,
}

impl GhostReceiver {
    #[must_use]
    pub fn new(collection: Arc<GhostCollection>, config: ReplicationConfig) -> Self {
        Self {
            collection,
            config,
            model: CompressionModel::default(),
            ack: AckState::new(),
            ghosts: BTreeMap::new(),
            last_applied: Tick::NONE,
            faults: 0,
            needs_resync: false,
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: CompressionModel) -> Self {
        self.model = model;
        self
    }

    #[must_use]
    pub fn collection(&self) -> &GhostCollection {
        &self.collection
    }

    #[must_use]
    pub fn ack(&self) -> &AckState {
        &self.ack
    }

    /// Tick of the newest snapshot applied.
    #[must_use]
    pub const fn last_applied_tick(&self) -> Tick {
        self.last_applied
    }

    /// Consecutive snapshots dropped as malformed.
    #[must_use]
    pub const fn faults(&self) -> u32 {
        self.faults
    }

    /// `true` after a fault until the next snapshot applies. While set, the
    /// ack advertises tick 0 so the server drops its baselines.
    #[must_use]
    pub const fn needs_resync(&self) -> bool {
        self.needs_resync
    }

    #[must_use]
    pub fn ghost(&self, id: GhostId) -> Option<&ClientGhost> {
        self.ghosts.get(&id)
    }

    pub fn ghosts(&self) -> impl Iterator<Item = &ClientGhost> {
        self.ghosts.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ghosts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ghosts.is_empty()
    }

    /// Newest confirmed record of a ghost.
    #[must_use]
    pub fn latest(&self, id: GhostId) -> Option<&SnapshotData> {
        self.ghosts.get(&id).and_then(ClientGhost::latest)
    }

    /// Decodes and applies one snapshot packet.
    ///
    /// Packets not newer than the last applied one are ignored. A malformed
    /// packet is dropped whole and counts as a fault; the configured number
    /// of consecutive faults yields [`ReceiveError::TooManyFaults`].
    pub fn apply_incoming_snapshot(
        &mut self,
        bytes: &[u8],
        now: u32,
    ) -> ReceiveResult<Vec<AppliedGhost>> {
        let (header, mut reader) = match decode_snapshot_header(bytes, &self.config.limits) {
            Ok(decoded) => decoded,
            Err(err) => return Err(self.fault(err.into())),
        };
        self.ack.apply_header(&header.ack, now);

        let tick = Tick::new(header.tick);
        let stale = tick.is_none()
            || (!self.last_applied.is_none() && !tick.is_newer_than(self.last_applied));
        if stale {
            log::debug!(
                "ignoring snapshot {} (last applied {})",
                tick.raw(),
                self.last_applied.raw()
            );
            return Ok(Vec::new());
        }

        match self.stage(&header, tick, &mut reader) {
            Ok(staged) => Ok(self.commit(tick, staged)),
            Err(err) => Err(self.fault(err)),
        }
    }

    fn fault(&mut self, err: ReceiveError) -> ReceiveError {
        self.faults = self.faults.saturating_add(1);
        self.needs_resync = true;
        self.ack.reset_received_by_local();
        log::warn!(
            "dropped snapshot ({}/{} faults): {err}",
            self.faults,
            self.config.max_faults
        );
        if self.faults >= self.config.max_faults {
            ReceiveError::TooManyFaults {
                faults: self.faults,
            }
        } else {
            err
        }
    }

    fn stage(
        &self,
        header: &SnapshotHeader,
        tick: Tick,
        reader: &mut BitReader<'_>,
    ) -> ReceiveResult<StagedSnapshot> {
        let model = &self.model;
        let mut despawns = BTreeSet::new();
        for _ in 0..header.despawn_count {
            despawns.insert(GhostId::new(reader.read_packed_uint(model)?));
        }

        let mut seen = BTreeSet::new();
        let mut updates = Vec::with_capacity(usize::from(header.update_count));
        for _ in 0..header.update_count {
            let raw_ty = reader.read_packed_uint(model)?;
            let (ty_id, ty) = u16::try_from(raw_ty)
                .ok()
                .map(GhostTypeId)
                .and_then(|id| self.collection.get(id).map(|ty| (id, ty)))
                .ok_or(ReceiveError::UnknownGhostType { ty: raw_ty })?;
            let id = GhostId::new(reader.read_packed_uint(model)?);
            if !seen.insert(id) {
                return Err(ReceiveError::DuplicateGhost { ghost: id });
            }
            let b0 = reader.read_packed_uint(model)?;
            let (b1, b2) = if b0 == 0 {
                (0, 0)
            } else {
                (reader.read_packed_uint(model)?, reader.read_packed_uint(model)?)
            };

            let mut baselines: Vec<&SnapshotData> = Vec::with_capacity(3);
            if b0 != 0 {
                let ghost = self
                    .ghosts
                    .get(&id)
                    .filter(|_| !despawns.contains(&id))
                    .ok_or(ReceiveError::MissingBaseline {
                        ghost: id,
                        tick: tick.wrapping_sub(b0),
                    })?;
                if ghost.ty != ty_id {
                    return Err(ReceiveError::TypeMismatch {
                        ghost: id,
                        expected: ghost.ty,
                        found: ty_id,
                    });
                }
                let distances = [b0, b1, b2];
                let used = if b1 != 0 && b2 != 0 { 3 } else { 1 };
                for distance in &distances[..used] {
                    let baseline_tick = tick.wrapping_sub(*distance);
                    let record = ghost.history.get(baseline_tick).ok_or(
                        ReceiveError::MissingBaseline {
                            ghost: id,
                            tick: baseline_tick,
                        },
                    )?;
                    baselines.push(record);
                }
            }

            let baseline = SnapshotData::choose_baseline(ty, tick, &baselines)?;
            let record = SnapshotData::deserialize(ty, tick, &baseline, reader, model)?;
            updates.push(StagedUpdate {
                id,
                ty: ty_id,
                record,
            });
        }

        if reader.bits_remaining() >= 8 {
            return Err(ReceiveError::TrailingData {
                bits: reader.bits_remaining(),
            });
        }
        Ok(StagedSnapshot { despawns, updates })
    }

    fn commit(&mut self, tick: Tick, staged: StagedSnapshot) -> Vec<AppliedGhost> {
        let mut applied = Vec::with_capacity(staged.despawns.len() + staged.updates.len());
        for id in staged.despawns {
            if let Some(ghost) = self.ghosts.remove(&id) {
                applied.push(AppliedGhost {
                    id,
                    ty: ghost.ty,
                    tick,
                    kind: ApplyKind::Despawned,
                });
            }
        }

        let capacity = self.config.history_capacity;
        for update in staged.updates {
            let kind = match self.ghosts.entry(update.id) {
                Entry::Occupied(mut entry) => {
                    let ghost = entry.get_mut();
                    if ghost.ty == update.ty {
                        ghost.history.add_or_replace(update.record);
                        ApplyKind::Updated
                    } else {
                        // Full update for a reused id: a different ghost.
                        ghost.ty = update.ty;
                        ghost.history.clear();
                        ghost.history.add_or_replace(update.record);
                        ApplyKind::Spawned
                    }
                }
                Entry::Vacant(entry) => {
                    let mut history = TickHistory::new(capacity);
                    history.add_or_replace(update.record);
                    entry.insert(ClientGhost {
                        id: update.id,
                        ty: update.ty,
                        history,
                    });
                    ApplyKind::Spawned
                }
            };
            applied.push(AppliedGhost {
                id: update.id,
                ty: update.ty,
                tick,
                kind,
            });
        }

        self.ack.update_received_by_local(tick);
        self.last_applied = tick;
        self.faults = 0;
        self.needs_resync = false;
        log::trace!("applied snapshot {} ({} changes)", tick.raw(), applied.len());
        applied
    }

    /// Field values of a ghost at the interpolation time in `ctx`.
    ///
    /// Blends the two records around the target; holds the newest record
    /// when the target is past it and the oldest when it is before it.
    /// Returns `Ok(None)` for unknown ghosts.
    pub fn interpolated(
        &self,
        id: GhostId,
        ctx: &SimulationContext,
    ) -> ReceiveResult<Option<Vec<FieldValue>>> {
        let Some(ghost) = self.ghosts.get(&id) else {
            return Ok(None);
        };
        let Some(ty) = self.collection.get(ghost.ty) else {
            return Ok(None);
        };
        let target = ctx.interpolate_tick;
        let Some(from) = ghost
            .history
            .get_data_at_tick(target)
            .or_else(|| ghost.history.oldest())
        else {
            return Ok(None);
        };
        let to = ghost
            .history
            .iter()
            .find(|record| record.tick.is_newer_than(from.tick));
        let blended = match to {
            Some(to) if !from.tick.is_newer_than(target) => {
                let span = to.tick.ticks_since(from.tick) as f32;
                let offset = target.ticks_since(from.tick) as f32 + ctx.interpolate_fraction;
                from.interpolate(ty, to, offset / span)?
            }
            _ => from.clone(),
        };
        Ok(Some(blended.copy_from_snapshot(ty)?))
    }

    /// Encodes a command packet for `target_tick`, acknowledging the
    /// snapshots received so far.
    ///
    /// A command is included only when `commands` holds one for exactly
    /// `target_tick`.
    pub fn build_command_packet(
        &self,
        commands: &CommandBuffer,
        layout: &CommandLayout,
        target_tick: Tick,
        now: u32,
    ) -> SendResult<Vec<u8>> {
        // Flag, tick, and at most five bytes per packed field.
        let capacity = COMMAND_HEADER_SIZE + 1 + 4 + layout.field_count() * 5;
        let mut writer = BitWriter::new(capacity);
        encode_command_header(&mut writer, &self.ack.ack_header(now))?;
        match commands
            .get_data_at_tick(target_tick)
            .filter(|command| command.tick == target_tick)
        {
            Some(command) => {
                writer.write_bool(true)?;
                writer.write_raw_bits(command.tick.raw(), 32)?;
                command.serialize(layout, &mut writer, &self.model)?;
            }
            None => writer.write_bool(false)?,
        }
        Ok(writer.finish())
    }
}
