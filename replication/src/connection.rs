//! Per-connection replication state on the server.

use std::collections::{BTreeMap, VecDeque};

use codec::{AckState, CommandBuffer, CommandData, GhostId, SnapshotData, Tick, TickHistory};
use schema::GhostTypeId;

use crate::config::ReplicationConfig;
use crate::relevancy::Vec2;
use crate::world::GhostWorld;

/// Connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u32);

#[derive(Debug, Clone)]
struct GhostSendState {
    ty: GhostTypeId,
    // Snapshot ticks that carried this ghost, oldest first.
    sent_ticks: VecDeque<Tick>,
    last_sent: Tick,
}

#[derive(Debug, Clone)]
struct PendingDespawn {
    id: GhostId,
    sent_ticks: VecDeque<Tick>,
}

/// What the server knows about one client.
#[derive(Debug, Clone)]
pub struct ServerConnection {
    id: ConnectionId,
    ack: AckState,
    ghosts: BTreeMap<GhostId, GhostSendState>,
    despawns: Vec<PendingDespawn>,
    commands: CommandBuffer,
    focus: Option<Vec2>,
    faults: u32,
    tick_memory: usize,
}

fn push_bounded(ticks: &mut VecDeque<Tick>, tick: Tick, capacity: usize) {
    if ticks.back() == Some(&tick) {
        return;
    }
    if ticks.len() == capacity {
        ticks.pop_front();
    }
    ticks.push_back(tick);
}

impl ServerConnection {
    #[must_use]
    pub fn new(id: ConnectionId, config: &ReplicationConfig) -> Self {
        Self {
            id,
            ack: AckState::new(),
            ghosts: BTreeMap::new(),
            despawns: Vec::new(),
            commands: CommandBuffer::new(config.command_capacity),
            focus: None,
            faults: 0,
            tick_memory: config.history_capacity.get(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    #[must_use]
    pub fn ack(&self) -> &AckState {
        &self.ack
    }

    pub fn ack_mut(&mut self) -> &mut AckState {
        &mut self.ack
    }

    #[must_use]
    pub fn commands(&self) -> &CommandBuffer {
        &self.commands
    }

    /// The command to simulate at `tick`: the newest one not newer than it.
    #[must_use]
    pub fn command_at(&self, tick: Tick) -> Option<&CommandData> {
        self.commands.get_data_at_tick(tick)
    }

    pub(crate) fn store_command(&mut self, command: CommandData) {
        self.ack.update_received_by_local(command.tick);
        self.commands.add_command_data(command);
    }

    /// Sets the point relevancy filters measure distance from.
    pub fn set_focus(&mut self, focus: Option<Vec2>) {
        self.focus = focus;
    }

    #[must_use]
    pub const fn focus(&self) -> Option<Vec2> {
        self.focus
    }

    /// Consecutive malformed packets received from this client.
    #[must_use]
    pub const fn faults(&self) -> u32 {
        self.faults
    }

    pub(crate) fn record_fault(&mut self) -> u32 {
        self.faults = self.faults.saturating_add(1);
        self.faults
    }

    pub(crate) fn clear_faults(&mut self) {
        self.faults = 0;
    }

    /// `true` while the client has this ghost or has not yet acked its despawn.
    #[must_use]
    pub fn knows_ghost(&self, id: GhostId) -> bool {
        self.ghosts.contains_key(&id) || self.despawns.iter().any(|entry| entry.id == id)
    }

    /// `true` if this ghost has been sent and not despawned since.
    #[must_use]
    pub fn tracks_ghost(&self, id: GhostId) -> bool {
        self.ghosts.contains_key(&id)
    }

    /// Ghost ids whose despawn the client has not acknowledged.
    pub fn pending_despawns(&self) -> impl Iterator<Item = GhostId> + '_ {
        self.despawns.iter().map(|entry| entry.id)
    }

    /// Number of ghosts this connection has been sent.
    #[must_use]
    pub fn tracked_len(&self) -> usize {
        self.ghosts.len()
    }

    /// Forgets despawns the client acknowledged. Returns how many.
    pub(crate) fn release_acked_despawns(&mut self) -> usize {
        let before = self.despawns.len();
        let ack = &self.ack;
        self.despawns.retain(|entry| {
            !entry
                .sent_ticks
                .iter()
                .any(|tick| ack.is_received_by_remote(*tick))
        });
        before - self.despawns.len()
    }

    /// Schedules despawns for tracked ghosts that left the world.
    pub(crate) fn collect_removed(&mut self, world: &GhostWorld) {
        let removed: Vec<GhostId> = self
            .ghosts
            .keys()
            .filter(|id| !world.contains(**id))
            .copied()
            .collect();
        for id in removed {
            self.schedule_despawn(id);
        }
    }

    pub(crate) fn schedule_despawn(&mut self, id: GhostId) {
        if self.ghosts.remove(&id).is_none() {
            return;
        }
        if !self.despawns.iter().any(|entry| entry.id == id) {
            self.despawns.push(PendingDespawn {
                id,
                sent_ticks: VecDeque::new(),
            });
        }
    }

    /// Drops a pending despawn because the ghost is relevant again.
    pub(crate) fn cancel_despawn(&mut self, id: GhostId) {
        self.despawns.retain(|entry| entry.id != id);
    }

    /// Ticks since the ghost was last sent, or `None` if never sent.
    pub(crate) fn staleness(&self, id: GhostId, tick: Tick) -> Option<u32> {
        self.ghosts
            .get(&id)
            .map(|state| tick.ticks_since(state.last_sent).max(1))
    }

    /// Baselines for a delta: records this client acknowledged, newest first.
    ///
    /// Returns three records when `predict` is set and three exist, one when
    /// any exists, and none otherwise.
    pub(crate) fn acked_baselines<'a>(
        &self,
        id: GhostId,
        ty: GhostTypeId,
        history: &'a TickHistory<SnapshotData>,
        tick: Tick,
        predict: bool,
    ) -> Vec<&'a SnapshotData> {
        let Some(state) = self.ghosts.get(&id).filter(|state| state.ty == ty) else {
            return Vec::new();
        };
        let mut baselines: Vec<&SnapshotData> = history
            .iter()
            .rev()
            .filter(|record| tick.is_newer_than(record.tick))
            .filter(|record| state.sent_ticks.contains(&record.tick))
            .filter(|record| self.ack.is_received_by_remote(record.tick))
            .take(3)
            .collect();
        if !(predict && baselines.len() == 3) {
            baselines.truncate(1);
        }
        baselines
    }

    pub(crate) fn mark_sent(&mut self, id: GhostId, ty: GhostTypeId, tick: Tick) {
        let capacity = self.tick_memory;
        let state = self.ghosts.entry(id).or_insert_with(|| GhostSendState {
            ty,
            sent_ticks: VecDeque::with_capacity(capacity),
            last_sent: tick,
        });
        state.last_sent = tick;
        push_bounded(&mut state.sent_ticks, tick, capacity);
    }

    pub(crate) fn mark_despawns_sent(&mut self, ids: &[GhostId], tick: Tick) {
        let capacity = self.tick_memory;
        for entry in &mut self.despawns {
            if ids.contains(&entry.id) {
                push_bounded(&mut entry.sent_ticks, tick, capacity);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> ServerConnection {
        ServerConnection::new(ConnectionId(7), &ReplicationConfig::for_testing())
    }

    #[test]
    fn baselines_require_send_and_ack() {
        let mut conn = conn();
        let id = GhostId::new(1);
        let ty = GhostTypeId(0);
        let mut history = TickHistory::new(std::num::NonZeroUsize::new(8).unwrap());
        for tick in 1..=5 {
            history.add_or_replace(SnapshotData::new(Tick::new(tick), vec![tick as i32]));
        }
        conn.mark_sent(id, ty, Tick::new(2));
        conn.mark_sent(id, ty, Tick::new(3));
        conn.mark_sent(id, ty, Tick::new(4));
        // Client received 2 and 4 only.
        conn.ack_mut().update_received_by_remote(Tick::new(4), 0b101);

        let baselines = conn.acked_baselines(id, ty, &history, Tick::new(5), true);
        assert_eq!(baselines.len(), 1);
        assert_eq!(baselines[0].tick, Tick::new(4));

        conn.ack_mut().update_received_by_remote(Tick::new(4), 0b111);
        let baselines = conn.acked_baselines(id, ty, &history, Tick::new(5), true);
        let ticks: Vec<u32> = baselines.iter().map(|record| record.tick.raw()).collect();
        assert_eq!(ticks, vec![4, 3, 2]);

        let single = conn.acked_baselines(id, ty, &history, Tick::new(5), false);
        assert_eq!(single.len(), 1);
    }

    #[test]
    fn unsent_ghost_has_no_baselines() {
        let conn = conn();
        let history = TickHistory::new(std::num::NonZeroUsize::new(4).unwrap());
        assert!(conn
            .acked_baselines(GhostId::new(1), GhostTypeId(0), &history, Tick::new(3), true)
            .is_empty());
    }

    #[test]
    fn despawn_lifecycle() {
        let mut conn = conn();
        let id = GhostId::new(3);
        conn.mark_sent(id, GhostTypeId(0), Tick::new(10));
        assert!(conn.tracks_ghost(id));

        conn.schedule_despawn(id);
        assert!(!conn.tracks_ghost(id));
        assert!(conn.knows_ghost(id));

        conn.mark_despawns_sent(&[id], Tick::new(11));
        assert_eq!(conn.release_acked_despawns(), 0);
        conn.ack_mut().update_received_by_remote(Tick::new(11), 1);
        assert_eq!(conn.release_acked_despawns(), 1);
        assert!(!conn.knows_ghost(id));
    }

    #[test]
    fn staleness_counts_ticks_since_send() {
        let mut conn = conn();
        let id = GhostId::new(1);
        assert_eq!(conn.staleness(id, Tick::new(10)), None);
        conn.mark_sent(id, GhostTypeId(0), Tick::new(10));
        assert_eq!(conn.staleness(id, Tick::new(10)), Some(1));
        assert_eq!(conn.staleness(id, Tick::new(14)), Some(4));
    }

    #[test]
    fn sent_ticks_are_bounded() {
        let mut conn = conn();
        let id = GhostId::new(1);
        for tick in 1..=100 {
            conn.mark_sent(id, GhostTypeId(0), Tick::new(tick));
        }
        let state = conn.ghosts.get(&id).unwrap();
        assert_eq!(state.sent_ticks.len(), conn.tick_memory);
        assert_eq!(state.sent_ticks.back(), Some(&Tick::new(100)));
    }
}
