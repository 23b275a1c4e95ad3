//! Server-side ghost table.
//!
//! The simulation spawns and despawns ghosts here and records each ghost's
//! quantized state once per tick, before any connection builds a snapshot.

use std::collections::{BTreeMap, VecDeque};
use std::num::NonZeroUsize;
use std::sync::Arc;

use codec::{FieldValue, GhostId, SnapshotData, Tick, TickHistory};
use schema::{GhostCollection, GhostTypeDef, GhostTypeId};

use crate::connection::{ConnectionId, ServerConnection};
use crate::error::{SendError, SendResult};

/// One live ghost and its recent records.
#[derive(Debug, Clone)]
pub struct ServerGhost {
    id: GhostId,
    ty: GhostTypeId,
    owner: Option<ConnectionId>,
    history: TickHistory<SnapshotData>,
}

impl ServerGhost {
    #[must_use]
    pub const fn id(&self) -> GhostId {
        self.id
    }

    #[must_use]
    pub const fn ty(&self) -> GhostTypeId {
        self.ty
    }

    /// Connection that controls this ghost, if any.
    #[must_use]
    pub const fn owner(&self) -> Option<ConnectionId> {
        self.owner
    }

    #[must_use]
    pub fn history(&self) -> &TickHistory<SnapshotData> {
        &self.history
    }

    /// The record for exactly `tick`.
    #[must_use]
    pub fn snapshot_at(&self, tick: Tick) -> Option<&SnapshotData> {
        self.history.get(tick)
    }
}

/// Every ghost the server replicates.
#[derive(Debug, Clone)]
pub struct GhostWorld {
    collection: Arc<GhostCollection>,
    ghosts: BTreeMap<GhostId, ServerGhost>,
    // Despawned ids some connection may still know about.
    despawned: Vec<GhostId>,
    free_ids: VecDeque<GhostId>,
    next_id: u32,
    history_capacity: NonZeroUsize,
}

impl GhostWorld {
    #[must_use]
    pub fn new(collection: Arc<GhostCollection>, history_capacity: NonZeroUsize) -> Self {
        Self {
            collection,
            ghosts: BTreeMap::new(),
            despawned: Vec::new(),
            free_ids: VecDeque::new(),
            next_id: 1,
            history_capacity,
        }
    }

    #[must_use]
    pub fn collection(&self) -> &GhostCollection {
        &self.collection
    }

    /// Registers a new ghost of type `ty` and returns its id.
    ///
    /// Ids start at 1. A despawned id is handed out again only after
    /// [`GhostWorld::release_despawned`] saw every connection forget it.
    pub fn spawn(&mut self, ty: GhostTypeId, owner: Option<ConnectionId>) -> SendResult<GhostId> {
        if self.collection.get(ty).is_none() {
            return Err(SendError::UnknownGhostType { ty });
        }
        let id = match self.free_ids.pop_front() {
            Some(id) => id,
            None => {
                if self.next_id == u32::MAX {
                    return Err(SendError::GhostIdsExhausted);
                }
                let id = GhostId::new(self.next_id);
                self.next_id += 1;
                id
            }
        };
        self.ghosts.insert(
            id,
            ServerGhost {
                id,
                ty,
                owner,
                history: TickHistory::new(self.history_capacity),
            },
        );
        log::debug!("spawned ghost {} of type {}", id.raw(), ty.get());
        Ok(id)
    }

    /// Removes a ghost. Connections that know it will send a despawn.
    pub fn despawn(&mut self, id: GhostId) -> SendResult<()> {
        if self.ghosts.remove(&id).is_none() {
            return Err(SendError::UnknownGhost { id });
        }
        self.despawned.push(id);
        log::debug!("despawned ghost {}", id.raw());
        Ok(())
    }

    /// Quantizes live values and stores them as the ghost's record for `tick`.
    pub fn record(&mut self, id: GhostId, tick: Tick, values: &[FieldValue]) -> SendResult<()> {
        let ty = self.type_of(id)?;
        let snapshot = SnapshotData::copy_to_snapshot(ty, values, tick)?;
        self.insert_snapshot(id, snapshot);
        Ok(())
    }

    /// Stores an already quantized record.
    pub fn record_snapshot(&mut self, id: GhostId, snapshot: SnapshotData) -> SendResult<()> {
        let expected = self.type_of(id)?.field_count();
        if snapshot.values.len() != expected {
            return Err(codec::CodecError::FieldCountMismatch {
                expected,
                actual: snapshot.values.len(),
            }
            .into());
        }
        self.insert_snapshot(id, snapshot);
        Ok(())
    }

    fn type_of(&self, id: GhostId) -> SendResult<&GhostTypeDef> {
        let ghost = self.ghosts.get(&id).ok_or(SendError::UnknownGhost { id })?;
        self.collection
            .get(ghost.ty)
            .ok_or(SendError::UnknownGhostType { ty: ghost.ty })
    }

    fn insert_snapshot(&mut self, id: GhostId, snapshot: SnapshotData) {
        if let Some(ghost) = self.ghosts.get_mut(&id) {
            ghost.history.add_or_replace(snapshot);
        }
    }

    /// Returns despawned ids no connection still tracks to the free list.
    ///
    /// Returns the number of ids released.
    pub fn release_despawned(&mut self, connections: &[ServerConnection]) -> usize {
        let before = self.free_ids.len();
        let free_ids = &mut self.free_ids;
        self.despawned.retain(|id| {
            let known = connections.iter().any(|conn| conn.knows_ghost(*id));
            if !known {
                free_ids.push_back(*id);
            }
            known
        });
        self.free_ids.len() - before
    }

    #[must_use]
    pub fn get(&self, id: GhostId) -> Option<&ServerGhost> {
        self.ghosts.get(&id)
    }

    #[must_use]
    pub fn contains(&self, id: GhostId) -> bool {
        self.ghosts.contains_key(&id)
    }

    /// Ghosts in id order.
    pub fn iter(&self) -> impl Iterator<Item = &ServerGhost> {
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReplicationConfig;
    use schema::{FieldDef, GhostTypeDef};

    fn world() -> GhostWorld {
        let collection = GhostCollection::builder()
            .ghost(
                GhostTypeDef::new("Asteroid")
                    .field(FieldDef::quantized("x", 100))
                    .grouped(FieldDef::quantized("y", 100)),
            )
            .build()
            .unwrap();
        GhostWorld::new(Arc::new(collection), NonZeroUsize::new(4).unwrap())
    }

    #[test]
    fn ids_start_at_one() {
        let mut world = world();
        let a = world.spawn(GhostTypeId(0), None).unwrap();
        let b = world.spawn(GhostTypeId(0), None).unwrap();
        assert_eq!(a, GhostId::new(1));
        assert_eq!(b, GhostId::new(2));
        assert_eq!(world.len(), 2);
    }

    #[test]
    fn spawn_rejects_unknown_type() {
        let mut world = world();
        assert!(matches!(
            world.spawn(GhostTypeId(3), None),
            Err(SendError::UnknownGhostType { .. })
        ));
    }

    #[test]
    fn record_quantizes_into_history() {
        let mut world = world();
        let id = world.spawn(GhostTypeId(0), None).unwrap();
        world
            .record(id, Tick::new(5), &[FieldValue::Float(1.5), FieldValue::Float(-2.0)])
            .unwrap();
        let snapshot = world.get(id).unwrap().snapshot_at(Tick::new(5)).unwrap();
        assert_eq!(snapshot.values, vec![150, -200]);
    }

    #[test]
    fn record_snapshot_checks_arity() {
        let mut world = world();
        let id = world.spawn(GhostTypeId(0), None).unwrap();
        let err = world
            .record_snapshot(id, SnapshotData::new(Tick::new(1), vec![1]))
            .unwrap_err();
        assert!(matches!(err, SendError::Codec(_)));
    }

    #[test]
    fn despawned_ids_are_reused_once_released() {
        let mut world = world();
        let a = world.spawn(GhostTypeId(0), None).unwrap();
        world.despawn(a).unwrap();
        assert!(world.despawn(a).is_err());

        let conn = ServerConnection::new(ConnectionId(1), &ReplicationConfig::default());
        assert_eq!(world.release_despawned(std::slice::from_ref(&conn)), 1);
        assert_eq!(world.spawn(GhostTypeId(0), None).unwrap(), a);
    }
}
