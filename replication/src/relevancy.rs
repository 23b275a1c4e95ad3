//! Which ghosts each connection receives.

use codec::{dequantize, SnapshotData};
use schema::GhostTypeDef;

use crate::connection::ServerConnection;
use crate::world::ServerGhost;

/// Basic 2D vector for distance queries.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn distance_sq(self, other: Self) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

/// Decides per connection and tick whether a ghost is replicated.
///
/// A ghost the connection already has that stops being relevant is
/// despawned on that client; it is spawned again when it becomes relevant.
pub trait RelevancyFilter: Send + Sync {
    fn is_relevant(
        &self,
        connection: &ServerConnection,
        ghost: &ServerGhost,
        ty: &GhostTypeDef,
        snapshot: &SnapshotData,
    ) -> bool;
}

/// Every ghost is relevant to every connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllRelevant;

impl RelevancyFilter for AllRelevant {
    fn is_relevant(
        &self,
        _connection: &ServerConnection,
        _ghost: &ServerGhost,
        _ty: &GhostTypeDef,
        _snapshot: &SnapshotData,
    ) -> bool {
        true
    }
}

/// Ghosts within `radius` of the connection's focus point.
///
/// The position is read from two quantized fields by name. Types without
/// those fields, and connections without a focus, see everything.
#[derive(Debug, Clone)]
pub struct SphereRelevancy {
    x_field: String,
    y_field: String,
    radius: f32,
}

impl SphereRelevancy {
    #[must_use]
    pub fn new(x_field: impl Into<String>, y_field: impl Into<String>, radius: f32) -> Self {
        Self {
            x_field: x_field.into(),
            y_field: y_field.into(),
            radius,
        }
    }

    fn position(&self, ty: &GhostTypeDef, snapshot: &SnapshotData) -> Option<Vec2> {
        let read = |name: &str| {
            let index = ty.field_index(name)?;
            let scale = ty.fields.get(index)?.codec.scale()?;
            let raw = *snapshot.values.get(index)?;
            Some(dequantize(raw, scale))
        };
        Some(Vec2::new(read(&self.x_field)?, read(&self.y_field)?))
    }
}

impl RelevancyFilter for SphereRelevancy {
    fn is_relevant(
        &self,
        connection: &ServerConnection,
        _ghost: &ServerGhost,
        ty: &GhostTypeDef,
        snapshot: &SnapshotData,
    ) -> bool {
        let Some(focus) = connection.focus() else {
            return true;
        };
        match self.position(ty, snapshot) {
            Some(position) => position.distance_sq(focus) <= self.radius * self.radius,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;
    use std::sync::Arc;

    use codec::{GhostId, Tick};
    use schema::{FieldDef, GhostCollection, GhostTypeId};

    use super::*;
    use crate::connection::ConnectionId;
    use crate::world::GhostWorld;
    use crate::ReplicationConfig;

    fn setup() -> (GhostWorld, GhostId, GhostId) {
        let collection = GhostCollection::builder()
            .ghost(
                GhostTypeDef::new("Asteroid")
                    .field(FieldDef::quantized("x", 100))
                    .grouped(FieldDef::quantized("y", 100)),
            )
            .ghost(GhostTypeDef::new("Score").field(FieldDef::int("points")))
            .build()
            .unwrap();
        let mut world = GhostWorld::new(Arc::new(collection), NonZeroUsize::new(4).unwrap());
        let rock = world.spawn(GhostTypeId(0), None).unwrap();
        let score = world.spawn(GhostTypeId(1), None).unwrap();
        world
            .record_snapshot(rock, SnapshotData::new(Tick::new(1), vec![3000, 4000]))
            .unwrap();
        world
            .record_snapshot(score, SnapshotData::new(Tick::new(1), vec![10]))
            .unwrap();
        (world, rock, score)
    }

    fn check(filter: &dyn RelevancyFilter, conn: &ServerConnection, world: &GhostWorld, id: GhostId) -> bool {
        let ghost = world.get(id).unwrap();
        let ty = world.collection().get(ghost.ty()).unwrap();
        let snapshot = ghost.snapshot_at(Tick::new(1)).unwrap();
        filter.is_relevant(conn, ghost, ty, snapshot)
    }

    #[test]
    fn vec2_distance_sq() {
        assert_eq!(Vec2::new(0.0, 0.0).distance_sq(Vec2::new(3.0, 4.0)), 25.0);
    }

    #[test]
    fn sphere_uses_focus_distance() {
        let (world, rock, score) = setup();
        let filter = SphereRelevancy::new("x", "y", 10.0);
        let mut conn = ServerConnection::new(ConnectionId(1), &ReplicationConfig::default());

        // No focus: everything.
        assert!(check(&filter, &conn, &world, rock));

        conn.set_focus(Some(Vec2::new(30.0, 35.0)));
        assert!(check(&filter, &conn, &world, rock));
        conn.set_focus(Some(Vec2::new(0.0, 0.0)));
        assert!(!check(&filter, &conn, &world, rock));

        // No position fields: always relevant.
        assert!(check(&filter, &conn, &world, score));
    }

    #[test]
    fn all_relevant_accepts_everything() {
        let (world, rock, _) = setup();
        let mut conn = ServerConnection::new(ConnectionId(1), &ReplicationConfig::default());
        conn.set_focus(Some(Vec2::new(-1000.0, -1000.0)));
        assert!(check(&AllRelevant, &conn, &world, rock));
    }
}
