//! Asteroids ghost collection and shared gameplay state for the reference
//! simulation.
//!
//! The server and every client step ships with the same [`step_ship`], so
//! a client replaying its own commands lands where the server did.

use codec::{FieldValue, Quat};
use schema::{CommandLayout, FieldDef, GhostCollection, GhostTypeDef, SchemaResult};

pub const SHIP: &str = "Ship";
pub const ASTEROID: &str = "Asteroid";
pub const BULLET: &str = "Bullet";

/// Positions and velocities travel with one decimal.
pub const POSITION_SCALE: u32 = 10;
pub const ROTATION_SCALE: u32 = 1000;

pub const LEVEL_WIDTH: f32 = 2048.0;
pub const LEVEL_HEIGHT: f32 = 2048.0;
pub const ASTEROID_VELOCITY: f32 = 10.0;
pub const PLAYER_FORCE: f32 = 50.0;
pub const BULLET_VELOCITY: f32 = 500.0;
/// Degrees per second.
pub const TURN_RATE: f32 = 100.0;
pub const BULLET_LIFETIME_TICKS: u32 = 90;

/// Builds the Asteroids collection: ships, asteroids and bullets.
pub fn asteroids_collection() -> SchemaResult<GhostCollection> {
    GhostCollection::builder()
        .ghost(
            GhostTypeDef::new(SHIP)
                .field(FieldDef::int("player"))
                .field(FieldDef::axis_rotation("rotation", ROTATION_SCALE))
                .field(FieldDef::int("state"))
                .field(FieldDef::quantized("x", POSITION_SCALE))
                .grouped(FieldDef::quantized("y", POSITION_SCALE))
                .field(FieldDef::quantized("vx", POSITION_SCALE))
                .grouped(FieldDef::quantized("vy", POSITION_SCALE))
                .importance(200)
                .predict_delta(true),
        )
        .ghost(
            GhostTypeDef::new(ASTEROID)
                .field(FieldDef::axis_rotation("rotation", ROTATION_SCALE))
                .field(FieldDef::quantized("x", POSITION_SCALE))
                .grouped(FieldDef::quantized("y", POSITION_SCALE))
                .importance(1)
                .predict_delta(true),
        )
        .ghost(
            GhostTypeDef::new(BULLET)
                .field(FieldDef::int("player"))
                .field(FieldDef::axis_rotation("rotation", ROTATION_SCALE))
                .field(FieldDef::quantized("x", POSITION_SCALE))
                .grouped(FieldDef::quantized("y", POSITION_SCALE))
                .importance(200)
                .predict_delta(true),
        )
        .build()
}

pub fn ship_command_layout() -> SchemaResult<CommandLayout> {
    CommandLayout::new("ShipCommand", ["left", "right", "thrust", "shoot"])
}

/// One tick of player input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShipInput {
    pub left: bool,
    pub right: bool,
    pub thrust: bool,
    pub shoot: bool,
}

impl ShipInput {
    /// Field values in [`ship_command_layout`] order.
    pub fn to_values(self) -> Vec<i32> {
        [self.left, self.right, self.thrust, self.shoot]
            .into_iter()
            .map(i32::from)
            .collect()
    }

    /// Missing or extra fields read as released.
    pub fn from_values(values: &[i32]) -> Self {
        let pressed = |index: usize| values.get(index).is_some_and(|value| *value != 0);
        Self {
            left: pressed(0),
            right: pressed(1),
            thrust: pressed(2),
            shoot: pressed(3),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShipState {
    pub player: i32,
    pub rotation: Quat,
    pub thrusting: bool,
    pub position: [f32; 2],
    pub velocity: [f32; 2],
}

impl ShipState {
    pub fn spawn(player: i32, position: [f32; 2]) -> Self {
        Self {
            player,
            rotation: Quat::IDENTITY,
            thrusting: false,
            position,
            velocity: [0.0, 0.0],
        }
    }

    pub fn to_values(&self) -> Vec<FieldValue> {
        vec![
            FieldValue::Int(self.player),
            FieldValue::Rotation(self.rotation),
            FieldValue::Int(i32::from(self.thrusting)),
            FieldValue::Float(self.position[0]),
            FieldValue::Float(self.position[1]),
            FieldValue::Float(self.velocity[0]),
            FieldValue::Float(self.velocity[1]),
        ]
    }

    /// Rebuilds a ship from replicated values; `None` on a layout mismatch.
    pub fn from_values(values: &[FieldValue]) -> Option<Self> {
        match values {
            [player, rotation, state, x, y, vx, vy] => Some(Self {
                player: player.as_int()?,
                rotation: rotation.as_rotation()?,
                thrusting: state.as_int()? != 0,
                position: [x.as_float()?, y.as_float()?],
                velocity: [vx.as_float()?, vy.as_float()?],
            }),
            _ => None,
        }
    }

    /// Where a bullet fired this tick starts and how fast it travels.
    pub fn muzzle(&self) -> BulletState {
        let (sin, cos) = self.rotation.rotation_z().sin_cos();
        BulletState {
            player: self.player,
            rotation: self.rotation,
            position: self.position,
            velocity: [-sin * BULLET_VELOCITY, cos * BULLET_VELOCITY],
            age: 0,
        }
    }
}

/// Advances a ship by one tick of `input`. Returns a bullet when the ship fires.
pub fn step_ship(ship: &mut ShipState, input: ShipInput, dt: f32) -> Option<BulletState> {
    let turn = TURN_RATE.to_radians() * dt;
    let mut angle = ship.rotation.rotation_z();
    if input.left {
        angle -= turn;
    }
    if input.right {
        angle += turn;
    }
    ship.rotation = Quat::from_rotation_z(angle);
    ship.thrusting = input.thrust;
    if input.thrust {
        let (sin, cos) = angle.sin_cos();
        ship.velocity[0] -= sin * PLAYER_FORCE * dt;
        ship.velocity[1] += cos * PLAYER_FORCE * dt;
    }
    ship.position[0] = wrap(ship.position[0] + ship.velocity[0] * dt, LEVEL_WIDTH);
    ship.position[1] = wrap(ship.position[1] + ship.velocity[1] * dt, LEVEL_HEIGHT);
    input.shoot.then(|| ship.muzzle())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AsteroidState {
    pub rotation: Quat,
    pub spin: f32,
    pub position: [f32; 2],
    pub velocity: [f32; 2],
}

impl AsteroidState {
    pub fn new(heading: f32, spin: f32, position: [f32; 2]) -> Self {
        let (sin, cos) = heading.sin_cos();
        Self {
            rotation: Quat::from_rotation_z(heading),
            spin,
            position,
            velocity: [-sin * ASTEROID_VELOCITY, cos * ASTEROID_VELOCITY],
        }
    }

    pub fn step(&mut self, dt: f32) {
        self.rotation = Quat::from_rotation_z(self.rotation.rotation_z() + self.spin * dt);
        self.position[0] = wrap(self.position[0] + self.velocity[0] * dt, LEVEL_WIDTH);
        self.position[1] = wrap(self.position[1] + self.velocity[1] * dt, LEVEL_HEIGHT);
    }

    pub fn to_values(&self) -> Vec<FieldValue> {
        vec![
            FieldValue::Rotation(self.rotation),
            FieldValue::Float(self.position[0]),
            FieldValue::Float(self.position[1]),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BulletState {
    pub player: i32,
    pub rotation: Quat,
    pub position: [f32; 2],
    pub velocity: [f32; 2],
    pub age: u32,
}

impl BulletState {
    /// Moves the bullet; `false` once it has expired.
    pub fn step(&mut self, dt: f32) -> bool {
        self.age += 1;
        self.position[0] += self.velocity[0] * dt;
        self.position[1] += self.velocity[1] * dt;
        self.age < BULLET_LIFETIME_TICKS
    }

    pub fn to_values(&self) -> Vec<FieldValue> {
        vec![
            FieldValue::Int(self.player),
            FieldValue::Rotation(self.rotation),
            FieldValue::Float(self.position[0]),
            FieldValue::Float(self.position[1]),
        ]
    }
}

fn wrap(value: f32, extent: f32) -> f32 {
    value.rem_euclid(extent)
}

#[cfg(test)]
mod tests {
    use codec::SnapshotData;

    use super::*;

    const DT: f32 = 1.0 / 60.0;

    #[test]
    fn collection_is_valid() {
        let collection = asteroids_collection().unwrap();
        assert_eq!(collection.len(), 3);
        let ship = collection.get(collection.id_of(SHIP).unwrap()).unwrap();
        assert_eq!(ship.field_count(), 7);
        assert_eq!(ship.group_count(), 5);
        assert!(ship_command_layout().is_ok());
    }

    #[test]
    fn ship_values_match_type_layout() {
        let collection = asteroids_collection().unwrap();
        let ty = collection.get(collection.id_of(SHIP).unwrap()).unwrap();
        let ship = ShipState::spawn(3, [100.0, 200.0]);
        let snapshot = SnapshotData::copy_to_snapshot(ty, &ship.to_values(), codec::Tick::new(1)).unwrap();
        let back = ShipState::from_values(&snapshot.copy_from_snapshot(ty).unwrap()).unwrap();
        assert_eq!(back.player, 3);
        assert_eq!(back.position, [100.0, 200.0]);
    }

    #[test]
    fn input_round_trips_through_command_values() {
        let input = ShipInput {
            left: true,
            thrust: true,
            ..ShipInput::default()
        };
        assert_eq!(input.to_values(), vec![1, 0, 1, 0]);
        assert_eq!(ShipInput::from_values(&input.to_values()), input);
        assert_eq!(ShipInput::from_values(&[]), ShipInput::default());
    }

    #[test]
    fn thrust_accelerates_along_heading() {
        let mut ship = ShipState::spawn(1, [10.0, 10.0]);
        let input = ShipInput {
            thrust: true,
            ..ShipInput::default()
        };
        for _ in 0..60 {
            assert!(step_ship(&mut ship, input, DT).is_none());
        }
        assert!(ship.velocity[1] > 49.0);
        assert!(ship.velocity[0].abs() < 1e-3);
        assert!(ship.position[1] > 10.0);
    }

    #[test]
    fn stepping_is_deterministic() {
        let inputs = [
            ShipInput { left: true, ..ShipInput::default() },
            ShipInput { thrust: true, ..ShipInput::default() },
            ShipInput { right: true, thrust: true, ..ShipInput::default() },
        ];
        let run = || {
            let mut ship = ShipState::spawn(1, [0.0, 0.0]);
            for input in inputs.iter().cycle().take(100) {
                step_ship(&mut ship, *input, DT);
            }
            ship
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn shooting_spawns_a_bullet_that_expires() {
        let mut ship = ShipState::spawn(2, [50.0, 50.0]);
        let input = ShipInput {
            shoot: true,
            ..ShipInput::default()
        };
        let mut bullet = step_ship(&mut ship, input, DT).unwrap();
        assert_eq!(bullet.player, 2);
        assert!(bullet.velocity[1] > 0.0);
        let mut ticks = 1;
        while bullet.step(DT) {
            ticks += 1;
        }
        assert_eq!(ticks, BULLET_LIFETIME_TICKS);
    }

    #[test]
    fn positions_wrap_around_the_level() {
        let mut rock = AsteroidState::new(0.0, 0.0, [5.0, LEVEL_HEIGHT - 0.01]);
        rock.step(1.0);
        assert!(rock.position[1] >= 0.0 && rock.position[1] < LEVEL_HEIGHT);
    }
}
