//! Ghost replication: the server send pipeline, the client receive
//! pipeline, commands, RPCs and network time.
//!
//! - [`GhostWorld`]: the server's ghosts and their per-tick records
//! - [`GhostSender`]: builds one budgeted snapshot per [`ServerConnection`]
//!   and ingests command packets
//! - [`GhostReceiver`]: applies snapshots on the client, serves
//!   interpolated values and builds command packets
//! - [`NetworkTime`]: interpolation and prediction targets per frame
//! - [`replay_prediction`]: re-simulation from the last confirmed state
//! - [`RpcRegistry`] / [`RpcQueue`]: typed one-off messages
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use codec::{FieldValue, Tick};
//! use replication::{ConnectionId, GhostReceiver, GhostSender, GhostWorld, ReplicationConfig, ServerConnection};
//! use schema::{FieldDef, GhostCollection, GhostTypeDef};
//!
//! let collection = Arc::new(
//!     GhostCollection::builder()
//!         .ghost(
//!             GhostTypeDef::new("Asteroid")
//!                 .field(FieldDef::quantized("x", 100))
//!                 .grouped(FieldDef::quantized("y", 100)),
//!         )
//!         .build()
//!         .unwrap(),
//! );
//! let config = ReplicationConfig::default();
//! let mut world = GhostWorld::new(collection.clone(), config.history_capacity);
//! let rock = world.spawn(collection.id_of("Asteroid").unwrap(), None).unwrap();
//! world.record(rock, Tick::new(1), &[FieldValue::Float(1.5), FieldValue::Float(2.0)]).unwrap();
//!
//! let sender = GhostSender::new(config.clone());
//! let mut conn = ServerConnection::new(ConnectionId(1), &config);
//! let packet = sender
//!     .build_outgoing_snapshot(&mut conn, &world, Tick::new(1), config.target_packet_bytes, 0)
//!     .unwrap();
//!
//! let mut client = GhostReceiver::new(collection, config);
//! let applied = client.apply_incoming_snapshot(&packet.bytes, 0).unwrap();
//! assert_eq!(applied.len(), 1);
//! assert_eq!(client.latest(rock).unwrap().values, vec![150, 200]);
//! ```

mod config;
mod connection;
mod error;
mod prediction;
mod receive;
mod relevancy;
mod rpc;
mod send;
mod time;
mod world;

pub use config::{ReplicationConfig, TimeConfig};
pub use connection::{ConnectionId, ServerConnection};
pub use error::{ReceiveError, ReceiveResult, RpcError, RpcResult, SendError, SendResult};
pub use prediction::{replay_prediction, MAX_PREDICTION_TICKS};
pub use receive::{AppliedGhost, ApplyKind, ClientGhost, GhostReceiver};
pub use relevancy::{AllRelevant, RelevancyFilter, SphereRelevancy, Vec2};
pub use rpc::{Handshake, RpcCommand, RpcQueue, RpcRegistry, MAX_RPC_MESSAGE_BYTES};
pub use send::{GhostSender, OutgoingSnapshot, SnapshotStats, TypeStats};
pub use time::{NetworkTime, SimulationContext};
pub use world::{GhostWorld, ServerGhost};
