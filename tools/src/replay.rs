use std::fmt::Write as _;
use std::sync::Arc;

use replication::{ApplyKind, GhostReceiver, ReplicationConfig};
use schema::GhostCollection;
use serde::Serialize;

/// Outcome of one replayed snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayStep {
    pub name: String,
    pub bytes: usize,
    pub spawned: usize,
    pub updated: usize,
    pub despawned: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub packets: usize,
    pub failed: usize,
    /// Newest snapshot tick applied (0 when none).
    pub last_tick: u32,
    /// Ghosts alive on the replaying client at the end.
    pub ghosts: usize,
    pub steps: Vec<ReplayStep>,
}

/// Feeds captured snapshot messages, in order, through a fresh client.
///
/// A packet that fails to decode is recorded and the replay continues,
/// the same way a live client would carry on after a fault.
pub fn replay_snapshots<I>(collection: Arc<GhostCollection>, packets: I) -> ReplayReport
where
    I: IntoIterator<Item = (String, Vec<u8>)>,
{
    let mut client = GhostReceiver::new(collection, ReplicationConfig::default());
    let mut steps = Vec::new();
    for (index, (name, bytes)) in packets.into_iter().enumerate() {
        // Captures carry no clock; a monotonic stand-in keeps RTT sane.
        let now = (index as u32).wrapping_mul(16);
        let mut step = ReplayStep {
            name,
            bytes: bytes.len(),
            spawned: 0,
            updated: 0,
            despawned: 0,
            error: None,
        };
        match client.apply_incoming_snapshot(&bytes, now) {
            Ok(applied) => {
                for ghost in applied {
                    match ghost.kind {
                        ApplyKind::Spawned => step.spawned += 1,
                        ApplyKind::Updated => step.updated += 1,
                        ApplyKind::Despawned => step.despawned += 1,
                    }
                }
            }
            Err(err) => step.error = Some(err.to_string()),
        }
        steps.push(step);
    }
    ReplayReport {
        packets: steps.len(),
        failed: steps.iter().filter(|step| step.error.is_some()).count(),
        last_tick: client.last_applied_tick().raw(),
        ghosts: client.len(),
        steps,
    }
}

/// Human-readable rendering of a [`ReplayReport`].
pub fn format_replay_pretty(report: &ReplayReport) -> String {
    let mut out = String::new();
    for step in &report.steps {
        let _ = write!(
            out,
            "{}: {} bytes, +{} ~{} -{}",
            step.name, step.bytes, step.spawned, step.updated, step.despawned
        );
        if let Some(error) = &step.error {
            let _ = write!(out, " FAILED: {error}");
        }
        out.push('\n');
    }
    let _ = write!(
        out,
        "{} packets, {} failed, last tick {}, {} ghosts",
        report.packets, report.failed, report.last_tick, report.ghosts
    );
    out
}
