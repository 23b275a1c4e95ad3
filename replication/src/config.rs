//! Replication and network-time configuration.

use std::num::NonZeroUsize;

use wire::Limits;

/// Knobs shared by the send and receive pipelines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationConfig {
    /// Snapshot byte budget used when the caller does not pass one.
    pub target_packet_bytes: usize,
    /// Snapshots kept per ghost (server baselines, client interpolation).
    pub history_capacity: NonZeroUsize,
    /// Commands kept per controlled entity.
    pub command_capacity: NonZeroUsize,
    /// Consecutive malformed packets tolerated before teardown.
    pub max_faults: u32,
    /// Wire limits enforced on decode and respected on encode.
    pub limits: Limits,
}

const fn capacity(value: usize) -> NonZeroUsize {
    match NonZeroUsize::new(value) {
        Some(value) => value,
        None => NonZeroUsize::MIN,
    }
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            target_packet_bytes: 1200,
            history_capacity: capacity(codec::DEFAULT_HISTORY_CAPACITY),
            command_capacity: capacity(codec::DEFAULT_HISTORY_CAPACITY),
            max_faults: 8,
            limits: Limits::default(),
        }
    }
}

impl ReplicationConfig {
    /// Small budgets and limits so tests exercise overflow paths.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            target_packet_bytes: 256,
            history_capacity: capacity(8),
            command_capacity: capacity(8),
            max_faults: 3,
            limits: Limits::for_testing(),
        }
    }
}

/// Tick rates and interpolation delay for [`crate::NetworkTime`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeConfig {
    pub sim_tick_rate: u32,
    pub net_tick_rate: u32,
    /// Interpolation delay in network ticks, used when `interpolation_ms` is 0.
    pub interpolation_ticks: u32,
    pub interpolation_ms: u32,
    /// Drift (in ticks) beyond which the target snaps instead of easing.
    pub max_drift_ticks: i32,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            sim_tick_rate: 60,
            net_tick_rate: 60,
            interpolation_ticks: 2,
            interpolation_ms: 0,
            max_drift_ticks: 10,
        }
    }
}

impl TimeConfig {
    #[must_use]
    pub fn for_testing() -> Self {
        Self::default()
    }

    /// Interpolation delay in simulation ticks, rounded up.
    #[must_use]
    pub fn interpolation_frames(&self) -> u32 {
        let net_rate = self.net_tick_rate.max(1);
        let ms = if self.interpolation_ms == 0 {
            (1000 * self.interpolation_ticks).div_ceil(net_rate)
        } else {
            self.interpolation_ms
        };
        (ms * self.sim_tick_rate).div_ceil(1000)
    }
}
