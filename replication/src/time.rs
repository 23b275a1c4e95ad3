//! Client clock: interpolation and prediction targets.
//!
//! The client tracks an estimate of the server's current tick from the
//! arrival of snapshots. Interpolation renders a fixed delay behind that
//! estimate; prediction runs ahead of it by the round trip. Both targets
//! advance by a slightly stretched or shrunk step so they converge
//! smoothly, and snap when they drift too far.

use codec::Tick;

use crate::config::TimeConfig;

/// Where the client simulates and renders this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationContext {
    /// Tick the interpolated ghosts are shown at.
    pub interpolate_tick: Tick,
    /// Fraction of a tick past `interpolate_tick`, in `[0, 1)`.
    pub interpolate_fraction: f32,
    /// Tick the predicted simulation should reach.
    pub predict_tick: Tick,
}

/// Per-frame network time estimator.
#[derive(Debug, Clone)]
pub struct NetworkTime {
    config: TimeConfig,
    latest_snapshot: Tick,
    latest_estimate: Tick,
    // Fixed point, 8 fractional bits.
    latest_age: i64,
    interpolate_tick: Tick,
    sub_interpolate: f32,
    predict_tick: Tick,
    sub_predict: f32,
}

impl NetworkTime {
    #[must_use]
    pub fn new(config: TimeConfig) -> Self {
        Self {
            config,
            latest_snapshot: Tick::NONE,
            latest_estimate: Tick::NONE,
            latest_age: 0,
            interpolate_tick: Tick::NONE,
            sub_interpolate: 0.0,
            predict_tick: Tick::NONE,
            sub_predict: 0.0,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &TimeConfig {
        &self.config
    }

    /// Current estimate of the server's tick.
    #[must_use]
    pub const fn estimated_server_tick(&self) -> Tick {
        self.latest_estimate
    }

    /// Advances one simulation frame.
    ///
    /// `last_received` is the newest snapshot tick applied and
    /// `estimated_rtt_ms` the smoothed round trip. Until a snapshot has
    /// arrived every tick in the result is [`Tick::NONE`].
    pub fn update(&mut self, last_received: Tick, estimated_rtt_ms: u32) -> SimulationContext {
        if last_received.is_none() {
            return self.context();
        }
        if self.latest_estimate.is_none() {
            self.latest_snapshot = last_received;
            self.latest_estimate = last_received;
            self.latest_age = 0;
        } else {
            self.latest_estimate = self.latest_estimate.wrapping_add(1);
            if self.latest_snapshot != last_received {
                self.latest_snapshot = last_received;
                let snapshot_age = i64::from(self.latest_estimate.signed_diff(last_received));
                self.latest_age = (self.latest_age * 7 + (snapshot_age << 8)) / 8;
                let mut delta = self.latest_age >> 8;
                if delta < 0 {
                    delta += 1;
                }
                if delta != 0 {
                    self.latest_estimate = offset(self.latest_estimate, -delta);
                    self.latest_age -= delta << 8;
                }
            }
        }

        let frames = self.config.interpolation_frames();
        let interpolate_target = self.latest_estimate.wrapping_sub(frames);
        let (tick, sub) = self.approach(
            interpolate_target,
            self.interpolate_tick,
            self.sub_interpolate,
        );
        self.interpolate_tick = tick;
        self.sub_interpolate = sub;

        let sim_rate = self.config.sim_tick_rate;
        let rtt_ticks = (u64::from(estimated_rtt_ms) * u64::from(sim_rate)).div_ceil(1000);
        let rtt_ticks = u32::try_from(rtt_ticks).unwrap_or(u32::MAX);
        let predict_target = self.latest_estimate.wrapping_add(1).wrapping_add(rtt_ticks);
        let (tick, sub) = self.approach(predict_target, self.predict_tick, self.sub_predict);
        self.predict_tick = tick;
        self.sub_predict = sub;

        self.context()
    }

    // Steps `current` one tick toward `target`, stretched by up to 20%.
    fn approach(&self, target: Tick, current: Tick, sub: f32) -> (Tick, f32) {
        if current.is_none() {
            return (target, 0.0);
        }
        let drift = target.signed_diff(current).saturating_sub(1);
        if drift.unsigned_abs() > self.config.max_drift_ticks.unsigned_abs() {
            log::debug!("time target drifted {drift} ticks, snapping");
            return (target, 0.0);
        }
        let step = 1.0 + (0.1 * drift as f32).clamp(-0.2, 0.2);
        let sub = sub + step;
        let whole = sub.floor();
        (current.wrapping_add(whole as u32), sub - whole)
    }

    fn context(&self) -> SimulationContext {
        SimulationContext {
            interpolate_tick: self.interpolate_tick,
            interpolate_fraction: self.sub_interpolate,
            predict_tick: self.predict_tick,
        }
    }
}

fn offset(tick: Tick, by: i64) -> Tick {
    let by = by.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
    if by >= 0 {
        tick.wrapping_add(by.unsigned_abs())
    } else {
        tick.wrapping_sub(by.unsigned_abs())
    }
}
