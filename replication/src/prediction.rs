//! Client-side prediction replay.

use codec::{CommandBuffer, CommandData, Tick};

use crate::error::{ReceiveError, ReceiveResult};

/// Longest replay allowed, in ticks.
pub const MAX_PREDICTION_TICKS: u32 = 256;

/// Re-simulates from the last confirmed server state up to `target`.
///
/// `step` runs once for every tick after `confirmed` up to and including
/// `target`, with the newest command not newer than that tick. Returns the
/// number of ticks stepped; nothing runs when `target` is not ahead of
/// `confirmed`.
pub fn replay_prediction<S, F>(
    confirmed: Tick,
    target: Tick,
    commands: &CommandBuffer,
    state: &mut S,
    mut step: F,
) -> ReceiveResult<u32>
where
    F: FnMut(&mut S, Tick, Option<&CommandData>),
{
    if !target.is_newer_than(confirmed) {
        return Ok(0);
    }
    let ticks = target.ticks_since(confirmed);
    if ticks > MAX_PREDICTION_TICKS {
        return Err(ReceiveError::PredictionTooFar {
            ticks,
            max: MAX_PREDICTION_TICKS,
        });
    }
    let mut tick = confirmed;
    for _ in 0..ticks {
        tick = tick.wrapping_add(1);
        step(state, tick, commands.get_data_at_tick(tick));
    }
    log::trace!("predicted {ticks} ticks to {}", target.raw());
    Ok(ticks)
}
