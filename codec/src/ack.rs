//! Per-connection acknowledgement and round-trip state.

use wire::AckHeader;

use crate::Tick;

/// Number of ticks tracked by the remote-received window.
pub const REMOTE_ACK_WINDOW: u32 = 256;

const MASK_WORDS: usize = (REMOTE_ACK_WINDOW / 64) as usize;

/// What each side knows about what the other side received, plus the
/// timestamps echoed for round-trip estimation.
///
/// "Remote" fields describe ticks the peer acknowledged receiving from us;
/// "local" fields describe ticks we received from the peer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AckState {
    last_received_by_remote: Tick,
    // Bit n of the 256-bit window is `last_received_by_remote - n`.
    received_by_remote: [u64; MASK_WORDS],
    last_received_by_local: Tick,
    received_by_local_mask: u32,
    last_remote_time: u32,
    last_receive_timestamp: u32,
    last_rtt: u32,
    estimated_rtt: Option<u32>,
}

impl AckState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Newest tick the peer acknowledged.
    #[must_use]
    pub const fn last_received_by_remote(&self) -> Tick {
        self.last_received_by_remote
    }

    /// Newest tick we received from the peer.
    #[must_use]
    pub const fn last_received_by_local(&self) -> Tick {
        self.last_received_by_local
    }

    #[must_use]
    pub const fn received_by_local_mask(&self) -> u32 {
        self.received_by_local_mask
    }

    /// Merges an acknowledgement (`tick` plus a 32-tick mask) from the peer.
    ///
    /// Late acknowledgements only add bits. A tick of 0 clears the window,
    /// which is how a peer asks for baseline-free snapshots.
    pub fn update_received_by_remote(&mut self, tick: Tick, mask: u32) {
        if tick.is_none() {
            self.last_received_by_remote = Tick::NONE;
            self.received_by_remote = [0; MASK_WORDS];
            return;
        }
        if self.last_received_by_remote.is_none() {
            self.received_by_remote = [u64::from(mask), 0, 0, 0];
            self.last_received_by_remote = tick;
            return;
        }
        if !tick.is_newer_than(self.last_received_by_remote) {
            // Late ack: still fold its mask into the window.
            let offset = self.last_received_by_remote.ticks_since(tick);
            for bit in 0..32 {
                if mask & (1 << bit) != 0 {
                    self.set_remote_bit(offset + bit);
                }
            }
            return;
        }
        let shift = tick.ticks_since(self.last_received_by_remote);
        self.shift_remote_window(shift);
        self.received_by_remote[0] |= u64::from(mask);
        self.last_received_by_remote = tick;
    }

    fn set_remote_bit(&mut self, offset: u32) {
        if offset < REMOTE_ACK_WINDOW {
            self.received_by_remote[(offset / 64) as usize] |= 1u64 << (offset % 64);
        }
    }

    fn shift_remote_window(&mut self, shift: u32) {
        if shift >= REMOTE_ACK_WINDOW {
            self.received_by_remote = [0; MASK_WORDS];
            return;
        }
        let words = (shift / 64) as usize;
        let bits = shift % 64;
        let old = self.received_by_remote;
        for index in (0..MASK_WORDS).rev() {
            let source = index.checked_sub(words);
            let high = source.map_or(0, |src| old[src] << bits);
            let low = match (bits, source.and_then(|src| src.checked_sub(1))) {
                (0, _) | (_, None) => 0,
                (_, Some(src)) => old[src] >> (64 - bits),
            };
            self.received_by_remote[index] = high | low;
        }
    }

    /// Returns `true` if the peer acknowledged receiving `tick`.
    #[must_use]
    pub fn is_received_by_remote(&self, tick: Tick) -> bool {
        if tick.is_none() || self.last_received_by_remote.is_none() {
            return false;
        }
        if tick.is_newer_than(self.last_received_by_remote) {
            return false;
        }
        let offset = self.last_received_by_remote.ticks_since(tick);
        if offset >= REMOTE_ACK_WINDOW {
            return false;
        }
        self.received_by_remote[(offset / 64) as usize] & (1u64 << (offset % 64)) != 0
    }

    /// Records that we received `tick` from the peer.
    ///
    /// Returns `false` (and changes nothing) if `tick` is not newer than
    /// the newest tick already received.
    pub fn update_received_by_local(&mut self, tick: Tick) -> bool {
        if tick.is_none() {
            return false;
        }
        if !self.last_received_by_local.is_none() {
            if !tick.is_newer_than(self.last_received_by_local) {
                return false;
            }
            let shift = tick.ticks_since(self.last_received_by_local);
            self.received_by_local_mask =
                self.received_by_local_mask.checked_shl(shift).unwrap_or(0);
        }
        self.received_by_local_mask |= 1;
        self.last_received_by_local = tick;
        true
    }

    /// Forgets everything received from the peer, so the next ack
    /// advertises tick 0.
    pub fn reset_received_by_local(&mut self) {
        self.last_received_by_local = Tick::NONE;
        self.received_by_local_mask = 0;
    }

    /// Records the peer's clock and the time it echoed back to us.
    ///
    /// `returned_time` is our own earlier `local_time`, advanced by how long
    /// the peer held it, so `now - returned_time` is the round trip.
    pub fn update_remote_time(&mut self, remote_time: u32, returned_time: u32, now: u32) {
        let newer = (remote_time.wrapping_sub(self.last_remote_time) as i32) > 0
            || self.last_remote_time == 0;
        if remote_time == 0 || !newer {
            return;
        }
        self.last_remote_time = remote_time;
        self.last_receive_timestamp = now;
        if returned_time != 0 {
            let rtt = now.wrapping_sub(returned_time);
            self.last_rtt = rtt;
            self.estimated_rtt = Some(match self.estimated_rtt {
                None => rtt,
                Some(estimate) => {
                    let estimate = i64::from(estimate);
                    (estimate + (i64::from(rtt) - estimate) / 8) as u32
                }
            });
        }
    }

    /// The peer's last `local_time`, advanced by how long we held it, so the
    /// peer's round trip excludes our processing delay.
    #[must_use]
    pub const fn returned_time(&self, now: u32) -> u32 {
        if self.last_remote_time == 0 {
            return 0;
        }
        self.last_remote_time
            .wrapping_add(now.wrapping_sub(self.last_receive_timestamp))
    }

    #[must_use]
    pub const fn last_rtt(&self) -> u32 {
        self.last_rtt
    }

    /// Smoothed round-trip time in milliseconds (0 before the first sample).
    #[must_use]
    pub fn estimated_rtt(&self) -> u32 {
        self.estimated_rtt.unwrap_or(0)
    }

    /// Builds the header acknowledging what we received from the peer.
    #[must_use]
    pub const fn ack_header(&self, now: u32) -> AckHeader {
        AckHeader {
            last_received_tick: self.last_received_by_local.raw(),
            received_mask: self.received_by_local_mask,
            local_time: now,
            returned_time: self.returned_time(now),
        }
    }

    /// Applies an incoming header: the peer's ack of our ticks plus timing.
    ///
    /// A zero ack only resets the window when the header is not older than
    /// the last one applied; a reordered packet from before the first
    /// snapshot must not wipe acknowledgements.
    pub fn apply_header(&mut self, header: &AckHeader, now: u32) {
        let stale = self.last_remote_time != 0
            && (header.local_time.wrapping_sub(self.last_remote_time) as i32) < 0;
        if !(stale && header.last_received_tick == 0) {
            self.update_received_by_remote(
                Tick::new(header.last_received_tick),
                header.received_mask,
            );
        }
        self.update_remote_time(header.local_time, header.returned_time, now);
    }
}
