//! Core types for the codec.

/// A server simulation tick.
///
/// Ticks wrap at `u32::MAX`, so they are compared by signed difference
/// rather than by value and deliberately do not implement `Ord`. Tick 0
/// is reserved to mean "no tick".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Tick(u32);

impl Tick {
    /// The reserved "no tick" value.
    pub const NONE: Self = Self(0);

    /// Creates a tick from its raw value.
    #[must_use]
    pub const fn new(tick: u32) -> Self {
        Self(tick)
    }

    /// Returns the raw tick value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns `true` for the reserved "no tick" value.
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if `self` is strictly newer than `other`, across
    /// wraparound.
    #[must_use]
    pub const fn is_newer_than(self, other: Self) -> bool {
        (self.0.wrapping_sub(other.0) as i32) > 0
    }

    /// Number of ticks from `older` to `self` (wrapping).
    #[must_use]
    pub const fn ticks_since(self, older: Self) -> u32 {
        self.0.wrapping_sub(older.0)
    }

    /// Signed distance from `other` to `self`.
    #[must_use]
    pub const fn signed_diff(self, other: Self) -> i32 {
        self.0.wrapping_sub(other.0) as i32
    }

    #[must_use]
    pub const fn wrapping_add(self, ticks: u32) -> Self {
        Self(self.0.wrapping_add(ticks))
    }

    #[must_use]
    pub const fn wrapping_sub(self, ticks: u32) -> Self {
        Self(self.0.wrapping_sub(ticks))
    }

    /// The following tick, skipping the reserved zero on wraparound.
    #[must_use]
    pub const fn next(self) -> Self {
        let next = self.0.wrapping_add(1);
        if next == 0 {
            Self(1)
        } else {
            Self(next)
        }
    }
}

impl From<u32> for Tick {
    fn from(tick: u32) -> Self {
        Self(tick)
    }
}

impl From<Tick> for u32 {
    fn from(tick: Tick) -> Self {
        tick.0
    }
}

/// A server-assigned ghost identifier.
///
/// Ids start at 1; 0 is reserved. An id is stable for the lifetime of the
/// ghost and only reused after every connection acknowledged its despawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct GhostId(u32);

impl GhostId {
    /// Creates a ghost id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns `true` for the reserved id 0.
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for GhostId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<GhostId> for u32 {
    fn from(id: GhostId) -> Self {
        id.0
    }
}
