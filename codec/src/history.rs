//! Fixed-capacity per-entity history keyed by tick.

use std::collections::VecDeque;
use std::num::NonZeroUsize;

use crate::Tick;

/// Default history capacity for snapshots and commands.
pub const DEFAULT_HISTORY_CAPACITY: usize = 32;

/// Records that carry the tick they belong to.
pub trait Ticked {
    fn tick(&self) -> Tick;
}

/// A small ring of records ordered oldest to newest by tick.
///
/// Inserting a tick that is already present replaces it; inserting into a
/// full history evicts the oldest entry, and a record older than every
/// entry of a full history is turned away. The history therefore always
/// holds the most recent ticks it has seen. Eviction is steady-state
/// behaviour, not an error. Ordering uses wraparound-safe comparison, so
/// all live ticks must lie within half the tick range of each other.
#[derive(Debug, Clone)]
pub struct TickHistory<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T: Ticked> TickHistory<T> {
    /// Creates an empty history holding at most `capacity` records.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.get()),
            capacity: capacity.get(),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Inserts `record`, replacing an entry with the same tick.
    ///
    /// Returns the replaced or evicted record, if any. When the history is
    /// full and `record` is not newer than the oldest entry, `record` itself
    /// comes back and the history is unchanged.
    pub fn add_or_replace(&mut self, record: T) -> Option<T> {
        let tick = record.tick();
        if let Some(slot) = self.entries.iter_mut().find(|entry| entry.tick() == tick) {
            return Some(std::mem::replace(slot, record));
        }
        let mut index = self
            .entries
            .iter()
            .position(|entry| entry.tick().is_newer_than(tick))
            .unwrap_or(self.entries.len());

        let evicted = if self.entries.len() >= self.capacity {
            if index == 0 {
                return Some(record);
            }
            index -= 1;
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.insert(index, record);
        evicted
    }

    /// Returns the record with the greatest tick not newer than `target`.
    #[must_use]
    pub fn get_data_at_tick(&self, target: Tick) -> Option<&T> {
        self.entries
            .iter()
            .rev()
            .find(|entry| !entry.tick().is_newer_than(target))
    }

    /// Returns the record for exactly `tick`.
    #[must_use]
    pub fn get(&self, tick: Tick) -> Option<&T> {
        self.entries.iter().find(|entry| entry.tick() == tick)
    }

    /// Returns the newest record.
    #[must_use]
    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
    }

    /// Returns the oldest record.
    #[must_use]
    pub fn oldest(&self) -> Option<&T> {
        self.entries.front()
    }

    /// Iterates oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.entries.iter()
    }
}
