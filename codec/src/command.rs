//! Tick-stamped input records and the per-entity command buffer.

use std::num::NonZeroUsize;

use bitstream::{BitReader, BitWriter, CompressionModel};
use schema::CommandLayout;

use crate::error::{CodecError, CodecResult};
use crate::history::{TickHistory, Ticked, DEFAULT_HISTORY_CAPACITY};
use crate::Tick;

/// One input sample, keyed by the tick it affects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandData {
    pub tick: Tick,
    pub values: Vec<i32>,
}

impl Ticked for CommandData {
    fn tick(&self) -> Tick {
        self.tick
    }
}

impl CommandData {
    #[must_use]
    pub fn new(tick: Tick, values: Vec<i32>) -> Self {
        Self { tick, values }
    }

    /// Writes the field values as packed deltas against zero.
    pub fn serialize(
        &self,
        layout: &CommandLayout,
        writer: &mut BitWriter,
        model: &CompressionModel,
    ) -> CodecResult<()> {
        if self.values.len() != layout.field_count() {
            return Err(CodecError::FieldCountMismatch {
                expected: layout.field_count(),
                actual: self.values.len(),
            });
        }
        for value in &self.values {
            writer.write_packed_int_delta(*value, 0, model)?;
        }
        Ok(())
    }

    /// Reads the field values written by [`CommandData::serialize`].
    pub fn deserialize(
        layout: &CommandLayout,
        tick: Tick,
        reader: &mut BitReader<'_>,
        model: &CompressionModel,
    ) -> CodecResult<Self> {
        let values = (0..layout.field_count())
            .map(|_| reader.read_packed_int_delta(0, model))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { tick, values })
    }
}

/// Capped ring of commands for one controlled entity.
///
/// The client writes sampled input keyed by the tick it will affect; the
/// server stores received commands the same way, so both sides look up
/// "the input active at tick T" identically.
#[derive(Debug, Clone)]
pub struct CommandBuffer {
    history: TickHistory<CommandData>,
}

impl Default for CommandBuffer {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(DEFAULT_HISTORY_CAPACITY).unwrap_or(NonZeroUsize::MIN))
    }
}

impl CommandBuffer {
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            history: TickHistory::new(capacity),
        }
    }

    /// Stores a command, replacing one with the same tick or evicting the
    /// oldest when full. A full buffer drops a command older than all it holds.
    pub fn add_command_data(&mut self, command: CommandData) {
        self.history.add_or_replace(command);
    }

    /// Returns the command active at `tick` (nearest not newer).
    #[must_use]
    pub fn get_data_at_tick(&self, tick: Tick) -> Option<&CommandData> {
        self.history.get_data_at_tick(tick)
    }

    /// Returns the newest command.
    #[must_use]
    pub fn latest(&self) -> Option<&CommandData> {
        self.history.latest()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.history.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &CommandData> {
        self.history.iter()
    }
}
