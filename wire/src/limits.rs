//! Configurable limits for bounded decoding.

/// Wire-level limits for message decoding.
///
/// Counts read from a header are checked against these before any loop
/// runs over them, so a hostile header cannot drive unbounded work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum message size in bytes.
    pub max_packet_bytes: usize,

    /// Maximum number of despawned ghost ids in one snapshot.
    pub max_despawns: usize,

    /// Maximum number of ghost updates in one snapshot.
    pub max_updates: usize,

    /// Maximum number of RPCs in one message.
    pub max_rpcs: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            // Snapshots target an MTU sized packet; leave room for larger links.
            max_packet_bytes: 16 * 1024,
            max_despawns: 1024,
            max_updates: 4096,
            max_rpcs: 256,
        }
    }
}

impl Limits {
    /// Creates limits suitable for testing with smaller values.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            max_packet_bytes: 2048,
            max_despawns: 32,
            max_updates: 64,
            max_rpcs: 16,
        }
    }

    /// Creates limits with no restrictions (use with caution).
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_packet_bytes: usize::MAX,
            max_despawns: usize::MAX,
            max_updates: usize::MAX,
            max_rpcs: usize::MAX,
        }
    }
}
