// MIT License
// Entity kinds and their state vocabularies

pub mod output;
pub mod partition;
pub mod system;
pub mod zone;

use std::fmt;

pub use output::{DesiredOutput, Output, OutputState};
pub use partition::{DesiredPartition, Partition, PartitionState};
pub use system::{DeviceIdentity, Privileges};
pub use zone::{Zone, ZoneState};

/// The three kinds of entity the panel exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    Partition,
    Zone,
    Output,
}

impl Kind {
    /// Prefix used to build stable unique ids (`partition-3`, `zone-11`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Partition => "partition",
            Self::Zone => "zone",
            Self::Output => "output",
        }
    }

    /// Whether entities of this kind accept commands.
    pub fn is_controllable(&self) -> bool {
        matches!(self, Self::Partition | Self::Output)
    }

    pub fn unique_id(&self, index: u32) -> String {
        format!("{}-{index}", self.as_str())
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-kind decode and publish tables.
///
/// Partitions, zones and outputs share the same status shape and only differ
/// in how raw wire codes are named and published, so the diff engine is
/// written once against this trait.
pub trait EntityKind: Send + Sync + 'static {
    type State: Copy + Eq + fmt::Debug + Send + Sync + 'static;

    const KIND: Kind;

    /// Map a raw wire code to a state. `None` when the code is not in the table.
    fn decode(code: u16) -> Option<Self::State>;

    /// The payload published for a state.
    fn payload(state: Self::State) -> &'static str;
}

/// The last state observed for an entity.
///
/// Unmapped codes are remembered too, so the same unhandled transition is
/// reported once rather than on every poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observed<S> {
    Known(S),
    Unmapped(u16),
}

impl<S: Copy> Observed<S> {
    pub fn known(&self) -> Option<S> {
        match self {
            Self::Known(s) => Some(*s),
            Self::Unmapped(_) => None,
        }
    }
}
