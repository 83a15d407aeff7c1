// MIT License
// Partition (area) states

use super::{EntityKind, Kind};

/// Partition arm state as reported by `pstats.xml`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionState {
    /// 0
    Disarmed,
    /// 1
    AwayArmed,
    /// 2
    StayArmed,
    /// 3 - Exit delay running for a stay arm
    StayExiting,
    /// 4 - Exit delay running for an away arm
    AwayExiting,
    /// 5
    JuvenileArmed,
    /// 6
    JuvenileExiting,
    /// 7 - Disarmed with an alarm in memory
    DisarmedAlarm,
    /// 8 - Disarmed by schedule
    DisarmedScheduled,
    /// 9
    Disarming,
    /// 10
    Unknown,
}

impl PartitionState {
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(Self::Disarmed),
            1 => Some(Self::AwayArmed),
            2 => Some(Self::StayArmed),
            3 => Some(Self::StayExiting),
            4 => Some(Self::AwayExiting),
            5 => Some(Self::JuvenileArmed),
            6 => Some(Self::JuvenileExiting),
            7 => Some(Self::DisarmedAlarm),
            8 => Some(Self::DisarmedScheduled),
            9 => Some(Self::Disarming),
            10 => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Alarm control panel state vocabulary.
    pub fn payload(&self) -> &'static str {
        match self {
            Self::Disarmed | Self::DisarmedAlarm | Self::DisarmedScheduled => "disarmed",
            Self::AwayArmed => "armed_away",
            Self::StayArmed => "armed_home",
            Self::StayExiting | Self::AwayExiting | Self::JuvenileExiting => "pending",
            Self::JuvenileArmed => "armed_custom_bypass",
            Self::Disarming => "disarming",
            Self::Unknown => "unknown",
        }
    }
}

/// Target state for a partition control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesiredPartition {
    Away,
    Off,
}

impl DesiredPartition {
    /// Verb used in the `pn.php` command body.
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Away => "away",
            Self::Off => "off",
        }
    }
}

/// Marker for the partition entity kind.
#[derive(Debug, Clone, Copy)]
pub struct Partition;

impl EntityKind for Partition {
    type State = PartitionState;

    const KIND: Kind = Kind::Partition;

    fn decode(code: u16) -> Option<PartitionState> {
        PartitionState::from_code(code)
    }

    fn payload(state: PartitionState) -> &'static str {
        state.payload()
    }
}
