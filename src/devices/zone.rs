// MIT License
// Zone (sensor) states

use super::{EntityKind, Kind};

/// Zone state as reported by `zstats.xml`.
///
/// Sealed means nothing is detected; unsealed means the sensor is tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZoneState {
    Sealed,
    Unsealed,
    Bypassed,
    EntryDelay,
    Alarm24hr,
    Alarm,
    SealedLowBatt,
}

impl ZoneState {
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(Self::Sealed),
            1 => Some(Self::Unsealed),
            2 => Some(Self::Bypassed),
            3 => Some(Self::EntryDelay),
            4 => Some(Self::Alarm24hr),
            5 => Some(Self::Alarm),
            6 => Some(Self::SealedLowBatt),
            _ => None,
        }
    }

    /// Binary sensor vocabulary. `ON` means motion/detection.
    pub fn payload(&self) -> &'static str {
        match self {
            Self::Sealed | Self::SealedLowBatt => "OFF",
            Self::Unsealed | Self::EntryDelay | Self::Alarm24hr | Self::Alarm => "ON",
            Self::Bypassed => "unavailable",
        }
    }
}

/// Marker for the zone entity kind.
#[derive(Debug, Clone, Copy)]
pub struct Zone;

impl EntityKind for Zone {
    type State = ZoneState;

    const KIND: Kind = Kind::Zone;

    fn decode(code: u16) -> Option<ZoneState> {
        ZoneState::from_code(code)
    }

    fn payload(state: ZoneState) -> &'static str {
        state.payload()
    }
}
