// MIT License
// Output (relay/siren) states

use super::{EntityKind, Kind};

/// Output state as reported by `ostats.xml`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputState {
    Idle,
    Active,
    IdleFault,
    ActiveFault,
    IdleDelay,
    ActiveDelay,
    IdleFaultDelay,
    ActiveFaultDelay,
    Unknown,
}

impl OutputState {
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(Self::Idle),
            1 => Some(Self::Active),
            2 => Some(Self::IdleFault),
            3 => Some(Self::ActiveFault),
            4 => Some(Self::IdleDelay),
            5 => Some(Self::ActiveDelay),
            6 => Some(Self::IdleFaultDelay),
            7 => Some(Self::ActiveFaultDelay),
            8 => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Whether the output is energised, regardless of fault/delay qualifiers.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Active | Self::ActiveFault | Self::ActiveDelay | Self::ActiveFaultDelay
        )
    }

    /// Switch vocabulary.
    pub fn payload(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            s if s.is_active() => "ON",
            _ => "OFF",
        }
    }
}

/// Target state for an output control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesiredOutput {
    On,
    Off,
}

impl DesiredOutput {
    /// Verb used in the `ot.php` command body.
    pub fn verb(&self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
        }
    }
}

/// Marker for the output entity kind.
#[derive(Debug, Clone, Copy)]
pub struct Output;

impl EntityKind for Output {
    type State = OutputState;

    const KIND: Kind = Kind::Output;

    fn decode(code: u16) -> Option<OutputState> {
        OutputState::from_code(code)
    }

    fn payload(state: OutputState) -> &'static str {
        state.payload()
    }
}
