//! Core types used throughout Heatlink.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Node identifier on the radio link.
///
/// The namespace is small and fixed: sender = 1, receiver = 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u8);

impl NodeId {
    /// The handheld sender node.
    pub const SENDER: Self = Self(1);

    /// The heater-side receiver node.
    pub const RECEIVER: Self = Self(2);

    pub fn new(id: u8) -> Self {
        Self(id)
    }

    pub fn as_u8(self) -> u8 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::SENDER => write!(f, "sender"),
            Self::RECEIVER => write!(f, "receiver"),
            Self(other) => write!(f, "node-{other}"),
        }
    }
}

/// Packet sequence number for correlation and deduplication.
///
/// Process-local monotonic counter per node, initialized to 1, advancing on
/// each transmission. Wrap is permitted; duplicate detection is by exact
/// match against the last processed sequence, never by ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Seq(pub u16);

impl Seq {
    pub const ZERO: Self = Self(0);

    pub fn new(n: u16) -> Self {
        Self(n)
    }

    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for Seq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic sequence allocator. Starts at 1; the zero value never goes on
/// the wire, so it can mean "none" in retained state.
#[derive(Debug, Clone)]
pub struct SeqCounter(Seq);

impl SeqCounter {
    pub fn new() -> Self {
        Self(Seq(1))
    }

    /// Take the next sequence number, advancing the counter.
    pub fn allocate(&mut self) -> Seq {
        let seq = self.0;
        self.0 = self.0.next();
        if self.0 == Seq::ZERO {
            self.0 = Seq(1);
        }
        seq
    }
}

impl Default for SeqCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Coarse heater state as carried in status reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum HeaterState {
    #[default]
    Unknown = 0,
    Off = 1,
    Running = 2,
    Error = 3,
}

impl HeaterState {
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Off,
            2 => Self::Running,
            3 => Self::Error,
            _ => Self::Unknown,
        }
    }

    pub fn is_running(self) -> bool {
        self == Self::Running
    }
}

impl fmt::Display for HeaterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Off => "off",
            Self::Running => "running",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Command verbs accepted by the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CommandKind {
    /// Stop the heater.
    Stop = 1,
    /// Start heating with the remembered preset duration.
    Start = 2,
    /// Start heating for an explicit number of minutes, updating the preset.
    RunMinutes = 3,
    /// Trigger exactly one W-BUS poll without starting or stopping.
    QueryStatus = 4,
}

impl CommandKind {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Stop),
            2 => Some(Self::Start),
            3 => Some(Self::RunMinutes),
            4 => Some(Self::QueryStatus),
            _ => None,
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stop => "stop",
            Self::Start => "start",
            Self::RunMinutes => "run-minutes",
            Self::QueryStatus => "query-status",
        };
        f.write_str(s)
    }
}

/// Which input path a command arrived through. Diagnostic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandSource {
    Radio,
    Button,
    Mqtt,
}

impl fmt::Display for CommandSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Radio => "lora",
            Self::Button => "button",
            Self::Mqtt => "mqtt",
        };
        f.write_str(s)
    }
}

/// Cached result of the boot-time multi-status TLV support probe.
///
/// Survives the receiver's deep-sleep cycles so the probe runs once per
/// cold boot, not once per wake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TlvSupport {
    #[default]
    Unknown,
    Unsupported,
    Supported,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_counter_starts_at_one_and_skips_zero() {
        let mut counter = SeqCounter::new();
        assert_eq!(counter.allocate(), Seq(1));
        assert_eq!(counter.allocate(), Seq(2));

        let mut counter = SeqCounter(Seq(u16::MAX));
        assert_eq!(counter.allocate(), Seq(u16::MAX));
        // Wraps past zero straight to 1.
        assert_eq!(counter.allocate(), Seq(1));
    }

    #[test]
    fn heater_state_round_trips_through_u8() {
        for state in [
            HeaterState::Unknown,
            HeaterState::Off,
            HeaterState::Running,
            HeaterState::Error,
        ] {
            assert_eq!(HeaterState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn unknown_command_kind_is_rejected() {
        assert_eq!(CommandKind::from_u8(0), None);
        assert_eq!(CommandKind::from_u8(5), None);
        assert_eq!(CommandKind::from_u8(3), Some(CommandKind::RunMinutes));
    }
}
