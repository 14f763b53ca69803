//! Checksum and quantized sensor fields.
//!
//! Three measurements whose native range exceeds one byte are carried in a
//! single byte each. Encoding saturates at the domain bounds and rounds
//! toward zero; decoding reverses the mapping exactly.

use crc::{Crc, CRC_16_IBM_3740};
use serde::{Deserialize, Serialize};

/// CRC-16/CCITT: polynomial 0x1021, initial value 0xFFFF, no final XOR.
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Compute the packet checksum over header plus payload bytes.
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

/// Heater temperature, wire-encoded as `°C + 50`.
///
/// Domain −50..=205 °C, lossless at 1 °C granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Temperature(pub u8);

impl Temperature {
    pub const MIN_C: i16 = -50;
    pub const MAX_C: i16 = 205;

    /// Encode a temperature, saturating at the domain bounds.
    pub fn from_celsius(celsius: i16) -> Self {
        let clamped = celsius.clamp(Self::MIN_C, Self::MAX_C);
        Self((clamped + 50) as u8)
    }

    pub fn celsius(self) -> i16 {
        i16::from(self.0) - 50
    }
}

/// Supply voltage, wire-encoded as `(mV − 8000) / 32`.
///
/// Domain 8000..=16160 mV, 32 mV step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Voltage(pub u8);

impl Voltage {
    pub const MIN_MV: u16 = 8000;
    pub const MAX_MV: u16 = 16160;

    /// Encode a voltage, saturating at the domain bounds.
    pub fn from_millivolts(mv: u16) -> Self {
        let clamped = mv.clamp(Self::MIN_MV, Self::MAX_MV);
        Self(((clamped - Self::MIN_MV) / 32) as u8)
    }

    pub fn millivolts(self) -> u16 {
        Self::MIN_MV + u16::from(self.0) * 32
    }
}

/// Heater power, wire-encoded as `W / 16`.
///
/// Domain 0..=4080 W, 16 W step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Power(pub u8);

impl Power {
    pub const MAX_W: u16 = 4080;

    /// Encode a power reading, saturating at the domain bound.
    pub fn from_watts(watts: u16) -> Self {
        let clamped = watts.min(Self::MAX_W);
        Self((clamped / 16) as u8)
    }

    pub fn watts(self) -> u16 {
        u16::from(self.0) * 16
    }
}
