//! Heater response decoding.
//!
//! Simple status pages are fixed layouts indexed by the byte after the
//! echoed command. The multi-status TLV snapshot is a packed list of ID
//! bytes each followed by one or two value bytes; widths are fixed for the
//! documented IDs and resolved by a look-ahead heuristic for a small set
//! whose width varies between heater firmwares. All 16-bit values on the
//! bus are big-endian.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Result, WbusError};
use crate::types::HeaterState;

use super::frame::Frame;
use super::{CMD_STATUS, RESPONSE_FLAG};

/// Coarse mapping of the raw operating-state byte.
///
/// 0x04 is the documented off state; 0x00 reads as burned-out/off.
/// Everything else counts as running.
pub fn map_op_state(op_state: u8) -> HeaterState {
    match op_state {
        0x00 | 0x04 => HeaterState::Off,
        _ => HeaterState::Running,
    }
}

/// True when `frame` is the heater's response to status index `idx`:
/// heater-addressed, echoed command 0x50 with the response flag, matching
/// index byte.
pub fn response_matches(frame: &Frame, idx: u8) -> bool {
    frame.is_from_heater()
        && frame.payload.len() >= 2
        && (frame.payload[0] & !RESPONSE_FLAG) == CMD_STATUS
        && (frame.payload[0] & RESPONSE_FLAG) != 0
        && frame.payload[1] == idx
}

/// Status page 0x03: device state flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StateFlags {
    pub heat_request: bool,
    pub vent_request: bool,
    pub combustion_fan: bool,
    pub glow_plug: bool,
    pub fuel_pump: bool,
    pub nozzle_heating: bool,
}

/// Decode page 0x03. Bits 2 and 3 are reserved.
pub fn parse_state_flags(frame: &Frame) -> Result<StateFlags> {
    if !response_matches(frame, super::STATUS_IDX_FLAGS_3) || frame.payload.len() < 3 {
        return Err(WbusError::NotDecoded.into());
    }
    let bits = frame.payload[2];
    Ok(StateFlags {
        heat_request: bits & 0x01 != 0,
        vent_request: bits & 0x02 != 0,
        combustion_fan: bits & 0x10 != 0,
        glow_plug: bits & 0x20 != 0,
        fuel_pump: bits & 0x40 != 0,
        nozzle_heating: bits & 0x80 != 0,
    })
}

/// Status page 0x04: actuator levels, raw scaled bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Actuators {
    pub glow_plug_pct: u8,
    pub fuel_pump_rate: u8,
    pub combustion_fan_pct: u8,
}

/// Decode page 0x04: eight data bytes, levels at payload offsets 4..=6.
pub fn parse_actuators(frame: &Frame) -> Result<Actuators> {
    if !response_matches(frame, super::STATUS_IDX_ACTUATORS) || frame.payload.len() < 7 {
        return Err(WbusError::NotDecoded.into());
    }
    Ok(Actuators {
        glow_plug_pct: frame.payload[4],
        fuel_pump_rate: frame.payload[5],
        combustion_fan_pct: frame.payload[6],
    })
}

/// Status page 0x05: live measurements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Measurements {
    pub temperature_c: i16,
    pub voltage_mv: u16,
    pub flame_detect: u8,
    /// Heater power in tenths of a watt.
    pub power_x10: u16,
}

/// Decode page 0x05.
pub fn parse_measurements(frame: &Frame) -> Result<Measurements> {
    if !response_matches(frame, super::STATUS_IDX_MEASUREMENTS) || frame.payload.len() < 8 {
        return Err(WbusError::NotDecoded.into());
    }
    let p = &frame.payload;
    Ok(Measurements {
        temperature_c: i16::from(p[2]) - 50,
        voltage_mv: BigEndian::read_u16(&p[3..5]),
        flame_detect: p[5],
        power_x10: BigEndian::read_u16(&p[6..8]),
    })
}

/// Status page 0x06: lifetime counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Counters {
    pub working_hours: u16,
    pub working_minutes: u8,
    pub operating_hours: u16,
    pub operating_minutes: u8,
    pub start_counter: u16,
}

/// Decode page 0x06: hour/minute pairs then the start counter, big-endian.
pub fn parse_counters(frame: &Frame) -> Result<Counters> {
    if !response_matches(frame, super::STATUS_IDX_COUNTERS) || frame.payload.len() < 10 {
        return Err(WbusError::NotDecoded.into());
    }
    let p = &frame.payload;
    Ok(Counters {
        working_hours: BigEndian::read_u16(&p[2..4]),
        working_minutes: p[4],
        operating_hours: BigEndian::read_u16(&p[5..7]),
        operating_minutes: p[7],
        start_counter: BigEndian::read_u16(&p[8..10]),
    })
}

/// Status page 0x0F: component drive levels, each byte scaled by two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ComponentRates {
    pub glow_plug_power: u16,
    pub fuel_pump_freq: u16,
    pub air_fan_power: u16,
}

/// Decode page 0x0F.
pub fn parse_component_rates(frame: &Frame) -> Result<ComponentRates> {
    if !response_matches(frame, super::STATUS_IDX_COMPONENT_RATES) || frame.payload.len() < 5 {
        return Err(WbusError::NotDecoded.into());
    }
    let p = &frame.payload;
    Ok(ComponentRates {
        glow_plug_power: u16::from(p[2]) * 2,
        fuel_pump_freq: u16::from(p[3]) * 2,
        air_fan_power: u16::from(p[4]) * 2,
    })
}

/// Decoded multi-status TLV snapshot. Fields the response did not carry
/// stay `None`; `raw` holds every decoded ID.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MultiStatus {
    pub temperature_c: Option<i16>,
    pub voltage_mv: Option<u16>,
    pub power: Option<u16>,
    pub glow_resistance_mohm: Option<u16>,
    pub combustion_fan: Option<u16>,
    pub raw: std::collections::BTreeMap<u8, u16>,
}

/// IDs with a documented one-byte value.
const ONE_BYTE_IDS: [u8; 15] = [
    0x01, 0x03, 0x05, 0x06, 0x07, 0x08, 0x0A, 0x10, 0x1F, 0x24, 0x27, 0x2A, 0x2C, 0x2D, 0x32,
];

/// IDs with a documented two-byte big-endian value.
const TWO_BYTE_IDS: [u8; 9] = [0x0E, 0x0F, 0x11, 0x13, 0x1E, 0x29, 0x34, 0x3D, 0x52];

/// IDs whose width varies between heater firmwares; resolved by look-ahead.
const AMBIGUOUS_IDS: [u8; 4] = [0x57, 0x5F, 0x78, 0x89];

/// Temperature travels as one byte offset by 50.
const TEMPERATURE_ID: u8 = 0x0C;

fn is_known_id(id: u8) -> bool {
    id == TEMPERATURE_ID
        || ONE_BYTE_IDS.contains(&id)
        || TWO_BYTE_IDS.contains(&id)
        || AMBIGUOUS_IDS.contains(&id)
}

/// Decode a `{0xD0, 0x30, <TLVs>}` multi-status response.
///
/// An unknown ID aborts the whole parse: its width is unknowable, and
/// guessing would desynchronize every field after it. The caller treats
/// [`WbusError::NotDecoded`] as "fall back to simple pages".
pub fn parse_multi_status(frame: &Frame) -> Result<MultiStatus> {
    if !response_matches(frame, super::STATUS_IDX_MULTI) || frame.payload.len() < 3 {
        return Err(WbusError::NotDecoded.into());
    }

    let p = &frame.payload;
    let end = p.len();
    let mut pos = 2usize;
    let mut out = MultiStatus::default();

    // Width heuristic for the ambiguous IDs: prefer two bytes when the byte
    // two positions ahead looks like another known ID or is past the end;
    // otherwise fall back to one byte under the same test. Matches observed
    // heater firmware variants; do not "clean up".
    let take_ambiguous = |pos: &mut usize| -> Option<u16> {
        if *pos + 2 <= end {
            let after = *pos + 2;
            if after >= end || is_known_id(p[after]) {
                let v = BigEndian::read_u16(&p[*pos..*pos + 2]);
                *pos += 2;
                return Some(v);
            }
        }
        if *pos + 1 <= end {
            let after = *pos + 1;
            if after >= end || is_known_id(p[after]) {
                let v = u16::from(p[*pos]);
                *pos += 1;
                return Some(v);
            }
        }
        None
    };

    while pos < end {
        let id = p[pos];
        pos += 1;

        if id == TEMPERATURE_ID {
            if pos + 1 > end {
                return Err(WbusError::NotDecoded.into());
            }
            out.temperature_c = Some(i16::from(p[pos]) - 50);
            out.raw.insert(id, u16::from(p[pos]));
            pos += 1;
        } else if ONE_BYTE_IDS.contains(&id) {
            if pos + 1 > end {
                return Err(WbusError::NotDecoded.into());
            }
            out.raw.insert(id, u16::from(p[pos]));
            pos += 1;
        } else if TWO_BYTE_IDS.contains(&id) {
            if pos + 2 > end {
                return Err(WbusError::NotDecoded.into());
            }
            let v = BigEndian::read_u16(&p[pos..pos + 2]);
            match id {
                0x0E => out.voltage_mv = Some(v),
                0x11 => out.power = Some(v),
                0x13 => out.glow_resistance_mohm = Some(v),
                0x1E => out.combustion_fan = Some(v),
                _ => {}
            }
            out.raw.insert(id, v);
            pos += 2;
        } else if AMBIGUOUS_IDS.contains(&id) {
            let v = take_ambiguous(&mut pos).ok_or(WbusError::NotDecoded)?;
            out.raw.insert(id, v);
        } else {
            // Unknown field of unknowable width: refusing to decode beats
            // desynchronizing.
            return Err(WbusError::NotDecoded.into());
        }
    }

    Ok(out)
}
