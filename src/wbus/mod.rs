//! W-BUS: single-wire automotive bus to the heater.
//!
//! 2400 baud, 8 data bits, even parity, 1 stop bit, open-collector line.
//! One frame = header, length, payload, XOR checksum. The controller
//! addresses the heater with header 0xF4; the heater answers with 0x4F and
//! sets the top bit of the command byte in its response.

mod frame;
mod parser;
mod port;
mod transport;

pub use frame::{Frame, RxStateMachine};
pub use parser::{
    map_op_state, parse_actuators, parse_component_rates, parse_counters, parse_measurements,
    parse_multi_status, parse_state_flags, response_matches, Actuators, ComponentRates, Counters,
    Measurements, MultiStatus, StateFlags,
};
pub use port::{memory_port_pair, MemoryPort, UdpBytePort, WbusPort};
pub use transport::{HeaterSession, WbusTransport};

#[cfg(feature = "serial")]
pub use port::SerialWbusPort;

use std::time::Duration;

/// Controller (diagnostics) bus address nibble.
pub const ADDR_CONTROLLER: u8 = 0xF;

/// Heater bus address nibble.
pub const ADDR_HEATER: u8 = 0x4;

/// Compose a frame header from source and destination nibbles.
pub fn make_header(src: u8, dst: u8) -> u8 {
    ((src & 0x0F) << 4) | (dst & 0x0F)
}

/// Controller-to-heater header byte (0xF4).
pub fn tx_header() -> u8 {
    make_header(ADDR_CONTROLLER, ADDR_HEATER)
}

/// Heater-to-controller header byte (0x4F).
pub fn rx_header() -> u8 {
    make_header(ADDR_HEATER, ADDR_CONTROLLER)
}

/// Responses set the top bit of the echoed command byte.
pub const RESPONSE_FLAG: u8 = 0x80;

/// Stop whatever the heater is doing.
pub const CMD_STOP: u8 = 0x10;

/// Start the parking heater; one data byte of minutes.
pub const CMD_START_HEAT: u8 = 0x21;

/// Start ventilation; one data byte of minutes.
pub const CMD_START_VENT: u8 = 0x22;

/// Keep the active session alive; small fixed payload.
pub const CMD_KEEPALIVE: u8 = 0x44;

/// Status request; one index byte, or 0x30 plus an ID list for the
/// multi-status TLV snapshot.
pub const CMD_STATUS: u8 = 0x50;

/// Multi-status TLV snapshot index.
pub const STATUS_IDX_MULTI: u8 = 0x30;

/// Operating-state index.
pub const STATUS_IDX_OP_STATE: u8 = 0x07;

/// Simple status pages used by the fallback poll path.
pub const STATUS_IDX_FLAGS_2: u8 = 0x02;
pub const STATUS_IDX_FLAGS_3: u8 = 0x03;
pub const STATUS_IDX_ACTUATORS: u8 = 0x04;
pub const STATUS_IDX_MEASUREMENTS: u8 = 0x05;
pub const STATUS_IDX_COUNTERS: u8 = 0x06;
pub const STATUS_IDX_COMPONENT_RATES: u8 = 0x0F;

/// How many times a command is retried before it is reported failed.
pub const COMMAND_RETRIES: u8 = 3;

/// How long to wait for a matching response frame.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_millis(250);

/// Keep-alive cadence while a session is active.
pub const KEEPALIVE_PERIOD: Duration = Duration::from_secs(10);

/// Renew the active command when this close to session expiry.
pub const RENEWAL_THRESHOLD: Duration = Duration::from_secs(30);

/// The ID list requested in a multi-status snapshot.
pub const MULTI_STATUS_IDS: [u8; 29] = [
    0x01, 0x03, 0x05, 0x06, 0x07, 0x08, 0x0A, 0x0C, 0x0E, 0x0F, 0x10, 0x11, 0x13, 0x1E, 0x1F,
    0x24, 0x27, 0x29, 0x2A, 0x2C, 0x2D, 0x32, 0x34, 0x3D, 0x52, 0x57, 0x5F, 0x78, 0x89,
];
