//! Error types for Heatlink.

use std::io;

use thiserror::Error;

/// Result type alias for Heatlink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Heatlink.
#[derive(Error, Debug)]
pub enum Error {
    // Protocol errors
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    // Radio link errors
    #[error("radio error: {0}")]
    Radio(#[from] RadioError),

    // W-BUS errors
    #[error("W-BUS error: {0}")]
    Wbus(#[from] WbusError),

    // Command engine errors
    #[error("command rejected: {0}")]
    RejectedPreFlight(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // General errors
    #[error("internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Packet parsing and framing errors.
///
/// All of these are silent drops at the link layer: the receive path logs
/// at trace level and discards, per the propagation policy.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("invalid message type: {0}")]
    InvalidMessageType(u8),

    #[error("invalid magic/version byte: expected {expected:#04x}, got {got:#04x}")]
    InvalidMagic { expected: u8, got: u8 },

    #[error("malformed packet: wire size {0} outside accepted window")]
    InvalidWireSize(usize),

    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    #[error("checksum mismatch")]
    CrcMismatch,

    #[error("packet not addressed to this node")]
    WrongDestination,

    #[error("invalid command kind: {0}")]
    InvalidCommandKind(u8),
}

/// Radio link errors.
#[derive(Error, Debug)]
pub enum RadioError {
    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    #[error("bind failed: {0}")]
    BindFailed(String),

    #[error("radio not in a transmit-capable mode")]
    NotReady,
}

/// W-BUS transport and parser errors.
#[derive(Error, Debug)]
pub enum WbusError {
    #[error("no valid response frame within {0} ms")]
    Timeout(u64),

    #[error("command {cmd:#04x} not acknowledged after {attempts} attempts")]
    CommandFailed { cmd: u8, attempts: u8 },

    #[error("frame too long for bus: {0} payload bytes")]
    FrameTooLong(usize),

    #[error("port error: {0}")]
    Port(String),

    #[error("multi-status response not decoded")]
    NotDecoded,
}

impl Error {
    /// Check if this error is a silent-drop condition on the receive path.
    pub fn is_silent_drop(&self) -> bool {
        matches!(
            self,
            Self::Protocol(
                ProtocolError::InvalidMagic { .. }
                    | ProtocolError::InvalidWireSize(_)
                    | ProtocolError::CrcMismatch
                    | ProtocolError::WrongDestination
                    | ProtocolError::InvalidMessageType(_)
            )
        )
    }
}
