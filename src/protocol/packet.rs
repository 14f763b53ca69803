//! Packet structure and serialization.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{ProtocolError, Result};
use crate::types::{CommandKind, HeaterState, NodeId, Seq};

use super::codec::{crc16_ccitt, Power, Temperature, Voltage};
use super::{CRC_SIZE, HEADER_SIZE, MAGIC_VERSION};

/// Message kind discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MsgType {
    /// Sender-to-receiver command.
    Command = 1,
    /// Receiver-to-sender status report; doubles as the acknowledgement.
    Status = 2,
    /// Bare acknowledgement. Kept for wire compatibility, never transmitted:
    /// the ACK convention is a Status echoing the command sequence.
    Ack = 3,
}

impl MsgType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Command),
            2 => Some(Self::Status),
            3 => Some(Self::Ack),
            _ => None,
        }
    }

    /// Payload size on the wire. The type uniquely determines it.
    pub fn payload_size(self) -> usize {
        match self {
            Self::Command => 2,
            Self::Status => 11,
            Self::Ack => 0,
        }
    }

    /// Total wire size including header and CRC.
    pub fn wire_size(self) -> usize {
        HEADER_SIZE + self.payload_size() + CRC_SIZE
    }
}

/// Command payload: verb plus duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandPayload {
    pub kind: CommandKind,
    /// Run duration in minutes. Zero on Start means "use the remembered
    /// preset"; ignored for Stop and QueryStatus.
    pub minutes: u8,
}

/// Status payload: heater state plus best-effort telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusPayload {
    pub state: HeaterState,
    /// Minutes left in the active session, 0 if unknown.
    pub minutes_remaining: u8,
    /// RSSI of the last packet the receiver decoded, dBm.
    pub last_rssi_dbm: i8,
    /// SNR of the last packet the receiver decoded, dB.
    pub last_snr_db: i8,
    /// Raw operating-state byte last read from the heater.
    pub last_op_state: u8,
    /// Last heater error code, 0 if none known.
    pub last_error_code: u8,
    /// Sequence number of the command this status acknowledges.
    pub last_cmd_seq: Seq,
    pub temperature: Temperature,
    pub voltage: Voltage,
    pub power: Power,
}

/// Tagged payload sum. The discriminant travels in the header type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    Command(CommandPayload),
    Status(StatusPayload),
    Ack,
}

impl Payload {
    pub fn msg_type(&self) -> MsgType {
        match self {
            Self::Command(_) => MsgType::Command,
            Self::Status(_) => MsgType::Status,
            Self::Ack => MsgType::Ack,
        }
    }
}

/// A complete radio packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    pub src: NodeId,
    pub dst: NodeId,
    pub seq: Seq,
    pub payload: Payload,
}

impl Packet {
    pub fn command(src: NodeId, dst: NodeId, seq: Seq, cmd: CommandPayload) -> Self {
        Self {
            src,
            dst,
            seq,
            payload: Payload::Command(cmd),
        }
    }

    pub fn status(src: NodeId, dst: NodeId, seq: Seq, status: StatusPayload) -> Self {
        Self {
            src,
            dst,
            seq,
            payload: Payload::Status(status),
        }
    }

    pub fn msg_type(&self) -> MsgType {
        self.payload.msg_type()
    }

    /// Total wire size of this packet.
    pub fn wire_size(&self) -> usize {
        self.msg_type().wire_size()
    }

    /// Encode header and payload, without the trailing CRC.
    ///
    /// This is the region the link layer encrypts (payload only) and
    /// checksums (all of it); see [`super::seal`].
    pub(super) fn encode_body(&self) -> Vec<u8> {
        let msg_type = self.msg_type();
        let mut buf = Vec::with_capacity(msg_type.wire_size());

        buf.push(MAGIC_VERSION);
        buf.push(msg_type as u8);
        buf.push(self.src.as_u8());
        buf.push(self.dst.as_u8());
        buf.extend_from_slice(&self.seq.0.to_le_bytes());

        match &self.payload {
            Payload::Command(cmd) => {
                buf.push(cmd.kind as u8);
                buf.push(cmd.minutes);
            }
            Payload::Status(st) => {
                buf.push(st.state as u8);
                buf.push(st.minutes_remaining);
                buf.push(st.last_rssi_dbm as u8);
                buf.push(st.last_snr_db as u8);
                buf.push(st.last_op_state);
                buf.push(st.last_error_code);
                buf.extend_from_slice(&st.last_cmd_seq.0.to_le_bytes());
                buf.push(st.temperature.0);
                buf.push(st.voltage.0);
                buf.push(st.power.0);
            }
            Payload::Ack => {}
        }

        debug_assert_eq!(buf.len(), HEADER_SIZE + msg_type.payload_size());
        buf
    }

    /// Serialize to wire bytes with the CRC computed over exactly the bytes
    /// written. No encryption; the link layer wraps this for the air.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = self.encode_body();
        let crc = crc16_ccitt(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Parse a header-plus-payload region (no CRC attached).
    pub(super) fn decode_body(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(ProtocolError::InvalidWireSize(buf.len() + CRC_SIZE).into());
        }

        if buf[0] != MAGIC_VERSION {
            return Err(ProtocolError::InvalidMagic {
                expected: MAGIC_VERSION,
                got: buf[0],
            }
            .into());
        }

        let msg_type = MsgType::from_u8(buf[1]).ok_or(ProtocolError::InvalidMessageType(buf[1]))?;
        if buf.len() != HEADER_SIZE + msg_type.payload_size() {
            return Err(ProtocolError::InvalidWireSize(buf.len() + CRC_SIZE).into());
        }

        let src = NodeId::new(buf[2]);
        let dst = NodeId::new(buf[3]);
        let seq = Seq(LittleEndian::read_u16(&buf[4..6]));
        let body = &buf[HEADER_SIZE..];

        let payload = match msg_type {
            MsgType::Command => {
                let kind = CommandKind::from_u8(body[0])
                    .ok_or(ProtocolError::InvalidCommandKind(body[0]))?;
                Payload::Command(CommandPayload {
                    kind,
                    minutes: body[1],
                })
            }
            MsgType::Status => Payload::Status(StatusPayload {
                state: HeaterState::from_u8(body[0]),
                minutes_remaining: body[1],
                last_rssi_dbm: body[2] as i8,
                last_snr_db: body[3] as i8,
                last_op_state: body[4],
                last_error_code: body[5],
                last_cmd_seq: Seq(LittleEndian::read_u16(&body[6..8])),
                temperature: Temperature(body[8]),
                voltage: Voltage(body[9]),
                power: Power(body[10]),
            }),
            MsgType::Ack => Payload::Ack,
        };

        Ok(Self {
            src,
            dst,
            seq,
            payload,
        })
    }

    /// Deserialize from wire bytes, verifying size window and CRC.
    ///
    /// Counterpart of [`Packet::encode`]; expects a cleartext payload.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if !super::wire_size_accepted(buf.len()) {
            return Err(ProtocolError::InvalidWireSize(buf.len()).into());
        }

        let body = &buf[..buf.len() - CRC_SIZE];
        let wire_crc = LittleEndian::read_u16(&buf[buf.len() - CRC_SIZE..]);
        if crc16_ccitt(body) != wire_crc {
            return Err(ProtocolError::CrcMismatch.into());
        }

        Self::decode_body(body)
    }
}
