//! Link-layer framing: encrypt-then-checksum.
//!
//! On the air the payload region is AES-128-CTR ciphertext and the CRC
//! covers that ciphertext. Receive order is therefore CRC first, decrypt
//! second, magic/type validation last; anything invalid is a silent drop
//! at the call site.

use byteorder::{ByteOrder, LittleEndian};

use crate::crypto::PacketCipher;
use crate::error::{ProtocolError, Result};

use super::codec::crc16_ccitt;
use super::packet::Packet;
use super::{CRC_SIZE, HEADER_SIZE};

/// Serialize, encrypt the payload region, and append the CRC over the
/// resulting ciphertext. The returned bytes are ready for the radio.
pub fn seal(packet: &Packet, cipher: &PacketCipher) -> Vec<u8> {
    let mut buf = packet.encode_body();
    cipher.apply(&mut buf[HEADER_SIZE..], packet.seq, packet.src, packet.dst);

    let crc = crc16_ccitt(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    buf
}

/// Validate and decrypt a received frame.
///
/// Checks the size window, then the CRC over the ciphertext, then decrypts
/// in place and parses. The header travels in cleartext, so the nonce
/// inputs (seq, src, dst) are available before decryption.
pub fn open(buf: &[u8], cipher: &PacketCipher) -> Result<Packet> {
    if !super::wire_size_accepted(buf.len()) {
        return Err(ProtocolError::InvalidWireSize(buf.len()).into());
    }

    let body_len = buf.len() - CRC_SIZE;
    let wire_crc = LittleEndian::read_u16(&buf[body_len..]);
    if crc16_ccitt(&buf[..body_len]) != wire_crc {
        return Err(ProtocolError::CrcMismatch.into());
    }

    let mut body = buf[..body_len].to_vec();
    let seq = crate::types::Seq(LittleEndian::read_u16(&body[4..6]));
    let src = crate::types::NodeId::new(body[2]);
    let dst = crate::types::NodeId::new(body[3]);
    cipher.apply(&mut body[HEADER_SIZE..], seq, src, dst);

    Packet::decode_body(&body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::PresharedKey;
    use crate::protocol::{CommandPayload, Payload, StatusPayload};
    use crate::types::{CommandKind, HeaterState, NodeId, Seq};

    fn cipher() -> PacketCipher {
        PacketCipher::new(PresharedKey::new(*b"0123456789abcdef"))
    }

    #[test]
    fn seal_open_round_trip() {
        let pkt = Packet::command(
            NodeId::SENDER,
            NodeId::RECEIVER,
            Seq(42),
            CommandPayload {
                kind: CommandKind::RunMinutes,
                minutes: 20,
            },
        );

        let cipher = cipher();
        let wire = seal(&pkt, &cipher);
        assert_eq!(wire.len(), 10);
        assert_eq!(open(&wire, &cipher).unwrap(), pkt);
    }

    #[test]
    fn payload_is_not_cleartext_on_the_wire() {
        let pkt = Packet::command(
            NodeId::SENDER,
            NodeId::RECEIVER,
            Seq(1),
            CommandPayload {
                kind: CommandKind::Stop,
                minutes: 0,
            },
        );

        let wire = seal(&pkt, &cipher());
        let clear = pkt.encode();
        assert_eq!(wire[..HEADER_SIZE], clear[..HEADER_SIZE]);
        assert_ne!(wire[HEADER_SIZE..8], clear[HEADER_SIZE..8]);
    }

    #[test]
    fn crc_covers_the_ciphertext() {
        let pkt = Packet::status(
            NodeId::RECEIVER,
            NodeId::SENDER,
            Seq(3),
            StatusPayload {
                state: HeaterState::Off,
                ..StatusPayload::default()
            },
        );

        let cipher = cipher();
        let mut wire = seal(&pkt, &cipher);
        wire[HEADER_SIZE] ^= 0x80;
        assert!(matches!(
            open(&wire, &cipher),
            Err(crate::Error::Protocol(ProtocolError::CrcMismatch))
        ));
    }

    #[test]
    fn wrong_key_fails_closed() {
        let pkt = Packet::command(
            NodeId::SENDER,
            NodeId::RECEIVER,
            Seq(9),
            CommandPayload {
                kind: CommandKind::Start,
                minutes: 0,
            },
        );

        let wire = seal(&pkt, &cipher());
        let other = PacketCipher::new(PresharedKey::new(*b"fedcba9876543210"));
        // The CRC still passes (it covers ciphertext), so the failure shows
        // up as garbage payload; a command decodes only if the kind byte
        // happens to land on a valid discriminant.
        match open(&wire, &other) {
            Ok(decoded) => assert_ne!(decoded, pkt),
            Err(_) => {}
        }
    }
}
