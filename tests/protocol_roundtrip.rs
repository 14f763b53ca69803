//! Wire-contract tests for the radio packet protocol: round-trips, size
//! window boundaries, CRC and magic rejection, cipher symmetry, and the
//! quantizer error bounds.

use heatlink::crypto::{PacketCipher, PresharedKey};
use heatlink::protocol::{
    crc16_ccitt, open, seal, CommandPayload, MsgType, Packet, Payload, Power, StatusPayload,
    Temperature, Voltage, MAGIC_VERSION,
};
use heatlink::types::{CommandKind, HeaterState, NodeId, Seq};

fn cipher() -> PacketCipher {
    PacketCipher::new(PresharedKey::from_hex("000102030405060708090a0b0c0d0e0f").unwrap())
}

fn sample_command(seq: u16) -> Packet {
    Packet::command(
        NodeId::SENDER,
        NodeId::RECEIVER,
        Seq(seq),
        CommandPayload {
            kind: CommandKind::RunMinutes,
            minutes: 20,
        },
    )
}

fn sample_status(seq: u16, last_cmd_seq: u16) -> Packet {
    Packet::status(
        NodeId::RECEIVER,
        NodeId::SENDER,
        Seq(seq),
        StatusPayload {
            state: HeaterState::Running,
            minutes_remaining: 20,
            last_rssi_dbm: -91,
            last_snr_db: 6,
            last_op_state: 0x06,
            last_error_code: 0,
            last_cmd_seq: Seq(last_cmd_seq),
            temperature: Temperature::from_celsius(42),
            voltage: Voltage::from_millivolts(12150),
            power: Power::from_watts(1184),
        },
    )
}

#[test]
fn every_message_kind_round_trips() {
    let packets = [
        sample_command(42),
        sample_status(7, 42),
        Packet {
            src: NodeId::SENDER,
            dst: NodeId::RECEIVER,
            seq: Seq(9),
            payload: Payload::Ack,
        },
    ];

    for pkt in packets {
        let bytes = pkt.encode();
        assert_eq!(bytes.len(), pkt.wire_size());
        assert_eq!(Packet::decode(&bytes).unwrap(), pkt);
    }
}

#[test]
fn wire_sizes_match_the_contract() {
    assert_eq!(MsgType::Ack.wire_size(), 8);
    assert_eq!(MsgType::Command.wire_size(), 10);
    assert_eq!(MsgType::Status.wire_size(), 19);
}

#[test]
fn bytes_round_trip_through_decode_then_encode() {
    // For any byte sequence that passes validation, re-encoding must
    // reproduce it exactly; this pins the little-endian CRC storage.
    for pkt in [sample_command(0xABCD), sample_status(1, 0xFFFF)] {
        let bytes = pkt.encode();
        let reencoded = Packet::decode(&bytes).unwrap().encode();
        assert_eq!(reencoded, bytes);
    }
}

#[test]
fn boundary_sizes_are_rejected() {
    for len in [9usize, 11, 23] {
        let mut buf = vec![0u8; len];
        buf[0] = MAGIC_VERSION;
        assert!(Packet::decode(&buf).is_err(), "size {len} must be rejected");
    }
}

#[test]
fn prior_generation_magic_is_rejected() {
    let mut bytes = sample_command(1).encode();
    bytes[0] = 0x02; // ancestral version byte
    let crc = crc16_ccitt(&bytes[..8]);
    bytes[8..].copy_from_slice(&crc.to_le_bytes());
    assert!(Packet::decode(&bytes).is_err());
}

#[test]
fn sealed_frames_round_trip_and_crc_covers_ciphertext() {
    let cipher = cipher();
    let pkt = sample_status(3, 42);

    let wire = seal(&pkt, &cipher);
    assert_eq!(wire.len(), 19);
    assert_eq!(open(&wire, &cipher).unwrap(), pkt);

    // Flip one ciphertext bit: CRC must reject before decryption matters.
    let mut corrupted = wire.clone();
    corrupted[10] ^= 0x01;
    assert!(open(&corrupted, &cipher).is_err());

    // Flip a header bit: also CRC-rejected even though the header is clear.
    let mut corrupted = wire;
    corrupted[2] ^= 0x01;
    assert!(open(&corrupted, &cipher).is_err());
}

#[test]
fn ctr_is_symmetric_under_one_nonce() {
    let cipher = cipher();
    let mut buf = *b"payload bed";
    let original = buf;
    cipher.apply(&mut buf, Seq(42), NodeId::SENDER, NodeId::RECEIVER);
    cipher.apply(&mut buf, Seq(42), NodeId::SENDER, NodeId::RECEIVER);
    assert_eq!(buf, original);
}

#[test]
fn temperature_round_trips_exactly_across_its_domain() {
    for t in -50..=205i16 {
        assert_eq!(Temperature::from_celsius(t).celsius(), t);
    }
}

#[test]
fn voltage_error_is_at_most_31_millivolts() {
    for mv in 8000..=16160u16 {
        let decoded = Voltage::from_millivolts(mv).millivolts();
        assert!(decoded <= mv && mv - decoded <= 31, "mv={mv}");
    }
    // Literal value from the happy-path exchange.
    assert_eq!(Voltage::from_millivolts(12150).0, 129);
}

#[test]
fn power_error_is_at_most_15_watts() {
    for w in 0..=4080u16 {
        let decoded = Power::from_watts(w).watts();
        assert!(decoded <= w && w - decoded <= 15, "w={w}");
    }
}

#[test]
fn crc_is_ccitt_with_ffff_seed() {
    assert_eq!(crc16_ccitt(b"123456789"), 0x29B1);
    assert_eq!(crc16_ccitt(&[]), 0xFFFF);
}
