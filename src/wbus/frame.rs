//! W-BUS frame type and the byte-level receive state machine.

use super::{make_header, rx_header, tx_header, ADDR_CONTROLLER, ADDR_HEATER, RESPONSE_FLAG};

/// Longest accepted length byte. The length counts payload bytes plus the
/// trailing checksum, so the minimum is 2 (one command byte + checksum).
const MAX_LENGTH: u8 = 254;
const MIN_LENGTH: u8 = 2;

/// One bus frame. `payload` is the command byte plus command-specific data;
/// the length byte and XOR checksum are produced and consumed at the edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Compose a controller-to-heater command frame.
    pub fn command(cmd: u8, data: &[u8]) -> Self {
        let mut payload = Vec::with_capacity(1 + data.len());
        payload.push(cmd);
        payload.extend_from_slice(data);
        Self {
            header: tx_header(),
            payload,
        }
    }

    /// Compose a heater-to-controller response frame (`cmd | 0x80`).
    pub fn response(cmd: u8, data: &[u8]) -> Self {
        let mut payload = Vec::with_capacity(1 + data.len());
        payload.push(cmd | RESPONSE_FLAG);
        payload.extend_from_slice(data);
        Self {
            header: make_header(ADDR_HEATER, ADDR_CONTROLLER),
            payload,
        }
    }

    /// The command byte, response flag included.
    pub fn command_byte(&self) -> u8 {
        self.payload.first().copied().unwrap_or(0)
    }

    /// True when this frame came from the heater side.
    pub fn is_from_heater(&self) -> bool {
        self.header == rx_header()
    }

    /// True when this frame acknowledges `cmd`: heater-addressed and the
    /// echoed command byte matches with the response flag set.
    pub fn is_response_to(&self, cmd: u8) -> bool {
        let b = self.command_byte();
        self.is_from_heater() && (b & RESPONSE_FLAG) != 0 && (b & !RESPONSE_FLAG) == cmd
    }

    /// The length byte this frame carries on the wire.
    pub fn length_byte(&self) -> u8 {
        (self.payload.len() + 1) as u8
    }

    /// XOR of header, length, and every payload byte.
    pub fn checksum(&self) -> u8 {
        let mut x = self.header ^ self.length_byte();
        for b in &self.payload {
            x ^= b;
        }
        x
    }

    /// Serialize for the wire: header, length, payload, checksum.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.payload.len() + 3);
        out.push(self.header);
        out.push(self.length_byte());
        out.extend_from_slice(&self.payload);
        out.push(self.checksum());
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum RxState {
    #[default]
    FindHeader,
    ReadLength,
    ReadPayload,
}

/// Byte-level receive state machine.
///
/// Consumes the serial stream one byte at a time, discarding anything that
/// is not a plausible frame, and keeps the newest valid frame in a
/// single-slot queue. The machine returns to `FindHeader` after every
/// frame, valid or not.
#[derive(Debug, Default)]
pub struct RxStateMachine {
    state: RxState,
    header: u8,
    length: u8,
    buf: Vec<u8>,
    slot: Option<Frame>,
}

impl RxStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one received byte.
    pub fn push_byte(&mut self, b: u8) {
        match self.state {
            RxState::FindHeader => {
                // Accept either bus direction; echo of our own transmission
                // shows up on a single-wire bus.
                if b == tx_header() || b == rx_header() {
                    self.header = b;
                    self.state = RxState::ReadLength;
                }
            }
            RxState::ReadLength => {
                if (MIN_LENGTH..=MAX_LENGTH).contains(&b) {
                    self.length = b;
                    self.buf.clear();
                    self.state = RxState::ReadPayload;
                } else {
                    self.state = RxState::FindHeader;
                }
            }
            RxState::ReadPayload => {
                self.buf.push(b);
                if self.buf.len() == usize::from(self.length) {
                    self.complete_frame();
                    self.state = RxState::FindHeader;
                }
            }
        }
    }

    /// Feed a chunk of received bytes.
    pub fn feed(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.push_byte(b);
        }
    }

    fn complete_frame(&mut self) {
        let (payload, got_csum) = match self.buf.split_last() {
            Some((last, rest)) => (rest, *last),
            None => return,
        };

        let mut expected = self.header ^ self.length;
        for b in payload {
            expected ^= b;
        }

        if expected == got_csum {
            // Single-slot queue: keep the most recent valid frame.
            self.slot = Some(Frame {
                header: self.header,
                payload: payload.to_vec(),
            });
        }
    }

    /// Take the queued frame, if any.
    pub fn pop_frame(&mut self) -> Option<Frame> {
        self.slot.take()
    }
}
