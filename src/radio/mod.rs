//! Radio link abstraction.
//!
//! A thin adapter between the packet codec and the air. The physical LoRa
//! driver lives behind [`RadioLink`]; the core only needs framed byte
//! blobs, per-frame signal metadata, and mode transitions. Scheduling is
//! cooperative: there is no background receive task, the owning loop polls
//! [`RadioLink::try_recv`] while it holds the receive window open.

mod channel;
mod udp;

pub use channel::{channel_pair, ChannelRadio};
pub use udp::UdpRadio;

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::{MAX_WIRE_SIZE, MIN_WIRE_SIZE};

/// Radio operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RadioMode {
    /// Powered down; nothing is received.
    Sleep,
    /// Standby; transmit-capable but not listening.
    Idle,
    /// Continuous receive.
    #[default]
    Receive,
}

/// A frame delivered by the radio, with the signal quality it arrived at.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedFrame {
    pub bytes: Vec<u8>,
    pub rssi_dbm: i16,
    pub snr_db: f32,
}

impl ReceivedFrame {
    /// RSSI clamped into the single signed byte the status payload carries.
    pub fn rssi_i8(&self) -> i8 {
        self.rssi_dbm.clamp(i16::from(i8::MIN), i16::from(i8::MAX)) as i8
    }

    /// SNR rounded into the single signed byte the status payload carries.
    pub fn snr_i8(&self) -> i8 {
        self.snr_db.round().clamp(f32::from(i8::MIN), f32::from(i8::MAX)) as i8
    }
}

/// Physical radio adapter.
#[async_trait]
pub trait RadioLink: Send {
    /// Queue a frame for transmission and hand it to the physical layer.
    ///
    /// On return the radio is back in receive mode: a transmitter left in
    /// standby would miss the acknowledgement that follows every command.
    async fn send(&mut self, frame: &[u8]) -> Result<()>;

    /// Non-blocking receive; at most one frame per call.
    ///
    /// Frames outside the valid wire-size window are discarded before they
    /// reach the caller. Returns `None` when not in receive mode.
    fn try_recv(&mut self) -> Option<ReceivedFrame>;

    /// Transition the radio mode. Entering receive after sleep or idle
    /// starts listening fresh; frames transmitted in the meantime are lost.
    fn set_mode(&mut self, mode: RadioMode);

    fn mode(&self) -> RadioMode;
}

/// Coarse air-frame size filter shared by implementations.
pub(crate) fn frame_size_plausible(len: usize) -> bool {
    (MIN_WIRE_SIZE..=MAX_WIRE_SIZE).contains(&len)
}
