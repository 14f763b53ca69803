//! In-memory radio pair for tests and bench runs.
//!
//! Two [`ChannelRadio`] endpoints connected by unbounded channels. Mode
//! semantics mirror a real transceiver: frames that arrive while the
//! endpoint is not in receive mode are lost, including the backlog that
//! accumulated before a wake.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

use super::{frame_size_plausible, RadioLink, RadioMode, ReceivedFrame};

struct AirFrame {
    bytes: Vec<u8>,
}

/// One endpoint of an in-memory radio pair.
pub struct ChannelRadio {
    tx: mpsc::UnboundedSender<AirFrame>,
    rx: mpsc::UnboundedReceiver<AirFrame>,
    mode: RadioMode,
    /// Signal metadata attached to every delivered frame.
    rssi_dbm: i16,
    snr_db: f32,
}

/// Create a connected pair of radios.
pub fn channel_pair() -> (ChannelRadio, ChannelRadio) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();

    let mk = |tx, rx| ChannelRadio {
        tx,
        rx,
        mode: RadioMode::Receive,
        rssi_dbm: -60,
        snr_db: 8.0,
    };
    (mk(a_tx, a_rx), mk(b_tx, b_rx))
}

impl ChannelRadio {
    /// Override the signal metadata reported for received frames.
    pub fn set_signal(&mut self, rssi_dbm: i16, snr_db: f32) {
        self.rssi_dbm = rssi_dbm;
        self.snr_db = snr_db;
    }

    /// Drop everything queued on the air towards this endpoint.
    fn drain_and_discard(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }
}

#[async_trait]
impl RadioLink for ChannelRadio {
    async fn send(&mut self, frame: &[u8]) -> Result<()> {
        // The peer may be gone in teardown; a lost frame is indistinguishable
        // from an out-of-range transmission, so this is not an error.
        let _ = self.tx.send(AirFrame {
            bytes: frame.to_vec(),
        });
        self.mode = RadioMode::Receive;
        Ok(())
    }

    fn try_recv(&mut self) -> Option<ReceivedFrame> {
        if self.mode != RadioMode::Receive {
            self.drain_and_discard();
            return None;
        }

        loop {
            let frame = self.rx.try_recv().ok()?;
            if frame_size_plausible(frame.bytes.len()) {
                return Some(ReceivedFrame {
                    bytes: frame.bytes,
                    rssi_dbm: self.rssi_dbm,
                    snr_db: self.snr_db,
                });
            }
            // Out-of-window frame: discard and keep looking.
        }
    }

    fn set_mode(&mut self, mode: RadioMode) {
        if mode == RadioMode::Receive && self.mode != RadioMode::Receive {
            // Frames transmitted while we were not listening never existed
            // as far as the link is concerned.
            self.drain_and_discard();
        }
        self.mode = mode;
    }

    fn mode(&self) -> RadioMode {
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_flow_between_endpoints() {
        let (mut a, mut b) = channel_pair();
        a.send(&[0u8; 10]).await.unwrap();
        let got = b.try_recv().expect("frame should arrive");
        assert_eq!(got.bytes.len(), 10);
        assert!(b.try_recv().is_none());
    }

    #[tokio::test]
    async fn send_returns_to_receive_mode() {
        let (mut a, _b) = channel_pair();
        a.set_mode(RadioMode::Idle);
        a.send(&[0u8; 8]).await.unwrap();
        assert_eq!(a.mode(), RadioMode::Receive);
    }

    #[tokio::test]
    async fn sleeping_endpoint_loses_frames() {
        let (mut a, mut b) = channel_pair();
        b.set_mode(RadioMode::Sleep);
        a.send(&[0u8; 10]).await.unwrap();
        assert!(b.try_recv().is_none());

        // Wake: the backlog from the sleep period is gone.
        b.set_mode(RadioMode::Receive);
        assert!(b.try_recv().is_none());

        // A frame sent after the wake arrives.
        a.send(&[1u8; 10]).await.unwrap();
        assert!(b.try_recv().is_some());
    }

    #[tokio::test]
    async fn out_of_window_sizes_are_discarded() {
        let (mut a, mut b) = channel_pair();
        a.send(&[0u8; 3]).await.unwrap();
        a.send(&[0u8; 64]).await.unwrap();
        a.send(&[0u8; 19]).await.unwrap();
        let got = b.try_recv().expect("valid frame should survive");
        assert_eq!(got.bytes.len(), 19);
        assert!(b.try_recv().is_none());
    }
}
