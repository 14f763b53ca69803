//! UDP-backed bench radio.
//!
//! Stands in for the physical LoRa driver when the two nodes run on a desk:
//! one datagram per air frame, point-to-point between two socket addresses.
//! Signal metadata is synthesized since there is no RF path to measure.

use std::net::SocketAddr;

use async_trait::async_trait;
use rand::Rng;
use tokio::net::UdpSocket;

use crate::error::{RadioError, Result};

use super::{frame_size_plausible, RadioLink, RadioMode, ReceivedFrame};

pub struct UdpRadio {
    socket: UdpSocket,
    peer: SocketAddr,
    mode: RadioMode,
}

impl UdpRadio {
    /// Bind a bench radio and point it at its peer node.
    pub async fn bind(local: SocketAddr, peer: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|e| RadioError::BindFailed(e.to_string()))?;
        Ok(Self {
            socket,
            peer,
            mode: RadioMode::Receive,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    fn drain_and_discard(&mut self) {
        let mut buf = [0u8; 256];
        while self.socket.try_recv_from(&mut buf).is_ok() {}
    }
}

#[async_trait]
impl RadioLink for UdpRadio {
    async fn send(&mut self, frame: &[u8]) -> Result<()> {
        self.socket
            .send_to(frame, self.peer)
            .await
            .map_err(|e| RadioError::SendFailed(e.to_string()))?;
        self.mode = RadioMode::Receive;
        Ok(())
    }

    fn try_recv(&mut self) -> Option<ReceivedFrame> {
        if self.mode != RadioMode::Receive {
            self.drain_and_discard();
            return None;
        }

        let mut buf = [0u8; 256];
        loop {
            let (len, from) = self.socket.try_recv_from(&mut buf).ok()?;
            if from != self.peer || !frame_size_plausible(len) {
                continue;
            }
            let mut rng = rand::thread_rng();
            return Some(ReceivedFrame {
                bytes: buf[..len].to_vec(),
                rssi_dbm: rng.gen_range(-70..-50),
                snr_db: rng.gen_range(6.0..10.0),
            });
        }
    }

    fn set_mode(&mut self, mode: RadioMode) {
        if mode == RadioMode::Receive && self.mode != RadioMode::Receive {
            self.drain_and_discard();
        }
        self.mode = mode;
    }

    fn mode(&self) -> RadioMode {
        self.mode
    }
}
