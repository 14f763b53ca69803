//! Byte-level port behind the W-BUS transport.
//!
//! The transport owns framing and timing; a [`WbusPort`] only moves raw
//! bytes and exposes the low-level line controls the one-time break pulse
//! needs. Implementations here are bench adapters: an in-memory duplex
//! pair and a UDP datagram port. A real K-line interface plugs in behind
//! the same trait (feature `serial`).

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use crate::error::{Result, WbusError};

/// Raw byte I/O plus line controls for the break pulse.
#[async_trait]
pub trait WbusPort: Send {
    /// Write bytes and flush them onto the line.
    async fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    /// Non-blocking read of whatever has arrived; returns the byte count.
    fn try_read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Gate the UART framing off or on around manual line driving.
    async fn uart_enable(&mut self, _on: bool) -> Result<()> {
        Ok(())
    }

    /// Drive the line level directly while the UART is disabled.
    async fn drive_line(&mut self, _high: bool) -> Result<()> {
        Ok(())
    }

    /// Optional transmitter-enable gate on the physical interface.
    fn set_tx_enable(&mut self, _on: bool) {}
}

/// In-memory duplex byte port; one end of a pair.
pub struct MemoryPort {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    pending: Vec<u8>,
}

/// Create a connected pair of in-memory ports (controller end, heater end).
pub fn memory_port_pair() -> (MemoryPort, MemoryPort) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    let mk = |tx, rx| MemoryPort {
        tx,
        rx,
        pending: Vec::new(),
    };
    (mk(a_tx, a_rx), mk(b_tx, b_rx))
}

#[async_trait]
impl WbusPort for MemoryPort {
    async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.tx
            .send(bytes.to_vec())
            .map_err(|_| WbusError::Port("peer gone".into()))?;
        Ok(())
    }

    fn try_read(&mut self, buf: &mut [u8]) -> Result<usize> {
        while let Ok(chunk) = self.rx.try_recv() {
            self.pending.extend_from_slice(&chunk);
        }
        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

/// Bytes-over-UDP bench port, for wiring the receiver binary to the
/// simulator binary on a desk.
pub struct UdpBytePort {
    socket: UdpSocket,
    peer: SocketAddr,
}

impl UdpBytePort {
    pub async fn bind(local: SocketAddr, peer: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|e| WbusError::Port(format!("bind: {e}")))?;
        Ok(Self { socket, peer })
    }
}

#[async_trait]
impl WbusPort for UdpBytePort {
    async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.socket
            .send_to(bytes, self.peer)
            .await
            .map_err(|e| WbusError::Port(format!("send: {e}")))?;
        Ok(())
    }

    fn try_read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.socket.try_recv_from(buf) {
            Ok((n, from)) if from == self.peer => Ok(n),
            Ok(_) => Ok(0),
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(WbusError::Port(format!("recv: {e}")).into()),
        }
    }
}

/// Physical serial adapter: 2400 baud, 8 data bits, even parity, 1 stop
/// bit, as the bus requires.
#[cfg(feature = "serial")]
pub struct SerialWbusPort {
    stream: tokio_serial::SerialStream,
}

#[cfg(feature = "serial")]
impl SerialWbusPort {
    pub fn open(path: &str) -> Result<Self> {
        use tokio_serial::SerialPortBuilderExt;

        let stream = tokio_serial::new(path, 2400)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::Even)
            .stop_bits(tokio_serial::StopBits::One)
            .open_native_async()
            .map_err(|e| WbusError::Port(format!("open {path}: {e}")))?;

        Ok(Self { stream })
    }
}

#[cfg(feature = "serial")]
#[async_trait]
impl WbusPort for SerialWbusPort {
    async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        use tokio::io::AsyncWriteExt;
        self.stream
            .write_all(bytes)
            .await
            .map_err(|e| WbusError::Port(format!("write: {e}")))?;
        self.stream
            .flush()
            .await
            .map_err(|e| WbusError::Port(format!("flush: {e}")))?;
        Ok(())
    }

    fn try_read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.stream.try_read(buf) {
            Ok(n) => Ok(n),
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(WbusError::Port(format!("read: {e}")).into()),
        }
    }

    async fn drive_line(&mut self, high: bool) -> Result<()> {
        use tokio_serial::SerialPort;
        // Break asserted pulls the line dominant-low.
        let res = if high {
            self.stream.clear_break()
        } else {
            self.stream.set_break()
        };
        res.map_err(|e| WbusError::Port(format!("break: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_pair_moves_bytes_both_ways() {
        let (mut a, mut b) = memory_port_pair();
        a.write_all(&[1, 2, 3]).await.unwrap();
        b.write_all(&[9]).await.unwrap();

        let mut buf = [0u8; 16];
        assert_eq!(b.try_read(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
        assert_eq!(a.try_read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 9);
    }

    #[tokio::test]
    async fn partial_reads_keep_the_remainder() {
        let (mut a, mut b) = memory_port_pair();
        a.write_all(&[1, 2, 3, 4, 5]).await.unwrap();

        let mut small = [0u8; 2];
        assert_eq!(b.try_read(&mut small).unwrap(), 2);
        assert_eq!(small, [1, 2]);
        let mut rest = [0u8; 8];
        assert_eq!(b.try_read(&mut rest).unwrap(), 3);
        assert_eq!(&rest[..3], &[3, 4, 5]);
    }
}
