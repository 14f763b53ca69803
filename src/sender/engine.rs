//! Sender command engine: transmit, retry on a fixed cadence, and complete
//! when a status arrives that echoes the outstanding sequence number.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, trace};

use crate::config::SenderConfig;
use crate::crypto::PacketCipher;
use crate::error::{Error, Result};
use crate::protocol::{self, CommandPayload, Packet, Payload, StatusPayload};
use crate::radio::RadioLink;
use crate::types::{CommandKind, NodeId, Seq, SeqCounter};

/// Receive-poll granularity inside the retry loop.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A command in flight, awaiting its correlated status.
#[derive(Debug, Clone, Copy)]
pub struct PendingCommand {
    pub seq: Seq,
    pub kind: CommandKind,
    pub minutes: u8,
    pub deadline: Instant,
}

/// How a submit finished.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SubmitOutcome {
    /// The receiver acknowledged with this status.
    Acked(StatusPayload),
    /// The deadline elapsed with no correlated status.
    TimedOut,
}

/// The sender-side protocol engine.
///
/// No dedicated acknowledgement message exists on the wire: a fresh Status
/// whose `last_cmd_seq` equals the outstanding sequence is the ACK.
pub struct CommandEngine<R> {
    radio: R,
    cipher: PacketCipher,
    config: SenderConfig,
    seq: SeqCounter,
    pending: Option<PendingCommand>,
    last_status: Option<StatusPayload>,
    last_status_at: Option<Instant>,
}

impl<R: RadioLink> CommandEngine<R> {
    pub fn new(radio: R, cipher: PacketCipher, config: SenderConfig) -> Self {
        Self {
            radio,
            cipher,
            config,
            seq: SeqCounter::new(),
            pending: None,
            last_status: None,
            last_status_at: None,
        }
    }

    /// The most recent status heard from the receiver, for display.
    pub fn last_status(&self) -> Option<&StatusPayload> {
        self.last_status.as_ref()
    }

    /// Age of the most recent status, if any.
    pub fn last_status_age(&self) -> Option<Duration> {
        self.last_status_at.map(|t| Instant::now() - t)
    }

    /// The command currently awaiting acknowledgement.
    pub fn pending(&self) -> Option<&PendingCommand> {
        self.pending.as_ref()
    }

    /// Drain the radio without an outstanding command, merging any status
    /// into display state.
    pub fn pump(&mut self) {
        while let Some(frame) = self.radio.try_recv() {
            self.absorb_frame(&frame.bytes, frame.rssi_i8(), frame.snr_i8());
        }
    }

    /// Submit one command and block until it is acknowledged or the
    /// deadline passes.
    ///
    /// At most one command may be outstanding; a nested submit is a usage
    /// error and is rejected before anything touches the air.
    pub async fn submit(&mut self, kind: CommandKind, minutes: u8) -> Result<SubmitOutcome> {
        if self.pending.is_some() {
            return Err(Error::RejectedPreFlight(
                "a command is already awaiting acknowledgement".into(),
            ));
        }
        if kind == CommandKind::RunMinutes && minutes == 0 {
            return Err(Error::RejectedPreFlight("run duration must be at least 1 minute".into()));
        }

        let seq = self.seq.allocate();
        let now = Instant::now();
        let deadline = now + self.config.ack_timeout;
        self.pending = Some(PendingCommand {
            seq,
            kind,
            minutes,
            deadline,
        });

        info!(%kind, minutes, %seq, "submitting command");

        let packet = Packet::command(
            NodeId::SENDER,
            NodeId::RECEIVER,
            seq,
            CommandPayload { kind, minutes },
        );
        let wire = protocol::seal(&packet, &self.cipher);

        let mut next_send = now;
        let mut attempts = 0u32;

        loop {
            let now = Instant::now();

            if now >= deadline {
                self.pending = None;
                debug!(%seq, attempts, "acknowledgement deadline elapsed");
                return Ok(SubmitOutcome::TimedOut);
            }

            if now >= next_send {
                if let Err(e) = self.radio.send(&wire).await {
                    self.pending = None;
                    return Err(e);
                }
                attempts += 1;
                next_send = now + self.config.retry_interval;
                trace!(%seq, attempts, "transmitted command");
            }

            while let Some(frame) = self.radio.try_recv() {
                if let Some(status) = self.absorb_frame(&frame.bytes, frame.rssi_i8(), frame.snr_i8()) {
                    if status.last_cmd_seq == seq {
                        self.pending = None;
                        info!(%seq, attempts, "command acknowledged");
                        return Ok(SubmitOutcome::Acked(status));
                    }
                }
            }

            sleep(POLL_INTERVAL).await;
        }
    }

    /// Decode one air frame; returns the status if it was one from the
    /// receiver. Invalid frames are silent drops.
    fn absorb_frame(&mut self, bytes: &[u8], rssi: i8, snr: i8) -> Option<StatusPayload> {
        let packet = match protocol::open(bytes, &self.cipher) {
            Ok(p) => p,
            Err(e) => {
                trace!("dropping frame: {e}");
                return None;
            }
        };

        if packet.dst != NodeId::SENDER || packet.src != NodeId::RECEIVER {
            return None;
        }

        match packet.payload {
            Payload::Status(mut status) => {
                // Overwrite with the link quality we measured on our side.
                status.last_rssi_dbm = rssi;
                status.last_snr_db = snr;
                self.last_status = Some(status);
                self.last_status_at = Some(Instant::now());
                Some(status)
            }
            _ => None,
        }
    }
}
