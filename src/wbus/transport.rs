//! Frame-level I/O to the heater: command send, timed response waits, the
//! one-time break pulse, and session keep-alive bookkeeping.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, trace, warn};

use crate::error::{Result, WbusError};

use super::frame::{Frame, RxStateMachine};
use super::parser::{parse_multi_status, response_matches, MultiStatus};
use super::{
    CMD_KEEPALIVE, CMD_START_HEAT, CMD_START_VENT, CMD_STATUS, CMD_STOP, COMMAND_RETRIES,
    KEEPALIVE_PERIOD, RENEWAL_THRESHOLD, RESPONSE_TIMEOUT, STATUS_IDX_MULTI, STATUS_IDX_OP_STATE,
    WbusPort,
};

/// Receive-path polling granularity while waiting on a deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Tracks the currently active heater command for keep-alive and renewal.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaterSession {
    /// Active command code: 0x21 heat, 0x22 vent, `None` when idle.
    active_cmd: Option<u8>,
    expires_at: Option<Instant>,
    last_keepalive: Option<Instant>,
}

impl HeaterSession {
    pub fn is_active(&self) -> bool {
        self.active_cmd.is_some()
    }

    pub fn active_cmd(&self) -> Option<u8> {
        self.active_cmd
    }

    pub fn activate(&mut self, cmd: u8, minutes: u8, now: Instant) {
        self.active_cmd = Some(cmd);
        self.expires_at = Some(now + Duration::from_secs(u64::from(minutes) * 60));
        self.last_keepalive = Some(now);
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Whole minutes left before expiry, rounded up; 0 when idle.
    pub fn remaining_minutes(&self, now: Instant) -> u8 {
        match self.expires_at {
            Some(at) if at > now => {
                let secs = (at - now).as_secs();
                (secs.div_ceil(60)).min(255) as u8
            }
            _ => 0,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if now >= at)
    }

    pub fn needs_keep_alive(&self, now: Instant) -> bool {
        self.is_active()
            && matches!(self.last_keepalive, Some(t) if now - t >= KEEPALIVE_PERIOD)
    }

    pub fn mark_keep_alive(&mut self, now: Instant) {
        self.last_keepalive = Some(now);
    }

    /// True when the active command should be re-issued to the heater
    /// before its internal timer runs out. Renewal takes the slot of the
    /// next keep-alive, so it repeats at most at the keep-alive cadence.
    pub fn needs_renewal(&self, now: Instant) -> bool {
        match (self.active_cmd, self.expires_at) {
            (Some(_), Some(at)) => {
                at > now
                    && at - now <= RENEWAL_THRESHOLD
                    && self.last_keepalive.map_or(true, |t| now - t >= KEEPALIVE_PERIOD)
            }
            _ => false,
        }
    }
}

/// W-BUS transport over a byte port.
pub struct WbusTransport<P> {
    port: P,
    rx: RxStateMachine,
    send_break: bool,
    did_break: bool,
    pub session: HeaterSession,
}

impl<P: WbusPort> WbusTransport<P> {
    pub fn new(port: P, send_break: bool) -> Self {
        Self {
            port,
            rx: RxStateMachine::new(),
            send_break,
            did_break: false,
            session: HeaterSession::default(),
        }
    }

    /// Reset after a deep-sleep wake. Wake is reset-like: the UART comes
    /// back as on power-on, so the next command re-sends the break pulse.
    pub fn reset_after_wake(&mut self) {
        self.did_break = false;
        self.rx = RxStateMachine::new();
        self.session.clear();
    }

    /// Drain the port into the receive state machine.
    pub fn poll(&mut self) -> Result<()> {
        let mut buf = [0u8; 64];
        loop {
            let n = self.port.try_read(&mut buf)?;
            if n == 0 {
                return Ok(());
            }
            self.rx.feed(&buf[..n]);
        }
    }

    /// Take a completed frame from the single-slot queue.
    pub fn pop_frame(&mut self) -> Option<Frame> {
        self.rx.pop_frame()
    }

    /// Emit the initial break pulse some heaters require before the first
    /// command: UART off, line high ~1 s, low ~50 ms, high ~50 ms, UART on.
    async fn break_pulse(&mut self) -> Result<()> {
        debug!("sending W-BUS break pulse");
        self.port.uart_enable(false).await?;
        self.port.drive_line(true).await?;
        sleep(Duration::from_millis(1000)).await;
        self.port.drive_line(false).await?;
        sleep(Duration::from_millis(50)).await;
        self.port.drive_line(true).await?;
        sleep(Duration::from_millis(50)).await;
        self.port.uart_enable(true).await?;
        Ok(())
    }

    /// Send one command frame. Performs the break pulse lazily, exactly
    /// once per transport instance.
    pub async fn send_command(&mut self, cmd: u8, data: &[u8]) -> Result<()> {
        if self.send_break && !self.did_break {
            self.break_pulse().await?;
            self.did_break = true;
        }

        let frame = Frame::command(cmd, data);
        if frame.payload.len() + 1 > 254 {
            return Err(WbusError::FrameTooLong(frame.payload.len()).into());
        }

        trace!(cmd = format_args!("{cmd:#04x}"), len = data.len(), "W-BUS TX");
        self.port.set_tx_enable(true);
        let res = self.port.write_all(&frame.encode()).await;
        self.port.set_tx_enable(false);
        res
    }

    /// Wait for any valid frame until the deadline elapses.
    pub async fn read_frame(&mut self, timeout: Duration) -> Result<Frame> {
        let deadline = Instant::now() + timeout;
        loop {
            self.poll()?;
            if let Some(frame) = self.pop_frame() {
                return Ok(frame);
            }
            if Instant::now() >= deadline {
                return Err(WbusError::Timeout(timeout.as_millis() as u64).into());
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    /// Wait for a heater response acknowledging `cmd`.
    async fn read_ack(&mut self, cmd: u8, timeout: Duration) -> Result<Frame> {
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(WbusError::Timeout(timeout.as_millis() as u64).into());
            }
            let frame = self.read_frame(deadline - now).await?;
            if frame.is_response_to(cmd) {
                return Ok(frame);
            }
            // Echo of our own transmission or an unrelated frame; keep
            // waiting out the same deadline.
        }
    }

    /// Send a command and verify the heater acknowledged it, retrying up to
    /// [`COMMAND_RETRIES`] times.
    pub async fn send_command_checked(&mut self, cmd: u8, data: &[u8]) -> Result<Frame> {
        for attempt in 1..=COMMAND_RETRIES {
            self.send_command(cmd, data).await?;
            match self.read_ack(cmd, RESPONSE_TIMEOUT).await {
                Ok(frame) => return Ok(frame),
                Err(e) => {
                    warn!(
                        cmd = format_args!("{cmd:#04x}"),
                        attempt, "no acknowledgement: {e}"
                    );
                }
            }
        }
        Err(WbusError::CommandFailed {
            cmd,
            attempts: COMMAND_RETRIES,
        }
        .into())
    }

    /// Start the parking heater for `minutes` and open a session.
    pub async fn start_heater(&mut self, minutes: u8) -> Result<()> {
        self.send_command_checked(CMD_START_HEAT, &[minutes]).await?;
        self.session.activate(CMD_START_HEAT, minutes, Instant::now());
        Ok(())
    }

    /// Start ventilation for `minutes` and open a session.
    pub async fn start_ventilation(&mut self, minutes: u8) -> Result<()> {
        self.send_command_checked(CMD_START_VENT, &[minutes]).await?;
        self.session.activate(CMD_START_VENT, minutes, Instant::now());
        Ok(())
    }

    /// Stop the heater and clear any session.
    pub async fn stop(&mut self) -> Result<()> {
        let res = self.send_command_checked(CMD_STOP, &[]).await;
        self.session.clear();
        res.map(|_| ())
    }

    /// Keep the active session alive. No-op without a session.
    pub async fn keep_alive(&mut self) -> Result<()> {
        if !self.session.is_active() {
            return Ok(());
        }
        self.send_command(CMD_KEEPALIVE, &[0x2A, 0x00]).await?;
        self.session.mark_keep_alive(Instant::now());
        Ok(())
    }

    /// Re-issue the active command with the remaining minutes, extending
    /// the heater's internal timer before it runs out.
    pub async fn renew_session(&mut self) -> Result<()> {
        let (cmd, minutes) = match self.session.active_cmd() {
            Some(cmd) => (cmd, self.session.remaining_minutes(Instant::now())),
            None => return Ok(()),
        };
        if minutes == 0 {
            self.session.clear();
            return Ok(());
        }
        self.send_command_checked(cmd, &[minutes]).await?;
        self.session.mark_keep_alive(Instant::now());
        Ok(())
    }

    /// Read the raw operating-state byte (status index 0x07).
    pub async fn read_operating_state(&mut self) -> Result<u8> {
        self.send_command(CMD_STATUS, &[STATUS_IDX_OP_STATE]).await?;

        let deadline = Instant::now() + RESPONSE_TIMEOUT;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(WbusError::Timeout(RESPONSE_TIMEOUT.as_millis() as u64).into());
            }
            let frame = self.read_frame(deadline - now).await?;
            if response_matches(&frame, STATUS_IDX_OP_STATE) && frame.payload.len() >= 3 {
                return Ok(frame.payload[2]);
            }
        }
    }

    /// Request one simple status page and wait for its response frame.
    pub async fn read_status_page(&mut self, idx: u8) -> Result<Frame> {
        self.send_command(CMD_STATUS, &[idx]).await?;

        let deadline = Instant::now() + RESPONSE_TIMEOUT;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(WbusError::Timeout(RESPONSE_TIMEOUT.as_millis() as u64).into());
            }
            let frame = self.read_frame(deadline - now).await?;
            if response_matches(&frame, idx) {
                return Ok(frame);
            }
        }
    }

    /// Request a multi-status TLV snapshot for `ids` and decode it.
    pub async fn read_multi_status(&mut self, ids: &[u8]) -> Result<MultiStatus> {
        let mut data = Vec::with_capacity(ids.len() + 1);
        data.push(STATUS_IDX_MULTI);
        data.extend_from_slice(ids);
        self.send_command(CMD_STATUS, &data).await?;

        let deadline = Instant::now() + RESPONSE_TIMEOUT;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(WbusError::Timeout(RESPONSE_TIMEOUT.as_millis() as u64).into());
            }
            let frame = self.read_frame(deadline - now).await?;
            if response_matches(&frame, STATUS_IDX_MULTI) {
                return parse_multi_status(&frame);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wbus::memory_port_pair;

    #[tokio::test(start_paused = true)]
    async fn session_keep_alive_cadence() {
        let mut session = HeaterSession::default();
        let t0 = Instant::now();
        session.activate(CMD_START_HEAT, 20, t0);

        assert!(!session.needs_keep_alive(t0 + Duration::from_secs(5)));
        assert!(session.needs_keep_alive(t0 + Duration::from_secs(10)));

        session.mark_keep_alive(t0 + Duration::from_secs(10));
        assert!(!session.needs_keep_alive(t0 + Duration::from_secs(15)));
    }

    #[tokio::test(start_paused = true)]
    async fn session_renewal_window() {
        let mut session = HeaterSession::default();
        let t0 = Instant::now();
        session.activate(CMD_START_HEAT, 2, t0);

        assert!(!session.needs_renewal(t0 + Duration::from_secs(30)));
        assert!(session.needs_renewal(t0 + Duration::from_secs(95)));

        // A renewal counts as the keep-alive; the next one waits its turn.
        session.mark_keep_alive(t0 + Duration::from_secs(95));
        assert!(!session.needs_renewal(t0 + Duration::from_secs(96)));
        assert!(session.needs_renewal(t0 + Duration::from_secs(106)));

        assert!(session.is_expired(t0 + Duration::from_secs(120)));
        assert!(!session.needs_renewal(t0 + Duration::from_secs(121)));
    }

    #[tokio::test(start_paused = true)]
    async fn remaining_minutes_rounds_up() {
        let mut session = HeaterSession::default();
        let t0 = Instant::now();
        session.activate(CMD_START_HEAT, 20, t0);

        assert_eq!(session.remaining_minutes(t0), 20);
        assert_eq!(session.remaining_minutes(t0 + Duration::from_secs(30)), 20);
        assert_eq!(session.remaining_minutes(t0 + Duration::from_secs(61)), 19);
        assert_eq!(session.remaining_minutes(t0 + Duration::from_secs(1200)), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn command_retries_then_fails() {
        let (controller, _heater) = memory_port_pair();
        let mut wbus = WbusTransport::new(controller, false);

        let err = wbus.send_command_checked(CMD_STOP, &[]).await.unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Wbus(WbusError::CommandFailed { cmd: CMD_STOP, attempts: 3 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn checked_command_accepts_heater_ack() {
        let (controller, mut heater) = memory_port_pair();
        let mut wbus = WbusTransport::new(controller, false);

        // Queue the acknowledgement before the command goes out; the memory
        // port delivers it as soon as the transport polls.
        heater
            .write_all(&Frame::response(CMD_START_HEAT, &[]).encode())
            .await
            .unwrap();

        wbus.start_heater(20).await.unwrap();
        assert!(wbus.session.is_active());
        assert_eq!(wbus.session.active_cmd(), Some(CMD_START_HEAT));
    }

    #[tokio::test(start_paused = true)]
    async fn own_echo_is_not_an_ack() {
        let (controller, mut heater) = memory_port_pair();
        let mut wbus = WbusTransport::new(controller, false);

        // A single-wire bus reflects our own frame back; it must not count.
        heater
            .write_all(&Frame::command(CMD_STOP, &[]).encode())
            .await
            .unwrap();

        assert!(wbus.send_command_checked(CMD_STOP, &[]).await.is_err());
    }
}
