//! The receiver control loop.
//!
//! A duty-cycled state machine governed by heater state:
//!
//! - **Idle** (heater off): open a short radio listen window, then deep
//!   sleep. W-BUS is never polled here; waking the heater costs battery.
//! - **Executing**: a validated command is deduplicated, dispatched to
//!   W-BUS, and answered with exactly one Status carrying its sequence.
//! - **Running**: fully awake; poll the heater and emit Status every poll
//!   interval, keep the session alive, keep accepting commands.
//! - **Extended wake**: after the heater is observed off, stay awake for a
//!   grace period so the final statuses and late sender retries land.
//!
//! Three command sources (radio, button, MQTT) funnel into one dispatch
//! path. Cooperative scheduling makes the loop the only writer of every
//! piece of state.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, trace, warn};

use crate::config::ReceiverConfig;
use crate::crypto::PacketCipher;
use crate::error::Result;
use crate::protocol::{self, Packet, Payload, StatusPayload, Temperature, Voltage};
use crate::radio::{RadioLink, RadioMode, ReceivedFrame};
use crate::types::{CommandKind, CommandSource, HeaterState, NodeId, SeqCounter, TlvSupport};
use crate::wbus::{
    self, map_op_state, parse_component_rates, parse_counters, parse_measurements,
    parse_state_flags, WbusPort, WbusTransport, MULTI_STATUS_IDS,
};

use super::{ExternalCommand, RetainedState, Retention, StatusReport};

/// Poll granularity while holding a receive window open.
const IDLE_POLL: Duration = Duration::from_millis(5);

/// Poll granularity while fully awake.
const AWAKE_POLL: Duration = Duration::from_millis(10);

/// The receiver node.
pub struct Receiver<R, P, S> {
    radio: R,
    wbus: WbusTransport<P>,
    cipher: PacketCipher,
    config: ReceiverConfig,
    retention: S,
    retained: RetainedState,
    status: StatusPayload,
    seq: SeqCounter,
    preset_minutes: u8,
    extended_wake_until: Option<Instant>,
    next_poll: Option<Instant>,
    last_source: Option<CommandSource>,
    external_rx: Option<mpsc::UnboundedReceiver<ExternalCommand>>,
    status_tx: Option<mpsc::UnboundedSender<StatusReport>>,
}

impl<R, P, S> Receiver<R, P, S>
where
    R: RadioLink,
    P: WbusPort,
    S: Retention,
{
    pub fn new(
        radio: R,
        wbus: WbusTransport<P>,
        cipher: PacketCipher,
        config: ReceiverConfig,
        retention: S,
    ) -> Self {
        let preset_minutes = config.default_run_minutes;
        Self {
            radio,
            wbus,
            cipher,
            config,
            retention,
            retained: RetainedState::default(),
            status: StatusPayload::default(),
            seq: SeqCounter::new(),
            preset_minutes,
            extended_wake_until: None,
            next_poll: None,
            last_source: None,
            external_rx: None,
            status_tx: None,
        }
    }

    /// Attach a channel of commands from local sources (button, MQTT).
    pub fn with_external_commands(mut self, rx: mpsc::UnboundedReceiver<ExternalCommand>) -> Self {
        self.external_rx = Some(rx);
        self
    }

    /// Attach a sink that observes every emitted status (MQTT publishing).
    pub fn with_status_sink(mut self, tx: mpsc::UnboundedSender<StatusReport>) -> Self {
        self.status_tx = Some(tx);
        self
    }

    /// The current outbound status, for inspection.
    pub fn status(&self) -> &StatusPayload {
        &self.status
    }

    /// Which source issued the last executed command.
    pub fn last_command_source(&self) -> Option<CommandSource> {
        self.last_source
    }

    /// One-time startup: load retained state and probe multi-status TLV
    /// support if this is a cold boot.
    pub async fn boot(&mut self) -> Result<()> {
        self.retained = self.retention.load();
        self.status.last_cmd_seq = self.retained.last_processed_cmd_seq;

        if self.retained.tlv_support == TlvSupport::Unknown {
            self.retained.tlv_support = match self.wbus.read_multi_status(&MULTI_STATUS_IDS).await
            {
                Ok(_) => TlvSupport::Supported,
                Err(e) => {
                    debug!("TLV probe: {e}");
                    TlvSupport::Unsupported
                }
            };
            self.retention.store(&self.retained)?;
        }

        info!(
            tlv = ?self.retained.tlv_support,
            last_cmd_seq = %self.retained.last_processed_cmd_seq,
            "receiver ready"
        );
        Ok(())
    }

    /// Run the control loop forever.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            self.cycle().await?;
        }
    }

    /// One loop iteration: an idle duty cycle or an awake service pass.
    pub async fn cycle(&mut self) -> Result<()> {
        if self.is_awake() {
            self.awake_cycle().await
        } else {
            self.idle_cycle().await
        }
    }

    fn is_awake(&self) -> bool {
        self.status.state == HeaterState::Running
            || matches!(self.extended_wake_until, Some(t) if Instant::now() < t)
    }

    /// Idle duty cycle: listen briefly, then deep sleep unless something
    /// arrived (or sleeping is disabled for bench work).
    async fn idle_cycle(&mut self) -> Result<()> {
        self.radio.set_mode(RadioMode::Receive);

        let deadline = Instant::now() + self.config.idle_listen_window;
        let mut handled = false;
        while Instant::now() < deadline {
            if self.service_inputs().await? {
                handled = true;
                break;
            }
            sleep(IDLE_POLL).await;
        }

        if handled || self.config.disable_sleep {
            // Re-evaluate state before deciding to sleep again.
            return Ok(());
        }

        self.deep_sleep(self.config.idle_sleep).await
    }

    /// Deep sleep: persist the retained pair, power the radio down, and on
    /// wake reconstruct everything else from scratch, as a reset would.
    async fn deep_sleep(&mut self, duration: Duration) -> Result<()> {
        trace!(?duration, "entering deep sleep");
        self.retention.store(&self.retained)?;
        self.radio.set_mode(RadioMode::Sleep);

        sleep(duration).await;

        self.status = StatusPayload {
            last_cmd_seq: self.retained.last_processed_cmd_seq,
            ..StatusPayload::default()
        };
        self.seq = SeqCounter::new();
        self.next_poll = None;
        self.extended_wake_until = None;
        self.last_source = None;
        self.wbus.reset_after_wake();
        Ok(())
    }

    /// Awake service pass: inputs, session upkeep, periodic poll + status.
    async fn awake_cycle(&mut self) -> Result<()> {
        self.radio.set_mode(RadioMode::Receive);
        self.service_inputs().await?;

        let now = Instant::now();
        if self.wbus.session.is_expired(now) {
            debug!("session expired");
            self.wbus.session.clear();
        } else if self.wbus.session.needs_renewal(now) {
            if let Err(e) = self.wbus.renew_session().await {
                warn!("session renewal failed: {e}");
            }
        } else if self.wbus.session.needs_keep_alive(now) {
            if let Err(e) = self.wbus.keep_alive().await {
                warn!("keep-alive failed: {e}");
            }
        }

        if self.next_poll.map_or(true, |t| Instant::now() >= t) {
            self.next_poll = Some(Instant::now() + self.config.poll_interval);
            self.poll_heater().await;
            self.emit_status(None).await?;
        }

        sleep(AWAKE_POLL).await;
        Ok(())
    }

    /// Drain both command sources. Returns whether any command was
    /// processed (executed or deduplicated).
    async fn service_inputs(&mut self) -> Result<bool> {
        let mut processed = false;

        while let Some(frame) = self.radio.try_recv() {
            processed |= self.handle_frame(&frame).await?;
        }

        loop {
            let cmd = match self.external_rx.as_mut().map(mpsc::UnboundedReceiver::try_recv) {
                Some(Ok(cmd)) => cmd,
                _ => break,
            };
            info!(kind = %cmd.kind, source = %cmd.source, "local command");
            self.execute(cmd.kind, cmd.minutes, cmd.source).await;
            self.emit_status(None).await?;
            self.refresh_extended_wake();
            processed = true;
        }

        Ok(processed)
    }

    /// Validate, decrypt, and dispatch one air frame. Anything that fails
    /// validation is a silent drop.
    async fn handle_frame(&mut self, frame: &ReceivedFrame) -> Result<bool> {
        let packet = match protocol::open(&frame.bytes, &self.cipher) {
            Ok(p) => p,
            Err(e) => {
                trace!("dropping frame: {e}");
                return Ok(false);
            }
        };

        if packet.dst != NodeId::RECEIVER {
            trace!(dst = %packet.dst, "dropping frame for another node");
            return Ok(false);
        }

        let cmd = match packet.payload {
            Payload::Command(cmd) => cmd,
            _ => return Ok(false),
        };

        let link = Some((frame.rssi_i8(), frame.snr_i8()));

        // Retry dedup: exact match against the last processed sequence.
        // Re-ACK with the current status, which already carries that
        // sequence; the heater is not touched.
        if packet.seq == self.retained.last_processed_cmd_seq {
            info!(seq = %packet.seq, "duplicate command, re-acknowledging");
            self.emit_status(link).await?;
            self.refresh_extended_wake();
            return Ok(true);
        }

        info!(kind = %cmd.kind, minutes = cmd.minutes, seq = %packet.seq, "radio command");
        self.execute(cmd.kind, cmd.minutes, CommandSource::Radio).await;

        self.retained.last_processed_cmd_seq = packet.seq;
        self.status.last_cmd_seq = packet.seq;

        // Exactly one status per handled command: this is the ACK.
        self.emit_status(link).await?;
        self.refresh_extended_wake();
        Ok(true)
    }

    /// Execute one command against the heater. Failures set the error
    /// state, which the next successful observation clears.
    async fn execute(&mut self, kind: CommandKind, minutes: u8, source: CommandSource) {
        self.last_source = Some(source);

        match kind {
            CommandKind::Stop => match self.wbus.stop().await {
                Ok(()) => {
                    let was_running = self.status.state == HeaterState::Running;
                    self.status.state = HeaterState::Off;
                    if was_running {
                        self.begin_extended_wake();
                    }
                }
                Err(e) => {
                    warn!("stop failed: {e}");
                    self.status.state = HeaterState::Error;
                }
            },

            CommandKind::Start | CommandKind::RunMinutes => {
                let run_minutes = if minutes == 0 { self.preset_minutes } else { minutes };
                if kind == CommandKind::RunMinutes {
                    self.preset_minutes = run_minutes;
                }

                match self.wbus.start_heater(run_minutes).await {
                    Ok(()) => {
                        self.status.state = HeaterState::Running;
                        self.extended_wake_until = None;
                        // Poll soon to pick up real heater readings.
                        self.next_poll = Some(Instant::now());
                    }
                    Err(e) => {
                        warn!("start failed: {e}");
                        self.status.state = HeaterState::Error;
                    }
                }
            }

            CommandKind::QueryStatus => {
                // The explicit override: exactly one poll while otherwise
                // idle, no heater writes beyond the status requests.
                self.poll_heater().await;
            }
        }
    }

    /// Read the heater over W-BUS and refresh the outbound status.
    async fn poll_heater(&mut self) {
        match self.wbus.read_operating_state().await {
            Ok(op) => {
                self.status.last_op_state = op;
                let mapped = map_op_state(op);
                let was_running = self.status.state == HeaterState::Running;
                self.status.state = mapped;
                if was_running && mapped == HeaterState::Off {
                    debug!("heater observed off");
                    self.wbus.session.clear();
                    self.begin_extended_wake();
                }
            }
            Err(e) => debug!("operating-state poll: {e}"),
        }

        // Reset the sensor fields so a missed read reports zero, never a
        // stale value.
        self.status.temperature = Temperature::default();
        self.status.voltage = Voltage::default();
        self.status.power = protocol::Power::default();

        if self.retained.tlv_support == TlvSupport::Supported {
            match self.wbus.read_multi_status(&MULTI_STATUS_IDS).await {
                Ok(snapshot) => {
                    if let Some(c) = snapshot.temperature_c {
                        self.status.temperature = Temperature::from_celsius(c);
                    }
                    if let Some(mv) = snapshot.voltage_mv {
                        self.status.voltage = Voltage::from_millivolts(mv);
                    }
                    if let Some(w) = snapshot.power {
                        self.status.power = protocol::Power::from_watts(w);
                    }
                }
                Err(e) => debug!("multi-status poll: {e}"),
            }
        } else {
            self.poll_simple_pages().await;
        }

        self.status.minutes_remaining = self.wbus.session.remaining_minutes(Instant::now());
    }

    /// Fallback poll over the simple status pages for heaters without
    /// multi-status support. 0x05 carries the fields the status packet
    /// reports; the rest are read for the log.
    async fn poll_simple_pages(&mut self) {
        match self.wbus.read_status_page(wbus::STATUS_IDX_MEASUREMENTS).await {
            Ok(frame) => {
                if let Ok(m) = parse_measurements(&frame) {
                    self.status.temperature = Temperature::from_celsius(m.temperature_c);
                    self.status.voltage = Voltage::from_millivolts(m.voltage_mv);
                }
            }
            Err(e) => debug!("page 0x05: {e}"),
        }

        match self.wbus.read_status_page(wbus::STATUS_IDX_COMPONENT_RATES).await {
            Ok(frame) => {
                if let Ok(rates) = parse_component_rates(&frame) {
                    trace!(
                        glow = rates.glow_plug_power,
                        pump = rates.fuel_pump_freq,
                        fan = rates.air_fan_power,
                        "component rates"
                    );
                }
            }
            Err(e) => debug!("page 0x0F: {e}"),
        }

        match self.wbus.read_status_page(wbus::STATUS_IDX_FLAGS_2).await {
            Ok(frame) => trace!(?frame, "state flags page 0x02"),
            Err(e) => debug!("page 0x02: {e}"),
        }

        match self.wbus.read_status_page(wbus::STATUS_IDX_FLAGS_3).await {
            Ok(frame) => {
                if let Ok(flags) = parse_state_flags(&frame) {
                    trace!(?flags, "state flags");
                }
            }
            Err(e) => debug!("page 0x03: {e}"),
        }

        match self.wbus.read_status_page(wbus::STATUS_IDX_COUNTERS).await {
            Ok(frame) => {
                if let Ok(counters) = parse_counters(&frame) {
                    trace!(
                        working_h = counters.working_hours,
                        starts = counters.start_counter,
                        "counters"
                    );
                }
            }
            Err(e) => debug!("page 0x06: {e}"),
        }
    }

    /// Build and transmit one status packet; the radio ends up back in
    /// receive mode.
    async fn emit_status(&mut self, link: Option<(i8, i8)>) -> Result<()> {
        if let Some((rssi, snr)) = link {
            self.status.last_rssi_dbm = rssi;
            self.status.last_snr_db = snr;
        }
        self.status.minutes_remaining = self.wbus.session.remaining_minutes(Instant::now());

        let packet = Packet::status(NodeId::RECEIVER, NodeId::SENDER, self.seq.allocate(), self.status);
        let wire = protocol::seal(&packet, &self.cipher);
        self.radio.send(&wire).await?;

        if let Some(tx) = &self.status_tx {
            let _ = tx.send(StatusReport {
                status: self.status,
                source: self.last_source,
            });
        }
        Ok(())
    }

    fn begin_extended_wake(&mut self) {
        self.extended_wake_until = Some(Instant::now() + self.config.extended_wake);
    }

    /// A command landing during extended wake restarts the grace period.
    fn refresh_extended_wake(&mut self) {
        if self.extended_wake_until.is_some() && self.status.state != HeaterState::Running {
            self.begin_extended_wake();
        }
    }
}
