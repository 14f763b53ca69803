//! Optional MQTT bridge (HomeAssistant flavored).
//!
//! Subscribes to the command topics, applies the staleness window, and
//! forwards accepted commands into the receiver loop's channel; publishes
//! state, telemetry, diagnostics and discovery from the statuses the loop
//! emits. The bridge never touches W-BUS or the radio itself.
//!
//! Topics under the configured base:
//! - `mode/set` (command, `"off"` / `"heat"`), `mode/state`
//! - `minutes/set` (command, 10..=90), `query` (command, any payload)
//! - `command` (command, JSON `{command, minutes, timestamp}`)
//! - `temperature/state`, `voltage/state`, `power/state`, `availability`
//! - `diagnostics/*` for RSSI, SNR and the last command source

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Packet as MqttPacket, QoS};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::MqttConfig;
use crate::error::Result;
use crate::protocol::StatusPayload;
use crate::receiver::{ExternalCommand, StatusReport};
use crate::types::{CommandKind, CommandSource, HeaterState};

/// Default runtime for a bare `heat` mode command.
const MODE_START_MINUTES: u8 = 30;

/// A command parsed off the wire, before the freshness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MqttCommand {
    pub kind: CommandKind,
    pub minutes: u8,
    /// Seconds since the Unix epoch, if the payload carried one.
    pub timestamp: Option<u64>,
}

impl MqttCommand {
    fn into_external(self) -> ExternalCommand {
        ExternalCommand {
            kind: self.kind,
            minutes: self.minutes,
            source: CommandSource::Mqtt,
        }
    }
}

/// Parse the JSON command topic payload: `{"command": "start"|"stop"|"run",
/// "minutes": n, "timestamp": secs}`.
pub fn parse_json_command(payload: &[u8]) -> Option<MqttCommand> {
    let doc: serde_json::Value = serde_json::from_slice(payload).ok()?;
    let kind = match doc.get("command")?.as_str()? {
        "start" => CommandKind::Start,
        "stop" => CommandKind::Stop,
        "run" => CommandKind::RunMinutes,
        other => {
            debug!("unknown MQTT command type: {other}");
            return None;
        }
    };

    let minutes = if kind == CommandKind::Stop {
        0
    } else {
        doc.get("minutes").and_then(serde_json::Value::as_u64).unwrap_or(30).min(255) as u8
    };

    let timestamp = doc.get("timestamp").and_then(serde_json::Value::as_u64).filter(|&t| t > 0);

    Some(MqttCommand {
        kind,
        minutes,
        timestamp,
    })
}

/// Freshness check: a command older than the threshold is dropped. Without
/// a timestamp, or without a synced clock, commands are assumed fresh.
pub fn is_fresh(timestamp: Option<u64>, now_epoch_secs: u64, threshold: Duration) -> bool {
    let Some(ts) = timestamp else {
        return true;
    };
    if now_epoch_secs < 1_000_000_000 {
        // Clock not synced; refusing everything would brick the bridge.
        return true;
    }
    now_epoch_secs.saturating_sub(ts) <= threshold.as_secs()
}

fn epoch_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

/// The bridge task handle.
pub struct MqttBridge {
    client: AsyncClient,
    eventloop: EventLoop,
    config: MqttConfig,
    cmd_tx: mpsc::UnboundedSender<ExternalCommand>,
    status_rx: mpsc::UnboundedReceiver<StatusReport>,
}

impl MqttBridge {
    /// Create the bridge. Commands flow out through `cmd_tx`; statuses to
    /// publish flow in through `status_rx`.
    pub fn new(
        config: MqttConfig,
        cmd_tx: mpsc::UnboundedSender<ExternalCommand>,
        status_rx: mpsc::UnboundedReceiver<StatusReport>,
    ) -> Self {
        let mut options =
            MqttOptions::new(config.client_id.clone(), config.broker.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(30));
        if !config.username.is_empty() {
            options.set_credentials(config.username.clone(), config.password.clone());
        }
        options.set_last_will(LastWill::new(
            format!("{}/availability", config.base_topic),
            "offline",
            QoS::AtLeastOnce,
            true,
        ));

        let (client, eventloop) = AsyncClient::new(options, 16);
        Self {
            client,
            eventloop,
            config,
            cmd_tx,
            status_rx,
        }
    }

    /// Run the bridge until the status channel closes.
    pub async fn run(mut self) -> Result<()> {
        loop {
            tokio::select! {
                event = self.eventloop.poll() => match event {
                    Ok(Event::Incoming(MqttPacket::ConnAck(_))) => {
                        info!("MQTT connected");
                        self.subscribe().await;
                        self.publish_availability(true).await;
                        if self.config.discovery {
                            self.publish_discovery().await;
                        }
                    }
                    Ok(Event::Incoming(MqttPacket::Publish(publish))) => {
                        self.handle_message(&publish.topic, &publish.payload);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("MQTT connection error: {e}");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                },
                report = self.status_rx.recv() => match report {
                    Some(report) => self.publish_status(&report).await,
                    None => {
                        self.publish_availability(false).await;
                        return Ok(());
                    }
                },
            }
        }
    }

    fn topic(&self, suffix: &str) -> String {
        format!("{}/{suffix}", self.config.base_topic)
    }

    async fn subscribe(&self) {
        for suffix in ["mode/set", "minutes/set", "query", "command"] {
            let topic = self.topic(suffix);
            if let Err(e) = self.client.subscribe(topic.clone(), QoS::AtLeastOnce).await {
                warn!("subscribe {topic}: {e}");
            }
        }
    }

    /// Route one inbound message to the command channel.
    fn handle_message(&mut self, topic: &str, payload: &[u8]) {
        let cmd = if topic == self.topic("mode/set") {
            if payload == b"off" {
                Some(MqttCommand {
                    kind: CommandKind::Stop,
                    minutes: 0,
                    timestamp: None,
                })
            } else if payload == b"heat" {
                Some(MqttCommand {
                    kind: CommandKind::Start,
                    minutes: MODE_START_MINUTES,
                    timestamp: None,
                })
            } else {
                debug!("unknown mode payload: {:?}", String::from_utf8_lossy(payload));
                None
            }
        } else if topic == self.topic("minutes/set") {
            std::str::from_utf8(payload)
                .ok()
                .and_then(|s| s.trim().parse::<u8>().ok())
                .filter(|m| (10..=90).contains(m))
                .map(|minutes| MqttCommand {
                    kind: CommandKind::RunMinutes,
                    minutes,
                    timestamp: None,
                })
        } else if topic == self.topic("query") {
            Some(MqttCommand {
                kind: CommandKind::QueryStatus,
                minutes: 0,
                timestamp: None,
            })
        } else if topic == self.topic("command") {
            parse_json_command(payload)
        } else {
            None
        };

        let Some(cmd) = cmd else { return };

        if !is_fresh(cmd.timestamp, epoch_now(), self.config.stale_threshold) {
            warn!(kind = %cmd.kind, "dropping stale MQTT command");
            return;
        }

        info!(kind = %cmd.kind, minutes = cmd.minutes, "MQTT command accepted");
        let _ = self.cmd_tx.send(cmd.into_external());
    }

    async fn publish_status(&mut self, report: &StatusReport) {
        let status: &StatusPayload = &report.status;
        let mode = if status.state == HeaterState::Running {
            "heat"
        } else {
            "off"
        };
        self.publish_retained("mode/state", mode).await;
        self.publish_retained("temperature/state", status.temperature.celsius().to_string())
            .await;
        self.publish_retained(
            "voltage/state",
            format!("{:.2}", f64::from(status.voltage.millivolts()) / 1000.0),
        )
        .await;
        self.publish_retained("power/state", status.power.watts().to_string()).await;

        self.publish_retained("diagnostics/rssi", status.last_rssi_dbm.to_string()).await;
        self.publish_retained("diagnostics/snr", status.last_snr_db.to_string()).await;
        if let Some(source) = report.source {
            self.publish_retained("diagnostics/last_command_source", source.to_string()).await;
        }
    }

    async fn publish_availability(&self, online: bool) {
        let payload = if online { "online" } else { "offline" };
        let topic = self.topic("availability");
        if let Err(e) = self.client.publish(topic.clone(), QoS::AtLeastOnce, true, payload).await {
            warn!("publish {topic}: {e}");
        }
    }

    async fn publish_retained(&self, suffix: &str, payload: impl Into<Vec<u8>>) {
        let topic = self.topic(suffix);
        if let Err(e) = self
            .client
            .publish(topic.clone(), QoS::AtLeastOnce, true, payload.into())
            .await
        {
            warn!("publish {topic}: {e}");
        }
    }

    /// HomeAssistant climate discovery, retained so the entity survives HA
    /// restarts.
    async fn publish_discovery(&self) {
        let doc = json!({
            "name": "Parking Heater",
            "unique_id": format!("{}_receiver", self.config.client_id),
            "modes": ["off", "heat"],
            "mode_command_topic": self.topic("mode/set"),
            "mode_state_topic": self.topic("mode/state"),
            "temperature_command_topic": self.topic("minutes/set"),
            "current_temperature_topic": self.topic("temperature/state"),
            "min_temp": 10,
            "max_temp": 90,
            "temp_step": 10,
            "temperature_unit": "C",
            "availability_topic": self.topic("availability"),
            "payload_available": "online",
            "payload_not_available": "offline",
            "device": {
                "identifiers": [self.config.client_id],
                "name": "Heatlink Receiver",
                "model": "heatlink",
            },
        });

        let topic = format!("homeassistant/climate/{}/config", self.config.client_id);
        if let Err(e) = self
            .client
            .publish(topic, QoS::AtLeastOnce, true, doc.to_string())
            .await
        {
            warn!("publish discovery: {e}");
        }
    }
}
