//! Configuration management for Heatlink.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::crypto::PresharedKey;
use crate::error::{Error, Result};

/// Main configuration structure, shared by both node binaries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Radio link configuration.
    #[serde(default)]
    pub link: LinkConfig,

    /// Sender node configuration.
    #[serde(default)]
    pub sender: SenderConfig,

    /// Receiver node configuration.
    #[serde(default)]
    pub receiver: ReceiverConfig,

    /// Optional MQTT bridge configuration.
    #[serde(default)]
    pub mqtt: MqttConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if let Some(ref psk) = self.link.psk {
            PresharedKey::from_hex(psk)?;
        }

        if self.sender.retry_interval.is_zero() {
            return Err(Error::InvalidConfig("sender retry interval must be non-zero".into()));
        }
        if self.sender.ack_timeout < self.sender.retry_interval {
            return Err(Error::InvalidConfig(
                "sender ack timeout shorter than one retry interval".into(),
            ));
        }
        if self.receiver.idle_listen_window.is_zero() {
            return Err(Error::InvalidConfig("idle listen window must be non-zero".into()));
        }
        if self.mqtt.enabled && self.mqtt.broker.is_empty() {
            return Err(Error::InvalidConfig("MQTT enabled but no broker".into()));
        }

        Ok(())
    }

    /// Resolve the pre-shared key, falling back to the well-known bench key.
    pub fn preshared_key(&self) -> Result<PresharedKey> {
        match self.link.psk {
            Some(ref hex) => PresharedKey::from_hex(hex),
            None => Ok(PresharedKey::new(DEFAULT_BENCH_PSK)),
        }
    }
}

/// Fixed key for bench setups where none is configured. Anything real gets
/// a key in its config.
pub const DEFAULT_BENCH_PSK: [u8; 16] = [
    0x48, 0x4C, 0x4B, 0x31, 0x9E, 0x21, 0x44, 0x10, 0x50, 0x30, 0x07, 0x0C, 0x0E, 0x11, 0xF4,
    0x4F,
];

/// Radio link configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Pre-shared 128-bit key, 32 hex characters. Bench key when absent.
    pub psk: Option<String>,
}

/// Sender node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderConfig {
    /// Resend cadence while waiting for the correlated status.
    #[serde(default = "default_retry_interval", with = "humantime_serde")]
    pub retry_interval: Duration,

    /// Give up on a command after this long.
    #[serde(default = "default_ack_timeout", with = "humantime_serde")]
    pub ack_timeout: Duration,

    /// Run duration used by `start` until a `run <minutes>` overrides it.
    #[serde(default = "default_run_minutes")]
    pub default_run_minutes: u8,
}

fn default_retry_interval() -> Duration {
    Duration::from_secs(1)
}
fn default_ack_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_run_minutes() -> u8 {
    30
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            retry_interval: default_retry_interval(),
            ack_timeout: default_ack_timeout(),
            default_run_minutes: default_run_minutes(),
        }
    }
}

/// Receiver node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverConfig {
    /// How long the radio listens after each idle wake.
    #[serde(default = "default_listen_window", with = "humantime_serde")]
    pub idle_listen_window: Duration,

    /// Deep-sleep period between idle listen windows.
    #[serde(default = "default_idle_sleep", with = "humantime_serde")]
    pub idle_sleep: Duration,

    /// How long to stay fully awake after the heater turns off.
    #[serde(default = "default_extended_wake", with = "humantime_serde")]
    pub extended_wake: Duration,

    /// W-BUS poll and status cadence while the heater runs.
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Replace idle deep sleep with continuous listening. Affects the idle
    /// duty cycle only; every other behavior is unchanged.
    #[serde(default)]
    pub disable_sleep: bool,

    /// Emit the one-time break pulse before the first W-BUS command.
    #[serde(default = "default_send_break")]
    pub send_break: bool,

    /// Run duration used when a start command carries zero minutes.
    #[serde(default = "default_run_minutes")]
    pub default_run_minutes: u8,
}

fn default_listen_window() -> Duration {
    Duration::from_millis(400)
}
fn default_idle_sleep() -> Duration {
    Duration::from_secs(4)
}
fn default_extended_wake() -> Duration {
    Duration::from_secs(60)
}
fn default_poll_interval() -> Duration {
    Duration::from_secs(2)
}
fn default_send_break() -> bool {
    true
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            idle_listen_window: default_listen_window(),
            idle_sleep: default_idle_sleep(),
            extended_wake: default_extended_wake(),
            poll_interval: default_poll_interval(),
            disable_sleep: false,
            send_break: default_send_break(),
            default_run_minutes: default_run_minutes(),
        }
    }
}

/// MQTT bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Enable the bridge. Requires the `mqtt` feature at build time.
    #[serde(default)]
    pub enabled: bool,

    /// Broker hostname or address.
    #[serde(default)]
    pub broker: String,

    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    #[serde(default = "default_client_id")]
    pub client_id: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Topic prefix for commands, state and discovery.
    #[serde(default = "default_base_topic")]
    pub base_topic: String,

    /// Commands with a timestamp older than this are dropped.
    #[serde(default = "default_stale_threshold", with = "humantime_serde")]
    pub stale_threshold: Duration,

    /// Publish HomeAssistant discovery payloads on connect.
    #[serde(default = "default_discovery")]
    pub discovery: bool,
}

fn default_mqtt_port() -> u16 {
    1883
}
fn default_client_id() -> String {
    "heatlink-receiver".into()
}
fn default_base_topic() -> String {
    "heatlink".into()
}
fn default_stale_threshold() -> Duration {
    Duration::from_secs(3600)
}
fn default_discovery() -> bool {
    true
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            broker: String::new(),
            port: default_mqtt_port(),
            client_id: default_client_id(),
            username: String::new(),
            password: String::new(),
            base_topic: default_base_topic(),
            stale_threshold: default_stale_threshold(),
            discovery: default_discovery(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Enable colored output.
    #[serde(default = "default_color")]
    pub color: bool,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_color() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            color: default_color(),
        }
    }
}

/// Initialize logging.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(config.color))
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to init logging: {e}")))?;

    Ok(())
}
