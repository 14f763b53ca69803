//! Heater-side receiver node (bench build).
//!
//! Radio over UDP, W-BUS over a UDP byte port; pair it with the simulator
//! binary. A real K-line interface plugs in through the library's serial
//! port adapter instead of the UDP one.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use heatlink::config::{init_logging, Config};
use heatlink::crypto::PacketCipher;
use heatlink::error::Result;
use heatlink::radio::UdpRadio;
use heatlink::receiver::{FileRetention, Receiver};
use heatlink::wbus::{UdpBytePort, WbusTransport};

#[derive(Parser, Debug)]
#[command(name = "receiver", about = "Heater remote: heater-side receiver node")]
struct Args {
    /// Configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Local radio socket.
    #[arg(long, default_value = "127.0.0.1:47702")]
    bind: SocketAddr,

    /// Sender radio socket.
    #[arg(long, default_value = "127.0.0.1:47701")]
    peer: SocketAddr,

    /// Local W-BUS byte-port socket.
    #[arg(long, default_value = "127.0.0.1:47710")]
    wbus_bind: SocketAddr,

    /// Heater (simulator) W-BUS byte-port socket.
    #[arg(long, default_value = "127.0.0.1:47711")]
    wbus_peer: SocketAddr,

    /// Retained-state file standing in for RTC memory.
    #[arg(long, default_value = "heatlink-retained.json")]
    retain: PathBuf,

    /// Pre-shared key, 32 hex characters (overrides config).
    #[arg(long)]
    psk: Option<String>,

    /// Log level.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match args.config {
        Some(ref path) => Config::load(path)?,
        None => Config::default(),
    };
    config.logging.level = args.log_level.clone();
    init_logging(&config.logging)?;

    if let Some(psk) = args.psk {
        config.link.psk = Some(psk);
    }
    let cipher = PacketCipher::new(config.preshared_key()?);

    let radio = UdpRadio::bind(args.bind, args.peer).await?;
    let port = UdpBytePort::bind(args.wbus_bind, args.wbus_peer).await?;
    let wbus = WbusTransport::new(port, config.receiver.send_break);
    let retention = FileRetention::new(&args.retain);

    let mut receiver = Receiver::new(radio, wbus, cipher, config.receiver.clone(), retention);

    #[cfg(feature = "mqtt")]
    let _mqtt_task = if config.mqtt.enabled {
        let (cmd_tx, cmd_rx) = tokio::sync::mpsc::unbounded_channel();
        let (status_tx, status_rx) = tokio::sync::mpsc::unbounded_channel();
        receiver = receiver
            .with_external_commands(cmd_rx)
            .with_status_sink(status_tx);
        let bridge = heatlink::mqtt::MqttBridge::new(config.mqtt.clone(), cmd_tx, status_rx);
        Some(tokio::spawn(bridge.run()))
    } else {
        None
    };

    receiver.boot().await?;
    info!("receiver running");

    tokio::select! {
        res = receiver.run() => res,
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            Ok(())
        }
    }
}
