//! Handheld sender node (bench build).
//!
//! Radio over UDP, commands from stdin: `start`, `stop`, `run <minutes>`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use heatlink::config::{init_logging, Config};
use heatlink::crypto::PacketCipher;
use heatlink::error::Result;
use heatlink::protocol::StatusPayload;
use heatlink::radio::UdpRadio;
use heatlink::sender::{parse_line, CommandEngine, Sender, SubmitOutcome};

#[derive(Parser, Debug)]
#[command(name = "sender", about = "Heater remote: handheld sender node")]
struct Args {
    /// Configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Local radio socket.
    #[arg(long, default_value = "127.0.0.1:47701")]
    bind: SocketAddr,

    /// Receiver radio socket.
    #[arg(long, default_value = "127.0.0.1:47702")]
    peer: SocketAddr,

    /// Pre-shared key, 32 hex characters (overrides config).
    #[arg(long)]
    psk: Option<String>,

    /// Log level.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn describe(status: &StatusPayload) -> String {
    format!(
        "heater={} remaining={}min temp={}C batt={:.2}V power={}W rssi={}dBm snr={}dB",
        status.state,
        status.minutes_remaining,
        status.temperature.celsius(),
        f64::from(status.voltage.millivolts()) / 1000.0,
        status.power.watts(),
        status.last_rssi_dbm,
        status.last_snr_db,
    )
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
    let engine = CommandEngine::new(radio, cipher, config.sender.clone());
    let mut sender = Sender::new(engine, config.sender.default_run_minutes);

    println!("Sender ready. Commands: start | stop | run <minutes>");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pump = tokio::time::interval(Duration::from_millis(100));

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let cmd = match parse_line(&line) {
                    Ok(cmd) => cmd,
                    Err(diag) => {
                        println!("{diag}");
                        continue;
                    }
                };

                let label = line.trim().to_ascii_uppercase();
                match sender.execute_cli(cmd).await {
                    Ok(SubmitOutcome::Acked(status)) => {
                        println!("Sent {label} (ACKed)");
                        println!("  {}", describe(&status));
                    }
                    Ok(SubmitOutcome::TimedOut) => println!("Failed to send {label}"),
                    Err(e) => println!("Rejected: {e}"),
                }
            }
            _ = pump.tick() => {
                // Merge unsolicited statuses into display state while idle.
                sender.engine.pump();
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(())
}
