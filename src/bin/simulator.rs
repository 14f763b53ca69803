//! Bench heater emulator.
//!
//! Speaks heater-side W-BUS framing over a UDP byte port so the receiver
//! binary can be exercised without hardware: acknowledges start/stop/
//! keep-alive, serves the simple status pages, and optionally the
//! multi-status TLV snapshot. A coarse thermal model keeps the readings
//! moving.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use rand::Rng;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use heatlink::config::{init_logging, LoggingConfig};
use heatlink::error::Result;
use heatlink::wbus::{
    Frame, RxStateMachine, UdpBytePort, WbusPort, CMD_KEEPALIVE, CMD_START_HEAT, CMD_START_VENT,
    CMD_STATUS, CMD_STOP, STATUS_IDX_ACTUATORS, STATUS_IDX_COMPONENT_RATES, STATUS_IDX_COUNTERS,
    STATUS_IDX_FLAGS_2, STATUS_IDX_FLAGS_3, STATUS_IDX_MEASUREMENTS, STATUS_IDX_MULTI,
    STATUS_IDX_OP_STATE,
};

#[derive(Parser, Debug)]
#[command(name = "simulator", about = "W-BUS heater emulator for bench testing")]
struct Args {
    /// Local W-BUS byte-port socket.
    #[arg(long, default_value = "127.0.0.1:47711")]
    bind: SocketAddr,

    /// Receiver W-BUS byte-port socket.
    #[arg(long, default_value = "127.0.0.1:47710")]
    peer: SocketAddr,

    /// Answer multi-status TLV snapshot requests. Disable to exercise the
    /// receiver's simple-page fallback.
    #[arg(long)]
    tlv: bool,

    /// Log level.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SimState {
    Off,
    Starting,
    Running,
    Cooling,
}

struct SimModel {
    state: SimState,
    state_since: Instant,
    run_until: Option<Instant>,
    ambient_c: f32,
    temp_c: f32,
    voltage_mv: u16,
    power_x10: u16,
    flame: bool,
    start_counter: u16,
}

impl SimModel {
    fn new() -> Self {
        Self {
            state: SimState::Off,
            state_since: Instant::now(),
            run_until: None,
            ambient_c: 20.0,
            temp_c: 20.0,
            voltage_mv: 12400,
            power_x10: 0,
            flame: false,
            start_counter: 0,
        }
    }

    fn set_state(&mut self, state: SimState) {
        if self.state != state {
            info!(?state, "heater state");
            self.state = state;
            self.state_since = Instant::now();
        }
    }

    fn op_state_code(&self) -> u8 {
        match self.state {
            SimState::Off => 0x04,
            SimState::Starting => 0x01,
            SimState::Running => 0x06,
            SimState::Cooling => 0x02,
        }
    }

    fn start(&mut self, minutes: u8) {
        self.start_counter = self.start_counter.wrapping_add(1);
        self.run_until = Some(Instant::now() + Duration::from_secs(u64::from(minutes) * 60));
        self.set_state(SimState::Starting);
    }

    fn stop(&mut self) {
        self.run_until = None;
        if self.state == SimState::Starting || self.state == SimState::Running {
            self.set_state(SimState::Cooling);
        }
    }

    /// Advance the thermal model one tick.
    fn tick(&mut self) {
        let mut rng = rand::thread_rng();
        let now = Instant::now();

        match self.state {
            SimState::Starting => {
                if now - self.state_since > Duration::from_secs(8) {
                    self.flame = true;
                    self.set_state(SimState::Running);
                }
                self.power_x10 = 4000;
            }
            SimState::Running => {
                if matches!(self.run_until, Some(t) if now >= t) {
                    self.stop();
                    return;
                }
                // Ramp toward the target water temperature.
                self.temp_c += (75.0 - self.temp_c) * 0.05;
                self.power_x10 = 12000 + rng.gen_range(0..400);
            }
            SimState::Cooling => {
                self.flame = false;
                self.power_x10 = 0;
                if now - self.state_since > Duration::from_secs(15) {
                    self.set_state(SimState::Off);
                }
                self.temp_c += (self.ambient_c - self.temp_c) * 0.03;
            }
            SimState::Off => {
                self.power_x10 = 0;
                self.temp_c += (self.ambient_c - self.temp_c) * 0.02;
            }
        }

        self.voltage_mv = 12300 + rng.gen_range(0..200);
    }

    fn temp_byte(&self) -> u8 {
        (self.temp_c.round() as i16 + 50).clamp(0, 255) as u8
    }
}

/// Build the response payload (after the echoed command byte) for one
/// status page request.
fn status_page(model: &SimModel, idx: u8) -> Option<Vec<u8>> {
    let mut data = vec![idx];
    match idx {
        STATUS_IDX_OP_STATE => data.push(model.op_state_code()),
        STATUS_IDX_FLAGS_2 => data.push(if model.state == SimState::Running { 0x01 } else { 0x00 }),
        STATUS_IDX_FLAGS_3 => {
            let mut flags = 0u8;
            if model.state != SimState::Off {
                flags |= 0x01; // heat request
            }
            if model.state == SimState::Running {
                flags |= 0x10 | 0x40; // combustion fan + fuel pump
            }
            if model.state == SimState::Starting {
                flags |= 0x20; // glow plug
            }
            data.push(flags);
        }
        STATUS_IDX_ACTUATORS => {
            let running = model.state == SimState::Running;
            // Payload offsets 4..=6: glow plug, fuel pump, combustion fan.
            data.extend_from_slice(&[
                0,
                0,
                if model.state == SimState::Starting { 90 } else { 0 },
                if running { 12 } else { 0 },
                if running { 85 } else { 0 },
                0,
                0,
                0,
            ]);
        }
        STATUS_IDX_MEASUREMENTS => {
            data.push(model.temp_byte());
            data.extend_from_slice(&model.voltage_mv.to_be_bytes());
            data.push(u8::from(model.flame));
            data.extend_from_slice(&model.power_x10.to_be_bytes());
            data.extend_from_slice(&[0, 0]);
        }
        STATUS_IDX_COUNTERS => {
            data.extend_from_slice(&[0x00, 0x2A, 15, 0x00, 0x64, 30]);
            data.extend_from_slice(&model.start_counter.to_be_bytes());
        }
        STATUS_IDX_COMPONENT_RATES => {
            let running = model.state == SimState::Running;
            data.extend_from_slice(&[
                if model.state == SimState::Starting { 45 } else { 0 },
                if running { 8 } else { 0 },
                if running { 60 } else { 0 },
            ]);
        }
        _ => return None,
    }
    Some(data)
}

/// Build a TLV snapshot answering the requested IDs we model.
fn tlv_snapshot(model: &SimModel, ids: &[u8]) -> Vec<u8> {
    let mut data = vec![STATUS_IDX_MULTI];
    for &id in ids {
        match id {
            0x05 => data.extend_from_slice(&[0x05, model.op_state_code()]),
            0x0C => data.extend_from_slice(&[0x0C, model.temp_byte()]),
            0x0E => {
                data.push(0x0E);
                data.extend_from_slice(&model.voltage_mv.to_be_bytes());
            }
            0x11 => {
                data.push(0x11);
                data.extend_from_slice(&(model.power_x10 / 10).to_be_bytes());
            }
            _ => {}
        }
    }
    data
}

async fn respond(port: &mut UdpBytePort, cmd: u8, data: &[u8]) -> Result<()> {
    port.write_all(&Frame::response(cmd, data).encode()).await
}

async fn handle_frame(
    port: &mut UdpBytePort,
    model: &mut SimModel,
    frame: &Frame,
    tlv: bool,
) -> Result<()> {
    // Only react to controller-addressed frames; everything else on the
    // single wire is our own echo.
    if frame.is_from_heater() || frame.payload.is_empty() {
        return Ok(());
    }

    let cmd = frame.command_byte();
    let data = &frame.payload[1..];
    debug!(cmd = format_args!("{cmd:#04x}"), len = data.len(), "request");

    match cmd {
        CMD_START_HEAT | CMD_START_VENT => {
            model.start(data.first().copied().unwrap_or(30));
            respond(port, cmd, &[]).await
        }
        CMD_STOP => {
            model.stop();
            respond(port, cmd, &[]).await
        }
        CMD_KEEPALIVE => respond(port, cmd, &[]).await,
        CMD_STATUS => match data.first() {
            Some(&STATUS_IDX_MULTI) => {
                if tlv {
                    respond(port, cmd, &tlv_snapshot(model, &data[1..])).await
                } else {
                    // Unsupported firmware stays silent; the controller
                    // falls back to simple pages.
                    Ok(())
                }
            }
            Some(&idx) => match status_page(model, idx) {
                Some(page) => respond(port, cmd, &page).await,
                None => Ok(()),
            },
            None => Ok(()),
        },
        _ => Ok(()),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&LoggingConfig {
        level: args.log_level.clone(),
        color: true,
    })?;

    let mut port = UdpBytePort::bind(args.bind, args.peer).await?;
    let mut rx = RxStateMachine::new();
    let mut model = SimModel::new();

    info!(tlv = args.tlv, "simulator listening on {}", args.bind);

    let mut last_tick = Instant::now();
    loop {
        let mut buf = [0u8; 64];
        let n = port.try_read(&mut buf)?;
        if n > 0 {
            rx.feed(&buf[..n]);
        }

        while let Some(frame) = rx.pop_frame() {
            handle_frame(&mut port, &mut model, &frame, args.tlv).await?;
        }

        if last_tick.elapsed() >= Duration::from_millis(500) {
            last_tick = Instant::now();
            model.tick();
        }

        sleep(Duration::from_millis(5)).await;
    }
}
