//! Shared bench heater for the integration tests: a scripted W-BUS peer
//! behind a memory port. Responds like the bench firmware with fixed
//! readings (21 °C, 12150 mV, 1200 W) and a coarse off/running state.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use heatlink::wbus::{
    Frame, MemoryPort, RxStateMachine, WbusPort, CMD_KEEPALIVE, CMD_START_HEAT, CMD_START_VENT,
    CMD_STATUS, CMD_STOP, STATUS_IDX_MEASUREMENTS, STATUS_IDX_MULTI, STATUS_IDX_OP_STATE,
};

#[derive(Default)]
pub struct HeaterCounters {
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub multi_status_requests: AtomicUsize,
    pub running: AtomicBool,
}

/// Spawn the scripted heater on the far end of a W-BUS memory port.
pub fn spawn_heater(mut port: MemoryPort, tlv_supported: bool) -> Arc<HeaterCounters> {
    let counters = Arc::new(HeaterCounters::default());
    let shared = Arc::clone(&counters);

    tokio::spawn(async move {
        let mut rx = RxStateMachine::new();
        loop {
            let mut buf = [0u8; 64];
            if let Ok(n) = port.try_read(&mut buf) {
                if n > 0 {
                    rx.feed(&buf[..n]);
                }
            }

            while let Some(frame) = rx.pop_frame() {
                if frame.is_from_heater() || frame.payload.is_empty() {
                    continue;
                }
                let cmd = frame.command_byte();
                let data = &frame.payload[1..];

                match cmd {
                    CMD_START_HEAT | CMD_START_VENT => {
                        shared.starts.fetch_add(1, Ordering::SeqCst);
                        shared.running.store(true, Ordering::SeqCst);
                        let _ = port.write_all(&Frame::response(cmd, &[]).encode()).await;
                    }
                    CMD_STOP => {
                        shared.stops.fetch_add(1, Ordering::SeqCst);
                        shared.running.store(false, Ordering::SeqCst);
                        let _ = port.write_all(&Frame::response(cmd, &[]).encode()).await;
                    }
                    CMD_KEEPALIVE => {
                        let _ = port.write_all(&Frame::response(cmd, &[]).encode()).await;
                    }
                    CMD_STATUS => {
                        let running = shared.running.load(Ordering::SeqCst);
                        match data.first() {
                            Some(&STATUS_IDX_MULTI) => {
                                shared.multi_status_requests.fetch_add(1, Ordering::SeqCst);
                                if tlv_supported {
                                    // temp 21 C, 12150 mV, 1200 W
                                    let tlvs = [
                                        STATUS_IDX_MULTI,
                                        0x0C,
                                        71,
                                        0x0E,
                                        0x2F,
                                        0x76,
                                        0x11,
                                        0x04,
                                        0xB0,
                                    ];
                                    let _ = port
                                        .write_all(&Frame::response(cmd, &tlvs).encode())
                                        .await;
                                }
                                // Unsupported firmware stays silent.
                            }
                            Some(&STATUS_IDX_OP_STATE) => {
                                let op = if running { 0x06 } else { 0x04 };
                                let _ = port
                                    .write_all(
                                        &Frame::response(cmd, &[STATUS_IDX_OP_STATE, op]).encode(),
                                    )
                                    .await;
                            }
                            Some(&STATUS_IDX_MEASUREMENTS) => {
                                let page = [
                                    STATUS_IDX_MEASUREMENTS,
                                    71, // 21 C
                                    0x2F,
                                    0x76, // 12150 mV
                                    u8::from(running),
                                    0x2E,
                                    0xE0, // 1200.0 W in tenths
                                    0,
                                    0,
                                ];
                                let _ =
                                    port.write_all(&Frame::response(cmd, &page).encode()).await;
                            }
                            Some(&idx) => {
                                // Remaining simple pages: short generic data.
                                let _ = port
                                    .write_all(&Frame::response(cmd, &[idx, 0, 0, 0]).encode())
                                    .await;
                            }
                            None => {}
                        }
                    }
                    _ => {}
                }
            }

            sleep(Duration::from_millis(5)).await;
        }
    });

    counters
}
