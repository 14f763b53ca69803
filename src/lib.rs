//! # Heatlink
//!
//! Point-to-point remote control and telemetry link for W-BUS parking
//! heaters. A handheld **sender** submits commands over an encrypted LoRa
//! style packet link; a heater-side **receiver** executes them on the
//! heater over the single-wire W-BUS and reports correlated status back.
//!
//! ## Architecture
//!
//! ┌──────────────────────────────┐      ┌──────────────────────────────┐
//! │            Sender            │      │           Receiver           │
//! │  CLI / menu                  │      │  duty-cycled control loop    │
//! │  command engine (retry/ACK)  │      │  dispatch · dedup · polling  │
//! ├──────────────────────────────┤      ├──────────────────────────────┤
//! │  packet codec + AES-128-CTR  │◀────▶│  packet codec + AES-128-CTR  │
//! ├──────────────────────────────┤ radio├──────────────────────────────┤
//! │          radio link          │      │  radio link │ W-BUS transport│
//! └──────────────────────────────┘      └─────────────┴────────┬───────┘
//!                                                              │ 2400 8E1
//!                                                         ┌────▼───────┐
//!                                                         │   heater   │
//!                                                         └────────────┘

#![warn(clippy::all, clippy::pedantic)]
// Allow stylistic lints that don't affect correctness
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_possible_truncation)] // Intentional wire-field narrowing
#![allow(clippy::cast_sign_loss)] // Quantizer arithmetic
#![allow(clippy::cast_possible_wrap)] // Intentional for sequence arithmetic
#![allow(clippy::doc_markdown)] // ASCII diagrams in docs
#![allow(clippy::match_same_arms)] // Explicit arm per variant is clearer
#![allow(clippy::struct_excessive_bools)] // Boolean config fields are appropriate

pub mod config;
pub mod crypto;
pub mod error;
pub mod menu;
pub mod protocol;
pub mod radio;
pub mod receiver;
pub mod sender;
pub mod types;
pub mod wbus;

#[cfg(feature = "mqtt")]
pub mod mqtt;

pub use config::Config;
pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::crypto::{PacketCipher, PresharedKey};
    pub use crate::error::{Error, Result};
    pub use crate::protocol::{MsgType, Packet, Payload, StatusPayload};
    pub use crate::radio::{RadioLink, RadioMode, ReceivedFrame};
    pub use crate::receiver::Receiver;
    pub use crate::sender::CommandEngine;
    pub use crate::types::{CommandKind, HeaterState, NodeId, Seq};
    pub use crate::wbus::WbusTransport;
}
