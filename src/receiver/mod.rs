//! The heater-side receiver node.
//!
//! The control loop in [`control`] owns every resource: the radio, the
//! W-BUS transport, and the status struct all have a single writer. The
//! types here are its support cast: the two values that survive deep
//! sleep, the stores that hold them, and the envelope local command
//! sources use to reach the loop.

mod control;

pub use control::Receiver;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::types::{CommandKind, CommandSource, Seq, TlvSupport};

/// The only state that survives the receiver's deep-sleep cycle. Neither
/// value is persisted across a cold boot.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RetainedState {
    /// Sequence of the last command actually executed, for retry dedup.
    /// Zero means none: the counter never allocates zero.
    pub last_processed_cmd_seq: Seq,

    /// Boot-time multi-status TLV probe result.
    pub tlv_support: TlvSupport,
}

/// Storage for [`RetainedState`] across sleep cycles, standing in for the
/// MCU's retained RTC memory.
pub trait Retention: Send {
    fn load(&mut self) -> RetainedState;
    fn store(&mut self, state: &RetainedState) -> Result<()>;
}

/// In-process retention; what tests and single-run benches use.
#[derive(Debug, Default)]
pub struct MemoryRetention {
    state: RetainedState,
}

impl Retention for MemoryRetention {
    fn load(&mut self) -> RetainedState {
        self.state
    }

    fn store(&mut self, state: &RetainedState) -> Result<()> {
        self.state = *state;
        Ok(())
    }
}

/// File-backed retention for the receiver binary, so a process restart
/// within one bench session behaves like a wake rather than a cold boot.
#[derive(Debug)]
pub struct FileRetention {
    path: PathBuf,
}

impl FileRetention {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Retention for FileRetention {
    fn load(&mut self) -> RetainedState {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("retained state unreadable, starting cold: {e}");
                RetainedState::default()
            }),
            Err(_) => RetainedState::default(),
        }
    }

    fn store(&mut self, state: &RetainedState) -> Result<()> {
        let content = serde_json::to_string(state)
            .map_err(|e| crate::Error::Internal(format!("retained state: {e}")))?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

/// A command arriving from a local source (menu button or MQTT) rather
/// than the radio. No sequence number: dedup applies to radio retries only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalCommand {
    pub kind: CommandKind,
    pub minutes: u8,
    pub source: CommandSource,
}

/// What the status sink observes for every emitted status packet: the
/// payload plus the source tag of the last executed command, for
/// diagnostics publication.
#[derive(Debug, Clone, Copy)]
pub struct StatusReport {
    pub status: crate::protocol::StatusPayload,
    pub source: Option<CommandSource>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_retention_round_trips() {
        let mut store = MemoryRetention::default();
        assert_eq!(store.load().last_processed_cmd_seq, Seq::ZERO);

        let state = RetainedState {
            last_processed_cmd_seq: Seq(43),
            tlv_support: TlvSupport::Unsupported,
        };
        store.store(&state).unwrap();
        let loaded = store.load();
        assert_eq!(loaded.last_processed_cmd_seq, Seq(43));
        assert_eq!(loaded.tlv_support, TlvSupport::Unsupported);
    }

    #[test]
    fn file_retention_survives_reload_and_tolerates_garbage() {
        let dir = std::env::temp_dir().join("heatlink-retention-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("retained.json");
        let _ = std::fs::remove_file(&path);

        let mut store = FileRetention::new(&path);
        assert_eq!(store.load().tlv_support, TlvSupport::Unknown);

        store
            .store(&RetainedState {
                last_processed_cmd_seq: Seq(7),
                tlv_support: TlvSupport::Supported,
            })
            .unwrap();

        let mut reopened = FileRetention::new(&path);
        assert_eq!(reopened.load().last_processed_cmd_seq, Seq(7));

        std::fs::write(&path, "not json").unwrap();
        assert_eq!(reopened.load().last_processed_cmd_seq, Seq::ZERO);

        let _ = std::fs::remove_file(&path);
    }
}
