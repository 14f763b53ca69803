//! The handheld sender node.
//!
//! Glues the command engine to its two local input paths: the serial CLI
//! and the button menu. Both funnel into [`Sender::submit`], which tracks
//! the preset run duration the way the firmware remembers its last
//! `run <minutes>`.

mod cli;
mod engine;

pub use cli::{parse_line, CliCommand};
pub use engine::{CommandEngine, PendingCommand, SubmitOutcome};

use crate::error::Result;
use crate::menu::{Menu, MenuItem};
use crate::radio::RadioLink;
use crate::types::CommandKind;

/// Sender node: command engine plus local input handling.
pub struct Sender<R> {
    pub engine: CommandEngine<R>,
    pub menu: Menu,
    preset_minutes: u8,
}

impl<R: RadioLink> Sender<R> {
    pub fn new(engine: CommandEngine<R>, preset_minutes: u8) -> Self {
        Self {
            engine,
            menu: Menu::new(),
            preset_minutes,
        }
    }

    pub fn preset_minutes(&self) -> u8 {
        self.preset_minutes
    }

    /// Execute a parsed CLI line.
    pub async fn execute_cli(&mut self, cmd: CliCommand) -> Result<SubmitOutcome> {
        match cmd {
            CliCommand::Start => self.engine.submit(CommandKind::Start, self.preset_minutes).await,
            CliCommand::Stop => self.engine.submit(CommandKind::Stop, 0).await,
            CliCommand::Run(minutes) => {
                self.preset_minutes = minutes;
                self.engine.submit(CommandKind::RunMinutes, minutes).await
            }
        }
    }

    /// Execute an activated menu item.
    pub async fn execute_menu_item(&mut self, item: MenuItem) -> Result<SubmitOutcome> {
        let (kind, minutes) = item.command();
        let minutes = match kind {
            CommandKind::Start => self.preset_minutes,
            CommandKind::RunMinutes => {
                self.preset_minutes = minutes;
                minutes
            }
            _ => minutes,
        };
        self.engine.submit(kind, minutes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SenderConfig;
    use crate::crypto::{PacketCipher, PresharedKey};
    use crate::radio::channel_pair;

    #[tokio::test(start_paused = true)]
    async fn run_updates_the_preset() {
        let (a, _b) = channel_pair();
        let cipher = PacketCipher::new(PresharedKey::new(*b"0123456789abcdef"));
        let engine = CommandEngine::new(a, cipher, SenderConfig::default());
        let mut sender = Sender::new(engine, 30);

        // No peer: every submit times out, but the preset still updates.
        sender.execute_cli(CliCommand::Run(90)).await.unwrap();
        assert_eq!(sender.preset_minutes(), 90);

        sender.execute_menu_item(MenuItem::Run20Min).await.unwrap();
        assert_eq!(sender.preset_minutes(), 20);

        sender.execute_menu_item(MenuItem::QueryStatus).await.unwrap();
        assert_eq!(sender.preset_minutes(), 20);
    }
}
