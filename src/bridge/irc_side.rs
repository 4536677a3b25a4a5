//! IRC-side connection of the bridge.

use tokio::sync::mpsc;
use tracing::warn;

use super::reconnect::Reconnector;
use crate::config::IrcConfig;
use crate::irc::{IrcSession, Privmsg};

/// The bridge's IRC session under its own reconnect machine.
pub struct IrcSide {
    config: IrcConfig,
    announce: Option<String>,
    privmsg_tx: mpsc::UnboundedSender<Privmsg>,
}

impl IrcSide {
    /// Create the IRC side.
    ///
    /// `room_link` (when set) is announced to each joined channel.
    /// Channel messages flow out through `privmsg_tx`.
    pub fn new(
        config: IrcConfig,
        room_link: Option<String>,
        privmsg_tx: mpsc::UnboundedSender<Privmsg>,
    ) -> Self {
        let announce = room_link.map(|link| format!("Relaying to: {link}"));
        Self {
            config,
            announce,
            privmsg_tx,
        }
    }

    /// Run the IRC side forever, reconnecting on transport failure.
    pub async fn run(self) {
        let mut reconnect = Reconnector::new("IRC side", self.config.reconnect_interval());
        let session = IrcSession::new(
            self.config.clone(),
            self.announce.clone(),
            self.privmsg_tx.clone(),
        );

        loop {
            reconnect.connecting();
            match session.connect().await {
                Ok(transport) => {
                    reconnect.connected();
                    if let Err(e) = session.drive(transport).await {
                        warn!("IRC session ended: {}", e);
                    }
                    reconnect.disconnected();
                }
                Err(e) => {
                    warn!("IRC connect to {} failed: {}", self.config.addr(), e);
                    reconnect.disconnected();
                }
            }
            reconnect.wait().await;
        }
    }
}
