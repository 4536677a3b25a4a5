//! Bridge between a chat room and an IRC channel.
//!
//! Owns one client connection to the broadcast server and one IRC
//! session, each behind its own reconnect machine. Inbound IRC channel
//! messages are translated into spoofed chat envelopes; chat traffic is
//! not relayed back to IRC.

mod chat_side;
mod irc_side;
mod reconnect;

pub use chat_side::ChatSide;
pub use irc_side::IrcSide;
pub use reconnect::{ReconnectState, Reconnector};

use tokio::sync::mpsc;
use tracing::info;

use crate::config::Config;
use crate::irc::Privmsg;
use crate::protocol::ClientEnvelope;

/// The relay process: both sides plus the translation between them.
pub struct Bridge {
    config: Config,
}

impl Bridge {
    /// Create a bridge from the full relay configuration.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run both sides until the process exits.
    pub async fn run(self) {
        let (chat_tx, chat_rx) = mpsc::unbounded_channel();
        let (privmsg_tx, privmsg_rx) = mpsc::unbounded_channel();

        let chat = ChatSide::new(self.config.chat.clone(), &self.config.irc, chat_rx);
        let irc = IrcSide::new(
            self.config.irc.clone(),
            self.config.chat.room_link.clone(),
            privmsg_tx,
        );

        tokio::spawn(translate(
            privmsg_rx,
            chat_tx,
            self.config.chat.room.clone(),
        ));

        tokio::join!(chat.run(), irc.run());
    }
}

/// Turn inbound IRC channel messages into spoofed chat envelopes.
async fn translate(
    mut privmsg_rx: mpsc::UnboundedReceiver<Privmsg>,
    chat_tx: mpsc::UnboundedSender<ClientEnvelope>,
    room: String,
) {
    while let Some(privmsg) = privmsg_rx.recv().await {
        info!("IRC -> chat {}: {}", privmsg.nick, privmsg.text);
        let envelope = ClientEnvelope::spoofed(&room, &privmsg.text, &privmsg.nick);
        if chat_tx.send(envelope).is_err() {
            break;
        }
    }
}
