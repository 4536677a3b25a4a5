//! Chat-side connection of the bridge: a WebSocket client of the
//! broadcast server.

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use super::reconnect::Reconnector;
use crate::config::{ChatConfig, IrcConfig};
use crate::protocol::{ClientEnvelope, ServerEnvelope};
use crate::{RelayChatError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// The bridge's connection to the broadcast server.
///
/// Joins the configured room, registers the relay's display name, and
/// carries spoofed envelopes handed over from the IRC side. Inbound
/// room traffic is observed but not relayed to IRC.
pub struct ChatSide {
    config: ChatConfig,
    greeting: String,
    outbound: mpsc::UnboundedReceiver<ClientEnvelope>,
}

impl ChatSide {
    /// Create the chat side.
    ///
    /// `outbound` delivers envelopes translated from IRC traffic.
    pub fn new(
        config: ChatConfig,
        irc: &IrcConfig,
        outbound: mpsc::UnboundedReceiver<ClientEnvelope>,
    ) -> Self {
        let channel = irc.channels.first().map(String::as_str).unwrap_or("#");
        let greeting = format!("Hello everyone! {} {} messenger here.", irc.host, channel);
        Self {
            config,
            greeting,
            outbound,
        }
    }

    /// Run the chat side forever, reconnecting on transport failure.
    pub async fn run(mut self) {
        let mut reconnect = Reconnector::new("chat side", self.config.reconnect_interval());
        let url = self.config.url();

        loop {
            reconnect.connecting();
            match connect_async(url.as_str()).await {
                Ok((ws, _)) => {
                    reconnect.connected();
                    if let Err(e) = self.session(ws).await {
                        warn!("Chat side session ended: {}", e);
                    }
                    reconnect.disconnected();
                }
                Err(e) => {
                    warn!("Chat side connect to {} failed: {}", url, e);
                    reconnect.disconnected();
                }
            }
            self.idle(&mut reconnect).await;
        }
    }

    /// One connected session: announce, then pump both directions.
    async fn session(&mut self, mut ws: WsStream) -> Result<()> {
        // Join the room, register the relay's display name, say hello.
        let setup = [
            ClientEnvelope::Join {
                room: self.config.room.clone(),
            },
            ClientEnvelope::message(&self.config.room, &self.config.nick),
            ClientEnvelope::message(&self.config.room, &self.greeting),
        ];
        for envelope in setup {
            ws.send(WsMessage::text(serde_json::to_string(&envelope)?))
                .await?;
        }

        loop {
            tokio::select! {
                inbound = ws.next() => {
                    match inbound {
                        Some(Ok(WsMessage::Text(text))) => {
                            match serde_json::from_str::<ServerEnvelope>(text.as_str()) {
                                Ok(ServerEnvelope::Message(m)) => {
                                    // Room traffic stays on the chat side.
                                    debug!("Room {} <{}> {}", m.room, m.author, m.text);
                                }
                                Ok(ServerEnvelope::History { history }) => {
                                    debug!("Received {} history entries", history.len());
                                }
                                Err(e) => {
                                    debug!("Bad envelope from chat server: {}", e);
                                }
                            }
                        }
                        Some(Ok(WsMessage::Close(_))) | None => {
                            return Err(RelayChatError::Transport(
                                "chat server closed the connection".to_string(),
                            ));
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                    }
                }

                relayed = self.outbound.recv() => {
                    match relayed {
                        Some(envelope) => {
                            info!("Relaying to chat: {:?}", envelope);
                            ws.send(WsMessage::text(serde_json::to_string(&envelope)?))
                                .await?;
                        }
                        None => {
                            return Err(RelayChatError::Transport(
                                "relay pipeline closed".to_string(),
                            ));
                        }
                    }
                }
            }
        }
    }

    /// Run the retry delay. Relayed messages arriving while there is no
    /// connection to carry them are dropped with a notice.
    async fn idle(&mut self, reconnect: &mut Reconnector) {
        let delay = reconnect.wait();
        tokio::pin!(delay);

        loop {
            tokio::select! {
                _ = &mut delay => break,
                relayed = self.outbound.recv() => {
                    match relayed {
                        Some(envelope) => {
                            info!("Chat side disconnected, dropping relayed message: {:?}", envelope);
                        }
                        None => {
                            (&mut delay).await;
                            break;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::sync::mpsc::unbounded_channel;

    use crate::config::ServerConfig;
    use crate::protocol::Message;
    use crate::server::ChatServer;

    async fn start_chat_server() -> u16 {
        let server = ChatServer::bind(&ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            history_size: 500,
        })
        .await
        .unwrap();
        let port = server.local_addr().unwrap().port();
        tokio::spawn(server.run());
        port
    }

    fn test_configs(port: u16) -> (ChatConfig, IrcConfig) {
        let chat = ChatConfig {
            host: "127.0.0.1".to_string(),
            port,
            reconnect_interval_secs: 1,
            ..ChatConfig::default()
        };
        let irc = IrcConfig {
            host: "irc.example.net".to_string(),
            channels: vec!["#chan".to_string()],
            ..IrcConfig::default()
        };
        (chat, irc)
    }

    async fn recv_message(observer: &mut super::WsStream) -> Message {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), observer.next())
                .await
                .expect("timed out waiting for broadcast")
                .expect("stream ended")
                .expect("transport error");
            if let WsMessage::Text(text) = frame {
                if let Ok(ServerEnvelope::Message(m)) =
                    serde_json::from_str::<ServerEnvelope>(text.as_str())
                {
                    return m;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_announces_and_relays_spoofed_messages() {
        let port = start_chat_server().await;
        let (chat_config, irc_config) = test_configs(port);
        let room = chat_config.room.clone();

        // An observer registered in the room sees what the relay does.
        let url = format!("ws://127.0.0.1:{}", port);
        let (mut observer, _) = connect_async(url.as_str()).await.unwrap();
        observer
            .send(WsMessage::text(
                serde_json::to_string(&ClientEnvelope::Join { room: room.clone() }).unwrap(),
            ))
            .await
            .unwrap();
        observer
            .send(WsMessage::text(
                serde_json::to_string(&ClientEnvelope::message(&room, "observer")).unwrap(),
            ))
            .await
            .unwrap();

        let (relay_tx, relay_rx) = unbounded_channel();
        let side = ChatSide::new(chat_config, &irc_config, relay_rx);
        tokio::spawn(side.run());

        // The relay's greeting is broadcast under its registered nick.
        let greeting = recv_message(&mut observer).await;
        assert_eq!(greeting.author, "ircrelay");
        assert!(greeting.text.contains("irc.example.net"));

        // An envelope translated from IRC comes through spoofed.
        relay_tx
            .send(ClientEnvelope::spoofed(&room, "hey there", "carl"))
            .unwrap();
        let relayed = recv_message(&mut observer).await;
        assert_eq!(relayed.author, "carl");
        assert_eq!(relayed.text, "hey there");
    }

    #[tokio::test]
    async fn test_unreachable_server_keeps_retrying() {
        // Bind-then-drop gives a port with nothing listening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (chat_config, irc_config) = test_configs(port);
        let (relay_tx, relay_rx) = unbounded_channel();
        let side = ChatSide::new(chat_config, &irc_config, relay_rx);
        let handle = tokio::spawn(side.run());

        // Messages sent while disconnected are dropped, not queued; the
        // supervisor task stays alive through failed attempts.
        relay_tx
            .send(ClientEnvelope::spoofed("#relay", "lost", "carl"))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!handle.is_finished());
        handle.abort();
    }
}
