//! IRC session: transport, registration, keepalive, and inbound line
//! dispatch.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::rustls::{self, pki_types::ServerName, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::{debug, info};

use super::dispatcher::Dispatcher;
use crate::config::IrcConfig;
use crate::{RelayChatError, Result};

/// An inbound channel message, forwarded to the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Privmsg {
    /// Nick of the IRC sender.
    pub nick: String,
    /// Message body.
    pub text: String,
}

/// A connected IRC transport, plaintext or TLS.
pub enum IrcTransport {
    Plain(TcpStream),
    Tls(tokio_rustls::client::TlsStream<TcpStream>),
}

/// Raw-send handle: queues lines for the writer task.
///
/// The protocol line terminator is appended at write time; empty lines
/// are never sent.
#[derive(Clone)]
struct RawSender {
    tx: mpsc::UnboundedSender<String>,
}

impl RawSender {
    fn send(&self, line: impl Into<String>) {
        let line = line.into();
        if line.is_empty() {
            return;
        }
        if self.tx.send(line).is_err() {
            debug!("IRC writer gone, dropping outbound line");
        }
    }
}

/// One IRC session over one transport connection.
///
/// A session registers (`NICK`/`USER`), answers server pings, joins the
/// configured channels on the 001 welcome, and forwards channel
/// messages to the bridge. It runs until the transport dies; the
/// bridge's reconnect machine decides what happens next.
pub struct IrcSession {
    config: IrcConfig,
    announce: Option<String>,
    privmsg_tx: mpsc::UnboundedSender<Privmsg>,
}

impl IrcSession {
    /// Create a session description (nothing is connected yet).
    ///
    /// `announce` is sent to each channel right after joining it.
    pub fn new(
        config: IrcConfig,
        announce: Option<String>,
        privmsg_tx: mpsc::UnboundedSender<Privmsg>,
    ) -> Self {
        Self {
            config,
            announce,
            privmsg_tx,
        }
    }

    /// Establish the transport (TCP, optionally TLS).
    pub async fn connect(&self) -> Result<IrcTransport> {
        let addr = self.config.addr();
        let tcp = TcpStream::connect(&addr).await?;
        tcp.set_nodelay(true)?;

        if !self.config.tls {
            info!("IRC connected to {} (plain)", addr);
            return Ok(IrcTransport::Plain(tcp));
        }

        let tls_config = if self.config.accept_invalid_certs {
            insecure_tls_config()
        } else {
            default_tls_config()
        };
        let connector = TlsConnector::from(Arc::new(tls_config));
        let server_name = ServerName::try_from(self.config.host.clone()).map_err(|e| {
            RelayChatError::Transport(format!("invalid TLS server name {}: {e}", self.config.host))
        })?;
        let stream = connector.connect(server_name, tcp).await?;

        info!("IRC connected to {} (TLS)", addr);
        Ok(IrcTransport::Tls(stream))
    }

    /// Run the session on an established transport until it dies.
    pub async fn drive(&self, transport: IrcTransport) -> Result<()> {
        match transport {
            IrcTransport::Plain(stream) => {
                let (reader, writer) = tokio::io::split(stream);
                self.drive_io(BufReader::new(reader), writer).await
            }
            IrcTransport::Tls(stream) => {
                let (reader, writer) = tokio::io::split(stream);
                self.drive_io(BufReader::new(reader), writer).await
            }
        }
    }

    /// Connect and drive in one step.
    pub async fn run(&self) -> Result<()> {
        let transport = self.connect().await?;
        self.drive(transport).await
    }

    async fn drive_io<R, W>(&self, reader: BufReader<R>, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (line_tx, line_rx) = mpsc::unbounded_channel();
        let raw = RawSender { tx: line_tx };

        let writer_task = tokio::spawn(write_lines(writer, line_rx));

        let mut dispatcher = Dispatcher::new();
        self.install_handlers(&mut dispatcher, &raw)?;

        // Register immediately; the 001 handler takes it from there.
        raw.send(format!("NICK {}", self.config.nick));
        raw.send(format!(
            "USER {} 8 * :{}",
            self.config.user, self.config.real
        ));

        // One keepalive per live session, cancelled when the session
        // ends and recreated by the next one.
        let keepalive = tokio::spawn(keepalive_loop(
            raw.clone(),
            self.config.keepalive_interval(),
        ));

        let result = read_loop(reader, &mut dispatcher).await;

        keepalive.abort();
        drop(dispatcher);
        drop(raw);
        writer_task.abort();

        result
    }

    fn install_handlers(&self, dispatcher: &mut Dispatcher, raw: &RawSender) -> Result<()> {
        // Server pings must be answered for the lifetime of the session.
        let pong = raw.clone();
        dispatcher.register(r"(?i)^PING :(.+)$", move |groups: &[String]| {
            pong.send(format!("PONG :{}", groups[1]));
        })?;

        // 001 means registration is complete: join and announce.
        let join = raw.clone();
        let channels = self.config.channels.clone();
        let announce = self.announce.clone();
        dispatcher.register_once(r"(?i)^\S+ 001 .+$", move |_: &[String]| {
            for channel in &channels {
                join.send(format!("JOIN {channel}"));
                if let Some(announce) = &announce {
                    join.send(format!("PRIVMSG {channel} :{announce}"));
                }
            }
        })?;

        // Channel traffic goes to the bridge as (nick, text).
        let forward = self.privmsg_tx.clone();
        dispatcher.register(
            r"(?i)^:([^!\s]+)!\S+@\S+ PRIVMSG \S+ :(.+)$",
            move |groups: &[String]| {
                let _ = forward.send(Privmsg {
                    nick: groups[1].clone(),
                    text: groups[2].clone(),
                });
            },
        )?;

        Ok(())
    }
}

/// Read newline-delimited records and feed them to the dispatcher.
async fn read_loop<R>(reader: BufReader<R>, dispatcher: &mut Dispatcher) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        debug!("IRC <- {}", line);
        dispatcher.feed(line);
    }
    Err(RelayChatError::Transport(
        "IRC server closed the connection".to_string(),
    ))
}

/// Drain queued lines onto the socket, appending the line terminator.
async fn write_lines<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<String>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        debug!("IRC -> {}", line);
        if writer
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .is_err()
        {
            break;
        }
    }
}

/// Periodic idle ping so the server keeps the connection alive.
async fn keepalive_loop(raw: RawSender, interval: Duration) {
    if interval.is_zero() {
        return;
    }
    loop {
        tokio::time::sleep(interval).await;
        raw.send("PING :keepalive");
    }
}

fn default_tls_config() -> rustls::ClientConfig {
    let root_store = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth()
}

/// TLS config that skips certificate verification, for IRC servers
/// running self-signed certs.
fn insecure_tls_config() -> rustls::ClientConfig {
    rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(InsecureVerifier))
        .with_no_client_auth()
}

#[derive(Debug)]
struct InsecureVerifier;

impl rustls::client::danger::ServerCertVerifier for InsecureVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::aws_lc_rs::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
