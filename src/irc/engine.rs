//! The IRC engine: framing, dispatch, and the four awaitable operations
//! (register, join, channels_of_user, send_message) built on top of the
//! correlation tables.

use std::sync::Arc;
use std::time::Duration;

use rand::distributions::{Distribution, Uniform};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::correlation::CorrelationTable;
use super::packet::{parse, Packet};

const PACKET_CHANNEL_CAPACITY: usize = 256;
const NICK_LEN: usize = 7;
const NICK_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// A duplex IRC session: consumes an already-open byte stream and exposes
/// the registration/join/whois/send family plus a packet stream for the
/// XDCC engine to drain.
pub struct IrcEngine {
    writer: Mutex<Box<dyn AsyncWrite + Unpin + Send>>,
    packets: mpsc::Sender<Packet>,
    packets_rx: Mutex<Option<mpsc::Receiver<Packet>>>,
    current_nick: RwLock<String>,
    welcome: CorrelationTable<()>,
    nick_in_use: CorrelationTable<()>,
    end_of_names: CorrelationTable<()>,
    whois_channels: CorrelationTable<Vec<String>>,
    cancel: CancellationToken,
}

impl IrcEngine {
    /// Spawns the line-scanner/dispatch loop over `stream`, returning the
    /// engine handle. `cancel` is the root cancellation token; cancelling it
    /// (or the peer closing the stream) tears the engine down.
    pub fn start<R, W>(reader: R, writer: W, cancel: CancellationToken) -> Arc<Self>
    where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::start_with_capacity(reader, writer, cancel, PACKET_CHANNEL_CAPACITY)
    }

    /// Like [`start`](Self::start), with an explicit outbound packet-channel
    /// capacity (config's `packet_channel_capacity`) instead of the default.
    pub fn start_with_capacity<R, W>(
        reader: R,
        writer: W,
        cancel: CancellationToken,
        packet_channel_capacity: usize,
    ) -> Arc<Self>
    where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (packets, packets_rx) = mpsc::channel(packet_channel_capacity);
        let engine = Arc::new(Self {
            writer: Mutex::new(Box::new(writer)),
            packets,
            packets_rx: Mutex::new(Some(packets_rx)),
            current_nick: RwLock::new(String::new()),
            welcome: CorrelationTable::new(),
            nick_in_use: CorrelationTable::new(),
            end_of_names: CorrelationTable::new(),
            whois_channels: CorrelationTable::new(),
            cancel,
        });

        tokio::spawn(Self::run(engine.clone(), reader));
        engine
    }

    /// Takes ownership of the dispatched (non-UNKNOWN) packet stream. The
    /// channel is single-consumer and bounded: a slow or absent consumer
    /// applies backpressure all the way back to the line scanner rather than
    /// dropping packets (§4.2 step 3, §5). Returns `None` if already taken.
    pub async fn take_packets(&self) -> Option<mpsc::Receiver<Packet>> {
        self.packets_rx.lock().await.take()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn current_nick(&self) -> String {
        self.current_nick.read().await.clone()
    }

    async fn run<R>(self: Arc<Self>, reader: R)
    where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
    {
        let mut lines = BufReader::new(reader).lines();
        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => break,
                line = lines.next_line() => line,
            };

            match next {
                Ok(Some(line)) => {
                    let line = line.trim_end_matches('\r');
                    self.dispatch(line).await;
                }
                Ok(None) => {
                    debug!("irc stream reached EOF, shutting down engine");
                    break;
                }
                Err(err) => {
                    warn!(error = %err, "irc stream read error, shutting down engine");
                    break;
                }
            }
        }
        self.cancel.cancel();
    }

    async fn dispatch(&self, line: &str) {
        let packet = parse(line);
        trace!(%line, ?packet, "dispatching irc line");

        match &packet {
            Packet::Welcome { nick } => {
                *self.current_nick.write().await = nick.clone();
                self.welcome.fire(nick, ()).await;
            }
            Packet::NicknameInUse { nick } => {
                self.nick_in_use.fire(nick, ()).await;
            }
            Packet::EndOfNames { channel } => {
                self.end_of_names.fire(channel, ()).await;
            }
            Packet::WhoisChannels { nick, channels } => {
                self.whois_channels.fire(nick, channels.clone()).await;
            }
            Packet::Ping { token } => {
                self.send_raw(&format!("PONG :{token}")).await;
                return;
            }
            Packet::Unknown => return,
            Packet::DccSend(_) => {}
        }

        // Blocking send: a full channel (a slow or absent consumer) holds up
        // further line processing rather than silently dropping the packet.
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            res = self.packets.send(packet) => {
                if res.is_err() {
                    debug!("packet receiver dropped, discarding further dispatch");
                }
            }
        }
    }

    async fn send_raw(&self, line: &str) {
        let mut writer = self.writer.lock().await;
        if let Err(err) = writer.write_all(format!("{line}\r\n").as_bytes()).await {
            warn!(error = %err, "irc write failed, cancelling engine");
            self.cancel.cancel();
        }
    }

    /// Generates a random alphabetic nick and registers under it, retrying
    /// on collision until `register` succeeds or `cancel` fires. Each
    /// attempt waits up to `try_timeout` for a reply before retrying.
    pub async fn register(&self, try_timeout: Duration) -> bool {
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }

            let nick = random_nick();
            let welcome_rx = self.welcome.register(&nick).await;
            let in_use_rx = self.nick_in_use.register(&nick).await;

            self.send_raw(&format!("USER {nick} * * {nick}")).await;
            self.send_raw(&format!("NICK {nick}")).await;

            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => Outcome::Cancelled,
                res = welcome_rx => if res.is_ok() { Outcome::Success } else { Outcome::Cancelled },
                res = in_use_rx => if res.is_ok() { Outcome::Retry } else { Outcome::Cancelled },
                _ = tokio::time::sleep(try_timeout) => Outcome::Retry,
            };

            self.welcome.remove(&nick).await;
            self.nick_in_use.remove(&nick).await;

            match outcome {
                Outcome::Success => return true,
                Outcome::Cancelled => return false,
                Outcome::Retry => continue,
            }
        }
    }

    /// Joins `channel_name` (with or without leading `#`). No internal
    /// timeout — the caller races this against its own timeout if desired.
    pub async fn join(&self, channel_name: &str) -> bool {
        let bare = channel_name.trim_start_matches('#');
        let rx = self.end_of_names.register(bare).await;

        self.send_raw(&format!("JOIN #{bare}")).await;

        let result = tokio::select! {
            _ = self.cancel.cancelled() => false,
            res = rx => res.is_ok(),
        };

        self.end_of_names.remove(bare).await;
        result
    }

    /// Returns the channels `nick` is on, or an empty list on cancellation.
    pub async fn channels_of_user(&self, nick: &str) -> Vec<String> {
        let rx = self.whois_channels.register(nick).await;

        self.send_raw(&format!("WHOIS {nick}")).await;

        let result = tokio::select! {
            _ = self.cancel.cancelled() => Vec::new(),
            res = rx => res.unwrap_or_default(),
        };

        self.whois_channels.remove(nick).await;
        result
    }

    pub async fn send_message(&self, nick: &str, body: &str) {
        self.send_raw(&format!("PRIVMSG {nick} :{body}")).await;
    }
}

enum Outcome {
    Success,
    Retry,
    Cancelled,
}

fn random_nick() -> String {
    let dist = Uniform::from(0..NICK_ALPHABET.len());
    let mut rng = rand::thread_rng();
    (0..NICK_LEN)
        .map(|_| NICK_ALPHABET[dist.sample(&mut rng)] as char)
        .collect()
}
