//! The XDCC engine (§4.3): turns `RequestFile` calls into joined channels
//! and an outgoing `XDCC SEND`, and turns inbound DCC SEND offers into
//! streamed transfers tracked in the downloads table.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::irc::{IrcEngine, Packet};

use super::counter::{ByteCounter, CountingReader};
use super::dial::{Dialer, WriteOpener};
use super::downloads::DownloadsTable;
use super::speed::SpeedMeter;
use super::XdccError;

const JOIN_TIMEOUT: Duration = Duration::from_millis(2000);
const WHOIS_TIMEOUT: Duration = Duration::from_millis(2000);

pub struct XdccEngine {
    irc: RwLock<Arc<IrcEngine>>,
    dialer: Box<dyn Dialer>,
    write_opener: Box<dyn WriteOpener>,
    unsafe_mode: bool,
    downloads: Arc<DownloadsTable>,
    cancel: RwLock<CancellationToken>,
}

impl XdccEngine {
    /// Starts the engine over `irc` (§4.3.1): stores its collaborators,
    /// initializes an empty downloads table, and spawns the offer intake.
    pub fn start(
        irc: Arc<IrcEngine>,
        dialer: Box<dyn Dialer>,
        write_opener: Box<dyn WriteOpener>,
        unsafe_mode: bool,
    ) -> Arc<Self> {
        let cancel = irc.cancellation_token().child_token();
        let engine = Arc::new(Self {
            irc: RwLock::new(irc),
            dialer,
            write_opener,
            unsafe_mode,
            downloads: Arc::new(DownloadsTable::new()),
            cancel: RwLock::new(cancel),
        });

        tokio::spawn(Self::spawn_intake(engine.clone()));
        engine
    }

    async fn spawn_intake(self: Arc<Self>) {
        let irc = self.irc.read().await.clone();
        let Some(mut packets) = irc.take_packets().await else {
            warn!("irc packet receiver already taken, offer intake not started");
            return;
        };
        let cancel = self.cancel.read().await.clone();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = packets.recv() => {
                    match received {
                        Some(Packet::DccSend(offer)) => {
                            let engine = self.clone();
                            tokio::spawn(async move {
                                engine.handle_dcc_send(offer).await;
                            });
                        }
                        Some(_) => {}
                        None => break,
                    }
                }
            }
        }
    }

    pub fn downloads(&self) -> Arc<DownloadsTable> {
        self.downloads.clone()
    }

    /// RequestFile (§4.3.2). Joins the bot's channels, fires the request,
    /// and records a WAITING entry.
    pub async fn request_file(&self, bot_nick: &str, package_no: u32, file_name: &str) {
        self.join_bot_channels(bot_nick).await;

        let irc = self.irc.read().await.clone();
        irc.send_message(bot_nick, &format!("XDCC SEND {package_no}"))
            .await;

        self.downloads
            .insert_waiting(file_name, bot_nick.to_string(), package_no)
            .await;
    }

    async fn join_bot_channels(&self, bot_nick: &str) {
        let irc = self.irc.read().await.clone();

        let channels = tokio::select! {
            channels = irc.channels_of_user(bot_nick) => channels,
            _ = tokio::time::sleep(WHOIS_TIMEOUT) => Vec::new(),
        };

        let joins = channels.into_iter().map(|channel| {
            let irc = irc.clone();
            async move {
                tokio::select! {
                    joined = irc.join(&channel) => joined,
                    _ = tokio::time::sleep(JOIN_TIMEOUT) => false,
                }
            }
        });
        futures::future::join_all(joins).await;
    }

    /// Handle DCC SEND offer (§4.3.4).
    async fn handle_dcc_send(&self, offer: crate::irc::DccOffer) {
        let file_name = offer.file_name.clone();

        if !self.downloads.exists(&file_name).await {
            if !self.unsafe_mode {
                return;
            }
            self.downloads
                .insert_waiting(&file_name, String::new(), 0)
                .await;
        }

        match self.downloads.status(&file_name).await {
            Some(super::downloads::DownloadStatus::Waiting) => {}
            _ => return,
        }

        let reader = match self.dialer.dial(offer.ip, offer.port).await {
            Ok(reader) => reader,
            Err(err) => {
                let err = XdccError::DialFailure(err);
                warn!(file = %file_name, "{err}");
                self.mark_failed(&file_name).await;
                return;
            }
        };

        let writer = match self.write_opener.open(&file_name).await {
            Ok(writer) => writer,
            Err(err) => {
                let err = XdccError::SinkOpenFailure(err);
                warn!(file = %file_name, "{err}");
                self.mark_failed(&file_name).await;
                return;
            }
        };

        self.downloads
            .with_record_mut(&file_name, |r| {
                r.status = super::downloads::DownloadStatus::Downloading;
                r.size = offer.file_length;
            })
            .await;

        let counter = ByteCounter::new();
        let cancel = self.cancel.read().await.clone();
        let meter = SpeedMeter::start(
            file_name.clone(),
            counter.clone(),
            self.downloads.clone(),
            cancel.clone(),
        );

        let copy_result = Self::copy_exact(reader, writer, offer.file_length, counter, cancel).await;
        meter.stop().await;

        match copy_result {
            Ok(()) => {
                self.downloads
                    .with_record_mut(&file_name, |r| r.status = super::downloads::DownloadStatus::Done)
                    .await;
                info!(file = %file_name, "dcc transfer complete");
            }
            Err(err) => {
                let err = XdccError::CopyFailure(err);
                warn!(file = %file_name, "{err}");
                self.mark_failed(&file_name).await;
            }
        }
    }

    async fn mark_failed(&self, file_name: &str) {
        self.downloads
            .with_record_mut(file_name, |r| r.status = super::downloads::DownloadStatus::Failed)
            .await;
    }

    /// Copies exactly `len` bytes from `reader` to `writer`, tee'd through
    /// `counter`, racing a cancellation watcher that unblocks the copy by
    /// dropping it (step 8/9/10 of §4.3.4; Rust's native future-drop
    /// cancellation stands in for the source's "closer" handle).
    async fn copy_exact(
        reader: Box<dyn AsyncRead + Unpin + Send>,
        mut writer: Box<dyn AsyncWrite + Unpin + Send>,
        len: u64,
        counter: Arc<ByteCounter>,
        cancel: CancellationToken,
    ) -> std::io::Result<()> {
        let mut tee = CountingReader::new(reader, counter);
        let mut limited = tokio::io::AsyncReadExt::take(&mut tee, len);
        let copy = tokio::io::copy(&mut limited, &mut writer);

        tokio::select! {
            result = copy => {
                let copied = result?;
                if copied != len {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        format!("copied {copied} of {len} expected bytes"),
                    ));
                }
            }
            _ = cancel.cancelled() => {
                return Err(std::io::Error::new(std::io::ErrorKind::Interrupted, "engine cancelled"));
            }
        }

        if let Err(err) = writer.flush().await {
            return Err(err);
        }
        Ok(())
    }

    /// Restart (§4.3.6): re-point at a fresh IRC engine, fork a new child
    /// cancellation token, reset every non-DONE entry to WAITING and
    /// re-request it, then re-spawn intake.
    pub async fn restart(self: &Arc<Self>, new_irc: Arc<IrcEngine>) {
        *self.irc.write().await = new_irc.clone();
        *self.cancel.write().await = new_irc.cancellation_token().child_token();

        let pending = self.downloads.non_done_entries().await;
        for (file_name, bot_nick, package_no) in pending {
            self.downloads.reset_to_waiting(&file_name).await;
            self.request_file(&bot_nick, package_no, &file_name).await;
        }

        tokio::spawn(Self::spawn_intake(self.clone()));
    }
}
