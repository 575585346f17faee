//! XDCC engine: joins a bot's channels, requests a file, and streams any
//! matching DCC SEND offer into a tracked download (§4.3).

mod counter;
mod dial;
mod downloads;
mod engine;
mod speed;

pub use counter::{ByteCounter, CountingReader};
pub use dial::{Dialer, FileWriteOpener, TcpDialer, WriteOpener};
pub use downloads::{DownloadRecord, DownloadSnapshot, DownloadStatus, DownloadsTable};
pub use engine::XdccEngine;

use std::fmt;

/// Errors surfaced by the XDCC engine (§7). Per-download failures are
/// captured as `DownloadStatus::Failed`, not propagated as `XdccError` —
/// this type exists for engine-fatal conditions raised outside a transfer.
#[derive(Debug)]
pub enum XdccError {
    DialFailure(std::io::Error),
    SinkOpenFailure(std::io::Error),
    CopyFailure(std::io::Error),
}

impl fmt::Display for XdccError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XdccError::DialFailure(e) => write!(f, "dcc dial failed: {e}"),
            XdccError::SinkOpenFailure(e) => write!(f, "dcc sink open failed: {e}"),
            XdccError::CopyFailure(e) => write!(f, "dcc transfer failed: {e}"),
        }
    }
}

impl std::error::Error for XdccError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            XdccError::DialFailure(e) | XdccError::SinkOpenFailure(e) | XdccError::CopyFailure(e) => Some(e),
        }
    }
}
