//! Pluggable dial/write-open callbaks (§6): turn a DCC SEND offer into a
//! readable byte stream and a writable sink. Default implementations dial a
//! real TCP socket and open a sanitized path under the download directory.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, ip: Ipv4Addr, port: u16) -> std::io::Result<Box<dyn AsyncRead + Unpin + Send>>;
}

#[async_trait]
pub trait WriteOpener: Send + Sync {
    async fn open(&self, file_name: &str) -> std::io::Result<Box<dyn AsyncWrite + Unpin + Send>>;
}

/// Dials the offered endpoint over plain TCP.
pub struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, ip: Ipv4Addr, port: u16) -> std::io::Result<Box<dyn AsyncRead + Unpin + Send>> {
        let stream = TcpStream::connect((ip, port)).await?;
        Ok(Box::new(stream))
    }
}

/// Opens a sanitized file path under a fixed download directory.
pub struct FileWriteOpener {
    download_dir: PathBuf,
}

impl FileWriteOpener {
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
        }
    }
}

#[async_trait]
impl WriteOpener for FileWriteOpener {
    async fn open(&self, file_name: &str) -> std::io::Result<Box<dyn AsyncWrite + Unpin + Send>> {
        fs::create_dir_all(&self.download_dir).await?;
        let path = self.download_dir.join(sanitize_file_name(file_name));
        let file = File::create(path).await?;
        Ok(Box::new(file))
    }
}

/// Replaces filesystem-unsafe characters so a received file name can't
/// escape the download directory or collide with reserved path characters.
fn sanitize_file_name(file_name: &str) -> String {
    file_name.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_")
}
