//! The downloads table: the single piece of cross-component shared state in
//! the XDCC engine. All mutation goes through a write lock; snapshots for
//! the HTTP facade take a read lock.

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::RwLock;

/// WAITING < DOWNLOADING < {DONE, FAILED} (invariant I2). Declaration order
/// doubles as the wire representation (0..3) for the HTTP facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "u8")]
pub enum DownloadStatus {
    Waiting,
    Downloading,
    Done,
    Failed,
}

impl From<DownloadStatus> for u8 {
    fn from(status: DownloadStatus) -> Self {
        status as u8
    }
}

#[derive(Debug, Clone)]
pub struct DownloadRecord {
    pub status: DownloadStatus,
    pub bot_nick: String,
    pub package_no: u32,
    pub current_speed: f64,
    pub avg_speed: f64,
    pub downloaded: u64,
    pub size: u64,
}

impl DownloadRecord {
    pub fn waiting(bot_nick: String, package_no: u32) -> Self {
        Self {
            status: DownloadStatus::Waiting,
            bot_nick,
            package_no,
            current_speed: 0.0,
            avg_speed: 0.0,
            downloaded: 0,
            size: 0,
        }
    }
}

/// JSON shape emitted by `GET /downloads`: the record merged with its key.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadSnapshot {
    #[serde(rename = "FileName")]
    pub file_name: String,
    #[serde(rename = "Status")]
    pub status: DownloadStatus,
    #[serde(rename = "CurrentSpeed")]
    pub current_speed: f64,
    #[serde(rename = "AvgSpeed")]
    pub avg_speed: f64,
    #[serde(rename = "Downloaded")]
    pub downloaded: u64,
    #[serde(rename = "Size")]
    pub size: u64,
    #[serde(rename = "BotNick")]
    pub bot_nick: String,
    #[serde(rename = "PackageNo")]
    pub package_no: u32,
}

#[derive(Default)]
pub struct DownloadsTable {
    records: RwLock<HashMap<String, DownloadRecord>>,
}

impl DownloadsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites the record for `file_name` with a fresh
    /// WAITING entry, per RequestFile step 3.
    pub async fn insert_waiting(&self, file_name: &str, bot_nick: String, package_no: u32) {
        self.records
            .write()
            .await
            .insert(file_name.to_string(), DownloadRecord::waiting(bot_nick, package_no));
    }

    /// Runs `f` against the record for `file_name` under the write lock, if
    /// present. Returns `f`'s result, or `None` if there is no such record.
    pub async fn with_record_mut<R>(
        &self,
        file_name: &str,
        f: impl FnOnce(&mut DownloadRecord) -> R,
    ) -> Option<R> {
        let mut records = self.records.write().await;
        records.get_mut(file_name).map(f)
    }

    pub async fn status(&self, file_name: &str) -> Option<DownloadStatus> {
        self.records.read().await.get(file_name).map(|r| r.status)
    }

    pub async fn exists(&self, file_name: &str) -> bool {
        self.records.read().await.contains_key(file_name)
    }

    pub async fn snapshot(&self) -> Vec<DownloadSnapshot> {
        self.records
            .read()
            .await
            .iter()
            .map(|(file_name, r)| DownloadSnapshot {
                file_name: file_name.clone(),
                status: r.status,
                current_speed: r.current_speed,
                avg_speed: r.avg_speed,
                downloaded: r.downloaded,
                size: r.size,
                bot_nick: r.bot_nick.clone(),
                package_no: r.package_no,
            })
            .collect()
    }

    /// Entries whose status is not DONE, for Restart (§4.3.6).
    pub async fn non_done_entries(&self) -> Vec<(String, String, u32)> {
        self.records
            .read()
            .await
            .iter()
            .filter(|(_, r)| r.status != DownloadStatus::Done)
            .map(|(name, r)| (name.clone(), r.bot_nick.clone(), r.package_no))
            .collect()
    }

    pub async fn reset_to_waiting(&self, file_name: &str) {
        if let Some(record) = self.records.write().await.get_mut(file_name) {
            record.status = DownloadStatus::Waiting;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_waiting_creates_record() {
        let table = DownloadsTable::new();
        table.insert_waiting("f.bar", "b0t".to_string(), 42).await;
        assert_eq!(table.status("f.bar").await, Some(DownloadStatus::Waiting));
    }

    #[tokio::test]
    async fn snapshot_merges_key_into_record() {
        let table = DownloadsTable::new();
        table.insert_waiting("f.bar", "b0t".to_string(), 42).await;
        let snap = table.snapshot().await;
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].file_name, "f.bar");
        assert_eq!(snap[0].bot_nick, "b0t");
        assert_eq!(snap[0].package_no, 42);
    }

    #[tokio::test]
    async fn non_done_entries_excludes_done() {
        let table = DownloadsTable::new();
        table.insert_waiting("f1", "b0t".to_string(), 1).await;
        table.insert_waiting("f2", "b0t".to_string(), 2).await;
        table
            .with_record_mut("f2", |r| r.status = DownloadStatus::Done)
            .await;
        let pending = table.non_done_entries().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].0, "f1");
    }

    #[test]
    fn status_ordering_round_trips_to_wire_ints() {
        assert_eq!(u8::from(DownloadStatus::Waiting), 0);
        assert_eq!(u8::from(DownloadStatus::Downloading), 1);
        assert_eq!(u8::from(DownloadStatus::Done), 2);
        assert_eq!(u8::from(DownloadStatus::Failed), 3);
    }
}
