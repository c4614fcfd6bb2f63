//! Local snapshot persistence
//!
//! When no spreadsheet bridge is configured, the receipt list lives in a single
//! JSON document under a fixed key. Receipts still being processed are never
//! written: an extraction cannot survive a restart.
//!
//! - `SnapshotSlot` trait: a place that holds one document
//! - `FileSlot`: `<data_dir>/receipts.json`, replaced atomically
//! - `MemorySlot`: for tests

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::{Receipt, ReceiptRecord, ReceiptStatus, INTERRUPTED_MESSAGE};

/// Fixed key of the snapshot document
pub const SNAPSHOT_KEY: &str = "receipts.json";

/// Storage for one serialized snapshot
pub trait SnapshotSlot: Send + Sync {
    /// Human-readable location (for logs)
    fn location(&self) -> String;

    /// Current contents, `None` if nothing was ever written
    fn read(&self) -> Result<Option<String>>;

    /// Replace the contents
    fn write(&self, contents: &str) -> Result<()>;
}

/// Snapshot file in a data directory
pub struct FileSlot {
    dir: PathBuf,
}

impl FileSlot {
    /// Creates the directory if it doesn't exist.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_KEY)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl SnapshotSlot for FileSlot {
    fn location(&self) -> String {
        self.path().display().to_string()
    }

    fn read(&self) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path()) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, contents: &str) -> Result<()> {
        // Write next to the target so the rename stays on one filesystem
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        std::io::Write::write_all(&mut tmp, contents.as_bytes())?;
        tmp.persist(self.path()).map_err(|e| e.error)?;
        Ok(())
    }
}

/// In-memory slot
#[derive(Default)]
pub struct MemorySlot {
    contents: Mutex<Option<String>>,
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(contents: impl Into<String>) -> Self {
        Self {
            contents: Mutex::new(Some(contents.into())),
        }
    }
}

impl SnapshotSlot for MemorySlot {
    fn location(&self) -> String {
        "memory".to_string()
    }

    fn read(&self) -> Result<Option<String>> {
        Ok(self.contents.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn write(&self, contents: &str) -> Result<()> {
        *self.contents.lock().unwrap_or_else(|e| e.into_inner()) = Some(contents.to_string());
        Ok(())
    }
}

/// Reads and writes the receipt list through a [`SnapshotSlot`]
#[derive(Clone)]
pub struct LocalSnapshot {
    slot: Arc<dyn SnapshotSlot>,
}

impl LocalSnapshot {
    pub fn new(slot: Arc<dyn SnapshotSlot>) -> Self {
        Self { slot }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySlot::new()))
    }

    pub fn location(&self) -> String {
        self.slot.location()
    }

    /// Load the stored receipts. Missing or unreadable snapshots yield an
    /// empty list. Every receipt comes back unsynced.
    pub fn load(&self) -> Vec<Receipt> {
        let contents = match self.slot.read() {
            Ok(Some(contents)) => contents,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(location = %self.location(), "Failed to read snapshot: {}", e);
                return Vec::new();
            }
        };

        let records: Vec<ReceiptRecord> = match serde_json::from_str(&contents) {
            Ok(records) => records,
            Err(e) => {
                warn!(location = %self.location(), "Discarding unreadable snapshot: {}", e);
                return Vec::new();
            }
        };

        records
            .into_iter()
            .map(|record| {
                let mut receipt = Receipt::from_record(record);
                if receipt.status() == ReceiptStatus::Processing {
                    receipt.fail(INTERRUPTED_MESSAGE);
                }
                receipt
            })
            .collect()
    }

    /// Write every receipt that is not processing
    pub fn save(&self, receipts: &[Receipt]) -> Result<()> {
        let records: Vec<ReceiptRecord> = receipts
            .iter()
            .filter(|r| r.status() != ReceiptStatus::Processing)
            .map(Receipt::to_record)
            .collect();
        let contents = serde_json::to_string(&records)?;
        self.slot.write(&contents)?;
        debug!(count = records.len(), location = %self.location(), "Snapshot written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExtractedFields;

    fn completed(url: &str) -> Receipt {
        let mut r = Receipt::new_processing(Some(url.into()));
        r.complete(ExtractedFields {
            store_name: Some("Loja A".into()),
            total_amount: Some(10.5),
            ..Default::default()
        });
        r.is_synced = true;
        r
    }

    #[test]
    fn test_save_skips_processing_and_load_clears_sync() {
        let snapshot = LocalSnapshot::in_memory();
        let receipts = vec![
            Receipt::new_processing(Some("http://x/2".into())),
            completed("http://x/1"),
        ];
        snapshot.save(&receipts).unwrap();

        let loaded = snapshot.load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, receipts[1].id);
        assert!(!loaded[0].is_synced);
        assert_eq!(loaded[0].details().unwrap().store_name, "Loja A");
    }

    #[test]
    fn test_load_corrupt_snapshot_is_empty() {
        let snapshot = LocalSnapshot::new(Arc::new(MemorySlot::with_contents("{not json")));
        assert!(snapshot.load().is_empty());
    }

    #[test]
    fn test_load_recasts_stray_processing_records() {
        let contents = r#"[{"id":"a","url":"http://x/1","status":"processing"}]"#;
        let snapshot = LocalSnapshot::new(Arc::new(MemorySlot::with_contents(contents)));
        let loaded = snapshot.load();
        assert_eq!(loaded[0].error_message(), Some(INTERRUPTED_MESSAGE));
    }

    #[test]
    fn test_file_slot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let slot = FileSlot::new(dir.path().join("data")).unwrap();
        assert!(slot.read().unwrap().is_none());

        let snapshot = LocalSnapshot::new(Arc::new(slot));
        snapshot.save(&[completed("http://x/1")]).unwrap();
        snapshot.save(&[completed("http://x/2"), completed("http://x/3")]).unwrap();

        assert!(dir.path().join("data").join(SNAPSHOT_KEY).exists());
        assert_eq!(snapshot.load().len(), 2);
    }
}
