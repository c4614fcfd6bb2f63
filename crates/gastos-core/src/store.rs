//! Receipt store and extraction queue
//!
//! `ReceiptStore` owns the canonical receipt list (newest first) and is the
//! only place receipts are mutated. It:
//!
//! - publishes every new list through a watch channel ([`ReceiptStore::subscribe`])
//! - runs at most one extraction at a time, always the first ready receipt in
//!   list order
//! - mirrors changes to the spreadsheet bridge when one is configured, or to
//!   the local snapshot when not
//!
//! Nothing below the store escapes as an error. Remote failures end up as sync
//! flags (`is_synced`, `syncing`) and extraction failures as an `error` status.
//!
//! Background work (placeholder saves, extractions) runs as tracked tokio
//! tasks; [`ReceiptStore::wait_idle`] waits for all of it. Remote writes for a
//! receipt go through a per-receipt lane so they reach the bridge in the order
//! they were issued. The store must be used from within a Tokio runtime.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::join_all;
use futures::FutureExt;
use tokio::sync::{watch, Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bridge::{MigrateReport, RemoteBridge};
use crate::error::Error;
use crate::extraction::ExtractionGateway;
use crate::models::{
    Receipt, ReceiptId, ReceiptRecord, ReceiptState, ReceiptStatus, DUPLICATE_MESSAGE,
    INTERRUPTED_MESSAGE,
};
use crate::snapshot::LocalSnapshot;

/// Error message for a receipt whose extractor panicked
pub const EXTRACTOR_CRASHED: &str = "extractor crashed while reading the receipt";

/// Immutable view of the receipt list
pub type ReceiptList = Arc<Vec<Receipt>>;

#[derive(Debug, Default)]
struct StoreState {
    receipts: Vec<Receipt>,
    /// An extraction is in flight
    processing: bool,
    /// `initial_load` is running
    loading: bool,
}

struct Inner {
    state: Mutex<StoreState>,
    bridge: Arc<RemoteBridge>,
    gateway: Arc<dyn ExtractionGateway>,
    snapshot: LocalSnapshot,
    snapshot_write: Mutex<()>,
    publisher: watch::Sender<ReceiptList>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    lanes: Mutex<HashMap<ReceiptId, Arc<AsyncMutex<()>>>>,
}

/// Result of a bulk sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncSummary {
    pub attempted: usize,
    pub succeeded: usize,
}

enum PhotoOutcome {
    Gone,
    Duplicate,
    Queued(ReceiptRecord),
}

/// Clears the in-flight flag however the extraction ends
struct ProcessingGuard {
    inner: Arc<Inner>,
}

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        lock(&self.inner.state).processing = false;
    }
}

#[derive(Clone)]
pub struct ReceiptStore {
    inner: Arc<Inner>,
}

impl ReceiptStore {
    pub fn new(
        bridge: Arc<RemoteBridge>,
        gateway: Arc<dyn ExtractionGateway>,
        snapshot: LocalSnapshot,
    ) -> Self {
        let (publisher, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(StoreState::default()),
                bridge,
                gateway,
                snapshot,
                snapshot_write: Mutex::new(()),
                publisher,
                tasks: Mutex::new(Vec::new()),
                lanes: Mutex::new(HashMap::new()),
            }),
        }
    }

    // ========== Read access ==========

    /// Current list, newest first
    pub fn receipts(&self) -> ReceiptList {
        self.inner.publisher.borrow().clone()
    }

    pub fn get(&self, id: &str) -> Option<Receipt> {
        self.receipts().iter().find(|r| r.id == id).cloned()
    }

    /// Receive every published list
    pub fn subscribe(&self) -> watch::Receiver<ReceiptList> {
        self.inner.publisher.subscribe()
    }

    pub fn is_processing(&self) -> bool {
        lock(&self.inner.state).processing
    }

    pub fn is_loading(&self) -> bool {
        lock(&self.inner.state).loading
    }

    pub fn is_remote_configured(&self) -> bool {
        self.inner.bridge.is_configured()
    }

    pub fn bridge(&self) -> &RemoteBridge {
        &self.inner.bridge
    }

    /// Read and clear the bridge's connection-error flag
    pub fn connection_error(&self) -> bool {
        self.inner.bridge.take_connection_error()
    }

    // ========== Loading ==========

    /// Replace the list with the remote copy (or the local snapshot when no
    /// bridge is configured). A failed remote fetch keeps the current list.
    pub async fn initial_load(&self) {
        lock(&self.inner.state).loading = true;

        let loaded = if self.inner.bridge.is_configured() {
            match self.inner.bridge.try_list().await {
                Ok(records) => {
                    let receipts: Vec<Receipt> = records
                        .into_iter()
                        .map(|record| {
                            let mut receipt = Receipt::from_record(record);
                            if receipt.status() == ReceiptStatus::Processing {
                                debug!(id = %receipt.id, "Recasting interrupted receipt");
                                receipt.fail(INTERRUPTED_MESSAGE);
                            }
                            receipt.is_synced = true;
                            receipt
                        })
                        .collect();
                    info!(count = receipts.len(), "Loaded receipts from spreadsheet");
                    Some(receipts)
                }
                Err(e) => {
                    warn!("Failed to load receipts from spreadsheet: {}", e);
                    None
                }
            }
        } else {
            let receipts = self.inner.snapshot.load();
            info!(
                count = receipts.len(),
                location = %self.inner.snapshot.location(),
                "Loaded receipts from local snapshot"
            );
            Some(receipts)
        };

        self.mutate(|state| {
            if let Some(receipts) = loaded {
                state.receipts = merge_owned(&state.receipts, receipts);
            }
            state.loading = false;
        });
    }

    // ========== Adding ==========

    /// Queue a receipt URL. Returns the new id, or `None` when the URL is
    /// blank or already tracked.
    pub async fn add_receipt(&self, url: &str) -> Option<ReceiptId> {
        let url = url.trim();
        if url.is_empty() {
            return None;
        }

        let placeholder = Receipt::new_processing(Some(url.to_string()));
        let id = placeholder.id.clone();
        // Hold the lane before the queue can see the receipt so the
        // placeholder save always lands before the extraction result
        let turn = self.lane(&id).lock_owned().await;

        let record = self.mutate(|state| {
            if state.receipts.iter().any(|r| r.has_url(url)) {
                return None;
            }
            let record = placeholder.to_record();
            state.receipts.insert(0, placeholder);
            Some(record)
        });

        let Some(record) = record else {
            debug!(url = %url, "Ignoring duplicate receipt URL");
            drop(turn);
            lock(&self.inner.lanes).remove(&id);
            return None;
        };
        info!(id = %id, "Receipt queued");

        if self.inner.bridge.is_configured() {
            self.persist_in_background(turn, record);
        }
        Some(id)
    }

    /// Queue a receipt from a photo. The placeholder is visible right away;
    /// it either gets the decoded URL or ends in `error`.
    pub async fn add_receipt_from_photo(&self, photo: &[u8]) -> ReceiptId {
        let placeholder = Receipt::new_processing(None);
        let id = placeholder.id.clone();
        self.mutate(|state| state.receipts.insert(0, placeholder));

        let decoded = self
            .inner
            .gateway
            .image_to_url(photo)
            .await
            .and_then(|url| {
                let url = url.trim().to_string();
                if url.is_empty() {
                    Err(Error::Extraction("No receipt URL found in photo".into()))
                } else {
                    Ok(url)
                }
            });

        let url = match decoded {
            Ok(url) => url,
            Err(e) => {
                warn!(id = %id, "Could not read receipt photo: {}", e);
                self.mutate(|state| {
                    if let Some(r) = find_mut(&mut state.receipts, &id) {
                        r.fail(failure_message(&e));
                    }
                });
                return id;
            }
        };

        let turn = self.lane(&id).lock_owned().await;
        let outcome = self.mutate(|state| {
            let duplicate = state.receipts.iter().any(|r| r.id != id && r.has_url(&url));
            let Some(receipt) = find_mut(&mut state.receipts, &id) else {
                return PhotoOutcome::Gone;
            };
            if duplicate {
                receipt.fail(DUPLICATE_MESSAGE);
                return PhotoOutcome::Duplicate;
            }
            receipt.url = Some(url.clone());
            PhotoOutcome::Queued(receipt.to_record())
        });

        match outcome {
            PhotoOutcome::Gone => debug!(id = %id, "Photo placeholder deleted before decode finished"),
            PhotoOutcome::Duplicate => info!(id = %id, url = %url, "Photo receipt already scanned"),
            PhotoOutcome::Queued(record) => {
                info!(id = %id, "Photo receipt queued");
                if self.inner.bridge.is_configured() {
                    self.persist_in_background(turn, record);
                }
            }
        }
        id
    }

    // ========== Extraction queue ==========

    /// Start the next extraction unless one is already running
    fn pump(&self) {
        let job = {
            let mut state = lock(&self.inner.state);
            if state.processing {
                return;
            }
            let Some(job) = state
                .receipts
                .iter()
                .find(|r| r.is_ready_for_extraction())
                .and_then(|r| r.url().map(|url| (r.id.clone(), url.to_string())))
            else {
                return;
            };
            state.processing = true;
            job
        };

        if tokio::runtime::Handle::try_current().is_err() {
            warn!("No async runtime; extraction queue stalled");
            lock(&self.inner.state).processing = false;
            return;
        }

        let store = self.clone();
        let (id, url) = job;
        self.spawn(async move { store.run_extraction(id, url).await });
    }

    async fn run_extraction(&self, id: ReceiptId, url: String) {
        let guard = ProcessingGuard {
            inner: self.inner.clone(),
        };
        info!(id = %id, extractor = self.inner.gateway.name(), "Extracting receipt");

        let outcome = AssertUnwindSafe(self.inner.gateway.url_to_fields(&url))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                error!(id = %id, "Extractor panicked");
                Err(Error::Extraction(EXTRACTOR_CRASHED.into()))
            });

        let record = self.mutate(|state| {
            let receipt = find_mut(&mut state.receipts, &id)?;
            // Deleted, replaced by a reload, or edited while we waited
            if receipt.status() != ReceiptStatus::Processing || !receipt.has_url(&url) {
                return None;
            }
            match &outcome {
                Ok(fields) => receipt.complete(fields.clone()),
                Err(e) => receipt.fail(failure_message(e)),
            }
            receipt.is_synced = false;
            if self.inner.bridge.is_configured() {
                receipt.syncing = true;
            }
            Some(receipt.to_record())
        });

        match (&outcome, &record) {
            (_, None) => debug!(id = %id, "Extraction result dropped"),
            (Ok(_), Some(_)) => info!(id = %id, "Receipt extracted"),
            (Err(e), Some(_)) => warn!(id = %id, "Extraction failed: {}", e),
        }

        if let Some(record) = record {
            if self.inner.bridge.is_configured() {
                let saved = self.save_remote(&record).await;
                self.mutate(|state| {
                    if let Some(r) = find_mut(&mut state.receipts, &id) {
                        r.syncing = false;
                        if saved
                            && r.status() == ReceiptStatus::Completed
                            && r.to_record() == record
                        {
                            r.is_synced = true;
                        }
                    }
                });
            }
        }

        drop(guard);
        self.pump();
    }

    // ========== Sync ==========

    /// Push one completed, unsynced receipt to the spreadsheet. Returns whether
    /// the receipt is synced afterwards.
    pub async fn retry_sync(&self, id: &str) -> bool {
        if !self.inner.bridge.is_configured() {
            return false;
        }

        let record = self.mutate(|state| {
            let receipt = find_mut(&mut state.receipts, id)?;
            if receipt.status() != ReceiptStatus::Completed || receipt.is_synced || receipt.syncing
            {
                return None;
            }
            receipt.syncing = true;
            Some(receipt.to_record())
        });
        let Some(record) = record else {
            return false;
        };

        let saved = self.save_remote(&record).await;
        self.mutate(|state| {
            let Some(receipt) = find_mut(&mut state.receipts, id) else {
                return false;
            };
            receipt.syncing = false;
            if saved && receipt.to_record() == record {
                receipt.is_synced = true;
            }
            receipt.is_synced
        })
    }

    /// Save every unsynced receipt concurrently, then reload from the
    /// spreadsheet so it becomes the source of truth.
    pub async fn sync_local_data_to_sheets(&self) -> SyncSummary {
        let records = self.mutate(|state| {
            state
                .receipts
                .iter_mut()
                .filter(|r| !r.is_synced && !r.syncing && r.status() != ReceiptStatus::Processing)
                .map(|r| {
                    r.syncing = true;
                    r.to_record()
                })
                .collect::<Vec<_>>()
        });

        info!(count = records.len(), "Syncing local receipts to spreadsheet");
        let results = join_all(records.iter().map(|record| async move {
            (record.id.clone(), self.save_remote(record).await)
        }))
        .await;

        let summary = SyncSummary {
            attempted: results.len(),
            succeeded: results.iter().filter(|(_, ok)| *ok).count(),
        };

        self.mutate(|state| {
            for (id, saved) in &results {
                if let Some(receipt) = find_mut(&mut state.receipts, id) {
                    receipt.syncing = false;
                    if *saved {
                        receipt.is_synced = true;
                    }
                }
            }
        });

        if summary.succeeded < summary.attempted {
            warn!(
                failed = summary.attempted - summary.succeeded,
                "Some receipts failed to sync"
            );
        }

        self.initial_load().await;
        summary
    }

    // ========== Editing ==========

    /// Replace a receipt by id and push it. Returns false for unknown ids.
    pub async fn update_receipt(&self, receipt: Receipt) -> bool {
        let id = receipt.id.clone();
        let replaced = self.mutate(|state| {
            let Some(existing) = find_mut(&mut state.receipts, &id) else {
                return false;
            };
            let syncing = existing.syncing;
            *existing = receipt;
            existing.is_synced = false;
            existing.syncing = syncing;
            true
        });

        if replaced && self.inner.bridge.is_configured() {
            self.retry_sync(&id).await;
        }
        replaced
    }

    /// Save a receipt as it stands, whatever its status. `retry_sync` only
    /// pushes completed receipts; this is for edits to errored ones too.
    /// Returns whether the spreadsheet confirmed the save.
    pub async fn push_receipt(&self, id: &str) -> bool {
        if !self.inner.bridge.is_configured() {
            return false;
        }
        let Some(record) = self.get(id).map(|r| r.to_record()) else {
            return false;
        };

        let saved = self.save_remote(&record).await;
        if saved {
            self.mutate(|state| {
                if let Some(receipt) = find_mut(&mut state.receipts, id) {
                    if receipt.to_record() == record {
                        receipt.is_synced = true;
                    }
                }
            });
        } else {
            warn!(id = %id, "Could not push receipt to spreadsheet");
        }
        saved
    }

    /// Rewrite the address of every receipt from the store with this CNPJ.
    /// Returns how many receipts changed.
    pub async fn update_store_address(&self, cnpj: &str, new_address: &str) -> usize {
        let cnpj = cnpj.trim();
        let ids = self.mutate(|state| {
            let mut ids = Vec::new();
            for receipt in state.receipts.iter_mut() {
                let Some(details) = receipt.details_mut() else {
                    continue;
                };
                if details.store_cnpj.trim() == cnpj {
                    details.store_address = new_address.to_string();
                    receipt.is_synced = false;
                    ids.push(receipt.id.clone());
                }
            }
            ids
        });

        info!(cnpj = %cnpj, count = ids.len(), "Store address updated");
        if self.inner.bridge.is_configured() {
            join_all(ids.iter().map(|id| self.retry_sync(id))).await;
        }
        ids.len()
    }

    /// Send a receipt back through extraction. Receipts without a URL or
    /// already processing are left alone.
    pub async fn reprocess_receipt(&self, id: &str) -> bool {
        let Some(current) = self.get(id) else {
            return false;
        };
        if current.status() == ReceiptStatus::Processing || current.url().is_none() {
            return false;
        }

        let mut transitional = current.clone();
        transitional.state = ReceiptState::Processing;
        transitional.is_synced = false;
        transitional.syncing = false;

        if self.inner.bridge.is_configured() && !self.save_remote(&transitional.to_record()).await
        {
            warn!(id = %id, "Could not persist reprocess state; continuing locally");
        }

        let reset = self.mutate(|state| {
            let Some(receipt) = find_mut(&mut state.receipts, id) else {
                return false;
            };
            if receipt.status() == ReceiptStatus::Processing {
                return false;
            }
            receipt.state = ReceiptState::Processing;
            receipt.is_synced = false;
            true
        });
        if reset {
            info!(id = %id, "Receipt requeued");
        }
        reset
    }

    /// Local-only URL change; does not trigger extraction or a remote save
    pub fn update_receipt_url(&self, id: &str, new_url: &str) -> bool {
        self.mutate(|state| match find_mut(&mut state.receipts, id) {
            Some(receipt) => {
                receipt.url = Some(new_url.trim().to_string()).filter(|u| !u.is_empty());
                true
            }
            None => false,
        })
    }

    /// Remove a receipt locally, then from the spreadsheet. Unknown ids are a
    /// no-op. Remote failures are logged and not rolled back.
    pub async fn delete_receipt(&self, id: &str) -> bool {
        let removed = self.mutate(|state| {
            let before = state.receipts.len();
            state.receipts.retain(|r| r.id != id);
            state.receipts.len() != before
        });
        if !removed {
            return false;
        }
        info!(id = %id, "Receipt deleted");

        if self.inner.bridge.is_configured() {
            let lane = self.lane(id);
            let _turn = lane.lock().await;
            if self.inner.bridge.delete_receipt(id).await.is_none() {
                warn!(id = %id, "Remote delete failed; receipt removed locally only");
            }
        }
        lock(&self.inner.lanes).remove(id);
        true
    }

    /// Ask the spreadsheet to rebuild item rows from embedded item lists
    pub async fn migrate(&self) -> Option<MigrateReport> {
        self.inner.bridge.migrate().await
    }

    /// Wait for background saves and for the extraction queue to go quiet
    pub async fn wait_idle(&self) {
        loop {
            let handles = std::mem::take(&mut *lock(&self.inner.tasks));
            if handles.is_empty() {
                if !self.is_processing() {
                    return;
                }
                tokio::task::yield_now().await;
                continue;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!("Background task failed: {}", e);
                }
            }
        }
    }

    // ========== Internals ==========

    /// Apply `f` to the state, publish the new list, mirror it to the local
    /// snapshot when running without a bridge, and wake the queue.
    fn mutate<R>(&self, f: impl FnOnce(&mut StoreState) -> R) -> R {
        let (result, write_local) = {
            let mut state = lock(&self.inner.state);
            let result = f(&mut state);
            self.inner
                .publisher
                .send_replace(Arc::new(state.receipts.clone()));
            (result, !state.loading && !self.inner.bridge.is_configured())
        };
        if write_local {
            self.write_snapshot();
        }
        self.pump();
        result
    }

    fn write_snapshot(&self) {
        let _writer = lock(&self.inner.snapshot_write);
        let receipts = self.receipts();
        if let Err(e) = self.inner.snapshot.save(&receipts) {
            warn!("Failed to write local snapshot: {}", e);
        }
    }

    fn spawn(&self, task: impl Future<Output = ()> + Send + 'static) {
        let handle = tokio::spawn(task);
        let mut tasks = lock(&self.inner.tasks);
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }

    fn lane(&self, id: &str) -> Arc<AsyncMutex<()>> {
        lock(&self.inner.lanes)
            .entry(id.to_string())
            .or_default()
            .clone()
    }

    async fn save_remote(&self, record: &ReceiptRecord) -> bool {
        let lane = self.lane(&record.id);
        let _turn = lane.lock().await;
        self.inner.bridge.save_receipt(record).await.is_some()
    }

    /// Fire-and-forget save. `turn` is the receipt's lane, already held, so
    /// any later write for the same receipt lands after this one.
    fn persist_in_background(&self, turn: OwnedMutexGuard<()>, record: ReceiptRecord) {
        let bridge = self.inner.bridge.clone();
        self.spawn(async move {
            let _turn = turn;
            if bridge.save_receipt(&record).await.is_none() {
                warn!(id = %record.id, "Placeholder save failed");
            }
        });
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn find_mut<'a>(receipts: &'a mut [Receipt], id: &str) -> Option<&'a mut Receipt> {
    receipts.iter_mut().find(|r| r.id == id)
}

/// Receipts still processing in this session belong to the queue, not to the
/// reloaded list. Their local copy replaces the remote row (which may be a
/// stale placeholder recast as interrupted) or is kept if the row is missing.
fn merge_owned(current: &[Receipt], mut loaded: Vec<Receipt>) -> Vec<Receipt> {
    let owned = current
        .iter()
        .filter(|r| r.status() == ReceiptStatus::Processing);
    let mut missing = Vec::new();
    for local in owned {
        match loaded.iter_mut().find(|r| r.id == local.id) {
            Some(slot) => *slot = local.clone(),
            None => missing.push(local.clone()),
        }
    }
    if !missing.is_empty() {
        missing.extend(loaded);
        loaded = missing;
    }
    loaded
}

fn failure_message(err: &Error) -> String {
    match err {
        Error::Extraction(message) => message.clone(),
        other => other.to_string(),
    }
}
