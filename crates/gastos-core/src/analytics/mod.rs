//! Analytics over the receipt list
//!
//! Every view is a pure function of the completed receipts:
//!
//! - **Spending** - totals by month, category and payer
//! - **Products** - purchase history and price statistics per product
//! - **Stores** - per-store aggregates and map pins
//! - **Shopping** - cost of a shopping list at each known store
//!
//! Product, category and payer names are grouped by their trimmed
//! lower-cased form. [`AnalyticsProjection`] keeps a [`Dashboard`] current by
//! recomputing it on every list the receipt store publishes.

pub mod products;
pub mod shopping;
pub mod spending;
pub mod stores;

pub use products::{product_history, product_stats, purchase_history, stats_for, ProductPurchase, ProductStats};
pub use shopping::{simulate_shopping_list, StoreQuote};
pub use spending::{category_totals, monthly_totals, payer_totals, CategoryTotal, MonthlyTotal, PayerTotal};
pub use stores::{store_locations, store_summaries, StorePin, StoreSummary};

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::models::{Receipt, ReceiptDetails};
use crate::store::{ReceiptList, ReceiptStore};

/// Parse a purchase date in any of the formats extractors produce
pub fn parse_purchase_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    const DATE_TIMES: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%d/%m/%Y %H:%M:%S",
        "%d/%m/%Y %H:%M",
    ];
    for format in DATE_TIMES {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }
    for format in ["%Y-%m-%d", "%d/%m/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Grouping key for names
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Completed receipts with their details, in list order
pub(crate) fn completed(receipts: &[Receipt]) -> impl Iterator<Item = (&Receipt, &ReceiptDetails)> {
    receipts.iter().filter_map(|r| r.details().map(|d| (r, d)))
}

/// Every list-wide view at once
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub receipt_count: usize,
    pub completed_count: usize,
    pub total_spent: f64,
    pub monthly: Vec<MonthlyTotal>,
    pub categories: Vec<CategoryTotal>,
    pub payers: Vec<PayerTotal>,
    pub products: Vec<ProductStats>,
    pub stores: Vec<StoreSummary>,
}

impl Dashboard {
    pub fn from_receipts(receipts: &[Receipt]) -> Self {
        Self {
            receipt_count: receipts.len(),
            completed_count: completed(receipts).count(),
            total_spent: completed(receipts).map(|(_, d)| d.total_amount).sum(),
            monthly: monthly_totals(receipts),
            categories: category_totals(receipts),
            payers: payer_totals(receipts),
            products: product_stats(receipts),
            stores: store_summaries(receipts),
        }
    }
}

/// Recomputes the dashboard whenever the store publishes a new list
pub struct AnalyticsProjection {
    dashboard: watch::Receiver<Arc<Dashboard>>,
    task: JoinHandle<()>,
}

impl AnalyticsProjection {
    /// Start following `store`. Must be called within a Tokio runtime.
    pub fn spawn(store: &ReceiptStore) -> Self {
        let mut receipts = store.subscribe();
        let initial = Dashboard::from_receipts(&receipts.borrow_and_update());
        let (tx, dashboard) = watch::channel(Arc::new(initial));

        let task = tokio::spawn(async move {
            while receipts.changed().await.is_ok() {
                let list: ReceiptList = receipts.borrow_and_update().clone();
                let next = Dashboard::from_receipts(&list);
                debug!(receipts = list.len(), "Dashboard recomputed");
                if tx.send(Arc::new(next)).is_err() {
                    break;
                }
            }
        });

        Self { dashboard, task }
    }

    pub fn current(&self) -> Arc<Dashboard> {
        self.dashboard.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Dashboard>> {
        self.dashboard.clone()
    }
}

impl Drop for AnalyticsProjection {
    fn drop(&mut self) {
        self.task.abort();
    }
}
