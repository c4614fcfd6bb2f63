//! In-memory spreadsheet store
//!
//! Implements the server side of the bridge protocol over two tables:
//!
//! - `receipts`: one row per receipt, with the item list serialized inline
//! - `items`: one row per purchased line, keyed by a server-assigned `item_id`
//!   and pointing back at `receipt_id`
//!
//! Every write stamps the row with a server timestamp. A save replaces all item
//! rows of its receipt inside a single lock, so a reader never observes the
//! window between the delete and the insert.
//!
//! Used as a [`Transport`] in tests and behind the mock bridge server.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::bridge::{BridgeErrorBody, BridgeRequest, MigrateReport, Transport};
use crate::error::{Error, Result};
use crate::models::{Item, ReceiptId, ReceiptRecord, ReceiptStatus};

/// Row of the receipts table
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptRow {
    pub id: ReceiptId,
    pub url: String,
    pub status: ReceiptStatus,
    pub store_name: String,
    pub store_cnpj: String,
    pub store_address: String,
    pub date: String,
    pub total_amount: Option<f64>,
    /// Serialized item list ("" when the receipt has none yet)
    pub items: String,
    pub error: String,
    pub payer: String,
    pub timestamp: String,
}

/// Row of the items table
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRow {
    pub item_id: String,
    pub receipt_id: ReceiptId,
    pub name: String,
    pub quantity: f64,
    pub unit: String,
    pub unit_price: f64,
    pub total_price: f64,
    pub category: String,
    pub timestamp: String,
}

impl ItemRow {
    fn new(receipt_id: &str, item: &Item, timestamp: &str) -> Self {
        Self {
            item_id: uuid::Uuid::new_v4().to_string(),
            receipt_id: receipt_id.to_string(),
            name: item.name.clone(),
            quantity: item.quantity,
            unit: item.unit.clone(),
            unit_price: item.unit_price,
            total_price: item.total_price,
            category: item.category.clone(),
            timestamp: timestamp.to_string(),
        }
    }

    fn to_item(&self) -> Item {
        Item {
            name: self.name.clone(),
            quantity: self.quantity,
            unit: self.unit.clone(),
            unit_price: self.unit_price,
            total_price: self.total_price,
            category: self.category.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct Tables {
    receipts: Vec<ReceiptRow>,
    items: Vec<ItemRow>,
}

impl Tables {
    fn replace_items(&mut self, receipt_id: &str, items: &[Item], timestamp: &str) {
        self.items.retain(|row| row.receipt_id != receipt_id);
        self.items
            .extend(items.iter().map(|item| ItemRow::new(receipt_id, item, timestamp)));
    }
}

/// Spreadsheet-backed receipt store held in memory
#[derive(Debug, Default)]
pub struct Spreadsheet {
    tables: Mutex<Tables>,
}

impl Spreadsheet {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Answer one request. Failures come back as `{error, details}` bodies.
    pub fn handle(&self, request: &BridgeRequest) -> Value {
        let result = match request {
            BridgeRequest::Get => self.list().and_then(|r| Ok(serde_json::to_value(r)?)),
            BridgeRequest::Save { data } => self.save(data),
            BridgeRequest::Delete { id } => self.delete(id),
            BridgeRequest::Migrate => self.migrate().and_then(|r| Ok(serde_json::to_value(r)?)),
        };
        result.unwrap_or_else(|e| {
            warn!(action = request.action(), "Spreadsheet request failed: {}", e);
            serde_json::to_value(BridgeErrorBody::from(&e))
                .unwrap_or_else(|_| json!({ "error": e.to_string() }))
        })
    }

    /// All receipts in table order. Items come from the items table when it
    /// has rows for the receipt, otherwise from the inline column.
    pub fn list(&self) -> Result<Vec<ReceiptRecord>> {
        let tables = self.tables();
        let records = tables
            .receipts
            .iter()
            .map(|row| {
                let normalized: Vec<Item> = tables
                    .items
                    .iter()
                    .filter(|item| item.receipt_id == row.id)
                    .map(ItemRow::to_item)
                    .collect();
                let items = if !normalized.is_empty() {
                    Some(normalized)
                } else {
                    parse_inline_items(&row.items)
                };
                ReceiptRecord {
                    id: row.id.clone(),
                    url: non_empty(&row.url),
                    status: row.status,
                    store_name: non_empty(&row.store_name),
                    store_cnpj: non_empty(&row.store_cnpj),
                    store_address: non_empty(&row.store_address),
                    date: non_empty(&row.date),
                    total_amount: row.total_amount,
                    payer: non_empty(&row.payer),
                    items,
                    error: non_empty(&row.error),
                    timestamp: Some(row.timestamp.clone()),
                }
            })
            .collect();
        Ok(records)
    }

    /// Upsert by id. Items present on the record replace the receipt's item
    /// rows; absent items leave them untouched.
    pub fn save(&self, record: &ReceiptRecord) -> Result<Value> {
        if record.id.trim().is_empty() {
            return Err(Error::Validation("Missing receipt id".into()));
        }

        let timestamp = Utc::now().to_rfc3339();
        let inline_items = match &record.items {
            Some(items) => Some(serde_json::to_string(items)?),
            None => None,
        };

        let mut tables = self.tables();
        let position = tables.receipts.iter().position(|row| row.id == record.id);
        let previous_items = position
            .map(|i| tables.receipts[i].items.clone())
            .unwrap_or_default();

        let row = ReceiptRow {
            id: record.id.clone(),
            url: record.url.clone().unwrap_or_default(),
            status: record.status,
            store_name: record.store_name.clone().unwrap_or_default(),
            store_cnpj: record.store_cnpj.clone().unwrap_or_default(),
            store_address: record.store_address.clone().unwrap_or_default(),
            date: record.date.clone().unwrap_or_default(),
            total_amount: record.total_amount,
            items: inline_items.unwrap_or(previous_items),
            error: record.error.clone().unwrap_or_default(),
            payer: record.payer.clone().unwrap_or_default(),
            timestamp: timestamp.clone(),
        };

        match position {
            Some(i) => tables.receipts[i] = row,
            None => tables.receipts.push(row),
        }
        if let Some(items) = &record.items {
            tables.replace_items(&record.id, items, &timestamp);
        }

        debug!(id = %record.id, updated = position.is_some(), "Saved receipt row");
        Ok(json!({ "success": true, "id": record.id }))
    }

    /// Remove a receipt and every item row pointing at it. Unknown ids succeed.
    pub fn delete(&self, id: &str) -> Result<Value> {
        if id.trim().is_empty() {
            return Err(Error::Validation("Missing id for delete".into()));
        }
        let mut tables = self.tables();
        tables.receipts.retain(|row| row.id != id);
        tables.items.retain(|row| row.receipt_id != id);
        Ok(json!({ "success": true, "id": id }))
    }

    /// Re-derive item rows from every receipt's inline item list
    pub fn migrate(&self) -> Result<MigrateReport> {
        let timestamp = Utc::now().to_rfc3339();
        let mut tables = self.tables();

        let sources: Vec<(ReceiptId, Vec<Item>)> = tables
            .receipts
            .iter()
            .filter_map(|row| {
                let items = parse_inline_items(&row.items)?;
                Some((row.id.clone(), items))
            })
            .filter(|(_, items)| !items.is_empty())
            .collect();

        let mut migrated_count = 0;
        for (receipt_id, items) in &sources {
            tables.replace_items(receipt_id, items, &timestamp);
            migrated_count += items.len();
        }

        Ok(MigrateReport {
            success: true,
            migrated_count,
            message: format!(
                "Migrated {} items from {} receipts",
                migrated_count,
                sources.len()
            ),
        })
    }

    /// Write a receipt row directly, bypassing item normalization. Mirrors
    /// rows written before the items table existed.
    pub fn insert_legacy_row(&self, record: &ReceiptRecord) -> Result<()> {
        let items = match &record.items {
            Some(items) => serde_json::to_string(items)?,
            None => String::new(),
        };
        let mut tables = self.tables();
        tables.receipts.push(ReceiptRow {
            id: record.id.clone(),
            url: record.url.clone().unwrap_or_default(),
            status: record.status,
            store_name: record.store_name.clone().unwrap_or_default(),
            store_cnpj: record.store_cnpj.clone().unwrap_or_default(),
            store_address: record.store_address.clone().unwrap_or_default(),
            date: record.date.clone().unwrap_or_default(),
            total_amount: record.total_amount,
            items,
            error: record.error.clone().unwrap_or_default(),
            payer: record.payer.clone().unwrap_or_default(),
            timestamp: Utc::now().to_rfc3339(),
        });
        Ok(())
    }

    pub fn receipt_rows(&self) -> Vec<ReceiptRow> {
        self.tables().receipts.clone()
    }

    pub fn item_rows(&self, receipt_id: &str) -> Vec<ItemRow> {
        self.tables()
            .items
            .iter()
            .filter(|row| row.receipt_id == receipt_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Transport for Spreadsheet {
    async fn call(&self, _endpoint: &str, request: &BridgeRequest) -> Result<Value> {
        Ok(self.handle(request))
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_inline_items(raw: &str) -> Option<Vec<Item>> {
    if raw.trim().is_empty() {
        return None;
    }
    serde_json::from_str(raw)
        .map_err(|e| warn!("Skipping unreadable inline items: {}", e))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn item(name: &str, price: f64) -> Item {
        Item {
            name: name.into(),
            quantity: 1.0,
            unit: "UN".into(),
            unit_price: price,
            total_price: price,
            category: "Mercearia".into(),
        }
    }

    fn completed(id: &str, items: Vec<Item>) -> ReceiptRecord {
        ReceiptRecord {
            id: id.into(),
            url: Some(format!("http://nfce/{id}")),
            status: ReceiptStatus::Completed,
            store_name: Some("Loja A".into()),
            total_amount: Some(items.iter().map(|i| i.total_price).sum()),
            items: Some(items),
            ..Default::default()
        }
    }

    #[test]
    fn test_save_then_list_preserves_item_order() {
        let sheet = Spreadsheet::new();
        let items = vec![item("Arroz", 20.0), item("Feijão", 8.5)];
        sheet.save(&completed("r1", items.clone())).unwrap();

        let listed = sheet.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].items.as_ref().unwrap(), &items);
        assert!(listed[0].timestamp.is_some());
        assert_eq!(sheet.item_rows("r1").len(), 2);
    }

    #[test]
    fn test_save_upserts_and_replaces_items() {
        let sheet = Spreadsheet::new();
        sheet
            .save(&completed("r1", vec![item("Arroz", 20.0), item("Feijão", 8.5)]))
            .unwrap();
        sheet.save(&completed("r1", vec![item("Café", 15.0)])).unwrap();

        assert_eq!(sheet.receipt_rows().len(), 1);
        let rows = sheet.item_rows("r1");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Café");
    }

    #[test]
    fn test_save_without_items_keeps_existing_rows() {
        let sheet = Spreadsheet::new();
        sheet.save(&completed("r1", vec![item("Arroz", 20.0)])).unwrap();
        let mut update = completed("r1", vec![]);
        update.items = None;
        update.store_address = Some("Rua Nova, 10".into());
        sheet.save(&update).unwrap();

        assert_eq!(sheet.item_rows("r1").len(), 1);
        let listed = sheet.list().unwrap();
        assert_eq!(listed[0].store_address.as_deref(), Some("Rua Nova, 10"));
        assert_eq!(listed[0].items.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_save_missing_id_is_error_body() {
        let sheet = Spreadsheet::new();
        let reply = sheet.handle(&BridgeRequest::Save {
            data: completed("", vec![]),
        });
        assert_eq!(reply["error"], "Missing receipt id");
        assert!(sheet.receipt_rows().is_empty());
    }

    #[test]
    fn test_delete_cascades_and_is_idempotent() {
        let sheet = Spreadsheet::new();
        sheet.save(&completed("r1", vec![item("Arroz", 20.0)])).unwrap();
        sheet.save(&completed("r2", vec![item("Leite", 5.0)])).unwrap();

        let reply = sheet.handle(&BridgeRequest::Delete { id: "r1".into() });
        assert_eq!(reply["success"], true);
        assert!(sheet.item_rows("r1").is_empty());
        assert_eq!(sheet.item_rows("r2").len(), 1);

        let reply = sheet.handle(&BridgeRequest::Delete { id: "r1".into() });
        assert_eq!(reply["success"], true);
        assert_eq!(sheet.receipt_rows().len(), 1);
    }

    #[test]
    fn test_migrate_legacy_receipt() {
        let sheet = Spreadsheet::new();
        sheet
            .insert_legacy_row(&completed("legacy", vec![item("X", 3.0)]))
            .unwrap();
        assert!(sheet.item_rows("legacy").is_empty());

        let report = sheet.migrate().unwrap();
        assert!(report.success);
        assert_eq!(report.migrated_count, 1);

        let rows = sheet.item_rows("legacy");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].receipt_id, "legacy");
        assert_eq!(rows[0].name, "X");
    }

    #[test]
    fn test_migrate_twice_does_not_duplicate_rows() {
        let sheet = Spreadsheet::new();
        sheet
            .insert_legacy_row(&completed("legacy", vec![item("X", 3.0), item("Y", 1.0)]))
            .unwrap();
        sheet.migrate().unwrap();
        sheet.migrate().unwrap();
        assert_eq!(sheet.item_rows("legacy").len(), 2);
    }

    #[test]
    fn test_list_falls_back_to_inline_items() {
        let sheet = Spreadsheet::new();
        sheet
            .insert_legacy_row(&completed("legacy", vec![item("X", 3.0)]))
            .unwrap();
        let listed = sheet.list().unwrap();
        assert_eq!(listed[0].items.as_ref().unwrap()[0].name, "X");
    }

    #[tokio::test]
    async fn test_concurrent_saves_never_expose_empty_items() {
        let sheet = Arc::new(Spreadsheet::new());
        let items = vec![item("Arroz", 20.0), item("Feijão", 8.5)];
        sheet.save(&completed("r1", items.clone())).unwrap();

        let writers: Vec<_> = (0..8)
            .map(|_| {
                let sheet = sheet.clone();
                let record = completed("r1", items.clone());
                tokio::spawn(async move {
                    for _ in 0..50 {
                        sheet.save(&record).unwrap();
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        let reader = {
            let sheet = sheet.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    assert_eq!(sheet.item_rows("r1").len(), 2);
                    tokio::task::yield_now().await;
                }
            })
        };

        for writer in writers {
            writer.await.unwrap();
        }
        reader.await.unwrap();
    }
}
