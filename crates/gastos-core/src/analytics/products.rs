//! Per-product purchase history and price statistics

use std::collections::HashMap;

use serde::Serialize;

use super::{completed, normalize_name};
use crate::models::{Receipt, ReceiptId};

/// One purchase of a product
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPurchase {
    pub receipt_id: ReceiptId,
    /// Name as printed on this receipt
    pub name: String,
    pub store_name: String,
    pub date: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub total_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductStats {
    /// Spelling on the newest purchase
    pub name: String,
    pub average_price: f64,
    pub min_price: f64,
    pub max_price: f64,
    /// Unit price on the newest receipt
    pub last_price: f64,
    pub purchase_count: usize,
}

/// Every purchased item, newest receipt first, items in receipt order
pub fn purchase_history(receipts: &[Receipt]) -> Vec<ProductPurchase> {
    completed(receipts)
        .flat_map(|(receipt, details)| {
            details.items.iter().map(move |item| ProductPurchase {
                receipt_id: receipt.id.clone(),
                name: item.name.clone(),
                store_name: details.store_name.clone(),
                date: details.date.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                total_price: item.total_price,
            })
        })
        .collect()
}

/// Purchases of one product, matched by trimmed lower-cased name
pub fn product_history(receipts: &[Receipt], name: &str) -> Vec<ProductPurchase> {
    let key = normalize_name(name);
    purchase_history(receipts)
        .into_iter()
        .filter(|p| normalize_name(&p.name) == key)
        .collect()
}

/// Stats for every product, most purchased first
pub fn product_stats(receipts: &[Receipt]) -> Vec<ProductStats> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<ProductPurchase>> = HashMap::new();
    for purchase in purchase_history(receipts) {
        let key = normalize_name(&purchase.name);
        if key.is_empty() {
            continue;
        }
        groups
            .entry(key.clone())
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(purchase);
    }

    let mut stats: Vec<ProductStats> = order
        .iter()
        .filter_map(|key| stats_from(groups.get(key)?))
        .collect();
    stats.sort_by(|a, b| {
        b.purchase_count
            .cmp(&a.purchase_count)
            .then_with(|| a.name.cmp(&b.name))
    });
    stats
}

/// Stats for one product, `None` if it was never bought
pub fn stats_for(receipts: &[Receipt], name: &str) -> Option<ProductStats> {
    stats_from(&product_history(receipts, name))
}

fn stats_from(history: &[ProductPurchase]) -> Option<ProductStats> {
    let newest = history.first()?;
    let prices = history.iter().map(|p| p.unit_price);
    let total: f64 = prices.clone().sum();
    Some(ProductStats {
        name: newest.name.trim().to_string(),
        average_price: total / history.len() as f64,
        min_price: prices.clone().fold(f64::INFINITY, f64::min),
        max_price: prices.fold(f64::NEG_INFINITY, f64::max),
        last_price: newest.unit_price,
        purchase_count: history.len(),
    })
}
