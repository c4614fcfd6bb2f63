//! Shopping-list simulation: what would this list cost at each store?

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::normalize_name;
use super::products::purchase_history;
use crate::models::Receipt;

/// Estimated cost of a shopping list at one store
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreQuote {
    pub store_name: String,
    pub total: f64,
    pub found_items: usize,
    /// Wanted items never bought at this store, as requested
    pub missing_items: Vec<String>,
}

/// Price `wanted` at every store that sold at least one of its items, using
/// the most recent unit price seen there. Ranked by items found, then by
/// total.
pub fn simulate_shopping_list<S: AsRef<str>>(receipts: &[Receipt], wanted: &[S]) -> Vec<StoreQuote> {
    // Wanted items, deduplicated by key, in request order
    let mut seen = HashSet::new();
    let wanted: Vec<(String, &str)> = wanted
        .iter()
        .map(|w| w.as_ref().trim())
        .filter(|w| !w.is_empty())
        .filter_map(|w| {
            let key = normalize_name(w);
            seen.insert(key.clone()).then_some((key, w))
        })
        .collect();
    if wanted.is_empty() {
        return Vec::new();
    }

    // store key -> (display name, product key -> first price seen)
    let mut order: Vec<String> = Vec::new();
    let mut prices: HashMap<String, (String, HashMap<String, f64>)> = HashMap::new();
    for purchase in purchase_history(receipts) {
        let store_key = normalize_name(&purchase.store_name);
        let (_, store_prices) = prices.entry(store_key.clone()).or_insert_with(|| {
            order.push(store_key);
            (purchase.store_name.trim().to_string(), HashMap::new())
        });
        store_prices
            .entry(normalize_name(&purchase.name))
            .or_insert(purchase.unit_price);
    }

    let mut quotes: Vec<StoreQuote> = order
        .iter()
        .filter_map(|key| prices.get(key))
        .map(|(store_name, store_prices)| {
            let mut quote = StoreQuote {
                store_name: store_name.clone(),
                total: 0.0,
                found_items: 0,
                missing_items: Vec::new(),
            };
            for (key, display) in &wanted {
                match store_prices.get(key) {
                    Some(price) => {
                        quote.total += price;
                        quote.found_items += 1;
                    }
                    None => quote.missing_items.push(display.to_string()),
                }
            }
            quote
        })
        .filter(|q| q.found_items > 0)
        .collect();

    quotes.sort_by(|a, b| {
        b.found_items
            .cmp(&a.found_items)
            .then_with(|| a.total.total_cmp(&b.total))
    });
    quotes
}
