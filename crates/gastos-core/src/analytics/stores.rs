//! Per-store aggregates and map pins

use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::Serialize;

use super::{completed, normalize_name, parse_purchase_date};
use crate::geocode::{Coordinates, Geocoder};
use crate::models::Receipt;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSummary {
    pub store_name: String,
    pub store_cnpj: String,
    /// Address from the newest receipt that has one
    pub store_address: String,
    pub total_spent: f64,
    pub receipt_count: usize,
    pub average_ticket: f64,
    pub first_purchase: Option<NaiveDateTime>,
    pub last_purchase: Option<NaiveDateTime>,
}

/// A store placed on the map
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorePin {
    pub store_name: String,
    pub store_address: String,
    pub coordinates: Coordinates,
    pub total_spent: f64,
    pub receipt_count: usize,
}

/// Stores grouped by CNPJ (or name when the CNPJ is missing), biggest
/// spend first
pub fn store_summaries(receipts: &[Receipt]) -> Vec<StoreSummary> {
    let mut order: Vec<String> = Vec::new();
    let mut stores: HashMap<String, StoreSummary> = HashMap::new();

    for (_, details) in completed(receipts) {
        let cnpj = details.store_cnpj.trim();
        let key = if cnpj.is_empty() {
            format!("name:{}", normalize_name(&details.store_name))
        } else {
            format!("cnpj:{}", cnpj)
        };

        let entry = stores.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            StoreSummary {
                store_name: details.store_name.trim().to_string(),
                store_cnpj: cnpj.to_string(),
                store_address: String::new(),
                total_spent: 0.0,
                receipt_count: 0,
                average_ticket: 0.0,
                first_purchase: None,
                last_purchase: None,
            }
        });

        entry.total_spent += details.total_amount;
        entry.receipt_count += 1;
        if entry.store_address.is_empty() {
            entry.store_address = details.store_address.trim().to_string();
        }
        if let Some(date) = parse_purchase_date(&details.date) {
            entry.first_purchase = Some(entry.first_purchase.map_or(date, |d| d.min(date)));
            entry.last_purchase = Some(entry.last_purchase.map_or(date, |d| d.max(date)));
        }
    }

    let mut summaries: Vec<StoreSummary> = order
        .into_iter()
        .filter_map(|key| stores.remove(&key))
        .map(|mut s| {
            s.average_ticket = s.total_spent / s.receipt_count as f64;
            s
        })
        .collect();
    summaries.sort_by(|a, b| b.total_spent.total_cmp(&a.total_spent));
    summaries
}

/// Resolve a pin for every store with an address. Stores the geocoder can't
/// place are left off.
pub async fn store_locations(
    summaries: &[StoreSummary],
    geocoder: &dyn Geocoder,
) -> Vec<StorePin> {
    let mut pins = Vec::new();
    for store in summaries {
        if store.store_address.is_empty() {
            continue;
        }
        if let Some(coordinates) = geocoder.address_to_coordinates(&store.store_address).await {
            pins.push(StorePin {
                store_name: store.store_name.clone(),
                store_address: store.store_address.clone(),
                coordinates,
                total_spent: store.total_spent,
                receipt_count: store.receipt_count,
            });
        }
    }
    pins
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::tests::receipt;
    use crate::geocode::CachedGeocoder;
    use async_trait::async_trait;

    fn with_store(mut r: Receipt, cnpj: &str, address: &str) -> Receipt {
        let details = r.details_mut().unwrap();
        details.store_cnpj = cnpj.into();
        details.store_address = address.into();
        r
    }

    #[test]
    fn test_group_by_cnpj_then_name() {
        let receipts = vec![
            with_store(receipt("Mercado X", "2024-03-10", 30.0, vec![]), "11", "Rua A, 1"),
            with_store(receipt("MERCADO X FILIAL", "2024-01-05", 10.0, vec![]), "11", ""),
            with_store(receipt("Feira", "2024-02-01", 50.0, vec![]), "", ""),
            with_store(receipt(" feira", "bad date", 20.0, vec![]), "", ""),
        ];
        let stores = store_summaries(&receipts);
        assert_eq!(stores.len(), 2);

        let feira = &stores[0];
        assert_eq!(feira.store_name, "Feira");
        assert_eq!(feira.total_spent, 70.0);
        assert_eq!(feira.receipt_count, 2);
        assert_eq!(feira.average_ticket, 35.0);

        let mercado = &stores[1];
        assert_eq!(mercado.store_name, "Mercado X");
        assert_eq!(mercado.store_address, "Rua A, 1");
        assert_eq!(mercado.first_purchase.unwrap().to_string(), "2024-01-05 00:00:00");
        assert_eq!(mercado.last_purchase.unwrap().to_string(), "2024-03-10 00:00:00");
    }

    struct TableGeocoder;

    #[async_trait]
    impl Geocoder for TableGeocoder {
        async fn address_to_coordinates(&self, address: &str) -> Option<Coordinates> {
            (address == "Rua A, 1").then_some(Coordinates {
                lat: -23.55,
                lng: -46.63,
            })
        }
    }

    #[tokio::test]
    async fn test_store_locations_skip_unplaced() {
        let receipts = vec![
            with_store(receipt("Mercado X", "2024-03-10", 30.0, vec![]), "11", "Rua A, 1"),
            with_store(receipt("Feira", "2024-02-01", 50.0, vec![]), "22", "Beco sem nome"),
            with_store(receipt("Padaria", "2024-02-01", 5.0, vec![]), "33", ""),
        ];
        let geocoder = CachedGeocoder::new(TableGeocoder);
        let pins = store_locations(&store_summaries(&receipts), &geocoder).await;

        assert_eq!(pins.len(), 1);
        assert_eq!(pins[0].store_name, "Mercado X");
        assert_eq!(pins[0].coordinates.lat, -23.55);
        // Empty addresses never reach the geocoder
        assert_eq!(geocoder.cached_len(), 2);
    }
}
