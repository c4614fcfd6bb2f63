//! Spending totals by month, category and payer

use std::collections::HashMap;

use serde::Serialize;

use super::{completed, normalize_name, parse_purchase_date};
use crate::models::Receipt;

pub const UNCATEGORIZED: &str = "Uncategorized";
pub const UNASSIGNED: &str = "Unassigned";

/// Spending in one calendar month
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyTotal {
    /// `YYYY-MM`
    pub month: String,
    pub total: f64,
    pub receipt_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryTotal {
    pub category: String,
    pub total: f64,
    pub item_count: usize,
    /// Share of all item spending, 0 to 100
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayerTotal {
    pub payer: String,
    pub total: f64,
    pub receipt_count: usize,
}

/// Receipt totals per month, oldest month first. Receipts with an unreadable
/// date are left out.
pub fn monthly_totals(receipts: &[Receipt]) -> Vec<MonthlyTotal> {
    let mut months: HashMap<String, MonthlyTotal> = HashMap::new();
    for (_, details) in completed(receipts) {
        let Some(date) = parse_purchase_date(&details.date) else {
            continue;
        };
        let month = date.format("%Y-%m").to_string();
        let entry = months.entry(month.clone()).or_insert(MonthlyTotal {
            month,
            total: 0.0,
            receipt_count: 0,
        });
        entry.total += details.total_amount;
        entry.receipt_count += 1;
    }

    let mut months: Vec<_> = months.into_values().collect();
    months.sort_by(|a, b| a.month.cmp(&b.month));
    months
}

/// Item totals per category, largest first
pub fn category_totals(receipts: &[Receipt]) -> Vec<CategoryTotal> {
    let mut order: Vec<String> = Vec::new();
    let mut totals: HashMap<String, CategoryTotal> = HashMap::new();

    for (_, details) in completed(receipts) {
        for item in &details.items {
            let display = match item.category.trim() {
                "" => UNCATEGORIZED,
                c => c,
            };
            let key = normalize_name(display);
            let entry = totals.entry(key.clone()).or_insert_with(|| {
                order.push(key);
                CategoryTotal {
                    category: display.to_string(),
                    total: 0.0,
                    item_count: 0,
                    percentage: 0.0,
                }
            });
            entry.total += item.total_price;
            entry.item_count += 1;
        }
    }

    let grand_total: f64 = totals.values().map(|c| c.total).sum();
    let mut categories: Vec<CategoryTotal> = order
        .into_iter()
        .filter_map(|key| totals.remove(&key))
        .map(|mut c| {
            if grand_total > 0.0 {
                c.percentage = c.total / grand_total * 100.0;
            }
            c
        })
        .collect();
    categories.sort_by(|a, b| b.total.total_cmp(&a.total));
    categories
}

/// Receipt totals per payer, largest first
pub fn payer_totals(receipts: &[Receipt]) -> Vec<PayerTotal> {
    let mut order: Vec<String> = Vec::new();
    let mut totals: HashMap<String, PayerTotal> = HashMap::new();

    for (receipt, details) in completed(receipts) {
        let display = receipt
            .payer
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(UNASSIGNED);
        let key = normalize_name(display);
        let entry = totals.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            PayerTotal {
                payer: display.to_string(),
                total: 0.0,
                receipt_count: 0,
            }
        });
        entry.total += details.total_amount;
        entry.receipt_count += 1;
    }

    let mut payers: Vec<PayerTotal> = order
        .into_iter()
        .filter_map(|key| totals.remove(&key))
        .collect();
    payers.sort_by(|a, b| b.total.total_cmp(&a.total));
    payers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::tests::{item, receipt};

    #[test]
    fn test_monthly_totals_skip_bad_dates() {
        let receipts = vec![
            receipt("A", "2024-02-03", 20.0, vec![]),
            receipt("A", "15/01/2024 18:30:00", 10.0, vec![]),
            receipt("B", "28/01/2024", 5.5, vec![]),
            receipt("B", "someday", 99.0, vec![]),
        ];
        let months = monthly_totals(&receipts);
        assert_eq!(months.len(), 2);
        assert_eq!(months[0].month, "2024-01");
        assert_eq!(months[0].total, 15.5);
        assert_eq!(months[0].receipt_count, 2);
        assert_eq!(months[1].month, "2024-02");
    }

    #[test]
    fn test_category_totals() {
        let receipts = vec![receipt(
            "A",
            "2024-01-15",
            12.0,
            vec![
                item("Arroz", "Mercearia", 8.0),
                item("Feijão", "mercearia ", 2.0),
                item("Sabão", "", 2.0),
            ],
        )];
        let categories = category_totals(&receipts);
        assert_eq!(categories.len(), 2);
        assert_eq!(categories[0].category, "Mercearia");
        assert_eq!(categories[0].total, 10.0);
        assert_eq!(categories[0].item_count, 2);
        assert!((categories[0].percentage - 83.333).abs() < 0.01);
        assert_eq!(categories[1].category, UNCATEGORIZED);
    }

    #[test]
    fn test_payer_totals() {
        let mut ana = receipt("A", "2024-01-15", 30.0, vec![]);
        ana.payer = Some("Ana".into());
        let mut ana_again = receipt("B", "2024-01-16", 5.0, vec![]);
        ana_again.payer = Some(" ana".into());
        let nobody = receipt("C", "2024-01-17", 10.0, vec![]);

        let payers = payer_totals(&[ana, ana_again, nobody]);
        assert_eq!(payers.len(), 2);
        assert_eq!(payers[0].payer, "Ana");
        assert_eq!(payers[0].total, 35.0);
        assert_eq!(payers[0].receipt_count, 2);
        assert_eq!(payers[1].payer, UNASSIGNED);
    }
}
