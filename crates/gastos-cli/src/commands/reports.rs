//! Report command implementations

use anyhow::Result;
use gastos_core::analytics::{
    category_totals, monthly_totals, payer_totals, product_history, product_stats,
    simulate_shopping_list, stats_for, store_summaries,
};
use gastos_core::Config;
use serde::Serialize;

use super::{brl, open_store, truncate};

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn cmd_report_monthly(config: &Config, json: bool) -> Result<()> {
    let store = open_store(config).await?;
    let months = monthly_totals(&store.receipts());
    if json {
        return print_json(&months);
    }

    println!();
    println!("📅 Spending by Month");
    println!("   ─────────────────────────────────────");
    if months.is_empty() {
        println!("   No completed receipts with a readable date.");
        return Ok(());
    }
    println!("   {:10} │ {:>14} │ {:>8}", "Month", "Total", "Receipts");
    println!("   ───────────┼────────────────┼─────────");
    for month in &months {
        println!(
            "   {:10} │ {:>14} │ {:>8}",
            month.month,
            brl(month.total),
            month.receipt_count
        );
    }
    Ok(())
}

pub async fn cmd_report_categories(config: &Config, json: bool) -> Result<()> {
    let store = open_store(config).await?;
    let categories = category_totals(&store.receipts());
    if json {
        return print_json(&categories);
    }

    println!();
    println!("📊 Spending by Category");
    println!("   ─────────────────────────────────────────────────────────");
    if categories.is_empty() {
        println!("   No items found.");
        return Ok(());
    }
    println!(
        "   {:25} │ {:>12} │ {:>6} │ {:>5}",
        "Category", "Total", "%", "Items"
    );
    println!("   ──────────────────────────┼──────────────┼────────┼───────");
    for category in &categories {
        println!(
            "   {:25} │ {:>12} │ {:>5.1}% │ {:>5}",
            truncate(&category.category, 25),
            brl(category.total),
            category.percentage,
            category.item_count
        );
    }
    Ok(())
}

pub async fn cmd_report_payers(config: &Config, json: bool) -> Result<()> {
    let store = open_store(config).await?;
    let payers = payer_totals(&store.receipts());
    if json {
        return print_json(&payers);
    }

    println!();
    println!("👥 Spending by Payer");
    println!("   ─────────────────────────────────────────────");
    if payers.is_empty() {
        println!("   No completed receipts.");
        return Ok(());
    }
    for payer in &payers {
        println!(
            "   {:25} │ {:>12} │ {:>4} receipts",
            truncate(&payer.payer, 25),
            brl(payer.total),
            payer.receipt_count
        );
    }
    Ok(())
}

pub async fn cmd_report_stores(config: &Config, json: bool) -> Result<()> {
    let store = open_store(config).await?;
    let stores = store_summaries(&store.receipts());
    if json {
        return print_json(&stores);
    }

    println!();
    println!("🏪 Spending by Store");
    println!("   ───────────────────────────────────────────────────────────────────────");
    if stores.is_empty() {
        println!("   No completed receipts.");
        return Ok(());
    }
    println!(
        "   {:28} │ {:>12} │ {:>4} │ {:>11} │ {:10}",
        "Store", "Total", "#", "Avg ticket", "Last visit"
    );
    println!("   ─────────────────────────────┼──────────────┼──────┼─────────────┼───────────");
    for summary in &stores {
        let last = summary
            .last_purchase
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "   {:28} │ {:>12} │ {:>4} │ {:>11} │ {:10}",
            truncate(&summary.store_name, 28),
            brl(summary.total_spent),
            summary.receipt_count,
            brl(summary.average_ticket),
            last
        );
    }
    Ok(())
}

pub async fn cmd_report_products(config: &Config, limit: usize, json: bool) -> Result<()> {
    let store = open_store(config).await?;
    let mut products = product_stats(&store.receipts());
    products.truncate(limit);
    if json {
        return print_json(&products);
    }

    println!();
    println!("🛒 Most Purchased Products");
    println!("   ───────────────────────────────────────────────────────────────────────");
    if products.is_empty() {
        println!("   No items found.");
        return Ok(());
    }
    println!(
        "   {:30} │ {:>4} │ {:>11} │ {:>11} │ {:>11}",
        "Product", "#", "Last", "Min", "Max"
    );
    println!("   ───────────────────────────────┼──────┼─────────────┼─────────────┼────────────");
    for product in &products {
        println!(
            "   {:30} │ {:>4} │ {:>11} │ {:>11} │ {:>11}",
            truncate(&product.name, 30),
            product.purchase_count,
            brl(product.last_price),
            brl(product.min_price),
            brl(product.max_price)
        );
    }
    Ok(())
}

/// Price history of one product
pub async fn cmd_product(config: &Config, name: &str, json: bool) -> Result<()> {
    let store = open_store(config).await?;
    let receipts = store.receipts();
    let history = product_history(&receipts, name);

    if json {
        #[derive(Serialize)]
        struct ProductReport<'a> {
            stats: Option<gastos_core::analytics::ProductStats>,
            history: &'a [gastos_core::analytics::ProductPurchase],
        }
        return print_json(&ProductReport {
            stats: stats_for(&receipts, name),
            history: &history,
        });
    }

    let Some(stats) = stats_for(&receipts, name) else {
        println!("No purchases of '{}'", name);
        return Ok(());
    };

    println!();
    println!("🏷️  {}", stats.name);
    println!(
        "   Bought {} times · last {} · avg {} · min {} · max {}",
        stats.purchase_count,
        brl(stats.last_price),
        brl(stats.average_price),
        brl(stats.min_price),
        brl(stats.max_price)
    );
    println!();
    for purchase in &history {
        println!(
            "   {:20} │ {:25} │ {:>5} × {:>11}",
            truncate(&purchase.date, 20),
            truncate(&purchase.store_name, 25),
            purchase.quantity,
            brl(purchase.unit_price)
        );
    }
    Ok(())
}

/// Cost of a shopping list at each store
pub async fn cmd_simulate(config: &Config, items: &[String], json: bool) -> Result<()> {
    let store = open_store(config).await?;
    let quotes = simulate_shopping_list(&store.receipts(), items);
    if json {
        return print_json(&quotes);
    }

    println!();
    println!("🧮 Shopping List Simulation ({} items)", items.len());
    println!("   ───────────────────────────────────────────────────────────");
    if quotes.is_empty() {
        println!("   None of these items were bought at any known store.");
        return Ok(());
    }
    for (rank, quote) in quotes.iter().enumerate() {
        println!(
            "   {}. {:28} {:>12}  ({} found)",
            rank + 1,
            truncate(&quote.store_name, 28),
            brl(quote.total),
            quote.found_items
        );
        if !quote.missing_items.is_empty() {
            println!("      missing: {}", quote.missing_items.join(", "));
        }
    }
    Ok(())
}
