//! Receipt command implementations

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use gastos_core::{Config, Receipt, ReceiptStatus, ReceiptStore};

use super::{brl, find_receipt, open_store, require_remote, truncate, warn_if_offline};

fn status_icon(status: ReceiptStatus) -> &'static str {
    match status {
        ReceiptStatus::Processing => "⏳",
        ReceiptStatus::Completed => "✅",
        ReceiptStatus::Error => "❌",
    }
}

fn sync_label(receipt: &Receipt, remote: bool) -> &'static str {
    if !remote {
        "local"
    } else if receipt.syncing {
        "syncing"
    } else if receipt.is_synced {
        "synced"
    } else {
        "unsynced"
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// One-line summary of a receipt
fn print_receipt_line(receipt: &Receipt, remote: bool) {
    let summary = match (receipt.details(), receipt.error_message()) {
        (Some(details), _) => format!(
            "{} - {} ({})",
            truncate(&details.store_name, 30),
            brl(details.total_amount),
            details.date
        ),
        (None, Some(message)) => truncate(message, 50),
        (None, None) => receipt
            .url()
            .map(|u| truncate(u, 50))
            .unwrap_or_else(|| "reading photo...".to_string()),
    };
    println!(
        "  {} {}  {:<50} [{}]",
        status_icon(receipt.status()),
        short_id(&receipt.id),
        summary,
        sync_label(receipt, remote)
    );
}

/// Print the final state of a receipt after queue work
fn print_outcome(store: &ReceiptStore, id: &str, json: bool) -> Result<()> {
    let receipt = store
        .get(id)
        .ok_or_else(|| anyhow!("Receipt {} disappeared", id))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&receipt.to_record())?);
        return Ok(());
    }
    match receipt.status() {
        ReceiptStatus::Completed => println!("✅ Receipt {} extracted", short_id(id)),
        ReceiptStatus::Error => println!(
            "❌ Receipt {} failed: {}",
            short_id(id),
            receipt.error_message().unwrap_or_default()
        ),
        ReceiptStatus::Processing => println!("⏳ Receipt {} still processing", short_id(id)),
    }
    print_receipt_line(&receipt, store.is_remote_configured());
    Ok(())
}

/// Add a receipt by URL and wait for extraction
pub async fn cmd_add(config: &Config, url: &str, json: bool) -> Result<()> {
    let store = open_store(config).await?;

    let Some(id) = store.add_receipt(url).await else {
        if url.trim().is_empty() {
            bail!("Receipt URL is empty");
        }
        println!("ℹ️  That receipt is already tracked");
        return Ok(());
    };

    if !json {
        println!("🧾 Extracting receipt {}...", short_id(&id));
    }
    store.wait_idle().await;
    print_outcome(&store, &id, json)?;
    warn_if_offline(&store);
    Ok(())
}

/// Add a receipt from a photo and wait for extraction
pub async fn cmd_photo(config: &Config, file: &Path, json: bool) -> Result<()> {
    let photo = std::fs::read(file)
        .with_context(|| format!("Failed to read photo {}", file.display()))?;
    let store = open_store(config).await?;

    if !json {
        println!("📷 Reading receipt photo {}...", file.display());
    }
    let id = store.add_receipt_from_photo(&photo).await;
    store.wait_idle().await;
    print_outcome(&store, &id, json)?;
    warn_if_offline(&store);
    Ok(())
}

/// List receipts, newest first
pub async fn cmd_list(config: &Config, status: Option<&str>, json: bool) -> Result<()> {
    let status: Option<ReceiptStatus> = status
        .map(|s| s.parse().map_err(|e: String| anyhow!(e)))
        .transpose()?;

    let store = open_store(config).await?;
    let list = store.receipts();
    let selected: Vec<&Receipt> = list
        .iter()
        .filter(|r| status.map_or(true, |s| r.status() == s))
        .collect();

    if json {
        let records: Vec<_> = selected.iter().map(|r| r.to_record()).collect();
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if selected.is_empty() {
        println!("No receipts");
        return Ok(());
    }

    let remote = store.is_remote_configured();
    println!("\n🧾 Receipts ({})", selected.len());
    println!("{}", "─".repeat(80));
    for receipt in selected {
        print_receipt_line(receipt, remote);
    }
    println!();
    warn_if_offline(&store);
    Ok(())
}

/// Show one receipt with its items
pub async fn cmd_show(config: &Config, id: &str, json: bool) -> Result<()> {
    let store = open_store(config).await?;
    let receipt = find_receipt(&store, id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&receipt.to_record())?);
        return Ok(());
    }

    println!();
    println!("{} Receipt {}", status_icon(receipt.status()), receipt.id);
    println!("   URL:     {}", receipt.url().unwrap_or("-"));
    println!("   Status:  {}", receipt.status());
    println!(
        "   Sync:    {}",
        sync_label(&receipt, store.is_remote_configured())
    );
    if let Some(payer) = &receipt.payer {
        println!("   Payer:   {}", payer);
    }
    if let Some(message) = receipt.error_message() {
        println!("   Error:   {}", message);
    }

    if let Some(details) = receipt.details() {
        println!("   Store:   {} ({})", details.store_name, details.store_cnpj);
        println!("   Address: {}", details.store_address);
        println!("   Date:    {}", details.date);
        println!("   Total:   {}", brl(details.total_amount));
        println!();
        println!(
            "   {:35} │ {:>8} │ {:>12} │ {:>12}",
            "Item", "Qty", "Unit price", "Total"
        );
        println!("   ────────────────────────────────────┼──────────┼──────────────┼─────────────");
        for item in &details.items {
            println!(
                "   {:35} │ {:>5} {:<2} │ {:>12} │ {:>12}",
                truncate(&item.name, 35),
                item.quantity,
                item.unit,
                brl(item.unit_price),
                brl(item.total_price)
            );
        }
    }
    println!();
    Ok(())
}

/// Push unsynced receipts and reload from the spreadsheet
pub async fn cmd_sync(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    require_remote(&store)?;

    let summary = store.sync_local_data_to_sheets().await;
    if summary.attempted == 0 {
        println!("✅ Everything is already synced");
    } else {
        println!(
            "🔄 Synced {} of {} receipts",
            summary.succeeded, summary.attempted
        );
    }
    warn_if_offline(&store);
    Ok(())
}

/// Retry saving one receipt
pub async fn cmd_retry(config: &Config, id: &str) -> Result<()> {
    let store = open_store(config).await?;
    require_remote(&store)?;
    let receipt = find_receipt(&store, id)?;

    if receipt.is_synced {
        println!("✅ Receipt {} is already synced", short_id(&receipt.id));
    } else if store.retry_sync(&receipt.id).await {
        println!("✅ Receipt {} synced", short_id(&receipt.id));
    } else if receipt.status() != ReceiptStatus::Completed {
        println!(
            "ℹ️  Receipt {} is {}; only completed receipts are retried",
            short_id(&receipt.id),
            receipt.status()
        );
    } else {
        println!("❌ Receipt {} could not be synced", short_id(&receipt.id));
    }
    warn_if_offline(&store);
    Ok(())
}

/// Extract a receipt again
pub async fn cmd_reprocess(config: &Config, id: &str, json: bool) -> Result<()> {
    let store = open_store(config).await?;
    let receipt = find_receipt(&store, id)?;

    if !store.reprocess_receipt(&receipt.id).await {
        bail!(
            "Receipt {} cannot be reprocessed (no URL or already processing)",
            short_id(&receipt.id)
        );
    }
    if !json {
        println!("🧾 Extracting receipt {} again...", short_id(&receipt.id));
    }
    store.wait_idle().await;
    print_outcome(&store, &receipt.id, json)?;
    warn_if_offline(&store);
    Ok(())
}

/// Delete a receipt
pub async fn cmd_delete(config: &Config, id: &str) -> Result<()> {
    let store = open_store(config).await?;
    let receipt = find_receipt(&store, id)?;

    store.delete_receipt(&receipt.id).await;
    println!("🗑️  Deleted receipt {}", short_id(&receipt.id));
    warn_if_offline(&store);
    Ok(())
}

/// Replace a receipt's URL without extracting it again
pub async fn cmd_set_url(config: &Config, id: &str, url: &str) -> Result<()> {
    if url.trim().is_empty() {
        bail!("URL is empty");
    }
    let store = open_store(config).await?;
    let receipt = find_receipt(&store, id)?;

    store.update_receipt_url(&receipt.id, url);
    // The store keeps URL edits local; push the edited receipt so it
    // outlives this process
    if store.is_remote_configured() && !store.push_receipt(&receipt.id).await {
        warn_if_offline(&store);
        bail!(
            "Could not save the new URL of receipt {} to the spreadsheet",
            short_id(&receipt.id)
        );
    }
    println!("✏️  Updated URL of receipt {}", short_id(&receipt.id));
    Ok(())
}

/// Rewrite a store's address on all of its receipts
pub async fn cmd_set_address(config: &Config, cnpj: &str, address: &str) -> Result<()> {
    if address.trim().is_empty() {
        bail!("Address is empty");
    }
    let store = open_store(config).await?;

    let changed = store.update_store_address(cnpj, address.trim()).await;
    if changed == 0 {
        println!("No receipts from store {}", cnpj);
    } else {
        println!("🏪 Updated the address on {} receipts", changed);
    }
    warn_if_offline(&store);
    Ok(())
}

/// Rebuild spreadsheet item rows
pub async fn cmd_migrate(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    require_remote(&store)?;

    match store.migrate().await {
        Some(report) => println!("✅ {}", report.message),
        None => bail!("Migration failed"),
    }
    Ok(())
}
