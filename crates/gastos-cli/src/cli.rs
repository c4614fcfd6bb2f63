//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Gastos - Track grocery spending from NFC-e receipts
#[derive(Parser)]
#[command(name = "gastos")]
#[command(about = "Expense tracker for Brazilian NFC-e receipts", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Data directory for the local snapshot and config.toml
    ///
    /// Defaults to GASTOS_DATA_DIR, then the platform data directory.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Spreadsheet bridge URL (overrides config.toml and GASTOS_SHEETS_URL)
    #[arg(long, global = true)]
    pub endpoint: Option<String>,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add a receipt by its NFC-e URL and extract it
    Add {
        /// URL from the receipt's QR code
        url: String,
    },

    /// Add a receipt from a photo of its QR code
    Photo {
        /// Image file
        file: PathBuf,
    },

    /// List receipts, newest first
    List {
        /// Only show this status: processing, completed, error
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Show one receipt with its items
    Show {
        /// Receipt id (a unique prefix is enough)
        id: String,
    },

    /// Push every unsynced receipt to the spreadsheet, then reload
    Sync,

    /// Retry saving one receipt to the spreadsheet
    Retry {
        /// Receipt id (a unique prefix is enough)
        id: String,
    },

    /// Run extraction again for a receipt
    Reprocess {
        /// Receipt id (a unique prefix is enough)
        id: String,
    },

    /// Delete a receipt
    Delete {
        /// Receipt id (a unique prefix is enough)
        id: String,
    },

    /// Replace a receipt's URL (local only, no extraction)
    SetUrl {
        /// Receipt id (a unique prefix is enough)
        id: String,
        /// New URL
        url: String,
    },

    /// Rewrite the address of every receipt from one store
    SetAddress {
        /// Store CNPJ as printed on the receipts
        cnpj: String,
        /// New address
        address: String,
    },

    /// Rebuild spreadsheet item rows from embedded item lists
    Migrate,

    /// Spending reports
    Report {
        #[command(subcommand)]
        report_type: ReportType,
    },

    /// Price history and statistics for one product
    Product {
        /// Product name (case and surrounding spaces are ignored)
        name: String,
    },

    /// Estimate a shopping list's cost at each known store
    Simulate {
        /// Product names
        #[arg(required = true)]
        items: Vec<String>,
    },

    /// Show or change the configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
pub enum ReportType {
    /// Spending per month
    Monthly,

    /// Item spending per category
    Categories,

    /// Spending per payer
    Payers,

    /// Spending per store
    Stores,

    /// Most purchased products with price ranges
    Products {
        /// Number of products to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Save the spreadsheet bridge URL to config.toml
    SetEndpoint {
        /// Bridge web app URL
        url: String,
    },

    /// Remove the bridge URL from config.toml (local-only mode)
    ClearEndpoint,
}
