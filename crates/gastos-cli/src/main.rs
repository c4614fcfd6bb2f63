//! Gastos CLI - NFC-e receipt expense tracker
//!
//! Usage:
//!   gastos add <url>              Add a receipt by URL and extract it
//!   gastos photo <file>           Add a receipt from a photo of its QR code
//!   gastos list                   List receipts
//!   gastos report monthly         Spending per month
//!   gastos simulate leite arroz   Compare a shopping list across stores

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config = commands::resolve_config(cli.data_dir.as_deref(), cli.endpoint.as_deref())?;
    let json = cli.json;

    match cli.command {
        Commands::Add { url } => commands::cmd_add(&config, &url, json).await,
        Commands::Photo { file } => commands::cmd_photo(&config, &file, json).await,
        Commands::List { status } => commands::cmd_list(&config, status.as_deref(), json).await,
        Commands::Show { id } => commands::cmd_show(&config, &id, json).await,
        Commands::Sync => commands::cmd_sync(&config).await,
        Commands::Retry { id } => commands::cmd_retry(&config, &id).await,
        Commands::Reprocess { id } => commands::cmd_reprocess(&config, &id, json).await,
        Commands::Delete { id } => commands::cmd_delete(&config, &id).await,
        Commands::SetUrl { id, url } => commands::cmd_set_url(&config, &id, &url).await,
        Commands::SetAddress { cnpj, address } => {
            commands::cmd_set_address(&config, &cnpj, &address).await
        }
        Commands::Migrate => commands::cmd_migrate(&config).await,
        Commands::Report { report_type } => match report_type {
            ReportType::Monthly => commands::cmd_report_monthly(&config, json).await,
            ReportType::Categories => commands::cmd_report_categories(&config, json).await,
            ReportType::Payers => commands::cmd_report_payers(&config, json).await,
            ReportType::Stores => commands::cmd_report_stores(&config, json).await,
            ReportType::Products { limit } => {
                commands::cmd_report_products(&config, limit, json).await
            }
        },
        Commands::Product { name } => commands::cmd_product(&config, &name, json).await,
        Commands::Simulate { items } => commands::cmd_simulate(&config, &items, json).await,
        Commands::Config { action } => match action {
            None | Some(ConfigAction::Show) => commands::cmd_config_show(&config, json),
            Some(ConfigAction::SetEndpoint { url }) => {
                commands::cmd_config_set_endpoint(&config, &url)
            }
            Some(ConfigAction::ClearEndpoint) => commands::cmd_config_clear_endpoint(&config),
        },
    }
}
