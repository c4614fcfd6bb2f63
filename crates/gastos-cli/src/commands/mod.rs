//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Shared utilities (config resolution, opening the receipt store)
//! - `receipts` - Receipt commands (add, photo, list, show, edit, delete, sync)
//! - `reports` - Analytics commands (reports, product history, shopping list)
//! - `settings` - Config commands (show, set-endpoint, clear-endpoint)

pub mod core;
pub mod receipts;
pub mod reports;
pub mod settings;

// Re-export command functions for main.rs
pub use self::core::*;
pub use receipts::*;
pub use reports::*;
pub use settings::*;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Format an amount in reais: `R$ 1234,50`
pub fn brl(amount: f64) -> String {
    format!("R$ {:.2}", amount).replace('.', ",")
}
