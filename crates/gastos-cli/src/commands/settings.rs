//! Config command implementations

use anyhow::{bail, Context, Result};
use gastos_core::Config;

/// Show the effective configuration (file + environment + flags)
pub fn cmd_config_show(config: &Config, json: bool) -> Result<()> {
    if json {
        let value = serde_json::json!({
            "dataDir": config.data_dir,
            "configFile": config.config_path(),
            "endpoint": config.endpoint,
            "extractor": config.extractor,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!();
    println!("⚙️  Configuration");
    println!("   Data dir:     {}", config.data_dir.display());
    println!("   Config file:  {}", config.config_path().display());
    match &config.endpoint {
        Some(endpoint) => println!("   Bridge:       {}", endpoint),
        None => println!("   Bridge:       (none, receipts are kept in the local snapshot)"),
    }
    println!("   Extractor:    {}", config.extractor.backend);
    println!(
        "   Ollama host:  {}",
        config.extractor.host.as_deref().unwrap_or("(default)")
    );
    println!("   Text model:   {}", config.extractor.model);
    println!("   Vision model: {}", config.extractor.vision_model);
    Ok(())
}

/// Save the bridge URL to config.toml. Environment overrides are not persisted.
pub fn cmd_config_set_endpoint(config: &Config, url: &str) -> Result<()> {
    let url = url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        bail!("Bridge URL must start with http:// or https://");
    }

    let mut file_config = Config::from_file(&config.data_dir)?;
    file_config.endpoint = Some(url.to_string());
    file_config
        .save()
        .with_context(|| format!("Failed to write {}", file_config.config_path().display()))?;

    println!("✅ Bridge URL saved to {}", file_config.config_path().display());
    Ok(())
}

/// Remove the bridge URL from config.toml
pub fn cmd_config_clear_endpoint(config: &Config) -> Result<()> {
    let mut file_config = Config::from_file(&config.data_dir)?;
    if file_config.endpoint.take().is_none() {
        println!("ℹ️  No bridge URL was saved");
        return Ok(());
    }
    file_config
        .save()
        .with_context(|| format!("Failed to write {}", file_config.config_path().display()))?;
    println!("✅ Bridge URL removed; receipts will be kept in the local snapshot");
    Ok(())
}
