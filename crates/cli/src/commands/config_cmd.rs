//! `freshmate config`: Show, locate and validate the configuration.

use freshmate_config::AppConfig;

/// Print the effective configuration with secrets redacted.
pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    println!("{}", config.to_display_toml()?);
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", config_path().display());
    Ok(())
}

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   Config parsed successfully");

    let warnings = warnings(&config);
    if warnings.is_empty() {
        println!("   All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   warning: {w}");
        }
    }

    println!();
    println!("   Inventory: {}", config.inventory.full_base_url());
    println!("   Recipes:   {}", config.recipes.base_url);
    println!("   Model:     {} @ {}", config.model.model, config.model.base_url);
    println!("   Gateway:   {}:{}", config.gateway.host, config.gateway.port);
    println!("   History:   {:?}", config.history.backend);
    Ok(())
}

/// Settings that load fine but will fail or surprise at runtime.
fn warnings(config: &AppConfig) -> Vec<&'static str> {
    let mut warnings = Vec::new();
    if config.model.api_key.is_none() {
        warnings.push("No model API key set (FRESHMATE_MODEL_API_KEY)");
    }
    if config.recipes.api_key.is_none() {
        warnings.push("No recipe service key set (FRESHMATE_RECIPES_API_KEY); the caller's token is sent instead");
    }
    if config.gateway.host == "0.0.0.0" {
        warnings.push("Gateway bound to 0.0.0.0");
    }
    warnings
}

fn config_path() -> std::path::PathBuf {
    AppConfig::config_dir().join("config.toml")
}
