//! `membound config` — Configuration management commands.

use super::load_config;
use membound_config::ContextConfig;
use std::path::{Path, PathBuf};

pub fn validate(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match load_config(config_path) {
        Ok(config) => {
            println!("   ✅ Config parsed and validated");

            let mut warnings = Vec::new();
            if config.summary.max_summary_tokens > config.max_tokens / 8 {
                warnings.push(format!(
                    "summary.max_summary_tokens is capped at {} for this budget",
                    (config.max_tokens / 8).max(1)
                ));
            }
            if config.embedding.cache_capacity == 0 {
                warnings.push("embedding.cache_capacity = 0 leaves the cache unbounded".to_string());
            }
            if !config.telemetry.enabled {
                warnings.push("telemetry disabled; compare/simulate metrics will be empty".to_string());
            }

            for w in &warnings {
                println!("   ⚠️  {w}");
            }

            println!();
            println!("   Policy:     {}", config.policy);
            println!("   Budget:     {} tokens", config.max_tokens);
            println!("   Timeout:    {}ms", config.backend_timeout_ms);
            println!("   QA gate:    {}", if config.summary.qa_gate { "on" } else { "off" });
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub fn show(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

pub fn default() {
    print!("{}", ContextConfig::default_toml());
}

pub fn path(config_path: Option<&Path>) {
    println!("{}", resolve(config_path).display());
}

fn resolve(config_path: Option<&Path>) -> PathBuf {
    config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| ContextConfig::config_dir().join("config.toml"))
}
