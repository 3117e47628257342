//! Configuration loading and schema definitions for tesults.
//!
//! This module provides types and functions for loading tesults configuration
//! from TOML files or strings. The configuration schema defines the results
//! service endpoints and the artifact upload settings.

pub mod schema;

pub use schema::*;

use std::path::Path;

use anyhow::{Context, Result};

/// Loads tesults configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if:
/// - The file cannot be read (e.g., doesn't exist or permission denied)
/// - The file contains invalid TOML syntax
/// - The configuration doesn't match the expected schema
///
/// # Example
///
/// ```no_run
/// use tesults::config::load_config;
/// use std::path::Path;
///
/// let config = load_config(Path::new("tesults.toml"))?;
/// println!("Bucket: {}", config.upload.bucket);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    Ok(config)
}

/// Loads configuration from `path` if it exists, otherwise returns defaults.
///
/// A file that exists but fails to parse is still an error.
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::default())
    }
}

/// Loads tesults configuration from a TOML string.
///
/// # Example
///
/// ```
/// use tesults::config::load_config_str;
///
/// let config = load_config_str(r#"
///     [service]
///     base_url = "http://localhost:8080"
/// "#)?;
///
/// assert_eq!(config.service.results_url(), "http://localhost:8080/results");
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config_str(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config")?;

    Ok(config)
}
