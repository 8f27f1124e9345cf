use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub static CONFIG_PATH: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("FACEGATE_CONFIG_PATH").unwrap_or("/usr/local/etc/facegate/config.toml"))
});

pub static DATA_DIR: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("FACEGATE_DATA_DIR").unwrap_or("/usr/local/etc/facegate"))
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Default verification threshold; per-call overrides take precedence.
    pub threshold: f32,
    /// Deployment-wide embedding length D.
    pub dimension: usize,
    /// Default live-scan tick rate.
    pub checks_per_second: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threshold: 0.6,
            dimension: 512,
            checks_per_second: 2.0,
        }
    }
}

pub fn identity_store_path() -> PathBuf {
    DATA_DIR.join("identities.bin")
}

pub fn credential_store_path() -> PathBuf {
    DATA_DIR.join("credentials.bin")
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}
