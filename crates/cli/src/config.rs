//! CLI configuration utilities

use anyhow::Result;
use latch_core::LatchConfig;
use std::path::{Path, PathBuf};

/// Default configuration file inside the state directory
pub fn default_config_path(state_dir: &Path) -> PathBuf {
    state_dir.join("latch.json")
}

/// Load configuration, preferring an explicit file over the default one
pub fn load_config(explicit: Option<&Path>, default_file: &Path) -> Result<LatchConfig> {
    let path = match explicit {
        Some(path) => Some(path),
        None if default_file.exists() => Some(default_file),
        None => None,
    };
    Ok(LatchConfig::load(path)?)
}

/// Save configuration to a JSON file
pub fn save_config<P: AsRef<Path>>(config: &LatchConfig, path: P) -> Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Generate a default configuration file
pub fn generate_default_config<P: AsRef<Path>>(path: P) -> Result<()> {
    save_config(&LatchConfig::default(), path)
}
