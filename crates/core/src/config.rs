//! Configuration management for Latch clients

use crate::error::{CoreError, CoreResult};
use crate::persist::PersistConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix for overrides, e.g. `LATCH_BASE_URL`
pub const ENV_PREFIX: &str = "LATCH";

/// Main client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatchConfig {
    /// Base URL every request is resolved against
    pub base_url: String,

    /// Request timeout in seconds (0 disables the timeout)
    pub timeout_secs: u64,

    /// User agent sent with every request
    pub user_agent: Option<String>,

    /// How long a cached query result is served without refetching
    pub keep_unused_data_for_secs: u64,

    /// State persistence settings
    pub persist: PersistConfig,

    /// Directory holding persisted state
    pub state_dir: Option<PathBuf>,
}

impl Default for LatchConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_secs: 30,
            user_agent: None,
            keep_unused_data_for_secs: 60,
            persist: PersistConfig::default(),
            state_dir: None,
        }
    }
}

impl LatchConfig {
    /// Load configuration from an optional file, with defaults and
    /// `LATCH_`-prefixed environment overrides (`__` separates nested keys)
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a value cannot be parsed
    pub fn load(path: Option<&Path>) -> CoreResult<Self> {
        let defaults = Self::default();

        let mut builder = config::Config::builder()
            .set_default("base_url", defaults.base_url)?
            .set_default("timeout_secs", defaults.timeout_secs)?
            .set_default(
                "keep_unused_data_for_secs",
                defaults.keep_unused_data_for_secs,
            )?
            .set_default("persist.key", defaults.persist.key)?
            .set_default("persist.allow_list", defaults.persist.allow_list)?
            .set_default("persist.version", i64::from(defaults.persist.version))?;

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("persist.allow_list")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] describing the first problem found
    pub fn validate(&self) -> CoreResult<()> {
        if self.base_url.trim().is_empty() {
            return Err(CoreError::invalid_config("base_url must not be empty"));
        }
        if self.persist.key.trim().is_empty() {
            return Err(CoreError::invalid_config("persist.key must not be empty"));
        }
        Ok(())
    }

    /// Directory for persisted state, falling back to the platform data dir
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(crate::persist::FileStorage::default_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = LatchConfig::default();
        assert_eq!(config.persist.key, "root");
        assert_eq!(config.persist.allow_list, vec!["auth".to_string()]);
        assert_eq!(config.keep_unused_data_for_secs, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            r#"
base_url = "https://api.example.com"
timeout_secs = 5

[persist]
key = "app"
allow_list = ["auth", "user"]
"#
        )
        .unwrap();

        let config = LatchConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.base_url, "https://api.example.com");
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.persist.key, "app");
        assert_eq!(config.persist.allow_list, vec!["auth", "user"]);
        assert_eq!(config.persist.version, 1);
        assert_eq!(config.keep_unused_data_for_secs, 60);
    }

    #[test]
    fn test_empty_base_url_is_rejected() {
        let config = LatchConfig {
            base_url: "  ".to_string(),
            ..LatchConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CoreError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_environment_overrides() {
        // Values match test_load_from_file, which may run concurrently
        unsafe {
            std::env::set_var("LATCH_USER_AGENT", "latch-env-test");
            std::env::set_var("LATCH_PERSIST__ALLOW_LIST", "auth,user");
        }

        let config = LatchConfig::load(None).unwrap();

        unsafe {
            std::env::remove_var("LATCH_USER_AGENT");
            std::env::remove_var("LATCH_PERSIST__ALLOW_LIST");
        }

        assert_eq!(config.user_agent.as_deref(), Some("latch-env-test"));
        assert_eq!(config.persist.allow_list, vec!["auth", "user"]);
        assert_eq!(config.persist.key, "root");
    }

    #[test]
    fn test_state_dir_falls_back_to_data_dir() {
        let config = LatchConfig::default();
        assert_eq!(config.state_dir(), crate::persist::FileStorage::default_dir());

        let config = LatchConfig {
            state_dir: Some(PathBuf::from("/tmp/latch-state")),
            ..LatchConfig::default()
        };
        assert_eq!(config.state_dir(), PathBuf::from("/tmp/latch-state"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = LatchConfig::load(Some(Path::new("/nonexistent/latch.toml")));
        assert!(result.is_err());
    }
}
