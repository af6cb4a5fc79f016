use inventory_core::{InventoryError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: i64 = 3000;
const DEFAULT_MAX_UPLOAD_BYTES: i64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_max_upload_bytes() -> usize {
    DEFAULT_MAX_UPLOAD_BYTES as usize
}

/// Photo blob storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub cache_dir: PathBuf,
}

/// Values given on the command line; they win over file and environment.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub cache_dir: Option<String>,
}

impl Config {
    pub fn load(path: Option<&str>, overrides: &CliOverrides) -> Result<Self> {
        let mut builder = ::config::Config::builder()
            .set_default("server.host", DEFAULT_HOST)
            .and_then(|b| b.set_default("server.port", DEFAULT_PORT))
            .and_then(|b| b.set_default("server.max_upload_bytes", DEFAULT_MAX_UPLOAD_BYTES))
            .map_err(config_error)?;

        if let Some(path) = path {
            builder = builder.add_source(::config::File::with_name(path));
        }

        let settings = builder
            .add_source(
                ::config::Environment::with_prefix("INVENTORY")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("server.host", overrides.host.clone())
            .and_then(|b| b.set_override_option("server.port", overrides.port.map(i64::from)))
            .and_then(|b| b.set_override_option("storage.cache_dir", overrides.cache_dir.clone()))
            .map_err(config_error)?
            .build()
            .map_err(config_error)?;

        let config: Config = settings.try_deserialize().map_err(config_error)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(InventoryError::Config("server host cannot be empty".to_string()));
        }
        if self.server.port == 0 {
            return Err(InventoryError::Config("server port cannot be 0".to_string()));
        }
        if self.storage.cache_dir.as_os_str().is_empty() {
            return Err(InventoryError::Config(
                "cache directory is required (--cache)".to_string(),
            ));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn config_error(error: ::config::ConfigError) -> InventoryError {
    InventoryError::Config(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_defaults() {
        let overrides = CliOverrides {
            host: Some("0.0.0.0".to_string()),
            port: Some(8080),
            cache_dir: Some("/tmp/inventory-cache".to_string()),
        };

        let config = Config::load(None, &overrides).unwrap();
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
        assert_eq!(config.storage.cache_dir, PathBuf::from("/tmp/inventory-cache"));
        assert_eq!(config.server.max_upload_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn test_config_file_is_layered_under_cli() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.toml");
        std::fs::write(
            &path,
            "[server]\nhost = \"10.0.0.1\"\nport = 9000\nmax_upload_bytes = 1024\n\n[storage]\ncache_dir = \"/var/cache/inventory\"\n",
        )
        .unwrap();

        let overrides = CliOverrides {
            port: Some(9100),
            ..Default::default()
        };
        let config = Config::load(path.to_str(), &overrides).unwrap();
        assert_eq!(config.server.host, "10.0.0.1");
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.max_upload_bytes, 1024);
        assert_eq!(config.storage.cache_dir, PathBuf::from("/var/cache/inventory"));
    }

    #[test]
    fn test_missing_cache_dir_is_rejected() {
        let overrides = CliOverrides {
            cache_dir: Some(String::new()),
            ..Default::default()
        };
        let error = Config::load(None, &overrides).unwrap_err();
        assert!(matches!(error, InventoryError::Config(_)));
    }
}
