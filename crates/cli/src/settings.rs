//! Layered configuration: defaults, TOML file, `FILECHAIN_*` environment,
//! then command-line flags.

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File as ConfigFile};
use filechain_auth::DEFAULT_CHALLENGE_TTL_SECS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "filechain.toml";
const DEFAULT_API_KEY: &str = "filechain-local";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,
    pub challenge_ttl_secs: u64,
    pub log_level: String,
    pub log_format: String,
}

/// Values given on the command line. They win over every other source.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub data_dir: Option<PathBuf>,
    pub api_key: Option<String>,
    pub key_file: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl AppConfig {
    pub fn default_data_dir() -> PathBuf {
        dirs::home_dir()
            .map(|home| home.join(".filechain"))
            .unwrap_or_else(|| PathBuf::from(".filechain"))
    }

    pub fn load(config_path: Option<&Path>, overrides: Overrides) -> Result<Self> {
        let data_dir = overrides
            .data_dir
            .clone()
            .or_else(|| std::env::var_os("FILECHAIN_DATA_DIR").map(PathBuf::from))
            .unwrap_or_else(Self::default_data_dir);

        let resolved_path = match config_path {
            Some(path) => {
                if !path.exists() {
                    bail!(
                        "Configuration file {} not found (specified via --config)",
                        path.display()
                    );
                }
                Some(path.to_path_buf())
            }
            None => {
                let path = data_dir.join(CONFIG_FILE_NAME);
                path.exists().then_some(path)
            }
        };

        let mut builder = Config::builder()
            .set_default("data_dir", data_dir.to_string_lossy().into_owned())?
            .set_default("api_key", DEFAULT_API_KEY)?
            .set_default("challenge_ttl_secs", DEFAULT_CHALLENGE_TTL_SECS)?
            .set_default("log_level", "info")?
            .set_default("log_format", "pretty")?;

        if let Some(path) = &resolved_path {
            builder = builder.add_source(ConfigFile::from(path.as_path()));
        }
        builder = builder.add_source(Environment::with_prefix("FILECHAIN").try_parsing(true));

        let mut config: AppConfig = builder
            .build()?
            .try_deserialize()
            .context("invalid filechain configuration")?;

        if let Some(data_dir) = overrides.data_dir {
            config.data_dir = data_dir;
        }
        if let Some(api_key) = overrides.api_key {
            config.api_key = api_key;
        }
        if let Some(key_file) = overrides.key_file {
            config.key_file = Some(key_file);
        }
        if let Some(log_level) = overrides.log_level {
            config.log_level = log_level;
        }
        Ok(config)
    }

    pub fn key_file_path(&self) -> PathBuf {
        self.key_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("wallet.json"))
    }

    pub fn registry_path(&self) -> PathBuf {
        self.data_dir.join("registry.json")
    }

    pub fn store_dir(&self) -> PathBuf {
        self.data_dir.join("store")
    }
}
