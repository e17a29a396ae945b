//! # Node Settings
//!
//! Resolved in three layers, later wins:
//!
//! 1. built-in defaults (`bftx_protocol::config`)
//! 2. the TOML settings file, if any
//! 3. command-line flags and their `BFTX_*` environment fallbacks
//!
//! ```toml
//! data_dir = "/var/lib/bftx"
//! api_port = 12345
//! log_format = "json"
//! local_engine = false
//!
//! [gateway]
//! rpc_url = "http://127.0.0.1:26657"
//! request_timeout_ms = 10000
//! read_retries = 2
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use bftx_protocol::config::{DB_DIR, DEFAULT_API_PORT, KEM_KEY_DIR, SIGNING_KEY_FILE};
use bftx_protocol::GatewayConfig;

use crate::cli::BftxCli;
use crate::logging::LogFormat;

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    data_dir: Option<PathBuf>,
    api_port: Option<u16>,
    log_format: Option<LogFormat>,
    local_engine: Option<bool>,
    gateway: Option<GatewayConfig>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub api_port: u16,
    pub log_format: LogFormat,
    pub local_engine: bool,
    pub gateway: GatewayConfig,
}

impl Settings {
    pub fn resolve(cli: &BftxCli) -> Result<Self> {
        let probe_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
        let file = match &cli.config {
            Some(path) => read_file(path)?,
            None => {
                let implicit = probe_dir.join(CONFIG_FILE);
                if implicit.exists() {
                    read_file(&implicit)?
                } else {
                    FileSettings::default()
                }
            }
        };
        Ok(Self::layer(cli, file))
    }

    fn layer(cli: &BftxCli, file: FileSettings) -> Self {
        let mut gateway = file.gateway.unwrap_or_default();
        if let Some(url) = &cli.rpc_url {
            gateway.rpc_url = url.clone();
        }
        Self {
            data_dir: cli
                .data_dir
                .clone()
                .or(file.data_dir)
                .unwrap_or_else(default_data_dir),
            api_port: file.api_port.unwrap_or(DEFAULT_API_PORT),
            log_format: cli.log_format.or(file.log_format).unwrap_or_default(),
            local_engine: cli.local_engine || file.local_engine.unwrap_or(false),
            gateway,
        }
    }

    pub fn signing_key_path(&self) -> PathBuf {
        self.data_dir.join(SIGNING_KEY_FILE)
    }

    pub fn kem_key_dir(&self) -> PathBuf {
        self.data_dir.join(KEM_KEY_DIR)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_DIR)
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".bftx")
}

fn read_file(path: &Path) -> Result<FileSettings> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read settings file {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("invalid settings file {}", path.display()))
}
