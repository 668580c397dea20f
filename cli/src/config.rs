// Configuration management for rime-cli
//
// Cross-platform config stored in:
// - macOS: ~/Library/Application Support/rime/config.json
// - Linux: ~/.config/rime/config.json
// - Windows: %APPDATA%\rime\config.json

use anyhow::{Context, Result};
use rime_core::ClientConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Session store location; defaults to the platform data directory
    pub storage_path: Option<String>,

    /// Withdrawal client settings
    pub client: ClientConfig,
}

impl Config {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("rime");

        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir)
    }

    /// Get the data directory path (cross-platform)
    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .context("Failed to determine data directory")?
            .join("rime");

        std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;

        Ok(data_dir)
    }

    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Where the session store lives.
    pub fn storage_path(&self) -> Result<PathBuf> {
        match &self.storage_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => Ok(Self::data_dir()?.join("sessions")),
        }
    }

    /// Load config from the default location, creating it on first use
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file()?)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
            let config: Config =
                serde_json::from_str(&contents).context("Failed to parse config file")?;
            config
                .client
                .validate()
                .context("Config file holds invalid client settings")?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Replace the relay failover list. Order is preserved, duplicates dropped.
    pub fn set_relays(&mut self, relays: Vec<String>) {
        let mut unique = Vec::with_capacity(relays.len());
        for relay in relays {
            let relay = relay.trim_end_matches('/').to_string();
            if !relay.is_empty() && !unique.contains(&relay) {
                unique.push(relay);
            }
        }
        self.client.relays = unique;
    }

    /// List all config values
    pub fn list(&self) -> Vec<(String, String)> {
        let client = &self.client;
        let timeouts = &client.timeouts;
        vec![
            (
                "storage_path".to_string(),
                self.storage_path.clone().unwrap_or_else(|| "(auto)".to_string()),
            ),
            ("relays".to_string(), client.relays.join(", ")),
            ("epoch_length".to_string(), format!("{}s", client.epoch_length)),
            ("anonset_size".to_string(), client.anonset_size.to_string()),
            ("decrypt_bound".to_string(), client.decrypt_bound.to_string()),
            (
                "min_epoch_headroom".to_string(),
                format!("{}s", client.min_epoch_headroom_secs),
            ),
            ("fee_divisor".to_string(), client.fee_divisor.to_string()),
            (
                "relay_request_timeout".to_string(),
                format!("{}s", client.relay_request_timeout_secs),
            ),
            ("revert_grace".to_string(), format!("{}s", timeouts.revert_grace_secs)),
            ("expiry_grace".to_string(), format!("{}s", timeouts.expiry_grace_secs)),
            (
                "no_response_grace".to_string(),
                format!("{}s", timeouts.no_response_grace_secs),
            ),
            ("event_watch".to_string(), format!("{}s", timeouts.event_watch_secs)),
            (
                "radio_silence".to_string(),
                format!("{}s", timeouts.radio_silence_secs),
            ),
        ]
    }
}
