// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration module.
//!
//! Handles loading and saving driver settings.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bluetooth::ble_constants::timing;

/// Driver configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bluetooth settings.
    pub bluetooth: BluetoothConfig,

    /// Fixed waits used by sessions.
    pub timing: TimingConfig,

    /// Dispatch loop settings.
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// BlueZ adapter name (e.g. "hci0"). Uses the default adapter when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adapter: Option<String>,

    /// Scan duration in seconds.
    pub scan_duration_secs: u8,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            adapter: None,
            scan_duration_secs: timing::DEFAULT_SCAN_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Wait after connection setup, in milliseconds.
    pub settle_ms: u64,

    /// Wait between the version query and its read-back, in milliseconds.
    pub version_query_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_ms: timing::CONNECT_SETTLE_MS,
            version_query_ms: timing::VERSION_QUERY_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Tick period in milliseconds.
    pub tick_interval_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: timing::DEFAULT_TICK_MS,
        }
    }
}

impl DispatchConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("toio-driver")
        .join("config.toml")
}

impl Config {
    /// Load configuration from the user config directory, creating the
    /// file with defaults if missing.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        if path.exists() {
            Self::load_from(&path)
        } else {
            let config = Self::default();
            config.save_to(&path)?;
            Ok(config)
        }
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;
        config.bluetooth.scan_duration_secs = config.bluetooth.scan_duration_secs.max(1);
        Ok(config)
    }

    /// Save configuration to the user config directory.
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path())
    }

    /// Save configuration to a specific file.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
