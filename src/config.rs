use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Result, Context, bail};
use log::{info, warn, error};

use crate::fragment::ChunkSize;
use crate::quality::{QualityProfile, QualityTier};
use crate::transmitter::TransmitterConfig;

/// Device name used when no locator is configured
pub const DEFAULT_DEVICE: &str = "loopback-tx";

/// Persistent application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub audio: AudioSettings,
    pub transmission: TransmissionSettings,
    pub reception: ReceptionSettings,
    pub device: DeviceSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSettings {
    pub quality: QualityTier,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransmissionSettings {
    pub chunk_size: ChunkSize,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub chunk_interval_ms: u64,
    pub cancel_poll_ms: u64,
    pub prefer_vocoder: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceptionSettings {
    pub session_timeout_secs: u64,
    pub reap_interval_secs: u64,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Serial port or host of the radio; `loopback` attaches its sender under this name
    pub locator: Option<String>,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            quality: QualityTier::Low,
        }
    }
}

impl Default for TransmissionSettings {
    fn default() -> Self {
        Self {
            chunk_size: ChunkSize::Medium,
            max_attempts: 3,
            retry_delay_ms: 1000,
            chunk_interval_ms: 1000,
            cancel_poll_ms: 50,
            prefer_vocoder: true,
        }
    }
}

impl Default for ReceptionSettings {
    fn default() -> Self {
        Self {
            session_timeout_secs: 180,
            reap_interval_secs: 30,
            output_dir: PathBuf::from("voice_messages"),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if self.transmission.max_attempts == 0 {
            bail!("transmission.max_attempts must be at least 1");
        }
        if self.transmission.cancel_poll_ms == 0 {
            bail!("transmission.cancel_poll_ms must be positive");
        }
        if self.reception.session_timeout_secs == 0 {
            bail!("reception.session_timeout_secs must be positive");
        }
        if self.reception.reap_interval_secs == 0 {
            bail!("reception.reap_interval_secs must be positive");
        }
        Ok(())
    }

    pub fn quality_profile(&self) -> QualityProfile {
        self.audio.quality.profile()
    }

    pub fn chunk_budget(&self) -> usize {
        self.transmission.chunk_size.budget()
    }

    pub fn to_transmitter_config(&self) -> TransmitterConfig {
        TransmitterConfig {
            max_attempts: self.transmission.max_attempts,
            retry_delay: Duration::from_millis(self.transmission.retry_delay_ms),
            chunk_interval: Duration::from_millis(self.transmission.chunk_interval_ms),
            cancel_poll: Duration::from_millis(self.transmission.cancel_poll_ms),
            ..TransmitterConfig::default()
        }
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.reception.session_timeout_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reception.reap_interval_secs)
    }

    /// Device the transmitting node opens
    pub fn device_locator(&self) -> &str {
        match self.device.locator.as_deref() {
            Some(locator) if !locator.trim().is_empty() => locator,
            _ => DEFAULT_DEVICE,
        }
    }
}

pub struct ConfigManager {
    config_path: PathBuf,
    config: AppConfig,
}

impl ConfigManager {
    pub fn with_config(config: AppConfig) -> Self {
        Self {
            config_path: PathBuf::from("meshvoice.toml"),
            config,
        }
    }

    pub fn new() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        Self::at_path(config_path)
    }

    /// Load (or create) the configuration at an explicit location
    pub fn at_path<P: Into<PathBuf>>(config_path: P) -> Result<Self> {
        let config_path = config_path.into();
        let config = Self::load_or_create_config(&config_path)?;
        config.validate().context("Invalid configuration")?;

        Ok(Self {
            config_path,
            config,
        })
    }

    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    pub fn update_config(&mut self, config: AppConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        self.save_config()
    }

    pub fn save_config(&self) -> Result<()> {
        Self::save_config_to_path(&self.config, &self.config_path)?;
        info!("Configuration saved to: {:?}", self.config_path);
        Ok(())
    }

    fn load_or_create_config(config_path: &Path) -> Result<AppConfig> {
        if config_path.exists() {
            info!("Loading configuration from: {:?}", config_path);
            let config_str = fs::read_to_string(config_path)
                .context("Failed to read configuration file")?;

            match toml::from_str::<AppConfig>(&config_str) {
                Ok(config) => {
                    info!("Configuration loaded successfully");
                    Ok(config)
                }
                Err(e) => {
                    warn!("Failed to parse configuration file: {}. Using defaults.", e);
                    let default_config = AppConfig::default();
                    if let Err(save_err) = Self::save_config_to_path(&default_config, config_path) {
                        error!("Failed to save default configuration: {}", save_err);
                    }
                    Ok(default_config)
                }
            }
        } else {
            info!("No configuration file found. Creating default configuration.");
            let default_config = AppConfig::default();
            Self::save_config_to_path(&default_config, config_path)?;
            Ok(default_config)
        }
    }

    fn save_config_to_path(config: &AppConfig, path: &Path) -> Result<()> {
        let config_str = toml::to_string_pretty(config)
            .context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        fs::write(path, config_str)
            .context("Failed to write configuration file")?;
        Ok(())
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("meshvoice")
        } else {
            let home_dir = dirs::home_dir()
                .context("Could not determine home directory")?;
            home_dir.join(".meshvoice")
        };

        Ok(config_dir.join("config.toml"))
    }
}
