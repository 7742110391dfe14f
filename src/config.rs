//! Volume build configuration

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::FatblockError;

/// Descriptors kept open by default while serving reads.
pub const DEFAULT_DESCRIPTOR_CACHE_SIZE: usize = 4;
pub const DEFAULT_CLUSTER_SIZE: u32 = 4096;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FatblockConfig {
    /// Bytes per cluster. Power of two between 512 and 32768.
    pub cluster_size: u32,
    /// Maximum number of backing files held open at once.
    pub descriptor_cache_size: usize,
    /// Volume label written into the boot sector (at most 11 bytes).
    pub volume_label: String,
    /// Volume serial number. Fixed by default so identical trees give identical images.
    pub volume_id: u32,
    /// OEM name in the boot sector (at most 8 bytes).
    pub oem_name: String,
}

impl Default for FatblockConfig {
    fn default() -> Self {
        Self {
            cluster_size: DEFAULT_CLUSTER_SIZE,
            descriptor_cache_size: DEFAULT_DESCRIPTOR_CACHE_SIZE,
            volume_label: "NO NAME".to_string(),
            volume_id: 0x4641_5442,
            oem_name: "FATBLOCK".to_string(),
        }
    }
}

impl FatblockConfig {
    /// Per-user directory holding fatblock settings, if the platform has one.
    pub fn user_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("fatblock"))
    }

    /// `config.json` inside [`Self::user_config_dir`].
    pub fn user_config_path() -> Option<PathBuf> {
        Self::user_config_dir().map(|dir| dir.join("config.json"))
    }

    /// Load configuration from the user config directory, then the current
    /// directory, falling back to defaults.
    pub fn load() -> Self {
        if let Some(user_config) = Self::user_config_path() {
            if let Ok(config) = Self::load_from_path(&user_config) {
                return config;
            }
        }

        if let Ok(config) = Self::load_from_path("fatblock.json") {
            return config;
        }

        Self::default()
    }

    /// Load and validate a configuration file.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: FatblockConfig = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> std::result::Result<(), FatblockError> {
        if !self.cluster_size.is_power_of_two() || !(512..=32768).contains(&self.cluster_size) {
            return Err(FatblockError::InvalidConfig(format!(
                "cluster_size must be a power of two between 512 and 32768, got {}",
                self.cluster_size
            )));
        }
        if self.descriptor_cache_size == 0 {
            return Err(FatblockError::InvalidConfig(
                "descriptor_cache_size must be at least 1".into(),
            ));
        }
        if self.volume_label.len() > 11 || !self.volume_label.is_ascii() {
            return Err(FatblockError::InvalidConfig(format!(
                "volume_label must be at most 11 ASCII bytes: {:?}",
                self.volume_label
            )));
        }
        if self.oem_name.len() > 8 || !self.oem_name.is_ascii() {
            return Err(FatblockError::InvalidConfig(format!(
                "oem_name must be at most 8 ASCII bytes: {:?}",
                self.oem_name
            )));
        }
        Ok(())
    }

    /// Volume label as the space-padded, uppercase 11-byte boot sector field.
    pub fn label_bytes(&self) -> [u8; 11] {
        pad_field(&self.volume_label.to_ascii_uppercase())
    }

    pub fn oem_bytes(&self) -> [u8; 8] {
        pad_field(&self.oem_name)
    }
}

fn pad_field<const N: usize>(value: &str) -> [u8; N] {
    let mut field = [b' '; N];
    for (dst, src) in field.iter_mut().zip(value.bytes()) {
        *dst = src;
    }
    field
}
