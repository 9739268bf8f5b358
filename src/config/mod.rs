//! Configuration file management
//!
//! Loads TOML configuration files and provides discovery settings.
//! Default config path: ~/.config/modeset/config.toml

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::kms::{DiscoveryOptions, PixelFormat};

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Device settings
    pub device: DeviceConfig,
    /// Framebuffer pixel format
    pub framebuffer: FramebufferConfig,
    /// Discovery pass settings
    pub discovery: DiscoveryConfig,
    /// What to do with the provisioned displays
    pub session: SessionConfig,
}

/// Device settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// DRM device node
    pub path: String,
    /// Re-probe connectors on query (slower, but sees freshly plugged monitors)
    pub force_probe: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            path: "/dev/dri/card0".to_string(),
            force_probe: true,
        }
    }
}

/// Framebuffer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FramebufferConfig {
    /// Bits per pixel (multiple of 8)
    pub bpp: u32,
    /// Color depth
    pub depth: u32,
}

impl Default for FramebufferConfig {
    fn default() -> Self {
        let format = PixelFormat::default();
        Self {
            bpp: format.bpp,
            depth: format.depth,
        }
    }
}

impl FramebufferConfig {
    /// Pixel format, falling back to XRGB8888 on nonsense values
    pub fn pixel_format(&self) -> PixelFormat {
        if self.bpp == 0 || self.bpp % 8 != 0 || self.depth == 0 || self.depth > self.bpp {
            warn!(
                "Invalid framebuffer format bpp={} depth={}, using default",
                self.bpp, self.depth
            );
            return PixelFormat::default();
        }
        PixelFormat {
            bpp: self.bpp,
            depth: self.depth,
        }
    }
}

/// Discovery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// How often to re-read the resource table when it changes mid-query
    pub max_catalog_retries: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_catalog_retries: crate::kms::catalog::DEFAULT_MAX_CATALOG_RETRIES,
        }
    }
}

/// Session settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Program every provisioned CRTC with its framebuffer
    pub activate: bool,
    /// Seconds to keep the modes up before teardown
    pub hold_seconds: u64,
}

impl Config {
    /// System-wide config path
    const SYSTEM_CONFIG_PATH: &'static str = "/etc/modeset/config.toml";

    /// Get the path that would be used for loading config
    /// Returns None if using built-in defaults
    pub fn config_path() -> Option<PathBuf> {
        // 1. MODESET_CONFIG environment variable
        if let Ok(path) = std::env::var("MODESET_CONFIG") {
            let p = std::path::Path::new(&path);
            if p.exists() {
                return Some(p.to_path_buf());
            }
        }

        // 2. User config: ~/.config/modeset/config.toml
        if let Some(config_path) = default_config_path() {
            if config_path.exists() {
                return Some(config_path);
            }
        }

        // 3. System config: /etc/modeset/config.toml
        let system_config = std::path::Path::new(Self::SYSTEM_CONFIG_PATH);
        if system_config.exists() {
            return Some(system_config.to_path_buf());
        }

        None
    }

    /// Load configuration with priority:
    /// 1. MODESET_CONFIG environment variable
    /// 2. ~/.config/modeset/config.toml (user config)
    /// 3. /etc/modeset/config.toml (system config)
    /// 4. Built-in defaults
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            match Self::load_from_file(path.to_string_lossy().as_ref()) {
                Ok(config) => {
                    info!("Loaded config: {}", path.display());
                    return config;
                }
                Err(e) => {
                    warn!("Failed to load config {}: {:#}", path.display(), e);
                }
            }
        }
        info!("Using built-in default config");
        Self::default()
    }

    /// Load settings from specified path
    fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        Self::parse(&content).with_context(|| format!("Failed to parse config file: {}", path))
    }

    fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Options for the discovery pass
    pub fn discovery_options(&self) -> DiscoveryOptions {
        DiscoveryOptions {
            max_catalog_retries: self.discovery.max_catalog_retries,
            format: self.framebuffer.pixel_format(),
        }
    }
}

/// Get default config file path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("modeset").join("config.toml"))
}
