//! Host configuration management

use crate::usb::{NegotiationSettings, SessionSettings};
use anyhow::{Context, Result, anyhow};
use clap::ValueEnum;
use common::MAX_TIMEOUT;
use protocol::descriptor::MIN_DESCRIPTOR_BUFFER;
use protocol::{
    ACCESSORY_PRODUCT_ID, AccessoryIdentification, DEFAULT_PRODUCT_ID, GOOGLE_VENDOR_ID,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub host: HostSettings,
    #[serde(default)]
    pub device: DeviceSettings,
    /// Identification strings sent during the handshake
    #[serde(default)]
    pub accessory: AccessoryIdentification,
    #[serde(default)]
    pub negotiation: NegotiationConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostSettings {
    pub log_level: String,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// USB ids, written as hex strings such as "0x18d1"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSettings {
    #[serde(default = "DeviceSettings::default_vendor_id")]
    pub vendor_id: String,
    /// Product id of the device before the handshake
    #[serde(default = "DeviceSettings::default_product_id")]
    pub product_id: String,
    /// Product id the device re-enumerates under ("0x2d01" with ADB)
    #[serde(default = "DeviceSettings::default_accessory_product_id")]
    pub accessory_product_id: String,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            vendor_id: Self::default_vendor_id(),
            product_id: Self::default_product_id(),
            accessory_product_id: Self::default_accessory_product_id(),
        }
    }
}

impl DeviceSettings {
    fn default_vendor_id() -> String {
        format_hex_id(GOOGLE_VENDOR_ID)
    }

    fn default_product_id() -> String {
        format_hex_id(DEFAULT_PRODUCT_ID)
    }

    fn default_accessory_product_id() -> String {
        format_hex_id(ACCESSORY_PRODUCT_ID)
    }

    pub fn vendor_id(&self) -> Result<u16> {
        parse_hex_id(&self.vendor_id, "vendor_id")
    }

    pub fn product_id(&self) -> Result<u16> {
        parse_hex_id(&self.product_id, "product_id")
    }

    pub fn accessory_product_id(&self) -> Result<u16> {
        parse_hex_id(&self.accessory_product_id, "accessory_product_id")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationConfig {
    /// Pause after the version query, in milliseconds
    #[serde(default = "NegotiationConfig::default_settle_delay")]
    pub settle_delay_ms: u64,
    #[serde(default = "NegotiationConfig::default_attempts")]
    pub reenumeration_attempts: u32,
    #[serde(default = "NegotiationConfig::default_interval")]
    pub reenumeration_interval_ms: u64,
    /// Control transfer timeout (0 = none)
    #[serde(default)]
    pub control_timeout_ms: u64,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: Self::default_settle_delay(),
            reenumeration_attempts: Self::default_attempts(),
            reenumeration_interval_ms: Self::default_interval(),
            control_timeout_ms: 0,
        }
    }
}

impl NegotiationConfig {
    fn default_settle_delay() -> u64 {
        1
    }

    fn default_attempts() -> u32 {
        5
    }

    fn default_interval() -> u64 {
        1000
    }
}

/// What to do once the accessory is up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Short read followed by a long read
    #[default]
    Diagnostic,
    /// Write a counting pattern and read it back
    Loopback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub mode: SessionMode,
    /// Bulk transfer timeout (0 = block until the transfer completes)
    #[serde(default)]
    pub read_timeout_ms: u64,
    /// Overall bound on the transfer session
    #[serde(default)]
    pub deadline_secs: Option<u64>,
    #[serde(default = "SessionConfig::default_short_read")]
    pub short_read_len: usize,
    #[serde(default = "SessionConfig::default_long_read")]
    pub long_read_len: usize,
    #[serde(default = "SessionConfig::default_loopback_len")]
    pub loopback_packet_len: usize,
    #[serde(default = "SessionConfig::default_loopback_timeout")]
    pub loopback_timeout_ms: u64,
    #[serde(default = "SessionConfig::default_descriptor_buffer")]
    pub descriptor_buffer_len: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: SessionMode::default(),
            read_timeout_ms: 0,
            deadline_secs: None,
            short_read_len: Self::default_short_read(),
            long_read_len: Self::default_long_read(),
            loopback_packet_len: Self::default_loopback_len(),
            loopback_timeout_ms: Self::default_loopback_timeout(),
            descriptor_buffer_len: Self::default_descriptor_buffer(),
        }
    }
}

impl SessionConfig {
    fn default_short_read() -> usize {
        16 * 1024
    }

    fn default_long_read() -> usize {
        500_000
    }

    fn default_loopback_len() -> usize {
        64
    }

    fn default_loopback_timeout() -> u64 {
        5000
    }

    fn default_descriptor_buffer() -> usize {
        256
    }
}

impl HostConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            // Try standard locations in order
            let candidates = vec![Self::default_path(), PathBuf::from("/etc/adk-host/host.toml")];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: HostConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!("{}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("adk-host").join("host.toml")
        } else {
            PathBuf::from(".config/adk-host/host.toml")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.host.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.host.log_level,
                valid_levels.join(", ")
            ));
        }

        self.device.vendor_id()?;
        self.device.product_id()?;
        self.device.accessory_product_id()?;

        self.accessory
            .validate()
            .context("Invalid [accessory] section")?;

        if self.negotiation.reenumeration_attempts == 0 {
            return Err(anyhow!("reenumeration_attempts must be at least 1"));
        }

        let session = &self.session;
        if session.descriptor_buffer_len < MIN_DESCRIPTOR_BUFFER {
            return Err(anyhow!(
                "descriptor_buffer_len {} is below the minimum of {} bytes",
                session.descriptor_buffer_len,
                MIN_DESCRIPTOR_BUFFER
            ));
        }
        for (name, len) in [
            ("short_read_len", session.short_read_len),
            ("long_read_len", session.long_read_len),
            ("loopback_packet_len", session.loopback_packet_len),
        ] {
            if len == 0 {
                return Err(anyhow!("{} must be greater than 0", name));
            }
        }

        // libusb takes milliseconds as a u32; larger values would wrap
        let max_timeout_ms = MAX_TIMEOUT.as_millis() as u64;
        for (name, ms) in [
            ("control_timeout_ms", self.negotiation.control_timeout_ms),
            ("read_timeout_ms", session.read_timeout_ms),
            ("loopback_timeout_ms", session.loopback_timeout_ms),
        ] {
            if ms > max_timeout_ms {
                return Err(anyhow!(
                    "{} {} exceeds the maximum of {} ms",
                    name,
                    ms,
                    max_timeout_ms
                ));
            }
        }

        Ok(())
    }

    /// Handshake settings, with ids parsed
    pub fn negotiation_settings(&self) -> Result<NegotiationSettings> {
        Ok(NegotiationSettings {
            vendor_id: self.device.vendor_id()?,
            accessory_product_id: self.device.accessory_product_id()?,
            settle_delay: Duration::from_millis(self.negotiation.settle_delay_ms),
            reenumeration_attempts: self.negotiation.reenumeration_attempts,
            reenumeration_interval: Duration::from_millis(
                self.negotiation.reenumeration_interval_ms,
            ),
            control_timeout: Duration::from_millis(self.negotiation.control_timeout_ms),
        })
    }

    pub fn session_settings(&self) -> SessionSettings {
        let s = &self.session;
        SessionSettings {
            transfer_timeout: (s.read_timeout_ms > 0)
                .then(|| Duration::from_millis(s.read_timeout_ms)),
            deadline: s.deadline_secs.map(Duration::from_secs),
            short_read_len: s.short_read_len,
            long_read_len: s.long_read_len,
            loopback_packet_len: s.loopback_packet_len,
            loopback_timeout: Duration::from_millis(s.loopback_timeout_ms),
        }
    }
}

/// Parse a "0x"-prefixed hex USB id
pub fn parse_hex_id(id: &str, name: &str) -> Result<u16> {
    let hex_part = id
        .strip_prefix("0x")
        .or_else(|| id.strip_prefix("0X"))
        .ok_or_else(|| {
            anyhow!(
                "Invalid {} '{}', must start with '0x' (e.g., '0x18d1')",
                name,
                id
            )
        })?;

    if hex_part.is_empty() || hex_part.len() > 4 {
        return Err(anyhow!(
            "Invalid {} '{}', hex part must be 1-4 digits",
            name,
            id
        ));
    }

    u16::from_str_radix(hex_part, 16)
        .map_err(|_| anyhow!("Invalid {} '{}', not a valid hex number", name, id))
}

pub fn format_hex_id(id: u16) -> String {
    format!("{:#06x}", id)
}

/// Load a configuration file, expanding `~` in the path
pub fn load_config(path: &str) -> Result<HostConfig> {
    let path_buf = PathBuf::from(shellexpand::tilde(path).as_ref());
    HostConfig::load(Some(path_buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HostConfig::default();
        assert_eq!(config.host.log_level, "info");
        assert_eq!(config.device.vendor_id, "0x18d1");
        assert_eq!(config.device.product_id, "0x4e21");
        assert_eq!(config.device.accessory_product_id, "0x2d00");
        assert_eq!(config.session.mode, SessionMode::Diagnostic);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_hex_id() {
        assert_eq!(parse_hex_id("0x18d1", "vid").unwrap(), 0x18D1);
        assert_eq!(parse_hex_id("0X2D01", "pid").unwrap(), 0x2D01);
        assert_eq!(parse_hex_id("0x1", "pid").unwrap(), 1);
        assert!(parse_hex_id("18d1", "vid").is_err());
        assert!(parse_hex_id("0x", "vid").is_err());
        assert!(parse_hex_id("0x12345", "vid").is_err());
        assert!(parse_hex_id("0xGHIJ", "vid").is_err());
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = HostConfig::default();
        config.host.log_level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.host.log_level = "debug".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_limits() {
        let mut config = HostConfig::default();
        config.negotiation.reenumeration_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = HostConfig::default();
        config.session.descriptor_buffer_len = 63;
        assert!(config.validate().is_err());

        let mut config = HostConfig::default();
        config.session.long_read_len = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_timeout_range() {
        let max = u32::MAX as u64;

        let mut config = HostConfig::default();
        config.session.read_timeout_ms = max;
        config.session.loopback_timeout_ms = max;
        config.negotiation.control_timeout_ms = max;
        assert!(config.validate().is_ok());

        config.session.read_timeout_ms = max + 1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("read_timeout_ms"));

        let mut config = HostConfig::default();
        config.session.loopback_timeout_ms = u64::MAX;
        assert!(config.validate().is_err());

        let mut config = HostConfig::default();
        config.negotiation.control_timeout_ms = max + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_settings_conversion() {
        let mut config = HostConfig::default();
        config.session.read_timeout_ms = 250;
        config.session.deadline_secs = Some(30);

        let negotiation = config.negotiation_settings().unwrap();
        assert_eq!(negotiation, NegotiationSettings::default());

        let session = config.session_settings();
        assert_eq!(session.transfer_timeout, Some(Duration::from_millis(250)));
        assert_eq!(session.deadline, Some(Duration::from_secs(30)));

        config.session.read_timeout_ms = 0;
        assert_eq!(config.session_settings().transfer_timeout, None);
    }
}
