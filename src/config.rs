// MIT License - Copyright (c) 2026 dsc-keybus-bridge contributors
// Bridge configuration

use crate::constants::{
    DEFAULT_AUTO_RESTART_SECS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_WRITE_POLL_INTERVAL_MS,
    DEFAULT_WRITE_TIMEOUT_MS, MAX_PARTITIONS, MAX_ZONE_GROUPS,
};
use crate::error::{DscError, Result};

/// How partition lights are rendered by the messaging side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LightsFormat {
    /// Raw 8-bit mask as a decimal number
    #[default]
    Raw,
    /// JSON object with one boolean per light
    Json,
}

impl LightsFormat {
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "raw" => Some(Self::Raw),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Configuration for the change dispatcher and command gateway.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Number of partitions tracked (1-8)
    pub partition_count: u8,
    /// Number of 8-zone groups tracked (1-8)
    pub zone_group_count: u8,
    /// Default access code, used for disarm, time-set and the access-code prompt
    pub access_code: String,
    /// Dispatcher tick in milliseconds
    pub poll_interval_ms: u64,
    /// Upper bound on waiting for the driver to become write-ready
    pub write_timeout_ms: u64,
    /// Interval between write-ready checks
    pub write_poll_interval_ms: u64,
    /// Delay before a stopped driver restarts itself (0 = never)
    pub auto_restart_secs: u64,
    /// Hide access code numbers in published output
    pub mask_access_code: bool,
    /// Lights rendering
    pub lights_format: LightsFormat,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            partition_count: MAX_PARTITIONS as u8,
            zone_group_count: MAX_ZONE_GROUPS as u8,
            access_code: "1234".to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
            write_poll_interval_ms: DEFAULT_WRITE_POLL_INTERVAL_MS,
            auto_restart_secs: DEFAULT_AUTO_RESTART_SECS,
            mask_access_code: false,
            lights_format: LightsFormat::Raw,
        }
    }
}

impl BridgeConfig {
    /// Create a new config builder starting from defaults.
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::default()
    }

    /// Check the limits the dispatcher and gateway rely on.
    pub fn validate(&self) -> Result<()> {
        if self.partition_count == 0 || self.partition_count as usize > MAX_PARTITIONS {
            return Err(DscError::InvalidConfig {
                reason: format!(
                    "partition_count must be 1-{}, got {}",
                    MAX_PARTITIONS, self.partition_count
                ),
            });
        }
        if self.zone_group_count == 0 || self.zone_group_count as usize > MAX_ZONE_GROUPS {
            return Err(DscError::InvalidConfig {
                reason: format!(
                    "zone_group_count must be 1-{}, got {}",
                    MAX_ZONE_GROUPS, self.zone_group_count
                ),
            });
        }
        let code_len = self.access_code.len();
        if !(4..=6).contains(&code_len) || !self.access_code.chars().all(|c| c.is_ascii_digit()) {
            return Err(DscError::InvalidConfig {
                reason: "access_code must be 4-6 digits".to_string(),
            });
        }
        if self.poll_interval_ms == 0 || self.write_poll_interval_ms == 0 {
            return Err(DscError::InvalidConfig {
                reason: "poll intervals must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Builder for BridgeConfig.
#[derive(Debug, Clone, Default)]
pub struct BridgeConfigBuilder {
    config: BridgeConfig,
}

impl BridgeConfigBuilder {
    pub fn partition_count(mut self, count: u8) -> Self {
        self.config.partition_count = count;
        self
    }

    pub fn zone_group_count(mut self, count: u8) -> Self {
        self.config.zone_group_count = count;
        self
    }

    pub fn access_code(mut self, code: impl Into<String>) -> Self {
        self.config.access_code = code.into();
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    pub fn write_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.write_poll_interval_ms = ms;
        self
    }

    pub fn auto_restart_secs(mut self, secs: u64) -> Self {
        self.config.auto_restart_secs = secs;
        self
    }

    pub fn mask_access_code(mut self, mask: bool) -> Self {
        self.config.mask_access_code = mask;
        self
    }

    pub fn lights_format(mut self, format: LightsFormat) -> Self {
        self.config.lights_format = format;
        self
    }

    pub fn build(self) -> BridgeConfig {
        self.config
    }
}
