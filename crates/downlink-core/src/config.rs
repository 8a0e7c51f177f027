//! Configuration for the downlink pipeline.
//!
//! Resolution order: environment variables → config file → defaults.
//! Command-line flags, where given, override all three.
//!
//! Config file location:
//!   1. $DOWNLINK_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/downlink/config.toml
//!   3. ~/.config/downlink/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::codec::CodecKind;
use crate::fragment::DEFAULT_FRAGMENT_SIZE;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DownlinkConfig {
    pub pipeline: PipelineConfig,
    pub report: ReportConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Fragment size in bytes. Must be at least 1.
    pub fragment_size: usize,
    /// Compression codec: "lz4" or "none".
    pub codec: CodecKind,
    /// Abort the run if a single codec call takes longer. 0 = no limit.
    pub codec_timeout_ms: u64,
    /// Worker tasks used for parity generation. 0 = available parallelism.
    pub parity_workers: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Pretty-print the JSON report.
    pub pretty: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Rows written by `generate` when none are given.
    pub rows: usize,
    /// RNG seed for the synthetic sensor noise.
    pub seed: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fragment_size: DEFAULT_FRAGMENT_SIZE,
            codec: CodecKind::Lz4,
            codec_timeout_ms: 30_000,
            parity_workers: 0,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            rows: 200_000,
            seed: 1,
        }
    }
}

impl PipelineConfig {
    pub fn codec_timeout(&self) -> Option<std::time::Duration> {
        (self.codec_timeout_ms > 0).then(|| std::time::Duration::from_millis(self.codec_timeout_ms))
    }

    /// Resolved worker count, never zero.
    pub fn workers(&self) -> usize {
        if self.parity_workers > 0 {
            return self.parity_workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("downlink")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl DownlinkConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            DownlinkConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("DOWNLINK_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = DownlinkConfig::default().to_toml()?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::SerializeFailed)
    }

    /// Apply DOWNLINK_* env var overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key → value source. Unparseable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("DOWNLINK_PIPELINE__FRAGMENT_SIZE") {
            if let Ok(n) = v.parse() {
                self.pipeline.fragment_size = n;
            }
        }
        if let Some(v) = lookup("DOWNLINK_PIPELINE__CODEC") {
            if let Ok(kind) = v.parse() {
                self.pipeline.codec = kind;
            }
        }
        if let Some(v) = lookup("DOWNLINK_PIPELINE__CODEC_TIMEOUT_MS") {
            if let Ok(ms) = v.parse() {
                self.pipeline.codec_timeout_ms = ms;
            }
        }
        if let Some(v) = lookup("DOWNLINK_PIPELINE__PARITY_WORKERS") {
            if let Ok(n) = v.parse() {
                self.pipeline.parity_workers = n;
            }
        }
        if let Some(v) = lookup("DOWNLINK_REPORT__PRETTY") {
            self.report.pretty = v == "true" || v == "1";
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_values() {
        let config = DownlinkConfig::default();
        assert_eq!(config.pipeline.fragment_size, 65536);
        assert_eq!(config.pipeline.codec, CodecKind::Lz4);
        assert_eq!(
            config.pipeline.codec_timeout(),
            Some(std::time::Duration::from_secs(30))
        );
        assert!(config.pipeline.workers() >= 1);
        assert!(!config.report.pretty);
    }

    #[test]
    fn zero_timeout_means_unbounded() {
        let pipeline = PipelineConfig {
            codec_timeout_ms: 0,
            ..PipelineConfig::default()
        };
        assert_eq!(pipeline.codec_timeout(), None);
    }

    #[test]
    fn overrides_replace_parseable_values() {
        let env: HashMap<&str, &str> = [
            ("DOWNLINK_PIPELINE__FRAGMENT_SIZE", "1024"),
            ("DOWNLINK_PIPELINE__CODEC", "none"),
            ("DOWNLINK_PIPELINE__PARITY_WORKERS", "not-a-number"),
            ("DOWNLINK_REPORT__PRETTY", "1"),
        ]
        .into_iter()
        .collect();

        let mut config = DownlinkConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.pipeline.fragment_size, 1024);
        assert_eq!(config.pipeline.codec, CodecKind::None);
        assert_eq!(config.pipeline.parity_workers, 0);
        assert!(config.report.pretty);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config: DownlinkConfig = toml::from_str(
            r#"
            [pipeline]
            fragment_size = 4096
            codec = "none"
            "#,
        )
        .unwrap();
        assert_eq!(config.pipeline.fragment_size, 4096);
        assert_eq!(config.pipeline.codec, CodecKind::None);
        assert_eq!(config.pipeline.codec_timeout_ms, 30_000);
        assert_eq!(config.telemetry.seed, 1);
    }

    #[test]
    fn write_default_if_missing_creates_file() {
        let tmp = std::env::temp_dir().join(format!("downlink-config-test-{}", std::process::id()));
        let config_path = tmp.join("config.toml");
        std::fs::create_dir_all(&tmp).unwrap();

        std::env::set_var("DOWNLINK_CONFIG", &config_path);

        let path =
            DownlinkConfig::write_default_if_missing().expect("write_default_if_missing failed");
        assert!(path.exists());

        let config = DownlinkConfig::from_file(&path).expect("load should succeed");
        assert_eq!(config.pipeline.fragment_size, 65536);

        std::env::remove_var("DOWNLINK_CONFIG");
        let _ = std::fs::remove_dir_all(&tmp);
    }
}
