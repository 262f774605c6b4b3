//! Layered configuration (default < file < environment < CLI), mirroring
//! the precedence model used throughout the rest of the ambient stack.

use crate::error::{DdbError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    Default,
    File,
    Environment,
    Cli,
}

impl ConfigSource {
    pub fn precedence(&self) -> u8 {
        match self {
            ConfigSource::Default => 0,
            ConfigSource::File => 1,
            ConfigSource::Environment => 2,
            ConfigSource::Cli => 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }

    pub fn update(&mut self, value: T, source: ConfigSource) {
        if source.precedence() >= self.source.precedence() {
            self.value = value;
            self.source = source;
        }
    }
}

/// Configuration values governing the ambient behavior of the index, build
/// orchestrator and tile cache. None of these are part of the on-disk
/// schema; they tune runtime behavior only.
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    /// Tile side in pixels (spec §4.2 default 256).
    pub tile_size: ConfigValue<u32>,
    /// Seconds a `.pending` build must age before a retry is attempted
    /// (spec §4.8, default 300).
    pub build_pending_backoff_secs: ConfigValue<u64>,
    /// Whether `BuildLock::acquire(.., wait: true)` should differ from
    /// `wait: false` (spec §9 open question; default preserves the
    /// original's quirky behavior of not actually waiting).
    pub buildlock_wait_blocks: ConfigValue<bool>,
    /// Probability (1-in-N) that a cache access triggers GC (spec §4.12,
    /// default 1000).
    pub cache_gc_probability: ConfigValue<u32>,
    /// Age in days after which cached tiles/thumbnails are evicted (spec
    /// §4.12, default 5).
    pub cache_max_age_days: ConfigValue<u32>,
    /// Optional DSM altitude service base URL (spec §6.3).
    pub dsm_service_url: ConfigValue<Option<String>>,
}

impl LayeredConfig {
    pub fn with_defaults() -> Self {
        Self {
            tile_size: ConfigValue::new(256, ConfigSource::Default),
            build_pending_backoff_secs: ConfigValue::new(300, ConfigSource::Default),
            buildlock_wait_blocks: ConfigValue::new(false, ConfigSource::Default),
            cache_gc_probability: ConfigValue::new(1000, ConfigSource::Default),
            cache_max_age_days: ConfigValue::new(5, ConfigSource::Default),
            dsm_service_url: ConfigValue::new(None, ConfigSource::Default),
        }
    }

    pub fn load_from_file(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(self);
        }
        let content = fs::read_to_string(path).map_err(|e| DdbError::fs(path, e.to_string()))?;
        let file: FileConfig = toml::from_str(&content)
            .map_err(|e| DdbError::app(format!("failed to parse {}: {}", path.display(), e)))?;

        if let Some(v) = file.tile_size {
            self.tile_size.update(v, ConfigSource::File);
        }
        if let Some(v) = file.build_pending_backoff_secs {
            self.build_pending_backoff_secs.update(v, ConfigSource::File);
        }
        if let Some(v) = file.buildlock_wait_blocks {
            self.buildlock_wait_blocks.update(v, ConfigSource::File);
        }
        if let Some(v) = file.cache_gc_probability {
            self.cache_gc_probability.update(v, ConfigSource::File);
        }
        if let Some(v) = file.cache_max_age_days {
            self.cache_max_age_days.update(v, ConfigSource::File);
        }
        if let Some(v) = file.dsm_service_url {
            self.dsm_service_url.update(Some(v), ConfigSource::File);
        }
        Ok(self)
    }

    /// Applies CLI-flag overrides, the highest-precedence layer.
    pub fn update_from_cli(&mut self, overrides: CliConfigOverrides) {
        if let Some(v) = overrides.tile_size {
            self.tile_size.update(v, ConfigSource::Cli);
        }
        if let Some(v) = overrides.build_pending_backoff_secs {
            self.build_pending_backoff_secs.update(v, ConfigSource::Cli);
        }
        if let Some(v) = overrides.dsm_service_url {
            self.dsm_service_url.update(Some(v), ConfigSource::Cli);
        }
    }

    pub fn load_from_env(mut self) -> Self {
        if let Ok(v) = env::var("DDB_TILE_SIZE") {
            match v.parse() {
                Ok(n) => self.tile_size.update(n, ConfigSource::Environment),
                Err(_) => tracing::warn!("invalid DDB_TILE_SIZE={:?}, expected u32", v),
            }
        }
        if let Ok(v) = env::var("DDB_BUILD_PENDING_BACKOFF_SECS") {
            match v.parse() {
                Ok(n) => self.build_pending_backoff_secs.update(n, ConfigSource::Environment),
                Err(_) => tracing::warn!("invalid DDB_BUILD_PENDING_BACKOFF_SECS={:?}", v),
            }
        }
        if let Ok(v) = env::var("DDB_DSM_SERVICE_URL") {
            self.dsm_service_url.update(Some(v), ConfigSource::Environment);
        }
        self
    }
}

/// CLI-flag overrides, collected by `dronedb-cli` from global `--tile-size`
/// etc. flags and applied last via [`LayeredConfig::update_from_cli`].
#[derive(Debug, Default)]
pub struct CliConfigOverrides {
    pub tile_size: Option<u32>,
    pub build_pending_backoff_secs: Option<u64>,
    pub dsm_service_url: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct FileConfig {
    tile_size: Option<u32>,
    build_pending_backoff_secs: Option<u64>,
    buildlock_wait_blocks: Option<bool>,
    cache_gc_probability: Option<u32>,
    cache_max_age_days: Option<u32>,
    dsm_service_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = LayeredConfig::with_defaults();
        assert_eq!(cfg.tile_size.value, 256);
        assert_eq!(cfg.build_pending_backoff_secs.value, 300);
        assert_eq!(cfg.cache_gc_probability.value, 1000);
        assert_eq!(cfg.cache_max_age_days.value, 5);
        assert!(!cfg.buildlock_wait_blocks.value);
    }

    #[test]
    fn precedence_respected() {
        let mut v = ConfigValue::new(1u32, ConfigSource::Default);
        v.update(2, ConfigSource::File);
        assert_eq!(v.value, 2);
        v.update(3, ConfigSource::Environment);
        assert_eq!(v.value, 3);
        v.update(1, ConfigSource::File);
        assert_eq!(v.value, 3, "lower precedence must not override");
    }

    #[test]
    fn cli_overrides_win_over_file_and_env() {
        let mut cfg = LayeredConfig::with_defaults();
        cfg.tile_size.update(512, ConfigSource::File);
        cfg.update_from_cli(CliConfigOverrides { tile_size: Some(1024), ..Default::default() });
        assert_eq!(cfg.tile_size.value, 1024);
        assert_eq!(cfg.tile_size.source.precedence(), ConfigSource::Cli.precedence());
    }

    #[test]
    fn load_from_missing_file_keeps_defaults() {
        let cfg = LayeredConfig::with_defaults().load_from_file("/no/such/file.toml").unwrap();
        assert_eq!(cfg.tile_size.value, 256);
    }
}
