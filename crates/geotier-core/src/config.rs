//! geotier.toml configuration parser.
//!
//! Every field has a default so an empty file (or no file at all) yields a
//! usable configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::GeoPoint;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeotierConfig {
    pub control: ControlConfig,
    pub trigger: TriggerConfig,
    pub tier: TierConfig,
    pub cluster: ClusterConfig,
    pub geocoder: GeocoderConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Seconds between control-loop ticks.
    pub interval_secs: u64,
    /// Seconds an active tier must go untriggered before teardown.
    /// Zero disables automatic teardown.
    pub cooldown_secs: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            cooldown_secs: 1800,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Radius used when a location is registered without one.
    pub default_proximity_miles: f64,
    /// Minimum bytes/s a sampled location must carry to count as hot.
    pub traffic_threshold_bytes: u64,
    /// Minimum share (0.0-1.0) of total sampled traffic to count as hot.
    pub traffic_threshold_ratio: f64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            default_proximity_miles: 100.0,
            traffic_threshold_bytes: 0,
            traffic_threshold_ratio: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    /// Appended to the backing pool name to form the cache pool name.
    pub suffix: String,
    pub pg_num: u32,
    /// Replica count for replicated cache pools.
    pub size: u32,
    pub min_size: u32,
    /// Cache size in MiB, applied as `target_max_bytes`.
    pub default_cache_size_mb: u64,
    /// Applied as `target_max_objects` when greater than zero.
    pub default_cache_objects: u64,
    pub hit_set_type: String,
    /// When set, cache pools are created as erasure-coded with this profile.
    pub erasure_code_profile: Option<String>,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            suffix: ".cache".to_string(),
            pg_num: 4,
            size: 3,
            min_size: 2,
            default_cache_size_mb: 1024,
            default_cache_objects: 0,
            hit_set_type: "bloom".to_string(),
            erasure_code_profile: None,
        }
    }
}

impl TierConfig {
    /// `default_cache_size_mb` in bytes, or `None` if it does not fit a u64.
    pub fn target_max_bytes(&self) -> Option<u64> {
        self.default_cache_size_mb.checked_mul(1024 * 1024)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub ceph_bin: String,
    pub rados_bin: String,
    pub conf: Option<PathBuf>,
    pub user: Option<String>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            ceph_bin: "ceph".to_string(),
            rados_bin: "rados".to_string(),
            conf: None,
            user: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    /// Named places resolvable by the built-in geocoder.
    pub places: BTreeMap<String, GeoPoint>,
}

impl GeotierConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: GeotierConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, otherwise fall back to defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.control.interval_secs == 0 {
            anyhow::bail!("control.interval_secs must be greater than zero");
        }
        let prox = self.trigger.default_proximity_miles;
        if !prox.is_finite() || prox < 0.0 {
            anyhow::bail!("trigger.default_proximity_miles must be a non-negative number");
        }
        if !(0.0..=1.0).contains(&self.trigger.traffic_threshold_ratio) {
            anyhow::bail!("trigger.traffic_threshold_ratio must be within 0.0..=1.0");
        }
        if self.tier.suffix.is_empty() {
            anyhow::bail!("tier.suffix must not be empty");
        }
        if self.tier.min_size > self.tier.size {
            anyhow::bail!(
                "tier.min_size ({}) exceeds tier.size ({})",
                self.tier.min_size,
                self.tier.size
            );
        }
        if self.tier.target_max_bytes().is_none() {
            anyhow::bail!(
                "tier.default_cache_size_mb ({}) is too large",
                self.tier.default_cache_size_mb
            );
        }
        for (name, point) in &self.geocoder.places {
            if !point.is_valid() {
                anyhow::bail!("geocoder place {name:?} has invalid coordinates {point}");
            }
        }
        Ok(())
    }
}
