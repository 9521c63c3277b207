// src/config.rs
//! Service configuration: one TOML file plus secrets from the environment.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

use crate::ingest::providers::SourceKind;
use crate::ingest::recency::{RecencyClassifier, UndatedPolicy, DEFAULT_WINDOW_DAYS, MAX_AGE_DAYS};
use crate::ingest::roles::RoleMatcher;
use crate::notify::fanout::{FanoutConfig, DEFAULT_BATCH_SIZE, DEFAULT_INTER_MESSAGE_DELAY, DEFAULT_MAX_RETRY_AFTER};
use crate::store::dedup::{DEFAULT_MAX_RECORDS, DEFAULT_RETENTION_DAYS, MAX_RETENTION_DAYS};
use crate::store::RetentionPolicy;

pub const ENV_CONFIG_PATH: &str = "RADAR_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/radar.toml";
/// A whole tick should never stall on one rate-limit reply for longer than this.
const MAX_RETRY_AFTER_SECS: u64 = 300;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RadarConfig {
    #[serde(default = "default_rotation_period_secs")]
    pub rotation_period_secs: u64,
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub recency: RecencyConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub roles: RolesConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeliveryConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_inter_message_delay_ms")]
    pub inter_message_delay_ms: u64,
    /// Longest rate-limit backoff honored between two sends.
    #[serde(default = "default_max_retry_after_secs")]
    pub max_retry_after_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            inter_message_delay_ms: default_inter_message_delay_ms(),
            max_retry_after_secs: default_max_retry_after_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecencyConfig {
    #[serde(default = "default_window_days")]
    pub window_days: i64,
}

impl Default for RecencyConfig {
    fn default() -> Self {
        Self {
            window_days: DEFAULT_WINDOW_DAYS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DedupConfig {
    #[serde(default = "default_max_records")]
    pub max_records: usize,
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            max_records: DEFAULT_MAX_RECORDS,
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

/// Either an inline list or a file; neither means the built-in keyword set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RolesConfig {
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
    #[serde(default)]
    pub keywords_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub id: String,
    pub kind: SourceKind,
    pub url: String,
    /// Required on purpose: whether undated postings from this source count as fresh.
    pub trust_absent_date: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl SourceConfig {
    pub fn undated_policy(&self) -> UndatedPolicy {
        UndatedPolicy::from_trust_flag(self.trust_absent_date)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_rotation_period_secs() -> u64 {
    60
}
fn default_state_dir() -> PathBuf {
    PathBuf::from("state")
}
fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}
fn default_inter_message_delay_ms() -> u64 {
    DEFAULT_INTER_MESSAGE_DELAY.as_millis() as u64
}
fn default_max_retry_after_secs() -> u64 {
    DEFAULT_MAX_RETRY_AFTER.as_secs()
}
fn default_window_days() -> i64 {
    DEFAULT_WINDOW_DAYS
}
fn default_max_records() -> usize {
    DEFAULT_MAX_RECORDS
}
fn default_retention_days() -> i64 {
    DEFAULT_RETENTION_DAYS
}
fn default_timeout_secs() -> u64 {
    20
}

impl RadarConfig {
    /// Parse and validate.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: RadarConfig = toml::from_str(s).context("parsing radar config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("reading radar config from {}", path.display()))?;
        let mut cfg = Self::from_toml_str(&content).with_context(|| format!("in {}", path.display()))?;
        // Relative keyword files resolve against the config file's directory.
        if let (Some(kw), Some(dir)) = (cfg.roles.keywords_file.as_mut(), path.parent()) {
            if kw.is_relative() && !kw.exists() {
                *kw = dir.join(&*kw);
            }
        }
        Ok(cfg)
    }

    /// 1) $RADAR_CONFIG_PATH
    /// 2) config/radar.toml
    pub fn load_default() -> Result<Self> {
        let path = std::env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        if !path.exists() {
            return Err(anyhow!("radar config not found at {}", path.display()));
        }
        Self::load_from(&path)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            bail!("no [[sources]] configured");
        }
        let mut ids = HashSet::new();
        for s in &self.sources {
            if s.id.trim().is_empty() {
                bail!("source with empty id");
            }
            if !ids.insert(s.id.as_str()) {
                bail!("duplicate source id '{}'", s.id);
            }
            if s.url.trim().is_empty() {
                bail!("source '{}' has an empty url", s.id);
            }
            if s.timeout_secs == 0 {
                bail!("source '{}': timeout_secs must be > 0", s.id);
            }
        }
        if self.delivery.batch_size == 0 {
            bail!("delivery.batch_size must be > 0");
        }
        if self.delivery.max_retry_after_secs > MAX_RETRY_AFTER_SECS {
            bail!("delivery.max_retry_after_secs must be at most {MAX_RETRY_AFTER_SECS}");
        }
        if self.rotation_period_secs == 0 {
            bail!("rotation_period_secs must be > 0");
        }
        if !(0..=MAX_AGE_DAYS).contains(&self.recency.window_days) {
            bail!("recency.window_days must be between 0 and {MAX_AGE_DAYS}");
        }
        if self.dedup.max_records == 0 || self.dedup.retention_days <= 0 {
            bail!("dedup.max_records and dedup.retention_days must be > 0");
        }
        if self.dedup.retention_days > MAX_RETENTION_DAYS {
            bail!("dedup.retention_days must be at most {MAX_RETENTION_DAYS}");
        }
        // A record must outlive the window in which its posting still counts as fresh.
        if self.dedup.retention_days <= self.recency.window_days {
            bail!(
                "dedup.retention_days ({}) must be longer than recency.window_days ({})",
                self.dedup.retention_days,
                self.recency.window_days
            );
        }
        if self.roles.keywords.is_some() && self.roles.keywords_file.is_some() {
            bail!("set roles.keywords or roles.keywords_file, not both");
        }
        Ok(())
    }

    pub fn rotation_period(&self) -> Duration {
        Duration::from_secs(self.rotation_period_secs)
    }

    pub fn fanout_config(&self) -> FanoutConfig {
        FanoutConfig {
            batch_size: self.delivery.batch_size,
            inter_message_delay: Duration::from_millis(self.delivery.inter_message_delay_ms),
            max_retry_after: Duration::from_secs(self.delivery.max_retry_after_secs),
        }
    }

    pub fn recency_classifier(&self) -> RecencyClassifier {
        RecencyClassifier::from_days(self.recency.window_days)
    }

    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            max_records: self.dedup.max_records,
            retention: chrono::Duration::try_days(self.dedup.retention_days.clamp(1, MAX_RETENTION_DAYS))
                .unwrap_or_else(|| RetentionPolicy::default().retention),
        }
    }

    pub fn role_matcher(&self) -> Result<RoleMatcher> {
        match (&self.roles.keywords, &self.roles.keywords_file) {
            (Some(list), _) => Ok(RoleMatcher::new(list)),
            (None, Some(path)) => Ok(RoleMatcher::new(load_keywords_from(path)?)),
            (None, None) => Ok(RoleMatcher::default()),
        }
    }
}

/// Load role keywords from a file. Supports TOML (`keywords = [...]`) or a JSON array.
pub fn load_keywords_from(path: &Path) -> Result<Vec<String>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading role keywords from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_keywords(&content, ext.as_str())
}

fn parse_keywords(s: &str, hint_ext: &str) -> Result<Vec<String>> {
    let try_toml = hint_ext == "toml" || s.contains("keywords");
    if try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = parse_json(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported keyword file format"))
}

fn parse_toml(s: &str) -> Result<Vec<String>> {
    #[derive(Deserialize)]
    struct TomlKw {
        keywords: Vec<String>,
    }
    let v: TomlKw = toml::from_str(s)?;
    Ok(clean_list(v.keywords))
}

fn parse_json(s: &str) -> Result<Vec<String>> {
    let v: Vec<String> = serde_json::from_str(s)?;
    Ok(clean_list(v))
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    use std::collections::BTreeSet;
    let mut set = BTreeSet::new();
    for it in items {
        let t = it.trim();
        if !t.is_empty() {
            set.insert(t.to_string());
        }
    }
    set.into_iter().collect()
}
