//! Configuration for the webhook endpoints and retry tunables.
//!
//! Loaded from ~/.config/campaign-advisor/config.json when present, with
//! CAMPAIGN_ADVISOR_* environment variables taking precedence. Every field
//! has a default so a missing or partial file still yields a working config.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Per-attempt wall-clock bound for the three AI webhooks.
///
/// One value everywhere; the webhook regularly takes minutes to answer.
pub const AI_CALL_TIMEOUT_SECS: u64 = 300;

/// Fixed bound on sequential attempts per operation.
pub const MAX_ATTEMPTS: u32 = 3;

/// Fixed delay between attempts. Not a backoff.
pub const RETRY_DELAY_MS: u64 = 2000;

/// Fixed pause between segment-creation calls in a batch.
pub const SEGMENT_BATCH_DELAY_MS: u64 = 500;

const DEFAULT_WEBHOOK_BASE: &str = "https://n8n.buds-labs.dev";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Segment-recommendation webhook.
    pub recommendation_url: String,
    /// Performance-analytics webhook.
    pub analytics_url: String,
    /// Channel-optimization webhook.
    pub channel_url: String,
    /// Segment-creation endpoint used by the channel batch.
    pub segment_url: String,
    pub per_attempt_timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub segment_batch_delay_ms: u64,
    /// Metric fields the analytics payload must carry (strict validation).
    pub metric_fields: Vec<String>,
    /// Field holding the channel array in the optimization payload.
    pub channel_field: String,
    pub sharing_scope: String,
    pub created_by_email: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            recommendation_url: format!("{DEFAULT_WEBHOOK_BASE}/webhook/segment-recommendation"),
            analytics_url: format!("{DEFAULT_WEBHOOK_BASE}/webhook/performance-analytics"),
            channel_url: format!("{DEFAULT_WEBHOOK_BASE}/webhook/channel-optimization"),
            segment_url: "https://api.buds-labs.dev/v1/segments".to_string(),
            per_attempt_timeout_secs: AI_CALL_TIMEOUT_SECS,
            max_attempts: MAX_ATTEMPTS,
            retry_delay_ms: RETRY_DELAY_MS,
            segment_batch_delay_ms: SEGMENT_BATCH_DELAY_MS,
            metric_fields: vec![
                "conversion_rate".to_string(),
                "revisit_rate".to_string(),
                "profit_rate".to_string(),
            ],
            channel_field: "channels".to_string(),
            sharing_scope: "TEAM".to_string(),
            created_by_email: "campaign-bot@buds-labs.dev".to_string(),
        }
    }
}

impl Config {
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("campaign-advisor"))
    }

    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Load config from disk, or return defaults. A corrupt file is backed up
    /// next to itself and replaced by defaults rather than failing the caller.
    pub fn load() -> Self {
        let mut config = Self::config_path()
            .and_then(|path| match Self::from_file(&path) {
                Ok(config) => Some(config),
                Err(_) => {
                    preserve_corrupt_config(&path);
                    None
                }
            })
            .unwrap_or_default();
        config.apply_env_overrides();
        config
    }

    /// Load from a specific file. Missing file is an error here; `load()`
    /// handles the fallback.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config at {}", path.display()))
    }

    /// Save config to disk.
    pub fn save(&self) -> anyhow::Result<()> {
        let dir = Self::config_dir().context("could not determine config directory")?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        let path = dir.join("config.json");
        let content = serde_json::to_string_pretty(self).context("failed to serialize config")?;
        fs::write(&path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        let overrides: [(&str, &mut String); 5] = [
            ("CAMPAIGN_ADVISOR_RECOMMENDATION_URL", &mut self.recommendation_url),
            ("CAMPAIGN_ADVISOR_ANALYTICS_URL", &mut self.analytics_url),
            ("CAMPAIGN_ADVISOR_CHANNEL_URL", &mut self.channel_url),
            ("CAMPAIGN_ADVISOR_SEGMENT_URL", &mut self.segment_url),
            ("CAMPAIGN_ADVISOR_EMAIL", &mut self.created_by_email),
        ];
        for (var, slot) in overrides {
            if let Ok(value) = std::env::var(var) {
                if !value.trim().is_empty() {
                    *slot = value;
                }
            }
        }
    }
}

fn preserve_corrupt_config(path: &Path) {
    let backup = path.with_extension("json.corrupt");
    let _ = fs::copy(path, backup);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let config = Config::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.per_attempt_timeout_secs, 300);
        assert_eq!(config.metric_fields.len(), 3);
        assert!(config.recommendation_url.starts_with("https://"));
    }

    #[test]
    fn partial_file_fills_missing_fields_from_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"max_attempts": 5, "channel_field": "mix"}"#).unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.channel_field, "mix");
        assert_eq!(config.retry_delay_ms, RETRY_DELAY_MS);
    }

    #[test]
    fn corrupt_file_is_an_error_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "not json {").unwrap();
        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn env_override_replaces_endpoint() {
        let mut config = Config::default();
        std::env::set_var("CAMPAIGN_ADVISOR_SEGMENT_URL", "https://stub.local/segments");
        config.apply_env_overrides();
        std::env::remove_var("CAMPAIGN_ADVISOR_SEGMENT_URL");
        assert_eq!(config.segment_url, "https://stub.local/segments");
    }
}
