use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use tracing::warn;

use crate::moderation::ScoringRules;
use crate::trust::{
    ReportRewardPolicy, RewardWindow, TierThreshold, TrustLevelPolicy, TrustTier,
    DEFAULT_LATE_REPORT_POINTS, DEFAULT_REWARD_WINDOWS, DEFAULT_TIER_THRESHOLDS,
    MAX_REWARDED_REPORTERS, TRUSTED_MEMBER_DAILY_REPORT_LIMIT,
};

const ENV_PREFIX: &str = "LEARNHUB_TRUST_";

/// Configuration for the trust ledger service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrustConfig {
    /// Database configuration
    pub database: DatabaseConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Scoring and tier policy
    pub policy: PolicyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string
    pub postgres_url: String,
    /// Enable PostgreSQL (if false, the in-memory store is used)
    pub postgres_enabled: bool,
    /// Upper bound on pooled connections
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Emit span open/close events
    pub log_spans: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Inclusive lower bound of every tier above None
    pub tier_thresholds: Vec<TierThreshold>,
    /// Report reward windows, ascending by hours
    pub reward_windows: Vec<RewardWindow>,
    /// Reward for reports filed after the last window
    pub late_report_points: i32,
    /// Distinct reporters per target that get paid
    pub max_rewarded_reporters: usize,
    /// Auto-approved reports per trusted member per rolling 24h
    pub trusted_daily_report_limit: usize,
    pub file_approved_points: i32,
    pub hidden_penalty: i32,
    pub useful_vote_points: i32,
    pub not_useful_vote_points: i32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            postgres_url: "postgresql://localhost:5432/learnhub".to_string(),
            postgres_enabled: false,
            max_connections: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_spans: false,
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        let rules = ScoringRules::default();
        Self {
            tier_thresholds: DEFAULT_TIER_THRESHOLDS.to_vec(),
            reward_windows: DEFAULT_REWARD_WINDOWS.to_vec(),
            late_report_points: DEFAULT_LATE_REPORT_POINTS,
            max_rewarded_reporters: MAX_REWARDED_REPORTERS,
            trusted_daily_report_limit: TRUSTED_MEMBER_DAILY_REPORT_LIMIT,
            file_approved_points: rules.file_approved,
            hidden_penalty: rules.hidden_penalty,
            useful_vote_points: rules.useful_vote,
            not_useful_vote_points: rules.not_useful_vote,
        }
    }
}

impl PolicyConfig {
    /// Convert to the TrustLevelPolicy used by the engine
    pub fn to_level_policy(&self) -> Result<TrustLevelPolicy> {
        TrustLevelPolicy::new(self.tier_thresholds.clone()).context("Invalid tier thresholds")
    }

    /// Convert to the ReportRewardPolicy used by the workflow
    pub fn to_reward_policy(&self) -> Result<ReportRewardPolicy> {
        ReportRewardPolicy::new(
            self.reward_windows.clone(),
            self.late_report_points,
            self.max_rewarded_reporters,
            self.trusted_daily_report_limit,
        )
        .context("Invalid report reward policy")
    }

    pub fn to_scoring_rules(&self) -> ScoringRules {
        ScoringRules {
            file_approved: self.file_approved_points,
            hidden_penalty: self.hidden_penalty,
            useful_vote: self.useful_vote_points,
            not_useful_vote: self.not_useful_vote_points,
        }
    }
}

impl TrustConfig {
    /// Load configuration from `LEARNHUB_TRUST_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));
        let mut config = Self::default();

        // Database
        if let Some(url) = var("POSTGRES_URL") {
            config.database.postgres_url = url;
        }

        if let Some(enabled) = var("POSTGRES_ENABLED") {
            config.database.postgres_enabled = enabled
                .parse()
                .context("Invalid LEARNHUB_TRUST_POSTGRES_ENABLED value")?;
        }

        if let Some(max) = var("MAX_CONNECTIONS") {
            config.database.max_connections = max
                .parse()
                .context("Invalid LEARNHUB_TRUST_MAX_CONNECTIONS value")?;
        }

        // Logging
        if let Some(level) = var("LOG_LEVEL") {
            config.logging.level = level;
        }

        if let Some(spans) = var("LOG_SPANS") {
            config.logging.log_spans = spans
                .parse()
                .context("Invalid LEARNHUB_TRUST_LOG_SPANS value")?;
        }

        // Policy
        if let Some(thresholds) = var("TIER_THRESHOLDS") {
            config.policy.tier_thresholds = parse_thresholds(&thresholds)
                .context("Invalid LEARNHUB_TRUST_TIER_THRESHOLDS value")?;
        }

        if let Some(windows) = var("REWARD_WINDOWS") {
            config.policy.reward_windows = parse_windows(&windows)
                .context("Invalid LEARNHUB_TRUST_REWARD_WINDOWS value")?;
        }

        if let Some(points) = var("LATE_REPORT_POINTS") {
            config.policy.late_report_points = points
                .parse()
                .context("Invalid LEARNHUB_TRUST_LATE_REPORT_POINTS value")?;
        }

        if let Some(max) = var("MAX_REWARDED_REPORTERS") {
            config.policy.max_rewarded_reporters = max
                .parse()
                .context("Invalid LEARNHUB_TRUST_MAX_REWARDED_REPORTERS value")?;
        }

        if let Some(limit) = var("TRUSTED_DAILY_REPORT_LIMIT") {
            config.policy.trusted_daily_report_limit = limit
                .parse()
                .context("Invalid LEARNHUB_TRUST_TRUSTED_DAILY_REPORT_LIMIT value")?;
        }

        if let Some(points) = var("FILE_APPROVED_POINTS") {
            config.policy.file_approved_points = points
                .parse()
                .context("Invalid LEARNHUB_TRUST_FILE_APPROVED_POINTS value")?;
        }

        if let Some(points) = var("HIDDEN_PENALTY") {
            config.policy.hidden_penalty = points
                .parse()
                .context("Invalid LEARNHUB_TRUST_HIDDEN_PENALTY value")?;
        }

        if let Some(points) = var("USEFUL_VOTE_POINTS") {
            config.policy.useful_vote_points = points
                .parse()
                .context("Invalid LEARNHUB_TRUST_USEFUL_VOTE_POINTS value")?;
        }

        if let Some(points) = var("NOT_USEFUL_VOTE_POINTS") {
            config.policy.not_useful_vote_points = points
                .parse()
                .context("Invalid LEARNHUB_TRUST_NOT_USEFUL_VOTE_POINTS value")?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.postgres_enabled {
            let url = &self.database.postgres_url;
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                return Err(anyhow::anyhow!(
                    "PostgreSQL URL must use the postgres:// or postgresql:// scheme"
                ));
            }
        }

        if self.database.max_connections == 0 {
            return Err(anyhow::anyhow!("Max connections must be non-zero"));
        }

        match self.logging.level.to_lowercase().as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            other => {
                return Err(anyhow::anyhow!("Unknown log level: {}", other));
            }
        }

        self.policy.to_level_policy()?;
        self.policy.to_reward_policy()?;

        if self.policy.file_approved_points < 0 {
            return Err(anyhow::anyhow!("File approval points cannot be negative"));
        }

        if self.policy.hidden_penalty < 0 {
            return Err(anyhow::anyhow!(
                "Hidden penalty is a magnitude and cannot be negative"
            ));
        }

        if self.policy.max_rewarded_reporters == 0 {
            warn!("Report rewards are disabled (max rewarded reporters is 0)");
        }

        Ok(())
    }
}

/// Parse `tier=min,tier=min`, e.g. `newbie=5,contributor=9`
fn parse_thresholds(raw: &str) -> Result<Vec<TierThreshold>> {
    raw.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| {
            let (tier, min) = part
                .split_once('=')
                .with_context(|| format!("Expected tier=score, got '{}'", part))?;
            let tier: TrustTier = tier.parse()?;
            let min_score = min
                .trim()
                .parse()
                .with_context(|| format!("Invalid score for tier {}", tier))?;
            Ok(TierThreshold::new(min_score, tier))
        })
        .collect()
}

/// Parse `hours:points,hours:points`, e.g. `24:4,72:2`
fn parse_windows(raw: &str) -> Result<Vec<RewardWindow>> {
    raw.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| {
            let (hours, points) = part
                .split_once(':')
                .with_context(|| format!("Expected hours:points, got '{}'", part))?;
            let hours = hours
                .trim()
                .parse()
                .with_context(|| format!("Invalid hours in '{}'", part))?;
            let points = points
                .trim()
                .parse()
                .with_context(|| format!("Invalid points in '{}'", part))?;
            Ok(RewardWindow::new(hours, points))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (format!("{}{}", ENV_PREFIX, k), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = TrustConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.policy.to_level_policy().unwrap(),
            TrustLevelPolicy::default()
        );
        assert_eq!(
            config.policy.to_reward_policy().unwrap(),
            ReportRewardPolicy::default()
        );
        assert_eq!(config.policy.to_scoring_rules(), ScoringRules::default());
    }

    #[test]
    fn test_overrides_from_lookup() {
        let config = TrustConfig::from_lookup(lookup(&[
            ("POSTGRES_ENABLED", "true"),
            ("POSTGRES_URL", "postgres://db/learnhub"),
            ("LOG_LEVEL", "debug"),
            ("TIER_THRESHOLDS", "newbie=10, contributor=20"),
            ("REWARD_WINDOWS", "12:6,48:3"),
            ("TRUSTED_DAILY_REPORT_LIMIT", "5"),
        ]))
        .unwrap();

        assert!(config.database.postgres_enabled);
        assert_eq!(config.logging.level, "debug");
        let policy = config.policy.to_level_policy().unwrap();
        assert_eq!(policy.tier_for(15), TrustTier::Newbie);
        assert_eq!(policy.tier_for(100), TrustTier::Contributor);
        assert_eq!(config.policy.reward_windows[0], RewardWindow::new(12, 6));
        assert_eq!(config.policy.trusted_daily_report_limit, 5);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(TrustConfig::from_lookup(lookup(&[("MAX_CONNECTIONS", "many")])).is_err());
        assert!(TrustConfig::from_lookup(lookup(&[("LOG_LEVEL", "loud")])).is_err());
        assert!(
            TrustConfig::from_lookup(lookup(&[("TIER_THRESHOLDS", "moderator=5,newbie=9")]))
                .is_err()
        );
        assert!(TrustConfig::from_lookup(lookup(&[("REWARD_WINDOWS", "24-4")])).is_err());
        assert!(TrustConfig::from_lookup(lookup(&[("REWARD_WINDOWS", "-24:4,72:2")])).is_err());
        assert!(TrustConfig::from_lookup(lookup(&[
            ("POSTGRES_ENABLED", "true"),
            ("POSTGRES_URL", "mysql://db")
        ]))
        .is_err());
        assert!(TrustConfig::from_lookup(lookup(&[("HIDDEN_PENALTY", "-2")])).is_err());
    }
}
