//! Trust Tiers and the Score-to-Tier Table
//!
//! Tiers are never stored as authoritative state. They are recomputed from the
//! current score through a single ordered threshold table so the thresholds can
//! be tuned (or loaded from configuration) without touching call sites.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{TrustError, TrustResult};

/// Discrete trust rank, ordered by the score it requires
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TrustTier {
    None,
    Newbie,
    Contributor,
    TrustedMember,
    Moderator,
}

impl TrustTier {
    pub const ALL: [TrustTier; 5] = [
        TrustTier::None,
        TrustTier::Newbie,
        TrustTier::Contributor,
        TrustTier::TrustedMember,
        TrustTier::Moderator,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrustTier::None => "none",
            TrustTier::Newbie => "newbie",
            TrustTier::Contributor => "contributor",
            TrustTier::TrustedMember => "trusted_member",
            TrustTier::Moderator => "moderator",
        }
    }

    /// Congratulation shown when a user is promoted into this tier
    pub fn milestone(&self) -> Option<Milestone> {
        let (title, body) = match self {
            TrustTier::None => return None,
            TrustTier::Newbie => (
                "Welcome aboard: you reached Newbie",
                "Keep sharing documents to climb the trust ladder.",
            ),
            TrustTier::Contributor => (
                "You are now a Contributor",
                "Your contributions are making a difference. You can now start conversations.",
            ),
            TrustTier::TrustedMember => (
                "You are now a Trusted Member",
                "Your uploads and reports are approved automatically from now on.",
            ),
            TrustTier::Moderator => (
                "You are now a Moderator",
                "You can review documents, comments and reports from other members.",
            ),
        };
        Some(Milestone { title, body })
    }
}

impl fmt::Display for TrustTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrustTier {
    type Err = TrustError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TrustTier::ALL
            .into_iter()
            .find(|tier| tier.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| TrustError::InvalidPolicy(format!("Unknown trust tier: {}", s)))
    }
}

/// Notification copy for a tier promotion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Milestone {
    pub title: &'static str,
    pub body: &'static str,
}

/// Inclusive lower bound at which a tier starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierThreshold {
    pub min_score: i32,
    pub tier: TrustTier,
}

impl TierThreshold {
    pub const fn new(min_score: i32, tier: TrustTier) -> Self {
        Self { min_score, tier }
    }
}

pub const DEFAULT_TIER_THRESHOLDS: [TierThreshold; 4] = [
    TierThreshold::new(5, TrustTier::Newbie),
    TierThreshold::new(9, TrustTier::Contributor),
    TierThreshold::new(29, TrustTier::TrustedMember),
    TierThreshold::new(59, TrustTier::Moderator),
];

/// Pure score -> tier mapping over an ascending threshold table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustLevelPolicy {
    thresholds: Vec<TierThreshold>,
}

impl TrustLevelPolicy {
    /// Build a policy from thresholds ordered by ascending score.
    ///
    /// Scores below the first threshold map to `TrustTier::None`, so `None`
    /// may not appear in the table itself.
    pub fn new(thresholds: Vec<TierThreshold>) -> TrustResult<Self> {
        if thresholds.iter().any(|t| t.tier == TrustTier::None) {
            return Err(TrustError::InvalidPolicy(
                "TrustTier::None is implied below the first threshold".to_string(),
            ));
        }

        for pair in thresholds.windows(2) {
            if pair[0].min_score >= pair[1].min_score {
                return Err(TrustError::InvalidPolicy(format!(
                    "Thresholds must be strictly ascending: {} then {}",
                    pair[0].min_score, pair[1].min_score
                )));
            }
            if pair[0].tier >= pair[1].tier {
                return Err(TrustError::InvalidPolicy(format!(
                    "Tiers must be strictly ascending: {} then {}",
                    pair[0].tier, pair[1].tier
                )));
            }
        }

        Ok(Self { thresholds })
    }

    /// Total over every i32, negatives included
    pub fn tier_for(&self, score: i32) -> TrustTier {
        self.thresholds
            .iter()
            .rev()
            .find(|t| score >= t.min_score)
            .map(|t| t.tier)
            .unwrap_or(TrustTier::None)
    }

    pub fn thresholds(&self) -> &[TierThreshold] {
        &self.thresholds
    }
}

impl Default for TrustLevelPolicy {
    fn default() -> Self {
        Self {
            thresholds: DEFAULT_TIER_THRESHOLDS.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_boundaries() {
        let policy = TrustLevelPolicy::default();
        assert_eq!(policy.tier_for(i32::MIN), TrustTier::None);
        assert_eq!(policy.tier_for(-10), TrustTier::None);
        assert_eq!(policy.tier_for(0), TrustTier::None);
        assert_eq!(policy.tier_for(4), TrustTier::None);
        assert_eq!(policy.tier_for(5), TrustTier::Newbie);
        assert_eq!(policy.tier_for(8), TrustTier::Newbie);
        assert_eq!(policy.tier_for(9), TrustTier::Contributor);
        assert_eq!(policy.tier_for(28), TrustTier::Contributor);
        assert_eq!(policy.tier_for(29), TrustTier::TrustedMember);
        assert_eq!(policy.tier_for(58), TrustTier::TrustedMember);
        assert_eq!(policy.tier_for(59), TrustTier::Moderator);
        assert_eq!(policy.tier_for(i32::MAX), TrustTier::Moderator);
    }

    #[test]
    fn test_tier_is_monotonic_in_score() {
        let policy = TrustLevelPolicy::default();
        let mut previous = policy.tier_for(-100);
        for score in -99..200 {
            let tier = policy.tier_for(score);
            assert!(previous <= tier, "tier dropped at score {}", score);
            previous = tier;
        }
    }

    #[test]
    fn test_rejects_unordered_tables() {
        let swapped = vec![
            TierThreshold::new(9, TrustTier::Contributor),
            TierThreshold::new(5, TrustTier::Newbie),
        ];
        assert!(TrustLevelPolicy::new(swapped).is_err());

        let tiers_backwards = vec![
            TierThreshold::new(5, TrustTier::Contributor),
            TierThreshold::new(9, TrustTier::Newbie),
        ];
        assert!(TrustLevelPolicy::new(tiers_backwards).is_err());

        let explicit_none = vec![TierThreshold::new(0, TrustTier::None)];
        assert!(TrustLevelPolicy::new(explicit_none).is_err());
    }

    #[test]
    fn test_custom_table() {
        let policy = TrustLevelPolicy::new(vec![
            TierThreshold::new(1, TrustTier::Newbie),
            TierThreshold::new(100, TrustTier::Moderator),
        ])
        .unwrap();
        assert_eq!(policy.tier_for(50), TrustTier::Newbie);
        assert_eq!(policy.tier_for(100), TrustTier::Moderator);
        assert_eq!(policy.tier_for(0), TrustTier::None);
    }

    #[test]
    fn test_tier_parsing_and_milestones() {
        assert_eq!("trusted_member".parse::<TrustTier>().unwrap(), TrustTier::TrustedMember);
        assert_eq!("Moderator".parse::<TrustTier>().unwrap(), TrustTier::Moderator);
        assert!("master".parse::<TrustTier>().is_err());
        assert!(TrustTier::None.milestone().is_none());
        assert!(TrustTier::Moderator.milestone().is_some());
    }
}
