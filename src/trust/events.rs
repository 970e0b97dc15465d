//! Events returned from engine and workflow operations
//!
//! Nothing is published in-process. Each operation hands its events back and
//! the caller decides how to deliver them (notifications, group unlocks, ...).
//! Every event carries the id of the record that caused it so consumers can
//! drop duplicate deliveries.

use serde::Serialize;
use uuid::Uuid;

use crate::trust::{Milestone, TrustLedgerEntry, TrustTier};

/// A user's tier changed as a result of one ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierChange {
    /// Ledger entry that caused the change, usable as a dedupe key
    pub entry_id: Uuid,
    pub user_id: Uuid,
    pub old_tier: TrustTier,
    pub new_tier: TrustTier,
    pub new_score: i32,
    pub score_delta: i32,
    /// Congratulation copy, present on promotions only
    pub milestone: Option<Milestone>,
}

impl TierChange {
    pub fn new(
        entry_id: Uuid,
        user_id: Uuid,
        old_tier: TrustTier,
        new_tier: TrustTier,
        new_score: i32,
        score_delta: i32,
    ) -> Self {
        let milestone = if new_tier > old_tier {
            new_tier.milestone()
        } else {
            None
        };
        Self {
            entry_id,
            user_id,
            old_tier,
            new_tier,
            new_score,
            score_delta,
            milestone,
        }
    }

    pub fn is_promotion(&self) -> bool {
        self.new_tier > self.old_tier
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrustEvent {
    /// A ledger entry was written
    PointsPosted(TrustLedgerEntry),
    TierChanged(TierChange),
    /// An upheld report earned its author a reward
    ReportRewarded {
        report_id: Uuid,
        reporter_id: Uuid,
        rank: usize,
        points: i32,
    },
    /// An upheld report came after the reward cap was reached
    ReportUnrewarded {
        report_id: Uuid,
        reporter_id: Uuid,
        rank: usize,
    },
    /// A report was rejected by a reviewer
    ReportRejected { report_id: Uuid, reporter_id: Uuid },
    /// Content was hidden because a report against it was upheld
    ContentHidden {
        content_id: Uuid,
        creator_id: Uuid,
        report_id: Uuid,
    },
}

impl TrustEvent {
    pub fn tier_change(&self) -> Option<&TierChange> {
        match self {
            TrustEvent::TierChanged(change) => Some(change),
            _ => None,
        }
    }

    pub fn posted_entry(&self) -> Option<&TrustLedgerEntry> {
        match self {
            TrustEvent::PointsPosted(entry) => Some(entry),
            _ => None,
        }
    }
}
