//! Trust Score Ledger
//!
//! Every score change is an immutable ledger entry. A user's score is the sum of
//! their entries and their tier is derived from that score on demand.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐     ┌──────────────────┐
//! │ TrustLevelPolicy │────►│ TrustScoreEngine │────►│ TrustLedger      │
//! │ (score -> tier)  │     │ (apply, revert)  │     │ (append-only)    │
//! └──────────────────┘     └──────────────────┘     └──────────────────┘
//!                                  │
//!                                  ▼
//!                          ┌──────────────────┐
//!                          │ PermissionGate   │
//!                          │ (tier + role)    │
//!                          └──────────────────┘
//! ```
//!
//! ## Score Model
//!
//! - Scores start at 0 and are plain i32 sums, negatives included
//! - Deleting content posts a compensating entry per affected user
//! - Tier changes are reported as events keyed by the causing entry id
//! - Report rewards decay with the age of the reported content

mod engine;
mod events;
mod gate;
mod ledger;
mod reward;
mod tier;

pub use engine::{Applied, Reconciliation, TrustScoreEngine, REVERSAL_REASON};
pub use events::{TierChange, TrustEvent};
pub use gate::{GatedAction, PermissionGate, Role};
pub use ledger::{
    net_delta_by_user, EntityRef, EntityType, ScoreDrift, TrustLedger, TrustLedgerEntry,
};
pub use reward::{
    ReportRewardPolicy, ReportStamp, ReporterRank, RewardWindow, DEFAULT_LATE_REPORT_POINTS,
    DEFAULT_REWARD_WINDOWS, MAX_REWARDED_REPORTERS, TRUSTED_MEMBER_DAILY_REPORT_LIMIT,
};
pub use tier::{Milestone, TierThreshold, TrustLevelPolicy, TrustTier, DEFAULT_TIER_THRESHOLDS};
