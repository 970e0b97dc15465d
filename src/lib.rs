//! LearnHub Trust
//!
//! Trust score ledger and content moderation workflow for a document-sharing
//! community. Members earn and lose points from their contributions, points
//! map to tiers, and tiers gate what a member may do.
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── lib.rs         - Crate root with re-exports
//! ├── main.rs        - Reconciliation entrypoint
//! ├── config.rs      - Configuration management
//! ├── error.rs       - TrustError and TrustResult
//! ├── clock.rs       - Time source (system and manual)
//! ├── trust/         - Scoring core
//! │   ├── tier.rs    - Score -> tier table
//! │   ├── reward.rs  - Time-decayed report rewards & caps
//! │   ├── ledger.rs  - Append-only ledger with sum cache
//! │   ├── engine.rs  - Apply, revert, reconcile
//! │   ├── gate.rs    - Tier-gated permissions
//! │   └── events.rs  - Events returned by operations
//! ├── moderation/    - Review workflow
//! │   ├── content.rs  - Document files, comments, reports
//! │   └── workflow.rs - State machine and side effects
//! ├── store/         - Persistence contracts
//! │   ├── unit_of_work.rs - Atomic staged writes
//! │   └── memory.rs       - In-memory store
//! └── database/      - PostgreSQL persistence
//! ```

pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod moderation;
pub mod store;
pub mod trust;

// Re-export main types for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::TrustConfig;
pub use database::{DatabasePool, PgTrustStore};
pub use error::{TrustError, TrustResult};
pub use moderation::{
    ContentBody, ContentItem, ContentKind, ContentStatus, ModerationOutcome, ModerationWorkflow,
    ReportReason, ReportTarget, ScoringRules, Vote,
};
pub use store::{MemoryStore, TrustStore, UnitOfWork, UserDirectory, UserProfile};
pub use trust::{
    Applied, EntityRef, EntityType, GatedAction, PermissionGate, ReportRewardPolicy, Role,
    TierChange, TrustEvent, TrustLedgerEntry, TrustLevelPolicy, TrustScoreEngine, TrustTier,
};
