//! Persistence contracts
//!
//! The engine and workflow only see these traits. `MemoryStore` backs tests and
//! embedders, `database::PgTrustStore` backs production.

mod memory;
mod unit_of_work;

pub use memory::MemoryStore;
pub use unit_of_work::{ContentWrite, ReportQuotaGuard, UnitOfWork};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TrustResult;
use crate::moderation::ContentItem;
use crate::trust::{EntityType, Role, ScoreDrift, TrustLedgerEntry};

/// What the engine needs to know about a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub role: Role,
}

/// User lookup owned by the identity collaborator
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, user_id: Uuid) -> TrustResult<Option<UserProfile>>;
}

/// Ledger and content persistence with an atomic commit
#[async_trait]
pub trait TrustStore: UserDirectory {
    /// Materialized score sum for a user, 0 when they have no entries
    async fn cached_score(&self, user_id: Uuid) -> TrustResult<i32>;

    /// Score recomputed from every ledger entry of the user
    async fn ledger_score(&self, user_id: Uuid) -> TrustResult<i32>;

    async fn user_entries(&self, user_id: Uuid) -> TrustResult<Vec<TrustLedgerEntry>>;

    async fn entity_entries(
        &self,
        entity_id: Uuid,
        entity_type: Option<EntityType>,
    ) -> TrustResult<Vec<TrustLedgerEntry>>;

    /// Content item by id, soft-deleted items included
    async fn find_content(&self, content_id: Uuid) -> TrustResult<Option<ContentItem>>;

    /// Live reports pointing at a document file or comment
    async fn reports_for_target(&self, target_id: Uuid) -> TrustResult<Vec<ContentItem>>;

    /// Auto-approved reports filed by `reporter_id` at or after `since`
    async fn auto_approved_reports_since(
        &self,
        reporter_id: Uuid,
        since: DateTime<Utc>,
    ) -> TrustResult<usize>;

    /// Users whose cached score disagrees with their ledger
    async fn score_drift(&self) -> TrustResult<Vec<ScoreDrift>>;

    /// Overwrite a cached score. The ledger itself is never touched.
    async fn repair_score(&self, user_id: Uuid, score: i32) -> TrustResult<()>;

    /// Apply every staged write or none of them.
    ///
    /// Fails with `Conflict` when a content item changed since it was read or
    /// a reporter's auto-approved count moved past a quota guard.
    async fn commit(&self, uow: UnitOfWork) -> TrustResult<()>;
}
