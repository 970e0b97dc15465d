//! PostgreSQL-backed `TrustStore`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::database::pool::DatabasePool;
use crate::error::{TrustError, TrustResult};
use crate::moderation::ContentItem;
use crate::store::{TrustStore, UnitOfWork, UserDirectory, UserProfile};
use crate::trust::{net_delta_by_user, EntityType, ScoreDrift, TrustLedgerEntry};

pub struct PgTrustStore {
    db: Arc<DatabasePool>,
}

impl PgTrustStore {
    pub fn new(db: Arc<DatabasePool>) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Arc<DatabasePool> {
        &self.db
    }
}

#[async_trait]
impl UserDirectory for PgTrustStore {
    async fn find_user(&self, user_id: Uuid) -> TrustResult<Option<UserProfile>> {
        self.db
            .members()
            .get_member(user_id)
            .await
            .map_err(TrustError::Storage)
    }
}

#[async_trait]
impl TrustStore for PgTrustStore {
    async fn cached_score(&self, user_id: Uuid) -> TrustResult<i32> {
        self.db
            .ledger()
            .get_cached_score(user_id)
            .await
            .map_err(TrustError::Storage)
    }

    async fn ledger_score(&self, user_id: Uuid) -> TrustResult<i32> {
        self.db
            .ledger()
            .sum_entries(user_id)
            .await
            .map_err(TrustError::Storage)
    }

    async fn user_entries(&self, user_id: Uuid) -> TrustResult<Vec<TrustLedgerEntry>> {
        self.db
            .ledger()
            .entries_for_user(user_id)
            .await
            .map_err(TrustError::Storage)
    }

    async fn entity_entries(
        &self,
        entity_id: Uuid,
        entity_type: Option<EntityType>,
    ) -> TrustResult<Vec<TrustLedgerEntry>> {
        self.db
            .ledger()
            .entries_for_entity(entity_id, entity_type)
            .await
            .map_err(TrustError::Storage)
    }

    async fn find_content(&self, content_id: Uuid) -> TrustResult<Option<ContentItem>> {
        self.db
            .content()
            .get_item(content_id)
            .await
            .map_err(TrustError::Storage)
    }

    async fn reports_for_target(&self, target_id: Uuid) -> TrustResult<Vec<ContentItem>> {
        self.db
            .content()
            .reports_for_target(target_id)
            .await
            .map_err(TrustError::Storage)
    }

    async fn auto_approved_reports_since(
        &self,
        reporter_id: Uuid,
        since: DateTime<Utc>,
    ) -> TrustResult<usize> {
        self.db
            .content()
            .count_auto_approved_since(reporter_id, since)
            .await
            .map_err(TrustError::Storage)
    }

    async fn score_drift(&self) -> TrustResult<Vec<ScoreDrift>> {
        self.db
            .ledger()
            .score_drift()
            .await
            .map_err(TrustError::Storage)
    }

    async fn repair_score(&self, user_id: Uuid, score: i32) -> TrustResult<()> {
        self.db
            .ledger()
            .set_cached_score(user_id, score)
            .await
            .map_err(TrustError::Storage)
    }

    async fn commit(&self, uow: UnitOfWork) -> TrustResult<()> {
        let guards = uow.quota_guards().to_vec();
        let (entries, writes) = uow.into_parts();
        let mut tx = self.db.begin().await.map_err(TrustError::Storage)?;

        // Dropping `tx` on an early return rolls the whole unit back
        for guard in &guards {
            self.db
                .members()
                .lock_member(&mut tx, guard.reporter_id)
                .await
                .map_err(TrustError::Storage)?;
            let current = self
                .db
                .content()
                .count_auto_approved_since_in_tx(&mut tx, guard.reporter_id, guard.since)
                .await
                .map_err(TrustError::Storage)?;
            if current != guard.observed {
                warn!(
                    reporter_id = %guard.reporter_id,
                    observed = guard.observed,
                    current = current,
                    "Report quota moved, rolling back"
                );
                return Err(TrustError::quota_conflict(guard.reporter_id));
            }
        }

        for write in &writes {
            let result = if write.is_insert() {
                self.db.content().insert_item(&mut tx, &write.item).await
            } else {
                self.db
                    .content()
                    .update_item(&mut tx, &write.item, write.expected_version)
                    .await
            };
            let applied = result.map_err(TrustError::Storage)?;

            if !applied {
                warn!(
                    content_id = %write.item.id,
                    expected_version = write.expected_version,
                    "Stale content write, rolling back"
                );
                return Err(TrustError::content_conflict(write.item.id));
            }
        }

        for entry in &entries {
            self.db
                .ledger()
                .insert_entry(&mut tx, entry)
                .await
                .map_err(TrustError::Storage)?;
        }
        for (user_id, delta) in net_delta_by_user(&entries) {
            self.db
                .ledger()
                .bump_score(&mut tx, user_id, delta)
                .await
                .map_err(TrustError::Storage)?;
        }

        tx.commit()
            .await
            .map_err(|e| TrustError::Storage(format!("Failed to commit transaction: {}", e)))?;

        debug!(
            entries = entries.len(),
            content_writes = writes.len(),
            "Unit of work committed"
        );
        Ok(())
    }
}
