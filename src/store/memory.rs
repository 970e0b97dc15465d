//! In-memory store over `TrustLedger`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::{TrustError, TrustResult};
use crate::moderation::ContentItem;
use crate::store::{TrustStore, UnitOfWork, UserDirectory, UserProfile};
use crate::trust::{EntityType, Role, ScoreDrift, TrustLedger, TrustLedgerEntry};

#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<Uuid, UserProfile>,
    ledger: TrustLedger,
    content: HashMap<Uuid, ContentItem>,
}

/// Whole state behind one lock, so a commit is trivially atomic
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh user and return their id
    pub async fn add_user(&self, role: Role) -> Uuid {
        let profile = UserProfile {
            id: Uuid::new_v4(),
            role,
        };
        self.insert_user(profile).await;
        profile.id
    }

    pub async fn insert_user(&self, profile: UserProfile) {
        let mut state = self.state.write().await;
        state.users.insert(profile.id, profile);
    }

    pub async fn ledger_len(&self) -> usize {
        self.state.read().await.ledger.len()
    }

    pub async fn all_entries(&self) -> Vec<TrustLedgerEntry> {
        self.state.read().await.ledger.entries().to_vec()
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_user(&self, user_id: Uuid) -> TrustResult<Option<UserProfile>> {
        Ok(self.state.read().await.users.get(&user_id).copied())
    }
}

#[async_trait]
impl TrustStore for MemoryStore {
    async fn cached_score(&self, user_id: Uuid) -> TrustResult<i32> {
        Ok(self.state.read().await.ledger.score(user_id))
    }

    async fn ledger_score(&self, user_id: Uuid) -> TrustResult<i32> {
        Ok(self.state.read().await.ledger.scan_score(user_id))
    }

    async fn user_entries(&self, user_id: Uuid) -> TrustResult<Vec<TrustLedgerEntry>> {
        Ok(self.state.read().await.ledger.entries_for_user(user_id))
    }

    async fn entity_entries(
        &self,
        entity_id: Uuid,
        entity_type: Option<EntityType>,
    ) -> TrustResult<Vec<TrustLedgerEntry>> {
        Ok(self
            .state
            .read()
            .await
            .ledger
            .entries_for_entity(entity_id, entity_type))
    }

    async fn find_content(&self, content_id: Uuid) -> TrustResult<Option<ContentItem>> {
        Ok(self.state.read().await.content.get(&content_id).cloned())
    }

    async fn reports_for_target(&self, target_id: Uuid) -> TrustResult<Vec<ContentItem>> {
        let state = self.state.read().await;
        Ok(state
            .content
            .values()
            .filter(|item| !item.is_deleted())
            .filter(|item| {
                item.report()
                    .map_or(false, |details| details.target.id() == target_id)
            })
            .cloned()
            .collect())
    }

    async fn auto_approved_reports_since(
        &self,
        reporter_id: Uuid,
        since: DateTime<Utc>,
    ) -> TrustResult<usize> {
        let state = self.state.read().await;
        Ok(auto_approved_since(&state, reporter_id, since))
    }

    async fn score_drift(&self) -> TrustResult<Vec<ScoreDrift>> {
        Ok(self.state.read().await.ledger.drift())
    }

    async fn repair_score(&self, user_id: Uuid, score: i32) -> TrustResult<()> {
        self.state.write().await.ledger.repair_score(user_id, score);
        Ok(())
    }

    async fn commit(&self, uow: UnitOfWork) -> TrustResult<()> {
        let mut state = self.state.write().await;

        // Validate every write before applying any of them
        for write in uow.content_writes() {
            let current = state.content.get(&write.item.id).map(|item| item.version);
            let fresh = match current {
                Some(version) => version == write.expected_version,
                None => write.is_insert(),
            };
            if !fresh {
                return Err(TrustError::content_conflict(write.item.id));
            }
        }

        for guard in uow.quota_guards() {
            let current = auto_approved_since(&state, guard.reporter_id, guard.since);
            if current != guard.observed {
                return Err(TrustError::quota_conflict(guard.reporter_id));
            }
        }

        let (entries, writes) = uow.into_parts();
        debug!(
            entries = entries.len(),
            content_writes = writes.len(),
            "Committing unit of work"
        );

        for entry in entries {
            state.ledger.append(entry);
        }
        for write in writes {
            state.content.insert(write.item.id, write.item);
        }

        Ok(())
    }
}

fn auto_approved_since(state: &MemoryState, reporter_id: Uuid, since: DateTime<Utc>) -> usize {
    state
        .content
        .values()
        .filter(|item| item.created_by == reporter_id && item.created_at >= since)
        .filter(|item| item.report().map_or(false, |details| details.auto_approved))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::{ContentBody, ReportDetails, ReportReason, ReportTarget, ReviewFields};

    fn file(creator: Uuid) -> ContentItem {
        ContentItem::new(
            ContentBody::DocumentFile {
                title: "Exam prep".to_string(),
            },
            creator,
            Utc::now(),
            ReviewFields::pending(),
        )
    }

    #[tokio::test]
    async fn test_commit_applies_entries_and_content() {
        let store = MemoryStore::new();
        let user = store.add_user(Role::User).await;
        let item = file(user);

        let mut uow = UnitOfWork::new();
        uow.post(TrustLedgerEntry::new(user, 5, "file approved", None, Utc::now()));
        let staged = uow.stage_content(item.clone());
        store.commit(uow).await.unwrap();

        assert_eq!(store.cached_score(user).await.unwrap(), 5);
        assert_eq!(store.ledger_score(user).await.unwrap(), 5);
        let stored = store.find_content(item.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored, staged);
    }

    #[tokio::test]
    async fn test_stale_version_conflicts_and_writes_nothing() {
        let store = MemoryStore::new();
        let user = store.add_user(Role::User).await;
        let item = file(user);

        let mut create = UnitOfWork::new();
        create.stage_content(item.clone());
        store.commit(create).await.unwrap();
        let loaded = store.find_content(item.id).await.unwrap().unwrap();

        let mut first = UnitOfWork::new();
        first.stage_content(loaded.clone());
        let mut second = UnitOfWork::new();
        second.post(TrustLedgerEntry::new(user, 5, "file approved", None, Utc::now()));
        second.stage_content(loaded);

        store.commit(first).await.unwrap();
        let err = store.commit(second).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(store.ledger_len().await, 0);
        assert_eq!(store.cached_score(user).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_insert_conflicts() {
        let store = MemoryStore::new();
        let item = file(Uuid::new_v4());

        let mut first = UnitOfWork::new();
        first.stage_content(item.clone());
        store.commit(first).await.unwrap();

        let mut again = UnitOfWork::new();
        again.stage_content(item);
        assert!(matches!(
            store.commit(again).await,
            Err(TrustError::Conflict { .. })
        ));
    }

    fn auto_approved_report(reporter: Uuid, at: DateTime<Utc>) -> ContentItem {
        ContentItem::new(
            ContentBody::Report(ReportDetails {
                target: ReportTarget::DocumentFile(Uuid::new_v4()),
                reason: ReportReason::Spam,
                content: "spam".to_string(),
                auto_approved: true,
            }),
            reporter,
            at,
            ReviewFields::approved_by(reporter, at, None),
        )
    }

    #[tokio::test]
    async fn test_moved_quota_conflicts_and_writes_nothing() {
        let store = MemoryStore::new();
        let reporter = store.add_user(Role::User).await;
        let now = Utc::now();
        let since = now - chrono::Duration::hours(24);

        let mut first = UnitOfWork::new();
        first.guard_report_quota(reporter, since, 0);
        first.stage_content(auto_approved_report(reporter, now));
        let mut second = UnitOfWork::new();
        second.guard_report_quota(reporter, since, 0);
        second.post(TrustLedgerEntry::new(reporter, 4, "report upheld", None, now));
        second.stage_content(auto_approved_report(reporter, now));

        store.commit(first).await.unwrap();
        let err = store.commit(second).await.unwrap_err();
        assert_eq!(err, TrustError::quota_conflict(reporter));
        assert!(err.is_retryable());
        assert_eq!(store.auto_approved_reports_since(reporter, since).await.unwrap(), 1);
        assert_eq!(store.cached_score(reporter).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_user_lookup() {
        let store = MemoryStore::new();
        assert!(store.find_user(Uuid::new_v4()).await.unwrap().is_none());
        let admin = store.add_user(Role::Admin).await;
        assert_eq!(
            store.find_user(admin).await.unwrap().map(|p| p.role),
            Some(Role::Admin)
        );
    }
}
