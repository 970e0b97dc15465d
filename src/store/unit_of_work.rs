//! Staged writes that commit atomically

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::moderation::ContentItem;
use crate::trust::{EntityType, TrustLedgerEntry};

/// A content write guarded by the version it was read at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentWrite {
    /// Version the item had when it was loaded, 0 for a new item
    pub expected_version: i64,
    /// Item as it should look after commit, already carrying the next version
    pub item: ContentItem,
}

impl ContentWrite {
    pub fn is_insert(&self) -> bool {
        self.expected_version == 0
    }
}

/// Auto-approved report count a decision was based on. The commit fails with
/// `Conflict` when the count changed in the meantime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportQuotaGuard {
    pub reporter_id: Uuid,
    pub since: DateTime<Utc>,
    pub observed: usize,
}

/// Ledger entries and content writes that must land together or not at all
#[derive(Debug, Default, Clone)]
pub struct UnitOfWork {
    entries: Vec<TrustLedgerEntry>,
    content: Vec<ContentWrite>,
    quota_guards: Vec<ReportQuotaGuard>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post(&mut self, entry: TrustLedgerEntry) {
        self.entries.push(entry);
    }

    /// Stage a content write and return the item with its post-commit version.
    ///
    /// Staging the same item twice keeps the version it was first read at, so
    /// the commit still detects writes that happened since then.
    pub fn stage_content(&mut self, mut item: ContentItem) -> ContentItem {
        if let Some(existing) = self.content.iter_mut().find(|w| w.item.id == item.id) {
            item.version = existing.expected_version + 1;
            existing.item = item.clone();
            return item;
        }

        let expected_version = item.version;
        item.version = expected_version + 1;
        self.content.push(ContentWrite {
            expected_version,
            item: item.clone(),
        });
        item
    }

    /// Require the reporter's auto-approved count since `since` to still be
    /// `observed` at commit time
    pub fn guard_report_quota(&mut self, reporter_id: Uuid, since: DateTime<Utc>, observed: usize) {
        self.quota_guards.push(ReportQuotaGuard {
            reporter_id,
            since,
            observed,
        });
    }

    pub fn quota_guards(&self) -> &[ReportQuotaGuard] {
        &self.quota_guards
    }

    /// Latest staged state of a content item
    pub fn staged_content(&self, content_id: Uuid) -> Option<&ContentItem> {
        self.content
            .iter()
            .find(|w| w.item.id == content_id)
            .map(|w| &w.item)
    }

    /// Staged reports pointing at `target_id`
    pub fn staged_reports_for_target(&self, target_id: Uuid) -> Vec<&ContentItem> {
        self.content
            .iter()
            .map(|w| &w.item)
            .filter(|item| {
                item.report()
                    .map_or(false, |details| details.target.id() == target_id)
            })
            .collect()
    }

    /// Uncommitted score change for a user
    pub fn pending_delta(&self, user_id: Uuid) -> i32 {
        self.entries
            .iter()
            .filter(|e| e.user_id == user_id)
            .map(|e| e.score_delta)
            .sum()
    }

    pub fn staged_entries_for_entity(
        &self,
        entity_id: Uuid,
        entity_type: Option<EntityType>,
    ) -> Vec<TrustLedgerEntry> {
        self.entries
            .iter()
            .filter(|e| e.matches_entity(entity_id, entity_type))
            .cloned()
            .collect()
    }

    pub fn entries(&self) -> &[TrustLedgerEntry] {
        &self.entries
    }

    pub fn content_writes(&self) -> &[ContentWrite] {
        &self.content
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.content.is_empty()
    }

    pub fn into_parts(self) -> (Vec<TrustLedgerEntry>, Vec<ContentWrite>) {
        (self.entries, self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::{ContentBody, ReviewFields};
    use crate::trust::EntityRef;
    use chrono::Utc;

    fn file(creator: Uuid) -> ContentItem {
        ContentItem::new(
            ContentBody::DocumentFile {
                title: "Syllabus".to_string(),
            },
            creator,
            Utc::now(),
            ReviewFields::pending(),
        )
    }

    #[test]
    fn test_stage_content_bumps_version_once() {
        let mut uow = UnitOfWork::new();
        let mut item = file(Uuid::new_v4());
        item.version = 3;

        let staged = uow.stage_content(item.clone());
        assert_eq!(staged.version, 4);

        let restaged = uow.stage_content(staged);
        assert_eq!(restaged.version, 4);
        assert_eq!(uow.content_writes().len(), 1);
        assert_eq!(uow.content_writes()[0].expected_version, 3);
        assert!(!uow.content_writes()[0].is_insert());
    }

    #[test]
    fn test_pending_delta_and_entity_filter() {
        let mut uow = UnitOfWork::new();
        let user = Uuid::new_v4();
        let entity = EntityRef::new(Uuid::new_v4(), EntityType::DocumentFile);

        uow.post(TrustLedgerEntry::new(user, 5, "file approved", Some(entity), Utc::now()));
        uow.post(TrustLedgerEntry::new(user, -2, "penalty", None, Utc::now()));
        uow.post(TrustLedgerEntry::new(Uuid::new_v4(), 4, "reward", None, Utc::now()));

        assert_eq!(uow.pending_delta(user), 3);
        assert_eq!(uow.staged_entries_for_entity(entity.id, None).len(), 1);
        assert!(uow
            .staged_entries_for_entity(entity.id, Some(EntityType::Report))
            .is_empty());
        assert!(!uow.is_empty());
    }

    #[test]
    fn test_quota_guard_is_recorded() {
        let mut uow = UnitOfWork::new();
        let reporter = Uuid::new_v4();
        let since = Utc::now();

        uow.guard_report_quota(reporter, since, 1);
        assert_eq!(
            uow.quota_guards(),
            &[ReportQuotaGuard {
                reporter_id: reporter,
                since,
                observed: 1,
            }]
        );
    }
}
