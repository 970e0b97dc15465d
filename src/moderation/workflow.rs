//! Moderation Workflow - Review State Machine
//!
//! Decides who may move content between review states and posts the trust
//! score side effects of each move. Every operation builds one `UnitOfWork`,
//! so status changes and ledger entries commit together.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{TrustError, TrustResult};
use crate::moderation::{
    ContentBody, ContentItem, ContentKind, ContentStatus, ReportDetails, ReportReason,
    ReportTarget, ReviewFields,
};
use crate::store::{TrustStore, UnitOfWork, UserProfile};
use crate::trust::{
    Applied, EntityRef, EntityType, GatedAction, PermissionGate, ReportRewardPolicy, ReportStamp,
    TrustEvent, TrustScoreEngine, TrustTier,
};

pub const FILE_APPROVED_REASON: &str = "file approved";
pub const CONTENT_HIDDEN_REASON: &str = "content hidden by report";
pub const REPORT_UPHELD_REASON: &str = "report upheld";
const VOTE_WITHDRAWN_REASON: &str = "document rating withdrawn";
const AUTO_APPROVED_NOTE: &str = "auto-approved: trusted author";

/// Point values for workflow side effects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringRules {
    /// Paid once to the creator on a document file's first approval
    pub file_approved: i32,
    /// Taken from the creator when approved content is hidden by a report
    pub hidden_penalty: i32,
    pub useful_vote: i32,
    pub not_useful_vote: i32,
}

impl ScoringRules {
    pub fn vote_points(&self, vote: Vote) -> i32 {
        match vote {
            Vote::Useful => self.useful_vote,
            Vote::NotUseful => self.not_useful_vote,
        }
    }
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            file_approved: 5,
            hidden_penalty: 2,
            useful_vote: 2,
            not_useful_vote: -2,
        }
    }
}

/// Feedback left on a document file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Vote {
    Useful,
    NotUseful,
}

impl Vote {
    fn reason(&self) -> &'static str {
        match self {
            Vote::Useful => "document rated useful",
            Vote::NotUseful => "document rated not useful",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModerationOutcome {
    /// Item as committed
    pub item: ContentItem,
    /// False when the item was already in the requested state
    pub changed: bool,
    pub events: Vec<TrustEvent>,
}

pub struct ModerationWorkflow<S: TrustStore> {
    engine: TrustScoreEngine<S>,
    rewards: ReportRewardPolicy,
    rules: ScoringRules,
}

impl<S: TrustStore> ModerationWorkflow<S> {
    pub fn new(engine: TrustScoreEngine<S>, rewards: ReportRewardPolicy, rules: ScoringRules) -> Self {
        Self {
            engine,
            rewards,
            rules,
        }
    }

    pub fn engine(&self) -> &TrustScoreEngine<S> {
        &self.engine
    }

    pub fn rewards(&self) -> &ReportRewardPolicy {
        &self.rewards
    }

    pub fn rules(&self) -> &ScoringRules {
        &self.rules
    }

    fn store(&self) -> &Arc<S> {
        self.engine.store()
    }

    pub async fn create_document_file(
        &self,
        creator: Uuid,
        title: impl Into<String>,
    ) -> TrustResult<ModerationOutcome> {
        let profile = self.engine.require_user(creator).await?;
        let now = self.engine.now();
        let review = self.creation_review(&profile, now).await?;
        let mut item = ContentItem::new(
            ContentBody::DocumentFile {
                title: title.into(),
            },
            creator,
            now,
            review,
        );

        let mut uow = UnitOfWork::new();
        let mut events = Vec::new();
        if item.status() == ContentStatus::Approved {
            let applied = self
                .engine
                .stage_apply(
                    &mut uow,
                    creator,
                    self.rules.file_approved,
                    FILE_APPROVED_REASON,
                    Some(item.entity_ref()),
                )
                .await?;
            events.extend(applied.events());
            item.approval_rewarded_at = Some(now);
        }

        let item = uow.stage_content(item);
        self.store().commit(uow).await?;

        info!(
            content_id = %item.id,
            creator_id = %creator,
            status = %item.status(),
            "Document file created"
        );
        Ok(ModerationOutcome {
            item,
            changed: true,
            events,
        })
    }

    pub async fn create_comment(
        &self,
        creator: Uuid,
        document_id: Uuid,
    ) -> TrustResult<ModerationOutcome> {
        let profile = self.engine.require_user(creator).await?;
        let now = self.engine.now();
        let review = self.creation_review(&profile, now).await?;
        let item = ContentItem::new(ContentBody::Comment { document_id }, creator, now, review);

        let mut uow = UnitOfWork::new();
        let item = uow.stage_content(item);
        self.store().commit(uow).await?;

        info!(
            content_id = %item.id,
            creator_id = %creator,
            status = %item.status(),
            "Comment created"
        );
        Ok(ModerationOutcome {
            item,
            changed: true,
            events: Vec::new(),
        })
    }

    /// File a report against a document file or comment.
    ///
    /// Reports from trusted members are approved on the spot, which upholds
    /// them immediately, until the rolling daily limit is used up.
    pub async fn submit_report(
        &self,
        reporter: Uuid,
        target: ReportTarget,
        reason: ReportReason,
        content: impl Into<String>,
    ) -> TrustResult<ModerationOutcome> {
        let mut uow = UnitOfWork::new();
        let outcome = self
            .stage_report(&mut uow, reporter, target, reason, content)
            .await?;
        self.store().commit(uow).await?;
        Ok(outcome)
    }

    /// Stage a report without committing.
    ///
    /// An auto-approval guards the reporter's daily count, so two racing
    /// submissions cannot both spend the last auto-approval.
    pub async fn stage_report(
        &self,
        uow: &mut UnitOfWork,
        reporter: Uuid,
        target: ReportTarget,
        reason: ReportReason,
        content: impl Into<String>,
    ) -> TrustResult<ModerationOutcome> {
        let profile = self.engine.require_user(reporter).await?;
        let tier = self.engine.current_tier(reporter).await?;
        if !profile.role.is_admin() && tier < TrustTier::Newbie {
            return Err(TrustError::Forbidden(format!(
                "User {} needs tier {} to file reports",
                reporter,
                TrustTier::Newbie
            )));
        }

        let target_item = self.load_live(uow, target.id()).await?;
        if target_item.kind() != target.kind() {
            return Err(TrustError::content_not_found(target.id()));
        }

        let now = self.engine.now();
        let auto_approved = self.auto_approves(uow, &profile, tier, now).await?;
        let review = if auto_approved {
            ReviewFields::approved_by(reporter, now, Some(AUTO_APPROVED_NOTE.to_string()))
        } else {
            ReviewFields::pending()
        };
        let report = ContentItem::new(
            ContentBody::Report(ReportDetails {
                target,
                reason,
                content: content.into(),
                auto_approved,
            }),
            reporter,
            now,
            review,
        );
        let report = uow.stage_content(report);

        let mut events = Vec::new();
        if auto_approved {
            self.stage_uphold(uow, &report, reporter, now, &mut events)
                .await?;
        }

        info!(
            report_id = %report.id,
            reporter_id = %reporter,
            target_id = %target.id(),
            reason = report_reason(&report),
            auto_approved = auto_approved,
            "Report submitted"
        );
        Ok(ModerationOutcome {
            item: report,
            changed: true,
            events,
        })
    }

    pub async fn transition(
        &self,
        content_id: Uuid,
        actor: Uuid,
        target: ContentStatus,
        note: Option<String>,
    ) -> TrustResult<ModerationOutcome> {
        let mut uow = UnitOfWork::new();
        let outcome = self
            .stage_transition(&mut uow, content_id, actor, target, note)
            .await?;
        self.store().commit(uow).await?;
        Ok(outcome)
    }

    /// Stage a review status change without committing.
    ///
    /// Checks run in order: actor authority, already-in-target (a metadata
    /// refresh with no ledger effect), then reachability of the target.
    pub async fn stage_transition(
        &self,
        uow: &mut UnitOfWork,
        content_id: Uuid,
        actor: Uuid,
        target: ContentStatus,
        note: Option<String>,
    ) -> TrustResult<ModerationOutcome> {
        self.engine.require_user(actor).await?;
        let mut item = self.load_live(uow, content_id).await?;
        let kind = item.kind();

        let is_resubmission = target == ContentStatus::PendingReview
            && kind.supports_resubmission()
            && item.created_by == actor;
        if !is_resubmission && !self.engine.permits(actor, GatedAction::ReviewContent).await? {
            return Err(TrustError::Forbidden(format!(
                "User {} may not review {} {}",
                actor, kind, content_id
            )));
        }

        let now = self.engine.now();
        let from = item.status();
        if from == target {
            item.review.mark_reviewed(target, actor, now, note);
            let item = uow.stage_content(item);
            debug!(
                content_id = %content_id,
                status = %target,
                "Already in requested status, review metadata refreshed"
            );
            return Ok(ModerationOutcome {
                item,
                changed: false,
                events: Vec::new(),
            });
        }

        if !from.can_transition_to(target, kind) {
            return Err(TrustError::InvalidTransition {
                kind,
                from,
                to: target,
            });
        }

        item.review.mark_reviewed(target, actor, now, note);
        let mut events = Vec::new();

        if kind == ContentKind::DocumentFile
            && target == ContentStatus::Approved
            && item.approval_rewarded_at.is_none()
        {
            let applied = self
                .engine
                .stage_apply(
                    uow,
                    item.created_by,
                    self.rules.file_approved,
                    FILE_APPROVED_REASON,
                    Some(item.entity_ref()),
                )
                .await?;
            events.extend(applied.events());
            item.approval_rewarded_at = Some(now);
        }

        let item = uow.stage_content(item);

        match (kind, from, target) {
            (ContentKind::Report, _, ContentStatus::Approved) => {
                self.stage_uphold(uow, &item, actor, now, &mut events).await?;
            }
            (ContentKind::Report, ContentStatus::PendingReview, ContentStatus::Hidden) => {
                events.push(TrustEvent::ReportRejected {
                    report_id: item.id,
                    reporter_id: item.created_by,
                });
            }
            _ => {}
        }

        info!(
            content_id = %content_id,
            kind = %kind,
            from = %from,
            to = %target,
            reviewer_id = %actor,
            "Review status changed"
        );
        Ok(ModerationOutcome {
            item,
            changed: true,
            events,
        })
    }

    /// Soft-delete content and reverse every score change tied to it
    pub async fn delete_content(
        &self,
        content_id: Uuid,
        actor: Uuid,
    ) -> TrustResult<ModerationOutcome> {
        self.engine.require_user(actor).await?;
        let mut uow = UnitOfWork::new();
        let mut item = self.load_live(&uow, content_id).await?;

        if item.created_by != actor
            && !self.engine.permits(actor, GatedAction::ReviewContent).await?
        {
            return Err(TrustError::Forbidden(format!(
                "User {} may not delete {} {}",
                actor,
                item.kind(),
                content_id
            )));
        }

        let reversals = self
            .engine
            .stage_revert(&mut uow, item.id, Some(item.kind().entity_type()))
            .await?;
        let events: Vec<TrustEvent> = reversals.iter().flat_map(Applied::events).collect();

        item.mark_deleted(actor, self.engine.now());
        let item = uow.stage_content(item);
        self.store().commit(uow).await?;

        info!(
            content_id = %content_id,
            deleted_by = %actor,
            reversals = reversals.len(),
            "Content deleted"
        );
        Ok(ModerationOutcome {
            item,
            changed: true,
            events,
        })
    }

    /// Post the score effect of a vote change on a document file.
    ///
    /// The previous vote's points are taken back before the new vote is
    /// posted. Votes on one's own file are ignored.
    pub async fn record_feedback(
        &self,
        document_id: Uuid,
        voter: Uuid,
        previous: Option<Vote>,
        current: Option<Vote>,
    ) -> TrustResult<Vec<TrustEvent>> {
        let mut uow = UnitOfWork::new();
        let events = self
            .stage_feedback(&mut uow, document_id, voter, previous, current)
            .await?;
        if !uow.is_empty() {
            self.store().commit(uow).await?;
        }
        Ok(events)
    }

    /// Stage a vote change without committing.
    ///
    /// The file is staged unchanged next to the vote entries, so a delete that
    /// commits first turns this commit into a `Conflict` instead of leaving
    /// points the reversal never saw.
    pub async fn stage_feedback(
        &self,
        uow: &mut UnitOfWork,
        document_id: Uuid,
        voter: Uuid,
        previous: Option<Vote>,
        current: Option<Vote>,
    ) -> TrustResult<Vec<TrustEvent>> {
        self.engine.require_user(voter).await?;
        let file = self.load_live(uow, document_id).await?;
        if file.kind() != ContentKind::DocumentFile {
            return Err(TrustError::NotFound {
                entity: "document_file",
                id: document_id,
            });
        }

        if file.created_by == voter || previous == current {
            debug!(document_id = %document_id, voter_id = %voter, "Vote has no score effect");
            return Ok(Vec::new());
        }

        let entity = Some(file.entity_ref());
        let mut events = Vec::new();
        if let Some(vote) = previous {
            let applied = self
                .engine
                .stage_apply(
                    uow,
                    file.created_by,
                    -self.rules.vote_points(vote),
                    VOTE_WITHDRAWN_REASON,
                    entity,
                )
                .await?;
            events.extend(applied.events());
        }
        if let Some(vote) = current {
            let applied = self
                .engine
                .stage_apply(
                    uow,
                    file.created_by,
                    self.rules.vote_points(vote),
                    vote.reason(),
                    entity,
                )
                .await?;
            events.extend(applied.events());
        }
        uow.stage_content(file);

        Ok(events)
    }

    /// Uphold an approved report: approve its pending siblings, pay the
    /// earliest distinct reporters and hide the target.
    async fn stage_uphold(
        &self,
        uow: &mut UnitOfWork,
        report: &ContentItem,
        reviewer: Uuid,
        now: DateTime<Utc>,
        events: &mut Vec<TrustEvent>,
    ) -> TrustResult<()> {
        let target_id = match report.report() {
            Some(details) => details.target.id(),
            None => return Ok(()),
        };

        let mut reports = Vec::new();
        for stored in self.store().reports_for_target(target_id).await? {
            reports.push(uow.staged_content(stored.id).cloned().unwrap_or(stored));
        }
        let staged: Vec<ContentItem> = uow
            .staged_reports_for_target(target_id)
            .into_iter()
            .cloned()
            .collect();
        for item in staged {
            if !reports.iter().any(|r| r.id == item.id) {
                reports.push(item);
            }
        }
        reports.retain(|r| !r.is_deleted());

        let mut upheld = vec![report.id];
        for sibling in reports
            .iter_mut()
            .filter(|r| r.id != report.id && r.status() == ContentStatus::PendingReview)
        {
            sibling.review.mark_reviewed(
                ContentStatus::Approved,
                reviewer,
                now,
                Some(format!("upheld together with report {}", report.id)),
            );
            *sibling = uow.stage_content(sibling.clone());
            upheld.push(sibling.id);
        }

        let target = match uow.staged_content(target_id).cloned() {
            Some(item) => Some(item),
            None => self.store().find_content(target_id).await?,
        };
        let Some(mut target) = target else {
            warn!(target_id = %target_id, "Reported content is missing, skipping rewards");
            return Ok(());
        };

        let stamps: Vec<ReportStamp> = reports
            .iter()
            .filter(|r| r.status() != ContentStatus::Hidden)
            .map(|r| ReportStamp {
                report_id: r.id,
                reporter_id: r.created_by,
                created_at: r.created_at,
            })
            .collect();

        for rank in self.rewards.rank_reporters(&stamps) {
            if !upheld.contains(&rank.report_id) {
                continue;
            }
            if !self.rewards.is_rewarded(&rank) {
                events.push(TrustEvent::ReportUnrewarded {
                    report_id: rank.report_id,
                    reporter_id: rank.reporter_id,
                    rank: rank.rank,
                });
                continue;
            }

            let reported_at = stamps
                .iter()
                .find(|s| s.report_id == rank.report_id)
                .map(|s| s.created_at)
                .unwrap_or(now);
            let points = self.rewards.reward_points(target.created_at, reported_at);
            let applied = self
                .engine
                .stage_apply(
                    uow,
                    rank.reporter_id,
                    points,
                    REPORT_UPHELD_REASON,
                    Some(EntityRef::new(rank.report_id, EntityType::Report)),
                )
                .await?;
            events.extend(applied.events());
            events.push(TrustEvent::ReportRewarded {
                report_id: rank.report_id,
                reporter_id: rank.reporter_id,
                rank: rank.rank,
                points,
            });
        }

        if target.is_deleted() || target.status() == ContentStatus::Hidden {
            // Staged unchanged so concurrent upholds on one target serialize
            uow.stage_content(target);
            return Ok(());
        }

        let was_approved = target.status() == ContentStatus::Approved;
        target.review.mark_reviewed(
            ContentStatus::Hidden,
            reviewer,
            now,
            Some(format!("hidden by report {}", report.id)),
        );
        let creator = target.created_by;
        let entity = target.entity_ref();
        uow.stage_content(target);

        if was_approved {
            let applied = self
                .engine
                .stage_apply(
                    uow,
                    creator,
                    -self.rules.hidden_penalty,
                    CONTENT_HIDDEN_REASON,
                    Some(entity),
                )
                .await?;
            events.extend(applied.events());
        }
        events.push(TrustEvent::ContentHidden {
            content_id: target_id,
            creator_id: creator,
            report_id: report.id,
        });

        info!(
            content_id = %target_id,
            report_id = %report.id,
            upheld = upheld.len(),
            "Reported content hidden"
        );
        Ok(())
    }

    async fn auto_approves(
        &self,
        uow: &mut UnitOfWork,
        profile: &UserProfile,
        tier: TrustTier,
        now: DateTime<Utc>,
    ) -> TrustResult<bool> {
        if !PermissionGate::can_perform(tier, profile.role, GatedAction::AutoApproveReport) {
            return Ok(false);
        }
        if profile.role.is_admin() {
            return Ok(true);
        }

        let since = now - self.rewards.daily_window();
        let used = self
            .store()
            .auto_approved_reports_since(profile.id, since)
            .await?;
        if self.rewards.daily_limit_reached(used) {
            info!(
                reporter_id = %profile.id,
                used = used,
                "Daily auto-approval limit reached, report queued for review"
            );
            return Ok(false);
        }
        uow.guard_report_quota(profile.id, since, used);
        Ok(true)
    }

    async fn creation_review(
        &self,
        profile: &UserProfile,
        now: DateTime<Utc>,
    ) -> TrustResult<ReviewFields> {
        let tier = self.engine.current_tier(profile.id).await?;
        if profile.role.is_admin() || tier >= TrustTier::TrustedMember {
            Ok(ReviewFields::approved_by(
                profile.id,
                now,
                Some(AUTO_APPROVED_NOTE.to_string()),
            ))
        } else {
            Ok(ReviewFields::pending())
        }
    }

    /// Latest state of a live item, staged writes first
    async fn load_live(&self, uow: &UnitOfWork, content_id: Uuid) -> TrustResult<ContentItem> {
        let item = match uow.staged_content(content_id) {
            Some(item) => Some(item.clone()),
            None => self.store().find_content(content_id).await?,
        };
        item.filter(|item| !item.is_deleted())
            .ok_or_else(|| TrustError::content_not_found(content_id))
    }
}

fn report_reason(item: &ContentItem) -> &'static str {
    item.report().map_or("", |details| details.reason.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use crate::trust::{Role, TrustLevelPolicy};

    async fn setup() -> (Arc<MemoryStore>, ModerationWorkflow<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let engine = TrustScoreEngine::new(store.clone(), TrustLevelPolicy::default())
            .with_clock(Arc::new(ManualClock::new(Utc::now())));
        let workflow =
            ModerationWorkflow::new(engine, ReportRewardPolicy::default(), ScoringRules::default());
        (store, workflow)
    }

    #[tokio::test]
    async fn test_new_member_upload_waits_for_review() {
        let (store, workflow) = setup().await;
        let user = store.add_user(Role::User).await;

        let outcome = workflow.create_document_file(user, "Notes").await.unwrap();
        assert_eq!(outcome.item.status(), ContentStatus::PendingReview);
        assert!(outcome.events.is_empty());
        assert_eq!(outcome.item.version, 1);
    }

    #[tokio::test]
    async fn test_trusted_upload_is_approved_and_rewarded_once() {
        let (store, workflow) = setup().await;
        let user = store.add_user(Role::User).await;
        workflow.engine().apply(user, 29, "backfill", None).await.unwrap();

        let outcome = workflow.create_document_file(user, "Notes").await.unwrap();
        assert_eq!(outcome.item.status(), ContentStatus::Approved);
        assert!(outcome.item.approval_rewarded_at.is_some());
        assert_eq!(workflow.engine().current_score(user).await.unwrap(), 34);
    }

    #[tokio::test]
    async fn test_comment_creation_posts_nothing() {
        let (store, workflow) = setup().await;
        let admin = store.add_user(Role::Admin).await;

        let outcome = workflow.create_comment(admin, Uuid::new_v4()).await.unwrap();
        assert_eq!(outcome.item.kind(), ContentKind::Comment);
        assert_eq!(outcome.item.status(), ContentStatus::Approved);
        assert_eq!(store.ledger_len().await, 0);
    }

    #[tokio::test]
    async fn test_feedback_swaps_vote() {
        let (store, workflow) = setup().await;
        let author = store.add_user(Role::User).await;
        let voter = store.add_user(Role::User).await;
        let file = workflow.create_document_file(author, "Notes").await.unwrap().item;

        workflow
            .record_feedback(file.id, voter, None, Some(Vote::Useful))
            .await
            .unwrap();
        assert_eq!(workflow.engine().current_score(author).await.unwrap(), 2);

        let events = workflow
            .record_feedback(file.id, voter, Some(Vote::Useful), Some(Vote::NotUseful))
            .await
            .unwrap();
        assert_eq!(events.iter().filter_map(TrustEvent::posted_entry).count(), 2);
        assert_eq!(workflow.engine().current_score(author).await.unwrap(), -2);

        workflow
            .record_feedback(file.id, voter, Some(Vote::NotUseful), None)
            .await
            .unwrap();
        assert_eq!(workflow.engine().current_score(author).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_self_vote_is_ignored() {
        let (store, workflow) = setup().await;
        let author = store.add_user(Role::User).await;
        let file = workflow.create_document_file(author, "Notes").await.unwrap().item;

        let events = workflow
            .record_feedback(file.id, author, None, Some(Vote::Useful))
            .await
            .unwrap();
        assert!(events.is_empty());
        assert_eq!(store.ledger_len().await, 0);
    }

    #[tokio::test]
    async fn test_feedback_on_comment_is_not_found() {
        let (store, workflow) = setup().await;
        let author = store.add_user(Role::User).await;
        let voter = store.add_user(Role::User).await;
        let comment = workflow.create_comment(author, Uuid::new_v4()).await.unwrap().item;

        let err = workflow
            .record_feedback(comment.id, voter, None, Some(Vote::Useful))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
