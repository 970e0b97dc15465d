//! Moderated content items
//!
//! Document files, comments and reports share one review lifecycle. They are
//! modelled as a single `ContentItem` whose `body` carries the kind-specific
//! data, with the review fields embedded by value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::TrustError;
use crate::trust::{EntityRef, EntityType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentKind {
    DocumentFile,
    Comment,
    Report,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::DocumentFile => "document_file",
            ContentKind::Comment => "comment",
            ContentKind::Report => "report",
        }
    }

    pub fn entity_type(&self) -> EntityType {
        match self {
            ContentKind::DocumentFile => EntityType::DocumentFile,
            ContentKind::Comment => EntityType::Comment,
            ContentKind::Report => EntityType::Report,
        }
    }

    /// Only document files may go back from Hidden to PendingReview
    pub fn supports_resubmission(&self) -> bool {
        matches!(self, ContentKind::DocumentFile)
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = TrustError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document_file" => Ok(ContentKind::DocumentFile),
            "comment" => Ok(ContentKind::Comment),
            "report" => Ok(ContentKind::Report),
            other => Err(TrustError::Storage(format!("Unknown content kind: {}", other))),
        }
    }
}

/// Review status of a content item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentStatus {
    PendingReview,
    Approved,
    Hidden,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::PendingReview => "pending_review",
            ContentStatus::Approved => "approved",
            ContentStatus::Hidden => "hidden",
        }
    }

    /// Transition table. Staying in the same status is not a transition and
    /// is handled by the workflow as a metadata refresh.
    pub fn can_transition_to(&self, target: ContentStatus, kind: ContentKind) -> bool {
        use ContentStatus::*;
        match (self, target) {
            (PendingReview, Approved) | (PendingReview, Hidden) | (Approved, Hidden) => true,
            (Hidden, PendingReview) => kind.supports_resubmission(),
            _ => false,
        }
    }
}

impl fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentStatus {
    type Err = TrustError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_review" => Ok(ContentStatus::PendingReview),
            "approved" => Ok(ContentStatus::Approved),
            "hidden" => Ok(ContentStatus::Hidden),
            other => Err(TrustError::Storage(format!("Unknown content status: {}", other))),
        }
    }
}

/// Review metadata shared by every content kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewFields {
    pub status: ContentStatus,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_note: Option<String>,
}

impl ReviewFields {
    pub fn pending() -> Self {
        Self {
            status: ContentStatus::PendingReview,
            reviewed_by: None,
            reviewed_at: None,
            review_note: None,
        }
    }

    pub fn approved_by(reviewer: Uuid, at: DateTime<Utc>, note: Option<String>) -> Self {
        Self {
            status: ContentStatus::Approved,
            reviewed_by: Some(reviewer),
            reviewed_at: Some(at),
            review_note: note,
        }
    }

    pub fn mark_reviewed(
        &mut self,
        status: ContentStatus,
        reviewer: Uuid,
        at: DateTime<Utc>,
        note: Option<String>,
    ) {
        self.status = status;
        self.reviewed_by = Some(reviewer);
        self.reviewed_at = Some(at);
        self.review_note = note;
    }
}

/// What a report points at. A report targets exactly one of the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportTarget {
    DocumentFile(Uuid),
    Comment(Uuid),
}

impl ReportTarget {
    pub fn id(&self) -> Uuid {
        match self {
            ReportTarget::DocumentFile(id) | ReportTarget::Comment(id) => *id,
        }
    }

    pub fn kind(&self) -> ContentKind {
        match self {
            ReportTarget::DocumentFile(_) => ContentKind::DocumentFile,
            ReportTarget::Comment(_) => ContentKind::Comment,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportReason {
    Spam,
    Inappropriate,
    Copyright,
    Misleading,
    Other,
}

impl ReportReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportReason::Spam => "spam",
            ReportReason::Inappropriate => "inappropriate",
            ReportReason::Copyright => "copyright",
            ReportReason::Misleading => "misleading",
            ReportReason::Other => "other",
        }
    }
}

impl FromStr for ReportReason {
    type Err = TrustError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spam" => Ok(ReportReason::Spam),
            "inappropriate" => Ok(ReportReason::Inappropriate),
            "copyright" => Ok(ReportReason::Copyright),
            "misleading" => Ok(ReportReason::Misleading),
            "other" => Ok(ReportReason::Other),
            other => Err(TrustError::Storage(format!("Unknown report reason: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportDetails {
    pub target: ReportTarget,
    pub reason: ReportReason,
    pub content: String,
    /// Approved at submission because the reporter is trusted
    pub auto_approved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentBody {
    DocumentFile { title: String },
    Comment { document_id: Uuid },
    Report(ReportDetails),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deletion {
    pub deleted_by: Uuid,
    pub deleted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: Uuid,
    pub body: ContentBody,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub review: ReviewFields,
    pub deletion: Option<Deletion>,
    /// Set once the first-approval reward of a document file was posted
    pub approval_rewarded_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency token, 0 until first persisted
    pub version: i64,
}

impl ContentItem {
    pub fn new(
        body: ContentBody,
        created_by: Uuid,
        created_at: DateTime<Utc>,
        review: ReviewFields,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            body,
            created_by,
            created_at,
            review,
            deletion: None,
            approval_rewarded_at: None,
            version: 0,
        }
    }

    pub fn kind(&self) -> ContentKind {
        match self.body {
            ContentBody::DocumentFile { .. } => ContentKind::DocumentFile,
            ContentBody::Comment { .. } => ContentKind::Comment,
            ContentBody::Report(_) => ContentKind::Report,
        }
    }

    pub fn status(&self) -> ContentStatus {
        self.review.status
    }

    pub fn is_deleted(&self) -> bool {
        self.deletion.is_some()
    }

    pub fn report(&self) -> Option<&ReportDetails> {
        match &self.body {
            ContentBody::Report(details) => Some(details),
            _ => None,
        }
    }

    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.id, self.kind().entity_type())
    }

    pub fn mark_deleted(&mut self, deleted_by: Uuid, deleted_at: DateTime<Utc>) {
        self.deletion = Some(Deletion {
            deleted_by,
            deleted_at,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ContentStatus::*;

    #[test]
    fn test_transition_table() {
        for kind in [ContentKind::DocumentFile, ContentKind::Comment, ContentKind::Report] {
            assert!(PendingReview.can_transition_to(Approved, kind));
            assert!(PendingReview.can_transition_to(Hidden, kind));
            assert!(Approved.can_transition_to(Hidden, kind));
            assert!(!Hidden.can_transition_to(Approved, kind));
            assert!(!Approved.can_transition_to(PendingReview, kind));
        }
        assert!(Hidden.can_transition_to(PendingReview, ContentKind::DocumentFile));
        assert!(!Hidden.can_transition_to(PendingReview, ContentKind::Comment));
        assert!(!Hidden.can_transition_to(PendingReview, ContentKind::Report));
    }

    #[test]
    fn test_mark_reviewed_records_metadata() {
        let reviewer = Uuid::new_v4();
        let now = Utc::now();
        let mut review = ReviewFields::pending();
        review.mark_reviewed(Hidden, reviewer, now, Some("spam".to_string()));

        assert_eq!(review.status, Hidden);
        assert_eq!(review.reviewed_by, Some(reviewer));
        assert_eq!(review.reviewed_at, Some(now));
        assert_eq!(review.review_note.as_deref(), Some("spam"));
    }

    #[test]
    fn test_item_kind_and_entity() {
        let creator = Uuid::new_v4();
        let file = ContentItem::new(
            ContentBody::DocumentFile {
                title: "Lecture notes".to_string(),
            },
            creator,
            Utc::now(),
            ReviewFields::pending(),
        );
        assert_eq!(file.kind(), ContentKind::DocumentFile);
        assert_eq!(file.entity_ref().entity_type, EntityType::DocumentFile);
        assert!(file.report().is_none());
        assert_eq!(file.version, 0);

        let report = ContentItem::new(
            ContentBody::Report(ReportDetails {
                target: ReportTarget::DocumentFile(file.id),
                reason: ReportReason::Spam,
                content: "ads".to_string(),
                auto_approved: false,
            }),
            Uuid::new_v4(),
            Utc::now(),
            ReviewFields::pending(),
        );
        assert_eq!(report.kind(), ContentKind::Report);
        assert_eq!(report.report().unwrap().target.id(), file.id);
    }

    #[test]
    fn test_status_strings() {
        for status in [PendingReview, Approved, Hidden] {
            assert_eq!(status.as_str().parse::<ContentStatus>().unwrap(), status);
        }
        assert!("rejected".parse::<ContentStatus>().is_err());
    }
}
