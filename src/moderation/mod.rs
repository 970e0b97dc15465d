//! Content Moderation Workflow
//!
//! Document files, comments and reports move through
//! `PendingReview -> Approved -> Hidden`, with document files allowed back from
//! `Hidden` to `PendingReview` on resubmission. Side effects on trust scores
//! are posted through the `TrustScoreEngine` in the same unit of work as the
//! status change.

mod content;
mod workflow;

pub use content::{
    ContentBody, ContentItem, ContentKind, ContentStatus, Deletion, ReportDetails, ReportReason,
    ReportTarget, ReviewFields,
};
pub use workflow::{ModerationOutcome, ModerationWorkflow, ScoringRules, Vote};
