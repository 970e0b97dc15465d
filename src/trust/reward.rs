//! Report Reward Policy
//!
//! Reporters who flag a violation early earn more: the reward decays with the
//! time elapsed between the content being created and the report being filed.
//! Only the first few distinct reporters of a target are paid; everyone after
//! that still counts for moderation but earns nothing.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{TrustError, TrustResult};

pub const MAX_REWARDED_REPORTERS: usize = 10;
pub const TRUSTED_MEMBER_DAILY_REPORT_LIMIT: usize = 2;

/// Reports filed within `within_hours` of the content earn `points`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardWindow {
    pub within_hours: i64,
    pub points: i32,
}

impl RewardWindow {
    pub const fn new(within_hours: i64, points: i32) -> Self {
        Self {
            within_hours,
            points,
        }
    }
}

pub const DEFAULT_REWARD_WINDOWS: [RewardWindow; 2] =
    [RewardWindow::new(24, 4), RewardWindow::new(72, 2)];
pub const DEFAULT_LATE_REPORT_POINTS: i32 = 1;

/// Timestamped report used for reporter ranking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportStamp {
    pub report_id: Uuid,
    pub reporter_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Position of a report's author among the distinct reporters of a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReporterRank {
    pub report_id: Uuid,
    pub reporter_id: Uuid,
    /// Zero-based rank of the reporter, by their earliest report
    pub rank: usize,
    /// False for a reporter's second and later reports on the same target
    pub first_of_reporter: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRewardPolicy {
    windows: Vec<RewardWindow>,
    late_points: i32,
    max_rewarded_reporters: usize,
    trusted_daily_limit: usize,
}

impl ReportRewardPolicy {
    pub fn new(
        windows: Vec<RewardWindow>,
        late_points: i32,
        max_rewarded_reporters: usize,
        trusted_daily_limit: usize,
    ) -> TrustResult<Self> {
        if let Some(window) = windows
            .iter()
            .find(|w| w.within_hours <= 0 || Duration::try_hours(w.within_hours).is_none())
        {
            return Err(TrustError::InvalidPolicy(format!(
                "Reward window of {}h is out of range",
                window.within_hours
            )));
        }
        for pair in windows.windows(2) {
            if pair[0].within_hours >= pair[1].within_hours {
                return Err(TrustError::InvalidPolicy(format!(
                    "Reward windows must be strictly ascending: {}h then {}h",
                    pair[0].within_hours, pair[1].within_hours
                )));
            }
        }
        if windows.iter().any(|w| w.points < 0) || late_points < 0 {
            return Err(TrustError::InvalidPolicy(
                "Report rewards cannot be negative".to_string(),
            ));
        }

        Ok(Self {
            windows,
            late_points,
            max_rewarded_reporters,
            trusted_daily_limit,
        })
    }

    /// Points for a report filed at `report_created_at` against content created
    /// at `content_created_at`. Window bounds are inclusive.
    pub fn reward_points(
        &self,
        content_created_at: DateTime<Utc>,
        report_created_at: DateTime<Utc>,
    ) -> i32 {
        let elapsed = report_created_at - content_created_at;
        self.windows
            .iter()
            .find(|w| Duration::try_hours(w.within_hours).map_or(false, |limit| elapsed <= limit))
            .map(|w| w.points)
            .unwrap_or(self.late_points)
    }

    /// Rank the distinct reporters of one target, earliest first.
    ///
    /// Ties on timestamp are broken by report id so the order is stable across
    /// calls. The result follows the ranked order, not the input order.
    pub fn rank_reporters(&self, reports: &[ReportStamp]) -> Vec<ReporterRank> {
        let mut ordered: Vec<&ReportStamp> = reports.iter().collect();
        ordered.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.report_id.cmp(&b.report_id))
        });

        let mut ranks: HashMap<Uuid, usize> = HashMap::new();
        ordered
            .into_iter()
            .map(|stamp| {
                let next = ranks.len();
                let mut first_of_reporter = false;
                let rank = *ranks.entry(stamp.reporter_id).or_insert_with(|| {
                    first_of_reporter = true;
                    next
                });
                ReporterRank {
                    report_id: stamp.report_id,
                    reporter_id: stamp.reporter_id,
                    rank,
                    first_of_reporter,
                }
            })
            .collect()
    }

    /// Whether a ranked report earns anything at all
    pub fn is_rewarded(&self, rank: &ReporterRank) -> bool {
        rank.first_of_reporter && rank.rank < self.max_rewarded_reporters
    }

    /// Whether a trusted reporter has used up their auto-approvals for the
    /// rolling window
    pub fn daily_limit_reached(&self, auto_approved_in_window: usize) -> bool {
        auto_approved_in_window >= self.trusted_daily_limit
    }

    /// Length of the rolling window for the trusted daily limit
    pub fn daily_window(&self) -> Duration {
        Duration::hours(24)
    }

    pub fn max_rewarded_reporters(&self) -> usize {
        self.max_rewarded_reporters
    }

    pub fn trusted_daily_limit(&self) -> usize {
        self.trusted_daily_limit
    }
}

impl Default for ReportRewardPolicy {
    fn default() -> Self {
        Self {
            windows: DEFAULT_REWARD_WINDOWS.to_vec(),
            late_points: DEFAULT_LATE_REPORT_POINTS,
            max_rewarded_reporters: MAX_REWARDED_REPORTERS,
            trusted_daily_limit: TRUSTED_MEMBER_DAILY_REPORT_LIMIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp(reporter: Uuid, at: DateTime<Utc>) -> ReportStamp {
        ReportStamp {
            report_id: Uuid::new_v4(),
            reporter_id: reporter,
            created_at: at,
        }
    }

    #[test]
    fn test_reward_decay() {
        let policy = ReportRewardPolicy::default();
        let t = Utc::now();
        assert_eq!(policy.reward_points(t, t + Duration::hours(23)), 4);
        assert_eq!(policy.reward_points(t, t + Duration::hours(48)), 2);
        assert_eq!(policy.reward_points(t, t + Duration::hours(100)), 1);
    }

    #[test]
    fn test_reward_window_bounds_are_inclusive() {
        let policy = ReportRewardPolicy::default();
        let t = Utc::now();
        assert_eq!(policy.reward_points(t, t + Duration::hours(24)), 4);
        assert_eq!(
            policy.reward_points(t, t + Duration::hours(24) + Duration::seconds(1)),
            2
        );
        assert_eq!(policy.reward_points(t, t + Duration::hours(72)), 2);
        assert_eq!(
            policy.reward_points(t, t + Duration::hours(72) + Duration::seconds(1)),
            1
        );
    }

    #[test]
    fn test_only_first_ten_distinct_reporters_rewarded() {
        let policy = ReportRewardPolicy::default();
        let t = Utc::now();
        let stamps: Vec<ReportStamp> = (0..12)
            .map(|i| stamp(Uuid::new_v4(), t + Duration::minutes(i)))
            .collect();

        let ranks = policy.rank_reporters(&stamps);
        assert_eq!(ranks.len(), 12);
        for (i, rank) in ranks.iter().enumerate() {
            assert_eq!(rank.report_id, stamps[i].report_id);
            assert_eq!(rank.rank, i);
            assert_eq!(policy.is_rewarded(rank), i < 10);
        }
    }

    #[test]
    fn test_repeat_reporter_keeps_rank_but_is_paid_once() {
        let policy = ReportRewardPolicy::default();
        let t = Utc::now();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let stamps = vec![
            stamp(bob, t + Duration::minutes(10)),
            stamp(alice, t),
            stamp(alice, t + Duration::minutes(20)),
        ];

        let ranks = policy.rank_reporters(&stamps);
        assert_eq!(ranks[0].reporter_id, alice);
        assert_eq!(ranks[0].rank, 0);
        assert!(ranks[0].first_of_reporter);
        assert_eq!(ranks[1].reporter_id, bob);
        assert_eq!(ranks[1].rank, 1);
        assert_eq!(ranks[2].reporter_id, alice);
        assert_eq!(ranks[2].rank, 0);
        assert!(!policy.is_rewarded(&ranks[2]));
    }

    #[test]
    fn test_daily_limit() {
        let policy = ReportRewardPolicy::default();
        assert!(!policy.daily_limit_reached(0));
        assert!(!policy.daily_limit_reached(1));
        assert!(policy.daily_limit_reached(2));
        assert!(policy.daily_limit_reached(3));
    }

    #[test]
    fn test_policy_validation() {
        assert!(ReportRewardPolicy::new(
            vec![RewardWindow::new(72, 2), RewardWindow::new(24, 4)],
            1,
            10,
            2
        )
        .is_err());
        assert!(ReportRewardPolicy::new(vec![RewardWindow::new(24, -1)], 1, 10, 2).is_err());
        let flat = ReportRewardPolicy::new(vec![], 3, 5, 1).unwrap();
        let t = Utc::now();
        assert_eq!(flat.reward_points(t, t), 3);
    }

    #[test]
    fn test_window_hours_out_of_range_rejected() {
        for hours in [0, -24, i64::MAX] {
            let err = ReportRewardPolicy::new(vec![RewardWindow::new(hours, 4)], 1, 10, 2)
                .unwrap_err();
            assert!(matches!(err, TrustError::InvalidPolicy(_)), "{}h", hours);
        }
    }

    #[test]
    fn test_unvalidated_huge_window_does_not_panic() {
        let policy: ReportRewardPolicy = serde_json::from_value(serde_json::json!({
            "windows": [{ "within_hours": i64::MAX, "points": 4 }],
            "late_points": 1,
            "max_rewarded_reporters": 10,
            "trusted_daily_limit": 2
        }))
        .unwrap();
        let t = Utc::now();
        assert_eq!(policy.reward_points(t, t + Duration::hours(1)), 1);
    }
}
