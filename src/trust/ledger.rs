//! Append-only Trust Ledger
//!
//! Every score change is a ledger entry. Entries are never mutated or removed;
//! a correction is a new entry with the opposite sign. A user's score is the
//! sum of their entries. The per-user sum cache is a materialization of that
//! fold, updated on every append, and `scan_score` stays the ground truth.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::TrustError;

/// Kind of entity a ledger entry is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    DocumentFile,
    Report,
    Comment,
    Manual,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::DocumentFile => "document_file",
            EntityType::Report => "report",
            EntityType::Comment => "comment",
            EntityType::Manual => "manual",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = TrustError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document_file" => Ok(EntityType::DocumentFile),
            "report" => Ok(EntityType::Report),
            "comment" => Ok(EntityType::Comment),
            "manual" => Ok(EntityType::Manual),
            other => Err(TrustError::Storage(format!("Unknown entity type: {}", other))),
        }
    }
}

/// The entity a score change came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: Uuid,
    pub entity_type: EntityType,
}

impl EntityRef {
    pub fn new(id: Uuid, entity_type: EntityType) -> Self {
        Self { id, entity_type }
    }
}

/// One immutable scoring event for exactly one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustLedgerEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub entity_id: Option<Uuid>,
    pub entity_type: Option<EntityType>,
    pub score_delta: i32,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl TrustLedgerEntry {
    pub fn new(
        user_id: Uuid,
        score_delta: i32,
        reason: impl Into<String>,
        entity: Option<EntityRef>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            entity_id: entity.map(|e| e.id),
            entity_type: entity.map(|e| e.entity_type),
            score_delta,
            reason: reason.into(),
            created_at,
        }
    }

    /// `entity_type: None` matches any type recorded for the id
    pub fn matches_entity(&self, entity_id: Uuid, entity_type: Option<EntityType>) -> bool {
        self.entity_id == Some(entity_id)
            && entity_type.map_or(true, |t| self.entity_type == Some(t))
    }
}

/// Net delta per user over a set of entries, in order of first appearance.
/// Users whose entries cancel out are dropped.
pub fn net_delta_by_user<'a>(
    entries: impl IntoIterator<Item = &'a TrustLedgerEntry>,
) -> Vec<(Uuid, i32)> {
    let mut order: Vec<Uuid> = Vec::new();
    let mut totals: HashMap<Uuid, i32> = HashMap::new();

    for entry in entries {
        let total = totals.entry(entry.user_id).or_insert_with(|| {
            order.push(entry.user_id);
            0
        });
        *total += entry.score_delta;
    }

    order
        .into_iter()
        .filter_map(|user_id| {
            let total = totals.get(&user_id).copied().unwrap_or(0);
            (total != 0).then_some((user_id, total))
        })
        .collect()
}

/// A user whose cached score disagrees with their ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScoreDrift {
    pub user_id: Uuid,
    pub cached: i32,
    pub ledger: i32,
}

/// In-memory append-only ledger with a per-user sum cache
#[derive(Debug, Default, Clone)]
pub struct TrustLedger {
    entries: Vec<TrustLedgerEntry>,
    by_user: HashMap<Uuid, Vec<usize>>,
    by_entity: HashMap<Uuid, Vec<usize>>,
    scores: HashMap<Uuid, i32>,
}

impl TrustLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, entry: TrustLedgerEntry) {
        let index = self.entries.len();
        self.by_user.entry(entry.user_id).or_default().push(index);
        if let Some(entity_id) = entry.entity_id {
            self.by_entity.entry(entity_id).or_default().push(index);
        }
        *self.scores.entry(entry.user_id).or_insert(0) += entry.score_delta;
        self.entries.push(entry);
    }

    /// Cached score
    pub fn score(&self, user_id: Uuid) -> i32 {
        self.scores.get(&user_id).copied().unwrap_or(0)
    }

    /// Score recomputed from every entry of the ledger
    pub fn scan_score(&self, user_id: Uuid) -> i32 {
        self.entries
            .iter()
            .filter(|e| e.user_id == user_id)
            .map(|e| e.score_delta)
            .sum()
    }

    pub fn entries_for_user(&self, user_id: Uuid) -> Vec<TrustLedgerEntry> {
        self.by_user
            .get(&user_id)
            .map(|indexes| indexes.iter().map(|&i| self.entries[i].clone()).collect())
            .unwrap_or_default()
    }

    pub fn entries_for_entity(
        &self,
        entity_id: Uuid,
        entity_type: Option<EntityType>,
    ) -> Vec<TrustLedgerEntry> {
        self.by_entity
            .get(&entity_id)
            .map(|indexes| {
                indexes
                    .iter()
                    .map(|&i| &self.entries[i])
                    .filter(|e| e.matches_entity(entity_id, entity_type))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn users(&self) -> Vec<Uuid> {
        self.by_user.keys().copied().collect()
    }

    /// Compare the cache against a full scan for every user with entries
    pub fn drift(&self) -> Vec<ScoreDrift> {
        let mut scanned: HashMap<Uuid, i32> = HashMap::new();
        for entry in &self.entries {
            *scanned.entry(entry.user_id).or_insert(0) += entry.score_delta;
        }

        scanned
            .into_iter()
            .filter_map(|(user_id, ledger)| {
                let cached = self.score(user_id);
                (cached != ledger).then_some(ScoreDrift {
                    user_id,
                    cached,
                    ledger,
                })
            })
            .collect()
    }

    /// Overwrite a cached score (cache repair only, the ledger is untouched)
    pub fn repair_score(&mut self, user_id: Uuid, score: i32) {
        self.scores.insert(user_id, score);
    }

    pub fn entries(&self) -> &[TrustLedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(user: Uuid, delta: i32, entity: Option<EntityRef>) -> TrustLedgerEntry {
        TrustLedgerEntry::new(user, delta, "test", entity, Utc::now())
    }

    #[test]
    fn test_cached_score_matches_scan() {
        let mut ledger = TrustLedger::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        ledger.append(entry(alice, 5, None));
        ledger.append(entry(bob, 2, None));
        ledger.append(entry(alice, -2, None));
        ledger.append(entry(alice, 4, None));

        assert_eq!(ledger.score(alice), 7);
        assert_eq!(ledger.scan_score(alice), 7);
        assert_eq!(ledger.score(bob), 2);
        assert_eq!(ledger.scan_score(bob), 2);
        assert!(ledger.drift().is_empty());
        assert_eq!(ledger.len(), 4);
    }

    #[test]
    fn test_unknown_user_scores_zero() {
        let ledger = TrustLedger::new();
        assert_eq!(ledger.score(Uuid::new_v4()), 0);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_entity_lookup_respects_type_filter() {
        let mut ledger = TrustLedger::new();
        let user = Uuid::new_v4();
        let file = Uuid::new_v4();

        ledger.append(entry(user, 5, Some(EntityRef::new(file, EntityType::DocumentFile))));
        ledger.append(entry(user, 2, Some(EntityRef::new(file, EntityType::DocumentFile))));
        ledger.append(entry(user, 1, None));

        assert_eq!(ledger.entries_for_entity(file, None).len(), 2);
        assert_eq!(
            ledger
                .entries_for_entity(file, Some(EntityType::DocumentFile))
                .len(),
            2
        );
        assert!(ledger
            .entries_for_entity(file, Some(EntityType::Comment))
            .is_empty());
        assert!(ledger.entries_for_entity(Uuid::new_v4(), None).is_empty());
    }

    #[test]
    fn test_net_delta_groups_and_drops_zero() {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let carol = Uuid::new_v4();
        let entries = vec![
            entry(alice, 5, None),
            entry(bob, 3, None),
            entry(alice, -2, None),
            entry(carol, 2, None),
            entry(carol, -2, None),
        ];

        let totals = net_delta_by_user(&entries);
        assert_eq!(totals, vec![(alice, 3), (bob, 3)]);
    }

    #[test]
    fn test_drift_detection_and_repair() {
        let mut ledger = TrustLedger::new();
        let user = Uuid::new_v4();
        ledger.append(entry(user, 10, None));
        ledger.repair_score(user, 3);

        let drift = ledger.drift();
        assert_eq!(drift.len(), 1);
        assert_eq!(drift[0].cached, 3);
        assert_eq!(drift[0].ledger, 10);

        ledger.repair_score(user, 10);
        assert!(ledger.drift().is_empty());
    }

    #[test]
    fn test_entity_type_round_trips_through_str() {
        for t in [
            EntityType::DocumentFile,
            EntityType::Report,
            EntityType::Comment,
            EntityType::Manual,
        ] {
            assert_eq!(t.as_str().parse::<EntityType>().unwrap(), t);
        }
    }
}
