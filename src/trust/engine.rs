//! Trust Score Engine - Posts and Reverses Ledger Entries
//!
//! Every operation exists in a staged form that writes into a caller-owned
//! `UnitOfWork` and a standalone form that commits its own.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::error::{TrustError, TrustResult};
use crate::store::{TrustStore, UnitOfWork, UserProfile};
use crate::trust::{
    net_delta_by_user, EntityRef, EntityType, GatedAction, PermissionGate, ScoreDrift,
    TierChange, TrustEvent, TrustLedgerEntry, TrustLevelPolicy, TrustTier,
};

pub const REVERSAL_REASON: &str = "reversal: entity deleted";

/// A posted entry and the tier change it caused, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub entry: TrustLedgerEntry,
    pub tier_change: Option<TierChange>,
}

impl Applied {
    pub fn events(&self) -> Vec<TrustEvent> {
        let mut events = vec![TrustEvent::PointsPosted(self.entry.clone())];
        if let Some(change) = &self.tier_change {
            events.push(TrustEvent::TierChanged(change.clone()));
        }
        events
    }
}

/// Result of comparing the score cache against the ledger
#[derive(Debug, Clone, Default, Serialize)]
pub struct Reconciliation {
    pub repaired: Vec<ScoreDrift>,
}

impl Reconciliation {
    pub fn is_clean(&self) -> bool {
        self.repaired.is_empty()
    }
}

pub struct TrustScoreEngine<S: TrustStore> {
    store: Arc<S>,
    policy: TrustLevelPolicy,
    clock: Arc<dyn Clock>,
}

impl<S: TrustStore> TrustScoreEngine<S> {
    pub fn new(store: Arc<S>, policy: TrustLevelPolicy) -> Self {
        Self {
            store,
            policy,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn policy(&self) -> &TrustLevelPolicy {
        &self.policy
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn require_user(&self, user_id: Uuid) -> TrustResult<UserProfile> {
        self.store
            .find_user(user_id)
            .await?
            .ok_or_else(|| TrustError::user_not_found(user_id))
    }

    /// Stage one ledger entry and compute the tier change it causes.
    ///
    /// The score before the entry includes anything already staged in `uow`.
    pub async fn stage_apply(
        &self,
        uow: &mut UnitOfWork,
        user_id: Uuid,
        points: i32,
        reason: &str,
        entity: Option<EntityRef>,
    ) -> TrustResult<Applied> {
        self.require_user(user_id).await?;

        let before = self
            .store
            .cached_score(user_id)
            .await?
            .checked_add(uow.pending_delta(user_id))
            .ok_or_else(|| TrustError::Storage(format!("Score overflow for user {}", user_id)))?;
        let after = before
            .checked_add(points)
            .ok_or_else(|| TrustError::Storage(format!("Score overflow for user {}", user_id)))?;

        let entry = TrustLedgerEntry::new(user_id, points, reason, entity, self.clock.now());
        let old_tier = self.policy.tier_for(before);
        let new_tier = self.policy.tier_for(after);

        info!(
            user_id = %user_id,
            delta = points,
            score = after,
            reason = reason,
            entry_id = %entry.id,
            "Trust score change staged"
        );

        let tier_change = (old_tier != new_tier).then(|| {
            info!(
                user_id = %user_id,
                old_tier = %old_tier,
                new_tier = %new_tier,
                score = after,
                "Trust tier changed"
            );
            TierChange::new(entry.id, user_id, old_tier, new_tier, after, points)
        });

        uow.post(entry.clone());
        Ok(Applied { entry, tier_change })
    }

    pub async fn apply(
        &self,
        user_id: Uuid,
        points: i32,
        reason: &str,
        entity: Option<EntityRef>,
    ) -> TrustResult<Applied> {
        let mut uow = UnitOfWork::new();
        let applied = self
            .stage_apply(&mut uow, user_id, points, reason, entity)
            .await?;
        self.store.commit(uow).await?;
        Ok(applied)
    }

    /// Stage a compensating entry for every user whose net score from the
    /// entity is non-zero. Entries already staged in `uow` count too.
    pub async fn stage_revert(
        &self,
        uow: &mut UnitOfWork,
        entity_id: Uuid,
        entity_type: Option<EntityType>,
    ) -> TrustResult<Vec<Applied>> {
        let mut matching = self.store.entity_entries(entity_id, entity_type).await?;
        matching.extend(uow.staged_entries_for_entity(entity_id, entity_type));

        if matching.is_empty() {
            debug!(entity_id = %entity_id, "No ledger entries to reverse");
            return Ok(Vec::new());
        }

        let mut reversals = Vec::new();
        for (user_id, net) in net_delta_by_user(&matching) {
            let reversal = self
                .stage_apply(uow, user_id, -net, REVERSAL_REASON, None)
                .await?;
            reversals.push(reversal);
        }

        info!(
            entity_id = %entity_id,
            entries = matching.len(),
            users = reversals.len(),
            "Ledger entries reversed"
        );
        Ok(reversals)
    }

    pub async fn revert_by_entity(
        &self,
        entity_id: Uuid,
        entity_type: Option<EntityType>,
    ) -> TrustResult<Vec<Applied>> {
        let mut uow = UnitOfWork::new();
        let reversals = self.stage_revert(&mut uow, entity_id, entity_type).await?;
        if !uow.is_empty() {
            self.store.commit(uow).await?;
        }
        Ok(reversals)
    }

    pub async fn current_score(&self, user_id: Uuid) -> TrustResult<i32> {
        self.require_user(user_id).await?;
        self.store.cached_score(user_id).await
    }

    pub async fn current_tier(&self, user_id: Uuid) -> TrustResult<TrustTier> {
        Ok(self.policy.tier_for(self.current_score(user_id).await?))
    }

    /// Full-scan score, the ground truth behind `current_score`
    pub async fn ledger_score(&self, user_id: Uuid) -> TrustResult<i32> {
        self.require_user(user_id).await?;
        self.store.ledger_score(user_id).await
    }

    pub async fn permits(&self, user_id: Uuid, action: GatedAction) -> TrustResult<bool> {
        let profile = self.require_user(user_id).await?;
        let tier = self.current_tier(user_id).await?;
        Ok(PermissionGate::can_perform(tier, profile.role, action))
    }

    /// Rebuild every drifted cache entry from the ledger
    pub async fn reconcile(&self) -> TrustResult<Reconciliation> {
        let drift = self.store.score_drift().await?;
        for d in &drift {
            warn!(
                user_id = %d.user_id,
                cached = d.cached,
                ledger = d.ledger,
                "Score cache drift, repairing"
            );
            self.store.repair_score(d.user_id, d.ledger).await?;
        }
        Ok(Reconciliation { repaired: drift })
    }

    /// Manual adjustment by an admin, posted as the difference to `target`
    pub async fn set_score(
        &self,
        admin_id: Uuid,
        user_id: Uuid,
        target: i32,
        reason: &str,
    ) -> TrustResult<Option<Applied>> {
        let admin = self.require_user(admin_id).await?;
        if !admin.role.is_admin() {
            return Err(TrustError::Forbidden(format!(
                "User {} may not adjust trust scores",
                admin_id
            )));
        }

        let current = self.current_score(user_id).await?;
        let delta = target
            .checked_sub(current)
            .ok_or_else(|| TrustError::Storage(format!("Score overflow for user {}", user_id)))?;
        if delta == 0 {
            debug!(user_id = %user_id, score = current, "Score already at target");
            return Ok(None);
        }

        let applied = self
            .apply(
                user_id,
                delta,
                reason,
                Some(EntityRef::new(user_id, EntityType::Manual)),
            )
            .await?;
        info!(admin_id = %admin_id, user_id = %user_id, target = target, "Trust score set manually");
        Ok(Some(applied))
    }
}
