//! Tier-gated permissions
//!
//! Pure lookup, no I/O.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TrustError;
use crate::trust::TrustTier;

/// Platform role, issued by the identity collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Admin => "Admin",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = TrustError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            r if r.eq_ignore_ascii_case("admin") => Ok(Role::Admin),
            r if r.eq_ignore_ascii_case("user") => Ok(Role::User),
            other => Err(TrustError::InvalidPolicy(format!("Unknown role: {}", other))),
        }
    }
}

/// Closed set of actions gated on trust tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GatedAction {
    ReviewContent,
    CreateConversation,
    AutoApproveReport,
}

impl GatedAction {
    pub const fn required_tier(&self) -> TrustTier {
        match self {
            GatedAction::ReviewContent => TrustTier::Moderator,
            GatedAction::CreateConversation => TrustTier::Contributor,
            GatedAction::AutoApproveReport => TrustTier::TrustedMember,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PermissionGate;

impl PermissionGate {
    /// Admin satisfies every gate regardless of tier
    pub fn can_perform(tier: TrustTier, role: Role, action: GatedAction) -> bool {
        role.is_admin() || tier >= action.required_tier()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contributor_cannot_review() {
        assert!(!PermissionGate::can_perform(
            TrustTier::Contributor,
            Role::User,
            GatedAction::ReviewContent
        ));
        assert!(PermissionGate::can_perform(
            TrustTier::Contributor,
            Role::User,
            GatedAction::CreateConversation
        ));
    }

    #[test]
    fn test_admin_passes_every_gate() {
        for tier in TrustTier::ALL {
            for action in [
                GatedAction::ReviewContent,
                GatedAction::CreateConversation,
                GatedAction::AutoApproveReport,
            ] {
                assert!(PermissionGate::can_perform(tier, Role::Admin, action));
            }
        }
    }

    #[test]
    fn test_required_tiers() {
        assert!(!PermissionGate::can_perform(
            TrustTier::Contributor,
            Role::User,
            GatedAction::AutoApproveReport
        ));
        assert!(PermissionGate::can_perform(
            TrustTier::TrustedMember,
            Role::User,
            GatedAction::AutoApproveReport
        ));
        assert!(PermissionGate::can_perform(
            TrustTier::Moderator,
            Role::User,
            GatedAction::ReviewContent
        ));
        assert!(!PermissionGate::can_perform(
            TrustTier::Newbie,
            Role::User,
            GatedAction::CreateConversation
        ));
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("user".parse::<Role>().unwrap(), Role::User);
        assert!("root".parse::<Role>().is_err());
    }
}
