//! User identity types.
//!
//! `AuthUser` is what the excluded API gateway hands the engine after
//! authentication. `PolicyUser` is the per-(user, policy) resolution the
//! engine actually works with — it carries the policy-scoped role and the
//! virtual flag. Virtual users are synthetic identities that exist only
//! under dry-run.

use serde::{Deserialize, Serialize};

/// Platform-level role of an authenticated identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    StandardRegistry,
    User,
    Auditor,
}

/// An authenticated identity as declared by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub username: String,
    pub did: String,
    pub role: UserRole,
}

impl AuthUser {
    pub fn new(username: impl Into<String>, did: impl Into<String>, role: UserRole) -> Self {
        Self {
            username: username.into(),
            did: did.into(),
            role,
        }
    }
}

/// A user resolved against one specific policy.
///
/// `id` equals `did` for real users; virtual users get their own synthetic
/// did. `role` is the policy-scoped role from group assignment, or `None`
/// when the user has not joined the policy yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyUser {
    pub id: String,
    pub did: String,
    pub username: String,
    pub role: Option<String>,
    pub group: Option<String>,
    pub is_virtual: bool,
}

impl PolicyUser {
    /// Resolve a real (non-virtual) user with no policy role yet.
    pub fn real(auth: &AuthUser) -> Self {
        Self {
            id: auth.did.clone(),
            did: auth.did.clone(),
            username: auth.username.clone(),
            role: None,
            group: None,
            is_virtual: false,
        }
    }
}

/// A synthetic dry-run identity with synthetic credentials.
///
/// Created by the Standard Registry role; at most one virtual user per
/// policy is `active` at a time and receives impersonated requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualUser {
    pub policy_id: String,
    pub username: String,
    pub did: String,
    pub account_id: String,
    pub private_key: String,
    pub active: bool,
}

/// A user's role assignment within a policy group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupAssignment {
    pub policy_id: String,
    pub did: String,
    pub username: String,
    pub role: String,
    pub group: String,
}
