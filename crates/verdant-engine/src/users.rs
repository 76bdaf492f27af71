//! Per-policy user resolution.
//!
//! Under dry-run the Standard Registry impersonates virtual users: a
//! resolution request from the registry lands on the active virtual user,
//! falling back to the real identity while none exists yet. Any other role
//! is refused — dry-run belongs to the policy author alone.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;
use verdant_contracts::{
    error::{EngineError, EngineResult},
    policy::Policy,
    user::{AuthUser, GroupAssignment, PolicyUser, UserRole, VirtualUser},
};

use crate::traits::DocumentStore;

pub struct UserResolver {
    store: Arc<dyn DocumentStore>,
}

impl UserResolver {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Resolve `auth` against `policy`.
    pub async fn resolve(&self, policy: &Policy, auth: &AuthUser) -> EngineResult<PolicyUser> {
        if policy.is_dry_run() {
            return self.resolve_dry_run(policy, auth).await;
        }
        self.resolve_real(policy, auth).await
    }

    async fn resolve_real(&self, policy: &Policy, auth: &AuthUser) -> EngineResult<PolicyUser> {
        let mut user = PolicyUser::real(auth);
        if let Some(assignment) = self.store.group_assignment(&policy.id, &auth.did).await? {
            user.role = Some(assignment.role);
            user.group = Some(assignment.group);
        }
        Ok(user)
    }

    async fn resolve_dry_run(&self, policy: &Policy, auth: &AuthUser) -> EngineResult<PolicyUser> {
        if auth.role != UserRole::StandardRegistry {
            return Err(EngineError::permission(
                "only the standard registry may drive a policy in dry-run",
            ));
        }

        let virtual_users = self.store.virtual_users(&policy.id).await?;
        let active = virtual_users.into_iter().find(|u| u.active);
        match active {
            Some(virt) => {
                let mut user = PolicyUser {
                    id: virt.did.clone(),
                    did: virt.did.clone(),
                    username: virt.username,
                    role: None,
                    group: None,
                    is_virtual: true,
                };
                if let Some(assignment) =
                    self.store.group_assignment(&policy.id, &virt.did).await?
                {
                    user.role = Some(assignment.role);
                    user.group = Some(assignment.group);
                }
                debug!(policy_id = %policy.id, virtual_did = %user.did, "impersonating virtual user");
                Ok(user)
            }
            // No virtual user yet; the registry acts as itself.
            None => self.resolve_real(policy, auth).await,
        }
    }

    /// Create a virtual user in a dry-run policy. The first one created
    /// becomes active.
    pub async fn create_virtual_user(
        &self,
        policy: &Policy,
        requester: &AuthUser,
        username: &str,
    ) -> EngineResult<VirtualUser> {
        if requester.role != UserRole::StandardRegistry || requester.did != policy.owner {
            return Err(EngineError::permission(
                "only the policy owner may create virtual users",
            ));
        }
        if !policy.is_dry_run() {
            return Err(EngineError::validation(format!(
                "policy '{}' is not in dry-run",
                policy.id
            )));
        }

        let existing = self.store.virtual_users(&policy.id).await?;
        let user = VirtualUser {
            policy_id: policy.id.clone(),
            username: username.to_string(),
            did: format!("did:virtual:{}", Uuid::new_v4()),
            account_id: format!("0.0.virtual-{}", existing.len() + 1),
            private_key: Uuid::new_v4().simple().to_string(),
            active: existing.is_empty(),
        };
        self.store.save_virtual_user(&user).await?;
        Ok(user)
    }

    /// Switch which virtual user receives impersonated requests.
    pub async fn set_active_virtual_user(
        &self,
        policy: &Policy,
        requester: &AuthUser,
        did: &str,
    ) -> EngineResult<()> {
        if requester.role != UserRole::StandardRegistry || requester.did != policy.owner {
            return Err(EngineError::permission(
                "only the policy owner may switch virtual users",
            ));
        }
        self.store.set_active_virtual_user(&policy.id, did).await
    }

    pub async fn virtual_users(&self, policy: &Policy) -> EngineResult<Vec<VirtualUser>> {
        self.store.virtual_users(&policy.id).await
    }

    /// Every role assignment recorded for the policy.
    pub async fn role_list(&self, policy: &Policy) -> EngineResult<Vec<GroupAssignment>> {
        self.store.group_assignments(&policy.id).await
    }

    /// Role assignments held by the policy's virtual users.
    pub async fn virtual_role_list(&self, policy: &Policy) -> EngineResult<Vec<GroupAssignment>> {
        let virtual_dids: Vec<String> = self
            .store
            .virtual_users(&policy.id)
            .await?
            .into_iter()
            .map(|u| u.did)
            .collect();
        let mut assignments = self.store.group_assignments(&policy.id).await?;
        assignments.retain(|a| virtual_dids.contains(&a.did));
        Ok(assignments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use verdant_contracts::policy::PolicyStatus;

    fn registry_user() -> AuthUser {
        AuthUser::new("owner", "did:owner", UserRole::StandardRegistry)
    }

    fn dry_run_policy() -> Policy {
        let mut policy = Policy::new_draft("Carbon", "did:owner");
        policy.status = PolicyStatus::DryRun;
        policy
    }

    #[tokio::test]
    async fn plain_users_are_refused_under_dry_run() {
        let resolver = UserResolver::new(Arc::new(InMemoryStore::new()));
        let policy = dry_run_policy();
        let auth = AuthUser::new("farmer", "did:farmer", UserRole::User);
        assert!(matches!(
            resolver.resolve(&policy, &auth).await,
            Err(EngineError::Permission { .. })
        ));
    }

    #[tokio::test]
    async fn registry_falls_back_to_itself_without_virtual_users() {
        let resolver = UserResolver::new(Arc::new(InMemoryStore::new()));
        let policy = dry_run_policy();
        let user = resolver.resolve(&policy, &registry_user()).await.unwrap();
        assert!(!user.is_virtual);
        assert_eq!(user.did, "did:owner");
    }

    #[tokio::test]
    async fn registry_lands_on_active_virtual_user() {
        let resolver = UserResolver::new(Arc::new(InMemoryStore::new()));
        let policy = dry_run_policy();
        let virt = resolver
            .create_virtual_user(&policy, &registry_user(), "Administrator")
            .await
            .unwrap();

        let user = resolver.resolve(&policy, &registry_user()).await.unwrap();
        assert!(user.is_virtual);
        assert_eq!(user.did, virt.did);
    }

    #[tokio::test]
    async fn switching_virtual_users_moves_impersonation() {
        let resolver = UserResolver::new(Arc::new(InMemoryStore::new()));
        let policy = dry_run_policy();
        let registry = registry_user();
        resolver
            .create_virtual_user(&policy, &registry, "Administrator")
            .await
            .unwrap();
        let second = resolver
            .create_virtual_user(&policy, &registry, "Farmer")
            .await
            .unwrap();

        resolver
            .set_active_virtual_user(&policy, &registry, &second.did)
            .await
            .unwrap();
        let user = resolver.resolve(&policy, &registry).await.unwrap();
        assert_eq!(user.did, second.did);
    }

    #[tokio::test]
    async fn virtual_users_require_dry_run_and_ownership() {
        let resolver = UserResolver::new(Arc::new(InMemoryStore::new()));
        let mut policy = dry_run_policy();
        let stranger = AuthUser::new("other", "did:other", UserRole::StandardRegistry);
        assert!(matches!(
            resolver
                .create_virtual_user(&policy, &stranger, "x")
                .await,
            Err(EngineError::Permission { .. })
        ));

        policy.status = PolicyStatus::Draft;
        assert!(matches!(
            resolver
                .create_virtual_user(&policy, &registry_user(), "x")
                .await,
            Err(EngineError::Validation { .. })
        ));
    }
}
