use std::collections::HashMap;
use std::sync::RwLock;

use depot_core::{DomainError, DomainResult, UserId};

use crate::{Actor, Role};

/// Current-actor role resolution collaborator.
///
/// Implementations sit on top of whatever user directory the deployment has.
/// An unknown user is `NotFound`; a known user without approver roles
/// resolves with `Role::User`.
pub trait RoleResolver: Send + Sync {
    fn resolve(&self, user_id: UserId) -> DomainResult<Actor>;
}

impl<R: RoleResolver + ?Sized> RoleResolver for std::sync::Arc<R> {
    fn resolve(&self, user_id: UserId) -> DomainResult<Actor> {
        (**self).resolve(user_id)
    }
}

#[derive(Debug, Clone)]
struct Registered {
    name: String,
    roles: Vec<Role>,
}

/// In-memory user directory for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryRoleResolver {
    users: RwLock<HashMap<UserId, Registered>>,
}

impl InMemoryRoleResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, user_id: UserId, name: impl Into<String>, roles: impl Into<Vec<Role>>) {
        let mut users = self.users.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        users.insert(
            user_id,
            Registered {
                name: name.into(),
                roles: roles.into(),
            },
        );
    }
}

impl RoleResolver for InMemoryRoleResolver {
    fn resolve(&self, user_id: UserId) -> DomainResult<Actor> {
        let users = self.users.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        let user = users
            .get(&user_id)
            .ok_or_else(|| DomainError::not_found(format!("user {user_id}")))?;

        let role = Role::effective(user.roles.iter().copied());
        tracing::debug!(%user_id, %role, "resolved actor role");
        Ok(Actor::new(user_id, user.name.clone(), role))
    }
}
