use serde::{Deserialize, Serialize};

use depot_core::UserId;

use crate::Role;

/// The identity performing an operation, as resolved by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// `None` for work the engine performs on its own behalf.
    pub user_id: Option<UserId>,
    pub name: String,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: UserId, name: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: Some(user_id),
            name: name.into(),
            role,
        }
    }

    /// The engine itself (transfer synthesis, automated adjustments).
    pub fn system() -> Self {
        Self {
            user_id: None,
            name: "system".to_string(),
            role: Role::SystemAdmin,
        }
    }

    pub fn is_system(&self) -> bool {
        self.user_id.is_none()
    }
}
