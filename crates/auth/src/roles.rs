use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role tag consumed by the approval state machine.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    SystemAdmin,
    WarehouseAdmin,
    TeamLeader,
    SquadLeader,
    User,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl Role {
    pub const ALL: [Role; 5] = [
        Role::SystemAdmin,
        Role::WarehouseAdmin,
        Role::TeamLeader,
        Role::SquadLeader,
        Role::User,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SystemAdmin => "SYSTEM_ADMIN",
            Role::WarehouseAdmin => "WAREHOUSE_ADMIN",
            Role::TeamLeader => "TEAM_LEADER",
            Role::SquadLeader => "SQUAD_LEADER",
            Role::User => "USER",
        }
    }

    /// Holders may approve any pre-terminal order straight to APPROVED.
    pub fn has_admin_authority(&self) -> bool {
        matches!(self, Role::SystemAdmin | Role::WarehouseAdmin)
    }

    /// Pick the role that governs approval for a user holding several.
    ///
    /// Authority order is admin, warehouse admin, team leader, squad leader;
    /// a user holding none of them acts as a plain user.
    pub fn effective<I>(roles: I) -> Role
    where
        I: IntoIterator<Item = Role>,
    {
        roles.into_iter().min().unwrap_or(Role::User)
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SYSTEM_ADMIN" | "ROLE_ADMIN" | "ADMIN" => Ok(Role::SystemAdmin),
            "WAREHOUSE_ADMIN" => Ok(Role::WarehouseAdmin),
            "TEAM_LEADER" => Ok(Role::TeamLeader),
            "SQUAD_LEADER" => Ok(Role::SquadLeader),
            "USER" | "ROLE_USER" => Ok(Role::User),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}
