//! `depot-auth`: actor identity and role resolution boundary.
//!
//! Authentication lives outside this workspace. The core only consumes the
//! current actor and one of five role tags; this crate defines both plus the
//! collaborator trait that turns a user id into an actor.

pub mod authorize;
pub mod principal;
pub mod roles;

pub use authorize::{InMemoryRoleResolver, RoleResolver};
pub use principal::Actor;
pub use roles::{Role, UnknownRole};
