//! Role-gated approval transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use depot_auth::Role;
use depot_core::{DomainError, DomainResult};

use crate::status::OrderStatus;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Approve,
    Reject,
}

/// `(current, required role) -> next` for the non-admin approval chain.
const CHAIN: [(OrderStatus, Role, OrderStatus); 3] = [
    (OrderStatus::Pending, Role::SquadLeader, OrderStatus::SquadApproved),
    (OrderStatus::SquadApproved, Role::TeamLeader, OrderStatus::TeamApproved),
    (OrderStatus::TeamApproved, Role::WarehouseAdmin, OrderStatus::Approved),
];

/// Decide the status an approval step leads to.
///
/// Rejection always wins. Admin authority jumps straight to APPROVED from any
/// stage of the chain; everyone else must hold exactly the role the current
/// stage asks for.
pub fn next_status(
    current: OrderStatus,
    role: Role,
    decision: Decision,
) -> DomainResult<OrderStatus> {
    if !current.awaits_approval() {
        return Err(DomainError::invalid_state(format!(
            "order in status {current} is not awaiting approval"
        )));
    }

    match decision {
        Decision::Reject => Ok(OrderStatus::Rejected),
        Decision::Approve if role.has_admin_authority() => Ok(OrderStatus::Approved),
        Decision::Approve => CHAIN
            .iter()
            .find(|(from, required, _)| *from == current && *required == role)
            .map(|(_, _, next)| *next)
            .ok_or_else(|| {
                DomainError::permission(format!("role {role} cannot approve an order in status {current}"))
            }),
    }
}

/// One recorded approval decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStep {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub role: Role,
    pub actor_name: String,
    pub decision: Decision,
    pub remark: Option<String>,
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn squad_leader_only_moves_pending_one_step() {
        assert_eq!(
            next_status(OrderStatus::Pending, Role::SquadLeader, Decision::Approve),
            Ok(OrderStatus::SquadApproved)
        );
        assert!(matches!(
            next_status(OrderStatus::Pending, Role::TeamLeader, Decision::Approve),
            Err(DomainError::Permission(_))
        ));
    }

    #[test]
    fn full_chain_reaches_approved() {
        let mut status = OrderStatus::Pending;
        for role in [Role::SquadLeader, Role::TeamLeader, Role::WarehouseAdmin] {
            status = next_status(status, role, Decision::Approve).unwrap();
        }
        assert_eq!(status, OrderStatus::Approved);
    }

    #[test]
    fn admins_fast_path_from_every_pre_approval_stage() {
        for status in [OrderStatus::Pending, OrderStatus::SquadApproved, OrderStatus::TeamApproved] {
            for role in [Role::WarehouseAdmin, Role::SystemAdmin] {
                assert_eq!(next_status(status, role, Decision::Approve), Ok(OrderStatus::Approved));
            }
        }
    }

    #[test]
    fn plain_users_can_reject_but_not_approve() {
        assert_eq!(
            next_status(OrderStatus::SquadApproved, Role::User, Decision::Reject),
            Ok(OrderStatus::Rejected)
        );
        assert!(matches!(
            next_status(OrderStatus::Pending, Role::User, Decision::Approve),
            Err(DomainError::Permission(_))
        ));
    }

    fn any_status() -> impl Strategy<Value = OrderStatus> {
        prop::sample::select(OrderStatus::ALL.to_vec())
    }

    fn any_role() -> impl Strategy<Value = Role> {
        prop::sample::select(Role::ALL.to_vec())
    }

    fn any_decision() -> impl Strategy<Value = Decision> {
        prop_oneof![Just(Decision::Approve), Just(Decision::Reject)]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: the transition function agrees with the table plus the
        /// admin override for every (status, role, decision) triple.
        #[test]
        fn transitions_match_the_table(
            status in any_status(),
            role in any_role(),
            decision in any_decision()
        ) {
            let result = next_status(status, role, decision);

            if !status.awaits_approval() {
                prop_assert!(matches!(result, Err(DomainError::InvalidState(_))));
            } else if decision == Decision::Reject {
                prop_assert_eq!(result, Ok(OrderStatus::Rejected));
            } else if role.has_admin_authority() {
                prop_assert_eq!(result, Ok(OrderStatus::Approved));
            } else {
                let expected = match (status, role) {
                    (OrderStatus::Pending, Role::SquadLeader) => Some(OrderStatus::SquadApproved),
                    (OrderStatus::SquadApproved, Role::TeamLeader) => Some(OrderStatus::TeamApproved),
                    _ => None,
                };
                match expected {
                    Some(next) => prop_assert_eq!(result, Ok(next)),
                    None => prop_assert!(matches!(result, Err(DomainError::Permission(_)))),
                }
            }
        }
    }
}
