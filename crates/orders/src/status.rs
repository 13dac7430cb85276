use serde::{Deserialize, Serialize};

/// Document status.
///
/// `IN_PROGRESS` is only reachable by stocktakes (between approval and
/// completion).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    SquadApproved,
    TeamApproved,
    Approved,
    InProgress,
    Rejected,
    Executed,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 8] = [
        OrderStatus::Pending,
        OrderStatus::SquadApproved,
        OrderStatus::TeamApproved,
        OrderStatus::Approved,
        OrderStatus::InProgress,
        OrderStatus::Rejected,
        OrderStatus::Executed,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::SquadApproved => "SQUAD_APPROVED",
            OrderStatus::TeamApproved => "TEAM_APPROVED",
            OrderStatus::Approved => "APPROVED",
            OrderStatus::InProgress => "IN_PROGRESS",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Executed => "EXECUTED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    /// Still inside the approval chain.
    pub fn awaits_approval(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::SquadApproved | OrderStatus::TeamApproved
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Rejected | OrderStatus::Executed | OrderStatus::Cancelled
        )
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
