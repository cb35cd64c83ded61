use serde::{Deserialize, Serialize};

/// Lifecycle of a pre-meeting confirmation round. Transitions are monotone:
/// `Pending` moves to exactly one of the terminal states and never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationStatus {
    Pending,
    Completed,
    Cancelled,
    Expired,
}

impl ConfirmationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmationStatus::Pending => "pending",
            ConfirmationStatus::Completed => "completed",
            ConfirmationStatus::Cancelled => "cancelled",
            ConfirmationStatus::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<ConfirmationStatus> {
        match value {
            "pending" => Some(ConfirmationStatus::Pending),
            "completed" => Some(ConfirmationStatus::Completed),
            "cancelled" => Some(ConfirmationStatus::Cancelled),
            "expired" => Some(ConfirmationStatus::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConfirmationStatus::Pending)
    }
}

/// Result of recording one confirm/decline response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConfirmationOutcome {
    /// Response stored; the round is still waiting on other voters.
    Acknowledged {
        confirmed: i64,
        declined: i64,
        awaiting: i64,
    },
    /// A decline was stored. Automatic completion is now blocked; whether to
    /// cancel the round is the caller's policy.
    Declined {
        confirmed: i64,
        declined: i64,
        awaiting: i64,
    },
    /// Every voter confirmed and the meeting has been finalized.
    Completed { meeting_id: i64 },
}
