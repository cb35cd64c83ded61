use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Discriminant for the `kind` column of a scheduled task. Stored redundantly
/// next to the payload so SQL can filter without parsing JSON; the string form
/// must stay identical to the serde tag of [`TaskPayload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Confirmation,
    Followup,
    UnpinMessage,
    PollVotingTimeout,
    SessionCleanup,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Confirmation => "confirmation",
            TaskKind::Followup => "followup",
            TaskKind::UnpinMessage => "unpin_message",
            TaskKind::PollVotingTimeout => "poll_voting_timeout",
            TaskKind::SessionCleanup => "session_cleanup",
        }
    }
}

/// Kind-specific data carried by a scheduled task.
///
/// The set of kinds is closed: dispatch is an exhaustive match, and an
/// unknown kind in storage fails deserialization instead of being silently
/// skipped. Payload fields are frozen copies taken at enqueue time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskPayload {
    /// Open a pre-meeting confirmation round and prompt all voters.
    Confirmation {
        poll_id: String,
        winning_text: String,
        meeting_time: DateTime<Utc>,
        pinned_message_id: Option<i64>,
    },
    /// Nudge voters who have not answered a still-pending confirmation.
    Followup { confirmation_id: i64 },
    /// Unpin a chat message some time after the meeting happened.
    UnpinMessage { message_id: i64 },
    /// Force-resolve a poll whose revote window ran out.
    PollVotingTimeout { poll_id: String },
    /// Periodic expiry and retention sweep; re-arms itself.
    SessionCleanup,
}

impl TaskPayload {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskPayload::Confirmation { .. } => TaskKind::Confirmation,
            TaskPayload::Followup { .. } => TaskKind::Followup,
            TaskPayload::UnpinMessage { .. } => TaskKind::UnpinMessage,
            TaskPayload::PollVotingTimeout { .. } => TaskKind::PollVotingTimeout,
            TaskPayload::SessionCleanup => TaskKind::SessionCleanup,
        }
    }

    /// The poll this task belongs to, when it has one.
    pub fn poll_id(&self) -> Option<&str> {
        match self {
            TaskPayload::Confirmation { poll_id, .. } => Some(poll_id),
            TaskPayload::PollVotingTimeout { poll_id } => Some(poll_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_column_matches_serde_tag() {
        let payloads = [
            TaskPayload::Confirmation {
                poll_id: "p1".into(),
                winning_text: "Mon 15:00".into(),
                meeting_time: Utc::now(),
                pinned_message_id: None,
            },
            TaskPayload::Followup { confirmation_id: 1 },
            TaskPayload::UnpinMessage { message_id: 2 },
            TaskPayload::PollVotingTimeout {
                poll_id: "p1".into(),
            },
            TaskPayload::SessionCleanup,
        ];
        for payload in payloads {
            let value: serde_json::Value = serde_json::to_value(&payload).expect("serialize");
            assert_eq!(value["kind"], payload.kind().as_str());
        }
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = serde_json::from_str::<TaskPayload>(r#"{"kind":"mystery"}"#);
        assert!(err.is_err());
    }
}
