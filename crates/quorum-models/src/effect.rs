use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Instruction for the chat transport, produced by executing a scheduled
/// task. All durable state work has already been committed by the time an
/// effect is emitted; effects only describe messages to send or edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum ChatEffect {
    /// Ask every voter to re-affirm the winning slot before the meeting.
    SendConfirmationPrompt {
        chat_id: i64,
        confirmation_id: i64,
        winning_text: String,
        meeting_time: DateTime<Utc>,
        voters: Vec<i64>,
    },
    /// Remind voters who have not answered the confirmation prompt.
    NudgePending {
        chat_id: i64,
        confirmation_id: i64,
        pending: Vec<i64>,
    },
    /// Unpin a previously pinned message.
    UnpinMessage { chat_id: i64, message_id: i64 },
    /// Announce the winner picked when the revote window ran out.
    PollForceResolved {
        chat_id: i64,
        poll_id: String,
        winning_index: i64,
        winning_text: String,
    },
    /// Announce that a poll timed out with no votes and was dropped.
    PollAbandoned { chat_id: i64, poll_id: String },
}
