use serde::{Deserialize, Serialize};

/// What a submitted vote did to its poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VoteOutcome {
    /// The poll is already closed; nothing was stored.
    PollClosed,
    /// Vote stored; not everyone has voted yet.
    Progress { voters: i64, expected: i64 },
    /// Vote stored; a tie not announced before was announced and the revote
    /// window was armed.
    TieAnnounced { tied: Vec<String>, round: i64 },
    /// Vote stored; the standing tie is unchanged, so no announcement.
    TieUnchanged { tied: Vec<String> },
    /// Vote stored; a single winner emerged and the poll is closed.
    Resolved {
        winning_index: i64,
        winning_text: String,
    },
}

/// How a voting timeout settled a poll that was still open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ForceResolution {
    /// Closed with the best-placed option: most votes, lowest index on a tie.
    Resolved {
        winning_index: i64,
        winning_text: String,
    },
    /// Closed without a winner because nobody voted.
    Abandoned,
    /// The poll was already closed; nothing changed.
    AlreadyClosed,
}
