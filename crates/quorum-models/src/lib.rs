pub mod confirmation;
pub mod effect;
pub mod tally;
pub mod task;
pub mod vote;

pub use confirmation::{ConfirmationOutcome, ConfirmationStatus};
pub use effect::ChatEffect;
pub use tally::Tally;
pub use task::{TaskKind, TaskPayload};
pub use vote::{ForceResolution, VoteOutcome};
