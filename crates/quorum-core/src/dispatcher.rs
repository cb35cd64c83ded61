use crate::error::CoreError;
use crate::AppState;
use chrono::{DateTime, Utc};
use quorum_db::tasks::TaskRow;
use quorum_models::{ChatEffect, ForceResolution, TaskKind, TaskPayload};
use uuid::Uuid;

/// Row cap per table for one cleanup pass; the next pass picks up the rest.
const CLEANUP_BATCH: i64 = 500;

/// A claimed task with the chat effects its execution produced. The claim
/// token travels inside the task row; completing the task requires it.
#[derive(Debug, serde::Serialize)]
pub struct ClaimedTask {
    pub task: TaskRow,
    pub effects: Vec<ChatEffect>,
}

/// Claim and execute the next due task, if any. Durable state work is
/// committed by the time this returns; the caller delivers the effects and
/// then calls [`complete`]. A crash in between leaves the task claimed until
/// its lease runs out, after which it is redelivered.
pub async fn claim_next(state: &AppState) -> Result<Option<ClaimedTask>, CoreError> {
    let token = Uuid::new_v4().to_string();
    let Some(task) =
        quorum_db::tasks::claim_next_due(&state.db, Utc::now(), state.settings.claim_lease, &token)
            .await?
    else {
        return Ok(None);
    };
    tracing::debug!(task_id = task.id, kind = %task.kind, "task claimed");
    let effects = execute(state, &task).await?;
    Ok(Some(ClaimedTask { task, effects }))
}

/// Mark a claimed task executed. Errors distinguish an unknown task, a
/// finished one, and a token that lost its lease to another claimant.
pub async fn complete(state: &AppState, task_id: i64, claim_token: &str) -> Result<(), CoreError> {
    if quorum_db::tasks::complete(&state.db, task_id, claim_token, Utc::now()).await? {
        return Ok(());
    }
    match quorum_db::tasks::get_task(&state.db, task_id).await? {
        None => Err(CoreError::NotFound),
        Some(task) if task.executed => {
            Err(CoreError::Conflict("task is already completed".into()))
        }
        Some(_) => Err(CoreError::Conflict("claim token does not match".into())),
    }
}

/// Run one task's handler. Every handler re-checks its preconditions against
/// durable state, so a redelivered task converges instead of repeating side
/// effects; stale tasks degrade to no-ops.
pub async fn execute(state: &AppState, task: &TaskRow) -> Result<Vec<ChatEffect>, CoreError> {
    match &task.payload.0 {
        TaskPayload::Confirmation {
            poll_id,
            winning_text,
            meeting_time,
            pinned_message_id,
        } => {
            run_confirmation(
                state,
                task,
                poll_id,
                winning_text,
                *meeting_time,
                *pinned_message_id,
            )
            .await
        }
        TaskPayload::Followup { confirmation_id } => run_followup(state, *confirmation_id).await,
        TaskPayload::UnpinMessage { message_id } => {
            run_unpin(state, task.chat_id, *message_id).await
        }
        TaskPayload::PollVotingTimeout { poll_id } => {
            run_voting_timeout(state, task.chat_id, poll_id).await
        }
        TaskPayload::SessionCleanup => run_cleanup(state, task).await,
    }
}

async fn run_confirmation(
    state: &AppState,
    task: &TaskRow,
    poll_id: &str,
    winning_text: &str,
    meeting_time: DateTime<Utc>,
    pinned_message_id: Option<i64>,
) -> Result<Vec<ChatEffect>, CoreError> {
    let votes = quorum_db::polls::list_votes(&state.db, poll_id).await?;
    let voters: Vec<i64> = votes.iter().map(|vote| vote.user_id).collect();
    if voters.is_empty() {
        tracing::warn!(poll_id, task_id = task.id, "confirmation fired for a poll with no voters");
        return Ok(Vec::new());
    }

    let now = Utc::now();
    let (round, created) = quorum_db::confirmations::open_round(
        &state.db,
        task.chat_id,
        Some(poll_id),
        task.id,
        winning_text,
        meeting_time,
        pinned_message_id,
        &voters,
        now + state.settings.followup_delay,
        now,
    )
    .await?;
    if !created {
        tracing::debug!(
            confirmation_id = round.id,
            task_id = task.id,
            "confirmation task redelivered, reusing its round"
        );
    }
    if !round.is_pending() {
        return Ok(Vec::new());
    }

    Ok(vec![ChatEffect::SendConfirmationPrompt {
        chat_id: round.chat_id,
        confirmation_id: round.id,
        winning_text: round.winning_text.clone(),
        meeting_time: round.meeting_time,
        voters: round.all_voters.0.clone(),
    }])
}

async fn run_followup(
    state: &AppState,
    confirmation_id: i64,
) -> Result<Vec<ChatEffect>, CoreError> {
    let Some(round) = quorum_db::confirmations::get_round(&state.db, confirmation_id).await? else {
        tracing::warn!(confirmation_id, "followup fired for a missing confirmation round");
        return Ok(Vec::new());
    };
    if !round.is_pending() {
        return Ok(Vec::new());
    }
    let pending = round.awaiting();
    if pending.is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![ChatEffect::NudgePending {
        chat_id: round.chat_id,
        confirmation_id: round.id,
        pending,
    }])
}

async fn run_unpin(
    state: &AppState,
    chat_id: i64,
    message_id: i64,
) -> Result<Vec<ChatEffect>, CoreError> {
    quorum_db::polls::clear_pinned_message(&state.db, chat_id, message_id).await?;
    Ok(vec![ChatEffect::UnpinMessage { chat_id, message_id }])
}

async fn run_voting_timeout(
    state: &AppState,
    chat_id: i64,
    poll_id: &str,
) -> Result<Vec<ChatEffect>, CoreError> {
    let review = match crate::voting::force_resolve(state, poll_id).await {
        Ok(review) => review,
        Err(CoreError::NotFound) => {
            tracing::warn!(poll_id, "voting timeout fired for a missing poll");
            return Ok(Vec::new());
        }
        Err(err) => return Err(err),
    };
    Ok(match review.resolution {
        ForceResolution::Resolved {
            winning_index,
            winning_text,
        } => vec![ChatEffect::PollForceResolved {
            chat_id,
            poll_id: poll_id.to_string(),
            winning_index,
            winning_text,
        }],
        ForceResolution::Abandoned => vec![ChatEffect::PollAbandoned {
            chat_id,
            poll_id: poll_id.to_string(),
        }],
        ForceResolution::AlreadyClosed => Vec::new(),
    })
}

async fn run_cleanup(state: &AppState, task: &TaskRow) -> Result<Vec<ChatEffect>, CoreError> {
    let now = Utc::now();
    let settings = &state.settings;

    let expired = quorum_db::confirmations::expire_stale(
        &state.db,
        now - settings.pending_expiry,
        now,
    )
    .await?;
    let purged_rounds = quorum_db::confirmations::purge_terminal_older_than(
        &state.db,
        now - settings.terminal_purge,
        CLEANUP_BATCH,
    )
    .await?;
    let purged_tasks = quorum_db::tasks::purge_executed_older_than(
        &state.db,
        now - settings.task_purge,
        CLEANUP_BATCH,
    )
    .await?;
    let purged_meetings = quorum_db::meetings::purge_older_than(
        &state.db,
        now - settings.meeting_purge,
        CLEANUP_BATCH,
    )
    .await?;
    tracing::info!(
        expired,
        purged_rounds,
        purged_tasks,
        purged_meetings,
        "cleanup sweep finished"
    );

    // a redelivered sweep must not stack successors
    let has_successor =
        quorum_db::tasks::exists_other_unexecuted(&state.db, TaskKind::SessionCleanup, Some(task.id))
            .await?;
    if !has_successor {
        quorum_db::tasks::enqueue(
            &state.db,
            task.chat_id,
            None,
            &TaskPayload::SessionCleanup,
            now + settings.cleanup_interval,
            now,
        )
        .await?;
    }
    Ok(Vec::new())
}

/// Seed the self-re-arming cleanup task. Called once at startup; a no-op when
/// a pending sweep already exists.
pub async fn ensure_cleanup_task(state: &AppState) -> Result<(), CoreError> {
    if quorum_db::tasks::exists_other_unexecuted(&state.db, TaskKind::SessionCleanup, None).await? {
        return Ok(());
    }
    let now = Utc::now();
    let task = quorum_db::tasks::enqueue(&state.db, 0, None, &TaskPayload::SessionCleanup, now, now)
        .await?;
    tracing::info!(task_id = task.id, "seeded the periodic cleanup task");
    Ok(())
}
