use crate::delivery::WebhookSink;
use quorum_core::{dispatcher, AppState};
use tokio::time::MissedTickBehavior;

/// Embedded push-mode dispatcher. Claims due tasks, posts their effects to
/// the transport webhook and marks them executed on success. A failed
/// delivery leaves the claim in place so the task is retried once its lease
/// lapses.
pub async fn run(state: AppState, sink: WebhookSink) {
    let mut ticker = tokio::time::interval(state.settings.dispatch_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = state.shutdown.notified() => {
                tracing::info!("dispatcher loop stopping on shutdown signal");
                break;
            }
        }
        drain_due(&state, &sink).await;
    }
}

async fn drain_due(state: &AppState, sink: &WebhookSink) {
    loop {
        let claimed = match dispatcher::claim_next(state).await {
            Ok(Some(claimed)) => claimed,
            Ok(None) => return,
            Err(err) => {
                tracing::warn!("task claim failed: {err}");
                return;
            }
        };

        let task_id = claimed.task.id;
        let Some(token) = claimed.task.claim_token.clone() else {
            tracing::warn!(task_id, "claimed task carries no token, skipping");
            return;
        };

        if let Err(err) = sink.deliver(&claimed).await {
            tracing::warn!(task_id, "delivery failed, leaving the claim to lapse: {err:#}");
            return;
        }

        if let Err(err) = dispatcher::complete(state, task_id, &token).await {
            tracing::warn!(task_id, "completion failed after delivery: {err}");
            return;
        }
        tracing::debug!(task_id, kind = %claimed.task.kind, "task delivered and completed");
    }
}
