pub mod confirmation;
pub mod dispatcher;
pub mod error;
pub mod polls;
pub mod schedule;
pub mod voting;

use chrono::Duration;
use quorum_db::DbPool;
use std::sync::Arc;
use tokio::sync::Notify;

/// Scheduling windows and retention cutoffs. Fixed at startup from the server
/// configuration; defaults match the production deployment.
#[derive(Clone, Debug)]
pub struct RuntimeSettings {
    /// How often the embedded dispatcher loop polls for due tasks.
    pub dispatch_interval: std::time::Duration,
    /// Visibility timeout on a claimed task before it may be reclaimed.
    pub claim_lease: Duration,
    /// How long a revote may run after a tie announcement.
    pub revote_timeout: Duration,
    /// Delay between opening a confirmation round and the nudge to
    /// non-responders.
    pub followup_delay: Duration,
    /// Confirmation prompt lead time for meetings far in the future.
    pub confirmation_lead_far: Duration,
    /// Confirmation prompt lead time for meetings coming up soon.
    pub confirmation_lead_near: Duration,
    /// Meetings closer than this get no confirmation round at all.
    pub confirmation_min_lead: Duration,
    /// How long after the meeting time the pinned message is unpinned.
    pub unpin_delay: Duration,
    /// Interval at which the cleanup task re-arms itself.
    pub cleanup_interval: Duration,
    /// Pending confirmation rounds older than this are swept to expired.
    pub pending_expiry: Duration,
    /// Terminal confirmation rounds older than this are purged.
    pub terminal_purge: Duration,
    /// Executed tasks older than this are purged.
    pub task_purge: Duration,
    /// Meetings older than this are purged.
    pub meeting_purge: Duration,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            dispatch_interval: std::time::Duration::from_secs(5),
            claim_lease: Duration::minutes(5),
            revote_timeout: Duration::minutes(60),
            followup_delay: Duration::minutes(30),
            confirmation_lead_far: Duration::hours(24),
            confirmation_lead_near: Duration::hours(4),
            confirmation_min_lead: Duration::hours(4),
            unpin_delay: Duration::hours(10),
            cleanup_interval: Duration::hours(1),
            pending_expiry: Duration::hours(24),
            terminal_purge: Duration::days(7),
            task_purge: Duration::days(30),
            meeting_purge: Duration::days(365),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub settings: Arc<RuntimeSettings>,
    pub shutdown: Arc<Notify>,
}

impl AppState {
    pub fn new(db: DbPool, settings: RuntimeSettings) -> Self {
        Self {
            db,
            settings: Arc::new(settings),
            shutdown: Arc::new(Notify::new()),
        }
    }
}
