use chrono::Duration;
use quorum_core::RuntimeSettings;
use serde::Deserialize;

/// Server configuration, loaded from a TOML file. Every key is optional;
/// defaults match [`RuntimeSettings::default`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: Server,
    pub database: Database,
    pub scheduler: Scheduler,
    pub retention: Retention,
    pub transport: Transport,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Server {
    pub bind_address: String,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8745".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Database {
    pub url: String,
    pub max_connections: u32,
}

impl Default for Database {
    fn default() -> Self {
        Self {
            url: "sqlite://data/quorum.db".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Scheduler {
    pub poll_interval_secs: u64,
    pub claim_lease_secs: i64,
    pub revote_timeout_mins: i64,
    pub followup_delay_mins: i64,
    pub confirmation_lead_far_hours: i64,
    pub confirmation_lead_near_hours: i64,
    pub confirmation_min_lead_hours: i64,
    pub unpin_delay_hours: i64,
    pub cleanup_interval_mins: i64,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            claim_lease_secs: 300,
            revote_timeout_mins: 60,
            followup_delay_mins: 30,
            confirmation_lead_far_hours: 24,
            confirmation_lead_near_hours: 4,
            confirmation_min_lead_hours: 4,
            unpin_delay_hours: 10,
            cleanup_interval_mins: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Retention {
    pub pending_expiry_hours: i64,
    pub terminal_purge_days: i64,
    pub task_purge_days: i64,
    pub meeting_purge_days: i64,
}

impl Default for Retention {
    fn default() -> Self {
        Self {
            pending_expiry_hours: 24,
            terminal_purge_days: 7,
            task_purge_days: 30,
            meeting_purge_days: 365,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Transport {
    /// Webhook that receives chat effects in push mode. When unset the
    /// embedded dispatcher stays off and the transport pulls via the task
    /// claim endpoint instead.
    pub webhook_url: Option<String>,
    pub delivery_timeout_secs: u64,
}

impl Default for Transport {
    fn default() -> Self {
        Self {
            webhook_url: None,
            delivery_timeout_secs: 15,
        }
    }
}

impl Config {
    /// Load configuration from `path`. A missing file yields the defaults.
    pub fn load(path: &str) -> anyhow::Result<Config> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(toml::from_str(&contents)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("config file '{path}' not found, using defaults");
                Ok(Config::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn runtime_settings(&self) -> RuntimeSettings {
        RuntimeSettings {
            dispatch_interval: std::time::Duration::from_secs(self.scheduler.poll_interval_secs),
            claim_lease: Duration::seconds(self.scheduler.claim_lease_secs),
            revote_timeout: Duration::minutes(self.scheduler.revote_timeout_mins),
            followup_delay: Duration::minutes(self.scheduler.followup_delay_mins),
            confirmation_lead_far: Duration::hours(self.scheduler.confirmation_lead_far_hours),
            confirmation_lead_near: Duration::hours(self.scheduler.confirmation_lead_near_hours),
            confirmation_min_lead: Duration::hours(self.scheduler.confirmation_min_lead_hours),
            unpin_delay: Duration::hours(self.scheduler.unpin_delay_hours),
            cleanup_interval: Duration::minutes(self.scheduler.cleanup_interval_mins),
            pending_expiry: Duration::hours(self.retention.pending_expiry_hours),
            terminal_purge: Duration::days(self.retention.terminal_purge_days),
            task_purge: Duration::days(self.retention.task_purge_days),
            meeting_purge: Duration::days(self.retention.meeting_purge_days),
        }
    }
}
