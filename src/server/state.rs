//! Application state

use std::sync::atomic::{AtomicU64, Ordering};

use super::ServerConfig;

/// Shared across handlers; sessions themselves keep no state here
pub struct AppState {
    pub config: ServerConfig,
    pub started_at: chrono::DateTime<chrono::Utc>,
    sessions_run: AtomicU64,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            started_at: chrono::Utc::now(),
            sessions_run: AtomicU64::new(0),
        }
    }

    /// Count a session, returning the new total
    pub fn record_session(&self) -> u64 {
        self.sessions_run.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn sessions_run(&self) -> u64 {
        self.sessions_run.load(Ordering::Relaxed)
    }

    pub fn uptime_secs(&self) -> i64 {
        chrono::Utc::now()
            .signed_duration_since(self.started_at)
            .num_seconds()
    }
}
