//! In-memory backing store for background runs.
//!
//! Runs are retained for a keepalive window after completion so clients can
//! poll status and replay events, then expired.

use crate::events::EventLog;
use crate::planner::itinerary::Itinerary;
use crate::tasks::RunStatus;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Everything the pool tracks about one run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub run_id: String,
    pub status: RunStatus,
    pub status_rationale: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub cancel: CancellationToken,
    pub events: Arc<EventLog>,
    pub itinerary: Option<Itinerary>,
}

/// Process-wide registry of background runs
#[derive(Debug, Default)]
pub struct RunPool {
    runs: Mutex<HashMap<String, RunRecord>>,
}

impl RunPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, RunRecord>> {
        match self.runs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn insert(&self, record: RunRecord) {
        self.lock().insert(record.run_id.clone(), record);
    }

    pub fn get(&self, run_id: &str) -> Option<RunRecord> {
        self.lock().get(run_id).cloned()
    }

    pub fn set_status(
        &self,
        run_id: &str,
        status: RunStatus,
        rationale: Option<String>,
        expires_at: DateTime<Utc>,
    ) {
        if let Some(record) = self.lock().get_mut(run_id) {
            record.status = status;
            record.status_rationale = rationale;
            record.expires_at = expires_at;
        }
    }

    pub fn set_itinerary(&self, run_id: &str, itinerary: Itinerary) {
        if let Some(record) = self.lock().get_mut(run_id) {
            record.itinerary = Some(itinerary);
        }
    }

    /// Drop records past their keepalive window
    pub fn expire(&self, now: DateTime<Utc>) {
        self.lock()
            .retain(|_, record| record.status == RunStatus::Running || record.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn record(run_id: &str, status: RunStatus, expires_at: DateTime<Utc>) -> RunRecord {
        RunRecord {
            run_id: run_id.to_string(),
            status,
            status_rationale: None,
            created_at: expires_at - Duration::minutes(60),
            expires_at,
            cancel: CancellationToken::new(),
            events: Arc::new(EventLog::new()),
            itinerary: None,
        }
    }

    #[tokio::test]
    async fn test_expire_keeps_running_runs() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_expire_keeps_running_runs) Start.");

        let pool = RunPool::new();
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();

        pool.insert(record("done", RunStatus::Completed, now - Duration::minutes(1)));
        pool.insert(record("live", RunStatus::Running, now - Duration::minutes(1)));
        pool.insert(record("fresh", RunStatus::Completed, now + Duration::minutes(30)));

        pool.expire(now);
        assert!(pool.get("done").is_none());
        assert!(pool.get("live").is_some());
        assert!(pool.get("fresh").is_some());

        ut_info!("(test_expire_keeps_running_runs) Success.");
    }
}
