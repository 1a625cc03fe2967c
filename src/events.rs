//! Per-run progress event log.
//!
//! Append-only with monotonic timestamps; consumers subscribe through a
//! broadcast channel and must tolerate at-least-once delivery. Clients
//! resume by filtering on `ts > last_seen`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Event channel depth; slow consumers fall back to `events_since`
const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    NodeEvent,
    Message,
    Heartbeat,
    Done,
    Error,
}

impl Display for EventKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let s = match self {
            EventKind::NodeEvent => "node_event",
            EventKind::Message => "message",
            EventKind::Heartbeat => "heartbeat",
            EventKind::Done => "done",
            EventKind::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// One progress event in a run's stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub ts: DateTime<Utc>,
    pub kind: EventKind,
    pub node: String,
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// The per-run event sink
#[derive(Debug)]
pub struct EventLog {
    events: Mutex<Vec<ProgressEvent>>,
    last_ts: Mutex<DateTime<Utc>>,
    tx: broadcast::Sender<ProgressEvent>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        EventLog {
            events: Mutex::new(vec![]),
            last_ts: Mutex::new(DateTime::<Utc>::MIN_UTC),
            tx,
        }
    }

    /// Append an event. The stored timestamp is forced monotonic: never
    /// before the previous event, even if the clock stalls.
    pub fn append(
        &self,
        now: DateTime<Utc>,
        kind: EventKind,
        node: &str,
        status: &str,
        details: Option<Value>,
    ) {
        let ts = {
            let mut last = match self.last_ts.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let ts = if now > *last {
                now
            } else {
                *last + Duration::milliseconds(1)
            };
            *last = ts;
            ts
        };

        let event = ProgressEvent {
            ts,
            kind,
            node: node.to_string(),
            status: status.to_string(),
            details,
        };

        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }

        // no receivers is fine; the log retains everything
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    /// All events so far
    pub fn events(&self) -> Vec<ProgressEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Events after a resume point
    pub fn events_since(&self, ts: DateTime<Utc>) -> Vec<ProgressEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.ts > ts)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_monotonic_timestamps() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_monotonic_timestamps) Start.");

        let log = EventLog::new();
        let now = t0();

        // three appends at the same wall instant still get increasing stamps
        log.append(now, EventKind::NodeEvent, "intake", "started", None);
        log.append(now, EventKind::NodeEvent, "intake", "finished", None);
        log.append(now, EventKind::NodeEvent, "retrieve", "started", None);

        let events = log.events();
        assert_eq!(events.len(), 3);
        assert!(events[0].ts < events[1].ts);
        assert!(events[1].ts < events[2].ts);

        ut_info!("(test_monotonic_timestamps) Success.");
    }

    #[tokio::test]
    async fn test_events_since_resume() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_events_since_resume) Start.");

        let log = EventLog::new();
        log.append(t0(), EventKind::NodeEvent, "intake", "finished", None);
        let seen = log.events()[0].ts;
        log.append(
            t0() + Duration::seconds(1),
            EventKind::Done,
            "respond",
            "completed",
            None,
        );

        let resumed = log.events_since(seen);
        assert_eq!(resumed.len(), 1);
        assert_eq!(resumed[0].kind, EventKind::Done);

        ut_info!("(test_events_since_resume) Success.");
    }

    #[tokio::test]
    async fn test_broadcast_delivery() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_broadcast_delivery) Start.");

        let log = EventLog::new();
        let mut rx = log.subscribe();
        log.append(t0(), EventKind::Message, "generate", "4 candidates", None);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::Message);
        assert_eq!(event.node, "generate");

        ut_info!("(test_broadcast_delivery) Success.");
    }
}
