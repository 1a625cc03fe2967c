//! Persistence seam.
//!
//! The engine writes through a session handle and never opens a transaction
//! larger than one event. The in-memory implementation backs tests and the
//! offline CLI.

use crate::events::ProgressEvent;
use crate::planner::itinerary::Itinerary;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::Mutex;

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum PersistError {
    Unavailable,
}

impl Display for PersistError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            PersistError::Unavailable => write!(f, "Persistence unavailable"),
        }
    }
}

/// Org/user scoping carried opaquely on every write
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Scopes {
    pub org_scope: String,
    pub user_scope: String,
}

/// Append-only agent-run record plus the final itinerary row
#[async_trait::async_trait]
pub trait SessionHandle: Send + Sync {
    async fn append_event(
        &self,
        run_id: &str,
        scopes: &Scopes,
        event: &ProgressEvent,
    ) -> Result<(), PersistError>;

    async fn store_itinerary(
        &self,
        run_id: &str,
        scopes: &Scopes,
        itinerary: &Itinerary,
    ) -> Result<(), PersistError>;

    async fn mark_terminal(
        &self,
        run_id: &str,
        scopes: &Scopes,
        status: &str,
    ) -> Result<(), PersistError>;
}

#[derive(Debug, Default)]
struct MemorySessionInner {
    events: HashMap<String, Vec<ProgressEvent>>,
    itineraries: HashMap<String, Itinerary>,
    terminal: HashMap<String, String>,
}

/// In-memory session store
#[derive(Debug, Default)]
pub struct MemorySession {
    inner: Mutex<MemorySessionInner>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemorySessionInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn itinerary_for(&self, run_id: &str) -> Option<Itinerary> {
        self.lock().itineraries.get(run_id).cloned()
    }

    pub fn terminal_status(&self, run_id: &str) -> Option<String> {
        self.lock().terminal.get(run_id).cloned()
    }

    pub fn event_count(&self, run_id: &str) -> usize {
        self.lock()
            .events
            .get(run_id)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl SessionHandle for MemorySession {
    async fn append_event(
        &self,
        run_id: &str,
        _scopes: &Scopes,
        event: &ProgressEvent,
    ) -> Result<(), PersistError> {
        self.lock()
            .events
            .entry(run_id.to_string())
            .or_default()
            .push(event.clone());
        Ok(())
    }

    async fn store_itinerary(
        &self,
        run_id: &str,
        _scopes: &Scopes,
        itinerary: &Itinerary,
    ) -> Result<(), PersistError> {
        self.lock()
            .itineraries
            .insert(run_id.to_string(), itinerary.clone());
        Ok(())
    }

    async fn mark_terminal(
        &self,
        run_id: &str,
        _scopes: &Scopes,
        status: &str,
    ) -> Result<(), PersistError> {
        self.lock()
            .terminal
            .insert(run_id.to_string(), status.to_string());
        Ok(())
    }
}
