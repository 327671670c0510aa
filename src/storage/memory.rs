// src/storage/memory.rs

use super::{CountSink, SessionRecord, StoredEntry};
use crate::types::CountEvent;
use anyhow::{bail, Result};
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct MemoryState {
    entries: Vec<StoredEntry>,
    sessions: Vec<SessionRecord>,
    next_id: u64,
}

/// Process-local sink. Used when no durable store is configured and in tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    state: Mutex<MemoryState>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CountSink for MemorySink {
    fn begin_session(&self, session_id: &str, started_at: DateTime<Utc>) -> Result<()> {
        let mut state = self.lock();
        if state.sessions.iter().any(|s| s.session_id == session_id) {
            bail!("Session {} already exists", session_id);
        }
        state
            .sessions
            .push(SessionRecord::active(session_id, started_at));
        Ok(())
    }

    fn record(&self, event: &CountEvent, session_id: &str) -> Result<u64> {
        let mut state = self.lock();
        state.next_id += 1;
        let id = state.next_id;
        state
            .entries
            .push(StoredEntry::from_event(id, session_id, event));
        Ok(id)
    }

    fn end_session(
        &self,
        session_id: &str,
        final_total: u64,
        ended_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.lock();
        match state
            .sessions
            .iter_mut()
            .find(|s| s.session_id == session_id)
        {
            Some(session) => {
                session.complete(final_total, ended_at);
                Ok(())
            }
            None => bail!("Unknown session {}", session_id),
        }
    }

    fn sessions(&self) -> Result<Vec<SessionRecord>> {
        Ok(self.lock().sessions.clone())
    }

    fn load_entries(&self) -> Result<Vec<StoredEntry>> {
        Ok(self.lock().entries.clone())
    }

    fn prune_before(&self, cutoff: NaiveDate) -> Result<usize> {
        let mut state = self.lock();
        let before = state.entries.len();
        state.entries.retain(|e| e.occurred_at.date_naive() >= cutoff);
        Ok(before - state.entries.len())
    }
}
