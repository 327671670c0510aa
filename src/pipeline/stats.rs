// src/pipeline/stats.rs
//
// Live session statistics. One producer applies CountEvents, any number of
// readers take copies. The whole SessionStats value sits behind a single
// mutex that is held only for the in-place update of one frame's events or
// for a clone, so a reader never sees a half-applied frame.

use crate::error::{EngineError, Result};
use crate::types::{CountEvent, VehicleClass};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Below this much elapsed session time the hourly rate is reported as 0
pub const MIN_RATE_WINDOW_SECS: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStats {
    pub total_count: u64,
    pub session_start: DateTime<Utc>,
    pub hourly_rate: u64,
    pub by_lane: BTreeMap<u32, u64>,
    pub by_class: BTreeMap<VehicleClass, u64>,
}

impl SessionStats {
    pub fn new(session_start: DateTime<Utc>) -> Self {
        Self {
            total_count: 0,
            session_start,
            hourly_rate: 0,
            by_lane: BTreeMap::new(),
            by_class: BTreeMap::new(),
        }
    }

    fn apply(&mut self, event: &CountEvent) {
        self.total_count += 1;
        *self.by_lane.entry(event.lane).or_insert(0) += 1;
        *self.by_class.entry(event.vehicle_class).or_insert(0) += 1;
        self.hourly_rate = hourly_rate(self.total_count, self.elapsed_secs(event.occurred_at));
    }

    /// Recompute the hourly rate against `now`; a quiet spell lowers it
    pub fn refresh_rate(&mut self, now: DateTime<Utc>) {
        self.hourly_rate = hourly_rate(self.total_count, self.elapsed_secs(now));
    }

    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> f64 {
        (now - self.session_start).num_milliseconds() as f64 / 1000.0
    }

    /// Both breakdowns add up to the total
    pub fn is_consistent(&self) -> bool {
        self.by_lane.values().sum::<u64>() == self.total_count
            && self.by_class.values().sum::<u64>() == self.total_count
    }
}

/// Vehicles per hour, floored. Zero until the session is at least
/// `MIN_RATE_WINDOW_SECS` old.
pub fn hourly_rate(total_count: u64, elapsed_secs: f64) -> u64 {
    if elapsed_secs < MIN_RATE_WINDOW_SECS {
        return 0;
    }
    (total_count as f64 / (elapsed_secs / 3600.0)).floor() as u64
}

#[derive(Debug, Default)]
pub struct StatsAggregator {
    current: Mutex<Option<SessionStats>>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<SessionStats>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a fresh statistics epoch. Also used for reset.
    pub fn begin(&self, now: DateTime<Utc>) {
        *self.lock() = Some(SessionStats::new(now));
    }

    /// Apply one frame's events atomically with respect to readers.
    pub fn record(&self, events: &[CountEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let mut guard = self.lock();
        let stats = guard.as_mut().ok_or(EngineError::NoActiveSession)?;
        for event in events {
            stats.apply(event);
        }
        Ok(())
    }

    pub fn snapshot(&self) -> Result<SessionStats> {
        self.snapshot_at(Utc::now())
    }

    /// Copy of the current stats with the hourly rate measured at `now`
    pub fn snapshot_at(&self, now: DateTime<Utc>) -> Result<SessionStats> {
        let mut stats = self.lock().clone().ok_or(EngineError::NoActiveSession)?;
        stats.refresh_rate(now);
        Ok(stats)
    }

    /// Close the epoch and hand back its final numbers
    pub fn end(&self) -> Result<SessionStats> {
        self.end_at(Utc::now())
    }

    pub fn end_at(&self, now: DateTime<Utc>) -> Result<SessionStats> {
        let mut stats = self.lock().take().ok_or(EngineError::NoActiveSession)?;
        stats.refresh_rate(now);
        Ok(stats)
    }
}

/// Cheap, cloneable read side for other threads
#[derive(Debug, Clone)]
pub struct StatsHandle {
    inner: Arc<StatsAggregator>,
}

impl StatsHandle {
    pub fn new(inner: Arc<StatsAggregator>) -> Self {
        Self { inner }
    }

    pub fn snapshot(&self) -> Result<SessionStats> {
        self.inner.snapshot()
    }

    pub fn snapshot_at(&self, now: DateTime<Utc>) -> Result<SessionStats> {
        self.inner.snapshot_at(now)
    }
}
