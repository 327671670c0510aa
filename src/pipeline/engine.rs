// src/pipeline/engine.rs
//
// Facade over association, counting, statistics and persistence. The only
// entry point callers use.
//
// Ordering per frame:
//   1. associate in-band detections with the previous frame's tracks
//   2. count first-time identities
//   3. publish the frame's events to the live stats (one lock acquisition)
//   4. hand each event to the sink, with no lock held
//
// Step 4 can be slow or fail; it never delays readers and never rolls back
// steps 2-3.

use crate::analysis::{Associator, CrossingCounter, TrackStore};
use crate::error::{EngineError, Result};
use crate::pipeline::stats::{SessionStats, StatsAggregator, StatsHandle};
use crate::storage::CountSink;
use crate::types::{CountEvent, CountingConfig, Detection, Track};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A sink write that failed; counting already happened
#[derive(Debug, Clone, PartialEq)]
pub struct PersistenceFailure {
    pub track_id: u32,
    pub error: String,
}

/// Result of one `process` call
#[derive(Debug, Default)]
pub struct FrameOutcome {
    /// In-band tracks for overlay
    pub tracks: Vec<Track>,
    /// Crossings counted this frame, possibly empty
    pub events: Vec<CountEvent>,
    pub persistence_failures: Vec<PersistenceFailure>,
}

#[derive(Debug)]
pub struct EndedSession {
    pub session_id: String,
    pub stats: SessionStats,
    pub persistence_error: Option<String>,
}

pub struct CountingEngine {
    config: CountingConfig,
    associator: Associator,
    counter: CrossingCounter,
    store: TrackStore,
    stats: Arc<StatsAggregator>,
    sink: Option<Box<dyn CountSink>>,
    session_id: Option<String>,
    frames_processed: u64,
}

impl CountingEngine {
    pub fn new(config: CountingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            associator: Associator::new(&config),
            counter: CrossingCounter::new(config.lane_count),
            store: TrackStore::new(),
            stats: Arc::new(StatsAggregator::new()),
            sink: None,
            session_id: None,
            frames_processed: 0,
            config,
        })
    }

    /// Attach a persistence sink. Without one the engine only counts.
    pub fn with_sink(mut self, sink: impl CountSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn config(&self) -> &CountingConfig {
        &self.config
    }

    pub fn sink(&self) -> Option<&dyn CountSink> {
        self.sink.as_deref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    // ------------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------------

    pub fn begin_session(&mut self) -> Result<String> {
        self.begin_session_at(Utc::now())
    }

    pub fn begin_session_at(&mut self, now: DateTime<Utc>) -> Result<String> {
        if let Some(active) = &self.session_id {
            return Err(EngineError::SessionAlreadyActive(active.clone()));
        }

        let session_id = now.format("%Y%m%d_%H%M%S").to_string();
        self.store.clear();
        self.stats.begin(now);
        self.frames_processed = 0;

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.begin_session(&session_id, now) {
                warn!("Sink could not record session {}: {:#}", session_id, e);
            }
        }

        info!("Counting session {} started", session_id);
        self.session_id = Some(session_id.clone());
        Ok(session_id)
    }

    pub fn end_session(&mut self) -> Result<EndedSession> {
        self.end_session_at(Utc::now())
    }

    pub fn end_session_at(&mut self, now: DateTime<Utc>) -> Result<EndedSession> {
        let session_id = self.session_id.take().ok_or(EngineError::NoActiveSession)?;
        let stats = self.stats.end_at(now)?;
        self.store.clear();

        let persistence_error = match &self.sink {
            Some(sink) => sink
                .end_session(&session_id, stats.total_count, now)
                .err()
                .map(|e| {
                    warn!("Sink could not close session {}: {:#}", session_id, e);
                    format!("{:#}", e)
                }),
            None => None,
        };

        info!(
            "Session {} ended - {} vehicles counted over {} frames",
            session_id, stats.total_count, self.frames_processed
        );

        Ok(EndedSession {
            session_id,
            stats,
            persistence_error,
        })
    }

    /// Start a new statistics epoch inside the current session. Vehicles
    /// already counted before the reset are counted again when next seen;
    /// track ids keep increasing.
    pub fn reset(&mut self) -> Result<()> {
        self.reset_at(Utc::now())
    }

    pub fn reset_at(&mut self, now: DateTime<Utc>) -> Result<()> {
        let session_id = self.session_id.as_deref().ok_or(EngineError::NoActiveSession)?;
        self.stats.begin(now);
        self.store.clear_counted();
        self.store.replace(Vec::new());
        info!("Counter reset (session {})", session_id);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Per-frame path
    // ------------------------------------------------------------------------

    pub fn process(
        &mut self,
        detections: &[Detection],
        frame_width: u32,
        frame_height: u32,
    ) -> Result<FrameOutcome> {
        self.process_at(detections, frame_width, frame_height, Utc::now())
    }

    pub fn process_at(
        &mut self,
        detections: &[Detection],
        frame_width: u32,
        frame_height: u32,
        now: DateTime<Utc>,
    ) -> Result<FrameOutcome> {
        let session_id = self.session_id.clone().ok_or(EngineError::NoActiveSession)?;
        if frame_width == 0 || frame_height == 0 {
            return Err(EngineError::frame_size(frame_width, frame_height));
        }

        let associations = self
            .associator
            .associate(detections, frame_height, &mut self.store);
        let counts = self
            .counter
            .count(&associations, frame_width, &mut self.store, now)?;

        self.stats.record(&counts.events)?;
        self.frames_processed += 1;

        debug!(
            "Frame {}: {} detections, {} in band, {} new crossings",
            self.frames_processed,
            detections.len(),
            counts.tracks.len(),
            counts.events.len()
        );

        let mut persistence_failures = Vec::new();
        if let Some(sink) = &self.sink {
            for event in &counts.events {
                if let Err(e) = sink.record(event, &session_id) {
                    warn!(
                        "Failed to persist crossing of track {}: {:#}",
                        event.track_id, e
                    );
                    persistence_failures.push(PersistenceFailure {
                        track_id: event.track_id,
                        error: format!("{:#}", e),
                    });
                }
            }
        }

        Ok(FrameOutcome {
            tracks: counts.tracks,
            events: counts.events,
            persistence_failures,
        })
    }

    // ------------------------------------------------------------------------
    // Read side
    // ------------------------------------------------------------------------

    pub fn get_stats(&self) -> Result<SessionStats> {
        self.stats.snapshot()
    }

    pub fn get_stats_at(&self, now: DateTime<Utc>) -> Result<SessionStats> {
        self.stats.snapshot_at(now)
    }

    /// Read handle for other threads; stays valid across resets and sessions.
    pub fn stats_handle(&self) -> StatsHandle {
        StatsHandle::new(Arc::clone(&self.stats))
    }

    /// Identities counted in the current epoch
    pub fn counted_identities(&self) -> usize {
        self.store.counted_len()
    }
}
