// src/pipeline/mod.rs

pub mod engine;
pub mod stats;

pub use engine::{CountingEngine, EndedSession, FrameOutcome, PersistenceFailure};
pub use stats::{hourly_rate, SessionStats, StatsAggregator, StatsHandle, MIN_RATE_WINDOW_SECS};
