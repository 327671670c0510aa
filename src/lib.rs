//! Line-crossing vehicle counter.
//!
//! Feed per-frame detections to [`CountingEngine::process`]; each physical
//! vehicle that enters the band around the counting line is counted once,
//! assigned a lane and folded into live [`SessionStats`] that other threads
//! read through a [`StatsHandle`].

pub mod analysis;
pub mod config;
pub mod count_log;
pub mod error;
pub mod pipeline;
pub mod replay;
pub mod storage;
pub mod types;

pub use error::{EngineError, Result};
pub use pipeline::{
    CountingEngine, EndedSession, FrameOutcome, PersistenceFailure, SessionStats, StatsHandle,
};
pub use storage::{CountSink, JsonlSink, MemorySink};
pub use types::{
    Config, CountEvent, CountingConfig, Detection, StorageBackend, Track, VehicleClass,
};
