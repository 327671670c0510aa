//! Error types for the counting engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Caller contract violations. Sink failures are never reported through this
/// type; they surface as warnings on the frame or session outcome.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Invalid frame size: {width}x{height} (both must be positive)")]
    InvalidFrameSize { width: i64, height: i64 },

    #[error("Invalid lane count: {0}")]
    InvalidLaneCount(u32),

    #[error("No active counting session; call begin_session() first")]
    NoActiveSession,

    #[error("Session {0} is already active")]
    SessionAlreadyActive(String),

    #[error("Configuration error: {0}")]
    InvalidConfig(String),
}

impl EngineError {
    pub fn frame_size(width: impl Into<i64>, height: impl Into<i64>) -> Self {
        Self::InvalidFrameSize {
            width: width.into(),
            height: height.into(),
        }
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
