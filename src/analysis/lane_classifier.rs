// src/analysis/lane_classifier.rs
//
// Equal-width lanes across the frame, numbered from 1 on the left.

use crate::error::{EngineError, Result};

pub const DEFAULT_LANE_COUNT: u32 = 4;

/// Lane index (1-based) for a horizontal pixel position.
///
/// Positions at or beyond the right edge fall into the last lane and
/// negative positions into the first.
pub fn lane_for(center_x: i32, frame_width: u32, lane_count: u32) -> Result<u32> {
    if frame_width == 0 {
        return Err(EngineError::frame_size(frame_width, 1));
    }
    if lane_count == 0 {
        return Err(EngineError::InvalidLaneCount(lane_count));
    }

    let lane_width = frame_width as f64 / lane_count as f64;
    let raw = (center_x as f64 / lane_width).floor() as i64 + 1;
    Ok(raw.clamp(1, lane_count as i64) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lane_boundaries_400px() {
        for x in 0..100 {
            assert_eq!(lane_for(x, 400, 4).unwrap(), 1, "x={}", x);
        }
        for x in 100..200 {
            assert_eq!(lane_for(x, 400, 4).unwrap(), 2, "x={}", x);
        }
        for x in 200..300 {
            assert_eq!(lane_for(x, 400, 4).unwrap(), 3, "x={}", x);
        }
        for x in 300..400 {
            assert_eq!(lane_for(x, 400, 4).unwrap(), 4, "x={}", x);
        }
    }

    #[test]
    fn test_right_edge_clamps_to_last_lane() {
        assert_eq!(lane_for(400, 400, 4).unwrap(), 4);
        assert_eq!(lane_for(10_000, 400, 4).unwrap(), 4);
    }

    #[test]
    fn test_negative_clamps_to_first_lane() {
        assert_eq!(lane_for(-5, 400, 4).unwrap(), 1);
    }

    #[test]
    fn test_uneven_lane_width() {
        // 1280 / 3 = 426.67
        assert_eq!(lane_for(426, 1280, 3).unwrap(), 1);
        assert_eq!(lane_for(427, 1280, 3).unwrap(), 2);
        assert_eq!(lane_for(1279, 1280, 3).unwrap(), 3);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            lane_for(10, 0, 4),
            Err(EngineError::InvalidFrameSize { .. })
        ));
        assert_eq!(lane_for(10, 400, 0), Err(EngineError::InvalidLaneCount(0)));
    }
}
