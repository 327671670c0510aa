// src/analysis/crossing_counter.rs
//
// The first frame an identity shows up inside the counting band is its one
// and only counting opportunity. Later re-observations of the same identity
// are ignored, so a vehicle that stays matched while it drives through the
// band is counted exactly once.

use super::associator::Association;
use super::lane_classifier::lane_for;
use super::track_store::TrackStore;
use crate::error::Result;
use crate::types::{CountEvent, Track};
use chrono::{DateTime, Utc};
use tracing::info;

#[derive(Debug, Default)]
pub struct FrameCounts {
    /// Every associated track this frame, counted or not
    pub tracks: Vec<Track>,
    /// Events for identities counted for the first time this frame
    pub events: Vec<CountEvent>,
}

#[derive(Debug, Clone)]
pub struct CrossingCounter {
    lane_count: u32,
}

impl CrossingCounter {
    pub fn new(lane_count: u32) -> Self {
        Self { lane_count }
    }

    pub fn count(
        &self,
        associations: &[Association<'_>],
        frame_width: u32,
        store: &mut TrackStore,
        now: DateTime<Utc>,
    ) -> Result<FrameCounts> {
        let mut out = FrameCounts {
            tracks: Vec::with_capacity(associations.len()),
            events: Vec::new(),
        };

        for assoc in associations {
            let det = assoc.detection;

            if !store.is_counted(assoc.track_id) {
                // lane first: a failed classification must leave the identity uncounted
                let lane = lane_for(assoc.center.x, frame_width, self.lane_count)?;
                store.mark_counted(assoc.track_id);
                info!(
                    "✓ Vehicle #{} counted - {} in lane {} (track {}, conf {:.2})",
                    store.counted_len(),
                    det.class.as_str(),
                    lane,
                    assoc.track_id,
                    det.confidence
                );
                out.events.push(CountEvent {
                    track_id: assoc.track_id,
                    lane,
                    vehicle_class: det.class,
                    confidence: det.confidence,
                    occurred_at: now,
                });
            }

            out.tracks.push(Track {
                id: assoc.track_id,
                center: assoc.center,
                counted: true,
                bbox: det.bbox,
                class: det.class,
                confidence: det.confidence,
            });
        }

        Ok(out)
    }
}
