// src/analysis/associator.rs
//
// Nearest-centre association between this frame's in-band detections and the
// previous frame's tracks.
//
// Design:
//   - Only detections inside the counting band are tracked at all. A vehicle
//     that leaves the band loses its identity; if it comes back it is a new
//     track and will be counted again.
//   - Greedy one-to-one matching on centre distance (same shape as the IoU
//     pass in a classic tracker): every (detection, track) pair under the
//     distance limit is sorted ascending and taken while both sides are free.
//   - Unmatched detections get a fresh identity from the TrackStore.

use super::track_store::{TrackSlot, TrackStore};
use crate::types::{Center, CountingConfig, Detection};
use tracing::debug;

/// An in-band detection bound to a track identity for this frame
#[derive(Debug, Clone, Copy)]
pub struct Association<'a> {
    pub track_id: u32,
    pub center: Center,
    pub detection: &'a Detection,
    /// True when the identity was carried over from the previous frame
    pub matched: bool,
}

#[derive(Debug, Clone)]
pub struct Associator {
    line_position: f32,
    band_half_width: f32,
    max_match_distance: f32,
}

impl Associator {
    pub fn new(config: &CountingConfig) -> Self {
        Self {
            line_position: config.line_position,
            band_half_width: config.band_half_width,
            max_match_distance: config.max_match_distance,
        }
    }

    /// Pixel row of the counting line for a frame of this height
    pub fn line_y(&self, frame_height: u32) -> i32 {
        (frame_height as f32 * self.line_position).round() as i32
    }

    pub fn in_band(&self, center: &Center, line_y: i32) -> bool {
        ((center.y as i64 - line_y as i64).abs() as f32) < self.band_half_width
    }

    /// Associate one frame of detections and publish the result as the next
    /// frame's `previous` table.
    pub fn associate<'a>(
        &self,
        detections: &'a [Detection],
        frame_height: u32,
        store: &mut TrackStore,
    ) -> Vec<Association<'a>> {
        let line_y = self.line_y(frame_height);

        let candidates: Vec<(&'a Detection, Center)> = detections
            .iter()
            .map(|d| (d, d.center()))
            .filter(|(_, c)| self.in_band(c, line_y))
            .collect();

        if candidates.len() < detections.len() {
            debug!(
                "{} of {} detections outside band (line_y={}, half_width={})",
                detections.len() - candidates.len(),
                detections.len(),
                line_y,
                self.band_half_width
            );
        }

        let previous = store.previous();
        let mut pairs: Vec<(usize, usize, f32)> = Vec::new();
        for (di, (_, center)) in candidates.iter().enumerate() {
            for (ti, slot) in previous.iter().enumerate() {
                let dist = center.distance_to(&slot.center);
                if dist < self.max_match_distance {
                    pairs.push((di, ti, dist));
                }
            }
        }
        pairs.sort_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal));

        let mut assigned: Vec<Option<u32>> = vec![None; candidates.len()];
        let mut taken_tracks: Vec<bool> = vec![false; previous.len()];
        for (di, ti, dist) in &pairs {
            if assigned[*di].is_some() || taken_tracks[*ti] {
                continue;
            }
            taken_tracks[*ti] = true;
            assigned[*di] = Some(previous[*ti].id);
            debug!("Track {} re-matched at {:.1}px", previous[*ti].id, dist);
        }

        let associations: Vec<Association<'a>> = candidates
            .into_iter()
            .zip(assigned)
            .map(|((detection, center), id)| match id {
                Some(track_id) => Association {
                    track_id,
                    center,
                    detection,
                    matched: true,
                },
                None => {
                    let track_id = store.next_id();
                    debug!("New track {} at ({}, {})", track_id, center.x, center.y);
                    Association {
                        track_id,
                        center,
                        detection,
                        matched: false,
                    }
                }
            })
            .collect();

        store.replace(
            associations
                .iter()
                .map(|a| TrackSlot {
                    id: a.track_id,
                    center: a.center,
                })
                .collect(),
        );

        associations
    }
}
