// src/analysis/mod.rs
//
// Per-frame tracking and counting.
//
// Signal flow:
//   Detections → associator (band filter + nearest centre) → crossing_counter → CountEvent
//                    ↕                                          ↓
//               track_store                              lane_classifier

pub mod associator;
pub mod crossing_counter;
pub mod lane_classifier;
pub mod track_store;

pub use associator::{Association, Associator};
pub use crossing_counter::{CrossingCounter, FrameCounts};
pub use lane_classifier::{lane_for, DEFAULT_LANE_COUNT};
pub use track_store::{TrackSlot, TrackStore};
