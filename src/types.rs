// src/types.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub counting: CountingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CountingConfig {
    /// Counting line as a fraction of frame height (0.0 = top, 1.0 = bottom)
    pub line_position: f32,
    /// Detections whose centre is this many pixels (or more) from the line are not tracked
    pub band_half_width: f32,
    /// Maximum centre distance (pixels) for reusing the previous frame's identity
    pub max_match_distance: f32,
    /// Number of equal-width lanes across the frame
    pub lane_count: u32,
}

impl Default for CountingConfig {
    fn default() -> Self {
        Self {
            line_position: 0.5,
            band_half_width: 50.0,
            max_match_distance: 50.0,
            lane_count: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Keep entries in process memory only
    Memory,
    /// Append JSON lines under `storage.dir`
    Jsonl,
    /// Count without persisting anything
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Jsonl,
            dir: "data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Directory searched (recursively) for `*.jsonl` detection logs
    pub input_dir: String,
    pub frame_width: u32,
    pub frame_height: u32,
    /// How often the reporter polls the live statistics
    pub report_interval_ms: u64,
    /// Where the per-day count log is written; empty disables it
    pub count_log_dir: String,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            input_dir: "detections".to_string(),
            frame_width: 1280,
            frame_height: 720,
            report_interval_ms: 1000,
            count_log_dir: "logs".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "line_counter=info".to_string(),
        }
    }
}

// ============================================================================
// DETECTIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VehicleClass {
    Car,
    Truck,
    Bus,
    Motorcycle,
    Unknown,
}

impl VehicleClass {
    /// COCO ids emitted by the YOLO detector: 2=car, 3=motorcycle, 5=bus, 7=truck
    pub fn from_coco_id(class_id: u32) -> Self {
        match class_id {
            2 => Self::Car,
            3 => Self::Motorcycle,
            5 => Self::Bus,
            7 => Self::Truck,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Car => "Car",
            Self::Truck => "Truck",
            Self::Bus => "Bus",
            Self::Motorcycle => "Motorcycle",
            Self::Unknown => "Unknown",
        }
    }
}

/// One detector output box for the current frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: [f32; 4], // [x1, y1, x2, y2] pixels
    pub class: VehicleClass,
    pub confidence: f32,
}

impl Detection {
    pub fn new(bbox: [f32; 4], class: VehicleClass, confidence: f32) -> Self {
        Self {
            bbox,
            class,
            confidence,
        }
    }

    /// Box centre truncated to whole pixels
    pub fn center(&self) -> Center {
        Center {
            x: ((self.bbox[0] + self.bbox[2]) * 0.5) as i32,
            y: ((self.bbox[1] + self.bbox[3]) * 0.5) as i32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Center {
    pub x: i32,
    pub y: i32,
}

impl Center {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Center) -> f32 {
        let dx = (self.x as i64 - other.x as i64) as f64;
        let dy = (self.y as i64 - other.y as i64) as f64;
        (dx * dx + dy * dy).sqrt() as f32
    }
}

// ============================================================================
// TRACKS & EVENTS
// ============================================================================

/// An in-band detection with its provisional identity for this frame
#[derive(Debug, Clone, Serialize)]
pub struct Track {
    pub id: u32,
    pub center: Center,
    pub counted: bool,
    pub bbox: [f32; 4],
    pub class: VehicleClass,
    pub confidence: f32,
}

/// Emitted exactly once per counted identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountEvent {
    pub track_id: u32,
    pub lane: u32,
    pub vehicle_class: VehicleClass,
    pub confidence: f32,
    pub occurred_at: DateTime<Utc>,
}
