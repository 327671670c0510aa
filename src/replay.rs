// src/replay.rs
//
// Recorded detector output, one frame per line:
//   {"frame": 12, "detections": [{"bbox": [x1,y1,x2,y2], "class_id": 2, "confidence": 0.81}]}

use crate::types::{Detection, VehicleClass};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

#[derive(Debug, Clone, Deserialize)]
pub struct RawDetection {
    pub bbox: [f32; 4],
    pub class_id: u32,
    pub confidence: f32,
}

impl RawDetection {
    pub fn into_detection(self) -> Detection {
        Detection::new(self.bbox, VehicleClass::from_coco_id(self.class_id), self.confidence)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplayFrame {
    pub frame: u64,
    #[serde(default)]
    pub detections: Vec<RawDetection>,
}

impl ReplayFrame {
    pub fn detections(self) -> Vec<Detection> {
        self.detections
            .into_iter()
            .map(RawDetection::into_detection)
            .collect()
    }
}

/// All `*.jsonl` files under `dir`, sorted so replays run in a stable order
pub fn find_detection_logs(dir: impl AsRef<Path>) -> Vec<PathBuf> {
    let mut logs: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("jsonl"))
                .unwrap_or(false)
        })
        .collect();
    logs.sort();

    info!("Found {} detection logs", logs.len());
    logs
}

pub fn read_frames(path: &Path) -> Result<Vec<ReplayFrame>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;

    let mut frames = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let frame: ReplayFrame = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: bad frame record", path.display(), idx + 1))?;
        frames.push(frame);
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_finds_logs_recursively() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("cam2")).unwrap();
        fs::write(dir.path().join("b.jsonl"), "").unwrap();
        fs::write(dir.path().join("cam2/a.JSONL"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();

        let logs = find_detection_logs(dir.path());
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|p| p.extension().is_some()));
        assert!(!logs.iter().any(|p| p.ends_with("notes.txt")));
    }

    #[test]
    fn test_parses_frames_and_maps_classes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.jsonl");
        fs::write(
            &path,
            concat!(
                r#"{"frame": 0, "detections": [{"bbox": [0, 0, 10, 10], "class_id": 7, "confidence": 0.6}]}"#,
                "\n\n",
                r#"{"frame": 1}"#,
                "\n"
            ),
        )
        .unwrap();

        let frames = read_frames(&path).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].frame, 1);
        assert!(frames[1].detections.is_empty());

        let dets = frames.into_iter().next().unwrap().detections();
        assert_eq!(dets[0].class, VehicleClass::Truck);
        assert_eq!(dets[0].bbox, [0.0, 0.0, 10.0, 10.0]);
    }

    #[test]
    fn test_bad_line_names_location() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        fs::write(&path, "{\"frame\": 0}\n{oops\n").unwrap();
        let err = read_frames(&path).unwrap_err();
        assert!(format!("{:#}", err).contains(":2: bad frame record"));
    }
}
