// src/count_log.rs
//
// Periodic snapshot log, one JSON array per UTC day:
//   <dir>/count_<YYYY-MM-DD>.json

use crate::pipeline::SessionStats;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountLogEntry {
    pub timestamp: DateTime<Utc>,
    pub total_count: u64,
    pub session_duration_minutes: i64,
}

impl CountLogEntry {
    pub fn from_stats(stats: &SessionStats, now: DateTime<Utc>) -> Self {
        Self {
            timestamp: now,
            total_count: stats.total_count,
            session_duration_minutes: (now - stats.session_start).num_minutes(),
        }
    }
}

pub struct CountLog {
    dir: PathBuf,
}

impl CountLog {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create log dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, at: DateTime<Utc>) -> PathBuf {
        self.dir
            .join(format!("count_{}.json", at.date_naive().format("%Y-%m-%d")))
    }

    pub fn load(&self, at: DateTime<Utc>) -> Result<Vec<CountLogEntry>> {
        let path = self.path_for(at);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("Malformed count log {}", path.display()))
    }

    /// Append a snapshot to the file for `now`'s day. Returns the file written.
    pub fn append(&self, stats: &SessionStats, now: DateTime<Utc>) -> Result<PathBuf> {
        let mut entries = self.load(now)?;
        entries.push(CountLogEntry::from_stats(stats, now));

        let path = self.path_for(now);
        let json = serde_json::to_string_pretty(&entries)?;
        fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;

        debug!("Count saved to {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn stats(total: u64, start: DateTime<Utc>) -> SessionStats {
        let mut s = SessionStats::new(start);
        s.total_count = total;
        s
    }

    #[test]
    fn test_appends_to_daily_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = CountLog::new(dir.path()).unwrap();
        let start = Utc.with_ymd_and_hms(2026, 4, 3, 9, 0, 0).unwrap();

        let path = log.append(&stats(3, start), start + Duration::minutes(10)).unwrap();
        log.append(&stats(7, start), start + Duration::minutes(95)).unwrap();

        assert!(path.ends_with("count_2026-04-03.json"));
        let entries = log.load(start).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].total_count, 3);
        assert_eq!(entries[0].session_duration_minutes, 10);
        assert_eq!(entries[1].session_duration_minutes, 95);
    }

    #[test]
    fn test_new_day_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = CountLog::new(dir.path()).unwrap();
        let start = Utc.with_ymd_and_hms(2026, 4, 3, 23, 50, 0).unwrap();

        log.append(&stats(1, start), start).unwrap();
        let next = start + Duration::minutes(20);
        log.append(&stats(2, start), next).unwrap();

        assert_eq!(log.load(start).unwrap().len(), 1);
        assert_eq!(log.load(next).unwrap().len(), 1);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let log = CountLog::new(dir.path()).unwrap();
        let now = Utc::now();
        fs::write(log.path_for(now), "not json").unwrap();
        assert!(log.append(&stats(1, now), now).is_err());
    }
}
