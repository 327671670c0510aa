// src/storage/mod.rs
//
// Persistence boundary for counted vehicles.
//
// The engine only ever writes through `CountSink` after the live statistics
// have been published, and treats every error from here as a warning.
// Historical queries (daily report, recent entries, per-day totals) are
// derived from the stored entries and are used by the presentation side,
// never by the per-frame path.

pub mod jsonl;
pub mod memory;

pub use jsonl::JsonlSink;
pub use memory::MemorySink;

use crate::types::{CountEvent, VehicleClass};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

// ============================================================================
// RECORDS
// ============================================================================

/// One persisted vehicle crossing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub id: u64,
    pub session_id: String,
    pub occurred_at: DateTime<Utc>,
    pub lane: u32,
    pub vehicle_class: VehicleClass,
    pub confidence: f32,
}

impl StoredEntry {
    pub fn from_event(id: u64, session_id: &str, event: &CountEvent) -> Self {
        Self {
            id,
            session_id: session_id.to_string(),
            occurred_at: event.occurred_at,
            lane: event.lane,
            vehicle_class: event.vehicle_class,
            confidence: event.confidence,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_vehicles: Option<u64>,
    pub status: SessionStatus,
}

impl SessionRecord {
    pub fn active(session_id: &str, start_time: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.to_string(),
            start_time,
            end_time: None,
            total_vehicles: None,
            status: SessionStatus::Active,
        }
    }

    pub fn complete(&mut self, final_total: u64, ended_at: DateTime<Utc>) {
        self.end_time = Some(ended_at);
        self.total_vehicles = Some(final_total);
        self.status = SessionStatus::Completed;
    }
}

// ============================================================================
// REPORTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyCount {
    pub hour: u32,
    pub count: u64,
    pub avg_confidence: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PeakHour {
    pub hour: u32,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub total: u64,
    pub hourly_breakdown: Vec<HourlyCount>,
    pub peak_hour: PeakHour,
    /// Mean count over hours that saw at least one vehicle, one decimal
    pub avg_per_hour: f64,
    pub lane_breakdown: BTreeMap<u32, u64>,
    pub class_breakdown: BTreeMap<VehicleClass, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyTotal {
    pub date: NaiveDate,
    pub total: u64,
    pub peak_hour: PeakHour,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub total_entries: u64,
    pub earliest_date: Option<NaiveDate>,
    pub latest_date: Option<NaiveDate>,
}

const CSV_HEADER: [&str; 6] = ["ID", "Timestamp", "Lane", "Vehicle Type", "Confidence", "Session ID"];

/// Entries whose UTC date lies in `[start, end]`, oldest first. Either bound
/// may be open.
pub fn entries_between(
    entries: Vec<StoredEntry>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Vec<StoredEntry> {
    let mut selected: Vec<StoredEntry> = entries
        .into_iter()
        .filter(|e| {
            let date = e.occurred_at.date_naive();
            start.map_or(true, |s| date >= s) && end.map_or(true, |end| date <= end)
        })
        .collect();
    selected.sort_by(|a, b| a.occurred_at.cmp(&b.occurred_at).then_with(|| a.id.cmp(&b.id)));
    selected
}

pub fn write_csv(entries: &[StoredEntry], writer: &mut dyn Write) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(CSV_HEADER)?;
    for entry in entries {
        wtr.write_record(&[
            entry.id.to_string(),
            entry.occurred_at.to_rfc3339(),
            entry.lane.to_string(),
            entry.vehicle_class.as_str().to_string(),
            entry.confidence.to_string(),
            entry.session_id.clone(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Build the report for one UTC calendar day.
pub fn summarize_day(entries: &[StoredEntry], date: NaiveDate) -> DailySummary {
    let mut hours: BTreeMap<u32, (u64, f64)> = BTreeMap::new();
    let mut lane_breakdown = BTreeMap::new();
    let mut class_breakdown = BTreeMap::new();
    let mut total = 0u64;

    for entry in entries.iter().filter(|e| e.occurred_at.date_naive() == date) {
        total += 1;
        let slot = hours.entry(entry.occurred_at.hour()).or_insert((0, 0.0));
        slot.0 += 1;
        slot.1 += entry.confidence as f64;
        *lane_breakdown.entry(entry.lane).or_insert(0) += 1;
        *class_breakdown.entry(entry.vehicle_class).or_insert(0) += 1;
    }

    let hourly_breakdown: Vec<HourlyCount> = hours
        .iter()
        .map(|(&hour, &(count, conf_sum))| HourlyCount {
            hour,
            count,
            avg_confidence: ((conf_sum / count as f64) * 100.0).round() as f32 / 100.0,
        })
        .collect();

    // Earliest hour wins a tie
    let peak_hour = hourly_breakdown
        .iter()
        .fold(PeakHour::default(), |best, h| {
            if h.count > best.count {
                PeakHour {
                    hour: h.hour,
                    count: h.count,
                }
            } else {
                best
            }
        });

    let avg_per_hour = if hourly_breakdown.is_empty() {
        0.0
    } else {
        (total as f64 / hourly_breakdown.len() as f64 * 10.0).round() / 10.0
    };

    DailySummary {
        date,
        total,
        hourly_breakdown,
        peak_hour,
        avg_per_hour,
        lane_breakdown,
        class_breakdown,
    }
}

// ============================================================================
// SINK TRAIT
// ============================================================================

pub trait CountSink: Send + Sync {
    fn begin_session(&self, session_id: &str, started_at: DateTime<Utc>) -> Result<()>;

    /// Persist one crossing; returns the record id
    fn record(&self, event: &CountEvent, session_id: &str) -> Result<u64>;

    fn end_session(&self, session_id: &str, final_total: u64, ended_at: DateTime<Utc>)
        -> Result<()>;

    fn sessions(&self) -> Result<Vec<SessionRecord>>;

    fn load_entries(&self) -> Result<Vec<StoredEntry>>;

    /// Drop entries dated before `cutoff`; returns how many were removed
    fn prune_before(&self, cutoff: NaiveDate) -> Result<usize>;

    /// Retention: keep `days_to_keep` days back from `today`
    fn clear_old_data(&self, days_to_keep: u32, today: NaiveDate) -> Result<usize> {
        let removed = self.prune_before(today - Duration::days(days_to_keep as i64))?;
        info!("✓ Deleted {} old records", removed);
        Ok(removed)
    }

    fn store_stats(&self) -> Result<StoreStats> {
        let entries = self.load_entries()?;
        let dates = entries.iter().map(|e| e.occurred_at.date_naive());
        Ok(StoreStats {
            total_entries: entries.len() as u64,
            earliest_date: dates.clone().min(),
            latest_date: dates.max(),
        })
    }

    /// CSV of the entries in the date range; returns the row count
    fn export_csv(
        &self,
        writer: &mut dyn Write,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<usize> {
        let entries = entries_between(self.load_entries()?, start, end);
        write_csv(&entries, writer)?;
        Ok(entries.len())
    }

    fn export_csv_file(
        &self,
        path: &Path,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<usize> {
        let mut file =
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        let rows = self.export_csv(&mut file, start, end)?;
        info!("✓ Data exported to {} ({} rows)", path.display(), rows);
        Ok(rows)
    }

    fn query_daily_summary(&self, date: NaiveDate) -> Result<DailySummary> {
        Ok(summarize_day(&self.load_entries()?, date))
    }

    /// Newest first
    fn recent(&self, limit: usize) -> Result<Vec<StoredEntry>> {
        let mut entries = self.load_entries()?;
        entries.sort_by(|a, b| {
            b.occurred_at
                .cmp(&a.occurred_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        entries.truncate(limit);
        Ok(entries)
    }

    /// Totals for `today` and the `days` days before it, newest first. Days
    /// without entries are omitted.
    fn daily_totals(&self, days: u32, today: NaiveDate) -> Result<Vec<DailyTotal>> {
        let entries = self.load_entries()?;
        let since = today - Duration::days(days as i64);

        let mut dates: Vec<NaiveDate> = entries
            .iter()
            .map(|e| e.occurred_at.date_naive())
            .filter(|d| *d >= since && *d <= today)
            .collect();
        dates.sort_unstable_by(|a, b| b.cmp(a));
        dates.dedup();

        Ok(dates
            .into_iter()
            .map(|date| {
                let summary = summarize_day(&entries, date);
                DailyTotal {
                    date,
                    total: summary.total,
                    peak_hour: summary.peak_hour,
                }
            })
            .collect())
    }
}

impl<S: CountSink + ?Sized> CountSink for Arc<S> {
    fn begin_session(&self, session_id: &str, started_at: DateTime<Utc>) -> Result<()> {
        (**self).begin_session(session_id, started_at)
    }

    fn record(&self, event: &CountEvent, session_id: &str) -> Result<u64> {
        (**self).record(event, session_id)
    }

    fn end_session(
        &self,
        session_id: &str,
        final_total: u64,
        ended_at: DateTime<Utc>,
    ) -> Result<()> {
        (**self).end_session(session_id, final_total, ended_at)
    }

    fn sessions(&self) -> Result<Vec<SessionRecord>> {
        (**self).sessions()
    }

    fn load_entries(&self) -> Result<Vec<StoredEntry>> {
        (**self).load_entries()
    }

    fn prune_before(&self, cutoff: NaiveDate) -> Result<usize> {
        (**self).prune_before(cutoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(id: u64, at: DateTime<Utc>, lane: u32, class: VehicleClass, conf: f32) -> StoredEntry {
        StoredEntry {
            id,
            session_id: "s".to_string(),
            occurred_at: at,
            lane,
            vehicle_class: class,
            confidence: conf,
        }
    }

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_summary_breakdowns_and_peak() {
        let entries = vec![
            entry(1, at(10, 8, 5), 1, VehicleClass::Car, 0.9),
            entry(2, at(10, 8, 40), 2, VehicleClass::Car, 0.7),
            entry(3, at(10, 9, 10), 2, VehicleClass::Truck, 0.8),
            entry(4, at(11, 9, 10), 3, VehicleClass::Bus, 0.8),
        ];
        let date = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let s = summarize_day(&entries, date);

        assert_eq!(s.total, 3);
        assert_eq!(s.hourly_breakdown.len(), 2);
        assert_eq!(s.hourly_breakdown[0].hour, 8);
        assert_eq!(s.hourly_breakdown[0].count, 2);
        assert!((s.hourly_breakdown[0].avg_confidence - 0.8).abs() < 1e-6);
        assert_eq!(s.peak_hour, PeakHour { hour: 8, count: 2 });
        assert_eq!(s.avg_per_hour, 1.5);
        assert_eq!(s.lane_breakdown.get(&2), Some(&2));
        assert_eq!(s.class_breakdown.get(&VehicleClass::Truck), Some(&1));
        assert_eq!(s.class_breakdown.get(&VehicleClass::Bus), None);
    }

    #[test]
    fn test_summary_of_empty_day() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let s = summarize_day(&[], date);
        assert_eq!(s.total, 0);
        assert_eq!(s.peak_hour, PeakHour::default());
        assert_eq!(s.avg_per_hour, 0.0);
    }

    fn sink_with(entries: &[StoredEntry]) -> MemorySink {
        let sink = MemorySink::new();
        for e in entries {
            let event = CountEvent {
                track_id: e.id as u32,
                lane: e.lane,
                vehicle_class: e.vehicle_class,
                confidence: e.confidence,
                occurred_at: e.occurred_at,
            };
            sink.record(&event, &e.session_id).unwrap();
        }
        sink
    }

    #[test]
    fn test_csv_export_respects_date_range() {
        let sink = sink_with(&[
            entry(1, at(12, 9, 0), 2, VehicleClass::Bus, 0.5),
            entry(2, at(10, 8, 0), 1, VehicleClass::Car, 0.75),
            entry(3, at(11, 8, 0), 3, VehicleClass::Truck, 0.25),
        ]);
        let d = |day| NaiveDate::from_ymd_opt(2026, 3, day).unwrap();

        let mut out: Vec<u8> = Vec::new();
        let rows = sink.export_csv(&mut out, Some(d(10)), Some(d(11))).unwrap();
        assert_eq!(rows, 2);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "ID,Timestamp,Lane,Vehicle Type,Confidence,Session ID");
        assert_eq!(lines.len(), 3);
        // oldest first
        assert!(lines[1].contains("2026-03-10T08:00:00"));
        assert!(lines[1].ends_with(",1,Car,0.75,s"));
        assert!(lines[2].contains("Truck"));

        let mut all: Vec<u8> = Vec::new();
        assert_eq!(sink.export_csv(&mut all, Some(d(11)), None).unwrap(), 2);
        assert_eq!(sink.export_csv(&mut Vec::<u8>::new(), None, None).unwrap(), 3);
    }

    #[test]
    fn test_csv_export_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.csv");
        let sink = sink_with(&[entry(1, at(10, 8, 0), 1, VehicleClass::Car, 0.9)]);
        assert_eq!(sink.export_csv_file(&path, None, None).unwrap(), 1);
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 2);
    }

    #[test]
    fn test_store_stats_date_range() {
        let sink = MemorySink::new();
        assert_eq!(sink.store_stats().unwrap(), StoreStats::default());

        let sink = sink_with(&[
            entry(1, at(12, 9, 0), 2, VehicleClass::Bus, 0.5),
            entry(2, at(3, 8, 0), 1, VehicleClass::Car, 0.7),
            entry(3, at(7, 8, 0), 3, VehicleClass::Truck, 0.8),
        ]);
        let stats = sink.store_stats().unwrap();
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.earliest_date, NaiveDate::from_ymd_opt(2026, 3, 3));
        assert_eq!(stats.latest_date, NaiveDate::from_ymd_opt(2026, 3, 12));
    }

    #[test]
    fn test_clear_old_data_keeps_recent_days() {
        let sink = sink_with(&[
            entry(1, at(1, 9, 0), 1, VehicleClass::Car, 0.5),
            entry(2, at(20, 9, 0), 1, VehicleClass::Car, 0.5),
            entry(3, at(30, 9, 0), 1, VehicleClass::Car, 0.5),
        ]);
        let today = NaiveDate::from_ymd_opt(2026, 3, 30).unwrap();
        // cutoff 2026-03-20, which is kept
        assert_eq!(sink.clear_old_data(10, today).unwrap(), 1);
        let left = sink.load_entries().unwrap();
        assert_eq!(left.len(), 2);
        assert!(left.iter().all(|e| e.occurred_at.date_naive() >= NaiveDate::from_ymd_opt(2026, 3, 20).unwrap()));
    }

    #[test]
    fn test_peak_tie_prefers_earliest_hour() {
        let entries = vec![
            entry(1, at(10, 14, 0), 1, VehicleClass::Car, 0.9),
            entry(2, at(10, 7, 0), 1, VehicleClass::Car, 0.9),
        ];
        let s = summarize_day(&entries, NaiveDate::from_ymd_opt(2026, 3, 10).unwrap());
        assert_eq!(s.peak_hour.hour, 7);
    }
}
