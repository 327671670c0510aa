// src/storage/jsonl.rs
//
// Append-only JSON-lines store:
//   <dir>/entries.jsonl   one StoredEntry per counted vehicle
//   <dir>/sessions.jsonl  one SessionRecord per lifecycle change (last line per id wins)
//
// Each write opens the file in append mode and writes a single line, so a
// crash loses at most the line being written.

use super::{CountSink, SessionRecord, StoredEntry};
use crate::types::CountEvent;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::info;

const ENTRIES_FILE: &str = "entries.jsonl";
const SESSIONS_FILE: &str = "sessions.jsonl";

pub struct JsonlSink {
    dir: PathBuf,
    last_id: AtomicU64,
    write_lock: Mutex<()>,
}

impl JsonlSink {
    /// Open (or create) a store directory. Record ids continue after the
    /// highest id already on disk.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create store dir {}", dir.display()))?;

        let existing: Vec<StoredEntry> = read_lines(&dir.join(ENTRIES_FILE))?;
        let last_id = existing.iter().map(|e| e.id).max().unwrap_or(0);

        info!(
            "✓ JSONL store ready at {} ({} existing entries)",
            dir.display(),
            existing.len()
        );

        Ok(Self {
            dir,
            last_id: AtomicU64::new(last_id),
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn append<T: Serialize>(&self, file_name: &str, value: &T) -> Result<()> {
        let line = serde_json::to_string(value)?;
        let path = self.dir.join(file_name);

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        writeln!(file, "{}", line).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;

    let mut out = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let value = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: malformed record", path.display(), idx + 1))?;
        out.push(value);
    }
    Ok(out)
}

impl CountSink for JsonlSink {
    fn begin_session(&self, session_id: &str, started_at: DateTime<Utc>) -> Result<()> {
        if self.sessions()?.iter().any(|s| s.session_id == session_id) {
            bail!("Session {} already exists", session_id);
        }
        self.append(SESSIONS_FILE, &SessionRecord::active(session_id, started_at))
    }

    fn record(&self, event: &CountEvent, session_id: &str) -> Result<u64> {
        let id = self.last_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.append(ENTRIES_FILE, &StoredEntry::from_event(id, session_id, event))?;
        Ok(id)
    }

    fn end_session(
        &self,
        session_id: &str,
        final_total: u64,
        ended_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut session = match self
            .sessions()?
            .into_iter()
            .find(|s| s.session_id == session_id)
        {
            Some(s) => s,
            None => bail!("Unknown session {}", session_id),
        };
        session.complete(final_total, ended_at);
        self.append(SESSIONS_FILE, &session)
    }

    fn sessions(&self) -> Result<Vec<SessionRecord>> {
        let history: Vec<SessionRecord> = read_lines(&self.dir.join(SESSIONS_FILE))?;
        let mut latest: Vec<SessionRecord> = Vec::new();
        for record in history {
            match latest.iter_mut().find(|s| s.session_id == record.session_id) {
                Some(existing) => *existing = record,
                None => latest.push(record),
            }
        }
        Ok(latest)
    }

    fn load_entries(&self) -> Result<Vec<StoredEntry>> {
        read_lines(&self.dir.join(ENTRIES_FILE))
    }

    /// Rewrites entries.jsonl through a temp file and rename. Ids are not reused.
    fn prune_before(&self, cutoff: NaiveDate) -> Result<usize> {
        let path = self.dir.join(ENTRIES_FILE);
        let tmp = self.dir.join(format!("{}.tmp", ENTRIES_FILE));

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let entries: Vec<StoredEntry> = read_lines(&path)?;
        let before = entries.len();

        let mut file =
            File::create(&tmp).with_context(|| format!("Failed to create {}", tmp.display()))?;
        let mut kept = 0;
        for entry in entries.iter().filter(|e| e.occurred_at.date_naive() >= cutoff) {
            writeln!(file, "{}", serde_json::to_string(entry)?)?;
            kept += 1;
        }
        file.sync_all()?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;

        Ok(before - kept)
    }
}
