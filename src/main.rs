// src/main.rs

use anyhow::Result;
use chrono::Utc;
use line_counter::count_log::CountLog;
use line_counter::replay::{find_detection_logs, read_frames};
use line_counter::{
    Config, CountSink, CountingEngine, JsonlSink, MemorySink, SessionStats, StatsHandle,
    StorageBackend,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());
    let config = if Path::new(&config_path).exists() {
        Some(Config::load(&config_path)?)
    } else {
        None
    };

    let level = config
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|| Config::default().logging.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🚗 Line Counter Starting");
    let config = match config {
        Some(c) => {
            info!("✓ Configuration loaded from {}", config_path);
            c
        }
        None => {
            warn!("{} not found, using defaults", config_path);
            Config::default()
        }
    };

    info!(
        "Counting line at {:.0}% of frame height, band ±{}px, {} lanes",
        config.counting.line_position * 100.0,
        config.counting.band_half_width,
        config.counting.lane_count
    );

    let logs = find_detection_logs(&config.replay.input_dir);
    if logs.is_empty() {
        error!("No detection logs found in {}", config.replay.input_dir);
        return Ok(());
    }

    let mut engine = build_engine(&config)?;
    engine.begin_session()?;

    let count_log = if config.replay.count_log_dir.is_empty() {
        None
    } else {
        Some(Arc::new(CountLog::new(&config.replay.count_log_dir)?))
    };
    let final_log = count_log.clone();

    let reporter = tokio::spawn(report_loop(
        engine.stats_handle(),
        count_log,
        Duration::from_millis(config.replay.report_interval_ms.max(1)),
    ));

    let (width, height) = (config.replay.frame_width, config.replay.frame_height);
    let producer = tokio::task::spawn_blocking(move || replay_all(engine, &logs, width, height));
    let mut engine = producer.await?;
    reporter.abort();

    // Final snapshot, same as the periodic ones
    if let (Some(log), Ok(stats)) = (final_log, engine.get_stats()) {
        append_count_log(log, stats).await;
    }

    let ended = engine.end_session()?;
    info!("\n========================================");
    info!("Session {} complete", ended.session_id);
    info!("  Total vehicles: {}", ended.stats.total_count);
    info!("  Rate: {} vehicles/hour", ended.stats.hourly_rate);
    for (lane, count) in &ended.stats.by_lane {
        info!("  Lane {}: {}", lane, count);
    }
    for (class, count) in &ended.stats.by_class {
        info!("  {}: {}", class.as_str(), count);
    }
    if let Some(e) = &ended.persistence_error {
        warn!("  Session record not saved: {}", e);
    }

    if let Some(sink) = engine.sink() {
        match sink.query_daily_summary(Utc::now().date_naive()) {
            Ok(day) => info!(
                "  Today: {} vehicles, peak hour {:02}:00 ({}), {:.1}/active hour",
                day.total, day.peak_hour.hour, day.peak_hour.count, day.avg_per_hour
            ),
            Err(e) => warn!("Daily summary unavailable: {:#}", e),
        }
    }
    info!("========================================");

    Ok(())
}

fn build_engine(config: &Config) -> Result<CountingEngine> {
    let engine = CountingEngine::new(config.counting.clone())?;
    Ok(match config.storage.backend {
        StorageBackend::Memory => engine.with_sink(MemorySink::new()),
        StorageBackend::Jsonl => engine.with_sink(JsonlSink::open(&config.storage.dir)?),
        StorageBackend::None => {
            info!("Persistence disabled");
            engine
        }
    })
}

/// Runs on the blocking pool; hands the engine back for shutdown.
fn replay_all(
    mut engine: CountingEngine,
    logs: &[PathBuf],
    width: u32,
    height: u32,
) -> CountingEngine {
    for (idx, path) in logs.iter().enumerate() {
        info!("Replaying {}/{}: {}", idx + 1, logs.len(), path.display());

        let frames = match read_frames(path) {
            Ok(frames) => frames,
            Err(e) => {
                error!("Skipping {}: {:#}", path.display(), e);
                continue;
            }
        };

        let mut failures = 0;
        for frame in frames {
            let frame_no = frame.frame;
            match engine.process(&frame.detections(), width, height) {
                Ok(outcome) => failures += outcome.persistence_failures.len(),
                Err(e) => {
                    // stop replaying but hand the engine back so the session is closed
                    error!("Frame {} of {} rejected: {}", frame_no, path.display(), e);
                    return engine;
                }
            }
        }
        if failures > 0 {
            warn!("{} crossings in {} were not persisted", failures, path.display());
        }
    }
    engine
}

/// File I/O goes to the blocking pool so the reporter never stalls the runtime.
async fn append_count_log(log: Arc<CountLog>, stats: SessionStats) {
    match tokio::task::spawn_blocking(move || log.append(&stats, Utc::now())).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => warn!("Could not write count log: {:#}", e),
        Err(e) => warn!("Count log task failed: {}", e),
    }
}

async fn report_loop(handle: StatsHandle, count_log: Option<Arc<CountLog>>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    // first tick fires immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let stats = match handle.snapshot() {
            Ok(stats) => stats,
            Err(e) => {
                debug!("No stats yet: {}", e);
                continue;
            }
        };

        info!(
            "📊 {} vehicles, {}/hour, lanes {:?}",
            stats.total_count, stats.hourly_rate, stats.by_lane
        );
        if let Some(log) = &count_log {
            append_count_log(Arc::clone(log), stats).await;
        }
    }
}
