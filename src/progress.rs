//! Reindex progress reporting.
//!
//! Reports observable progress during `capcat reindex` and `capcat index
//! reset` so operators see how many captures are done, how many failed,
//! and how many remain. Progress is emitted on **stderr** so stdout stays
//! parseable for scripts.

use std::io::Write;

use capture_catalog_core::indexing::ReindexProgress;
use capture_catalog_core::models::CaptureType;

/// A single progress event for a reindex run.
#[derive(Clone, Debug)]
pub enum ReindexEvent {
    /// Mapping check and capture listing; total unknown yet.
    Preparing { capture_type: CaptureType },
    /// `done` of `total` captures processed, `failed` of them failed.
    Indexing {
        capture_type: CaptureType,
        done: u64,
        total: u64,
        failed: u64,
    },
}

impl ReindexEvent {
    pub fn from_progress(capture_type: CaptureType, p: ReindexProgress) -> Self {
        ReindexEvent::Indexing {
            capture_type,
            done: p.done as u64,
            total: p.total as u64,
            failed: p.failed as u64,
        }
    }
}

/// Reports reindex progress. Implementations write to stderr (human or JSON).
pub trait ReindexProgressReporter: Send + Sync {
    fn report(&self, event: ReindexEvent);
}

/// Human-friendly progress on stderr: "reindex drf  1,234 / 5,000 captures  (3 failed)".
pub struct StderrProgress;

impl ReindexProgressReporter for StderrProgress {
    fn report(&self, event: ReindexEvent) {
        let line = match &event {
            ReindexEvent::Preparing { capture_type } => {
                format!("reindex {}  preparing...\n", capture_type)
            }
            ReindexEvent::Indexing {
                capture_type,
                done,
                total,
                failed,
            } => {
                let mut line = format!(
                    "reindex {}  {} / {} captures",
                    capture_type,
                    format_number(*done),
                    format_number(*total)
                );
                if *failed > 0 {
                    line.push_str(&format!("  ({} failed)", format_number(*failed)));
                }
                line.push('\n');
                line
            }
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ReindexProgressReporter for JsonProgress {
    fn report(&self, event: ReindexEvent) {
        let obj = match &event {
            ReindexEvent::Preparing { capture_type } => serde_json::json!({
                "event": "progress",
                "capture_type": capture_type.as_str(),
                "phase": "preparing"
            }),
            ReindexEvent::Indexing {
                capture_type,
                done,
                total,
                failed,
            } => serde_json::json!({
                "event": "progress",
                "capture_type": capture_type.as_str(),
                "phase": "indexing",
                "done": done,
                "total": total,
                "failed": failed
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ReindexProgressReporter for NoProgress {
    fn report(&self, _event: ReindexEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ReindexProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
