//! Status reporting for the `hsync` CLI.
//!
//! Coordinator status is echoed on **stderr** so stdout remains parseable
//! for scripts. Three modes: human lines, one JSON object per line, or
//! nothing.
//!
//! Status arrives through a `watch` channel, which keeps only the latest
//! value. Transitions that happen faster than the reporter wakes up are
//! coalesced, so intermediate phases may be skipped. The status a call
//! settles on is always reported.

use std::io::Write;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::coordinator::{SyncPhase, SyncStatus};

/// Reports coordinator status changes.
pub trait StatusReporter: Send + Sync {
    fn report(&self, status: &SyncStatus);
}

fn phase_label(phase: SyncPhase) -> &'static str {
    match phase {
        SyncPhase::Idle => "idle",
        SyncPhase::FetchingCredential => "credential",
        SyncPhase::Authorizing => "authorize",
        SyncPhase::Ready => "ready",
        SyncPhase::Fetching => "fetch",
        SyncPhase::Uploading => "upload",
        SyncPhase::Done => "done",
        SyncPhase::Failed => "failed",
    }
}

/// Human-friendly line: "sync  upload     Uploading 1,234 records...".
pub struct StderrStatus;

fn human_line(status: &SyncStatus) -> String {
    format!("sync  {:<10} {}\n", phase_label(status.phase), status.message)
}

impl StatusReporter for StderrStatus {
    fn report(&self, status: &SyncStatus) {
        let line = human_line(status);
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable status: one JSON object per line on stderr.
pub struct JsonStatus;

impl StatusReporter for JsonStatus {
    fn report(&self, status: &SyncStatus) {
        let obj = serde_json::json!({
            "event": "status",
            "phase": status.phase,
            "message": status.message,
            "is_error": status.is_error,
        });
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoStatus;

impl StatusReporter for NoStatus {
    fn report(&self, _status: &SyncStatus) {}
}

/// Format a count with thousands separators.
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
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

    pub fn reporter(&self) -> Box<dyn StatusReporter> {
        match self {
            ProgressMode::Off => Box::new(NoStatus),
            ProgressMode::Human => Box::new(StderrStatus),
            ProgressMode::Json => Box::new(JsonStatus),
        }
    }
}

/// Report the latest status whenever it changes, until the coordinator
/// is dropped.
pub fn follow(
    mut rx: watch::Receiver<SyncStatus>,
    reporter: Box<dyn StatusReporter>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let status = rx.borrow_and_update().clone();
            reporter.report(&status);
        }
    })
}
