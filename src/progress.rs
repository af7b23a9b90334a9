//! Batch progress tracking.
//!
//! A [`ProgressTracker`] holds the `{active, total, done, start}` state of
//! the batch currently running for one pipeline kind. A concurrent caller
//! (the HTTP server, a CLI ticker) polls [`ProgressTracker::snapshot`] while
//! the batch advances it.
//!
//! The lifecycle is tied to handles rather than to ad hoc calls:
//!
//! ```text
//!   idle ──begin(total)──▶ running ──(BatchRun dropped/finished)──▶ idle
//!                            │  ▲
//!                            └──┘ ItemGuard dropped: done = min(done + 1, total)
//! ```
//!
//! Both [`BatchRun`] and [`ItemGuard`] do their work in `Drop`, so progress
//! advances and the run is finalized even when a stage returns early with
//! an error or the batch future is dropped mid-flight.
//!
//! All four fields live behind one mutex and are always updated together,
//! so a reader never sees a torn state. Two concurrent batches of the same
//! kind sharing a tracker will overwrite each other's counters; callers that
//! need isolation must use separate trackers.
//!
//! Progress events can also be mirrored to **stderr** (human lines or JSON
//! lines) through a [`ProgressReporter`], keeping stdout parseable.

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::DocumentKind;

/// Point-in-time view of a tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ProgressSnapshot {
    pub active: bool,
    pub total: u64,
    pub done: u64,
    pub start: Option<DateTime<Utc>>,
}

/// A single progress event, mirrored to a [`ProgressReporter`].
#[derive(Clone, Debug)]
pub enum ProgressEvent {
    /// A batch of `total` items started.
    Started { kind: String, total: u64 },
    /// `done` of `total` items have been attempted.
    Advanced { kind: String, done: u64, total: u64 },
    /// The batch loop ended.
    Finished { kind: String, done: u64, total: u64 },
}

/// Receives progress events. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "ingest documents  3 / 12 files".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Started { kind, total } => {
                format!("ingest {}  starting  {} files\n", kind, format_number(*total))
            }
            ProgressEvent::Advanced { kind, done, total } => format!(
                "ingest {}  {} / {} files\n",
                kind,
                format_number(*done),
                format_number(*total)
            ),
            ProgressEvent::Finished { kind, done, total } => format!(
                "ingest {}  finished  {} / {} files\n",
                kind,
                format_number(*done),
                format_number(*total)
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Started { kind, total } => serde_json::json!({
                "event": "progress",
                "kind": kind,
                "phase": "started",
                "done": 0,
                "total": total
            }),
            ProgressEvent::Advanced { kind, done, total } => serde_json::json!({
                "event": "progress",
                "kind": kind,
                "phase": "running",
                "done": done,
                "total": total
            }),
            ProgressEvent::Finished { kind, done, total } => serde_json::json!({
                "event": "progress",
                "kind": kind,
                "phase": "finished",
                "done": done,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress output is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

fn format_number(n: u64) -> String {
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

/// Progress output mode for the CLI: off, human (stderr), or JSON (stderr).
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

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "off" => Some(ProgressMode::Off),
            "human" => Some(ProgressMode::Human),
            "json" => Some(ProgressMode::Json),
            _ => None,
        }
    }

    pub fn reporter(&self) -> Arc<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Arc::new(NoProgress),
            ProgressMode::Human => Arc::new(StderrProgress),
            ProgressMode::Json => Arc::new(JsonProgress),
        }
    }
}

/// Mutex-guarded progress state for one pipeline kind.
pub struct ProgressTracker {
    kind: String,
    state: Mutex<ProgressSnapshot>,
    reporter: Arc<dyn ProgressReporter>,
}

impl ProgressTracker {
    pub fn new(kind: impl Into<String>) -> Self {
        Self::with_reporter(kind, Arc::new(NoProgress))
    }

    pub fn with_reporter(kind: impl Into<String>, reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            kind: kind.into(),
            state: Mutex::new(ProgressSnapshot::default()),
            reporter,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Consistent copy of the current state.
    pub fn snapshot(&self) -> ProgressSnapshot {
        *self.lock()
    }

    /// Transition idle → running for a batch of `total` items.
    ///
    /// The returned handle finalizes the run (`active = false`) when it is
    /// finished or dropped. `total`, `done`, and `start` stay at their final
    /// values until the next `begin`.
    pub fn begin(&self, total: usize) -> BatchRun<'_> {
        let total = total as u64;
        {
            let mut state = self.lock();
            *state = ProgressSnapshot {
                active: true,
                total,
                done: 0,
                start: Some(Utc::now()),
            };
        }
        self.reporter.report(ProgressEvent::Started {
            kind: self.kind.clone(),
            total,
        });
        BatchRun {
            tracker: self,
            finished: false,
        }
    }

    fn advance(&self) {
        let (done, total) = {
            let mut state = self.lock();
            state.done = (state.done + 1).min(state.total);
            (state.done, state.total)
        };
        self.reporter.report(ProgressEvent::Advanced {
            kind: self.kind.clone(),
            done,
            total,
        });
    }

    fn finalize(&self) {
        let (done, total) = {
            let mut state = self.lock();
            state.active = false;
            (state.done, state.total)
        };
        self.reporter.report(ProgressEvent::Finished {
            kind: self.kind.clone(),
            done,
            total,
        });
    }

    fn lock(&self) -> MutexGuard<'_, ProgressSnapshot> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Handle for one running batch. Dropping it ends the run.
pub struct BatchRun<'a> {
    tracker: &'a ProgressTracker,
    finished: bool,
}

impl<'a> BatchRun<'a> {
    /// Guard for one item; progress advances when the guard is dropped,
    /// whatever the item's outcome.
    pub fn item(&self) -> ItemGuard<'a> {
        ItemGuard {
            tracker: self.tracker,
        }
    }

    /// End the run explicitly (equivalent to dropping the handle).
    pub fn finish(mut self) {
        self.finished = true;
        self.tracker.finalize();
    }
}

impl Drop for BatchRun<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.tracker.finalize();
        }
    }
}

/// Advances its tracker by one on drop.
pub struct ItemGuard<'a> {
    tracker: &'a ProgressTracker,
}

impl Drop for ItemGuard<'_> {
    fn drop(&mut self) {
        self.tracker.advance();
    }
}

/// One tracker per pipeline kind ("documents", "roles").
#[derive(Clone)]
pub struct ProgressRegistry {
    trackers: HashMap<DocumentKind, Arc<ProgressTracker>>,
}

impl ProgressRegistry {
    pub fn new() -> Self {
        Self::with_reporter(Arc::new(NoProgress))
    }

    pub fn with_reporter(reporter: Arc<dyn ProgressReporter>) -> Self {
        let trackers = DocumentKind::ALL
            .iter()
            .map(|kind| {
                (
                    *kind,
                    Arc::new(ProgressTracker::with_reporter(
                        kind.progress_key(),
                        reporter.clone(),
                    )),
                )
            })
            .collect();
        Self { trackers }
    }

    pub fn tracker(&self, kind: DocumentKind) -> Arc<ProgressTracker> {
        match self.trackers.get(&kind) {
            Some(t) => t.clone(),
            None => Arc::new(ProgressTracker::new(kind.progress_key())),
        }
    }

    pub fn snapshot(&self, kind: DocumentKind) -> ProgressSnapshot {
        self.tracker(kind).snapshot()
    }
}

impl Default for ProgressRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl ProgressReporter for Recorder {
        fn report(&self, event: ProgressEvent) {
            let tag = match event {
                ProgressEvent::Started { total, .. } => format!("start:{}", total),
                ProgressEvent::Advanced { done, .. } => format!("adv:{}", done),
                ProgressEvent::Finished { done, .. } => format!("end:{}", done),
            };
            self.0.lock().unwrap().push(tag);
        }
    }

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn starts_idle() {
        let t = ProgressTracker::new("documents");
        assert_eq!(t.snapshot(), ProgressSnapshot::default());
    }

    #[test]
    fn full_lifecycle() {
        let t = ProgressTracker::new("documents");
        let run = t.begin(3);
        let s = t.snapshot();
        assert!(s.active);
        assert_eq!((s.done, s.total), (0, 3));
        assert!(s.start.is_some());

        for expected in 1..=3 {
            drop(run.item());
            assert_eq!(t.snapshot().done, expected);
            assert!(t.snapshot().active);
        }
        run.finish();

        let s = t.snapshot();
        assert!(!s.active);
        assert_eq!((s.done, s.total), (3, 3));
        assert!(s.start.is_some());
    }

    #[test]
    fn done_never_exceeds_total() {
        let t = ProgressTracker::new("roles");
        let run = t.begin(1);
        drop(run.item());
        drop(run.item());
        assert_eq!(t.snapshot().done, 1);
    }

    #[test]
    fn dropping_run_finalizes() {
        let t = ProgressTracker::new("documents");
        {
            let run = t.begin(2);
            let _guard = run.item();
        }
        let s = t.snapshot();
        assert!(!s.active);
        assert_eq!(s.done, 1);
    }

    #[test]
    fn item_guard_advances_on_early_return() {
        fn failing_step(run: &BatchRun<'_>) -> Result<(), String> {
            let _guard = run.item();
            Err("boom".into())
        }
        let t = ProgressTracker::new("documents");
        let run = t.begin(2);
        assert!(failing_step(&run).is_err());
        assert_eq!(t.snapshot().done, 1);
    }

    #[test]
    fn next_batch_resets_counters() {
        let t = ProgressTracker::new("documents");
        let run = t.begin(2);
        drop(run.item());
        drop(run.item());
        run.finish();
        let run = t.begin(5);
        let s = t.snapshot();
        assert_eq!((s.active, s.done, s.total), (true, 0, 5));
        drop(run);
    }

    #[test]
    fn events_are_mirrored_to_reporter() {
        let rec = Arc::new(Recorder::default());
        let t = ProgressTracker::with_reporter("documents", rec.clone());
        let run = t.begin(2);
        drop(run.item());
        drop(run.item());
        run.finish();
        let events = rec.0.lock().unwrap().clone();
        assert_eq!(events, vec!["start:2", "adv:1", "adv:2", "end:2"]);
    }

    #[test]
    fn concurrent_reader_sees_monotonic_consistent_state() {
        let t = Arc::new(ProgressTracker::new("documents"));
        let reader = {
            let t = t.clone();
            std::thread::spawn(move || {
                let mut last = 0;
                for _ in 0..10_000 {
                    let s = t.snapshot();
                    assert!(s.done <= s.total);
                    if s.active {
                        assert!(s.done >= last);
                        last = s.done;
                    }
                }
            })
        };
        let run = t.begin(500);
        for _ in 0..500 {
            drop(run.item());
        }
        run.finish();
        reader.join().unwrap();
        assert_eq!(t.snapshot().done, 500);
    }

    #[test]
    fn registry_has_independent_trackers() {
        let reg = ProgressRegistry::new();
        let docs = reg.tracker(DocumentKind::Cv);
        let run = docs.begin(4);
        assert!(reg.snapshot(DocumentKind::Cv).active);
        assert!(!reg.snapshot(DocumentKind::Role).active);
        drop(run);
        assert_eq!(reg.tracker(DocumentKind::Role).kind(), "roles");
    }

    #[test]
    fn progress_mode_parse() {
        assert_eq!(ProgressMode::parse("json"), Some(ProgressMode::Json));
        assert_eq!(ProgressMode::parse("loud"), None);
    }
}
