//! The event side channel: a JSONL sink external UIs can consume.
//!
//! Emission is append-only and line-buffered; each line is one
//! [`EventLine`][outfitter_schema::EventLine]. The sink is per-run, never
//! global, and a no-op unless the user asked for `--events jsonl`.

use std::io::Write;
use std::sync::Mutex;

use outfitter_schema::{EventBody, EventLine, RunSummary};

use crate::state;

/// Where the event stream goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventsMode {
    /// No stream
    #[default]
    Off,
    /// One JSON object per line on stderr
    Jsonl,
}

/// The per-run event sink handed to workers and the orchestrator
pub struct EventSink {
    mode: EventsMode,
    run_id: String,
    stream: Mutex<Box<dyn Write + Send>>,
}

impl EventSink {
    /// A sink for one run, writing to stderr when enabled
    pub fn new(mode: EventsMode, run_id: &str) -> Self {
        EventSink {
            mode,
            run_id: run_id.to_owned(),
            stream: Mutex::new(Box::new(std::io::stderr())),
        }
    }

    /// A sink writing somewhere else (tests use an in-memory buffer)
    pub fn with_stream(mode: EventsMode, run_id: &str, stream: Box<dyn Write + Send>) -> Self {
        EventSink {
            mode,
            run_id: run_id.to_owned(),
            stream: Mutex::new(stream),
        }
    }

    /// Whether emitting does anything
    pub fn enabled(&self) -> bool {
        self.mode == EventsMode::Jsonl
    }

    /// Emit one event under a phase
    pub fn emit(&self, phase: &str, body: EventBody) {
        if !self.enabled() {
            return;
        }
        let line = EventLine {
            ts: state::now_utc(),
            run_id: self.run_id.clone(),
            phase: phase.to_owned(),
            body,
        };
        // a broken pipe on the event stream must never take down the run
        if let Ok(json) = serde_json::to_string(&line) {
            let mut stream = self.stream.lock().unwrap();
            let _ = writeln!(stream, "{json}");
            let _ = stream.flush();
        }
    }

    /// Announce a phase transition
    pub fn phase(&self, phase: &str) {
        self.emit(phase, EventBody::Phase {});
    }

    /// Announce a produced artifact (plan file, journal, bundle)
    pub fn artifact(&self, phase: &str, path: &str) {
        self.emit(
            phase,
            EventBody::Artifact {
                path: path.to_owned(),
            },
        );
    }

    /// Announce an item-level result
    pub fn item(&self, phase: &str, item: serde_json::Value) {
        self.emit(phase, EventBody::Item { item });
    }

    /// Announce the run's terminal summary
    pub fn summary(&self, summary: &RunSummary) {
        self.emit(
            "summary",
            EventBody::Summary {
                summary: summary.clone(),
            },
        );
    }
}
