//! Run progress reporting.
//!
//! Reports which phase `ctopics run` is in and how many items each phase
//! produced, so users see where a long engine call is spending its time.
//! Progress is emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// Phase of a run, in execution order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RunPhase {
    /// Reading raw rows from the input file.
    Reading,
    /// Grouping rows into documents.
    Aggregating,
    /// Embedding, clustering, and describing topics.
    Discovering,
    /// Writing the labeled dataset and model artifact.
    Writing,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Reading => "reading",
            RunPhase::Aggregating => "aggregating",
            RunPhase::Discovering => "discovering",
            RunPhase::Writing => "writing",
        }
    }
}

/// A single progress event.
#[derive(Clone, Debug)]
pub enum ProgressEvent {
    /// A phase has begun; `items` is the size of its input.
    Started { phase: RunPhase, items: u64 },
    /// A phase has finished; `items` is the size of its output.
    Finished { phase: RunPhase, items: u64 },
}

/// Reports run progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "run  discovering  1,234 documents...".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Started { phase, items } => {
                format!("run  {}  {} items...\n", phase.as_str(), format_number(*items))
            }
            ProgressEvent::Finished { phase, items } => {
                format!("run  {}  done ({})\n", phase.as_str(), format_number(*items))
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Started { phase, items } => serde_json::json!({
                "event": "started",
                "phase": phase.as_str(),
                "items": items
            }),
            ProgressEvent::Finished { phase, items } => serde_json::json!({
                "event": "finished",
                "phase": phase.as_str(),
                "items": items
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
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

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
