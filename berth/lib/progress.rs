//! Progress events and sinks.
//!
//! Deployments and updates report progress through a [`ProgressSink`]; the
//! engine never talks to a UI directly. [`ProgressReporter`] enforces the
//! per-attempt contract: values are monotonically non-decreasing and every
//! attempt terminates at exactly 1.0 with [`ProgressStatus::Completed`] or
//! [`ProgressStatus::Error`].

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The progress band image pulling is mapped onto.
pub const PULL_PROGRESS_BAND: (f32, f32) = (0.35, 0.85);

/// Pull-output events assumed per full pull; drives the band mapping.
const PULL_EVENTS_PER_BAND: f32 = 40.0;

/// Minimum interval between pull progress emissions.
const PULL_EMIT_INTERVAL: Duration = Duration::from_millis(200);

/// Substrings that mark an engine output line as pull activity.
const PULL_VOCABULARY: [&str; 4] = ["download", "extract", "pull", "complete"];

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The status attached to a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    /// The attempt has been accepted and is preparing.
    Starting,
    /// The attempt is underway.
    Running,
    /// The attempt finished successfully. Terminal.
    Completed,
    /// The attempt failed. Terminal.
    Error,
}

/// A normalized progress event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// The app the event belongs to.
    pub app_id: String,

    /// The container the event belongs to, when one is known.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub container_name: Option<String>,

    /// Display name for UI surfaces.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,

    /// Icon reference for UI surfaces.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub icon: Option<String>,

    /// Progress in `[0, 1]`.
    pub progress: f32,

    /// The attempt status.
    pub status: ProgressStatus,

    /// Human-readable detail.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
}

/// Receives progress events. Implementations must be cheap and non-blocking;
/// they are called from inside pipeline stages.
pub trait ProgressSink: Send + Sync {
    /// Delivers one event.
    fn emit(&self, event: ProgressEvent);
}

/// A sink that logs events through `tracing`. The default when no UI is
/// attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

/// Per-attempt progress emitter enforcing monotonicity and terminal events.
pub struct ProgressReporter {
    sink: Arc<dyn ProgressSink>,
    app_id: String,
    container_name: Option<String>,
    name: Option<String>,
    icon: Option<String>,
    last: f32,
}

/// Heuristic progress model for engine pull output.
///
/// Engine pull output has no stable machine-readable progress, so the model
/// counts "interesting" lines (pull vocabulary on stdout, anything on stderr)
/// and maps the count onto [`PULL_PROGRESS_BAND`], throttled to one emission
/// per 200 ms.
pub struct PullProgressModel {
    events: u32,
    last_emit: Option<Instant>,
}

/// The stream an engine output line arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSource {
    /// The subprocess's stdout.
    Stdout,
    /// The subprocess's stderr.
    Stderr,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ProgressReporter {
    /// Creates a reporter for one attempt on one app.
    pub fn new(
        sink: Arc<dyn ProgressSink>,
        app_id: impl Into<String>,
        name: Option<String>,
        icon: Option<String>,
    ) -> Self {
        Self {
            sink,
            app_id: app_id.into(),
            container_name: None,
            name,
            icon,
            last: 0.0,
        }
    }

    /// Attaches the container name used in subsequent events, once detection
    /// has produced one.
    pub fn set_container_name(&mut self, container_name: impl Into<String>) {
        self.container_name = Some(container_name.into());
    }

    /// Emits a non-terminal event. Progress is clamped so it never goes
    /// backwards within the attempt.
    pub fn emit(&mut self, progress: f32, status: ProgressStatus, message: impl Into<String>) {
        let progress = progress.clamp(self.last, 1.0);
        self.last = progress;
        self.sink.emit(ProgressEvent {
            app_id: self.app_id.clone(),
            container_name: self.container_name.clone(),
            name: self.name.clone(),
            icon: self.icon.clone(),
            progress,
            status,
            message: Some(message.into()),
        });
    }

    /// Emits the terminal success event at exactly 1.0.
    pub fn complete(&mut self, message: impl Into<String>) {
        self.last = 1.0;
        self.emit(1.0, ProgressStatus::Completed, message);
    }

    /// Emits the terminal failure event at exactly 1.0.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.last = 1.0;
        self.emit(1.0, ProgressStatus::Error, message);
    }
}

impl PullProgressModel {
    /// Creates a fresh model for one pull invocation.
    pub fn new() -> Self {
        Self {
            events: 0,
            last_emit: None,
        }
    }

    /// Feeds one output line into the model. Returns a progress value when
    /// the line advanced the estimate and the throttle window has elapsed.
    pub fn observe(&mut self, source: StreamSource, line: &str) -> Option<f32> {
        if !Self::is_pull_activity(source, line) {
            return None;
        }

        self.events += 1;

        let now = Instant::now();
        if let Some(last) = self.last_emit {
            if now.duration_since(last) < PULL_EMIT_INTERVAL {
                return None;
            }
        }
        self.last_emit = Some(now);

        Some(self.estimate())
    }

    /// The current progress estimate.
    pub fn estimate(&self) -> f32 {
        let (band_min, band_max) = PULL_PROGRESS_BAND;
        let width = band_max - band_min;
        (band_min + self.events as f32 / PULL_EVENTS_PER_BAND * width).min(band_max)
    }

    fn is_pull_activity(source: StreamSource, line: &str) -> bool {
        if source == StreamSource::Stderr {
            return true;
        }

        let line = line.to_ascii_lowercase();
        PULL_VOCABULARY.iter().any(|word| line.contains(word))
    }
}

impl Default for PullProgressModel {
    fn default() -> Self {
        Self::new()
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl ProgressSink for LogSink {
    fn emit(&self, event: ProgressEvent) {
        tracing::info!(
            app_id = %event.app_id,
            progress = event.progress,
            status = ?event.status,
            message = event.message.as_deref().unwrap_or(""),
            "progress"
        );
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Captures every event for assertions.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub events: Mutex<Vec<ProgressEvent>>,
    }

    impl ProgressSink for RecordingSink {
        fn emit(&self, event: ProgressEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[test]
    fn test_reporter_is_monotonic_and_terminal() {
        let sink = Arc::new(RecordingSink::default());
        let mut reporter = ProgressReporter::new(sink.clone(), "app", None, None);

        reporter.emit(0.1, ProgressStatus::Starting, "validating");
        reporter.emit(0.5, ProgressStatus::Running, "pulling");
        reporter.emit(0.3, ProgressStatus::Running, "stale value");
        reporter.complete("installed");

        let events = sink.events.lock().unwrap();
        let values: Vec<f32> = events.iter().map(|e| e.progress).collect();
        assert!(values.windows(2).all(|w| w[0] <= w[1]), "{:?}", values);

        let last = events.last().unwrap();
        assert_eq!(last.progress, 1.0);
        assert_eq!(last.status, ProgressStatus::Completed);
    }

    #[test]
    fn test_reporter_failure_terminates_at_one() {
        let sink = Arc::new(RecordingSink::default());
        let mut reporter = ProgressReporter::new(sink.clone(), "app", None, None);

        reporter.emit(0.2, ProgressStatus::Running, "resolving");
        reporter.fail("compose:pull: engine exited with 1");

        let events = sink.events.lock().unwrap();
        let last = events.last().unwrap();
        assert_eq!(last.progress, 1.0);
        assert_eq!(last.status, ProgressStatus::Error);
    }

    #[test]
    fn test_pull_model_band_and_vocabulary() {
        let mut model = PullProgressModel::new();

        assert!(model
            .observe(StreamSource::Stdout, "some unrelated chatter")
            .is_none());

        let first = model
            .observe(StreamSource::Stdout, "layer abc Downloading")
            .unwrap();
        assert!(first >= PULL_PROGRESS_BAND.0);

        // Saturate the model; the estimate must cap at the band maximum.
        for _ in 0..500 {
            model.observe(StreamSource::Stderr, "progress");
        }
        assert!(model.estimate() <= PULL_PROGRESS_BAND.1 + f32::EPSILON);
    }

    #[test]
    fn test_pull_model_throttles_emissions() {
        let mut model = PullProgressModel::new();

        let first = model.observe(StreamSource::Stderr, "a");
        let second = model.observe(StreamSource::Stderr, "b");

        assert!(first.is_some());
        assert!(second.is_none());
        // The suppressed line still advanced the estimate.
        assert_eq!(model.events, 2);
    }
}
