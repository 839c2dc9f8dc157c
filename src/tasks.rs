//! Long-running backend tasks.
//!
//! Auto-labeling, duplicate detection and blank detection run on the server.
//! The client starts a task, then polls its progress at a fixed interval
//! until it completes, fails, or the user aborts.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use web_time::Instant;

use crate::constants::{
    DEFAULT_BLANK_STD_THRESHOLD, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_DUPLICATE_THRESHOLD,
    MAX_DUPLICATE_THRESHOLD, TASK_POLL_INTERVAL,
};
use crate::store::AnnotationStore;

/// Which images a task runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskTarget {
    /// Explicit list of image names
    Images(Vec<String>),
    /// Every image in a folder; empty string means all images
    Folder(String),
}

impl TaskTarget {
    pub fn all() -> Self {
        TaskTarget::Folder(String::new())
    }

    /// Insert the target into a request body.
    fn write_into(&self, body: &mut serde_json::Map<String, serde_json::Value>) {
        match self {
            TaskTarget::Images(names) => {
                body.insert("images".to_string(), serde_json::json!(names));
            }
            TaskTarget::Folder(folder) => {
                body.insert("folder".to_string(), serde_json::json!(folder));
            }
        }
    }
}

/// Detector used for auto-labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DetectorModel {
    Yolov4,
    #[default]
    Yolov8,
}

impl DetectorModel {
    pub fn name(&self) -> &'static str {
        match self {
            DetectorModel::Yolov4 => "yolov4",
            DetectorModel::Yolov8 => "yolov8",
        }
    }
}

/// A task the backend can run.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskKind {
    AutoLabel {
        target: TaskTarget,
        confidence_threshold: f32,
        overwrite: bool,
        model: DetectorModel,
    },
    DetectDuplicates {
        target: TaskTarget,
        /// Perceptual-hash distance, 0..=64
        threshold: u32,
    },
    DetectBlanks {
        target: TaskTarget,
        /// Pixel standard deviation below which an image is blank
        std_threshold: f32,
    },
}

impl TaskKind {
    /// Auto-label with default settings.
    pub fn auto_label(target: TaskTarget) -> Self {
        TaskKind::AutoLabel {
            target,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            overwrite: false,
            model: DetectorModel::default(),
        }
    }

    /// Duplicate detection with default settings.
    pub fn detect_duplicates(target: TaskTarget) -> Self {
        TaskKind::DetectDuplicates {
            target,
            threshold: DEFAULT_DUPLICATE_THRESHOLD,
        }
    }

    /// Blank detection with default settings.
    pub fn detect_blanks(target: TaskTarget) -> Self {
        TaskKind::DetectBlanks {
            target,
            std_threshold: DEFAULT_BLANK_STD_THRESHOLD,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::AutoLabel { .. } => "auto-label",
            TaskKind::DetectDuplicates { .. } => "detect-duplicates",
            TaskKind::DetectBlanks { .. } => "detect-blanks",
        }
    }

    /// Endpoint path that starts this task.
    pub fn endpoint(&self) -> &'static str {
        match self {
            TaskKind::AutoLabel { .. } => "/api/annotate/auto_label",
            TaskKind::DetectDuplicates { .. } => "/api/annotate/detect-duplicates",
            TaskKind::DetectBlanks { .. } => "/api/annotate/detect-blanks",
        }
    }

    /// Check parameters before sending.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            TaskKind::AutoLabel {
                confidence_threshold,
                ..
            } if !(0.0..=1.0).contains(confidence_threshold) => Err(format!(
                "confidence threshold {confidence_threshold} outside 0..=1"
            )),
            TaskKind::DetectDuplicates { threshold, .. } if *threshold > MAX_DUPLICATE_THRESHOLD => {
                Err(format!(
                    "duplicate threshold {threshold} outside 0..={MAX_DUPLICATE_THRESHOLD}"
                ))
            }
            TaskKind::DetectBlanks { std_threshold, .. } if *std_threshold < 0.0 => {
                Err(format!("blank threshold {std_threshold} is negative"))
            }
            _ => Ok(()),
        }
    }

    /// JSON body for the start request.
    pub fn request_body(&self) -> serde_json::Value {
        let mut body = serde_json::Map::new();
        match self {
            TaskKind::AutoLabel {
                target,
                confidence_threshold,
                overwrite,
                model,
            } => {
                target.write_into(&mut body);
                body.insert(
                    "confidence_threshold".to_string(),
                    serde_json::json!(confidence_threshold),
                );
                body.insert("overwrite".to_string(), serde_json::json!(overwrite));
                body.insert("model".to_string(), serde_json::json!(model.name()));
            }
            TaskKind::DetectDuplicates { target, threshold } => {
                target.write_into(&mut body);
                body.insert("threshold".to_string(), serde_json::json!(threshold));
            }
            TaskKind::DetectBlanks {
                target,
                std_threshold,
            } => {
                target.write_into(&mut body);
                body.insert("std_threshold".to_string(), serde_json::json!(std_threshold));
            }
        }
        serde_json::Value::Object(body)
    }
}

/// Server-assigned task identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status reported by the progress endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(from = "String")]
pub enum TaskStatus {
    #[default]
    Running,
    Completed,
    Error,
}

impl From<String> for TaskStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "completed" | "done" => TaskStatus::Completed,
            "error" | "failed" => TaskStatus::Error,
            "running" | "processing" | "starting" | "pending" | "queued" | "" => {
                TaskStatus::Running
            }
            other => {
                log::warn!("⚠️ Unknown task status '{}', treating it as running", other);
                TaskStatus::Running
            }
        }
    }
}

/// One progress report.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct TaskProgress {
    #[serde(default)]
    pub current: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub report_url: Option<String>,
    /// Task-specific counters (`labeled_count`, `total_detections`,
    /// `duplicate_count`, `blank_count`, `stats`, ...)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TaskProgress {
    /// Completion percentage, 0 when the total is unknown.
    pub fn percent(&self) -> u32 {
        if self.total == 0 {
            0
        } else {
            ((self.current as f64 / self.total as f64) * 100.0).round() as u32
        }
    }

    /// Read an integer counter from the task-specific fields.
    pub fn count(&self, key: &str) -> Option<u64> {
        self.extra.get(key).and_then(serde_json::Value::as_u64)
    }
}

/// Final result of a polled task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed(TaskProgress),
    /// Backend reported an error; message as given by the server
    Failed(String),
    /// User aborted; not an error
    Cancelled,
}

/// Handle the UI keeps to abort a running poll.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
        log::info!("Task abort requested");
    }

    /// Signal observed by the poller.
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            flag: Arc::clone(&self.flag),
        }
    }
}

/// Read side of an [`AbortHandle`].
#[derive(Debug, Clone)]
pub struct AbortSignal {
    flag: Arc<AtomicBool>,
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Result of one poll step.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus {
    /// Not time to poll yet
    Waiting,
    /// Fresh progress from the server
    Progress(TaskProgress),
    /// Terminal state reached
    Finished(TaskOutcome),
}

/// Polls one running task at a fixed interval.
#[derive(Debug)]
pub struct TaskPoller {
    id: TaskId,
    kind_name: &'static str,
    signal: AbortSignal,
    interval: Duration,
    started: Instant,
    next_poll: Instant,
    last_progress: Option<TaskProgress>,
    finished: bool,
}

impl TaskPoller {
    /// Start polling; the first request goes out one interval after `now`.
    pub fn new(id: TaskId, kind: &TaskKind, signal: AbortSignal, now: Instant) -> Self {
        Self {
            id,
            kind_name: kind.name(),
            signal,
            interval: TASK_POLL_INTERVAL,
            started: now,
            next_poll: now + TASK_POLL_INTERVAL,
            last_progress: None,
            finished: false,
        }
    }

    /// Set the poll interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self.next_poll = self.started + interval;
        self
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn kind_name(&self) -> &'static str {
        self.kind_name
    }

    pub fn last_progress(&self) -> Option<&TaskProgress> {
        self.last_progress.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// When the next request is due.
    pub fn next_deadline(&self) -> Option<Instant> {
        (!self.finished).then_some(self.next_poll)
    }

    /// Advance the poller. Checks the abort signal before anything else.
    pub fn poll<S: AnnotationStore + ?Sized>(&mut self, store: &S, now: Instant) -> PollStatus {
        if self.finished {
            return PollStatus::Waiting;
        }
        if self.signal.is_aborted() {
            self.finished = true;
            log::info!("Task {} ({}) cancelled", self.id, self.kind_name);
            return PollStatus::Finished(TaskOutcome::Cancelled);
        }
        if now < self.next_poll {
            return PollStatus::Waiting;
        }
        self.next_poll = now + self.interval;

        let progress = match store.task_progress(&self.id) {
            Ok(progress) => progress,
            Err(e) => {
                // Transient: keep polling
                log::warn!("Failed to fetch progress for task {}: {}", self.id, e);
                return PollStatus::Waiting;
            }
        };
        log::debug!(
            "Task {} ({}): {}/{} {:?}",
            self.id,
            self.kind_name,
            progress.current,
            progress.total,
            progress.status
        );

        match progress.status {
            TaskStatus::Running => {
                self.last_progress = Some(progress.clone());
                PollStatus::Progress(progress)
            }
            TaskStatus::Completed => {
                self.finished = true;
                self.last_progress = Some(progress.clone());
                log::info!("Task {} ({}) completed", self.id, self.kind_name);
                PollStatus::Finished(TaskOutcome::Completed(progress))
            }
            TaskStatus::Error => {
                self.finished = true;
                let message = progress
                    .error
                    .clone()
                    .unwrap_or_else(|| format!("{} failed", self.kind_name));
                log::warn!("Task {} ({}) failed: {}", self.id, self.kind_name, message);
                PollStatus::Finished(TaskOutcome::Failed(message))
            }
        }
    }

    /// Block until the task finishes, sleeping between polls.
    ///
    /// `on_progress` is called with every running report.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn wait<S, F>(mut self, store: &S, mut on_progress: F) -> TaskOutcome
    where
        S: AnnotationStore + ?Sized,
        F: FnMut(&TaskProgress),
    {
        loop {
            match self.poll(store, Instant::now()) {
                PollStatus::Finished(outcome) => return outcome,
                PollStatus::Progress(progress) => on_progress(&progress),
                PollStatus::Waiting => {}
            }
            // Short sleeps so an abort is noticed quickly
            let remaining = self.next_poll.saturating_duration_since(Instant::now());
            std::thread::sleep(remaining.min(Duration::from_millis(50)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn running(current: u64, total: u64) -> TaskProgress {
        TaskProgress {
            current,
            total,
            ..TaskProgress::default()
        }
    }

    #[test]
    fn test_progress_json() {
        let json = r#"{"current": 3, "total": 4, "status": "running", "labeled_count": 2, "error": null}"#;
        let progress: TaskProgress = serde_json::from_str(json).unwrap();
        assert_eq!(progress.status, TaskStatus::Running);
        assert_eq!(progress.percent(), 75);
        assert_eq!(progress.count("labeled_count"), Some(2));
        assert!(progress.error.is_none());

        let json = r#"{"current": 4, "total": 4, "status": "completed", "report_url": "/reports/x.html"}"#;
        let progress: TaskProgress = serde_json::from_str(json).unwrap();
        assert_eq!(progress.status, TaskStatus::Completed);
        assert_eq!(progress.report_url.as_deref(), Some("/reports/x.html"));
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(TaskStatus::from("processing".to_string()), TaskStatus::Running);
        assert_eq!(TaskStatus::from("done".to_string()), TaskStatus::Completed);
        assert_eq!(TaskStatus::from("failed".to_string()), TaskStatus::Error);
        // Unknown strings keep polling (with a warning) instead of failing the task
        assert_eq!(TaskStatus::from("compelted".to_string()), TaskStatus::Running);
    }

    #[test]
    fn test_request_bodies() {
        let task = TaskKind::auto_label(TaskTarget::Images(vec!["a.jpg".into()]));
        let body = task.request_body();
        assert_eq!(body["images"][0], "a.jpg");
        assert_eq!(body["model"], "yolov8");
        assert_eq!(body["overwrite"], false);
        assert!(body.get("folder").is_none());

        let task = TaskKind::detect_duplicates(TaskTarget::Folder("lot1".into()));
        let body = task.request_body();
        assert_eq!(body["folder"], "lot1");
        assert_eq!(body["threshold"], 5);

        let task = TaskKind::detect_blanks(TaskTarget::all());
        assert_eq!(task.request_body()["std_threshold"], 25.0);
        assert_eq!(task.endpoint(), "/api/annotate/detect-blanks");
    }

    #[test]
    fn test_validate() {
        assert!(TaskKind::auto_label(TaskTarget::all()).validate().is_ok());
        let bad = TaskKind::DetectDuplicates {
            target: TaskTarget::all(),
            threshold: 65,
        };
        assert!(bad.validate().is_err());
        let bad = TaskKind::AutoLabel {
            target: TaskTarget::all(),
            confidence_threshold: 1.5,
            overwrite: false,
            model: DetectorModel::Yolov4,
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_poll_respects_interval() {
        let store = MemoryStore::new();
        let id = store.push_task_progress(vec![running(1, 3)]);
        let handle = AbortHandle::new();
        let t0 = Instant::now();
        let kind = TaskKind::auto_label(TaskTarget::all());
        let mut poller = TaskPoller::new(id, &kind, handle.signal(), t0);

        assert_eq!(poller.poll(&store, t0), PollStatus::Waiting);
        assert_eq!(store.progress_requests(), 0);
        assert!(matches!(
            poller.poll(&store, t0 + TASK_POLL_INTERVAL),
            PollStatus::Progress(_)
        ));
        assert_eq!(store.progress_requests(), 1);
        // Next request only after another interval
        assert_eq!(
            poller.poll(&store, t0 + TASK_POLL_INTERVAL + Duration::from_millis(100)),
            PollStatus::Waiting
        );
        assert_eq!(store.progress_requests(), 1);
    }

    #[test]
    fn test_poll_until_completed() {
        let store = MemoryStore::new();
        let mut done = running(3, 3);
        done.status = TaskStatus::Completed;
        let id = store.push_task_progress(vec![running(1, 3), running(2, 3), done]);
        let kind = TaskKind::detect_blanks(TaskTarget::all());
        let t0 = Instant::now();
        let mut poller = TaskPoller::new(id, &kind, AbortHandle::new().signal(), t0);

        let mut t = t0;
        let outcome = loop {
            t += TASK_POLL_INTERVAL;
            if let PollStatus::Finished(outcome) = poller.poll(&store, t) {
                break outcome;
            }
        };
        assert!(matches!(outcome, TaskOutcome::Completed(p) if p.current == 3));
        assert!(poller.is_finished());
        assert_eq!(poller.next_deadline(), None);
    }

    #[test]
    fn test_poll_reports_failure_message() {
        let store = MemoryStore::new();
        let mut failed = running(1, 3);
        failed.status = TaskStatus::Error;
        failed.error = Some("model file missing".into());
        let id = store.push_task_progress(vec![failed]);
        let kind = TaskKind::auto_label(TaskTarget::all());
        let t0 = Instant::now();
        let mut poller = TaskPoller::new(id, &kind, AbortHandle::new().signal(), t0);
        assert_eq!(
            poller.poll(&store, t0 + TASK_POLL_INTERVAL),
            PollStatus::Finished(TaskOutcome::Failed("model file missing".into()))
        );
    }

    #[test]
    fn test_abort_is_cancelled_not_error() {
        let store = MemoryStore::new();
        let id = store.push_task_progress(vec![running(1, 10)]);
        let handle = AbortHandle::new();
        let kind = TaskKind::detect_duplicates(TaskTarget::all());
        let t0 = Instant::now();
        let mut poller = TaskPoller::new(id, &kind, handle.signal(), t0);

        handle.abort();
        assert_eq!(
            poller.poll(&store, t0 + TASK_POLL_INTERVAL),
            PollStatus::Finished(TaskOutcome::Cancelled)
        );
        // No request was made after the abort
        assert_eq!(store.progress_requests(), 0);
    }

    #[test]
    fn test_transient_errors_keep_polling() {
        let store = MemoryStore::new();
        let kind = TaskKind::auto_label(TaskTarget::all());
        let t0 = Instant::now();
        // Unknown task id: the store returns an error
        let mut poller =
            TaskPoller::new(TaskId("missing".into()), &kind, AbortHandle::new().signal(), t0);
        assert_eq!(
            poller.poll(&store, t0 + TASK_POLL_INTERVAL),
            PollStatus::Waiting
        );
        assert!(!poller.is_finished());
    }

    #[test]
    fn test_wait_blocks_until_done() {
        let store = MemoryStore::new();
        let mut done = running(2, 2);
        done.status = TaskStatus::Completed;
        let id = store.push_task_progress(vec![running(1, 2), done]);
        let kind = TaskKind::auto_label(TaskTarget::all());
        let poller = TaskPoller::new(id, &kind, AbortHandle::new().signal(), Instant::now())
            .with_interval(Duration::from_millis(5));

        let mut seen = Vec::new();
        let outcome = poller.wait(&store, |p| seen.push(p.current));
        assert!(matches!(outcome, TaskOutcome::Completed(_)));
        assert_eq!(seen, vec![1]);
    }
}
