//! Debounced saving of annotation edits.
//!
//! Every edit schedules a save job for its image. A later edit of the same
//! image replaces the pending job and restarts the quiet period, so a burst
//! of edits turns into one request. Jobs are bound to the [`ImageToken`] and
//! payload captured when they were scheduled and are never re-targeted.

use std::collections::HashMap;
use std::time::Duration;

use web_time::Instant;

use crate::constants::SAVE_DEBOUNCE;
use crate::error::StoreResult;
use crate::files::FileList;
use crate::model::SaveRequest;
use crate::session::ImageToken;
use crate::store::AnnotationStore;

/// A save waiting for its debounce to expire.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveJob {
    /// Image the payload belongs to
    pub token: ImageToken,
    /// Normalized payload captured at schedule time
    pub request: SaveRequest,
    /// When the job becomes due
    pub due: Instant,
}

/// Holds at most one pending save per image.
#[derive(Debug)]
pub struct SaveScheduler {
    debounce: Duration,
    pending: HashMap<String, SaveJob>,
}

impl Default for SaveScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl SaveScheduler {
    pub fn new() -> Self {
        Self {
            debounce: SAVE_DEBOUNCE,
            pending: HashMap::new(),
        }
    }

    /// Set the quiet period.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Schedule a save, superseding any pending job for the same image.
    pub fn schedule(&mut self, token: ImageToken, request: SaveRequest, now: Instant) {
        let due = now + self.debounce;
        let name = token.name.clone();
        let replaced = self.pending.insert(
            name.clone(),
            SaveJob {
                token,
                request,
                due,
            },
        );
        if replaced.is_some() {
            log::trace!("Save for {} rescheduled", name);
        } else {
            log::trace!("Save for {} scheduled", name);
        }
    }

    /// Remove and return every job whose deadline has passed, oldest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<SaveJob> {
        let due: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, job)| job.due <= now)
            .map(|(name, _)| name.clone())
            .collect();
        let mut jobs: Vec<SaveJob> = due
            .iter()
            .filter_map(|name| self.pending.remove(name))
            .collect();
        jobs.sort_by_key(|job| job.due);
        jobs
    }

    /// Remove and return every pending job, due or not, oldest first.
    pub fn take_all(&mut self) -> Vec<SaveJob> {
        let mut jobs: Vec<SaveJob> = self.pending.drain().map(|(_, job)| job).collect();
        jobs.sort_by_key(|job| job.due);
        jobs
    }

    /// Remove and return the pending job for one image, due or not.
    pub fn take(&mut self, name: &str) -> Option<SaveJob> {
        self.pending.remove(name)
    }

    /// Drop the pending job for one image.
    pub fn cancel(&mut self, name: &str) -> bool {
        let cancelled = self.pending.remove(name).is_some();
        if cancelled {
            log::trace!("Save for {} cancelled", name);
        }
        cancelled
    }

    /// Earliest deadline of any pending job.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|job| job.due).min()
    }

    pub fn is_pending(&self, name: &str) -> bool {
        self.pending.contains_key(name)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// Send one save and update the file list on success.
pub fn run_job<S: AnnotationStore + ?Sized>(
    store: &S,
    files: &mut FileList,
    request: &SaveRequest,
) -> StoreResult<()> {
    store.save_annotations(request)?;
    files.set_labeled(&request.filename, !request.annotations.is_empty());
    log::debug!(
        "Saved {} boxes for {}",
        request.annotations.len(),
        request.filename
    );
    Ok(())
}

/// Outcome of one flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Images saved successfully
    pub saved: Vec<String>,
    /// Images whose save failed
    pub failed: Vec<String>,
}

impl FlushReport {
    pub fn is_empty(&self) -> bool {
        self.saved.is_empty() && self.failed.is_empty()
    }
}

/// Send every due job. Failures are logged and dropped; the in-memory
/// annotations are untouched so the next edit's save carries them.
pub fn flush_due<S: AnnotationStore + ?Sized>(
    scheduler: &mut SaveScheduler,
    store: &S,
    files: &mut FileList,
    now: Instant,
) -> FlushReport {
    send_jobs(scheduler.take_due(now), store, files)
}

/// Send every pending job without waiting for its deadline.
pub fn flush_all<S: AnnotationStore + ?Sized>(
    scheduler: &mut SaveScheduler,
    store: &S,
    files: &mut FileList,
) -> FlushReport {
    send_jobs(scheduler.take_all(), store, files)
}

fn send_jobs<S: AnnotationStore + ?Sized>(
    jobs: Vec<SaveJob>,
    store: &S,
    files: &mut FileList,
) -> FlushReport {
    let mut report = FlushReport::default();
    for job in jobs {
        let name = job.token.name.clone();
        match run_job(store, files, &job.request) {
            Ok(()) => report.saved.push(name),
            Err(e) => {
                log::warn!("Auto-save of {} failed: {}", name, e);
                report.failed.push(name);
            }
        }
    }
    report
}
