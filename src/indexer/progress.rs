use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Shared counters for the parallel parse phase.
///
/// Cloned into the worker pool; the CLI polls `snapshot` to drive its
/// progress bar.
#[derive(Clone, Default)]
pub struct AnalysisProgress {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    files_total: AtomicUsize,
    files_processed: AtomicUsize,
    classes_extracted: AtomicUsize,
    parse_errors: AtomicUsize,
    is_active: AtomicBool,
    started_at: Mutex<Option<Instant>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub is_active: bool,
    pub files_total: usize,
    pub files_processed: usize,
    pub classes_extracted: usize,
    pub parse_errors: usize,
    pub elapsed_ms: u64,
    pub progress_pct: f64,
    pub eta_ms: Option<u64>,
}

impl AnalysisProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, total_files: usize) {
        self.inner.files_total.store(total_files, Ordering::Release);
        self.inner.files_processed.store(0, Ordering::Release);
        self.inner.classes_extracted.store(0, Ordering::Release);
        self.inner.parse_errors.store(0, Ordering::Release);
        self.inner.is_active.store(true, Ordering::Release);
        if let Ok(mut started) = self.inner.started_at.lock() {
            *started = Some(Instant::now());
        }
    }

    pub fn inc(&self, classes: usize) {
        self.inner.files_processed.fetch_add(1, Ordering::Relaxed);
        self.inner.classes_extracted.fetch_add(classes, Ordering::Relaxed);
    }

    pub fn inc_error(&self) {
        self.inner.files_processed.fetch_add(1, Ordering::Relaxed);
        self.inner.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn finish(&self) {
        self.inner.is_active.store(false, Ordering::Release);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let is_active = self.inner.is_active.load(Ordering::Acquire);
        let files_total = self.inner.files_total.load(Ordering::Acquire);
        let files_processed = self.inner.files_processed.load(Ordering::Acquire);
        let classes_extracted = self.inner.classes_extracted.load(Ordering::Acquire);
        let parse_errors = self.inner.parse_errors.load(Ordering::Acquire);

        let elapsed_ms = self
            .inner
            .started_at
            .lock()
            .ok()
            .and_then(|started| *started)
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);

        let progress_pct = if files_total > 0 {
            (files_processed as f64 / files_total as f64) * 100.0
        } else {
            0.0
        };

        let eta_ms = if is_active && files_processed > 0 && files_processed < files_total {
            let remaining = files_total - files_processed;
            let ms_per_file = elapsed_ms as f64 / files_processed as f64;
            Some((remaining as f64 * ms_per_file) as u64)
        } else {
            None
        };

        ProgressSnapshot {
            is_active,
            files_total,
            files_processed,
            classes_extracted,
            parse_errors,
            elapsed_ms,
            progress_pct,
            eta_ms,
        }
    }
}
