// 📈 Progress Reporter
// Periodic "processed N entities" report, shared by every worker of a run

use crate::collaborators::ProgressObserver;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

pub const DEFAULT_PROGRESS_INTERVAL: u64 = 1000;

#[derive(Debug)]
pub struct ProgressReporter {
    interval: u64,
    processed: AtomicU64,
    missing_total: AtomicU64,

    /// Missing entities since the last report
    missing_window: AtomicU64,
}

/// Counters at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub processed: u64,
    pub missing_total: u64,
    pub missing_window: u64,
}

impl ProgressReporter {
    /// An interval of 0 disables periodic reports.
    pub fn new(interval: u64) -> Self {
        ProgressReporter {
            interval,
            processed: AtomicU64::new(0),
            missing_total: AtomicU64::new(0),
            missing_window: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            missing_total: self.missing_total.load(Ordering::Relaxed),
            missing_window: self.missing_window.load(Ordering::Relaxed),
        }
    }

    fn report(&self, processed: u64) {
        let missing = self.missing_window.swap(0, Ordering::Relaxed);
        let percent = missing as f64 * 100.0 / self.interval as f64;
        info!(
            processed,
            missing,
            window = self.interval,
            "Processed {} entities, {} missing in the last {} ({:.1}%)",
            processed,
            missing,
            self.interval,
            percent
        );
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRESS_INTERVAL)
    }
}

impl ProgressObserver for ProgressReporter {
    fn entity_processed(&self) {
        let processed = self.processed.fetch_add(1, Ordering::Relaxed) + 1;
        if self.interval > 0 && processed % self.interval == 0 {
            self.report(processed);
        }
    }

    fn entity_missing(&self) {
        self.missing_total.fetch_add(1, Ordering::Relaxed);
        self.missing_window.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_window_resets_on_report() {
        let reporter = ProgressReporter::new(4);
        reporter.entity_missing();
        for _ in 0..3 {
            reporter.entity_processed();
        }
        assert_eq!(reporter.snapshot().missing_window, 1);

        reporter.entity_processed();
        let snapshot = reporter.snapshot();
        assert_eq!(snapshot.processed, 4);
        assert_eq!(snapshot.missing_window, 0);
        assert_eq!(snapshot.missing_total, 1);
    }

    #[test]
    fn test_zero_interval_never_reports() {
        let reporter = ProgressReporter::new(0);
        reporter.entity_missing();
        reporter.entity_processed();
        assert_eq!(reporter.snapshot().missing_window, 1);
    }

    #[test]
    fn test_counts_across_threads() {
        let reporter = Arc::new(ProgressReporter::new(1000));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let reporter = Arc::clone(&reporter);
                thread::spawn(move || {
                    for _ in 0..250 {
                        reporter.entity_processed();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(reporter.snapshot().processed, 1000);
    }
}
