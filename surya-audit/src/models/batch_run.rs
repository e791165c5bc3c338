//! Batch audit run state
//!
//! A run moves RUNNING → COMPLETED, or RUNNING → CANCELLED when its
//! cancellation token fires between sites. Per-site failures never change
//! the run state; they accumulate in `errors`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SiteError;

/// Batch run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BatchState {
    /// Sites are being processed
    Running,
    /// Every scheduled site was attempted
    Completed,
    /// Cancellation requested before all sites were attempted
    Cancelled,
}

/// Progress counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchProgress {
    /// Sites scheduled
    pub total: usize,
    /// Sites attempted so far
    pub attempted: usize,
    /// Sites whose record was written
    pub succeeded: usize,
    /// Sites skipped after an error
    pub failed: usize,
    /// Certified solar sites among `succeeded`
    pub solar_confirmed: usize,
    /// Sites left as they were because a review holds them
    #[serde(default)]
    pub unchanged: usize,
}

/// One batch run (in-memory)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRun {
    pub run_id: Uuid,
    pub state: BatchState,
    pub progress: BatchProgress,
    /// Accumulated per-site errors
    pub errors: Vec<SiteError>,
    pub started_at: DateTime<Utc>,
    /// Set once the run leaves RUNNING
    pub ended_at: Option<DateTime<Utc>>,
}

impl BatchRun {
    /// Start a run over `total` scheduled sites
    pub fn new(total: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            state: BatchState::Running,
            progress: BatchProgress {
                total,
                ..Default::default()
            },
            errors: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn record_success(&mut self, certified: bool) {
        self.progress.attempted += 1;
        self.progress.succeeded += 1;
        if certified {
            self.progress.solar_confirmed += 1;
        }
    }

    /// A site attempted but held by its review state
    pub fn record_unchanged(&mut self) {
        self.progress.attempted += 1;
        self.progress.unchanged += 1;
    }

    pub fn record_failure(&mut self, error: SiteError) {
        self.progress.attempted += 1;
        self.progress.failed += 1;
        self.errors.push(error);
    }

    /// Errors raised before any site was attempted (e.g. coordinate rejection)
    pub fn add_error(&mut self, error: SiteError) {
        self.errors.push(error);
    }

    /// Leave RUNNING
    pub fn finish(&mut self, cancelled: bool) {
        self.state = if cancelled {
            BatchState::Cancelled
        } else {
            BatchState::Completed
        };
        self.ended_at = Some(Utc::now());
    }

    /// Sites never attempted (only non-zero after cancellation)
    pub fn not_attempted(&self) -> usize {
        self.progress.total.saturating_sub(self.progress.attempted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_accounting() {
        let mut run = BatchRun::new(3);
        run.record_success(true);
        run.record_failure(SiteError::skip("S2", "FETCH_ERROR", "timeout"));
        assert_eq!(run.progress.attempted, 2);
        assert_eq!(run.progress.succeeded, 1);
        assert_eq!(run.progress.failed, 1);
        assert_eq!(run.progress.solar_confirmed, 1);
        assert_eq!(run.not_attempted(), 1);
        assert_eq!(run.state, BatchState::Running);
    }

    #[test]
    fn test_held_site_counts_as_attempted_only() {
        let mut run = BatchRun::new(2);
        run.record_unchanged();
        assert_eq!(run.progress.attempted, 1);
        assert_eq!(run.progress.unchanged, 1);
        assert_eq!(run.progress.succeeded, 0);
        assert_eq!(run.progress.failed, 0);
        assert_eq!(run.not_attempted(), 1);
    }

    #[test]
    fn test_finish_sets_state_and_end_time() {
        let mut run = BatchRun::new(1);
        run.finish(true);
        assert_eq!(run.state, BatchState::Cancelled);
        assert!(run.ended_at.is_some());

        let mut run = BatchRun::new(0);
        run.finish(false);
        assert_eq!(run.state, BatchState::Completed);
    }
}
