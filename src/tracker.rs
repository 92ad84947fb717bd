//! Batch completion tracking: job classification, settlement decisions, and
//! the cancellable polling cadence.
//!
//! A batch is settled only when three independent exhaustion signals agree:
//! no ledger id is still pending, every ledger id is completed, and the most
//! recent storage scan found nothing left to retrieve (failed transfers
//! count as activity until a later scan succeeds). Jobs that reach FAILED or
//! CANCELLED are terminal-but-unsuccessful; they fail the batch explicitly
//! instead of starving the settlement condition forever.

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{Instant, sleep};

use crate::platform::{JobId, JobRecord, JobState};

/// Errors raised while tracking a batch.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum TrackerError {
    /// Raised when one or more jobs reached a terminal failure state.
    #[error("{} job(s) failed or were cancelled: {}", ids.len(), format_ids(ids))]
    JobsFailed {
        /// Ids of the failed or cancelled jobs.
        ids: Vec<JobId>,
    },
    /// Raised when the wall-clock budget elapsed with work outstanding.
    #[error(
        "batch did not settle within {budget_secs}s; outstanding job(s): {}",
        format_ids(outstanding)
    )]
    BudgetExhausted {
        /// Ids that never completed.
        outstanding: Vec<JobId>,
        /// Budget that was exhausted, in seconds.
        budget_secs: u64,
    },
}

fn format_ids(ids: &[JobId]) -> String {
    ids.iter()
        .map(|id| id.0.clone())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Total partition of ledger ids against one remote status listing.
///
/// Ledger ids absent from the listing count as pending: the platform may not
/// have materialised the record yet, and a later poll re-derives the
/// partition from scratch (classification is idempotent).
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct JobClassification {
    /// Ids in READY or RUNNING, or not yet visible in the listing.
    pub pending: Vec<JobId>,
    /// Ids in COMPLETED.
    pub completed: Vec<JobId>,
    /// Ids in FAILED or CANCELLED.
    pub failed: Vec<JobId>,
}

impl JobClassification {
    /// Partitions `ledger_ids` using `listing`. Records in the listing that
    /// the ledger never mentions are ignored; they belong to other batches.
    #[must_use]
    pub fn classify(ledger_ids: &[JobId], listing: &[JobRecord]) -> Self {
        let states: HashMap<&JobId, JobState> = listing
            .iter()
            .map(|record| (&record.id, record.state))
            .collect();

        let mut partition = Self::default();
        for id in ledger_ids {
            match states.get(id) {
                Some(state) if state.is_terminal_failure() => {
                    partition.failed.push(id.clone());
                }
                Some(JobState::Completed) => partition.completed.push(id.clone()),
                Some(_) | None => partition.pending.push(id.clone()),
            }
        }
        partition
    }

    /// Ids that have not completed, in ledger order.
    #[must_use]
    pub fn outstanding(&self) -> Vec<JobId> {
        self.pending
            .iter()
            .chain(self.failed.iter())
            .cloned()
            .collect()
    }
}

/// Outcome of one settlement decision.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Settlement {
    /// All three exhaustion signals agree; the batch is done.
    Settled,
    /// Work remains; poll again after the cadence interval.
    Unsettled {
        /// Pending ledger ids at this poll.
        pending: usize,
        /// Completed ledger ids at this poll.
        completed: usize,
    },
}

impl Settlement {
    /// Decides settlement from a classification, the ledger length, and the
    /// most recent storage scan's retrieval activity: artifacts staged plus
    /// failed transfers still awaiting retry.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::JobsFailed`] when the classification contains
    /// terminal failures; no settlement is possible for such a batch.
    pub fn decide(
        classification: &JobClassification,
        ledger_len: usize,
        newly_retrieved: usize,
    ) -> Result<Self, TrackerError> {
        if !classification.failed.is_empty() {
            return Err(TrackerError::JobsFailed {
                ids: classification.failed.clone(),
            });
        }

        let pending = classification.pending.len();
        let completed = classification.completed.len();
        if pending == 0 && completed == ledger_len && newly_retrieved == 0 {
            return Ok(Self::Settled);
        }
        Ok(Self::Unsettled { pending, completed })
    }
}

/// Handle used by an operator-facing task to request shutdown.
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    sender: watch::Sender<bool>,
}

impl ShutdownHandle {
    /// Requests shutdown; every waiter wakes promptly.
    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }
}

/// Receiving side of the shutdown signal, raced against polling sleeps.
#[derive(Clone, Debug)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Creates a connected handle/signal pair.
    #[must_use]
    pub fn new() -> (ShutdownHandle, Self) {
        let (sender, receiver) = watch::channel(false);
        (ShutdownHandle { sender }, Self { receiver })
    }

    /// Resolves when shutdown is requested.
    pub async fn triggered(&mut self) {
        if *self.receiver.borrow() {
            return;
        }
        // An Err means the handle was dropped without triggering; treat that
        // as "never", matching a run with no operator shutdown wired up.
        while self.receiver.changed().await.is_ok() {
            if *self.receiver.borrow() {
                return;
            }
        }
        std::future::pending::<()>().await;
    }
}

/// Outcome of one cadence wait.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WaitOutcome {
    /// The full interval elapsed; poll again.
    Elapsed,
    /// Shutdown was requested during the wait.
    Shutdown,
}

/// Polling cadence and wall-clock budget for one tracking run.
#[derive(Debug)]
pub struct Tracker {
    poll_interval: Duration,
    wait_budget: Duration,
    deadline: Instant,
}

impl Tracker {
    /// Starts a tracking run; the budget clock begins immediately.
    #[must_use]
    pub fn start(poll_interval: Duration, wait_budget: Duration) -> Self {
        Self {
            poll_interval,
            wait_budget,
            deadline: Instant::now() + wait_budget,
        }
    }

    /// Interval between completion polls.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Returns `true` once the wall-clock budget has elapsed.
    #[must_use]
    pub fn budget_exhausted(&self) -> bool {
        Instant::now() > self.deadline
    }

    /// Builds the budget-exhaustion error listing outstanding ids.
    #[must_use]
    pub fn budget_error(&self, outstanding: Vec<JobId>) -> TrackerError {
        TrackerError::BudgetExhausted {
            outstanding,
            budget_secs: self.wait_budget.as_secs(),
        }
    }

    /// Sleeps one poll interval, returning early when shutdown is
    /// requested. This is deliberate backpressure: remote jobs take minutes
    /// to hours, and tight polling wastes quota.
    pub async fn wait_next_poll(&self, shutdown: &mut ShutdownSignal) -> WaitOutcome {
        tokio::select! {
            () = sleep(self.poll_interval) => WaitOutcome::Elapsed,
            () = shutdown.triggered() => WaitOutcome::Shutdown,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn id(value: &str) -> JobId {
        JobId(value.to_owned())
    }

    fn record(value: &str, state: JobState) -> JobRecord {
        JobRecord {
            id: id(value),
            state,
        }
    }

    fn ledger() -> Vec<JobId> {
        vec![id("a"), id("b"), id("c"), id("d")]
    }

    #[test]
    fn classification_is_total_over_all_states() {
        let listing = vec![
            record("a", JobState::Ready),
            record("b", JobState::Running),
            record("c", JobState::Completed),
            record("d", JobState::Failed),
            record("x", JobState::Completed),
        ];
        let partition = JobClassification::classify(&ledger(), &listing);

        assert_eq!(partition.pending, vec![id("a"), id("b")]);
        assert_eq!(partition.completed, vec![id("c")]);
        assert_eq!(partition.failed, vec![id("d")]);
    }

    #[test]
    fn ledger_ids_missing_from_listing_stay_pending() {
        let listing = vec![record("a", JobState::Completed)];
        let partition = JobClassification::classify(&ledger(), &listing);
        assert_eq!(partition.pending, vec![id("b"), id("c"), id("d")]);
    }

    #[test]
    fn classification_is_idempotent() {
        let listing = vec![
            record("a", JobState::Completed),
            record("b", JobState::Running),
        ];
        let first = JobClassification::classify(&ledger(), &listing);
        let second = JobClassification::classify(&ledger(), &listing);
        assert_eq!(first, second);
    }

    // Each of the three exhaustion signals must independently hold
    // settlement open.
    #[rstest]
    #[case(1, 3, 0, false)]
    #[case(0, 3, 0, false)]
    #[case(0, 4, 2, false)]
    #[case(0, 4, 0, true)]
    fn settlement_requires_all_three_signals(
        #[case] pending: usize,
        #[case] completed: usize,
        #[case] newly_retrieved: usize,
        #[case] settled: bool,
    ) {
        let classification = JobClassification {
            pending: (0..pending).map(|n| id(&format!("p{n}"))).collect(),
            completed: (0..completed).map(|n| id(&format!("c{n}"))).collect(),
            failed: Vec::new(),
        };
        let decision = Settlement::decide(&classification, 4, newly_retrieved)
            .expect("no failures present");
        assert_eq!(matches!(decision, Settlement::Settled), settled);
    }

    #[test]
    fn failed_jobs_fail_the_batch_with_ids_listed() {
        let classification = JobClassification {
            pending: Vec::new(),
            completed: vec![id("a")],
            failed: vec![id("b"), id("c")],
        };
        let err = Settlement::decide(&classification, 3, 0).expect_err("failures present");
        assert_eq!(
            err,
            TrackerError::JobsFailed {
                ids: vec![id("b"), id("c")]
            }
        );
        assert!(err.to_string().contains("b, c"), "unexpected: {err}");
    }

    #[tokio::test]
    async fn cadence_sleeps_at_least_interval_per_poll() {
        let interval = Duration::from_millis(10);
        let tracker = Tracker::start(interval, Duration::from_secs(5));
        let (_handle, mut signal) = ShutdownSignal::new();

        let begun = Instant::now();
        for _ in 0..3 {
            let outcome = tracker.wait_next_poll(&mut signal).await;
            assert_eq!(outcome, WaitOutcome::Elapsed);
        }
        assert!(begun.elapsed() >= interval * 3);
    }

    #[tokio::test]
    async fn shutdown_interrupts_a_long_wait() {
        let tracker = Tracker::start(Duration::from_secs(300), Duration::from_secs(600));
        let (handle, mut signal) = ShutdownSignal::new();

        handle.trigger();
        let begun = Instant::now();
        let outcome = tracker.wait_next_poll(&mut signal).await;
        assert_eq!(outcome, WaitOutcome::Shutdown);
        assert!(begun.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn budget_exhaustion_lists_outstanding_ids() {
        let tracker = Tracker::start(Duration::from_millis(1), Duration::from_millis(1));
        sleep(Duration::from_millis(5)).await;
        assert!(tracker.budget_exhausted());

        let err = tracker.budget_error(vec![id("stuck")]);
        assert!(
            err.to_string().contains("stuck"),
            "diagnostic should list outstanding ids: {err}"
        );
    }
}
