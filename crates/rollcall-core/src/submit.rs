//! Submission orchestration.
//!
//! Joins interpreted attendance records against the roster index and posts
//! one grade per student. Calls run concurrently up to `max_concurrent`,
//! each under its own timeout, and every record ends up with exactly one
//! outcome. A failed call never stops the others.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::{ApiError, GradingClient};
use crate::attendance::{grade_for, interpret, AttendanceRecord, AttendanceRow};
use crate::error::ReconcileError;
use crate::report::{SubmissionOutcome, SubmissionReport};
use crate::roster::{RosterIndex, StudentId};

// ============================================================================
// Constants
// ============================================================================

/// Default cap on simultaneous grade updates.
/// Canvas publishes no hard quota, so stay well below its throttling point.
pub const DEFAULT_MAX_CONCURRENT: usize = 4;

/// Default bound on a single grade update, retries included.
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;

const CANCELLED_REASON: &str = "run cancelled before this grade was sent";

/// What to do with an attendance row whose student is not in the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownStudentPolicy {
    /// Report the row as failed and keep going
    #[default]
    Fail,
    /// Refuse to submit anything if any row is unresolved
    Abort,
}

#[derive(Debug, Clone)]
pub struct SubmitOptions {
    pub max_concurrent: usize,
    pub call_timeout: Duration,
    pub unknown_student: UnknownStudentPolicy,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
            unknown_student: UnknownStudentPolicy::default(),
        }
    }
}

pub struct Submitter<C> {
    client: C,
    options: SubmitOptions,
    stop: Option<watch::Receiver<bool>>,
}

impl<C: GradingClient> Submitter<C> {
    pub fn new(client: C, options: SubmitOptions) -> Self {
        Self {
            client,
            options,
            stop: None,
        }
    }

    /// Once the watched value turns `true`, no new calls are started.
    /// Calls already in flight are allowed to finish.
    pub fn with_stop_signal(mut self, stop: watch::Receiver<bool>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Interpret raw attendance rows, then submit the valid ones.
    ///
    /// Rows that fail interpretation are reported as failed outcomes next to
    /// the submitted ones.
    pub async fn submit_rows(
        &self,
        rows: &[AttendanceRow],
        index: &RosterIndex,
    ) -> Result<SubmissionReport, ReconcileError> {
        let mut records = Vec::with_capacity(rows.len());
        let mut rejected = Vec::new();

        for row in rows {
            match interpret(row) {
                Ok(record) => records.push(record),
                Err(err) => {
                    warn!(row = row.row, error = %err, "Attendance row rejected");
                    let identity = match &err {
                        ReconcileError::InvalidPresenceMarker { identity, .. } => Some(identity.clone()),
                        _ => None,
                    };
                    rejected.push(SubmissionOutcome::rejected(row.row, row.display_label(), identity, &err));
                }
            }
        }

        let mut report = self.submit(records, index).await?;
        report.extend(rejected);
        Ok(report)
    }

    /// Resolve every record against the index and post its grade.
    ///
    /// Returns `Err(UnknownStudent)` only under `UnknownStudentPolicy::Abort`,
    /// and in that case before any grade is sent.
    pub async fn submit(
        &self,
        records: Vec<AttendanceRecord>,
        index: &RosterIndex,
    ) -> Result<SubmissionReport, ReconcileError> {
        let started_at = Utc::now();
        let mut outcomes = Vec::with_capacity(records.len());
        let mut planned = Vec::with_capacity(records.len());

        for record in records {
            match index.lookup(&record.identity) {
                Some(student) => planned.push((record, student.clone())),
                None => {
                    let err = ReconcileError::UnknownStudent {
                        identity: record.identity.clone(),
                    };
                    if self.options.unknown_student == UnknownStudentPolicy::Abort {
                        warn!(student = %record.identity, row = record.row, "Unknown student, aborting run");
                        return Err(err);
                    }
                    warn!(student = %record.identity, row = record.row, "Unknown student");
                    outcomes.push(SubmissionOutcome::rejected(
                        record.row,
                        record.label.clone(),
                        Some(record.identity.clone()),
                        &err,
                    ));
                }
            }
        }

        let (planned, superseded) = last_row_per_student(planned);
        outcomes.extend(superseded);

        let limit = self.options.max_concurrent.max(1);
        info!(students = planned.len(), max_concurrent = limit, "Submitting grades");

        let attempted: Vec<SubmissionOutcome> = stream::iter(planned)
            .map(|(record, student)| self.attempt(record, student))
            .buffer_unordered(limit)
            .collect()
            .await;
        outcomes.extend(attempted);

        let report = SubmissionReport::new(started_at, outcomes);
        info!(
            submitted = report.submitted(),
            failed = report.failed(),
            skipped = report.skipped(),
            "Submission finished"
        );
        Ok(report)
    }

    fn stop_requested(&self) -> bool {
        self.stop.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    async fn attempt(&self, record: AttendanceRecord, student: StudentId) -> SubmissionOutcome {
        if self.stop_requested() {
            debug!(student = %student, "Stop requested, not sending");
            return SubmissionOutcome::skipped(&record, student, CANCELLED_REASON);
        }

        let grade = grade_for(record.presence);
        let result = tokio::time::timeout(self.options.call_timeout, self.client.set_grade(&student, grade)).await;

        match result {
            Ok(Ok(())) => {
                debug!(student = %record.identity, id = %student, grade, "Grade posted");
                SubmissionOutcome::submitted(&record, student, grade)
            }
            Ok(Err(err)) => {
                warn!(student = %record.identity, id = %student, error = %err, "Grade update failed");
                SubmissionOutcome::api_failure(&record, student, grade, &err)
            }
            Err(_) => {
                let err = ApiError::Timeout(self.options.call_timeout);
                warn!(student = %record.identity, id = %student, error = %err, "Grade update timed out");
                SubmissionOutcome::api_failure(&record, student, grade, &err)
            }
        }
    }
}

/// Keep only the last sheet row for each student.
///
/// Two rows for one student would otherwise race each other to the server.
/// Earlier rows come back as skipped outcomes naming the row that replaced
/// them.
fn last_row_per_student(
    planned: Vec<(AttendanceRecord, StudentId)>,
) -> (Vec<(AttendanceRecord, StudentId)>, Vec<SubmissionOutcome>) {
    let mut last_row: HashMap<StudentId, usize> = HashMap::new();
    for (record, student) in &planned {
        let row = last_row.entry(student.clone()).or_insert(record.row);
        *row = (*row).max(record.row);
    }

    let mut kept = Vec::with_capacity(last_row.len());
    let mut superseded = Vec::new();
    for (record, student) in planned {
        let winner = last_row.get(&student).copied().unwrap_or(record.row);
        if winner == record.row {
            kept.push((record, student));
        } else {
            warn!(student = %record.identity, row = record.row, used = winner, "Duplicate attendance row");
            let reason = format!("duplicate attendance row, row {} is used instead", winner);
            superseded.push(SubmissionOutcome::skipped(&record, student, &reason));
        }
    }
    (kept, superseded)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::attendance::{Grade, PresenceMark};
    use crate::identity::Identity;
    use crate::report::{FailureKind, OutcomeStatus};
    use crate::roster::RosterRow;

    // -------------------------------------------------------------------------
    // Test client
    // -------------------------------------------------------------------------

    #[derive(Default)]
    struct MockGradingClient {
        calls: Mutex<Vec<(StudentId, Grade)>>,
        failing: HashSet<String>,
        delay: Option<Duration>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl MockGradingClient {
        fn failing(ids: &[&str]) -> Self {
            Self {
                failing: ids.iter().map(|s| s.to_string()).collect(),
                ..Self::default()
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<(StudentId, Grade)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GradingClient for MockGradingClient {
        async fn set_grade(&self, student: &StudentId, grade: Grade) -> Result<(), ApiError> {
            self.calls.lock().unwrap().push((student.clone(), grade));
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing.contains(student.as_str()) {
                Err(ApiError::from_status(500, "boom"))
            } else {
                Ok(())
            }
        }
    }

    // -------------------------------------------------------------------------
    // Fixtures
    // -------------------------------------------------------------------------

    fn index() -> RosterIndex {
        RosterIndex::build(vec![
            RosterRow::from_cells(2, &["Doe,Jane".to_string(), "A1".to_string()]),
            RosterRow::from_cells(3, &["Roe,Rick".to_string(), "B2".to_string()]),
            RosterRow::from_cells(4, &["Lee Poe,Sam".to_string(), "C3".to_string()]),
        ])
        .unwrap()
    }

    fn row(n: usize, name: &str, presence: &str) -> AttendanceRow {
        AttendanceRow {
            row: n,
            label: format!("student{}@example.edu", n),
            raw_name: name.to_string(),
            presence_text: presence.to_string(),
        }
    }

    fn record(n: usize, name: &str, presence: PresenceMark) -> AttendanceRecord {
        AttendanceRecord {
            row: n,
            label: format!("student{}@example.edu", n),
            identity: Identity::parse(name).unwrap(),
            presence,
        }
    }

    fn failure_kind(outcome: &SubmissionOutcome) -> Option<FailureKind> {
        match &outcome.status {
            OutcomeStatus::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    // -------------------------------------------------------------------------
    // Scenarios
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_partial_failure_does_not_block_siblings() {
        let submitter = Submitter::new(MockGradingClient::default(), SubmitOptions::default());
        let rows = vec![
            row(2, "Doe,Jane", "present"),
            row(3, "Roe,Rick", "maybe"),
            row(4, "lee poe, SAM", "Absent"),
        ];

        let report = submitter.submit_rows(&rows, &index()).await.unwrap();

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.outcomes[0].status, OutcomeStatus::Submitted);
        assert_eq!(report.outcomes[0].grade, Some(5));
        assert_eq!(failure_kind(&report.outcomes[1]), Some(FailureKind::InvalidPresenceMarker));
        match &report.outcomes[1].status {
            OutcomeStatus::Failed { reason, .. } => {
                assert!(reason.contains("student3@example.edu"));
                assert!(reason.contains("maybe"));
            }
            other => panic!("unexpected status {other:?}"),
        }
        assert_eq!(report.outcomes[2].status, OutcomeStatus::Submitted);
        assert_eq!(report.outcomes[2].grade, Some(0));

        let mut calls = submitter.client().calls();
        calls.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
        assert_eq!(calls, vec![(StudentId::new("A1"), 5), (StudentId::new("C3"), 0)]);
    }

    #[tokio::test]
    async fn test_malformed_name_is_row_failure() {
        let submitter = Submitter::new(MockGradingClient::default(), SubmitOptions::default());
        let rows = vec![row(2, "Jane Doe", "present"), row(3, "Roe,Rick", "yes")];

        let report = submitter.submit_rows(&rows, &index()).await.unwrap();

        assert_eq!(failure_kind(&report.outcomes[0]), Some(FailureKind::MalformedName));
        assert!(report.outcomes[0].identity.is_none());
        assert!(report.outcomes[1].is_success());
    }

    #[tokio::test]
    async fn test_unknown_student_fails_only_that_row() {
        let submitter = Submitter::new(MockGradingClient::default(), SubmitOptions::default());
        let records = vec![
            record(2, "Doe,Jane", PresenceMark::Present),
            record(3, "Nobody,Dana", PresenceMark::Present),
            record(4, "Roe,Rick", PresenceMark::Absent),
        ];

        let report = submitter.submit(records, &index()).await.unwrap();

        assert!(report.outcomes[0].is_success());
        assert_eq!(failure_kind(&report.outcomes[1]), Some(FailureKind::UnknownStudent));
        assert_eq!(report.outcomes[1].identity, Some(Identity::parse("Nobody,Dana").unwrap()));
        assert!(report.outcomes[2].is_success());
        assert_eq!(submitter.client().calls().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_student_abort_makes_no_calls() {
        let options = SubmitOptions {
            unknown_student: UnknownStudentPolicy::Abort,
            ..SubmitOptions::default()
        };
        let submitter = Submitter::new(MockGradingClient::default(), options);
        let records = vec![
            record(2, "Doe,Jane", PresenceMark::Present),
            record(3, "Nobody,Dana", PresenceMark::Present),
        ];

        let err = submitter.submit(records, &index()).await.unwrap_err();

        assert_eq!(
            err,
            ReconcileError::UnknownStudent {
                identity: Identity::parse("Nobody,Dana").unwrap()
            }
        );
        assert!(submitter.client().calls().is_empty());
    }

    #[tokio::test]
    async fn test_api_error_isolated_to_student() {
        let submitter = Submitter::new(MockGradingClient::failing(&["B2"]), SubmitOptions::default());
        let records = vec![
            record(2, "Doe,Jane", PresenceMark::Present),
            record(3, "Roe,Rick", PresenceMark::Present),
            record(4, "Lee Poe,Sam", PresenceMark::Present),
        ];

        let report = submitter.submit(records, &index()).await.unwrap();

        assert_eq!(report.submitted(), 2);
        assert_eq!(report.failed(), 1);
        let failed = &report.outcomes[1];
        assert_eq!(failure_kind(failed), Some(FailureKind::Api));
        match &failed.status {
            OutcomeStatus::Failed { reason, .. } => {
                assert!(reason.contains("Roe,Rick"));
                assert!(reason.contains("B2"));
                assert!(reason.contains("500"));
                assert!(reason.contains("boom"));
            }
            other => panic!("unexpected status {other:?}"),
        }
        assert_eq!(submitter.client().calls().len(), 3);
    }

    #[tokio::test]
    async fn test_slow_call_times_out_as_failure() {
        let options = SubmitOptions {
            call_timeout: Duration::from_millis(20),
            ..SubmitOptions::default()
        };
        let submitter = Submitter::new(MockGradingClient::slow(Duration::from_millis(500)), options);

        let report = submitter
            .submit(vec![record(2, "Doe,Jane", PresenceMark::Present)], &index())
            .await
            .unwrap();

        assert_eq!(failure_kind(&report.outcomes[0]), Some(FailureKind::Timeout));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let options = SubmitOptions {
            max_concurrent: 2,
            ..SubmitOptions::default()
        };
        let submitter = Submitter::new(MockGradingClient::slow(Duration::from_millis(10)), options);
        let names: Vec<String> = ["Ada", "Ben", "Cal", "Dee", "Eli", "Fay", "Gus", "Hal", "Ivy"]
            .iter()
            .map(|first| format!("Doe,{}", first))
            .collect();
        let index = RosterIndex::build(
            names
                .iter()
                .enumerate()
                .map(|(i, name)| RosterRow::from_cells(i + 2, &[name.clone(), format!("S{}", i)])),
        )
        .unwrap();
        let records: Vec<AttendanceRecord> = names
            .iter()
            .enumerate()
            .map(|(i, name)| record(i + 2, name, PresenceMark::Present))
            .collect();

        let report = submitter.submit(records, &index).await.unwrap();

        assert_eq!(report.submitted(), 9);
        let peak = submitter.client().max_in_flight.load(Ordering::SeqCst);
        assert!(peak <= 2, "peak concurrency was {peak}");
        assert!(peak >= 1);
    }

    #[tokio::test]
    async fn test_zero_concurrency_still_runs() {
        let options = SubmitOptions {
            max_concurrent: 0,
            ..SubmitOptions::default()
        };
        let submitter = Submitter::new(MockGradingClient::default(), options);
        let report = submitter
            .submit(vec![record(2, "Doe,Jane", PresenceMark::Absent)], &index())
            .await
            .unwrap();
        assert!(report.is_complete_success());
    }

    #[tokio::test]
    async fn test_repeated_runs_agree() {
        let submitter = Submitter::new(MockGradingClient::default(), SubmitOptions::default());
        let rows = vec![
            row(2, "Doe,Jane", "yes"),
            row(3, "Roe,Rick", "no"),
            row(4, "Lee Poe,Sam", "present"),
        ];

        let first = submitter.submit_rows(&rows, &index()).await.unwrap();
        let second = submitter.submit_rows(&rows, &index()).await.unwrap();

        assert_eq!(first.status_by_student(), second.status_by_student());
        assert_eq!(first.outcomes, second.outcomes);
    }

    #[tokio::test]
    async fn test_stop_signal_skips_unstarted_calls() {
        let (tx, rx) = watch::channel(false);
        let submitter =
            Submitter::new(MockGradingClient::default(), SubmitOptions::default()).with_stop_signal(rx);
        tx.send(true).unwrap();

        let report = submitter
            .submit(
                vec![
                    record(2, "Doe,Jane", PresenceMark::Present),
                    record(3, "Roe,Rick", PresenceMark::Absent),
                ],
                &index(),
            )
            .await
            .unwrap();

        assert_eq!(report.skipped(), 2);
        assert!(submitter.client().calls().is_empty());
    }

    #[tokio::test]
    async fn test_stop_signal_lets_in_flight_call_finish() {
        let (tx, rx) = watch::channel(false);
        let options = SubmitOptions {
            max_concurrent: 1,
            ..SubmitOptions::default()
        };
        let submitter = Submitter::new(MockGradingClient::slow(Duration::from_millis(200)), options)
            .with_stop_signal(rx);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tx.send(true).unwrap();
        });

        let report = submitter
            .submit(
                vec![
                    record(2, "Doe,Jane", PresenceMark::Present),
                    record(3, "Roe,Rick", PresenceMark::Absent),
                    record(4, "Lee Poe,Sam", PresenceMark::Present),
                ],
                &index(),
            )
            .await
            .unwrap();

        assert_eq!(report.outcomes[0].status, OutcomeStatus::Submitted);
        assert!(matches!(report.outcomes[1].status, OutcomeStatus::Skipped { .. }));
        assert!(matches!(report.outcomes[2].status, OutcomeStatus::Skipped { .. }));
        assert_eq!(submitter.client().calls(), vec![(StudentId::new("A1"), 5)]);
    }

    #[tokio::test]
    async fn test_duplicate_attendance_rows_last_row_wins() {
        let submitter = Submitter::new(MockGradingClient::default(), SubmitOptions::default());
        let records = vec![
            record(2, "Doe,Jane", PresenceMark::Present),
            record(3, "Roe,Rick", PresenceMark::Present),
            record(4, "doe, jane", PresenceMark::Absent),
        ];

        let report = submitter.submit(records, &index()).await.unwrap();

        match &report.outcomes[0].status {
            OutcomeStatus::Skipped { reason } => assert!(reason.contains("row 4")),
            other => panic!("unexpected status {other:?}"),
        }
        assert_eq!(report.outcomes[2].status, OutcomeStatus::Submitted);
        assert_eq!(report.outcomes[2].grade, Some(0));

        let mut calls = submitter.client().calls();
        calls.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
        assert_eq!(calls, vec![(StudentId::new("A1"), 0), (StudentId::new("B2"), 5)]);
        assert!(!report.is_complete_success());
    }

    #[test]
    fn test_last_row_per_student_keeps_latest_row() {
        let planned = vec![
            (record(5, "Doe,Jane", PresenceMark::Absent), StudentId::new("A1")),
            (record(2, "Doe,Jane", PresenceMark::Present), StudentId::new("A1")),
            (record(3, "Roe,Rick", PresenceMark::Present), StudentId::new("B2")),
        ];

        let (kept, superseded) = last_row_per_student(planned);

        let kept_rows: Vec<usize> = kept.iter().map(|(r, _)| r.row).collect();
        assert_eq!(kept_rows, vec![5, 3]);
        assert_eq!(superseded.len(), 1);
        assert_eq!(superseded[0].row, 2);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let submitter = Submitter::new(MockGradingClient::default(), SubmitOptions::default());
        let report = submitter.submit(Vec::new(), &index()).await.unwrap();
        assert!(report.outcomes.is_empty());
        assert!(report.is_complete_success());
    }
}
