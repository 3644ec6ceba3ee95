//! Per-student outcomes of a submission run.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::api::ApiError;
use crate::attendance::{AttendanceRecord, Grade};
use crate::error::ReconcileError;
use crate::identity::Identity;
use crate::roster::StudentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    MalformedName,
    InvalidPresenceMarker,
    UnknownStudent,
    MissingStudentId,
    Api,
    Timeout,
}

impl From<&ReconcileError> for FailureKind {
    fn from(err: &ReconcileError) -> Self {
        match err {
            ReconcileError::MalformedName { .. } => FailureKind::MalformedName,
            ReconcileError::InvalidPresenceMarker { .. } => FailureKind::InvalidPresenceMarker,
            ReconcileError::UnknownStudent { .. } => FailureKind::UnknownStudent,
            ReconcileError::MissingStudentId { .. } => FailureKind::MissingStudentId,
        }
    }
}

impl From<&ApiError> for FailureKind {
    fn from(err: &ApiError) -> Self {
        if err.is_timeout() {
            FailureKind::Timeout
        } else {
            FailureKind::Api
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Submitted,
    Failed { kind: FailureKind, reason: String },
    /// Never attempted: the run was stopped, or a later row for the same
    /// student replaced this one
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionOutcome {
    pub row: usize,
    pub label: String,
    pub identity: Option<Identity>,
    pub student_id: Option<StudentId>,
    pub grade: Option<Grade>,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

impl SubmissionOutcome {
    pub fn submitted(record: &AttendanceRecord, student: StudentId, grade: Grade) -> Self {
        Self {
            row: record.row,
            label: record.label.clone(),
            identity: Some(record.identity.clone()),
            student_id: Some(student),
            grade: Some(grade),
            status: OutcomeStatus::Submitted,
        }
    }

    /// A row rejected before any remote call was attempted.
    pub fn rejected(row: usize, label: String, identity: Option<Identity>, err: &ReconcileError) -> Self {
        Self {
            row,
            label,
            identity,
            student_id: None,
            grade: None,
            status: OutcomeStatus::Failed {
                kind: err.into(),
                reason: err.to_string(),
            },
        }
    }

    pub fn api_failure(record: &AttendanceRecord, student: StudentId, grade: Grade, err: &ApiError) -> Self {
        let reason = format!("{} ({}): {}", record.identity, student, err);
        Self {
            row: record.row,
            label: record.label.clone(),
            identity: Some(record.identity.clone()),
            student_id: Some(student),
            grade: Some(grade),
            status: OutcomeStatus::Failed {
                kind: err.into(),
                reason,
            },
        }
    }

    pub fn skipped(record: &AttendanceRecord, student: StudentId, reason: &str) -> Self {
        Self {
            row: record.row,
            label: record.label.clone(),
            identity: Some(record.identity.clone()),
            student_id: Some(student),
            grade: None,
            status: OutcomeStatus::Skipped {
                reason: reason.to_string(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Submitted)
    }

    fn who(&self) -> String {
        match (&self.identity, &self.student_id) {
            (Some(identity), Some(student)) => format!("{} ({})", identity, student),
            (Some(identity), None) => identity.to_string(),
            _ => self.label.clone(),
        }
    }
}

impl fmt::Display for SubmissionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            OutcomeStatus::Submitted => write!(
                f,
                "row {:>4}  OK       {} -> {}",
                self.row,
                self.who(),
                self.grade.unwrap_or_default()
            ),
            OutcomeStatus::Failed { reason, .. } => {
                write!(f, "row {:>4}  FAILED   {}", self.row, reason)
            }
            OutcomeStatus::Skipped { reason } => {
                write!(f, "row {:>4}  SKIPPED  {}: {}", self.row, self.who(), reason)
            }
        }
    }
}

/// Result of one run, sorted by sheet row.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<SubmissionOutcome>,
}

impl SubmissionReport {
    pub fn new(started_at: DateTime<Utc>, mut outcomes: Vec<SubmissionOutcome>) -> Self {
        outcomes.sort_by_key(|o| o.row);
        Self {
            started_at,
            finished_at: Utc::now(),
            outcomes,
        }
    }

    /// Merge outcomes produced outside the orchestrated batch.
    pub fn extend(&mut self, outcomes: impl IntoIterator<Item = SubmissionOutcome>) {
        self.outcomes.extend(outcomes);
        self.outcomes.sort_by_key(|o| o.row);
    }

    pub fn submitted(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, OutcomeStatus::Failed { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, OutcomeStatus::Skipped { .. }))
            .count()
    }

    pub fn is_complete_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.is_success())
    }

    /// Outcome status for every resolved student.
    pub fn status_by_student(&self) -> BTreeMap<String, OutcomeStatus> {
        self.outcomes
            .iter()
            .filter_map(|o| {
                o.student_id
                    .as_ref()
                    .map(|id| (id.to_string(), o.status.clone()))
            })
            .collect()
    }
}

impl fmt::Display for SubmissionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for outcome in &self.outcomes {
            writeln!(f, "{}", outcome)?;
        }
        write!(
            f,
            "{} submitted, {} failed, {} skipped ({} rows)",
            self.submitted(),
            self.failed(),
            self.skipped(),
            self.outcomes.len()
        )
    }
}
