//! rollcall core library.
//!
//! Reconciles an attendance sheet against a Canvas ID roster by student
//! name and posts one attendance grade per student:
//!
//! - `identity`: canonical, case/whitespace-insensitive student names
//! - `roster`: `Identity` to Canvas student ID index
//! - `attendance`: attendance row interpretation and the grading policy
//! - `submit`: bounded-concurrency submission with per-student outcomes
//! - `report`: the run report
//! - `api`: the `GradingClient` trait and the Canvas client
//! - `sheets`, `config`, `auth`: inputs, settings and tokens

pub mod api;
pub mod attendance;
pub mod auth;
pub mod config;
pub mod error;
pub mod identity;
pub mod report;
pub mod roster;
pub mod sheets;
pub mod submit;

pub use api::{ApiError, CanvasClient, DryRunClient, GradingClient};
pub use attendance::{grade_for, interpret, AttendanceRecord, AttendanceRow, Grade, PresenceMark};
pub use config::Config;
pub use error::ReconcileError;
pub use identity::Identity;
pub use report::{FailureKind, OutcomeStatus, SubmissionOutcome, SubmissionReport};
pub use roster::{RosterIndex, RosterRow, StudentId};
pub use submit::{SubmitOptions, Submitter, UnknownStudentPolicy};
