//! Grading service clients.
//!
//! The submission orchestrator only sees the `GradingClient` trait.
//! `CanvasClient` implements it against the Canvas LMS REST API using
//! bearer token authentication; `DryRunClient` implements it without any
//! network access.

pub mod client;
pub mod dry_run;
pub mod error;

use async_trait::async_trait;

use crate::attendance::Grade;
use crate::roster::StudentId;

pub use client::CanvasClient;
pub use dry_run::DryRunClient;
pub use error::ApiError;

/// Sets a single student's grade on the configured assignment.
///
/// Implementations must be idempotent: posting the same grade twice leaves
/// the remote state unchanged.
#[async_trait]
pub trait GradingClient: Send + Sync {
    async fn set_grade(&self, student: &StudentId, grade: Grade) -> Result<(), ApiError>;
}
