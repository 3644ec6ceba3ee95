//! Index from student identity to the grading service's student ID.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ReconcileError;
use crate::identity::Identity;

/// Opaque student identifier assigned by the grading service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct StudentId(String);

impl StudentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One data row of the ID roster: display name in column 0, ID in column 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterRow {
    /// 1-based row number in the source sheet
    pub row: usize,
    pub raw_name: String,
    pub student_id: String,
}

impl RosterRow {
    pub fn from_cells(row: usize, cells: &[String]) -> Self {
        Self {
            row,
            raw_name: cells.first().cloned().unwrap_or_default(),
            student_id: cells.get(1).cloned().unwrap_or_default(),
        }
    }
}

/// A roster identity that appeared more than once. The later row wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateEntry {
    pub identity: Identity,
    pub replaced: StudentId,
    pub replaced_by: StudentId,
    pub row: usize,
}

/// Read-only mapping built once per run from the ID roster.
#[derive(Debug, Clone, Default)]
pub struct RosterIndex {
    entries: HashMap<Identity, StudentId>,
    duplicates: Vec<DuplicateEntry>,
}

impl RosterIndex {
    /// Build the index from roster data rows (header already removed).
    ///
    /// Any unparseable name or missing ID fails the whole build: a partial
    /// index would make later lookups unreliable.
    pub fn build<I>(rows: I) -> Result<Self, ReconcileError>
    where
        I: IntoIterator<Item = RosterRow>,
    {
        let mut index = Self::default();

        for row in rows {
            let identity = Identity::parse(&row.raw_name)?;
            let student_id = row.student_id.trim();
            if student_id.is_empty() {
                return Err(ReconcileError::MissingStudentId {
                    row: row.row,
                    identity,
                });
            }
            index.insert(row.row, identity, StudentId::new(student_id));
        }

        debug!(
            students = index.len(),
            duplicates = index.duplicates.len(),
            "Roster index built"
        );
        Ok(index)
    }

    fn insert(&mut self, row: usize, identity: Identity, student_id: StudentId) {
        if let Some(previous) = self.entries.insert(identity.clone(), student_id.clone()) {
            warn!(
                student = %identity,
                row,
                replaced = %previous,
                replaced_by = %student_id,
                "Duplicate name in ID roster, keeping the later row"
            );
            self.duplicates.push(DuplicateEntry {
                identity,
                replaced: previous,
                replaced_by: student_id,
                row,
            });
        }
    }

    pub fn lookup(&self, identity: &Identity) -> Option<&StudentId> {
        self.entries.get(identity)
    }

    /// Identities that were overwritten while building
    pub fn duplicates(&self) -> &[DuplicateEntry] {
        &self.duplicates
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
