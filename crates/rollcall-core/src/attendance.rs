//! Attendance sheet rows and the presence-to-grade policy.

use std::fmt;

use serde::Serialize;

use crate::error::ReconcileError;
use crate::identity::Identity;

/// Points posted to the grading service.
pub type Grade = u32;

/// Grade posted for a student marked present
pub const PRESENT_GRADE: Grade = 5;

/// Grade posted for a student marked absent
pub const ABSENT_GRADE: Grade = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceMark {
    Present,
    Absent,
}

impl PresenceMark {
    /// Match presence text against the accepted vocabulary, ignoring case
    /// and surrounding whitespace.
    pub fn from_text(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "present" | "yes" => Some(PresenceMark::Present),
            "absent" | "no" => Some(PresenceMark::Absent),
            _ => None,
        }
    }
}

impl fmt::Display for PresenceMark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PresenceMark::Present => write!(f, "present"),
            PresenceMark::Absent => write!(f, "absent"),
        }
    }
}

/// The attendance grading policy. Orchestration only ever goes through here.
pub fn grade_for(mark: PresenceMark) -> Grade {
    match mark {
        PresenceMark::Present => PRESENT_GRADE,
        PresenceMark::Absent => ABSENT_GRADE,
    }
}

/// One data row of the attendance sheet.
///
/// Column 0 is a free-form label (usually an email) that only appears in
/// error messages, column 1 the display name, column 2 the presence text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceRow {
    /// 1-based row number in the source sheet
    pub row: usize,
    pub label: String,
    pub raw_name: String,
    pub presence_text: String,
}

impl AttendanceRow {
    pub fn from_cells(row: usize, cells: &[String]) -> Self {
        let cell = |i: usize| cells.get(i).cloned().unwrap_or_default();
        Self {
            row,
            label: cell(0),
            raw_name: cell(1),
            presence_text: cell(2),
        }
    }

    /// Label for diagnostics, falling back to the row number when column 0
    /// is empty.
    pub fn display_label(&self) -> String {
        let label = self.label.trim();
        if label.is_empty() {
            format!("row {}", self.row)
        } else {
            label.to_string()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceRecord {
    pub row: usize,
    pub label: String,
    pub identity: Identity,
    pub presence: PresenceMark,
}

impl AttendanceRecord {
    pub fn grade(&self) -> Grade {
        grade_for(self.presence)
    }
}

/// Interpret one attendance row. Rejects unknown presence text instead of
/// defaulting it.
pub fn interpret(row: &AttendanceRow) -> Result<AttendanceRecord, ReconcileError> {
    let identity = Identity::parse(&row.raw_name)?;
    let label = row.display_label();

    let presence = PresenceMark::from_text(&row.presence_text).ok_or_else(|| {
        ReconcileError::InvalidPresenceMarker {
            label: label.clone(),
            identity: identity.clone(),
            raw: row.presence_text.clone(),
        }
    })?;

    Ok(AttendanceRecord {
        row: row.row,
        label,
        identity,
        presence,
    })
}
