use thiserror::Error;

use crate::identity::Identity;

/// Errors raised while reconciling the attendance sheet against the roster.
///
/// Every variant carries the text a human needs to find and fix the
/// offending row in the source spreadsheet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("Malformed name '{raw}': expected 'last,first' or 'middle last,first'")]
    MalformedName { raw: String },

    #[error("Invalid presence marker '{raw}' for {identity} (row '{label}'): expected present, yes, absent or no")]
    InvalidPresenceMarker {
        label: String,
        identity: Identity,
        raw: String,
    },

    #[error("Unknown student {identity}: not found in the ID roster")]
    UnknownStudent { identity: Identity },

    #[error("Roster row {row} for {identity} has no student ID")]
    MissingStudentId { row: usize, identity: Identity },
}

impl ReconcileError {
    pub fn malformed_name(raw: &str) -> Self {
        ReconcileError::MalformedName {
            raw: raw.to_string(),
        }
    }
}
