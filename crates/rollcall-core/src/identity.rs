//! Canonical student identity used to join the attendance sheet with the
//! ID roster.
//!
//! Both sheets spell names by hand, so an `Identity` is normalized exactly
//! once at construction (trimmed, lower-cased, blank middle name dropped).
//! Equality and hashing are derived over those normalized fields.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::ReconcileError;

/// `middle last,first`
static THREE_PART_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z'-]+)\s+([A-Za-z'-]+)\s*,\s*([A-Za-z'-]+)\s*$")
        .expect("three-part name pattern is valid")
});

/// `last,first`
static TWO_PART_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z'-]+)\s*,\s*([A-Za-z'-]+)\s*$")
        .expect("two-part name pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Identity {
    first: String,
    last: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    middle: Option<String>,
}

impl Identity {
    /// Build an identity from already separated name parts.
    ///
    /// A blank `middle` is treated the same as no middle name at all.
    pub fn normalize(first: &str, last: &str, middle: Option<&str>) -> Result<Self, ReconcileError> {
        if first.trim().is_empty() || last.trim().is_empty() {
            return Err(ReconcileError::MalformedName {
                raw: format!("{},{}", last, first),
            });
        }
        let first = first.trim().to_lowercase();
        let last = last.trim().to_lowercase();
        let middle = middle
            .map(|m| m.trim().to_lowercase())
            .filter(|m| !m.is_empty());

        Ok(Self { first, last, middle })
    }

    /// Parse a display name of the form `last,first` or `middle last,first`.
    ///
    /// The whole string has to match one of the two shapes.
    pub fn parse(raw: &str) -> Result<Self, ReconcileError> {
        if let Some(caps) = THREE_PART_NAME.captures(raw) {
            return Self::normalize(&caps[3], &caps[2], Some(&caps[1]));
        }
        if let Some(caps) = TWO_PART_NAME.captures(raw) {
            return Self::normalize(&caps[2], &caps[1], None);
        }
        Err(ReconcileError::malformed_name(raw))
    }

    pub fn first(&self) -> &str {
        &self.first
    }

    pub fn last(&self) -> &str {
        &self.last
    }

    pub fn middle(&self) -> Option<&str> {
        self.middle.as_deref()
    }
}

impl FromStr for Identity {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn capitalize(part: &str) -> String {
    let mut chars = part.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Renders in the roster's own `Middle Last,First` shape.
impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref middle) = self.middle {
            write!(f, "{} ", capitalize(middle))?;
        }
        write!(f, "{},{}", capitalize(&self.last), capitalize(&self.first))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn hash_of(identity: &Identity) -> u64 {
        let mut hasher = DefaultHasher::new();
        identity.hash(&mut hasher);
        hasher.finish()
    }

    // -------------------------------------------------------------------------
    // normalize
    // -------------------------------------------------------------------------

    #[test]
    fn test_normalize_trims_and_lowercases() {
        let id = Identity::normalize("  JANE ", "Doe\t", Some(" Ann ")).unwrap();
        assert_eq!(id.first(), "jane");
        assert_eq!(id.last(), "doe");
        assert_eq!(id.middle(), Some("ann"));
    }

    #[test]
    fn test_normalize_blank_middle_is_no_middle() {
        let blank = Identity::normalize("Jane", "Doe", Some("   ")).unwrap();
        let missing = Identity::normalize("Jane", "Doe", None).unwrap();
        assert_eq!(blank.middle(), None);
        assert_eq!(blank, missing);
        assert_eq!(hash_of(&blank), hash_of(&missing));
    }

    #[test]
    fn test_normalize_rejects_blank_first_or_last() {
        assert!(matches!(
            Identity::normalize("  ", "Doe", None),
            Err(ReconcileError::MalformedName { .. })
        ));
        assert!(matches!(
            Identity::normalize("Jane", "", None),
            Err(ReconcileError::MalformedName { .. })
        ));
    }

    // -------------------------------------------------------------------------
    // parse
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_two_part() {
        let id = Identity::parse("Doe,Jane").unwrap();
        assert_eq!(id.first(), "jane");
        assert_eq!(id.last(), "doe");
        assert_eq!(id.middle(), None);
    }

    #[test]
    fn test_parse_three_part() {
        let id = Identity::parse("Ann Doe,Jane").unwrap();
        assert_eq!(id.first(), "jane");
        assert_eq!(id.last(), "doe");
        assert_eq!(id.middle(), Some("ann"));
    }

    #[test]
    fn test_parse_ignores_case_and_whitespace() {
        assert_eq!(Identity::parse("Doe,Jane").unwrap(), Identity::parse(" doe , JANE ").unwrap());
        assert_eq!(
            Identity::parse("Ann Doe,Jane").unwrap(),
            Identity::parse("  ann   DOE ,jane").unwrap()
        );
        assert_eq!(
            Identity::parse("ann doe, jane").unwrap(),
            Identity::parse("ANN\tDoe ,  Jane").unwrap()
        );
    }

    #[test]
    fn test_parse_middle_name_distinguishes() {
        let with_middle = Identity::parse("Ann Doe,Jane").unwrap();
        let without = Identity::parse("Doe,Jane").unwrap();
        assert_ne!(with_middle, without);
    }

    #[test]
    fn test_parse_accepts_hyphen_and_apostrophe() {
        let id = Identity::parse("O'Brien-Smith,Mary-Kate").unwrap();
        assert_eq!(id.last(), "o'brien-smith");
        assert_eq!(id.first(), "mary-kate");
    }

    #[test]
    fn test_parse_rejects_other_shapes() {
        for raw in [
            "",
            "Jane Doe",
            "Doe,",
            ",Jane",
            "Doe,Jane,Extra",
            "Mary Ann Doe,Jane",
            "Doe,Jane Ann",
            "D0e,Jane",
            "Doe;Jane",
        ] {
            match Identity::parse(raw) {
                Err(ReconcileError::MalformedName { raw: got }) => assert_eq!(got, raw),
                other => panic!("expected MalformedName for {raw:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_from_str_matches_parse() {
        let parsed: Identity = "Doe,Jane".parse().unwrap();
        assert_eq!(parsed, Identity::parse("doe,jane").unwrap());
    }

    // -------------------------------------------------------------------------
    // Display
    // -------------------------------------------------------------------------

    #[test]
    fn test_display_capitalizes_roster_shape() {
        assert_eq!(Identity::parse("doe,JANE").unwrap().to_string(), "Doe,Jane");
        assert_eq!(Identity::parse("ann doe,jane").unwrap().to_string(), "Ann Doe,Jane");
    }
}
