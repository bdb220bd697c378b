// crates/constraint-logic/src/version.rs
// ============================================================================
// Module: Semantic Versions
// Description: Version string checks, comparison, and OSGi style ranges.
// Purpose: Evaluate `[1.0.0,2.0.0)` style ranges for constraints and bindings.
// Dependencies: crate::error
// ============================================================================

//! ## Overview
//! Versions are one to three dot separated numeric parts with an optional
//! `-prerelease` suffix. Ranges use interval notation: `[` and `]` are
//! inclusive bounds, `(` and `)` exclusive, and the literal `INFINITY` is an
//! upper bound larger than every version. A bare version `v` denotes
//! `[v,INFINITY)`.
//!
//! ```
//! use constraint_logic::VersionRange;
//!
//! let range = VersionRange::parse("[1.0.0,2.0.0)").unwrap();
//! assert!(range.is_within_range("1.5").unwrap());
//! assert!(!range.is_within_range("2.0.0").unwrap());
//! ```

use std::cmp::Ordering;
use std::fmt;

use crate::error::LanguageError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Upper bound literal that compares greater than every version.
pub const INFINITY: &str = "INFINITY";

/// Lower bound used when a range has no explicit floor.
pub const ZERO_VERSION: &str = "0.0.0";

// ============================================================================
// SECTION: Version Strings
// ============================================================================

/// Returns true when `value` is a version string or `INFINITY`.
#[must_use]
pub fn is_version_string(value: &str) -> bool {
    value == INFINITY || split_version(value).is_some()
}

/// Splits a version into numeric parts and an optional prerelease suffix.
fn split_version(value: &str) -> Option<([u64; 3], Option<&str>)> {
    let (core, prerelease) = match value.split_once('-') {
        Some((core, pre)) => {
            let valid = !pre.is_empty()
                && pre.bytes().all(|b| b.is_ascii_digit() || b.is_ascii_lowercase() || b == b'-');
            if !valid {
                return None;
            }
            (core, Some(pre))
        }
        None => (value, None),
    };
    let mut parts = [0_u64; 3];
    let mut count = 0;
    for part in core.split('.') {
        if count == 3 || part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        parts[count] = part.parse().ok()?;
        count += 1;
    }
    Some((parts, prerelease))
}

/// Normalizes a version to three numeric parts, keeping any prerelease.
///
/// # Errors
/// Returns [`LanguageError::Version`] when `value` is not a version string.
pub fn normalize_version(value: &str) -> Result<String, LanguageError> {
    if value == INFINITY {
        return Ok(INFINITY.to_string());
    }
    let Some(([major, minor, patch], prerelease)) = split_version(value) else {
        return Err(LanguageError::Version(format!("{value} is not a valid version string.")));
    };
    Ok(prerelease.map_or_else(
        || format!("{major}.{minor}.{patch}"),
        |pre| format!("{major}.{minor}.{patch}-{pre}"),
    ))
}

/// Compares two versions; `INFINITY` sorts after every other version.
///
/// Numeric parts are compared first, then prerelease suffixes textually with
/// an absent suffix sorting first.
///
/// # Errors
/// Returns [`LanguageError::Version`] when either side is not a version.
pub fn compare_versions(left: &str, right: &str) -> Result<Ordering, LanguageError> {
    match (left == INFINITY, right == INFINITY) {
        (true, true) => return Ok(Ordering::Equal),
        (true, false) => {
            parse_parts(right)?;
            return Ok(Ordering::Greater);
        }
        (false, true) => {
            parse_parts(left)?;
            return Ok(Ordering::Less);
        }
        (false, false) => {}
    }
    let (left_parts, left_pre) = parse_parts(left)?;
    let (right_parts, right_pre) = parse_parts(right)?;
    Ok(left_parts.cmp(&right_parts).then_with(|| left_pre.cmp(&right_pre)))
}

/// Parses a version for comparison.
fn parse_parts(value: &str) -> Result<([u64; 3], Option<&str>), LanguageError> {
    split_version(value)
        .ok_or_else(|| LanguageError::Version(format!("{value} is not a valid version string.")))
}

// ============================================================================
// SECTION: Version Range
// ============================================================================

/// Interval of versions with independently inclusive or exclusive bounds.
///
/// # Invariants
/// - `start` and `end` are normalized versions; `end` may be `INFINITY`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    /// Lower bound.
    start: String,
    /// Whether `start` itself is in the range.
    start_inclusive: bool,
    /// Upper bound.
    end: String,
    /// Whether `end` itself is in the range.
    end_inclusive: bool,
}

impl VersionRange {
    /// Parses a version or range expression.
    ///
    /// # Errors
    /// Returns [`LanguageError::Version`] for an empty string, embedded
    /// whitespace, missing brackets, or bounds that are not versions.
    pub fn parse(expression: &str) -> Result<Self, LanguageError> {
        if expression.is_empty() {
            return Err(LanguageError::Version("Empty string is not a valid version.".to_string()));
        }
        if expression.chars().any(char::is_whitespace) {
            return Err(LanguageError::Version(format!(
                "Version expression {expression} must not contain whitespace."
            )));
        }
        if split_version(expression).is_some() {
            return Ok(Self {
                start: normalize_version(expression)?,
                start_inclusive: true,
                end: INFINITY.to_string(),
                end_inclusive: false,
            });
        }

        let invalid = || {
            LanguageError::Version(format!(
                "Version expression {expression} is not a valid version range."
            ))
        };
        let start_inclusive = match expression.as_bytes().first() {
            Some(b'[') => true,
            Some(b'(') => false,
            _ => return Err(invalid()),
        };
        let end_inclusive = match expression.as_bytes().last() {
            Some(b']') => true,
            Some(b')') => false,
            _ => return Err(invalid()),
        };
        let inner = expression.get(1 .. expression.len().saturating_sub(1)).ok_or_else(invalid)?;
        let mut bounds = inner.split(',');
        let (Some(start), Some(end), None) = (bounds.next(), bounds.next(), bounds.next()) else {
            return Err(invalid());
        };
        if start == INFINITY || split_version(start).is_none() || !is_version_string(end) {
            return Err(invalid());
        }
        Ok(Self {
            start: normalize_version(start)?,
            start_inclusive,
            end: normalize_version(end)?,
            end_inclusive,
        })
    }

    /// Lower bound of the range.
    #[must_use]
    pub fn start(&self) -> &str {
        &self.start
    }

    /// Upper bound of the range.
    #[must_use]
    pub fn end(&self) -> &str {
        &self.end
    }

    /// Returns the interval expression, e.g. `[1.0.0,INFINITY)`.
    #[must_use]
    pub fn expression(&self) -> String {
        let open = if self.start_inclusive { '[' } else { '(' };
        let close = if self.end_inclusive { ']' } else { ')' };
        format!("{open}{},{}{close}", self.start, self.end)
    }

    /// Returns true when `version` lies inside the range.
    ///
    /// # Errors
    /// Returns [`LanguageError::Version`] when `version` is not a version.
    pub fn is_within_range(&self, version: &str) -> Result<bool, LanguageError> {
        let lower = compare_versions(version, &self.start)?;
        let above_floor = lower == Ordering::Greater || (self.start_inclusive && lower.is_eq());
        if !above_floor {
            return Ok(false);
        }
        let upper = compare_versions(version, &self.end)?;
        Ok(upper == Ordering::Less || (self.end_inclusive && upper.is_eq()))
    }

    /// Returns the overlap of two ranges.
    ///
    /// # Errors
    /// Returns [`LanguageError::Version`] with "No intersection found." when
    /// the ranges are disjoint.
    pub fn intersects_with(&self, other: &Self) -> Result<Self, LanguageError> {
        let (start, start_inclusive) = match compare_versions(&self.start, &other.start)? {
            Ordering::Greater => (self.start.clone(), self.start_inclusive),
            Ordering::Less => (other.start.clone(), other.start_inclusive),
            Ordering::Equal => {
                (self.start.clone(), self.start_inclusive && other.start_inclusive)
            }
        };
        let (end, end_inclusive) = match compare_versions(&self.end, &other.end)? {
            Ordering::Less => (self.end.clone(), self.end_inclusive),
            Ordering::Greater => (other.end.clone(), other.end_inclusive),
            Ordering::Equal => (self.end.clone(), self.end_inclusive && other.end_inclusive),
        };
        let empty = match compare_versions(&start, &end)? {
            Ordering::Greater => true,
            Ordering::Equal => !(start_inclusive && end_inclusive),
            Ordering::Less => false,
        };
        if empty {
            return Err(LanguageError::Version("No intersection found.".to_string()));
        }
        Ok(Self {
            start,
            start_inclusive,
            end,
            end_inclusive,
        })
    }

    /// Replaces the upper bound.
    ///
    /// # Errors
    /// Returns [`LanguageError::Version`] when `ceiling` is not a version.
    pub fn change_ceiling(&mut self, ceiling: &str, inclusive: bool) -> Result<(), LanguageError> {
        self.end = normalize_version(ceiling)?;
        self.end_inclusive = inclusive;
        Ok(())
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions are permitted."
    )]

    use super::*;

    /// Tests short versions and prerelease tags are accepted.
    #[test]
    fn version_strings_accept_short_forms_and_prerelease() {
        assert!(is_version_string("1"));
        assert!(is_version_string("1.2"));
        assert!(is_version_string("1.2.3-beta-1"));
        assert!(is_version_string(INFINITY));
        assert!(!is_version_string("1.2.3.4"));
        assert!(!is_version_string("1..2"));
        assert!(!is_version_string("v1"));
        assert!(!is_version_string("1.2-BETA"));
    }

    /// Tests a bare version is an open-ended lower bound.
    #[test]
    fn single_version_means_open_ended_range() {
        let range = VersionRange::parse("1.2").unwrap();
        assert_eq!(range.expression(), "[1.2.0,INFINITY)");
        assert!(range.is_within_range("1.2.0").unwrap());
        assert!(range.is_within_range("99").unwrap());
        assert!(!range.is_within_range("1.1.9").unwrap());
    }

    /// Tests an exclusive lower bound excludes its start.
    #[test]
    fn exclusive_lower_bound_excludes_start() {
        let range = VersionRange::parse("(1.0.0,2.0.0]").unwrap();
        assert!(!range.is_within_range("1.0.0").unwrap());
        assert!(range.is_within_range("1.0.1").unwrap());
        assert!(range.is_within_range("2.0.0").unwrap());
        assert!(!range.is_within_range("2.0.1").unwrap());
    }

    /// Tests malformed ranges are rejected.
    #[test]
    fn malformed_ranges_are_rejected() {
        for bad in ["", "[1.0.0,2.0.0", "[1.0.0]", "[1.0.0,2.0.0,3.0.0)", "[a,b)", "[1.0.0, 2.0.0)"] {
            assert!(VersionRange::parse(bad).is_err(), "{bad} should be rejected");
        }
        assert_eq!(
            VersionRange::parse("").unwrap_err().to_string(),
            "Empty string is not a valid version."
        );
    }

    /// Tests intersecting ranges keeps the tightest bounds.
    #[test]
    fn intersection_keeps_tightest_bounds() {
        let left = VersionRange::parse("[1.0.0,3.0.0)").unwrap();
        let right = VersionRange::parse("(2.0.0,INFINITY)").unwrap();
        let both = left.intersects_with(&right).unwrap();
        assert_eq!(both.expression(), "(2.0.0,3.0.0)");

        let disjoint = VersionRange::parse("[4.0.0,5.0.0)").unwrap();
        assert_eq!(
            left.intersects_with(&disjoint).unwrap_err().to_string(),
            "No intersection found."
        );
    }

    /// Tests the ceiling can only move down.
    #[test]
    fn ceiling_can_be_lowered() {
        let mut range = VersionRange::parse("1.0.0").unwrap();
        range.change_ceiling("2", true).unwrap();
        assert_eq!(range.to_string(), "[1.0.0,2.0.0]");
        assert_eq!(range.start(), "1.0.0");
        assert_eq!(range.end(), "2.0.0");
    }

    /// Tests numeric parts order before prerelease tags.
    #[test]
    fn comparison_orders_numeric_parts_before_prerelease() {
        assert_eq!(compare_versions("1.10.0", "1.9.9").unwrap(), Ordering::Greater);
        assert_eq!(compare_versions("1.0.0", "1.0.0-rc1").unwrap(), Ordering::Less);
        assert_eq!(compare_versions(INFINITY, "100.0.0").unwrap(), Ordering::Greater);
        assert!(compare_versions("x", "1.0.0").is_err());
    }
}
