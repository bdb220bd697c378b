// crates/edge-policy-core/src/error.rs
// ============================================================================
// Module: Policy Errors
// Description: Error kinds raised by the property and policy model.
// Purpose: Let callers tell validation, merge, and conversion failures apart.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! [`PolicyError`] carries a human-readable detail string per kind. The
//! compatibility checker maps these kinds onto its own numeric error codes.

use thiserror::Error;

/// Errors raised by the policy model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// A property, constraint, or document failed validation.
    #[error("{0}")]
    Validation(String),
    /// A property name already exists in the target list.
    #[error("{0}")]
    Duplicate(String),
    /// Text could not be parsed.
    #[error("{0}")]
    Parse(String),
    /// Two documents declare conflicting values for one property.
    #[error("{0}")]
    Merge(String),
    /// A document could not be converted into the internal policy form.
    #[error("{0}")]
    Conversion(String),
    /// A set of properties does not satisfy a requirement.
    #[error("{0}")]
    Unsatisfied(String),
}
