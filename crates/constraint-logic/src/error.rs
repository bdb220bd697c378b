// crates/constraint-logic/src/error.rs
// ============================================================================
// Module: Constraint Language Errors
// Description: Error type shared by grammars, the registry, and version ranges.
// Purpose: Report parse failures with the offending fragment.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! A single error enum covers the three failure surfaces of this crate.
//! Messages are complete sentences and are surfaced verbatim by the policy
//! engine, so they name the fragment that failed.

use thiserror::Error;

/// Errors raised while parsing or selecting a constraint language.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LanguageError {
    /// A constraint string failed to parse or validate.
    #[error("{0}")]
    Parse(String),
    /// Language registration or selection failed.
    #[error("{0}")]
    Registry(String),
    /// A version or version range expression is malformed.
    #[error("{0}")]
    Version(String),
}
