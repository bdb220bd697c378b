// crates/edge-policy-core/tests/support/mod.rs
// ============================================================================
// Module: Policy Test Support
// Description: Result alias and document decoding for policy model tests.
// ============================================================================
//! ## Overview
//! Policy tests decode their documents from JSON literals and return
//! [`TestResult`] so policy and decode errors propagate through `?`.

use std::error::Error;

use serde::de::DeserializeOwned;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Result of a policy model test.
pub type TestResult<T = ()> = Result<T, Box<dyn Error>>;

/// Fails the test with `message` unless `holds`.
///
/// # Errors
/// Returns `message` as the test error when `holds` is false.
pub fn ensure(holds: bool, message: impl Into<String>) -> TestResult {
    if holds {
        return Ok(());
    }
    let message: String = message.into();
    Err(message.into())
}

/// Decodes a policy document from a JSON literal.
///
/// # Errors
/// Returns the decode error naming the document kind.
pub fn document<T: DeserializeOwned>(kind: &str, json: &str) -> TestResult<T> {
    serde_json::from_str(json).map_err(|err| format!("{kind} does not decode: {err}").into())
}
