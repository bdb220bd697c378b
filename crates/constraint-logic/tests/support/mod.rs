// crates/constraint-logic/tests/support/mod.rs
// ============================================================================
// Module: Grammar Test Support
// Description: Result alias and constraint list builders for grammar tests.
// ============================================================================
//! ## Overview
//! Grammar tests return [`TestResult`] so a failed parse surfaces its
//! [`constraint_logic::LanguageError`] text through `?`.

use std::error::Error;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Result of a grammar test; parse errors convert through `?`.
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

/// Owned constraint strings, as a policy document carries them.
pub fn constraints(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| (*item).to_string()).collect()
}
