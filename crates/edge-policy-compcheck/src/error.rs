// crates/edge-policy-compcheck/src/error.rs
// ============================================================================
// Module: Compatibility Check Errors
// Description: Coded error kinds returned by the compatibility checker.
// Purpose: Let callers tell bad input from upstream and document failures.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Every checker failure is a [`CompCheckError`] whose numeric code is part
//! of the wire contract. An incompatible service is not an error; it is an
//! entry in the output reason map.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Code for [`CompCheckError::Input`].
pub const INPUT_ERROR_CODE: u16 = 10;
/// Code for [`CompCheckError::Validation`].
pub const VALIDATION_ERROR_CODE: u16 = 11;
/// Code for [`CompCheckError::Conversion`].
pub const CONVERSION_ERROR_CODE: u16 = 12;
/// Code for [`CompCheckError::Merging`].
pub const MERGING_ERROR_CODE: u16 = 13;
/// Code for [`CompCheckError::Exchange`].
pub const EXCHANGE_ERROR_CODE: u16 = 14;
/// Code for [`CompCheckError::General`].
pub const GENERAL_ERROR_CODE: u16 = 15;

/// Compatibility checker failures.
///
/// # Invariants
/// - Variants and their codes are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompCheckError {
    /// Missing, contradictory or malformed caller input.
    #[error("{0}")]
    Input(String),
    /// A document failed validation.
    #[error("{0}")]
    Validation(String),
    /// A document could not be converted to the internal policy form.
    #[error("{0}")]
    Conversion(String),
    /// Two documents declare conflicting property values.
    #[error("{0}")]
    Merging(String),
    /// A collaborator lookup failed.
    #[error("{0}")]
    Exchange(String),
    /// Anything else.
    #[error("{0}")]
    General(String),
}

/// Wire form of a [`CompCheckError`].
#[derive(Debug, Serialize)]
struct WireError<'a> {
    /// Error text.
    error: &'a str,
    /// Numeric code.
    error_code: u16,
}

impl CompCheckError {
    /// Returns the stable numeric code.
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            Self::Input(_) => INPUT_ERROR_CODE,
            Self::Validation(_) => VALIDATION_ERROR_CODE,
            Self::Conversion(_) => CONVERSION_ERROR_CODE,
            Self::Merging(_) => MERGING_ERROR_CODE,
            Self::Exchange(_) => EXCHANGE_ERROR_CODE,
            Self::General(_) => GENERAL_ERROR_CODE,
        }
    }

    /// Returns the detail text.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Input(message)
            | Self::Validation(message)
            | Self::Conversion(message)
            | Self::Merging(message)
            | Self::Exchange(message)
            | Self::General(message) => message,
        }
    }

    /// Returns `{"error": "...", "error_code": N}`.
    #[must_use]
    pub fn to_wire(&self) -> Value {
        serde_json::to_value(WireError {
            error: self.message(),
            error_code: self.code(),
        })
        .unwrap_or(Value::Null)
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

    use serde_json::json;

    use super::*;

    /// Tests codes follow declaration order.
    #[test]
    fn codes_follow_declaration_order() {
        let errors = [
            CompCheckError::Input(String::new()),
            CompCheckError::Validation(String::new()),
            CompCheckError::Conversion(String::new()),
            CompCheckError::Merging(String::new()),
            CompCheckError::Exchange(String::new()),
            CompCheckError::General(String::new()),
        ];
        let codes: Vec<u16> = errors.iter().map(CompCheckError::code).collect();
        assert_eq!(codes, vec![10, 11, 12, 13, 14, 15]);
    }

    /// Tests the wire shape.
    #[test]
    fn wire_shape() {
        let err = CompCheckError::Exchange("lookup failed".to_string());
        assert_eq!(err.to_wire(), json!({"error": "lookup failed", "error_code": 14}));
        assert_eq!(err.to_string(), "lookup failed");
    }
}
