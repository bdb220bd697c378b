// crates/constraint-logic/src/lib.rs
// ============================================================================
// Module: Constraint Logic
// Description: Pluggable constraint languages and version range evaluation.
// Purpose: Turn author-facing constraint strings into typed expression trees.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Constraint logic parses the human-readable constraint strings attached to
//! node, service and deployment policies. Parsing is delegated to a
//! [`ConstraintLanguage`] strategy selected through an explicit
//! [`LanguageRegistry`]; the crate ships one grammar, [`TextLanguage`].
//! Invariants:
//! - Registries are values owned by the caller; there is no process-wide state.
//! - Every parsed constraint is a complete [`Expression`] tree whose leaves
//!   passed operator/value checks.
//!
//! The [`version`] module provides the semantic version and version range
//! evaluator shared by the text grammar and the policy engine.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod ast;
pub mod error;
pub mod registry;
pub mod text;
pub mod version;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use ast::Comparison;
pub use ast::ComparisonOp;
pub use ast::Expression;
pub use ast::Literal;
pub use error::LanguageError;
pub use registry::ConstraintLanguage;
pub use registry::LanguageRegistry;
pub use text::TEXT_LANGUAGE_NAME;
pub use text::TextLanguage;
pub use version::VersionRange;
