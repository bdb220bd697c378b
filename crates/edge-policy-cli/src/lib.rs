// crates/edge-policy-cli/src/lib.rs
// ============================================================================
// Module: Edge Policy CLI Library
// Description: Shared helpers for the edge-policy binary.
// Purpose: Expose the message catalog and offline collaborators to tests.
// Dependencies: edge-policy-compcheck, edge-policy-core
// ============================================================================

//! ## Overview
//! Library half of the `edge-policy` binary: the message catalog behind the
//! [`t!`] macro and the collaborators used for checks run from files.

pub mod i18n;
pub mod offline;

pub use offline::OfflineCollaborators;
