// crates/edge-policy-compcheck/src/lib.rs
// ============================================================================
// Module: Edge Policy Compcheck
// Description: Node, deployment and service compatibility checks.
// Purpose: Decide whether a deployment can run on a node before it is placed.
// Dependencies: constraint-logic, edge-policy-config, edge-policy-core, tracing
// ============================================================================

//! ## Overview
//! The policy check evaluates a node policy against a deployment policy
//! merged with each service's policy. The user input check verifies that
//! the deployment and the node together set every variable a service
//! declares. The secret binding check verifies that every secret a service
//! declares is bound to a secret store name, and splits the bindings into
//! needed and extraneous parts. The deployment check runs them in sequence
//! and combines the verdicts.
//! Invariants:
//! - Results carry a verdict per service id, plus `general` for messages
//!   about the check as a whole.
//! - Lookups go through [`Collaborators`]; nothing here performs I/O.
//! - Errors carry a stable numeric code, see [`CompCheckError::code`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod checker;
pub mod collaborators;
pub mod deploy;
pub mod deployment;
pub mod error;
pub mod node;
pub mod policy_check;
pub mod privilege;
pub mod resource;
pub mod secret_binding;
pub mod services;
pub mod userinput;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use checker::CheckerConfig;
pub use checker::CompatibilityChecker;
pub use collaborators::Collaborators;
pub use collaborators::ExchangeError;
pub use collaborators::ExchangeNode;
pub use collaborators::ResolvedService;
pub use collaborators::ServiceMap;
pub use error::CompCheckError;
pub use resource::CompCheck;
pub use resource::CompCheckOutput;
pub use resource::CompCheckResource;
pub use resource::PolicyCheck;
pub use resource::SecretBindingCheck;
pub use resource::UserInputCheck;
pub use secret_binding::IndexMap;
pub use services::ServiceClosure;
pub use services::ServiceSpec;
