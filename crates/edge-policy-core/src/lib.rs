// crates/edge-policy-core/src/lib.rs
// ============================================================================
// Module: Edge Policy Core
// Description: Property, constraint and policy model for edge deployments.
// Purpose: Evaluate and merge node, service and deployment policies.
// Dependencies: bigdecimal, constraint-logic, regex, serde, serde_json, tracing
// ============================================================================

//! ## Overview
//! Edge policy core holds the documents exchanged between nodes, services
//! and deployments, and the rules for evaluating them against each other.
//! Invariants:
//! - Property values are a closed union; comparisons match on it exhaustively.
//! - Constraint strings are parsed through an explicit [`ConstraintEngine`];
//!   there is no process-wide language registration.
//! - Merges return new documents and never downgrade a granted privilege.
//!
//! Evaluation is pure: nothing here performs I/O or holds state across calls.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod builtin;
pub mod business;
pub mod constraint;
pub mod error;
pub mod external;
pub mod pattern;
pub mod policy;
pub mod property;
pub mod required;
pub mod secret;
pub mod service;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use builtin::NodeResources;
pub use business::BusinessPolicy;
pub use business::ServiceRef;
pub use business::WorkloadChoice;
pub use constraint::ConstraintEngine;
pub use constraint::ConstraintExpression;
pub use error::PolicyError;
pub use external::ExternalPolicy;
pub use pattern::Pattern;
pub use policy::Input;
pub use policy::Policy;
pub use policy::PolicyCompError;
pub use policy::UserInput;
pub use policy::Workload;
pub use property::Property;
pub use property::PropertyList;
pub use property::PropertyType;
pub use property::PropertyValue;
pub use required::PropertyExpression;
pub use required::RequiredProperty;
pub use required::RequirementNode;
pub use secret::BoundSecret;
pub use secret::SecretBinding;
pub use secret::VaultSecretName;
pub use service::ExchangeService;
pub use service::ExchangeServiceDefinition;
pub use service::ServiceDefinition;
pub use service::ServiceDependency;
pub use service::ServiceFile;
pub use service::ServiceType;
