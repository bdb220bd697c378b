// crates/edge-policy-compcheck/src/collaborators.rs
// ============================================================================
// Module: Checker Collaborators
// Description: Lookups the checker delegates to the caller.
// Purpose: Keep exchange and secret store access out of the evaluation.
// Dependencies: edge-policy-core, serde, thiserror
// ============================================================================

//! ## Overview
//! The checker never performs I/O itself. Node, policy, pattern and service
//! records, plus secret existence, come from a [`Collaborators`]
//! implementation supplied per call. Calls are made serially within one
//! check; implementations own any retry or timeout policy.
//!
//! Security posture: everything returned here is untrusted and is validated
//! before it is evaluated.

use std::collections::BTreeMap;

use edge_policy_core::BusinessPolicy;
use edge_policy_core::ExchangeServiceDefinition;
use edge_policy_core::ExternalPolicy;
use edge_policy_core::Pattern;
use edge_policy_core::UserInput;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Records
// ============================================================================

/// Service records keyed by `org/id`.
pub type ServiceMap = BTreeMap<String, ExchangeServiceDefinition>;

/// Node record as registered in the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeNode {
    /// Node name.
    #[serde(default)]
    pub name: String,
    /// Hardware architecture; empty before registration completes.
    #[serde(default)]
    pub arch: String,
    /// `device` or `cluster`; empty for older records.
    #[serde(default)]
    pub node_type: String,
    /// Pattern the node is registered with, if any.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pattern: String,
    /// Service variable values set on the node.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_input: Vec<UserInput>,
}

/// A top level service with its full dependency closure.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolvedService {
    /// Exchange id of the top level service.
    pub id: String,
    /// The top level service.
    pub definition: ExchangeServiceDefinition,
    /// Every dependency, direct or transitive.
    pub dependencies: ServiceMap,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// A collaborator lookup failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ExchangeError(pub String);

// ============================================================================
// SECTION: Collaborators
// ============================================================================

/// Lookups the checker needs from the outside world.
pub trait Collaborators {
    /// Returns the node registered as `node_id` (`org/id`), if any.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError`] when the lookup fails.
    fn get_device(&self, node_id: &str) -> Result<Option<ExchangeNode>, ExchangeError>;

    /// Returns the policy of node `node_id`, if it has one.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError`] when the lookup fails.
    fn node_policy(&self, node_id: &str) -> Result<Option<ExternalPolicy>, ExchangeError>;

    /// Returns deployment policies of `org` keyed by `org/id`; `id` narrows
    /// the result to one policy.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError`] when the lookup fails.
    fn business_policies(
        &self,
        org: &str,
        id: &str,
    ) -> Result<BTreeMap<String, BusinessPolicy>, ExchangeError>;

    /// Returns patterns of `org` keyed by `org/id`; `id` narrows the result
    /// to one pattern.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError`] when the lookup fails.
    fn patterns(&self, org: &str, id: &str) -> Result<BTreeMap<String, Pattern>, ExchangeError>;

    /// Returns the policy attached to a service, if any, with the service id.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError`] when the lookup fails.
    fn service_policy(
        &self,
        url: &str,
        org: &str,
        version: &str,
        arch: &str,
    ) -> Result<(Option<ExternalPolicy>, String), ExchangeError>;

    /// Resolves a service and its dependency closure. `version` may be a
    /// single version or a version range.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError`] when the service or a dependency is missing.
    fn resolve_service(
        &self,
        url: &str,
        org: &str,
        version: &str,
        arch: &str,
    ) -> Result<ResolvedService, ExchangeError>;

    /// Returns the services matching url, org and version; an empty `arch`
    /// selects every architecture.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError`] when the lookup fails.
    fn selected_services(
        &self,
        url: &str,
        org: &str,
        version: &str,
        arch: &str,
    ) -> Result<ServiceMap, ExchangeError>;

    /// Returns whether a secret exists in the secret store behind
    /// `agbot_url`. `user` is empty for an organization secret.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError`] when the store cannot be queried.
    fn vault_secret_exists(
        &self,
        agbot_url: &str,
        org: &str,
        user: &str,
        name: &str,
    ) -> Result<bool, ExchangeError>;
}
