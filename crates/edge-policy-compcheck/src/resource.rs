// crates/edge-policy-compcheck/src/resource.rs
// ============================================================================
// Module: Check Envelopes
// Description: JSON input and output documents of the compatibility checks.
// Purpose: Fix the field names external callers exchange with the checker.
// Dependencies: edge-policy-core, serde
// ============================================================================

//! ## Overview
//! [`PolicyCheck`], [`UserInputCheck`], [`SecretBindingCheck`] and the
//! combined [`CompCheck`] are what callers submit;
//! [`CompCheckOutput`] is what they get back. The output echoes every
//! resource the check resolved in [`CompCheckResource`] so a caller can
//! re-run a narrower check without repeating lookups.

use std::collections::BTreeMap;

use edge_policy_core::BusinessPolicy;
use edge_policy_core::ExternalPolicy;
use edge_policy_core::Pattern;
use edge_policy_core::SecretBinding;
use edge_policy_core::ServiceFile;
use edge_policy_core::UserInput;
use serde::Deserialize;
use serde::Serialize;

use crate::collaborators::ServiceMap;

// ============================================================================
// SECTION: Reason Texts
// ============================================================================

/// Reason recorded for a compatible service.
pub const COMPATIBLE: &str = "Compatible";
/// Prefix for a policy mismatch.
pub const POLICY_INCOMPATIBLE: &str = "Policy Incompatible";
/// Prefix for a user input mismatch.
pub const USER_INPUT_INCOMPATIBLE: &str = "User Input Incompatible";
/// Prefix for a secret binding mismatch.
pub const SECRET_BINDING_INCOMPATIBLE: &str = "Secret Binding Incompatible";
/// Prefix for a node type and service type mismatch.
pub const TYPE_INCOMPATIBLE: &str = "Type Incompatible";
/// Reason key used when no service could be checked.
pub const GENERAL_REASON_KEY: &str = "general";
/// Service policy key for a policy supplied with the input.
pub const ALL_SERVICES_KEY: &str = "AllServices";

/// Prefixes `reason` with the type prefix for a type mismatch and with
/// `message_prefix` otherwise.
#[must_use]
pub fn format_reason_message(reason: &str, type_error: bool, message_prefix: &str) -> String {
    let prefix = if type_error { TYPE_INCOMPATIBLE } else { message_prefix };
    format!("{prefix}: {reason}")
}

// ============================================================================
// SECTION: Inputs
// ============================================================================

/// Input of the policy compatibility check.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PolicyCheck {
    /// Node id, `org/id`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_id: String,
    /// Node architecture.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_arch: String,
    /// Node type; may be omitted when `node_id` is given.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_type: String,
    /// Node policy; looked up by `node_id` when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_policy: Option<ExternalPolicy>,
    /// Deployment policy id, `org/id`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub business_policy_id: String,
    /// Deployment policy; looked up by id when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_policy: Option<BusinessPolicy>,
    /// Service policy applied to every service of the deployment policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_policy: Option<ExternalPolicy>,
    /// Top level services not yet in the exchange.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service: Vec<ServiceFile>,
    /// Known dependency services keyed by id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependent_services: ServiceMap,
}

/// Input of the user input check.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserInputCheck {
    /// Node id, `org/id`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_id: String,
    /// Node architecture.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_arch: String,
    /// Node type; may be omitted when `node_id` is given.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_type: String,
    /// Node variable values; taken from the node record when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_user_input: Option<Vec<UserInput>>,
    /// Deployment policy id, `org/id`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub business_policy_id: String,
    /// Deployment policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_policy: Option<BusinessPolicy>,
    /// Pattern id, `org/id`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pattern_id: String,
    /// Pattern.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<Pattern>,
    /// Top level services not yet in the exchange.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service: Vec<ServiceFile>,
    /// Service ids to check; empty checks every service.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service_to_check: Vec<String>,
    /// Known dependency services keyed by id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependent_services: ServiceMap,
}

/// Input of the secret binding check.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SecretBindingCheck {
    /// Node id, `org/id`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_id: String,
    /// Node architecture.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_arch: String,
    /// Node type; may be omitted when `node_id` is given.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_type: String,
    /// Node organization; may be omitted when `node_id` is given.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_org: String,
    /// Deployment policy id, `org/id`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub business_policy_id: String,
    /// Deployment policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_policy: Option<BusinessPolicy>,
    /// Pattern id, `org/id`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pattern_id: String,
    /// Pattern.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<Pattern>,
    /// Top level services not yet in the exchange.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service: Vec<ServiceFile>,
    /// Service ids to check; empty checks every service.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service_to_check: Vec<String>,
    /// Known dependency services keyed by id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependent_services: ServiceMap,
}

/// Input of the combined deployment check.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompCheck {
    /// Node id, `org/id`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_id: String,
    /// Node architecture.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_arch: String,
    /// Node type; may be omitted when `node_id` is given.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_type: String,
    /// Node organization; may be omitted when `node_id` is given.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_org: String,
    /// Node policy; looked up by `node_id` when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_policy: Option<ExternalPolicy>,
    /// Node variable values; taken from the node record when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_user_input: Option<Vec<UserInput>>,
    /// Deployment policy id, `org/id`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub business_policy_id: String,
    /// Deployment policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_policy: Option<BusinessPolicy>,
    /// Pattern id, `org/id`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pattern_id: String,
    /// Pattern.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<Pattern>,
    /// Service policy applied to every service of the deployment policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_policy: Option<ExternalPolicy>,
    /// Top level services not yet in the exchange.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service: Vec<ServiceFile>,
}

impl CompCheck {
    /// Returns the policy check part of this input.
    #[must_use]
    pub fn to_policy_check(&self) -> PolicyCheck {
        PolicyCheck {
            node_id: self.node_id.clone(),
            node_arch: self.node_arch.clone(),
            node_type: self.node_type.clone(),
            node_policy: self.node_policy.clone(),
            business_policy_id: self.business_policy_id.clone(),
            business_policy: self.business_policy.clone(),
            service_policy: self.service_policy.clone(),
            service: self.service.clone(),
            dependent_services: ServiceMap::new(),
        }
    }
}

// ============================================================================
// SECTION: Output
// ============================================================================

/// Every resource a check resolved.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompCheckResource {
    /// Node id.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_id: String,
    /// Node architecture.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_arch: String,
    /// Node type.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_type: String,
    /// Node organization.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_org: String,
    /// Node policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_policy: Option<ExternalPolicy>,
    /// Node variable values.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_user_input: Vec<UserInput>,
    /// Deployment policy id.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub business_policy_id: String,
    /// Deployment policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_policy: Option<BusinessPolicy>,
    /// Pattern id.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pattern_id: String,
    /// Pattern.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<Pattern>,
    /// Service policies keyed by service id, or [`ALL_SERVICES_KEY`].
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub service_policy: BTreeMap<String, ExternalPolicy>,
    /// Top level services.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service: Vec<ServiceFile>,
    /// Dependency services keyed by id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependent_services: ServiceMap,
    /// Secret bindings some service needs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub needed_secret_binding: Vec<SecretBinding>,
    /// Secret bindings no service needs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extraneous_secret_binding: Vec<SecretBinding>,
}

impl CompCheckResource {
    /// Seeds the resource from a policy check input.
    #[must_use]
    pub fn from_policy_check(input: &PolicyCheck) -> Self {
        let mut service_policy = BTreeMap::new();
        if let Some(policy) = &input.service_policy {
            service_policy.insert(ALL_SERVICES_KEY.to_string(), policy.clone());
        }
        Self {
            node_id: input.node_id.clone(),
            node_arch: input.node_arch.clone(),
            node_type: input.node_type.clone(),
            node_policy: input.node_policy.clone(),
            business_policy_id: input.business_policy_id.clone(),
            business_policy: input.business_policy.clone(),
            service_policy,
            service: input.service.clone(),
            dependent_services: input.dependent_services.clone(),
            ..Self::default()
        }
    }

    /// Seeds the resource from a user input check input.
    #[must_use]
    pub fn from_user_input_check(input: &UserInputCheck) -> Self {
        Self {
            node_id: input.node_id.clone(),
            node_arch: input.node_arch.clone(),
            node_type: input.node_type.clone(),
            node_user_input: input.node_user_input.clone().unwrap_or_default(),
            business_policy_id: input.business_policy_id.clone(),
            business_policy: input.business_policy.clone(),
            pattern_id: input.pattern_id.clone(),
            pattern: input.pattern.clone(),
            service: input.service.clone(),
            dependent_services: input.dependent_services.clone(),
            ..Self::default()
        }
    }

    /// Seeds the resource from a secret binding check input.
    #[must_use]
    pub fn from_secret_binding_check(input: &SecretBindingCheck) -> Self {
        Self {
            node_id: input.node_id.clone(),
            node_arch: input.node_arch.clone(),
            node_type: input.node_type.clone(),
            node_org: input.node_org.clone(),
            business_policy_id: input.business_policy_id.clone(),
            business_policy: input.business_policy.clone(),
            pattern_id: input.pattern_id.clone(),
            pattern: input.pattern.clone(),
            service: input.service.clone(),
            dependent_services: input.dependent_services.clone(),
            ..Self::default()
        }
    }
}

/// Result of a compatibility check.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompCheckOutput {
    /// Whether the check passed overall.
    pub compatible: bool,
    /// Verdict per service id, plus [`GENERAL_REASON_KEY`] when no service
    /// was checked.
    #[serde(default)]
    pub reason: BTreeMap<String, String>,
    /// Resources the check resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<CompCheckResource>,
}

impl CompCheckOutput {
    /// Creates an output.
    #[must_use]
    pub const fn new(compatible: bool, reason: BTreeMap<String, String>, input: CompCheckResource) -> Self {
        Self {
            compatible,
            reason,
            input: Some(input),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
