// crates/edge-policy-core/src/business.rs
// ============================================================================
// Module: Deployment Policy
// Description: User-authored deployment (business) policy documents.
// Purpose: Validate deployment policies and convert them to internal policies.
// Dependencies: serde, tracing
// ============================================================================

//! ## Overview
//! A [`BusinessPolicy`] names one service, the versions to roll through, and
//! the properties and constraints used to select nodes. Conversion with
//! [`BusinessPolicy::to_policy`] yields one workload per listed version.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::constraint::ConstraintEngine;
use crate::constraint::ConstraintExpression;
use crate::error::PolicyError;
use crate::external::normalize_privileged;
use crate::policy::AgreementProtocol;
use crate::policy::BASIC_PROTOCOL;
use crate::policy::NodeHealth;
use crate::policy::Policy;
use crate::policy::UserInput;
use crate::policy::Workload;
use crate::policy::WorkloadPriority;
use crate::property::PropertyList;
use crate::secret::SecretBinding;

/// Agreement limit of generated policies; 0 is unlimited.
const DEFAULT_MAX_AGREEMENT: i64 = 0;

// ============================================================================
// SECTION: Service Reference
// ============================================================================

/// When and how a version upgrade happens.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UpgradePolicy {
    /// `immediate`, `never` or `agreement`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub lifecycle: String,
    /// Upgrade time.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub time: String,
}

/// One version of the service with its rollback priority.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkloadChoice {
    /// Service version.
    #[serde(default)]
    pub version: String,
    /// Rollback priority.
    #[serde(default)]
    pub priority: WorkloadPriority,
    /// Upgrade policy.
    #[serde(rename = "upgradePolicy", default)]
    pub upgrade_policy: UpgradePolicy,
}

/// The service a deployment policy deploys.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRef {
    /// Service url.
    pub name: String,
    /// Service organization.
    #[serde(default)]
    pub org: String,
    /// Service architecture; empty or `*` for any.
    #[serde(default)]
    pub arch: String,
    /// Namespace cluster services deploy to.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster_namespace: String,
    /// Versions in rollback order.
    #[serde(default)]
    pub service_versions: Vec<WorkloadChoice>,
    /// Node health thresholds.
    #[serde(rename = "nodeHealth", default)]
    pub node_health: NodeHealth,
}

impl ServiceRef {
    /// Checks identity and version priorities.
    ///
    /// # Errors
    /// Returns [`PolicyError::Validation`] for a missing name or org, no
    /// versions, or inconsistent retry settings.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.name.is_empty() || self.org.is_empty() {
            return Err(PolicyError::Validation("Name, or Org is empty string.".to_string()));
        }
        if self.service_versions.is_empty() {
            return Err(PolicyError::Validation("The serviceVersions array is empty.".to_string()));
        }
        for choice in &self.service_versions {
            let priority = &choice.priority;
            if priority.priority_value != 0 && (priority.retry_durations == 0 || priority.retries == 0) {
                return Err(PolicyError::Validation(
                    "retry_durations and retries cannot be zero if priority_value is set to non-zero \
                     value"
                        .to_string(),
                ));
            }
            if priority.priority_value == 0
                && (priority.retry_durations != 0 || priority.retries != 0 || priority.verified_durations != 0)
            {
                return Err(PolicyError::Validation(
                    "retry_durations, retries and verified_durations cannot be non-zero value if \
                     priority_value is zero or not set"
                        .to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Display for ServiceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let versions: Vec<&str> = self.service_versions.iter().map(|choice| choice.version.as_str()).collect();
        write!(
            f,
            "Name: {}, Org: {}, Arch: {}, ClusterNamespace: {}, ServiceVersions: [{}]",
            self.name,
            self.org,
            self.arch,
            self.cluster_namespace,
            versions.join(", ")
        )
    }
}

// ============================================================================
// SECTION: Business Policy
// ============================================================================

/// Deployment policy document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessPolicy {
    /// Record owner.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub owner: String,
    /// Display label.
    #[serde(default)]
    pub label: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// The deployed service.
    pub service: ServiceRef,
    /// Properties offered to nodes.
    #[serde(default, skip_serializing_if = "PropertyList::is_empty")]
    pub properties: PropertyList,
    /// Requirements on nodes.
    #[serde(default, skip_serializing_if = "ConstraintExpression::is_empty")]
    pub constraints: ConstraintExpression,
    /// Service variable values.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_input: Vec<UserInput>,
    /// Secret bindings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secret_binding: Vec<SecretBinding>,
}

impl BusinessPolicy {
    /// Validates the document, normalizing the privilege property.
    ///
    /// # Errors
    /// Returns [`PolicyError::Validation`] for an invalid service reference,
    /// property, privilege value or constraint.
    pub fn validate(&mut self, engine: &ConstraintEngine) -> Result<(), PolicyError> {
        self.service.validate()?;
        if !self.properties.is_empty()
            && let Err(err) = self.properties.validate()
        {
            return Err(PolicyError::Validation(format!(
                "properties contains an invalid property: {err}"
            )));
        }
        normalize_privileged(&mut self.properties)?;
        self.constraints.validate(engine)
    }

    /// Returns true when no constraint has content.
    #[must_use]
    pub fn has_no_constraints(&self) -> bool {
        self.constraints.as_slice().iter().all(|constraint| constraint.trim().is_empty())
    }

    /// Returns one workload per service version.
    #[must_use]
    pub fn workloads(&self) -> Vec<Workload> {
        self.service
            .service_versions
            .iter()
            .map(|choice| {
                let mut workload =
                    Workload::new(&self.service.name, &self.service.org, &choice.version, &self.service.arch);
                workload.priority = choice.priority;
                workload
            })
            .collect()
    }

    /// Converts the document into an internal policy named `name`.
    ///
    /// # Errors
    /// Returns [`PolicyError::Validation`] when validation fails,
    /// [`PolicyError::Conversion`] for an empty workload version, and the
    /// property error raised while copying properties.
    pub fn to_policy(&self, name: &str, engine: &ConstraintEngine) -> Result<Policy, PolicyError> {
        let mut validated = self.clone();
        validated.validate(engine).map_err(|err| {
            PolicyError::Validation(format!("Failed to validate the business policy: {err}"))
        })?;

        let service = &validated.service;
        let mut policy = Policy::new(name);
        for choice in &service.service_versions {
            if choice.version.is_empty() {
                return Err(PolicyError::Conversion(format!(
                    "The version for service {} arch {} is empty in the business policy for {name}",
                    service.name, service.arch
                )));
            }
        }
        policy.workloads = validated.workloads();
        for property in &validated.properties {
            policy.add_property(property.clone(), false).map_err(|err| {
                PolicyError::Conversion(format!(
                    "error trying add external policy property {property} to policy. {err}"
                ))
            })?;
        }
        policy.constraints = validated.constraints.clone();
        policy.node_health = service.node_health;
        policy.max_agreements = DEFAULT_MAX_AGREEMENT;
        policy.add_agreement_protocol(AgreementProtocol::new(BASIC_PROTOCOL))?;
        policy.user_input.clone_from(&validated.user_input);
        policy.secret_binding.clone_from(&validated.secret_binding);
        policy.cluster_namespace.clone_from(&service.cluster_namespace);

        tracing::debug!(service = %service, policy = name, "converted deployment policy");
        Ok(policy)
    }
}

impl fmt::Display for BusinessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Owner: {}, Label: {}, Description: {}, Service: {}, Properties: {}, Constraints: {}",
            self.owner, self.label, self.description, self.service, self.properties, self.constraints
        )
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

    use super::*;
    use crate::builtin::PROP_SVC_PRIVILEGED;
    use crate::property::Property;
    use crate::property::PropertyValue;

    /// Parses a deployment policy from JSON.
    fn parse(json: &str) -> BusinessPolicy {
        serde_json::from_str(json).unwrap()
    }

    /// Tests conversion yields one workload per version.
    #[test]
    fn conversion_yields_one_workload_per_version() {
        let engine = ConstraintEngine::builtin();
        let policy = parse(
            r#"{
                "label": "dp", "description": "",
                "service": {
                    "name": "svc", "org": "myorg", "arch": "amd64", "clusterNamespace": "ns",
                    "serviceVersions": [
                        {"version": "1.0.0", "priority": {"priority_value": 1, "retries": 2, "retry_durations": 60}},
                        {"version": "2.0.0", "priority": {"priority_value": 2, "retries": 1, "retry_durations": 30}}
                    ],
                    "nodeHealth": {"missing_heartbeat_interval": 600}
                },
                "properties": [{"name": "p1", "value": "v1"}, {"name": "openhorizon.allowPrivileged", "value": "true"}],
                "constraints": ["a == b"],
                "secretBinding": [{"serviceOrgid": "myorg", "serviceUrl": "svc", "secrets": [{"s": "t"}]}]
            }"#,
        );
        let converted = policy.to_policy("myorg/dp", &engine).unwrap();
        assert_eq!(converted.workloads.len(), 2);
        assert_eq!(converted.workloads[1].version, "2.0.0");
        assert_eq!(converted.workloads[0].priority.retries, 2);
        assert_eq!(converted.agreement_protocols.names(), vec![BASIC_PROTOCOL]);
        assert_eq!(converted.node_health.missing_heartbeat_interval, 600);
        assert_eq!(converted.cluster_namespace, "ns");
        assert_eq!(converted.secret_binding.len(), 1);
        assert_eq!(
            converted.properties.get(PROP_SVC_PRIVILEGED).unwrap().value,
            PropertyValue::Bool(true)
        );
    }

    /// Tests service reference validation messages.
    #[test]
    fn service_reference_validation_messages() {
        let mut reference = ServiceRef {
            name: "svc".to_string(),
            ..ServiceRef::default()
        };
        assert_eq!(reference.validate().unwrap_err().to_string(), "Name, or Org is empty string.");
        reference.org = "org".to_string();
        assert_eq!(reference.validate().unwrap_err().to_string(), "The serviceVersions array is empty.");
        reference.service_versions.push(WorkloadChoice {
            version: "1.0.0".to_string(),
            priority: WorkloadPriority {
                priority_value: 0,
                retries: 1,
                ..WorkloadPriority::default()
            },
            ..WorkloadChoice::default()
        });
        assert!(reference.validate().unwrap_err().to_string().starts_with("retry_durations, retries and verified_durations"));
    }

    /// Tests empty versions fail conversion.
    #[test]
    fn empty_versions_fail_conversion() {
        let engine = ConstraintEngine::builtin();
        let policy = BusinessPolicy {
            service: ServiceRef {
                name: "svc".to_string(),
                org: "org".to_string(),
                arch: "arm".to_string(),
                service_versions: vec![WorkloadChoice::default()],
                ..ServiceRef::default()
            },
            properties: PropertyList::from(vec![Property::new("a", "1")]),
            ..BusinessPolicy::default()
        };
        let err = policy.to_policy("org/bp", &engine).unwrap_err();
        assert_eq!(
            err,
            PolicyError::Conversion(
                "The version for service svc arch arm is empty in the business policy for org/bp".to_string()
            )
        );
        assert!(policy.has_no_constraints());
    }

    /// Tests validation failures are prefixed.
    #[test]
    fn validation_failures_are_prefixed() {
        let engine = ConstraintEngine::builtin();
        let mut policy = parse(
            r#"{"label": "", "description": "", "service": {"name": "svc", "org": "o",
                "serviceVersions": [{"version": "1.0.0"}]}, "constraints": ["a =="]}"#,
        );
        let err = policy.to_policy("o/bp", &engine).unwrap_err().to_string();
        assert!(err.starts_with("Failed to validate the business policy: "), "{err}");
        policy.constraints = ConstraintExpression::default();
        assert!(policy.validate(&engine).is_ok());
    }
}
