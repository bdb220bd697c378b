// crates/edge-policy-core/src/pattern.rs
// ============================================================================
// Module: Deployment Patterns
// Description: Pattern documents listing the services a node group runs.
// Purpose: Give pattern based deployments the same workload view as policies.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`Pattern`] lists services explicitly instead of selecting nodes with
//! constraints. The secret binding check accepts either a pattern or a
//! deployment policy; both expose their requested service versions as
//! [`Workload`]s.

use serde::Deserialize;
use serde::Serialize;

use crate::business::WorkloadChoice;
use crate::policy::AgreementProtocolList;
use crate::policy::NodeHealth;
use crate::policy::UserInput;
use crate::policy::Workload;
use crate::secret::SecretBinding;

/// One service of a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceReference {
    /// Service url.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_url: String,
    /// Service organization.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_orgid: String,
    /// Service architecture; empty or `*` for any.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_arch: String,
    /// Versions in rollback order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service_versions: Vec<WorkloadChoice>,
    /// Node health thresholds.
    #[serde(rename = "nodeHealth", default)]
    pub node_health: NodeHealth,
    /// Started without an agreement.
    #[serde(default)]
    pub agreement_less: bool,
}

/// Pattern document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pattern {
    /// Record owner.
    #[serde(default)]
    pub owner: String,
    /// Display label.
    #[serde(default)]
    pub label: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Whether the pattern is public.
    #[serde(default)]
    pub public: bool,
    /// The services.
    #[serde(default)]
    pub services: Vec<ServiceReference>,
    /// Supported agreement protocols.
    #[serde(default)]
    pub agreement_protocols: AgreementProtocolList,
    /// Service variable values.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_input: Vec<UserInput>,
    /// Secret bindings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secret_binding: Vec<SecretBinding>,
}

impl Pattern {
    /// Returns one workload per service version.
    #[must_use]
    pub fn workloads(&self) -> Vec<Workload> {
        self.services
            .iter()
            .flat_map(|service| {
                service.service_versions.iter().map(|choice| {
                    let mut workload =
                        Workload::new(&service.service_url, &service.service_orgid, &choice.version, &service.service_arch);
                    workload.priority = choice.priority;
                    workload
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions are permitted."
    )]

    use super::*;

    /// Tests pattern services flatten into workloads.
    #[test]
    fn pattern_services_flatten_into_workloads() {
        let pattern: Pattern = serde_json::from_str(
            r#"{
                "label": "p", "services": [
                    {"serviceUrl": "a", "serviceOrgid": "o", "serviceArch": "amd64",
                     "serviceVersions": [{"version": "1.0.0"}, {"version": "1.1.0"}]},
                    {"serviceUrl": "b", "serviceOrgid": "o", "serviceArch": "arm64",
                     "serviceVersions": [{"version": "2.0.0"}]}
                ],
                "agreementProtocols": [{"name": "Basic"}],
                "secretBinding": [{"serviceOrgid": "o", "serviceUrl": "a", "secrets": []}]
            }"#,
        )
        .unwrap();
        let workloads = pattern.workloads();
        assert_eq!(workloads.len(), 3);
        assert_eq!(workloads[2].workload_url, "b");
        assert_eq!(workloads[2].arch, "arm64");
        assert_eq!(pattern.secret_binding.len(), 1);
    }
}
