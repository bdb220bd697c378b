// crates/edge-policy-compcheck/tests/support/mod.rs
// ============================================================================
// Module: Checker Test Support
// Description: In-memory exchange and assertion helpers for checker tests.
// Purpose: Let every check run against the same registered records.
// ============================================================================
//! ## Overview
//! [`MemoryExchange`] answers every checker lookup from maps filled by the
//! test. Services are keyed by their exchange id (`org/url_version_arch`)
//! and their dependency closure is derived from `requiredServices`.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]
#![allow(dead_code, reason = "Each test suite uses a subset of the shared helpers.")]

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::error::Error;

use constraint_logic::LanguageRegistry;
use constraint_logic::VersionRange;
use edge_policy_compcheck::CheckerConfig;
use edge_policy_compcheck::Collaborators;
use edge_policy_compcheck::CompatibilityChecker;
use edge_policy_compcheck::ExchangeError;
use edge_policy_compcheck::ExchangeNode;
use edge_policy_compcheck::ResolvedService;
use edge_policy_compcheck::ServiceMap;
use edge_policy_core::BusinessPolicy;
use edge_policy_core::ExchangeServiceDefinition;
use edge_policy_core::ExternalPolicy;
use edge_policy_core::Pattern;
use edge_policy_core::ServiceDependency;
use edge_policy_core::service::form_org_service_id;
use edge_policy_core::service::org_of;

// ============================================================================
// SECTION: Assertions
// ============================================================================

/// Result type of every integration test.
pub type TestResult<T = ()> = Result<T, Box<dyn Error>>;

/// Fails the test with `message` unless `condition` holds.
///
/// # Errors
/// Returns `message` as the error when the condition is false.
pub fn ensure(condition: bool, message: impl Into<String>) -> TestResult {
    if condition {
        Ok(())
    } else {
        let message: String = message.into();
        Err(message.into())
    }
}

/// Creates a checker with the built-in languages.
pub fn checker(check_all_services: bool, agbot_url: Option<&str>) -> CompatibilityChecker {
    CompatibilityChecker::new(
        CheckerConfig {
            check_all_services,
            agbot_url: agbot_url.map(str::to_string),
            ..CheckerConfig::default()
        },
        LanguageRegistry::builtin(),
    )
}

// ============================================================================
// SECTION: Records
// ============================================================================

/// Builds an amd64 service record of `myorg` running `deployment`.
pub fn service(url: &str, deployment: serde_json::Value) -> ExchangeServiceDefinition {
    ExchangeServiceDefinition {
        owner: "myorg/admin".to_string(),
        url: url.to_string(),
        version: "1.0.0".to_string(),
        arch: "amd64".to_string(),
        deployment: deployment.to_string(),
        ..ExchangeServiceDefinition::default()
    }
}

/// Returns `definition` requiring the amd64 `myorg` service `url`.
pub fn requiring(mut definition: ExchangeServiceDefinition, url: &str) -> ExchangeServiceDefinition {
    definition.required_services.push(ServiceDependency {
        url: url.to_string(),
        org: "myorg".to_string(),
        version_range: "[1.0.0,INFINITY)".to_string(),
        arch: "amd64".to_string(),
        ..ServiceDependency::default()
    });
    definition
}

// ============================================================================
// SECTION: Memory Exchange
// ============================================================================

/// Exchange and secret store held in memory.
#[derive(Debug, Default)]
pub struct MemoryExchange {
    /// Nodes keyed by `org/id`.
    pub nodes: BTreeMap<String, ExchangeNode>,
    /// Node policies keyed by `org/id`.
    pub node_policies: BTreeMap<String, ExternalPolicy>,
    /// Deployment policies keyed by `org/id`.
    pub business_policies: BTreeMap<String, BusinessPolicy>,
    /// Patterns keyed by `org/id`.
    pub patterns: BTreeMap<String, Pattern>,
    /// Services keyed by exchange id.
    pub services: ServiceMap,
    /// Service policies keyed by exchange id.
    pub service_policies: BTreeMap<String, ExternalPolicy>,
    /// Names present in the secret store; user secrets as `user/<user>/<name>`.
    pub secrets: BTreeSet<String>,
}

impl MemoryExchange {
    /// Registers `definition` under `myorg` and returns its exchange id.
    pub fn add_service(&mut self, definition: ExchangeServiceDefinition) -> String {
        let id = form_org_service_id("myorg", &definition.url, &definition.version, &definition.arch);
        self.services.insert(id.clone(), definition);
        id
    }

    /// Returns the services matching the lookup. `version` is either one
    /// version or a range; an empty `arch` matches every architecture.
    fn matching(&self, url: &str, org: &str, version: &str, arch: &str) -> Result<ServiceMap, ExchangeError> {
        let range = if version.starts_with(['[', '(']) {
            Some(VersionRange::parse(version).map_err(|err| ExchangeError(err.to_string()))?)
        } else {
            None
        };
        let mut found = ServiceMap::new();
        for (id, definition) in &self.services {
            if org_of(id) != org || definition.url != url || (!arch.is_empty() && definition.arch != arch) {
                continue;
            }
            let version_matches = match &range {
                Some(range) => {
                    range.is_within_range(&definition.version).map_err(|err| ExchangeError(err.to_string()))?
                }
                None => version.is_empty() || definition.version == version,
            };
            if version_matches {
                found.insert(id.clone(), definition.clone());
            }
        }
        Ok(found)
    }

    /// Adds the dependency closure of `definition` to `closure`.
    fn collect_dependencies(
        &self,
        definition: &ExchangeServiceDefinition,
        closure: &mut ServiceMap,
    ) -> Result<(), ExchangeError> {
        for dependency in &definition.required_services {
            let found = self.matching(&dependency.url, &dependency.org, dependency.version_range(), &dependency.arch)?;
            let Some((id, required)) = found.into_iter().next_back() else {
                return Err(ExchangeError(format!("dependency {dependency} not found")));
            };
            if closure.insert(id, required.clone()).is_none() {
                self.collect_dependencies(&required, closure)?;
            }
        }
        Ok(())
    }
}

impl Collaborators for MemoryExchange {
    fn get_device(&self, node_id: &str) -> Result<Option<ExchangeNode>, ExchangeError> {
        Ok(self.nodes.get(node_id).cloned())
    }

    fn node_policy(&self, node_id: &str) -> Result<Option<ExternalPolicy>, ExchangeError> {
        Ok(self.node_policies.get(node_id).cloned())
    }

    fn business_policies(&self, org: &str, id: &str) -> Result<BTreeMap<String, BusinessPolicy>, ExchangeError> {
        Ok(self
            .business_policies
            .iter()
            .filter(|(key, _)| org_of(key) == org && (id.is_empty() || key.ends_with(&format!("/{id}"))))
            .map(|(key, policy)| (key.clone(), policy.clone()))
            .collect())
    }

    fn patterns(&self, org: &str, id: &str) -> Result<BTreeMap<String, Pattern>, ExchangeError> {
        Ok(self
            .patterns
            .iter()
            .filter(|(key, _)| org_of(key) == org && (id.is_empty() || key.ends_with(&format!("/{id}"))))
            .map(|(key, pattern)| (key.clone(), pattern.clone()))
            .collect())
    }

    fn service_policy(
        &self,
        url: &str,
        org: &str,
        version: &str,
        arch: &str,
    ) -> Result<(Option<ExternalPolicy>, String), ExchangeError> {
        let id = form_org_service_id(org, url, version, arch);
        Ok((self.service_policies.get(&id).cloned(), id))
    }

    fn resolve_service(
        &self,
        url: &str,
        org: &str,
        version: &str,
        arch: &str,
    ) -> Result<ResolvedService, ExchangeError> {
        let Some((id, definition)) = self.matching(url, org, version, arch)?.into_iter().next_back() else {
            return Err(ExchangeError(format!("service {org}/{url} version {version} arch {arch} not found")));
        };
        let mut dependencies = ServiceMap::new();
        self.collect_dependencies(&definition, &mut dependencies)?;
        Ok(ResolvedService {
            id,
            definition,
            dependencies,
        })
    }

    fn selected_services(
        &self,
        url: &str,
        org: &str,
        version: &str,
        arch: &str,
    ) -> Result<ServiceMap, ExchangeError> {
        self.matching(url, org, version, arch)
    }

    fn vault_secret_exists(
        &self,
        _agbot_url: &str,
        _org: &str,
        user: &str,
        name: &str,
    ) -> Result<bool, ExchangeError> {
        let store_name = if user.is_empty() { name.to_string() } else { format!("user/{user}/{name}") };
        Ok(self.secrets.contains(&store_name))
    }
}
