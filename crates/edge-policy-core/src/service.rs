// crates/edge-policy-core/src/service.rs
// ============================================================================
// Module: Service Definitions
// Description: Service definition capability trait and its two sources.
// Purpose: Let the checker treat locally supplied and exchange services alike.
// Dependencies: regex, serde, serde_json
// ============================================================================

//! ## Overview
//! A service definition is either a [`ServiceFile`] supplied by the caller or
//! an [`ExchangeServiceDefinition`] record scoped to its organization through
//! [`ExchangeService`]. Both implement [`ServiceDefinition`], which exposes
//! identity, dependencies, user inputs and the deployment documents.
//!
//! Deployments are decoded lazily into a [`DeploymentConfig`] when the
//! checker needs the declared secrets or the privilege requirements.
//! Exchange ids have the form `org/url_version_arch`; see
//! [`form_service_id`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::error::PolicyError;

// ============================================================================
// SECTION: Service Type
// ============================================================================

/// Node types a service can be deployed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceType {
    /// Only a device deployment.
    Device,
    /// Only a cluster deployment.
    Cluster,
    /// Both deployments.
    Both,
}

impl ServiceType {
    /// Wire name of the type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Device => "device",
            Self::Cluster => "cluster",
            Self::Both => "both",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Dependencies and Inputs
// ============================================================================

/// Reference from a service to a service it requires.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDependency {
    /// Required service url.
    pub url: String,
    /// Required service organization.
    #[serde(default)]
    pub org: String,
    /// Legacy single version.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    /// Accepted version range.
    #[serde(default)]
    pub version_range: String,
    /// Required service architecture.
    #[serde(default)]
    pub arch: String,
}

impl ServiceDependency {
    /// Returns the version range, falling back to the single version and then
    /// to every version.
    #[must_use]
    pub fn version_range(&self) -> &str {
        if !self.version_range.is_empty() {
            &self.version_range
        } else if !self.version.is_empty() {
            &self.version
        } else {
            "[0.0.0,INFINITY)"
        }
    }
}

impl fmt::Display for ServiceDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{URL: {}, Org: {}, Version: {}, VersionRange: {}, Arch: {}}}",
            self.url, self.org, self.version, self.version_range, self.arch
        )
    }
}

/// Configuration variable a service declares.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceUserInput {
    /// Variable name.
    pub name: String,
    /// Display label.
    #[serde(default)]
    pub label: String,
    /// Declared type.
    #[serde(rename = "type", default)]
    pub input_type: String,
    /// Default value; empty when the node owner must set it.
    #[serde(default)]
    pub default_value: String,
}

// ============================================================================
// SECTION: Deployment
// ============================================================================

/// Description of one declared secret.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SecretDescription {
    /// Free-text description.
    #[serde(default)]
    pub description: String,
}

/// Container settings the engine inspects.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContainerService {
    /// Container image.
    #[serde(default)]
    pub image: String,
    /// Runs the container privileged.
    #[serde(default)]
    pub privileged: bool,
    /// Network mode, e.g. `host`.
    #[serde(default)]
    pub network: String,
    /// Secrets the container consumes, by service secret name.
    #[serde(default)]
    pub secrets: BTreeMap<String, SecretDescription>,
}

/// Device deployment document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// Containers keyed by name.
    #[serde(default)]
    pub services: BTreeMap<String, ContainerService>,
}

impl DeploymentConfig {
    /// Decodes a deployment given as an object or as a JSON string.
    ///
    /// Returns `None` for `null` and the empty string.
    ///
    /// # Errors
    /// Returns [`PolicyError::Conversion`] when the document does not decode.
    pub fn from_value(deployment: &Value) -> Result<Option<Self>, PolicyError> {
        let decoded = match deployment {
            Value::Null => return Ok(None),
            Value::String(text) if text.is_empty() => return Ok(None),
            Value::String(text) => serde_json::from_str(text),
            other => serde_json::from_value(other.clone()),
        };
        decoded.map(Some).map_err(|err| {
            PolicyError::Conversion(format!(
                "Error unmarshaling deployment string to internal deployment structure: {err}"
            ))
        })
    }

    /// Returns true when a container is privileged or uses host networking.
    #[must_use]
    pub fn requires_privilege(&self) -> bool {
        self.services.values().any(|service| service.privileged || service.network == "host")
    }

    /// Returns every declared secret name.
    #[must_use]
    pub fn secret_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .services
            .values()
            .flat_map(|service| service.secrets.keys().map(String::as_str))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

/// Returns true for `null`, `""` and `{}`.
#[must_use]
pub fn deployment_is_empty(deployment: &Value) -> bool {
    match deployment {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Returns whether a deployment needs privileged mode or host networking.
///
/// # Errors
/// Returns [`PolicyError::Conversion`] when the deployment does not decode.
pub fn deployment_requires_privilege(deployment: &Value) -> Result<bool, PolicyError> {
    Ok(DeploymentConfig::from_value(deployment)?.is_some_and(|config| config.requires_privilege()))
}

// ============================================================================
// SECTION: Service Definition Trait
// ============================================================================

/// Capabilities shared by every service definition source.
pub trait ServiceDefinition {
    /// Owning organization.
    fn org(&self) -> &str;
    /// Service url.
    fn url(&self) -> &str;
    /// Service version.
    fn version(&self) -> &str;
    /// Service architecture.
    fn arch(&self) -> &str;
    /// Required services.
    fn required_services(&self) -> &[ServiceDependency];
    /// Declared user inputs.
    fn user_inputs(&self) -> &[ServiceUserInput];
    /// Device deployment document.
    fn deployment(&self) -> Value;
    /// Cluster deployment document.
    fn cluster_deployment(&self) -> Value;

    /// Returns true when an input has no default value.
    fn needs_user_input(&self) -> bool {
        self.user_inputs().iter().any(|input| !input.name.is_empty() && input.default_value.is_empty())
    }

    /// Derives the type from which deployments are present.
    fn service_type(&self) -> ServiceType {
        match (deployment_is_empty(&self.deployment()), deployment_is_empty(&self.cluster_deployment())) {
            (_, true) => ServiceType::Device,
            (true, false) => ServiceType::Cluster,
            (false, false) => ServiceType::Both,
        }
    }

    /// Decodes the device deployment.
    ///
    /// # Errors
    /// Returns [`PolicyError::Conversion`] when the deployment does not decode.
    fn deployment_config(&self) -> Result<Option<DeploymentConfig>, PolicyError> {
        DeploymentConfig::from_value(&self.deployment())
    }
}

// ============================================================================
// SECTION: Service File
// ============================================================================

/// Service definition supplied by the caller.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceFile {
    /// Owning organization; may be omitted.
    #[serde(default)]
    pub org: String,
    /// Display label.
    #[serde(default)]
    pub label: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Whether the service is public.
    #[serde(default)]
    pub public: bool,
    /// Service url.
    pub url: String,
    /// Service version.
    #[serde(default)]
    pub version: String,
    /// Service architecture.
    #[serde(default)]
    pub arch: String,
    /// Sharing mode.
    #[serde(default)]
    pub sharable: String,
    /// Required services.
    #[serde(default)]
    pub required_services: Vec<ServiceDependency>,
    /// Declared user inputs.
    #[serde(rename = "userInput", default)]
    pub user_inputs: Vec<ServiceUserInput>,
    /// Device deployment, an object or a JSON string.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub deployment: Value,
    /// Cluster deployment, an object or a string.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub cluster_deployment: Value,
}

impl ServiceFile {
    /// Snapshots any definition as a service file.
    #[must_use]
    pub fn from_definition(definition: &dyn ServiceDefinition) -> Self {
        Self {
            org: definition.org().to_string(),
            url: definition.url().to_string(),
            version: definition.version().to_string(),
            arch: definition.arch().to_string(),
            required_services: definition.required_services().to_vec(),
            user_inputs: definition.user_inputs().to_vec(),
            deployment: definition.deployment(),
            cluster_deployment: definition.cluster_deployment(),
            ..Self::default()
        }
    }
}

impl ServiceDefinition for ServiceFile {
    fn org(&self) -> &str {
        &self.org
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn arch(&self) -> &str {
        &self.arch
    }

    fn required_services(&self) -> &[ServiceDependency] {
        &self.required_services
    }

    fn user_inputs(&self) -> &[ServiceUserInput] {
        &self.user_inputs
    }

    fn deployment(&self) -> Value {
        self.deployment.clone()
    }

    fn cluster_deployment(&self) -> Value {
        self.cluster_deployment.clone()
    }
}

// ============================================================================
// SECTION: Exchange Service
// ============================================================================

/// Service record as stored in the exchange; the org is part of its id.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeServiceDefinition {
    /// Record owner.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub owner: String,
    /// Display label.
    #[serde(default)]
    pub label: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Whether the service is public.
    #[serde(default)]
    pub public: bool,
    /// Service url.
    pub url: String,
    /// Service version.
    #[serde(default)]
    pub version: String,
    /// Service architecture.
    #[serde(default)]
    pub arch: String,
    /// Sharing mode.
    #[serde(default)]
    pub sharable: String,
    /// Required services.
    #[serde(default)]
    pub required_services: Vec<ServiceDependency>,
    /// Declared user inputs.
    #[serde(rename = "userInput", default)]
    pub user_inputs: Vec<ServiceUserInput>,
    /// Device deployment as a JSON string.
    #[serde(default)]
    pub deployment: String,
    /// Cluster deployment as a string.
    #[serde(default)]
    pub cluster_deployment: String,
    /// Last update time.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_updated: String,
}

/// Exchange record paired with the organization taken from its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeService {
    /// Organization from the exchange id.
    pub org: String,
    /// The record.
    pub definition: ExchangeServiceDefinition,
}

impl ExchangeService {
    /// Pairs a record with the org of `service_id`.
    #[must_use]
    pub fn from_id(service_id: &str, definition: ExchangeServiceDefinition) -> Self {
        Self {
            org: org_of(service_id).to_string(),
            definition,
        }
    }
}

impl ServiceDefinition for ExchangeService {
    fn org(&self) -> &str {
        &self.org
    }

    fn url(&self) -> &str {
        &self.definition.url
    }

    fn version(&self) -> &str {
        &self.definition.version
    }

    fn arch(&self) -> &str {
        &self.definition.arch
    }

    fn required_services(&self) -> &[ServiceDependency] {
        &self.definition.required_services
    }

    fn user_inputs(&self) -> &[ServiceUserInput] {
        &self.definition.user_inputs
    }

    fn deployment(&self) -> Value {
        Value::String(self.definition.deployment.clone())
    }

    fn cluster_deployment(&self) -> Value {
        Value::String(self.definition.cluster_deployment.clone())
    }
}

// ============================================================================
// SECTION: Service Ids
// ============================================================================

/// Leading url scheme, removed from ids.
static SCHEME_PREFIX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9+.-]*?://").ok());

/// Characters replaced by `-` in ids.
static ID_UNSAFE_CHARS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[$!*,;/?@&~=%]").ok());

/// Replaces characters that are not allowed in exchange ids with `-`.
#[must_use]
pub fn form_exchange_id(id: &str) -> String {
    ID_UNSAFE_CHARS
        .as_ref()
        .map_or_else(|| id.to_string(), |re| re.replace_all(id, "-").into_owned())
}

/// Forms `url_version_arch` with the url scheme removed and unsafe
/// characters replaced.
#[must_use]
pub fn form_service_id(url: &str, version: &str, arch: &str) -> String {
    let stripped = SCHEME_PREFIX.as_ref().map_or(url, |re| {
        re.find(url).map_or(url, |found| &url[found.end() ..])
    });
    format!("{}_{version}_{arch}", form_exchange_id(stripped))
}

/// Forms `org/url_version_arch`.
#[must_use]
pub fn form_org_service_id(org: &str, url: &str, version: &str, arch: &str) -> String {
    format!("{org}/{}", form_service_id(url, version, arch))
}

/// Returns the part of `id` before the first `/`, or an empty string.
#[must_use]
pub fn org_of(id: &str) -> &str {
    id.split_once('/').map_or("", |(org, _)| org)
}

/// Returns the part of `id` after the first `/`, or an empty string.
#[must_use]
pub fn id_of(id: &str) -> &str {
    id.split_once('/').map_or("", |(_, rest)| rest)
}

/// Drops the trailing `_arch` from a service id with at least three parts.
#[must_use]
pub fn remove_arch_from_service_id(service_id: &str) -> String {
    let parts: Vec<&str> = service_id.split('_').collect();
    if parts.len() >= 3 {
        parts[.. parts.len() - 1].join("_")
    } else {
        service_id.to_string()
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

    /// Tests ids strip scheme and unsafe characters.
    #[test]
    fn ids_strip_scheme_and_unsafe_characters() {
        assert_eq!(
            form_service_id("https://bluehorizon.network/svc?x=1", "1.0.0", "amd64"),
            "bluehorizon.network-svc-x-1_1.0.0_amd64"
        );
        assert_eq!(form_service_id("svc", "1.0.0", "*"), "svc_1.0.0_*");
        assert_eq!(form_org_service_id("org", "svc", "1.0.0", "arm"), "org/svc_1.0.0_arm");
        assert_eq!(org_of("org/svc_1_arm"), "org");
        assert_eq!(id_of("org/svc_1_arm"), "svc_1_arm");
        assert_eq!(org_of("noslash"), "");
        assert_eq!(remove_arch_from_service_id("org/svc_1.0.0_amd64"), "org/svc_1.0.0");
        assert_eq!(remove_arch_from_service_id("svc_1.0.0"), "svc_1.0.0");
    }

    /// Tests deployments decode from objects and strings.
    #[test]
    fn deployments_decode_from_objects_and_strings() {
        let object = json!({"services": {"web": {"image": "x", "network": "host"}}});
        let config = DeploymentConfig::from_value(&object).unwrap().unwrap();
        assert!(config.requires_privilege());
        let text = Value::String(r#"{"services":{"web":{"secrets":{"s1":{},"s2":{}}}}}"#.to_string());
        let config = DeploymentConfig::from_value(&text).unwrap().unwrap();
        assert!(!config.requires_privilege());
        assert_eq!(config.secret_names(), vec!["s1", "s2"]);
        assert!(DeploymentConfig::from_value(&Value::String(String::new())).unwrap().is_none());
        let bad = DeploymentConfig::from_value(&Value::String("{".to_string())).unwrap_err();
        assert!(matches!(bad, PolicyError::Conversion(_)));
    }

    /// Tests service type follows deployments.
    #[test]
    fn service_type_follows_deployments() {
        let mut file = ServiceFile {
            url: "svc".to_string(),
            deployment: json!({"services": {}}),
            ..ServiceFile::default()
        };
        assert_eq!(file.service_type(), ServiceType::Device);
        file.cluster_deployment = json!("operator");
        assert_eq!(file.service_type(), ServiceType::Both);
        file.deployment = json!({});
        assert_eq!(file.service_type(), ServiceType::Cluster);

        let exchange = ExchangeService::from_id("myorg/svc_1.0.0_amd64", ExchangeServiceDefinition {
            url: "svc".to_string(),
            user_inputs: vec![ServiceUserInput {
                name: "var".to_string(),
                ..ServiceUserInput::default()
            }],
            ..ExchangeServiceDefinition::default()
        });
        assert_eq!(exchange.org(), "myorg");
        assert!(exchange.needs_user_input());
        assert_eq!(exchange.service_type(), ServiceType::Device);
    }
}
