// crates/edge-policy-core/src/secret.rs
// ============================================================================
// Module: Secret Bindings
// Description: Bindings from service secret names to secret-store names.
// Purpose: Model deployment secret bindings and the store name grammar.
// Dependencies: constraint-logic, serde
// ============================================================================

//! ## Overview
//! A [`SecretBinding`] scopes a list of [`BoundSecret`]s to one service
//! identity (org, url, optional arch and version range). Each bound secret
//! maps a secret name declared by the service to a secret-store reference,
//! either an organization secret `name` or a user secret
//! `user/<username>/<name>`.

use std::collections::BTreeMap;
use std::fmt;

use constraint_logic::VersionRange;
use serde::Deserialize;
use serde::Serialize;

use crate::error::PolicyError;

// ============================================================================
// SECTION: Bound Secret
// ============================================================================

/// One `{"<service secret>": "<store name>"}` entry.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoundSecret(BTreeMap<String, String>);

impl BoundSecret {
    /// Creates a binding of `service_secret` to `store_name`.
    #[must_use]
    pub fn new(service_secret: impl Into<String>, store_name: impl Into<String>) -> Self {
        Self(BTreeMap::from([(service_secret.into(), store_name.into())]))
    }

    /// Returns the service secret name and the store name.
    #[must_use]
    pub fn binding(&self) -> Option<(&str, &str)> {
        self.0.iter().next().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Returns the service secret name, or an empty string.
    #[must_use]
    pub fn service_secret(&self) -> &str {
        self.binding().map_or("", |(key, _)| key)
    }

    /// Returns the store name, or an empty string.
    #[must_use]
    pub fn store_name(&self) -> &str {
        self.binding().map_or("", |(_, value)| value)
    }
}

impl fmt::Display for BoundSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.service_secret(), self.store_name())
    }
}

// ============================================================================
// SECTION: Secret Binding
// ============================================================================

/// Secret bindings for one service.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretBinding {
    /// Service organization.
    pub service_orgid: String,
    /// Service url.
    pub service_url: String,
    /// Service architecture; empty or `*` for every architecture.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_arch: String,
    /// Service version range; empty for every version.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_version_range: String,
    /// The bound secrets.
    #[serde(default)]
    pub secrets: Vec<BoundSecret>,
}

impl SecretBinding {
    /// Returns whether this binding applies to the given service instance.
    ///
    /// # Errors
    /// Returns [`PolicyError::Parse`] when the version range is malformed or
    /// the version cannot be checked against it.
    pub fn applies_to(
        &self,
        org: &str,
        url: &str,
        version: &str,
        arch: &str,
    ) -> Result<bool, PolicyError> {
        if self.service_url != url || self.service_orgid != org {
            return Ok(false);
        }
        if !self.service_arch.is_empty() && self.service_arch != "*" && self.service_arch != arch {
            return Ok(false);
        }
        if self.service_version_range.is_empty() || self.service_version_range == version {
            return Ok(true);
        }
        let range = VersionRange::parse(&self.service_version_range).map_err(|err| {
            PolicyError::Parse(format!(
                "Wrong version string {} specified in secret binding for service {org}/{url} \
                 {version} {arch}, error {err}",
                self.service_version_range
            ))
        })?;
        range.is_within_range(version).map_err(|err| {
            PolicyError::Parse(format!("Error checking version {version} in range {range}. {err}"))
        })
    }

    /// Returns a copy holding only the secrets accepted by `keep`.
    #[must_use]
    pub fn with_secrets(&self, keep: impl Fn(&BoundSecret) -> bool) -> Self {
        Self {
            secrets: self.secrets.iter().filter(|secret| keep(secret)).cloned().collect(),
            ..self.clone()
        }
    }
}

impl fmt::Display for SecretBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secrets = self.secrets.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ");
        write!(
            f,
            "ServiceUrl: {}, ServiceOrgid: {}, ServiceArch: {}, ServiceVersionRange: {}, Secrets: \
             [{secrets}]",
            self.service_url, self.service_orgid, self.service_arch, self.service_version_range
        )
    }
}

/// Returns the index of the first binding that applies to the service.
///
/// # Errors
/// Returns the [`PolicyError::Parse`] raised by a malformed version range.
pub fn find_secret_binding(
    bindings: &[SecretBinding],
    org: &str,
    url: &str,
    version: &str,
    arch: &str,
) -> Result<Option<usize>, PolicyError> {
    for (index, binding) in bindings.iter().enumerate() {
        if binding.applies_to(org, url, version, arch)? {
            return Ok(Some(index));
        }
    }
    Ok(None)
}

// ============================================================================
// SECTION: Secret Store Names
// ============================================================================

/// Accepted store name formats, appended to parse errors.
const VALID_FORMATS: &str = "The valid formats are: '<secretname>' for the organization level \
                             secret and 'user/<username>/<secretname>' for the user level secret.";

/// A parsed secret-store reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultSecretName {
    /// Owning user; empty for an organization secret.
    pub user: String,
    /// Secret name within the owner's scope.
    pub name: String,
}

/// Parses a store name: `name`, `/name`, `user/<u>/<name>` or
/// `/user/<u>/<name>`. Names may contain further slashes.
///
/// # Errors
/// Returns [`PolicyError::Parse`] for an empty name, an `openhorizon/`
/// qualified name, or an incomplete user reference.
pub fn parse_vault_secret_name(secret_name: &str) -> Result<VaultSecretName, PolicyError> {
    if secret_name.is_empty() {
        return Err(PolicyError::Parse(format!(
            "The binding secret name cannot be an empty string. {VALID_FORMATS}"
        )));
    }
    let invalid = || {
        PolicyError::Parse(format!(
            "Invalid format for the binding secret name: {secret_name}. {VALID_FORMATS}"
        ))
    };
    let parts: Vec<&str> = secret_name.split('/').collect();
    let parsed = match parts.as_slice() {
        ["openhorizon", ..] | ["", "openhorizon", ..] => return Err(invalid()),
        ["user", user, rest @ ..] | ["", "user", user, rest @ ..] if !rest.is_empty() => {
            VaultSecretName {
                user: (*user).to_string(),
                name: rest.join("/"),
            }
        }
        ["user", ..] | ["", "user", ..] => return Err(invalid()),
        ["", rest @ ..] => VaultSecretName {
            user: String::new(),
            name: rest.join("/"),
        },
        _ => VaultSecretName {
            user: String::new(),
            name: secret_name.to_string(),
        },
    };
    if parsed.name.is_empty() {
        return Err(invalid());
    }
    Ok(parsed)
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

    /// Builds a binding for `svc` in `org`.
    fn binding(arch: &str, range: &str) -> SecretBinding {
        SecretBinding {
            service_orgid: "org".to_string(),
            service_url: "svc".to_string(),
            service_arch: arch.to_string(),
            service_version_range: range.to_string(),
            secrets: vec![BoundSecret::new("a", "b")],
        }
    }

    /// Tests store name formats.
    #[test]
    fn store_name_formats() {
        let org = parse_vault_secret_name("mysecret/extra").unwrap();
        assert_eq!((org.user.as_str(), org.name.as_str()), ("", "mysecret/extra"));
        let user = parse_vault_secret_name("user/fred/s1").unwrap();
        assert_eq!((user.user.as_str(), user.name.as_str()), ("fred", "s1"));
        let leading = parse_vault_secret_name("/user/fred/a/b").unwrap();
        assert_eq!((leading.user.as_str(), leading.name.as_str()), ("fred", "a/b"));
        assert_eq!(parse_vault_secret_name("/mysecret").unwrap().name, "mysecret");
        for bad in ["", "openhorizon/org/secret", "user/fred", "/user/fred", "/", "user"] {
            assert!(matches!(parse_vault_secret_name(bad), Err(PolicyError::Parse(_))), "{bad}");
        }
    }

    /// Tests binding scope matching.
    #[test]
    fn binding_scope_matching() {
        assert!(binding("", "").applies_to("org", "svc", "1.0.0", "amd64").unwrap());
        assert!(binding("*", "").applies_to("org", "svc", "1.0.0", "arm64").unwrap());
        assert!(!binding("arm64", "").applies_to("org", "svc", "1.0.0", "amd64").unwrap());
        assert!(!binding("", "").applies_to("other", "svc", "1.0.0", "amd64").unwrap());
        assert!(binding("", "[1.0.0,2.0.0)").applies_to("org", "svc", "1.5.0", "amd64").unwrap());
        assert!(!binding("", "[1.0.0,2.0.0)").applies_to("org", "svc", "2.0.0", "amd64").unwrap());
        assert!(binding("", "bogus range").applies_to("org", "svc", "1.0.0", "amd64").is_err());
    }

    /// Tests wire shape of bindings.
    #[test]
    fn wire_shape_of_bindings() {
        let json = r#"{"serviceOrgid":"org","serviceUrl":"svc","secrets":[{"s1":"user/u/v"}]}"#;
        let parsed: SecretBinding = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.secrets[0].binding(), Some(("s1", "user/u/v")));
        assert_eq!(serde_json::to_string(&parsed).unwrap(), json);
        let bindings = [binding("arm64", ""), binding("", "")];
        assert_eq!(find_secret_binding(&bindings, "org", "svc", "1.0.0", "amd64").unwrap(), Some(1));
    }
}
