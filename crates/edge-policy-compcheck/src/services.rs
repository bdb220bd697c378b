// crates/edge-policy-compcheck/src/services.rs
// ============================================================================
// Module: Service Resolution
// Description: Top level service lookup and dependency closure assembly.
// Purpose: Find every service definition a workload deploys.
// Dependencies: constraint-logic, edge-policy-core
// ============================================================================

//! ## Overview
//! Services come from three places, tried in order: the caller's input
//! services, the caller's known dependency map, and the collaborators.
//! Dependencies are matched by url, org, arch and version range.

use std::fmt;

use constraint_logic::VersionRange;
use constraint_logic::version::is_version_string;
use edge_policy_core::BusinessPolicy;
use edge_policy_core::ExchangeService;
use edge_policy_core::Pattern;
use edge_policy_core::ServiceDefinition;
use edge_policy_core::ServiceFile;
use edge_policy_core::service::form_org_service_id;
use edge_policy_core::service::org_of;
use edge_policy_core::service::remove_arch_from_service_id;

use crate::collaborators::Collaborators;
use crate::collaborators::ServiceMap;
use crate::error::CompCheckError;

// ============================================================================
// SECTION: Types
// ============================================================================

/// A service selector whose version may be a range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    /// Service url.
    pub url: String,
    /// Service organization.
    pub org: String,
    /// Version or version range.
    pub version_range: String,
    /// Service architecture.
    pub arch: String,
}

impl ServiceSpec {
    /// Creates a selector.
    #[must_use]
    pub fn new(url: &str, org: &str, version_range: &str, arch: &str) -> Self {
        Self {
            url: url.to_string(),
            org: org.to_string(),
            version_range: version_range.to_string(),
            arch: arch.to_string(),
        }
    }
}

impl fmt::Display for ServiceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} {} {}", self.org, self.url, self.version_range, self.arch)
    }
}

/// A top level service, its id, and its dependency closure.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ServiceClosure {
    /// Exchange id, `org/url_version_arch`.
    pub id: String,
    /// The top level service.
    pub top: ServiceFile,
    /// Every dependency keyed by id.
    pub dependencies: ServiceMap,
}

// ============================================================================
// SECTION: Lookup
// ============================================================================

/// Returns the input service matching url and version, with a wildcard
/// arch matching any and an input without org matching any org.
#[must_use]
pub fn get_service_from_input<'a>(
    url: &str,
    org: &str,
    version: &str,
    arch: &str,
    services: &'a [ServiceFile],
) -> Option<&'a ServiceFile> {
    services.iter().find(|service| {
        service.url == url
            && service.version == version
            && (arch == "*" || arch.is_empty() || service.arch == arch)
            && (service.org.is_empty() || service.org == org)
    })
}

/// Parses a version range, reporting failures as general errors.
fn version_range(expression: &str) -> Result<VersionRange, CompCheckError> {
    VersionRange::parse(expression).map_err(|err| {
        CompCheckError::General(format!("Unable to create version expression from {expression}. {err}"))
    })
}

/// Collects the services matching `spec` and their dependencies into `all`.
/// Returns false when `spec` or one of its dependencies has no match.
fn collect_service_defs(spec: &ServiceSpec, defs: &ServiceMap, all: &mut ServiceMap) -> Result<bool, CompCheckError> {
    let range = version_range(&spec.version_range)?;
    let mut found = false;
    for (id, def) in defs {
        if def.url != spec.url || org_of(id) != spec.org || def.arch != spec.arch {
            continue;
        }
        if !range.is_within_range(&def.version).map_err(|err| CompCheckError::General(err.to_string()))? {
            continue;
        }
        found = true;
        if all.insert(id.clone(), def.clone()).is_some() {
            continue;
        }
        for dependency in &def.required_services {
            let dependency_spec = ServiceSpec::new(
                &dependency.url,
                &dependency.org,
                dependency.version_range(),
                &dependency.arch,
            );
            if !collect_service_defs(&dependency_spec, defs, all)? {
                return Ok(false);
            }
        }
    }
    Ok(found)
}

/// Finds the services matching `spec` in `defs` together with all of their
/// dependencies. `None` when something in the closure is missing.
///
/// # Errors
/// Returns [`CompCheckError::General`] for a malformed version or range.
pub fn find_service_defs(spec: &ServiceSpec, defs: &ServiceMap) -> Result<Option<ServiceMap>, CompCheckError> {
    if defs.is_empty() {
        return Ok(None);
    }
    let mut all = ServiceMap::new();
    if collect_service_defs(spec, defs, &mut all)? { Ok(Some(all)) } else { Ok(None) }
}

/// Returns the dependency closure of `definition`, preferring `known`
/// services over collaborator lookups.
///
/// # Errors
/// Returns [`CompCheckError::General`] for a malformed range and
/// [`CompCheckError::Exchange`] when a dependency cannot be resolved.
pub fn get_service_dependent_defs(
    definition: &dyn ServiceDefinition,
    known: Option<&ServiceMap>,
    collaborators: &dyn Collaborators,
) -> Result<ServiceMap, CompCheckError> {
    let mut closure = ServiceMap::new();
    for dependency in definition.required_services() {
        let spec =
            ServiceSpec::new(&dependency.url, &dependency.org, dependency.version_range(), &dependency.arch);
        if let Some(known) = known
            && let Some(found) = find_service_defs(&spec, known)?
        {
            closure.extend(found);
            continue;
        }
        let range = version_range(&spec.version_range)?;
        let resolved = collaborators
            .resolve_service(&spec.url, &spec.org, &range.expression(), &spec.arch)
            .map_err(|err| {
                CompCheckError::Exchange(format!(
                    "Error retrieving dependent services from the Exchange for {dependency}. {err}"
                ))
            })?;
        closure.insert(resolved.id, resolved.definition);
        closure.extend(resolved.dependencies);
    }
    Ok(closure)
}

/// Finds a top level service in the input services, falling back to the
/// collaborators, and assembles its dependency closure.
///
/// # Errors
/// Returns [`CompCheckError::Exchange`] when the service or a dependency
/// cannot be resolved.
pub fn get_service_and_deps(
    spec: &ServiceSpec,
    services: &[ServiceFile],
    known: Option<&ServiceMap>,
    collaborators: &dyn Collaborators,
) -> Result<ServiceClosure, CompCheckError> {
    let id = form_org_service_id(&spec.org, &spec.url, &spec.version_range, &spec.arch);
    if let Some(input) = get_service_from_input(&spec.url, &spec.org, &spec.version_range, &spec.arch, services) {
        let dependencies = get_service_dependent_defs(input, known, collaborators)?;
        let mut top = input.clone();
        if top.org.is_empty() {
            top.org.clone_from(&spec.org);
        }
        return Ok(ServiceClosure {
            id,
            top,
            dependencies,
        });
    }
    let resolved = collaborators
        .resolve_service(&spec.url, &spec.org, &spec.version_range, &spec.arch)
        .map_err(|err| {
            CompCheckError::Exchange(format!(
                "Failed to find definition for dependent services of {id}. Compatability of \
                 openhorizon.allowPrivileged cannot be fully evaluated until all services are in the \
                 Exchange. {err}"
            ))
        })?;
    let top = ServiceFile::from_definition(&ExchangeService::from_id(&resolved.id, resolved.definition));
    Ok(ServiceClosure {
        id: resolved.id,
        top,
        dependencies: resolved.dependencies,
    })
}

// ============================================================================
// SECTION: Input Validation
// ============================================================================

/// Returns true when `service_id` is selected by `selected`; an empty
/// selection selects everything and ids ending in `_*` or `_` match any arch.
#[must_use]
pub fn need_handle_service(service_id: &str, selected: &[String]) -> bool {
    if selected.is_empty() {
        return true;
    }
    let any_arch = |id: &str| id.ends_with("_*") || id.ends_with('_');
    selected.iter().any(|id| {
        if any_arch(id) || any_arch(service_id) {
            remove_arch_from_service_id(id) == remove_arch_from_service_id(service_id)
        } else {
            id == service_id
        }
    })
}

/// Checks an input service against the deployment policy's service.
fn validate_service_with_business_policy(service: &ServiceFile, business: &BusinessPolicy) -> Result<(), String> {
    let target = &business.service;
    if service.url != target.name {
        return Err(format!(
            "Service URL {} does not match the service URL {} specified in the deployment policy.",
            service.url, target.name
        ));
    }
    if service.org != target.org {
        return Err(format!(
            "Service Org {} does not match the service org {} specified in the deployment policy.",
            service.org, target.org
        ));
    }
    if !target.arch.is_empty() && target.arch != "*" && service.arch != target.arch {
        return Err(format!(
            "Service architecture {} does not match the service architecture {} specified in the \
             deployment policy.",
            service.arch, target.arch
        ));
    }
    if !target.service_versions.iter().any(|choice| choice.version == service.version) {
        return Err(format!(
            "Service version {} does not match any service versions specified in the deployment policy.",
            service.version
        ));
    }
    Ok(())
}

/// Checks an input service against the pattern's services.
fn validate_service_with_pattern(service: &ServiceFile, pattern: &Pattern) -> Result<(), String> {
    if pattern.services.is_empty() {
        return Ok(());
    }
    let found = pattern.services.iter().any(|reference| {
        service.url == reference.service_url
            && service.org == reference.service_orgid
            && (reference.service_arch.is_empty()
                || reference.service_arch == "*"
                || service.arch == reference.service_arch)
            && reference.service_versions.iter().any(|choice| choice.version == service.version)
    });
    if found { Ok(()) } else { Err("The service does not match any services in the pattern.".to_string()) }
}

/// Checks the input services are complete and belong to the deployment
/// policy or pattern.
///
/// # Errors
/// Returns [`CompCheckError::Validation`] naming the first bad service.
pub fn validate_services(
    services: &[ServiceFile],
    business: Option<&BusinessPolicy>,
    pattern: Option<&Pattern>,
    selected: &[String],
) -> Result<(), CompCheckError> {
    for service in services {
        if service.url.is_empty() {
            return Err(CompCheckError::Validation("URL must be specified in the service definition.".to_string()));
        }
        if service.version.is_empty() {
            return Err(CompCheckError::Validation(format!(
                "Version must be specified in the service definition for service {}.",
                service.url
            )));
        }
        if !is_version_string(&service.version) {
            return Err(CompCheckError::Validation(format!(
                "Invalid version format {} for service {}.",
                service.version, service.url
            )));
        }
        if service.arch.is_empty() {
            return Err(CompCheckError::Validation(format!(
                "Arch must be specified in the service definition for service {}.",
                service.url
            )));
        }
        if service.org.is_empty() {
            return Err(CompCheckError::Validation(format!(
                "Org must be specified in the service definition for service {}.",
                service.url
            )));
        }
        let service_id = form_org_service_id(&service.org, &service.url, &service.version, &service.arch);
        if !need_handle_service(&service_id, selected) {
            continue;
        }
        let checked = match (business, pattern) {
            (Some(business), _) => validate_service_with_business_policy(service, business),
            (None, Some(pattern)) => validate_service_with_pattern(service, pattern),
            (None, None) => Ok(()),
        };
        checked.map_err(|err| {
            CompCheckError::Validation(format!("Validation failure for input service {service_id}. {err}"))
        })?;
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
