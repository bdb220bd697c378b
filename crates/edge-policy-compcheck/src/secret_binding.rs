// crates/edge-policy-compcheck/src/secret_binding.rs
// ============================================================================
// Module: Secret Binding Compatibility
// Description: Secret binding coverage, grouping, and secret store checks.
// Purpose: Decide whether a deployment binds every secret its services use.
// Dependencies: edge-policy-core, tracing
// ============================================================================

//! ## Overview
//! Every secret a container declares must be bound, by the binding entry
//! that applies to its service, to a store name of the form `<name>` or
//! `user/<user>/<name>`. Bindings are tracked through an [`IndexMap`] from
//! binding position to the service secret names some service needed, which
//! later splits the bindings into needed and extraneous parts.
//!
//! Security posture: store names are validated before any existence query;
//! existence is only checked when an agbot url is configured.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use edge_policy_core::ConstraintEngine;
use edge_policy_core::ExchangeService;
use edge_policy_core::PolicyError;
use edge_policy_core::SecretBinding;
use edge_policy_core::ServiceDefinition;
use edge_policy_core::ServiceFile;
use edge_policy_core::ServiceType;
use edge_policy_core::builtin::NODE_TYPE_CLUSTER;
use edge_policy_core::secret::find_secret_binding;
use edge_policy_core::secret::parse_vault_secret_name;
use edge_policy_core::service::form_org_service_id;
use tracing::debug;
use tracing::warn;

use crate::collaborators::Collaborators;
use crate::collaborators::ServiceMap;
use crate::deployment::process_business_policy;
use crate::deployment::process_pattern;
use crate::deployment::workloads_from_business_policy;
use crate::deployment::workloads_from_pattern;
use crate::error::CompCheckError;
use crate::node::resolve_exchange_node;
use crate::policy_check::check_type_compatibility;
use crate::resource::COMPATIBLE;
use crate::resource::CompCheckOutput;
use crate::resource::CompCheckResource;
use crate::resource::GENERAL_REASON_KEY;
use crate::resource::SECRET_BINDING_INCOMPATIBLE;
use crate::resource::SecretBindingCheck;
use crate::resource::format_reason_message;
use crate::services::ServiceClosure;
use crate::services::ServiceSpec;
use crate::services::get_service_dependent_defs;
use crate::services::get_service_from_input;
use crate::services::need_handle_service;
use crate::services::validate_services;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Needed service secret names keyed by position in the binding list.
pub type IndexMap = BTreeMap<usize, BTreeSet<String>>;

/// Everything a secret binding verification needs besides the service.
#[derive(Clone, Copy)]
pub struct SecretScope<'a> {
    /// Lookups.
    pub collaborators: &'a dyn Collaborators,
    /// Bindings of the deployment policy or pattern.
    pub bindings: &'a [SecretBinding],
    /// Agbot url; secret existence is checked only when set.
    pub agbot_url: Option<&'a str>,
    /// Organization the node belongs to.
    pub node_org: &'a str,
}

/// Outcome of verifying the bindings of one service closure.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SecretVerdict {
    /// Whether every secret is bound and exists.
    pub compatible: bool,
    /// Why not, when not compatible.
    pub reason: String,
    /// Bindings the closure needed.
    pub index_map: IndexMap,
}

// ============================================================================
// SECTION: Single Service
// ============================================================================

/// Returns the position of the binding that applies to the service.
///
/// # Errors
/// Returns [`PolicyError::Parse`] for a malformed binding version range.
pub fn get_secret_binding_for_service(
    bindings: &[SecretBinding],
    org: &str,
    url: &str,
    version: &str,
    arch: &str,
) -> Result<Option<usize>, PolicyError> {
    find_secret_binding(bindings, org, url, version, arch)
}

/// Checks that the binding applying to `service` covers every secret it
/// declares. Returns the binding position and the needed secret names.
///
/// # Errors
/// Returns a [`PolicyError`] naming unbound secrets, a bad store name, a
/// binding for a cluster service, or a deployment that does not decode.
pub fn validate_secret_binding_for_single_service(
    bindings: &[SecretBinding],
    service: &dyn ServiceDefinition,
) -> Result<(Option<usize>, Vec<String>), PolicyError> {
    let index =
        get_secret_binding_for_service(bindings, service.org(), service.url(), service.version(), service.arch())?;
    if service.service_type() == ServiceType::Cluster {
        if index.is_some() {
            return Err(PolicyError::Validation("Secret binding for a cluster service is not supported.".to_string()));
        }
        return Ok((None, Vec::new()));
    }
    let Some(config) = service.deployment_config()? else {
        return Ok((index, Vec::new()));
    };
    let bound = index.and_then(|position| bindings.get(position)).map_or(&[][..], |binding| &binding.secrets[..]);
    let mut needed = Vec::new();
    let mut unbound = Vec::new();
    for name in config.secret_names() {
        match bound.iter().find(|secret| secret.service_secret() == name) {
            Some(secret) => {
                parse_vault_secret_name(secret.store_name())?;
                needed.push(name.to_string());
            }
            None => unbound.push(name),
        }
    }
    if !unbound.is_empty() {
        return Err(PolicyError::Validation(format!(
            "No secret binding found for the following service secrets: [{}].",
            unbound.join(" ")
        )));
    }
    Ok((index, needed))
}

// ============================================================================
// SECTION: Index Map
// ============================================================================

/// Marks `needed` names of the binding at `index` as needed.
pub fn update_index_map(index_map: &mut IndexMap, index: Option<usize>, needed: &[String]) {
    let Some(index) = index else {
        return;
    };
    if needed.is_empty() {
        return;
    }
    index_map.entry(index).or_default().extend(needed.iter().cloned());
}

/// Adds every entry of `other` to `index_map`.
pub fn combine_index_map(index_map: &mut IndexMap, other: IndexMap) {
    for (index, names) in other {
        index_map.entry(index).or_default().extend(names);
    }
}

/// Splits bindings into the parts some service needs and the rest.
///
/// Every bound secret lands in exactly one of the two lists; an entry with
/// both kinds is split into two entries sharing its service fields.
#[must_use]
pub fn group_secret_bindings(
    bindings: &[SecretBinding],
    index_map: &IndexMap,
) -> (Vec<SecretBinding>, Vec<SecretBinding>) {
    let mut needed = Vec::new();
    let mut extraneous = Vec::new();
    let none = BTreeSet::new();
    for (index, binding) in bindings.iter().enumerate() {
        let names = index_map.get(&index).unwrap_or(&none);
        let used = binding.with_secrets(|secret| names.contains(secret.service_secret()));
        let unused = binding.with_secrets(|secret| !names.contains(secret.service_secret()));
        if !used.secrets.is_empty() {
            needed.push(used);
        }
        if !unused.secrets.is_empty() || binding.secrets.is_empty() {
            extraneous.push(unused);
        }
    }
    (needed, extraneous)
}

// ============================================================================
// SECTION: Secret Store
// ============================================================================

/// Checks the preconditions of a secret store query.
fn require_store(agbot_url: &str, node_org: &str) -> Result<(), CompCheckError> {
    if agbot_url.is_empty() {
        return Err(CompCheckError::Input(
            "agbot URL cannot be an empty string when checking secret binding. Please make sure \
             HZN_AGBOT_URL is set."
                .to_string(),
        ));
    }
    if node_org.is_empty() {
        return Err(CompCheckError::Input("The node organization must be provided.".to_string()));
    }
    Ok(())
}

/// Returns whether the store name `store_name` exists.
///
/// # Errors
/// Returns [`CompCheckError::Validation`] for a bad store name and
/// [`CompCheckError::Exchange`] when the store cannot be queried.
pub fn verify_single_vault_secret(
    collaborators: &dyn Collaborators,
    store_name: &str,
    node_org: &str,
    agbot_url: &str,
) -> Result<bool, CompCheckError> {
    let parsed = parse_vault_secret_name(store_name).map_err(|err| {
        CompCheckError::Validation(format!("Error parsing secret name in the secret binding. {err}"))
    })?;
    collaborators.vault_secret_exists(agbot_url, node_org, &parsed.user, &parsed.name).map_err(|err| {
        CompCheckError::Exchange(format!("Error checking secret {store_name} in the secret manager. {err}"))
    })
}

/// Checks every distinct store name once and returns a problem description
/// per name that could not be verified.
///
/// # Errors
/// Returns [`CompCheckError::Input`] without an agbot url or node org.
pub fn verify_vault_secrets(
    collaborators: &dyn Collaborators,
    bindings: &[SecretBinding],
    node_org: &str,
    agbot_url: &str,
) -> Result<BTreeMap<String, String>, CompCheckError> {
    let mut problems = BTreeMap::new();
    if bindings.is_empty() {
        return Ok(problems);
    }
    require_store(agbot_url, node_org)?;
    let mut checked = BTreeSet::new();
    for secret in bindings.iter().flat_map(|binding| &binding.secrets) {
        let store_name = secret.store_name();
        if !checked.insert(store_name) {
            continue;
        }
        match verify_single_vault_secret(collaborators, store_name, node_org, agbot_url) {
            Ok(true) => {}
            Ok(false) => {
                problems.insert(
                    store_name.to_string(),
                    format!("Secret {store_name} does not exist in the secret manager."),
                );
            }
            Err(err) => {
                problems.insert(store_name.to_string(), err.to_string());
            }
        }
    }
    Ok(problems)
}

/// Checks every distinct store name once, stopping at the first missing
/// one. Returns the verdict and the reason for a missing name.
///
/// # Errors
/// Returns [`CompCheckError::Input`] without an agbot url or node org, and
/// the query error of [`verify_single_vault_secret`].
pub fn verify_vault_secrets_strict(
    collaborators: &dyn Collaborators,
    bindings: &[SecretBinding],
    node_org: &str,
    agbot_url: &str,
) -> Result<(bool, String), CompCheckError> {
    if bindings.is_empty() {
        return Ok((true, String::new()));
    }
    require_store(agbot_url, node_org)?;
    let mut checked = BTreeSet::new();
    for secret in bindings.iter().flat_map(|binding| &binding.secrets) {
        let store_name = secret.store_name();
        if !checked.insert(store_name) {
            continue;
        }
        if !verify_single_vault_secret(collaborators, store_name, node_org, agbot_url)? {
            return Ok((false, format!("Secret {store_name} does not exist in the secret manager.")));
        }
    }
    Ok((true, String::new()))
}

// ============================================================================
// SECTION: Service Closures
// ============================================================================

/// Verifies the bindings for a service and its known dependencies, then
/// checks the needed store names exist when an agbot url is set.
///
/// # Errors
/// Returns [`CompCheckError::Exchange`] when the secret store check fails.
/// Unbound secrets are reported in the verdict.
pub fn verify_secret_binding_for_service_cache(
    scope: SecretScope<'_>,
    top: &dyn ServiceDefinition,
    dependencies: &ServiceMap,
) -> Result<SecretVerdict, CompCheckError> {
    let mut index_map = IndexMap::new();
    let mismatch = |reason: String, index_map: IndexMap| SecretVerdict {
        compatible: false,
        reason,
        index_map,
    };
    match validate_secret_binding_for_single_service(scope.bindings, top) {
        Ok((index, needed)) => update_index_map(&mut index_map, index, &needed),
        Err(err) => return Ok(mismatch(err.to_string(), index_map)),
    }
    for (id, definition) in dependencies {
        let dependency = ExchangeService::from_id(id, definition.clone());
        match validate_secret_binding_for_single_service(scope.bindings, &dependency) {
            Ok((index, needed)) => update_index_map(&mut index_map, index, &needed),
            Err(err) => return Ok(mismatch(err.to_string(), index_map)),
        }
    }
    if let Some(agbot_url) = scope.agbot_url.filter(|url| !url.is_empty()) {
        let (needed, _) = group_secret_bindings(scope.bindings, &index_map);
        let (compatible, reason) =
            verify_vault_secrets_strict(scope.collaborators, &needed, scope.node_org, agbot_url).map_err(|err| {
                CompCheckError::Exchange(format!("Error verifying secret in the secret manager. {err}"))
            })?;
        return Ok(SecretVerdict {
            compatible,
            reason,
            index_map,
        });
    }
    Ok(SecretVerdict {
        compatible: true,
        reason: String::new(),
        index_map,
    })
}

/// Resolves a service and its dependencies through the collaborators and
/// verifies their bindings.
///
/// # Errors
/// Returns [`CompCheckError::Exchange`] when the service cannot be resolved
/// or the secret store check fails.
pub fn verify_secret_binding_for_service(
    scope: SecretScope<'_>,
    spec: &ServiceSpec,
) -> Result<(SecretVerdict, ServiceClosure), CompCheckError> {
    let resolved = scope
        .collaborators
        .resolve_service(&spec.url, &spec.org, &spec.version_range, &spec.arch)
        .map_err(|err| {
            CompCheckError::Exchange(format!("Error retrieving service from the Exchange for {spec}. {err}"))
        })?;
    let top = ServiceFile::from_definition(&ExchangeService {
        org: spec.org.clone(),
        definition: resolved.definition,
    });
    let verdict = verify_secret_binding_for_service_cache(scope, &top, &resolved.dependencies)?;
    Ok((
        verdict,
        ServiceClosure {
            id: resolved.id,
            top,
            dependencies: resolved.dependencies,
        },
    ))
}

/// Verifies the bindings of a supplied service, resolving its dependencies
/// from `known` first and the collaborators second.
///
/// # Errors
/// Returns [`CompCheckError::General`] when a dependency cannot be found
/// and the secret store error of the cache check.
pub fn verify_secret_binding_for_service_def(
    scope: SecretScope<'_>,
    service: &dyn ServiceDefinition,
    known: Option<&ServiceMap>,
) -> Result<(SecretVerdict, ServiceMap), CompCheckError> {
    let dependencies = get_service_dependent_defs(service, known, scope.collaborators).map_err(|err| {
        CompCheckError::General(format!(
            "Failed to find the dependent services for {}/{} {} {}. {err}",
            service.org(),
            service.url(),
            service.arch(),
            service.version()
        ))
    })?;
    let verdict = verify_secret_binding_for_service_cache(scope, service, &dependencies)?;
    Ok((verdict, dependencies))
}

// ============================================================================
// SECTION: Check Pipeline
// ============================================================================

/// Verdicts gathered while walking the services.
#[derive(Default)]
struct SecretVerdicts {
    /// Reason per service id.
    messages: BTreeMap<String, String>,
    /// Compatible services by id.
    compatible: BTreeMap<String, ServiceFile>,
    /// Incompatible services by id.
    incompatible: BTreeMap<String, ServiceFile>,
    /// Services whose deployment does not fit the node type.
    type_mismatch: BTreeSet<String>,
    /// Every top level service checked.
    services: Vec<ServiceFile>,
    /// Every dependency resolved.
    dependencies: ServiceMap,
    /// Bindings needed so far.
    index_map: IndexMap,
}

impl SecretVerdicts {
    /// Records the verdict of one service. Returns true when compatible.
    fn record(
        &mut self,
        node_type: &str,
        service_id: &str,
        top: ServiceFile,
        dependencies: ServiceMap,
        verdict: SecretVerdict,
    ) -> bool {
        self.dependencies.extend(dependencies);
        self.services.push(top.clone());
        combine_index_map(&mut self.index_map, verdict.index_map);
        let (type_compatible, type_reason) = check_type_compatibility(node_type, &top);
        let reason = if type_compatible {
            verdict.reason
        } else {
            self.type_mismatch.insert(service_id.to_string());
            type_reason
        };
        let compatible = verdict.compatible && type_compatible;
        debug!(service = service_id, compatible, reason = reason.as_str(), "service secret bindings evaluated");
        if compatible {
            self.compatible.insert(service_id.to_string(), top);
            self.messages.insert(service_id.to_string(), COMPATIBLE.to_string());
        } else {
            self.incompatible.insert(service_id.to_string(), top);
            self.messages.insert(
                service_id.to_string(),
                format_reason_message(&reason, !type_compatible, SECRET_BINDING_INCOMPATIBLE),
            );
        }
        compatible
    }
}

/// Checks that a deployment policy or pattern binds every secret of the
/// services it would deploy on a node.
///
/// A deployment policy is compatible only when every service is; a pattern
/// is compatible when each service is compatible or merely targets another
/// node type, as long as at least one service fits.
///
/// # Errors
/// Returns a [`CompCheckError`] for bad input, a cluster node, unresolvable
/// documents and failed lookups.
pub fn secret_binding_compatible(
    collaborators: &dyn Collaborators,
    engine: &ConstraintEngine,
    agbot_url: Option<&str>,
    input: &SecretBindingCheck,
    check_all: bool,
) -> Result<CompCheckOutput, CompCheckError> {
    let mut resources = CompCheckResource::from_secret_binding_check(input);
    resolve_exchange_node(collaborators, &mut resources)?;
    if resources.node_type == NODE_TYPE_CLUSTER {
        return Err(CompCheckError::Input(format!(
            "Node type '{}' does not support secret binding check.",
            resources.node_type
        )));
    }

    let use_business_policy = !input.business_policy_id.is_empty() || input.business_policy.is_some();
    let use_pattern = !input.pattern_id.is_empty() || input.pattern.is_some();
    if use_business_policy && use_pattern {
        return Err(CompCheckError::Input("Deployment policy and pattern are mutually exclusive.".to_string()));
    }
    if !use_business_policy && !use_pattern {
        return Err(CompCheckError::Input("Neither deployment policy nor pattern is specified.".to_string()));
    }

    let (bindings, references) = if use_business_policy {
        let (business, _) = process_business_policy(
            collaborators,
            engine,
            &input.business_policy_id,
            input.business_policy.as_ref(),
            false,
        )?;
        let references = workloads_from_business_policy(&business, &resources.node_arch);
        let bindings = business.secret_binding.clone();
        resources.business_policy = Some(business);
        (bindings, references)
    } else {
        let pattern = process_pattern(collaborators, &input.pattern_id, input.pattern.as_ref())?;
        let references = workloads_from_pattern(&pattern, &resources.node_arch);
        let bindings = pattern.secret_binding.clone();
        resources.pattern = Some(pattern);
        (bindings, references)
    };
    if references.is_empty() {
        return Err(CompCheckError::Validation(if resources.node_arch.is_empty() {
            "No service versions specified in the deployment policy or pattern.".to_string()
        } else {
            format!(
                "No service versions with architecture {} specified in the deployment policy or pattern.",
                resources.node_arch
            )
        }));
    }
    validate_services(
        &resources.service,
        resources.business_policy.as_ref(),
        resources.pattern.as_ref(),
        &input.service_to_check,
    )?;

    let node_org = resources.node_org.clone();
    let node_type = resources.node_type.clone();
    let scope = SecretScope {
        collaborators,
        bindings: &bindings,
        agbot_url,
        node_org: &node_org,
    };
    let known = Some(&input.dependent_services);
    let mut verdicts = SecretVerdicts::default();
    let mut overall = true;

    for reference in &references {
        let mut service_compatible = false;
        for choice in &reference.service_versions {
            let arch = reference.service_arch.as_str();
            if input.service.is_empty() && !arch.is_empty() && arch != "*" {
                let service_id = form_org_service_id(&reference.service_orgid, &reference.service_url, &choice.version, arch);
                if !need_handle_service(&service_id, &input.service_to_check) {
                    continue;
                }
                let spec = ServiceSpec::new(&reference.service_url, &reference.service_orgid, &choice.version, arch);
                let (verdict, closure) = verify_secret_binding_for_service(scope, &spec)?;
                if verdicts.record(&node_type, &service_id, closure.top, closure.dependencies, verdict) {
                    service_compatible = true;
                    if !check_all {
                        break;
                    }
                }
            } else if input.service.is_empty() {
                let selected = collaborators
                    .selected_services(&reference.service_url, &reference.service_orgid, &choice.version, "")
                    .map_err(|err| {
                        CompCheckError::Exchange(format!(
                            "Error getting services for all archetctures for {}/{} version {}. {err}",
                            reference.service_orgid, reference.service_url, choice.version
                        ))
                    })?;
                for (service_id, definition) in &selected {
                    if !need_handle_service(service_id, &input.service_to_check) {
                        continue;
                    }
                    let top = ServiceFile::from_definition(&ExchangeService::from_id(service_id, definition.clone()));
                    let (verdict, dependencies) = verify_secret_binding_for_service_def(scope, &top, known)?;
                    if verdicts.record(&node_type, service_id, top, dependencies, verdict) {
                        service_compatible = true;
                        if !check_all {
                            break;
                        }
                    }
                }
                if service_compatible && !check_all {
                    break;
                }
            } else {
                let service_id = form_org_service_id(&reference.service_orgid, &reference.service_url, &choice.version, arch);
                if !need_handle_service(&service_id, &input.service_to_check) {
                    continue;
                }
                let Some(found) = get_service_from_input(
                    &reference.service_url,
                    &reference.service_orgid,
                    &choice.version,
                    arch,
                    &input.service,
                ) else {
                    verdicts.messages.insert(
                        service_id.clone(),
                        format!("{SECRET_BINDING_INCOMPATIBLE}: Service definition not found in the input."),
                    );
                    verdicts.incompatible.insert(service_id, ServiceFile::default());
                    continue;
                };
                let mut top = found.clone();
                if top.org.is_empty() {
                    top.org.clone_from(&reference.service_orgid);
                }
                let (verdict, dependencies) = verify_secret_binding_for_service_def(scope, &top, known)?;
                if verdicts.record(&node_type, &service_id, top, dependencies, verdict) {
                    service_compatible = true;
                    if !check_all {
                        break;
                    }
                }
            }
        }
        if overall
            && !service_compatible
            && (use_business_policy || verdicts.incompatible.len() != verdicts.type_mismatch.len())
        {
            overall = false;
        }
    }

    if overall && !use_business_policy && verdicts.compatible.is_empty() && !verdicts.type_mismatch.is_empty() {
        overall = false;
    }

    let (needed, extraneous) = group_secret_bindings(&bindings, &verdicts.index_map);
    resources.dependent_services = verdicts.dependencies;
    resources.service = verdicts.services;
    resources.needed_secret_binding = needed;
    resources.extraneous_secret_binding = extraneous;

    let mut messages = verdicts.messages;
    if messages.is_empty() {
        let reason = if resources.node_arch.is_empty() {
            "No services found in the deployment policy or pattern.".to_string()
        } else {
            format!("Service with 'arch' {} cannot be found in the deployment policy or pattern.", resources.node_arch)
        };
        messages.insert(GENERAL_REASON_KEY.to_string(), format!("{SECRET_BINDING_INCOMPATIBLE}: {reason}"));
        return Ok(CompCheckOutput::new(false, messages, resources));
    }
    if overall {
        resources.service = verdicts.compatible.into_values().collect();
        if !resources.extraneous_secret_binding.is_empty() {
            let unused = resources
                .extraneous_secret_binding
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" ");
            warn!(bindings = unused.as_str(), "secret bindings not required by any service");
            messages.insert(
                GENERAL_REASON_KEY.to_string(),
                format!("Warning: The following secret bindings are not required by any services: [{unused}]"),
            );
        }
    } else {
        resources.service = verdicts.incompatible.into_values().collect();
    }
    Ok(CompCheckOutput::new(overall, messages, resources))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
