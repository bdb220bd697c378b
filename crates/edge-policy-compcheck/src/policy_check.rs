// crates/edge-policy-compcheck/src/policy_check.rs
// ============================================================================
// Module: Policy Compatibility
// Description: Node policy against deployment and service policy evaluation.
// Purpose: Decide per service whether a deployment can run on a node.
// Dependencies: edge-policy-core, tracing
// ============================================================================

//! ## Overview
//! For every service version a deployment policy names, the service policy
//! is completed with built-in service properties and the derived privilege
//! flag, merged into the deployment policy, and evaluated against the node
//! policy in both directions. Each service gets its own verdict; a single
//! incompatible service is a result, not an error.

use std::collections::BTreeMap;

use edge_policy_core::ConstraintEngine;
use edge_policy_core::ExternalPolicy;
use edge_policy_core::Policy;
use edge_policy_core::ServiceDefinition;
use edge_policy_core::ServiceFile;
use edge_policy_core::Workload;
use edge_policy_core::builtin::NODE_TYPE_CLUSTER;
use edge_policy_core::builtin::NODE_TYPE_DEVICE;
use edge_policy_core::builtin::service_builtin_policy;
use edge_policy_core::policy::are_compatible;
use edge_policy_core::policy::merge_policy_with_external_policy;
use edge_policy_core::service::deployment_is_empty;
use edge_policy_core::service::form_org_service_id;
use tracing::debug;

use crate::collaborators::Collaborators;
use crate::collaborators::ServiceMap;
use crate::deployment::process_business_policy;
use crate::error::CompCheckError;
use crate::node::add_node_arch_to_policy;
use crate::node::process_node_policy;
use crate::node::resolve_exchange_node;
use crate::privilege::check_deployment_privilege;
use crate::privilege::set_service_policy_privilege;
use crate::resource::COMPATIBLE;
use crate::resource::CompCheckOutput;
use crate::resource::CompCheckResource;
use crate::resource::GENERAL_REASON_KEY;
use crate::resource::POLICY_INCOMPATIBLE;
use crate::resource::PolicyCheck;
use crate::services::ServiceClosure;
use crate::services::ServiceSpec;
use crate::services::get_service_and_deps;

// ============================================================================
// SECTION: Service Policy
// ============================================================================

/// A completed service policy and everything resolved to build it.
#[derive(Debug, Clone, PartialEq)]
pub struct ServicePolicyResolution {
    /// Service policy plus built-in properties and the privilege flag.
    pub merged: ExternalPolicy,
    /// The service policy as registered, if any.
    pub service_policy: Option<ExternalPolicy>,
    /// Service id the policy is registered under.
    pub service_id: String,
    /// The service and its dependencies.
    pub closure: ServiceClosure,
}

/// Fetches and validates the policy attached to a service, returning it
/// with the service id.
///
/// # Errors
/// Returns [`CompCheckError::Input`] for an empty url or org,
/// [`CompCheckError::Exchange`] when the lookup fails, and
/// [`CompCheckError::Validation`] for an invalid policy.
pub fn get_service_policy(
    collaborators: &dyn Collaborators,
    engine: &ConstraintEngine,
    spec: &ServiceSpec,
) -> Result<(Option<ExternalPolicy>, String), CompCheckError> {
    if spec.url.is_empty() {
        return Err(CompCheckError::Input("Service name is empty.".to_string()));
    }
    if spec.org.is_empty() {
        return Err(CompCheckError::Input("Service organization is empty.".to_string()));
    }
    let (policy, service_id) = collaborators
        .service_policy(&spec.url, &spec.org, &spec.version_range, &spec.arch)
        .map_err(|err| {
            CompCheckError::Exchange(format!("Error trying to query service policy for {spec}. {err}"))
        })?;
    let Some(mut policy) = policy else {
        return Ok((None, service_id));
    };
    policy.validate_and_normalize(engine).map_err(|err| {
        CompCheckError::Validation(format!("Failed to validate the service policy for {spec}. {err}"))
    })?;
    Ok((Some(policy), service_id))
}

/// Returns `service_policy` with the default properties added where absent;
/// without a service policy, the defaults alone.
///
/// # Errors
/// Returns [`CompCheckError::Merging`] when a default property is invalid.
pub fn add_default_properties_to_service_policy(
    service_policy: Option<&ExternalPolicy>,
    defaults: &ExternalPolicy,
) -> Result<ExternalPolicy, CompCheckError> {
    let Some(policy) = service_policy else {
        return Ok(defaults.clone());
    };
    let mut merged = policy.clone();
    merged.merge_with(defaults, false).map_err(|err| {
        CompCheckError::Merging(format!("Failed to add default properties to the service policy. {err}"))
    })?;
    Ok(merged)
}

/// Fetches the policy of a service and completes it with built-in
/// properties and the privilege flag of its dependency closure.
///
/// # Errors
/// Returns the lookup, validation and resolution errors of the steps.
pub fn get_service_policy_with_default_properties(
    collaborators: &dyn Collaborators,
    engine: &ConstraintEngine,
    spec: &ServiceSpec,
    services: &[ServiceFile],
    known: Option<&ServiceMap>,
) -> Result<ServicePolicyResolution, CompCheckError> {
    let (service_policy, registered_id) = get_service_policy(collaborators, engine, spec)?;
    let defaults = service_builtin_policy(&spec.url, &spec.org, &spec.version_range, &spec.arch);
    let merged = add_default_properties_to_service_policy(service_policy.as_ref(), &defaults)?;
    let closure = get_service_and_deps(spec, services, known, collaborators)?;
    let merged = set_service_policy_privilege(&merged, &closure)?;
    let service_id = if registered_id.is_empty() { closure.id.clone() } else { registered_id };
    Ok(ServicePolicyResolution {
        merged,
        service_policy,
        service_id,
        closure,
    })
}

/// Merges a completed service policy into the deployment policy.
///
/// # Errors
/// Returns [`CompCheckError::Merging`] when the two declare different
/// values for one property.
pub fn merge_full_service_policy_to_business_policy(
    business: &Policy,
    service_policy: Option<&ExternalPolicy>,
) -> Result<Policy, CompCheckError> {
    let Some(service_policy) = service_policy else {
        return Ok(business.clone());
    };
    merge_policy_with_external_policy(business, service_policy).map_err(|err| {
        CompCheckError::Merging(format!("Error merging deployment policy with service policy. {err}"))
    })
}

// ============================================================================
// SECTION: Compatibility
// ============================================================================

/// Checks the service has a deployment for the node type; an empty type
/// counts as a device.
#[must_use]
pub fn check_type_compatibility(node_type: &str, service: &dyn ServiceDefinition) -> (bool, String) {
    if (node_type.is_empty() || node_type == NODE_TYPE_DEVICE) && deployment_is_empty(&service.deployment()) {
        return (false, "Service does not have deployment configuration for node type 'device'.".to_string());
    }
    if node_type == NODE_TYPE_CLUSTER && deployment_is_empty(&service.cluster_deployment()) {
        return (
            false,
            "Service does not have cluster deployment configuration for node type 'cluster'.".to_string(),
        );
    }
    (true, String::new())
}

/// Evaluates the node policy, with the node architecture added, against the
/// deployment policy merged with the service policy. Returns the verdict
/// and the short reason of a mismatch.
///
/// # Errors
/// Returns [`CompCheckError::Merging`] when either merge fails.
pub fn check_policy_compatibility(
    node_policy: &Policy,
    business_policy: &Policy,
    merged_service_policy: &ExternalPolicy,
    node_arch: &str,
    engine: &ConstraintEngine,
) -> Result<(bool, String), CompCheckError> {
    let consumer = merge_full_service_policy_to_business_policy(business_policy, Some(merged_service_policy))?;
    let producer = add_node_arch_to_policy(node_policy, node_arch)?;
    match are_compatible(&producer, &consumer, engine) {
        Ok(()) => Ok((true, String::new())),
        Err(err) => Ok((false, err.short_string().to_string())),
    }
}

// ============================================================================
// SECTION: Check Pipeline
// ============================================================================

/// Fixed inputs of one policy check run.
struct PolicyContext<'a> {
    /// Lookups.
    collaborators: &'a dyn Collaborators,
    /// Constraint evaluation.
    engine: &'a ConstraintEngine,
    /// Internal node policy.
    node_policy: &'a Policy,
    /// Internal deployment policy.
    business_policy: &'a Policy,
    /// Resolved node type.
    node_type: &'a str,
    /// Resolved node architecture; may be empty.
    node_arch: &'a str,
}

impl PolicyContext<'_> {
    /// Checks type then policy compatibility of one service.
    fn check_service(&self, merged: &ExternalPolicy, top: &ServiceFile) -> Result<(bool, String), CompCheckError> {
        let (compatible, reason) = check_type_compatibility(self.node_type, top);
        if !compatible {
            return Ok((false, reason));
        }
        check_policy_compatibility(self.node_policy, self.business_policy, merged, self.node_arch, self.engine)
    }
}

/// Verdicts gathered while walking the workloads.
#[derive(Default)]
struct Verdicts {
    /// Reason per service id.
    messages: BTreeMap<String, String>,
    /// Whether any service was compatible.
    compatible: bool,
    /// Top level services resolved so far.
    services: Vec<ServiceFile>,
    /// Dependencies resolved so far.
    dependencies: ServiceMap,
}

impl Verdicts {
    /// Records a service verdict. Returns true when the check can stop.
    fn record(&mut self, service_id: &str, compatible: bool, reason: &str, check_all: bool) -> bool {
        debug!(service = service_id, compatible, reason, "service policy evaluated");
        if compatible {
            self.compatible = true;
            self.messages.insert(service_id.to_string(), COMPATIBLE.to_string());
            return !check_all;
        }
        self.messages.insert(service_id.to_string(), format!("{POLICY_INCOMPATIBLE}: {reason}"));
        false
    }

    /// Keeps the services of a closure for the output.
    fn keep(&mut self, closure: &ServiceClosure) {
        self.services.push(closure.top.clone());
        self.dependencies.extend(closure.dependencies.clone());
    }
}

/// Checks a node against every service of a deployment policy.
///
/// Without `check_all` the check stops at the first compatible service and
/// reports only that one, and services built for another architecture are
/// skipped silently.
///
/// # Errors
/// Returns a [`CompCheckError`] for bad input, unresolvable documents and
/// failed lookups. Incompatible services are reported in the output.
pub fn policy_compatible(
    collaborators: &dyn Collaborators,
    engine: &ConstraintEngine,
    input: &PolicyCheck,
    check_all: bool,
) -> Result<CompCheckOutput, CompCheckError> {
    let mut resources = CompCheckResource::from_policy_check(input);
    resolve_exchange_node(collaborators, &mut resources)?;

    let (node_external, node_policy) =
        process_node_policy(collaborators, engine, &input.node_id, input.node_policy.as_ref())?;
    resources.node_policy = Some(node_external);

    let (business, business_policy) = process_business_policy(
        collaborators,
        engine,
        &input.business_policy_id,
        input.business_policy.as_ref(),
        true,
    )?;
    resources.business_policy = Some(business);
    let Some(business_policy) = business_policy else {
        return Err(CompCheckError::General("The deployment policy was not converted.".to_string()));
    };

    let input_service_policy = match &input.service_policy {
        Some(policy) => {
            let mut validated = policy.clone();
            validated.validate_and_normalize(engine).map_err(|err| {
                CompCheckError::Validation(format!("Failed to validate the service policy. {err}"))
            })?;
            Some(validated)
        }
        None => None,
    };

    let node_type = resources.node_type.clone();
    let node_arch = resources.node_arch.clone();
    let context = PolicyContext {
        collaborators,
        engine,
        node_policy: &node_policy,
        business_policy: &business_policy,
        node_type: &node_type,
        node_arch: &node_arch,
    };
    let mut verdicts = Verdicts::default();

    for workload in &business_policy.workloads {
        let mut workload = workload.clone();
        if workload.arch == "*" {
            workload.arch.clear();
        }
        let id_arch = if workload.arch.is_empty() { "*" } else { workload.arch.as_str() };
        if !node_arch.is_empty() {
            if workload.arch.is_empty() {
                workload.arch.clone_from(&node_arch);
            } else if workload.arch != node_arch {
                if check_all {
                    let service_id =
                        form_org_service_id(&workload.org, &workload.workload_url, &workload.version, id_arch);
                    verdicts.record(&service_id, false, "Architecture does not match.", check_all);
                }
                continue;
            }
        }

        let stop = match &input_service_policy {
            Some(service_policy) => {
                check_with_input_service_policy(&context, input, service_policy, &workload, &mut verdicts, check_all)?
            }
            None if !workload.arch.is_empty() => {
                let spec = ServiceSpec::new(&workload.workload_url, &workload.org, &workload.version, &workload.arch);
                check_registered_service(&context, input, &spec, None, &mut resources, &mut verdicts, check_all)?
            }
            None => {
                let selected = collaborators
                    .selected_services(&workload.workload_url, &workload.org, &workload.version, "")
                    .map_err(|err| {
                        CompCheckError::Exchange(format!(
                            "Failed to get services for all archetctures for {}/{} version {}. {err}",
                            workload.org, workload.workload_url, workload.version
                        ))
                    })?;
                let mut stop = false;
                for (service_id, service) in &selected {
                    let spec =
                        ServiceSpec::new(&workload.workload_url, &workload.org, &workload.version, &service.arch);
                    stop = check_registered_service(
                        &context,
                        input,
                        &spec,
                        Some(service_id),
                        &mut resources,
                        &mut verdicts,
                        check_all,
                    )?;
                    if stop {
                        break;
                    }
                }
                stop
            }
        };
        if stop {
            let messages = verdicts.messages.into_iter().filter(|(_, reason)| reason == COMPATIBLE).take(1).collect();
            return Ok(CompCheckOutput::new(true, messages, resources));
        }
    }

    resources.service = verdicts.services;
    resources.dependent_services = verdicts.dependencies;
    if verdicts.messages.is_empty() {
        let reason = if node_arch.is_empty() {
            "No services found in the deployment policy.".to_string()
        } else {
            format!("Service with 'arch' {node_arch} cannot be found in the deployment policy.")
        };
        verdicts.messages.insert(GENERAL_REASON_KEY.to_string(), format!("{POLICY_INCOMPATIBLE}: {reason}"));
    }
    Ok(CompCheckOutput::new(verdicts.compatible, verdicts.messages, resources))
}

/// Checks one service using its registered service policy.
fn check_registered_service(
    context: &PolicyContext<'_>,
    input: &PolicyCheck,
    spec: &ServiceSpec,
    listed_id: Option<&String>,
    resources: &mut CompCheckResource,
    verdicts: &mut Verdicts,
    check_all: bool,
) -> Result<bool, CompCheckError> {
    let resolution = get_service_policy_with_default_properties(
        context.collaborators,
        context.engine,
        spec,
        &input.service,
        Some(&input.dependent_services),
    )?;
    check_deployment_privilege(&context.business_policy.properties, &resolution.closure)?;
    let service_id = listed_id.cloned().unwrap_or_else(|| resolution.service_id.clone());
    if let Some(policy) = &resolution.service_policy {
        resources.service_policy.insert(service_id.clone(), policy.clone());
    }
    verdicts.keep(&resolution.closure);
    let (compatible, reason) = context.check_service(&resolution.merged, &resolution.closure.top)?;
    Ok(verdicts.record(&service_id, compatible, &reason, check_all))
}

/// Checks one service using the service policy supplied with the input.
/// A service that cannot be resolved is recorded as incompatible.
fn check_with_input_service_policy(
    context: &PolicyContext<'_>,
    input: &PolicyCheck,
    service_policy: &ExternalPolicy,
    workload: &Workload,
    verdicts: &mut Verdicts,
    check_all: bool,
) -> Result<bool, CompCheckError> {
    let defaults = service_builtin_policy(&workload.workload_url, &workload.org, &workload.version, &workload.arch);
    let merged = add_default_properties_to_service_policy(Some(service_policy), &defaults)?;
    let spec = ServiceSpec::new(&workload.workload_url, &workload.org, &workload.version, &workload.arch);
    let resolved = get_service_and_deps(&spec, &input.service, Some(&input.dependent_services), context.collaborators)
        .and_then(|closure| {
            check_deployment_privilege(&context.business_policy.properties, &closure)?;
            set_service_policy_privilege(&merged, &closure).map(|merged| (merged, closure))
        });
    match resolved {
        Ok((merged, closure)) => {
            verdicts.keep(&closure);
            let (compatible, reason) = context.check_service(&merged, &closure.top)?;
            Ok(verdicts.record(&closure.id, compatible, &reason, check_all))
        }
        Err(err @ CompCheckError::Input(_)) => Err(err),
        Err(err) => {
            let service_id = form_org_service_id(&workload.org, &workload.workload_url, &workload.version, &workload.arch);
            Ok(verdicts.record(&service_id, false, err.message(), check_all))
        }
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

    use edge_policy_core::Property;
    use edge_policy_core::PropertyList;
    use edge_policy_core::builtin::PROP_NODE_ARCH;
    use edge_policy_core::constraint::ConstraintExpression;
    use serde_json::json;

    use super::*;

    /// Tests defaults never replace service policy properties.
    #[test]
    fn defaults_fill_gaps_only() {
        let service = ExternalPolicy::new(
            PropertyList::from(vec![Property::new("openhorizon.service.version", "9.9.9")]),
            ConstraintExpression::default(),
        );
        let defaults = service_builtin_policy("svc", "myorg", "1.0.0", "amd64");
        let merged = add_default_properties_to_service_policy(Some(&service), &defaults).unwrap();
        assert_eq!(merged.properties.len(), defaults.properties.len());
        assert_eq!(
            merged.properties.get("openhorizon.service.version").unwrap().value,
            Property::new("v", "9.9.9").value
        );
        assert_eq!(add_default_properties_to_service_policy(None, &defaults).unwrap(), defaults);
    }

    /// Tests node type and deployment type rules.
    #[test]
    fn type_compatibility_rules() {
        let mut service = ServiceFile {
            url: "svc".to_string(),
            cluster_deployment: json!({"operatorYamlArchive": "x"}),
            ..ServiceFile::default()
        };
        let (compatible, reason) = check_type_compatibility("", &service);
        assert!(!compatible);
        assert_eq!(reason, "Service does not have deployment configuration for node type 'device'.");
        assert!(check_type_compatibility("cluster", &service).0);
        service.cluster_deployment = serde_json::Value::Null;
        service.deployment = json!({"services": {}});
        assert!(!check_type_compatibility("cluster", &service).0);
    }

    /// Tests the node architecture is checked against the consumer constraints.
    #[test]
    fn node_arch_reaches_the_producer() {
        let engine = ConstraintEngine::builtin();
        let node = Policy::new("node");
        let mut business = Policy::new("business");
        business.constraints.add_constraint(format!("{PROP_NODE_ARCH} == arm64"));
        let service = ExternalPolicy::default();
        assert!(check_policy_compatibility(&node, &business, &service, "arm64", &engine).unwrap().0);
        let (compatible, reason) = check_policy_compatibility(&node, &business, &service, "amd64", &engine).unwrap();
        assert!(!compatible);
        assert!(reason.starts_with("Compatibility Error"));
    }
}
