// crates/edge-policy-compcheck/src/privilege.rs
// ============================================================================
// Module: Service Privilege
// Description: Privileged deployment detection across a service closure.
// Purpose: Derive the service privilege property from what actually deploys.
// Dependencies: edge-policy-core, serde_json, tracing
// ============================================================================

//! ## Overview
//! A workload needs a privileged node when any container in its service or
//! in any dependency runs privileged or on the host network. The service
//! policy is then forced to `openhorizon.allowPrivileged = true` and gains a
//! matching constraint so the node must allow privilege too.
//!
//! Patterns carry no service policy, so a pattern deployment is instead
//! compared directly with the node's privilege property.

use std::collections::BTreeMap;

use edge_policy_core::ConstraintEngine;
use edge_policy_core::ExchangeService;
use edge_policy_core::ExternalPolicy;
use edge_policy_core::Property;
use edge_policy_core::PropertyList;
use edge_policy_core::PropertyValue;
use edge_policy_core::ServiceDefinition;
use edge_policy_core::ServiceFile;
use edge_policy_core::builtin::PROP_NODE_PRIVILEGED;
use edge_policy_core::builtin::PROP_SVC_PRIVILEGED;
use edge_policy_core::service::deployment_requires_privilege;
use serde_json::Value;
use tracing::debug;

use crate::collaborators::Collaborators;
use crate::collaborators::ServiceMap;
use crate::deployment::process_pattern;
use crate::deployment::workloads_from_pattern;
use crate::error::CompCheckError;
use crate::node::process_node_policy;
use crate::resource::CompCheck;
use crate::resource::CompCheckOutput;
use crate::resource::CompCheckResource;
use crate::services::ServiceClosure;
use crate::services::ServiceSpec;
use crate::services::get_service_and_deps;

/// Constraint added to a service policy whose services need privilege.
const PRIVILEGED_CONSTRAINT: &str = "openhorizon.allowPrivileged = true";

/// Returns whether the top level service or any dependency needs
/// privilege, with the ids of those that do.
///
/// # Errors
/// Returns [`CompCheckError::Conversion`] when a deployment does not decode.
pub fn services_require_privilege(
    top: Option<&dyn ServiceDefinition>,
    top_id: &str,
    dependencies: &ServiceMap,
) -> Result<(bool, Vec<String>), CompCheckError> {
    let mut privileged = Vec::new();
    if let Some(top) = top
        && requires_privilege(&top.deployment(), top_id)?
    {
        privileged.push(top_id.to_string());
    }
    for (id, definition) in dependencies {
        if requires_privilege(&Value::String(definition.deployment.clone()), id)? {
            privileged.push(id.clone());
        }
    }
    Ok((!privileged.is_empty(), privileged))
}

/// Checks one deployment, naming the service on decode failure.
fn requires_privilege(deployment: &Value, service_id: &str) -> Result<bool, CompCheckError> {
    deployment_requires_privilege(deployment).map_err(|err| {
        CompCheckError::Conversion(format!(
            "Failed to check whether service {service_id} requires privileged mode. {err}"
        ))
    })
}

/// Returns the explicit boolean value of privilege property `name`, if any.
fn declared_privilege(properties: &PropertyList, name: &str) -> Option<bool> {
    properties.get(name).and_then(|property| match &property.value {
        PropertyValue::Bool(flag) => Some(*flag),
        PropertyValue::String(text) if text == "true" => Some(true),
        PropertyValue::String(text) if text == "false" => Some(false),
        _ => None,
    })
}

/// Sets the privilege property of `policy` from the services in `closure`.
///
/// A service policy that already allows privilege is left allowing it.
///
/// # Errors
/// Returns [`CompCheckError::Conversion`] when a deployment does not decode,
/// and [`CompCheckError::Input`] when the policy forbids privilege the
/// services need.
pub fn set_service_policy_privilege(
    policy: &ExternalPolicy,
    closure: &ServiceClosure,
) -> Result<ExternalPolicy, CompCheckError> {
    let (privileged, ids) = services_require_privilege(Some(&closure.top), &closure.id, &closure.dependencies)?;
    let mut updated = policy.clone();
    let declared = declared_privilege(&policy.properties, PROP_SVC_PRIVILEGED);
    if privileged {
        if declared == Some(false) {
            return Err(CompCheckError::Input(format!(
                "Services {} require privileged mode or host networking, but the service policy sets \
                 {PROP_SVC_PRIVILEGED} to false.",
                ids.join(", ")
            )));
        }
        updated
            .properties
            .add_property(Property::new(PROP_SVC_PRIVILEGED, true), true)
            .map_err(|err| CompCheckError::Merging(err.to_string()))?;
        if !updated.constraints.as_slice().iter().any(|constraint| constraint == PRIVILEGED_CONSTRAINT) {
            updated.constraints.add_constraint(PRIVILEGED_CONSTRAINT);
        }
    } else if declared.is_none() {
        updated
            .properties
            .add_property(Property::new(PROP_SVC_PRIVILEGED, false), true)
            .map_err(|err| CompCheckError::Merging(err.to_string()))?;
    }
    Ok(updated)
}

/// Rejects a deployment policy that forbids privilege the services in
/// `closure` need.
///
/// # Errors
/// Returns [`CompCheckError::Conversion`] when a deployment does not decode,
/// and [`CompCheckError::Input`] when the deployment policy sets the
/// privilege property to false for a privileged closure.
pub fn check_deployment_privilege(
    deployment_properties: &PropertyList,
    closure: &ServiceClosure,
) -> Result<(), CompCheckError> {
    if declared_privilege(deployment_properties, PROP_SVC_PRIVILEGED) != Some(false) {
        return Ok(());
    }
    let (privileged, ids) = services_require_privilege(Some(&closure.top), &closure.id, &closure.dependencies)?;
    if privileged {
        return Err(CompCheckError::Input(format!(
            "Services {} require privileged mode or host networking, but the deployment policy sets \
             {PROP_SVC_PRIVILEGED} to false.",
            ids.join(", ")
        )));
    }
    Ok(())
}

// ============================================================================
// SECTION: Pattern Privilege
// ============================================================================

/// Reason recorded for a pattern service version that needs privilege.
fn privileged_reason(version: &str, ids: &[String]) -> String {
    format!(
        "Version {version} of this service requires the following workloads that will only run on a privileged \
         node. [{}]",
        ids.join(" ")
    )
}

/// Checks whether the pattern's services for the node architecture need
/// privilege a node without `openhorizon.allowPrivileged = true` cannot
/// give. Without a node id or node policy there is nothing to compare.
///
/// With `check_all` every service version is evaluated; otherwise the first
/// privileged one decides. With `quiet`, service versions that cannot be
/// resolved are skipped.
///
/// # Errors
/// Returns the node policy or pattern resolution error, the service lookup
/// error unless `quiet`, and [`CompCheckError::Conversion`] when a
/// deployment does not decode.
pub fn evaluate_pattern_privilege_compatibility(
    collaborators: &dyn Collaborators,
    engine: &ConstraintEngine,
    input: &CompCheck,
    check_all: bool,
    quiet: bool,
) -> Result<CompCheckOutput, CompCheckError> {
    let mut resources = CompCheckResource {
        node_id: input.node_id.clone(),
        node_arch: input.node_arch.clone(),
        pattern_id: input.pattern_id.clone(),
        ..CompCheckResource::default()
    };
    if input.node_id.is_empty() && input.node_policy.is_none() {
        return Ok(CompCheckOutput::new(true, BTreeMap::new(), resources));
    }
    let (node_policy, _) = process_node_policy(collaborators, engine, &input.node_id, input.node_policy.as_ref())?;
    let node_privileged = declared_privilege(&node_policy.properties, PROP_NODE_PRIVILEGED) == Some(true);
    resources.node_policy = Some(node_policy);
    if node_privileged {
        return Ok(CompCheckOutput::new(true, BTreeMap::new(), resources));
    }

    let pattern = process_pattern(collaborators, &input.pattern_id, input.pattern.as_ref())?;
    let references = workloads_from_pattern(&pattern, &input.node_arch);
    resources.pattern = Some(pattern);

    let mut compatible = Vec::new();
    let mut incompatible = Vec::new();
    let mut messages = BTreeMap::new();
    for reference in &references {
        for choice in &reference.service_versions {
            let spec = ServiceSpec::new(
                &reference.service_url,
                &reference.service_orgid,
                &choice.version,
                &reference.service_arch,
            );
            let closure = match get_service_and_deps(&spec, &input.service, None, collaborators) {
                Ok(closure) => closure,
                Err(err) if quiet => {
                    debug!(service = %spec, error = %err, "service skipped in pattern privilege check");
                    continue;
                }
                Err(err) => return Err(err),
            };
            let (privileged, ids) =
                services_require_privilege(Some(&closure.top), &closure.id, &closure.dependencies)?;
            if !privileged {
                compatible.push(closure.top);
                continue;
            }
            for id in &ids {
                if *id == closure.id {
                    incompatible.push(closure.top.clone());
                } else if let Some(definition) = closure.dependencies.get(id) {
                    incompatible.push(ServiceFile::from_definition(&ExchangeService::from_id(id, definition.clone())));
                }
            }
            messages.insert(closure.id.clone(), privileged_reason(&choice.version, &ids));
            if !check_all {
                resources.service = incompatible;
                return Ok(CompCheckOutput::new(false, messages, resources));
            }
        }
    }
    if messages.is_empty() {
        resources.service = compatible;
        return Ok(CompCheckOutput::new(true, messages, resources));
    }
    resources.service = incompatible;
    Ok(CompCheckOutput::new(false, messages, resources))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
