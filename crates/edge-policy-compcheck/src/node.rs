// crates/edge-policy-compcheck/src/node.rs
// ============================================================================
// Module: Node Resolution
// Description: Node record, node type, and node policy resolution.
// Purpose: Produce the producer side of a compatibility check.
// Dependencies: edge-policy-core
// ============================================================================

//! ## Overview
//! A node is identified either by id, in which case its record and policy
//! come from the collaborators, or by an explicit policy in the input. An
//! explicit architecture or type must agree with the registered record.

use edge_policy_core::ConstraintEngine;
use edge_policy_core::ExternalPolicy;
use edge_policy_core::Policy;
use edge_policy_core::Property;
use edge_policy_core::PropertyList;
use edge_policy_core::builtin::NODE_TYPE_CLUSTER;
use edge_policy_core::builtin::NODE_TYPE_DEVICE;
use edge_policy_core::builtin::PROP_NODE_ARCH;
use edge_policy_core::constraint::ConstraintExpression;
use edge_policy_core::policy::make_external_policy_header_name;
use edge_policy_core::policy::merge_policy_with_external_policy;
use edge_policy_core::service::org_of;

use crate::collaborators::Collaborators;
use crate::collaborators::ExchangeNode;
use crate::error::CompCheckError;
use crate::resource::CompCheckResource;

/// Header id used for a node policy supplied without a node id.
const TEMP_NODE_POLICY_ID: &str = "TempNodePolicyId";

// ============================================================================
// SECTION: Node Record
// ============================================================================

/// Fetches the node registered as `node_id`.
///
/// # Errors
/// Returns [`CompCheckError::Input`] for an empty id, an id without an org,
/// or an unknown node, and [`CompCheckError::Exchange`] when the lookup
/// fails.
pub fn get_exchange_node(
    collaborators: &dyn Collaborators,
    node_id: &str,
) -> Result<ExchangeNode, CompCheckError> {
    if node_id.is_empty() {
        return Err(CompCheckError::Input("The given node id is empty.".to_string()));
    }
    if org_of(node_id).is_empty() {
        return Err(CompCheckError::Input(format!(
            "Organization is not specified in the given node id: {node_id}."
        )));
    }
    match collaborators.get_device(node_id) {
        Err(err) => Err(CompCheckError::Exchange(format!(
            "Error getting node {node_id} from the Exchange. {err}"
        ))),
        Ok(None) => Err(CompCheckError::Input(format!("No node found for this node id {node_id}."))),
        Ok(Some(node)) => Ok(node),
    }
}

/// Fills node org, arch and type from the registered node when the
/// resource names a node id, returning that record; otherwise only checks
/// the input type.
///
/// # Errors
/// Returns the lookup error, or [`CompCheckError::Input`] when the input
/// architecture or type differs from the registered one.
pub fn resolve_exchange_node(
    collaborators: &dyn Collaborators,
    resources: &mut CompCheckResource,
) -> Result<Option<ExchangeNode>, CompCheckError> {
    let node_id = resources.node_id.clone();
    if node_id.is_empty() {
        resources.node_type = verify_node_type(&resources.node_type, "", "")?;
        return Ok(None);
    }
    if resources.node_org.is_empty() {
        resources.node_org = org_of(&node_id).to_string();
    }
    let node = get_exchange_node(collaborators, &node_id)?;
    if resources.node_arch.is_empty() {
        resources.node_arch.clone_from(&node.arch);
    } else if !node.arch.is_empty() && node.arch != resources.node_arch {
        return Err(CompCheckError::Input(format!(
            "The input node architecture {} does not match the Exchange node architecture {} for \
             node {node_id}.",
            resources.node_arch, node.arch
        )));
    }
    resources.node_type = verify_node_type(&resources.node_type, &node.node_type, &node_id)?;
    Ok(Some(node))
}

/// Checks the input node type and reconciles it with the registered one.
/// Without either, the node is a device.
///
/// # Errors
/// Returns [`CompCheckError::Input`] for an unknown type or a mismatch.
pub fn verify_node_type(
    node_type: &str,
    exchange_node_type: &str,
    node_id: &str,
) -> Result<String, CompCheckError> {
    if node_type.is_empty() {
        if exchange_node_type.is_empty() {
            return Ok(NODE_TYPE_DEVICE.to_string());
        }
        return Ok(exchange_node_type.to_string());
    }
    if node_type != NODE_TYPE_DEVICE && node_type != NODE_TYPE_CLUSTER {
        return Err(CompCheckError::Input(format!(
            "Invalid node type: {node_type}. It must be 'device' or 'cluster'."
        )));
    }
    if !exchange_node_type.is_empty() && node_type != exchange_node_type {
        return Err(CompCheckError::Input(format!(
            "The input node type '{node_type}' does not match the node type '{exchange_node_type}' \
             from the node {node_id}."
        )));
    }
    Ok(node_type.to_string())
}

// ============================================================================
// SECTION: Node Policy
// ============================================================================

/// Validates the supplied node policy, or fetches it by node id, and
/// converts it to the internal form.
///
/// # Errors
/// Returns [`CompCheckError::Validation`] or [`CompCheckError::Conversion`]
/// for a bad policy, and [`CompCheckError::Input`] when neither a policy nor
/// a node id is given or the node has no policy.
pub fn process_node_policy(
    collaborators: &dyn Collaborators,
    engine: &ConstraintEngine,
    node_id: &str,
    input: Option<&ExternalPolicy>,
) -> Result<(ExternalPolicy, Policy), CompCheckError> {
    if let Some(input) = input {
        let mut external = input.clone();
        external.validate_and_normalize(engine).map_err(|err| {
            CompCheckError::Validation(format!("Failed to validate the node policy. {err}"))
        })?;
        let node_id = if node_id.is_empty() { TEMP_NODE_POLICY_ID } else { node_id };
        let policy = Policy::from_external(&external, &make_external_policy_header_name(node_id), engine)
            .map_err(|err| {
                CompCheckError::Conversion(format!(
                    "Failed to convert node policy to internal policy format for node {node_id}: {err}"
                ))
            })?;
        return Ok((external, policy));
    }
    if node_id.is_empty() {
        return Err(CompCheckError::Input("Neither node policy nor node id is specified.".to_string()));
    }
    get_node_policy(collaborators, engine, node_id)?
        .ok_or_else(|| CompCheckError::Input(format!("No node policy found for this node {node_id}.")))
}

/// Fetches and converts the policy of `node_id`; `None` when the node has
/// no policy.
///
/// # Errors
/// Returns [`CompCheckError::Input`] for a bad id, [`CompCheckError::Exchange`]
/// when the lookup fails, and a validation or conversion error for a bad
/// policy.
pub fn get_node_policy(
    collaborators: &dyn Collaborators,
    engine: &ConstraintEngine,
    node_id: &str,
) -> Result<Option<(ExternalPolicy, Policy)>, CompCheckError> {
    if node_id.is_empty() {
        return Err(CompCheckError::Input("Node id is empty.".to_string()));
    }
    if org_of(node_id).is_empty() {
        return Err(CompCheckError::Input(format!(
            "Organization is not specified in the node id: {node_id}."
        )));
    }
    let Some(mut external) = collaborators.node_policy(node_id).map_err(|err| {
        CompCheckError::Exchange(format!("Error trying to query node policy for {node_id}: {err}"))
    })?
    else {
        return Ok(None);
    };
    external.validate_and_normalize(engine).map_err(|err| {
        CompCheckError::Validation(format!("Failed to validate the node policy for node {node_id}. {err}"))
    })?;
    let policy = Policy::from_external(&external, &make_external_policy_header_name(node_id), engine)
        .map_err(|err| {
            CompCheckError::Conversion(format!(
                "Failed to convert node policy to internal policy for node {node_id}: {err}"
            ))
        })?;
    Ok(Some((external, policy)))
}

/// Adds the architecture property to a node policy; an empty `arch` leaves
/// the policy unchanged.
///
/// # Errors
/// Returns [`CompCheckError::Merging`] when the policy declares another
/// architecture.
pub fn add_node_arch_to_policy(policy: &Policy, arch: &str) -> Result<Policy, CompCheckError> {
    if arch.is_empty() {
        return Ok(policy.clone());
    }
    let builtin = ExternalPolicy::new(
        PropertyList::from(vec![Property::new(PROP_NODE_ARCH, arch)]),
        ConstraintExpression::default(),
    );
    merge_policy_with_external_policy(policy, &builtin).map_err(|err| {
        CompCheckError::Merging(format!("Error merging node policy with arch property. {err}"))
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================
