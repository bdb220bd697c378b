// crates/edge-policy-compcheck/src/deployment.rs
// ============================================================================
// Module: Deployment Resolution
// Description: Deployment policy and pattern resolution and workload lists.
// Purpose: Produce the consumer side of a compatibility check.
// Dependencies: edge-policy-core
// ============================================================================

//! ## Overview
//! A deployment is described either by a deployment policy or by a pattern,
//! supplied in the input or fetched by `org/id`. Both reduce to a list of
//! [`ServiceReference`]s narrowed to the node architecture.

use edge_policy_core::BusinessPolicy;
use edge_policy_core::ConstraintEngine;
use edge_policy_core::Pattern;
use edge_policy_core::Policy;
use edge_policy_core::WorkloadChoice;
use edge_policy_core::pattern::ServiceReference;
use edge_policy_core::service::id_of;
use edge_policy_core::service::org_of;

use crate::collaborators::Collaborators;
use crate::error::CompCheckError;

/// Policy id used for a deployment policy supplied without an id.
const TEMP_BUSINESS_POLICY_ID: &str = "TempBusinessPolicyId";

// ============================================================================
// SECTION: Deployment Policy
// ============================================================================

/// Validates the supplied deployment policy, or fetches it by id. With
/// `convert`, the internal policy form is returned too.
///
/// # Errors
/// Returns [`CompCheckError::Conversion`] or [`CompCheckError::Validation`]
/// for a bad policy or one without service versions, and
/// [`CompCheckError::Input`] when neither a policy nor an id is given.
pub fn process_business_policy(
    collaborators: &dyn Collaborators,
    engine: &ConstraintEngine,
    policy_id: &str,
    input: Option<&BusinessPolicy>,
    convert: bool,
) -> Result<(BusinessPolicy, Option<Policy>), CompCheckError> {
    if let Some(input) = input {
        let policy_id = if policy_id.is_empty() { TEMP_BUSINESS_POLICY_ID } else { policy_id };
        if convert {
            let policy = input.to_policy(policy_id, engine).map_err(|err| {
                CompCheckError::Conversion(format!(
                    "Failed to convert deployment policy {policy_id} to internal policy: {err}"
                ))
            })?;
            return Ok((input.clone(), Some(policy)));
        }
        let mut validated = input.clone();
        validated.validate(engine).map_err(|err| {
            CompCheckError::Validation(format!("Validation failure for deployment policy {policy_id}. {err}"))
        })?;
        if validated.service.service_versions.is_empty() {
            return Err(CompCheckError::Validation(format!(
                "No services specified in the given deployment policy {policy_id}."
            )));
        }
        return Ok((validated, None));
    }
    if policy_id.is_empty() {
        return Err(CompCheckError::Input(
            "Neither deployment policy nor deployment policy id is specified.".to_string(),
        ));
    }
    let (business, policy) = get_business_policy(collaborators, engine, policy_id, convert)?;
    if business.service.service_versions.is_empty() {
        return Err(CompCheckError::Validation(format!(
            "No services specified in the deployment policy {policy_id}."
        )));
    }
    Ok((business, policy))
}

/// Fetches the deployment policy `policy_id` (`org/id`).
///
/// # Errors
/// Returns [`CompCheckError::Input`] for a bad or unknown id,
/// [`CompCheckError::Exchange`] when the lookup fails, and
/// [`CompCheckError::Conversion`] when `convert` fails.
pub fn get_business_policy(
    collaborators: &dyn Collaborators,
    engine: &ConstraintEngine,
    policy_id: &str,
    convert: bool,
) -> Result<(BusinessPolicy, Option<Policy>), CompCheckError> {
    if policy_id.is_empty() {
        return Err(CompCheckError::Input("Deployment policy id is empty.".to_string()));
    }
    let org = org_of(policy_id);
    if org.is_empty() {
        return Err(CompCheckError::Input(format!(
            "Organization is not specified in the deployment policy id: {policy_id}."
        )));
    }
    let policies = collaborators.business_policies(org, id_of(policy_id)).map_err(|err| {
        CompCheckError::Exchange(format!("Unable to get deployment policy for {policy_id}, {err}"))
    })?;
    let Some((found_id, business)) = policies.into_iter().next() else {
        return Err(CompCheckError::Input(format!("No deployment policy found for this id {policy_id}.")));
    };
    if !convert {
        return Ok((business, None));
    }
    let policy = business.to_policy(&found_id, engine).map_err(|err| {
        CompCheckError::Conversion(format!(
            "Failed to convert deployment policy {policy_id} to internal policy format: {err}"
        ))
    })?;
    Ok((business, Some(policy)))
}

// ============================================================================
// SECTION: Pattern
// ============================================================================

/// Returns the supplied pattern, or fetches it by id.
///
/// # Errors
/// Returns [`CompCheckError::Input`] when neither is given, and the lookup
/// error of [`get_pattern`].
pub fn process_pattern(
    collaborators: &dyn Collaborators,
    pattern_id: &str,
    input: Option<&Pattern>,
) -> Result<Pattern, CompCheckError> {
    if let Some(input) = input {
        return Ok(input.clone());
    }
    if pattern_id.is_empty() {
        return Err(CompCheckError::Input("Neither pattern nor pattern id is specified.".to_string()));
    }
    get_pattern(collaborators, pattern_id)
}

/// Fetches the pattern `pattern_id` (`org/id`).
///
/// # Errors
/// Returns [`CompCheckError::Input`] for a bad or unknown id and
/// [`CompCheckError::Exchange`] when the lookup fails.
pub fn get_pattern(collaborators: &dyn Collaborators, pattern_id: &str) -> Result<Pattern, CompCheckError> {
    if pattern_id.is_empty() {
        return Err(CompCheckError::Input("Pattern id is empty.".to_string()));
    }
    let org = org_of(pattern_id);
    if org.is_empty() {
        return Err(CompCheckError::Input(format!(
            "Organization is not specified in the pattern id: {pattern_id}."
        )));
    }
    let patterns = collaborators.patterns(org, id_of(pattern_id)).map_err(|err| {
        CompCheckError::Exchange(format!("Error getting pattern {pattern_id} from the Exchange, {err}"))
    })?;
    patterns
        .into_values()
        .next()
        .ok_or_else(|| CompCheckError::Input(format!("No pattern found for this id {pattern_id}.")))
}

// ============================================================================
// SECTION: Workloads
// ============================================================================

/// Resolves a wildcard architecture to the node's; `None` when the service
/// targets another architecture.
fn narrow_arch(service_arch: &str, node_arch: &str) -> Option<String> {
    if node_arch.is_empty() {
        return Some(service_arch.to_string());
    }
    if service_arch.is_empty() || service_arch == "*" {
        return Some(node_arch.to_string());
    }
    (service_arch == node_arch).then(|| service_arch.to_string())
}

/// Returns the deployment policy's service when it runs on `node_arch`,
/// carrying only the version of each choice.
#[must_use]
pub fn workloads_from_business_policy(business: &BusinessPolicy, node_arch: &str) -> Vec<ServiceReference> {
    let Some(arch) = narrow_arch(&business.service.arch, node_arch) else {
        return Vec::new();
    };
    let versions: Vec<WorkloadChoice> = business
        .service
        .service_versions
        .iter()
        .map(|choice| WorkloadChoice {
            version: choice.version.clone(),
            ..WorkloadChoice::default()
        })
        .collect();
    if versions.is_empty() {
        return Vec::new();
    }
    vec![ServiceReference {
        service_url: business.service.name.clone(),
        service_orgid: business.service.org.clone(),
        service_arch: arch,
        service_versions: versions,
        ..ServiceReference::default()
    }]
}

/// Returns the pattern services that run on `node_arch` and name at least
/// one version.
#[must_use]
pub fn workloads_from_pattern(pattern: &Pattern, node_arch: &str) -> Vec<ServiceReference> {
    pattern
        .services
        .iter()
        .filter(|service| !service.service_versions.is_empty())
        .filter_map(|service| {
            narrow_arch(&service.service_arch, node_arch).map(|arch| ServiceReference {
                service_arch: arch,
                ..service.clone()
            })
        })
        .collect()
}

// ============================================================================
// SECTION: Tests
// ============================================================================
