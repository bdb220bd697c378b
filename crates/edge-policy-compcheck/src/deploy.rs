// crates/edge-policy-compcheck/src/deploy.rs
// ============================================================================
// Module: Deployment Compatibility
// Description: Policy, privilege, user input and secret binding checks in one.
// Purpose: Answer whether a deployment can run on a node with one call.
// Dependencies: edge-policy-core, tracing
// ============================================================================

//! ## Overview
//! The combined check runs the narrower checks in order and stops at the
//! first failure:
//! - a deployment policy goes through the policy check; a pattern with a
//!   known node goes through the pattern privilege check,
//! - the user input check then runs on the services that passed,
//! - for device nodes, the secret binding check runs on what is left.
//!
//! The last check that ran decides compatibility. Its reasons are reported
//! alone when it passed and only the first passing version was wanted;
//! otherwise the reasons of every check are merged per service.

use std::collections::BTreeMap;

use edge_policy_core::ConstraintEngine;
use edge_policy_core::builtin::NODE_TYPE_DEVICE;
use edge_policy_core::service::remove_arch_from_service_id;
use tracing::debug;

use crate::collaborators::Collaborators;
use crate::error::CompCheckError;
use crate::policy_check::policy_compatible;
use crate::privilege::evaluate_pattern_privilege_compatibility;
use crate::resource::COMPATIBLE;
use crate::resource::CompCheck;
use crate::resource::CompCheckOutput;
use crate::resource::CompCheckResource;
use crate::resource::GENERAL_REASON_KEY;
use crate::resource::SecretBindingCheck;
use crate::resource::UserInputCheck;
use crate::secret_binding::secret_binding_compatible;
use crate::userinput::user_input_compatible;

/// Reason fragment shared by every mismatch prefix.
const INCOMPATIBLE: &str = "Incompatible";

// ============================================================================
// SECTION: Stage Inputs
// ============================================================================

/// Returns the resource of `output`, or an empty one.
fn resource_of(output: &CompCheckOutput) -> CompCheckResource {
    output.input.clone().unwrap_or_default()
}

/// Returns the service ids a check passed; empty when none are named, which
/// selects every service in the next stage.
#[must_use]
pub fn passed_services(output: &CompCheckOutput) -> Vec<String> {
    output
        .reason
        .iter()
        .filter(|(id, reason)| id.as_str() != GENERAL_REASON_KEY && !reason.contains(INCOMPATIBLE))
        .map(|(id, _)| id.clone())
        .collect()
}

/// Builds the user input stage from the combined input and the policy
/// stage, reusing every document the policy stage resolved.
#[must_use]
pub fn user_input_check_input(input: &CompCheck, policy_output: &CompCheckOutput) -> UserInputCheck {
    let resolved = resource_of(policy_output);
    UserInputCheck {
        node_id: resolved.node_id,
        node_arch: resolved.node_arch,
        node_type: resolved.node_type,
        node_user_input: input.node_user_input.clone(),
        business_policy_id: resolved.business_policy_id,
        business_policy: resolved.business_policy,
        pattern_id: input.pattern_id.clone(),
        pattern: input.pattern.clone(),
        service: if input.service.is_empty() { resolved.service } else { input.service.clone() },
        service_to_check: passed_services(policy_output),
        dependent_services: resolved.dependent_services,
    }
}

/// Builds the secret binding stage from the combined input and the user
/// input stage.
#[must_use]
pub fn secret_binding_check_input(input: &CompCheck, user_input_output: &CompCheckOutput) -> SecretBindingCheck {
    let resolved = resource_of(user_input_output);
    SecretBindingCheck {
        node_id: resolved.node_id,
        node_arch: resolved.node_arch,
        node_type: resolved.node_type,
        node_org: input.node_org.clone(),
        business_policy_id: resolved.business_policy_id,
        business_policy: resolved.business_policy,
        pattern_id: resolved.pattern_id,
        pattern: resolved.pattern,
        service: resolved.service,
        service_to_check: passed_services(user_input_output),
        dependent_services: resolved.dependent_services,
    }
}

// ============================================================================
// SECTION: Output Combination
// ============================================================================

/// Merges the reasons of `output` into `reason`. Ids for any architecture
/// lose their arch suffix; a mismatch replaces an earlier verdict.
pub fn update_reason_map(output: &CompCheckOutput, reason: &mut BTreeMap<String, String>) {
    for (id, verdict) in &output.reason {
        let id = if id.ends_with("_*") || id.ends_with('_') { remove_arch_from_service_id(id) } else { id.clone() };
        match reason.get(&id) {
            Some(_) if verdict == COMPATIBLE => {}
            _ => {
                reason.insert(id, verdict.clone());
            }
        }
    }
}

/// Stage outputs of one combined check.
pub struct StageOutputs<'a> {
    /// Policy stage; a placeholder for patterns.
    pub policy: &'a CompCheckOutput,
    /// Pattern privilege stage; a placeholder for deployment policies.
    pub privilege: &'a CompCheckOutput,
    /// User input stage, when it ran.
    pub user_input: Option<&'a CompCheckOutput>,
    /// Secret binding stage, when it ran.
    pub secret_binding: Option<&'a CompCheckOutput>,
}

/// Combines the stage outputs into one.
#[must_use]
pub fn combine_outputs(stages: &StageOutputs<'_>, check_all: bool) -> CompCheckOutput {
    let last = stages.secret_binding.or(stages.user_input).unwrap_or(stages.privilege);
    let reason = if !check_all && last.compatible {
        last.reason.clone()
    } else {
        let mut reason = BTreeMap::new();
        update_reason_map(stages.policy, &mut reason);
        update_reason_map(stages.privilege, &mut reason);
        for output in [stages.user_input, stages.secret_binding].into_iter().flatten() {
            update_reason_map(output, &mut reason);
        }
        reason
    };

    let last_resource = resource_of(last);
    let policy_resource = resource_of(stages.policy);
    let privilege_resource = resource_of(stages.privilege);
    let shape_resource = stages.user_input.map_or_else(|| privilege_resource.clone(), resource_of);
    let mut combined = CompCheckResource {
        node_id: last_resource.node_id,
        node_arch: last_resource.node_arch,
        node_type: last_resource.node_type,
        node_org: last_resource.node_org,
        node_policy: policy_resource.node_policy.or(privilege_resource.node_policy),
        node_user_input: shape_resource.node_user_input,
        business_policy_id: last_resource.business_policy_id,
        business_policy: last_resource.business_policy,
        pattern_id: shape_resource.pattern_id,
        pattern: shape_resource.pattern,
        service_policy: policy_resource.service_policy,
        service: last_resource.service,
        ..CompCheckResource::default()
    };
    if let Some(secret_binding) = stages.secret_binding {
        let resource = resource_of(secret_binding);
        combined.needed_secret_binding = resource.needed_secret_binding;
        combined.extraneous_secret_binding = resource.extraneous_secret_binding;
    }
    CompCheckOutput::new(last.compatible, reason, combined)
}

// ============================================================================
// SECTION: Check Pipeline
// ============================================================================

/// Checks whether a deployment policy or pattern can be deployed on a node,
/// covering policy or privilege, user input and secret bindings.
///
/// # Errors
/// Returns [`CompCheckError::Input`] unless exactly one of deployment policy
/// and pattern is given, and the first error of any stage.
pub fn deploy_compatible(
    collaborators: &dyn Collaborators,
    engine: &ConstraintEngine,
    agbot_url: Option<&str>,
    input: &CompCheck,
    check_all: bool,
) -> Result<CompCheckOutput, CompCheckError> {
    let use_business_policy = !input.business_policy_id.is_empty() || input.business_policy.is_some();
    let use_pattern = !input.pattern_id.is_empty() || input.pattern.is_some();
    if use_business_policy && use_pattern {
        return Err(CompCheckError::Input("Deployment policy and pattern are mutually exclusive.".to_string()));
    }
    if !use_business_policy && !use_pattern {
        return Err(CompCheckError::Input("Neither deployment policy nor pattern is specified.".to_string()));
    }

    let policy_input = input.to_policy_check();
    let mut policy_output =
        CompCheckOutput::new(true, BTreeMap::new(), CompCheckResource::from_policy_check(&policy_input));
    let mut privilege_output = CompCheckOutput::new(true, BTreeMap::new(), CompCheckResource::default());
    if use_business_policy {
        policy_output = policy_compatible(collaborators, engine, &policy_input, true)?;
        if !policy_output.compatible {
            return Ok(policy_output);
        }
    } else if !input.node_id.is_empty() || input.node_policy.is_some() {
        privilege_output = evaluate_pattern_privilege_compatibility(collaborators, engine, input, true, true)?;
        if !privilege_output.compatible {
            let stages = StageOutputs {
                policy: &policy_output,
                privilege: &privilege_output,
                user_input: None,
                secret_binding: None,
            };
            return Ok(combine_outputs(&stages, check_all));
        }
    }

    let user_input_output =
        user_input_compatible(collaborators, engine, &user_input_check_input(input, &policy_output), true)?;
    debug!(compatible = user_input_output.compatible, "user input stage finished");
    if !user_input_output.compatible {
        let stages = StageOutputs {
            policy: &policy_output,
            privilege: &privilege_output,
            user_input: Some(&user_input_output),
            secret_binding: None,
        };
        return Ok(combine_outputs(&stages, check_all));
    }

    let node_type = user_input_output.input.as_ref().map(|resource| resource.node_type.as_str());
    let secret_binding_output = if node_type == Some(NODE_TYPE_DEVICE) {
        let stage_input = secret_binding_check_input(input, &user_input_output);
        Some(secret_binding_compatible(collaborators, engine, agbot_url, &stage_input, check_all)?)
    } else {
        None
    };
    let stages = StageOutputs {
        policy: &policy_output,
        privilege: &privilege_output,
        user_input: Some(&user_input_output),
        secret_binding: secret_binding_output.as_ref(),
    };
    Ok(combine_outputs(&stages, check_all))
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

    /// Builds an output from `(id, reason)` pairs.
    fn output(compatible: bool, reasons: &[(&str, &str)]) -> CompCheckOutput {
        let reason = reasons.iter().map(|(id, text)| ((*id).to_string(), (*text).to_string())).collect();
        CompCheckOutput::new(compatible, reason, CompCheckResource::default())
    }

    /// Tests only passing services move to the next stage.
    #[test]
    fn passing_services_are_selected() {
        let policy = output(
            true,
            &[
                ("myorg/a_1.0.0_amd64", COMPATIBLE),
                ("myorg/b_1.0.0_amd64", "Policy Incompatible: no"),
                (GENERAL_REASON_KEY, "Warning: x"),
            ],
        );
        assert_eq!(passed_services(&policy), vec!["myorg/a_1.0.0_amd64".to_string()]);
        let input = user_input_check_input(&CompCheck::default(), &policy);
        assert_eq!(input.service_to_check, vec!["myorg/a_1.0.0_amd64".to_string()]);
    }

    /// Tests a later mismatch replaces an earlier verdict and any-arch ids
    /// are folded.
    #[test]
    fn reasons_merge_per_service() {
        let mut reason = BTreeMap::new();
        let first = output(true, &[("myorg/a_1.0.0_amd64", COMPATIBLE), ("myorg/b_1.0.0_*", COMPATIBLE)]);
        update_reason_map(&first, &mut reason);
        update_reason_map(&output(false, &[("myorg/a_1.0.0_amd64", "User Input Incompatible: x")]), &mut reason);
        update_reason_map(&output(true, &[("myorg/a_1.0.0_amd64", COMPATIBLE)]), &mut reason);
        assert_eq!(reason["myorg/a_1.0.0_amd64"], "User Input Incompatible: x");
        assert!(reason.contains_key("myorg/b_1.0.0"));
    }

    /// Tests the last stage decides and its reasons stand alone on success.
    #[test]
    fn last_stage_decides() {
        let policy = output(
            true,
            &[("myorg/a_1.0.0_amd64", COMPATIBLE), ("myorg/b_1.0.0_amd64", "Policy Incompatible: no")],
        );
        let privilege = output(true, &[]);
        let user_input = output(true, &[("myorg/a_1.0.0_amd64", COMPATIBLE)]);
        let stages = StageOutputs {
            policy: &policy,
            privilege: &privilege,
            user_input: Some(&user_input),
            secret_binding: None,
        };
        let quick = combine_outputs(&stages, false);
        assert!(quick.compatible);
        assert_eq!(quick.reason.len(), 1);
        let full = combine_outputs(&stages, true);
        assert_eq!(full.reason.len(), 2);
        assert_eq!(full.reason["myorg/b_1.0.0_amd64"], "Policy Incompatible: no");
    }
}
