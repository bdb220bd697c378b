// crates/edge-policy-compcheck/tests/deploy_check.rs
// ============================================================================
// Module: Deployment Check Tests
// Description: Combined policy, privilege, user input and secret checks.
// Purpose: Exercise stage ordering and reason merging end to end.
// ============================================================================
//! ## Overview
//! Runs [`CompatibilityChecker::deploy_compatible`] for a service that
//! declares one variable and consumes one secret, deployed through a
//! deployment policy or a pattern.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

mod support;

use edge_policy_compcheck::CompCheck;
use edge_policy_compcheck::CompCheckError;
use edge_policy_core::BoundSecret;
use edge_policy_core::BusinessPolicy;
use edge_policy_core::Input;
use edge_policy_core::Pattern;
use edge_policy_core::SecretBinding;
use edge_policy_core::UserInput;
use edge_policy_core::service::ServiceUserInput;
use serde_json::Value;
use serde_json::json;
use support::MemoryExchange;
use support::TestResult;
use support::checker;
use support::ensure;
use support::service;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Id of the deployed service.
const SERVICE_ID: &str = "myorg/svc_1.0.0_amd64";

/// Creates an exchange holding `svc`, which declares `var1` and consumes
/// `mysecret`, with `extra` merged into its container.
fn exchange(extra: &Value) -> MemoryExchange {
    let mut container = json!({"image": "i", "secrets": {"mysecret": {}}});
    if let (Some(container), Some(extra)) = (container.as_object_mut(), extra.as_object()) {
        container.extend(extra.clone());
    }
    let mut definition = service("svc", json!({"services": {"c": container}}));
    definition.user_inputs = vec![ServiceUserInput {
        name: "var1".to_string(),
        input_type: "int".to_string(),
        ..ServiceUserInput::default()
    }];
    let mut exchange = MemoryExchange::default();
    exchange.add_service(definition);
    exchange
}

/// Value of `var1` for `svc`.
fn var1() -> UserInput {
    UserInput {
        service_orgid: "myorg".to_string(),
        service_url: "svc".to_string(),
        inputs: vec![Input {
            name: "var1".to_string(),
            value: json!(3),
        }],
        ..UserInput::default()
    }
}

/// Binding of `mysecret` for `svc`.
fn mysecret() -> SecretBinding {
    SecretBinding {
        service_orgid: "myorg".to_string(),
        service_url: "svc".to_string(),
        secrets: vec![BoundSecret::new("mysecret", "store1")],
        ..SecretBinding::default()
    }
}

/// Builds a combined check of a deployment policy, optionally setting
/// `var1` and binding `mysecret`.
fn policy_deploy_check(with_user_input: bool, with_binding: bool) -> TestResult<CompCheck> {
    let mut business: BusinessPolicy = serde_json::from_value(json!({
        "service": {"name": "svc", "org": "myorg", "arch": "amd64",
                    "serviceVersions": [{"version": "1.0.0"}]},
        "constraints": ["purpose == edge"]
    }))?;
    if with_user_input {
        business.user_input = vec![var1()];
    }
    if with_binding {
        business.secret_binding = vec![mysecret()];
    }
    Ok(CompCheck {
        node_arch: "amd64".to_string(),
        node_org: "myorg".to_string(),
        node_policy: Some(serde_json::from_value(json!({
            "properties": [{"name": "purpose", "value": "edge"}]
        }))?),
        node_user_input: Some(Vec::new()),
        business_policy: Some(business),
        ..CompCheck::default()
    })
}

/// Builds a combined check of a pattern on a node that does or does not
/// allow privilege.
fn pattern_deploy_check(node_privileged: bool) -> TestResult<CompCheck> {
    let mut pattern: Pattern = serde_json::from_value(json!({
        "services": [{"serviceUrl": "svc", "serviceOrgid": "myorg", "serviceArch": "amd64",
                      "serviceVersions": [{"version": "1.0.0"}]}]
    }))?;
    pattern.user_input = vec![var1()];
    pattern.secret_binding = vec![mysecret()];
    Ok(CompCheck {
        node_arch: "amd64".to_string(),
        node_org: "myorg".to_string(),
        node_policy: Some(serde_json::from_value(json!({
            "properties": [{"name": "openhorizon.allowPrivileged", "value": node_privileged}]
        }))?),
        node_user_input: Some(Vec::new()),
        pattern: Some(pattern),
        ..CompCheck::default()
    })
}

// ============================================================================
// SECTION: Deployment Policy
// ============================================================================

/// Tests a deployment passing every stage reports the last stage alone.
#[test]
fn complete_deployment_is_compatible() -> TestResult {
    let output =
        checker(false, None).deploy_compatible(&exchange(&json!({})), &policy_deploy_check(true, true)?, false)?;
    ensure(output.compatible, format!("reasons: {:?}", output.reason))?;
    ensure(output.reason.get(SERVICE_ID).map(String::as_str) == Some("Compatible"), "service verdict")?;
    let resources = output.input.ok_or("resources missing")?;
    ensure(resources.needed_secret_binding.len() == 1, "the binding is needed")?;
    ensure(resources.node_policy.is_some(), "node policy is reported")
}

/// Tests a policy mismatch ends the check before user input is looked at.
#[test]
fn policy_mismatch_stops_the_check() -> TestResult {
    let mut input = policy_deploy_check(false, false)?;
    input.node_policy = Some(serde_json::from_value(json!({
        "properties": [{"name": "purpose", "value": "lab"}]
    }))?);
    let output = checker(false, None).deploy_compatible(&exchange(&json!({})), &input, false)?;
    ensure(!output.compatible, "purpose differs")?;
    let reason = output.reason.get(SERVICE_ID).ok_or("verdict missing")?;
    ensure(reason.starts_with("Policy Incompatible: "), reason.clone())
}

/// Tests a missing variable replaces the passing policy verdict.
#[test]
fn missing_user_input_is_merged_over_policy_verdict() -> TestResult {
    let output =
        checker(false, None).deploy_compatible(&exchange(&json!({})), &policy_deploy_check(false, true)?, false)?;
    ensure(!output.compatible, "var1 is unset")?;
    let reason = output.reason.get(SERVICE_ID).ok_or("verdict missing")?;
    ensure(reason.starts_with("User Input Incompatible: "), reason.clone())?;
    ensure(reason.contains("variable var1."), reason.clone())
}

/// Tests device nodes get the secret binding stage.
#[test]
fn unbound_secret_is_reported_for_devices() -> TestResult {
    let output =
        checker(false, None).deploy_compatible(&exchange(&json!({})), &policy_deploy_check(true, false)?, false)?;
    ensure(!output.compatible, "mysecret is unbound")?;
    let reason = output.reason.get(SERVICE_ID).ok_or("verdict missing")?;
    ensure(reason.starts_with("Secret Binding Incompatible: "), reason.clone())?;
    ensure(reason.contains("[mysecret]"), reason.clone())
}

// ============================================================================
// SECTION: Pattern
// ============================================================================

/// Tests a privileged pattern service needs a node allowing privilege.
#[test]
fn privileged_pattern_service_needs_privileged_node() -> TestResult {
    let exchange = exchange(&json!({"privileged": true}));
    let output = checker(false, None).deploy_compatible(&exchange, &pattern_deploy_check(false)?, false)?;
    ensure(!output.compatible, "the node does not allow privilege")?;
    let reason = output.reason.get(SERVICE_ID).ok_or("verdict missing")?;
    ensure(
        reason
            == "Version 1.0.0 of this service requires the following workloads that will only run on a privileged \
                node. [myorg/svc_1.0.0_amd64]",
        reason.clone(),
    )?;

    let output = checker(false, None).deploy_compatible(&exchange, &pattern_deploy_check(true)?, false)?;
    ensure(output.compatible, format!("reasons: {:?}", output.reason))
}

/// Tests a deployment policy and a pattern together are bad input.
#[test]
fn policy_and_pattern_are_exclusive() -> TestResult {
    let mut input = pattern_deploy_check(true)?;
    input.business_policy = policy_deploy_check(true, true)?.business_policy;
    let Err(err) = checker(false, None).deploy_compatible(&exchange(&json!({})), &input, false) else {
        return Err("expected an input error".into());
    };
    ensure(matches!(err, CompCheckError::Input(_)), err.to_string())?;
    ensure(err.to_string() == "Deployment policy and pattern are mutually exclusive.", err.to_string())
}
