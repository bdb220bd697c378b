// crates/edge-policy-compcheck/tests/policy_check.rs
// ============================================================================
// Module: Policy Check Tests
// Description: End-to-end policy compatibility checks over an in-memory exchange.
// Purpose: Exercise node, deployment and service policy evaluation together.
// ============================================================================
//! ## Overview
//! Runs [`CompatibilityChecker::policy_compatible`] against an in-memory
//! exchange holding one service and its policy.

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

use edge_policy_compcheck::CompCheckError;
use edge_policy_compcheck::PolicyCheck;
use edge_policy_core::BusinessPolicy;
use edge_policy_core::ExternalPolicy;
use edge_policy_core::Property;
use serde_json::json;
use support::MemoryExchange;
use support::TestResult;
use support::checker;
use support::ensure;
use support::service;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Node policy shared by the scenarios.
const NODE_POLICY: &str = r#"{
    "properties": [
        {"name": "prop3", "value": "val3"},
        {"name": "prop4", "value": "some value"}
    ],
    "constraints": ["prop1 == val1", "prop5 == val5"]
}"#;

/// Deployment policy shared by the scenarios.
const BUSINESS_POLICY: &str = r#"{
    "label": "dp", "description": "",
    "service": {"name": "svc", "org": "myorg", "arch": "amd64",
                "serviceVersions": [{"version": "1.0.0"}]},
    "properties": [
        {"name": "prop1", "value": "val1"},
        {"name": "prop2", "value": "val2"}
    ],
    "constraints": ["prop3 == val3", "prop4 == \"some value\""]
}"#;

/// Service policy registered for the service.
const SERVICE_POLICY: &str = r#"{
    "properties": [
        {"name": "prop5", "value": "val5"},
        {"name": "prop6", "value": "val6"}
    ],
    "constraints": ["prop4 == \"some value\""]
}"#;

/// Id the service is registered under.
const SERVICE_ID: &str = "myorg/svc_1.0.0_amd64";

/// Creates an exchange whose service runs `deployment` under the shared
/// service policy.
fn exchange(deployment: serde_json::Value) -> TestResult<MemoryExchange> {
    let mut exchange = MemoryExchange::default();
    let id = exchange.add_service(service("svc", deployment));
    exchange.service_policies.insert(id, serde_json::from_str(SERVICE_POLICY)?);
    Ok(exchange)
}

/// Builds a check of the shared documents on a node of `node_arch`.
fn policy_check(node_arch: &str) -> TestResult<PolicyCheck> {
    Ok(PolicyCheck {
        node_arch: node_arch.to_string(),
        node_policy: Some(serde_json::from_str(NODE_POLICY)?),
        business_policy: Some(serde_json::from_str(BUSINESS_POLICY)?),
        ..PolicyCheck::default()
    })
}

// ============================================================================
// SECTION: Scenarios
// ============================================================================

/// Tests the three documents are compatible on an amd64 node.
#[test]
fn matching_documents_are_compatible() -> TestResult {
    let exchange = exchange(json!({"services": {"c": {"image": "i"}}}))?;
    let output = checker(false, None).policy_compatible(&exchange, &policy_check("amd64")?, false)?;
    ensure(output.compatible, format!("reasons: {:?}", output.reason))?;
    ensure(output.reason.get(SERVICE_ID).map(String::as_str) == Some("Compatible"), "service verdict")?;
    let resources = output.input.ok_or("resources missing")?;
    ensure(resources.node_type == "device", "node type defaults to device")?;
    ensure(resources.service_policy.contains_key(SERVICE_ID), "registered service policy is reported")
}

/// Tests a workload for another architecture is reported when every
/// service is checked.
#[test]
fn architecture_mismatch_is_incompatible() -> TestResult {
    let exchange = exchange(json!({"services": {"c": {"image": "i"}}}))?;
    let output = checker(true, None).policy_compatible(&exchange, &policy_check("arm64")?, false)?;
    ensure(!output.compatible, "arm64 node must not run an amd64 workload")?;
    let reason = output.reason.get(SERVICE_ID).ok_or("verdict missing")?;
    ensure(reason.contains("Architecture does not match."), reason.clone())
}

/// Tests a deployment without a workload for the node architecture gets a
/// single general verdict when checking stops at the first match.
#[test]
fn unmatched_architecture_gets_general_verdict() -> TestResult {
    let exchange = exchange(json!({"services": {"c": {"image": "i"}}}))?;
    let output = checker(false, None).policy_compatible(&exchange, &policy_check("arm64")?, false)?;
    ensure(!output.compatible, "arm64 node must not run an amd64 workload")?;
    ensure(output.reason.len() == 1, format!("reasons: {:?}", output.reason))?;
    let reason = output.reason.get("general").ok_or("general verdict missing")?;
    ensure(
        reason == "Policy Incompatible: Service with 'arch' arm64 cannot be found in the deployment policy.",
        reason.clone(),
    )
}

/// Tests a privileged service needs a node that allows privilege.
#[test]
fn privileged_service_needs_privileged_node() -> TestResult {
    let exchange = exchange(json!({"services": {"c": {"image": "i", "privileged": true}}}))?;
    let output = checker(true, None).policy_compatible(&exchange, &policy_check("amd64")?, false)?;
    ensure(!output.compatible, "the node does not allow privilege")?;

    let mut input = policy_check("amd64")?;
    let mut node: ExternalPolicy = serde_json::from_str(NODE_POLICY)?;
    node.properties.add_property(Property::new("openhorizon.allowPrivileged", true), true)?;
    input.node_policy = Some(node);
    let output = checker(true, None).policy_compatible(&exchange, &input, false)?;
    ensure(output.compatible, format!("reasons: {:?}", output.reason))
}

/// Tests a service policy forbidding privilege the service needs fails.
#[test]
fn forbidden_privilege_is_an_input_error() -> TestResult {
    let mut exchange = exchange(json!({"services": {"c": {"image": "i", "network": "host"}}}))?;
    exchange.service_policies.insert(
        SERVICE_ID.to_string(),
        serde_json::from_str(r#"{"properties": [{"name": "openhorizon.allowPrivileged", "value": false}]}"#)?,
    );
    let Err(err) = checker(false, None).policy_compatible(&exchange, &policy_check("amd64")?, false) else {
        return Err("expected an input error".into());
    };
    ensure(matches!(err, CompCheckError::Input(_)), err.to_string())?;
    ensure(err.code() == 10, "input errors carry code 10")
}

/// Tests a deployment policy forbidding privilege a service needs fails even
/// when the node allows privilege.
#[test]
fn deployment_policy_forbidding_privilege_is_an_input_error() -> TestResult {
    let exchange = exchange(json!({"services": {"c": {"image": "i", "privileged": true}}}))?;
    let mut input = policy_check("amd64")?;
    let mut node: ExternalPolicy = serde_json::from_str(NODE_POLICY)?;
    node.properties.add_property(Property::new("openhorizon.allowPrivileged", true), true)?;
    input.node_policy = Some(node);
    let mut business: BusinessPolicy = serde_json::from_str(BUSINESS_POLICY)?;
    business.properties.add_property(Property::new("openhorizon.allowPrivileged", false), true)?;
    input.business_policy = Some(business);
    let Err(err) = checker(false, None).policy_compatible(&exchange, &input, false) else {
        return Err("expected an input error".into());
    };
    ensure(matches!(err, CompCheckError::Input(_)), err.to_string())?;
    ensure(err.to_string().contains("deployment policy"), err.to_string())
}

/// Tests a node id the exchange does not know is bad input naming the id.
#[test]
fn unknown_node_id_is_an_input_error() -> TestResult {
    let exchange = exchange(json!({"services": {"c": {"image": "i"}}}))?;
    let mut input = policy_check("")?;
    input.node_id = "myorg/node1".to_string();
    let Err(err) = checker(false, None).policy_compatible(&exchange, &input, false) else {
        return Err("expected an input error".into());
    };
    ensure(err.code() == 10, err.to_string())?;
    ensure(err.to_string() == "No node found for this node id myorg/node1.", err.to_string())
}

/// Tests an unreachable node constraint names the service.
#[test]
fn unmet_constraint_is_reported_per_service() -> TestResult {
    let mut exchange = exchange(json!({"services": {"c": {"image": "i"}}}))?;
    let unmet: ExternalPolicy = serde_json::from_str(&SERVICE_POLICY.replace("val5", "other"))?;
    exchange.service_policies.insert(SERVICE_ID.to_string(), unmet);
    let output = checker(true, None).policy_compatible(&exchange, &policy_check("amd64")?, false)?;
    ensure(!output.compatible, "node constraint prop5 is unmet")?;
    let reason = output.reason.get(SERVICE_ID).ok_or("verdict missing")?;
    ensure(reason.starts_with("Policy Incompatible: "), reason.clone())
}
