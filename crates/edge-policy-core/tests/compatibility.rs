// crates/edge-policy-core/tests/compatibility.rs
// ============================================================================
// Module: Policy Compatibility Tests
// Description: End-to-end checks of node, deployment and service policies.
// Purpose: Exercise conversion, merge and bidirectional constraint checks.
// ============================================================================
//! ## Overview
//! Builds the three policy documents from JSON and evaluates them the way the
//! compatibility checker does.

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

use edge_policy_core::BusinessPolicy;
use edge_policy_core::ConstraintEngine;
use edge_policy_core::ExternalPolicy;
use edge_policy_core::Policy;
use edge_policy_core::Property;
use edge_policy_core::PropertyList;
use edge_policy_core::PropertyType;
use edge_policy_core::builtin::service_builtin_policy;
use edge_policy_core::policy::are_compatible;
use edge_policy_core::policy::make_external_policy_header_name;
use edge_policy_core::policy::merge_policy_with_external_policy;
use edge_policy_core::secret::parse_vault_secret_name;
use support::TestResult;
use support::document;
use support::ensure;

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

/// Service policy shared by the scenarios.
const SERVICE_POLICY: &str = r#"{
    "properties": [
        {"name": "prop5", "value": "val5"},
        {"name": "prop6", "value": "val6"}
    ],
    "constraints": ["prop4 == \"some value\""]
}"#;

/// Builds the producer and consumer policies from the given documents.
fn producer_and_consumer(
    node: &str,
    business: &str,
    service: &str,
    engine: &ConstraintEngine,
) -> TestResult<(Policy, Policy)> {
    let node: ExternalPolicy = document("node policy", node)?;
    let producer = Policy::from_external(&node, &make_external_policy_header_name("myorg/node1"), engine)?;
    let business: BusinessPolicy = document("deployment policy", business)?;
    let consumer = business.to_policy("myorg/dp", engine)?;
    let mut service: ExternalPolicy = document("service policy", service)?;
    service.merge_with(&service_builtin_policy("svc", "myorg", "1.0.0", "amd64"), false)?;
    let consumer = merge_policy_with_external_policy(&consumer, &service)?;
    Ok((producer, consumer))
}

/// Tests the three documents are compatible in both directions.
#[test]
fn three_documents_are_compatible() -> TestResult {
    let engine = ConstraintEngine::builtin();
    let (producer, consumer) = producer_and_consumer(NODE_POLICY, BUSINESS_POLICY, SERVICE_POLICY, &engine)?;
    ensure(are_compatible(&producer, &consumer, &engine).is_ok(), "policies should be compatible")?;
    ensure(consumer.constraints.as_slice().len() == 3, "constraints are concatenated")?;
    ensure(consumer.properties.has("openhorizon.service.url"), "service built-ins are merged")
}

/// Tests an unmet node constraint is reported with its short form.
#[test]
fn unmet_node_constraint_is_reported() -> TestResult {
    let engine = ConstraintEngine::builtin();
    let service = SERVICE_POLICY.replace("val5", "other");
    let (producer, consumer) = producer_and_consumer(NODE_POLICY, BUSINESS_POLICY, &service, &engine)?;
    let Err(err) = are_compatible(&producer, &consumer, &engine) else {
        return Err("expected incompatibility".into());
    };
    ensure(
        err.short_string().starts_with("Compatibility Error: Properties do not satisfy node constraint."),
        err.short_string().to_string(),
    )
}

/// Tests an unmet deployment constraint is reported.
#[test]
fn unmet_deployment_constraint_is_reported() -> TestResult {
    let engine = ConstraintEngine::builtin();
    let node = NODE_POLICY.replace("val3", "val9");
    let (producer, consumer) = producer_and_consumer(&node, BUSINESS_POLICY, SERVICE_POLICY, &engine)?;
    let Err(err) = are_compatible(&producer, &consumer, &engine) else {
        return Err("expected incompatibility".into());
    };
    ensure(
        err.short_string().starts_with("Compatibility Error: Node properties do not satisfy constraint requirements."),
        err.short_string().to_string(),
    )
}

/// Tests conflicting service and deployment properties fail the merge.
#[test]
fn conflicting_properties_fail_the_merge() -> TestResult {
    let engine = ConstraintEngine::builtin();
    let service = SERVICE_POLICY.replace("prop6", "prop2");
    let result = producer_and_consumer(NODE_POLICY, BUSINESS_POLICY, &service, &engine);
    ensure(result.is_err(), "conflicting property should fail")
}

/// Tests version typed properties validate their grammar.
#[test]
fn version_typed_properties_validate_grammar() -> TestResult {
    let leading_zero = PropertyList::from(vec![Property::typed("v", "1.02.1", PropertyType::Version)]);
    ensure(leading_zero.validate().is_err(), "leading zero must fail")?;
    let valid = PropertyList::from(vec![Property::typed("v", "1.0.3", PropertyType::Version)]);
    ensure(valid.validate().is_ok(), "1.0.3 must validate")
}

/// Tests secret store names parse into user and name.
#[test]
fn secret_store_names_parse() -> TestResult {
    let org = parse_vault_secret_name("mysecret/extra")?;
    ensure(org.user.is_empty() && org.name == "mysecret/extra", "org level secret")?;
    let user = parse_vault_secret_name("user/fred/s1")?;
    ensure(user.user == "fred" && user.name == "s1", "user level secret")?;
    ensure(parse_vault_secret_name("openhorizon/org/secret").is_err(), "qualified names are rejected")
}
