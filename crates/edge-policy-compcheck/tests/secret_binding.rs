// crates/edge-policy-compcheck/tests/secret_binding.rs
// ============================================================================
// Module: Secret Binding Tests
// Description: Secret binding grouping and end-to-end secret checks.
// Purpose: Exercise binding coverage, secret store checks and grouping.
// ============================================================================
//! ## Overview
//! Runs [`CompatibilityChecker::secret_binding_compatible`] against an
//! in-memory exchange whose service depends on one other service, both
//! consuming secrets.

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

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use edge_policy_compcheck::CompCheckError;
use edge_policy_compcheck::IndexMap;
use edge_policy_compcheck::SecretBindingCheck;
use edge_policy_compcheck::secret_binding::group_secret_bindings;
use edge_policy_core::BoundSecret;
use edge_policy_core::BusinessPolicy;
use edge_policy_core::ExchangeServiceDefinition;
use edge_policy_core::SecretBinding;
use serde_json::json;
use support::MemoryExchange;
use support::TestResult;
use support::checker;
use support::ensure;
use support::requiring;
use support::service;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Id of the top level service.
const TOP_ID: &str = "myorg/svc_1.0.0_amd64";

/// Id of the dependency.
const DEP_ID: &str = "myorg/dep_1.0.0_amd64";

/// Builds a service record consuming `secrets`.
fn definition(url: &str, secrets: &[&str]) -> ExchangeServiceDefinition {
    let secrets: BTreeMap<&str, serde_json::Value> = secrets.iter().map(|name| (*name, json!({}))).collect();
    service(url, json!({"services": {"c": {"image": "i", "secrets": secrets}}}))
}

/// Builds a binding for `url` with `(service secret, store name)` pairs.
fn binding(url: &str, secrets: &[(&str, &str)]) -> SecretBinding {
    SecretBinding {
        service_orgid: "myorg".to_string(),
        service_url: url.to_string(),
        secrets: secrets.iter().map(|(secret, store)| BoundSecret::new(*secret, *store)).collect(),
        ..SecretBinding::default()
    }
}

/// Bindings covering every secret of both services.
fn full_bindings() -> Vec<SecretBinding> {
    vec![
        binding("svc", &[("mysecret_top1", "top1"), ("mysecret_both", "user/alice/both")]),
        binding("dep", &[("mysecret_dep1", "dep1"), ("mysecret_both", "both")]),
    ]
}

/// Builds a check of a deployment policy carrying `bindings`.
fn secret_check(bindings: Vec<SecretBinding>) -> TestResult<SecretBindingCheck> {
    let mut business: BusinessPolicy = serde_json::from_value(json!({
        "service": {"name": "svc", "org": "myorg", "arch": "amd64",
                    "serviceVersions": [{"version": "1.0.0"}]}
    }))?;
    business.secret_binding = bindings;
    Ok(SecretBindingCheck {
        node_arch: "amd64".to_string(),
        node_org: "myorg".to_string(),
        business_policy: Some(business),
        ..SecretBindingCheck::default()
    })
}

/// Creates an exchange where `svc` requires `dep` and the secret store
/// holds `names`.
fn exchange(names: &[&str]) -> MemoryExchange {
    let mut exchange = MemoryExchange {
        secrets: names.iter().map(|name| (*name).to_string()).collect(),
        ..MemoryExchange::default()
    };
    exchange.add_service(requiring(definition("svc", &["mysecret_top1", "mysecret_both"]), "dep"));
    exchange.add_service(definition("dep", &["mysecret_dep1", "mysecret_both"]));
    exchange
}

// ============================================================================
// SECTION: Grouping
// ============================================================================

/// Tests grouping splits each entry into needed and extraneous halves.
#[test]
fn grouping_splits_partially_used_entries() -> TestResult {
    let bindings = vec![
        binding("top", &[("mysecret_top1", "s1"), ("mysecret_both", "s2")]),
        binding("dep", &[("mysecret_dep1", "s3"), ("mysecret_both", "s4")]),
    ];
    let index_map = IndexMap::from([
        (0, BTreeSet::from(["mysecret_top1".to_string()])),
        (1, BTreeSet::from(["mysecret_both".to_string()])),
    ]);
    let (needed, extraneous) = group_secret_bindings(&bindings, &index_map);
    ensure(needed.len() == 2 && extraneous.len() == 2, "two needed and two extraneous entries")?;
    ensure(needed.iter().chain(&extraneous).all(|entry| entry.secrets.len() == 1), "one secret per entry")?;
    ensure(needed[0].service_url == "top" && needed[0].secrets[0].service_secret() == "mysecret_top1", "top")?;
    ensure(needed[1].service_url == "dep" && needed[1].secrets[0].service_secret() == "mysecret_both", "dep")?;
    ensure(extraneous[0].secrets[0].service_secret() == "mysecret_both", "unused top secret")?;
    ensure(extraneous[1].secrets[0].service_secret() == "mysecret_dep1", "unused dep secret")
}

// ============================================================================
// SECTION: Checks
// ============================================================================

/// Tests complete bindings are compatible and unused entries are flagged.
#[test]
fn complete_bindings_are_compatible() -> TestResult {
    let mut bindings = full_bindings();
    bindings.push(binding("unused", &[("x", "y")]));
    let output = checker(false, None).secret_binding_compatible(&exchange(&[]), &secret_check(bindings)?, false)?;
    ensure(output.compatible, format!("reasons: {:?}", output.reason))?;
    ensure(output.reason.get(TOP_ID).map(String::as_str) == Some("Compatible"), "service verdict")?;
    let warning = output.reason.get("general").ok_or("warning missing")?;
    ensure(warning.starts_with("Warning: The following secret bindings are not required"), warning.clone())?;
    let resources = output.input.ok_or("resources missing")?;
    ensure(resources.needed_secret_binding.len() == 2, "both service entries are needed")?;
    ensure(resources.extraneous_secret_binding.len() == 1, "the unused entry is extraneous")?;
    ensure(resources.dependent_services.contains_key(DEP_ID), "dependency is reported")
}

/// Tests an unbound dependency secret names the secret.
#[test]
fn unbound_dependency_secret_is_incompatible() -> TestResult {
    let bindings = vec![full_bindings()[0].clone(), binding("dep", &[("mysecret_both", "both")])];
    let output = checker(false, None).secret_binding_compatible(&exchange(&[]), &secret_check(bindings)?, false)?;
    ensure(!output.compatible, "dependency secret is unbound")?;
    let reason = output.reason.get(TOP_ID).ok_or("verdict missing")?;
    ensure(
        reason == "Secret Binding Incompatible: No secret binding found for the following service secrets: [mysecret_dep1].",
        reason.clone(),
    )
}

/// Tests store names are checked against the secret store.
#[test]
fn missing_store_secret_is_incompatible() -> TestResult {
    let input = secret_check(full_bindings())?;
    let store = exchange(&["top1", "user/alice/both", "dep1", "both"]);
    let output = checker(false, Some("https://agbot:8083")).secret_binding_compatible(&store, &input, false)?;
    ensure(output.compatible, format!("reasons: {:?}", output.reason))?;

    let store = exchange(&["top1", "user/alice/both", "both"]);
    let output = checker(false, Some("https://agbot:8083")).secret_binding_compatible(&store, &input, false)?;
    ensure(!output.compatible, "dep1 is missing from the store")?;
    let reason = output.reason.get(TOP_ID).ok_or("verdict missing")?;
    ensure(reason.ends_with("Secret dep1 does not exist in the secret manager."), reason.clone())
}

/// Tests cluster nodes and ambiguous deployments are rejected.
#[test]
fn invalid_inputs_are_errors() -> TestResult {
    let mut input = secret_check(full_bindings())?;
    input.node_type = "cluster".to_string();
    let Err(err) = checker(false, None).secret_binding_compatible(&exchange(&[]), &input, false) else {
        return Err("cluster nodes are not supported".into());
    };
    ensure(err.to_string() == "Node type 'cluster' does not support secret binding check.", err.to_string())?;

    let mut input = secret_check(full_bindings())?;
    input.pattern_id = "myorg/pattern".to_string();
    let Err(err) = checker(false, None).secret_binding_compatible(&exchange(&[]), &input, false) else {
        return Err("policy and pattern are exclusive".into());
    };
    ensure(matches!(err, CompCheckError::Input(_)), err.to_string())
}
