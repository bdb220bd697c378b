// crates/edge-policy-compcheck/tests/proptest_partition.rs
// ============================================================================
// Module: Secret Binding Partition Property-Based Tests
// Description: Randomized checks of secret binding grouping.
// Purpose: Keep every bound secret in exactly one group.
// ============================================================================
//! ## Overview
//! Property-based tests for [`group_secret_bindings`] over random bindings
//! and random needed-secret maps.

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

use std::collections::BTreeSet;

use edge_policy_compcheck::IndexMap;
use edge_policy_compcheck::secret_binding::group_secret_bindings;
use edge_policy_core::BoundSecret;
use edge_policy_core::SecretBinding;
use proptest::prelude::*;

/// Generates a binding whose secret names are distinct.
fn binding_strategy() -> impl Strategy<Value = SecretBinding> {
    ("svc[a-c]", prop::collection::btree_set("s[a-e]", 0..5)).prop_map(|(url, names)| SecretBinding {
        service_orgid: "myorg".to_string(),
        service_url: url,
        secrets: names.into_iter().map(|name| BoundSecret::new(name.clone(), format!("store_{name}"))).collect(),
        ..SecretBinding::default()
    })
}

/// Generates bindings with a needed-name map over their positions.
fn grouping_strategy() -> impl Strategy<Value = (Vec<SecretBinding>, IndexMap)> {
    prop::collection::vec(binding_strategy(), 0..5).prop_flat_map(|bindings| {
        let positions = bindings.len().max(1);
        let map = prop::collection::btree_map(0..positions, prop::collection::btree_set("s[a-e]", 0..4), 0..4);
        (Just(bindings), map)
    })
}

/// Returns `(url, service secret)` for every bound secret.
fn pairs(bindings: &[SecretBinding]) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = bindings
        .iter()
        .flat_map(|binding| {
            binding.secrets.iter().map(|secret| (binding.service_url.clone(), secret.service_secret().to_string()))
        })
        .collect();
    pairs.sort();
    pairs
}

proptest! {
    /// Needed and extraneous entries together hold every bound secret once.
    #[test]
    fn grouping_partitions_bound_secrets((bindings, index_map) in grouping_strategy()) {
        let (needed, extraneous) = group_secret_bindings(&bindings, &index_map);
        let mut regrouped = needed.clone();
        regrouped.extend(extraneous);
        prop_assert_eq!(pairs(&regrouped), pairs(&bindings));
        prop_assert!(needed.iter().all(|binding| !binding.secrets.is_empty()));
    }

    /// Needed entries only hold names the map marks as needed.
    #[test]
    fn needed_entries_follow_the_map((bindings, index_map) in grouping_strategy()) {
        let (needed, _) = group_secret_bindings(&bindings, &index_map);
        let marked: BTreeSet<&String> = index_map.values().flatten().collect();
        for binding in &needed {
            for secret in &binding.secrets {
                prop_assert!(marked.contains(&secret.service_secret().to_string()));
            }
        }
    }
}
