// crates/edge-policy-core/tests/proptest_policy.rs
// ============================================================================
// Module: Policy Model Property-Based Tests
// Description: Randomized checks of property and requirement invariants.
// Purpose: Keep sameness symmetric and merges and validation stable.
// ============================================================================
//! ## Overview
//! Property-based tests for sameness, validation idempotence and the
//! requirement merge identity.

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

use constraint_logic::ComparisonOp;
use edge_policy_core::ConstraintEngine;
use edge_policy_core::ConstraintExpression;
use edge_policy_core::ExternalPolicy;
use edge_policy_core::Property;
use edge_policy_core::PropertyExpression;
use edge_policy_core::PropertyList;
use edge_policy_core::PropertyType;
use edge_policy_core::PropertyValue;
use edge_policy_core::RequiredProperty;
use edge_policy_core::RequirementNode;
use proptest::prelude::*;

/// Generates property values of every scalar shape.
fn value_strategy() -> impl Strategy<Value = PropertyValue> {
    prop_oneof![
        any::<bool>().prop_map(PropertyValue::from),
        (-1000_i64..1000).prop_map(PropertyValue::int),
        "[a-z]{1,6}(,[a-z]{1,6}){0,2}".prop_map(PropertyValue::from),
    ]
}

/// Generates declared types, undeclared included.
fn type_strategy() -> impl Strategy<Value = PropertyType> {
    prop_oneof![
        Just(PropertyType::Undeclared),
        Just(PropertyType::String),
        Just(PropertyType::ListOfString),
        Just(PropertyType::Int),
        Just(PropertyType::Boolean),
    ]
}

/// Generates properties over a small name space so names collide.
fn property_strategy() -> impl Strategy<Value = Property> {
    ("p[a-c]", value_strategy(), type_strategy())
        .prop_map(|(name, value, property_type)| Property::typed(name, value, property_type))
}

/// Generates requirement leaves.
fn requirement_strategy() -> impl Strategy<Value = RequiredProperty> {
    ("p[a-z]{0,4}", "[a-z0-9]{1,6}", 0_usize..ComparisonOp::ALL.len()).prop_map(|(name, value, index)| {
        let leaf = PropertyExpression::new(name, value, ComparisonOp::ALL[index]);
        RequiredProperty::from_root(RequirementNode::Leaf(leaf))
    })
}

proptest! {
    /// Sameness is symmetric.
    #[test]
    fn sameness_is_symmetric(left in property_strategy(), right in property_strategy()) {
        prop_assert_eq!(left.is_same(&right), right.is_same(&left));
        prop_assert!(left.is_same(&left.clone()));
    }

    /// Validating a valid policy twice gives the same result and document.
    #[test]
    fn validation_is_idempotent(
        properties in prop::collection::vec(property_strategy(), 0..6),
        bound in -100_i64..100,
    ) {
        let engine = ConstraintEngine::builtin();
        let list: PropertyList = properties.into_iter().filter(|property| property.validate().is_ok()).collect();
        let mut policy = ExternalPolicy::new(list, ConstraintExpression::from(vec![format!("pa >= {bound}")]));
        let first = policy.validate_and_normalize(&engine);
        let snapshot = policy.clone();
        let second = policy.validate_and_normalize(&engine);
        prop_assert_eq!(first.is_ok(), second.is_ok());
        prop_assert_eq!(policy, snapshot);
    }

    /// The empty requirement is the merge identity.
    #[test]
    fn empty_requirement_is_merge_identity(requirement in requirement_strategy()) {
        let empty = RequiredProperty::empty();
        prop_assert_eq!(requirement.merge(&empty), requirement.clone());
        prop_assert_eq!(empty.merge(&requirement), requirement.clone());
        prop_assert!(empty.merge(&empty).is_empty());
        let doubled = requirement.merge(&requirement);
        prop_assert!(!doubled.is_empty());
    }

    /// Requirement wire form survives a round trip.
    #[test]
    fn requirement_wire_form_is_stable(requirement in requirement_strategy()) {
        let json = serde_json::to_value(&requirement).unwrap();
        let parsed: RequiredProperty = serde_json::from_value(json).unwrap();
        prop_assert_eq!(parsed.to_map(), requirement.to_map());
    }
}
