// crates/edge-policy-core/src/constraint.rs
// ============================================================================
// Module: Constraint Expressions
// Description: Ordered constraint strings and the engine that evaluates them.
// Purpose: Bridge policy constraints to the pluggable constraint languages.
// Dependencies: constraint-logic, serde
// ============================================================================

//! ## Overview
//! A [`ConstraintExpression`] is the ordered list of constraint strings a
//! policy carries. The strings stay opaque until a [`ConstraintEngine`]
//! parses them with the configured (or first accepting) constraint language.
//! Satisfaction converts every string into its own requirement tree and
//! requires all of them to hold against a property list.

use std::fmt;

use constraint_logic::Expression;
use constraint_logic::LanguageRegistry;
use serde::Deserialize;
use serde::Serialize;

use crate::error::PolicyError;
use crate::property::PropertyList;
use crate::required::RequiredProperty;
use crate::required::RequirementNode;

// ============================================================================
// SECTION: Constraint Engine
// ============================================================================

/// Constraint language selection used for every parse.
///
/// # Invariants
/// - When `language` is set, only that grammar is consulted.
pub struct ConstraintEngine {
    /// Available constraint grammars.
    registry: LanguageRegistry,
    /// Explicitly configured grammar name.
    language: Option<String>,
}

impl ConstraintEngine {
    /// Creates an engine over `registry`.
    #[must_use]
    pub const fn new(registry: LanguageRegistry, language: Option<String>) -> Self {
        Self {
            registry,
            language,
        }
    }

    /// Creates an engine with the built-in grammars and no fixed language.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(LanguageRegistry::builtin(), None)
    }

    /// Returns the grammar registry.
    #[must_use]
    pub const fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    /// Parses every constraint string into an expression tree.
    ///
    /// # Errors
    /// Returns [`PolicyError::Validation`] carrying the language error.
    pub fn parse(&self, constraints: &[String]) -> Result<Vec<Expression>, PolicyError> {
        self.registry
            .handler_for(self.language.as_deref(), constraints)
            .map(|(_, expressions)| expressions)
            .map_err(|err| PolicyError::Validation(err.to_string()))
    }
}

impl Default for ConstraintEngine {
    fn default() -> Self {
        Self::builtin()
    }
}

// ============================================================================
// SECTION: Constraint Expression
// ============================================================================

/// Ordered list of constraint strings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConstraintExpression(Vec<String>);

impl ConstraintExpression {
    /// Creates an expression from constraint strings.
    #[must_use]
    pub const fn new(constraints: Vec<String>) -> Self {
        Self(constraints)
    }

    /// Returns true when there are no constraints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the constraint strings.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Appends a constraint string.
    pub fn add_constraint(&mut self, constraint: impl Into<String>) {
        self.0.push(constraint.into());
    }

    /// Returns this expression followed by every string of `other` not
    /// already present.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let mut merged = self.clone();
        for constraint in &other.0 {
            if !merged.0.contains(constraint) {
                merged.0.push(constraint.clone());
            }
        }
        merged
    }

    /// Appends every string of `other`, keeping duplicates.
    pub fn extend_from(&mut self, other: &Self) {
        self.0.extend(other.0.iter().cloned());
    }

    /// Returns true when both hold the same strings in any order.
    #[must_use]
    pub fn is_same(&self, other: &Self) -> bool {
        self.0.iter().all(|constraint| other.0.contains(constraint))
            && other.0.iter().all(|constraint| self.0.contains(constraint))
    }

    /// Validates every string with the engine's language selection.
    ///
    /// # Errors
    /// Returns [`PolicyError::Validation`] when a string does not parse.
    pub fn validate(&self, engine: &ConstraintEngine) -> Result<(), PolicyError> {
        engine.parse(&self.0).map(|_| ())
    }

    /// Converts the constraints into one requirement tree: an `and` over the
    /// tree of each string.
    ///
    /// # Errors
    /// Returns [`PolicyError::Validation`] when a string does not parse.
    pub fn to_required_property(
        &self,
        engine: &ConstraintEngine,
    ) -> Result<RequiredProperty, PolicyError> {
        if self.0.is_empty() {
            return Ok(RequiredProperty::empty());
        }
        let nodes = engine.parse(&self.0)?.iter().map(RequirementNode::from_expression).collect();
        Ok(RequiredProperty::from_root(RequirementNode::And(nodes)))
    }

    /// Checks the constraints against `properties`.
    ///
    /// # Errors
    /// Returns [`PolicyError::Validation`] when a string does not parse and
    /// [`PolicyError::Unsatisfied`] when a constraint does not hold.
    pub fn is_satisfied_by(
        &self,
        engine: &ConstraintEngine,
        properties: &PropertyList,
    ) -> Result<(), PolicyError> {
        if self.0.is_empty() {
            return Ok(());
        }
        self.to_required_property(engine)?.is_satisfied_by(properties)
    }
}

impl From<Vec<String>> for ConstraintExpression {
    fn from(constraints: Vec<String>) -> Self {
        Self(constraints)
    }
}

impl From<Vec<&str>> for ConstraintExpression {
    fn from(constraints: Vec<&str>) -> Self {
        Self(constraints.into_iter().map(str::to_string).collect())
    }
}

impl fmt::Display for ConstraintExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
