// crates/edge-policy-core/src/external.rs
// ============================================================================
// Module: External Policy
// Description: The properties and constraints a node or service advertises.
// Purpose: Validate, normalize, and merge the node-facing policy unit.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! An [`ExternalPolicy`] is what node, service and (embedded) deployment
//! policies expose: a property list and a constraint expression. Validation
//! also normalizes the privilege built-in, which authors may write as the
//! strings `"true"` or `"false"`.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::builtin::PROP_NODE_PRIVILEGED;
use crate::constraint::ConstraintEngine;
use crate::constraint::ConstraintExpression;
use crate::error::PolicyError;
use crate::property::Property;
use crate::property::PropertyList;
use crate::property::PropertyValue;

// ============================================================================
// SECTION: External Policy
// ============================================================================

/// Properties and constraints advertised by one party.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExternalPolicy {
    /// Advertised properties.
    #[serde(default, skip_serializing_if = "PropertyList::is_empty")]
    pub properties: PropertyList,
    /// Requirements on the counter party.
    #[serde(default, skip_serializing_if = "ConstraintExpression::is_empty")]
    pub constraints: ConstraintExpression,
}

impl ExternalPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(properties: PropertyList, constraints: ConstraintExpression) -> Self {
        Self {
            properties,
            constraints,
        }
    }

    /// Validates properties and constraints, normalizing the privilege
    /// property to a boolean.
    ///
    /// # Errors
    /// Returns [`PolicyError::Validation`] for an invalid property, a
    /// non-boolean privilege value, or a constraint that does not parse.
    pub fn validate_and_normalize(&mut self, engine: &ConstraintEngine) -> Result<(), PolicyError> {
        if !self.properties.is_empty()
            && let Err(err) = self.properties.validate()
        {
            return Err(PolicyError::Validation(format!(
                "properties contains an invalid property: {err}"
            )));
        }
        normalize_privileged(&mut self.properties)?;
        self.constraints.validate(engine)
    }

    /// Merges `other` into this policy; properties keep existing values
    /// unless `replace`, constraints are unioned without duplicates.
    ///
    /// # Errors
    /// Returns [`PolicyError::Validation`] when `other` carries an invalid
    /// property.
    pub fn merge_with(&mut self, other: &Self, replace: bool) -> Result<(), PolicyError> {
        if !other.properties.is_empty() {
            self.properties.merge_with(&other.properties, replace)?;
        }
        if !other.constraints.is_empty() {
            self.constraints = self.constraints.merge(&other.constraints);
        }
        Ok(())
    }
}

impl fmt::Display for ExternalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExternalPolicy: Properties: {}, Constraints: {}", self.properties, self.constraints)
    }
}

/// Rewrites a string `"true"`/`"false"` privilege property as a boolean.
///
/// # Errors
/// Returns [`PolicyError::Validation`] for any other non-boolean value.
pub fn normalize_privileged(properties: &mut PropertyList) -> Result<(), PolicyError> {
    let Some(property) = properties.get(PROP_NODE_PRIVILEGED) else {
        return Ok(());
    };
    let flag = match &property.value {
        PropertyValue::Bool(_) => return Ok(()),
        PropertyValue::String(text) if text == "true" => true,
        PropertyValue::String(text) if text == "false" => false,
        _ => {
            return Err(PolicyError::Validation(format!(
                "Property {PROP_NODE_PRIVILEGED} must have a boolean value (true or false)."
            )));
        }
    };
    properties.add_property(Property::new(PROP_NODE_PRIVILEGED, flag), true)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
