// crates/edge-policy-core/src/required.rs
// ============================================================================
// Module: Required Properties
// Description: Typed AND/OR trees of property comparisons and their evaluator.
// Purpose: Decide whether a property list satisfies a counter-party requirement.
// Dependencies: bigdecimal, constraint-logic, serde, serde_json
// ============================================================================

//! ## Overview
//! A [`RequiredProperty`] is a boolean tree whose inner nodes are `and`/`or`
//! control operators and whose leaves are [`PropertyExpression`]s. It is built
//! once, either from the wire form (a single-key JSON object) through a
//! fallible constructor or from a parsed constraint, and then evaluated any
//! number of times against different property lists.
//!
//! Wire form:
//! ```json
//! {"and": [{"name": "arch", "value": "amd64"}, {"or": [...]}]}
//! ```
//!
//! Leaves never error during evaluation: an absent property or a value of an
//! incomparable type is simply not a match.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use constraint_logic::ComparisonOp;
use constraint_logic::Expression;
use constraint_logic::VersionRange;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::error::PolicyError;
use crate::property::Property;
use crate::property::PropertyList;
use crate::property::PropertyType;
use crate::property::PropertyValue;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Control operator requiring every child.
const OP_AND: &str = "and";
/// Control operator requiring one child.
const OP_OR: &str = "or";
/// Reserved control operator; rejected.
const OP_NOT: &str = "not";

// ============================================================================
// SECTION: Tree Types
// ============================================================================

/// Leaf comparison of a named property against a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyExpression {
    /// Property name to look up.
    pub name: String,
    /// Value to compare with.
    pub value: PropertyValue,
    /// Comparison operator; `=` when omitted on the wire.
    pub op: ComparisonOp,
}

impl PropertyExpression {
    /// Creates a leaf.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<PropertyValue>, op: ComparisonOp) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            op,
        }
    }

    /// Returns true when a property in `properties` matches this leaf.
    #[must_use]
    pub fn matches(&self, properties: &PropertyList) -> bool {
        properties.get(&self.name).is_some_and(|property| leaf_matches(property, self))
    }

    /// Wire form of the leaf.
    fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("name".to_string(), Value::String(self.name.clone()));
        map.insert(
            "value".to_string(),
            serde_json::to_value(&self.value).unwrap_or(Value::Null),
        );
        map.insert("op".to_string(), Value::String(self.op.as_str().to_string()));
        Value::Object(map)
    }
}

impl fmt::Display for PropertyExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.name, self.op, self.value)
    }
}

/// Node of a requirement tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequirementNode {
    /// Every child must hold.
    And(Vec<Self>),
    /// At least one child must hold.
    Or(Vec<Self>),
    /// Leaf comparison.
    Leaf(PropertyExpression),
}

impl RequirementNode {
    /// Converts a parsed constraint into a requirement node.
    ///
    /// Literal values are kept as their source text, quotes included.
    #[must_use]
    pub fn from_expression(expression: &Expression) -> Self {
        match expression {
            Expression::All(children) => Self::And(children.iter().map(Self::from_expression).collect()),
            Expression::Any(children) => Self::Or(children.iter().map(Self::from_expression).collect()),
            Expression::Compare(comparison) => Self::Leaf(PropertyExpression::new(
                comparison.property.clone(),
                comparison.value.raw(),
                comparison.op,
            )),
        }
    }

    /// Evaluates the node, describing the first failure.
    fn check(&self, properties: &PropertyList) -> Result<(), PolicyError> {
        match self {
            Self::Leaf(leaf) => {
                if leaf.matches(properties) {
                    Ok(())
                } else {
                    Err(PolicyError::Unsatisfied(format!(
                        "Property {} with value {} not in {properties}",
                        leaf.name, leaf.value
                    )))
                }
            }
            Self::And(children) => children.iter().try_for_each(|child| child.check(properties)),
            Self::Or(children) => {
                if children.iter().any(|child| child.check(properties).is_ok()) {
                    return Ok(());
                }
                let listed = children.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
                Err(PolicyError::Unsatisfied(format!(
                    "One of Required Properties [{listed}] not in {properties}"
                )))
            }
        }
    }

    /// Wire form of the node.
    fn to_value(&self) -> Value {
        let (key, children) = match self {
            Self::Leaf(leaf) => return leaf.to_value(),
            Self::And(children) => (OP_AND, children),
            Self::Or(children) => (OP_OR, children),
        };
        let mut map = Map::new();
        map.insert(key.to_string(), Value::Array(children.iter().map(Self::to_value).collect()));
        Value::Object(map)
    }

    /// Builds a control node from its operator key and array value.
    fn control(key: &str, value: &Value) -> Result<Self, PolicyError> {
        if key == OP_NOT {
            return Err(PolicyError::Validation(
                "RequiredProperty Object not valid, control operator not is not supported."
                    .to_string(),
            ));
        }
        if key != OP_AND && key != OP_OR {
            return Err(PolicyError::Validation(format!(
                "RequiredProperty Object not valid, top level key has to be one of [{OP_AND} \
                 {OP_OR}], is {key}"
            )));
        }
        let Value::Array(elements) = value else {
            return Err(PolicyError::Validation(format!(
                "RequiredProperty Object not valid, control operator value is not an array, is \
                 {value}"
            )));
        };
        let children = elements.iter().map(Self::element).collect::<Result<Vec<_>, _>>()?;
        Ok(if key == OP_AND { Self::And(children) } else { Self::Or(children) })
    }

    /// Builds a node from one element of a control operator array.
    fn element(value: &Value) -> Result<Self, PolicyError> {
        let not_valid = || {
            PolicyError::Validation(format!(
                "Control Operator contains an element that is not a Property and not a control \
                 operator {value}"
            ))
        };
        let Value::Object(map) = value else {
            return Err(not_valid());
        };
        if map.contains_key("name") && map.contains_key("value") {
            let Some(Value::String(name)) = map.get("name") else {
                return Err(not_valid());
            };
            let parsed: PropertyValue = map
                .get("value")
                .cloned()
                .map(serde_json::from_value)
                .transpose()
                .map_err(|_| not_valid())?
                .unwrap_or_default();
            if name.is_empty() || parsed == PropertyValue::Null {
                return Err(not_valid());
            }
            let op = match map.get("op") {
                None => ComparisonOp::Eq,
                Some(Value::String(text)) => ComparisonOp::parse(text).ok_or_else(not_valid)?,
                Some(_) => return Err(not_valid()),
            };
            return Ok(Self::Leaf(PropertyExpression::new(name.clone(), parsed, op)));
        }
        match map.iter().next() {
            Some((key, inner)) if map.len() == 1 => Self::control(key, inner),
            _ => Err(not_valid()),
        }
    }
}

impl fmt::Display for RequirementNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

// ============================================================================
// SECTION: Required Property
// ============================================================================

/// Requirement tree; empty means always satisfied.
///
/// # Invariants
/// - The root, when present, is an `And` or `Or` node.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct RequiredProperty {
    /// Root control node.
    root: Option<RequirementNode>,
}

impl RequiredProperty {
    /// Returns the empty requirement.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            root: None,
        }
    }

    /// Wraps a root node; a leaf root is placed under `and`.
    #[must_use]
    pub fn from_root(root: RequirementNode) -> Self {
        let root = match root {
            RequirementNode::Leaf(_) => RequirementNode::And(vec![root]),
            control => control,
        };
        Self {
            root: Some(root),
        }
    }

    /// Builds a requirement from its wire form.
    ///
    /// # Errors
    /// Returns [`PolicyError::Validation`] unless the map is empty or has one
    /// control operator key whose array holds only valid leaves and nodes.
    pub fn from_map(map: &Map<String, Value>) -> Result<Self, PolicyError> {
        if map.is_empty() {
            return Ok(Self::empty());
        }
        let mut entries = map.iter();
        let (Some((key, value)), None) = (entries.next(), entries.next()) else {
            return Err(PolicyError::Validation(format!(
                "RequiredProperty Object not valid, {} should have 1 top level key, has {}",
                Value::Object(map.clone()),
                map.len()
            )));
        };
        Ok(Self {
            root: Some(RequirementNode::control(key, value)?),
        })
    }

    /// Builds a requirement from a JSON value that must be an object.
    ///
    /// # Errors
    /// Returns [`PolicyError::Validation`] for non-objects and invalid trees.
    pub fn from_value(value: &Value) -> Result<Self, PolicyError> {
        match value {
            Value::Object(map) => Self::from_map(map),
            Value::Null => Ok(Self::empty()),
            other => Err(PolicyError::Validation(format!(
                "RequiredProperty Object not valid, {other} is not an object"
            ))),
        }
    }

    /// Checks a wire form tree without keeping it.
    ///
    /// # Errors
    /// Returns [`PolicyError::Validation`] under the same rules as
    /// [`RequiredProperty::from_map`].
    pub fn is_valid(map: &Map<String, Value>) -> Result<(), PolicyError> {
        Self::from_map(map).map(|_| ())
    }

    /// Returns true when there is no requirement.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Returns the root node.
    #[must_use]
    pub const fn root(&self) -> Option<&RequirementNode> {
        self.root.as_ref()
    }

    /// Checks the tree against `properties`.
    ///
    /// # Errors
    /// Returns [`PolicyError::Unsatisfied`] naming the first unmet leaf of an
    /// `and`, or listing every alternative of an unmet `or`.
    pub fn is_satisfied_by(&self, properties: &PropertyList) -> Result<(), PolicyError> {
        self.root.as_ref().map_or(Ok(()), |root| root.check(properties))
    }

    /// Returns `{"and": [self, other]}`; an empty side is the identity.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        match (&self.root, &other.root) {
            (None, _) => other.clone(),
            (_, None) => self.clone(),
            (Some(left), Some(right)) => Self {
                root: Some(RequirementNode::And(vec![left.clone(), right.clone()])),
            },
        }
    }

    /// Returns the wire form.
    #[must_use]
    pub fn to_map(&self) -> Map<String, Value> {
        match self.root.as_ref().map(RequirementNode::to_value) {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

impl TryFrom<Map<String, Value>> for RequiredProperty {
    type Error = PolicyError;

    fn try_from(map: Map<String, Value>) -> Result<Self, Self::Error> {
        Self::from_map(&map)
    }
}

impl From<RequiredProperty> for Map<String, Value> {
    fn from(required: RequiredProperty) -> Self {
        required.to_map()
    }
}

impl fmt::Display for RequiredProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.to_map()))
    }
}

// ============================================================================
// SECTION: Leaf Evaluation
// ============================================================================

/// Compares one property with one leaf.
fn leaf_matches(property: &Property, leaf: &PropertyExpression) -> bool {
    match &property.value {
        PropertyValue::Number(_) => {
            let (Some(actual), Some(expected)) = (property.value.as_decimal(), leaf_decimal(&leaf.value))
            else {
                return false;
            };
            let ordering = actual.cmp(&expected);
            match leaf.op {
                ComparisonOp::Lt => ordering == Ordering::Less,
                ComparisonOp::Gt => ordering == Ordering::Greater,
                ComparisonOp::Le => ordering != Ordering::Greater,
                ComparisonOp::Ge => ordering != Ordering::Less,
                ComparisonOp::NotEq => ordering != Ordering::Equal,
                ComparisonOp::Eq | ComparisonOp::EqEq | ComparisonOp::In => {
                    ordering == Ordering::Equal
                }
            }
        }
        PropertyValue::Bool(actual) => {
            let Some(expected) = leaf_bool(&leaf.value) else {
                return false;
            };
            match leaf.op {
                ComparisonOp::NotEq => *actual != expected,
                ComparisonOp::Eq | ComparisonOp::EqEq => *actual == expected,
                _ => false,
            }
        }
        PropertyValue::String(_) | PropertyValue::StringList(_) => {
            let (Some(actual), Some(expected)) = (property.value.as_text(), leaf.value.as_text())
            else {
                return false;
            };
            string_matches(property, &clean(&actual), &clean(&expected), leaf.op)
        }
        PropertyValue::Null => false,
    }
}

/// String comparison rules, including list and version semantics.
fn string_matches(property: &Property, actual: &str, expected: &str, op: ComparisonOp) -> bool {
    let is_list = property.property_type == PropertyType::ListOfString
        || matches!(property.value, PropertyValue::StringList(_));
    match op {
        ComparisonOp::NotEq => {
            if is_list {
                !list_contains(expected, actual)
            } else {
                actual != expected
            }
        }
        ComparisonOp::In => {
            if is_version_property(property, actual, expected) {
                contains_version(actual, expected)
            } else if is_list {
                list_contains_any(actual, expected)
            } else {
                list_contains(actual, expected)
            }
        }
        ComparisonOp::Eq | ComparisonOp::EqEq => {
            list_contains(expected, actual) || actual == expected
        }
        ComparisonOp::Lt | ComparisonOp::Gt | ComparisonOp::Le | ComparisonOp::Ge => false,
    }
}

/// Returns true when the property should be matched as a version.
///
/// Declared versions always are; undeclared ones when the property value is a
/// version and the expected value is a bracketed range.
fn is_version_property(property: &Property, actual: &str, expected: &str) -> bool {
    match property.property_type {
        PropertyType::Version => true,
        PropertyType::Undeclared => {
            crate::property::is_version_string(actual) && expected.starts_with(['[', '('])
        }
        _ => false,
    }
}

/// Returns true when `version` lies in the range expression `range`.
fn contains_version(version: &str, range: &str) -> bool {
    VersionRange::parse(range)
        .and_then(|range| range.is_within_range(version))
        .unwrap_or(false)
}

/// Numeric value of a leaf: a number, or a string holding one.
fn leaf_decimal(value: &PropertyValue) -> Option<BigDecimal> {
    match value {
        PropertyValue::Number(_) => value.as_decimal(),
        PropertyValue::String(text) => BigDecimal::from_str(&clean(text)).ok(),
        _ => None,
    }
}

/// Boolean value of a leaf: a boolean, or a string spelling one.
fn leaf_bool(value: &PropertyValue) -> Option<bool> {
    match value {
        PropertyValue::Bool(flag) => Some(*flag),
        PropertyValue::String(text) => parse_bool(&clean(text)),
        _ => None,
    }
}

/// Accepts `1 t T TRUE true True` and `0 f F FALSE false False`.
fn parse_bool(text: &str) -> Option<bool> {
    match text {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Trims spaces, strips one pair of surrounding quotes, trims again.
fn clean(text: &str) -> String {
    let trimmed = text.trim_matches(' ');
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(trimmed);
    unquoted.trim_matches(' ').to_string()
}

/// Returns true when `single` is one of the comma separated `list` items.
fn list_contains(single: &str, list: &str) -> bool {
    let wanted = clean(single);
    list.split(',').any(|item| clean(item) == wanted)
}

/// Returns true when any item of `items` is in `list`.
fn list_contains_any(items: &str, list: &str) -> bool {
    items.split(',').any(|item| list_contains(item, list))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
