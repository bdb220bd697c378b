// crates/edge-policy-core/src/property.rs
// ============================================================================
// Module: Properties
// Description: Typed name/value pairs and ordered, name-unique property lists.
// Purpose: Validate, compare, and merge the properties policies advertise.
// Dependencies: bigdecimal, serde, serde_json
// ============================================================================

//! ## Overview
//! A [`Property`] is a name, a [`PropertyValue`] and an optional declared
//! [`PropertyType`]. A [`PropertyList`] keeps properties in insertion order
//! with unique names and serializes as a JSON array.
//! Invariants:
//! - A declared type must match the runtime shape of the value.
//! - Numbers compare as exact decimals, so `2` and `2.0` are the same value.
//! - List-of-string values are comma-joined strings compared as sets.

use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde::Deserialize;
use serde::Serialize;

use crate::error::PolicyError;

// ============================================================================
// SECTION: Property Types
// ============================================================================

/// Declared type of a property value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PropertyType {
    /// No type declared; the value shape decides.
    #[default]
    Undeclared,
    /// `string`
    String,
    /// `version`
    Version,
    /// `boolean`
    Boolean,
    /// `int`
    Int,
    /// `float`
    Float,
    /// `list of string`
    ListOfString,
    /// Any other declared name; always fails validation.
    Unknown(String),
}

impl PropertyType {
    /// Returns the wire name of the type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Undeclared => "",
            Self::String => "string",
            Self::Version => "version",
            Self::Boolean => "boolean",
            Self::Int => "int",
            Self::Float => "float",
            Self::ListOfString => "list of string",
            Self::Unknown(name) => name,
        }
    }

    /// Returns true when no type was declared.
    #[must_use]
    pub const fn is_undeclared(&self) -> bool {
        matches!(self, Self::Undeclared)
    }
}

impl From<String> for PropertyType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "" => Self::Undeclared,
            "string" => Self::String,
            "version" => Self::Version,
            "boolean" => Self::Boolean,
            "int" => Self::Int,
            "float" => Self::Float,
            "list of string" => Self::ListOfString,
            _ => Self::Unknown(value),
        }
    }
}

impl From<PropertyType> for String {
    fn from(value: PropertyType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Property Values
// ============================================================================

/// Value of a property as decoded from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// JSON `null` or an absent value; never valid.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// Numeric value, kept in its JSON form.
    Number(serde_json::Number),
    /// String value; list-of-string values are comma joined.
    String(String),
    /// JSON array of strings, treated as a comma joined list.
    StringList(Vec<String>),
}

impl PropertyValue {
    /// Builds a string value.
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    /// Builds an integer value.
    #[must_use]
    pub fn int(value: i64) -> Self {
        Self::Number(serde_json::Number::from(value))
    }

    /// Returns the value as an exact decimal when it is numeric.
    #[must_use]
    pub fn as_decimal(&self) -> Option<BigDecimal> {
        match self {
            Self::Number(number) => BigDecimal::from_str(&number.to_string()).ok(),
            _ => None,
        }
    }

    /// Returns the value as text when it is a string or string list.
    #[must_use]
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::String(text) => Some(text.clone()),
            Self::StringList(items) => Some(items.join(",")),
            _ => None,
        }
    }

    /// Short name of the value's runtime shape.
    #[must_use]
    pub const fn shape(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::StringList(_) => "list of string",
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Number(value) => write!(f, "{value}"),
            Self::String(value) => f.write_str(value),
            Self::StringList(items) => f.write_str(&items.join(",")),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::int(value)
    }
}

// ============================================================================
// SECTION: Property
// ============================================================================

/// Named, optionally typed value advertised by a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    /// Property name.
    pub name: String,
    /// Property value.
    #[serde(default)]
    pub value: PropertyValue,
    /// Declared type; empty when undeclared.
    #[serde(rename = "type", default, skip_serializing_if = "PropertyType::is_undeclared")]
    pub property_type: PropertyType,
}

impl Property {
    /// Creates an untyped property.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            property_type: PropertyType::Undeclared,
        }
    }

    /// Creates a property with a declared type.
    #[must_use]
    pub fn typed(
        name: impl Into<String>,
        value: impl Into<PropertyValue>,
        property_type: PropertyType,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            property_type,
        }
    }

    /// Checks the value against the declared type.
    ///
    /// # Errors
    /// Returns [`PolicyError::Validation`] for an empty name, a null value, an
    /// unknown declared type, a shape mismatch, a non-integral `int`, or a
    /// malformed `version`.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.name.is_empty() || self.value == PropertyValue::Null {
            return Err(PolicyError::Validation(format!(
                "Property must include a name and a value: {self}"
            )));
        }
        if let PropertyType::Unknown(declared) = &self.property_type {
            return Err(PolicyError::Validation(format!(
                "Property {} has invalid property type {declared}. Allowed property types are: \
                 version, string, int, boolean, float, and list of string.",
                self.name
            )));
        }
        let mismatch = || {
            PolicyError::Validation(format!(
                "Property value is of type {}, expected type {}",
                self.value.shape(),
                self.property_type
            ))
        };
        match (&self.value, &self.property_type) {
            (PropertyValue::Bool(_), PropertyType::Boolean | PropertyType::Undeclared)
            | (PropertyValue::Number(_), PropertyType::Float | PropertyType::Undeclared)
            | (
                PropertyValue::String(_),
                PropertyType::String | PropertyType::ListOfString | PropertyType::Undeclared,
            )
            | (PropertyValue::StringList(_), PropertyType::ListOfString | PropertyType::Undeclared) => {
                Ok(())
            }
            (PropertyValue::Number(_), PropertyType::Int) => {
                if self.value.as_decimal().is_some_and(|decimal| decimal.is_integer()) {
                    Ok(())
                } else {
                    Err(PolicyError::Validation(format!(
                        "Value {} of property {} is not an integer type",
                        self.value, self.name
                    )))
                }
            }
            (PropertyValue::String(text), PropertyType::Version) => {
                if is_version_string(text) {
                    Ok(())
                } else {
                    Err(PolicyError::Validation(format!(
                        "Property {} with value {text} is not a valid verion string",
                        self.name
                    )))
                }
            }
            _ => Err(mismatch()),
        }
    }

    /// Returns true when both properties have the same name and value.
    ///
    /// Declared types must agree unless one side is undeclared. String values
    /// compare as order-independent sets when either side is a list type.
    #[must_use]
    pub fn is_same(&self, other: &Self) -> bool {
        if self.name != other.name {
            return false;
        }
        if self.property_type != other.property_type
            && !self.property_type.is_undeclared()
            && !other.property_type.is_undeclared()
        {
            return false;
        }
        match (&self.value, &other.value) {
            (PropertyValue::Bool(left), PropertyValue::Bool(right)) => left == right,
            (PropertyValue::Number(_), PropertyValue::Number(_)) => {
                match (self.value.as_decimal(), other.value.as_decimal()) {
                    (Some(left), Some(right)) => left == right,
                    _ => false,
                }
            }
            (
                PropertyValue::String(_) | PropertyValue::StringList(_),
                PropertyValue::String(_) | PropertyValue::StringList(_),
            ) => {
                let (Some(left), Some(right)) = (self.value.as_text(), other.value.as_text()) else {
                    return false;
                };
                let as_list = self.property_type == PropertyType::ListOfString
                    || other.property_type == PropertyType::ListOfString
                    || matches!(self.value, PropertyValue::StringList(_))
                    || matches!(other.value, PropertyValue::StringList(_));
                if as_list { same_members(&left, &right) } else { left == right }
            }
            _ => false,
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.property_type.is_undeclared() {
            write!(f, "{}={}", self.name, self.value)
        } else {
            write!(f, "{}={} ({})", self.name, self.value, self.property_type)
        }
    }
}

/// Returns true when two comma joined lists hold the same members.
fn same_members(left: &str, right: &str) -> bool {
    let left: Vec<&str> = left.split(',').collect();
    let right: Vec<&str> = right.split(',').collect();
    left.iter().all(|item| right.contains(item)) && right.iter().all(|item| left.contains(item))
}

/// Returns true for a property version string.
///
/// One to three dot separated numeric parts without leading zeros, or the
/// literal `INFINITY`.
#[must_use]
pub fn is_version_string(value: &str) -> bool {
    if value == "INFINITY" {
        return true;
    }
    let parts: Vec<&str> = value.split('.').collect();
    parts.len() <= 3
        && parts.iter().all(|part| {
            !part.is_empty()
                && part.bytes().all(|b| b.is_ascii_digit())
                && (part.len() == 1 || !part.starts_with('0'))
        })
}

// ============================================================================
// SECTION: Property List
// ============================================================================

/// Ordered list of properties with unique names.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyList(Vec<Property>);

impl PropertyList {
    /// Creates an empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Returns true when the list has no properties.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates the properties in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Property> {
        self.0.iter()
    }

    /// Returns the property named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Property> {
        self.0.iter().find(|property| property.name == name)
    }

    /// Returns a mutable reference to the property named `name`.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Property> {
        self.0.iter_mut().find(|property| property.name == name)
    }

    /// Returns true when a property named `name` exists.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Validates every property and the uniqueness of names.
    ///
    /// # Errors
    /// Returns the first [`PolicyError::Validation`] found.
    pub fn validate(&self) -> Result<(), PolicyError> {
        for (index, property) in self.0.iter().enumerate() {
            property.validate()?;
            if self.0[.. index].iter().any(|earlier| earlier.name == property.name) {
                return Err(PolicyError::Validation(format!(
                    "Property list contains more than one property named {}.",
                    property.name
                )));
            }
        }
        Ok(())
    }

    /// Adds `property`, replacing a same-named one only when `replace`.
    ///
    /// # Errors
    /// Returns [`PolicyError::Validation`] when the property is invalid, or
    /// [`PolicyError::Duplicate`] when the name exists and `replace` is false.
    pub fn add_property(&mut self, property: Property, replace: bool) -> Result<(), PolicyError> {
        if let Err(err) = property.validate() {
            return Err(PolicyError::Validation(format!(
                "Could not validate new property {property}: {err}"
            )));
        }
        if let Some(index) = self.0.iter().position(|existing| existing.name == property.name) {
            if !replace {
                return Err(PolicyError::Duplicate(format!(
                    "PropertyList {self} already has the element being added: {property}"
                )));
            }
            self.0[index] = property;
            return Ok(());
        }
        self.0.push(property);
        Ok(())
    }

    /// Unions `other` into this list; same names keep the existing value
    /// unless `replace`.
    ///
    /// # Errors
    /// Returns [`PolicyError::Validation`] for an invalid incoming property;
    /// properties merged before it stay merged.
    pub fn merge_with(&mut self, other: &Self, replace: bool) -> Result<(), PolicyError> {
        for property in other.iter() {
            if !replace && self.get(&property.name).is_some() {
                continue;
            }
            self.add_property(property.clone(), replace)?;
        }
        Ok(())
    }

    /// Fails when both lists carry the same name with different values.
    ///
    /// With `ignore_builtin`, the fluctuating node memory and cpu properties
    /// are not compared.
    ///
    /// # Errors
    /// Returns [`PolicyError::Merge`] naming the property and both values.
    pub fn compatible_with(&self, other: &Self, ignore_builtin: bool) -> Result<(), PolicyError> {
        for mine in self.iter() {
            let Some(theirs) = other.get(&mine.name) else {
                continue;
            };
            if mine.is_same(theirs) {
                continue;
            }
            if ignore_builtin
                && (mine.name == crate::builtin::PROP_NODE_MEMORY
                    || mine.name == crate::builtin::PROP_NODE_CPU)
            {
                continue;
            }
            return Err(PolicyError::Merge(format!(
                "Property {} has value {} and {}.",
                mine.name, mine.value, theirs.value
            )));
        }
        Ok(())
    }

    /// Returns true when every property here has a same property in `other`.
    #[must_use]
    pub fn is_same(&self, other: &Self) -> bool {
        self.iter().all(|mine| other.iter().any(|theirs| mine.is_same(theirs)))
    }
}

impl From<Vec<Property>> for PropertyList {
    fn from(properties: Vec<Property>) -> Self {
        Self(properties)
    }
}

impl FromIterator<Property> for PropertyList {
    fn from_iter<I: IntoIterator<Item = Property>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a PropertyList {
    type Item = &'a Property;
    type IntoIter = std::slice::Iter<'a, Property>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for PropertyList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (index, property) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{property}")?;
        }
        f.write_str("]")
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
