// crates/constraint-logic/src/registry.rs
// ============================================================================
// Module: Constraint Language Registry
// Description: Strategy trait and explicit registry for constraint grammars.
// Purpose: Select the grammar that understands a set of constraint strings.
// Dependencies: crate::ast, crate::error, crate::text
// ============================================================================

//! ## Overview
//! Each constraint grammar implements [`ConstraintLanguage`]. A
//! [`LanguageRegistry`] owns the available grammars keyed by name and picks
//! one for a constraint list, either by explicit configuration or by trying
//! the registered grammars in name order and keeping the first that accepts
//! every string.

use std::collections::BTreeMap;

use crate::ast::Expression;
use crate::error::LanguageError;
use crate::text::TextLanguage;

// ============================================================================
// SECTION: Language Trait
// ============================================================================

/// A constraint grammar.
pub trait ConstraintLanguage: Send + Sync {
    /// Registry name of the grammar.
    fn name(&self) -> &str;

    /// Parses one constraint string.
    ///
    /// # Errors
    /// Returns [`LanguageError::Parse`] when the string is not valid in this
    /// grammar.
    fn parse(&self, constraint: &str) -> Result<Expression, LanguageError>;

    /// Parses every constraint string, failing on the first invalid one.
    ///
    /// # Errors
    /// Returns the first [`LanguageError`] raised by [`Self::parse`].
    fn validate(&self, constraints: &[String]) -> Result<Vec<Expression>, LanguageError> {
        constraints.iter().map(|constraint| self.parse(constraint)).collect()
    }
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Named set of constraint grammars.
///
/// # Invariants
/// - Language names are unique within the registry.
/// - Iteration order is the lexical order of names.
pub struct LanguageRegistry {
    /// Grammars keyed by registry name.
    languages: BTreeMap<String, Box<dyn ConstraintLanguage>>,
}

impl LanguageRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            languages: BTreeMap::new(),
        }
    }

    /// Creates a registry holding the built-in text grammar.
    #[must_use]
    pub fn builtin() -> Self {
        let mut languages: BTreeMap<String, Box<dyn ConstraintLanguage>> = BTreeMap::new();
        languages.insert(TextLanguage.name().to_string(), Box::new(TextLanguage));
        Self {
            languages,
        }
    }

    /// Adds a grammar under its own name.
    ///
    /// # Errors
    /// Returns [`LanguageError::Registry`] when the name is already taken.
    pub fn register(
        &mut self,
        language: impl ConstraintLanguage + 'static,
    ) -> Result<(), LanguageError> {
        let name = language.name().to_string();
        if self.languages.contains_key(&name) {
            return Err(LanguageError::Registry(format!(
                "constraint language already registered: {name}"
            )));
        }
        self.languages.insert(name, Box::new(language));
        Ok(())
    }

    /// Returns the grammar registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn ConstraintLanguage> {
        self.languages.get(name).map(|language| &**language)
    }

    /// Returns the registered names in order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.languages.keys().map(String::as_str).collect()
    }

    /// Returns the first grammar, in name order, that parses every string.
    ///
    /// # Errors
    /// Returns [`LanguageError::Registry`] when the registry is empty. When no
    /// grammar accepts the strings, the single grammar's error is returned
    /// as-is, or the per-grammar failures are joined.
    pub fn validated_by_one(
        &self,
        constraints: &[String],
    ) -> Result<(&dyn ConstraintLanguage, Vec<Expression>), LanguageError> {
        if self.languages.is_empty() {
            return Err(LanguageError::Registry("no constraint language registered".to_string()));
        }
        let mut failures = Vec::new();
        for (name, language) in &self.languages {
            match language.validate(constraints) {
                Ok(expressions) => return Ok((&**language, expressions)),
                Err(err) => failures.push((name.as_str(), err)),
            }
        }
        if failures.len() == 1
            && let Some((_, err)) = failures.pop()
        {
            return Err(err);
        }
        let joined = failures
            .iter()
            .map(|(name, err)| format!("{name}: {err}"))
            .collect::<Vec<_>>()
            .join("; ");
        Err(LanguageError::Parse(format!(
            "No constraint language accepts the constraints [{}]. {joined}",
            constraints.join(", ")
        )))
    }

    /// Selects the configured grammar, or the first that validates.
    ///
    /// # Errors
    /// Returns [`LanguageError::Registry`] for an unknown configured name, or
    /// the validation error of the selected grammar.
    pub fn handler_for(
        &self,
        configured: Option<&str>,
        constraints: &[String],
    ) -> Result<(&dyn ConstraintLanguage, Vec<Expression>), LanguageError> {
        let Some(name) = configured else {
            return self.validated_by_one(constraints);
        };
        let language = self.get(name).ok_or_else(|| {
            LanguageError::Registry(format!("constraint language not registered: {name}"))
        })?;
        let expressions = language.validate(constraints)?;
        Ok((language, expressions))
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
