// crates/edge-policy-compcheck/src/checker.rs
// ============================================================================
// Module: Compatibility Checker
// Description: Configured entry point for both compatibility checks.
// Purpose: Bind the constraint engine and check options to the collaborators.
// Dependencies: constraint-logic, edge-policy-config, edge-policy-core, tracing
// ============================================================================

//! ## Overview
//! [`CompatibilityChecker`] owns the constraint engine and the options that
//! shape a check, and borrows the collaborators per call so one checker
//! serves any number of lookup backends.

use constraint_logic::LanguageRegistry;
use edge_policy_config::EdgePolicyConfig;
use edge_policy_core::ConstraintEngine;
use tracing::info;

use crate::collaborators::Collaborators;
use crate::deploy::deploy_compatible;
use crate::error::CompCheckError;
use crate::policy_check::policy_compatible;
use crate::resource::CompCheck;
use crate::resource::CompCheckOutput;
use crate::resource::PolicyCheck;
use crate::resource::SecretBindingCheck;
use crate::resource::UserInputCheck;
use crate::secret_binding::secret_binding_compatible;
use crate::userinput::user_input_compatible;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Options of a [`CompatibilityChecker`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CheckerConfig {
    /// Evaluate every service version instead of stopping at the first
    /// compatible one.
    pub check_all_services: bool,
    /// Agbot url for secret existence checks; `None` skips them.
    pub agbot_url: Option<String>,
    /// Constraint language; `None` tries the registered languages in order.
    pub language: Option<String>,
}

impl From<&EdgePolicyConfig> for CheckerConfig {
    fn from(config: &EdgePolicyConfig) -> Self {
        Self {
            check_all_services: config.check.check_all_services,
            agbot_url: config.check.agbot_url.clone(),
            language: config.constraints.language.clone(),
        }
    }
}

// ============================================================================
// SECTION: Checker
// ============================================================================

/// Runs policy, user input, secret binding and combined deployment checks.
pub struct CompatibilityChecker {
    /// Options.
    config: CheckerConfig,
    /// Engine shared by every check.
    engine: ConstraintEngine,
}

impl CompatibilityChecker {
    /// Creates a checker over the languages in `registry`.
    #[must_use]
    pub fn new(config: CheckerConfig, registry: LanguageRegistry) -> Self {
        let engine = ConstraintEngine::new(registry, config.language.clone());
        Self {
            config,
            engine,
        }
    }

    /// Creates a checker with the built-in languages from a loaded
    /// configuration.
    #[must_use]
    pub fn from_config(config: &EdgePolicyConfig) -> Self {
        Self::new(CheckerConfig::from(config), LanguageRegistry::builtin())
    }

    /// Returns whether every service version is evaluated by default.
    #[must_use]
    pub const fn check_all_services(&self) -> bool {
        self.config.check_all_services
    }

    /// Returns the constraint engine.
    #[must_use]
    pub const fn engine(&self) -> &ConstraintEngine {
        &self.engine
    }

    /// Checks whether the node and the deployment policy's services accept
    /// each other. `check_all` is combined with the configured default.
    ///
    /// # Errors
    /// Returns a [`CompCheckError`] when the input cannot be evaluated.
    pub fn policy_compatible(
        &self,
        collaborators: &dyn Collaborators,
        input: &PolicyCheck,
        check_all: bool,
    ) -> Result<CompCheckOutput, CompCheckError> {
        let check_all = check_all || self.config.check_all_services;
        let output = policy_compatible(collaborators, &self.engine, input, check_all)?;
        info!(compatible = output.compatible, services = output.reason.len(), "policy compatibility checked");
        Ok(output)
    }

    /// Checks whether the deployment and the node set every variable the
    /// services declare.
    ///
    /// # Errors
    /// Returns a [`CompCheckError`] when the input cannot be evaluated.
    pub fn user_input_compatible(
        &self,
        collaborators: &dyn Collaborators,
        input: &UserInputCheck,
        check_all: bool,
    ) -> Result<CompCheckOutput, CompCheckError> {
        let check_all = check_all || self.config.check_all_services;
        let output = user_input_compatible(collaborators, &self.engine, input, check_all)?;
        info!(compatible = output.compatible, services = output.reason.len(), "user input compatibility checked");
        Ok(output)
    }

    /// Runs every check that applies to the deployment and combines them.
    ///
    /// # Errors
    /// Returns a [`CompCheckError`] when the input cannot be evaluated.
    pub fn deploy_compatible(
        &self,
        collaborators: &dyn Collaborators,
        input: &CompCheck,
        check_all: bool,
    ) -> Result<CompCheckOutput, CompCheckError> {
        let output = deploy_compatible(
            collaborators,
            &self.engine,
            self.config.agbot_url.as_deref(),
            input,
            check_all || self.config.check_all_services,
        )?;
        info!(compatible = output.compatible, services = output.reason.len(), "deployment compatibility checked");
        Ok(output)
    }

    /// Checks whether the deployment binds every secret its services use.
    ///
    /// # Errors
    /// Returns a [`CompCheckError`] when the input cannot be evaluated.
    pub fn secret_binding_compatible(
        &self,
        collaborators: &dyn Collaborators,
        input: &SecretBindingCheck,
        check_all: bool,
    ) -> Result<CompCheckOutput, CompCheckError> {
        let output = secret_binding_compatible(
            collaborators,
            &self.engine,
            self.config.agbot_url.as_deref(),
            input,
            check_all || self.config.check_all_services,
        )?;
        info!(
            compatible = output.compatible,
            services = output.reason.len(),
            "secret binding compatibility checked"
        );
        Ok(output)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
