// crates/edge-policy-config/src/lib.rs
// ============================================================================
// Module: Edge Policy Config
// Description: Configuration model, loading, and logging setup.
// Purpose: Share one validated configuration between the checker and the CLI.
// Dependencies: serde, thiserror, toml, tracing-subscriber
// ============================================================================

//! ## Overview
//! Loads `edge-policy.toml`, validates it fail-closed, and installs the
//! tracing subscriber described by its `[logging]` table.

pub mod config;
pub mod logging;

pub use config::CheckConfig;
pub use config::ConfigError;
pub use config::ConstraintsConfig;
pub use config::EdgePolicyConfig;
pub use config::LogFormat;
pub use config::LoggingConfig;
pub use logging::init_logging;
