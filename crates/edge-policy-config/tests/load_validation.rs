//! Config load validation tests for edge-policy-config.
// crates/edge-policy-config/tests/load_validation.rs
// =============================================================================
// Module: Config Load Validation Tests
// Description: Validate config loading guards (path, size, encoding).
// Purpose: Ensure config input handling is strict and fail-closed.
// =============================================================================

use std::io::Write;
use std::path::Path;

use edge_policy_config::ConfigError;
use edge_policy_config::EdgePolicyConfig;
use edge_policy_config::LogFormat;
use tempfile::NamedTempFile;

/// Result type for these tests.
type TestResult = Result<(), String>;

/// Expects a load failure whose message contains `needle`.
fn assert_invalid(result: Result<EdgePolicyConfig, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config load".to_string()),
    }
}

/// Tests an overlong path is rejected.
#[test]
fn load_rejects_path_too_long() -> TestResult {
    let long_path = "a".repeat(5_000);
    assert_invalid(EdgePolicyConfig::load(Some(Path::new(&long_path))), "config path exceeds max length")
}

/// Tests an overlong path component is rejected.
#[test]
fn load_rejects_path_component_too_long() -> TestResult {
    let long_component = "a".repeat(300);
    assert_invalid(EdgePolicyConfig::load(Some(Path::new(&long_component))), "config path component too long")
}

/// Tests an oversized file is rejected.
#[test]
fn load_rejects_oversized_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(&vec![b'#'; 1_048_577]).map_err(|err| err.to_string())?;
    assert_invalid(EdgePolicyConfig::load(Some(file.path())), "config file exceeds size limit")
}

/// Tests non UTF-8 content is rejected.
#[test]
fn load_rejects_non_utf8_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(&[0xFF, 0xFE, 0xFF]).map_err(|err| err.to_string())?;
    assert_invalid(EdgePolicyConfig::load(Some(file.path())), "config file must be utf-8")
}

/// Tests a missing explicit file is an io error.
#[test]
fn load_rejects_missing_explicit_file() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    assert_invalid(EdgePolicyConfig::load(Some(&dir.path().join("absent.toml"))), "config io error")
}

/// Tests a valid file loads.
#[test]
fn load_accepts_valid_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(
        b"[constraints]\nlanguage = \"text\"\n\n[check]\ncheck_all_services = true\n\n[logging]\nlevel = \"debug\"\nformat = \"json\"\n",
    )
    .map_err(|err| err.to_string())?;
    let config = EdgePolicyConfig::load(Some(file.path())).map_err(|err| err.to_string())?;
    if config.constraints.language.as_deref() != Some("text") {
        return Err("language not loaded".to_string());
    }
    if !config.check.check_all_services || config.logging.format != LogFormat::Json {
        return Err("check or logging settings not loaded".to_string());
    }
    Ok(())
}
