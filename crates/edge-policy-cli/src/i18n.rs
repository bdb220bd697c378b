// crates/edge-policy-cli/src/i18n.rs
// ============================================================================
// Module: CLI Message Catalog
// Description: Message catalog and placeholder substitution for CLI output.
// Purpose: Keep every user-facing string in one reviewed place.
// Dependencies: Standard library collections.
// ============================================================================

//! ## Overview
//! User-facing CLI strings live in a static catalog keyed by message id and
//! are rendered through the [`t!`](crate::t) macro.
//!
//! ## Invariants
//! - The catalog is built once and read-only thereafter.
//! - Missing keys render as the key itself.
//! - Placeholders are substituted in argument order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::OnceLock;

// ============================================================================
// SECTION: Types
// ============================================================================

/// A formatted message argument captured by the [`macro@crate::t`] macro.
#[derive(Clone)]
pub struct MessageArg {
    /// Placeholder name without braces, e.g. `"path"`.
    pub key: &'static str,
    /// Preformatted value substituted for the placeholder.
    pub value: String,
}

impl MessageArg {
    /// Constructs a new [`MessageArg`] from a key and value.
    pub fn new(key: &'static str, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Catalog entries.
const CATALOG: &[(&str, &str)] = &[
    ("main.version", "edge-policy {version}"),
    ("config.load_failed", "Failed to load config: {error}"),
    ("config.validate.ok", "Config valid."),
    ("logging.init_failed", "Failed to initialise logging: {error}"),
    ("input.read_failed", "Failed to read {kind} at {path}: {error}"),
    (
        "input.read_too_large",
        "Refusing to read {kind} at {path} because it is {size} bytes (limit {limit}).",
    ),
    ("input.parse_failed", "Failed to parse {kind} at {path}: {error}"),
    ("input.kind.policy_check", "policy check input"),
    ("input.kind.user_input_check", "user input check input"),
    ("input.kind.secret_check", "secret binding check input"),
    ("input.kind.deploy_check", "deployment check input"),
    ("output.serialize_failed", "Failed to serialize the check result: {error}"),
    ("output.stream.stdout", "stdout"),
    ("output.stream.stderr", "stderr"),
    ("output.write_failed", "Failed to write to {stream}: {error}"),
    ("offline.node", "Node {id} cannot be looked up offline; supply node_arch, node_type and node_policy."),
    ("offline.node_policy", "Node policy for {id} cannot be looked up offline; supply node_policy."),
    ("offline.business_policy", "Deployment policy {id} cannot be looked up offline; supply business_policy."),
    ("offline.pattern", "Pattern {id} cannot be looked up offline; supply pattern."),
    (
        "offline.service",
        "Service {org}/{url} version {version} arch {arch} is not in the input; supply it in service \
         or dependent_services.",
    ),
    ("offline.secret_store", "The secret manager behind {url} is unavailable offline."),
];

/// Returns the message catalog.
fn catalog() -> &'static HashMap<&'static str, &'static str> {
    static CATALOG_MAP: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    CATALOG_MAP.get_or_init(|| CATALOG.iter().copied().collect())
}

// ============================================================================
// SECTION: Translation
// ============================================================================

/// Renders `key` while substituting `args`.
#[must_use]
pub fn translate(key: &str, args: Vec<MessageArg>) -> String {
    let template = catalog().get(key).copied().unwrap_or(key);
    let mut result = template.to_string();
    for arg in args {
        let placeholder = format!("{{{}}}", arg.key);
        result = result.replace(&placeholder, &arg.value);
    }
    result
}

// ============================================================================
// SECTION: Macro
// ============================================================================

/// Formats a catalog message from a key and named arguments.
///
/// # Arguments
///
/// - `$key` must match a catalog entry.
/// - Named arguments are substituted into `{placeholder}` positions.
#[macro_export]
macro_rules! t {
    ($key:literal $(, $name:ident = $value:expr )* $(,)?) => {{
        let args = ::std::vec![
            $(
                $crate::i18n::MessageArg::new(stringify!($name), $value.to_string()),
            )*
        ];
        $crate::i18n::translate($key, args)
    }};
}
