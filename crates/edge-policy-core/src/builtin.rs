// crates/edge-policy-core/src/builtin.rs
// ============================================================================
// Module: Built-in Properties
// Description: Reserved property names and the policies built from them.
// Purpose: Inject node and service identity into policies at evaluation time.
// Dependencies: constraint-logic, crate::external, crate::property
// ============================================================================

//! ## Overview
//! Built-in properties are filled in by the engine, not by policy authors.
//! Node built-ins describe the host (cpu, memory, architecture); service
//! built-ins identify the service a policy is attached to. Host probing is
//! outside the engine, so node values arrive through [`NodeResources`].

use std::cmp::Ordering;

use constraint_logic::version::compare_versions;

use crate::constraint::ConstraintExpression;
use crate::external::ExternalPolicy;
use crate::property::Property;
use crate::property::PropertyList;
use crate::property::PropertyValue;

// ============================================================================
// SECTION: Node Property Names
// ============================================================================

/// Number of CPUs.
pub const PROP_NODE_CPU: &str = "openhorizon.cpu";
/// Memory in MB.
pub const PROP_NODE_MEMORY: &str = "openhorizon.memory";
/// Hardware architecture.
pub const PROP_NODE_ARCH: &str = "openhorizon.arch";
/// Device serial number or generated id.
pub const PROP_NODE_HARDWAREID: &str = "openhorizon.hardwareId";
/// Whether privileged services may run on the node.
pub const PROP_NODE_PRIVILEGED: &str = "openhorizon.allowPrivileged";
/// Kubernetes server version of a cluster node.
pub const PROP_NODE_K8S_VERSION: &str = "openhorizon.kubernetesVersion";
/// Namespace of a cluster agent.
pub const PROP_NODE_K8S_NAMESPACE: &str = "openhorizon.kubernetesNamespace";
/// Whether a cluster agent is namespace scoped.
pub const PROP_NODE_K8S_NAMESPACE_SCOPED: &str = "openhorizon.kubernetesNamespaceScoped";
/// Host operating system.
pub const PROP_NODE_OS: &str = "openhorizon.operatingSystem";
/// Whether the agent runs in a container.
pub const PROP_NODE_CONTAINERIZED: &str = "openhorizon.containerized";

// ============================================================================
// SECTION: Service Property Names
// ============================================================================

/// Service url.
pub const PROP_SVC_URL: &str = "openhorizon.service.url";
/// Service name; same value as the url.
pub const PROP_SVC_NAME: &str = "openhorizon.service.name";
/// Service organization.
pub const PROP_SVC_ORG: &str = "openhorizon.service.org";
/// Service version.
pub const PROP_SVC_VERSION: &str = "openhorizon.service.version";
/// Service architecture.
pub const PROP_SVC_ARCH: &str = "openhorizon.service.arch";
/// Whether the service or a dependency needs privileged mode or host
/// networking. Shares its name with [`PROP_NODE_PRIVILEGED`].
pub const PROP_SVC_PRIVILEGED: &str = "openhorizon.allowPrivileged";

/// Device node type.
pub const NODE_TYPE_DEVICE: &str = "device";
/// Cluster node type.
pub const NODE_TYPE_CLUSTER: &str = "cluster";

/// Node built-ins a user may not set.
const READ_ONLY_NODE_PROPERTIES: [&str; 9] = [
    PROP_NODE_CPU,
    PROP_NODE_ARCH,
    PROP_NODE_MEMORY,
    PROP_NODE_HARDWAREID,
    PROP_NODE_K8S_VERSION,
    PROP_NODE_K8S_NAMESPACE,
    PROP_NODE_K8S_NAMESPACE_SCOPED,
    PROP_NODE_OS,
    PROP_NODE_CONTAINERIZED,
];

/// Device built-ins with the first agent version that reports them.
const DEVICE_BUILTIN_VERSIONS: [(&str, &str); 7] = [
    (PROP_NODE_CPU, "2.23.4"),
    (PROP_NODE_MEMORY, "2.23.4"),
    (PROP_NODE_ARCH, "2.23.4"),
    (PROP_NODE_HARDWAREID, "2.24.5"),
    (PROP_NODE_PRIVILEGED, "2.24.10"),
    (PROP_NODE_OS, "2.30.0"),
    (PROP_NODE_CONTAINERIZED, "2.30.0"),
];

/// Cluster built-ins with the first agent version that reports them.
const CLUSTER_BUILTIN_VERSIONS: [(&str, &str); 7] = [
    (PROP_NODE_K8S_NAMESPACE_SCOPED, "2.31.0"),
    (PROP_NODE_K8S_NAMESPACE, "2.31.0"),
    (PROP_NODE_K8S_VERSION, "2.26.4"),
    (PROP_NODE_CPU, "2.23.4"),
    (PROP_NODE_MEMORY, "2.23.4"),
    (PROP_NODE_ARCH, "2.23.4"),
    (PROP_NODE_PRIVILEGED, "2.24.10"),
];

// ============================================================================
// SECTION: Name Checks
// ============================================================================

/// Returns true for a node built-in property name.
#[must_use]
pub fn is_node_builtin(name: &str) -> bool {
    READ_ONLY_NODE_PROPERTIES.contains(&name) || name == PROP_NODE_PRIVILEGED
}

/// Returns true for a service built-in property name.
#[must_use]
pub fn is_service_builtin(name: &str) -> bool {
    [PROP_SVC_URL, PROP_SVC_NAME, PROP_SVC_ORG, PROP_SVC_VERSION, PROP_SVC_ARCH, PROP_SVC_PRIVILEGED]
        .contains(&name)
}

/// Node built-ins a user may not set.
#[must_use]
pub fn read_only_node_properties() -> &'static [&'static str] {
    &READ_ONLY_NODE_PROPERTIES
}

/// Returns true when `properties` carries every node built-in the agent at
/// `agent_version` reports for `node_type`.
///
/// An unparseable agent version never satisfies the check.
#[must_use]
pub fn contains_all_builtin_node_props(
    properties: &PropertyList,
    agent_version: &str,
    node_type: &str,
) -> bool {
    let expected: &[(&str, &str)] = match node_type {
        NODE_TYPE_DEVICE => &DEVICE_BUILTIN_VERSIONS,
        NODE_TYPE_CLUSTER => &CLUSTER_BUILTIN_VERSIONS,
        _ => &[],
    };
    expected.iter().all(|(name, since)| match compare_versions(agent_version, since) {
        Ok(Ordering::Less) => true,
        Ok(_) => properties.has(name),
        Err(err) => {
            tracing::error!(error = %err, "failed to compare agent version");
            false
        }
    })
}

// ============================================================================
// SECTION: Built-in Policies
// ============================================================================

/// Host facts supplied by the caller for node built-ins.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeResources {
    /// Number of CPUs.
    pub cpu: i64,
    /// Memory in MB.
    pub memory_mb: i64,
    /// Hardware architecture.
    pub arch: String,
    /// Whether privileged services are allowed.
    pub allow_privileged: bool,
}

/// Builds the service identity policy.
#[must_use]
pub fn service_builtin_policy(url: &str, org: &str, version: &str, arch: &str) -> ExternalPolicy {
    let properties = [
        (PROP_SVC_URL, url),
        (PROP_SVC_NAME, url),
        (PROP_SVC_ORG, org),
        (PROP_SVC_VERSION, version),
        (PROP_SVC_ARCH, arch),
    ]
    .into_iter()
    .map(|(name, value)| Property::new(name, value))
    .collect();
    ExternalPolicy::new(properties, ConstraintExpression::default())
}

/// Builds the node built-in policy from caller supplied host facts.
#[must_use]
pub fn node_builtin_policy(resources: &NodeResources) -> ExternalPolicy {
    let properties = PropertyList::from(vec![
        Property::new(PROP_NODE_CPU, PropertyValue::int(resources.cpu)),
        Property::new(PROP_NODE_MEMORY, PropertyValue::int(resources.memory_mb)),
        Property::new(PROP_NODE_ARCH, resources.arch.as_str()),
        Property::new(PROP_NODE_PRIVILEGED, resources.allow_privileged),
    ]);
    ExternalPolicy::new(properties, ConstraintExpression::default())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
