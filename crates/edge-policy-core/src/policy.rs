// crates/edge-policy-core/src/policy.rs
// ============================================================================
// Module: Internal Policy
// Description: The merged policy document and its compatibility checks.
// Purpose: Decide producer/consumer compatibility and merge policy documents.
// Dependencies: constraint-logic, serde, serde_json, tracing
// ============================================================================

//! ## Overview
//! [`Policy`] is the internal form every external document is converted to
//! before evaluation. A node policy becomes the producer side and a
//! deployment policy (merged with its service policy) the consumer side;
//! [`are_compatible`] then evaluates each side's constraints against the
//! other side's properties.
//!
//! Merges return new documents. Property merges keep existing values unless
//! stated otherwise, and constraint lists are concatenated.

use std::fmt;

use constraint_logic::VersionRange;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::builtin::PROP_NODE_PRIVILEGED;
use crate::constraint::ConstraintEngine;
use crate::constraint::ConstraintExpression;
use crate::error::PolicyError;
use crate::external::ExternalPolicy;
use crate::property::Property;
use crate::property::PropertyList;
use crate::property::PropertyValue;
use crate::secret::SecretBinding;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Current policy schema version.
pub const CURRENT_VERSION: &str = "2.0";
/// The basic agreement protocol.
pub const BASIC_PROTOCOL: &str = "Basic";
/// The blockchain backed agreement protocol.
pub const CITIZEN_SCIENTIST_PROTOCOL: &str = "Citizen Scientist";

/// Returns true for a protocol name the engine knows.
#[must_use]
pub fn supported_agreement_protocol(name: &str) -> bool {
    name == BASIC_PROTOCOL || name == CITIZEN_SCIENTIST_PROTOCOL
}

/// Header name of a policy generated for `id`.
#[must_use]
pub fn make_external_policy_header_name(id: &str) -> String {
    format!("Policy for {id}")
}

// ============================================================================
// SECTION: Agreement Protocols
// ============================================================================

/// One agreement protocol.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AgreementProtocol {
    /// Protocol name.
    pub name: String,
}

impl AgreementProtocol {
    /// Creates a protocol entry.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
        }
    }
}

/// Agreement protocols a party supports.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgreementProtocolList(Vec<AgreementProtocol>);

impl AgreementProtocolList {
    /// Returns true when no protocol is listed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the protocol names in order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|protocol| protocol.name.as_str()).collect()
    }

    /// Appends a protocol.
    ///
    /// # Errors
    /// Returns [`PolicyError::Duplicate`] when the name is already listed.
    pub fn add(&mut self, protocol: AgreementProtocol) -> Result<(), PolicyError> {
        if self.0.iter().any(|existing| existing.name == protocol.name) {
            return Err(PolicyError::Duplicate(format!(
                "AgreementProtocolList {self} already has the element being added: {}",
                protocol.name
            )));
        }
        self.0.push(protocol);
        Ok(())
    }

    /// Returns the protocols both lists share. An empty list accepts
    /// anything; two empty lists intersect as [`BASIC_PROTOCOL`].
    ///
    /// # Errors
    /// Returns [`PolicyError::Validation`] when nothing is shared.
    pub fn intersects_with(&self, other: &Self) -> Result<Self, PolicyError> {
        match (self.is_empty(), other.is_empty()) {
            (true, true) => return Ok(Self(vec![AgreementProtocol::new(BASIC_PROTOCOL)])),
            (true, false) => return Ok(other.clone()),
            (false, true) => return Ok(self.clone()),
            (false, false) => {}
        }
        let shared: Vec<AgreementProtocol> = self
            .0
            .iter()
            .filter(|mine| other.0.iter().any(|theirs| theirs.name == mine.name))
            .cloned()
            .collect();
        if shared.is_empty() {
            return Err(PolicyError::Validation(format!(
                "Agreement Protocol Intersection Error: {self} was not found in {other}"
            )));
        }
        Ok(Self(shared))
    }

    /// Appends the protocols of `other` that are not listed yet.
    pub fn concatenate(&mut self, other: &Self) {
        for protocol in &other.0 {
            if !self.0.iter().any(|existing| existing.name == protocol.name) {
                self.0.push(protocol.clone());
            }
        }
    }

    /// Picks one protocol, preferring [`BASIC_PROTOCOL`].
    #[must_use]
    pub fn single_element(&self) -> Option<AgreementProtocol> {
        self.0
            .iter()
            .find(|protocol| protocol.name == BASIC_PROTOCOL)
            .or_else(|| self.0.first())
            .cloned()
    }
}

impl From<Vec<AgreementProtocol>> for AgreementProtocolList {
    fn from(protocols: Vec<AgreementProtocol>) -> Self {
        Self(protocols)
    }
}

impl fmt::Display for AgreementProtocolList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.names().join(", "))
    }
}

// ============================================================================
// SECTION: Workloads
// ============================================================================

/// Returns true for a zero counter, used to omit it from JSON.
#[allow(clippy::trivially_copy_pass_by_ref, reason = "Serde skip predicates take references.")]
const fn is_zero(value: &i64) -> bool {
    *value == 0
}

/// Rollback priority of a workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkloadPriority {
    /// Priority; 1 is tried first.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub priority_value: i64,
    /// Retries before moving to the next priority.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub retries: i64,
    /// Window in seconds the retries must occur in.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub retry_durations: i64,
    /// Seconds of verified data before rollback is disabled.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub verified_durations: i64,
}

impl fmt::Display for WorkloadPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PriorityValue: {}, Retries: {}, RetryDurationS: {}, VerifiedDurationS: {}",
            self.priority_value, self.retries, self.retry_durations, self.verified_durations
        )
    }
}

/// One service version a consumer policy asks for.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workload {
    /// Service url.
    #[serde(rename = "workloadUrl", default)]
    pub workload_url: String,
    /// Service organization.
    #[serde(default)]
    pub org: String,
    /// Service version.
    #[serde(default)]
    pub version: String,
    /// Service architecture; empty or `*` for any.
    #[serde(default)]
    pub arch: String,
    /// Rollback priority.
    #[serde(default)]
    pub priority: WorkloadPriority,
}

impl Workload {
    /// Creates a workload without priority.
    #[must_use]
    pub fn new(url: &str, org: &str, version: &str, arch: &str) -> Self {
        Self {
            workload_url: url.to_string(),
            org: org.to_string(),
            version: version.to_string(),
            arch: arch.to_string(),
            priority: WorkloadPriority::default(),
        }
    }
}

impl fmt::Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Workload URL: {}, Org: {}, Version: {}, Arch: {}, Priority: {}",
            self.workload_url, self.org, self.version, self.arch, self.priority
        )
    }
}

/// Node health thresholds, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeHealth {
    /// Heartbeat gap after which the node counts as missing.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub missing_heartbeat_interval: i64,
    /// Interval for checking the agreement still exists.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub check_agreement_status: i64,
}

// ============================================================================
// SECTION: User Input
// ============================================================================

/// One configured variable value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Input {
    /// Variable name.
    pub name: String,
    /// Any JSON value.
    pub value: Value,
}

/// Variable values for one service.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInput {
    /// Service organization.
    pub service_orgid: String,
    /// Service url.
    pub service_url: String,
    /// Service architecture; empty for every architecture.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_arch: String,
    /// Service version range; empty for every version.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_version_range: String,
    /// The values.
    #[serde(default)]
    pub inputs: Vec<Input>,
}

/// Version range applied to user input that names none.
const DEFAULT_USER_INPUT_RANGE: &str = "[0.0.1,INFINITY)";

impl UserInput {
    /// Returns whether these values apply to the given service instance. An
    /// empty arch on either side matches any arch; an empty `version` skips
    /// the range check.
    ///
    /// # Errors
    /// Returns [`PolicyError::Parse`] when the version range is malformed or
    /// the version cannot be checked against it.
    pub fn applies_to(&self, org: &str, url: &str, version: &str, arch: &str) -> Result<bool, PolicyError> {
        if self.service_orgid != org || self.service_url != url {
            return Ok(false);
        }
        if !(self.service_arch == arch || self.service_arch.is_empty() || arch.is_empty()) {
            return Ok(false);
        }
        if version.is_empty() {
            return Ok(true);
        }
        let expression =
            if self.service_version_range.is_empty() { DEFAULT_USER_INPUT_RANGE } else { &self.service_version_range };
        let range = VersionRange::parse(expression).map_err(|err| {
            PolicyError::Parse(format!(
                "Wrong version string {expression} specified in user input for service {org}/{url} {version} \
                 {arch}, error {err}"
            ))
        })?;
        range.is_within_range(version).map_err(|err| {
            PolicyError::Parse(format!(
                "Error checking version range {range} in user input for service {org}/{url} {version} {arch} . {err}"
            ))
        })
    }

    /// Returns these values overridden by the same-named values of `other`.
    #[must_use]
    pub fn merged_with(&self, other: &Self) -> Self {
        if other.inputs.is_empty() {
            return self.clone();
        }
        if self.inputs.is_empty() {
            return other.clone();
        }
        let mut merged = self.clone();
        for input in &other.inputs {
            match merged.inputs.iter_mut().find(|existing| existing.name == input.name) {
                Some(existing) => existing.value = input.value.clone(),
                None => merged.inputs.push(input.clone()),
            }
        }
        merged
    }
}

impl fmt::Display for UserInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} version {} arch {}",
            self.service_orgid, self.service_url, self.service_version_range, self.service_arch
        )
    }
}

/// Returns the first user input that applies to the service, with its
/// position.
///
/// # Errors
/// Returns the [`PolicyError::Parse`] raised by a malformed version range.
pub fn find_user_input<'a>(
    user_input: &'a [UserInput],
    org: &str,
    url: &str,
    version: &str,
    arch: &str,
) -> Result<Option<(usize, &'a UserInput)>, PolicyError> {
    for (index, candidate) in user_input.iter().enumerate() {
        if candidate.applies_to(org, url, version, arch)? {
            return Ok(Some((index, candidate)));
        }
    }
    Ok(None)
}

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Name and schema version of a policy.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PolicyHeader {
    /// Author or generator assigned name.
    pub name: String,
    /// Schema version.
    pub version: String,
}

/// Internal policy document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    /// Name and schema version.
    pub header: PolicyHeader,
    /// Pattern the policy was generated from.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pattern_id: String,
    /// Supported agreement protocols.
    #[serde(default, skip_serializing_if = "AgreementProtocolList::is_empty")]
    pub agreement_protocols: AgreementProtocolList,
    /// Requested service versions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub workloads: Vec<Workload>,
    /// Agreement limit; 0 is unlimited.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub max_agreements: i64,
    /// Advertised properties.
    #[serde(default, skip_serializing_if = "PropertyList::is_empty")]
    pub properties: PropertyList,
    /// Requirements on the counter party.
    #[serde(default, skip_serializing_if = "ConstraintExpression::is_empty")]
    pub constraints: ConstraintExpression,
    /// Node health thresholds.
    #[serde(rename = "nodeHealth", default)]
    pub node_health: NodeHealth,
    /// Service variable values.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_input: Vec<UserInput>,
    /// Secret bindings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secret_binding: Vec<SecretBinding>,
    /// Namespace cluster services deploy to.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster_namespace: String,
}

impl Policy {
    /// Creates an empty policy at the current schema version.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            header: PolicyHeader {
                name: name.into(),
                version: CURRENT_VERSION.to_string(),
            },
            ..Self::default()
        }
    }

    /// Validates an external policy and wraps it.
    ///
    /// # Errors
    /// Returns the [`PolicyError::Validation`] raised by the external policy.
    pub fn from_external(
        external: &ExternalPolicy,
        name: &str,
        engine: &ConstraintEngine,
    ) -> Result<Self, PolicyError> {
        let mut normalized = external.clone();
        normalized.validate_and_normalize(engine)?;
        let mut policy = Self::new(name);
        policy.properties = normalized.properties;
        policy.constraints = normalized.constraints;
        Ok(policy)
    }

    /// Returns true when the schema version is `version`.
    #[must_use]
    pub fn is_version(&self, version: &str) -> bool {
        self.header.version == version
    }

    /// Adds one property.
    ///
    /// # Errors
    /// Returns the [`PolicyError`] raised by [`PropertyList::add_property`].
    pub fn add_property(&mut self, property: Property, replace: bool) -> Result<(), PolicyError> {
        self.properties.add_property(property, replace)
    }

    /// Adds one agreement protocol.
    ///
    /// # Errors
    /// Returns [`PolicyError::Duplicate`] when the protocol is listed.
    pub fn add_agreement_protocol(&mut self, protocol: AgreementProtocol) -> Result<(), PolicyError> {
        self.agreement_protocols.add(protocol)
    }

    /// Returns the properties and constraints as an external policy.
    #[must_use]
    pub fn to_external(&self) -> ExternalPolicy {
        ExternalPolicy::new(self.properties.clone(), self.constraints.clone())
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let workloads = self.workloads.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ");
        write!(
            f,
            "Name: {} Version: {} PatternId: {} Agreement Protocols: {} Workloads: [{workloads}] \
             Properties: {} Constraints: {} MaxAgreements: {}",
            self.header.name,
            self.header.version,
            self.pattern_id,
            self.agreement_protocols,
            self.properties,
            self.constraints,
            self.max_agreements
        )
    }
}

// ============================================================================
// SECTION: Compatibility
// ============================================================================

/// Why two policies are not compatible, in a full and a short form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyCompError {
    /// Full message with both documents.
    pub err: String,
    /// Short message for command line output; may be empty.
    pub short_err: String,
}

impl PolicyCompError {
    /// Creates an error whose short form differs from the full one.
    #[must_use]
    pub fn new(err: impl Into<String>, short_err: impl Into<String>) -> Self {
        Self {
            err: err.into(),
            short_err: short_err.into(),
        }
    }

    /// Creates an error with only a full message.
    #[must_use]
    pub fn full(err: impl Into<String>) -> Self {
        Self::new(err, String::new())
    }

    /// Returns the short message, falling back to the full one.
    #[must_use]
    pub fn short_string(&self) -> &str {
        if self.short_err.is_empty() { &self.err } else { &self.short_err }
    }
}

impl fmt::Display for PolicyCompError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.err)
    }
}

impl std::error::Error for PolicyCompError {}

/// Checks a producer (node) policy against a consumer (deployment) policy.
///
/// # Errors
/// Returns a [`PolicyCompError`] for a schema mismatch, unmet constraints in
/// either direction, or no shared agreement protocol.
pub fn are_compatible(
    producer: &Policy,
    consumer: &Policy,
    engine: &ConstraintEngine,
) -> Result<(), PolicyCompError> {
    if !consumer.is_version(&producer.header.version) {
        return Err(PolicyCompError::full(format!(
            "Compatibility Error: Schema versions are not the same, Consumer policy: {}, Producer \
             policy {}",
            consumer.header.version, producer.header.version
        )));
    }
    if let Err(err) = consumer.constraints.is_satisfied_by(engine, &producer.properties) {
        return Err(PolicyCompError::new(
            format!(
                "Compatibility Error: Node properties {} do not satisfy constraint requirements {}. \
                 Underlying error: {err}",
                producer.properties, consumer.constraints
            ),
            format!("Compatibility Error: Node properties do not satisfy constraint requirements. {err}"),
        ));
    }
    if let Err(err) = producer.constraints.is_satisfied_by(engine, &consumer.properties) {
        return Err(PolicyCompError::new(
            format!(
                "Compatibility Error: Properties {} do not satisfy Node constraint  {}. Underlying \
                 error: {err}",
                consumer.properties, producer.constraints
            ),
            format!("Compatibility Error: Properties do not satisfy node constraint. {err}"),
        ));
    }
    if let Err(err) = producer.agreement_protocols.intersects_with(&consumer.agreement_protocols) {
        return Err(PolicyCompError::full(format!(
            "Compatibility Error: No common Agreement Protocols between {} and {}. Underlying error: \
             {err}",
            producer.agreement_protocols, consumer.agreement_protocols
        )));
    }
    Ok(())
}

/// Checks two producer policies against each other and merges them.
///
/// A missing first policy yields the second unchanged.
///
/// # Errors
/// Returns [`PolicyError::Merge`] for a schema mismatch, no shared agreement
/// protocol, or conflicting property values.
pub fn are_compatible_producers(first: Option<&Policy>, second: &Policy) -> Result<Policy, PolicyError> {
    let Some(first) = first else {
        return Ok(second.clone());
    };
    if !first.is_version(&second.header.version) {
        return Err(PolicyError::Merge(format!(
            "Compatibility Error: Schema versions are not the same, Policy1: {}, Policy2 {}",
            first.header.version, second.header.version
        )));
    }
    let protocols = first.agreement_protocols.intersects_with(&second.agreement_protocols).map_err(|err| {
        PolicyError::Merge(format!(
            "Compatibility Error: No common Agreement Protocols between {} and {}. Underlying error: \
             {err}",
            first.agreement_protocols, second.agreement_protocols
        ))
    })?;
    first.properties.compatible_with(&second.properties, true).map_err(|err| {
        PolicyError::Merge(format!(
            "Compatibility Error: Common Properties between {} and {}. Underlying error: {err}",
            first.properties, second.properties
        ))
    })?;

    let mut merged = Policy::new(format!("{} merged with {}", first.header.name, second.header.name));
    merged.agreement_protocols.concatenate(&protocols);
    merged.properties.merge_with(&first.properties, true)?;
    merged.properties.merge_with(&second.properties, true)?;
    merged.constraints.extend_from(&first.constraints);
    merged.constraints.extend_from(&second.constraints);
    merged.max_agreements = first.max_agreements.min(second.max_agreements);
    merged.user_input.clone_from(&first.user_input);
    Ok(merged)
}

/// Merges a list of producer policies pairwise; an empty list yields `None`.
///
/// # Errors
/// Returns [`PolicyError::Merge`] naming the pair that could not be merged.
pub fn merge_all_producers(policies: &[Policy]) -> Result<Option<Policy>, PolicyError> {
    let mut merged: Option<Policy> = None;
    for policy in policies {
        let next = are_compatible_producers(merged.as_ref(), policy).map_err(|err| {
            PolicyError::Merge(format!(
                "could not merge policies {} and {}, error: {err}",
                merged.as_ref().map_or_else(String::new, |current| current.header.name.clone()),
                policy.header.name
            ))
        })?;
        merged = Some(next);
    }
    Ok(merged)
}

/// Merges an external policy into `policy`.
///
/// Existing properties win and constraints are concatenated. The privilege
/// property is OR-reduced: `true` on either side is kept.
///
/// # Errors
/// Returns [`PolicyError::Merge`] when both sides declare different values
/// for a property other than the privilege flag and node resources.
pub fn merge_policy_with_external_policy(
    policy: &Policy,
    external: &ExternalPolicy,
) -> Result<Policy, PolicyError> {
    let others: PropertyList =
        external.properties.iter().filter(|property| property.name != PROP_NODE_PRIVILEGED).cloned().collect();
    policy.properties.compatible_with(&others, true)?;

    let privileged = privilege_flag(&policy.properties) || privilege_flag(&external.properties);
    let mut merged = policy.clone();
    merged.properties.merge_with(&external.properties, false)?;
    merged.constraints.extend_from(&external.constraints);
    if privileged {
        merged.properties.add_property(Property::new(PROP_NODE_PRIVILEGED, true), true)?;
    }
    Ok(merged)
}

/// Returns true when the privilege property is boolean or textual `true`.
fn privilege_flag(properties: &PropertyList) -> bool {
    properties.get(PROP_NODE_PRIVILEGED).is_some_and(|property| match &property.value {
        PropertyValue::Bool(flag) => *flag,
        PropertyValue::String(text) => text == "true",
        _ => false,
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================
