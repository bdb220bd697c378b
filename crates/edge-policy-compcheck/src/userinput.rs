// crates/edge-policy-compcheck/src/userinput.rs
// ============================================================================
// Module: User Input Compatibility
// Description: Service variable coverage and type checks.
// Purpose: Decide whether a deployment and a node set every variable needed.
// Dependencies: edge-policy-core, serde_json, tracing
// ============================================================================

//! ## Overview
//! A service declares variables; the deployment policy or pattern and the
//! node each supply values for some of them. The two sources are merged,
//! node values winning, and every declared variable must then be set with a
//! value of its declared type or carry a default.
//!
//! Variables are only checked for device nodes. Values that no checked
//! service uses are reported as a warning, never as a mismatch.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use edge_policy_core::ConstraintEngine;
use edge_policy_core::ExchangeService;
use edge_policy_core::ServiceDefinition;
use edge_policy_core::ServiceFile;
use edge_policy_core::UserInput;
use edge_policy_core::builtin::NODE_TYPE_CLUSTER;
use edge_policy_core::policy::find_user_input;
use edge_policy_core::service::form_org_service_id;
use serde_json::Value;
use tracing::debug;
use tracing::warn;

use crate::collaborators::Collaborators;
use crate::collaborators::ServiceMap;
use crate::deployment::process_business_policy;
use crate::deployment::process_pattern;
use crate::deployment::workloads_from_business_policy;
use crate::deployment::workloads_from_pattern;
use crate::error::CompCheckError;
use crate::node::resolve_exchange_node;
use crate::policy_check::check_type_compatibility;
use crate::resource::COMPATIBLE;
use crate::resource::CompCheckOutput;
use crate::resource::CompCheckResource;
use crate::resource::GENERAL_REASON_KEY;
use crate::resource::USER_INPUT_INCOMPATIBLE;
use crate::resource::UserInputCheck;
use crate::resource::format_reason_message;
use crate::services::ServiceClosure;
use crate::services::ServiceSpec;
use crate::services::get_service_dependent_defs;
use crate::services::get_service_from_input;
use crate::services::need_handle_service;
use crate::services::validate_services;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Everything a user input verification needs besides the service.
#[derive(Clone, Copy)]
pub struct UserInputScope<'a> {
    /// Lookups.
    pub collaborators: &'a dyn Collaborators,
    /// Values from the deployment policy or pattern.
    pub deployment_user_input: &'a [UserInput],
    /// Values set on the node.
    pub node_user_input: &'a [UserInput],
    /// Node type; cluster nodes are not checked.
    pub node_type: &'a str,
}

/// Outcome of verifying the variables of one service closure.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserInputVerdict {
    /// Whether every variable is set with the right type.
    pub compatible: bool,
    /// Why not, when not compatible.
    pub reason: String,
}

impl UserInputVerdict {
    /// A passing verdict.
    const fn pass() -> Self {
        Self {
            compatible: true,
            reason: String::new(),
        }
    }

    /// A failing verdict.
    const fn fail(reason: String) -> Self {
        Self {
            compatible: false,
            reason,
        }
    }
}

// ============================================================================
// SECTION: Value Types
// ============================================================================

/// Checks a variable value against the declared type. An empty type means
/// string, an `int` must be integral, and a list holds only strings.
///
/// # Errors
/// Returns the reason the value does not fit.
pub fn verify_workload_var_types(value: &Value, expected_type: &str) -> Result<(), String> {
    match value {
        Value::Bool(_) => {
            if expected_type != "bool" && expected_type != "boolean" {
                return Err(format!("type bool, expecting {expected_type}."));
            }
        }
        Value::String(_) => {
            if expected_type != "string" && !expected_type.is_empty() {
                return Err(format!("type string, expecting {expected_type}."));
            }
        }
        Value::Number(number) => {
            if expected_type != "int" && !expected_type.contains("float") {
                return Err(format!("type number, expecting {expected_type}."));
            }
            let integral = number.is_i64()
                || number.is_u64()
                || number.as_f64().is_some_and(|float| float.fract().abs() < f64::EPSILON);
            if expected_type == "int" && !integral {
                return Err("type float, expecting int.".to_string());
            }
        }
        Value::Array(items) => {
            if expected_type != "list of strings" {
                return Err(format!("type array, expecting {expected_type}."));
            }
            if !items.iter().all(Value::is_string) {
                return Err("type array, expecting list of strings.".to_string());
            }
        }
        Value::Null | Value::Object(_) => {
            return Err(format!("type {}, is an unexpected type.", if value.is_null() { "null" } else { "object" }));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Single Service
// ============================================================================

/// Checks that the merged deployment and node values set every variable
/// `service` declares without a default, each with the declared type.
///
/// # Errors
/// Returns [`CompCheckError::General`] for a malformed user input version
/// range. Missing or mistyped values are reported in the verdict.
pub fn verify_user_input_for_single_service_def(
    service: &dyn ServiceDefinition,
    deployment_user_input: &[UserInput],
    node_user_input: &[UserInput],
) -> Result<UserInputVerdict, CompCheckError> {
    if !service.needs_user_input() {
        return Ok(UserInputVerdict::pass());
    }
    let lookup = |user_input: &[UserInput]| {
        find_user_input(user_input, service.org(), service.url(), service.version(), service.arch())
            .map(|found| found.map(|(_, values)| values.clone()))
            .map_err(|err| CompCheckError::General(err.to_string()))
    };
    let from_deployment = lookup(deployment_user_input)?;
    let from_node = lookup(node_user_input)?;
    let node_has_service = from_node.is_some();
    let merged = match (from_deployment, from_node) {
        (None, None) => return Ok(UserInputVerdict::fail("No user input found for service.".to_string())),
        (Some(deployment), Some(node)) => deployment.merged_with(&node),
        (Some(values), None) | (None, Some(values)) => values,
    };

    for declared in service.user_inputs() {
        match merged.inputs.iter().find(|input| input.name == declared.name) {
            Some(input) => {
                if let Err(err) = verify_workload_var_types(&input.value, &declared.input_type) {
                    return Ok(UserInputVerdict::fail(format!(
                        "Failed to validate the user input type for variable {}. {err}",
                        declared.name
                    )));
                }
            }
            None if declared.default_value.is_empty() => {
                let mut reason = format!("A required user input value is missing for variable {}.", declared.name);
                if !node_has_service {
                    reason.push_str(&format!(
                        " Service {}/{} version {} arch {} is missing in the node user input.",
                        service.org(),
                        service.url(),
                        service.version(),
                        service.arch()
                    ));
                }
                return Ok(UserInputVerdict::fail(reason));
            }
            None => {}
        }
    }
    Ok(UserInputVerdict::pass())
}

// ============================================================================
// SECTION: Service Closures
// ============================================================================

/// Verifies the variables of a service and its known dependencies. Cluster
/// nodes always pass.
///
/// # Errors
/// Returns [`CompCheckError::General`] when a user input range is malformed.
pub fn verify_user_input_for_service_cache(
    scope: UserInputScope<'_>,
    top: &dyn ServiceDefinition,
    dependencies: &ServiceMap,
) -> Result<UserInputVerdict, CompCheckError> {
    if scope.node_type == NODE_TYPE_CLUSTER {
        return Ok(UserInputVerdict::pass());
    }
    let top_id = form_org_service_id(top.org(), top.url(), top.version(), top.arch());
    let verdict = verify_user_input_for_single_service_def(top, scope.deployment_user_input, scope.node_user_input)
        .map_err(|err| CompCheckError::General(format!("Error verifing user input for service {top_id}. {err}")))?;
    if !verdict.compatible {
        return Ok(UserInputVerdict::fail(format!(
            "Failed to verify user input for service {top_id}. {}",
            verdict.reason
        )));
    }
    for (id, definition) in dependencies {
        let dependency = ExchangeService::from_id(id, definition.clone());
        let verdict =
            verify_user_input_for_single_service_def(&dependency, scope.deployment_user_input, scope.node_user_input)
                .map_err(|err| {
                    CompCheckError::General(format!("Error verifing user input for dependent service {id}. {err}"))
                })?;
        if !verdict.compatible {
            return Ok(UserInputVerdict::fail(format!(
                "Failed to verify user input for dependent service {id}. {}",
                verdict.reason
            )));
        }
    }
    Ok(UserInputVerdict::pass())
}

/// Resolves a service and its dependencies through the collaborators and
/// verifies their variables.
///
/// # Errors
/// Returns [`CompCheckError::Exchange`] when the service cannot be resolved
/// and the error of the cache check.
pub fn verify_user_input_for_service(
    scope: UserInputScope<'_>,
    spec: &ServiceSpec,
) -> Result<(UserInputVerdict, ServiceClosure), CompCheckError> {
    let resolved = scope
        .collaborators
        .resolve_service(&spec.url, &spec.org, &spec.version_range, &spec.arch)
        .map_err(|err| {
            CompCheckError::Exchange(format!("Error retrieving service from the Exchange for {spec}. {err}"))
        })?;
    let top = ServiceFile::from_definition(&ExchangeService {
        org: spec.org.clone(),
        definition: resolved.definition,
    });
    let verdict = verify_user_input_for_service_cache(scope, &top, &resolved.dependencies)?;
    Ok((
        verdict,
        ServiceClosure {
            id: resolved.id,
            top,
            dependencies: resolved.dependencies,
        },
    ))
}

/// Verifies the variables of a supplied service, resolving its dependencies
/// from `known` first and the collaborators second.
///
/// # Errors
/// Returns [`CompCheckError::General`] when a dependency cannot be found,
/// and the error of the cache check.
pub fn verify_user_input_for_service_def(
    scope: UserInputScope<'_>,
    service: &dyn ServiceDefinition,
    known: Option<&ServiceMap>,
) -> Result<(UserInputVerdict, ServiceMap), CompCheckError> {
    let dependencies = get_service_dependent_defs(service, known, scope.collaborators).map_err(|err| {
        CompCheckError::General(format!(
            "Failed to find the dependent services for {}/{} {} {}. {err}",
            service.org(),
            service.url(),
            service.arch(),
            service.version()
        ))
    })?;
    let verdict = verify_user_input_for_service_cache(scope, service, &dependencies)?;
    Ok((verdict, dependencies))
}

// ============================================================================
// SECTION: Redundant Values
// ============================================================================

/// Checks that every user input entry names a service among `top_services`
/// and `dependencies`, and that each of its values is a variable that
/// service declares.
///
/// # Errors
/// Returns [`CompCheckError::Validation`] naming the first unreferenced
/// service or unused variable, and [`CompCheckError::General`] for a
/// malformed version range.
pub fn check_redundant_user_input(
    top_services: &[ServiceFile],
    dependencies: &ServiceMap,
    user_input: &[UserInput],
) -> Result<(), CompCheckError> {
    let Some(first) = user_input.first() else {
        return Ok(());
    };
    if top_services.is_empty() {
        return Err(CompCheckError::Validation(format!(
            "The service {first} specified in the user input is not referenced by the pattern or deployment \
             policy. Please make sure the serviceOrgid, serviceUrl, serviceArch and serviceVersionRange are correct."
        )));
    }

    let dependency_services: Vec<ServiceFile> = dependencies
        .iter()
        .map(|(id, definition)| ServiceFile::from_definition(&ExchangeService::from_id(id, definition.clone())))
        .collect();
    let mut used: BTreeMap<usize, BTreeSet<&str>> = BTreeMap::new();
    for service in top_services.iter().chain(&dependency_services) {
        let found = find_user_input(user_input, &service.org, &service.url, &service.version, &service.arch)
            .map_err(|err| CompCheckError::General(err.to_string()))?;
        if let Some((index, values)) = found {
            let names = used.entry(index).or_default();
            for declared in &service.user_inputs {
                if values.inputs.iter().any(|input| input.name == declared.name) {
                    names.insert(declared.name.as_str());
                }
            }
        }
    }

    for (index, entry) in user_input.iter().enumerate() {
        let Some(names) = used.get(&index) else {
            return Err(CompCheckError::Validation(format!(
                "The service {entry} specified in the user input is not referenced by the pattern or deployment \
                 policy. Please make sure the service specification is correct."
            )));
        };
        if let Some(unused) = entry.inputs.iter().find(|input| !names.contains(input.name.as_str())) {
            return Err(CompCheckError::Validation(format!(
                "Variable {} for service {entry} specified in the user input is not used. Please make sure it \
                 is a correct name.",
                unused.name
            )));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Check Pipeline
// ============================================================================

/// Verdicts gathered while walking the services.
#[derive(Default)]
struct UserInputVerdicts {
    /// Reason per service id.
    messages: BTreeMap<String, String>,
    /// Compatible services by id.
    compatible: BTreeMap<String, ServiceFile>,
    /// Incompatible services by id.
    incompatible: BTreeMap<String, ServiceFile>,
    /// Services whose deployment does not fit the node type.
    type_mismatch: BTreeSet<String>,
    /// Every top level service checked.
    services: Vec<ServiceFile>,
    /// Every dependency resolved.
    dependencies: ServiceMap,
}

impl UserInputVerdicts {
    /// Records the verdict of one service. Returns true when compatible.
    fn record(
        &mut self,
        node_type: &str,
        service_id: &str,
        top: ServiceFile,
        dependencies: ServiceMap,
        verdict: UserInputVerdict,
    ) -> bool {
        self.dependencies.extend(dependencies);
        self.services.push(top.clone());
        let (type_compatible, type_reason) = check_type_compatibility(node_type, &top);
        let reason = if type_compatible {
            verdict.reason
        } else {
            self.type_mismatch.insert(service_id.to_string());
            type_reason
        };
        let compatible = verdict.compatible && type_compatible;
        debug!(service = service_id, compatible, reason = reason.as_str(), "service user input evaluated");
        if compatible {
            self.compatible.insert(service_id.to_string(), top);
            self.messages.insert(service_id.to_string(), COMPATIBLE.to_string());
        } else {
            self.incompatible.insert(service_id.to_string(), top);
            self.messages.insert(
                service_id.to_string(),
                format_reason_message(&reason, !type_compatible, USER_INPUT_INCOMPATIBLE),
            );
        }
        compatible
    }
}

/// Returns the services of a verdict map, without placeholders for services
/// missing from the input.
fn real_services(services: BTreeMap<String, ServiceFile>) -> Vec<ServiceFile> {
    services.into_values().filter(|service| !service.url.is_empty()).collect()
}

/// Checks that the deployment policy or pattern and the node together set
/// every variable the services to deploy declare.
///
/// A deployment policy is compatible only when every service is; a pattern
/// is compatible when each service is compatible or merely targets another
/// node type, as long as at least one service fits.
///
/// # Errors
/// Returns a [`CompCheckError`] for bad input, unresolvable documents and
/// failed lookups.
pub fn user_input_compatible(
    collaborators: &dyn Collaborators,
    engine: &ConstraintEngine,
    input: &UserInputCheck,
    check_all: bool,
) -> Result<CompCheckOutput, CompCheckError> {
    if input.node_user_input.is_none() && input.node_id.is_empty() {
        return Err(CompCheckError::Input("Neither node user input nor node id is specified.".to_string()));
    }
    let mut resources = CompCheckResource::from_user_input_check(input);
    let node = resolve_exchange_node(collaborators, &mut resources)?;
    let node_user_input = match (&input.node_user_input, node) {
        (Some(values), _) => values.clone(),
        (None, Some(node)) => node.user_input,
        (None, None) => Vec::new(),
    };
    resources.node_user_input.clone_from(&node_user_input);

    let use_business_policy = !input.business_policy_id.is_empty() || input.business_policy.is_some();
    let use_pattern = !input.pattern_id.is_empty() || input.pattern.is_some();
    if use_business_policy && use_pattern {
        return Err(CompCheckError::Input("Deployment policy and pattern are mutually exclusive.".to_string()));
    }
    if !use_business_policy && !use_pattern {
        return Err(CompCheckError::Input("Neither deployment policy nor pattern is specified.".to_string()));
    }

    let (deployment_user_input, references) = if use_business_policy {
        let (business, _) = process_business_policy(
            collaborators,
            engine,
            &input.business_policy_id,
            input.business_policy.as_ref(),
            false,
        )?;
        let references = workloads_from_business_policy(&business, &resources.node_arch);
        let user_input = business.user_input.clone();
        resources.business_policy = Some(business);
        (user_input, references)
    } else {
        let pattern = process_pattern(collaborators, &input.pattern_id, input.pattern.as_ref())?;
        let references = workloads_from_pattern(&pattern, &resources.node_arch);
        let user_input = pattern.user_input.clone();
        resources.pattern = Some(pattern);
        (user_input, references)
    };
    if references.is_empty() {
        return Err(CompCheckError::Validation(if resources.node_arch.is_empty() {
            "No service versions specified in the deployment policy or pattern.".to_string()
        } else {
            format!(
                "No service versions with architecture {} specified in the deployment policy or pattern.",
                resources.node_arch
            )
        }));
    }
    validate_services(
        &resources.service,
        resources.business_policy.as_ref(),
        resources.pattern.as_ref(),
        &input.service_to_check,
    )?;

    let node_type = resources.node_type.clone();
    let scope = UserInputScope {
        collaborators,
        deployment_user_input: &deployment_user_input,
        node_user_input: &node_user_input,
        node_type: &node_type,
    };
    let known = Some(&input.dependent_services);
    let mut verdicts = UserInputVerdicts::default();
    let mut overall = true;

    for reference in &references {
        let mut service_compatible = false;
        for choice in &reference.service_versions {
            let arch = reference.service_arch.as_str();
            if input.service.is_empty() && !arch.is_empty() && arch != "*" {
                let service_id = form_org_service_id(&reference.service_orgid, &reference.service_url, &choice.version, arch);
                if !need_handle_service(&service_id, &input.service_to_check) {
                    continue;
                }
                let spec = ServiceSpec::new(&reference.service_url, &reference.service_orgid, &choice.version, arch);
                let (verdict, closure) = verify_user_input_for_service(scope, &spec)?;
                if verdicts.record(&node_type, &service_id, closure.top, closure.dependencies, verdict) {
                    service_compatible = true;
                    if !check_all {
                        break;
                    }
                }
            } else if input.service.is_empty() {
                let selected = collaborators
                    .selected_services(&reference.service_url, &reference.service_orgid, &choice.version, "")
                    .map_err(|err| {
                        CompCheckError::Exchange(format!(
                            "Error getting services for all archetctures for {}/{} version {}. {err}",
                            reference.service_orgid, reference.service_url, choice.version
                        ))
                    })?;
                for (service_id, definition) in &selected {
                    if !need_handle_service(service_id, &input.service_to_check) {
                        continue;
                    }
                    let top = ServiceFile::from_definition(&ExchangeService::from_id(service_id, definition.clone()));
                    let (verdict, dependencies) = verify_user_input_for_service_def(scope, &top, known)?;
                    if verdicts.record(&node_type, service_id, top, dependencies, verdict) {
                        service_compatible = true;
                        if !check_all {
                            break;
                        }
                    }
                }
                if service_compatible && !check_all {
                    break;
                }
            } else {
                let service_id = form_org_service_id(&reference.service_orgid, &reference.service_url, &choice.version, arch);
                if !need_handle_service(&service_id, &input.service_to_check) {
                    continue;
                }
                let Some(found) = get_service_from_input(
                    &reference.service_url,
                    &reference.service_orgid,
                    &choice.version,
                    arch,
                    &input.service,
                ) else {
                    verdicts.messages.insert(
                        service_id.clone(),
                        format!("{USER_INPUT_INCOMPATIBLE}: Service definition not found in the input."),
                    );
                    verdicts.incompatible.insert(service_id, ServiceFile::default());
                    continue;
                };
                let mut top = found.clone();
                if top.org.is_empty() {
                    top.org.clone_from(&reference.service_orgid);
                }
                let (verdict, dependencies) = verify_user_input_for_service_def(scope, &top, known)?;
                if verdicts.record(&node_type, &service_id, top, dependencies, verdict) {
                    service_compatible = true;
                    if !check_all {
                        break;
                    }
                }
            }
        }
        if overall
            && !service_compatible
            && (use_business_policy || verdicts.incompatible.len() != verdicts.type_mismatch.len())
        {
            overall = false;
        }
    }

    if overall && !use_business_policy && verdicts.compatible.is_empty() && !verdicts.type_mismatch.is_empty() {
        overall = false;
    }

    let mut messages = verdicts.messages;
    if messages.is_empty() {
        let reason = if resources.node_arch.is_empty() {
            "No services found in the deployment policy or pattern.".to_string()
        } else {
            format!("Service with 'arch' {} cannot be found in the deployment policy or pattern.", resources.node_arch)
        };
        messages.insert(GENERAL_REASON_KEY.to_string(), format!("{USER_INPUT_INCOMPATIBLE}: {reason}"));
        resources.dependent_services = verdicts.dependencies;
        resources.service = verdicts.services;
        return Ok(CompCheckOutput::new(false, messages, resources));
    }

    let redundant = check_redundant_user_input(&verdicts.services, &verdicts.dependencies, &node_user_input)
        .map_err(|err| format!("Warning: checking node user input:  {err}"))
        .and_then(|()| {
            check_redundant_user_input(&verdicts.services, &verdicts.dependencies, &deployment_user_input).map_err(
                |err| {
                    let source = if use_business_policy { "the deployment policy" } else { "the pattern" };
                    format!("Warning: checking user input for {source}: {err}")
                },
            )
        });
    if let Err(warning) = redundant {
        warn!(warning = warning.as_str(), "redundant user input");
        messages.insert(GENERAL_REASON_KEY.to_string(), warning);
    }

    resources.dependent_services = verdicts.dependencies;
    resources.service = if overall { real_services(verdicts.compatible) } else { real_services(verdicts.incompatible) };
    Ok(CompCheckOutput::new(overall, messages, resources))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
