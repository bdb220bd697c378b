// crates/edge-policy-cli/src/offline.rs
// ============================================================================
// Module: Offline Collaborators
// Description: Collaborators that answer only from the check input.
// Purpose: Run compatibility checks from files without an exchange.
// Dependencies: edge-policy-compcheck, edge-policy-core
// ============================================================================

//! ## Overview
//! [`OfflineCollaborators`] has no exchange behind it. Record lookups fail
//! with an error naming what to put in the input instead, service policy and
//! service selection lookups find nothing, and secret store queries fail as
//! unavailable. A check therefore succeeds only when the input carries every
//! document it needs.

use std::collections::BTreeMap;

use edge_policy_compcheck::Collaborators;
use edge_policy_compcheck::ExchangeError;
use edge_policy_compcheck::ExchangeNode;
use edge_policy_compcheck::ResolvedService;
use edge_policy_compcheck::ServiceMap;
use edge_policy_core::BusinessPolicy;
use edge_policy_core::ExternalPolicy;
use edge_policy_core::Pattern;

use crate::t;

/// Collaborators for checks run from local files.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineCollaborators;

impl Collaborators for OfflineCollaborators {
    fn get_device(&self, node_id: &str) -> Result<Option<ExchangeNode>, ExchangeError> {
        Err(ExchangeError(t!("offline.node", id = node_id)))
    }

    fn node_policy(&self, node_id: &str) -> Result<Option<ExternalPolicy>, ExchangeError> {
        Err(ExchangeError(t!("offline.node_policy", id = node_id)))
    }

    fn business_policies(&self, org: &str, id: &str) -> Result<BTreeMap<String, BusinessPolicy>, ExchangeError> {
        Err(ExchangeError(t!("offline.business_policy", id = format!("{org}/{id}"))))
    }

    fn patterns(&self, org: &str, id: &str) -> Result<BTreeMap<String, Pattern>, ExchangeError> {
        Err(ExchangeError(t!("offline.pattern", id = format!("{org}/{id}"))))
    }

    fn service_policy(
        &self,
        _url: &str,
        _org: &str,
        _version: &str,
        _arch: &str,
    ) -> Result<(Option<ExternalPolicy>, String), ExchangeError> {
        Ok((None, String::new()))
    }

    fn resolve_service(
        &self,
        url: &str,
        org: &str,
        version: &str,
        arch: &str,
    ) -> Result<ResolvedService, ExchangeError> {
        Err(ExchangeError(t!("offline.service", org = org, url = url, version = version, arch = arch)))
    }

    fn selected_services(
        &self,
        _url: &str,
        _org: &str,
        _version: &str,
        _arch: &str,
    ) -> Result<ServiceMap, ExchangeError> {
        Ok(ServiceMap::new())
    }

    fn vault_secret_exists(
        &self,
        agbot_url: &str,
        _org: &str,
        _user: &str,
        _name: &str,
    ) -> Result<bool, ExchangeError> {
        Err(ExchangeError(t!("offline.secret_store", url = agbot_url)))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
