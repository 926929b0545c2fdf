//! Configuration specification types for the federation system.
//!
//! This module defines all the structs that map to the `trustforge.yaml`
//! file. These types are declarative and fully describe the desired trust
//! infrastructure: the service identity, the workload identity pool and
//! provider, and the trust policy gating token exchange.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::defaults;

/// The root configuration structure for a trustforge federation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FederationConfig {
    /// Target Google Cloud project.
    pub project: ProjectConfig,
    /// Service identity the CI pipeline will impersonate.
    pub service_account: ServiceAccountConfig,
    /// Workload identity pool configuration.
    #[serde(default)]
    pub pool: PoolConfig,
    /// Workload identity pool provider configuration.
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Trust policy restricting which CI tokens are admitted.
    pub trust: TrustPolicy,
}

/// Target project configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectConfig {
    /// Google Cloud project ID.
    pub id: String,
    /// Google Cloud project number. Required for principal set members;
    /// falls back to the project ID when unset.
    #[serde(default)]
    pub number: Option<String>,
}

/// Configuration for the service identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceAccountConfig {
    /// Service account ID (the part before the `@` in the email).
    pub account_id: String,
    /// Human-readable display name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Free-text description.
    #[serde(default)]
    pub description: Option<String>,
    /// Project roles to grant to the service account.
    #[serde(default = "defaults::default_roles")]
    pub roles: Vec<String>,
}

/// Configuration for the workload identity pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolConfig {
    /// Pool ID.
    #[serde(default = "default_pool_id")]
    pub id: String,
    /// Human-readable display name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Free-text description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Configuration for the workload identity pool provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Provider ID.
    #[serde(default = "default_provider_id")]
    pub id: String,
    /// Human-readable display name.
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Declarative trust policy compiled into the attribute mapping and the
/// attribute condition evaluated at token-exchange time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrustPolicy {
    /// Repository in `owner/name` form. Required; validated before any
    /// backend call or synthesis.
    pub repository: String,
    /// Branch allow-list. Entries may contain `*` wildcards.
    #[serde(default)]
    pub allowed_branches: Vec<String>,
    /// Tag allow-list. Entries may contain `*` wildcards.
    #[serde(default)]
    pub allowed_tags: Vec<String>,
    /// Admit pull-request tokens.
    #[serde(default)]
    pub allow_pull_requests: bool,
    /// Require the actor claim to be present.
    #[serde(default)]
    pub require_actor: bool,
    /// Require the calling workflow to live in the trusted repository.
    #[serde(default)]
    pub validate_workflow_path: bool,
    /// Pin the repository owner, rejecting tokens minted from forks.
    #[serde(default = "default_true")]
    pub block_forked_repos: bool,
    /// Repositories admitted unconditionally. An escape hatch: entries
    /// bypass every branch/tag/PR restriction.
    #[serde(default)]
    pub trusted_repositories: Vec<String>,
    /// OIDC issuer URI.
    #[serde(default = "default_issuer_uri")]
    pub issuer_uri: String,
    /// Allowed audiences. Empty means the provider default audience.
    #[serde(default)]
    pub audiences: Vec<String>,
    /// Claim-to-assertion overrides keyed by short claim name
    /// (e.g. `actor`, `base_ref`). Unlisted claims use the documented
    /// defaults.
    #[serde(default)]
    pub claim_mappings: HashMap<String, String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            id: default_pool_id(),
            display_name: None,
            description: None,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            id: default_provider_id(),
            display_name: None,
        }
    }
}

impl FederationConfig {
    /// Returns the project number for resource names, falling back to the
    /// project ID.
    #[must_use]
    pub fn project_number(&self) -> &str {
        self.project.number.as_deref().unwrap_or(&self.project.id)
    }

    /// Returns the full resource name of the workload identity pool.
    #[must_use]
    pub fn pool_resource_name(&self) -> String {
        format!(
            "projects/{}/locations/global/workloadIdentityPools/{}",
            self.project_number(),
            self.pool.id
        )
    }

    /// Returns the full resource name of the pool provider.
    #[must_use]
    pub fn provider_resource_name(&self) -> String {
        format!("{}/providers/{}", self.pool_resource_name(), self.provider.id)
    }

    /// Returns the principal set member admitted by the trust binding,
    /// scoped to the policy's repository attribute.
    #[must_use]
    pub fn principal_set_member(&self) -> String {
        format!(
            "principalSet://iam.googleapis.com/{}/attribute.repository/{}",
            self.pool_resource_name(),
            self.trust.repository
        )
    }
}

impl ServiceAccountConfig {
    /// Returns the service account email within the given project.
    #[must_use]
    pub fn email(&self, project_id: &str) -> String {
        format!("{}@{}.iam.gserviceaccount.com", self.account_id, project_id)
    }
}

impl TrustPolicy {
    /// Returns the repository owner, if the repository token is well-formed.
    #[must_use]
    pub fn repository_owner(&self) -> Option<&str> {
        match self.repository.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() => Some(owner),
            _ => None,
        }
    }

    /// Looks up a claim-mapping override by short claim name, ignoring
    /// empty overrides.
    #[must_use]
    pub fn claim_override(&self, claim: &str) -> Option<&str> {
        self.claim_mappings
            .get(claim)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

fn default_pool_id() -> String {
    defaults::DEFAULT_POOL_ID.to_string()
}

fn default_provider_id() -> String {
    defaults::DEFAULT_PROVIDER_ID.to_string()
}

fn default_issuer_uri() -> String {
    defaults::DEFAULT_ISSUER_URI.to_string()
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml() -> &'static str {
        r"
project:
  id: acme-prod
service_account:
  account_id: github-deployer
trust:
  repository: acme/api
"
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config: FederationConfig = serde_yaml::from_str(minimal_yaml()).unwrap();
        assert_eq!(config.project.id, "acme-prod");
        assert_eq!(config.pool.id, defaults::DEFAULT_POOL_ID);
        assert_eq!(config.provider.id, defaults::DEFAULT_PROVIDER_ID);
        assert_eq!(config.trust.issuer_uri, defaults::DEFAULT_ISSUER_URI);
        assert!(config.trust.block_forked_repos);
        assert!(!config.trust.allow_pull_requests);
        assert_eq!(config.service_account.roles, defaults::default_roles());
    }

    #[test]
    fn test_service_account_email() {
        let config: FederationConfig = serde_yaml::from_str(minimal_yaml()).unwrap();
        assert_eq!(
            config.service_account.email(&config.project.id),
            "github-deployer@acme-prod.iam.gserviceaccount.com"
        );
    }

    #[test]
    fn test_principal_set_member_uses_project_number() {
        let yaml = r"
project:
  id: acme-prod
  number: '123456789'
service_account:
  account_id: github-deployer
trust:
  repository: acme/api
";
        let config: FederationConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            config.principal_set_member(),
            "principalSet://iam.googleapis.com/projects/123456789/locations/global/\
             workloadIdentityPools/github-pool/attribute.repository/acme/api"
        );
    }

    #[test]
    fn test_repository_owner() {
        let mut config: FederationConfig = serde_yaml::from_str(minimal_yaml()).unwrap();
        assert_eq!(config.trust.repository_owner(), Some("acme"));

        config.trust.repository = String::from("no-slash");
        assert_eq!(config.trust.repository_owner(), None);

        config.trust.repository = String::from("/missing-owner");
        assert_eq!(config.trust.repository_owner(), None);
    }

    #[test]
    fn test_claim_override_ignores_empty() {
        let mut config: FederationConfig = serde_yaml::from_str(minimal_yaml()).unwrap();
        config
            .trust
            .claim_mappings
            .insert(String::from("actor"), String::new());
        assert_eq!(config.trust.claim_override("actor"), None);

        config
            .trust
            .claim_mappings
            .insert(String::from("actor"), String::from("assertion.actor_id"));
        assert_eq!(config.trust.claim_override("actor"), Some("assertion.actor_id"));
    }
}
