//! Identity backend trait definition.
//!
//! This module defines the capability interface the core consumes from its
//! environment. All calls are synchronous from the core's point of view
//! (one awaited call per resource) and may fail with a typed
//! [`BackendError`](crate::error::BackendError); the core never retries
//! them itself.

use async_trait::async_trait;

use super::types::{LiveResource, ProviderSpec, TrustBinding};
use crate::config::{PoolConfig, ServiceAccountConfig};
use crate::error::Result;

/// Capability interface for the federated-identity backend.
///
/// Read operations return `Ok(None)` for a resource that does not exist;
/// every other failure mode propagates as an error so callers can never
/// mistake an unreachable backend for an absent resource.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityBackend: Send + Sync {
    /// Fetches the live state of a service identity.
    async fn get_service_identity(
        &self,
        project_id: &str,
        account_id: &str,
    ) -> Result<Option<LiveResource>>;

    /// Fetches the live state of a workload identity pool.
    async fn get_pool(&self, project_id: &str, pool_id: &str) -> Result<Option<LiveResource>>;

    /// Fetches the live state of a pool provider.
    async fn get_provider(
        &self,
        project_id: &str,
        pool_id: &str,
        provider_id: &str,
    ) -> Result<Option<LiveResource>>;

    /// Creates a service identity.
    async fn create_service_identity(
        &self,
        project_id: &str,
        spec: &ServiceAccountConfig,
    ) -> Result<()>;

    /// Creates a workload identity pool.
    async fn create_pool(&self, project_id: &str, spec: &PoolConfig) -> Result<()>;

    /// Creates a pool provider with its attribute mapping and condition.
    async fn create_provider(
        &self,
        project_id: &str,
        pool_id: &str,
        spec: &ProviderSpec,
    ) -> Result<()>;

    /// Grants project roles to a member.
    async fn grant_roles(&self, project_id: &str, member: &str, roles: &[String]) -> Result<()>;

    /// Revokes project roles from a member.
    async fn revoke_roles(&self, project_id: &str, member: &str, roles: &[String]) -> Result<()>;

    /// Creates the trust binding admitting a federated principal onto a
    /// service identity.
    async fn create_trust_binding(
        &self,
        project_id: &str,
        account_email: &str,
        binding: &TrustBinding,
    ) -> Result<()>;

    /// Gets the backend type name.
    fn backend_name(&self) -> &'static str;
}

#[async_trait]
impl IdentityBackend for Box<dyn IdentityBackend> {
    async fn get_service_identity(
        &self,
        project_id: &str,
        account_id: &str,
    ) -> Result<Option<LiveResource>> {
        (**self).get_service_identity(project_id, account_id).await
    }

    async fn get_pool(&self, project_id: &str, pool_id: &str) -> Result<Option<LiveResource>> {
        (**self).get_pool(project_id, pool_id).await
    }

    async fn get_provider(
        &self,
        project_id: &str,
        pool_id: &str,
        provider_id: &str,
    ) -> Result<Option<LiveResource>> {
        (**self).get_provider(project_id, pool_id, provider_id).await
    }

    async fn create_service_identity(
        &self,
        project_id: &str,
        spec: &ServiceAccountConfig,
    ) -> Result<()> {
        (**self).create_service_identity(project_id, spec).await
    }

    async fn create_pool(&self, project_id: &str, spec: &PoolConfig) -> Result<()> {
        (**self).create_pool(project_id, spec).await
    }

    async fn create_provider(
        &self,
        project_id: &str,
        pool_id: &str,
        spec: &ProviderSpec,
    ) -> Result<()> {
        (**self).create_provider(project_id, pool_id, spec).await
    }

    async fn grant_roles(&self, project_id: &str, member: &str, roles: &[String]) -> Result<()> {
        (**self).grant_roles(project_id, member, roles).await
    }

    async fn revoke_roles(&self, project_id: &str, member: &str, roles: &[String]) -> Result<()> {
        (**self).revoke_roles(project_id, member, roles).await
    }

    async fn create_trust_binding(
        &self,
        project_id: &str,
        account_email: &str,
        binding: &TrustBinding,
    ) -> Result<()> {
        (**self)
            .create_trust_binding(project_id, account_email, binding)
            .await
    }

    fn backend_name(&self) -> &'static str {
        (**self).backend_name()
    }
}
