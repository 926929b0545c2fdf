//! Google Cloud IAM backend implementation.
//!
//! This module provides the REST adapter for the Google Cloud IAM and
//! Resource Manager APIs. It is a thin transport layer: it maps HTTP status
//! codes onto the typed [`BackendError`](crate::error::BackendError)
//! taxonomy and retries transient failures with a bounded backoff, but all
//! reconciliation decisions live in the core.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, header};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, trace};

use crate::config::{PoolConfig, ServiceAccountConfig};
use crate::error::{BackendError, Result, TrustForgeError};

use super::traits::IdentityBackend;
use super::types::{LifecycleState, LiveResource, ProviderSpec, TrustBinding};

/// IAM API base URL.
const IAM_API_URL: &str = "https://iam.googleapis.com/v1";

/// Resource Manager API base URL (project IAM policies).
const RESOURCE_MANAGER_API_URL: &str = "https://cloudresourcemanager.googleapis.com/v1";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for transient failures.
const MAX_RETRIES: u32 = 3;

/// Delay between retries in milliseconds.
const RETRY_DELAY_MS: u64 = 1000;

/// Google Cloud IAM backend.
#[derive(Debug, Clone)]
pub struct GcloudBackend {
    /// HTTP client.
    client: Client,
    /// OAuth access token.
    token: String,
    /// IAM API base URL.
    iam_url: String,
    /// Resource Manager API base URL.
    resource_manager_url: String,
}

/// Generic API error envelope.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

/// API error detail.
#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

/// Service account resource.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceAccountResponse {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    disabled: bool,
}

/// Workload identity pool resource.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PoolResponse {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    disabled: bool,
}

/// Workload identity pool provider resource.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderResponse {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    disabled: bool,
    #[serde(default)]
    attribute_mapping: HashMap<String, String>,
    #[serde(default)]
    attribute_condition: Option<String>,
    #[serde(default)]
    oidc: Option<OidcResponse>,
}

/// OIDC section of a provider resource.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OidcResponse {
    #[serde(default)]
    issuer_uri: Option<String>,
}

/// IAM policy document.
#[derive(Debug, Deserialize)]
struct IamPolicy {
    #[serde(default)]
    bindings: Vec<IamBinding>,
    #[serde(default)]
    etag: Option<String>,
}

/// A single IAM policy binding.
#[derive(Debug, Deserialize)]
struct IamBinding {
    role: String,
    #[serde(default)]
    members: Vec<String>,
    #[serde(default)]
    condition: Option<serde_json::Value>,
}

impl GcloudBackend {
    /// Creates a new Google Cloud backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(token: &str) -> Result<Self> {
        Self::with_endpoints(token, IAM_API_URL, RESOURCE_MANAGER_API_URL)
    }

    /// Creates a backend with custom API endpoints.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_endpoints(
        token: &str,
        iam_url: impl Into<String>,
        resource_manager_url: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| BackendError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            token: token.to_string(),
            iam_url: iam_url.into(),
            resource_manager_url: resource_manager_url.into(),
        })
    }

    /// Executes a request with bounded retry for transient failures.
    async fn request<T: for<'de> Deserialize<'de>>(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Option<T>> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                debug!("Retry attempt {attempt} of {MAX_RETRIES}");
                tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS * u64::from(attempt)))
                    .await;
            }

            match self.request_once::<T>(method.clone(), url, body).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if e.is_retryable() {
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            TrustForgeError::Backend(BackendError::NetworkError {
                message: String::from("Max retries exceeded"),
            })
        }))
    }

    /// Executes a single request. Returns `Ok(None)` on HTTP 404.
    async fn request_once<T: for<'de> Deserialize<'de>>(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Option<T>> {
        trace!("{method} {url}");

        let mut request = self
            .client
            .request(method, url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .header(header::CONTENT_TYPE, "application/json");

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            TrustForgeError::Backend(BackendError::NetworkError {
                message: format!("Request failed: {e}"),
            })
        })?;

        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or_default();
            let retry_after = if retry_after == 0 { 60 } else { retry_after };

            return Err(TrustForgeError::Backend(BackendError::RateLimited {
                retry_after_secs: retry_after,
            }));
        }

        if status == StatusCode::UNAUTHORIZED {
            return Err(TrustForgeError::Backend(BackendError::AuthenticationFailed {
                message: String::from("Access token rejected"),
            }));
        }

        if status == StatusCode::FORBIDDEN {
            let message = Self::error_message(response).await;
            return Err(TrustForgeError::Backend(BackendError::PermissionDenied {
                resource: url.to_string(),
                message,
            }));
        }

        if !status.is_success() {
            let message = Self::error_message(response).await;
            return Err(TrustForgeError::Backend(BackendError::api_error(
                status.as_u16(),
                message,
            )));
        }

        let parsed: T = response.json().await.map_err(|e| {
            TrustForgeError::Backend(BackendError::InvalidResponse {
                message: format!("Failed to parse response: {e}"),
            })
        })?;

        Ok(Some(parsed))
    }

    /// Extracts the error message from an API error body.
    async fn error_message(response: reqwest::Response) -> String {
        let body = response.text().await.unwrap_or_default();
        serde_json::from_str::<ApiErrorBody>(&body)
            .ok()
            .and_then(|b| b.error)
            .and_then(|e| e.message)
            .unwrap_or(body)
    }

    /// Fetches an IAM policy document via a `:getIamPolicy` call.
    async fn get_iam_policy(&self, url: &str) -> Result<IamPolicy> {
        self.request(Method::POST, url, Some(&json!({})))
            .await?
            .ok_or_else(|| {
                TrustForgeError::Backend(BackendError::InvalidResponse {
                    message: String::from("IAM policy endpoint returned not found"),
                })
            })
    }

    /// Collects the roles a member currently holds in a policy.
    fn roles_for_member(policy: &IamPolicy, member: &str) -> Vec<String> {
        let mut roles: Vec<String> = policy
            .bindings
            .iter()
            .filter(|b| b.members.iter().any(|m| m == member))
            .map(|b| b.role.clone())
            .collect();
        roles.sort();
        roles.dedup();
        roles
    }

    /// Rewrites a policy's bindings, granting or revoking project roles for
    /// a member, and submits it via `:setIamPolicy`.
    async fn modify_project_roles(
        &self,
        project_id: &str,
        member: &str,
        roles: &[String],
        grant: bool,
    ) -> Result<()> {
        let base = format!("{}/projects/{project_id}", self.resource_manager_url);
        let policy = self.get_iam_policy(&format!("{base}:getIamPolicy")).await?;

        let mut bindings: Vec<serde_json::Value> = Vec::new();
        let mut remaining: Vec<&String> = roles.iter().collect();

        for binding in &policy.bindings {
            let mut members = binding.members.clone();
            let targeted = roles.contains(&binding.role) && binding.condition.is_none();

            if targeted {
                remaining.retain(|r| *r != &binding.role);
                if grant {
                    if !members.iter().any(|m| m == member) {
                        members.push(member.to_string());
                    }
                } else {
                    members.retain(|m| m != member);
                }
            }

            if members.is_empty() {
                continue;
            }

            let mut value = json!({ "role": binding.role, "members": members });
            if let Some(condition) = &binding.condition {
                value["condition"] = condition.clone();
            }
            bindings.push(value);
        }

        if grant {
            for role in remaining {
                bindings.push(json!({ "role": role, "members": [member] }));
            }
        }

        let body = json!({
            "policy": {
                "bindings": bindings,
                "etag": policy.etag,
            }
        });

        self.request::<serde_json::Value>(Method::POST, &format!("{base}:setIamPolicy"), Some(&body))
            .await?;
        Ok(())
    }

    /// Builds the service account resource URL.
    fn service_account_url(&self, project_id: &str, email: &str) -> String {
        format!("{}/projects/{project_id}/serviceAccounts/{email}", self.iam_url)
    }

    /// Builds the pool resource URL.
    fn pool_url(&self, project_id: &str, pool_id: &str) -> String {
        format!(
            "{}/projects/{project_id}/locations/global/workloadIdentityPools/{pool_id}",
            self.iam_url
        )
    }
}

#[async_trait]
impl IdentityBackend for GcloudBackend {
    async fn get_service_identity(
        &self,
        project_id: &str,
        account_id: &str,
    ) -> Result<Option<LiveResource>> {
        let email = format!("{account_id}@{project_id}.iam.gserviceaccount.com");
        debug!("Fetching service account {email}");

        let Some(account) = self
            .request::<ServiceAccountResponse>(
                Method::GET,
                &self.service_account_url(project_id, &email),
                None,
            )
            .await?
        else {
            return Ok(None);
        };

        let policy = self
            .get_iam_policy(&format!(
                "{}/projects/{project_id}:getIamPolicy",
                self.resource_manager_url
            ))
            .await?;
        let member = format!("serviceAccount:{email}");

        let mut live = LiveResource::existing(account_id)
            .with_disabled(account.disabled)
            .with_roles(Self::roles_for_member(&policy, &member));
        live.display_name = account.display_name;
        live.description = account.description;
        Ok(Some(live))
    }

    async fn get_pool(&self, project_id: &str, pool_id: &str) -> Result<Option<LiveResource>> {
        debug!("Fetching workload identity pool {pool_id}");

        let Some(pool) = self
            .request::<PoolResponse>(Method::GET, &self.pool_url(project_id, pool_id), None)
            .await?
        else {
            return Ok(None);
        };

        let mut live = LiveResource::existing(pool_id)
            .with_state(pool.state.as_deref().map_or(LifecycleState::Unknown, LifecycleState::parse))
            .with_disabled(pool.disabled);
        live.display_name = pool.display_name;
        live.description = pool.description;
        Ok(Some(live))
    }

    async fn get_provider(
        &self,
        project_id: &str,
        pool_id: &str,
        provider_id: &str,
    ) -> Result<Option<LiveResource>> {
        debug!("Fetching pool provider {pool_id}/{provider_id}");

        let url = format!(
            "{}/providers/{provider_id}",
            self.pool_url(project_id, pool_id)
        );
        let Some(provider) = self
            .request::<ProviderResponse>(Method::GET, &url, None)
            .await?
        else {
            return Ok(None);
        };

        let mut live = LiveResource::existing(provider_id)
            .with_state(
                provider
                    .state
                    .as_deref()
                    .map_or(LifecycleState::Unknown, LifecycleState::parse),
            )
            .with_disabled(provider.disabled);
        live.display_name = provider.display_name;
        live.description = provider.description;
        live.issuer_uri = provider.oidc.and_then(|o| o.issuer_uri);
        live.attribute_condition = provider.attribute_condition;
        live.attribute_mapping = provider.attribute_mapping;
        Ok(Some(live))
    }

    async fn create_service_identity(
        &self,
        project_id: &str,
        spec: &ServiceAccountConfig,
    ) -> Result<()> {
        debug!("Creating service account {}", spec.account_id);

        let body = json!({
            "accountId": spec.account_id,
            "serviceAccount": {
                "displayName": spec.display_name,
                "description": spec.description,
            }
        });

        self.request::<serde_json::Value>(
            Method::POST,
            &format!("{}/projects/{project_id}/serviceAccounts", self.iam_url),
            Some(&body),
        )
        .await?;
        Ok(())
    }

    async fn create_pool(&self, project_id: &str, spec: &PoolConfig) -> Result<()> {
        debug!("Creating workload identity pool {}", spec.id);

        let body = json!({
            "displayName": spec.display_name,
            "description": spec.description,
        });
        let url = format!(
            "{}/projects/{project_id}/locations/global/workloadIdentityPools?workloadIdentityPoolId={}",
            self.iam_url, spec.id
        );

        self.request::<serde_json::Value>(Method::POST, &url, Some(&body))
            .await?;
        Ok(())
    }

    async fn create_provider(
        &self,
        project_id: &str,
        pool_id: &str,
        spec: &ProviderSpec,
    ) -> Result<()> {
        debug!("Creating pool provider {}", spec.id);

        let mut oidc = json!({ "issuerUri": spec.issuer_uri });
        if !spec.audiences.is_empty() {
            oidc["allowedAudiences"] = json!(spec.audiences);
        }

        let body = json!({
            "displayName": spec.display_name,
            "attributeMapping": spec.attribute_mapping.to_api_map(),
            "attributeCondition": spec.attribute_condition,
            "oidc": oidc,
        });
        let url = format!(
            "{}/providers?workloadIdentityPoolProviderId={}",
            self.pool_url(project_id, pool_id),
            spec.id
        );

        self.request::<serde_json::Value>(Method::POST, &url, Some(&body))
            .await?;
        Ok(())
    }

    async fn grant_roles(&self, project_id: &str, member: &str, roles: &[String]) -> Result<()> {
        debug!("Granting {} roles to {member}", roles.len());
        self.modify_project_roles(project_id, member, roles, true).await
    }

    async fn revoke_roles(&self, project_id: &str, member: &str, roles: &[String]) -> Result<()> {
        debug!("Revoking {} roles from {member}", roles.len());
        self.modify_project_roles(project_id, member, roles, false).await
    }

    async fn create_trust_binding(
        &self,
        project_id: &str,
        account_email: &str,
        binding: &TrustBinding,
    ) -> Result<()> {
        debug!("Binding {} on {account_email}", binding.role);

        let base = self.service_account_url(project_id, account_email);
        let policy = self.get_iam_policy(&format!("{base}:getIamPolicy")).await?;

        let mut bindings: Vec<serde_json::Value> = policy
            .bindings
            .iter()
            .map(|b| {
                let mut value = json!({ "role": b.role, "members": b.members });
                if let Some(condition) = &b.condition {
                    value["condition"] = condition.clone();
                }
                value
            })
            .collect();

        bindings.push(json!({
            "role": binding.role,
            "members": [binding.member],
            "condition": {
                "title": "trustforge federation",
                "expression": binding.condition,
            }
        }));

        let body = json!({
            "policy": {
                "bindings": bindings,
                "etag": policy.etag,
            }
        });

        self.request::<serde_json::Value>(Method::POST, &format!("{base}:setIamPolicy"), Some(&body))
            .await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "gcloud"
    }
}
