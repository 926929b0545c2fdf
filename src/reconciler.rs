//! Reconciler for the federation trust infrastructure.
//!
//! This module sequences the reconciliation pipeline: fetch live state for
//! each managed resource, produce advised conflict reports, and, when the
//! aggregate verdict allows, apply the ordered creation pipeline
//! identity -> pool -> provider -> role grants -> trust binding. The core
//! never retries backend calls and never interprets a read failure as an
//! absent resource.

use tracing::{debug, info, warn};

use crate::analyzer::{
    AggregateConflictResult, ConflictAnalyzer, ConflictReport, DesiredResource, ResolutionAdvisor,
    ResourceKind,
};
use crate::backend::{IdentityBackend, LiveResource, ProviderSpec, TrustBinding};
use crate::config::defaults::WORKLOAD_IDENTITY_USER_ROLE;
use crate::config::FederationConfig;
use crate::error::{ReconcileError, Result, TrustForgeError};
use crate::policy::{CompiledPolicy, PolicyCompiler};

/// Reconciler for federation trust infrastructure.
pub struct Reconciler<'a, B: IdentityBackend> {
    /// Desired configuration.
    config: &'a FederationConfig,
    /// Identity backend.
    backend: &'a B,
    /// Conflict analyzer.
    analyzer: ConflictAnalyzer,
    /// Resolution advisor.
    advisor: ResolutionAdvisor,
    /// Trust policy compiler.
    compiler: PolicyCompiler,
}

/// Result of applying a reconciliation.
#[derive(Debug, Default, serde::Serialize)]
pub struct ApplyResult {
    /// Resources created.
    pub created: Vec<String>,
    /// Resources converged in place.
    pub updated: Vec<String>,
    /// Resources reused unchanged.
    pub reused: Vec<String>,
    /// Whether the trust binding was (re)written.
    pub trust_binding_written: bool,
}

impl<'a, B: IdentityBackend> Reconciler<'a, B> {
    /// Creates a new reconciler.
    #[must_use]
    pub const fn new(config: &'a FederationConfig, backend: &'a B) -> Self {
        Self {
            config,
            backend,
            analyzer: ConflictAnalyzer::new(),
            advisor: ResolutionAdvisor::new(),
            compiler: PolicyCompiler::new(),
        }
    }

    /// Compiles the configured trust policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the policy is rejected by the compiler.
    pub fn compile_policy(&self) -> Result<CompiledPolicy> {
        self.compiler.compile(&self.config.trust)
    }

    /// Analyzes all managed resources and produces the advised aggregate
    /// verdict.
    ///
    /// The policy is compiled first so that validation failures surface
    /// before any backend call, and so the provider analysis can detect
    /// condition drift against the freshly compiled expression.
    ///
    /// # Errors
    ///
    /// Returns an error if policy compilation fails or a live-state read
    /// fails with anything other than typed not-found.
    pub async fn analyze(&self) -> Result<AggregateConflictResult> {
        let compiled = self.compile_policy()?;
        let project = &self.config.project.id;

        info!(
            "Analyzing federation for {} ({})",
            self.config.trust.repository, project
        );

        let identity = self.fetch_and_advise(
            DesiredResource::ServiceIdentity(&self.config.service_account),
            self.backend
                .get_service_identity(project, &self.config.service_account.account_id)
                .await?,
        );

        let pool = self.fetch_and_advise(
            DesiredResource::IdentityPool(&self.config.pool),
            self.backend.get_pool(project, &self.config.pool.id).await?,
        );

        let provider = self.fetch_and_advise(
            DesiredResource::IdentityProvider {
                provider: &self.config.provider,
                trust: &self.config.trust,
                expected_condition: Some(&compiled.condition),
            },
            self.backend
                .get_provider(project, &self.config.pool.id, &self.config.provider.id)
                .await?,
        );

        let aggregate = AggregateConflictResult::from_reports(vec![identity, pool, provider]);
        info!("{}", aggregate.summary);
        Ok(aggregate)
    }

    /// Analyzes one fetched snapshot and annotates the report.
    fn fetch_and_advise(
        &self,
        desired: DesiredResource<'_>,
        live: Option<LiveResource>,
    ) -> ConflictReport {
        let id = desired.resource_id().to_string();
        let live = live.unwrap_or_else(|| LiveResource::absent(id));
        self.advisor.advise(self.analyzer.analyze(&desired, &live))
    }

    /// Applies the reconciliation for an analyzed aggregate.
    ///
    /// Creation order is fixed: identity, pool, provider, role grants,
    /// trust binding. Warning-level service-identity reports are converged
    /// by granting the configured roles (the project policy merge is
    /// idempotent); pool and provider warnings are reused as-is because the
    /// backend cannot update them in place.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Aborted`] when the aggregate verdict does
    /// not allow proceeding; backend failures propagate unchanged.
    pub async fn apply(&self, analysis: &AggregateConflictResult) -> Result<ApplyResult> {
        if !analysis.can_proceed {
            return Err(TrustForgeError::Reconcile(ReconcileError::Aborted {
                reason: analysis.recommended_action.clone(),
            }));
        }

        let compiled = self.compile_policy()?;
        let project = &self.config.project.id;
        let email = self.config.service_account.email(project);
        let mut result = ApplyResult::default();

        for report in &analysis.reports {
            match report.kind {
                ResourceKind::ServiceIdentity => {
                    self.apply_service_identity(report, &email, &mut result).await?;
                }
                ResourceKind::IdentityPool => {
                    if report.exists {
                        debug!("Reusing pool '{}'", report.resource_id);
                        result.reused.push(report.resource_id.clone());
                    } else {
                        self.backend.create_pool(project, &self.config.pool).await?;
                        info!("Created pool '{}'", report.resource_id);
                        result.created.push(report.resource_id.clone());
                    }
                }
                ResourceKind::IdentityProvider => {
                    if report.exists {
                        debug!("Reusing provider '{}'", report.resource_id);
                        result.reused.push(report.resource_id.clone());
                    } else {
                        let spec = ProviderSpec {
                            id: self.config.provider.id.clone(),
                            display_name: self.config.provider.display_name.clone(),
                            issuer_uri: self.config.trust.issuer_uri.clone(),
                            audiences: self.config.trust.audiences.clone(),
                            attribute_mapping: compiled.attribute_mapping.clone(),
                            attribute_condition: compiled.condition.clone(),
                        };
                        self.backend
                            .create_provider(project, &self.config.pool.id, &spec)
                            .await?;
                        info!("Created provider '{}'", report.resource_id);
                        result.created.push(report.resource_id.clone());
                    }
                }
            }
        }

        let binding = TrustBinding {
            member: self.config.principal_set_member(),
            role: WORKLOAD_IDENTITY_USER_ROLE.to_string(),
            condition: compiled.condition.clone(),
        };
        self.backend
            .create_trust_binding(project, &email, &binding)
            .await?;
        result.trust_binding_written = true;
        info!("Trust binding written for {}", binding.member);

        Ok(result)
    }

    /// Applies the service identity step: create when absent, converge
    /// role grants when drifted, reuse otherwise.
    async fn apply_service_identity(
        &self,
        report: &ConflictReport,
        email: &str,
        result: &mut ApplyResult,
    ) -> Result<()> {
        let project = &self.config.project.id;
        let member = format!("serviceAccount:{email}");

        if report.exists {
            let roles_drifted = report.differences.iter().any(|d| d.field == "missing_roles");
            if roles_drifted {
                // Granting the full desired set converges the live state;
                // the policy merge never duplicates existing bindings.
                self.backend
                    .grant_roles(project, &member, &self.config.service_account.roles)
                    .await?;
                info!("Granted missing roles to {member}");
                result.updated.push(report.resource_id.clone());
            } else {
                debug!("Reusing service account '{}'", report.resource_id);
                result.reused.push(report.resource_id.clone());
            }
            return Ok(());
        }

        self.backend
            .create_service_identity(project, &self.config.service_account)
            .await?;
        self.backend
            .grant_roles(project, &member, &self.config.service_account.roles)
            .await?;
        info!("Created service account '{}'", report.resource_id);
        result.created.push(report.resource_id.clone());
        Ok(())
    }

    /// Revokes the configured project roles from the service identity.
    ///
    /// Used by cleanup; the service account, pool, and provider themselves
    /// are left for the operator to remove through the provider's own
    /// tooling.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend call fails.
    pub async fn revoke_grants(&self) -> Result<Vec<String>> {
        let project = &self.config.project.id;
        let email = self.config.service_account.email(project);
        let member = format!("serviceAccount:{email}");

        warn!(
            "Revoking {} role(s) from {member}",
            self.config.service_account.roles.len()
        );
        self.backend
            .revoke_roles(project, &member, &self.config.service_account.roles)
            .await?;

        Ok(self.config.service_account.roles.clone())
    }
}

impl ApplyResult {
    /// Returns the total number of touched resources.
    #[must_use]
    pub const fn total_changes(&self) -> usize {
        self.created.len() + self.updated.len()
    }
}

impl std::fmt::Display for ApplyResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Reconciliation applied:")?;
        writeln!(f, "  Created: {}", self.created.len())?;
        writeln!(f, "  Updated: {}", self.updated.len())?;
        writeln!(f, "  Reused: {}", self.reused.len())?;
        write!(
            f,
            "  Trust binding: {}",
            if self.trust_binding_written { "written" } else { "skipped" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{LifecycleState, MockIdentityBackend};
    use crate::error::BackendError;
    use mockall::predicate::eq;

    fn config() -> FederationConfig {
        serde_yaml::from_str(
            r"
project:
  id: acme-prod
  number: '123456789'
service_account:
  account_id: github-deployer
  roles:
    - roles/run.admin
trust:
  repository: acme/api
",
        )
        .unwrap()
    }

    fn live_provider(config: &FederationConfig) -> LiveResource {
        let compiled = PolicyCompiler::new().compile(&config.trust).unwrap();
        LiveResource::existing("github-provider")
            .with_issuer_uri(config.trust.issuer_uri.clone())
            .with_attribute_condition(compiled.condition)
    }

    #[tokio::test]
    async fn test_analyze_maps_not_found_to_creation() {
        let config = config();
        let mut backend = MockIdentityBackend::new();
        backend
            .expect_get_service_identity()
            .with(eq("acme-prod"), eq("github-deployer"))
            .returning(|_, _| Ok(None));
        backend.expect_get_pool().returning(|_, _| Ok(None));
        backend.expect_get_provider().returning(|_, _, _| Ok(None));

        let reconciler = Reconciler::new(&config, &backend);
        let analysis = reconciler.analyze().await.unwrap();

        assert!(analysis.can_proceed);
        assert_eq!(analysis.creations().len(), 3);
        assert_eq!(analysis.recommended_action, "No conflicts detected");
    }

    #[tokio::test]
    async fn test_analyze_propagates_backend_failure() {
        let config = config();
        let mut backend = MockIdentityBackend::new();
        backend.expect_get_service_identity().returning(|_, _| {
            Err(TrustForgeError::Backend(BackendError::PermissionDenied {
                resource: String::from("projects/acme-prod"),
                message: String::from("denied"),
            }))
        });

        let reconciler = Reconciler::new(&config, &backend);
        let err = reconciler.analyze().await.unwrap_err();

        // A failed read must never be treated as "does not exist".
        assert!(matches!(
            err,
            TrustForgeError::Backend(BackendError::PermissionDenied { .. })
        ));
    }

    #[tokio::test]
    async fn test_analyze_rejects_bad_policy_before_backend_calls() {
        let mut config = config();
        config.trust.repository = String::from("malformed");
        let backend = MockIdentityBackend::new();

        let reconciler = Reconciler::new(&config, &backend);
        let err = reconciler.analyze().await.unwrap_err();
        assert!(matches!(err, TrustForgeError::Policy(_)));
    }

    #[tokio::test]
    async fn test_apply_creates_everything_in_order() {
        let config = config();
        let mut backend = MockIdentityBackend::new();
        backend.expect_get_service_identity().returning(|_, _| Ok(None));
        backend.expect_get_pool().returning(|_, _| Ok(None));
        backend.expect_get_provider().returning(|_, _, _| Ok(None));

        let mut seq = mockall::Sequence::new();
        backend
            .expect_create_service_identity()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        backend
            .expect_grant_roles()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|_, member, roles| {
                member == "serviceAccount:github-deployer@acme-prod.iam.gserviceaccount.com"
                    && roles.len() == 1
                    && roles[0] == "roles/run.admin"
            })
            .returning(|_, _, _| Ok(()));
        backend
            .expect_create_pool()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        backend
            .expect_create_provider()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|_, pool_id, spec| {
                pool_id == "github-pool"
                    && spec.attribute_condition.starts_with("attribute.repository=='acme/api'")
            })
            .returning(|_, _, _| Ok(()));
        backend
            .expect_create_trust_binding()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|_, email, binding| {
                email == "github-deployer@acme-prod.iam.gserviceaccount.com"
                    && binding.role == WORKLOAD_IDENTITY_USER_ROLE
                    && binding.member.contains("projects/123456789/")
            })
            .returning(|_, _, _| Ok(()));

        let reconciler = Reconciler::new(&config, &backend);
        let analysis = reconciler.analyze().await.unwrap();
        let result = reconciler.apply(&analysis).await.unwrap();

        assert_eq!(result.created.len(), 3);
        assert!(result.trust_binding_written);
    }

    #[tokio::test]
    async fn test_apply_converges_missing_roles_without_recreate() {
        let config = config();
        let mut backend = MockIdentityBackend::new();
        backend.expect_get_service_identity().returning(|_, _| {
            Ok(Some(LiveResource::existing("github-deployer")))
        });
        backend
            .expect_get_pool()
            .returning(|_, _| Ok(Some(LiveResource::existing("github-pool"))));
        let provider_config = config.clone();
        backend
            .expect_get_provider()
            .returning(move |_, _, _| Ok(Some(live_provider(&provider_config))));

        backend.expect_create_service_identity().never();
        backend.expect_grant_roles().times(1).returning(|_, _, _| Ok(()));
        backend.expect_create_pool().never();
        backend.expect_create_provider().never();
        backend
            .expect_create_trust_binding()
            .times(1)
            .returning(|_, _, _| Ok(()));

        let reconciler = Reconciler::new(&config, &backend);
        let analysis = reconciler.analyze().await.unwrap();
        assert!(analysis.can_proceed);

        let result = reconciler.apply(&analysis).await.unwrap();
        assert_eq!(result.updated, vec![String::from("github-deployer")]);
        assert_eq!(result.reused.len(), 2);
    }

    #[tokio::test]
    async fn test_apply_refuses_critical_aggregate() {
        let config = config();
        let mut backend = MockIdentityBackend::new();
        backend.expect_get_service_identity().returning(|_, _| Ok(None));
        backend.expect_get_pool().returning(|_, _| {
            Ok(Some(
                LiveResource::existing("github-pool").with_state(LifecycleState::Deleted),
            ))
        });
        backend.expect_get_provider().returning(|_, _, _| Ok(None));
        backend.expect_create_service_identity().never();
        backend.expect_create_pool().never();

        let reconciler = Reconciler::new(&config, &backend);
        let analysis = reconciler.analyze().await.unwrap();
        assert!(!analysis.can_proceed);

        let err = reconciler.apply(&analysis).await.unwrap_err();
        assert!(matches!(
            err,
            TrustForgeError::Reconcile(ReconcileError::Aborted { .. })
        ));
    }
}
