//! Conflict analysis between desired and live trust infrastructure.
//!
//! This module computes semantic, field-level differences between the
//! configuration a user wants and the resources that already exist, and
//! classifies every discrepancy by operational risk. Analysis is a pure
//! function over already-fetched data: no I/O, no retries, no mutation of
//! live state.

use serde::Serialize;
use tracing::debug;

use crate::backend::LiveResource;
use crate::config::{PoolConfig, ProviderConfig, ServiceAccountConfig, TrustPolicy};

/// The three resource kinds this system manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Cloud service account the CI pipeline impersonates.
    ServiceIdentity,
    /// Workload identity pool.
    IdentityPool,
    /// Workload identity pool provider.
    IdentityProvider,
}

/// Desired configuration for a single resource, passed to the analyzer.
///
/// Modeled as a sum type with exhaustive matching so that adding a fourth
/// resource kind is a compile-time-checked change.
#[derive(Debug, Clone, Copy)]
pub enum DesiredResource<'a> {
    /// A service identity with its role grants.
    ServiceIdentity(&'a ServiceAccountConfig),
    /// A workload identity pool.
    IdentityPool(&'a PoolConfig),
    /// A pool provider bound to the trust policy.
    IdentityProvider {
        /// Provider configuration.
        provider: &'a ProviderConfig,
        /// Trust policy the provider enforces.
        trust: &'a TrustPolicy,
        /// Freshly compiled attribute condition, when available, used to
        /// detect condition drift beyond the repository guard.
        expected_condition: Option<&'a str>,
    },
}

/// Risk classification of a single configuration difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Cosmetic difference, safe to ignore or converge automatically.
    #[default]
    Info,
    /// Meaningful difference that deserves review but does not endanger
    /// the trust boundary.
    Warning,
    /// Difference on an immutability- or security-sensitive field.
    /// Proceeding would overwrite or reuse a production trust boundary.
    Critical,
}

/// One semantic field-level delta between live and desired state.
#[derive(Debug, Clone, Serialize)]
pub struct FieldDifference {
    /// Field that differs.
    pub field: String,
    /// Live value, if any.
    pub live: Option<String>,
    /// Desired value, if any.
    pub desired: Option<String>,
    /// Risk classification.
    pub severity: Severity,
    /// Human-readable description of the difference.
    pub description: String,
}

/// Aggregated conflict analysis for one resource.
#[derive(Debug, Clone, Serialize)]
pub struct ConflictReport {
    /// Kind of the analyzed resource.
    pub kind: ResourceKind,
    /// Resource ID the analysis targeted.
    pub resource_id: String,
    /// Whether the resource exists on the backend.
    pub exists: bool,
    /// Ordered field-level differences.
    pub differences: Vec<FieldDifference>,
    /// Ranked remediation options, filled in by the resolution advisor.
    pub suggestions: Vec<super::advisor::ResolutionSuggestion>,
}

/// Analyzer producing conflict reports from desired/live pairs.
#[derive(Debug, Default)]
pub struct ConflictAnalyzer;

impl ConflictAnalyzer {
    /// Creates a new conflict analyzer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Analyzes one desired/live pair.
    ///
    /// When the live resource does not exist, the report carries zero
    /// differences and the implied action is creation; the advisor
    /// short-circuits instead of generating suggestions.
    #[must_use]
    pub fn analyze(&self, desired: &DesiredResource<'_>, live: &LiveResource) -> ConflictReport {
        let mut report = ConflictReport {
            kind: desired.kind(),
            resource_id: desired.resource_id().to_string(),
            exists: live.exists,
            differences: Vec::new(),
            suggestions: Vec::new(),
        };

        if !live.exists {
            debug!("{} '{}' does not exist yet", report.kind, report.resource_id);
            return report;
        }

        match desired {
            DesiredResource::ServiceIdentity(spec) => {
                Self::analyze_service_identity(spec, live, &mut report);
            }
            DesiredResource::IdentityPool(spec) => {
                Self::analyze_pool(spec, live, &mut report);
            }
            DesiredResource::IdentityProvider {
                provider,
                trust,
                expected_condition,
            } => {
                Self::analyze_provider(provider, trust, *expected_condition, live, &mut report);
            }
        }

        debug!(
            "{} '{}': {} differences, severity {}",
            report.kind,
            report.resource_id,
            report.differences.len(),
            report.severity()
        );
        report
    }

    /// Fixed rule set for service identities.
    fn analyze_service_identity(
        spec: &ServiceAccountConfig,
        live: &LiveResource,
        report: &mut ConflictReport,
    ) {
        if live.disabled {
            report.differences.push(FieldDifference {
                field: String::from("disabled"),
                live: Some(String::from("true")),
                desired: Some(String::from("false")),
                severity: Severity::Critical,
                description: String::from("Existing service account is disabled"),
            });
        }

        compare_metadata(
            spec.display_name.as_deref(),
            live.display_name.as_deref(),
            "display_name",
            Severity::Info,
            report,
        );
        compare_metadata(
            spec.description.as_deref(),
            live.description.as_deref(),
            "description",
            Severity::Info,
            report,
        );

        let missing: Vec<&String> = spec
            .roles
            .iter()
            .filter(|r| !live.roles.contains(r))
            .collect();
        if !missing.is_empty() {
            report.differences.push(FieldDifference {
                field: String::from("missing_roles"),
                live: Some(join_or_none(&live.roles)),
                desired: Some(
                    missing
                        .iter()
                        .map(|s| s.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                ),
                severity: Severity::Warning,
                description: format!("{} desired role(s) are not granted", missing.len()),
            });
        }

        let extra: Vec<&String> = live
            .roles
            .iter()
            .filter(|r| !spec.roles.contains(r))
            .collect();
        if !extra.is_empty() {
            report.differences.push(FieldDifference {
                field: String::from("extra_roles"),
                live: Some(
                    extra
                        .iter()
                        .map(|s| s.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                ),
                desired: None,
                severity: Severity::Info,
                description: format!(
                    "{} granted role(s) are not in the configuration; they are never \
                     revoked automatically",
                    extra.len()
                ),
            });
        }
    }

    /// Fixed rule set for identity pools.
    ///
    /// Display metadata is a warning here, not info: the backend cannot
    /// update a pool in place, so the difference removes update-in-place
    /// from the valid resolution strategies.
    fn analyze_pool(spec: &PoolConfig, live: &LiveResource, report: &mut ConflictReport) {
        compare_metadata(
            spec.display_name.as_deref(),
            live.display_name.as_deref(),
            "display_name",
            Severity::Warning,
            report,
        );
        compare_metadata(
            spec.description.as_deref(),
            live.description.as_deref(),
            "description",
            Severity::Warning,
            report,
        );

        Self::check_lifecycle(live, report);
    }

    /// Fixed rule set for pool providers.
    fn analyze_provider(
        spec: &ProviderConfig,
        trust: &TrustPolicy,
        expected_condition: Option<&str>,
        live: &LiveResource,
        report: &mut ConflictReport,
    ) {
        compare_metadata(
            spec.display_name.as_deref(),
            live.display_name.as_deref(),
            "display_name",
            Severity::Warning,
            report,
        );

        Self::check_lifecycle(live, report);

        // Issuer immutability is a security invariant: a provider trusting
        // a different issuer must never be silently reused.
        if live.issuer_uri.as_deref() != Some(trust.issuer_uri.as_str()) {
            report.differences.push(FieldDifference {
                field: String::from("issuer_uri"),
                live: live.issuer_uri.clone(),
                desired: Some(trust.issuer_uri.clone()),
                severity: Severity::Critical,
                description: String::from("Existing provider trusts a different OIDC issuer"),
            });
        }

        // The single most important guard: the live condition must still be
        // scoped to the desired repository. The quoted token is matched so
        // that acme/api does not match acme/api-internal.
        let repository_token = format!("'{}'", trust.repository);
        let contains_repository = live
            .attribute_condition
            .as_deref()
            .is_some_and(|c| c.contains(&repository_token));

        if contains_repository {
            if let Some(expected) = expected_condition
                && live.attribute_condition.as_deref() != Some(expected)
            {
                report.differences.push(FieldDifference {
                    field: String::from("attribute_condition"),
                    live: live.attribute_condition.clone(),
                    desired: Some(expected.to_string()),
                    severity: Severity::Warning,
                    description: String::from(
                        "Existing trust condition differs from the compiled policy",
                    ),
                });
            }
        } else {
            report.differences.push(FieldDifference {
                field: String::from("attribute_condition"),
                live: live.attribute_condition.clone(),
                desired: expected_condition.map(ToString::to_string),
                severity: Severity::Critical,
                description: format!(
                    "Existing trust condition is not scoped to repository {}",
                    trust.repository
                ),
            });
        }
    }

    /// Lifecycle checks shared by pools and providers.
    fn check_lifecycle(live: &LiveResource, report: &mut ConflictReport) {
        if !live.state.is_active() {
            report.differences.push(FieldDifference {
                field: String::from("state"),
                live: Some(live.state.to_string()),
                desired: Some(String::from("ACTIVE")),
                severity: Severity::Critical,
                description: String::from("Existing resource is not active"),
            });
        }

        if live.disabled {
            report.differences.push(FieldDifference {
                field: String::from("disabled"),
                live: Some(String::from("true")),
                desired: Some(String::from("false")),
                severity: Severity::Critical,
                description: String::from("Existing resource is disabled"),
            });
        }
    }
}

/// Compares optional display metadata, recording a difference only when the
/// configuration states a value.
fn compare_metadata(
    desired: Option<&str>,
    live: Option<&str>,
    field: &str,
    severity: Severity,
    report: &mut ConflictReport,
) {
    if let Some(desired) = desired
        && live != Some(desired)
    {
        report.differences.push(FieldDifference {
            field: field.to_string(),
            live: live.map(ToString::to_string),
            desired: Some(desired.to_string()),
            severity,
            description: format!("{field} differs from configuration"),
        });
    }
}

/// Joins a value list for display, or a placeholder when empty.
fn join_or_none(values: &[String]) -> String {
    if values.is_empty() {
        String::from("(none)")
    } else {
        values.join(", ")
    }
}

impl DesiredResource<'_> {
    /// Returns the kind of the desired resource.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::ServiceIdentity(_) => ResourceKind::ServiceIdentity,
            Self::IdentityPool(_) => ResourceKind::IdentityPool,
            Self::IdentityProvider { .. } => ResourceKind::IdentityProvider,
        }
    }

    /// Returns the resource ID.
    #[must_use]
    pub fn resource_id(&self) -> &str {
        match self {
            Self::ServiceIdentity(spec) => spec.account_id.as_str(),
            Self::IdentityPool(spec) => spec.id.as_str(),
            Self::IdentityProvider { provider, .. } => provider.id.as_str(),
        }
    }
}

impl ConflictReport {
    /// Overall severity: the maximum of all child severities.
    #[must_use]
    pub fn severity(&self) -> Severity {
        self.differences
            .iter()
            .map(|d| d.severity)
            .max()
            .unwrap_or_default()
    }

    /// Whether the report can be resolved without operator intervention.
    #[must_use]
    pub fn can_auto_resolve(&self) -> bool {
        self.severity() <= Severity::Warning
    }

    /// Returns true if any difference was found.
    #[must_use]
    pub fn has_conflicts(&self) -> bool {
        !self.differences.is_empty()
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ServiceIdentity => "service identity",
            Self::IdentityPool => "identity pool",
            Self::IdentityProvider => "identity provider",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for FieldDifference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}]: {} -> {}",
            self.field,
            self.severity,
            self.live.as_deref().unwrap_or("(unset)"),
            self.desired.as_deref().unwrap_or("(unset)"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LifecycleState;
    use crate::config::FederationConfig;

    fn config() -> FederationConfig {
        serde_yaml::from_str(
            r"
project:
  id: acme-prod
service_account:
  account_id: github-deployer
  display_name: GitHub deployer
  roles:
    - roles/run.admin
    - roles/artifactregistry.writer
    - roles/iam.serviceAccountUser
trust:
  repository: acme/api
",
        )
        .unwrap()
    }

    #[test]
    fn test_absent_resource_yields_empty_report() {
        let config = config();
        let analyzer = ConflictAnalyzer::new();

        let report = analyzer.analyze(
            &DesiredResource::IdentityPool(&config.pool),
            &LiveResource::absent("github-pool"),
        );

        assert!(!report.exists);
        assert!(report.differences.is_empty());
        assert_eq!(report.severity(), Severity::Info);
        assert!(report.can_auto_resolve());
    }

    #[test]
    fn test_missing_role_is_single_warning() {
        let config = config();
        let analyzer = ConflictAnalyzer::new();

        let live = LiveResource::existing("github-deployer")
            .with_display_name("GitHub deployer")
            .with_roles(vec![
                String::from("roles/run.admin"),
                String::from("roles/artifactregistry.writer"),
            ]);

        let report = analyzer.analyze(
            &DesiredResource::ServiceIdentity(&config.service_account),
            &live,
        );

        assert_eq!(report.differences.len(), 1);
        let diff = &report.differences[0];
        assert_eq!(diff.field, "missing_roles");
        assert_eq!(diff.severity, Severity::Warning);
        assert_eq!(diff.desired.as_deref(), Some("roles/iam.serviceAccountUser"));
        assert!(report.can_auto_resolve());
    }

    #[test]
    fn test_extra_roles_are_info_only() {
        let config = config();
        let analyzer = ConflictAnalyzer::new();

        let mut roles = config.service_account.roles.clone();
        roles.push(String::from("roles/owner"));
        let live = LiveResource::existing("github-deployer")
            .with_display_name("GitHub deployer")
            .with_roles(roles);

        let report = analyzer.analyze(
            &DesiredResource::ServiceIdentity(&config.service_account),
            &live,
        );

        assert_eq!(report.differences.len(), 1);
        assert_eq!(report.differences[0].field, "extra_roles");
        assert_eq!(report.differences[0].severity, Severity::Info);
    }

    #[test]
    fn test_deleted_pool_is_critical() {
        let config = config();
        let analyzer = ConflictAnalyzer::new();

        let live = LiveResource::existing("github-pool").with_state(LifecycleState::Deleted);
        let report = analyzer.analyze(&DesiredResource::IdentityPool(&config.pool), &live);

        assert_eq!(report.differences.len(), 1);
        assert_eq!(report.differences[0].field, "state");
        assert_eq!(report.severity(), Severity::Critical);
        assert!(!report.can_auto_resolve());
    }

    #[test]
    fn test_provider_issuer_mismatch_is_critical() {
        let config = config();
        let analyzer = ConflictAnalyzer::new();

        let live = LiveResource::existing("github-provider")
            .with_issuer_uri("https://gitlab.example.com")
            .with_attribute_condition("attribute.repository=='acme/api'");

        let report = analyzer.analyze(
            &DesiredResource::IdentityProvider {
                provider: &config.provider,
                trust: &config.trust,
                expected_condition: None,
            },
            &live,
        );

        assert!(
            report
                .differences
                .iter()
                .any(|d| d.field == "issuer_uri" && d.severity == Severity::Critical)
        );
    }

    #[test]
    fn test_provider_scoped_to_other_repository_is_critical() {
        let config = config();
        let analyzer = ConflictAnalyzer::new();

        let live = LiveResource::existing("github-provider")
            .with_issuer_uri(config.trust.issuer_uri.clone())
            .with_attribute_condition("attribute.repository=='acme/api-internal'");

        let report = analyzer.analyze(
            &DesiredResource::IdentityProvider {
                provider: &config.provider,
                trust: &config.trust,
                expected_condition: None,
            },
            &live,
        );

        assert_eq!(report.severity(), Severity::Critical);
        assert!(
            report
                .differences
                .iter()
                .any(|d| d.field == "attribute_condition")
        );
    }

    #[test]
    fn test_provider_condition_drift_is_warning() {
        let config = config();
        let analyzer = ConflictAnalyzer::new();

        let live = LiveResource::existing("github-provider")
            .with_issuer_uri(config.trust.issuer_uri.clone())
            .with_attribute_condition("attribute.repository=='acme/api'");

        let report = analyzer.analyze(
            &DesiredResource::IdentityProvider {
                provider: &config.provider,
                trust: &config.trust,
                expected_condition: Some(
                    "attribute.repository=='acme/api' && attribute.repository_owner=='acme'",
                ),
            },
            &live,
        );

        assert_eq!(report.severity(), Severity::Warning);
        assert!(report.can_auto_resolve());
    }

    #[test]
    fn test_severity_is_monotone() {
        let config = config();
        let analyzer = ConflictAnalyzer::new();

        // Info-only report.
        let live = LiveResource::existing("github-deployer")
            .with_display_name("Old name")
            .with_roles(config.service_account.roles.clone());
        let report = analyzer.analyze(
            &DesiredResource::ServiceIdentity(&config.service_account),
            &live,
        );
        assert_eq!(report.severity(), Severity::Info);

        // Adding a critical difference raises, never lowers.
        let live = live.with_disabled(true);
        let report = analyzer.analyze(
            &DesiredResource::ServiceIdentity(&config.service_account),
            &live,
        );
        assert_eq!(report.severity(), Severity::Critical);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Critical);
    }
}
