//! Resolution advice for conflict reports.
//!
//! This module converts field-level differences into ranked, actionable
//! resolution options, and aggregates per-resource reports into a single
//! severity-gated verdict for a full reconciliation pass.

use serde::Serialize;
use uuid::Uuid;

use super::conflict::{ConflictReport, ResourceKind, Severity};

/// Candidate remediation strategies, in generation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionStrategy {
    /// Leave the existing resource untouched and reuse it.
    SkipAndReuse,
    /// Converge the existing resource by updating mutable fields.
    UpdateInPlace,
    /// Keep the existing resource and create a fresh one under a new name.
    RenameAndCreateNew,
    /// Abort and investigate manually.
    Fail,
}

/// One candidate remediation for a conflict report.
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionSuggestion {
    /// Strategy tag. Exactly one suggestion per tag per report.
    pub strategy: ResolutionStrategy,
    /// Short title.
    pub title: String,
    /// Why this option exists for this report.
    pub rationale: String,
    /// Arguments for this option.
    pub pros: Vec<String>,
    /// Arguments against this option.
    pub cons: Vec<String>,
    /// Whether the tool can perform this resolution itself.
    pub automatable: bool,
    /// Whether this option is recommended for the report's severity.
    pub recommended: bool,
}

/// Aggregated verdict over all reports of one reconciliation pass.
#[derive(Debug, Serialize)]
pub struct AggregateConflictResult {
    /// Per-resource reports in analysis order.
    pub reports: Vec<ConflictReport>,
    /// Number of info-level differences.
    pub info_count: usize,
    /// Number of warning-level differences.
    pub warning_count: usize,
    /// Number of critical-level differences.
    pub critical_count: usize,
    /// Whether reconciliation may proceed (no critical differences).
    pub can_proceed: bool,
    /// Operator-facing recommendation for the worst bucket present.
    pub recommended_action: String,
    /// One-line summary.
    pub summary: String,
}

/// Advisor annotating conflict reports with resolution options.
#[derive(Debug, Default)]
pub struct ResolutionAdvisor;

impl ResolutionAdvisor {
    /// Creates a new advisor.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Annotates a report with ranked resolution suggestions.
    ///
    /// Absent resources short-circuit: the implied action is creation and
    /// no suggestions are generated.
    #[must_use]
    pub fn advise(&self, mut report: ConflictReport) -> ConflictReport {
        if !report.exists {
            return report;
        }

        report.suggestions = Self::generate_suggestions(&report, updatable_fields(report.kind));
        report
    }

    /// Generates suggestions in deterministic order.
    ///
    /// One generator for all resource kinds; what varies per kind is only
    /// the predicate deciding which fields the backend can update in place.
    fn generate_suggestions(
        report: &ConflictReport,
        updatable: fn(&str) -> bool,
    ) -> Vec<ResolutionSuggestion> {
        let severity = report.severity();
        let mut suggestions = Vec::new();

        suggestions.push(ResolutionSuggestion {
            strategy: ResolutionStrategy::SkipAndReuse,
            title: format!("Reuse the existing {}", report.kind),
            rationale: if report.has_conflicts() {
                format!(
                    "'{}' already exists; its differences can be left as they are",
                    report.resource_id
                )
            } else {
                format!("'{}' already exists and matches the configuration", report.resource_id)
            },
            pros: vec![
                String::from("No changes to live infrastructure"),
                String::from("Fastest path to a working setup"),
            ],
            cons: if report.has_conflicts() {
                vec![String::from("Live differences remain in place")]
            } else {
                Vec::new()
            },
            automatable: true,
            recommended: severity <= Severity::Warning,
        });

        let update_applies = report.differences.iter().any(|d| updatable(&d.field));
        if update_applies {
            suggestions.push(ResolutionSuggestion {
                strategy: ResolutionStrategy::UpdateInPlace,
                title: format!("Update the existing {} in place", report.kind),
                rationale: String::from(
                    "All blocking differences are on fields the backend can change",
                ),
                pros: vec![
                    String::from("Converges live state to the configuration"),
                    String::from("Keeps the existing resource name and references"),
                ],
                cons: vec![String::from("Modifies a resource other tooling may rely on")],
                automatable: true,
                recommended: severity <= Severity::Warning,
            });
        }

        suggestions.push(ResolutionSuggestion {
            strategy: ResolutionStrategy::RenameAndCreateNew,
            title: format!("Create a new {} under a different name", report.kind),
            rationale: format!(
                "Leaves '{}' untouched; for example '{}'",
                report.resource_id,
                propose_rename(&report.resource_id)
            ),
            pros: vec![
                String::from("Existing trust relationships stay intact"),
                String::from("Safe regardless of why the conflict exists"),
            ],
            cons: vec![
                String::from("Requires a configuration change"),
                String::from("Leaves the conflicting resource behind"),
            ],
            automatable: false,
            recommended: severity == Severity::Critical,
        });

        if severity == Severity::Critical {
            suggestions.push(ResolutionSuggestion {
                strategy: ResolutionStrategy::Fail,
                title: String::from("Abort and investigate"),
                rationale: String::from(
                    "A critical conflict means the existing resource guards a trust \
                     boundary this configuration would change",
                ),
                pros: vec![String::from("No risk of clobbering production trust")],
                cons: vec![String::from("Blocks the rollout until resolved")],
                automatable: false,
                recommended: false,
            });
        }

        suggestions
    }
}

/// Per-kind predicate for fields the backend can update in place.
///
/// Pools and providers cannot be updated in place at all, which is why
/// their metadata differences are classified warning rather than info.
const fn updatable_fields(kind: ResourceKind) -> fn(&str) -> bool {
    match kind {
        ResourceKind::ServiceIdentity => {
            |field| matches!(field, "display_name" | "description" | "missing_roles")
        }
        ResourceKind::IdentityPool | ResourceKind::IdentityProvider => |_| false,
    }
}

/// Proposes a fresh resource name with a short random suffix.
fn propose_rename(resource_id: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{resource_id}-{}", &suffix[..6])
}

impl AggregateConflictResult {
    /// Builds the aggregate verdict from per-resource reports.
    #[must_use]
    pub fn from_reports(reports: Vec<ConflictReport>) -> Self {
        let mut info_count = 0;
        let mut warning_count = 0;
        let mut critical_count = 0;

        for difference in reports.iter().flat_map(|r| &r.differences) {
            match difference.severity {
                Severity::Info => info_count += 1,
                Severity::Warning => warning_count += 1,
                Severity::Critical => critical_count += 1,
            }
        }

        let can_proceed = critical_count == 0;

        let recommended_action = if critical_count > 0 {
            String::from("Resolve critical conflicts before proceeding: rename the affected resources or abort")
        } else if warning_count > 0 {
            String::from("Review warnings, then proceed; warning-level differences can be converged automatically")
        } else if info_count > 0 {
            String::from("Proceed; remaining differences are cosmetic")
        } else {
            String::from("No conflicts detected")
        };

        let summary = format!(
            "{} resource(s) analyzed: {critical_count} critical, {warning_count} warning, \
             {info_count} info difference(s)",
            reports.len()
        );

        Self {
            reports,
            info_count,
            warning_count,
            critical_count,
            can_proceed,
            recommended_action,
            summary,
        }
    }

    /// Returns the worst severity present across all reports.
    #[must_use]
    pub fn severity(&self) -> Severity {
        self.reports
            .iter()
            .map(ConflictReport::severity)
            .max()
            .unwrap_or_default()
    }

    /// Returns reports that require a create.
    #[must_use]
    pub fn creations(&self) -> Vec<&ConflictReport> {
        self.reports.iter().filter(|r| !r.exists).collect()
    }

    /// Returns reports with at least one difference.
    #[must_use]
    pub fn conflicting(&self) -> Vec<&ConflictReport> {
        self.reports.iter().filter(|r| r.has_conflicts()).collect()
    }
}

impl std::fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::SkipAndReuse => "skip-and-reuse",
            Self::UpdateInPlace => "update-in-place",
            Self::RenameAndCreateNew => "rename-and-create-new",
            Self::Fail => "fail",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for AggregateConflictResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.summary)?;
        write!(f, "{}", self.recommended_action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::conflict::{ConflictAnalyzer, DesiredResource, FieldDifference};
    use crate::backend::{LifecycleState, LiveResource};
    use crate::config::FederationConfig;

    fn config() -> FederationConfig {
        serde_yaml::from_str(
            r"
project:
  id: acme-prod
service_account:
  account_id: github-deployer
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

    fn strategies(report: &ConflictReport) -> Vec<ResolutionStrategy> {
        report.suggestions.iter().map(|s| s.strategy).collect()
    }

    #[test]
    fn test_absent_resource_gets_no_suggestions() {
        let config = config();
        let report = ConflictAnalyzer::new().analyze(
            &DesiredResource::IdentityPool(&config.pool),
            &LiveResource::absent("github-pool"),
        );
        let report = ResolutionAdvisor::new().advise(report);
        assert!(report.suggestions.is_empty());
    }

    #[test]
    fn test_one_suggestion_per_strategy() {
        let config = config();
        let live = LiveResource::existing("github-pool").with_state(LifecycleState::Deleted);
        let report = ResolutionAdvisor::new()
            .advise(ConflictAnalyzer::new().analyze(&DesiredResource::IdentityPool(&config.pool), &live));

        let mut tags = strategies(&report);
        let total = tags.len();
        tags.dedup();
        assert_eq!(tags.len(), total);
    }

    #[test]
    fn test_missing_role_recommends_update_in_place() {
        let config = config();
        let live = LiveResource::existing("github-deployer").with_roles(vec![
            String::from("roles/run.admin"),
            String::from("roles/artifactregistry.writer"),
        ]);
        let report = ResolutionAdvisor::new().advise(
            ConflictAnalyzer::new()
                .analyze(&DesiredResource::ServiceIdentity(&config.service_account), &live),
        );

        assert!(report.can_auto_resolve());
        let update = report
            .suggestions
            .iter()
            .find(|s| s.strategy == ResolutionStrategy::UpdateInPlace)
            .expect("update suggestion present");
        assert!(update.recommended);
        assert!(update.automatable);
    }

    #[test]
    fn test_deleted_pool_recommends_rename() {
        let config = config();
        let live = LiveResource::existing("github-pool").with_state(LifecycleState::Deleted);
        let report = ResolutionAdvisor::new()
            .advise(ConflictAnalyzer::new().analyze(&DesiredResource::IdentityPool(&config.pool), &live));

        assert!(!report.can_auto_resolve());
        // Pools cannot be updated in place, so the strategy is never offered.
        assert_eq!(
            strategies(&report),
            vec![
                ResolutionStrategy::SkipAndReuse,
                ResolutionStrategy::RenameAndCreateNew,
                ResolutionStrategy::Fail,
            ]
        );

        let rename = &report.suggestions[1];
        assert!(rename.recommended);
        let skip = &report.suggestions[0];
        assert!(!skip.recommended);
    }

    #[test]
    fn test_clean_report_recommends_skip() {
        let config = config();
        let live = LiveResource::existing("github-deployer")
            .with_roles(config.service_account.roles.clone());
        let report = ResolutionAdvisor::new().advise(
            ConflictAnalyzer::new()
                .analyze(&DesiredResource::ServiceIdentity(&config.service_account), &live),
        );

        let skip = &report.suggestions[0];
        assert_eq!(skip.strategy, ResolutionStrategy::SkipAndReuse);
        assert!(skip.recommended);
        // Nothing to update on a clean report.
        assert!(
            !report
                .suggestions
                .iter()
                .any(|s| s.strategy == ResolutionStrategy::UpdateInPlace)
        );
    }

    #[test]
    fn test_aggregate_critical_blocks_proceed() {
        let config = config();
        let analyzer = ConflictAnalyzer::new();
        let advisor = ResolutionAdvisor::new();

        let clean = advisor.advise(analyzer.analyze(
            &DesiredResource::ServiceIdentity(&config.service_account),
            &LiveResource::existing("github-deployer")
                .with_roles(config.service_account.roles.clone()),
        ));
        let critical = advisor.advise(analyzer.analyze(
            &DesiredResource::IdentityPool(&config.pool),
            &LiveResource::existing("github-pool").with_state(LifecycleState::Deleted),
        ));

        let aggregate = AggregateConflictResult::from_reports(vec![clean, critical]);
        assert!(!aggregate.can_proceed);
        assert_eq!(aggregate.critical_count, 1);
        assert!(aggregate.recommended_action.contains("critical"));
    }

    #[test]
    fn test_aggregate_no_conflicts() {
        let aggregate = AggregateConflictResult::from_reports(vec![]);
        assert!(aggregate.can_proceed);
        assert_eq!(aggregate.recommended_action, "No conflicts detected");
    }

    #[test]
    fn test_lower_severities_never_mask_critical() {
        let config = config();
        let mut report = ConflictAnalyzer::new().analyze(
            &DesiredResource::IdentityPool(&config.pool),
            &LiveResource::existing("github-pool").with_state(LifecycleState::Deleted),
        );
        // Pile info-level noise on top of the critical difference.
        report.differences.push(FieldDifference {
            field: String::from("display_name"),
            live: None,
            desired: Some(String::from("x")),
            severity: Severity::Info,
            description: String::from("cosmetic"),
        });

        let aggregate = AggregateConflictResult::from_reports(vec![report]);
        assert!(!aggregate.can_proceed);
    }
}
