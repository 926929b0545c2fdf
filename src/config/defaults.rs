//! Default tables for federation configuration.
//!
//! These are pure constants injected at construction time (the policy
//! compiler and config deserializer both read them), so tests can substitute
//! their own tables without touching global state.

/// OIDC issuer for GitHub Actions tokens.
pub const DEFAULT_ISSUER_URI: &str = "https://token.actions.githubusercontent.com";

/// Default workload identity pool ID.
pub const DEFAULT_POOL_ID: &str = "github-pool";

/// Default workload identity pool provider ID.
pub const DEFAULT_PROVIDER_ID: &str = "github-provider";

/// Role that lets a federated principal impersonate a service account.
pub const WORKLOAD_IDENTITY_USER_ROLE: &str = "roles/iam.workloadIdentityUser";

/// Project roles granted to the service identity when the configuration
/// does not list its own.
pub const DEFAULT_SERVICE_ACCOUNT_ROLES: &[&str] = &[
    "roles/run.admin",
    "roles/artifactregistry.writer",
    "roles/iam.serviceAccountUser",
];

/// A single claim-to-assertion binding in the attribute mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimBinding {
    /// Short claim name used for overrides in the trust policy.
    pub claim: &'static str,
    /// Attribute key exposed to the trust expression.
    pub target: &'static str,
    /// Default assertion path extracted from the OIDC token.
    pub assertion: &'static str,
}

/// Claims always present in the attribute mapping, in emission order.
pub const REQUIRED_CLAIMS: &[ClaimBinding] = &[
    ClaimBinding {
        claim: "subject",
        target: "google.subject",
        assertion: "assertion.sub",
    },
    ClaimBinding {
        claim: "actor",
        target: "attribute.actor",
        assertion: "assertion.actor",
    },
    ClaimBinding {
        claim: "repository",
        target: "attribute.repository",
        assertion: "assertion.repository",
    },
    ClaimBinding {
        claim: "repository_owner",
        target: "attribute.repository_owner",
        assertion: "assertion.repository_owner",
    },
    ClaimBinding {
        claim: "ref",
        target: "attribute.ref",
        assertion: "assertion.ref",
    },
    ClaimBinding {
        claim: "ref_type",
        target: "attribute.ref_type",
        assertion: "assertion.ref_type",
    },
    ClaimBinding {
        claim: "workflow_ref",
        target: "attribute.workflow_ref",
        assertion: "assertion.workflow_ref",
    },
    ClaimBinding {
        claim: "job_workflow_ref",
        target: "attribute.job_workflow_ref",
        assertion: "assertion.job_workflow_ref",
    },
    ClaimBinding {
        claim: "runner_environment",
        target: "attribute.runner_environment",
        assertion: "assertion.runner_environment",
    },
];

/// Claims emitted only when the policy names them or an enabled feature
/// requires them, in emission order.
pub const OPTIONAL_CLAIMS: &[ClaimBinding] = &[
    ClaimBinding {
        claim: "base_ref",
        target: "attribute.base_ref",
        assertion: "assertion.base_ref",
    },
    ClaimBinding {
        claim: "head_ref",
        target: "attribute.head_ref",
        assertion: "assertion.head_ref",
    },
    ClaimBinding {
        claim: "pull_request",
        target: "attribute.pull_request",
        assertion: "assertion.pull_request",
    },
    ClaimBinding {
        claim: "environment",
        target: "attribute.environment",
        assertion: "assertion.environment",
    },
];

/// Returns the default service account roles as owned strings.
#[must_use]
pub fn default_roles() -> Vec<String> {
    DEFAULT_SERVICE_ACCOUNT_ROLES
        .iter()
        .map(|r| (*r).to_string())
        .collect()
}
