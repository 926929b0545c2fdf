//! Security-condition compilation.
//!
//! This module compiles a declarative [`TrustPolicy`] into the two
//! artifacts the cloud provider consumes at token-exchange time: the
//! claim-to-attribute mapping and the CEL trust expression. Compilation is
//! a pure, deterministic transform; the same policy always yields
//! byte-identical output.

mod condition;
mod fingerprint;
mod mapping;

pub use condition::top_level_conjuncts;
pub use fingerprint::PolicyHasher;
pub use mapping::AttributeMapping;

use serde::Serialize;

use crate::config::defaults::{ClaimBinding, OPTIONAL_CLAIMS, REQUIRED_CLAIMS};
use crate::config::{TrustPolicy, is_valid_repository};
use crate::error::{PolicyError, Result, TrustForgeError};

/// Output of trust policy compilation.
#[derive(Debug, Clone, Serialize)]
pub struct CompiledPolicy {
    /// Claim-to-attribute bindings, in emission order.
    pub attribute_mapping: AttributeMapping,
    /// Trust expression in the provider's condition grammar. Consumers
    /// pass it through unmodified.
    pub condition: String,
}

/// Compiler turning trust policies into attribute mappings and trust
/// expressions.
///
/// The claim tables are injected at construction so tests can substitute
/// their own without global side effects.
#[derive(Debug)]
pub struct PolicyCompiler {
    /// Claims always present in the mapping.
    required_claims: &'static [ClaimBinding],
    /// Claims emitted on demand.
    optional_claims: &'static [ClaimBinding],
}

impl PolicyCompiler {
    /// Creates a compiler with the documented default claim tables.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            required_claims: REQUIRED_CLAIMS,
            optional_claims: OPTIONAL_CLAIMS,
        }
    }

    /// Creates a compiler with custom claim tables.
    #[must_use]
    pub const fn with_claim_tables(
        required_claims: &'static [ClaimBinding],
        optional_claims: &'static [ClaimBinding],
    ) -> Self {
        Self {
            required_claims,
            optional_claims,
        }
    }

    /// Compiles a trust policy.
    ///
    /// # Errors
    ///
    /// Returns a [`PolicyError`] if the policy's repository token is empty
    /// or malformed, or if an allow-list contains an empty entry. Nothing
    /// is synthesized for a rejected policy.
    pub fn compile(&self, policy: &TrustPolicy) -> Result<CompiledPolicy> {
        Self::validate(policy)?;

        Ok(CompiledPolicy {
            attribute_mapping: AttributeMapping::from_policy(
                policy,
                self.required_claims,
                self.optional_claims,
            ),
            condition: condition::build(policy),
        })
    }

    /// Rejects policies the expression builder must never see.
    fn validate(policy: &TrustPolicy) -> Result<()> {
        if policy.repository.is_empty() {
            return Err(TrustForgeError::Policy(PolicyError::EmptyRepository));
        }

        if !is_valid_repository(&policy.repository) {
            return Err(TrustForgeError::Policy(PolicyError::MalformedRepository {
                repository: policy.repository.clone(),
            }));
        }

        for repository in &policy.trusted_repositories {
            if !is_valid_repository(repository) {
                return Err(TrustForgeError::Policy(PolicyError::MalformedRepository {
                    repository: repository.clone(),
                }));
            }
        }

        for (list, entries) in [
            ("branch", &policy.allowed_branches),
            ("tag", &policy.allowed_tags),
        ] {
            if entries.iter().any(String::is_empty) {
                return Err(TrustForgeError::Policy(PolicyError::EmptyRefEntry {
                    list: list.to_string(),
                }));
            }
        }

        Ok(())
    }
}

impl Default for PolicyCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl CompiledPolicy {
    /// Returns the top-level conjuncts of the restriction arm of the
    /// condition (the arm that pins the repository), one per clause.
    #[must_use]
    pub fn restriction_conjuncts(&self) -> Vec<&str> {
        let restriction = self
            .condition
            .strip_prefix('(')
            .and_then(|rest| rest.split_once(") || ("))
            .map_or(self.condition.as_str(), |(arm, _)| arm);
        top_level_conjuncts(restriction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(yaml: &str) -> TrustPolicy {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_compile_is_deterministic() {
        let compiler = PolicyCompiler::new();
        let policy = policy(
            r#"
repository: acme/api
allowed_branches: ["main"]
allow_pull_requests: false
"#,
        );

        let first = compiler.compile(&policy).unwrap();
        let second = compiler.compile(&policy).unwrap();
        assert_eq!(first.condition, second.condition);
        assert_eq!(
            serde_json::to_string(&first.attribute_mapping).unwrap(),
            serde_json::to_string(&second.attribute_mapping).unwrap()
        );
    }

    #[test]
    fn test_reference_policy_example() {
        let compiled = PolicyCompiler::new()
            .compile(&policy(
                r#"
repository: acme/api
allowed_branches: ["main"]
block_forked_repos: true
"#,
            ))
            .unwrap();

        assert!(compiled.condition.contains("attribute.repository=='acme/api'"));
        assert!(
            compiled
                .condition
                .contains("attribute.repository_owner=='acme'")
        );
        assert!(compiled.condition.contains("(attribute.ref=='refs/heads/main')"));
        assert_eq!(compiled.restriction_conjuncts().len(), 3);
    }

    #[test]
    fn test_empty_repository_rejected() {
        let err = PolicyCompiler::new()
            .compile(&policy("repository: ''"))
            .unwrap_err();
        assert!(matches!(
            err,
            TrustForgeError::Policy(PolicyError::EmptyRepository)
        ));
    }

    #[test]
    fn test_malformed_repository_rejected() {
        let err = PolicyCompiler::new()
            .compile(&policy("repository: just-a-name"))
            .unwrap_err();
        assert!(matches!(
            err,
            TrustForgeError::Policy(PolicyError::MalformedRepository { .. })
        ));
    }

    #[test]
    fn test_empty_branch_entry_rejected() {
        let err = PolicyCompiler::new()
            .compile(&policy(
                r#"
repository: acme/api
allowed_branches: ["main", ""]
"#,
            ))
            .unwrap_err();
        assert!(matches!(
            err,
            TrustForgeError::Policy(PolicyError::EmptyRefEntry { .. })
        ));
    }

    #[test]
    fn test_restriction_conjuncts_skip_trusted_override_arm() {
        let compiled = PolicyCompiler::new()
            .compile(&policy(
                r#"
repository: acme/api
block_forked_repos: true
trusted_repositories: ["acme/infra"]
"#,
            ))
            .unwrap();

        let conjuncts = compiled.restriction_conjuncts();
        assert_eq!(conjuncts.len(), 2);
        assert_eq!(conjuncts[0], "attribute.repository=='acme/api'");
    }
}
