//! Attribute mapping synthesis.
//!
//! This module emits the claim-to-assertion bindings exposed to the trust
//! expression. Emission order is fixed so the output is stable and
//! byte-for-byte testable.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::HashMap;

use crate::config::TrustPolicy;
use crate::config::defaults::ClaimBinding;

/// Ordered set of claim-to-attribute bindings.
///
/// Insertion order is preserved through serialization and display so that
/// the same policy always produces identical output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeMapping {
    bindings: Vec<(String, String)>,
}

impl AttributeMapping {
    /// Builds the mapping for a trust policy from the given claim tables.
    ///
    /// The required claims are always emitted, in table order. Optional
    /// claims are emitted only when the policy overrides them or when
    /// pull-request admission needs them (`pull_request` and `base_ref`).
    #[must_use]
    pub fn from_policy(
        policy: &TrustPolicy,
        required: &[ClaimBinding],
        optional: &[ClaimBinding],
    ) -> Self {
        let mut bindings = Vec::with_capacity(required.len() + optional.len());

        for claim in required {
            let assertion = policy
                .claim_override(claim.claim)
                .unwrap_or(claim.assertion);
            bindings.push((claim.target.to_string(), assertion.to_string()));
        }

        for claim in optional {
            let required_by_feature = policy.allow_pull_requests
                && matches!(claim.claim, "pull_request" | "base_ref");

            match policy.claim_override(claim.claim) {
                Some(assertion) => {
                    bindings.push((claim.target.to_string(), assertion.to_string()));
                }
                None if required_by_feature => {
                    bindings.push((claim.target.to_string(), claim.assertion.to_string()));
                }
                None => {}
            }
        }

        Self { bindings }
    }

    /// Iterates bindings in emission order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings
            .iter()
            .map(|(target, assertion)| (target.as_str(), assertion.as_str()))
    }

    /// Looks up the assertion for an attribute target.
    #[must_use]
    pub fn get(&self, target: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|(t, _)| t == target)
            .map(|(_, assertion)| assertion.as_str())
    }

    /// Returns the number of bindings.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Returns true if the mapping is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Converts the mapping into the unordered form the API accepts.
    #[must_use]
    pub fn to_api_map(&self) -> HashMap<String, String> {
        self.bindings.iter().cloned().collect()
    }
}

impl Serialize for AttributeMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.bindings.len()))?;
        for (target, assertion) in &self.bindings {
            map.serialize_entry(target, assertion)?;
        }
        map.end()
    }
}

impl std::fmt::Display for AttributeMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, (target, assertion)) in self.bindings.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{target}={assertion}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults::{OPTIONAL_CLAIMS, REQUIRED_CLAIMS};

    fn policy(yaml: &str) -> TrustPolicy {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn build(policy: &TrustPolicy) -> AttributeMapping {
        AttributeMapping::from_policy(policy, REQUIRED_CLAIMS, OPTIONAL_CLAIMS)
    }

    #[test]
    fn test_required_claims_in_fixed_order() {
        let mapping = build(&policy("repository: acme/api"));
        let targets: Vec<&str> = mapping.iter().map(|(t, _)| t).collect();
        assert_eq!(
            targets,
            vec![
                "google.subject",
                "attribute.actor",
                "attribute.repository",
                "attribute.repository_owner",
                "attribute.ref",
                "attribute.ref_type",
                "attribute.workflow_ref",
                "attribute.job_workflow_ref",
                "attribute.runner_environment",
            ]
        );
    }

    #[test]
    fn test_optional_claims_absent_by_default() {
        let mapping = build(&policy("repository: acme/api"));
        assert!(mapping.get("attribute.pull_request").is_none());
        assert!(mapping.get("attribute.environment").is_none());
    }

    #[test]
    fn test_pull_request_admission_emits_pr_claims() {
        let mapping = build(&policy(
            r"
repository: acme/api
allow_pull_requests: true
",
        ));
        assert_eq!(
            mapping.get("attribute.pull_request"),
            Some("assertion.pull_request")
        );
        assert_eq!(mapping.get("attribute.base_ref"), Some("assertion.base_ref"));
        assert!(mapping.get("attribute.head_ref").is_none());
    }

    #[test]
    fn test_override_replaces_default_assertion() {
        let mapping = build(&policy(
            r"
repository: acme/api
claim_mappings:
  subject: assertion.repository
  environment: assertion.environment
",
        ));
        assert_eq!(mapping.get("google.subject"), Some("assertion.repository"));
        assert_eq!(
            mapping.get("attribute.environment"),
            Some("assertion.environment")
        );
    }

    #[test]
    fn test_serialization_is_byte_stable() {
        let policy = policy(
            r"
repository: acme/api
allow_pull_requests: true
",
        );
        let first = serde_json::to_string(&build(&policy)).unwrap();
        let second = serde_json::to_string(&build(&policy)).unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with(r#"{"google.subject":"assertion.sub""#));
    }

    #[test]
    fn test_display_is_gcloud_flag_format() {
        let mapping = build(&policy("repository: acme/api"));
        let rendered = mapping.to_string();
        assert!(rendered.starts_with("google.subject=assertion.sub,attribute.actor="));
        assert!(!rendered.ends_with(','));
    }
}
