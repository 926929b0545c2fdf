//! Policy fingerprinting for change detection.
//!
//! This module provides deterministic hashing of compiled policies so that
//! operators can see at a glance whether a live provider was produced from
//! the current configuration.

use sha2::{Digest, Sha256};

use super::CompiledPolicy;

/// Hasher computing fingerprints of compiled policies.
#[derive(Debug, Default)]
pub struct PolicyHasher;

impl PolicyHasher {
    /// Creates a new policy hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the full fingerprint of a compiled policy.
    ///
    /// Covers the attribute mapping (in emission order) and the trust
    /// expression, so any semantic change to either produces a new value.
    #[must_use]
    pub fn fingerprint(&self, compiled: &CompiledPolicy) -> String {
        let mut hasher = Sha256::new();

        for (target, assertion) in compiled.attribute_mapping.iter() {
            hasher.update(target.as_bytes());
            hasher.update(b"=");
            hasher.update(assertion.as_bytes());
            hasher.update(b"\n");
        }
        hasher.update(compiled.condition.as_bytes());

        hex::encode(hasher.finalize())
    }

    /// Computes the short display form of the fingerprint.
    #[must_use]
    pub fn short_fingerprint(&self, compiled: &CompiledPolicy) -> String {
        self.fingerprint(compiled)[..12].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrustPolicy;
    use crate::policy::PolicyCompiler;

    fn compile(yaml: &str) -> CompiledPolicy {
        let policy: TrustPolicy = serde_yaml::from_str(yaml).unwrap();
        PolicyCompiler::new().compile(&policy).unwrap()
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let hasher = PolicyHasher::new();
        let a = compile("repository: acme/api");
        let b = compile("repository: acme/api");
        assert_eq!(hasher.fingerprint(&a), hasher.fingerprint(&b));
    }

    #[test]
    fn test_fingerprint_changes_with_policy() {
        let hasher = PolicyHasher::new();
        let a = compile("repository: acme/api");
        let b = compile("repository: acme/other");
        assert_ne!(hasher.fingerprint(&a), hasher.fingerprint(&b));
    }

    #[test]
    fn test_short_fingerprint_length() {
        let hasher = PolicyHasher::new();
        let compiled = compile("repository: acme/api");
        assert_eq!(hasher.short_fingerprint(&compiled).len(), 12);
    }
}
