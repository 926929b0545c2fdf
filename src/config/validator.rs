//! Configuration validation for federation specs.
//!
//! This module provides comprehensive validation of federation
//! configurations, ensuring all values are valid and consistent before any
//! backend call is made. Validation failures are always fatal to the
//! current operation and never retried.

use crate::error::{ConfigError, Result, TrustForgeError};
use std::collections::HashSet;
use tracing::debug;

use super::spec::{FederationConfig, TrustPolicy};

/// Validator for federation configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a federation configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn validate(&self, config: &FederationConfig) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        Self::validate_project(config, &mut result);
        Self::validate_service_account(config, &mut result);
        Self::validate_pool_and_provider(config, &mut result);
        Self::validate_trust_policy(&config.trust, &mut result);

        if result.errors.is_empty() {
            debug!("Configuration validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(TrustForgeError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }))
        }
    }

    /// Validates project configuration.
    fn validate_project(config: &FederationConfig, result: &mut ValidationResult) {
        if config.project.id.is_empty() {
            result.errors.push(ValidationError {
                field: String::from("project.id"),
                message: String::from("Project ID cannot be empty"),
            });
        } else if !is_valid_resource_id(&config.project.id) {
            result.errors.push(ValidationError {
                field: String::from("project.id"),
                message: format!(
                    "Project ID '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                    config.project.id
                ),
            });
        }

        if let Some(number) = &config.project.number
            && !number.chars().all(|c| c.is_ascii_digit())
        {
            result.errors.push(ValidationError {
                field: String::from("project.number"),
                message: format!("Project number '{number}' must be numeric"),
            });
        }

        if config.project.number.is_none() {
            result.warnings.push(String::from(
                "project.number is unset; principal set members will use the project ID, \
                 which some backends reject",
            ));
        }
    }

    /// Validates the service account configuration.
    fn validate_service_account(config: &FederationConfig, result: &mut ValidationResult) {
        let account_id = &config.service_account.account_id;

        if account_id.is_empty() {
            result.errors.push(ValidationError {
                field: String::from("service_account.account_id"),
                message: String::from("Service account ID cannot be empty"),
            });
        } else {
            if !is_valid_resource_id(account_id) {
                result.errors.push(ValidationError {
                    field: String::from("service_account.account_id"),
                    message: format!(
                        "Service account ID '{account_id}' is invalid. \
                         Must be lowercase alphanumeric with hyphens."
                    ),
                });
            }
            if account_id.len() < 6 || account_id.len() > 30 {
                result.errors.push(ValidationError {
                    field: String::from("service_account.account_id"),
                    message: format!("Service account ID '{account_id}' must be 6-30 characters"),
                });
            }
        }

        let mut seen_roles = HashSet::new();
        for (i, role) in config.service_account.roles.iter().enumerate() {
            if !role.starts_with("roles/") && !role.contains("/roles/") {
                result.errors.push(ValidationError {
                    field: format!("service_account.roles[{i}]"),
                    message: format!("Role '{role}' is not a valid role name"),
                });
            }
            if !seen_roles.insert(role) {
                result
                    .warnings
                    .push(format!("service_account.roles[{i}]: Duplicate role '{role}'"));
            }
        }
    }

    /// Validates pool and provider IDs.
    fn validate_pool_and_provider(config: &FederationConfig, result: &mut ValidationResult) {
        for (field, id) in [
            ("pool.id", &config.pool.id),
            ("provider.id", &config.provider.id),
        ] {
            if id.is_empty() {
                result.errors.push(ValidationError {
                    field: String::from(field),
                    message: String::from("ID cannot be empty"),
                });
            } else if !is_valid_resource_id(id) || id.len() < 4 || id.len() > 32 {
                result.errors.push(ValidationError {
                    field: String::from(field),
                    message: format!(
                        "'{id}' is invalid. Must be 4-32 lowercase alphanumeric characters \
                         with hyphens."
                    ),
                });
            }
        }
    }

    /// Validates the trust policy.
    fn validate_trust_policy(trust: &TrustPolicy, result: &mut ValidationResult) {
        if !is_valid_repository(&trust.repository) {
            result.errors.push(ValidationError {
                field: String::from("trust.repository"),
                message: format!(
                    "Repository '{}' is invalid. Expected owner/name.",
                    trust.repository
                ),
            });
        }

        Self::validate_ref_list(&trust.allowed_branches, "trust.allowed_branches", result);
        Self::validate_ref_list(&trust.allowed_tags, "trust.allowed_tags", result);

        for (i, repo) in trust.trusted_repositories.iter().enumerate() {
            if !is_valid_repository(repo) {
                result.errors.push(ValidationError {
                    field: format!("trust.trusted_repositories[{i}]"),
                    message: format!("Repository '{repo}' is invalid. Expected owner/name."),
                });
            }
        }

        if !trust.trusted_repositories.is_empty() {
            result.warnings.push(String::from(
                "trust.trusted_repositories: entries are admitted unconditionally and bypass \
                 branch, tag, and pull-request restrictions",
            ));
        }

        if trust.allow_pull_requests && !trust.allowed_branches.is_empty() {
            result.warnings.push(String::from(
                "trust.allow_pull_requests with trust.allowed_branches: push refs and pull \
                 refs are mutually exclusive, so the compiled condition admits neither; \
                 use separate providers for push and pull-request trust",
            ));
        }

        if !trust.issuer_uri.starts_with("https://") {
            result.errors.push(ValidationError {
                field: String::from("trust.issuer_uri"),
                message: format!("Issuer URI '{}' must use https", trust.issuer_uri),
            });
        }

        for (i, audience) in trust.audiences.iter().enumerate() {
            if audience.is_empty() {
                result.errors.push(ValidationError {
                    field: format!("trust.audiences[{i}]"),
                    message: String::from("Audience cannot be empty"),
                });
            }
        }

        for (claim, mapping) in &trust.claim_mappings {
            if !mapping.is_empty() && !mapping.starts_with("assertion.") {
                result.warnings.push(format!(
                    "trust.claim_mappings.{claim}: '{mapping}' does not reference an \
                     assertion path"
                ));
            }
        }
    }

    /// Validates a branch or tag allow-list.
    fn validate_ref_list(entries: &[String], field: &str, result: &mut ValidationResult) {
        let mut seen = HashSet::new();

        for (i, entry) in entries.iter().enumerate() {
            if entry.is_empty() {
                result.errors.push(ValidationError {
                    field: format!("{field}[{i}]"),
                    message: String::from("Entry cannot be empty"),
                });
                continue;
            }

            if entry.chars().any(char::is_whitespace) || entry.contains('\'') {
                result.errors.push(ValidationError {
                    field: format!("{field}[{i}]"),
                    message: format!("Entry '{entry}' contains invalid characters"),
                });
            }

            if !seen.insert(entry) {
                result
                    .warnings
                    .push(format!("{field}[{i}]: Duplicate entry '{entry}'"));
            }
        }
    }
}

/// Validates that a repository token is in `owner/name` form.
///
/// Both parts must be non-empty and restricted to the characters GitHub
/// allows in owner and repository names.
#[must_use]
pub fn is_valid_repository(repository: &str) -> bool {
    let Some((owner, name)) = repository.split_once('/') else {
        return false;
    };

    if owner.is_empty() || name.is_empty() || name.contains('/') {
        return false;
    }

    let valid_part = |part: &str| {
        part.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    };

    valid_part(owner) && valid_part(name)
}

/// Validates that an ID follows the cloud resource naming convention.
/// IDs must be lowercase alphanumeric with hyphens, starting with a letter.
fn is_valid_resource_id(id: &str) -> bool {
    if id.is_empty() {
        return false;
    }

    let mut chars = id.chars();

    // First character must be a letter
    if let Some(first) = chars.next()
        && !first.is_ascii_lowercase()
    {
        return false;
    }

    // Rest must be lowercase alphanumeric or hyphen
    for c in chars {
        if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' {
            return false;
        }
    }

    // Cannot end with hyphen
    if id.ends_with('-') {
        return false;
    }

    // Cannot have consecutive hyphens
    if id.contains("--") {
        return false;
    }

    true
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> FederationConfig {
        serde_yaml::from_str(
            r"
project:
  id: acme-prod
  number: '123456789'
service_account:
  account_id: github-deployer
trust:
  repository: acme/api
",
        )
        .unwrap()
    }

    #[test]
    fn test_valid_repository() {
        assert!(is_valid_repository("acme/api"));
        assert!(is_valid_repository("my-org/my.repo_2"));
        assert!(is_valid_repository("a/b"));
    }

    #[test]
    fn test_invalid_repository() {
        assert!(!is_valid_repository(""));
        assert!(!is_valid_repository("acme"));
        assert!(!is_valid_repository("acme/"));
        assert!(!is_valid_repository("/api"));
        assert!(!is_valid_repository("acme/api/extra"));
        assert!(!is_valid_repository("acme/a pi"));
    }

    #[test]
    fn test_valid_resource_id() {
        assert!(is_valid_resource_id("github-pool"));
        assert!(is_valid_resource_id("deployer2"));
        assert!(!is_valid_resource_id(""));
        assert!(!is_valid_resource_id("Github-Pool"));
        assert!(!is_valid_resource_id("2pool"));
        assert!(!is_valid_resource_id("pool-"));
        assert!(!is_valid_resource_id("pool--x"));
    }

    #[test]
    fn test_valid_config_passes() {
        let validator = ConfigValidator::new();
        let result = validator.validate(&valid_config()).unwrap();
        assert!(result.is_valid());
    }

    #[test]
    fn test_malformed_repository_rejected() {
        let mut config = valid_config();
        config.trust.repository = String::from("not-a-repo");

        let validator = ConfigValidator::new();
        assert!(validator.validate(&config).is_err());
    }

    #[test]
    fn test_short_account_id_rejected() {
        let mut config = valid_config();
        config.service_account.account_id = String::from("short");

        let validator = ConfigValidator::new();
        assert!(validator.validate(&config).is_err());
    }

    #[test]
    fn test_trusted_repositories_warn() {
        let mut config = valid_config();
        config.trust.trusted_repositories = vec![String::from("acme/infra")];

        let validator = ConfigValidator::new();
        let result = validator.validate(&config).unwrap();
        assert_eq!(result.warning_count(), 1);
    }

    #[test]
    fn test_branches_with_pull_requests_warn() {
        let mut config = valid_config();
        config.trust.allowed_branches = vec![String::from("main")];
        config.trust.allow_pull_requests = true;

        let validator = ConfigValidator::new();
        let result = validator.validate(&config).unwrap();
        assert!(
            result
                .warnings
                .iter()
                .any(|w| w.contains("allow_pull_requests"))
        );
    }

    #[test]
    fn test_plain_http_issuer_rejected() {
        let mut config = valid_config();
        config.trust.issuer_uri = String::from("http://issuer.example.com");

        let validator = ConfigValidator::new();
        assert!(validator.validate(&config).is_err());
    }

    #[test]
    fn test_empty_branch_entry_rejected() {
        let mut config = valid_config();
        config.trust.allowed_branches = vec![String::new()];

        let validator = ConfigValidator::new();
        assert!(validator.validate(&config).is_err());
    }
}
