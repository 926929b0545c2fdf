//! Configuration parser for loading and merging configuration files.
//!
//! This module handles loading federation configuration from YAML files and
//! environment variables, with proper precedence and error handling.

use crate::error::{ConfigError, Result, TrustForgeError};
use std::path::Path;
use tracing::{debug, info};

use super::spec::FederationConfig;

/// Configuration parser for loading federation configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<std::path::PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<FederationConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(TrustForgeError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            TrustForgeError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<FederationConfig> {
        debug!("Parsing YAML configuration");

        let config: FederationConfig = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            TrustForgeError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!(
            "Successfully parsed configuration for project: {}",
            config.project.id
        );
        Ok(config)
    }

    /// Loads configuration with environment variable overrides.
    ///
    /// Environment variables are checked in the format
    /// `TRUSTFORGE_<SECTION>_<KEY>` (e.g., `TRUSTFORGE_PROJECT_ID`).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<FederationConfig> {
        let mut config = self.load_file(path)?;

        // Apply environment overrides
        Self::apply_env_overrides(&mut config);

        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(config: &mut FederationConfig) {
        if let Ok(id) = std::env::var("TRUSTFORGE_PROJECT_ID") {
            debug!("Overriding project.id from environment");
            config.project.id = id;
        }

        if let Ok(number) = std::env::var("TRUSTFORGE_PROJECT_NUMBER") {
            debug!("Overriding project.number from environment");
            config.project.number = Some(number);
        }

        if let Ok(repository) = std::env::var("TRUSTFORGE_TRUST_REPOSITORY") {
            debug!("Overriding trust.repository from environment");
            config.trust.repository = repository;
        }

        if let Ok(issuer) = std::env::var("TRUSTFORGE_TRUST_ISSUER_URI") {
            debug!("Overriding trust.issuer_uri from environment");
            config.trust.issuer_uri = issuer;
        }
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| std::path::PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                TrustForgeError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    /// Gets the Google Cloud access token from environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is not set.
    pub fn get_access_token() -> Result<String> {
        std::env::var("GOOGLE_OAUTH_ACCESS_TOKEN").map_err(|_| {
            TrustForgeError::Config(ConfigError::MissingEnvVar {
                name: String::from("GOOGLE_OAUTH_ACCESS_TOKEN"),
            })
        })
    }
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &[
    "trustforge.yaml",
    "trustforge.yml",
    "federation.yaml",
    "federation.yml",
];

/// Finds the configuration file in the current directory or parent directories.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<std::path::PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(TrustForgeError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r"
project:
  id: test-project
service_account:
  account_id: github-deployer
trust:
  repository: acme/api
";
        let parser = ConfigParser::new();
        let result = parser.parse_yaml(yaml, None);
        assert!(result.is_ok());

        let config = result.unwrap();
        assert_eq!(config.project.id, "test-project");
        assert_eq!(config.trust.repository, "acme/api");
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
project:
  id: acme-prod
  number: '123456789012'

service_account:
  account_id: github-deployer
  display_name: GitHub Actions deployer
  roles:
    - roles/run.admin
    - roles/artifactregistry.writer

pool:
  id: github-pool
  display_name: GitHub Actions

provider:
  id: github-provider
  display_name: GitHub OIDC

trust:
  repository: acme/api
  allowed_branches:
    - main
    - "release-*"
  allowed_tags:
    - "v*"
  block_forked_repos: true
  require_actor: true
  claim_mappings:
    environment: assertion.environment
"#;
        let parser = ConfigParser::new();
        let result = parser.parse_yaml(yaml, None);
        assert!(result.is_ok());

        let config = result.unwrap();
        assert_eq!(config.project.number.as_deref(), Some("123456789012"));
        assert_eq!(config.service_account.roles.len(), 2);
        assert_eq!(config.trust.allowed_branches.len(), 2);
        assert_eq!(
            config.trust.claim_override("environment"),
            Some("assertion.environment")
        );
    }

    #[test]
    fn test_invalid_yaml_rejected() {
        let parser = ConfigParser::new();
        let result = parser.parse_yaml("not: [valid", None);
        assert!(result.is_err());
    }

    #[test]
    fn test_load_file_missing() {
        let parser = ConfigParser::new();
        let result = parser.load_file("/nonexistent/trustforge.yaml");
        assert!(result.is_err());
    }

    #[test]
    fn test_find_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trustforge.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "project:").unwrap();

        let found = find_config_file(dir.path()).unwrap();
        assert_eq!(found, path);
    }
}
