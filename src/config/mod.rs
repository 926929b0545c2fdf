//! Configuration module for the trustforge federation system.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `trustforge.yaml`
//! - Validation of configuration values
//! - Default tables for roles, claims, and OIDC settings

pub mod defaults;
mod parser;
mod spec;
mod validator;

pub use parser::{ConfigParser, find_config_file};
pub use spec::{
    FederationConfig, PoolConfig, ProjectConfig, ProviderConfig, ServiceAccountConfig, TrustPolicy,
};
pub use validator::{ConfigValidator, ValidationResult, is_valid_repository};
