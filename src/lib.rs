// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # trustforge
//!
//! Declarative, reconcilable provisioning of GitHub OIDC workload identity
//! federation on Google Cloud.
//!
//! ## Overview
//!
//! trustforge lets a CI pipeline impersonate a cloud identity without
//! long-lived secrets. From one `trustforge.yaml` it provisions:
//!
//! - A service account the pipeline impersonates
//! - A workload identity pool and an OIDC pool provider bound to the
//!   GitHub Actions issuer
//! - A least-privilege trust binding restricting which CI-issued tokens
//!   may assume the identity
//!
//! ## Architecture
//!
//! The system is built around two pure engines:
//!
//! 1. **Conflict analysis**: live cloud state is diffed against the
//!    desired configuration; every discrepancy is classified by risk and
//!    annotated with ranked remediation options instead of being blindly
//!    overwritten.
//! 2. **Policy compilation**: the declarative trust policy (repository,
//!    branch/tag allow-lists, pull-request admission, actor and workflow
//!    checks) is compiled into an attribute mapping and a single CEL
//!    condition evaluated at token-exchange time.
//!
//! ## Modules
//!
//! - [`config`]: Configuration parsing, validation, and default tables
//! - [`policy`]: Trust policy compilation (attribute mapping + condition)
//! - [`analyzer`]: Conflict analysis and resolution advice
//! - [`backend`]: Identity backend trait and Google Cloud REST adapter
//! - [`reconciler`]: Reconciliation pipeline
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! project:
//!   id: acme-prod
//!   number: "123456789012"
//!
//! service_account:
//!   account_id: github-deployer
//!   roles:
//!     - roles/run.admin
//!
//! trust:
//!   repository: acme/api
//!   allowed_branches: [main]
//!   block_forked_repos: true
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod analyzer;
pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod policy;
pub mod reconciler;

// ============================================================================
// Re-exports
// ============================================================================

pub use analyzer::{
    AggregateConflictResult, ConflictAnalyzer, ConflictReport, DesiredResource, FieldDifference,
    ResolutionAdvisor, ResolutionStrategy, ResolutionSuggestion, ResourceKind, Severity,
};
pub use backend::{GcloudBackend, IdentityBackend, LifecycleState, LiveResource};
pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigParser, ConfigValidator, FederationConfig, TrustPolicy};
pub use error::{Result, TrustForgeError};
pub use policy::{AttributeMapping, CompiledPolicy, PolicyCompiler, PolicyHasher};
pub use reconciler::{ApplyResult, Reconciler};
