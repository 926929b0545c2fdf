//! Conflict analysis and resolution advice.
//!
//! This module contains the pure reconciliation core: the conflict
//! analyzer diffing desired configuration against live snapshots, and the
//! resolution advisor turning differences into ranked remediation options.

mod advisor;
mod conflict;

pub use advisor::{
    AggregateConflictResult, ResolutionAdvisor, ResolutionStrategy, ResolutionSuggestion,
};
pub use conflict::{
    ConflictAnalyzer, ConflictReport, DesiredResource, FieldDifference, ResourceKind, Severity,
};
