//! Live resource snapshot types.
//!
//! These types represent the observed state of federation resources on the
//! cloud provider. Snapshots are read-only, fetched on demand, and never
//! cached across reconciliation runs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::policy::AttributeMapping;

/// Lifecycle state of a live resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    /// Resource is active and usable.
    #[default]
    Active,
    /// Resource is soft-deleted and pending purge.
    Deleted,
    /// Resource reported a state this version does not know.
    Unknown,
}

impl LifecycleState {
    /// Parses a state string as reported by the API.
    #[must_use]
    pub fn parse(state: &str) -> Self {
        match state {
            "ACTIVE" | "STATE_ACTIVE" => Self::Active,
            "DELETED" | "STATE_DELETED" => Self::Deleted,
            _ => Self::Unknown,
        }
    }

    /// Returns true if the resource is active.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Active => "ACTIVE",
            Self::Deleted => "DELETED",
            Self::Unknown => "UNKNOWN",
        };
        write!(f, "{s}")
    }
}

/// Snapshot of what currently exists for a given resource ID.
#[derive(Debug, Clone, Serialize)]
pub struct LiveResource {
    /// Whether the resource exists at all.
    pub exists: bool,
    /// Resource ID the snapshot was taken for.
    pub resource_id: String,
    /// Human-readable display name.
    pub display_name: Option<String>,
    /// Free-text description.
    pub description: Option<String>,
    /// Lifecycle state.
    pub state: LifecycleState,
    /// Whether the resource is disabled.
    pub disabled: bool,
    /// Roles currently granted (service identities only).
    pub roles: Vec<String>,
    /// OIDC issuer URI (providers only).
    pub issuer_uri: Option<String>,
    /// Attribute condition currently enforced (providers only).
    pub attribute_condition: Option<String>,
    /// Attribute mapping currently configured (providers only).
    pub attribute_mapping: HashMap<String, String>,
    /// When the resource was created, if the API reports it.
    pub created_at: Option<DateTime<Utc>>,
}

impl LiveResource {
    /// Creates a snapshot for a resource that does not exist.
    #[must_use]
    pub fn absent(resource_id: impl Into<String>) -> Self {
        Self {
            exists: false,
            resource_id: resource_id.into(),
            display_name: None,
            description: None,
            state: LifecycleState::Active,
            disabled: false,
            roles: Vec::new(),
            issuer_uri: None,
            attribute_condition: None,
            attribute_mapping: HashMap::new(),
            created_at: None,
        }
    }

    /// Creates a snapshot for an existing, active resource.
    #[must_use]
    pub fn existing(resource_id: impl Into<String>) -> Self {
        Self {
            exists: true,
            ..Self::absent(resource_id)
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the lifecycle state.
    #[must_use]
    pub const fn with_state(mut self, state: LifecycleState) -> Self {
        self.state = state;
        self
    }

    /// Sets the disabled flag.
    #[must_use]
    pub const fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Sets the granted roles.
    #[must_use]
    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = roles;
        self
    }

    /// Sets the issuer URI.
    #[must_use]
    pub fn with_issuer_uri(mut self, issuer_uri: impl Into<String>) -> Self {
        self.issuer_uri = Some(issuer_uri.into());
        self
    }

    /// Sets the attribute condition.
    #[must_use]
    pub fn with_attribute_condition(mut self, condition: impl Into<String>) -> Self {
        self.attribute_condition = Some(condition.into());
        self
    }
}

/// Write-side payload for creating a pool provider.
///
/// Assembled by the reconciler from the desired provider configuration and
/// the compiled trust policy.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderSpec {
    /// Provider ID.
    pub id: String,
    /// Human-readable display name.
    pub display_name: Option<String>,
    /// OIDC issuer URI.
    pub issuer_uri: String,
    /// Allowed audiences. Empty means the provider default audience.
    pub audiences: Vec<String>,
    /// Claim-to-attribute mapping.
    pub attribute_mapping: AttributeMapping,
    /// Compiled attribute condition gating token exchange.
    pub attribute_condition: String,
}

/// Write-side payload for the trust binding between a federated principal
/// and the service identity.
#[derive(Debug, Clone, Serialize)]
pub struct TrustBinding {
    /// Principal set member admitted by the binding.
    pub member: String,
    /// Role granted to the member.
    pub role: String,
    /// Compiled trust expression, passed through unmodified.
    pub condition: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_state_parse() {
        assert_eq!(LifecycleState::parse("ACTIVE"), LifecycleState::Active);
        assert_eq!(LifecycleState::parse("DELETED"), LifecycleState::Deleted);
        assert_eq!(LifecycleState::parse("weird"), LifecycleState::Unknown);
        assert!(LifecycleState::Active.is_active());
        assert!(!LifecycleState::Deleted.is_active());
    }

    #[test]
    fn test_absent_snapshot() {
        let live = LiveResource::absent("github-pool");
        assert!(!live.exists);
        assert_eq!(live.resource_id, "github-pool");
        assert!(live.roles.is_empty());
    }

    #[test]
    fn test_builder_chain() {
        let live = LiveResource::existing("github-provider")
            .with_display_name("GitHub OIDC")
            .with_state(LifecycleState::Deleted)
            .with_disabled(true);
        assert!(live.exists);
        assert_eq!(live.display_name.as_deref(), Some("GitHub OIDC"));
        assert_eq!(live.state, LifecycleState::Deleted);
        assert!(live.disabled);
    }
}
