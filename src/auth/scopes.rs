//! Scope-based project authorization
//!
//! Access is granted when the token's scope set is a superset of the
//! globally required scopes, or when it carries the per-project scope for
//! the requested project. The per-project scope string is built by
//! [`ScopePattern`], a pure formatting function kept separate from the
//! decision logic so the naming convention can change independently.

use std::collections::BTreeSet;

use super::validator::TokenClaims;
use crate::config::OAuthConfig;

/// Authorization failure. Surfaces as HTTP 403.
#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    /// Token valid, scopes insufficient
    #[error("insufficient scope")]
    Denied,
}

/// Per-project scope naming convention: `{prefix}{project}{suffix}`.
#[derive(Debug, Clone)]
pub struct ScopePattern {
    prefix: String,
    suffix: String,
}

impl ScopePattern {
    /// Create a pattern from its fixed prefix and suffix.
    #[must_use]
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    /// Build the scope string for a project.
    #[must_use]
    pub fn for_project(&self, project: &str) -> String {
        format!("{}{}{}", self.prefix, project, self.suffix)
    }
}

/// Scopes required for access plus the per-project naming convention.
#[derive(Debug, Clone)]
pub struct ScopeRequirement {
    /// Scopes that grant access to every project
    pub required: BTreeSet<String>,
    /// Per-project scope pattern
    pub pattern: ScopePattern,
}

/// Authorization strategy, selected once at startup.
///
/// The disabled-OAuth mode is a deliberate whole-strategy bypass rather
/// than a conditional inside the scope check, so it cannot be applied
/// partially.
#[derive(Debug, Clone)]
pub enum Authorizer {
    /// OAuth enforcement disabled: every request is allowed
    AlwaysAllow,
    /// Scope-checked access
    ScopeChecked(ScopeRequirement),
}

impl Authorizer {
    /// Select the strategy from the OAuth configuration.
    #[must_use]
    pub fn from_config(config: &OAuthConfig) -> Self {
        if !config.enabled {
            return Self::AlwaysAllow;
        }
        Self::ScopeChecked(ScopeRequirement {
            required: config.required_scopes.iter().cloned().collect(),
            pattern: ScopePattern::new(
                config.project_scope_prefix.clone(),
                config.project_scope_suffix.clone(),
            ),
        })
    }

    /// Decide whether the claims grant access to `project`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::Denied`] when neither the global scopes nor
    /// the per-project scope are present.
    pub fn authorize(
        &self,
        claims: Option<&TokenClaims>,
        project: Option<&str>,
    ) -> Result<(), AuthzError> {
        let requirement = match self {
            Self::AlwaysAllow => return Ok(()),
            Self::ScopeChecked(requirement) => requirement,
        };

        let Some(claims) = claims else {
            return Err(AuthzError::Denied);
        };

        if claims.has_all(&requirement.required) {
            return Ok(());
        }

        if let Some(project) = project.filter(|p| !p.is_empty()) {
            if claims
                .scopes
                .contains(&requirement.pattern.for_project(project))
            {
                return Ok(());
            }
        }

        Err(AuthzError::Denied)
    }
}
