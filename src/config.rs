//! Configuration management

use std::{env, path::Path, path::PathBuf, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Loaded in order, later files override earlier. Files that don't
    /// exist are silently skipped.
    #[serde(default)]
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// OAuth2 / OIDC configuration
    pub oauth: OAuthConfig,
    /// Corpus resolution configuration
    pub corpus: CorpusConfig,
    /// Gemini answer engine configuration
    pub gemini: GeminiConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Request timeout (covers the outbound LLM call)
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8019,
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// OAuth2 bearer-token enforcement configuration
///
/// When `enabled` is false the gateway runs in always-allow mode and never
/// contacts the identity provider. The health endpoint is public either way.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// Enable bearer-token enforcement
    pub enabled: bool,
    /// Expected `iss` claim (identity provider URL)
    pub issuer: String,
    /// Expected `aud` claim (this API's identifier)
    pub audience: String,
    /// Explicit JWKS URL. When absent, derived from the issuer via OIDC
    /// discovery conventions.
    pub jwks_uri: Option<String>,
    /// Allowed JWT signing algorithms
    pub allowed_algorithms: Vec<String>,
    /// Scopes that grant access to every project
    pub required_scopes: Vec<String>,
    /// Per-project scope prefix (`{prefix}{project}{suffix}`)
    pub project_scope_prefix: String,
    /// Per-project scope suffix
    pub project_scope_suffix: String,
    /// Clock-skew tolerance for `exp`/`nbf` checks, in seconds
    pub clock_skew_secs: u64,
    /// How long a fetched JWKS is trusted before a reader-triggered refresh
    #[serde(with = "humantime_serde")]
    pub jwks_ttl: Duration,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            issuer: String::new(),
            audience: String::new(),
            jwks_uri: None,
            allowed_algorithms: vec!["RS256".to_string()],
            required_scopes: vec!["deepview:read".to_string()],
            project_scope_prefix: "deepview:project:".to_string(),
            project_scope_suffix: String::new(),
            clock_skew_secs: 60,
            jwks_ttl: Duration::from_secs(3600),
        }
    }
}

/// Corpus resolution configuration
///
/// The three roots mirror the deployment layout: a mounted codebase volume,
/// a relative codebase directory for local runs, and the application root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// Mounted codebase root (projects live in subdirectories)
    pub mount_root: PathBuf,
    /// Local relative codebase directory
    pub local_root: PathBuf,
    /// Application root directory
    pub app_root: PathBuf,
    /// Corpus file loaded at startup and served by the query-only route
    pub default_file: Option<PathBuf>,
    /// Optional cache capacity; when set, least-recently-used entries are
    /// evicted past this bound
    pub max_entries: Option<usize>,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            mount_root: PathBuf::from("/app/codebase"),
            local_root: PathBuf::from("codebase"),
            app_root: PathBuf::from("/app"),
            default_file: None,
            max_entries: None,
        }
    }
}

/// Gemini answer engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    /// Model name
    pub model: String,
    /// API key. Supports a literal value or `env:VAR_NAME` indirection;
    /// falls back to the `GEMINI_API_KEY` environment variable.
    pub api_key: Option<String>,
    /// API base URL
    pub endpoint: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            api_key: None,
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }
}

impl GeminiConfig {
    /// Resolve the API key (expand `env:VAR` indirection)
    #[must_use]
    pub fn resolve_api_key(&self) -> Option<String> {
        match self.api_key.as_deref() {
            Some(key) => {
                if let Some(var_name) = key.strip_prefix("env:") {
                    env::var(var_name).ok()
                } else {
                    Some(key.to_string())
                }
            }
            None => env::var("GEMINI_API_KEY").ok(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (DEEPVIEW_ prefix)
        figment = figment.merge(Env::prefixed("DEEPVIEW_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.load_env_files();

        Ok(config)
    }

    /// Load environment files into the process environment.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let path = Path::new(path_str);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => {
                        tracing::info!("Loaded env file: {path_str}");
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load env file {path_str}: {e}");
                    }
                }
            } else {
                tracing::debug!("Env file not found (skipped): {path_str}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_surface() {
        let config = Config::default();

        assert_eq!(config.server.port, 8019);
        assert!(!config.oauth.enabled);
        assert_eq!(config.oauth.allowed_algorithms, vec!["RS256"]);
        assert_eq!(config.oauth.required_scopes, vec!["deepview:read"]);
        assert_eq!(config.oauth.project_scope_prefix, "deepview:project:");
        assert_eq!(config.oauth.clock_skew_secs, 60);
        assert_eq!(config.corpus.mount_root, PathBuf::from("/app/codebase"));
        assert_eq!(config.gemini.model, "gemini-2.5-flash");
        assert!(config.corpus.max_entries.is_none());
    }

    #[test]
    fn load_missing_config_file_errors() {
        let err = Config::load(Some(Path::new("/nonexistent/gateway.yaml"))).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn api_key_literal_passthrough() {
        let gemini = GeminiConfig {
            api_key: Some("literal-key".to_string()),
            ..GeminiConfig::default()
        };
        assert_eq!(gemini.resolve_api_key(), Some("literal-key".to_string()));
    }

    #[test]
    fn api_key_env_indirection() {
        // PATH is always present, making the expansion observable without
        // mutating the process environment.
        let gemini = GeminiConfig {
            api_key: Some("env:PATH".to_string()),
            ..GeminiConfig::default()
        };
        let resolved = gemini.resolve_api_key().unwrap();
        assert_eq!(resolved, env::var("PATH").unwrap());
    }

    #[test]
    fn api_key_env_indirection_missing_var() {
        let gemini = GeminiConfig {
            api_key: Some("env:DEEPVIEW_NO_SUCH_VAR_12345".to_string()),
            ..GeminiConfig::default()
        };
        assert_eq!(gemini.resolve_api_key(), None);
    }
}
