//! HTTP server wiring
//!
//! Assembles the auth, corpus, and answer-engine components from
//! configuration and runs the axum server with graceful shutdown.

mod auth;
mod router;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use crate::{
    Error, Result,
    auth::{Authorizer, KeySetCache, TokenValidator, default_jwks_uri},
    config::Config,
    corpus::{CorpusCache, ProjectResolver},
    llm::{AnswerEngine, GeminiClient},
};

pub use router::{AnalyzeResponse, AppState, GateError, QueryParams, create_router};

/// The gateway server
pub struct Server {
    config: Config,
}

impl Server {
    /// Create a server from configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Build state, bind, and serve until a shutdown signal arrives.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid configuration, an unloadable startup
    /// corpus file, or a bind failure.
    pub async fn run(self) -> Result<()> {
        let state = self.build_state().await?;
        let app = create_router(state, self.config.server.request_timeout);

        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = TcpListener::bind(&addr).await?;
        info!("Gateway listening on {addr}");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Server stopped");
        Ok(())
    }

    async fn build_state(&self) -> Result<Arc<AppState>> {
        let oauth = &self.config.oauth;

        let validator = if oauth.enabled {
            if oauth.issuer.is_empty() {
                return Err(Error::Config(
                    "oauth.issuer is required when oauth.enabled is true".to_string(),
                ));
            }
            if oauth.audience.is_empty() {
                return Err(Error::Config(
                    "oauth.audience is required when oauth.enabled is true".to_string(),
                ));
            }
            let jwks_uri = oauth
                .jwks_uri
                .clone()
                .unwrap_or_else(|| default_jwks_uri(&oauth.issuer));
            info!(issuer = %oauth.issuer, jwks_uri = %jwks_uri, "Bearer-token enforcement enabled");
            let keys = Arc::new(KeySetCache::new(jwks_uri, oauth.jwks_ttl));
            Some(Arc::new(TokenValidator::new(oauth, keys)?))
        } else {
            warn!("OAuth is disabled; all requests are served unauthenticated");
            None
        };

        let mut resolver = ProjectResolver::new(&self.config.corpus);
        let corpus = Arc::new(CorpusCache::new(self.config.corpus.max_entries));

        if let Some(ref path) = self.config.corpus.default_file {
            let resolved = resolver
                .resolve_startup_file(path)
                .map_err(|e| Error::Config(e.to_string()))?;
            // Load eagerly so a broken default fails startup, not requests
            let content = corpus
                .load(&resolved)
                .await
                .map_err(|e| Error::Config(e.to_string()))?;
            info!(
                path = %resolved.path.display(),
                size = content.len(),
                "Loaded default corpus file"
            );
            resolver.set_default(resolved);
        }

        let engine = Arc::new(GeminiClient::new(&self.config.gemini)?);
        info!(model = %engine.model(), "Answer engine ready");

        Ok(Arc::new(AppState {
            authorizer: Authorizer::from_config(oauth),
            validator,
            resolver,
            corpus,
            engine,
        }))
    }
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
