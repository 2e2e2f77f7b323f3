//! Deepview Gateway Library
//!
//! HTTP gateway that answers natural-language questions about a packed
//! codebase corpus via an LLM answer engine.
//!
//! # Features
//!
//! - **Corpus resolution**: deterministic project-to-file lookup across
//!   mounted, local, and application roots
//! - **Content caching**: corpus files read once and reused until they
//!   change on disk
//! - **OAuth2 bearer tokens**: JWT validation against the identity
//!   provider's JWKS, with scope-based per-project authorization
//! - **Production ready**: health check, structured logging, graceful
//!   shutdown

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod cli;
pub mod config;
pub mod corpus;
pub mod error;
pub mod llm;
pub mod server;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
