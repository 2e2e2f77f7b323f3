//! Bearer-token middleware
//!
//! When a validator is configured, every route except `/health` requires a
//! valid `Authorization: Bearer` token. Validated claims are injected into
//! request extensions for the handlers. Rejections are a uniform 401 with a
//! `WWW-Authenticate` challenge; the reason stays in server logs.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{debug, warn};

use crate::auth::TokenValidator;

/// Paths reachable without a token
const PUBLIC_PATHS: &[&str] = &["/health"];

fn is_public_path(path: &str) -> bool {
    PUBLIC_PATHS.contains(&path)
}

/// Authentication middleware
pub async fn auth_middleware(
    State(validator): State<Option<Arc<TokenValidator>>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    // No validator configured: enforcement is off, requests pass anonymously
    let Some(validator) = validator else {
        return next.run(request).await;
    };

    let path = request.uri().path().to_string();

    if is_public_path(&path) {
        debug!(path = %path, "Public path, skipping auth");
        return next.run(request).await;
    }

    let token = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            v.strip_prefix("Bearer ")
                .or_else(|| v.strip_prefix("bearer "))
        });

    let Some(token) = token else {
        warn!(path = %path, "Missing Authorization header");
        return unauthorized_response();
    };

    match validator.validate(token).await {
        Ok(claims) => {
            debug!(subject = %claims.subject, path = %path, "Authenticated request");
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(e) => {
            // Log the precise reason; the caller only sees a generic 401
            warn!(path = %path, error = %e, "Rejected bearer token");
            unauthorized_response()
        }
    }
}

/// Create a 401 Unauthorized response
fn unauthorized_response() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [("WWW-Authenticate", "Bearer")],
        Json(json!({ "error": "invalid or missing bearer token" })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_is_the_only_public_path() {
        assert!(is_public_path("/health"));
        assert!(!is_public_path("/"));
        assert!(!is_public_path("/healthz"));
        assert!(!is_public_path("/codebase/health"));
    }

    #[test]
    fn unauthorized_response_carries_challenge() {
        let response = unauthorized_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get("WWW-Authenticate").unwrap(),
            "Bearer"
        );
    }
}
