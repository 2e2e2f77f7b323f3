//! HTTP router and handlers

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::{
    catch_panic::CatchPanicLayer, compression::CompressionLayer, timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

use super::auth::auth_middleware;
use crate::{
    auth::{Authorizer, AuthzError, TokenClaims, TokenValidator},
    corpus::{CorpusCache, LoadError, ProjectResolver, ResolveError},
    llm::{AnswerEngine, AskError},
};

/// Shared application state
pub struct AppState {
    /// Scope-based authorization policy
    pub authorizer: Authorizer,
    /// Token validator; `None` when enforcement is disabled
    pub validator: Option<Arc<TokenValidator>>,
    /// Project-to-corpus-file resolver
    pub resolver: ProjectResolver,
    /// Corpus content cache
    pub corpus: Arc<CorpusCache>,
    /// Answer engine
    pub engine: Arc<dyn AnswerEngine>,
}

/// Query string accepted by the analysis routes
#[derive(Debug, Deserialize)]
pub struct QueryParams {
    /// Question to answer about the corpus
    pub question: String,
    /// Optional corpus filename override within the project directory
    pub filename: Option<String>,
}

/// Successful analysis response body
#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    /// Project the answer is about
    pub project: String,
    /// Corpus file the answer was grounded in
    pub codebase_file: String,
    /// The question as asked
    pub question: String,
    /// Model answer
    pub answer: String,
    /// Model that produced the answer
    pub model: String,
}

/// Analysis pipeline failure, ordered by pipeline stage
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// Caller lacks the required scopes
    #[error(transparent)]
    Forbidden(#[from] AuthzError),
    /// No corpus file could be resolved
    #[error(transparent)]
    Resolution(#[from] ResolveError),
    /// Corpus file could not be read
    #[error(transparent)]
    Load(#[from] LoadError),
    /// Answer engine failure
    #[error(transparent)]
    Ask(#[from] AskError),
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "insufficient scope".to_string()),
            // Resolution errors name the searched locations to help callers
            Self::Resolution(e) => (StatusCode::NOT_FOUND, e.to_string()),
            Self::Load(e) => {
                error!(error = %e, "Corpus load failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
            Self::Ask(e) => {
                error!(error = %e, "Answer engine failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "answer engine unavailable".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Create the router
///
/// `request_timeout` bounds the whole request, including the outbound
/// model call.
pub fn create_router(state: Arc<AppState>, request_timeout: Duration) -> Router {
    let validator = state.validator.clone();

    Router::new()
        .route("/health", get(health_handler))
        .route("/", get(default_query_handler))
        .route("/{project}", get(project_query_handler))
        .route("/codebase/{project}", get(project_query_handler))
        // Authentication middleware (applied before other layers)
        .layer(middleware::from_fn_with_state(validator, auth_middleware))
        .layer(CatchPanicLayer::new())
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "deepview-gateway",
        "model": state.engine.model(),
    }))
}

/// Query against the default corpus loaded at startup
async fn default_query_handler(
    State(state): State<Arc<AppState>>,
    claims: Option<Extension<TokenClaims>>,
    Query(params): Query<QueryParams>,
) -> Result<Json<AnalyzeResponse>, GateError> {
    answer_query(&state, claims.as_deref(), None, &params).await
}

/// Query against a named project's corpus
async fn project_query_handler(
    State(state): State<Arc<AppState>>,
    Path(project): Path<String>,
    claims: Option<Extension<TokenClaims>>,
    Query(params): Query<QueryParams>,
) -> Result<Json<AnalyzeResponse>, GateError> {
    answer_query(&state, claims.as_deref(), Some(&project), &params).await
}

/// Shared pipeline: authorize, resolve, load, ask.
async fn answer_query(
    state: &AppState,
    claims: Option<&TokenClaims>,
    project: Option<&str>,
    params: &QueryParams,
) -> Result<Json<AnalyzeResponse>, GateError> {
    let request_id = Uuid::new_v4();
    let label = project.unwrap_or("default");
    let span = info_span!("query", %request_id, project = label);

    async {
        state.authorizer.authorize(claims, project)?;

        let filename = params.filename.as_deref().filter(|f| !f.is_empty());
        let resolved = state.resolver.resolve(project, filename)?;
        info!(
            path = %resolved.path.display(),
            method = ?resolved.method,
            "Resolved corpus file"
        );

        let content = state.corpus.load(&resolved).await?;
        let answer = state
            .engine
            .ask(label, &params.question, &content)
            .await?;

        Ok(Json(AnalyzeResponse {
            project: label.to_string(),
            codebase_file: resolved.path.display().to_string(),
            question: params.question.clone(),
            answer,
            model: state.engine.model().to_string(),
        }))
    }
    .instrument(span)
    .await
}
