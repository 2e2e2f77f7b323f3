//! Answer engine
//!
//! The query pipeline talks to the model through the [`AnswerEngine`] trait
//! so tests can substitute a canned engine. The production implementation is
//! [`GeminiClient`], a thin REST client for the Gemini `generateContent`
//! endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::GeminiConfig;

const SYSTEM_PROMPT: &str = "You are a diligent programming assistant analyzing code. Your task is to \
     answer questions about the provided code repository accurately and in detail. \
     Always include specific references to files, functions, and class names in your \
     responses. At the end, list related files, functions, and classes that could be \
     potentially relevant to the question, explaining their relevance.";

/// Answer generation failure. Surfaces as HTTP 502; details stay server-side.
#[derive(Debug, thiserror::Error)]
pub enum AskError {
    /// Transport-level failure reaching the model API
    #[error("model request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Non-success status from the model API
    #[error("model API returned status {status}: {body}")]
    Status {
        /// HTTP status code
        status: reqwest::StatusCode,
        /// Response body, for server-side logs only
        body: String,
    },
    /// Structurally valid response with no answer text
    #[error("model returned an empty response")]
    EmptyResponse,
}

/// Something that can answer a question about a corpus.
#[async_trait]
pub trait AnswerEngine: Send + Sync {
    /// Produce an answer to `question` grounded in `corpus`.
    async fn ask(&self, project: &str, question: &str, corpus: &str) -> Result<String, AskError>;

    /// Model identifier reported in responses and health checks.
    fn model(&self) -> &str;
}

/// Gemini `generateContent` client.
pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

impl GeminiClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns a config error when no API key can be resolved.
    pub fn new(config: &GeminiConfig) -> crate::Result<Self> {
        let api_key = config.resolve_api_key().ok_or_else(|| {
            crate::Error::Config(
                "No Gemini API key configured (set gemini.api_key or GEMINI_API_KEY)".to_string(),
            )
        })?;

        Ok(Self {
            http: reqwest::Client::new(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }
}

fn user_prompt(project: &str, question: &str, corpus: &str) -> String {
    format!(
        "\nBelow is the content of a code repository for project '{project}'. \n\
         Please answer the following question about the code:\n\n\
         <QUESTION>\n{question}\n</QUESTION>\n\n\
         <CODE_REPOSITORY>\n```\n{corpus}\n```\n</CODE_REPOSITORY>"
    )
}

fn extract_answer(response: GenerateResponse) -> Result<String, AskError> {
    let text = response
        .candidates
        .into_iter()
        .next()
        .map(|candidate| {
            candidate
                .content
                .parts
                .into_iter()
                .map(|part| part.text)
                .collect::<String>()
        })
        .unwrap_or_default();

    if text.is_empty() {
        return Err(AskError::EmptyResponse);
    }
    Ok(text)
}

#[async_trait]
impl AnswerEngine for GeminiClient {
    async fn ask(&self, project: &str, question: &str, corpus: &str) -> Result<String, AskError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.endpoint, self.model
        );
        let prompt = user_prompt(project, question, corpus);
        let request = GenerateRequest {
            system_instruction: Content {
                parts: vec![Part {
                    text: SYSTEM_PROMPT,
                }],
            },
            contents: vec![Content {
                parts: vec![Part { text: &prompt }],
            }],
        };

        info!(project, model = %self.model, corpus_size = corpus.len(), "Querying model");

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AskError::Status { status, body });
        }

        let parsed: GenerateResponse = response.json().await?;
        let answer = extract_answer(parsed)?;
        debug!(project, answer_len = answer.len(), "Model answered");
        Ok(answer)
    }

    fn model(&self) -> &str {
        &self.model
    }
}
