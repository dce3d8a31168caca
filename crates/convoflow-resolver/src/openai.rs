use std::fmt;

use async_trait::async_trait;
use convoflow_types::{ConvoflowError, Resolution, Result};
use serde_json::json;

use crate::retry::{with_retry, BackoffPolicy};
use crate::TransitionResolver;

const PROVIDER: &str = "openai";

// ---------------------------------------------------------------------------
// OpenAiResolver
// ---------------------------------------------------------------------------

/// Classifies input with an OpenAI-compatible `/v1/chat/completions` endpoint.
///
/// The model is asked to answer with one of the candidate keywords verbatim.
/// Answers are matched case-insensitively; anything else is `NoDecision`.
pub struct OpenAiResolver {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
    model: String,
    max_retries: usize,
    backoff: BackoffPolicy,
}

impl fmt::Debug for OpenAiResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiResolver")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl OpenAiResolver {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_retries: 2,
            backoff: BackoffPolicy::default(),
        }
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    pub fn with_retries(mut self, max_retries: usize, backoff: BackoffPolicy) -> Self {
        self.max_retries = max_retries;
        self.backoff = backoff;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request_body(&self, input: &str, candidates: &[String]) -> serde_json::Value {
        json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                { "role": "system", "content": system_prompt(candidates) },
                { "role": "user", "content": input },
            ],
        })
    }

    async fn complete(&self, body: &serde_json::Value) -> Result<String> {
        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| ConvoflowError::ClassifierError {
                provider: PROVIDER.into(),
                status: 0,
                message: e.to_string(),
                retryable: true,
            })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| ConvoflowError::ClassifierError {
            provider: PROVIDER.into(),
            status: 0,
            message: e.to_string(),
            retryable: true,
        })?;

        if !status.is_success() {
            return Err(map_error(status, &text));
        }

        let value: serde_json::Value = serde_json::from_str(&text)?;
        parse_answer(&value)
    }
}

fn system_prompt(candidates: &[String]) -> String {
    let mut prompt = String::from(
        "You route callers through an automated phone menu. \
         Classify the caller's message as exactly one of these options:\n",
    );
    for c in candidates {
        prompt.push_str("- ");
        prompt.push_str(c);
        prompt.push('\n');
    }
    prompt.push_str(
        "Reply with the option text only, exactly as written. \
         If none of the options fit, reply with NONE.",
    );
    prompt
}

fn parse_answer(body: &serde_json::Value) -> Result<String> {
    body["choices"][0]["message"]["content"]
        .as_str()
        .map(String::from)
        .ok_or_else(|| ConvoflowError::ClassifierError {
            provider: PROVIDER.into(),
            status: 200,
            message: "response had no message content".into(),
            retryable: false,
        })
}

/// Map a free-text model answer onto one of `candidates`.
fn match_answer(answer: &str, candidates: &[String]) -> Resolution {
    let cleaned = answer
        .trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '.'))
        .trim();
    candidates
        .iter()
        .find(|c| c.eq_ignore_ascii_case(cleaned))
        .map(|c| Resolution::Keyword(c.clone()))
        .unwrap_or(Resolution::NoDecision)
}

fn map_error(status: reqwest::StatusCode, body: &str) -> ConvoflowError {
    let status_u16 = status.as_u16();
    match status_u16 {
        429 => {
            let retry_ms = serde_json::from_str::<serde_json::Value>(body)
                .ok()
                .and_then(|v| v["error"]["retry_after"].as_f64())
                .map(|s| (s * 1000.0) as u64)
                .unwrap_or(1000);
            ConvoflowError::RateLimited {
                provider: PROVIDER.into(),
                retry_after_ms: retry_ms,
            }
        }
        401 | 403 => ConvoflowError::AuthError {
            provider: PROVIDER.into(),
        },
        500 | 502 | 503 | 504 => ConvoflowError::ClassifierError {
            provider: PROVIDER.into(),
            status: status_u16,
            message: extract_error_message(body),
            retryable: true,
        },
        _ => ConvoflowError::ClassifierError {
            provider: PROVIDER.into(),
            status: status_u16,
            message: extract_error_message(body),
            retryable: false,
        },
    }
}

fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.to_string())
}

// ---------------------------------------------------------------------------
// TransitionResolver implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl TransitionResolver for OpenAiResolver {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn classify(&self, input: &str, candidates: &[String]) -> Result<Resolution> {
        let body = self.build_request_body(input, candidates);
        let answer = with_retry(
            || self.complete(&body),
            self.max_retries,
            &self.backoff,
            "openai classify",
        )
        .await?;

        let resolution = match_answer(&answer, candidates);
        tracing::info!(input, answer = %answer.trim(), resolution = ?resolution, model = %self.model, "OpenAI classification");
        Ok(resolution)
    }
}
