//! HTTP summarizer adapter.
//!
//! Posts the transcript to an OpenAI-compatible chat-completions endpoint.
//! HTTP status maps onto the failure taxonomy: connection refused means the
//! collaborator is down (`ExternalUnavailable`), 429/5xx are `Transient`,
//! other 4xx mean the request itself is bad (`InputInvalid`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::error::StageError;

use super::Summarizer;

const SUMMARY_PROMPT: &str = "Summarize this meeting transcript. Include: key decisions, \
action items with owners, and open questions. Be concise.";

/// Chat-completions summarizer client
pub struct HttpSummarizer {
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl HttpSummarizer {
    pub fn new(endpoint: String, api_key: String) -> Self {
        Self {
            endpoint,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn classify(err: reqwest::Error) -> StageError {
        if err.is_connect() {
            StageError::ExternalUnavailable(format!("summarizer unreachable: {err}"))
        } else {
            StageError::Transient(format!("summarizer request failed: {err}"))
        }
    }
}

#[async_trait]
impl Summarizer for HttpSummarizer {
    async fn summarize(&self, transcript: &str, model_profile: &str) -> Result<String, StageError> {
        if transcript.trim().is_empty() {
            return Err(StageError::InputInvalid("empty transcript".to_string()));
        }

        let request = ChatRequest {
            model: model_profile,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SUMMARY_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: transcript,
                },
            ],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(Self::classify)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("summarizer returned {}: {}", status, body.trim());

            return Err(if status.as_u16() == 429 || status.is_server_error() {
                StageError::Transient(message)
            } else {
                StageError::InputInvalid(message)
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| StageError::Transient(format!("summarizer response parse: {e}")))?;

        let summary = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        if summary.trim().is_empty() {
            return Err(StageError::Transient(
                "summarizer returned no choices".to_string(),
            ));
        }

        Ok(summary)
    }
}
