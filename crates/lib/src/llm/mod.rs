//! LLM backend abstraction and the provider clients behind it.
//!
//! Every provider answers one question: given a prompt, what text did the model
//! generate? Transport failures, non-2xx statuses, provider error fields and
//! empty answers all surface as [`BackendError`], never as empty text.

mod huggingface;
mod local;
mod ollama;

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

pub use huggingface::HuggingFaceClient;
pub use local::LocalClient;
pub use ollama::OllamaClient;

/// Bound on every backend HTTP call, connect through body.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("{backend} request failed: {source}")]
    Request {
        backend: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{backend} api error: {status} {message}")]
    Status {
        backend: &'static str,
        status: reqwest::StatusCode,
        message: String,
    },
    #[error("{backend} error: {message}")]
    Provider {
        backend: &'static str,
        message: String,
    },
    #[error("{backend} returned an unreadable response: {message}")]
    Decode {
        backend: &'static str,
        message: String,
    },
    #[error("no response from {backend}")]
    Empty { backend: &'static str },
}

/// Sends a prompt to one AI service and returns the raw generated text.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Short provider name used in logs and errors (e.g. "ollama").
    fn name(&self) -> &'static str;

    async fn send(&self, prompt: &str) -> Result<String, BackendError>;
}

/// The supported providers. Adding a provider means adding an arm here.
#[derive(Clone)]
pub enum Backend {
    Ollama(OllamaClient),
    HuggingFace(HuggingFaceClient),
    Local(LocalClient),
}

#[async_trait]
impl LlmBackend for Backend {
    fn name(&self) -> &'static str {
        match self {
            Backend::Ollama(c) => c.name(),
            Backend::HuggingFace(c) => c.name(),
            Backend::Local(c) => c.name(),
        }
    }

    async fn send(&self, prompt: &str) -> Result<String, BackendError> {
        match self {
            Backend::Ollama(c) => c.send(prompt).await,
            Backend::HuggingFace(c) => c.send(prompt).await,
            Backend::Local(c) => c.send(prompt).await,
        }
    }
}

/// `{ "response": "...", "error": "..." }` envelope shared by Ollama and generic local servers.
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl GenerateResponse {
    fn into_text(self, backend: &'static str) -> Result<String, BackendError> {
        if let Some(message) = self.error.filter(|e| !e.trim().is_empty()) {
            return Err(BackendError::Provider { backend, message });
        }
        non_empty(backend, self.response)
    }
}

/// Send a prepared request under [`REQUEST_TIMEOUT`] and decode a 2xx JSON body as `T`.
/// Non-2xx bodies are reported with the provider's `error` field when one is present.
async fn send_json<T: DeserializeOwned>(
    backend: &'static str,
    req: reqwest::RequestBuilder,
) -> Result<T, BackendError> {
    let res = req
        .timeout(REQUEST_TIMEOUT)
        .send()
        .await
        .map_err(|source| BackendError::Request { backend, source })?;
    let status = res.status();
    let body = res
        .text()
        .await
        .map_err(|source| BackendError::Request { backend, source })?;
    if !status.is_success() {
        let message = error_field(&body).unwrap_or_else(|| body.trim().to_string());
        return Err(BackendError::Status {
            backend,
            status,
            message,
        });
    }
    serde_json::from_str(&body).map_err(|e| BackendError::Decode {
        backend,
        message: e.to_string(),
    })
}

/// `error` as a string, or `error.message`, from a JSON body.
fn error_field(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let err = value.get("error")?;
    err.as_str()
        .or_else(|| err.get("message").and_then(|m| m.as_str()))
        .map(|s| s.to_string())
}

fn non_empty(backend: &'static str, text: Option<String>) -> Result<String, BackendError> {
    match text {
        Some(t) if !t.trim().is_empty() => Ok(t),
        _ => Err(BackendError::Empty { backend }),
    }
}

fn trim_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_field_reads_string_or_nested_message() {
        assert_eq!(
            error_field(r#"{"error":"model not found"}"#).as_deref(),
            Some("model not found")
        );
        assert_eq!(
            error_field(r#"{"error":{"message":"rate limited"}}"#).as_deref(),
            Some("rate limited")
        );
        assert_eq!(error_field("<html>bad gateway</html>"), None);
    }

    #[test]
    fn generate_envelope_error_wins_over_response() {
        let env = GenerateResponse {
            response: Some("{}".to_string()),
            error: Some("boom".to_string()),
        };
        let err = env.into_text("ollama").unwrap_err();
        assert!(matches!(err, BackendError::Provider { .. }));
        assert_eq!(err.to_string(), "ollama error: boom");
    }

    #[test]
    fn blank_or_missing_response_is_empty_error() {
        for response in [None, Some(String::new()), Some("  \n".to_string())] {
            let env = GenerateResponse {
                response,
                error: None,
            };
            assert!(matches!(
                env.into_text("local"),
                Err(BackendError::Empty { backend: "local" })
            ));
        }
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        assert_eq!(trim_base_url("http://h:1/ "), "http://h:1");
    }
}
