//! Ollama API client (http://127.0.0.1:11434 by default).
//! Uses the non-streaming generate endpoint: one prompt in, one `response` string out.

use async_trait::async_trait;
use serde::Serialize;

use super::{send_json, trim_base_url, BackendError, GenerateResponse, LlmBackend};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_MODEL: &str = "llama3.2";

/// Client for a local Ollama daemon.
#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

impl OllamaClient {
    pub fn new(base_url: Option<String>, model: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| trim_base_url(&u))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            client: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LlmBackend for OllamaClient {
    fn name(&self) -> &'static str {
        "ollama"
    }

    /// POST /api/generate with stream: false.
    async fn send(&self, prompt: &str) -> Result<String, BackendError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };
        log::debug!("ollama: POST {} model={}", url, self.model);
        let envelope: GenerateResponse =
            send_json(self.name(), self.client.post(&url).json(&body)).await?;
        envelope.into_text(self.name())
    }
}
