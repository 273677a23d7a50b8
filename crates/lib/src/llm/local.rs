//! Generic local HTTP inference server: POST {base}/generate with `{model, prompt}`,
//! answered by `{response}` or `{error}`.

use async_trait::async_trait;
use serde::Serialize;

use super::{send_json, trim_base_url, BackendError, GenerateResponse, LlmBackend};

const DEFAULT_MODEL: &str = "default";

#[derive(Clone)]
pub struct LocalClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

impl LocalClient {
    /// There is no default server; the base URL must come from configuration.
    pub fn new(base_url: impl AsRef<str>, model: Option<String>) -> Self {
        Self {
            base_url: trim_base_url(base_url.as_ref()),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            client: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LlmBackend for LocalClient {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn send(&self, prompt: &str) -> Result<String, BackendError> {
        let url = format!("{}/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt,
        };
        log::debug!("local: POST {} model={}", url, self.model);
        let envelope: GenerateResponse =
            send_json(self.name(), self.client.post(&url).json(&body)).await?;
        envelope.into_text(self.name())
    }
}
