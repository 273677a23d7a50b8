//! Hugging Face Inference API client.
//!
//! POST /models/{model} with a bearer token; the response is an array of
//! candidates and the first one's `generated_text` is the answer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{non_empty, send_json, trim_base_url, BackendError, LlmBackend};

const DEFAULT_BASE_URL: &str = "https://api-inference.huggingface.co";
const DEFAULT_MODEL: &str = "microsoft/DialoGPT-medium";
const MAX_NEW_TOKENS: u32 = 1000;
const TEMPERATURE: f32 = 0.1;

/// Client for the hosted inference API. Always sends an Authorization header.
#[derive(Clone)]
pub struct HuggingFaceClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
    parameters: InferenceParameters,
}

#[derive(Debug, Serialize)]
struct InferenceParameters {
    max_new_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    generated_text: Option<String>,
}

/// 2xx bodies are normally a candidate array but the API also answers `{ "error": ... }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InferenceResponse {
    Candidates(Vec<Candidate>),
    Error { error: String },
}

impl HuggingFaceClient {
    pub fn new(base_url: Option<String>, api_key: impl Into<String>, model: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| trim_base_url(&u))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            api_key: api_key.into(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            client: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LlmBackend for HuggingFaceClient {
    fn name(&self) -> &'static str {
        "huggingface"
    }

    async fn send(&self, prompt: &str) -> Result<String, BackendError> {
        let url = format!("{}/models/{}", self.base_url, self.model);
        let body = InferenceRequest {
            inputs: prompt,
            parameters: InferenceParameters {
                max_new_tokens: MAX_NEW_TOKENS,
                temperature: TEMPERATURE,
            },
        };
        log::debug!("huggingface: POST {}", url);
        let req = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body);
        match send_json(self.name(), req).await? {
            InferenceResponse::Candidates(candidates) => {
                let first = candidates
                    .into_iter()
                    .next()
                    .ok_or(BackendError::Empty {
                        backend: self.name(),
                    })?;
                non_empty(self.name(), first.generated_text)
            }
            InferenceResponse::Error { error } => Err(BackendError::Provider {
                backend: self.name(),
                message: error,
            }),
        }
    }
}
