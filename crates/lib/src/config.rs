//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.sysagent/config.json`) and environment.
//! Environment variables win over the file, and an optional `.env` file can seed the
//! environment before either is read.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::llm::{Backend, HuggingFaceClient, LocalClient, OllamaClient};

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Which AI service to ask and how to reach it.
    #[serde(default)]
    pub backend: BackendConfig,
}

/// AI backend selection. Every field may be overridden from the environment.
/// `baseUrl`, `apiKey` and `model` only apply when the selected service is this one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    /// "ollama" (default), "huggingface" or "local". Overridden by FREE_AI_SERVICE.
    #[serde(default)]
    pub service: Option<String>,
    /// Server base URL. Overridden by OLLAMA_URL or LOCAL_AI_URL; required for "local".
    #[serde(default)]
    pub base_url: Option<String>,
    /// API key for the hosted service. Overridden by HUGGINGFACE_API_KEY; required for "huggingface".
    #[serde(default)]
    pub api_key: Option<String>,
    /// Model id passed as-is to the service. Overridden by OLLAMA_MODEL, HF_MODEL or LOCAL_AI_MODEL.
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Ollama,
    HuggingFace,
    Local,
}

impl ServiceKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Some(ServiceKind::Ollama),
            "huggingface" | "hf" => Some(ServiceKind::HuggingFace),
            "local" => Some(ServiceKind::Local),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceKind::Ollama => "ollama",
            ServiceKind::HuggingFace => "huggingface",
            ServiceKind::Local => "local",
        }
    }
}

/// Backend settings after environment overrides and validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBackend {
    pub kind: ServiceKind,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
}

impl ResolvedBackend {
    pub fn build(&self) -> Backend {
        match self.kind {
            ServiceKind::Ollama => {
                Backend::Ollama(OllamaClient::new(self.base_url.clone(), self.model.clone()))
            }
            ServiceKind::HuggingFace => Backend::HuggingFace(HuggingFaceClient::new(
                self.base_url.clone(),
                self.api_key.clone().unwrap_or_default(),
                self.model.clone(),
            )),
            ServiceKind::Local => Backend::Local(LocalClient::new(
                self.base_url.as_deref().unwrap_or_default(),
                self.model.clone(),
            )),
        }
    }
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Resolve the backend from config and the process environment.
pub fn resolve_backend(config: &Config) -> Result<ResolvedBackend> {
    resolve_backend_with(config, |k| std::env::var(k).ok())
}

/// Resolve the backend using `env` for variable lookup.
pub fn resolve_backend_with<F>(config: &Config, env: F) -> Result<ResolvedBackend>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |k: &str| non_blank(env(k));
    let file = &config.backend;

    let service = var("FREE_AI_SERVICE")
        .or_else(|| non_blank(file.service.clone()))
        .unwrap_or_else(|| "ollama".to_string());
    let Some(kind) = ServiceKind::parse(&service) else {
        bail!(
            "unsupported AI service: {}. Supported: ollama, huggingface, local",
            service
        );
    };

    // The file's URL, key and model belong to the file's service (ollama when unset).
    let file_kind = match non_blank(file.service.clone()) {
        Some(s) => ServiceKind::parse(&s),
        None => Some(ServiceKind::Ollama),
    };
    let same_service = file_kind == Some(kind);
    if !same_service {
        log::debug!(
            "config: ignoring file backend settings, service is {} from environment",
            kind.as_str()
        );
    }
    let from_file = |v: &Option<String>| {
        if same_service {
            non_blank(v.clone())
        } else {
            None
        }
    };
    let base_url = from_file(&file.base_url);
    let model = from_file(&file.model);
    let resolved = match kind {
        ServiceKind::Ollama => ResolvedBackend {
            kind,
            base_url: var("OLLAMA_URL").or(base_url),
            api_key: None,
            model: var("OLLAMA_MODEL").or(model),
        },
        ServiceKind::HuggingFace => {
            let api_key = var("HUGGINGFACE_API_KEY").or_else(|| from_file(&file.api_key));
            if api_key.is_none() {
                bail!("HUGGINGFACE_API_KEY environment variable (or backend.apiKey) is required for huggingface");
            }
            ResolvedBackend {
                kind,
                base_url,
                api_key,
                model: var("HF_MODEL").or(model),
            }
        }
        ServiceKind::Local => {
            let base_url = var("LOCAL_AI_URL").or(base_url);
            if base_url.is_none() {
                bail!("LOCAL_AI_URL environment variable (or backend.baseUrl) is required for local");
            }
            ResolvedBackend {
                kind,
                base_url,
                api_key: None,
                model: var("LOCAL_AI_MODEL").or(model),
            }
        }
    };
    log::debug!(
        "config: backend {} model {:?}",
        resolved.kind.as_str(),
        resolved.model
    );
    Ok(resolved)
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("SYSAGENT_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".sysagent").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path, or the default path (or SYSAGENT_CONFIG_PATH).
/// Missing file => default config. Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

/// Parse `KEY=VALUE` lines. Blank lines and `#` comments are skipped; whitespace and
/// surrounding quotes are trimmed from values. Malformed lines are logged and skipped.
pub fn parse_env_file(contents: &str) -> Vec<(String, String)> {
    let mut vars = Vec::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            log::warn!("skipping invalid line in .env: {}", line);
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            log::warn!("skipping invalid line in .env: {}", line);
            continue;
        }
        let value = value.trim().trim_matches(|c: char| c == '"' || c == '\'');
        vars.push((key.to_string(), value.to_string()));
    }
    vars
}

/// Read a `.env` file and set each variable in the process environment (file values win).
/// Returns the number of variables set. Call before any other thread is started.
pub fn load_env_file(path: &Path) -> Result<usize> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading env file {}", path.display()))?;
    let vars = parse_env_file(&contents);
    for (k, v) in &vars {
        std::env::set_var(k, v);
    }
    log::debug!("loaded {} variable(s) from {}", vars.len(), path.display());
    Ok(vars.len())
}
