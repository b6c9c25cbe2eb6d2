use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,

    pub users_file: PathBuf,
    pub logs_file: PathBuf,
    pub history_file: PathBuf,
    /// Uploaded files live in one sub-directory per file id, next to `metadata.json`
    pub uploads_dir: PathBuf,

    pub default_provider: String,
    pub default_model: String,

    pub openrouter_api_key: String,
    pub huggingface_api_key: String,
    /// Root of the local Ollama server; the API lives under `/api`
    pub ollama_base_url: String,

    /// Comma-separated usernames seeded as Admins into a fresh users file
    pub admin_usernames: Vec<String>,

    /// Upper bound on a single upstream provider call
    pub upstream_timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup; missing keys take defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let admin_usernames: Vec<String> = var("ADMIN_USERNAMES", "itsmelotex")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            host: var("HOST", "0.0.0.0"),
            port: var("PORT", "5000")
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid PORT: {}", e))?,
            users_file: var("USERS_FILE", "data/users.json").into(),
            logs_file: var("LOGS_FILE", "data/logs.json").into(),
            history_file: var("HISTORY_FILE", "data/history.json").into(),
            uploads_dir: var("UPLOADS_DIR", "data/uploads").into(),
            default_provider: var("DEFAULT_PROVIDER", "openrouter"),
            default_model: var("DEFAULT_MODEL", "mistralai/mistral-7b-instruct:free"),
            openrouter_api_key: var("OPENROUTER_API_KEY", ""),
            huggingface_api_key: var("HUGGINGFACE_API_KEY", ""),
            ollama_base_url: var("OLLAMA_BASE_URL", "http://localhost:11434"),
            admin_usernames,
            upstream_timeout_secs: var("UPSTREAM_TIMEOUT_SECS", "120")
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid UPSTREAM_TIMEOUT_SECS: {}", e))?,
        })
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid HOST/PORT '{}:{}': {}", self.host, self.port, e))
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    /// API key for a provider: the dedicated settings for the built-in ones,
    /// otherwise `{PROVIDER}_API_KEY` from the environment.
    pub fn api_key_for(&self, provider: &str) -> Option<String> {
        let key = match provider {
            "openrouter" => self.openrouter_api_key.clone(),
            "huggingface" => self.huggingface_api_key.clone(),
            other => std::env::var(format!("{}_API_KEY", other.to_uppercase())).unwrap_or_default(),
        };
        Some(key).filter(|k| !k.is_empty())
    }
}
