use crate::error::{to_env_var, ConfigError};
use companion::{
    agent::{AgentConfig, HISTORY_LIMIT, MAX_STEPS},
    catalog::BUILTIN_SOURCE,
    providers::configs::{
        OpenAiEmbeddingConfig, OpenAiProviderConfig, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE,
        OPENAI_EMBEDDING_MODEL, OPENAI_HOST, OPENAI_MODEL,
    },
    retrieval::{DEFAULT_COLLECTION, DEFAULT_TOP_K},
};
use config::{Config, Environment};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "COMPANION";

/// Read when no key is configured under the `COMPANION_` prefix
pub const API_KEY_ENV_VAR: &str = "OPENAI_API_KEY";

pub const DEFAULT_STORE_PATH: &str = "./companion_db";

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse()
            .map_err(|source| ConfigError::InvalidAddress { addr, source })
    }
}

#[derive(Debug, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_openai_host")]
    pub host: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: Option<f32>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: Option<i32>,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            host: default_openai_host(),
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            embedding_model: default_embedding_model(),
        }
    }
}

impl ProviderSettings {
    /// The configured key, treating an empty value as unset
    pub fn api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar {
                env_var: API_KEY_ENV_VAR.to_string(),
            })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key().is_ok()
    }

    pub fn chat_config(&self) -> Result<OpenAiProviderConfig, ConfigError> {
        Ok(OpenAiProviderConfig {
            host: self.host.clone(),
            api_key: self.api_key()?.to_string(),
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        })
    }

    pub fn embedding_config(&self) -> Result<OpenAiEmbeddingConfig, ConfigError> {
        Ok(OpenAiEmbeddingConfig {
            host: self.host.clone(),
            api_key: self.api_key()?.to_string(),
            model: self.embedding_model.clone(),
        })
    }
}

/// How catalog entries and queries are turned into vectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    OpenAi,
    /// A sentence-embedding model run in process
    Local,
}

#[derive(Debug, Deserialize)]
pub struct RetrievalSettings {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_embedder")]
    pub embedder: EmbedderKind,
    #[serde(default)]
    pub rebuild_on_catalog_change: bool,
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            collection: default_collection(),
            top_k: default_top_k(),
            embedder: default_embedder(),
            rebuild_on_catalog_change: false,
            catalog_path: None,
        }
    }
}

impl RetrievalSettings {
    /// Where the function catalog is read from, as reported by status endpoints
    pub fn data_source(&self) -> String {
        match &self.catalog_path {
            Some(path) => path.display().to_string(),
            None => BUILTIN_SOURCE.to_string(),
        }
    }

    /// Where the local embedding model is cached, inside the store
    pub fn model_cache_dir(&self) -> PathBuf {
        self.path.join("models")
    }
}

#[derive(Debug, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default)]
    pub system_prompt_path: Option<PathBuf>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            history_limit: default_history_limit(),
            system_prompt_path: None,
        }
    }
}

impl AgentSettings {
    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            max_steps: self.max_steps,
            history_limit: self.history_limit,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub provider: ProviderSettings,
    #[serde(default)]
    pub retrieval: RetrievalSettings,
    #[serde(default)]
    pub agent: AgentSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load(Path::new(DEFAULT_STORE_PATH))
    }

    /// Load settings with a different default location for the retrieval store.
    /// `COMPANION_RETRIEVAL__PATH` still takes precedence.
    pub fn load(default_store: &Path) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            // Server defaults
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            // Retrieval defaults
            .set_default(
                "retrieval.path",
                default_store.to_string_lossy().to_string(),
            )?;

        if let Ok(api_key) = std::env::var(API_KEY_ENV_VAR) {
            builder = builder.set_default("provider.api_key", api_key)?;
        }

        let config = builder
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        match config.try_deserialize::<Self>() {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .trim_end_matches('`');
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else if let config::ConfigError::NotFound(field) = &err {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_openai_host() -> String {
    OPENAI_HOST.to_string()
}

fn default_model() -> String {
    OPENAI_MODEL.to_string()
}

fn default_temperature() -> Option<f32> {
    Some(DEFAULT_TEMPERATURE)
}

fn default_max_tokens() -> Option<i32> {
    Some(DEFAULT_MAX_TOKENS)
}

fn default_embedding_model() -> String {
    OPENAI_EMBEDDING_MODEL.to_string()
}

fn default_store_path() -> PathBuf {
    PathBuf::from(DEFAULT_STORE_PATH)
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_embedder() -> EmbedderKind {
    EmbedderKind::OpenAi
}

fn default_max_steps() -> usize {
    MAX_STEPS
}

fn default_history_limit() -> usize {
    HISTORY_LIMIT
}
