use config::{Config, ConfigError, FileFormat};
use serde::Deserialize;
use std::{
    env,
    path::{Path, PathBuf},
    result::Result,
    time::Duration,
};

use crate::state::key_pool::mask_key;

const DEFAULT_PORT: u16 = 5006;

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub id: String,
    pub temperature: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromptLimits {
    pub rate_limit_per_sec: usize,
    pub refill_interval_ms: usize,
    pub refill_amount: usize,
    pub backoff_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub endpoint: String,
    #[serde(default)]
    pub keys: Vec<String>,
    pub request_timeout_secs: u64,
    pub prompt_limits: PromptLimits,
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub batch_size: usize,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    api: ApiConfig,
    model: ModelConfig,
    pipeline: PipelineConfig,
    categories: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub api: ApiConfig,
    pub model: ModelConfig,
    pub pipeline: PipelineConfig,
    pub categories: Vec<String>,
    pub port: u16,
}

impl std::fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Server Config:\nPort: {}\n\nAPI: endpoint={} keys=[{}] timeout={}s limits={:?}\n\nModel Config: {:?}\n\nPipeline Config: {:?}\n\nCategories:\n{}",
            self.port,
            self.api.endpoint,
            self.api
                .keys
                .iter()
                .map(|k| mask_key(k))
                .collect::<Vec<_>>()
                .join(", "),
            self.api.request_timeout_secs,
            self.api.prompt_limits,
            self.model,
            self.pipeline,
            self.categories.join("\n"),
        )
    }
}

impl ServerConfig {
    /// Directory holding `config.toml`: `$APP_DIR` when set, otherwise the
    /// `config/` directory at the workspace root.
    pub fn config_dir() -> PathBuf {
        if let Ok(dir) = env::var("APP_DIR") {
            return PathBuf::from(dir);
        }
        let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
        manifest_dir
            .parent()
            .unwrap_or(manifest_dir)
            .join("config")
    }

    /// Load `config.toml` from [`ServerConfig::config_dir`] and apply the
    /// environment overrides (`LLM_API_KEYS`, `PORT`).
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_dir().join("config.toml");
        let builder = Config::builder().add_source(config::File::from(path));
        let mut server_config = Self::from_builder(builder)?;
        server_config.apply_env_overrides()?;
        Ok(server_config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let builder =
            Config::builder().add_source(config::File::from_str(contents, FileFormat::Toml));
        Self::from_builder(builder)
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigError> {
        let ConfigFile {
            api,
            model,
            pipeline,
            categories,
        } = builder.build()?.try_deserialize()?;

        if pipeline.batch_size == 0 {
            return Err(ConfigError::Message(
                "pipeline.batch_size must be greater than 0".to_string(),
            ));
        }

        Ok(ServerConfig {
            api,
            model,
            pipeline,
            categories,
            port: DEFAULT_PORT,
        })
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(keys) = env::var("LLM_API_KEYS") {
            self.api.keys = parse_key_list(&keys);
        }
        if let Ok(port) = env::var("PORT") {
            self.port = port
                .parse::<u16>()
                .map_err(|e| ConfigError::Message(format!("PORT is invalid: {e}")))?;
        }
        Ok(())
    }
}

/// Split a comma separated key list, dropping blanks.
pub fn parse_key_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}
