use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retrieval::context::{DEFAULT_TOP_K, MAX_TOP_K};

pub const DEFAULT_CONFIG_FILE: &str = "haulquote.toml";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub embeddings: EmbeddingsConfig,
    pub index: IndexConfig,
    pub images: ImagesConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    /// `None` leaves the estimator call unbounded.
    pub timeout_secs: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct EmbeddingsConfig {
    pub model: String,
    pub base_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct IndexConfig {
    pub directory: PathBuf,
    pub top_k: usize,
}

#[derive(Clone, Debug)]
pub struct ImagesConfig {
    pub download_timeout_secs: u64,
    /// Directory non-`http(s)` image URLs are resolved against. `None` disables local reads.
    pub local_root: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub index_directory: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://haulquote.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::OpenAi,
                api_key: None,
                base_url: None,
                model: "gpt-4o-mini".to_string(),
                max_tokens: 4096,
                timeout_secs: None,
            },
            embeddings: EmbeddingsConfig {
                model: "text-embedding-3-large".to_string(),
                base_url: None,
            },
            index: IndexConfig {
                directory: PathBuf::from("db/estimation_rules"),
                top_k: DEFAULT_TOP_K,
            },
            images: ImagesConfig { download_timeout_secs: 30, local_root: None },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl LlmConfig {
    /// Configured base URL, or the provider's well-known endpoint.
    pub fn endpoint(&self) -> &str {
        match (&self.base_url, self.provider) {
            (Some(url), _) => url.trim_end_matches('/'),
            (None, LlmProvider::OpenAi) => OPENAI_BASE_URL,
            (None, LlmProvider::Ollama) => OLLAMA_BASE_URL,
        }
    }

    /// Key sent to the provider. A blank key counts as missing; openai requires one.
    pub fn require_api_key(&self) -> Result<Option<SecretString>, ConfigError> {
        let present = self
            .api_key
            .as_ref()
            .filter(|value| !value.expose_secret().trim().is_empty())
            .cloned();
        match (self.provider, present) {
            (LlmProvider::OpenAi, None) => Err(ConfigError::Validation(
                "llm.api_key is required for the openai provider (set HAULQUOTE_LLM_API_KEY or OPENAI_API_KEY)"
                    .to_string(),
            )),
            (_, present) => Ok(present),
        }
    }
}

impl EmbeddingsConfig {
    pub fn endpoint<'a>(&'a self, llm: &'a LlmConfig) -> &'a str {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/'),
            None => llm.endpoint(),
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = Some(timeout_secs);
            }
        }

        if let Some(embeddings) = patch.embeddings {
            if let Some(model) = embeddings.model {
                self.embeddings.model = model;
            }
            if let Some(base_url) = embeddings.base_url {
                self.embeddings.base_url = Some(base_url);
            }
        }

        if let Some(index) = patch.index {
            if let Some(directory) = index.directory {
                self.index.directory = directory;
            }
            if let Some(top_k) = index.top_k {
                self.index.top_k = top_k;
            }
        }

        if let Some(images) = patch.images {
            if let Some(download_timeout_secs) = images.download_timeout_secs {
                self.images.download_timeout_secs = download_timeout_secs;
            }
            if let Some(local_root) = images.local_root {
                self.images.local_root = Some(local_root);
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("HAULQUOTE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("HAULQUOTE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("HAULQUOTE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("HAULQUOTE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("HAULQUOTE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("HAULQUOTE_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        let api_key = read_env("HAULQUOTE_LLM_API_KEY").or_else(|| read_env("OPENAI_API_KEY"));
        if let Some(value) = api_key {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("HAULQUOTE_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("HAULQUOTE_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("HAULQUOTE_LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_u32("HAULQUOTE_LLM_MAX_TOKENS", &value)?;
        }
        if let Some(value) = read_env("HAULQUOTE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = Some(parse_u64("HAULQUOTE_LLM_TIMEOUT_SECS", &value)?);
        }

        if let Some(value) = read_env("HAULQUOTE_EMBEDDINGS_MODEL") {
            self.embeddings.model = value;
        }
        if let Some(value) = read_env("HAULQUOTE_EMBEDDINGS_BASE_URL") {
            self.embeddings.base_url = Some(value);
        }

        if let Some(value) = read_env("HAULQUOTE_INDEX_DIRECTORY") {
            self.index.directory = PathBuf::from(value);
        }
        if let Some(value) = read_env("HAULQUOTE_INDEX_TOP_K") {
            self.index.top_k = parse_usize("HAULQUOTE_INDEX_TOP_K", &value)?;
        }

        if let Some(value) = read_env("HAULQUOTE_IMAGES_DOWNLOAD_TIMEOUT_SECS") {
            self.images.download_timeout_secs =
                parse_u64("HAULQUOTE_IMAGES_DOWNLOAD_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("HAULQUOTE_IMAGES_LOCAL_ROOT") {
            self.images.local_root = Some(PathBuf::from(value));
        }

        if let Some(value) = read_env("HAULQUOTE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("HAULQUOTE_SERVER_PORT") {
            self.server.port = parse_u16("HAULQUOTE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("HAULQUOTE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("HAULQUOTE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("HAULQUOTE_LOGGING_LEVEL").or_else(|| read_env("HAULQUOTE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("HAULQUOTE_LOGGING_FORMAT").or_else(|| read_env("HAULQUOTE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(index_directory) = overrides.index_directory {
            self.index.directory = index_directory;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_embeddings(&self.embeddings)?;
        validate_index(&self.index)?;
        validate_images(&self.images)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    if llm.max_tokens == 0 {
        return Err(ConfigError::Validation(
            "llm.max_tokens must be greater than zero".to_string(),
        ));
    }

    if let Some(timeout_secs) = llm.timeout_secs {
        if timeout_secs == 0 || timeout_secs > 3600 {
            return Err(ConfigError::Validation(
                "llm.timeout_secs must be in range 1..=3600 when set".to_string(),
            ));
        }
    }

    if let Some(base_url) = &llm.base_url {
        validate_http_url("llm.base_url", base_url)?;
    }

    Ok(())
}

fn validate_embeddings(embeddings: &EmbeddingsConfig) -> Result<(), ConfigError> {
    if embeddings.model.trim().is_empty() {
        return Err(ConfigError::Validation("embeddings.model must not be empty".to_string()));
    }
    if let Some(base_url) = &embeddings.base_url {
        validate_http_url("embeddings.base_url", base_url)?;
    }
    Ok(())
}

fn validate_index(index: &IndexConfig) -> Result<(), ConfigError> {
    if index.directory.as_os_str().is_empty() {
        return Err(ConfigError::Validation("index.directory must not be empty".to_string()));
    }
    if index.top_k == 0 || index.top_k > MAX_TOP_K {
        return Err(ConfigError::Validation(format!(
            "index.top_k must be in range 1..={MAX_TOP_K}"
        )));
    }
    Ok(())
}

fn validate_images(images: &ImagesConfig) -> Result<(), ConfigError> {
    if images.download_timeout_secs == 0 || images.download_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "images.download_timeout_secs must be in range 1..=300".to_string(),
        ));
    }
    if images.local_root.as_ref().is_some_and(|root| root.as_os_str().is_empty()) {
        return Err(ConfigError::Validation(
            "images.local_root must not be empty when set".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!("{key} must start with http:// or https://")))
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    embeddings: Option<EmbeddingsPatch>,
    index: Option<IndexPatch>,
    images: Option<ImagesPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct EmbeddingsPatch {
    model: Option<String>,
    base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct IndexPatch {
    directory: Option<PathBuf>,
    top_k: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ImagesPatch {
    download_timeout_secs: Option<u64>,
    local_root: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
