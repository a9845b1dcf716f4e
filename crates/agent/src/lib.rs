//! External model plumbing for the estimation core.
//!
//! The core only knows the [`VisionModel`], [`Embedder`] and [`ImageLoader`]
//! traits. This crate implements them against OpenAI-compatible HTTP endpoints
//! (OpenAI itself, or a local Ollama) and against local or remote image files.
//!
//! Models here are strictly estimators. Their output is validated and blended with
//! deterministic rules by the core before anything is priced or stored.

pub mod images;
pub mod openai;

use std::sync::Arc;
use std::time::Duration;

use haulquote_core::config::{AppConfig, ConfigError};
use haulquote_core::{Embedder, ImageLoader, VisionModel};
use thiserror::Error;

pub use images::HttpImageLoader;
pub use openai::{OpenAiEmbedder, OpenAiVisionModel};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to build http client: {0}")]
    Build(#[from] reqwest::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// The three external collaborators an estimation run needs, built from config.
#[derive(Clone)]
pub struct ModelClients {
    pub vision: Arc<dyn VisionModel>,
    pub embedder: Arc<dyn Embedder>,
    pub images: Arc<dyn ImageLoader>,
}

impl ModelClients {
    pub fn from_config(config: &AppConfig) -> Result<Self, ClientError> {
        let api_key = config.llm.require_api_key()?;
        let vision = OpenAiVisionModel::new(
            config.llm.endpoint(),
            config.llm.model.clone(),
            api_key.clone(),
            config.llm.max_tokens,
            config.llm.timeout_secs.map(Duration::from_secs),
        )?;
        let embedder = OpenAiEmbedder::new(
            config.embeddings.endpoint(&config.llm),
            config.embeddings.model.clone(),
            api_key,
        )?;
        let images = HttpImageLoader::new(
            Duration::from_secs(config.images.download_timeout_secs),
            config.images.local_root.clone(),
        )?;

        Ok(Self { vision: Arc::new(vision), embedder: Arc::new(embedder), images: Arc::new(images) })
    }
}
