//! The single generative call of an estimation run.
//!
//! Transport lives behind [`VisionModel`] and [`ImageLoader`]; this module assembles
//! the request, enforces the all-images-or-nothing rule and hands back fence-stripped
//! text for [`crate::validation::ResponseValidator`].

pub mod prompt;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::domain::booking::BookingContext;
use crate::errors::EstimationError;
use crate::retrieval::AdvisoryContext;

pub use prompt::{PromptError, PromptRenderer, SYSTEM_INSTRUCTION};

/// An image ready to be attached to a model request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedImage {
    pub media_type: String,
    pub data_base64: String,
}

impl EncodedImage {
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data_base64)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ImageLoadError {
    #[error("download failed: {0}")]
    Download(String),
    #[error("read failed: {0}")]
    Read(String),
}

#[async_trait]
pub trait ImageLoader: Send + Sync {
    async fn load(&self, url: &str) -> Result<EncodedImage, ImageLoadError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EstimatorPrompt {
    pub system: String,
    pub user_text: String,
    pub images: Vec<EncodedImage>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("model transport failed: {0}")]
    Transport(String),
    #[error("model returned an unusable response: {0}")]
    Response(String),
}

/// A multimodal chat model. One call, one text blob back.
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn complete(&self, prompt: &EstimatorPrompt) -> Result<String, ModelError>;
}

pub struct VisionEstimator {
    model: Arc<dyn VisionModel>,
    images: Arc<dyn ImageLoader>,
    prompts: PromptRenderer,
}

impl VisionEstimator {
    pub fn new(
        model: Arc<dyn VisionModel>,
        images: Arc<dyn ImageLoader>,
    ) -> Result<Self, PromptError> {
        Ok(Self { model, images, prompts: PromptRenderer::new()? })
    }

    /// Loads every image, calls the model exactly once and returns its output with
    /// any surrounding code fence removed.
    pub async fn estimate(
        &self,
        booking: &BookingContext,
        image_urls: &[String],
        advisory: &AdvisoryContext,
    ) -> Result<String, EstimationError> {
        let mut images = Vec::with_capacity(image_urls.len());
        for url in image_urls {
            let image = self.images.load(url).await.map_err(|source| {
                error!(
                    event_name = "estimation.estimator.image_failed",
                    url = %url,
                    error = %source,
                    "could not load booking image"
                );
                EstimationError::ImageLoad { url: url.clone(), reason: source.to_string() }
            })?;
            images.push(image);
        }

        let user_text = self
            .prompts
            .render(booking, advisory)
            .map_err(|error| EstimationError::EstimatorCall(error.to_string()))?;
        let prompt =
            EstimatorPrompt { system: SYSTEM_INSTRUCTION.to_string(), user_text, images };

        info!(
            event_name = "estimation.estimator.requested",
            image_count = prompt.images.len(),
            advisory_hits = advisory.documents.len(),
            "requesting estimate from vision model"
        );

        let raw = self.model.complete(&prompt).await.map_err(|source| {
            error!(event_name = "estimation.estimator.failed", error = %source, "vision model call failed");
            EstimationError::EstimatorCall(source.to_string())
        })?;
        debug!(event_name = "estimation.estimator.raw_response", raw = %raw, "vision model responded");

        Ok(strip_code_fence(&raw).to_string())
    }
}

/// Removes one leading ```` ``` ```` fence with its optional language tag, and one trailing fence.
pub fn strip_code_fence(raw: &str) -> &str {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix("```") {
        let tag_end = rest.find(|ch: char| !ch.is_ascii_alphanumeric()).unwrap_or(rest.len());
        text = &rest[tag_end..];
    }
    if let Some(rest) = text.trim_end().strip_suffix("```") {
        text = rest;
    }

    text.trim()
}
