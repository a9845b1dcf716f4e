//! OpenAI-compatible chat and embedding clients.

use std::time::Duration;

use async_trait::async_trait;
use haulquote_core::estimator::{EstimatorPrompt, ModelError};
use haulquote_core::retrieval::EmbeddingError;
use haulquote_core::{Embedder, VisionModel};
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::ClientError;

/// Chat completions with image parts, one request per estimate.
pub struct OpenAiVisionModel {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<SecretString>,
    max_tokens: u32,
}

impl OpenAiVisionModel {
    /// No timeout is applied unless one is given.
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<SecretString>,
        max_tokens: u32,
        timeout: Option<Duration>,
    ) -> Result<Self, ClientError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
            max_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: MessageContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

fn chat_request<'a>(
    model: &'a str,
    max_tokens: u32,
    prompt: &'a EstimatorPrompt,
) -> ChatRequest<'a> {
    let mut parts = Vec::with_capacity(prompt.images.len() + 1);
    parts.push(ContentPart::Text { text: &prompt.user_text });
    parts.extend(
        prompt
            .images
            .iter()
            .map(|image| ContentPart::ImageUrl { image_url: ImageUrl { url: image.data_uri() } }),
    );

    ChatRequest {
        model,
        messages: vec![
            ChatMessage { role: "system", content: MessageContent::Text(&prompt.system) },
            ChatMessage { role: "user", content: MessageContent::Parts(parts) },
        ],
        max_tokens,
    }
}

fn authorize(request: RequestBuilder, api_key: Option<&SecretString>) -> RequestBuilder {
    match api_key {
        Some(key) => request.bearer_auth(key.expose_secret()),
        None => request,
    }
}

#[async_trait]
impl VisionModel for OpenAiVisionModel {
    async fn complete(&self, prompt: &EstimatorPrompt) -> Result<String, ModelError> {
        let url = format!("{}/v1/chat/completions", self.endpoint);
        let body = chat_request(&self.model, self.max_tokens, prompt);
        debug!(
            url = %url,
            model = %self.model,
            images = prompt.images.len(),
            "sending chat completion"
        );

        let response = authorize(self.client.post(&url), self.api_key.as_ref())
            .json(&body)
            .send()
            .await
            .map_err(|error| ModelError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(status = %status, "chat completion endpoint returned an error");
            return Err(ModelError::Response(format!("chat endpoint returned {status}: {detail}")));
        }

        let payload: ChatResponse = response
            .json()
            .await
            .map_err(|error| ModelError::Response(format!("failed to decode chat response: {error}")))?;

        payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ModelError::Response("chat response had no message content".to_string()))
    }
}

/// `/v1/embeddings` client used for rule indexing and query embedding.
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<SecretString>,
}

impl OpenAiEmbedder {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<SecretString>,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            client: Client::builder().build()?,
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
        })
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Orders vectors by their reported index and checks one came back per input.
fn collect_embeddings(
    mut data: Vec<EmbeddingData>,
    expected: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if data.len() != expected {
        return Err(EmbeddingError::Response(format!(
            "expected {expected} embeddings, got {}",
            data.len()
        )));
    }
    data.sort_by_key(|item| item.index);
    Ok(data.into_iter().map(|item| item.embedding).collect())
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.endpoint);
        let response = authorize(self.client.post(&url), self.api_key.as_ref())
            .json(&EmbeddingRequest { model: &self.model, input: texts })
            .send()
            .await
            .map_err(|error| EmbeddingError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Response(format!(
                "embeddings endpoint returned {status}: {detail}"
            )));
        }

        let payload: EmbeddingResponse = response.json().await.map_err(|error| {
            EmbeddingError::Response(format!("failed to decode embeddings response: {error}"))
        })?;
        collect_embeddings(payload.data, texts.len())
    }
}
