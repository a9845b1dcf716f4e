use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use haulquote_agent::ModelClients;
use haulquote_core::config::AppConfig;
use haulquote_core::estimator::{EstimatorPrompt, ImageLoadError, ModelError};
use haulquote_core::retrieval::EmbeddingError;
use haulquote_core::{EncodedImage, Embedder, ImageLoader, VisionModel};
use serde_json::json;
use tempfile::TempDir;

/// File-backed database and index directory inside `dir`.
pub fn test_config(dir: &TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    config.database.url =
        format!("sqlite://{}?mode=rwc", dir.path().join("haulquote.db").display());
    config.index.directory = dir.path().join("estimation_rules");
    config
}

#[derive(Default)]
pub struct CountingEmbedder {
    calls: AtomicUsize,
}

impl CountingEmbedder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for CountingEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|text| vec![text.len() as f32, 1.0]).collect())
    }
}

pub struct CannedVisionModel;

#[async_trait]
impl VisionModel for CannedVisionModel {
    async fn complete(&self, _prompt: &EstimatorPrompt) -> Result<String, ModelError> {
        let reply = json!({
            "volume": 2.5,
            "material_hazard_risk": 0.5,
            "access_difficulty": 0.3,
            "base_cost_estimate": 120,
            "hazard_surcharge": 10,
            "access_fee": 0,
            "dismantling_fee": 15,
            "special_handling_requirements": ["paint tins"],
            "confidence_score": 0.9
        });
        Ok(format!("```json\n{reply}\n```"))
    }
}

pub struct EchoImageLoader;

#[async_trait]
impl ImageLoader for EchoImageLoader {
    async fn load(&self, url: &str) -> Result<EncodedImage, ImageLoadError> {
        Ok(EncodedImage { media_type: "image/png".to_string(), data_base64: url.to_string() })
    }
}

pub fn stub_clients() -> (ModelClients, Arc<CountingEmbedder>) {
    let embedder = Arc::new(CountingEmbedder::default());
    let clients = ModelClients {
        vision: Arc::new(CannedVisionModel),
        embedder: embedder.clone(),
        images: Arc::new(EchoImageLoader),
    };
    (clients, embedder)
}
