use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::{cosine_similarity, Embedder, EmbeddingError};
use crate::domain::rule::{EstimationRule, RuleId, RuleType, DEFAULT_CURRENCY};
use crate::ports::{RuleFilter, RuleRepository, StoreError};

pub const SNAPSHOT_FILE: &str = "snapshot.json";
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("could not fetch active rules: {0}")]
    Fetch(#[source] StoreError),
    #[error("could not embed rule `{rule_id}`: {source}")]
    Embedding { rule_id: RuleId, source: EmbeddingError },
    #[error("index storage failure at `{path}`: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("index snapshot at `{path}` is unreadable: {source}")]
    Snapshot { path: PathBuf, source: serde_json::Error },
}

/// Numeric projection of a rule, with absent amounts read as zero.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleMetadata {
    pub rule_id: RuleId,
    pub rule_name: String,
    pub rule_description: String,
    pub rule_type: RuleType,
    pub min_value: Decimal,
    pub max_value: Decimal,
    pub multiplier: Decimal,
    pub currency: String,
    pub postcode_prefix: String,
    pub base_rate: Decimal,
    pub hazard_surcharge: Decimal,
    pub access_fee: Decimal,
    pub dismantling_fee: Decimal,
}

/// The indexed form of a rule as it looked when the index was built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDocument {
    pub rule_id: RuleId,
    pub text: String,
    pub metadata: RuleMetadata,
}

impl RuleDocument {
    pub fn from_rule(rule: &EstimationRule) -> Self {
        let description = rule.description.clone().unwrap_or_default();
        let currency = if rule.currency.trim().is_empty() {
            DEFAULT_CURRENCY.to_string()
        } else {
            rule.currency.clone()
        };

        Self {
            rule_id: rule.id.clone(),
            text: format!("{}: {}", rule.name, description),
            metadata: RuleMetadata {
                rule_id: rule.id.clone(),
                rule_name: rule.name.clone(),
                rule_description: description,
                rule_type: rule.rule_type,
                min_value: rule.min_value.unwrap_or(Decimal::ZERO),
                max_value: rule.max_value.unwrap_or(Decimal::ZERO),
                multiplier: rule.multiplier,
                currency,
                postcode_prefix: rule.postcode_prefix.clone().unwrap_or_default(),
                base_rate: rule.base_rate.unwrap_or(Decimal::ZERO),
                hazard_surcharge: rule.hazard_surcharge.unwrap_or(Decimal::ZERO),
                access_fee: rule.access_fee.unwrap_or(Decimal::ZERO),
                dismantling_fee: rule.dismantling_fee.unwrap_or(Decimal::ZERO),
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexOrigin {
    Built,
    Loaded,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct IndexedDocument {
    document: RuleDocument,
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    written_at: DateTime<Utc>,
    documents: Vec<IndexedDocument>,
}

/// Embedding index over active pricing rules.
///
/// The index directory doubles as the "already built" marker: once it exists the
/// index is only ever loaded, never rebuilt, even if the rule table changes later.
/// After construction the index is read-only and safe to share across runs.
#[derive(Debug)]
pub struct RuleCorpusIndex {
    directory: PathBuf,
    origin: IndexOrigin,
    vectors: Vec<(RuleId, Vec<f32>)>,
    documents: BTreeMap<RuleId, RuleDocument>,
}

impl RuleCorpusIndex {
    pub async fn build_or_load(
        directory: impl Into<PathBuf>,
        rules: &dyn RuleRepository,
        embedder: &dyn Embedder,
    ) -> Result<Self, IndexError> {
        let directory = directory.into();

        if directory.exists() {
            let index = Self::load(directory).await?;
            info!(
                event_name = "estimation.index.loaded",
                directory = %index.directory.display(),
                document_count = index.len(),
                "estimation rules already indexed, skipping ingestion"
            );
            return Ok(index);
        }

        Self::build(directory, rules, embedder).await
    }

    async fn build(
        directory: PathBuf,
        rules: &dyn RuleRepository,
        embedder: &dyn Embedder,
    ) -> Result<Self, IndexError> {
        info!(
            event_name = "estimation.index.build_started",
            directory = %directory.display(),
            "starting rules ingestion"
        );

        let active_rules = rules.fetch_active_rules(&RuleFilter::AllActive).await.map_err(|source| {
            error!(
                event_name = "estimation.index.fetch_failed",
                error = %source,
                "failed to fetch active rules for ingestion"
            );
            IndexError::Fetch(source)
        })?;

        tokio::fs::create_dir_all(&directory)
            .await
            .map_err(|source| IndexError::Io { path: directory.clone(), source })?;

        let mut index = Self {
            directory,
            origin: IndexOrigin::Built,
            vectors: Vec::new(),
            documents: BTreeMap::new(),
        };

        if active_rules.is_empty() {
            warn!(event_name = "estimation.index.no_rules", "no active rules found; index left empty");
            index.persist().await?;
            return Ok(index);
        }

        debug!(rule_count = active_rules.len(), "found active rules");

        for rule in &active_rules {
            let document = RuleDocument::from_rule(rule);
            match embedder.embed(&document.text).await {
                Ok(embedding) => {
                    debug!(rule_id = %rule.id, rule_name = %rule.name, "ingested rule");
                    index.insert(document, embedding);
                }
                Err(source) => {
                    error!(
                        event_name = "estimation.index.embedding_failed",
                        rule_id = %rule.id,
                        error = %source,
                        "rule ingestion aborted"
                    );
                    // Documents already embedded stay in the snapshot.
                    index.persist().await?;
                    return Err(IndexError::Embedding { rule_id: rule.id.clone(), source });
                }
            }
        }

        index.persist().await?;
        info!(
            event_name = "estimation.index.build_completed",
            document_count = index.len(),
            "rules ingestion completed"
        );

        Ok(index)
    }

    async fn load(directory: PathBuf) -> Result<Self, IndexError> {
        let path = directory.join(SNAPSHOT_FILE);
        let mut index = Self {
            directory,
            origin: IndexOrigin::Loaded,
            vectors: Vec::new(),
            documents: BTreeMap::new(),
        };

        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => return Ok(index),
            Err(source) => return Err(IndexError::Io { path, source }),
        };
        let snapshot: Snapshot =
            serde_json::from_slice(&raw).map_err(|source| IndexError::Snapshot { path, source })?;

        for entry in snapshot.documents {
            index.insert(entry.document, entry.embedding);
        }

        Ok(index)
    }

    fn insert(&mut self, document: RuleDocument, embedding: Vec<f32>) {
        self.vectors.push((document.rule_id.clone(), embedding));
        self.documents.insert(document.rule_id.clone(), document);
    }

    async fn persist(&self) -> Result<(), IndexError> {
        let path = self.directory.join(SNAPSHOT_FILE);
        let documents = self
            .vectors
            .iter()
            .filter_map(|(rule_id, embedding)| {
                self.documents.get(rule_id).map(|document| IndexedDocument {
                    document: document.clone(),
                    embedding: embedding.clone(),
                })
            })
            .collect();
        let snapshot = Snapshot { version: SNAPSHOT_VERSION, written_at: Utc::now(), documents };
        let bytes = serde_json::to_vec(&snapshot)
            .map_err(|source| IndexError::Snapshot { path: path.clone(), source })?;

        tokio::fs::write(&path, bytes).await.map_err(|source| IndexError::Io { path, source })
    }

    /// Highest-scoring documents first; equal scores keep ingestion order.
    pub fn search(&self, query: &[f32], limit: usize) -> Vec<&RuleDocument> {
        let mut scored = self
            .vectors
            .iter()
            .map(|(rule_id, embedding)| (rule_id, cosine_similarity(query, embedding)))
            .collect::<Vec<_>>();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        scored
            .into_iter()
            .filter_map(|(rule_id, _)| self.documents.get(rule_id))
            .take(limit)
            .collect()
    }

    pub fn document(&self, rule_id: &RuleId) -> Option<&RuleDocument> {
        self.documents.get(rule_id)
    }

    pub fn documents(&self) -> impl Iterator<Item = &RuleDocument> {
        self.documents.values()
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn origin(&self) -> IndexOrigin {
        self.origin
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}
