use std::sync::Arc;

use tracing::debug;

use super::{Embedder, EmbeddingError, RuleCorpusIndex, RuleDocument};
use crate::domain::booking::BookingContext;

pub const DEFAULT_TOP_K: usize = 4;
pub const MAX_TOP_K: usize = 16;

const HEADER: &str = "Relevant estimation guidelines:";

/// Prompt-only guidance built from semantically similar rules.
///
/// Deliberately a different type from [`crate::pricing::MatchedRuleSet`]: nothing in
/// here may reach the price arithmetic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdvisoryContext {
    pub text: String,
    pub documents: Vec<RuleDocument>,
}

impl AdvisoryContext {
    pub fn from_documents(documents: Vec<RuleDocument>) -> Self {
        Self { text: render_guidelines(&documents), documents }
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

pub struct ContextRetriever {
    index: Arc<RuleCorpusIndex>,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
}

impl ContextRetriever {
    pub fn new(index: Arc<RuleCorpusIndex>, embedder: Arc<dyn Embedder>, top_k: usize) -> Self {
        Self { index, embedder, top_k: top_k.clamp(1, MAX_TOP_K) }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub async fn retrieve(&self, context: &BookingContext) -> Result<AdvisoryContext, EmbeddingError> {
        if self.index.is_empty() {
            debug!(event_name = "estimation.retrieval.empty_index", "no indexed rules to consult");
            return Ok(AdvisoryContext::from_documents(Vec::new()));
        }

        let query = search_query(context);
        let vector = self.embedder.embed(&query).await?;
        let documents =
            self.index.search(&vector, self.top_k).into_iter().cloned().collect::<Vec<_>>();

        debug!(
            event_name = "estimation.retrieval.completed",
            hit_count = documents.len(),
            top_k = self.top_k,
            "advisory rules retrieved"
        );

        Ok(AdvisoryContext::from_documents(documents))
    }
}

pub fn search_query(context: &BookingContext) -> String {
    format!(
        "Waste removal booking in {}\nLocation: {}\nAccess restricted: {}\nDismantling needed: {}",
        context.postcode, context.location, context.access_restricted, context.dismantling_required
    )
}

fn render_guidelines(documents: &[RuleDocument]) -> String {
    let mut text = String::from(HEADER);
    text.push('\n');

    for document in documents {
        let metadata = &document.metadata;
        text.push_str(&format!("- {}\n", document.text));
        text.push_str(&format!("  Base rate: £{:.2}\n", metadata.base_rate));
        text.push_str(&format!("  Typical hazard surcharge: £{:.2}\n", metadata.hazard_surcharge));
        if !metadata.access_fee.is_zero() {
            text.push_str(&format!("  Standard access fee: £{:.2}\n", metadata.access_fee));
        }
        if !metadata.dismantling_fee.is_zero() {
            text.push_str(&format!(
                "  Standard dismantling fee: £{:.2}\n",
                metadata.dismantling_fee
            ));
        }
    }

    text
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use rust_decimal::Decimal;
    use tempfile::TempDir;

    use super::{search_query, AdvisoryContext, ContextRetriever, MAX_TOP_K};
    use crate::domain::booking::BookingContext;
    use crate::domain::rule::RuleType;
    use crate::retrieval::{RuleCorpusIndex, RuleDocument};
    use crate::test_support::{rule, KeywordEmbedder, StubRuleRepository};

    fn context() -> BookingContext {
        BookingContext {
            postcode: "SW1A 1AA".to_string(),
            address: "10 Downing Street".to_string(),
            location: "basement up narrow stairs".to_string(),
            access_restricted: true,
            dismantling_required: false,
        }
    }

    #[test]
    fn query_mentions_every_booking_signal() {
        let query = search_query(&context());

        assert!(query.contains("SW1A 1AA"));
        assert!(query.contains("Location: basement up narrow stairs"));
        assert!(query.contains("Access restricted: true"));
        assert!(query.contains("Dismantling needed: false"));
    }

    #[test]
    fn guidelines_list_optional_fees_only_when_present() {
        let mut with_fees = rule("r-1", RuleType::LocationModifier, Some("SW1"));
        with_fees.name = "Central London".to_string();
        with_fees.description = Some("Congestion and parking".to_string());
        with_fees.base_rate = Some(Decimal::new(12000, 2));
        with_fees.hazard_surcharge = None;
        with_fees.access_fee = Some(Decimal::new(255, 1));
        with_fees.dismantling_fee = None;

        let advisory = AdvisoryContext::from_documents(vec![RuleDocument::from_rule(&with_fees)]);

        assert_eq!(
            advisory.text,
            "Relevant estimation guidelines:\n\
             - Central London: Congestion and parking\n  \
             Base rate: £120.00\n  \
             Typical hazard surcharge: £0.00\n  \
             Standard access fee: £25.50\n"
        );
    }

    #[tokio::test]
    async fn retrieval_is_bounded_by_top_k() {
        let dir = TempDir::new().expect("tempdir");
        let rules = (0..6)
            .map(|i| rule(&format!("r-{i}"), RuleType::LocationModifier, Some("SW1")))
            .collect::<Vec<_>>();
        let embedder = Arc::new(KeywordEmbedder::default());
        let index = RuleCorpusIndex::build_or_load(
            dir.path().join("idx"),
            &StubRuleRepository::new(rules),
            embedder.as_ref(),
        )
        .await
        .expect("build");

        let retriever = ContextRetriever::new(Arc::new(index), embedder, 2);
        let advisory = retriever.retrieve(&context()).await.expect("retrieve");

        assert_eq!(advisory.documents.len(), 2);
        assert!(advisory.text.starts_with("Relevant estimation guidelines:\n- "));
    }

    #[tokio::test]
    async fn empty_index_skips_the_embedding_call() {
        let dir = TempDir::new().expect("tempdir");
        let embedder = Arc::new(KeywordEmbedder::default());
        let index = RuleCorpusIndex::build_or_load(
            dir.path().join("idx"),
            &StubRuleRepository::new(Vec::new()),
            embedder.as_ref(),
        )
        .await
        .expect("build");

        let retriever = ContextRetriever::new(Arc::new(index), embedder.clone(), 4);
        let advisory = retriever.retrieve(&context()).await.expect("retrieve");

        assert!(advisory.is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn top_k_is_clamped_to_a_small_bound() {
        let dir = TempDir::new().expect("tempdir");
        let embedder = Arc::new(KeywordEmbedder::default());
        let index = RuleCorpusIndex::build_or_load(
            dir.path().join("idx"),
            &StubRuleRepository::new(Vec::new()),
            embedder.as_ref(),
        )
        .await
        .expect("build");
        let index = Arc::new(index);

        assert_eq!(ContextRetriever::new(index.clone(), embedder.clone(), 0).top_k(), 1);
        assert_eq!(ContextRetriever::new(index, embedder, 500).top_k(), MAX_TOP_K);
    }
}
