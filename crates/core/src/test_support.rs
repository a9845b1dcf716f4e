//! Hand-rolled collaborators shared by unit tests in this crate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use crate::domain::booking::{Booking, BookingId, CustomerDetails, MediaUpload};
use crate::domain::quote::{PriceComponents, QuoteBreakdown, QuoteExplanation};
use crate::domain::rule::{EstimationRule, RuleId, RuleType};
use crate::estimator::{EncodedImage, EstimatorPrompt, ImageLoadError, ImageLoader, ModelError, VisionModel};
use crate::ports::{BookingRepository, RuleFilter, RuleRepository, StoreError};
use crate::retrieval::{Embedder, EmbeddingError};

pub fn rule(id: &str, rule_type: RuleType, prefix: Option<&str>) -> EstimationRule {
    EstimationRule {
        id: RuleId(id.to_string()),
        name: format!("Rule {id}"),
        description: Some(format!("{id} guidance")),
        rule_type,
        min_value: None,
        max_value: None,
        multiplier: Decimal::ONE,
        base_rate: None,
        hazard_surcharge: None,
        access_fee: None,
        dismantling_fee: None,
        currency: "GBP".to_string(),
        postcode_prefix: prefix.map(str::to_string),
        active: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn sample_quote() -> QuoteBreakdown {
    QuoteBreakdown {
        volume: 1.0,
        material_risk: 0.1,
        postcode: "SW1A 1AA".to_string(),
        price_components: PriceComponents {
            base_rate: Decimal::new(100, 0),
            hazard_surcharge: Decimal::ZERO,
            access_fee: Decimal::ZERO,
            dismantling_fee: Decimal::ZERO,
            total: Decimal::new(100, 0),
        },
        compliance: Vec::new(),
        explanation: QuoteExplanation::default(),
    }
}

pub struct StubRuleRepository {
    rules: Mutex<Vec<EstimationRule>>,
    failure: Option<StoreError>,
    fetches: AtomicUsize,
}

impl StubRuleRepository {
    pub fn new(rules: Vec<EstimationRule>) -> Self {
        Self { rules: Mutex::new(rules), failure: None, fetches: AtomicUsize::new(0) }
    }

    pub fn failing(error: StoreError) -> Self {
        Self { rules: Mutex::new(Vec::new()), failure: Some(error), fetches: AtomicUsize::new(0) }
    }

    pub fn replace(&self, rules: Vec<EstimationRule>) {
        *self.rules.lock().expect("rules lock") = rules;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RuleRepository for StubRuleRepository {
    async fn fetch_active_rules(
        &self,
        filter: &RuleFilter,
    ) -> Result<Vec<EstimationRule>, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        let rules = self.rules.lock().expect("rules lock");
        Ok(rules.iter().filter(|rule| filter.admits(rule)).cloned().collect())
    }
}

const VOCABULARY: [&str; 8] =
    ["hazard", "access", "stairs", "dismantl", "base", "garden", "london", "restricted"];

/// Deterministic bag-of-keywords embedder.
#[derive(Default)]
pub struct KeywordEmbedder {
    pub calls: AtomicUsize,
    fail_after: Option<usize>,
}

impl KeywordEmbedder {
    pub fn failing_after(successes: usize) -> Self {
        Self { calls: AtomicUsize::new(0), fail_after: Some(successes) }
    }

    pub fn vectorize(text: &str) -> Vec<f32> {
        let lowered = text.to_lowercase();
        let mut vector =
            VOCABULARY.iter().map(|word| lowered.matches(word).count() as f32).collect::<Vec<_>>();
        vector.push(0.1);
        vector
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let previous = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_after.is_some_and(|limit| previous >= limit) {
            return Err(EmbeddingError::Transport("embedding service unavailable".to_string()));
        }
        Ok(texts.iter().map(|text| Self::vectorize(text)).collect())
    }
}

#[derive(Default)]
pub struct StubBookingRepository {
    bookings: Mutex<HashMap<String, Booking>>,
    media: Mutex<HashMap<String, Vec<MediaUpload>>>,
    customers: Mutex<HashMap<String, CustomerDetails>>,
    quotes: Mutex<HashMap<String, QuoteBreakdown>>,
}

impl StubBookingRepository {
    pub fn with_booking(id: &str, postcode: &str) -> Self {
        let repository = Self::default();
        repository.bookings.lock().expect("bookings lock").insert(
            id.to_string(),
            Booking {
                id: BookingId(id.to_string()),
                postcode: postcode.to_string(),
                address: "1 Test Road".to_string(),
            },
        );
        repository
    }

    pub fn add_media(
        &self,
        booking_id: &str,
        image_urls: &[&str],
        access_restricted: bool,
        dismantling_required: bool,
    ) {
        let mut media = self.media.lock().expect("media lock");
        let uploads = media.entry(booking_id.to_string()).or_default();
        uploads.push(MediaUpload {
            id: format!("m-{}", uploads.len() + 1),
            booking_id: BookingId(booking_id.to_string()),
            image_urls: image_urls.iter().map(|url| url.to_string()).collect(),
            waste_location: "garden shed".to_string(),
            access_restricted,
            dismantling_required,
        });
    }

    pub fn stored_quote(&self, booking_id: &str) -> Option<QuoteBreakdown> {
        self.quotes.lock().expect("quotes lock").get(booking_id).cloned()
    }
}

#[async_trait]
impl BookingRepository for StubBookingRepository {
    async fn fetch_booking(&self, id: &BookingId) -> Result<Option<Booking>, StoreError> {
        Ok(self.bookings.lock().expect("bookings lock").get(&id.0).cloned())
    }

    async fn fetch_media_uploads(
        &self,
        booking_id: &BookingId,
    ) -> Result<Vec<MediaUpload>, StoreError> {
        Ok(self.media.lock().expect("media lock").get(&booking_id.0).cloned().unwrap_or_default())
    }

    async fn fetch_customer_details(
        &self,
        booking_id: &BookingId,
    ) -> Result<Option<CustomerDetails>, StoreError> {
        Ok(self.customers.lock().expect("customers lock").get(&booking_id.0).cloned())
    }

    async fn update_booking_quote(
        &self,
        booking_id: &BookingId,
        quote: &QuoteBreakdown,
    ) -> Result<u64, StoreError> {
        if !self.bookings.lock().expect("bookings lock").contains_key(&booking_id.0) {
            return Ok(0);
        }
        self.quotes.lock().expect("quotes lock").insert(booking_id.0.clone(), quote.clone());
        Ok(1)
    }
}

pub struct ScriptedVisionModel {
    pub calls: AtomicUsize,
    reply: Result<String, ModelError>,
    prompts: Mutex<Vec<EstimatorPrompt>>,
}

impl ScriptedVisionModel {
    pub fn replying(reply: &str) -> Self {
        Self { calls: AtomicUsize::new(0), reply: Ok(reply.to_string()), prompts: Mutex::default() }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            reply: Err(ModelError::Transport(reason.to_string())),
            prompts: Mutex::default(),
        }
    }

    pub fn prompts(&self) -> Vec<EstimatorPrompt> {
        self.prompts.lock().expect("prompts lock").clone()
    }
}

#[async_trait]
impl VisionModel for ScriptedVisionModel {
    async fn complete(&self, prompt: &EstimatorPrompt) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().expect("prompts lock").push(prompt.clone());
        self.reply.clone()
    }
}

/// Echoes the url back as the image payload so ordering is observable.
#[derive(Default)]
pub struct StubImageLoader {
    fail_on: Option<String>,
}

impl StubImageLoader {
    pub fn failing_on(url: &str) -> Self {
        Self { fail_on: Some(url.to_string()) }
    }
}

#[async_trait]
impl ImageLoader for StubImageLoader {
    async fn load(&self, url: &str) -> Result<EncodedImage, ImageLoadError> {
        if self.fail_on.as_deref() == Some(url) {
            return Err(ImageLoadError::Download(format!("404 for {url}")));
        }
        Ok(EncodedImage { media_type: "image/jpeg".to_string(), data_base64: url.to_string() })
    }
}
