use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use haulquote_core::domain::booking::{Booking, BookingId, CustomerDetails, MediaUpload};
use haulquote_core::domain::quote::QuoteBreakdown;
use haulquote_core::domain::rule::EstimationRule;
use haulquote_core::ports::{BookingRepository, RuleFilter, RuleRepository, StoreError};

#[derive(Default)]
pub struct InMemoryBookingRepository {
    bookings: RwLock<HashMap<String, Booking>>,
    uploads: RwLock<HashMap<String, Vec<MediaUpload>>>,
    customers: RwLock<HashMap<String, CustomerDetails>>,
    quotes: RwLock<HashMap<String, QuoteBreakdown>>,
}

impl InMemoryBookingRepository {
    pub async fn insert_booking(&self, booking: Booking) {
        self.bookings.write().await.insert(booking.id.0.clone(), booking);
    }

    /// Appends in arrival order, which is the order uploads are fetched in.
    pub async fn insert_media_upload(&self, upload: MediaUpload) {
        self.uploads.write().await.entry(upload.booking_id.0.clone()).or_default().push(upload);
    }

    pub async fn insert_customer_details(&self, details: CustomerDetails) {
        self.customers.write().await.insert(details.booking_id.0.clone(), details);
    }

    pub async fn stored_quote(&self, booking_id: &BookingId) -> Option<QuoteBreakdown> {
        self.quotes.read().await.get(&booking_id.0).cloned()
    }
}

#[async_trait]
impl BookingRepository for InMemoryBookingRepository {
    async fn fetch_booking(&self, id: &BookingId) -> Result<Option<Booking>, StoreError> {
        let bookings = self.bookings.read().await;
        Ok(bookings.get(&id.0).cloned())
    }

    async fn fetch_media_uploads(
        &self,
        booking_id: &BookingId,
    ) -> Result<Vec<MediaUpload>, StoreError> {
        let uploads = self.uploads.read().await;
        Ok(uploads.get(&booking_id.0).cloned().unwrap_or_default())
    }

    async fn fetch_customer_details(
        &self,
        booking_id: &BookingId,
    ) -> Result<Option<CustomerDetails>, StoreError> {
        let customers = self.customers.read().await;
        Ok(customers.get(&booking_id.0).cloned())
    }

    async fn update_booking_quote(
        &self,
        booking_id: &BookingId,
        quote: &QuoteBreakdown,
    ) -> Result<u64, StoreError> {
        if !self.bookings.read().await.contains_key(&booking_id.0) {
            return Ok(0);
        }
        self.quotes.write().await.insert(booking_id.0.clone(), quote.clone());
        Ok(1)
    }
}

#[derive(Default)]
pub struct InMemoryRuleRepository {
    rules: RwLock<Vec<EstimationRule>>,
}

impl InMemoryRuleRepository {
    pub fn with_rules(rules: Vec<EstimationRule>) -> Self {
        Self { rules: RwLock::new(rules) }
    }

    /// Replaces a rule with the same id, or appends a new one.
    pub async fn save(&self, rule: EstimationRule) {
        let mut rules = self.rules.write().await;
        match rules.iter_mut().find(|existing| existing.id == rule.id) {
            Some(existing) => *existing = rule,
            None => rules.push(rule),
        }
    }
}

#[async_trait]
impl RuleRepository for InMemoryRuleRepository {
    async fn fetch_active_rules(
        &self,
        filter: &RuleFilter,
    ) -> Result<Vec<EstimationRule>, StoreError> {
        let rules = self.rules.read().await;
        Ok(rules.iter().filter(|rule| filter.admits(rule)).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use haulquote_core::domain::booking::{Booking, BookingId, MediaUpload};
    use haulquote_core::domain::quote::{PriceComponents, QuoteBreakdown, QuoteExplanation};
    use haulquote_core::domain::rule::{EstimationRule, RuleId, RuleType};
    use haulquote_core::ports::{BookingRepository, RuleFilter, RuleRepository};

    use super::{InMemoryBookingRepository, InMemoryRuleRepository};

    fn booking(id: &str) -> Booking {
        Booking {
            id: BookingId(id.to_string()),
            postcode: "M1 2AB".to_string(),
            address: "22 Mill Street".to_string(),
        }
    }

    fn upload(id: &str, booking_id: &str) -> MediaUpload {
        MediaUpload {
            id: id.to_string(),
            booking_id: BookingId(booking_id.to_string()),
            image_urls: vec![format!("{id}.jpg")],
            waste_location: "hallway".to_string(),
            access_restricted: false,
            dismantling_required: false,
        }
    }

    fn rule(id: &str, active: bool) -> EstimationRule {
        EstimationRule {
            id: RuleId(id.to_string()),
            name: id.to_string(),
            description: None,
            rule_type: RuleType::BaseRateAdjustment,
            min_value: None,
            max_value: None,
            multiplier: Decimal::ONE,
            base_rate: Some(Decimal::new(20, 0)),
            hazard_surcharge: None,
            access_fee: None,
            dismantling_fee: None,
            currency: "GBP".to_string(),
            postcode_prefix: Some("M1".to_string()),
            active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn in_memory_booking_repo_round_trip() {
        let repo = InMemoryBookingRepository::default();
        repo.insert_booking(booking("bk-1")).await;
        repo.insert_media_upload(upload("mu-1", "bk-1")).await;
        repo.insert_media_upload(upload("mu-2", "bk-1")).await;
        let id = BookingId("bk-1".to_string());

        let uploads = repo.fetch_media_uploads(&id).await.expect("uploads");
        assert_eq!(uploads.iter().map(|u| u.id.as_str()).collect::<Vec<_>>(), vec!["mu-1", "mu-2"]);

        let quote = QuoteBreakdown {
            volume: 1.0,
            material_risk: 0.0,
            postcode: "M1 2AB".to_string(),
            price_components: PriceComponents {
                base_rate: Decimal::new(80, 0),
                hazard_surcharge: Decimal::ZERO,
                access_fee: Decimal::ZERO,
                dismantling_fee: Decimal::ZERO,
                total: Decimal::new(80, 0),
            },
            compliance: Vec::new(),
            explanation: QuoteExplanation::default(),
        };
        assert_eq!(repo.update_booking_quote(&id, &quote).await.expect("update"), 1);
        assert_eq!(repo.stored_quote(&id).await, Some(quote.clone()));
        assert_eq!(
            repo.update_booking_quote(&BookingId("other".to_string()), &quote).await.expect("noop"),
            0
        );
    }

    #[tokio::test]
    async fn in_memory_rule_repo_applies_filter_and_upserts() {
        let repo = InMemoryRuleRepository::with_rules(vec![rule("a", true), rule("b", false)]);

        let before = repo
            .fetch_active_rules(&RuleFilter::CoveringPostcode("M1 2AB".to_string()))
            .await
            .expect("fetch");
        assert_eq!(before.len(), 1);

        repo.save(rule("b", true)).await;
        let after = repo.fetch_active_rules(&RuleFilter::AllActive).await.expect("fetch");
        assert_eq!(after.len(), 2);
    }
}
