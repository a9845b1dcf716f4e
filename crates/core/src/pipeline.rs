//! One estimation run: `Fetch -> Retrieve -> Estimate -> Validate -> Blend -> Persist`.
//!
//! Linear and non-resumable. The first error ends the run and nothing is written
//! unless every earlier stage succeeded.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::domain::booking::{BookingContext, BookingId};
use crate::domain::quote::QuoteBreakdown;
use crate::errors::EstimationError;
use crate::estimator::VisionEstimator;
use crate::persist::QuotePersister;
use crate::ports::{BookingRepository, RuleFilter, RuleRepository};
use crate::pricing::{MatchedRuleSet, PricingBlender};
use crate::retrieval::ContextRetriever;
use crate::validation::ResponseValidator;

pub struct EstimationPipeline {
    bookings: Arc<dyn BookingRepository>,
    rules: Arc<dyn RuleRepository>,
    retriever: ContextRetriever,
    estimator: VisionEstimator,
    persister: QuotePersister,
}

impl EstimationPipeline {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        rules: Arc<dyn RuleRepository>,
        retriever: ContextRetriever,
        estimator: VisionEstimator,
    ) -> Self {
        let persister = QuotePersister::new(bookings.clone());
        Self { bookings, rules, retriever, estimator, persister }
    }

    pub async fn run(&self, booking_id: &BookingId) -> Result<QuoteBreakdown, EstimationError> {
        let started = Instant::now();
        info!(
            event_name = "estimation.pipeline.started",
            booking_id = %booking_id,
            "starting quote estimation"
        );

        let result = self.execute(booking_id).await;
        match &result {
            Ok(quote) => info!(
                event_name = "estimation.pipeline.completed",
                booking_id = %booking_id,
                total = %quote.price_components.total,
                applied_rules = quote.explanation.applied_rules.len(),
                duration_ms = started.elapsed().as_millis() as u64,
                "quote estimation completed"
            ),
            Err(error) => warn!(
                event_name = "estimation.pipeline.failed",
                booking_id = %booking_id,
                error_class = error.error_class(),
                error = %error,
                duration_ms = started.elapsed().as_millis() as u64,
                "quote estimation failed"
            ),
        }
        result
    }

    async fn execute(&self, booking_id: &BookingId) -> Result<QuoteBreakdown, EstimationError> {
        let booking = self
            .bookings
            .fetch_booking(booking_id)
            .await
            .map_err(|error| EstimationError::Fetch(format!("booking: {error}")))?
            .ok_or_else(|| EstimationError::BookingNotFound(booking_id.clone()))?;

        let uploads = self
            .bookings
            .fetch_media_uploads(booking_id)
            .await
            .map_err(|error| EstimationError::Fetch(format!("media uploads: {error}")))?;
        let Some(first_upload) = uploads.first() else {
            return Err(EstimationError::NoMedia(booking_id.clone()));
        };
        let image_urls =
            uploads.iter().flat_map(|upload| upload.image_urls.iter().cloned()).collect::<Vec<_>>();
        if image_urls.is_empty() {
            return Err(EstimationError::NoMedia(booking_id.clone()));
        }

        let customer = self
            .bookings
            .fetch_customer_details(booking_id)
            .await
            .map_err(|error| EstimationError::Fetch(format!("customer details: {error}")))?;
        info!(
            event_name = "estimation.pipeline.fetched",
            booking_id = %booking_id,
            media_uploads = uploads.len(),
            image_count = image_urls.len(),
            has_customer_details = customer.is_some(),
            "booking data fetched"
        );

        let candidates = self
            .rules
            .fetch_active_rules(&RuleFilter::CoveringPostcode(booking.postcode.clone()))
            .await
            .map_err(|error| EstimationError::Fetch(format!("postcode rules: {error}")))?;
        let matched = MatchedRuleSet::select(booking.postcode.clone(), candidates);

        let context = BookingContext::from_booking(&booking, first_upload);
        let advisory = self
            .retriever
            .retrieve(&context)
            .await
            .map_err(|error| EstimationError::Retrieval(error.to_string()))?;

        let raw = self.estimator.estimate(&context, &image_urls, &advisory).await?;
        let estimate = ResponseValidator::validate(&raw).map_err(|rejection| {
            warn!(
                event_name = "estimation.pipeline.rejected_output",
                booking_id = %booking_id,
                reason = %rejection,
                "estimator output rejected"
            );
            EstimationError::from(rejection)
        })?;

        let quote = PricingBlender::blend(&estimate, &context, &matched);
        self.persister.persist(booking_id, &quote).await?;

        Ok(quote)
    }
}
