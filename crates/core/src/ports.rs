//! Collaborator interfaces the estimation core consumes.
//!
//! Booking CRUD, rule administration and storage transport live outside this crate;
//! the core only sees these traits.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::booking::{Booking, BookingId, CustomerDetails, MediaUpload};
use crate::domain::quote::QuoteBreakdown;
use crate::domain::rule::EstimationRule;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(String),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Which active rules a caller wants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuleFilter {
    /// Every active rule. Used once, when the rule index is built.
    AllActive,
    /// Active rules whose postcode prefix covers this postcode.
    CoveringPostcode(String),
}

impl RuleFilter {
    pub fn admits(&self, rule: &EstimationRule) -> bool {
        if !rule.active {
            return false;
        }
        match self {
            Self::AllActive => true,
            Self::CoveringPostcode(postcode) => rule.covers_postcode(postcode),
        }
    }
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn fetch_booking(&self, id: &BookingId) -> Result<Option<Booking>, StoreError>;

    /// Uploads in creation order; the first one supplies the booking context.
    async fn fetch_media_uploads(
        &self,
        booking_id: &BookingId,
    ) -> Result<Vec<MediaUpload>, StoreError>;

    async fn fetch_customer_details(
        &self,
        booking_id: &BookingId,
    ) -> Result<Option<CustomerDetails>, StoreError>;

    /// Overwrites the stored quote and returns the number of rows affected.
    async fn update_booking_quote(
        &self,
        booking_id: &BookingId,
        quote: &QuoteBreakdown,
    ) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait RuleRepository: Send + Sync {
    /// Rules come back in backend order; callers must not assume any sort.
    async fn fetch_active_rules(
        &self,
        filter: &RuleFilter,
    ) -> Result<Vec<EstimationRule>, StoreError>;
}
