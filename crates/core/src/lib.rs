//! Quote estimation core.
//!
//! Turns a booking's photos and context into a priced, auditable breakdown:
//! semantic rule retrieval for prompt context, one vision-model call, strict
//! validation of its output, and a deterministic blend with postcode-matched rules.
//!
//! Storage and model transport are injected through [`ports`] and the traits in
//! [`estimator`] and [`retrieval`].

pub mod config;
pub mod domain;
pub mod errors;
pub mod estimator;
pub mod persist;
pub mod pipeline;
pub mod ports;
pub mod pricing;
pub mod retrieval;
pub mod validation;

#[cfg(test)]
mod test_support;

pub use domain::booking::{Booking, BookingContext, BookingId, CustomerDetails, MediaUpload};
pub use domain::estimate::AIEstimate;
pub use domain::quote::{AppliedRule, PriceComponents, QuoteBreakdown, QuoteExplanation};
pub use domain::rule::{EstimationRule, RuleId, RuleType};
pub use errors::{
    ApplicationError, DomainError, EstimateRejection, EstimationError, InterfaceError,
    ValidationError,
};
pub use estimator::{EncodedImage, ImageLoader, VisionEstimator, VisionModel};
pub use persist::QuotePersister;
pub use pipeline::EstimationPipeline;
pub use ports::{BookingRepository, RuleFilter, RuleRepository, StoreError};
pub use pricing::{MatchedRuleSet, PricingBlender};
pub use retrieval::{AdvisoryContext, ContextRetriever, Embedder, RuleCorpusIndex};
pub use validation::ResponseValidator;
