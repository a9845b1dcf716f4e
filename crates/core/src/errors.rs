use thiserror::Error;

use crate::domain::booking::BookingId;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// A field of the estimator output that is missing, mistyped, or out of range.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("field `{field}` {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { field: field.into(), reason: reason.into() }
    }
}

/// Why raw estimator text was refused before it could reach pricing.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EstimateRejection {
    #[error("estimator output is not valid JSON: {0}")]
    Parse(String),
    #[error("estimator output failed validation: {0}")]
    Validation(#[from] ValidationError),
}

/// Terminal failures of one estimation run. None of these are retried.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EstimationError {
    #[error("booking `{0}` was not found")]
    BookingNotFound(BookingId),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("booking `{0}` has no media uploads")]
    NoMedia(BookingId),
    #[error("image `{url}` could not be loaded: {reason}")]
    ImageLoad { url: String, reason: String },
    #[error("advisory retrieval failed: {0}")]
    Retrieval(String),
    #[error("estimator call failed: {0}")]
    EstimatorCall(String),
    #[error("estimator output is not valid JSON: {0}")]
    Parse(String),
    #[error("estimator output failed validation: {0}")]
    Validation(ValidationError),
    #[error("persistence failed: {0}")]
    Persistence(String),
}

impl From<EstimateRejection> for EstimationError {
    fn from(value: EstimateRejection) -> Self {
        match value {
            EstimateRejection::Parse(message) => Self::Parse(message),
            EstimateRejection::Validation(error) => Self::Validation(error),
        }
    }
}

impl EstimationError {
    /// Stable machine-readable class, used in logs and CLI output.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::BookingNotFound(_) | Self::Fetch(_) => "fetch",
            Self::NoMedia(_) => "no_media",
            Self::ImageLoad { .. } => "image_load",
            Self::Retrieval(_) => "retrieval",
            Self::EstimatorCall(_) => "estimator_call",
            Self::Parse(_) => "parse",
            Self::Validation(_) => "validation",
            Self::Persistence(_) => "persistence",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Estimation(#[from] EstimationError),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested booking does not exist.",
            Self::ServiceUnavailable { .. } => {
                "The quote could not be generated right now. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Estimation(error) => {
                let message = error.to_string();
                match error {
                    EstimationError::BookingNotFound(_) => Self::NotFound { message, correlation_id },
                    EstimationError::NoMedia(_) | EstimationError::ImageLoad { .. } => {
                        Self::BadRequest { message, correlation_id }
                    }
                    EstimationError::Fetch(_)
                    | EstimationError::Retrieval(_)
                    | EstimationError::EstimatorCall(_)
                    | EstimationError::Parse(_)
                    | EstimationError::Validation(_)
                    | EstimationError::Persistence(_) => {
                        Self::ServiceUnavailable { message, correlation_id }
                    }
                }
            }
            ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}
