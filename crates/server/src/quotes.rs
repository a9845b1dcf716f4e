//! `POST /bookings/{booking_id}/quote`: runs one estimation and returns the stored quote.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use haulquote_core::{
    ApplicationError, BookingId, EstimationPipeline, InterfaceError, QuoteBreakdown,
};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

#[derive(Clone)]
pub struct QuoteState {
    pipeline: Arc<EstimationPipeline>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QuoteError {
    pub error: &'static str,
    pub detail: String,
    pub correlation_id: String,
}

pub fn router(pipeline: Arc<EstimationPipeline>) -> Router {
    Router::new()
        .route("/bookings/{booking_id}/quote", post(create_quote))
        .with_state(QuoteState { pipeline })
}

pub async fn create_quote(
    State(state): State<QuoteState>,
    Path(booking_id): Path<String>,
) -> Result<Json<QuoteBreakdown>, (StatusCode, Json<QuoteError>)> {
    let correlation_id = Uuid::new_v4().to_string();
    let booking_id = BookingId(booking_id);

    match state.pipeline.run(&booking_id).await {
        Ok(quote) => Ok(Json(quote)),
        Err(error) => {
            let interface = ApplicationError::from(error).into_interface(correlation_id);
            warn!(
                event_name = "system.http.quote_failed",
                correlation_id = interface.correlation_id(),
                booking_id = %booking_id,
                error = %interface,
                "quote request failed"
            );
            Err(error_response(interface))
        }
    }
}

fn error_response(interface: InterfaceError) -> (StatusCode, Json<QuoteError>) {
    let status = match &interface {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = QuoteError {
        error: interface.user_message(),
        detail: interface.to_string(),
        correlation_id: interface.correlation_id().to_string(),
    };
    (status, Json(body))
}
