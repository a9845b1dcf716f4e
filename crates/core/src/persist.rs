use std::sync::Arc;

use tracing::{error, info};

use crate::domain::booking::BookingId;
use crate::domain::quote::QuoteBreakdown;
use crate::errors::EstimationError;
use crate::ports::BookingRepository;

/// Single write-back of a finished quote. Overwrites; never retries.
pub struct QuotePersister {
    bookings: Arc<dyn BookingRepository>,
}

impl QuotePersister {
    pub fn new(bookings: Arc<dyn BookingRepository>) -> Self {
        Self { bookings }
    }

    pub async fn persist(
        &self,
        booking_id: &BookingId,
        quote: &QuoteBreakdown,
    ) -> Result<(), EstimationError> {
        let rows = self.bookings.update_booking_quote(booking_id, quote).await.map_err(|source| {
            error!(
                event_name = "estimation.persist.failed",
                booking_id = %booking_id,
                error = %source,
                "failed to update booking with quote"
            );
            EstimationError::Persistence(source.to_string())
        })?;

        if rows == 0 {
            error!(
                event_name = "estimation.persist.no_rows",
                booking_id = %booking_id,
                "quote update affected no rows"
            );
            return Err(EstimationError::Persistence(format!(
                "update of booking `{booking_id}` affected no rows"
            )));
        }

        info!(
            event_name = "estimation.persist.completed",
            booking_id = %booking_id,
            total = %quote.price_components.total,
            "quote stored on booking"
        );
        Ok(())
    }
}
