use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;

use haulquote_core::domain::booking::{Booking, BookingId, CustomerDetails, MediaUpload};
use haulquote_core::domain::quote::QuoteBreakdown;
use haulquote_core::ports::{BookingRepository, StoreError};

use super::{decode_err, parse_timestamp, RepositoryError};
use crate::DbPool;

pub struct SqlBookingRepository {
    pool: DbPool,
}

impl SqlBookingRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// The raw stored quote, if any. Used by operators and tests to inspect write-backs.
    pub async fn stored_quote(
        &self,
        booking_id: &BookingId,
    ) -> Result<Option<QuoteBreakdown>, RepositoryError> {
        let raw: Option<Option<String>> =
            sqlx::query_scalar("SELECT quote_json FROM bookings WHERE id = ?")
                .bind(&booking_id.0)
                .fetch_optional(&self.pool)
                .await?;

        raw.flatten()
            .map(|json| {
                serde_json::from_str(&json).map_err(|error| {
                    RepositoryError::Decode(format!("quote_json for `{booking_id}`: {error}"))
                })
            })
            .transpose()
    }
}

fn row_to_booking(row: &sqlx::sqlite::SqliteRow) -> Result<Booking, RepositoryError> {
    Ok(Booking {
        id: BookingId(row.try_get("id").map_err(decode_err)?),
        postcode: row.try_get("postcode").map_err(decode_err)?,
        address: row.try_get("address").map_err(decode_err)?,
    })
}

fn row_to_media_upload(row: &sqlx::sqlite::SqliteRow) -> Result<MediaUpload, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_err)?;
    let image_urls_json: String = row.try_get("image_urls_json").map_err(decode_err)?;
    let image_urls = serde_json::from_str::<Vec<String>>(&image_urls_json).map_err(|error| {
        RepositoryError::Decode(format!("image_urls_json for upload `{id}`: {error}"))
    })?;

    Ok(MediaUpload {
        id,
        booking_id: BookingId(row.try_get("booking_id").map_err(decode_err)?),
        image_urls,
        waste_location: row.try_get("waste_location").map_err(decode_err)?,
        access_restricted: row.try_get("access_restricted").map_err(decode_err)?,
        dismantling_required: row.try_get("dismantling_required").map_err(decode_err)?,
    })
}

fn row_to_customer_details(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<CustomerDetails, RepositoryError> {
    let collection_date: Option<String> = row.try_get("collection_date").map_err(decode_err)?;

    Ok(CustomerDetails {
        booking_id: BookingId(row.try_get("booking_id").map_err(decode_err)?),
        full_name: row.try_get("full_name").map_err(decode_err)?,
        contact_number: row.try_get("contact_number").map_err(decode_err)?,
        email: row.try_get("email").map_err(decode_err)?,
        collection_date: collection_date
            .as_deref()
            .map(|value| parse_timestamp("collection_date", value))
            .transpose()?,
    })
}

impl SqlBookingRepository {
    async fn find_booking(&self, id: &BookingId) -> Result<Option<Booking>, RepositoryError> {
        let row = sqlx::query("SELECT id, postcode, address FROM bookings WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_booking).transpose()
    }

    async fn list_media_uploads(
        &self,
        booking_id: &BookingId,
    ) -> Result<Vec<MediaUpload>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, booking_id, image_urls_json, waste_location, access_restricted,
                    dismantling_required
             FROM media_uploads
             WHERE booking_id = ?
             ORDER BY created_at ASC, id ASC",
        )
        .bind(&booking_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_media_upload).collect()
    }

    async fn find_customer_details(
        &self,
        booking_id: &BookingId,
    ) -> Result<Option<CustomerDetails>, RepositoryError> {
        let row = sqlx::query(
            "SELECT booking_id, full_name, contact_number, email, collection_date
             FROM customer_details WHERE booking_id = ?",
        )
        .bind(&booking_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_customer_details).transpose()
    }

    async fn write_quote(
        &self,
        booking_id: &BookingId,
        quote: &QuoteBreakdown,
    ) -> Result<u64, RepositoryError> {
        let quote_json = quote
            .to_json()
            .map_err(|error| RepositoryError::Decode(format!("quote encoding: {error}")))?;

        let result =
            sqlx::query("UPDATE bookings SET quote_json = ?, updated_at = ? WHERE id = ?")
                .bind(quote_json)
                .bind(Utc::now().to_rfc3339())
                .bind(&booking_id.0)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl BookingRepository for SqlBookingRepository {
    async fn fetch_booking(&self, id: &BookingId) -> Result<Option<Booking>, StoreError> {
        Ok(self.find_booking(id).await?)
    }

    async fn fetch_media_uploads(
        &self,
        booking_id: &BookingId,
    ) -> Result<Vec<MediaUpload>, StoreError> {
        Ok(self.list_media_uploads(booking_id).await?)
    }

    async fn fetch_customer_details(
        &self,
        booking_id: &BookingId,
    ) -> Result<Option<CustomerDetails>, StoreError> {
        Ok(self.find_customer_details(booking_id).await?)
    }

    async fn update_booking_quote(
        &self,
        booking_id: &BookingId,
        quote: &QuoteBreakdown,
    ) -> Result<u64, StoreError> {
        Ok(self.write_quote(booking_id, quote).await?)
    }
}
