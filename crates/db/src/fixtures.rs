use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Demo bookings the seed file provides, with the shape each must have after loading.
const SEED_BOOKINGS: &[SeedBookingContract] = &[
    SeedBookingContract {
        booking_id: "bk-demo-garden",
        postcode: "SW1A 1AA",
        expected_upload_count: 1,
        expected_image_count: 2,
        has_customer_details: true,
        description: "Garden clearance with a shed to dismantle",
    },
    SeedBookingContract {
        booking_id: "bk-demo-loft",
        postcode: "M1 2AB",
        expected_upload_count: 1,
        expected_image_count: 1,
        has_customer_details: true,
        description: "Third floor loft clearance without a lift",
    },
    SeedBookingContract {
        booking_id: "bk-demo-empty",
        postcode: "E1 6AN",
        expected_upload_count: 0,
        expected_image_count: 0,
        has_customer_details: false,
        description: "Booking with no media, rejected by the estimator",
    },
];

const SEED_ACTIVE_RULE_IDS: &[&str] = &[
    "rule-london-base",
    "rule-sw1-hazard",
    "rule-sw-dismantle",
    "rule-m1-stairs",
    "rule-volume-standard",
];

const SEED_INACTIVE_RULE_IDS: &[&str] = &["rule-retired-e1"];

const SEED_UPLOAD_IDS: &[&str] = &["mu-demo-garden-1", "mu-demo-loft-1"];

/// Demo dataset for local estimation runs.
///
/// Covers a booking that collects London rules, one matched only by a Manchester
/// access rule, and one with no media at all.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed_data.sql");

    /// Loads the dataset. Safe to call repeatedly.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        let bookings_seeded = SEED_BOOKINGS
            .iter()
            .map(|booking| BookingSeedInfo {
                booking_id: booking.booking_id,
                postcode: booking.postcode,
                description: booking.description,
            })
            .collect::<Vec<_>>();

        Ok(SeedResult {
            bookings_seeded,
            active_rules: SEED_ACTIVE_RULE_IDS.len(),
            inactive_rules: SEED_INACTIVE_RULE_IDS.len(),
        })
    }

    /// Checks that the seeded rows exist and still match their contract.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let quoted_active = sql_array_from_ids(SEED_ACTIVE_RULE_IDS);
        let active_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM estimation_rules WHERE active = 1 AND id IN {quoted_active}"
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("active-rules", active_count == SEED_ACTIVE_RULE_IDS.len() as i64));

        let quoted_inactive = sql_array_from_ids(SEED_INACTIVE_RULE_IDS);
        let inactive_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM estimation_rules WHERE active = 0 AND id IN {quoted_inactive}"
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("inactive-rules", inactive_count == SEED_INACTIVE_RULE_IDS.len() as i64));

        for booking in SEED_BOOKINGS {
            let booking_exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM bookings WHERE id = ?1 AND postcode = ?2)",
            )
            .bind(booking.booking_id)
            .bind(booking.postcode)
            .fetch_one(pool)
            .await?;
            checks.push((booking.booking_id, booking_exists == 1));

            let image_lists: Vec<String> = sqlx::query_scalar(
                "SELECT image_urls_json FROM media_uploads WHERE booking_id = ?1",
            )
            .bind(booking.booking_id)
            .fetch_all(pool)
            .await?;
            checks.push((
                booking.upload_count_label(),
                image_lists.len() == booking.expected_upload_count,
            ));

            let mut image_count = 0;
            for raw in &image_lists {
                let urls: Vec<String> = serde_json::from_str(raw)
                    .map_err(|error| RepositoryError::Decode(error.to_string()))?;
                image_count += urls.len();
            }
            checks.push((booking.image_count_label(), image_count == booking.expected_image_count));

            let details_exist: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM customer_details WHERE booking_id = ?1)",
            )
            .bind(booking.booking_id)
            .fetch_one(pool)
            .await?;
            checks.push((
                booking.customer_details_label(),
                (details_exist == 1) == booking.has_customer_details,
            ));
        }

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes the seeded rows, including any quote stored on a demo booking.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        let booking_ids = SEED_BOOKINGS.iter().map(|booking| booking.booking_id).collect::<Vec<_>>();
        let quoted_bookings = sql_array_from_ids(&booking_ids);
        let quoted_uploads = sql_array_from_ids(SEED_UPLOAD_IDS);
        let rule_ids = SEED_ACTIVE_RULE_IDS
            .iter()
            .chain(SEED_INACTIVE_RULE_IDS)
            .copied()
            .collect::<Vec<_>>();
        let quoted_rules = sql_array_from_ids(&rule_ids);

        sqlx::query(&format!("DELETE FROM media_uploads WHERE id IN {quoted_uploads}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM customer_details WHERE booking_id IN {quoted_bookings}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM bookings WHERE id IN {quoted_bookings}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM estimation_rules WHERE id IN {quoted_rules}"))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedBookingContract {
    booking_id: &'static str,
    postcode: &'static str,
    expected_upload_count: usize,
    expected_image_count: usize,
    has_customer_details: bool,
    description: &'static str,
}

impl SeedBookingContract {
    fn upload_count_label(&self) -> &'static str {
        match self.booking_id {
            "bk-demo-garden" => "garden-upload-count",
            "bk-demo-loft" => "loft-upload-count",
            _ => "empty-upload-count",
        }
    }

    fn image_count_label(&self) -> &'static str {
        match self.booking_id {
            "bk-demo-garden" => "garden-image-count",
            "bk-demo-loft" => "loft-image-count",
            _ => "empty-image-count",
        }
    }

    fn customer_details_label(&self) -> &'static str {
        match self.booking_id {
            "bk-demo-garden" => "garden-customer-details",
            "bk-demo-loft" => "loft-customer-details",
            _ => "empty-customer-details",
        }
    }
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{id}'")).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub bookings_seeded: Vec<BookingSeedInfo>,
    pub active_rules: usize,
    pub inactive_rules: usize,
}

#[derive(Debug)]
pub struct BookingSeedInfo {
    pub booking_id: &'static str,
    pub postcode: &'static str,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
