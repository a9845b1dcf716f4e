use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookingId(pub String);

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub postcode: String,
    pub address: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaUpload {
    pub id: String,
    pub booking_id: BookingId,
    pub image_urls: Vec<String>,
    pub waste_location: String,
    pub access_restricted: bool,
    pub dismantling_required: bool,
}

/// Contact details captured alongside a booking. Informational only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub booking_id: BookingId,
    pub full_name: String,
    pub contact_number: String,
    pub email: String,
    pub collection_date: Option<DateTime<Utc>>,
}

/// Per-run view of a booking, derived from the booking and its first media upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookingContext {
    pub postcode: String,
    pub address: String,
    pub location: String,
    pub access_restricted: bool,
    pub dismantling_required: bool,
}

impl BookingContext {
    pub fn from_booking(booking: &Booking, first_upload: &MediaUpload) -> Self {
        Self {
            postcode: booking.postcode.clone(),
            address: booking.address.clone(),
            location: first_upload.waste_location.clone(),
            access_restricted: first_upload.access_restricted,
            dismantling_required: first_upload.dismantling_required,
        }
    }
}
