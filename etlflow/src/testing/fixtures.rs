//! APOD fixtures.

use crate::apod::ApodRecord;
use crate::core::Payload;
use chrono::NaiveDate;
use serde_json::json;

/// Date of the Moon fixture record.
pub const MOON_DATE: &str = "2024-01-01";

/// An APOD API response for the Moon fixture.
#[must_use]
pub fn moon_payload() -> Payload {
    json!({
        "title": "Moon",
        "explanation": "...",
        "url": "http://x",
        "date": MOON_DATE,
        "media_type": "image"
    })
}

/// The record the transform step derives from [`moon_payload`].
#[must_use]
pub fn moon_record() -> ApodRecord {
    ApodRecord {
        title: "Moon".to_string(),
        explanation: "...".to_string(),
        url: "http://x".to_string(),
        date: MOON_DATE.parse().unwrap_or(NaiveDate::MIN),
        media_type: "image".to_string(),
    }
}
