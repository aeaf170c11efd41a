//! The APOD record and its mapping from API payloads.

use crate::core::Payload;
use crate::errors::RecordError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

/// One Astronomy Picture of the Day entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApodRecord {
    /// Picture title.
    pub title: String,
    /// Explanation text.
    pub explanation: String,
    /// Source URL of the media.
    pub url: String,
    /// Publication date.
    pub date: NaiveDate,
    /// Media type, usually `image` or `video`.
    pub media_type: String,
}

impl ApodRecord {
    /// Maps an APOD API response onto a record.
    ///
    /// Missing text fields become empty strings and non-string values are
    /// stringified. Fields outside the record are ignored.
    ///
    /// # Errors
    ///
    /// Fails if the payload is not an object or its date is missing or not
    /// a `YYYY-MM-DD` date.
    pub fn from_payload(payload: &Payload) -> Result<Self, RecordError> {
        let object = payload.as_object().ok_or(RecordError::NotAnObject)?;
        let text = |field: &str| match object.get(field) {
            None | Some(Payload::Null) => String::new(),
            Some(Payload::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };

        let date = match object.get("date") {
            None | Some(Payload::Null) => return Err(RecordError::MissingDate),
            Some(Payload::String(s)) if s.trim().is_empty() => return Err(RecordError::MissingDate),
            Some(Payload::String(s)) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map_err(|_| RecordError::InvalidDate(s.clone()))?,
            Some(other) => return Err(RecordError::InvalidDate(other.to_string())),
        };

        Ok(Self {
            title: text("title"),
            explanation: text("explanation"),
            url: text("url"),
            date,
            media_type: text("media_type"),
        })
    }

    /// Returns the natural key `(date, media_type)`.
    #[must_use]
    pub fn natural_key(&self) -> (NaiveDate, &str) {
        (self.date, &self.media_type)
    }

    /// Returns a hex SHA-256 digest over every field.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let date = self.date.to_string();
        let mut hasher = Sha256::new();
        for part in [
            self.title.as_str(),
            self.explanation.as_str(),
            self.url.as_str(),
            date.as_str(),
            self.media_type.as_str(),
        ] {
            hasher.update(part.as_bytes());
            hasher.update([0x1f]);
        }
        hex::encode(hasher.finalize())
    }

    /// Converts the record into the payload handed to the load step.
    #[must_use]
    pub fn to_payload(&self) -> Payload {
        json!({
            "title": self.title,
            "explanation": self.explanation,
            "url": self.url,
            "date": self.date.format("%Y-%m-%d").to_string(),
            "media_type": self.media_type,
        })
    }
}
