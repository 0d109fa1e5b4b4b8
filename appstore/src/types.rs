use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Timestamp layout used by the reviews endpoint, always UTC.
pub const REVIEW_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// One page as returned by the reviews endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewsPage {
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub data: Vec<RawReview>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawReview {
    pub id: String,
    pub attributes: RawReviewAttributes,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReviewAttributes {
    /// Missing or null values are rejected per review by `Review::from_raw`.
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub rating: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub review: String,
    #[serde(default)]
    pub developer_response: Option<RawDeveloperResponse>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawDeveloperResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub body: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub modified: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A review normalized for storage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Review {
    pub id: String,
    pub app_id: String,
    pub country: String,
    pub rating: u8,
    pub title: String,
    pub content: String,
    pub reviewed_at: DateTime<Utc>,
    pub developer_response: Option<DeveloperResponse>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeveloperResponse {
    pub content: String,
    pub responded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("review has no date")]
    MissingDate,
    #[error("invalid review date {date:?}: {source}")]
    InvalidDate {
        date: String,
        source: chrono::ParseError,
    },
    #[error("rating {0} is outside 1..=5")]
    InvalidRating(i64),
}

pub fn parse_review_date(date: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(date, REVIEW_DATE_FORMAT).map(|naive| naive.and_utc())
}

impl Review {
    pub fn from_raw(raw: RawReview, app_id: &str, country: &str) -> Result<Self, NormalizeError> {
        let attributes = raw.attributes;

        let date = attributes.date.ok_or(NormalizeError::MissingDate)?;
        let reviewed_at = parse_review_date(&date)
            .map_err(|source| NormalizeError::InvalidDate { date, source })?;

        let raw_rating = attributes.rating.unwrap_or_default();
        let rating = u8::try_from(raw_rating)
            .ok()
            .filter(|r| (1..=5).contains(r))
            .ok_or(NormalizeError::InvalidRating(raw_rating))?;

        // An unparsable response date keeps the response text; the columns are independent.
        let developer_response = attributes.developer_response.map(|response| DeveloperResponse {
            responded_at: parse_review_date(&response.modified).ok(),
            content: response.body,
        });

        Ok(Review {
            id: raw.id,
            app_id: app_id.to_string(),
            country: country.to_string(),
            rating,
            title: attributes.title,
            content: attributes.review,
            reviewed_at,
            developer_response,
        })
    }
}
