use crate::errors::ValidationError;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const EXTRACT_REQUEST_TOPIC: &str = "pipeline.extract_request";
pub const EXTRACT_COMPLETED_TOPIC: &str = "pipeline.extract_completed";

/// Layout of `date_from` and `date_to`.
pub const REQUEST_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractRequest {
    pub app_id: String,
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub countries: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl ExtractRequest {
    pub fn validate(&self, saga_id: &str) -> Result<(), ValidationError> {
        if saga_id.trim().is_empty() {
            return Err(ValidationError::MissingSagaId);
        }
        if self.app_id.trim().is_empty() {
            return Err(ValidationError::MissingAppId);
        }
        if self.countries.is_empty() {
            return Err(ValidationError::NoCountries);
        }
        for country in &self.countries {
            if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(ValidationError::InvalidCountry(country.clone()));
            }
        }
        if self.limit == Some(0) {
            return Err(ValidationError::InvalidLimit);
        }
        Ok(())
    }
}

/// Start of `day` in UTC.
pub fn start_of_day(day: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDate::parse_from_str(day, REQUEST_DATE_FORMAT).map(|date| date.and_time(NaiveTime::MIN).and_utc())
}

/// Last second of `day` in UTC.
pub fn end_of_day(day: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDate::parse_from_str(day, REQUEST_DATE_FORMAT).map(|date| {
        date.and_hms_opt(23, 59, 59)
            .unwrap_or_else(|| date.and_time(NaiveTime::MIN))
            .and_utc()
    })
}

/// Completion event: the original request with the number of reviews fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractCompleted {
    #[serde(flatten)]
    pub request: ExtractRequest,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeMeta {
    pub app_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub message_id: Uuid,
    pub saga_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub occurred_at: DateTime<Utc>,
    pub payload: T,
    pub meta: EnvelopeMeta,
}

impl<T> Envelope<T> {
    pub fn new(kind: &str, saga_id: &str, app_id: &str, payload: T) -> Self {
        Envelope {
            message_id: Uuid::new_v4(),
            saga_id: saga_id.to_string(),
            kind: kind.to_string(),
            occurred_at: Utc::now(),
            payload,
            meta: EnvelopeMeta {
                app_id: app_id.to_string(),
            },
        }
    }
}

impl Envelope<ExtractCompleted> {
    pub fn extract_completed(saga_id: &str, event: ExtractCompleted) -> Self {
        let app_id = event.request.app_id.clone();
        Envelope::new(EXTRACT_COMPLETED_TOPIC, saga_id, &app_id, event)
    }
}

/// What the consumer needs from an inbound message. Any other envelope fields are
/// ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub saga_id: String,
    pub payload: ExtractRequest,
}
