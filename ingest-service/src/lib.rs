//! Saga step that turns an extract request into persisted reviews and one completion
//! event.

pub mod bus;
pub mod config;
pub mod consumer;
pub mod errors;
pub mod events;
pub mod metrics_defs;
pub mod service;
pub mod storage;

pub use consumer::{Consumer, ConsumerStats};
pub use errors::{IngestError, ValidationError};
pub use events::{Envelope, ExtractCompleted, ExtractRequest};
pub use service::{IngestService, ReviewSource, SagaReport, SagaSettings, TokenSource};
