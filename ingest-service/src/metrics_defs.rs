//! Metrics definitions for the ingest saga and its consumer.

use shared::metrics_defs::{MetricDef, MetricType};

pub const SAGA_DURATION: MetricDef = MetricDef {
    name: "ingest.saga.duration",
    metric_type: MetricType::Histogram,
    description: "Time from request validation to completion event publication in seconds. Tagged with status",
};

pub const SAGAS: MetricDef = MetricDef {
    name: "ingest.saga",
    metric_type: MetricType::Counter,
    description: "Number of sagas handled. Tagged with status and, on failure, the error kind",
};

pub const REVIEWS_FETCHED: MetricDef = MetricDef {
    name: "ingest.reviews.fetched",
    metric_type: MetricType::Counter,
    description: "Number of reviews returned by the fetcher",
};

pub const REVIEWS_SAVED: MetricDef = MetricDef {
    name: "ingest.reviews.saved",
    metric_type: MetricType::Counter,
    description: "Number of reviews handed to the repository without error",
};

pub const REVIEW_SAVE_FAILED: MetricDef = MetricDef {
    name: "ingest.reviews.save_failed",
    metric_type: MetricType::Counter,
    description: "Number of reviews the repository failed to persist",
};

pub const EVENT_PUBLISH_DURATION: MetricDef = MetricDef {
    name: "ingest.event.publish.duration",
    metric_type: MetricType::Histogram,
    description: "Time to publish a completion event in seconds. Tagged with status",
};

pub const MESSAGES_SKIPPED: MetricDef = MetricDef {
    name: "ingest.consumer.skipped",
    metric_type: MetricType::Counter,
    description: "Number of inbound messages that could not be decoded",
};

pub const ALL_METRICS: &[MetricDef] = &[
    SAGA_DURATION,
    SAGAS,
    REVIEWS_FETCHED,
    REVIEWS_SAVED,
    REVIEW_SAVE_FAILED,
    EVENT_PUBLISH_DURATION,
    MESSAGES_SKIPPED,
];
