//! Metrics definitions for the App Store client.

use shared::metrics_defs::{MetricDef, MetricType};

pub const TOKEN_EXTRACT_DURATION: MetricDef = MetricDef {
    name: "appstore.token.duration",
    metric_type: MetricType::Histogram,
    description: "Time to fetch the landing page and extract a bearer token in seconds",
};

pub const TOKEN_EXTRACT_FAILED: MetricDef = MetricDef {
    name: "appstore.token.failed",
    metric_type: MetricType::Counter,
    description: "Number of token extractions that did not yield a token",
};

pub const REVIEWS_PAGE_DURATION: MetricDef = MetricDef {
    name: "appstore.reviews.page.duration",
    metric_type: MetricType::Histogram,
    description: "Time to fetch and decode one page of reviews in seconds",
};

pub const REVIEWS_PAGE_FAILED: MetricDef = MetricDef {
    name: "appstore.reviews.page.failed",
    metric_type: MetricType::Counter,
    description: "Number of review page requests that failed",
};

pub const RATE_LIMITED: MetricDef = MetricDef {
    name: "appstore.reviews.rate_limited",
    metric_type: MetricType::Counter,
    description: "Number of review page requests rejected by upstream rate limiting",
};

pub const REVIEWS_SKIPPED: MetricDef = MetricDef {
    name: "appstore.reviews.skipped",
    metric_type: MetricType::Counter,
    description: "Number of reviews dropped because their date or rating was malformed",
};

pub const ALL_METRICS: &[MetricDef] = &[
    TOKEN_EXTRACT_DURATION,
    TOKEN_EXTRACT_FAILED,
    REVIEWS_PAGE_DURATION,
    REVIEWS_PAGE_FAILED,
    RATE_LIMITED,
    REVIEWS_SKIPPED,
];
