pub mod admin_service;
pub mod http;
pub mod http_client;
pub mod metrics;
pub mod metrics_defs;
