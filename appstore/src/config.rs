use crate::backoff::RetryPolicy;
use serde::Deserialize;
use shared::http_client::TransportConfig;
use std::time::Duration;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("api_path must contain the {{country}} and {{app_id}} placeholders")]
    ApiPathPlaceholders,
    #[error("{0} must be an absolute http(s) URL")]
    InvalidHost(&'static str),
    #[error("page_size must be between 1 and 200")]
    InvalidPageSize,
}

fn default_landing_host() -> String {
    "https://apps.apple.com".into()
}

fn default_api_host() -> String {
    "https://amp-api-edge.apps.apple.com".into()
}

fn default_api_path() -> String {
    "/v1/catalog/{country}/apps/{app_id}/reviews".into()
}

fn default_referrer() -> String {
    "https://apps.apple.com/".into()
}

fn default_page_size() -> u32 {
    20
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Config {
    #[serde(default = "default_landing_host")]
    pub landing_host: String,
    #[serde(default = "default_api_host")]
    pub api_host: String,
    /// Path template with `{country}` and `{app_id}` placeholders.
    #[serde(default = "default_api_path")]
    pub api_path: String,
    #[serde(default = "default_referrer")]
    pub referrer: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    pub inter_page_delay_ms: Option<u64>,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            landing_host: default_landing_host(),
            api_host: default_api_host(),
            api_path: default_api_path(),
            referrer: default_referrer(),
            page_size: default_page_size(),
            inter_page_delay_ms: None,
            rate_limit: RateLimitConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.api_path.contains("{country}") || !self.api_path.contains("{app_id}") {
            return Err(ValidationError::ApiPathPlaceholders);
        }

        for (name, host) in [
            ("landing_host", &self.landing_host),
            ("api_host", &self.api_host),
        ] {
            match url::Url::parse(host) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {}
                _ => return Err(ValidationError::InvalidHost(name)),
            }
        }

        if !(1..=200).contains(&self.page_size) {
            return Err(ValidationError::InvalidPageSize);
        }

        Ok(())
    }

    pub fn inter_page_delay(&self) -> Option<Duration> {
        self.inter_page_delay_ms.map(Duration::from_millis)
    }
}

/// Backoff applied when the reviews endpoint answers with 429.
#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub max_retries: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        RateLimitConfig {
            initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
            max_backoff_ms: policy.max_backoff.as_millis() as u64,
            max_retries: policy.max_retries,
        }
    }
}

impl From<&RateLimitConfig> for RetryPolicy {
    fn from(config: &RateLimitConfig) -> Self {
        RetryPolicy {
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            max_retries: config.max_retries,
        }
    }
}

/// Transport settings shared by the landing page and reviews requests.
#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
    pub user_agents: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        let transport = TransportConfig::default();
        HttpConfig {
            timeout_secs: transport.timeout.as_secs(),
            max_retries: transport.max_retries,
            backoff_initial_ms: transport.backoff_initial.as_millis() as u64,
            backoff_max_ms: transport.backoff_max.as_millis() as u64,
            user_agents: Vec::new(),
        }
    }
}

impl From<&HttpConfig> for TransportConfig {
    fn from(config: &HttpConfig) -> Self {
        TransportConfig {
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
            backoff_initial: Duration::from_millis(config.backoff_initial_ms),
            backoff_max: Duration::from_millis(config.backoff_max_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_section() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
        assert!(config.validate().is_ok());
        assert_eq!(RetryPolicy::from(&config.rate_limit), RetryPolicy::default());
    }

    #[test]
    fn test_parse_full_section() {
        let yaml = r#"
api_host: "http://127.0.0.1:9000"
api_path: "/catalog/{country}/{app_id}/reviews"
page_size: 10
inter_page_delay_ms: 250
rate_limit:
    initial_backoff_ms: 10
    max_backoff_ms: 40
    max_retries: 2
http:
    timeout_secs: 3
    user_agents:
        - agent-a
        - agent-b
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.page_size, 10);
        assert_eq!(config.inter_page_delay(), Some(Duration::from_millis(250)));
        assert_eq!(config.rate_limit.max_retries, 2);
        assert_eq!(config.http.user_agents.len(), 2);
        // Unset transport fields keep their defaults.
        assert_eq!(config.http.max_retries, TransportConfig::default().max_retries);
        assert_eq!(
            TransportConfig::from(&config.http).timeout,
            Duration::from_secs(3)
        );
    }

    #[test]
    fn test_validation_errors() {
        let mut config = Config::default();
        config.api_path = "/v1/reviews".into();
        assert_eq!(config.validate(), Err(ValidationError::ApiPathPlaceholders));

        let mut config = Config::default();
        config.api_host = "not a url".into();
        assert_eq!(
            config.validate(),
            Err(ValidationError::InvalidHost("api_host"))
        );

        let mut config = Config::default();
        config.page_size = 0;
        assert_eq!(config.validate(), Err(ValidationError::InvalidPageSize));
    }
}
