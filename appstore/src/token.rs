use crate::headers::{UserAgentPool, landing_headers};
use crate::metrics_defs::{TOKEN_EXTRACT_DURATION, TOKEN_EXTRACT_FAILED};
use http::StatusCode;
use http::header::InvalidHeaderValue;
use regex::Regex;
use shared::http_client::{HttpClient, HttpError};
use shared::{counter, histogram};
use std::sync::{Arc, LazyLock};
use tokio::time::Instant;

// The landing page embeds its web config as JSON, usually percent-encoded inside a meta tag.
static TOKEN_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""token"\s*:\s*"([A-Za-z0-9_\-]+\.[A-Za-z0-9_\-]+\.[A-Za-z0-9_\-]+)""#)
        .expect("valid token pattern")
});

#[derive(thiserror::Error, Debug)]
pub enum TokenError {
    #[error("token not found")]
    TokenNotFound,
    #[error("unexpected status: {0}")]
    UnexpectedStatus(StatusCode),
    #[error("extract token failed: {0}")]
    Transport(#[from] HttpError),
    #[error("invalid request header: {0}")]
    InvalidHeader(#[from] InvalidHeaderValue),
}

pub struct TokenExtractor {
    http: Arc<dyn HttpClient>,
    landing_host: String,
    user_agents: UserAgentPool,
}

impl TokenExtractor {
    pub fn new(http: Arc<dyn HttpClient>, landing_host: &str, user_agents: UserAgentPool) -> Self {
        TokenExtractor {
            http,
            landing_host: landing_host.trim_end_matches('/').to_string(),
            user_agents,
        }
    }

    /// Fetches the app's landing page for `country` and pulls the bearer token out of it.
    pub async fn extract_token(
        &self,
        country: &str,
        app_name: &str,
        app_id: &str,
    ) -> Result<String, TokenError> {
        let start = Instant::now();
        let result = self.fetch_token(country, app_name, app_id).await;
        let latency = start.elapsed();

        histogram!(TOKEN_EXTRACT_DURATION).record(latency.as_secs_f64());
        match &result {
            Ok(_) => tracing::info!(
                event = "appstore.token.extracted",
                status = "success",
                latency_ms = latency.as_millis() as u64,
                country
            ),
            Err(e) => {
                counter!(TOKEN_EXTRACT_FAILED).increment(1);
                tracing::warn!(
                    event = "appstore.token.extracted",
                    status = "failed",
                    latency_ms = latency.as_millis() as u64,
                    country,
                    error = %e
                );
            }
        }

        result
    }

    async fn fetch_token(
        &self,
        country: &str,
        app_name: &str,
        app_id: &str,
    ) -> Result<String, TokenError> {
        let url = landing_url(&self.landing_host, country, app_name, app_id);
        tracing::debug!(country, app_name, url = %url, "extracting token from landing page");

        let headers = landing_headers(self.user_agents.pick())?;
        let response = self.http.get(&url, headers).await?;

        if response.status != StatusCode::OK {
            return Err(TokenError::UnexpectedStatus(response.status));
        }

        let body = String::from_utf8_lossy(&response.body);
        find_bearer_token(&body).ok_or(TokenError::TokenNotFound)
    }
}

/// `{host}/{country}/app/{slug}/id{numeric id}`
pub fn landing_url(host: &str, country: &str, app_name: &str, app_id: &str) -> String {
    let numeric_id = app_id.strip_prefix("id").unwrap_or(app_id);
    format!(
        "{}/{}/app/{}/id{}",
        host.trim_end_matches('/'),
        urlencoding::encode(&country.to_lowercase()),
        slugify(app_name),
        urlencoding::encode(numeric_id),
    )
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "app".to_string()
    } else {
        urlencoding::encode(slug).into_owned()
    }
}

/// Looks for the token in the page as-is first, then in its percent-decoded form.
pub fn find_bearer_token(body: &str) -> Option<String> {
    let capture = |text: &str| {
        TOKEN_FIELD
            .captures(text)
            .map(|captures| captures[1].to_string())
    };

    capture(body).or_else(|| {
        // Stray non-UTF-8 escapes elsewhere in the page must not hide the token.
        let decoded = urlencoding::decode_binary(body.as_bytes());
        capture(&String::from_utf8_lossy(&decoded))
    })
}
