use crate::backoff::{Backoff, RetryPolicy};
use crate::config::Config;
use crate::cursor::NextPage;
use crate::headers::{UserAgentPool, api_headers};
use crate::metrics_defs::{RATE_LIMITED, REVIEWS_PAGE_DURATION, REVIEWS_PAGE_FAILED, REVIEWS_SKIPPED};
use crate::types::{Review, ReviewsPage};
use chrono::{DateTime, Utc};
use http::StatusCode;
use http::header::InvalidHeaderValue;
use shared::http_client::{HttpClient, HttpError};
use shared::{counter, histogram};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const PLATFORMS: &str = "appletv,ipad,iphone,mac";

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub page_size: u32,
    /// Offset of the first page to request.
    pub offset: u32,
    /// Reviews older than this are dropped, and pagination stops at the first page
    /// without any review at or after it.
    pub after: Option<DateTime<Utc>>,
    /// Reviews newer than this are dropped. Does not affect pagination.
    pub before: Option<DateTime<Utc>>,
    /// Stop as soon as this many reviews were collected. `Some(0)` means no cap.
    pub max_total: Option<usize>,
    pub inter_page_delay: Option<Duration>,
    pub retry: RetryPolicy,
}

impl Default for FetchOptions {
    fn default() -> Self {
        FetchOptions {
            page_size: 20,
            offset: 0,
            after: None,
            before: None,
            max_total: None,
            inter_page_delay: None,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("app not available in country {0}")]
    AppNotAvailable(String),
    #[error("rate limited")]
    RateLimited,
    #[error("unexpected status: {0}")]
    UnexpectedStatus(StatusCode),
    #[error("fetch reviews failed: {0}")]
    Transport(#[from] HttpError),
    #[error("invalid reviews response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid request header: {0}")]
    InvalidHeader(#[from] InvalidHeaderValue),
    #[error("still rate limited after {retries} retries")]
    RetriesExhausted { retries: u32 },
    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn is_rate_limited(&self) -> bool {
        match self {
            FetchError::RateLimited => true,
            FetchError::Transport(e) => e.is_rate_limited(),
            _ => false,
        }
    }
}

/// A pagination run that ended in an error. `reviews` holds everything collected
/// before the failure.
#[derive(thiserror::Error, Debug)]
#[error("{source}")]
pub struct PartialFetch {
    pub reviews: Vec<Review>,
    pub source: FetchError,
}

pub struct ReviewFetcher {
    http: Arc<dyn HttpClient>,
    api_host: String,
    api_path: String,
    referrer: String,
    user_agents: UserAgentPool,
}

impl ReviewFetcher {
    pub fn new(http: Arc<dyn HttpClient>, config: &Config) -> Self {
        ReviewFetcher {
            http,
            api_host: config.api_host.trim_end_matches('/').to_string(),
            api_path: config.api_path.clone(),
            referrer: config.referrer.clone(),
            user_agents: UserAgentPool::new(config.http.user_agents.clone()),
        }
    }

    pub fn request_url(&self, country: &str, app_id: &str, offset: u32, page_size: u32) -> String {
        let numeric_id = app_id.strip_prefix("id").unwrap_or(app_id);
        let path = self
            .api_path
            .replace("{country}", &urlencoding::encode(&country.to_lowercase()))
            .replace("{app_id}", &urlencoding::encode(numeric_id));

        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("l", "en-GB")
            .append_pair("offset", &offset.to_string())
            .append_pair("sort", "recent")
            .append_pair("limit", &page_size.to_string())
            .append_pair("platform", "web")
            .append_pair("additionalPlatforms", PLATFORMS)
            .append_pair("meta", "robots")
            .finish();

        format!("{}/{}?{}", self.api_host, path.trim_start_matches('/'), query)
    }

    /// Fetches a single page of reviews starting at `offset`.
    pub async fn fetch_reviews(
        &self,
        token: &str,
        country: &str,
        app_id: &str,
        offset: u32,
        page_size: u32,
    ) -> Result<ReviewsPage, FetchError> {
        let start = Instant::now();
        let result = self.request_page(token, country, app_id, offset, page_size).await;
        let latency = start.elapsed();

        histogram!(REVIEWS_PAGE_DURATION).record(latency.as_secs_f64());
        match &result {
            Ok(page) => tracing::info!(
                event = "appstore.reviews.request",
                status = "success",
                latency_ms = latency.as_millis() as u64,
                country,
                offset,
                count = page.data.len()
            ),
            Err(e) => {
                if e.is_rate_limited() {
                    counter!(RATE_LIMITED).increment(1);
                } else {
                    counter!(REVIEWS_PAGE_FAILED).increment(1);
                }
                tracing::warn!(
                    event = "appstore.reviews.request",
                    status = "failed",
                    latency_ms = latency.as_millis() as u64,
                    country,
                    offset,
                    error = %e
                );
            }
        }

        result
    }

    async fn request_page(
        &self,
        token: &str,
        country: &str,
        app_id: &str,
        offset: u32,
        page_size: u32,
    ) -> Result<ReviewsPage, FetchError> {
        let url = self.request_url(country, app_id, offset, page_size);
        let headers = api_headers(token, &self.referrer, self.user_agents.pick())?;
        let response = self.http.get(&url, headers).await?;

        match response.status {
            StatusCode::OK => Ok(serde_json::from_slice(&response.body)?),
            StatusCode::NOT_FOUND => Err(FetchError::AppNotAvailable(country.to_string())),
            StatusCode::TOO_MANY_REQUESTS => Err(FetchError::RateLimited),
            status => Err(FetchError::UnexpectedStatus(status)),
        }
    }

    /// Walks the review pages for one country until the cursor runs out, the date
    /// window is left, `max_total` is reached, or an error occurs.
    ///
    /// Rate limiting is retried at the same offset according to `options.retry`. Any
    /// other error, and cancellation, end the walk; the reviews collected so far are
    /// returned inside the `PartialFetch`.
    pub async fn fetch_all_reviews(
        &self,
        token: &str,
        country: &str,
        app_id: &str,
        options: &FetchOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<Review>, PartialFetch> {
        let mut reviews = Vec::new();
        match self
            .paginate(token, country, app_id, options, cancel, &mut reviews)
            .await
        {
            Ok(()) => Ok(reviews),
            Err(source) => Err(PartialFetch { reviews, source }),
        }
    }

    async fn paginate(
        &self,
        token: &str,
        country: &str,
        app_id: &str,
        options: &FetchOptions,
        cancel: &CancellationToken,
        reviews: &mut Vec<Review>,
    ) -> Result<(), FetchError> {
        let max_total = options.max_total.filter(|max| *max > 0);
        let mut backoff = Backoff::new(options.retry);
        let mut offset = options.offset;

        loop {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                result = self.fetch_reviews(token, country, app_id, offset, options.page_size) => result,
            };

            let page = match result {
                Ok(page) => page,
                Err(e) if e.is_rate_limited() => {
                    let delay = backoff.on_rate_limited();
                    tracing::warn!(
                        country,
                        offset,
                        state = ?backoff.state(),
                        delay_ms = delay.map(|d| d.as_millis() as u64),
                        "rate limited"
                    );
                    let Some(delay) = delay else {
                        return Err(FetchError::RetriesExhausted {
                            retries: backoff.retries(),
                        });
                    };
                    sleep_or_cancel(delay, cancel).await?;
                    continue;
                }
                Err(e) => return Err(e),
            };
            backoff.reset();

            let mut in_window = 0;
            for raw in page.data {
                let review = match Review::from_raw(raw, app_id, country) {
                    Ok(review) => review,
                    Err(e) => {
                        counter!(REVIEWS_SKIPPED).increment(1);
                        tracing::warn!(country, error = %e, "skipping malformed review");
                        continue;
                    }
                };

                if options.after.is_some_and(|after| review.reviewed_at < after) {
                    continue;
                }
                in_window += 1;
                if options.before.is_some_and(|before| review.reviewed_at > before) {
                    continue;
                }

                reviews.push(review);
                if max_total.is_some_and(|max| reviews.len() >= max) {
                    return Ok(());
                }
            }

            let Some(next) = page.next.filter(|next| !next.is_empty()) else {
                return Ok(());
            };

            if options.after.is_some() && in_window == 0 {
                tracing::debug!(country, offset, "page is past the date window, stopping");
                return Ok(());
            }

            offset = match next.parse::<NextPage>() {
                Ok(next_page) => next_page.offset,
                Err(e) => {
                    tracing::warn!(country, next = %next, error = %e, "unusable next link, stopping");
                    return Ok(());
                }
            };

            if let Some(delay) = options.inter_page_delay {
                sleep_or_cancel(delay, cancel).await?;
            }
        }
    }
}

async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> Result<(), FetchError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FetchError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{ScriptedHttpClient, page, rate_limited, response, review_json, uniform_page};
    use chrono::TimeZone;
    use http::header::AUTHORIZATION;

    const MARCH_5: &str = "2024-03-05T12:00:00Z";
    const FEB_1: &str = "2024-02-01T12:00:00Z";

    fn fetcher(client: &Arc<ScriptedHttpClient>) -> ReviewFetcher {
        let config = Config {
            api_host: "https://api.test".into(),
            ..Config::default()
        };
        ReviewFetcher::new(client.clone(), &config)
    }

    fn offsets(client: &ScriptedHttpClient) -> Vec<String> {
        client
            .requests()
            .iter()
            .map(|r| {
                url::Url::parse(&r.url)
                    .unwrap()
                    .query_pairs()
                    .find(|(k, _)| k == "offset")
                    .map(|(_, v)| v.into_owned())
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_request_url() {
        let client = Arc::new(ScriptedHttpClient::default());
        let url = fetcher(&client).request_url("US", "id1234", 40, 20);
        assert_eq!(
            url,
            "https://api.test/v1/catalog/us/apps/1234/reviews?l=en-GB&offset=40&sort=recent&limit=20&platform=web&additionalPlatforms=appletv%2Cipad%2Ciphone%2Cmac&meta=robots"
        );
    }

    #[test]
    fn test_request_url_joins_path_without_leading_slash() {
        let config = Config {
            api_host: "https://api.test/".into(),
            api_path: "v1/catalog/{country}/apps/{app_id}/reviews".into(),
            ..Config::default()
        };
        let fetcher = ReviewFetcher::new(Arc::new(ScriptedHttpClient::default()), &config);

        let url = fetcher.request_url("us", "1234", 0, 20);
        assert!(url.starts_with("https://api.test/v1/catalog/us/apps/1234/reviews?l=en-GB&offset=0"));
    }

    #[tokio::test]
    async fn test_fetch_reviews_status_mapping() {
        let client = Arc::new(ScriptedHttpClient::new([
            Ok(response(404, "")),
            rate_limited(),
            Ok(response(403, "")),
            Ok(response(200, "not json")),
        ]));
        let fetcher = fetcher(&client);

        let fetch = || fetcher.fetch_reviews("tok", "de", "1", 0, 20);
        assert!(matches!(fetch().await, Err(FetchError::AppNotAvailable(c)) if c == "de"));
        assert!(matches!(fetch().await, Err(FetchError::RateLimited)));
        assert!(matches!(
            fetch().await,
            Err(FetchError::UnexpectedStatus(StatusCode::FORBIDDEN))
        ));
        assert!(matches!(fetch().await, Err(FetchError::Decode(_))));
    }

    #[tokio::test]
    async fn test_token_is_sent_as_bearer() {
        let client = Arc::new(ScriptedHttpClient::new([page(vec![], None)]));
        fetcher(&client)
            .fetch_reviews("my-token", "us", "1", 0, 20)
            .await
            .unwrap();

        assert_eq!(client.requests()[0].headers[AUTHORIZATION], "bearer my-token");
    }

    #[tokio::test]
    async fn test_follows_cursor_until_no_next() {
        let client = Arc::new(ScriptedHttpClient::new([
            uniform_page("a", 20, MARCH_5, Some(20)),
            uniform_page("b", 20, MARCH_5, Some(40)),
            uniform_page("c", 3, MARCH_5, None),
        ]));

        let reviews = fetcher(&client)
            .fetch_all_reviews("tok", "us", "1", &FetchOptions::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(reviews.len(), 43);
        assert_eq!(offsets(&client), vec!["0", "20", "40"]);
        assert_eq!(reviews[0].id, "a0");
        assert_eq!(reviews[42].id, "c2");
    }

    #[tokio::test]
    async fn test_starts_at_configured_offset() {
        let client = Arc::new(ScriptedHttpClient::new([uniform_page("a", 2, MARCH_5, None)]));
        let options = FetchOptions {
            offset: 60,
            ..FetchOptions::default()
        };

        fetcher(&client)
            .fetch_all_reviews("tok", "us", "1", &options, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(offsets(&client), vec!["60"]);
    }

    #[tokio::test]
    async fn test_stops_after_page_outside_date_window() {
        let client = Arc::new(ScriptedHttpClient::new([
            uniform_page("new", 20, MARCH_5, Some(20)),
            uniform_page("old", 20, FEB_1, Some(40)),
            uniform_page("older", 20, FEB_1, Some(60)),
        ]));
        let options = FetchOptions {
            after: Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()),
            ..FetchOptions::default()
        };

        let reviews = fetcher(&client)
            .fetch_all_reviews("tok", "us", "1", &options, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(reviews.len(), 20);
        assert!(reviews.iter().all(|r| r.id.starts_with("new")));
        assert_eq!(client.request_count(), 2);
    }

    #[tokio::test]
    async fn test_before_filter_does_not_stop_pagination() {
        let client = Arc::new(ScriptedHttpClient::new([
            uniform_page("new", 5, MARCH_5, Some(20)),
            uniform_page("old", 5, FEB_1, None),
        ]));
        let options = FetchOptions {
            before: Some(Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 59).unwrap()),
            ..FetchOptions::default()
        };

        let reviews = fetcher(&client)
            .fetch_all_reviews("tok", "us", "1", &options, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(reviews.len(), 5);
        assert!(reviews.iter().all(|r| r.id.starts_with("old")));
        assert_eq!(client.request_count(), 2);
    }

    #[tokio::test]
    async fn test_max_total_short_circuits() {
        let client = Arc::new(ScriptedHttpClient::new([
            uniform_page("a", 20, MARCH_5, Some(20)),
            uniform_page("b", 20, MARCH_5, Some(40)),
            uniform_page("c", 20, MARCH_5, Some(60)),
        ]));
        let options = FetchOptions {
            max_total: Some(25),
            ..FetchOptions::default()
        };

        let reviews = fetcher(&client)
            .fetch_all_reviews("tok", "us", "1", &options, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(reviews.len(), 25);
        assert_eq!(client.request_count(), 2);
    }

    #[tokio::test]
    async fn test_malformed_reviews_are_skipped() {
        let client = Arc::new(ScriptedHttpClient::new([page(
            vec![
                review_json("1", MARCH_5, 5),
                review_json("2", "not-a-date", 4),
                review_json("3", MARCH_5, 3),
                review_json("4", MARCH_5, 9),
            ],
            None,
        )]));

        let reviews = fetcher(&client)
            .fetch_all_reviews("tok", "us", "1", &FetchOptions::default(), &CancellationToken::new())
            .await
            .unwrap();

        let ids: Vec<_> = reviews.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[tokio::test]
    async fn test_null_or_missing_review_date_does_not_fail_the_page() {
        let client = Arc::new(ScriptedHttpClient::new([page(
            vec![
                review_json("1", MARCH_5, 5),
                serde_json::json!({
                    "id": "2",
                    "type": "user-reviews",
                    "attributes": { "date": null, "rating": 4, "title": "t", "review": "r" }
                }),
                serde_json::json!({
                    "id": "3",
                    "type": "user-reviews",
                    "attributes": { "rating": 4, "title": "t", "review": "r" }
                }),
                serde_json::json!({
                    "id": "4",
                    "type": "user-reviews",
                    "attributes": { "date": MARCH_5, "title": "t", "review": "r" }
                }),
                review_json("5", MARCH_5, 3),
            ],
            None,
        )]));

        let reviews = fetcher(&client)
            .fetch_all_reviews("tok", "us", "1", &FetchOptions::default(), &CancellationToken::new())
            .await
            .unwrap();

        let ids: Vec<_> = reviews.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "5"]);
    }

    #[tokio::test]
    async fn test_unusable_next_link_stops() {
        let client = Arc::new(ScriptedHttpClient::new([Ok(response(
            200,
            &serde_json::json!({
                "next": "/v1/catalog/us/apps/1/reviews?cursor=abc",
                "data": [review_json("1", MARCH_5, 5)]
            })
            .to_string(),
        ))]));

        let reviews = fetcher(&client)
            .fetch_all_reviews("tok", "us", "1", &FetchOptions::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(reviews.len(), 1);
        assert_eq!(client.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_retries_same_offset_then_recovers() {
        let client = Arc::new(ScriptedHttpClient::new([
            uniform_page("a", 20, MARCH_5, Some(20)),
            rate_limited(),
            rate_limited(),
            uniform_page("b", 3, MARCH_5, None),
        ]));

        let reviews = fetcher(&client)
            .fetch_all_reviews("tok", "us", "1", &FetchOptions::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(reviews.len(), 23);
        assert_eq!(offsets(&client), vec!["0", "20", "20", "20"]);

        let at: Vec<_> = client.requests().iter().map(|r| r.at).collect();
        assert_eq!(at[2] - at[1], Duration::from_secs(1));
        assert_eq!(at[3] - at[2], Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_exhausts_retries_within_bounds() {
        let client = Arc::new(ScriptedHttpClient::default().with_fallback(response(429, "")));
        let retry = RetryPolicy {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(3),
            max_retries: 4,
        };
        let options = FetchOptions {
            retry,
            ..FetchOptions::default()
        };

        let err = fetcher(&client)
            .fetch_all_reviews("tok", "us", "1", &options, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err.source, FetchError::RetriesExhausted { retries: 4 }));
        assert!(err.reviews.is_empty());
        assert_eq!(client.request_count(), retry.max_retries as usize + 1);

        let at: Vec<_> = client.requests().iter().map(|r| r.at).collect();
        let gaps: Vec<_> = at.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(
            gaps,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(3),
                Duration::from_secs(3)
            ]
        );
        assert!(gaps.iter().all(|gap| *gap <= retry.max_backoff));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_transport_error_counts_as_rate_limit() {
        let client = Arc::new(ScriptedHttpClient::new([
            Err(HttpError::RetriesExceeded {
                status: StatusCode::TOO_MANY_REQUESTS,
                retries: 1,
            }),
            uniform_page("a", 1, MARCH_5, None),
        ]));

        let reviews = fetcher(&client)
            .fetch_all_reviews("tok", "us", "1", &FetchOptions::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(reviews.len(), 1);
        assert_eq!(client.request_count(), 2);
    }

    #[tokio::test]
    async fn test_error_keeps_collected_reviews() {
        let client = Arc::new(ScriptedHttpClient::new([
            uniform_page("a", 20, MARCH_5, Some(20)),
            Err(HttpError::RetriesExceeded {
                status: StatusCode::BAD_GATEWAY,
                retries: 2,
            }),
        ]));

        let err = fetcher(&client)
            .fetch_all_reviews("tok", "us", "1", &FetchOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err.source, FetchError::Transport(_)));
        assert_eq!(err.reviews.len(), 20);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_page() {
        let client = Arc::new(ScriptedHttpClient::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = fetcher(&client)
            .fetch_all_reviews("tok", "us", "1", &FetchOptions::default(), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err.source, FetchError::Cancelled));
        assert_eq!(client.request_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_inter_page_delay_returns_partial() {
        let client = Arc::new(ScriptedHttpClient::new([
            uniform_page("a", 20, MARCH_5, Some(20)),
            uniform_page("b", 20, MARCH_5, None),
        ]));
        let options = FetchOptions {
            inter_page_delay: Some(Duration::from_secs(3600)),
            ..FetchOptions::default()
        };
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            canceller.cancel();
        });

        let err = fetcher(&client)
            .fetch_all_reviews("tok", "us", "1", &options, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err.source, FetchError::Cancelled));
        assert_eq!(err.reviews.len(), 20);
        assert_eq!(client.request_count(), 1);
    }
}
