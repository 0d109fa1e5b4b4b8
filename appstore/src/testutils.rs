//! In-process fakes for exercising the client without a network.

use async_trait::async_trait;
use http::{HeaderMap, StatusCode};
use shared::http_client::{HttpClient, HttpError, HttpResponse};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: String,
    pub headers: HeaderMap,
    pub at: Instant,
}

/// Answers GETs from a queue of canned results, in order. Once the queue is empty every
/// request gets the fallback, or a 404 when none is set.
#[derive(Default)]
pub struct ScriptedHttpClient {
    script: Mutex<VecDeque<Result<HttpResponse, HttpError>>>,
    fallback: Option<HttpResponse>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedHttpClient {
    pub fn new(script: impl IntoIterator<Item = Result<HttpResponse, HttpError>>) -> Self {
        ScriptedHttpClient {
            script: Mutex::new(script.into_iter().collect()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fallback(mut self, response: HttpResponse) -> Self {
        self.fallback = Some(response);
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpClient for ScriptedHttpClient {
    async fn get(&self, url: &str, headers: HeaderMap) -> Result<HttpResponse, HttpError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            url: url.to_string(),
            headers,
            at: Instant::now(),
        });

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => Ok(self.fallback.clone().unwrap_or_else(|| response(404, ""))),
        }
    }
}

pub fn response(status: u16, body: &str) -> HttpResponse {
    HttpResponse {
        status: StatusCode::from_u16(status).unwrap(),
        body: body.as_bytes().to_vec(),
    }
}

pub fn rate_limited() -> Result<HttpResponse, HttpError> {
    Ok(response(429, ""))
}

/// A raw review as the reviews endpoint would return it.
pub fn review_json(id: &str, date: &str, rating: i64) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "type": "user-reviews",
        "attributes": {
            "date": date,
            "rating": rating,
            "title": format!("title {id}"),
            "review": format!("content {id}"),
        }
    })
}

/// A 200 reviews page. `next_offset` becomes a relative `next` link when set.
pub fn page(reviews: Vec<serde_json::Value>, next_offset: Option<u32>) -> Result<HttpResponse, HttpError> {
    let mut body = serde_json::json!({ "data": reviews });
    if let Some(offset) = next_offset {
        body["next"] = serde_json::Value::String(format!(
            "/v1/catalog/us/apps/1/reviews?l=en-GB&offset={offset}&limit=20"
        ));
    }
    Ok(response(200, &body.to_string()))
}

/// A page of `count` reviews with ids `{prefix}{n}`, all dated `date`.
pub fn uniform_page(
    prefix: &str,
    count: usize,
    date: &str,
    next_offset: Option<u32>,
) -> Result<HttpResponse, HttpError> {
    let reviews = (0..count)
        .map(|n| review_json(&format!("{prefix}{n}"), date, 5))
        .collect();
    page(reviews, next_offset)
}
