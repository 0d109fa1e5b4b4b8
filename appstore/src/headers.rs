use http::header::{
    ACCEPT, ACCEPT_LANGUAGE, AUTHORIZATION, HeaderMap, HeaderName, HeaderValue,
    InvalidHeaderValue, ORIGIN, REFERER, USER_AGENT,
};
use rand::seq::IndexedRandom;

pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Linux; Android 10; K) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/133.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/133.0.0.0 Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1",
];

/// User agents rotated across requests. Each request picks one uniformly at random.
#[derive(Debug, Clone)]
pub struct UserAgentPool {
    agents: Vec<String>,
}

impl UserAgentPool {
    /// Falls back to the built-in pool when `agents` is empty.
    pub fn new(agents: Vec<String>) -> Self {
        let agents = if agents.is_empty() {
            DEFAULT_USER_AGENTS.iter().map(|a| a.to_string()).collect()
        } else {
            agents
        };
        UserAgentPool { agents }
    }

    pub fn pick(&self) -> &str {
        self.agents
            .choose(&mut rand::rng())
            .map(String::as_str)
            .unwrap_or(DEFAULT_USER_AGENTS[0])
    }

    #[cfg(test)]
    fn contains(&self, agent: &str) -> bool {
        self.agents.iter().any(|a| a == agent)
    }
}

impl Default for UserAgentPool {
    fn default() -> Self {
        UserAgentPool::new(Vec::new())
    }
}

pub fn landing_headers(user_agent: &str) -> Result<HeaderMap, InvalidHeaderValue> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("text/html,application/xhtml+xml"));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(USER_AGENT, HeaderValue::from_str(user_agent)?);
    Ok(headers)
}

/// Headers for the reviews endpoint, shaped like a browser's cross-site fetch.
pub fn api_headers(
    token: &str,
    referrer: &str,
    user_agent: &str,
) -> Result<HeaderMap, InvalidHeaderValue> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("bearer {token}"))?);
    headers.insert(ORIGIN, HeaderValue::from_static("https://apps.apple.com"));
    headers.insert(REFERER, HeaderValue::from_str(referrer)?);
    headers.insert(USER_AGENT, HeaderValue::from_str(user_agent)?);

    for (name, value) in [
        (
            "sec-ch-ua",
            r#""Not(A:Brand";v="99", "Google Chrome";v="133", "Chromium";v="133""#,
        ),
        ("sec-ch-ua-mobile", "?1"),
        ("sec-ch-ua-platform", r#""Android""#),
        ("sec-fetch-dest", "empty"),
        ("sec-fetch-mode", "cors"),
        ("sec-fetch-site", "same-site"),
    ] {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }

    Ok(headers)
}
