//! Link fetching with retry and exponential backoff.
//!
//! Every attempt sends a realistic browser-identifying header set, rotating
//! among several presets to reduce trivial bot-blocking. Failures (network
//! errors or non-success HTTP statuses) are retried up to a fixed ceiling
//! with delays doubling per attempt (2s, 4s, 8s at the default base).
//! Exhausting the ceiling surfaces the last error as
//! [`IngestError::FetchFailed`].

use std::time::Duration;

use crate::config::FetchConfig;
use crate::normalize::IngestError;

/// Outcome of a single fetch attempt.
#[derive(Debug)]
pub enum FetchOutcome {
    /// 2xx response with its decoded body.
    Success { body: String },
    /// The server responded with a non-success status.
    HttpFailure(u16),
    /// The request never completed (DNS, connect, timeout).
    NetworkFailure(String),
}

/// Browser header presets rotated across attempts.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.5 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:124.0) Gecko/20100101 Firefox/124.0",
];

const ACCEPT_HEADER: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

/// Build the shared HTTP client with the configured request timeout.
pub fn build_client(config: &FetchConfig) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

/// Delay before retry number `attempt` (1-based): base × 2^attempt.
/// With the 1s default base this yields 2s, 4s, 8s.
pub fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    Duration::from_millis(base_ms.saturating_mul(1u64 << attempt.min(16)))
}

/// Perform a single fetch attempt, classifying the result.
pub async fn fetch_once(
    client: &reqwest::Client,
    url: &str,
    user_agent: &str,
) -> FetchOutcome {
    let resp = client
        .get(url)
        .header("User-Agent", user_agent)
        .header("Accept", ACCEPT_HEADER)
        .header("Accept-Language", "en-US,en;q=0.8")
        .header("Cache-Control", "no-cache")
        .header("Upgrade-Insecure-Requests", "1")
        .send()
        .await;

    match resp {
        Ok(response) => {
            let status = response.status();
            if !status.is_success() {
                return FetchOutcome::HttpFailure(status.as_u16());
            }
            match response.text().await {
                Ok(body) => FetchOutcome::Success { body },
                Err(e) => FetchOutcome::NetworkFailure(e.to_string()),
            }
        }
        Err(e) => FetchOutcome::NetworkFailure(e.to_string()),
    }
}

/// Fetch a URL, retrying failed attempts with exponential backoff.
///
/// Returns the response body on the first successful attempt. After
/// `max_attempts` failures the last error is surfaced as `FetchFailed`.
pub async fn fetch_with_retry(
    client: &reqwest::Client,
    url: &str,
    config: &FetchConfig,
) -> Result<String, IngestError> {
    let mut last_err = String::new();

    for attempt in 0..config.max_attempts {
        let user_agent = USER_AGENTS[attempt as usize % USER_AGENTS.len()];

        match fetch_once(client, url, user_agent).await {
            FetchOutcome::Success { body } => return Ok(body),
            FetchOutcome::HttpFailure(status) => {
                last_err = format!("HTTP status {}", status);
            }
            FetchOutcome::NetworkFailure(cause) => {
                last_err = cause;
            }
        }

        if attempt + 1 < config.max_attempts {
            tokio::time::sleep(backoff_delay(config.backoff_base_ms, attempt + 1)).await;
        }
    }

    Err(IngestError::FetchFailed(format!(
        "{} ({} attempts)",
        last_err, config.max_attempts
    )))
}
