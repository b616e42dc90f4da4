//! Translates a stored job into outbound HTTP call(s) against the remote
//! scraping service, with poll-to-completion semantics for async operations.
//!
//! Kept pure of persistence concerns: `Runner` never touches the store, so
//! it is trivially testable against a fake HTTP transport (`wiremock`). The
//! `Scheduler` wraps every `Runner::execute` call with the JobRun bookkeeping
//! instead.

use std::time::Duration;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::model::{JobType, ScheduledJob};
use crate::store::BoxFuture;

const SCRAPE_TIMEOUT: Duration = Duration::from_secs(300);
const CRAWL_TIMEOUT: Duration = Duration::from_secs(300);
const MAP_TIMEOUT: Duration = Duration::from_secs(120);
const BATCH_TIMEOUT: Duration = Duration::from_secs(300);
const POLL_INTERVAL: Duration = Duration::from_secs(5);
const POLL_MAX_ATTEMPTS: u32 = 120;

/// Default User-Agent header value sent with every outbound request.
const DEFAULT_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Executes a `ScheduledJob` against its remote API, returning the terminal
/// result payload or a typed error. Never throws past the caller — every
/// outcome is an `Ok`/`Err` of this call.
pub trait Runner: Send + Sync {
    fn execute<'a>(
        &'a self,
        job: &'a ScheduledJob,
        cancellation: CancellationToken,
    ) -> BoxFuture<'a, Result<Value>>;
}

/// `Runner` backed by a bare `reqwest::Client` — deliberately without the
/// teacher's `reqwest-middleware`/`reqwest-retry` transient-retry wrapper:
/// the recurrence rule is the only retry policy this system permits within
/// a single run.
pub struct HttpRunner {
    client: reqwest::Client,
}

impl HttpRunner {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .map_err(|e| Error::RemoteError(e.to_string()))?;
        Ok(Self { client })
    }
}

impl Default for HttpRunner {
    fn default() -> Self {
        Self::new().expect("building the default reqwest client cannot fail")
    }
}

impl Runner for HttpRunner {
    fn execute<'a>(
        &'a self,
        job: &'a ScheduledJob,
        cancellation: CancellationToken,
    ) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            match job.job_type {
                JobType::Scrape => self.run_scrape(job, &cancellation).await,
                JobType::Crawl => self.run_crawl(job, &cancellation).await,
                JobType::Map => self.run_map(job, &cancellation).await,
                JobType::Batch => self.run_batch(job, &cancellation).await,
            }
        })
    }
}

impl HttpRunner {
    async fn run_scrape(&self, job: &ScheduledJob, cancel: &CancellationToken) -> Result<Value> {
        let url = job.url.as_deref().unwrap_or_default();
        let mut body = scrape_options(&job.job_config);
        body.insert("url".to_string(), Value::String(url.to_string()));

        let response = self
            .post(
                &format!("{}/v1/scrape", job.api_endpoint),
                Value::Object(body),
                SCRAPE_TIMEOUT,
                cancel,
            )
            .await?;
        Ok(extract_data(response))
    }

    async fn run_crawl(&self, job: &ScheduledJob, cancel: &CancellationToken) -> Result<Value> {
        let url = job.url.as_deref().unwrap_or_default();
        let mut body = Map::new();
        body.insert("url".to_string(), Value::String(url.to_string()));
        if let Some(limit) = job.job_config.get("limit") {
            body.insert("limit".to_string(), limit.clone());
        }
        body.insert(
            "scrapeOptions".to_string(),
            Value::Object(scrape_options(&job.job_config)),
        );

        let response = self
            .post(
                &format!("{}/v1/crawl", job.api_endpoint),
                Value::Object(body),
                CRAWL_TIMEOUT,
                cancel,
            )
            .await?;

        match response.get("id").and_then(Value::as_str) {
            Some(id) => {
                let base = format!("{}/v1/crawl/{}", job.api_endpoint, id);
                self.poll_until_terminal(&base, cancel).await
            }
            None => Ok(extract_data(response)),
        }
    }

    async fn run_map(&self, job: &ScheduledJob, cancel: &CancellationToken) -> Result<Value> {
        let url = job.url.as_deref().unwrap_or_default();
        let mut body = Map::new();
        body.insert("url".to_string(), Value::String(url.to_string()));

        let response = self
            .post(
                &format!("{}/v1/map", job.api_endpoint),
                Value::Object(body),
                MAP_TIMEOUT,
                cancel,
            )
            .await?;

        Ok(response
            .get("links")
            .cloned()
            .unwrap_or_else(|| extract_data(response)))
    }

    async fn run_batch(&self, job: &ScheduledJob, cancel: &CancellationToken) -> Result<Value> {
        let urls: Vec<Value> = job
            .urls
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|u| Value::String(u.clone()))
            .collect();
        let mut body = Map::new();
        body.insert("urls".to_string(), Value::Array(urls));
        body.insert(
            "scrapeOptions".to_string(),
            Value::Object(scrape_options(&job.job_config)),
        );

        let response = self
            .post(
                &format!("{}/v1/batch/scrape", job.api_endpoint),
                Value::Object(body),
                BATCH_TIMEOUT,
                cancel,
            )
            .await?;

        match response.get("id").and_then(Value::as_str) {
            Some(id) => {
                let base = format!("{}/v1/batch/scrape/{}", job.api_endpoint, id);
                self.poll_until_terminal(&base, cancel).await
            }
            None => Ok(extract_data(response)),
        }
    }

    /// Sends a POST, racing the hard timeout against cancellation.
    async fn post(
        &self,
        url: &str,
        body: Value,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let send = async {
            tokio::time::timeout(timeout, self.client.post(url).json(&body).send())
                .await
                .map_err(|_| Error::LocalTimeout(format!("POST {url} exceeded {timeout:?}")))?
                .map_err(|e| Error::RemoteError(e.to_string()))
        };

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::LocalTimeout(format!("POST {url} cancelled"))),
            r = send => r?,
        };

        handle_response(response).await
    }

    async fn poll_until_terminal(&self, url: &str, cancel: &CancellationToken) -> Result<Value> {
        for _ in 0..POLL_MAX_ATTEMPTS {
            let recv = async {
                tokio::time::timeout(SCRAPE_TIMEOUT, self.client.get(url).send())
                    .await
                    .map_err(|_| Error::LocalTimeout(format!("GET {url} exceeded {SCRAPE_TIMEOUT:?}")))?
                    .map_err(|e| Error::RemoteError(e.to_string()))
            };

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::LocalTimeout(format!("GET {url} cancelled"))),
                r = recv => r?,
            };

            let body = handle_response(response).await?;
            match body.get("status").and_then(Value::as_str) {
                Some("completed") => return Ok(extract_data(body)),
                Some("failed") => {
                    let message = body
                        .get("error")
                        .and_then(Value::as_str)
                        .unwrap_or("remote reported failure")
                        .to_string();
                    return Err(Error::RemoteError(message));
                }
                _ => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            return Err(Error::LocalTimeout(format!("poll of {url} cancelled")));
                        }
                        _ = tokio::time::sleep(POLL_INTERVAL) => {}
                    }
                }
            }
        }
        Err(Error::PollTimeout(format!(
            "{url} did not reach a terminal status within {POLL_MAX_ATTEMPTS} attempts"
        )))
    }
}

/// Maps a non-2xx status to the error taxonomy, and parses a 2xx body as
/// JSON (tolerating unmodeled fields — only the fields read above matter).
async fn handle_response(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<Value>()
            .await
            .map_err(|e| Error::RemoteError(format!("invalid JSON response: {e}")));
    }

    let status_text = status.canonical_reason().unwrap_or("unknown").to_string();
    let body = response.text().await.unwrap_or_default();
    let truncated: String = body.chars().take(500).collect();
    let message = format!("HTTP {} {status_text}: {truncated}", status.as_u16());

    match status.as_u16() {
        408 => Err(Error::RemoteTimeout(message)),
        429 => Err(Error::RemoteRateLimited(message)),
        500..=599 => Err(Error::RemoteUnavailable(message)),
        _ => Err(Error::RemoteError(message)),
    }
}

/// `data` field, falling back to the whole body when absent.
fn extract_data(body: Value) -> Value {
    match body {
        Value::Object(ref map) if map.contains_key("data") => map["data"].clone(),
        other => other,
    }
}

/// Projects `job_config` onto the remote's `scrapeOptions` shape. Only
/// fields explicitly present in `job_config` are forwarded — absent fields
/// are omitted, not defaulted, so the remote applies its own defaults. Each
/// field is read and validated independently off the raw `Value`: a
/// type-mismatched field (e.g. `"timeout": "30"`) is skipped on its own
/// rather than discarding sibling fields that parsed fine.
fn scrape_options(job_config: &Value) -> Map<String, Value> {
    let mut out = Map::new();

    if let Some(v) = job_config.get("formats") {
        out.insert("formats".to_string(), v.clone());
    }
    if let Some(v) = job_config.get("onlyMainContent").and_then(Value::as_bool) {
        out.insert("onlyMainContent".to_string(), Value::Bool(v));
    }
    if let Some(v) = job_config.get("includeTags") {
        out.insert("includeTags".to_string(), v.clone());
    }
    if let Some(v) = job_config.get("excludeTags") {
        out.insert("excludeTags".to_string(), v.clone());
    }
    if let Some(seconds) = job_config.get("waitFor").and_then(Value::as_f64) {
        out.insert(
            "waitFor".to_string(),
            Value::from((seconds * 1000.0) as i64),
        );
    }
    if let Some(seconds) = job_config.get("timeout").and_then(Value::as_f64) {
        out.insert(
            "timeout".to_string(),
            Value::from((seconds * 1000.0) as i64),
        );
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scrape_options_only_forwards_present_fields() {
        let config = json!({"onlyMainContent": true, "waitFor": 2});
        let options = scrape_options(&config);
        assert_eq!(options.get("onlyMainContent"), Some(&Value::Bool(true)));
        assert_eq!(options.get("waitFor"), Some(&Value::from(2000)));
        assert!(!options.contains_key("formats"));
        assert!(!options.contains_key("timeout"));
    }

    #[test]
    fn scrape_options_empty_config_forwards_nothing() {
        let options = scrape_options(&json!({}));
        assert!(options.is_empty());
    }

    #[test]
    fn scrape_options_skips_only_the_malformed_field() {
        let config = json!({
            "onlyMainContent": true,
            "timeout": "30",
            "formats": ["markdown"],
        });
        let options = scrape_options(&config);
        assert_eq!(options.get("onlyMainContent"), Some(&Value::Bool(true)));
        assert_eq!(options.get("formats"), Some(&json!(["markdown"])));
        assert!(!options.contains_key("timeout"));
    }

    #[test]
    fn extract_data_prefers_data_field() {
        let body = json!({"data": {"title": "hi"}, "success": true});
        assert_eq!(extract_data(body), json!({"title": "hi"}));
    }

    #[test]
    fn extract_data_falls_back_to_whole_body() {
        let body = json!({"links": ["a", "b"]});
        assert_eq!(extract_data(body.clone()), body);
    }
}
