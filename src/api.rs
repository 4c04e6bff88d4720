//! Completion API interaction with exponential backoff retry logic.
//!
//! # Architecture
//!
//! - [`TopicSource`]: Core trait, one batch in, raw completion text out
//! - [`CompletionClient`]: Talks to an OpenAI-compatible `/chat/completions` endpoint
//! - [`RetryTopics`]: Decorator that adds retry logic to any `TopicSource`
//!
//! The client itself never retries. The orchestrator decides whether to wrap
//! it in [`RetryTopics`].
//!
//! # Retry Strategy
//!
//! - Only transient failures are retried (transport errors, 429, 5xx)
//! - Exponential backoff starting at the configured base delay
//! - Maximum delay capped at 30 seconds
//! - Random jitter (0-250ms) added to prevent thundering herd

use crate::config::TaggerConfig;
use crate::error::{Result, TaggerError};
use crate::models::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage, Story};
use crate::utils::truncate_for_log;
use rand::{Rng, rng};
use reqwest::Client;
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// Trait for asking the completion service about one batch of stories.
///
/// Implementors return the raw text of the model's answer; parsing happens
/// elsewhere. Requests must not touch shared state.
pub trait TopicSource {
    async fn request_topics(&self, batch: &[Story]) -> Result<String>;
}

/// Append the batch to the prompt as a JSON array of `{id, title}` objects.
pub fn render_prompt(prompt: &str, batch: &[Story]) -> Result<String> {
    let stories = serde_json::to_string(batch)?;
    Ok(format!("{prompt}{stories}"))
}

/// Client for an OpenAI-compatible chat completions endpoint.
pub struct CompletionClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    prompt: String,
}

impl CompletionClient {
    /// Build a client with the configured timeout applied to every request.
    pub fn new(config: &TaggerConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| TaggerError::Config(format!("failed to create HTTP client: {e}")))?;

        let endpoint = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
        info!(
            %endpoint,
            model = %config.model,
            timeout_secs = config.timeout_secs,
            "Completion client ready"
        );

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.into(),
            model: config.model.clone(),
            temperature: config.temperature,
            prompt: config.prompt.clone(),
        })
    }
}

impl fmt::Debug for CompletionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish_non_exhaustive()
    }
}

impl TopicSource for CompletionClient {
    #[instrument(level = "info", skip_all, fields(batch_len = batch.len()))]
    async fn request_topics(&self, batch: &[Story]) -> Result<String> {
        let t0 = Instant::now();
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: Some(render_prompt(&self.prompt, batch)?),
            }],
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                status = status.as_u16(),
                elapsed_ms = t0.elapsed().as_millis() as u64,
                body = %truncate_for_log(&body, 300),
                "Completion request rejected"
            );
            return Err(TaggerError::status(status.as_u16(), &truncate_for_log(&body, 300)));
        }

        let parsed: ChatCompletionResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        debug!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            response_len = content.len(),
            "Completion received"
        );
        Ok(content)
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`TopicSource`].
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryTopics<T> {
    inner: T,
    max_retries: usize,
    base_delay: StdDuration,
    max_delay: StdDuration,
}

impl<T: TopicSource> RetryTopics<T> {
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }

    fn backoff(&self, attempt: usize) -> StdDuration {
        let shift = (attempt.saturating_sub(1)).min(16) as u32;
        let delay = self
            .base_delay
            .saturating_mul(1 << shift)
            .min(self.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=250);
        delay + StdDuration::from_millis(jitter_ms)
    }
}

impl<T> fmt::Debug for RetryTopics<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryTopics")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T: TopicSource> TopicSource for RetryTopics<T> {
    #[instrument(level = "info", skip_all, fields(batch_len = batch.len()))]
    async fn request_topics(&self, batch: &[Story]) -> Result<String> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.request_topics(batch).await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if !e.is_transient() || attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            transient = e.is_transient(),
                            elapsed_ms_total = total_dt.as_millis() as u64,
                            error = %e,
                            "request_topics() giving up"
                        );
                        return Err(e);
                    }

                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                        elapsed_ms_total = total_dt.as_millis() as u64,
                        ?delay,
                        error = %e,
                        "request_topics() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> TaggerConfig {
        TaggerConfig {
            base_url: server.uri(),
            model: "test-model".to_string(),
            prompt: "Topics please: ".to_string(),
            timeout_secs: 2,
            ..Default::default()
        }
    }

    fn batch() -> Vec<Story> {
        vec![Story::new(12, "Sunak questioned by police")]
    }

    #[test]
    fn test_render_prompt_appends_json_batch() {
        let rendered = render_prompt("P: ", &[Story::new(1, "It's \"quoted\"")]).unwrap();
        assert_eq!(rendered, r#"P: [{"id":1,"title":"It's \"quoted\""}]"#);
    }

    #[tokio::test]
    async fn test_returns_first_choice_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(bearer_token("sk-test"))
            .and(body_partial_json(json!({
                "model": "test-model",
                "messages": [{"role": "user"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "chatcmpl-1",
                "choices": [{
                    "index": 0,
                    "message": {
                        "role": "assistant",
                        "content": "[{12: ['Politics', 'Crime', 'Law']}]"
                    },
                    "finish_reason": "stop"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = CompletionClient::new(&config_for(&server), "sk-test").unwrap();
        let text = client.request_topics(&batch()).await.unwrap();
        assert_eq!(text, "[{12: ['Politics', 'Crime', 'Law']}]");
    }

    #[tokio::test]
    async fn test_prompt_contains_batch() {
        let server = MockServer::start().await;
        let content = r#"Topics please: [{"id":12,"title":"Sunak questioned by police"}]"#;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "messages": [{"content": content}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .expect(1)
            .mount(&server)
            .await;

        let client = CompletionClient::new(&config_for(&server), "k").unwrap();
        let text = client.request_topics(&batch()).await.unwrap();
        assert_eq!(text, "");
    }

    #[tokio::test]
    async fn test_non_success_status_is_service_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let client = CompletionClient::new(&config_for(&server), "k").unwrap();
        let err = client.request_topics(&batch()).await.unwrap_err();
        assert_eq!(err.status_code(), Some(401));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_timeout_is_service_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"choices": []}))
                    .set_delay(StdDuration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let config = TaggerConfig {
            timeout_secs: 1,
            ..config_for(&server)
        };
        let client = CompletionClient::new(&config, "k").unwrap();
        let err = client.request_topics(&batch()).await.unwrap_err();
        assert!(matches!(err, TaggerError::Service { status: None, .. }));
        assert!(err.is_transient());
    }

    /// Fails with the given errors in order, then succeeds.
    struct Flaky {
        calls: AtomicUsize,
        failures: Vec<u16>,
    }

    impl TopicSource for Flaky {
        async fn request_topics(&self, _batch: &[Story]) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.failures.get(n) {
                Some(code) => Err(TaggerError::status(*code, "")),
                None => Ok("ok".to_string()),
            }
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_errors() {
        let flaky = Flaky {
            calls: AtomicUsize::new(0),
            failures: vec![503, 429],
        };
        let retry = RetryTopics::new(flaky, 2, StdDuration::from_millis(1));
        assert_eq!(retry.request_topics(&batch()).await.unwrap(), "ok");
        assert_eq!(retry.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max() {
        let flaky = Flaky {
            calls: AtomicUsize::new(0),
            failures: vec![500, 500, 500, 500],
        };
        let retry = RetryTopics::new(flaky, 2, StdDuration::from_millis(1));
        let err = retry.request_topics(&batch()).await.unwrap_err();
        assert_eq!(err.status_code(), Some(500));
        assert_eq!(retry.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_skips_permanent_errors() {
        let flaky = Flaky {
            calls: AtomicUsize::new(0),
            failures: vec![400],
        };
        let retry = RetryTopics::new(flaky, 5, StdDuration::from_millis(1));
        assert!(retry.request_topics(&batch()).await.is_err());
        assert_eq!(retry.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_is_capped() {
        let flaky = Flaky {
            calls: AtomicUsize::new(0),
            failures: vec![],
        };
        let retry = RetryTopics::new(flaky, 5, StdDuration::from_secs(1));
        assert!(retry.backoff(1) < StdDuration::from_millis(1_251));
        assert!(retry.backoff(40) <= StdDuration::from_millis(30_250));
    }
}
