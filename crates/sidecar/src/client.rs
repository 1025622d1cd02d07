//! Resilient HTTP client for the engine endpoint.
//!
//! Every outbound call is wrapped in the same policy: a request that produced
//! no response at all (connection refused, unreachable, timeout) is reissued
//! after a fixed delay, up to `max_attempts` total tries. A request the
//! backend answered — with any status — is passed through unmodified; an
//! application-level failure from a reachable backend is not assumed to be
//! transient. Each logical call carries its own attempt counter, so
//! concurrent calls retry independently.

use std::time::Duration;

use reqwest::{Method, Response};
use serde::Serialize;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Retry configuration. Not mutated at runtime.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total tries per logical call, including the first. Always at least 1.
    pub max_attempts: u32,
    /// Fixed wait between consecutive tries.
    pub inter_attempt_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            inter_attempt_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// All attempts exhausted without any response from the engine. Distinct
    /// from an application error so callers can tell "nothing is listening"
    /// apart from "the backend answered with an error".
    #[error(
        "cannot reach the local engine at {url} after {attempts} attempt(s); \
         the backend may not be running"
    )]
    BackendUnreachable {
        url: Url,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    /// Request failed for a reason other than the backend being unreachable
    /// (e.g. a request body could not be streamed). Never retried.
    #[error("engine request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("invalid request path: {0}")]
    InvalidPath(#[from] url::ParseError),
}

/// `true` when the error means no response was received at all, as opposed to
/// an error observed on or after a response.
fn received_no_response(e: &reqwest::Error) -> bool {
    e.is_connect() || e.is_timeout() || (e.is_request() && !e.is_body())
}

/// HTTP client with bounded fixed-delay retry against a backend whose
/// availability is uncertain (it may still be warming up after an
/// optimistic-ready start).
#[derive(Debug, Clone)]
pub struct ResilientClient {
    http: reqwest::Client,
    base: Url,
    policy: RetryPolicy,
}

impl ResilientClient {
    pub fn new(base: Url) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to create engine HTTP client");
        Self {
            http,
            base,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub async fn get(&self, path: &str) -> Result<Response, CallError> {
        self.execute(Method::GET, path, None).await
    }

    pub async fn post_json<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Response, CallError> {
        // Serialized once so every reissue carries the identical body.
        let body = serde_json::to_value(body)?;
        self.execute(Method::POST, path, Some(body)).await
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<Response, CallError> {
        let url = self.base.join(path)?;
        let max_attempts = self.policy.max_attempts.max(1);

        let mut attempt = 1u32;
        loop {
            let mut request = self.http.request(method.clone(), url.clone());
            if let Some(ref body) = body {
                request = request.json(body);
            }

            match request.send().await {
                // Any response at all — success or application error — is the
                // caller's to interpret.
                Ok(response) => return Ok(response),
                Err(e) if received_no_response(&e) => {
                    if attempt >= max_attempts {
                        return Err(CallError::BackendUnreachable {
                            url,
                            attempts: attempt,
                            source: e,
                        });
                    }
                    tracing::warn!(
                        %url,
                        attempt,
                        max_attempts,
                        error = %e,
                        "no response from engine, retrying"
                    );
                    tokio::time::sleep(self.policy.inter_attempt_delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(CallError::Request(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            inter_attempt_delay: Duration::from_millis(20),
        }
    }

    fn closed_port_url() -> Url {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        Url::parse(&format!("http://{addr}")).unwrap()
    }

    #[test]
    fn default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.inter_attempt_delay, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn exhausts_attempts_against_dead_target() {
        let client = ResilientClient::new(closed_port_url()).with_policy(fast_policy());

        let started = Instant::now();
        let result = client.get("/").await;
        let elapsed = started.elapsed();

        match result {
            Err(CallError::BackendUnreachable { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected BackendUnreachable, got {other:?}"),
        }
        // Two inter-attempt delays must have elapsed between three tries.
        assert!(elapsed >= Duration::from_millis(40), "elapsed {elapsed:?}");
    }

    #[tokio::test]
    async fn recovers_when_target_answers_on_second_attempt() {
        let server = MockServer::start().await;

        // First attempt: response delayed past the client timeout, so no
        // response is observed. Second attempt: immediate success.
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(500))
                    .set_body_json(serde_json::json!({"status": "ok"})),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .unwrap();
        let client = ResilientClient::new(Url::parse(&server.uri()).unwrap())
            .with_policy(fast_policy())
            .with_http_client(http);

        let response = client.get("/").await.unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn error_status_is_passed_through_without_retry() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/languages"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(serde_json::json!({"detail": "boom"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client =
            ResilientClient::new(Url::parse(&server.uri()).unwrap()).with_policy(fast_policy());

        let response = client.get("/api/languages").await.unwrap();
        assert_eq!(response.status(), 500);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["detail"], "boom");
        // Mock expect(1) verifies on drop that no second attempt was made.
    }

    #[tokio::test]
    async fn post_reissues_identical_body() {
        let server = MockServer::start().await;
        let request_body = serde_json::json!({"text": "hello", "source_lang": "en", "target_lang": "zh"});

        Mock::given(method("POST"))
            .and(path("/api/translate"))
            .and(body_json(&request_body))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(500))
                    .set_body_json(serde_json::json!({})),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/translate"))
            .and(body_json(&request_body))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"translated_text": "你好"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .unwrap();
        let client = ResilientClient::new(Url::parse(&server.uri()).unwrap())
            .with_policy(fast_policy())
            .with_http_client(http);

        let response = client.post_json("/api/translate", &request_body).await.unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn single_attempt_policy_never_retries() {
        let client = ResilientClient::new(closed_port_url()).with_policy(RetryPolicy {
            max_attempts: 1,
            inter_attempt_delay: Duration::from_millis(20),
        });

        match client.get("/").await {
            Err(CallError::BackendUnreachable { attempts, .. }) => assert_eq!(attempts, 1),
            other => panic!("expected BackendUnreachable, got {other:?}"),
        }
    }
}
