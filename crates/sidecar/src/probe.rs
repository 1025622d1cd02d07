//! Health probe against the engine's status endpoint.

use std::time::Duration;

use url::Url;

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Lightweight liveness check: one GET with a short timeout, interpreting the
/// `status` marker in the JSON body. Any transport error, timeout, or
/// malformed body reads as "not healthy" — the probe never errors out.
#[derive(Debug, Clone)]
pub struct HealthProbe {
    client: reqwest::Client,
}

impl HealthProbe {
    pub fn new() -> Self {
        Self::with_timeout(PROBE_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to create probe HTTP client");
        Self { client }
    }

    /// Check whether the engine at `url` answers with a well-formed success
    /// payload (`{"status": "ok", ...}`).
    pub async fn check(&self, url: Url) -> bool {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(error = %e, "health probe request failed");
                return false;
            }
        };

        match response.json::<serde_json::Value>().await {
            Ok(body) => body.get("status").and_then(|s| s.as_str()) == Some("ok"),
            Err(e) => {
                tracing::debug!(error = %e, "health probe body was not valid JSON");
                false
            }
        }
    }
}

impl Default for HealthProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn probe_against(template: ResponseTemplate) -> bool {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(template)
            .mount(&server)
            .await;

        let url = Url::parse(&server.uri()).unwrap();
        HealthProbe::new().check(url).await
    }

    #[tokio::test]
    async fn healthy_status_marker() {
        let healthy = probe_against(ResponseTemplate::new(200).set_body_json(
            serde_json::json!({"status": "ok", "message": "QuickTrans API running"}),
        ))
        .await;
        assert!(healthy);
    }

    #[tokio::test]
    async fn wrong_status_marker_is_unhealthy() {
        let healthy = probe_against(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "starting"})),
        )
        .await;
        assert!(!healthy);
    }

    #[tokio::test]
    async fn missing_marker_is_unhealthy() {
        let healthy = probe_against(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"message": "hi"})),
        )
        .await;
        assert!(!healthy);
    }

    #[tokio::test]
    async fn non_json_body_is_unhealthy() {
        let healthy = probe_against(ResponseTemplate::new(200).set_body_string("starting up")).await;
        assert!(!healthy);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_unhealthy() {
        // Bind and drop a listener so the port is very likely closed.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = Url::parse(&format!("http://{addr}/")).unwrap();
        let probe = HealthProbe::with_timeout(Duration::from_millis(500));
        assert!(!probe.check(url).await);
    }
}
