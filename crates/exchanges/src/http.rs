//! Rate-limited REST transport shared by every adapter.

use crate::error::{ExchangeError, Result};
use cex_spread_core::AppConfig;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Transport settings applied to every exchange client.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub timeout: Duration,
    /// Proxy URL for all HTTP(S) traffic.
    pub proxy: Option<String>,
    pub accept_invalid_certs: bool,
    pub requests_per_second: NonZeroU32,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            proxy: None,
            accept_invalid_certs: false,
            requests_per_second: nonzero!(10u32),
        }
    }
}

impl ClientSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            timeout: config.scanner.request_timeout(),
            proxy: config.network.proxy.clone(),
            accept_invalid_certs: config.network.accept_invalid_certs,
            requests_per_second: NonZeroU32::new(config.scanner.requests_per_second)
                .unwrap_or(nonzero!(10u32)),
        }
    }

    #[must_use]
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }
}

/// GET-only JSON client bound to one base URL.
///
/// Clones made with [`RestClient::with_base_url`] share the connection pool
/// and the rate limiter.
#[derive(Clone)]
pub struct RestClient {
    base_url: String,
    http: Client,
    rate_limiter: Arc<DirectLimiter>,
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl RestClient {
    /// # Errors
    /// Returns error if the proxy URL is invalid or the TLS backend cannot be initialized.
    pub fn new(base_url: impl Into<String>, settings: &ClientSettings) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(settings.timeout)
            .danger_accept_invalid_certs(settings.accept_invalid_certs);

        if let Some(proxy) = &settings.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| ExchangeError::Configuration(format!("invalid proxy {proxy}: {e}")))?;
            builder = builder.proxy(proxy);
        }

        let http = builder
            .build()
            .map_err(|e| ExchangeError::Network(format!("failed to build HTTP client: {e}")))?;

        let quota = Quota::per_second(settings.requests_per_second);

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    #[must_use]
    pub fn with_base_url(&self, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Waits for the rate limiter and issues a GET request.
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("GET {} {:?}", url, query);

        let result = match self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await
        {
            Ok(response) => Self::handle_response(response).await,
            Err(e) => Err(e.into()),
        };

        if let Err(err) = &result {
            tracing::debug!(url = %url, transient = err.is_transient(), "request failed: {}", err);
        }
        result
    }

    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(1);
            return Err(ExchangeError::RateLimit {
                retry_after_secs: retry_after,
            });
        }

        let body = response.text().await?;
        if !status.is_success() {
            return Err(ExchangeError::api(status.as_u16(), body));
        }

        serde_json::from_str(&body).map_err(|e| {
            let preview: String = body.chars().take(200).collect();
            ExchangeError::Decode(format!("{e}: {preview}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_get_decodes_json_with_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .and(query_param("a", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let client = RestClient::new(server.uri(), &ClientSettings::default()).unwrap();
        let body: serde_json::Value = client.get("/ping", &[("a", "1")]).await.unwrap();
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn test_rate_limit_status_maps_to_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
            .mount(&server)
            .await;

        let client = RestClient::new(server.uri(), &ClientSettings::default()).unwrap();
        let err = client.get::<serde_json::Value>("/x", &[]).await.unwrap_err();
        assert!(matches!(err, ExchangeError::RateLimit { retry_after_secs: 7 }));
    }

    #[tokio::test]
    async fn test_server_error_maps_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let client = RestClient::new(server.uri(), &ClientSettings::default()).unwrap();
        let err = client.get::<serde_json::Value>("/x", &[]).await.unwrap_err();
        assert!(matches!(err, ExchangeError::Api { status_code: 503, .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = RestClient::new(server.uri(), &ClientSettings::default()).unwrap();
        let err = client.get::<serde_json::Value>("/x", &[]).await.unwrap_err();
        assert!(matches!(err, ExchangeError::Decode(_)));
    }

    #[test]
    fn test_invalid_proxy_is_configuration_error() {
        let settings = ClientSettings::default().with_proxy("http://[::1");
        let err = RestClient::new("http://localhost", &settings).unwrap_err();
        assert!(matches!(err, ExchangeError::Configuration(_)));
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = AppConfig::default();
        config.network.proxy = Some("http://127.0.0.1:8080".to_string());
        config.scanner.request_timeout_secs = 3;
        let settings = ClientSettings::from_config(&config);
        assert_eq!(settings.timeout, Duration::from_secs(3));
        assert_eq!(settings.proxy.as_deref(), Some("http://127.0.0.1:8080"));
    }
}
