use super::error::ResolveError;
use crate::config::Config;
use futures::StreamExt;
use reqwest::header::USER_AGENT;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Shared HTTP transport for every stage of the cascade.
///
/// Holds one `reqwest::Client` (and therefore one connection pool), the
/// browser identification sent with every request, the per-request deadline
/// and the body size cap. Cloning is cheap: the client is reference counted.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    user_agent: Arc<str>,
    request_timeout: Duration,
    max_body_bytes: usize,
}

impl Fetcher {
    /// Builds a fetcher with a fresh client configured from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Network`] if the TLS backend cannot be
    /// initialised.
    pub fn new(config: &Config) -> Result<Self, ResolveError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self::with_client(client, config))
    }

    /// Wraps an existing client (caller controls connection configuration).
    pub fn with_client(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            user_agent: Arc::from(config.user_agent.as_str()),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            max_body_bytes: config.max_body_bytes,
        }
    }

    /// Fetches `url` and returns the whole body.
    ///
    /// The request and the body read share one deadline. Cancellation of
    /// `cancel` wins over an in-flight request.
    ///
    /// # Errors
    ///
    /// - [`ResolveError::InvalidUrl`] - `url` does not parse
    /// - [`ResolveError::Network`] - connection or TLS failure
    /// - [`ResolveError::HttpStatus`] - non-2xx response
    /// - [`ResolveError::Timeout`] - per-request deadline exceeded
    /// - [`ResolveError::Cancelled`] - `cancel` fired
    /// - [`ResolveError::TooLarge`] - body over the size cap
    /// - [`ResolveError::Decode`] - body stream broke off
    pub async fn get(&self, url: &str, cancel: &CancellationToken) -> Result<Vec<u8>, ResolveError> {
        let parsed =
            url::Url::parse(url).map_err(|e| ResolveError::InvalidUrl(format!("{url}: {e}")))?;

        let request = async {
            let response = self
                .client
                .get(parsed)
                .header(USER_AGENT, &*self.user_agent)
                .send()
                .await
                .map_err(ResolveError::Network)?;

            if !response.status().is_success() {
                return Err(ResolveError::HttpStatus(response.status().as_u16()));
            }

            read_limited_bytes(response, self.max_body_bytes).await
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ResolveError::Cancelled),
            result = tokio::time::timeout(self.request_timeout, request) => {
                result.map_err(|_| ResolveError::Timeout)?
            }
        }
    }
}

/// Reads response body with a size limit using stream-based reading.
async fn read_limited_bytes(
    response: reqwest::Response,
    max_size: usize,
) -> Result<Vec<u8>, ResolveError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len > max_size as u64 {
            return Err(ResolveError::TooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(ResolveError::Decode)?;
        if bytes.len().saturating_add(chunk.len()) > max_size {
            return Err(ResolveError::TooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher_with(config: Config) -> Fetcher {
        Fetcher::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_get_sends_browser_user_agent() {
        let mock_server = MockServer::start().await;
        let config = Config::default();
        Mock::given(method("GET"))
            .and(path("/page"))
            .and(header("user-agent", config.user_agent.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let fetcher = fetcher_with(config);
        let body = fetcher
            .get(&format!("{}/page", mock_server.uri()), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(body, b"hello");
    }

    #[tokio::test]
    async fn test_get_non_success_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let fetcher = fetcher_with(Config::default());
        let result = fetcher
            .get(&format!("{}/missing", mock_server.uri()), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(ResolveError::HttpStatus(404))));
    }

    #[tokio::test]
    async fn test_get_rejects_oversized_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(64)))
            .mount(&mock_server)
            .await;

        let config = Config {
            max_body_bytes: 16,
            ..Config::default()
        };
        let result = fetcher_with(config)
            .get(&mock_server.uri(), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(ResolveError::TooLarge)));
    }

    #[tokio::test]
    async fn test_get_times_out() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("slow")
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&mock_server)
            .await;

        let config = Config {
            request_timeout_secs: 1,
            ..Config::default()
        };
        let result = fetcher_with(config)
            .get(&mock_server.uri(), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(ResolveError::Timeout)));
    }

    #[tokio::test]
    async fn test_get_cancelled_before_request() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("never"))
            .expect(0)
            .mount(&mock_server)
            .await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = fetcher_with(Config::default())
            .get(&mock_server.uri(), &cancel)
            .await;
        assert!(matches!(result, Err(ResolveError::Cancelled)));
    }

    #[tokio::test]
    async fn test_get_invalid_url() {
        let result = fetcher_with(Config::default())
            .get("not a url", &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(ResolveError::InvalidUrl(_))));
    }
}
