use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use harvest_core::async_trait;
use harvest_core::config::CrawlSettings;
use harvest_core::error::{Error, NetworkError, Result};
use harvest_core::request::Request;
use log::debug;
use reqwest::{Client, Proxy};
use tokio::sync::Semaphore;

use crate::transport::{Transport, TransportResponse};

/// Configuration for the HTTP transport
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Maximum number of concurrent requests
    pub concurrent_requests: usize,

    /// Default request timeout
    pub timeout: Duration,

    /// Maximum number of redirects to follow
    pub max_redirects: usize,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            concurrent_requests: 10,
            timeout: Duration::from_secs(30),
            max_redirects: 10,
        }
    }
}

impl HttpTransportConfig {
    /// Derive the transport configuration from the crawl settings
    pub fn from_settings(settings: &CrawlSettings) -> Self {
        Self {
            concurrent_requests: settings.concurrency.max(1),
            timeout: settings.timeout(),
            ..Self::default()
        }
    }
}

/// HTTP transport backed by reqwest.
///
/// One client is kept per proxy so connection pools are not shared across
/// proxies.
pub struct HttpTransport {
    /// Client used without a proxy
    client: Client,

    /// Clients for proxied requests, keyed by proxy URL
    proxied: DashMap<String, Client>,

    /// Semaphore to limit concurrent requests
    semaphore: Arc<Semaphore>,

    /// Transport configuration
    config: HttpTransportConfig,
}

impl HttpTransport {
    /// Create a new HTTP transport with the given configuration
    pub fn new(config: HttpTransportConfig) -> Result<Self> {
        let client = Self::build_client(&config, None)?;
        let semaphore = Arc::new(Semaphore::new(config.concurrent_requests.max(1)));

        Ok(Self {
            client,
            proxied: DashMap::new(),
            semaphore,
            config,
        })
    }

    fn build_client(config: &HttpTransportConfig, proxy: Option<&str>) -> Result<Client> {
        let mut builder = Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects));

        if let Some(proxy) = proxy {
            let proxy = Proxy::all(proxy).map_err(|e| {
                Error::fetch(proxy, NetworkError::ProxyError(format!("Invalid proxy: {}", e)))
            })?;
            builder = builder.proxy(proxy);
        }

        builder
            .build()
            .map_err(|e| Error::other(format!("Failed to create HTTP client: {}", e)))
    }

    fn client_for(&self, proxy: Option<&str>) -> Result<Client> {
        let Some(proxy) = proxy else {
            return Ok(self.client.clone());
        };
        if let Some(client) = self.proxied.get(proxy) {
            return Ok(client.clone());
        }
        let client = Self::build_client(&self.config, Some(proxy))?;
        self.proxied.insert(proxy.to_string(), client.clone());
        Ok(client)
    }

    fn build_reqwest_request(&self, client: &Client, request: &Request) -> reqwest::RequestBuilder {
        let mut req_builder = client.get(request.url.clone());

        // Add headers
        for (key, value) in &request.headers {
            req_builder = req_builder.header(key, value);
        }

        if let Some(timeout) = request.timeout {
            req_builder = req_builder.timeout(timeout);
        }

        req_builder
    }
}

/// Classify a reqwest failure
fn classify(error: &reqwest::Error, request: &Request, timeout: Duration) -> NetworkError {
    let message = error.to_string();
    if error.is_timeout() {
        return NetworkError::Timeout(timeout);
    }
    if error.is_redirect() {
        return NetworkError::TooManyRedirects;
    }
    if error.is_connect() {
        if request.proxy.is_some() {
            return NetworkError::ProxyError(message);
        }
        let lower = message.to_ascii_lowercase();
        if lower.contains("dns") || lower.contains("resolve") {
            return NetworkError::DnsError(message);
        }
        if lower.contains("certificate") || lower.contains("tls") || lower.contains("ssl") {
            return NetworkError::SslError(message);
        }
        return NetworkError::ConnectionRefused;
    }
    NetworkError::Other(message)
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, request: &Request) -> Result<TransportResponse> {
        // Acquire a permit from the semaphore
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| Error::other(format!("Failed to acquire semaphore permit: {}", e)))?;

        debug!("Downloading URL: {}", request.url);

        let client = self.client_for(request.proxy.as_deref())?;
        let timeout = request.timeout.unwrap_or(self.config.timeout);

        // Send the request
        let response = self
            .build_reqwest_request(&client, request)
            .send()
            .await
            .map_err(|e| Error::fetch(request.url.as_str(), classify(&e, request, timeout)))?;

        // Get the status code
        let status = response.status().as_u16();

        // Get the headers
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_str().unwrap_or("").to_string()))
            .collect();

        // Get the body
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::fetch(request.url.as_str(), classify(&e, request, timeout)))?
            .to_vec();

        Ok(TransportResponse::new(status, headers, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_http_transport() {
        // Start a mock server
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/success"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "text/html")
                    .set_body_string("<html>Success</html>"),
            )
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/not-found"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
            .mount(&mock_server)
            .await;

        let transport = HttpTransport::new(HttpTransportConfig::default()).unwrap();

        let request = Request::get(format!("{}/success", mock_server.uri())).unwrap();
        let response = transport.fetch(&request).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"<html>Success</html>");
        assert_eq!(
            response.headers.get("content-type").map(String::as_str),
            Some("text/html")
        );

        // A 404 is an answer, not a transport failure
        let request = Request::get(format!("{}/not-found", mock_server.uri())).unwrap();
        let response = transport.fetch(&request).await.unwrap();
        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn test_http_transport_sends_headers() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/ua"))
            .and(header("User-Agent", "harvest-test"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let transport = HttpTransport::new(HttpTransportConfig::default()).unwrap();
        let request = Request::get(format!("{}/ua", mock_server.uri()))
            .unwrap()
            .with_header("User-Agent", "harvest-test");
        let response = transport.fetch(&request).await.unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_http_transport_timeout() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&mock_server)
            .await;

        let transport = HttpTransport::new(HttpTransportConfig::default()).unwrap();
        let request = Request::get(format!("{}/slow", mock_server.uri()))
            .unwrap()
            .with_timeout(Duration::from_millis(200));

        let err = transport.fetch(&request).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Fetch {
                cause: NetworkError::Timeout(_),
                ..
            }
        ));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_http_transport_connection_refused() {
        // Nothing listens on port 9 of localhost in the test environment
        let transport = HttpTransport::new(HttpTransportConfig::default()).unwrap();
        let request = Request::get("http://127.0.0.1:9/").unwrap();
        let err = transport.fetch(&request).await.unwrap_err();
        assert!(err.network_cause().is_some());
        assert!(err.is_retryable());
    }
}
