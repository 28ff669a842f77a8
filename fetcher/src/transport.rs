use std::collections::HashMap;

use harvest_core::async_trait;
use harvest_core::error::Result;
use harvest_core::request::Request;

/// Raw answer from a transport, before it becomes a `FetchResult`
#[derive(Debug, Clone, Default)]
pub struct TransportResponse {
    /// HTTP status code
    pub status: u16,

    /// Response headers
    pub headers: HashMap<String, String>,

    /// Response body
    pub body: Vec<u8>,
}

impl TransportResponse {
    /// Create a new transport response
    pub fn new(status: u16, headers: HashMap<String, String>, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }
}

/// Something that can perform a single network fetch.
///
/// Transport failures must be reported as `Error::Fetch` so the crawler can
/// tell retryable causes apart. Transports never retry and never cache.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Get the name of this transport
    fn name(&self) -> &str;

    /// Perform the request
    async fn fetch(&self, request: &Request) -> Result<TransportResponse>;
}
