mod cache;
mod disk;
mod fetcher;
mod http;
pub mod mock;
mod transport;

#[cfg(feature = "browser")]
mod browser;

pub use cache::{CacheKey, CacheStats, ResponseCache};
pub use disk::DiskCache;
pub use fetcher::Fetcher;
pub use http::{HttpTransport, HttpTransportConfig};
pub use mock::StaticTransport;
pub use transport::{Transport, TransportResponse};

#[cfg(feature = "browser")]
pub use browser::BrowserTransport;
