use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use harvest_core::async_trait;
use harvest_core::canonical::host_key;
use harvest_core::config::CrawlSettings;
use harvest_core::error::{Error, Result};
use harvest_core::request::Request;
use harvest_core::response::FetchResult;
use log::{debug, warn};
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use url::Url;

/// Exponent cap for failure backoff
const MAX_BACKOFF_STEPS: u32 = 4;

/// Politeness state of one host
#[derive(Debug, Default)]
struct HostSlot {
    /// When the last request to this host was released
    last_request: Option<Instant>,
    /// Failures since the last success
    consecutive_failures: u32,
    /// Extra delay requested by the server (429)
    temporary_delay: Option<Duration>,
}

impl HostSlot {
    fn effective_delay(&self, base: Duration, settings: &CrawlSettings) -> Duration {
        let ceiling = settings.max_delay().max(base);
        let mut delay = base;
        if let Some(temporary) = self.temporary_delay {
            delay = delay.max(temporary);
        }
        if self.consecutive_failures > 0 {
            let steps = self.consecutive_failures.min(MAX_BACKOFF_STEPS) as i32;
            delay = delay.mul_f64(settings.backoff_factor.powi(steps));
        }
        delay.min(ceiling)
    }
}

/// A middleware enforcing a minimum delay between requests to the same host.
///
/// Each host has its own lock, held across the wait, so requests to one
/// host are serialized while other hosts proceed independently. The delay
/// grows after failures and 429 responses and resets on success.
#[derive(Default)]
pub struct RateLimitMiddleware {
    /// Per-host state keyed by host and port
    hosts: DashMap<String, Arc<Mutex<HostSlot>>>,
}

impl RateLimitMiddleware {
    /// Create a new RateLimitMiddleware
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, url: &Url) -> Arc<Mutex<HostSlot>> {
        self.hosts
            .entry(host_key(url))
            .or_insert_with(Default::default)
            .value()
            .clone()
    }

    /// The delay the next request to this URL's host will observe
    pub async fn current_delay(&self, url: &Url, settings: &CrawlSettings) -> Duration {
        let base = settings.delay_for(url.host_str().unwrap_or_default());
        let slot = self.slot(url);
        let state = slot.lock().await;
        state.effective_delay(base, settings)
    }

    async fn report_success(&self, url: &Url) {
        let slot = self.slot(url);
        let mut state = slot.lock().await;
        if state.consecutive_failures > 0 || state.temporary_delay.is_some() {
            debug!("Reset backoff for {}", host_key(url));
        }
        state.consecutive_failures = 0;
        state.temporary_delay = None;
    }

    async fn report_failure(&self, url: &Url, retry_after: Option<Duration>, settings: &CrawlSettings) {
        let base = settings.delay_for(url.host_str().unwrap_or_default());
        let slot = self.slot(url);
        let mut state = slot.lock().await;
        state.consecutive_failures += 1;

        if let Some(retry_after) = retry_after {
            let bumped = state
                .effective_delay(base, settings)
                .mul_f64(settings.backoff_factor)
                .max(retry_after)
                .min(settings.max_delay().max(base));
            state.temporary_delay = Some(bumped);
            warn!("Rate limit hit for {}, delay raised to {:?}", host_key(url), bumped);
        } else {
            debug!(
                "Recorded failure for {} (consecutive: {})",
                host_key(url),
                state.consecutive_failures
            );
        }
    }
}

/// Parse a `Retry-After` header given in seconds
fn retry_after(response: &FetchResult) -> Duration {
    response
        .header("retry-after")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or_default()
}

#[async_trait]
impl crate::Middleware for RateLimitMiddleware {
    fn name(&self) -> &str {
        "RateLimitMiddleware"
    }

    async fn before_request(&self, request: Request, settings: &CrawlSettings) -> Result<Request> {
        let base = settings.delay_for(request.url.host_str().unwrap_or_default());
        let slot = self.slot(&request.url);

        let mut state = slot.lock().await;
        let delay = state.effective_delay(base, settings);
        if let Some(last) = state.last_request {
            let elapsed = last.elapsed();
            if elapsed < delay {
                let wait = delay - elapsed;
                debug!("Rate limiting: waiting {:?} for {}", wait, host_key(&request.url));
                sleep(wait).await;
            }
        }
        state.last_request = Some(Instant::now());
        drop(state);

        Ok(request)
    }

    async fn after_response(
        &self,
        response: FetchResult,
        request: &Request,
        settings: &CrawlSettings,
    ) -> Result<FetchResult> {
        match response.status {
            429 => {
                self.report_failure(&request.url, Some(retry_after(&response)), settings)
                    .await
            }
            500..=599 => self.report_failure(&request.url, None, settings).await,
            200..=299 => self.report_success(&request.url).await,
            _ => {}
        }
        Ok(response)
    }

    async fn on_error(&self, request: &Request, error: &Error, settings: &CrawlSettings) {
        if error.is_retryable() {
            self.report_failure(&request.url, None, settings).await;
        }
    }
}
