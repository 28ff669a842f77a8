use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use harvest_core::config::CrawlSettings;
use harvest_core::entry::UrlEntry;
use harvest_core::error::{Error, Result};
use harvest_core::record::{ExtractionRecord, FailedUrl};
use harvest_core::response::FetchResult;
use harvest_extractors::{ContentParser, ExtractorRegistry};
use harvest_fetcher::Fetcher;
use harvest_frontier::Frontier;
use log::{debug, trace, warn};
use tokio::sync::{mpsc, Notify};
use tokio::time::sleep;
use url::Url;

use crate::stop::StopHandle;

/// What a worker reports to the aggregator
#[derive(Debug)]
pub(crate) enum WorkerEvent {
    /// A page was fetched and run through the extractors
    Page {
        records: Vec<ExtractionRecord>,
        from_cache: bool,
        retries: u32,
        links_discovered: usize,
        links_enqueued: usize,
    },

    /// A URL produced no record
    Failed { failure: FailedUrl, retries: u32 },

    /// The crawl cannot continue
    Fatal(Error),
}

/// State shared by all workers of one crawl
pub(crate) struct WorkerContext {
    pub settings: Arc<CrawlSettings>,
    pub frontier: Arc<dyn Frontier>,
    pub fetcher: Arc<Fetcher>,
    pub registry: Arc<ExtractorRegistry>,
    pub parser: Arc<dyn ContentParser>,
    pub stop: StopHandle,

    /// Workers between claiming a pop and finishing its page
    pub in_flight: AtomicUsize,

    /// Signalled when a worker finishes a page or the last one goes idle
    pub progress: Notify,

    /// Pages claimed against `max_pages`
    pub pages_started: AtomicUsize,
}

impl WorkerContext {
    /// Reserve a page against the page limit
    fn claim_page(&self) -> bool {
        match self.settings.max_pages {
            Some(max) => self.pages_started.fetch_add(1, Ordering::SeqCst) < max,
            None => {
                self.pages_started.fetch_add(1, Ordering::SeqCst);
                true
            }
        }
    }

    fn release_page(&self) {
        self.pages_started.fetch_sub(1, Ordering::SeqCst);
    }

    /// Leave the in-flight set, returning how many workers remain in it
    fn leave(&self) -> usize {
        self.in_flight.fetch_sub(1, Ordering::SeqCst) - 1
    }
}

/// Marks a popped page as in flight until dropped, unwinding included
struct InFlight<'a>(&'a WorkerContext);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.leave();
        self.0.progress.notify_waiters();
    }
}

/// Pull entries from the frontier until it drains, the crawl is stopped,
/// or the page limit is reached.
pub(crate) async fn run_worker(id: usize, ctx: Arc<WorkerContext>, events: mpsc::Sender<WorkerEvent>) {
    debug!("Worker {} started", id);

    loop {
        if ctx.stop.is_stopped() {
            break;
        }

        if !ctx.claim_page() {
            debug!("Worker {} reached the page limit", id);
            ctx.release_page();
            ctx.stop.stop();
            break;
        }

        ctx.in_flight.fetch_add(1, Ordering::SeqCst);
        match ctx.frontier.pop().await {
            Ok(Some(entry)) => {
                let _in_flight = InFlight(&ctx);
                let event = process_entry(&ctx, entry).await;
                let _ = events.send(event).await;
            }
            Ok(None) => {
                ctx.release_page();

                // Armed before leaving so a page finishing in between is not missed
                let progress = ctx.progress.notified();
                tokio::pin!(progress);
                progress.as_mut().enable();

                if ctx.leave() == 0 {
                    // Nobody can push more links; wake the other idle workers
                    ctx.progress.notify_waiters();
                    break;
                }
                tokio::select! {
                    _ = &mut progress => {}
                    _ = ctx.stop.stopped() => {}
                }
            }
            Err(e) => {
                ctx.release_page();
                if ctx.leave() == 0 {
                    ctx.progress.notify_waiters();
                }
                let _ = events.send(WorkerEvent::Fatal(e)).await;
                ctx.stop.stop();
                break;
            }
        }
    }

    debug!("Worker {} finished", id);
}

async fn process_entry(ctx: &WorkerContext, entry: UrlEntry) -> WorkerEvent {
    let url = entry.url.clone();
    let depth = entry.depth;
    trace!("Processing {} at depth {}", url, depth);

    let (outcome, attempts) = fetch_with_retry(ctx, &url).await;
    let retries = attempts.saturating_sub(1);

    let result = match outcome {
        Ok(result) => result,
        Err(e) => {
            warn!("Giving up on {} after {} attempt(s): {}", url, attempts, e);
            return WorkerEvent::Failed {
                failure: FailedUrl::fetch(&url, depth, &e, attempts),
                retries,
            };
        }
    };

    if !result.is_success() {
        debug!("{} answered {}", url, result.status);
        return WorkerEvent::Failed {
            failure: FailedUrl::http_status(&url, depth, result.status, attempts),
            retries,
        };
    }

    if !result.is_html() {
        let content_type = result.content_type.clone().unwrap_or_default();
        debug!("Skipping {} with content type '{}'", url, content_type);
        return WorkerEvent::Failed {
            failure: FailedUrl::rejected(
                &url,
                depth,
                format!("content type '{}' is not HTML", content_type),
                attempts,
            ),
            retries,
        };
    }

    let (records, links) = extract_page(ctx, &entry, &result);

    let links_discovered = links.len();
    let mut links_enqueued = 0;
    if !links.is_empty() {
        let parent = Arc::new(entry);
        for link in links {
            if ctx.frontier.push(UrlEntry::child(&parent, link)).await {
                links_enqueued += 1;
            }
        }
        trace!(
            "{}: {} links found, {} enqueued",
            parent.url,
            links_discovered,
            links_enqueued
        );
    }

    WorkerEvent::Page {
        records,
        from_cache: result.from_cache,
        retries,
        links_discovered,
        links_enqueued,
    }
}

/// Parse the page, run the extractors and collect outbound links.
///
/// The parsed document never crosses an await point.
fn extract_page(ctx: &WorkerContext, entry: &UrlEntry, result: &FetchResult) -> (Vec<ExtractionRecord>, Vec<Url>) {
    let settings = &ctx.settings;
    let content = ctx.parser.parse(&result.body, &entry.url);
    let records = ctx
        .registry
        .dispatch(&content, &entry.url, entry.depth, &settings.extractor);
    let links = if settings.follows_links() && entry.depth < settings.max_depth {
        content.links()
    } else {
        Vec::new()
    };
    (records, links)
}

/// Fetch a URL, retrying retryable errors with exponential backoff.
///
/// Returns the outcome and the number of attempts made.
async fn fetch_with_retry(ctx: &WorkerContext, url: &Url) -> (Result<FetchResult>, u32) {
    let settings = &ctx.settings;
    let budget = settings.retry_budget.max(1);
    let mut backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(settings.retry_delay())
        .with_max_interval(settings.max_retry_delay())
        .with_multiplier(2.0)
        .with_max_elapsed_time(None)
        .build();

    let mut attempt = 0;
    loop {
        attempt += 1;
        match ctx.fetcher.fetch(url, settings.fetch_mode, settings).await {
            Ok(result) => return (Ok(result), attempt),
            Err(e) if e.is_retryable() && attempt < budget && !ctx.stop.is_stopped() => {
                let delay = backoff
                    .next_backoff()
                    .unwrap_or_else(|| settings.max_retry_delay());
                warn!(
                    "Attempt {}/{} for {} failed: {}; retrying in {:.1}s",
                    attempt,
                    budget,
                    url,
                    e,
                    delay.as_secs_f64()
                );
                sleep(delay).await;
            }
            Err(e) => return (Err(e), attempt),
        }
    }
}
