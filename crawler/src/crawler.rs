use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use harvest_core::canonical::normalize_url;
use harvest_core::config::CrawlSettings;
use harvest_core::entry::UrlEntry;
use harvest_core::error::{Error, Result};
use harvest_core::record::{ExtractionRecord, FailedUrl};
use harvest_extractors::{ContentParser, ExtractorRegistry, HtmlParser};
use harvest_fetcher::Fetcher;
use harvest_frontier::{Frontier, MemoryFrontier};
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, Notify, RwLock};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::stats::{CrawlReport, CrawlState, CrawlStats};
use crate::stop::StopHandle;
use crate::worker::{run_worker, WorkerContext, WorkerEvent};

/// Drives a crawl: a pool of workers pulling from the frontier, fetching,
/// extracting and feeding discovered links back.
///
/// A crawler runs once. All results flow to the `run` future, which owns
/// the records, the failures and the counters.
pub struct Crawler {
    /// Crawl settings shared with every component
    settings: Arc<CrawlSettings>,

    /// The URL frontier
    frontier: Arc<dyn Frontier>,

    /// Fetcher with its cache and middleware
    fetcher: Arc<Fetcher>,

    /// Extractors applied to each page
    registry: Arc<ExtractorRegistry>,

    /// Turns bodies into documents
    parser: Arc<dyn ContentParser>,

    /// Cooperative stop signal
    stop: StopHandle,

    /// Lifecycle state
    state: RwLock<CrawlState>,
}

impl Crawler {
    /// Create a crawler from explicit components
    pub fn new(
        settings: Arc<CrawlSettings>,
        frontier: Arc<dyn Frontier>,
        fetcher: Arc<Fetcher>,
        registry: Arc<ExtractorRegistry>,
    ) -> Self {
        Self {
            settings,
            frontier,
            fetcher,
            registry,
            parser: Arc::new(HtmlParser),
            stop: StopHandle::new(),
            state: RwLock::new(CrawlState::Idle),
        }
    }

    /// Create a crawler with the default components for the settings
    pub fn from_settings(settings: CrawlSettings) -> Result<Self> {
        settings.validate()?;
        let registry = ExtractorRegistry::with_builtin();
        registry.validate(&settings.extractor)?;

        let frontier = MemoryFrontier::from_settings(&settings)?;
        let fetcher = Fetcher::from_settings(&settings)?;
        Ok(Self::new(
            Arc::new(settings),
            Arc::new(frontier),
            Arc::new(fetcher),
            Arc::new(registry),
        ))
    }

    /// Replace the content parser
    pub fn with_parser(mut self, parser: Arc<dyn ContentParser>) -> Self {
        self.parser = parser;
        self
    }

    /// The crawl settings
    pub fn settings(&self) -> &CrawlSettings {
        &self.settings
    }

    /// The fetcher
    pub fn fetcher(&self) -> &Arc<Fetcher> {
        &self.fetcher
    }

    /// The frontier
    pub fn frontier(&self) -> &Arc<dyn Frontier> {
        &self.frontier
    }

    /// A handle that stops the crawl when triggered
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Current lifecycle state
    pub async fn state(&self) -> CrawlState {
        *self.state.read().await
    }

    /// Crawl from the given seeds until the frontier drains, the crawl is
    /// stopped, or an unrecoverable error occurs.
    ///
    /// Seeds that are not valid URLs are reported as failures. Only an
    /// attempt to run the same crawler twice is an error.
    pub async fn run(&self, seeds: Vec<String>) -> Result<CrawlReport> {
        {
            let mut state = self.state.write().await;
            if *state != CrawlState::Idle {
                return Err(Error::other(format!("Crawler cannot run from state '{}'", state)));
            }
            *state = CrawlState::Running;
        }

        let start = Instant::now();
        let settings = Arc::clone(&self.settings);
        info!(
            "Starting crawl of {} seed(s): max depth {}, {} worker(s), extractor '{}'",
            seeds.len(),
            settings.max_depth,
            settings.concurrency,
            settings.extractor
        );

        let mut aggregate = Aggregate::default();

        if let Err(e) = self.fetcher.middleware().opened(&settings).await {
            warn!("Middleware failed to open: {}", e);
        }

        for raw in seeds {
            match normalize_url(&raw) {
                Ok(url) => {
                    if !self.frontier.push(UrlEntry::seed(url)).await {
                        debug!("Duplicate seed {}", raw);
                    }
                }
                Err(e) => {
                    warn!("Invalid seed '{}': {}", raw, e);
                    aggregate.failures.push(FailedUrl::invalid(raw, 0, &e));
                }
            }
        }

        let workers = settings.concurrency.max(1);
        let ctx = Arc::new(WorkerContext {
            settings: Arc::clone(&settings),
            frontier: Arc::clone(&self.frontier),
            fetcher: Arc::clone(&self.fetcher),
            registry: Arc::clone(&self.registry),
            parser: Arc::clone(&self.parser),
            stop: self.stop.clone(),
            in_flight: AtomicUsize::new(0),
            progress: Notify::new(),
            pages_started: AtomicUsize::new(0),
        });

        let (tx, mut rx) = mpsc::channel(workers * 4);
        let handles: Vec<_> = (0..workers)
            .map(|id| tokio::spawn(run_worker(id, Arc::clone(&ctx), tx.clone())))
            .collect();
        drop(tx);

        let mut ticker = settings.stats_interval().map(|period| {
            let mut ticker = interval_at(start + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => {
                        if let Some(reason) = aggregate.apply(event) {
                            error!("Aborting crawl: {}", reason);
                            self.stop.stop();
                        }
                    }
                    None => break,
                },
                _ = tick(&mut ticker) => {
                    let mut snapshot = aggregate.stats.clone();
                    snapshot.duration = start.elapsed();
                    snapshot.pending = self.frontier.len().await;
                    info!("Stats: {}", snapshot);
                }
            }
        }

        for joined in join_all(handles).await {
            if let Err(e) = joined {
                error!("Worker task failed: {}", e);
                aggregate
                    .abort_reason
                    .get_or_insert_with(|| format!("worker task failed: {}", e));
            }
        }

        if let Err(e) = self.fetcher.middleware().closed(&settings).await {
            warn!("Middleware failed to close: {}", e);
        }

        let state = if aggregate.abort_reason.is_some() {
            CrawlState::Aborted
        } else {
            CrawlState::Completed
        };
        *self.state.write().await = state;

        let limit_reached = settings
            .max_pages
            .is_some_and(|max| ctx.pages_started.load(Ordering::SeqCst) >= max);
        let reason = match state {
            CrawlState::Aborted => "crawl aborted before the URL was fetched",
            _ if limit_reached => "page limit reached before the URL was fetched",
            _ => "crawl stopped before the URL was fetched",
        };
        let skipped = self.drain_frontier(reason).await;

        let mut stats = aggregate.stats;
        stats.pending = skipped.len();
        aggregate.failures.extend(skipped);
        stats.records = aggregate.records.len();
        stats.failures = aggregate.failures.len();
        stats.duration = start.elapsed();
        info!("Crawl {}: {}", state, stats);

        Ok(CrawlReport {
            state,
            records: aggregate.records,
            failures: aggregate.failures,
            stats,
            abort_reason: aggregate.abort_reason,
        })
    }

    /// Empty the frontier, reporting every URL left in it as skipped
    async fn drain_frontier(&self, reason: &str) -> Vec<FailedUrl> {
        let mut skipped = Vec::new();
        loop {
            match self.frontier.pop().await {
                Ok(Some(entry)) => skipped.push(FailedUrl::skipped(&entry.url, entry.depth, reason)),
                Ok(None) => break,
                Err(e) => {
                    warn!("Could not drain the frontier: {}", e);
                    break;
                }
            }
        }
        if !skipped.is_empty() {
            info!("{} queued URL(s) were not fetched", skipped.len());
        }
        skipped
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => futures::future::pending::<()>().await,
    }
}

/// Results gathered by the `run` future
#[derive(Default)]
struct Aggregate {
    records: Vec<ExtractionRecord>,
    failures: Vec<FailedUrl>,
    stats: CrawlStats,
    abort_reason: Option<String>,
}

impl Aggregate {
    /// Fold a worker event in. Returns the abort reason for a fatal event.
    fn apply(&mut self, event: WorkerEvent) -> Option<String> {
        match event {
            WorkerEvent::Page {
                records,
                from_cache,
                retries,
                links_discovered,
                links_enqueued,
            } => {
                self.stats.pages_fetched += 1;
                if from_cache {
                    self.stats.cache_hits += 1;
                }
                self.stats.retries += retries as usize;
                self.stats.links_discovered += links_discovered;
                self.stats.links_enqueued += links_enqueued;
                self.stats.records += records.len();
                self.records.extend(records);
                None
            }
            WorkerEvent::Failed { failure, retries } => {
                self.stats.retries += retries as usize;
                self.stats.failures += 1;
                self.failures.push(failure);
                None
            }
            WorkerEvent::Fatal(e) => {
                let reason = e.to_string();
                if self.abort_reason.is_none() {
                    self.abort_reason = Some(reason.clone());
                }
                Some(reason)
            }
        }
    }
}
