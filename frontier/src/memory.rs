use harvest_core::async_trait;
use harvest_core::config::{CrawlSettings, CrawlStrategy};
use harvest_core::entry::UrlEntry;
use harvest_core::error::Result;
use tokio::sync::Mutex;

use crate::filter::UrlFilter;
use crate::frontier_trait::Frontier;
use crate::state::{FrontierState, PopOrder};

/// An in-memory frontier.
///
/// Breadth-first pops the oldest entry (FIFO) so pages are visited level by
/// level; depth-first pops the newest (LIFO).
#[derive(Debug)]
pub struct MemoryFrontier {
    /// Queue and visited set behind one lock
    state: Mutex<FrontierState>,

    /// Traversal order
    order: PopOrder,
}

impl MemoryFrontier {
    /// Create a breadth-first frontier
    pub fn breadth_first(max_depth: usize, filter: UrlFilter) -> Self {
        Self {
            state: Mutex::new(FrontierState::new(max_depth, filter)),
            order: PopOrder::Fifo,
        }
    }

    /// Create a depth-first frontier
    pub fn depth_first(max_depth: usize, filter: UrlFilter) -> Self {
        Self {
            state: Mutex::new(FrontierState::new(max_depth, filter)),
            order: PopOrder::Lifo,
        }
    }

    /// Create the frontier described by the crawl settings
    pub fn from_settings(settings: &CrawlSettings) -> Result<Self> {
        let filter = UrlFilter::from_settings(settings)?;
        Ok(match settings.strategy {
            CrawlStrategy::BreadthFirst => Self::breadth_first(settings.max_depth, filter),
            CrawlStrategy::DepthFirst => Self::depth_first(settings.max_depth, filter),
        })
    }

    /// The traversal strategy of this frontier
    pub fn strategy(&self) -> CrawlStrategy {
        match self.order {
            PopOrder::Fifo => CrawlStrategy::BreadthFirst,
            PopOrder::Lifo => CrawlStrategy::DepthFirst,
        }
    }

    #[cfg(test)]
    pub(crate) async fn force_requeue(&self, entry: UrlEntry) {
        self.state.lock().await.force_requeue(entry);
    }
}

#[async_trait]
impl Frontier for MemoryFrontier {
    async fn push(&self, entry: UrlEntry) -> bool {
        self.state.lock().await.push(entry)
    }

    async fn pop(&self) -> Result<Option<UrlEntry>> {
        self.state.lock().await.pop(self.order)
    }

    async fn is_empty(&self) -> bool {
        self.state.lock().await.is_empty()
    }

    async fn len(&self) -> usize {
        self.state.lock().await.len()
    }

    async fn has_seen(&self, url: &str) -> bool {
        self.state.lock().await.has_seen(url)
    }

    async fn clear(&self) {
        self.state.lock().await.clear();
    }
}
