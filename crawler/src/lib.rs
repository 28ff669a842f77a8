//! The crawl loop: workers pulling from the frontier, fetching pages,
//! running extractors and feeding discovered links back.

mod crawler;
mod stats;
mod stop;
mod worker;

pub use crawler::Crawler;
pub use stats::{CrawlReport, CrawlState, CrawlStats};
pub use stop::StopHandle;
